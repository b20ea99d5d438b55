//! ABOUTME: MCP client abstraction for remote tool invocation
//! ABOUTME: Defines McpServerConfig (http/stdio) and the McpClient trait

use async_trait::async_trait;
use recipeflow_core::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// How to reach an MCP server: streaming HTTP or a spawned stdio process.
///
/// Deserialization is shape-driven: an object with `url` is HTTP, one with
/// `command` is stdio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerConfig {
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<String>,
    },
}

impl McpServerConfig {
    /// Short label for logs and error messages.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Http { url, .. } => url.clone(),
            Self::Stdio { command, .. } => command.clone(),
        }
    }
}

/// Transport-level MCP client.
///
/// The executor treats tool invocation as a black box: given a server
/// config, a tool name and JSON arguments, the client returns the tool's
/// JSON result. Transport details (HTTP-SSE sessions, process lifecycle)
/// live behind this trait.
#[async_trait]
pub trait McpClient: Send + Sync {
    /// Invoke a tool on the given server.
    async fn call_tool(
        &self,
        server: &McpServerConfig,
        tool_name: &str,
        arguments: Value,
    ) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_config_deserializes_from_shape() {
        let config: McpServerConfig = serde_json::from_value(json!({
            "url": "https://tools.example/sse",
            "headers": {"authorization": "Bearer t"}
        }))
        .unwrap();

        match config {
            McpServerConfig::Http { url, headers } => {
                assert_eq!(url, "https://tools.example/sse");
                assert_eq!(headers.unwrap()["authorization"], "Bearer t");
            }
            McpServerConfig::Stdio { .. } => panic!("expected http config"),
        }
    }

    #[test]
    fn test_stdio_config_defaults() {
        let config: McpServerConfig =
            serde_json::from_value(json!({"command": "mcp-server-git"})).unwrap();

        match config {
            McpServerConfig::Stdio {
                command,
                args,
                env,
                working_dir,
            } => {
                assert_eq!(command, "mcp-server-git");
                assert!(args.is_empty());
                assert!(env.is_empty());
                assert!(working_dir.is_none());
            }
            McpServerConfig::Http { .. } => panic!("expected stdio config"),
        }
    }
}
