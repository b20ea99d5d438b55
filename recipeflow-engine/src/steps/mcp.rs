//! ABOUTME: mcp step: invoke a tool on a remote MCP server
//! ABOUTME: Renders server config and arguments, dispatches through the McpClient seam

use async_trait::async_trait;
use recipeflow_core::{Context, RecipeError, Result, TemplateRenderer};
use recipeflow_providers::{McpClient, McpServerConfig};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::executor::Executor;
use crate::step::{parse_config, Step};

fn default_result_key() -> String {
    "tool_result".to_string()
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Deserialize)]
struct McpConfig {
    server: Value,
    tool_name: String,
    #[serde(default = "empty_object")]
    arguments: Value,
    #[serde(default = "default_result_key")]
    result_key: String,
}

/// Calls a tool on an MCP server and stores the result.
///
/// The server config (HTTP or stdio shape) and the arguments are rendered
/// against the context before dispatch; the transport itself lives behind
/// the `McpClient` trait.
pub struct McpStep {
    config: McpConfig,
    client: Option<Arc<dyn McpClient>>,
}

impl McpStep {
    pub fn from_config(config: &Value, client: Option<Arc<dyn McpClient>>) -> Result<Self> {
        Ok(Self {
            config: parse_config("mcp", config)?,
            client,
        })
    }
}

#[async_trait]
impl Step for McpStep {
    async fn execute(&self, ctx: &mut Context, _exec: &Executor) -> Result<()> {
        let renderer = TemplateRenderer::new();
        let tool_name = renderer.render_str(&self.config.tool_name, ctx)?;

        let client = self.client.as_ref().ok_or_else(|| RecipeError::Tool {
            message: "no MCP client configured".to_string(),
            tool: Some(tool_name.clone()),
        })?;

        let rendered_server = renderer.render_value(&self.config.server, ctx, false)?;
        let server: McpServerConfig =
            serde_json::from_value(rendered_server).map_err(|e| RecipeError::StepConfig {
                step_type: "mcp".to_string(),
                message: format!("server must be an http or stdio config: {e}"),
                field: Some("server".to_string()),
            })?;

        let arguments = renderer.render_value(&self.config.arguments, ctx, false)?;
        debug!(server = %server.label(), tool = %tool_name, "mcp invoking tool");
        let result = client.call_tool(&server, &tool_name, arguments).await?;

        let result_key = renderer.render_str(&self.config.result_key, ctx)?;
        ctx.set(result_key, result);
        Ok(())
    }
}
