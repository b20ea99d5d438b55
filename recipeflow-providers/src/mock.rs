//! ABOUTME: Mock provider and MCP client implementations for testing
//! ABOUTME: Scripted responses with call recording, in-memory only

use async_trait::async_trait;
use parking_lot::Mutex;
use recipeflow_core::error::{RecipeError, Result};
use serde_json::Value;
use std::collections::VecDeque;

use crate::abstraction::{GenerationRequest, ProviderInstance};
use crate::mcp::{McpClient, McpServerConfig};

/// Scripted LLM provider: hands out queued responses in order and records
/// every request for verification. An empty queue echoes the prompt.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<GenerationRequest>>,
    fail_next: Mutex<bool>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            fail_next: Mutex::new(false),
        }
    }

    /// Queue a canned response.
    #[must_use]
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.responses.lock().push_back(response.into());
        self
    }

    /// Make the next `generate` call fail.
    pub fn fail_next(&self) {
        *self.fail_next.lock() = true;
    }

    /// Requests seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ProviderInstance for ScriptedProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().push(request.clone());

        if std::mem::take(&mut *self.fail_next.lock()) {
            return Err(RecipeError::Provider {
                message: format!("scripted failure for model '{}'", request.model),
                provider: Some(self.name.clone()),
            });
        }

        Ok(self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| request.prompt.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Scripted MCP client: queued results in call order, with recorded
/// invocations and per-tool failure injection.
#[derive(Debug, Default)]
pub struct ScriptedMcpClient {
    results: Mutex<VecDeque<Value>>,
    calls: Mutex<Vec<(String, String, Value)>>,
    fail_tools: Mutex<Vec<String>>,
}

impl ScriptedMcpClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canned tool result.
    #[must_use]
    pub fn with_result(self, result: Value) -> Self {
        self.results.lock().push_back(result);
        self
    }

    /// Configure tool names whose invocation should fail.
    pub fn set_tool_failures(&self, tools: Vec<String>) {
        *self.fail_tools.lock() = tools;
    }

    /// Calls seen so far, as (server label, tool name, arguments).
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl McpClient for ScriptedMcpClient {
    async fn call_tool(
        &self,
        server: &McpServerConfig,
        tool_name: &str,
        arguments: Value,
    ) -> Result<Value> {
        self.calls
            .lock()
            .push((server.label(), tool_name.to_string(), arguments));

        if self.fail_tools.lock().iter().any(|t| t == tool_name) {
            return Err(RecipeError::Tool {
                message: format!("scripted failure for tool '{tool_name}'"),
                tool: Some(tool_name.to_string()),
            });
        }

        Ok(self
            .results
            .lock()
            .pop_front()
            .unwrap_or(Value::Null))
    }
}
