//! ABOUTME: llm_generate step: provider dispatch plus structured-output coercion
//! ABOUTME: Coerces model text to raw text, FileSpec lists, or schema-validated JSON

use async_trait::async_trait;
use recipeflow_core::{Context, FileSpec, RecipeError, Result, TemplateRenderer};
use recipeflow_providers::{GenerationRequest, ModelSpecifier, ProviderRegistry};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::executor::Executor;
use crate::step::{parse_config, Step};

fn default_model() -> String {
    "openai/gpt-4o".to_string()
}

#[derive(Debug, Deserialize)]
struct LlmGenerateConfig {
    prompt: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default)]
    max_tokens: Option<u64>,
    #[serde(default)]
    mcp_servers: Option<Vec<Value>>,
    #[serde(default)]
    openai_builtin_tools: Option<Vec<Value>>,
    output_format: Value,
    output_key: String,
}

/// Generates text through an LLM provider and stores the coerced output.
///
/// `model` parses as `provider/model_id[/deployment]` and resolves against
/// the provider registry. The provider is a black box returning text;
/// coercion happens here:
/// - `"text"` stores the raw text;
/// - `"files"` parses the text as a JSON list of `{path, content}` specs
///   (or an object carrying a `files` list);
/// - a schema object validates the parsed JSON against it; a one-element
///   schema list validates each element of a JSON array.
pub struct LlmGenerateStep {
    config: LlmGenerateConfig,
    providers: Arc<ProviderRegistry>,
}

impl std::fmt::Debug for LlmGenerateStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGenerateStep")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LlmGenerateStep {
    pub fn from_config(config: &Value, providers: Arc<ProviderRegistry>) -> Result<Self> {
        let parsed: LlmGenerateConfig = parse_config("llm_generate", config)?;
        validate_output_format(&parsed.output_format)?;
        Ok(Self {
            config: parsed,
            providers,
        })
    }

    fn coerce_output(&self, text: &str) -> Result<Value> {
        match &self.config.output_format {
            Value::String(kind) if kind == "text" => Ok(Value::String(text.to_string())),
            Value::String(kind) if kind == "files" => coerce_files(text),
            Value::Object(_) => {
                let parsed = parse_output_json(text)?;
                validate_schema(&self.config.output_format, &parsed)?;
                Ok(parsed)
            }
            Value::Array(schemas) if schemas.len() == 1 => {
                let parsed = parse_output_json(text)?;
                let items = parsed.as_array().ok_or_else(|| RecipeError::Provider {
                    message: "output is not a JSON array".to_string(),
                    provider: None,
                })?;
                for item in items {
                    validate_schema(&schemas[0], item)?;
                }
                Ok(parsed)
            }
            // Checked at construction.
            other => Err(RecipeError::StepConfig {
                step_type: "llm_generate".to_string(),
                message: format!("unsupported output_format {other}"),
                field: Some("output_format".to_string()),
            }),
        }
    }
}

#[async_trait]
impl Step for LlmGenerateStep {
    async fn execute(&self, ctx: &mut Context, _exec: &Executor) -> Result<()> {
        let renderer = TemplateRenderer::new();
        let prompt = renderer.render_str(&self.config.prompt, ctx)?;
        let model = renderer.render_str(&self.config.model, ctx)?;
        let spec = ModelSpecifier::parse(&model)?;

        let provider = self.providers.resolve(&spec)?;
        debug!(model = %spec, provider = provider.name(), "llm_generate dispatching");

        let mcp_servers = match &self.config.mcp_servers {
            Some(servers) => Some(
                servers
                    .iter()
                    .map(|server| renderer.render_value(server, ctx, false))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        let mut request = GenerationRequest::new(prompt, spec);
        request.max_tokens = self.config.max_tokens;
        request.mcp_servers = mcp_servers;
        request.builtin_tools = self.config.openai_builtin_tools.clone();

        let text = provider.generate(&request).await?;
        let output = self.coerce_output(&text)?;

        let output_key = renderer.render_str(&self.config.output_key, ctx)?;
        ctx.set(output_key, output);
        Ok(())
    }
}

fn validate_output_format(format: &Value) -> Result<()> {
    let valid = match format {
        Value::String(kind) => kind == "text" || kind == "files",
        Value::Object(_) => true,
        Value::Array(schemas) => schemas.len() == 1 && schemas[0].is_object(),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(RecipeError::StepConfig {
            step_type: "llm_generate".to_string(),
            message: format!(
                "output_format must be \"text\", \"files\", a schema object or a one-element schema list, got {format}"
            ),
            field: Some("output_format".to_string()),
        })
    }
}

fn parse_output_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| RecipeError::Provider {
        message: format!("output is not valid JSON: {e}"),
        provider: None,
    })
}

fn coerce_files(text: &str) -> Result<Value> {
    let parsed = parse_output_json(text)?;
    let list = match parsed {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => map.remove("files").ok_or_else(|| RecipeError::Provider {
            message: "output object has no 'files' list".to_string(),
            provider: None,
        })?,
        other => {
            return Err(RecipeError::Provider {
                message: format!("output must be a list of file specs, got {other}"),
                provider: None,
            })
        }
    };
    // Shape-check every entry before handing the list on.
    let _specs: Vec<FileSpec> =
        serde_json::from_value(list.clone()).map_err(|e| RecipeError::Provider {
            message: format!("output is not a list of file specs: {e}"),
            provider: None,
        })?;
    Ok(list)
}

fn validate_schema(schema: &Value, instance: &Value) -> Result<()> {
    let compiled = jsonschema::JSONSchema::compile(schema).map_err(|e| RecipeError::Provider {
        message: format!("invalid output schema: {e}"),
        provider: None,
    })?;
    if let Err(errors) = compiled.validate(instance) {
        let detail: Vec<String> = errors.map(|e| e.to_string()).collect();
        return Err(RecipeError::Provider {
            message: format!("output failed schema validation: {}", detail.join("; ")),
            provider: None,
        });
    }
    Ok(())
}
