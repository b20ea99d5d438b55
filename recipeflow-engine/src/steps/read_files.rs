//! ABOUTME: read_files step: load one or more files into an artifact
//! ABOUTME: Templated paths, comma-list and glob expansion, concat/dict merge modes

use async_trait::async_trait;
use recipeflow_core::{Context, RecipeError, Result, TemplateRenderer};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::debug;

use crate::executor::Executor;
use crate::step::{parse_config, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MergeMode {
    #[default]
    Concat,
    Dict,
}

#[derive(Debug, Deserialize)]
struct ReadFilesConfig {
    path: Value,
    content_key: String,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    merge_mode: MergeMode,
}

/// Reads files into the context.
///
/// `path` is a string or list of strings; each entry is rendered, split on
/// commas, and glob-expanded before the optional check. `concat` (the
/// default) joins file bodies with `\n`; a single existing file yields its
/// exact content. `dict` maps each path to its content, auto-parsing
/// `.json`/`.yaml`/`.yml` bodies (falling back to the raw string when
/// parsing fails).
///
/// Missing files with `optional: true` contribute an empty string (concat)
/// or are omitted (dict); with `optional: false` they fail the step.
#[derive(Debug)]
pub struct ReadFilesStep {
    config: ReadFilesConfig,
}

impl ReadFilesStep {
    pub fn from_config(config: &Value) -> Result<Self> {
        Ok(Self {
            config: parse_config("read_files", config)?,
        })
    }

    fn expand_paths(&self, ctx: &Context, renderer: &TemplateRenderer) -> Result<Vec<String>> {
        let raw: Vec<&str> = match &self.config.path {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items
                .iter()
                .map(|entry| {
                    entry.as_str().ok_or_else(|| RecipeError::StepConfig {
                        step_type: "read_files".to_string(),
                        message: format!("path entries must be strings, got {entry}"),
                        field: Some("path".to_string()),
                    })
                })
                .collect::<Result<_>>()?,
            other => {
                return Err(RecipeError::StepConfig {
                    step_type: "read_files".to_string(),
                    message: format!("path must be a string or list of strings, got {other}"),
                    field: Some("path".to_string()),
                })
            }
        };

        let mut paths = Vec::new();
        for entry in raw {
            let rendered = renderer.render_str(entry, ctx)?;
            for part in rendered.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                if part.contains(['*', '?', '[']) {
                    let mut matched: Vec<String> = glob::glob(part)
                        .map_err(|e| RecipeError::File {
                            path: PathBuf::from(part),
                            message: format!("invalid glob pattern: {e}"),
                            source: None,
                        })?
                        .filter_map(std::result::Result::ok)
                        .map(|p| p.to_string_lossy().into_owned())
                        .collect();
                    matched.sort();
                    if matched.is_empty() {
                        if !self.config.optional {
                            return Err(RecipeError::File {
                                path: PathBuf::from(part),
                                message: "no files match pattern".to_string(),
                                source: None,
                            });
                        }
                        debug!(pattern = part, "optional glob matched nothing, skipped");
                    } else {
                        paths.extend(matched);
                    }
                } else {
                    paths.push(part.to_string());
                }
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl Step for ReadFilesStep {
    async fn execute(&self, ctx: &mut Context, _exec: &Executor) -> Result<()> {
        let renderer = TemplateRenderer::new();
        let paths = self.expand_paths(ctx, &renderer)?;
        let content_key = renderer.render_str(&self.config.content_key, ctx)?;

        let value = match self.config.merge_mode {
            MergeMode::Concat => {
                let mut contents = Vec::new();
                for path in &paths {
                    if let Some(text) = read_one(path, self.config.optional).await? {
                        contents.push(text);
                    }
                }
                Value::String(contents.join("\n"))
            }
            MergeMode::Dict => {
                let mut map = Map::new();
                for path in &paths {
                    if let Some(text) = read_one(path, self.config.optional).await? {
                        map.insert(path.clone(), parse_by_extension(path, text));
                    }
                }
                Value::Object(map)
            }
        };

        debug!(key = %content_key, files = paths.len(), "read_files stored content");
        ctx.set(content_key, value);
        Ok(())
    }
}

/// Read one file; a missing optional file reads as `None`.
async fn read_one(path: &str, optional: bool) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && optional => {
            debug!(path, "optional file missing, skipped");
            Ok(None)
        }
        Err(e) => Err(RecipeError::File {
            path: PathBuf::from(path),
            message: e.to_string(),
            source: Some(e),
        }),
    }
}

/// In dict mode, structured formats are parsed by extension; anything that
/// fails to parse stays a raw string.
fn parse_by_extension(path: &str, text: String) -> Value {
    let lower = path.to_lowercase();
    if lower.ends_with(".json") {
        match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => Value::String(text),
        }
    } else if lower.ends_with(".yaml") || lower.ends_with(".yml") {
        match serde_yaml::from_str(&text) {
            Ok(value) => value,
            Err(_) => Value::String(text),
        }
    } else {
        Value::String(text)
    }
}
