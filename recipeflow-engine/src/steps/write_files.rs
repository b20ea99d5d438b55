//! ABOUTME: write_files step: write FileSpecs or inline entries to disk
//! ABOUTME: Renders paths, joins under root, creates parent dirs, JSON-serializes non-strings

use async_trait::async_trait;
use path_clean::PathClean;
use recipeflow_core::{Context, FileSpec, RecipeError, Result, TemplateRenderer};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::executor::Executor;
use crate::step::{parse_config, Step};

fn default_root() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    path: Option<String>,
    path_key: Option<String>,
    content: Option<Value>,
    content_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteFilesConfig {
    files_key: Option<String>,
    files: Option<Vec<FileEntry>>,
    #[serde(default = "default_root")]
    root: String,
}

/// Writes files from an artifact or an inline list.
///
/// Exactly one of `files_key` (an artifact holding a FileSpec, a list of
/// FileSpecs, or `{path, content}` maps) or `files` (inline entries with
/// `path`/`path_key` and `content`/`content_key`) is required; `files` wins
/// when both are present. Paths are rendered, joined under `root` and
/// cleaned; parent directories are created. String content is written
/// verbatim, anything else as 2-space-indented JSON in UTF-8.
#[derive(Debug)]
pub struct WriteFilesStep {
    config: WriteFilesConfig,
}

impl WriteFilesStep {
    pub fn from_config(config: &Value) -> Result<Self> {
        let parsed: WriteFilesConfig = parse_config("write_files", config)?;
        if parsed.files.is_none() && parsed.files_key.is_none() {
            return Err(RecipeError::StepConfig {
                step_type: "write_files".to_string(),
                message: "one of 'files' or 'files_key' is required".to_string(),
                field: None,
            });
        }
        Ok(Self { config: parsed })
    }

    fn resolve_entry(
        &self,
        entry: &FileEntry,
        ctx: &Context,
        renderer: &TemplateRenderer,
    ) -> Result<FileSpec> {
        let path = match (&entry.path, &entry.path_key) {
            (Some(path), None) => renderer.render_str(path, ctx)?,
            (None, Some(path_key)) => {
                let key = renderer.render_str(path_key, ctx)?;
                ctx.get(&key)
                    .and_then(Value::as_str)
                    .map(String::from)
                    .ok_or_else(|| RecipeError::Validation {
                        message: format!("artifact '{key}' is missing or not a string path"),
                        field: Some("path_key".to_string()),
                    })?
            }
            _ => {
                return Err(RecipeError::StepConfig {
                    step_type: "write_files".to_string(),
                    message: "each file entry needs exactly one of 'path' or 'path_key'"
                        .to_string(),
                    field: None,
                })
            }
        };

        let content = match (&entry.content, &entry.content_key) {
            (Some(content), None) => renderer.render_value(content, ctx, false)?,
            (None, Some(content_key)) => {
                let key = renderer.render_str(content_key, ctx)?;
                ctx.get(&key).cloned().ok_or_else(|| RecipeError::Validation {
                    message: format!("artifact '{key}' not found for file content"),
                    field: Some("content_key".to_string()),
                })?
            }
            _ => {
                return Err(RecipeError::StepConfig {
                    step_type: "write_files".to_string(),
                    message: "each file entry needs exactly one of 'content' or 'content_key'"
                        .to_string(),
                    field: None,
                })
            }
        };

        Ok(FileSpec::new(path, content))
    }
}

#[async_trait]
impl Step for WriteFilesStep {
    async fn execute(&self, ctx: &mut Context, _exec: &Executor) -> Result<()> {
        let renderer = TemplateRenderer::new();

        let specs: Vec<FileSpec> = if let Some(entries) = &self.config.files {
            entries
                .iter()
                .map(|entry| self.resolve_entry(entry, ctx, &renderer))
                .collect::<Result<_>>()?
        } else if let Some(files_key) = &self.config.files_key {
            let key = renderer.render_str(files_key, ctx)?;
            let artifact = ctx.get(&key).ok_or_else(|| RecipeError::Validation {
                message: format!("artifact '{key}' not found for write_files"),
                field: Some("files_key".to_string()),
            })?;
            files_from_artifact(&key, artifact)?
        } else {
            // Checked at construction.
            return Err(RecipeError::StepConfig {
                step_type: "write_files".to_string(),
                message: "one of 'files' or 'files_key' is required".to_string(),
                field: None,
            });
        };

        let root = renderer.render_str(&self.config.root, ctx)?;
        for spec in specs {
            let rendered_path = renderer.render_str(&spec.path, ctx)?;
            let full: PathBuf = Path::new(&root).join(rendered_path).clean();
            if let Some(parent) = full.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| file_error(parent, e))?;
                }
            }
            let text = spec.content_string()?;
            tokio::fs::write(&full, text.as_bytes())
                .await
                .map_err(|e| file_error(&full, e))?;
            debug!(path = %full.display(), bytes = text.len(), "wrote file");
        }
        Ok(())
    }
}

fn file_error(path: &Path, e: std::io::Error) -> RecipeError {
    RecipeError::File {
        path: path.to_path_buf(),
        message: e.to_string(),
        source: Some(e),
    }
}

/// Interpret an artifact as one FileSpec or a list of them.
fn files_from_artifact(key: &str, value: &Value) -> Result<Vec<FileSpec>> {
    let as_spec = |entry: &Value| -> Result<FileSpec> {
        serde_json::from_value(entry.clone()).map_err(|e| RecipeError::Validation {
            message: format!("artifact '{key}' does not hold file specs: {e}"),
            field: Some("files_key".to_string()),
        })
    };
    match value {
        Value::Array(items) => items.iter().map(as_spec).collect(),
        single => Ok(vec![as_spec(single)?]),
    }
}
