//! ABOUTME: Core data model for recipes
//! ABOUTME: Provides Recipe, StepSpec, FileSpec and RecipeSource types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{RecipeError, Result};

/// A declarative recipe: an ordered list of steps plus whatever metadata the
/// author attached.
///
/// Only `steps` is interpreted. Every other top-level key (`inputs`,
/// `outputs`, `description`, `env_vars`, ...) is preserved in `metadata` and
/// ignored by execution.
///
/// # Examples
///
/// ```
/// use recipeflow_core::Recipe;
///
/// let recipe = Recipe::parse(r#"{
///     "description": "two step demo",
///     "steps": [
///         {"type": "set_context", "config": {"key": "x", "value": "10"}}
///     ]
/// }"#).unwrap();
///
/// assert_eq!(recipe.steps.len(), 1);
/// assert_eq!(recipe.steps[0].step_type, "set_context");
/// assert!(recipe.metadata.contains_key("description"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub steps: Vec<StepSpec>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Recipe {
    /// Parse a recipe from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Load` on malformed JSON or a missing/mistyped
    /// `steps` array.
    pub fn parse(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json).map_err(|e| RecipeError::Load {
            message: format!("invalid recipe JSON: {e}"),
            source: Some(Box::new(e)),
        })?;
        Self::from_value(value)
    }

    /// Build a recipe from an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Load` when the value is not an object, lacks a
    /// `steps` array, or a step entry is malformed.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(RecipeError::Load {
                message: format!("recipe must be a JSON object, got {}", type_name(&value)),
                source: None,
            });
        }
        match value.get("steps") {
            None => {
                return Err(RecipeError::Load {
                    message: "recipe is missing the required 'steps' array".to_string(),
                    source: None,
                })
            }
            Some(steps) if !steps.is_array() => {
                return Err(RecipeError::Load {
                    message: format!("'steps' must be an array, got {}", type_name(steps)),
                    source: None,
                })
            }
            Some(_) => {}
        }
        serde_json::from_value(value).map_err(|e| RecipeError::Load {
            message: format!("invalid recipe shape: {e}"),
            source: Some(Box::new(e)),
        })
    }
}

/// A single step entry in a recipe: a type tag plus its raw configuration.
///
/// The tag is resolved against the step registry at load time; the config
/// object is deserialized by the step implementation at instantiation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default = "empty_config")]
    pub config: Value,
}

fn empty_config() -> Value {
    Value::Object(Map::new())
}

impl StepSpec {
    pub fn new(step_type: impl Into<String>, config: Value) -> Self {
        Self {
            step_type: step_type.into(),
            config,
        }
    }
}

/// Where a recipe comes from: a filesystem path, a JSON string, or an
/// already-parsed value.
///
/// `From<&str>` maps to `Text`, which the loader disambiguates: input that
/// parses as a JSON object is treated as inline recipe JSON, anything else
/// as a path.
#[derive(Debug, Clone)]
pub enum RecipeSource {
    Path(PathBuf),
    Text(String),
    Value(Value),
}

impl From<&Path> for RecipeSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for RecipeSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&str> for RecipeSource {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for RecipeSource {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for RecipeSource {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// A file to be written: a target path and its content.
///
/// Content may be a string (written verbatim) or any JSON-serializable
/// value; consumers decide serialization. The file writer renders
/// non-string content as 2-space-indented JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: String,
    pub content: Value,
}

impl FileSpec {
    pub fn new(path: impl Into<String>, content: Value) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }

    /// Content as the bytes-to-write string: strings verbatim, everything
    /// else pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Validation` when the content cannot be
    /// serialized.
    pub fn content_string(&self) -> Result<String> {
        match &self.content {
            Value::String(s) => Ok(s.clone()),
            other => serde_json::to_string_pretty(other).map_err(|e| RecipeError::Validation {
                message: format!("unserializable file content: {e}"),
                field: Some("content".to_string()),
            }),
        }
    }
}

/// Human-readable JSON type name, for load diagnostics.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recipe_parse_preserves_extra_keys() {
        let recipe = Recipe::parse(
            r#"{
                "description": "demo",
                "inputs": {"target": "string"},
                "steps": []
            }"#,
        )
        .unwrap();

        assert!(recipe.steps.is_empty());
        assert_eq!(recipe.metadata.get("description").unwrap(), "demo");
        assert!(recipe.metadata.contains_key("inputs"));
    }

    #[test]
    fn test_recipe_missing_steps_fails() {
        let err = Recipe::parse(r#"{"description": "no steps"}"#).unwrap_err();
        assert!(err.to_string().contains("steps"));
    }

    #[test]
    fn test_recipe_steps_must_be_array() {
        let err = Recipe::parse(r#"{"steps": {"type": "noop"}}"#).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_step_spec_defaults_empty_config() {
        let recipe = Recipe::parse(r#"{"steps": [{"type": "read_files"}]}"#).unwrap();
        assert_eq!(recipe.steps[0].config, json!({}));
    }

    #[test]
    fn test_file_spec_content_string() {
        let text = FileSpec::new("out.txt", json!("hello"));
        assert_eq!(text.content_string().unwrap(), "hello");

        let data = FileSpec::new("out.json", json!({"a": 1}));
        let rendered = data.content_string().unwrap();
        assert_eq!(rendered, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_recipe_source_conversions() {
        assert!(matches!(
            RecipeSource::from("recipes/build.json"),
            RecipeSource::Text(_)
        ));
        assert!(matches!(
            RecipeSource::from(json!({"steps": []})),
            RecipeSource::Value(_)
        ));
        assert!(matches!(
            RecipeSource::from(PathBuf::from("a.json")),
            RecipeSource::Path(_)
        ));
    }
}
