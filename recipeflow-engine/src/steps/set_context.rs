//! ABOUTME: set_context step: context mutation with overwrite or shallow-merge
//! ABOUTME: Renders the value (optionally to a fixed point) before assignment

use async_trait::async_trait;
use recipeflow_core::{Context, Result, TemplateRenderer};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::executor::Executor;
use crate::step::{parse_config, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum IfExists {
    #[default]
    Overwrite,
    Merge,
}

#[derive(Debug, Deserialize)]
struct SetContextConfig {
    key: String,
    value: Value,
    #[serde(default)]
    nested_render: bool,
    #[serde(default)]
    if_exists: IfExists,
}

/// Writes a rendered value into the context.
///
/// With `if_exists: "overwrite"` (the default) or an absent key, the write
/// is plain assignment. With `"merge"`, the shallow-merge table applies:
/// strings concatenate, sequences append, mappings key-overwrite (new
/// wins), and mismatched pairs collapse into a two-element list.
#[derive(Debug)]
pub struct SetContextStep {
    config: SetContextConfig,
}

impl SetContextStep {
    pub fn from_config(config: &Value) -> Result<Self> {
        Ok(Self {
            config: parse_config("set_context", config)?,
        })
    }
}

#[async_trait]
impl Step for SetContextStep {
    async fn execute(&self, ctx: &mut Context, _exec: &Executor) -> Result<()> {
        let renderer = TemplateRenderer::new();
        let rendered = renderer.render_value(&self.config.value, ctx, self.config.nested_render)?;

        let key = renderer.render_str(&self.config.key, ctx)?;
        match self.config.if_exists {
            IfExists::Merge if ctx.contains(&key) => {
                debug!(key = %key, "set_context merging");
                ctx.merge(key, rendered);
            }
            _ => ctx.set(key, rendered),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::bare_executor;
    use serde_json::json;

    #[tokio::test]
    async fn test_overwrite_assignment() {
        let exec = bare_executor();
        let mut ctx = Context::new().with_artifact("x", json!("old"));

        let step = SetContextStep::from_config(&json!({"key": "x", "value": "new"})).unwrap();
        step.execute(&mut ctx, &exec).await.unwrap();
        assert_eq!(ctx.get("x").unwrap(), &json!("new"));
    }

    #[tokio::test]
    async fn test_value_templates_render_against_artifacts() {
        let exec = bare_executor();
        let mut ctx = Context::new().with_artifact("x", json!("10"));

        let step =
            SetContextStep::from_config(&json!({"key": "y", "value": "{{ x }}!"})).unwrap();
        step.execute(&mut ctx, &exec).await.unwrap();
        assert_eq!(ctx.get("y").unwrap(), &json!("10!"));
    }

    #[tokio::test]
    async fn test_merge_lists() {
        let exec = bare_executor();
        let mut ctx = Context::new().with_artifact("acc", json!([1, 2]));

        let step = SetContextStep::from_config(
            &json!({"key": "acc", "value": [3], "if_exists": "merge"}),
        )
        .unwrap();
        step.execute(&mut ctx, &exec).await.unwrap();
        assert_eq!(ctx.get("acc").unwrap(), &json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_merge_on_absent_key_assigns() {
        let exec = bare_executor();
        let mut ctx = Context::new();

        let step = SetContextStep::from_config(
            &json!({"key": "fresh", "value": "v", "if_exists": "merge"}),
        )
        .unwrap();
        step.execute(&mut ctx, &exec).await.unwrap();
        assert_eq!(ctx.get("fresh").unwrap(), &json!("v"));
    }

    #[tokio::test]
    async fn test_nested_render_resolves_indirect_templates() {
        let exec = bare_executor();
        let mut ctx = Context::new()
            .with_artifact("template", json!("{{ target }}"))
            .with_artifact("target", json!("resolved"));

        let step = SetContextStep::from_config(
            &json!({"key": "out", "value": "{{ template }}", "nested_render": true}),
        )
        .unwrap();
        step.execute(&mut ctx, &exec).await.unwrap();
        assert_eq!(ctx.get("out").unwrap(), &json!("resolved"));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        assert!(SetContextStep::from_config(&json!({"value": 1})).is_err());
    }
}
