//! ABOUTME: execute_recipe step: sub-recipe composition on the shared context
//! ABOUTME: Applies rendered context overrides, then runs the sub-recipe depth-bounded

use async_trait::async_trait;
use recipeflow_core::{Context, RecipeSource, Result, TemplateRenderer};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::debug;

use crate::executor::Executor;
use crate::step::{parse_config, Step};

#[derive(Debug, Deserialize)]
struct ExecuteRecipeConfig {
    recipe_path: String,
    #[serde(default)]
    context_overrides: Map<String, Value>,
}

/// Runs another recipe against the same context.
///
/// `context_overrides` are rendered (recursively for nested structures)
/// and assigned before the sub-recipe starts; both the overrides and the
/// sub-recipe's writes persist into the parent context after it returns.
/// Nesting is bounded by the executor's recursion limit.
#[derive(Debug)]
pub struct ExecuteRecipeStep {
    config: ExecuteRecipeConfig,
}

impl ExecuteRecipeStep {
    pub fn from_config(config: &Value) -> Result<Self> {
        Ok(Self {
            config: parse_config("execute_recipe", config)?,
        })
    }
}

#[async_trait]
impl Step for ExecuteRecipeStep {
    async fn execute(&self, ctx: &mut Context, exec: &Executor) -> Result<()> {
        let renderer = TemplateRenderer::new();
        let path = renderer.render_str(&self.config.recipe_path, ctx)?;

        for (key, value) in &self.config.context_overrides {
            let rendered = renderer.render_value(value, ctx, false)?;
            ctx.set(key.clone(), rendered);
        }

        let sub = exec.subscope()?;
        debug!(recipe_path = %path, depth = sub.depth(), "executing sub-recipe");
        let recipe = sub.load(RecipeSource::Path(PathBuf::from(path))).await?;
        sub.execute(&recipe, ctx).await
    }
}
