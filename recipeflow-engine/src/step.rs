//! ABOUTME: The Step trait and config deserialization helper
//! ABOUTME: Every step is a validated config plus an async execute method

use async_trait::async_trait;
use recipeflow_core::{Context, RecipeError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::executor::Executor;

/// One unit of recipe execution.
///
/// A step is constructed from its validated config and later executed
/// against the shared context. Template rendering is deferred to
/// `execute` time so artifacts written by earlier steps can flow into
/// the config's templates.
///
/// The `exec` handle carries the registry and recursion depth; control-flow
/// steps use it to run substep sequences and sub-recipes.
#[async_trait]
pub trait Step: Send + Sync {
    async fn execute(&self, ctx: &mut Context, exec: &Executor) -> Result<()>;
}

impl std::fmt::Debug for dyn Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Step")
    }
}

/// Deserialize a step's raw config into its typed form, mapping serde
/// failures to `RecipeError::StepConfig` carrying the step type.
pub fn parse_config<T: DeserializeOwned>(step_type: &str, config: &Value) -> Result<T> {
    serde_json::from_value(config.clone()).map_err(|e| RecipeError::StepConfig {
        step_type: step_type.to_string(),
        message: e.to_string(),
        field: None,
    })
}
