//! ABOUTME: The recipe executor: loading, validation and sequential dispatch
//! ABOUTME: Reentrant, depth-bounded, wraps step failures with index and type

use recipeflow_core::{Context, Recipe, RecipeError, RecipeSource, Result, StepSpec};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::registry::StepRegistry;

/// Default bound on `execute_recipe` nesting.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 32;

/// Executor knobs.
///
/// `from_env` honors `RECIPEFLOW_MAX_RECURSION_DEPTH`.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum `execute_recipe` nesting depth.
    pub max_recursion_depth: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(depth) = std::env::var("RECIPEFLOW_MAX_RECURSION_DEPTH")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.max_recursion_depth = depth;
        }
        config
    }
}

/// Runs recipes against a context.
///
/// The executor walks a recipe's steps in declaration order; each step is
/// instantiated through the registry (validating its config), then awaited
/// against the shared context. The first failure aborts the run and is
/// re-raised wrapped with the step's index and type; partial context
/// mutations remain visible (no rollback).
///
/// Executors are cheap to clone (the registry is shared) and reentrant:
/// `execute_recipe` runs sub-recipes through a `subscope`, which bounds
/// nesting depth.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<StepRegistry>,
    config: ExecutorConfig,
    depth: usize,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("depth", &self.depth)
            .finish()
    }
}

impl Executor {
    #[must_use]
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self {
            registry,
            config: ExecutorConfig::default(),
            depth: 0,
        }
    }

    #[must_use]
    pub fn with_config(registry: Arc<StepRegistry>, config: ExecutorConfig) -> Self {
        Self {
            registry,
            config,
            depth: 0,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    /// Current `execute_recipe` nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// An executor one nesting level deeper, for sub-recipe execution.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::RecursionLimit` once the configured depth is
    /// exhausted.
    pub fn subscope(&self) -> Result<Self> {
        if self.depth >= self.config.max_recursion_depth {
            return Err(RecipeError::RecursionLimit {
                depth: self.depth + 1,
                limit: self.config.max_recursion_depth,
            });
        }
        let mut child = self.clone();
        child.depth += 1;
        Ok(child)
    }

    /// Load a recipe from a path, a JSON string, or a parsed value.
    ///
    /// Text input that parses as a JSON object is treated as inline recipe
    /// JSON; any other text is treated as a filesystem path. The loaded
    /// recipe's shape is validated, including that every step's type tag
    /// resolves in the registry.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Load` on unreadable files, malformed JSON, a
    /// missing/mistyped `steps` array, or an unregistered step type.
    pub async fn load(&self, source: impl Into<RecipeSource>) -> Result<Recipe> {
        let recipe = match source.into() {
            RecipeSource::Path(path) => self.load_path(path).await?,
            RecipeSource::Text(text) => {
                if text.trim_start().starts_with('{') {
                    Recipe::parse(&text)?
                } else {
                    self.load_path(PathBuf::from(text)).await?
                }
            }
            RecipeSource::Value(value) => Recipe::from_value(value)?,
        };

        for (index, step) in recipe.steps.iter().enumerate() {
            if !self.registry.contains(&step.step_type) {
                return Err(RecipeError::Load {
                    message: format!(
                        "step {index} has unknown type '{}' (known: {})",
                        step.step_type,
                        self.registry.tags().join(", ")
                    ),
                    source: None,
                });
            }
        }
        Ok(recipe)
    }

    async fn load_path(&self, path: PathBuf) -> Result<Recipe> {
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RecipeError::Load {
                message: format!("cannot read recipe '{}': {e}", path.display()),
                source: Some(Box::new(e)),
            })?;
        Recipe::parse(&text)
    }

    /// Execute a recipe against a context, step by step.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Execution` wrapping the first failing step's
    /// error together with its index and type.
    pub async fn execute(&self, recipe: &Recipe, ctx: &mut Context) -> Result<()> {
        let execution_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            execution_id = %execution_id,
            steps = recipe.steps.len(),
            depth = self.depth,
            "recipe execution started"
        );

        self.run_steps(&recipe.steps, ctx).await?;

        info!(
            execution_id = %execution_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "recipe execution finished"
        );
        Ok(())
    }

    /// Run a step sequence in declaration order against a context.
    ///
    /// Used by `execute` and by control-flow steps for their inlined
    /// substep sequences; failure wrapping is identical in both cases.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Execution` for the first failing step.
    pub async fn run_steps(&self, steps: &[StepSpec], ctx: &mut Context) -> Result<()> {
        for (index, spec) in steps.iter().enumerate() {
            self.run_step(index, spec, ctx).await?;
        }
        Ok(())
    }

    /// Instantiate and run a single step, wrapping any failure with the
    /// given index and the step's type.
    pub async fn run_step(&self, index: usize, spec: &StepSpec, ctx: &mut Context) -> Result<()> {
        debug!(step_index = index, step_type = %spec.step_type, "dispatching step");
        let step = self
            .registry
            .instantiate(spec)
            .map_err(|e| e.at_step(index, spec.step_type.as_str()))?;
        step.execute(ctx, self).await.map_err(|e| {
            error!(
                step_index = index,
                step_type = %spec.step_type,
                error = %e,
                "step failed"
            );
            e.at_step(index, spec.step_type.as_str())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_depth() {
        assert_eq!(
            ExecutorConfig::default().max_recursion_depth,
            DEFAULT_MAX_RECURSION_DEPTH
        );
    }

    #[test]
    fn test_subscope_counts_up_to_the_limit() {
        let exec = Executor::with_config(
            Arc::new(StepRegistry::new()),
            ExecutorConfig {
                max_recursion_depth: 3,
            },
        );

        let one = exec.subscope().unwrap();
        let two = one.subscope().unwrap();
        let three = two.subscope().unwrap();
        assert_eq!(three.depth(), 3);

        let err = three.subscope().unwrap_err();
        match err {
            RecipeError::RecursionLimit { depth, limit } => {
                assert_eq!(depth, 4);
                assert_eq!(limit, 3);
            }
            other => panic!("expected recursion limit, got {other}"),
        }
    }
}
