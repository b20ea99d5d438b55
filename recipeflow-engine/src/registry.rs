//! ABOUTME: Step registry mapping type tags to step factories
//! ABOUTME: Process-wide, case-sensitive, populated at startup

use recipeflow_core::{RecipeError, Result, StepSpec};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use recipeflow_providers::{McpClient, ProviderRegistry};

use crate::step::Step;
use crate::steps;

/// Factory function type for creating step instances from raw config
pub type StepFactory = Box<dyn Fn(&Value) -> Result<Box<dyn Step>> + Send + Sync>;

/// Shared handles the built-in steps need beyond the context: the LLM
/// provider registry for `llm_generate` and the MCP client for `mcp`.
#[derive(Clone, Default)]
pub struct StepDeps {
    pub providers: Arc<ProviderRegistry>,
    pub mcp: Option<Arc<dyn McpClient>>,
}

/// Mapping from step type tag to implementation factory.
///
/// Lookup is case-sensitive. An unknown tag is a recipe-load error, caught
/// either at `Executor::load` or at instantiation.
#[derive(Default)]
pub struct StepRegistry {
    factories: HashMap<String, StepFactory>,
}

impl StepRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry wired with the nine built-in step types.
    #[must_use]
    pub fn with_builtins(deps: StepDeps) -> Self {
        let mut registry = Self::new();
        registry.register("read_files", |config| {
            Ok(Box::new(steps::read_files::ReadFilesStep::from_config(config)?) as Box<dyn Step>)
        });
        registry.register("write_files", |config| {
            Ok(Box::new(steps::write_files::WriteFilesStep::from_config(config)?) as Box<dyn Step>)
        });
        registry.register("set_context", |config| {
            Ok(Box::new(steps::set_context::SetContextStep::from_config(config)?) as Box<dyn Step>)
        });
        registry.register("conditional", |config| {
            Ok(Box::new(steps::conditional::ConditionalStep::from_config(config)?) as Box<dyn Step>)
        });
        registry.register("loop", |config| {
            Ok(Box::new(steps::loop_step::LoopStep::from_config(config)?) as Box<dyn Step>)
        });
        registry.register("parallel", |config| {
            Ok(Box::new(steps::parallel::ParallelStep::from_config(config)?) as Box<dyn Step>)
        });
        registry.register("execute_recipe", |config| {
            Ok(Box::new(steps::execute_recipe::ExecuteRecipeStep::from_config(config)?)
                as Box<dyn Step>)
        });
        let providers = Arc::clone(&deps.providers);
        registry.register("llm_generate", move |config| {
            Ok(Box::new(steps::llm_generate::LlmGenerateStep::from_config(
                config,
                Arc::clone(&providers),
            )?) as Box<dyn Step>)
        });
        let mcp = deps.mcp.clone();
        registry.register("mcp", move |config| {
            Ok(Box::new(steps::mcp::McpStep::from_config(config, mcp.clone())?) as Box<dyn Step>)
        });
        registry
    }

    /// Register a step factory under a type tag.
    pub fn register<F>(&mut self, step_type: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Box<dyn Step>> + Send + Sync + 'static,
    {
        self.factories.insert(step_type.into(), Box::new(factory));
    }

    #[must_use]
    pub fn contains(&self, step_type: &str) -> bool {
        self.factories.contains_key(step_type)
    }

    /// Registered type tags, for load diagnostics.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.factories.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Instantiate a step from its spec, validating the config.
    ///
    /// # Errors
    ///
    /// `RecipeError::Load` for an unknown tag, `RecipeError::StepConfig`
    /// when the config fails validation.
    pub fn instantiate(&self, spec: &StepSpec) -> Result<Box<dyn Step>> {
        let factory = self
            .factories
            .get(&spec.step_type)
            .ok_or_else(|| RecipeError::Load {
                message: format!("unknown step type '{}'", spec.step_type),
                source: None,
            })?;
        factory(&spec.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins_cover_all_nine_tags() {
        let registry = StepRegistry::with_builtins(StepDeps::default());
        for tag in [
            "read_files",
            "write_files",
            "set_context",
            "conditional",
            "loop",
            "parallel",
            "execute_recipe",
            "llm_generate",
            "mcp",
        ] {
            assert!(registry.contains(tag), "missing builtin '{tag}'");
        }
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let registry = StepRegistry::with_builtins(StepDeps::default());
        assert!(!registry.contains("Set_Context"));
        assert!(!registry.contains("LOOP"));
    }

    #[test]
    fn test_instantiate_unknown_tag_is_load_error() {
        let registry = StepRegistry::new();
        let spec = StepSpec::new("nope", json!({}));
        let err = registry.instantiate(&spec).unwrap_err();
        assert!(matches!(err, RecipeError::Load { .. }));
    }

    #[test]
    fn test_instantiate_invalid_config_is_step_config_error() {
        let registry = StepRegistry::with_builtins(StepDeps::default());
        // set_context requires `key` and `value`.
        let spec = StepSpec::new("set_context", json!({"value": 1}));
        let err = registry.instantiate(&spec).unwrap_err();
        assert!(matches!(err, RecipeError::StepConfig { .. }));
    }
}
