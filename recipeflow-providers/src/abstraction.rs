//! ABOUTME: Provider abstraction layer for LLM generation
//! ABOUTME: Defines ProviderInstance, ProviderConfig and the ProviderRegistry

use async_trait::async_trait;
use parking_lot::RwLock;
use recipeflow_core::error::{RecipeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::model_specifier::ModelSpecifier;

/// A single generation request handed to a provider.
///
/// The executor passes `mcp_servers`, `builtin_tools` and `max_tokens`
/// through verbatim; how a provider wires them into its API is its own
/// concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: ModelSpecifier,
    pub max_tokens: Option<u64>,
    pub mcp_servers: Option<Vec<Value>>,
    pub builtin_tools: Option<Vec<Value>>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: ModelSpecifier) -> Self {
        Self {
            prompt: prompt.into(),
            model,
            max_tokens: None,
            mcp_servers: None,
            builtin_tools: None,
        }
    }
}

/// Configuration for a provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name (e.g., "openai", "anthropic")
    pub name: String,
    /// API endpoint URL (if applicable)
    pub endpoint: Option<String>,
    /// API key or authentication token
    pub api_key: Option<String>,
    /// Model to use
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Maximum retries for failed requests
    pub max_retries: Option<u32>,
    /// Provider-specific configuration
    pub custom_config: HashMap<String, Value>,
}

impl ProviderConfig {
    /// Create a new provider configuration.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            endpoint: None,
            api_key: None,
            timeout_secs: Some(30),
            max_retries: Some(3),
            custom_config: HashMap::new(),
        }
    }

    /// Load configuration from environment variables
    /// (`RECIPEFLOW_<NAME>_API_KEY`, `_ENDPOINT`, `_MODEL`, `_TIMEOUT`).
    #[must_use]
    pub fn from_env(name: &str) -> Self {
        let env_prefix = format!("RECIPEFLOW_{}_", name.to_uppercase().replace('-', "_"));

        let mut config = Self::new(name, "default");
        config.api_key = std::env::var(format!("{env_prefix}API_KEY")).ok();
        config.endpoint = std::env::var(format!("{env_prefix}ENDPOINT")).ok();
        if let Ok(model) = std::env::var(format!("{env_prefix}MODEL")) {
            config.model = model;
        }
        config.timeout_secs = std::env::var(format!("{env_prefix}TIMEOUT"))
            .ok()
            .and_then(|s| s.parse().ok())
            .or(config.timeout_secs);
        config
    }
}

/// Trait for LLM provider implementations.
///
/// Providers are black boxes to the executor: they take a prompt and
/// return generated text. Structured-output coercion happens above this
/// seam, in the `llm_generate` step.
#[async_trait]
pub trait ProviderInstance: Send + Sync {
    /// Execute a generation request, returning the raw model text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Provider name
    fn name(&self) -> &str;
}

impl std::fmt::Debug for dyn ProviderInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderInstance").field("name", &self.name()).finish()
    }
}

/// Factory function type for creating provider instances
pub type ProviderFactory =
    Box<dyn Fn(ProviderConfig) -> Result<Box<dyn ProviderInstance>> + Send + Sync>;

/// Registry of provider factories plus lazily-created instances.
///
/// Factories are registered once at startup; instances are created on
/// first use (configured from the environment) and cached per provider
/// name. Tests register ready-made instances directly.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
    instances: RwLock<HashMap<String, Arc<dyn ProviderInstance>>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory under a name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(ProviderConfig) -> Result<Box<dyn ProviderInstance>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Register a ready-made instance under a name.
    pub fn register_instance(&self, name: impl Into<String>, instance: Arc<dyn ProviderInstance>) {
        self.instances.write().insert(name.into(), instance);
    }

    /// Resolve the provider for a model specifier, instantiating it from
    /// its factory on first use.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Provider` when the specifier has no provider
    /// segment or the provider is unknown.
    pub fn resolve(&self, spec: &ModelSpecifier) -> Result<Arc<dyn ProviderInstance>> {
        let provider = spec.provider.as_deref().ok_or_else(|| RecipeError::Provider {
            message: format!("model '{spec}' does not name a provider"),
            provider: None,
        })?;

        if let Some(instance) = self.instances.read().get(provider) {
            return Ok(Arc::clone(instance));
        }

        let factory = self.factories.get(provider).ok_or_else(|| RecipeError::Provider {
            message: format!("unknown provider '{provider}'"),
            provider: Some(provider.to_string()),
        })?;

        debug!(provider = %provider, model = %spec.model, "instantiating provider");
        let mut config = ProviderConfig::from_env(provider);
        config.model = spec.model.clone();
        let instance: Arc<dyn ProviderInstance> = Arc::from(factory(config)?);
        self.instances
            .write()
            .insert(provider.to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Whether a provider name is resolvable (factory or instance).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name) || self.instances.read().contains_key(name)
    }
}
