//! ABOUTME: ModelSpecifier for parsing provider/model syntax
//! ABOUTME: Handles "provider/model" and "provider/model/deployment" forms

use recipeflow_core::error::{RecipeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Specification of a model: provider, model id, optional deployment.
///
/// Recipes reference models as `provider/model_id` with an optional third
/// segment naming a deployment (Azure-style hosted instances).
///
/// # Examples
///
/// ```
/// use recipeflow_providers::ModelSpecifier;
///
/// let spec = ModelSpecifier::parse("openai/gpt-4o").unwrap();
/// assert_eq!(spec.provider.as_deref(), Some("openai"));
/// assert_eq!(spec.model, "gpt-4o");
/// assert_eq!(spec.deployment, None);
///
/// let spec = ModelSpecifier::parse("azure/gpt-4o/prod-east").unwrap();
/// assert_eq!(spec.deployment.as_deref(), Some("prod-east"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpecifier {
    /// The provider name (e.g., "openai", "anthropic")
    pub provider: Option<String>,
    /// The model name (e.g., "gpt-4o", "claude-3-sonnet")
    pub model: String,
    /// Optional deployment name for hosted providers
    pub deployment: Option<String>,
}

impl ModelSpecifier {
    /// Create a specifier with just a model name.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            provider: None,
            model: model.into(),
            deployment: None,
        }
    }

    /// Create a specifier with provider and model.
    pub fn with_provider(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            model: model.into(),
            deployment: None,
        }
    }

    /// Parse a model specification string.
    ///
    /// Supported formats:
    /// - `"model"` (model only; the registry requires a provider segment)
    /// - `"provider/model"`
    /// - `"provider/model/deployment"`
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Validation` on an empty spec, empty segments,
    /// or more than three segments.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(RecipeError::Validation {
                message: "model specification cannot be empty".to_string(),
                field: Some("model".to_string()),
            });
        }

        let parts: Vec<&str> = spec.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(RecipeError::Validation {
                message: format!("model specification '{spec}' has an empty segment"),
                field: Some("model".to_string()),
            });
        }

        match parts.as_slice() {
            [model] => Ok(Self::new(*model)),
            [provider, model] => Ok(Self::with_provider(*provider, *model)),
            [provider, model, deployment] => Ok(Self {
                provider: Some((*provider).to_string()),
                model: (*model).to_string(),
                deployment: Some((*deployment).to_string()),
            }),
            _ => Err(RecipeError::Validation {
                message: format!(
                    "model specification '{spec}' has too many segments (expected provider/model[/deployment])"
                ),
                field: Some("model".to_string()),
            }),
        }
    }
}

impl fmt::Display for ModelSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "{provider}/")?;
        }
        write!(f, "{}", self.model)?;
        if let Some(deployment) = &self.deployment {
            write!(f, "/{deployment}")?;
        }
        Ok(())
    }
}
