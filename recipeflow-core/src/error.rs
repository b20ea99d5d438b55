//! ABOUTME: Error types and handling for rs-recipeflow
//! ABOUTME: Provides the RecipeError enum and Result type alias

use std::path::PathBuf;
use thiserror::Error;

/// Comprehensive error enum for all recipe operations.
///
/// Variants map one-to-one onto the failure classes of the execution model:
/// loading, per-step configuration, template rendering, condition
/// evaluation, file access, provider/tool dispatch and step execution
/// itself. `Execution` wraps the originating error together with the index
/// and type of the failing step so callers can identify the location
/// without losing the cause.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("Recipe load error: {message}")]
    Load {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration for step '{step_type}': {message}")]
    StepConfig {
        step_type: String,
        message: String,
        field: Option<String>,
    },

    #[error("Template error: {message}")]
    Template { message: String },

    #[error("Condition error in '{expression}': {message}")]
    Condition { expression: String, message: String },

    #[error("File error for '{}': {message}", path.display())]
    File {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Provider error: {message}")]
    Provider {
        message: String,
        provider: Option<String>,
    },

    #[error("Tool error: {message}")]
    Tool { message: String, tool: Option<String> },

    #[error("Step {step_index} ({step_type}) failed: {source}")]
    Execution {
        step_index: usize,
        step_type: String,
        #[source]
        source: Box<RecipeError>,
    },

    #[error("Recursion limit of {limit} exceeded at depth {depth}")]
    RecursionLimit { depth: usize, limit: usize },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RecipeError {
    /// Wrap an error as the failure of the step at `step_index`.
    #[must_use]
    pub fn at_step(self, step_index: usize, step_type: impl Into<String>) -> Self {
        Self::Execution {
            step_index,
            step_type: step_type.into(),
            source: Box::new(self),
        }
    }

    /// The innermost non-`Execution` error in the chain.
    #[must_use]
    pub fn root_cause(&self) -> &RecipeError {
        match self {
            Self::Execution { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, RecipeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_wrapping_preserves_cause() {
        let cause = RecipeError::Template {
            message: "unclosed variable".to_string(),
        };
        let wrapped = cause.at_step(3, "set_context");

        let text = wrapped.to_string();
        assert!(text.contains("Step 3"));
        assert!(text.contains("set_context"));
        assert!(text.contains("unclosed variable"));
    }

    #[test]
    fn test_root_cause_unwraps_nested_execution() {
        let cause = RecipeError::Condition {
            expression: "and(true)".to_string(),
            message: "expected two arguments".to_string(),
        };
        let wrapped = cause.at_step(0, "conditional").at_step(2, "loop");

        match wrapped.root_cause() {
            RecipeError::Condition { expression, .. } => {
                assert_eq!(expression, "and(true)");
            }
            other => panic!("unexpected root cause: {other}"),
        }
    }
}
