//! ABOUTME: conditional step: branch selection on an evaluated expression
//! ABOUTME: Runs the chosen branch on the same context; a missing branch is a no-op

use async_trait::async_trait;
use recipeflow_core::{Context, RecipeError, Result, StepSpec, TemplateRenderer};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::condition;
use crate::executor::Executor;
use crate::step::{parse_config, Step};

#[derive(Debug, Deserialize)]
struct BranchSpec {
    steps: Vec<StepSpec>,
}

#[derive(Debug, Deserialize)]
struct ConditionalConfig {
    condition: Value,
    if_true: Option<BranchSpec>,
    if_false: Option<BranchSpec>,
}

/// Branches on a rendered condition.
///
/// Conditional is a filter, not a fork: the chosen branch's steps run
/// sequentially against the same context, and their writes persist. When
/// the selected branch is absent the step does nothing.
#[derive(Debug)]
pub struct ConditionalStep {
    config: ConditionalConfig,
}

impl ConditionalStep {
    pub fn from_config(config: &Value) -> Result<Self> {
        Ok(Self {
            config: parse_config("conditional", config)?,
        })
    }

    fn evaluate_condition(&self, ctx: &Context) -> Result<bool> {
        match &self.config.condition {
            Value::Bool(b) => Ok(*b),
            Value::String(expr) => {
                let rendered = TemplateRenderer::new().render_str(expr, ctx)?;
                condition::evaluate(&rendered)
            }
            other => Err(RecipeError::StepConfig {
                step_type: "conditional".to_string(),
                message: format!("condition must be a string or boolean, got {other}"),
                field: Some("condition".to_string()),
            }),
        }
    }
}

#[async_trait]
impl Step for ConditionalStep {
    async fn execute(&self, ctx: &mut Context, exec: &Executor) -> Result<()> {
        let outcome = self.evaluate_condition(ctx)?;
        debug!(outcome, "conditional evaluated");

        let branch = if outcome {
            self.config.if_true.as_ref()
        } else {
            self.config.if_false.as_ref()
        };
        match branch {
            Some(branch) => exec.run_steps(&branch.steps, ctx).await,
            None => Ok(()),
        }
    }
}
