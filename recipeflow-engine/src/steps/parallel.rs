//! ABOUTME: parallel step: independent substep fan-out on context clones
//! ABOUTME: Bounded concurrency, staggered launches, always fail-fast, no merge-back

use async_trait::async_trait;
use recipeflow_core::{Context, RecipeError, Result, StepSpec};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::executor::Executor;
use crate::step::{parse_config, Step};

#[derive(Debug, Clone, Deserialize)]
struct ParallelConfig {
    substeps: Vec<StepSpec>,
    #[serde(default)]
    max_concurrency: usize,
    #[serde(default)]
    delay: f64,
}

/// Runs each substep concurrently on its own fresh clone of the parent
/// context. `max_concurrency` of 0 (the default) launches everything at
/// once; positive values bound the number in flight. `delay` seconds pass
/// between launches.
///
/// Parallel is for independent work: clones are discarded on success and
/// nothing merges back into the parent. Failure is always fail-fast: the
/// first error cancels every sibling, cancellations are drained, and the
/// error (already wrapped with the substep's index and type) is re-raised.
#[derive(Debug)]
pub struct ParallelStep {
    config: ParallelConfig,
}

impl ParallelStep {
    pub fn from_config(config: &Value) -> Result<Self> {
        Ok(Self {
            config: parse_config("parallel", config)?,
        })
    }
}

#[async_trait]
impl Step for ParallelStep {
    async fn execute(&self, ctx: &mut Context, exec: &Executor) -> Result<()> {
        let total = self.config.substeps.len();
        if total == 0 {
            return Ok(());
        }
        debug!(
            substeps = total,
            max_concurrency = self.config.max_concurrency,
            "parallel fan-out starting"
        );

        let permits = if self.config.max_concurrency == 0 {
            total
        } else {
            self.config.max_concurrency
        };
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        for (index, spec) in self.config.substeps.iter().enumerate() {
            if index > 0 && self.config.delay > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(self.config.delay)).await;
            }
            let exec = exec.clone();
            let spec = spec.clone();
            let mut scratch = ctx.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit =
                    semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| RecipeError::Internal {
                            message: "parallel semaphore closed".to_string(),
                        })?;
                exec.run_step(index, &spec, &mut scratch).await
                // scratch is dropped here: no merge-back into the parent.
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(error = %e, "parallel substep failed, cancelling siblings");
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(e);
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        continue;
                    }
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(RecipeError::Internal {
                        message: format!("parallel substep task failed: {join_err}"),
                    });
                }
            }
        }
        debug!(substeps = total, "parallel fan-out finished");
        Ok(())
    }
}
