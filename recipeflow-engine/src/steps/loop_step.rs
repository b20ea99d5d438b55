//! ABOUTME: loop step: per-item iteration on context clones
//! ABOUTME: Sequential or bounded-concurrent, input-order aggregation, fail-fast or collect-errors

use async_trait::async_trait;
use recipeflow_core::{Context, RecipeError, Result, StepSpec, TemplateRenderer};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::executor::Executor;
use crate::step::{parse_config, Step};

fn default_concurrency() -> usize {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct LoopConfig {
    items: Value,
    item_key: String,
    substeps: Vec<StepSpec>,
    result_key: String,
    #[serde(default = "default_concurrency")]
    max_concurrency: usize,
    #[serde(default)]
    delay: f64,
    #[serde(default = "default_true")]
    fail_fast: bool,
}

/// Iterates substeps over a collection, each iteration on a fresh clone of
/// the context with the current item bound under `item_key` (and its
/// position under `__index__`).
///
/// `items` is a dotted artifact path, a JSON literal in a string, or an
/// inline sequence/mapping. Mapping iteration yields `{key, value}`
/// objects.
///
/// `max_concurrency` of 1 (the default) runs iterations strictly
/// sequentially; 0 means unlimited; larger values bound the number in
/// flight. `delay` seconds pass between launches.
///
/// Per-item results are collected under `result_key` in input order,
/// regardless of completion order. The collected value is what the
/// iteration's substeps wrote: their single changed artifact, a mapping of
/// all changed artifacts when there are several, or the item itself when
/// they wrote nothing.
///
/// With `fail_fast` (the default) the first failing iteration cancels its
/// siblings and re-raises. With `fail_fast: false` failures are recorded
/// under `"<result_key>__errors"` as `{index, item, error}` entries and the
/// loop completes.
#[derive(Debug)]
pub struct LoopStep {
    config: LoopConfig,
}

impl LoopStep {
    pub fn from_config(config: &Value) -> Result<Self> {
        Ok(Self {
            config: parse_config("loop", config)?,
        })
    }

    fn resolve_items(&self, ctx: &Context, renderer: &TemplateRenderer) -> Result<Vec<Value>> {
        let resolved = match &self.config.items {
            Value::String(s) => {
                let rendered = renderer.render_str(s, ctx)?;
                let key = rendered.trim().to_string();
                match ctx.dotted_get(&key) {
                    Some(found) => found.clone(),
                    None => serde_json::from_str(&key).map_err(|_| RecipeError::StepConfig {
                        step_type: "loop".to_string(),
                        message: format!(
                            "items '{key}' is neither an artifact path nor a JSON literal"
                        ),
                        field: Some("items".to_string()),
                    })?,
                }
            }
            inline @ (Value::Array(_) | Value::Object(_)) => {
                renderer.render_value(inline, ctx, false)?
            }
            other => {
                return Err(RecipeError::StepConfig {
                    step_type: "loop".to_string(),
                    message: format!("items must be a string or collection, got {other}"),
                    field: Some("items".to_string()),
                })
            }
        };

        match resolved {
            Value::Array(items) => Ok(items),
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(key, value)| json!({"key": key, "value": value}))
                .collect()),
            other => Err(RecipeError::StepConfig {
                step_type: "loop".to_string(),
                message: format!("items must resolve to a sequence or mapping, got {other}"),
                field: Some("items".to_string()),
            }),
        }
    }
}

#[async_trait]
impl Step for LoopStep {
    async fn execute(&self, ctx: &mut Context, exec: &Executor) -> Result<()> {
        let renderer = TemplateRenderer::new();
        let items = self.resolve_items(ctx, &renderer)?;
        let item_key = renderer.render_str(&self.config.item_key, ctx)?;
        let result_key = renderer.render_str(&self.config.result_key, ctx)?;

        let total = items.len();
        debug!(
            items = total,
            max_concurrency = self.config.max_concurrency,
            fail_fast = self.config.fail_fast,
            "loop starting"
        );
        if items.is_empty() {
            ctx.set(result_key, json!([]));
            return Ok(());
        }

        let substeps = Arc::new(self.config.substeps.clone());
        let mut results: Vec<Option<Value>> = vec![None; total];
        let mut errors: Vec<Value> = Vec::new();

        if self.config.max_concurrency == 1 {
            for (index, item) in items.into_iter().enumerate() {
                if index > 0 && self.config.delay > 0.0 {
                    tokio::time::sleep(Duration::from_secs_f64(self.config.delay)).await;
                }
                let outcome = run_iteration(
                    exec.clone(),
                    Arc::clone(&substeps),
                    ctx.clone(),
                    item.clone(),
                    item_key.clone(),
                    index,
                )
                .await;
                match outcome {
                    Ok(value) => results[index] = Some(value),
                    Err(e) if self.config.fail_fast => return Err(e),
                    Err(e) => {
                        warn!(index, error = %e, "loop iteration failed, continuing");
                        errors.push(iteration_error(index, item, &e));
                    }
                }
            }
        } else {
            let permits = if self.config.max_concurrency == 0 {
                total
            } else {
                self.config.max_concurrency
            };
            let semaphore = Arc::new(Semaphore::new(permits));
            let mut tasks: JoinSet<(usize, Value, Result<Value>)> = JoinSet::new();

            for (index, item) in items.into_iter().enumerate() {
                if index > 0 && self.config.delay > 0.0 {
                    tokio::time::sleep(Duration::from_secs_f64(self.config.delay)).await;
                }
                let exec = exec.clone();
                let substeps = Arc::clone(&substeps);
                let parent = ctx.clone();
                let item_key = item_key.clone();
                let semaphore = Arc::clone(&semaphore);
                tasks.spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return (
                                index,
                                item,
                                Err(RecipeError::Internal {
                                    message: "loop semaphore closed".to_string(),
                                }),
                            )
                        }
                    };
                    let outcome = run_iteration(
                        exec,
                        substeps,
                        parent,
                        item.clone(),
                        item_key,
                        index,
                    )
                    .await;
                    (index, item, outcome)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, _item, Ok(value))) => results[index] = Some(value),
                    Ok((index, item, Err(e))) => {
                        if self.config.fail_fast {
                            tasks.abort_all();
                            while tasks.join_next().await.is_some() {}
                            return Err(e);
                        }
                        warn!(index, error = %e, "loop iteration failed, continuing");
                        errors.push(iteration_error(index, item, &e));
                    }
                    Err(join_err) => {
                        if join_err.is_cancelled() {
                            continue;
                        }
                        tasks.abort_all();
                        while tasks.join_next().await.is_some() {}
                        return Err(RecipeError::Internal {
                            message: format!("loop iteration task failed: {join_err}"),
                        });
                    }
                }
            }
        }

        // Input-order aggregation: results are slotted by index, not by
        // completion order.
        let ordered: Vec<Value> = results.into_iter().flatten().collect();
        debug!(collected = ordered.len(), failed = errors.len(), "loop finished");
        ctx.set(result_key.clone(), Value::Array(ordered));
        if !errors.is_empty() {
            errors.sort_by_key(|entry| entry.get("index").and_then(Value::as_u64).unwrap_or(0));
            ctx.set(format!("{result_key}__errors"), Value::Array(errors));
        }
        Ok(())
    }
}

fn iteration_error(index: usize, item: Value, error: &RecipeError) -> Value {
    json!({
        "index": index,
        "item": item,
        "error": error.to_string(),
    })
}

/// Run one iteration's substeps on a clone of the parent context and
/// extract its result.
async fn run_iteration(
    exec: Executor,
    substeps: Arc<Vec<StepSpec>>,
    parent_clone: Context,
    item: Value,
    item_key: String,
    index: usize,
) -> Result<Value> {
    let mut scratch = parent_clone;
    scratch.set(item_key.clone(), item.clone());
    scratch.set("__index__", json!(index));

    let baseline = scratch.artifacts().clone();
    exec.run_steps(&substeps, &mut scratch).await?;
    Ok(extract_result(&scratch, &baseline, &item_key, item))
}

/// What an iteration contributes to `result_key`: the single artifact its
/// substeps changed, a mapping of all changed artifacts, or the item
/// itself when nothing was written.
fn extract_result(
    scratch: &Context,
    baseline: &HashMap<String, Value>,
    item_key: &str,
    item: Value,
) -> Value {
    let mut changed: Vec<(&String, &Value)> = scratch
        .artifacts()
        .iter()
        .filter(|(key, value)| {
            key.as_str() != item_key
                && key.as_str() != "__index__"
                && baseline.get(key.as_str()) != Some(*value)
        })
        .collect();
    changed.sort_by(|a, b| a.0.cmp(b.0));

    match changed.as_slice() {
        [] => item,
        [(_, value)] => (*value).clone(),
        many => Value::Object(
            many.iter()
                .map(|(key, value)| ((*key).clone(), (*value).clone()))
                .collect(),
        ),
    }
}
