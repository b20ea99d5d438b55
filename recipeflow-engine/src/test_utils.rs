//! ABOUTME: Test utilities and mock steps for engine testing
//! ABOUTME: Failure injection, sleep/gauge steps and executor builders

use async_trait::async_trait;
use recipeflow_core::{Context, RecipeError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::executor::Executor;
use crate::registry::{StepDeps, StepRegistry};
use crate::step::{parse_config, Step};

/// An executor over the built-in steps with default (empty) dependencies.
#[must_use]
pub fn bare_executor() -> Executor {
    Executor::new(Arc::new(StepRegistry::with_builtins(StepDeps::default())))
}

/// An executor over the built-in steps plus the `test_fail`, `test_sleep`
/// and `test_gauge` helpers below.
#[must_use]
pub fn test_executor(gauge: Arc<ConcurrencyGauge>) -> Executor {
    let mut registry = StepRegistry::with_builtins(StepDeps::default());
    register_test_steps(&mut registry, gauge);
    Executor::new(Arc::new(registry))
}

/// Register the test-only step types on a registry.
pub fn register_test_steps(registry: &mut StepRegistry, gauge: Arc<ConcurrencyGauge>) {
    registry.register("test_fail", |config| {
        Ok(Box::new(FailStep::from_config(config)?) as Box<dyn Step>)
    });
    registry.register("test_sleep", |config| {
        Ok(Box::new(SleepStep::from_config(config)?) as Box<dyn Step>)
    });
    registry.register("test_gauge", move |config| {
        Ok(Box::new(GaugeStep::from_config(config, Arc::clone(&gauge))?) as Box<dyn Step>)
    });
}

/// Tracks how many gauge steps run concurrently, and the peak.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of gauge steps that were in flight at once.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Deserialize)]
struct FailConfig {
    #[serde(default = "default_fail_message")]
    message: String,
}

fn default_fail_message() -> String {
    "injected failure".to_string()
}

/// A step that always fails with a configurable message.
#[derive(Debug)]
pub struct FailStep {
    config: FailConfig,
}

impl FailStep {
    pub fn from_config(config: &Value) -> Result<Self> {
        Ok(Self {
            config: parse_config("test_fail", config)?,
        })
    }
}

#[async_trait]
impl Step for FailStep {
    async fn execute(&self, _ctx: &mut Context, _exec: &Executor) -> Result<()> {
        Err(RecipeError::Internal {
            message: self.config.message.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SleepConfig {
    /// Millisecond count, or a template rendering to one.
    ms: Value,
    /// Artifact to set once the sleep finishes, for cancellation checks.
    #[serde(default)]
    mark: Option<String>,
}

/// A step that sleeps, then optionally marks an artifact.
#[derive(Debug)]
pub struct SleepStep {
    config: SleepConfig,
}

impl SleepStep {
    pub fn from_config(config: &Value) -> Result<Self> {
        Ok(Self {
            config: parse_config("test_sleep", config)?,
        })
    }

    fn duration_ms(&self, ctx: &Context) -> Result<u64> {
        let resolve_err = || RecipeError::StepConfig {
            step_type: "test_sleep".to_string(),
            message: format!("ms must resolve to an integer, got {}", self.config.ms),
            field: Some("ms".to_string()),
        };
        match &self.config.ms {
            Value::Number(n) => n.as_u64().ok_or_else(resolve_err),
            Value::String(template) => recipeflow_core::TemplateRenderer::new()
                .render_str(template, ctx)?
                .trim()
                .parse()
                .map_err(|_| resolve_err()),
            _ => Err(resolve_err()),
        }
    }
}

#[async_trait]
impl Step for SleepStep {
    async fn execute(&self, ctx: &mut Context, _exec: &Executor) -> Result<()> {
        let ms = self.duration_ms(ctx)?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        if let Some(mark) = &self.config.mark {
            ctx.set(mark.clone(), Value::Bool(true));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GaugeConfig {
    #[serde(default = "default_hold_ms")]
    hold_ms: u64,
}

fn default_hold_ms() -> u64 {
    50
}

/// A step that holds a concurrency gauge open while it runs.
#[derive(Debug)]
pub struct GaugeStep {
    config: GaugeConfig,
    gauge: Arc<ConcurrencyGauge>,
}

impl GaugeStep {
    pub fn from_config(config: &Value, gauge: Arc<ConcurrencyGauge>) -> Result<Self> {
        Ok(Self {
            config: parse_config("test_gauge", config)?,
            gauge,
        })
    }
}

#[async_trait]
impl Step for GaugeStep {
    async fn execute(&self, _ctx: &mut Context, _exec: &Executor) -> Result<()> {
        self.gauge.enter();
        tokio::time::sleep(Duration::from_millis(self.config.hold_ms)).await;
        self.gauge.exit();
        Ok(())
    }
}
