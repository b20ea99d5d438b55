//! ABOUTME: Recipe executor and step implementations for rs-recipeflow
//! ABOUTME: Sequential dispatch, control-flow steps, file I/O, LLM and MCP steps

pub mod condition;
pub mod executor;
pub mod registry;
pub mod step;
pub mod steps;
pub mod test_utils;

// Re-export commonly used types
pub use executor::{Executor, ExecutorConfig, DEFAULT_MAX_RECURSION_DEPTH};
pub use registry::{StepDeps, StepFactory, StepRegistry};
pub use step::Step;
