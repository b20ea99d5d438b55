//! ABOUTME: Built-in step implementations
//! ABOUTME: Control flow (conditional/loop/parallel/execute_recipe/set_context), file I/O, LLM and MCP

pub mod conditional;
pub mod execute_recipe;
pub mod llm_generate;
pub mod loop_step;
pub mod mcp;
pub mod parallel;
pub mod read_files;
pub mod set_context;
pub mod write_files;
