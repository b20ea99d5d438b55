//! ABOUTME: LLM provider and MCP client abstractions for rs-recipeflow
//! ABOUTME: Black-box seams the engine's llm_generate and mcp steps dispatch through

pub mod abstraction;
pub mod mcp;
pub mod mock;
pub mod model_specifier;

pub use abstraction::{
    GenerationRequest, ProviderConfig, ProviderFactory, ProviderInstance, ProviderRegistry,
};
pub use mcp::{McpClient, McpServerConfig};
pub use model_specifier::ModelSpecifier;
