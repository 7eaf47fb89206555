//! Text generation: backend client and prompt templates.

pub mod client;
pub mod prompts;

pub use client::{
    GenerationOptions, GenerationRequest, LlmClient, LlmConfig, LlmError, RetryPolicy,
    RetryingGenerator, TextGenerator,
};
pub use prompts::{PromptBuilder, PromptTemplates, TemplateError, TemplateKind};
