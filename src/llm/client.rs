//! LLM client abstraction
//!
//! Concrete provider transports live outside this crate; the structured
//! capabilities in [`crate::llm::structured`] only need plain text generation.

use crate::types::Result;
use async_trait::async_trait;

/// Generic LLM client trait for provider abstraction
///
/// Implement this for any provider (OpenAI, Ollama, a test double) to back
/// the LLM decomposer and synthesizer.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion from a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with system prompt
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}
