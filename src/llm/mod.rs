//! LLM Client Abstractions
//!
//! The core never talks to a provider directly. It consumes the
//! [`LLMClient`] trait, and [`structured`] adapts any client into the
//! decomposition and synthesis capabilities used by the orchestrator.
//!
//! # Example
//!
//! ```ignore
//! use ares_reasoning::llm::{LlmDecomposer, LlmSynthesizer};
//!
//! let llm: Arc<dyn LLMClient> = Arc::new(my_provider_client);
//! let orchestrator = ResearchOrchestrator::new(config, registry)?
//!     .with_decomposition(Arc::new(LlmDecomposer::new(llm.clone())))
//!     .with_synthesis(Arc::new(LlmSynthesizer::new(llm)));
//! ```

/// Core LLM client trait.
pub mod client;
/// LLM-backed decomposition and synthesis.
pub mod structured;

pub use client::LLMClient;
pub use structured::{extract_json, LlmDecomposer, LlmSynthesizer};
