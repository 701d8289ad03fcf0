//! # A.R.E.S Reasoning Core
//!
//! Multi-agent research orchestration with a structured, auditable record of
//! its own reasoning.
//!
//! A research query is decomposed into focused sub-tasks, the sub-tasks are
//! dispatched to specialized retrieval workers (in parallel or one after
//! another), progress is validated, failures trigger a bounded
//! reflect-and-replan cycle, and the successful results are synthesized into
//! one attributed answer. Every step lands in an append-only
//! [`ReasoningLedger`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ares_reasoning::{
//!     OrchestratorConfig, ResearchOrchestrator, ResearchRequest, SubagentRegistry,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SubagentRegistry::builder()
//!         .with_agent("technical", Arc::new(DocsAgent::new()))
//!         .with_default_agent(Arc::new(SearchAgent::new()))
//!         .build()?;
//!
//!     let orchestrator = ResearchOrchestrator::new(OrchestratorConfig::default(), registry)?;
//!     let result = orchestrator
//!         .run_research(ResearchRequest::new("What is Zep?"))
//!         .await?;
//!
//!     println!("{}", result.output);
//!     println!("{}", orchestrator.render_trace());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`reasoning`] - Reasoning ledger and the fact / plan / validate / reflect protocol
//! - [`research`] - Decomposition, dispatch, synthesis, and the orchestrator
//! - [`agents`] - Worker trait and the focus-based worker registry
//! - [`llm`] - LLM client trait and LLM-backed structured capabilities
//! - [`utils`] - `research.toml` configuration and tracing setup
//! - [`types`] - Error types
//!
//! Retrieval, embeddings, and provider transports are supplied by the caller
//! through the [`Subagent`] and [`LLMClient`] traits.

#![warn(rustdoc::missing_crate_level_docs)]

/// Research workers and routing.
pub mod agents;
/// LLM client abstraction and structured capabilities.
pub mod llm;
/// Reasoning ledger and protocol.
pub mod reasoning;
/// Research orchestration.
pub mod research;
/// Core error types.
pub mod types;
/// Configuration and logging utilities.
pub mod utils;

// Re-export commonly used types
pub use agents::{
    Subagent, SubagentContext, SubagentOutcome, SubagentRegistry, SubagentRegistryBuilder,
    SubagentResponse, SubagentStatus,
};
pub use llm::{LLMClient, LlmDecomposer, LlmSynthesizer};
pub use reasoning::{LedgerSummary, ReasoningLedger, ReasoningPhase, ReasoningStep};
pub use research::{
    ExecutionMode, OrchestrationResult, OrchestratorConfig, OrchestratorState,
    ResearchOrchestrator, ResearchRequest, RunStatus, SubTask,
};
pub use types::{AppError, CapabilityError, Result};
pub use utils::{init_tracing, ResearchConfig};
