//! Multi-Agent Research Orchestration
//!
//! This module coordinates specialized retrieval workers to answer a research
//! query: the query is decomposed into sub-tasks, the sub-tasks are dispatched
//! to workers, progress is validated, and the results are synthesized into one
//! answer. Every decision is recorded in a [`crate::reasoning::ReasoningLedger`].
//!
//! # Architecture
//!
//! - [`coordinator::ResearchOrchestrator`] - The state machine driving a run
//! - [`decomposer::QueryDecomposer`] - Structured decomposition with a
//!   heuristic fallback
//! - [`dispatch::Dispatcher`] - Parallel or sequential worker execution with
//!   per-worker and per-phase deadlines
//! - [`synthesizer::Synthesizer`] - Attributed synthesis with a concatenation
//!   fallback
//!
//! # Usage
//!
//! ```ignore
//! use ares_reasoning::research::{OrchestratorConfig, ResearchOrchestrator, ResearchRequest};
//!
//! let orchestrator = ResearchOrchestrator::new(OrchestratorConfig::default(), registry)?
//!     .with_decomposition(decomposer)
//!     .with_synthesis(synthesizer);
//!
//! let result = orchestrator
//!     .run_research(ResearchRequest::new("What is Zep?"))
//!     .await?;
//!
//! println!("{}", result.output);
//! println!("{}", orchestrator.render_trace());
//! ```
//!
//! # Research Workflow
//!
//! 1. **Init** - Record the request
//! 2. **Fact Gathering** - Split context into given, recalled, and assumed
//! 3. **Planning** - Create or revise the plan, then decompose the query
//! 4. **Executing** - Dispatch sub-tasks and join their outcomes
//! 5. **Validating** - Decide between synthesis, reflection, and failure
//! 6. **Reflecting** - Record the root cause and derive a new plan (bounded)
//! 7. **Synthesizing** - Combine successful outcomes into the answer

/// Orchestration state machine and run results.
pub mod coordinator;
/// Query decomposition strategies.
pub mod decomposer;
/// Worker dispatch policies.
pub mod dispatch;
/// Outcome synthesis.
pub mod synthesizer;

pub use coordinator::{
    OrchestrationResult, OrchestratorConfig, OrchestratorState, ResearchOrchestrator,
    ResearchRequest, RunStatus,
};
pub use decomposer::{
    Decomposition, DecompositionCapability, DecompositionRequest, DecompositionStrategy,
    ProposedSubTask, QueryDecomposer, SubTask,
};
pub use dispatch::{DispatchPolicy, Dispatcher, ExecutionMode};
pub use synthesizer::{
    Synthesis, SynthesisCapability, SynthesisRequest, SynthesisStrategy, Synthesizer,
    NO_SUCCESSFUL_RESULTS,
};
