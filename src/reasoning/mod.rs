//! Structured Reasoning
//!
//! This module holds the auditable record of a research run and the
//! protocol that writes to it.
//!
//! # Architecture
//!
//! - [`ledger::ReasoningLedger`] - Append-only log of [`ledger::ReasoningStep`]s
//!   with loop detection and a confidence signal
//! - [`protocol::ReActProtocol`] - Gather facts, create a plan, validate
//!   progress, and reflect after failure; each call appends one step
//!
//! # Phases
//!
//! Every step is tagged with a [`ledger::ReasoningPhase`]:
//!
//! 1. **init** - Run started
//! 2. **fact_gathering** - Given facts, recalled knowledge, assumptions
//! 3. **planning** - Plan creation and sub-task decomposition
//! 4. **execution** - One summary per dispatched sub-task
//! 5. **validation** - Completion and loop judgement
//! 6. **reflection** - Root cause and a revised plan
//! 7. **synthesis** - Final answer assembly

/// Append-only reasoning ledger.
pub mod ledger;
/// Fact / plan / validate / reflect contracts.
pub mod protocol;

pub use ledger::{
    LedgerSummary, ReasoningLedger, ReasoningPhase, ReasoningStep, StepOutcome, Verdict,
};
pub use protocol::{Assessed, FactSheet, Plan, ReActProtocol, ValidationResult};
