//! Append-only reasoning ledger
//!
//! The ledger is the single structured record of how a research run reasoned:
//! which facts it gathered, which plans it made, what the workers returned,
//! how validation judged progress, and why it replanned.
//!
//! Steps are immutable once appended and their insertion order is the causal
//! order of the run. The ledger never removes entries.
//!
//! # Example
//!
//! ```rust,ignore
//! use ares_reasoning::reasoning::{ReasoningLedger, ReasoningPhase};
//!
//! let mut ledger = ReasoningLedger::new();
//! ledger.append(ReasoningPhase::Init, "Research started", None, Some("gather facts".into()));
//!
//! assert_eq!(ledger.len(), 1);
//! assert!(!ledger.detect_loop(6));
//! println!("{}", ledger.render_trace());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Multiplier applied to confidence for every validation that reported a loop.
pub const LOOP_PENALTY: f64 = 0.75;

/// Default number of trailing steps inspected by loop detection.
pub const DEFAULT_LOOP_WINDOW: usize = 6;

/// Default number of identical `(phase, next_action)` pairs that count as a loop.
pub const DEFAULT_LOOP_THRESHOLD: usize = 3;

// ============================================================================
// Step Types
// ============================================================================

/// Phase of the reasoning cycle a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningPhase {
    /// Run initialization.
    Init,
    /// Separating given facts from recalled knowledge and assumptions.
    FactGathering,
    /// Building or rebuilding the plan and its sub-tasks.
    Planning,
    /// Dispatching sub-tasks and recording their outcomes.
    Execution,
    /// Judging progress against the original task.
    Validation,
    /// Root-cause analysis after an incomplete or looping validation.
    Reflection,
    /// Merging sub-task outcomes into the final answer.
    Synthesis,
}

impl ReasoningPhase {
    /// All phases in cycle order.
    pub const ALL: [ReasoningPhase; 7] = [
        ReasoningPhase::Init,
        ReasoningPhase::FactGathering,
        ReasoningPhase::Planning,
        ReasoningPhase::Execution,
        ReasoningPhase::Validation,
        ReasoningPhase::Reflection,
        ReasoningPhase::Synthesis,
    ];

    /// Stable snake_case tag, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningPhase::Init => "init",
            ReasoningPhase::FactGathering => "fact_gathering",
            ReasoningPhase::Planning => "planning",
            ReasoningPhase::Execution => "execution",
            ReasoningPhase::Validation => "validation",
            ReasoningPhase::Reflection => "reflection",
            ReasoningPhase::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for ReasoningPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable result attached to a step, when the step records one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    /// A sub-task or capability call succeeded.
    Success,
    /// A sub-task failed or timed out.
    Failure,
    /// A fallback path was substituted for a failed primary path.
    Fallback,
}

/// A single immutable entry in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// Zero-based sequence index; strictly increasing within a ledger.
    pub index: usize,
    /// Phase this step belongs to.
    pub phase: ReasoningPhase,
    /// Human-readable description of the step.
    pub content: String,
    /// What was observed while performing the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    /// The action the reasoner intends to take next.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
    /// Structured result for steps that summarize an outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepOutcome>,
    /// When the step was appended.
    pub timestamp: DateTime<Utc>,
}

/// Judgement recorded alongside every validation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether validation considered the task complete.
    pub completed: bool,
    /// Whether validation detected a reasoning loop.
    pub looping: bool,
}

/// Aggregate view of a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Total number of steps.
    pub step_count: usize,
    /// Number of steps per phase; every phase is present, possibly with zero.
    pub phase_counts: BTreeMap<ReasoningPhase, usize>,
    /// Ledger confidence in `[0, 1]`.
    pub confidence: f64,
}

// ============================================================================
// Ledger
// ============================================================================

/// Append-only log of reasoning steps for one orchestration run.
///
/// The ledger has exactly one writer. Concurrent workers never hold it; the
/// orchestrator appends their summaries after the join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningLedger {
    steps: Vec<ReasoningStep>,
    verdicts: Vec<Verdict>,
    loop_threshold: usize,
}

impl Default for ReasoningLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ReasoningLedger {
    /// Create an empty ledger with the default loop threshold.
    pub fn new() -> Self {
        Self::with_loop_threshold(DEFAULT_LOOP_THRESHOLD)
    }

    /// Create an empty ledger whose loop detector fires at `threshold` repeats.
    pub fn with_loop_threshold(threshold: usize) -> Self {
        Self {
            steps: Vec::new(),
            verdicts: Vec::new(),
            loop_threshold: threshold,
        }
    }

    /// Append a step and return a copy of it.
    pub fn append(
        &mut self,
        phase: ReasoningPhase,
        content: impl Into<String>,
        observations: Option<String>,
        next_action: Option<String>,
    ) -> ReasoningStep {
        self.push(phase, content.into(), observations, next_action, None)
    }

    /// Append a step that records the outcome of a sub-task or capability call.
    pub fn append_outcome(
        &mut self,
        phase: ReasoningPhase,
        content: impl Into<String>,
        observations: Option<String>,
        outcome: StepOutcome,
    ) -> ReasoningStep {
        self.push(phase, content.into(), observations, None, Some(outcome))
    }

    /// Append a validation step together with its verdict.
    ///
    /// Verdicts feed [`confidence`](Self::confidence).
    pub fn append_validation(
        &mut self,
        content: impl Into<String>,
        observations: Option<String>,
        next_action: Option<String>,
        verdict: Verdict,
    ) -> ReasoningStep {
        self.verdicts.push(verdict);
        self.push(
            ReasoningPhase::Validation,
            content.into(),
            observations,
            next_action,
            None,
        )
    }

    fn push(
        &mut self,
        phase: ReasoningPhase,
        content: String,
        observations: Option<String>,
        next_action: Option<String>,
        outcome: Option<StepOutcome>,
    ) -> ReasoningStep {
        let step = ReasoningStep {
            index: self.steps.len(),
            phase,
            content,
            observations,
            next_action,
            outcome,
            timestamp: Utc::now(),
        };
        tracing::trace!(index = step.index, phase = %step.phase, "ledger append");
        self.steps.push(step.clone());
        step
    }

    /// Read-only view of every step in causal order.
    pub fn history(&self) -> &[ReasoningStep] {
        &self.steps
    }

    /// Consume the ledger, returning its steps.
    pub fn into_steps(self) -> Vec<ReasoningStep> {
        self.steps
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no step has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The most recent step, if any.
    pub fn last(&self) -> Option<&ReasoningStep> {
        self.steps.last()
    }

    /// Steps appended after the most recent step of `phase`.
    ///
    /// Returns the whole history if no such step exists.
    pub fn tail_since(&self, phase: ReasoningPhase) -> &[ReasoningStep] {
        match self.steps.iter().rposition(|s| s.phase == phase) {
            Some(pos) => &self.steps[pos + 1..],
            None => &self.steps,
        }
    }

    /// Validation verdicts in the order they were recorded.
    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    /// Repeats needed before [`detect_loop`](Self::detect_loop) fires.
    pub fn loop_threshold(&self) -> usize {
        self.loop_threshold
    }

    /// Loop detection over the last `window` steps using the ledger's threshold.
    pub fn detect_loop(&self, window: usize) -> bool {
        self.detect_loop_with(window, self.loop_threshold)
    }

    /// True when the last `window` steps contain at least `threshold` steps
    /// with an identical `(phase, next_action)` pair.
    ///
    /// Steps without a `next_action` never count towards a loop.
    pub fn detect_loop_with(&self, window: usize, threshold: usize) -> bool {
        if window == 0 || threshold == 0 {
            return false;
        }

        let start = self.steps.len().saturating_sub(window);
        let mut counts: HashMap<(ReasoningPhase, &str), usize> = HashMap::new();
        for step in &self.steps[start..] {
            if let Some(action) = step.next_action.as_deref() {
                *counts.entry((step.phase, action.trim())).or_default() += 1;
            }
        }

        counts.values().any(|&count| count >= threshold)
    }

    /// Confidence in `[0, 1]`: the fraction of validations that completed,
    /// multiplied by [`LOOP_PENALTY`] for each validation that saw a loop.
    ///
    /// A ledger without validations has confidence `0.0`.
    pub fn confidence(&self) -> f64 {
        if self.verdicts.is_empty() {
            return 0.0;
        }

        let completed = self.verdicts.iter().filter(|v| v.completed).count();
        let looping = self.verdicts.iter().filter(|v| v.looping).count();
        let ratio = completed as f64 / self.verdicts.len() as f64;
        let penalty = LOOP_PENALTY.powi(looping as i32);

        (ratio * penalty).clamp(0.0, 1.0)
    }

    /// Step count, per-phase counts, and confidence.
    pub fn summary(&self) -> LedgerSummary {
        let mut phase_counts: BTreeMap<ReasoningPhase, usize> =
            ReasoningPhase::ALL.iter().map(|p| (*p, 0)).collect();
        for step in &self.steps {
            *phase_counts.entry(step.phase).or_default() += 1;
        }

        LedgerSummary {
            step_count: self.steps.len(),
            phase_counts,
            confidence: self.confidence(),
        }
    }

    /// Human-readable rendering of the whole trace.
    pub fn render_trace(&self) -> String {
        render_steps(&self.steps)
    }
}

/// Render steps as a numbered, indented text trace.
pub fn render_steps(steps: &[ReasoningStep]) -> String {
    let mut out = String::new();
    for step in steps {
        let label = match step.phase {
            ReasoningPhase::Init => "INIT",
            ReasoningPhase::FactGathering => "FACTS",
            ReasoningPhase::Planning => "PLAN",
            ReasoningPhase::Execution => "EXEC",
            ReasoningPhase::Validation => "VALIDATE",
            ReasoningPhase::Reflection => "REFLECT",
            ReasoningPhase::Synthesis => "SYNTH",
        };
        let marker = match step.outcome {
            Some(StepOutcome::Success) => " (ok)",
            Some(StepOutcome::Failure) => " (failed)",
            Some(StepOutcome::Fallback) => " (fallback)",
            None => "",
        };

        out.push_str(&format!(
            "{:>3}. [{}]{} {}\n",
            step.index + 1,
            label,
            marker,
            step.content
        ));
        if let Some(obs) = &step.observations {
            out.push_str(&format!("       observed: {}\n", obs));
        }
        if let Some(next) = &step.next_action {
            out.push_str(&format!("       next: {}\n", next));
        }
    }
    out
}
