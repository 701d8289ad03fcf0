//! Query Decomposition
//!
//! Splits a research query into a bounded list of [`SubTask`]s.
//!
//! Two strategies:
//!
//! 1. **Primary** - an external [`DecompositionCapability`] (usually an LLM
//!    asked for structured output) proposes `{query, focus, reasoning}` triples
//! 2. **Heuristic** - a deterministic lexical classifier that always works
//!
//! When the primary capability reports a schema, transport, or timeout error,
//! the decomposer substitutes the heuristic and says why in the returned
//! [`DecompositionStrategy::Fallback`], so the caller can record it.

use crate::types::CapabilityError;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Focus tags produced by the heuristic strategy.
pub mod focus {
    /// Comparison between alternatives ("compare", "vs").
    pub const COMPARATIVE: &str = "comparative";
    /// Procedures and implementation details ("how", "steps").
    pub const TECHNICAL: &str = "technical";
    /// Concepts and background; the default bucket.
    pub const CONCEPTUAL: &str = "conceptual";
    /// Used when the primary strategy leaves the focus blank.
    pub const GENERAL: &str = "general";
}

const COMPARATIVE_CUES: &[&str] = &[
    "compare",
    "compared",
    "comparing",
    "comparison",
    "vs",
    "versus",
    "difference",
    "differences",
    "differ",
    "tradeoff",
    "tradeoffs",
];

const TECHNICAL_CUES: &[&str] = &[
    "how",
    "steps",
    "step",
    "implement",
    "implementation",
    "install",
    "configure",
    "configuration",
    "setup",
    "deploy",
    "build",
    "procedure",
    "tutorial",
    "integrate",
];

// ============================================================================
// Types
// ============================================================================

/// One decomposed unit of the original query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    /// The query a worker should answer.
    pub query: String,
    /// Focus/specialization tag used to route the sub-task.
    pub focus: String,
    /// Why this sub-task exists.
    pub rationale: String,
}

/// A sub-task as proposed by the structured decomposition capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProposedSubTask {
    /// Self-contained query for a retrieval worker.
    pub query: String,
    /// Short focus tag, e.g. "conceptual", "technical", "comparative".
    pub focus: String,
    /// One sentence on why the sub-task helps answer the original query.
    pub reasoning: String,
}

/// Input to a decomposition.
#[derive(Debug, Clone, Serialize)]
pub struct DecompositionRequest {
    pub query: String,
    pub objective: String,
    pub constraints: Vec<String>,
    pub max_subtasks: usize,
    /// Steps of the plan driving this decomposition.
    pub plan_steps: Vec<String>,
    /// Plan revision; greater than zero after a reflection.
    pub revision: u32,
    /// Remedy chosen by the reflection that produced this revision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<String>,
}

/// Structured decomposition capability, implemented outside the core.
#[async_trait]
pub trait DecompositionCapability: Send + Sync {
    /// Propose sub-tasks for `request`.
    async fn request_decomposition(
        &self,
        request: &DecompositionRequest,
    ) -> Result<Vec<ProposedSubTask>, CapabilityError>;
}

/// Which strategy produced a decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DecompositionStrategy {
    /// The structured capability answered with usable sub-tasks.
    Primary,
    /// No capability is configured; the heuristic is the only strategy.
    Heuristic,
    /// The capability failed and the heuristic was substituted.
    Fallback { reason: String },
}

/// Sub-tasks plus the strategy that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub subtasks: Vec<SubTask>,
    pub strategy: DecompositionStrategy,
}

impl Decomposition {
    /// The failure that forced the heuristic, if any.
    pub fn fallback_reason(&self) -> Option<&str> {
        match &self.strategy {
            DecompositionStrategy::Fallback { reason } => Some(reason),
            DecompositionStrategy::Primary | DecompositionStrategy::Heuristic => None,
        }
    }
}

// ============================================================================
// Decomposer
// ============================================================================

/// Decomposes queries, preferring the structured capability when one is set.
#[derive(Clone)]
pub struct QueryDecomposer {
    capability: Option<Arc<dyn DecompositionCapability>>,
    timeout: Duration,
}

impl QueryDecomposer {
    /// Decomposer backed by a structured capability with a call timeout.
    pub fn new(capability: Arc<dyn DecompositionCapability>, timeout: Duration) -> Self {
        Self {
            capability: Some(capability),
            timeout,
        }
    }

    /// Decomposer that only uses the heuristic strategy.
    pub fn heuristic_only() -> Self {
        Self {
            capability: None,
            timeout: Duration::ZERO,
        }
    }

    /// Produce between 1 and `request.max_subtasks` sub-tasks.
    ///
    /// Never fails: every capability error is converted into a heuristic
    /// fallback carrying the error text.
    pub async fn decompose(&self, request: &DecompositionRequest) -> Decomposition {
        let max = request.max_subtasks.max(1);

        let Some(capability) = &self.capability else {
            return Decomposition {
                subtasks: Self::heuristic_for(request, max),
                strategy: DecompositionStrategy::Heuristic,
            };
        };

        let primary = match timeout(self.timeout, capability.request_decomposition(request)).await
        {
            Ok(Ok(proposed)) => Self::accept(proposed, max),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CapabilityError::Timeout(self.timeout)),
        };

        match primary {
            Ok(subtasks) => Decomposition {
                subtasks,
                strategy: DecompositionStrategy::Primary,
            },
            Err(e) => {
                tracing::warn!("Structured decomposition failed, using heuristic: {}", e);
                Decomposition {
                    subtasks: Self::heuristic_for(request, max),
                    strategy: DecompositionStrategy::Fallback {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }

    /// Turn proposals into sub-tasks. Blank queries are dropped, blank focus
    /// tags become [`focus::GENERAL`], and the list is truncated to `max`.
    fn accept(proposed: Vec<ProposedSubTask>, max: usize) -> Result<Vec<SubTask>, CapabilityError> {
        let subtasks: Vec<SubTask> = proposed
            .into_iter()
            .filter(|p| !p.query.trim().is_empty())
            .take(max)
            .map(|p| {
                let focus = p.focus.trim().to_lowercase();
                SubTask {
                    query: p.query.trim().to_string(),
                    focus: if focus.is_empty() {
                        focus::GENERAL.to_string()
                    } else {
                        focus
                    },
                    rationale: p.reasoning.trim().to_string(),
                }
            })
            .collect();

        if subtasks.is_empty() {
            return Err(CapabilityError::Schema(
                "decomposition returned no usable sub-tasks".to_string(),
            ));
        }
        Ok(subtasks)
    }

    /// Deterministic lexical decomposition.
    ///
    /// Cue-matched buckets come first in a fixed order (comparative, then
    /// technical), followed by the conceptual bucket; the result is truncated
    /// to `max_subtasks` (at least one).
    pub fn heuristic(query: &str, max_subtasks: usize) -> Vec<SubTask> {
        let query = query.trim();
        let words: HashSet<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();
        let has_cue = |cues: &[&str]| cues.iter().any(|cue| words.contains(*cue));

        let mut buckets = Vec::new();
        if has_cue(COMPARATIVE_CUES) {
            buckets.push(focus::COMPARATIVE);
        }
        if has_cue(TECHNICAL_CUES) {
            buckets.push(focus::TECHNICAL);
        }
        buckets.push(focus::CONCEPTUAL);

        buckets
            .into_iter()
            .take(max_subtasks.max(1))
            .map(|bucket| Self::heuristic_subtask(query, bucket))
            .collect()
    }

    /// Heuristic decomposition that follows the request's plan revision.
    ///
    /// Focus tags are those of [`heuristic`](Self::heuristic). After a
    /// reflection each query and rationale also carries the revision and its
    /// remedy, so a replan never re-sends the previous cycle's sub-tasks.
    fn heuristic_for(request: &DecompositionRequest, max_subtasks: usize) -> Vec<SubTask> {
        let mut subtasks = Self::heuristic(&request.query, max_subtasks);
        if request.revision == 0 {
            return subtasks;
        }

        let adjustment = request
            .adjustment
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or("Take a different angle than the previous attempt");
        for subtask in &mut subtasks {
            subtask.query = format!(
                "{} (revision {}: {})",
                subtask.query, request.revision, adjustment
            );
            subtask.rationale = format!(
                "{}; revised after an unsuccessful cycle",
                subtask.rationale
            );
        }
        subtasks
    }

    fn heuristic_subtask(query: &str, bucket: &str) -> SubTask {
        let (rephrased, rationale) = match bucket {
            focus::COMPARATIVE => (
                format!(
                    "Compare the alternatives in \"{}\" and identify their key differences",
                    query
                ),
                "The query asks for a comparison",
            ),
            focus::TECHNICAL => (
                format!(
                    "Explain the steps and technical details involved in \"{}\"",
                    query
                ),
                "The query asks how something is done",
            ),
            _ => (
                format!("Explain the core concepts and background of \"{}\"", query),
                "Every answer needs the underlying concepts",
            ),
        };

        SubTask {
            query: rephrased,
            focus: bucket.to_string(),
            rationale: rationale.to_string(),
        }
    }
}
