//! Result Synthesis
//!
//! Merges sub-agent outcomes into one answer. The primary path asks a
//! [`SynthesisCapability`] for an attributed answer; the fallback is a
//! deterministic concatenation of successful outputs labelled by focus tag.
//! Synthesis never returns an empty string.

use crate::agents::SubagentOutcome;
use crate::research::decomposer::SubTask;
use crate::types::CapabilityError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Prefix of the message returned when no sub-task succeeded.
pub const NO_SUCCESSFUL_RESULTS: &str = "No successful sub-results";

/// Input to the synthesis capability. Only successful outcomes are included.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisRequest {
    pub query: String,
    pub objective: String,
    pub subtasks: Vec<SubTask>,
    pub outcomes: Vec<SubagentOutcome>,
}

/// Natural-language synthesis capability, implemented outside the core.
#[async_trait]
pub trait SynthesisCapability: Send + Sync {
    /// Combine the outcomes into one answer that says which sub-task
    /// contributed what, keeping conflicting claims with their attribution.
    async fn request_synthesis(&self, request: &SynthesisRequest)
        -> Result<String, CapabilityError>;
}

/// How the final answer was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SynthesisStrategy {
    /// The capability produced the answer.
    Primary,
    /// No capability is configured; outputs were concatenated.
    Concatenation,
    /// The capability failed or there was nothing to send it.
    Fallback { reason: String },
}

/// A synthesized answer and its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub text: String,
    pub strategy: SynthesisStrategy,
    /// Number of successful outcomes the answer is built from.
    pub sources: usize,
}

impl Synthesis {
    pub fn fallback_reason(&self) -> Option<&str> {
        match &self.strategy {
            SynthesisStrategy::Fallback { reason } => Some(reason),
            SynthesisStrategy::Primary | SynthesisStrategy::Concatenation => None,
        }
    }
}

#[derive(Clone)]
pub struct Synthesizer {
    capability: Option<Arc<dyn SynthesisCapability>>,
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(capability: Arc<dyn SynthesisCapability>, timeout: Duration) -> Self {
        Self {
            capability: Some(capability),
            timeout,
        }
    }

    /// Synthesizer that always concatenates.
    pub fn concatenating() -> Self {
        Self {
            capability: None,
            timeout: Duration::ZERO,
        }
    }

    pub async fn synthesize(
        &self,
        query: &str,
        objective: &str,
        subtasks: &[SubTask],
        outcomes: &[SubagentOutcome],
    ) -> Synthesis {
        let successful: Vec<SubagentOutcome> =
            outcomes.iter().filter(|o| o.succeeded()).cloned().collect();

        if successful.is_empty() {
            return Synthesis {
                text: Self::concatenate(outcomes),
                strategy: SynthesisStrategy::Fallback {
                    reason: format!("all {} sub-task(s) failed", outcomes.len()),
                },
                sources: 0,
            };
        }

        let Some(capability) = &self.capability else {
            return Synthesis {
                text: Self::concatenate(outcomes),
                strategy: SynthesisStrategy::Concatenation,
                sources: successful.len(),
            };
        };

        let sources = successful.len();
        let request = SynthesisRequest {
            query: query.to_string(),
            objective: objective.to_string(),
            subtasks: subtasks.to_vec(),
            outcomes: successful,
        };

        let primary = match timeout(self.timeout, capability.request_synthesis(&request)).await {
            Ok(Ok(text)) if text.trim().is_empty() => Err(CapabilityError::Schema(
                "synthesis returned an empty answer".to_string(),
            )),
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CapabilityError::Timeout(self.timeout)),
        };

        match primary {
            Ok(text) => Synthesis {
                text: text.trim().to_string(),
                strategy: SynthesisStrategy::Primary,
                sources,
            },
            Err(e) => {
                tracing::warn!("Synthesis capability failed, concatenating results: {}", e);
                Synthesis {
                    text: Self::concatenate(outcomes),
                    strategy: SynthesisStrategy::Fallback {
                        reason: e.to_string(),
                    },
                    sources,
                }
            }
        }
    }

    /// Deterministic fallback: each successful output labelled by its focus,
    /// in dispatch order. With no successes, an explicit failure message that
    /// lists what went wrong.
    pub fn concatenate(outcomes: &[SubagentOutcome]) -> String {
        let sections: Vec<String> = outcomes
            .iter()
            .filter(|o| o.succeeded())
            .map(|o| format!("[{}] {}", o.subtask.focus, o.output.trim()))
            .collect();

        if !sections.is_empty() {
            return sections.join("\n\n");
        }

        let mut message = format!(
            "{}: all {} sub-task(s) failed.",
            NO_SUCCESSFUL_RESULTS,
            outcomes.len()
        );
        for outcome in outcomes {
            message.push_str(&format!(
                "\n- [{}] {}",
                outcome.subtask.focus,
                outcome.error.as_deref().unwrap_or("unknown error")
            ));
        }
        message
    }
}
