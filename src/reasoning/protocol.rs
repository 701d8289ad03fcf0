//! Fact / Plan / Validate / Reflect protocol
//!
//! Four request/response contracts layered on the [`ReasoningLedger`]. Each
//! call appends exactly one step of its phase and returns a typed result.
//! None of them talks to an external service: they are pure functions of
//! their arguments and the ledger content.

use crate::reasoning::ledger::{ReasoningLedger, ReasoningPhase, StepOutcome, Verdict};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Words ignored when extracting task keywords.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "what", "which", "who", "whom", "whose", "why",
    "how", "when", "where", "with", "about", "into", "from", "that", "this", "these", "those",
    "does", "did", "has", "have", "had", "can", "could", "should", "would", "will", "shall",
    "its", "their", "there", "than", "then", "them", "they", "our", "your", "you", "not", "but",
    "all", "any", "also", "use", "used", "using", "between", "explain", "describe", "tell",
];

/// Cues marking a context item as an unverified hypothesis. Matched as whole
/// lowercase words, so the month "May" is not a hedge.
const HEDGE_CUES: &[&str] = &[
    "assume", "assuming", "assumption", "probably", "likely", "might", "may", "maybe",
    "perhaps", "possibly", "presumably", "unverified",
];

/// Used when a plan is created without explicit resources.
pub const GENERIC_RESOURCE: &str = "general retrieval agents";

// ============================================================================
// Protocol Types
// ============================================================================

/// What is known before planning, split by provenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactSheet {
    /// Literals stated directly in the request context.
    pub given: Vec<String>,
    /// Background knowledge items.
    pub recalled: Vec<String>,
    /// Hypotheses that have not been verified.
    pub assumptions: Vec<String>,
}

impl FactSheet {
    /// Whether all three lists are empty.
    pub fn is_empty(&self) -> bool {
        self.given.is_empty() && self.recalled.is_empty() && self.assumptions.is_empty()
    }

    /// Add an assumption unless it is already present. Items are never removed.
    pub fn add_assumption(&mut self, assumption: impl Into<String>) {
        let assumption = assumption.into();
        if !self.assumptions.contains(&assumption) {
            self.assumptions.push(assumption);
        }
    }
}

/// A plan for one cycle. Replanning produces a new value; plans are never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// 0 for the initial plan, incremented by every reflection.
    pub revision: u32,
    /// What the plan is trying to achieve.
    pub objective: String,
    /// Ordered step descriptions; never empty.
    pub steps: Vec<String>,
    /// Resources the plan relies on.
    pub resources: Vec<String>,
    /// Remedy chosen by the reflection that produced this plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<String>,
}

/// A judgement together with the reason behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessed<T> {
    pub value: T,
    pub reason: String,
}

impl<T> Assessed<T> {
    fn new(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            reason: reason.into(),
        }
    }
}

/// Outcome of [`ReActProtocol::validate_progress`]. Lives for one cycle only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_completed: Assessed<bool>,
    pub is_looping: Assessed<bool>,
    pub next_instruction: Assessed<String>,
    /// Progress confidence in `[0, 1]`.
    pub confidence: f64,
}

impl ValidationResult {
    /// Whether the task is complete.
    pub fn completed(&self) -> bool {
        self.is_completed.value
    }

    /// Whether a reasoning loop was detected.
    pub fn looping(&self) -> bool {
        self.is_looping.value
    }

    /// A one-line reason suitable for reflection input.
    pub fn failure_reason(&self) -> String {
        if self.looping() {
            format!("{}; {}", self.is_completed.reason, self.is_looping.reason)
        } else {
            self.is_completed.reason.clone()
        }
    }
}

// ============================================================================
// Protocol
// ============================================================================

/// The ReAct protocol: owns the run's ledger and is its only writer.
#[derive(Debug, Clone)]
pub struct ReActProtocol {
    ledger: ReasoningLedger,
    loop_window: usize,
}

impl ReActProtocol {
    /// Wrap a ledger; `loop_window` is the trailing window used by validation.
    pub fn new(ledger: ReasoningLedger, loop_window: usize) -> Self {
        Self {
            ledger,
            loop_window,
        }
    }

    /// Read-only access to the ledger.
    pub fn ledger(&self) -> &ReasoningLedger {
        &self.ledger
    }

    /// Mutable access for phases outside the protocol (init, execution, synthesis).
    pub fn ledger_mut(&mut self) -> &mut ReasoningLedger {
        &mut self.ledger
    }

    /// Consume the protocol, returning the ledger.
    pub fn into_ledger(self) -> ReasoningLedger {
        self.ledger
    }

    /// Separate context-given literals from recalled knowledge and assumptions.
    ///
    /// Hedged items become assumptions; items with literals (digits, quotes) or
    /// sharing a keyword with the task are given; everything else is recalled.
    /// An empty context yields an empty sheet.
    pub fn gather_facts(&mut self, task: &str, context: &[String]) -> FactSheet {
        let keywords = keywords(task);
        let mut sheet = FactSheet::default();
        let mut seen = HashSet::new();

        for item in context {
            let item = item.trim();
            if item.is_empty() || !seen.insert(item.to_string()) {
                continue;
            }

            let lower = item.to_lowercase();
            if item.ends_with('?') || is_hedged(item) {
                sheet.assumptions.push(item.to_string());
            } else if has_literal(item) || keywords.iter().any(|k| lower.contains(k.as_str())) {
                sheet.given.push(item.to_string());
            } else {
                sheet.recalled.push(item.to_string());
            }
        }

        self.ledger.append(
            ReasoningPhase::FactGathering,
            format!("Gathered facts for: {}", task.trim()),
            Some(format!(
                "given={}, recalled={}, assumptions={}",
                sheet.given.len(),
                sheet.recalled.len(),
                sheet.assumptions.len()
            )),
            Some("create plan".to_string()),
        );

        sheet
    }

    /// Build the initial plan. Always has at least one step.
    pub fn create_plan(&mut self, objective: &str, resources: &[String]) -> Plan {
        let resources: Vec<String> = if resources.is_empty() {
            vec![GENERIC_RESOURCE.to_string()]
        } else {
            resources.to_vec()
        };

        let steps = vec![
            format!("Clarify the objective: {}", objective.trim()),
            "Decompose the query into focused sub-tasks".to_string(),
            format!("Dispatch sub-tasks to {}", resources.join(", ")),
            "Validate collected results against the objective".to_string(),
            "Synthesize a final answer with attribution".to_string(),
        ];

        let plan = Plan {
            revision: 0,
            objective: objective.trim().to_string(),
            steps,
            resources,
            adjustment: None,
        };

        self.ledger.append(
            ReasoningPhase::Planning,
            format!(
                "Created plan (revision {}) with {} steps",
                plan.revision,
                plan.steps.len()
            ),
            Some(format!("resources: {}", plan.resources.join(", "))),
            Some("decompose into sub-tasks".to_string()),
        );

        plan
    }

    /// Judge the current cycle (everything since the last planning step).
    ///
    /// Complete when at least one sub-task succeeded. Keyword coverage is read
    /// from the observations recorded on successful execution steps.
    pub fn validate_progress(&mut self, original_task: &str) -> ValidationResult {
        let evidence: Vec<String> = self
            .ledger
            .tail_since(ReasoningPhase::Planning)
            .iter()
            .filter(|s| s.outcome == Some(StepOutcome::Success))
            .filter_map(|s| s.observations.clone())
            .collect();
        self.judge(original_task, &evidence)
    }

    /// Like [`validate_progress`](Self::validate_progress), but keyword
    /// coverage is computed from `outputs`, the complete outputs of the
    /// cycle's successful sub-tasks, rather than the trace excerpts.
    pub fn validate_progress_with_outputs(
        &mut self,
        original_task: &str,
        outputs: &[String],
    ) -> ValidationResult {
        self.judge(original_task, outputs)
    }

    fn judge(&mut self, original_task: &str, outputs: &[String]) -> ValidationResult {
        let cycle = self.ledger.tail_since(ReasoningPhase::Planning);
        let mut successes = 0usize;
        let mut failures = 0usize;
        for step in cycle.iter().filter(|s| s.phase == ReasoningPhase::Execution) {
            match step.outcome {
                Some(StepOutcome::Success) => successes += 1,
                Some(StepOutcome::Failure) => failures += 1,
                Some(StepOutcome::Fallback) | None => {}
            }
        }
        let evidence = outputs
            .iter()
            .map(|o| o.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");

        let total = successes + failures;
        let completed = successes > 0;
        let completed_reason = if total == 0 {
            "no sub-task results recorded since the last plan".to_string()
        } else if completed {
            format!("{} of {} sub-tasks succeeded", successes, total)
        } else {
            format!("no sub-task succeeded in this cycle ({} failed)", failures)
        };

        // Every incomplete validation issues a re-plan, so a run of them is the
        // same action repeated across cycles even though each cycle's steps differ.
        let stalled = if completed {
            0
        } else {
            1 + self
                .ledger
                .verdicts()
                .iter()
                .rev()
                .take(self.loop_window.saturating_sub(1))
                .filter(|v| !v.completed)
                .count()
        };
        let replan_loop = stalled > 0 && stalled >= self.ledger.loop_threshold();
        let step_loop = self.ledger.detect_loop(self.loop_window);
        let looping = step_loop || replan_loop;
        let looping_reason = if replan_loop {
            format!(
                "the re-plan instruction repeated in {} of the last {} validations",
                stalled, self.loop_window
            )
        } else if step_loop {
            format!(
                "the same action repeated within the last {} steps",
                self.loop_window
            )
        } else {
            format!("no repeated actions in the last {} steps", self.loop_window)
        };

        let next_instruction = if completed {
            Assessed::new(
                "synthesize the final answer".to_string(),
                "at least one sub-task produced a usable result",
            )
        } else if looping {
            Assessed::new(
                "change strategy and re-plan with a different sub-task focus".to_string(),
                "repeated actions are not producing new information",
            )
        } else {
            Assessed::new(
                "reflect on failures and re-plan".to_string(),
                completed_reason.clone(),
            )
        };

        let task_keywords = keywords(original_task);
        let coverage = if successes == 0 {
            0.0
        } else if task_keywords.is_empty() {
            1.0
        } else {
            let hits = task_keywords
                .iter()
                .filter(|k| evidence.contains(k.as_str()))
                .count();
            hits as f64 / task_keywords.len() as f64
        };
        let ratio = if total == 0 {
            0.0
        } else {
            successes as f64 / total as f64
        };
        let confidence = (0.5 * ratio + 0.5 * coverage).clamp(0.0, 1.0);

        let result = ValidationResult {
            is_completed: Assessed::new(completed, completed_reason),
            is_looping: Assessed::new(looping, looping_reason),
            next_instruction,
            confidence,
        };

        self.ledger.append_validation(
            format!(
                "Validated progress: completed={}, looping={}",
                result.completed(),
                result.looping()
            ),
            Some(format!(
                "{}; confidence {:.2}",
                result.is_completed.reason, result.confidence
            )),
            Some(result.next_instruction.value.clone()),
            Verdict {
                completed: result.completed(),
                looping: result.looping(),
            },
        );

        result
    }

    /// Record a root-cause reflection and derive a new plan from `previous`.
    ///
    /// The new plan's first step names the revision, so its step list always
    /// differs from the previous plan's.
    pub fn reflect_and_adjust(&mut self, previous: &Plan, failure_reason: &str) -> Plan {
        let revision = previous.revision + 1;
        let lower = failure_reason.to_lowercase();
        let (root_cause, remedy) = if lower.contains("timed out") || lower.contains("timeout") {
            (
                "workers exceeded their time budget",
                "Narrow sub-task scope so workers finish within the time budget",
            )
        } else if lower.contains("repeated") || lower.contains("loop") {
            (
                "the same action is being repeated without new information",
                "Change sub-task focus instead of repeating the previous dispatch",
            )
        } else {
            (
                "sub-tasks did not produce usable results",
                "Rephrase failed sub-tasks before dispatching again",
            )
        };

        let mut steps = vec![
            format!("Revision {}: address {}", revision, failure_reason.trim()),
            remedy.to_string(),
        ];
        steps.extend(
            previous
                .steps
                .iter()
                .filter(|s| !s.starts_with("Revision ") && s.as_str() != remedy)
                .cloned(),
        );

        self.ledger.append(
            ReasoningPhase::Reflection,
            format!("Reflecting on failure: {}", failure_reason.trim()),
            Some(format!("root cause: {}", root_cause)),
            Some(format!("replan (revision {})", revision)),
        );

        Plan {
            revision,
            objective: previous.objective.clone(),
            steps,
            resources: previous.resources.clone(),
            adjustment: Some(remedy.to_string()),
        }
    }
}

/// Lowercased content words of `text`, deduplicated in order of appearance.
pub(crate) fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn is_hedged(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|word| match word {
        "may" => true,
        "May" => false,
        _ => HEDGE_CUES.contains(&word.to_lowercase().as_str()),
    })
}

fn has_literal(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit() || c == '"' || c == '\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol() -> ReActProtocol {
        ReActProtocol::new(ReasoningLedger::new(), 6)
    }

    #[test]
    fn test_gather_facts_empty_context() {
        let mut p = protocol();
        let facts = p.gather_facts("What is Zep?", &[]);
        assert!(facts.is_empty());
        assert_eq!(p.ledger().len(), 1);
        assert_eq!(p.ledger().history()[0].phase, ReasoningPhase::FactGathering);
    }

    #[test]
    fn test_gather_facts_classifies_items() {
        let mut p = protocol();
        let context = vec![
            "Zep was released in 2023".to_string(),
            "Memory layers store conversation history".to_string(),
            "The user probably wants a short answer".to_string(),
            "Is this about the Python SDK?".to_string(),
            "Zep was released in 2023".to_string(),
        ];
        let facts = p.gather_facts("What is Zep?", &context);

        assert_eq!(facts.given, vec!["Zep was released in 2023"]);
        assert_eq!(facts.recalled, vec!["Memory layers store conversation history"]);
        assert_eq!(facts.assumptions.len(), 2);
    }

    #[test]
    fn test_create_plan_without_resources_uses_generic() {
        let mut p = protocol();
        let plan = p.create_plan("Explain Zep", &[]);
        assert_eq!(plan.revision, 0);
        assert!(!plan.steps.is_empty());
        assert_eq!(plan.resources, vec![GENERIC_RESOURCE.to_string()]);
        assert_eq!(p.ledger().last().unwrap().phase, ReasoningPhase::Planning);
    }

    #[test]
    fn test_validate_progress_completed_with_one_success() {
        let mut p = protocol();
        p.create_plan("Explain Zep", &[]);
        p.ledger_mut().append_outcome(
            ReasoningPhase::Execution,
            "Sub-task 1 succeeded",
            Some("Zep is a memory layer for agents".to_string()),
            StepOutcome::Success,
        );
        p.ledger_mut().append_outcome(
            ReasoningPhase::Execution,
            "Sub-task 2 failed",
            Some("timed out".to_string()),
            StepOutcome::Failure,
        );

        let result = p.validate_progress("What is Zep?");
        assert!(result.completed());
        assert!(!result.looping());
        assert_eq!(result.is_completed.reason, "1 of 2 sub-tasks succeeded");
        assert!(result.confidence > 0.0 && result.confidence <= 1.0);
        assert!(p.ledger().confidence() > 0.0);
    }

    #[test]
    fn test_validate_progress_only_reads_current_cycle() {
        let mut p = protocol();
        p.create_plan("Explain Zep", &[]);
        p.ledger_mut().append_outcome(
            ReasoningPhase::Execution,
            "old success",
            Some("zep".to_string()),
            StepOutcome::Success,
        );
        p.ledger_mut()
            .append(ReasoningPhase::Planning, "replanned", None, None);
        p.ledger_mut().append_outcome(
            ReasoningPhase::Execution,
            "new failure",
            None,
            StepOutcome::Failure,
        );

        let result = p.validate_progress("What is Zep?");
        assert!(!result.completed());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.next_instruction.value, "reflect on failures and re-plan");
    }

    #[test]
    fn test_validate_progress_without_results() {
        let mut p = protocol();
        let result = p.validate_progress("What is Zep?");
        assert!(!result.completed());
        assert!(result.is_completed.reason.contains("no sub-task results"));
        assert_eq!(p.ledger().verdicts().len(), 1);
    }

    #[test]
    fn test_validate_progress_detects_loop() {
        let mut p = protocol();
        for _ in 0..4 {
            p.ledger_mut().append(
                ReasoningPhase::Execution,
                "search again",
                None,
                Some("search".to_string()),
            );
        }
        let result = p.validate_progress("What is Zep?");
        assert!(result.looping());
        assert!(result.next_instruction.value.contains("change strategy"));
        assert!(result.failure_reason().contains("repeated"));
    }

    #[test]
    fn test_month_may_is_not_a_hedge() {
        let mut p = protocol();
        let context = vec![
            "Zep was released in May 2023".to_string(),
            "Users may prefer Mem0 for small projects".to_string(),
        ];
        let facts = p.gather_facts("What is Zep?", &context);

        assert_eq!(facts.given, vec!["Zep was released in May 2023"]);
        assert_eq!(facts.assumptions, vec!["Users may prefer Mem0 for small projects"]);
    }

    fn failed_cycle(p: &mut ReActProtocol, revision: u32) -> ValidationResult {
        p.ledger_mut().append(
            ReasoningPhase::Planning,
            format!("Plan revision {}", revision),
            None,
            Some("dispatch sub-tasks".to_string()),
        );
        p.ledger_mut().append_outcome(
            ReasoningPhase::Execution,
            "Sub-task 1 failed",
            Some("index unavailable".to_string()),
            StepOutcome::Failure,
        );
        p.validate_progress("What is Zep?")
    }

    #[test]
    fn test_repeated_replans_across_cycles_are_a_loop() {
        let mut p = protocol();
        let plan = p.create_plan("Explain Zep", &[]);

        let first = failed_cycle(&mut p, 0);
        let plan = p.reflect_and_adjust(&plan, &first.failure_reason());
        let second = failed_cycle(&mut p, 1);
        let plan = p.reflect_and_adjust(&plan, &second.failure_reason());
        let third = failed_cycle(&mut p, 2);

        assert!(!first.looping());
        assert!(!second.looping());
        assert!(third.looping());
        assert!(third.is_looping.reason.contains("3 of the last 6 validations"));
        assert!(third.next_instruction.value.contains("change strategy"));
        assert_eq!(p.ledger().verdicts().iter().filter(|v| v.looping).count(), 1);

        p.reflect_and_adjust(&plan, &third.failure_reason());
        assert_eq!(
            p.ledger().last().unwrap().observations.as_deref(),
            Some("root cause: the same action is being repeated without new information")
        );
    }

    #[test]
    fn test_completed_cycle_resets_replan_loop() {
        let mut p = protocol();
        p.create_plan("Explain Zep", &[]);
        failed_cycle(&mut p, 0);
        failed_cycle(&mut p, 1);
        p.ledger_mut().append_outcome(
            ReasoningPhase::Execution,
            "Sub-task 2 succeeded",
            Some("Zep is a memory layer".to_string()),
            StepOutcome::Success,
        );

        let result = p.validate_progress("What is Zep?");
        assert!(result.completed());
        assert!(!result.looping());
    }

    #[test]
    fn test_coverage_reads_full_outputs() {
        let long_output = format!("{} Zep stores agent memory.", "filler ".repeat(100));
        let excerpt: String = long_output.chars().take(280).collect();

        let mut from_trace = protocol();
        from_trace.create_plan("Explain Zep", &[]);
        from_trace.ledger_mut().append_outcome(
            ReasoningPhase::Execution,
            "Sub-task 1 succeeded",
            Some(excerpt),
            StepOutcome::Success,
        );
        let mut from_outputs = from_trace.clone();

        let truncated = from_trace.validate_progress("What is Zep?");
        let full = from_outputs.validate_progress_with_outputs("What is Zep?", &[long_output]);

        assert_eq!(truncated.confidence, 0.5);
        assert_eq!(full.confidence, 1.0);
    }

    #[test]
    fn test_reflection_produces_different_plan() {
        let mut p = protocol();
        let first = p.create_plan("Explain Zep", &[]);
        let second = p.reflect_and_adjust(&first, "no sub-task succeeded in this cycle (2 failed)");
        let third = p.reflect_and_adjust(&second, "no sub-task succeeded in this cycle (2 failed)");

        assert_ne!(first.steps, second.steps);
        assert_ne!(second.steps, third.steps);
        assert_eq!(third.revision, 2);
        assert_eq!(third.objective, first.objective);
        assert_eq!(
            p.ledger()
                .history()
                .iter()
                .filter(|s| s.phase == ReasoningPhase::Reflection)
                .count(),
            2
        );
    }

    #[test]
    fn test_reflection_root_cause_for_timeouts() {
        let mut p = protocol();
        let first = p.create_plan("Explain Zep", &[]);
        let next = p.reflect_and_adjust(&first, "worker timed out after 30s");
        assert!(next.steps[1].contains("time budget"));
        assert_eq!(
            p.ledger().last().unwrap().observations.as_deref(),
            Some("root cause: workers exceeded their time budget")
        );
    }

    #[test]
    fn test_keywords_skip_stopwords() {
        assert_eq!(keywords("What is Zep?"), vec!["zep"]);
        assert_eq!(
            keywords("How does Rust compare with Go for CLI tools?"),
            vec!["rust", "compare", "cli", "tools"]
        );
    }
}
