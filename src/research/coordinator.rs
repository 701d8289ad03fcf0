use crate::{
    agents::{SubagentContext, SubagentOutcome, SubagentRegistry},
    reasoning::{
        FactSheet, LedgerSummary, Plan, ReActProtocol, ReasoningLedger, ReasoningPhase,
        ReasoningStep, StepOutcome,
    },
    research::{
        decomposer::{DecompositionCapability, DecompositionRequest, QueryDecomposer, SubTask},
        dispatch::{DispatchPolicy, Dispatcher, ExecutionMode},
        synthesizer::{SynthesisCapability, Synthesizer},
    },
    types::{AppError, Result},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Maximum characters of worker output copied into a ledger observation.
const OBSERVATION_EXCERPT_CHARS: usize = 280;

// ============================================================================
// Configuration
// ============================================================================

/// Runtime settings for a [`ResearchOrchestrator`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Upper bound on sub-tasks per cycle.
    pub max_subtasks: usize,
    /// Maximum number of reflect/replan cycles before the run fails.
    pub max_replans: u32,
    pub execution_mode: ExecutionMode,
    pub worker_timeout: Duration,
    /// Deadline for the whole execution phase of one cycle.
    pub phase_timeout: Duration,
    pub decomposition_timeout: Duration,
    pub synthesis_timeout: Duration,
    /// Trailing window inspected by the loop detector.
    pub loop_window: usize,
    /// Repeats within the window that count as a loop.
    pub loop_threshold: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_subtasks: 3,
            max_replans: 2,
            execution_mode: ExecutionMode::Parallel,
            worker_timeout: Duration::from_secs(30),
            phase_timeout: Duration::from_secs(120),
            decomposition_timeout: Duration::from_secs(30),
            synthesis_timeout: Duration::from_secs(60),
            loop_window: 6,
            loop_threshold: 3,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_subtasks == 0 {
            return Err(AppError::Configuration(
                "max_subtasks must be at least 1".into(),
            ));
        }
        if self.loop_threshold == 0 || self.loop_threshold >= self.loop_window {
            return Err(AppError::Configuration(format!(
                "loop_threshold must be between 1 and loop_window - 1 (window {}, threshold {})",
                self.loop_window, self.loop_threshold
            )));
        }

        let timeouts = [
            ("worker_timeout", self.worker_timeout),
            ("phase_timeout", self.phase_timeout),
            ("decomposition_timeout", self.decomposition_timeout),
            ("synthesis_timeout", self.synthesis_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(AppError::Configuration(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }

    fn dispatch_policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            mode: self.execution_mode,
            worker_timeout: self.worker_timeout,
            phase_timeout: self.phase_timeout,
        }
    }
}

// ============================================================================
// Requests and Results
// ============================================================================

/// States of the orchestration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestratorState {
    Init,
    FactGathering,
    Planning,
    Executing,
    Validating,
    Reflecting,
    Synthesizing,
    Done,
    Failed,
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::FactGathering => "FACT_GATHERING",
            Self::Planning => "PLANNING",
            Self::Executing => "EXECUTING",
            Self::Validating => "VALIDATING",
            Self::Reflecting => "REFLECTING",
            Self::Synthesizing => "SYNTHESIZING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Done,
    Failed,
}

/// A research query plus everything the caller wants workers to know.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    /// Defaults to the query when absent.
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Background statements fed to fact gathering.
    #[serde(default)]
    pub context: Vec<String>,
    /// Passed through to every worker.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = Some(objective.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn with_context(mut self, item: impl Into<String>) -> Self {
        self.context.push(item.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The objective, falling back to the query when none (or a blank one) was given.
    pub fn effective_objective(&self) -> &str {
        self.objective
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| self.query.trim())
    }

    fn validate(&self, config: &OrchestratorConfig) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(AppError::InvalidInput("Research query must not be empty".into()));
        }
        if config.max_subtasks == 0 {
            return Err(AppError::InvalidInput("max_subtasks must be at least 1".into()));
        }
        Ok(())
    }
}

/// Terminal artifact of a run. Owns copies of everything it references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub final_state: OrchestratorState,
    /// Always usable; an explicit failure message when the run failed.
    pub output: String,
    /// Full ledger history.
    pub steps: Vec<ReasoningStep>,
    pub facts: FactSheet,
    /// Sub-tasks of the final cycle.
    pub subtasks: Vec<SubTask>,
    /// Outcomes of the final cycle, in dispatch order.
    pub outcomes: Vec<SubagentOutcome>,
    /// The plan in force when the run ended.
    pub plan: Option<Plan>,
    /// Planning cycles executed (1 + replans).
    pub cycles: u32,
    pub confidence: f64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrchestrationResult {
    pub fn is_done(&self) -> bool {
        self.status == RunStatus::Done
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Mutable state of one run. Owned by the orchestrator task, never shared.
struct Run<'a> {
    id: Uuid,
    request: &'a ResearchRequest,
    protocol: ReActProtocol,
    facts: FactSheet,
    plan: Option<Plan>,
    subtasks: Vec<SubTask>,
    outcomes: Vec<SubagentOutcome>,
    cycle: u32,
    replans: u32,
    failure_reason: String,
    output: String,
    error: Option<String>,
}

impl Run<'_> {
    fn ledger(&mut self) -> &mut ReasoningLedger {
        self.protocol.ledger_mut()
    }
}

/// Drives a research query through the fact / plan / execute / validate /
/// reflect cycle and synthesizes the answer.
///
/// Each call to [`run_research`](Self::run_research) owns its own ledger and
/// plan; only the finished ledger is kept for [`get_trace`](Self::get_trace)
/// and [`get_summary`](Self::get_summary).
pub struct ResearchOrchestrator {
    config: OrchestratorConfig,
    registry: SubagentRegistry,
    decomposer: QueryDecomposer,
    synthesizer: Synthesizer,
    last_run: RwLock<Option<ReasoningLedger>>,
}

impl ResearchOrchestrator {
    /// Create an orchestrator using the heuristic decomposer and
    /// concatenating synthesis until capabilities are attached.
    pub fn new(config: OrchestratorConfig, registry: SubagentRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            decomposer: QueryDecomposer::heuristic_only(),
            synthesizer: Synthesizer::concatenating(),
            last_run: RwLock::new(None),
        })
    }

    /// Use a structured decomposition capability as the primary strategy.
    pub fn with_decomposition(mut self, capability: Arc<dyn DecompositionCapability>) -> Self {
        self.decomposer = QueryDecomposer::new(capability, self.config.decomposition_timeout);
        self
    }

    /// Use a synthesis capability as the primary synthesis path.
    pub fn with_synthesis(mut self, capability: Arc<dyn SynthesisCapability>) -> Self {
        self.synthesizer = Synthesizer::new(capability, self.config.synthesis_timeout);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run a research query to completion.
    ///
    /// Returns `Err` only for malformed input, before any ledger step is
    /// written. Convergence failure is reported as a `Failed` result with a
    /// usable output and the full trace.
    pub async fn run_research(&self, request: ResearchRequest) -> Result<OrchestrationResult> {
        request.validate(&self.config)?;

        let started = Instant::now();
        let ledger = ReasoningLedger::with_loop_threshold(self.config.loop_threshold);
        let mut run = Run {
            id: Uuid::new_v4(),
            request: &request,
            protocol: ReActProtocol::new(ledger, self.config.loop_window),
            facts: FactSheet::default(),
            plan: None,
            subtasks: Vec::new(),
            outcomes: Vec::new(),
            cycle: 0,
            replans: 0,
            failure_reason: String::new(),
            output: String::new(),
            error: None,
        };

        let mut state = OrchestratorState::Init;
        while !state.is_terminal() {
            tracing::info!(
                run_id = %run.id,
                state = %state,
                cycle = run.cycle,
                "Orchestrator state"
            );
            state = match state {
                OrchestratorState::Init => self.init(&mut run),
                OrchestratorState::FactGathering => self.gather_facts(&mut run),
                OrchestratorState::Planning => self.plan(&mut run).await,
                OrchestratorState::Executing => self.execute(&mut run).await,
                OrchestratorState::Validating => self.validate(&mut run),
                OrchestratorState::Reflecting => self.reflect(&mut run),
                OrchestratorState::Synthesizing => self.synthesize(&mut run).await,
                OrchestratorState::Done | OrchestratorState::Failed => state,
            };
        }

        if state == OrchestratorState::Failed {
            self.fail(&mut run);
        }

        let ledger = run.protocol.into_ledger();
        let result = OrchestrationResult {
            run_id: run.id,
            status: if state == OrchestratorState::Done {
                RunStatus::Done
            } else {
                RunStatus::Failed
            },
            final_state: state,
            output: run.output,
            steps: ledger.history().to_vec(),
            facts: run.facts,
            subtasks: run.subtasks,
            outcomes: run.outcomes,
            plan: run.plan,
            cycles: run.cycle + 1,
            confidence: ledger.confidence(),
            duration_ms: started.elapsed().as_millis() as u64,
            error: run.error,
        };

        tracing::info!(
            run_id = %result.run_id,
            state = %result.final_state,
            steps = result.steps.len(),
            confidence = result.confidence,
            duration_ms = result.duration_ms,
            "Research run finished"
        );

        *self.last_run.write() = Some(ledger);
        Ok(result)
    }

    /// Steps of the most recent finished run, empty before the first run.
    pub fn get_trace(&self) -> Vec<ReasoningStep> {
        self.last_run
            .read()
            .as_ref()
            .map(|ledger| ledger.history().to_vec())
            .unwrap_or_default()
    }

    /// Summary of the most recent finished run.
    pub fn get_summary(&self) -> LedgerSummary {
        match self.last_run.read().as_ref() {
            Some(ledger) => ledger.summary(),
            None => ReasoningLedger::new().summary(),
        }
    }

    /// Human-readable trace of the most recent finished run.
    pub fn render_trace(&self) -> String {
        self.last_run
            .read()
            .as_ref()
            .map(ReasoningLedger::render_trace)
            .unwrap_or_default()
    }

    // ========================================================================
    // States
    // ========================================================================

    fn init(&self, run: &mut Run<'_>) -> OrchestratorState {
        let request = run.request;
        let mut observation = format!("objective: {}", request.effective_objective());
        if !request.constraints.is_empty() {
            observation.push_str(&format!("; constraints: {}", request.constraints.join(", ")));
        }
        let content = format!("Research run {} started: {}", run.id, request.query.trim());

        run.ledger().append(
            ReasoningPhase::Init,
            content,
            Some(observation),
            Some("gather facts".to_string()),
        );
        OrchestratorState::FactGathering
    }

    fn gather_facts(&self, run: &mut Run<'_>) -> OrchestratorState {
        let request = run.request;
        run.facts = run.protocol.gather_facts(&request.query, &request.context);
        OrchestratorState::Planning
    }

    async fn plan(&self, run: &mut Run<'_>) -> OrchestratorState {
        let request = run.request;
        let plan = match run.plan.take() {
            Some(plan) => plan,
            None => run
                .protocol
                .create_plan(request.effective_objective(), &self.registry.resource_names()),
        };

        let decomposition_request = DecompositionRequest {
            query: request.query.trim().to_string(),
            objective: request.effective_objective().to_string(),
            constraints: request.constraints.clone(),
            max_subtasks: self.config.max_subtasks,
            plan_steps: plan.steps.clone(),
            revision: plan.revision,
            adjustment: plan.adjustment.clone(),
        };
        let decomposition = self.decomposer.decompose(&decomposition_request).await;

        if let Some(reason) = decomposition.fallback_reason() {
            tracing::warn!(run_id = %run.id, "Decomposition fallback engaged: {}", reason);
            run.ledger().append_outcome(
                ReasoningPhase::Execution,
                "Decomposition fallback engaged",
                Some(reason.to_string()),
                StepOutcome::Fallback,
            );
        }

        let listing = decomposition
            .subtasks
            .iter()
            .map(|s| format!("[{}] {}", s.focus, s.query))
            .collect::<Vec<_>>()
            .join("; ");
        let content = format!(
            "Plan revision {} decomposed into {} sub-task(s)",
            plan.revision,
            decomposition.subtasks.len()
        );
        run.ledger().append(
            ReasoningPhase::Planning,
            content,
            Some(listing),
            Some("dispatch sub-tasks".to_string()),
        );

        run.subtasks = decomposition.subtasks;
        run.plan = Some(plan);
        OrchestratorState::Executing
    }

    async fn execute(&self, run: &mut Run<'_>) -> OrchestratorState {
        let request = run.request;
        let contexts: Vec<SubagentContext> = run
            .subtasks
            .iter()
            .enumerate()
            .map(|(index, subtask)| SubagentContext {
                run_id: run.id,
                index,
                subtask: subtask.clone(),
                objective: request.effective_objective().to_string(),
                constraints: request.constraints.clone(),
                metadata: request.metadata.clone(),
            })
            .collect();

        let dispatcher = Dispatcher::new(&self.registry, self.config.dispatch_policy());
        let outcomes = dispatcher.dispatch(contexts).await;

        for (index, outcome) in outcomes.iter().enumerate() {
            if outcome.succeeded() {
                run.ledger().append_outcome(
                    ReasoningPhase::Execution,
                    format!(
                        "Sub-task {} [{}] succeeded via {} in {} ms",
                        index + 1,
                        outcome.subtask.focus,
                        outcome.agent,
                        outcome.duration_ms
                    ),
                    Some(excerpt(&outcome.output)),
                    StepOutcome::Success,
                );
            } else {
                let error = outcome.error.clone().unwrap_or_else(|| "unknown error".into());
                tracing::warn!(
                    run_id = %run.id,
                    index,
                    focus = %outcome.subtask.focus,
                    "Sub-task failed: {}",
                    error
                );
                run.ledger().append_outcome(
                    ReasoningPhase::Execution,
                    format!(
                        "Sub-task {} [{}] failed via {}",
                        index + 1,
                        outcome.subtask.focus,
                        outcome.agent
                    ),
                    Some(error),
                    StepOutcome::Failure,
                );
            }
        }

        run.outcomes = outcomes;
        OrchestratorState::Validating
    }

    fn validate(&self, run: &mut Run<'_>) -> OrchestratorState {
        let request = run.request;
        let outputs: Vec<String> = run
            .outcomes
            .iter()
            .filter(|o| o.succeeded())
            .map(|o| o.output.clone())
            .collect();
        let validation = run
            .protocol
            .validate_progress_with_outputs(&request.query, &outputs);

        if validation.completed() {
            if validation.looping() {
                tracing::warn!(run_id = %run.id, "Loop detected, but the cycle produced results");
            }
            return OrchestratorState::Synthesizing;
        }

        let errors: Vec<&str> = run
            .outcomes
            .iter()
            .filter_map(|o| o.error.as_deref())
            .collect();
        run.failure_reason = if errors.is_empty() {
            validation.failure_reason()
        } else {
            format!("{}: {}", validation.failure_reason(), errors.join("; "))
        };

        if run.replans < self.config.max_replans {
            OrchestratorState::Reflecting
        } else {
            OrchestratorState::Failed
        }
    }

    fn reflect(&self, run: &mut Run<'_>) -> OrchestratorState {
        let Some(previous) = run.plan.take() else {
            // Reflection is only reachable after planning
            return OrchestratorState::Planning;
        };

        let next = run.protocol.reflect_and_adjust(&previous, &run.failure_reason);
        run.facts.add_assumption(format!(
            "Plan revision {} did not converge: {}",
            previous.revision, run.failure_reason
        ));

        run.replans += 1;
        run.cycle += 1;
        run.plan = Some(next);
        OrchestratorState::Planning
    }

    async fn synthesize(&self, run: &mut Run<'_>) -> OrchestratorState {
        let request = run.request;
        let synthesis = self
            .synthesizer
            .synthesize(
                request.query.trim(),
                request.effective_objective(),
                &run.subtasks,
                &run.outcomes,
            )
            .await;

        if let Some(reason) = synthesis.fallback_reason() {
            run.ledger().append_outcome(
                ReasoningPhase::Synthesis,
                "Synthesis fallback engaged",
                Some(reason.to_string()),
                StepOutcome::Fallback,
            );
        }

        let content = format!(
            "Synthesized answer from {} of {} sub-result(s)",
            synthesis.sources,
            run.outcomes.len()
        );
        run.ledger().append(
            ReasoningPhase::Synthesis,
            content,
            Some(excerpt(&synthesis.text)),
            None,
        );

        run.output = synthesis.text;
        OrchestratorState::Done
    }

    fn fail(&self, run: &mut Run<'_>) {
        let error = AppError::Convergence(format!(
            "validation did not complete after {} replan(s): {}",
            run.replans, run.failure_reason
        ));
        tracing::error!(run_id = %run.id, "{}", error);

        run.output = format!(
            "Unable to answer \"{}\": {}",
            run.request.query.trim(),
            error
        );
        run.error = Some(error.to_string());
    }
}

fn excerpt(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(OBSERVATION_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
