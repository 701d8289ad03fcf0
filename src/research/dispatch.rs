//! Sub-task Dispatch
//!
//! Runs one worker per sub-task under a configured [`ExecutionMode`]:
//!
//! - **Parallel** - every worker is spawned on a `JoinSet`; results are joined
//!   and put back in dispatch order
//! - **Sequential** - workers run one after another, each with its own copy
//!   of the context
//!
//! Each worker is bounded by the per-worker timeout, and the whole phase by a
//! deadline. A worker that misses either is recorded as a failed outcome; its
//! siblings are unaffected. Workers are never retried here.

use crate::agents::{Subagent, SubagentContext, SubagentOutcome, SubagentRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};

/// How workers are scheduled during the execution phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// All workers start at once; the phase takes about as long as the slowest.
    #[default]
    Parallel,
    /// Workers run one at a time; the phase takes about the sum of latencies.
    Sequential,
}

/// Timeouts and scheduling for one execution phase.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    pub mode: ExecutionMode,
    /// Bound on a single worker call.
    pub worker_timeout: Duration,
    /// Bound on the whole execution phase.
    pub phase_timeout: Duration,
}

/// Dispatches sub-task contexts to the workers resolved from a registry.
pub struct Dispatcher<'a> {
    registry: &'a SubagentRegistry,
    policy: DispatchPolicy,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a SubagentRegistry, policy: DispatchPolicy) -> Self {
        Self { registry, policy }
    }

    /// Run every context and return exactly one outcome per context, in the
    /// order the contexts were given.
    pub async fn dispatch(&self, contexts: Vec<SubagentContext>) -> Vec<SubagentOutcome> {
        match self.policy.mode {
            ExecutionMode::Parallel => self.dispatch_parallel(contexts).await,
            ExecutionMode::Sequential => self.dispatch_sequential(contexts).await,
        }
    }

    async fn dispatch_parallel(&self, contexts: Vec<SubagentContext>) -> Vec<SubagentOutcome> {
        let started = Instant::now();
        let deadline = started + self.policy.phase_timeout;

        let mut pending = Vec::with_capacity(contexts.len());
        let mut set = JoinSet::new();
        for (index, context) in contexts.into_iter().enumerate() {
            let agent = self.registry.resolve(&context.subtask.focus);
            pending.push((context.subtask.clone(), agent.name().to_string()));

            let worker_timeout = self.policy.worker_timeout;
            set.spawn(async move { (index, run_worker(agent, context, worker_timeout).await) });
        }

        let mut slots: Vec<Option<SubagentOutcome>> = (0..pending.len()).map(|_| None).collect();
        let mut deadline_hit = false;
        loop {
            match timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((index, outcome)))) => slots[index] = Some(outcome),
                Ok(Some(Err(e))) => tracing::warn!("Worker task aborted: {}", e),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Execution phase deadline of {:?} elapsed, abandoning {} worker(s)",
                        self.policy.phase_timeout,
                        set.len()
                    );
                    deadline_hit = true;
                    set.abort_all();
                    break;
                }
            }
        }

        let elapsed = started.elapsed();
        slots
            .into_iter()
            .zip(pending)
            .map(|(slot, (subtask, agent))| {
                slot.unwrap_or_else(|| {
                    let error = if deadline_hit {
                        format!(
                            "timed out: phase deadline of {:?} elapsed before the worker finished",
                            self.policy.phase_timeout
                        )
                    } else {
                        "worker task aborted".to_string()
                    };
                    SubagentOutcome::failed(subtask, agent, error, elapsed)
                })
            })
            .collect()
    }

    async fn dispatch_sequential(&self, contexts: Vec<SubagentContext>) -> Vec<SubagentOutcome> {
        let deadline = Instant::now() + self.policy.phase_timeout;
        let mut outcomes = Vec::with_capacity(contexts.len());

        for context in contexts {
            let agent = self.registry.resolve(&context.subtask.focus);
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                outcomes.push(SubagentOutcome::failed(
                    context.subtask,
                    agent.name(),
                    format!(
                        "timed out: phase deadline of {:?} elapsed before the worker started",
                        self.policy.phase_timeout
                    ),
                    Duration::ZERO,
                ));
                continue;
            }

            let budget = self.policy.worker_timeout.min(remaining);
            outcomes.push(run_worker(agent, context, budget).await);
        }

        outcomes
    }
}

/// Run one worker under `budget`, converting every failure mode into an outcome.
async fn run_worker(
    agent: Arc<dyn Subagent>,
    context: SubagentContext,
    budget: Duration,
) -> SubagentOutcome {
    let started = Instant::now();
    let index = context.index;
    let subtask = context.subtask.clone();
    let name = agent.name().to_string();

    let outcome = match timeout(budget, agent.run(context)).await {
        Ok(Ok(response)) => SubagentOutcome::from_response(subtask, name, response, started.elapsed()),
        Ok(Err(e)) => SubagentOutcome::failed(subtask, name, e.to_string(), started.elapsed()),
        Err(_) => SubagentOutcome::failed(
            subtask,
            name,
            format!("worker timed out after {:?}", budget),
            started.elapsed(),
        ),
    };

    tracing::debug!(
        index,
        focus = %outcome.subtask.focus,
        success = outcome.succeeded(),
        duration_ms = outcome.duration_ms,
        "Worker finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{SubagentResponse, SubagentStatus};
    use crate::research::decomposer::SubTask;
    use crate::types::{AppError, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use uuid::Uuid;

    /// Sleeps for the number of milliseconds in the sub-task rationale.
    struct SleepyAgent;

    #[async_trait]
    impl Subagent for SleepyAgent {
        async fn run(&self, context: SubagentContext) -> Result<SubagentResponse> {
            let ms: u64 = context
                .subtask
                .rationale
                .parse()
                .map_err(|_| AppError::InvalidInput("latency".to_string()))?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            if context.subtask.focus == "broken" {
                return Ok(SubagentResponse::failed("index unavailable"));
            }
            Ok(SubagentResponse::success(format!("answer to {}", context.query())))
        }

        fn name(&self) -> &str {
            "sleepy"
        }
    }

    fn contexts(specs: &[(&str, u64)]) -> Vec<SubagentContext> {
        let run_id = Uuid::new_v4();
        specs
            .iter()
            .enumerate()
            .map(|(index, (focus, ms))| SubagentContext {
                run_id,
                index,
                subtask: SubTask {
                    query: format!("q{}", index),
                    focus: focus.to_string(),
                    rationale: ms.to_string(),
                },
                objective: "test".to_string(),
                constraints: vec![],
                metadata: HashMap::new(),
            })
            .collect()
    }

    fn policy(mode: ExecutionMode, worker_ms: u64, phase_ms: u64) -> DispatchPolicy {
        DispatchPolicy {
            mode,
            worker_timeout: Duration::from_millis(worker_ms),
            phase_timeout: Duration::from_millis(phase_ms),
        }
    }

    fn registry() -> SubagentRegistry {
        SubagentRegistry::new(Arc::new(SleepyAgent))
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_takes_max_latency() {
        let registry = registry();
        let dispatcher = Dispatcher::new(&registry, policy(ExecutionMode::Parallel, 1_000, 5_000));

        let start = Instant::now();
        let outcomes = dispatcher
            .dispatch(contexts(&[("a", 300), ("b", 100), ("c", 200)]))
            .await;
        let elapsed = start.elapsed();

        assert!(outcomes.iter().all(|o| o.succeeded()));
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_takes_sum_of_latencies() {
        let registry = registry();
        let dispatcher =
            Dispatcher::new(&registry, policy(ExecutionMode::Sequential, 1_000, 5_000));

        let start = Instant::now();
        let outcomes = dispatcher
            .dispatch(contexts(&[("a", 300), ("b", 100), ("c", 200)]))
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(start.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_preserves_dispatch_order() {
        let registry = registry();
        let dispatcher = Dispatcher::new(&registry, policy(ExecutionMode::Parallel, 1_000, 5_000));

        let outcomes = dispatcher
            .dispatch(contexts(&[("a", 30), ("b", 10), ("c", 20)]))
            .await;
        let queries: Vec<&str> = outcomes.iter().map(|o| o.subtask.query.as_str()).collect();
        assert_eq!(queries, vec!["q0", "q1", "q2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_timeout_is_isolated() {
        let registry = registry();
        let dispatcher = Dispatcher::new(&registry, policy(ExecutionMode::Parallel, 100, 5_000));

        let outcomes = dispatcher.dispatch(contexts(&[("a", 10), ("b", 500)])).await;
        assert!(outcomes[0].succeeded());
        assert_eq!(outcomes[1].status, SubagentStatus::Failed);
        assert!(outcomes[1].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_deadline_abandons_outstanding_workers() {
        let registry = registry();
        let dispatcher = Dispatcher::new(&registry, policy(ExecutionMode::Parallel, 10_000, 50));

        let start = Instant::now();
        let outcomes = dispatcher.dispatch(contexts(&[("a", 10), ("b", 5_000)])).await;

        assert!(start.elapsed() < Duration::from_millis(1_000));
        assert!(outcomes[0].succeeded());
        assert!(outcomes[1].error.as_deref().unwrap().contains("phase deadline"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_deadline_skips_remaining_workers() {
        let registry = registry();
        let dispatcher =
            Dispatcher::new(&registry, policy(ExecutionMode::Sequential, 10_000, 150));

        let outcomes = dispatcher
            .dispatch(contexts(&[("a", 100), ("b", 100), ("c", 100)]))
            .await;

        assert!(outcomes[0].succeeded());
        assert!(outcomes[1].error.as_deref().unwrap().contains("timed out"));
        assert!(outcomes[2].error.as_deref().unwrap().contains("before the worker started"));
    }

    #[tokio::test]
    async fn test_failed_response_is_recorded() {
        let registry = registry();
        let dispatcher = Dispatcher::new(&registry, policy(ExecutionMode::Parallel, 1_000, 5_000));

        let outcomes = dispatcher.dispatch(contexts(&[("broken", 0), ("a", 0)])).await;
        assert_eq!(outcomes[0].error.as_deref(), Some("index unavailable"));
        assert!(outcomes[1].succeeded());
    }
}
