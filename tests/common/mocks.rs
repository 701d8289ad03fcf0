//! Mock implementations for testing.
//!
//! Workers, capabilities, and an LLM client with scripted behavior, shared
//! across integration test files.

use ares_reasoning::agents::{Subagent, SubagentContext, SubagentResponse};
use ares_reasoning::llm::LLMClient;
use ares_reasoning::research::{
    DecompositionCapability, DecompositionRequest, ProposedSubTask, SynthesisCapability,
    SynthesisRequest,
};
use ares_reasoning::types::{AppError, CapabilityError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Workers
// ============================================================================

#[derive(Clone)]
enum Behavior {
    Succeed(String),
    Fail(String),
    Error(String),
}

/// Mock worker with configurable latency and outcome.
///
/// ```ignore
/// // Answers "<output> (<query>)" after 200ms
/// let worker = MockSubagent::new("docs", "Zep is a memory layer")
///     .with_latency(Duration::from_millis(200));
///
/// // Fails the first call, succeeds afterwards
/// let flaky = MockSubagent::new("search", "found it").failing_first(1);
/// ```
#[derive(Clone)]
pub struct MockSubagent {
    name: String,
    behavior: Behavior,
    latency: Duration,
    fail_first: usize,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SubagentContext>>>,
}

impl MockSubagent {
    /// A worker that succeeds with `output` followed by the sub-task query.
    pub fn new(name: &str, output: &str) -> Self {
        Self::with_behavior(name, Behavior::Succeed(output.to_string()))
    }

    /// A worker that reports a failed response.
    pub fn failing(name: &str, error: &str) -> Self {
        Self::with_behavior(name, Behavior::Fail(error.to_string()))
    }

    /// A worker whose call returns `Err`.
    pub fn erroring(name: &str, error: &str) -> Self {
        Self::with_behavior(name, Behavior::Error(error.to_string()))
    }

    fn with_behavior(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            latency: Duration::ZERO,
            fail_first: 0,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the first `n` calls before applying the configured behavior.
    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Contexts received so far, in call order.
    pub fn seen(&self) -> Vec<SubagentContext> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Subagent for MockSubagent {
    async fn run(&self, context: SubagentContext) -> Result<SubagentResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(context.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if call < self.fail_first {
            return Ok(SubagentResponse::failed(format!(
                "{} unavailable (call {})",
                self.name,
                call + 1
            )));
        }

        match &self.behavior {
            Behavior::Succeed(output) => Ok(SubagentResponse::success(format!(
                "{} ({})",
                output,
                context.query()
            ))
            .with_tool_trace(vec![serde_json::json!({
                "tool": "vector_search",
                "agent": self.name,
            })])),
            Behavior::Fail(error) => Ok(SubagentResponse::failed(error.clone())),
            Behavior::Error(error) => Err(AppError::Internal(error.clone())),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Decomposition capability returning a fixed result.
pub struct MockDecomposition {
    result: std::result::Result<Vec<ProposedSubTask>, CapabilityError>,
    calls: AtomicUsize,
}

impl MockDecomposition {
    /// Propose one sub-task per `(query, focus)` pair.
    pub fn returning(proposals: &[(&str, &str)]) -> Self {
        let proposals = proposals
            .iter()
            .map(|(query, focus)| ProposedSubTask {
                query: query.to_string(),
                focus: focus.to_string(),
                reasoning: format!("covers the {} angle", focus),
            })
            .collect();
        Self {
            result: Ok(proposals),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecompositionCapability for MockDecomposition {
    async fn request_decomposition(
        &self,
        _request: &DecompositionRequest,
    ) -> std::result::Result<Vec<ProposedSubTask>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Synthesis capability returning a fixed result.
pub struct MockSynthesis {
    result: std::result::Result<String, CapabilityError>,
    received: Mutex<Vec<SynthesisRequest>>,
}

impl MockSynthesis {
    pub fn returning(answer: &str) -> Self {
        Self {
            result: Ok(answer.to_string()),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self {
            result: Err(error),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn received(&self) -> Vec<SynthesisRequest> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl SynthesisCapability for MockSynthesis {
    async fn request_synthesis(
        &self,
        request: &SynthesisRequest,
    ) -> std::result::Result<String, CapabilityError> {
        self.received.lock().push(request.clone());
        self.result.clone()
    }
}

// ============================================================================
// LLM
// ============================================================================

/// Mock LLM client that returns a fixed response or always fails.
#[derive(Clone)]
pub struct MockLLMClient {
    response: String,
    should_fail: bool,
}

impl MockLLMClient {
    /// Create a new mock client that returns the given response.
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            should_fail: false,
        }
    }

    /// Create a mock client that always returns an error.
    pub fn failing() -> Self {
        Self {
            response: String::new(),
            should_fail: true,
        }
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        if self.should_fail {
            return Err(AppError::LLM("Mock LLM failure".to_string()));
        }
        Ok(self.response.clone())
    }

    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
