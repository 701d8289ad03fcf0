pub mod registry;

use crate::research::decomposer::SubTask;
use crate::types::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

// Re-export commonly used types
pub use registry::{SubagentRegistry, SubagentRegistryBuilder};

/// A worker that executes one sub-task, typically retrieval plus answering.
///
/// Implementations live outside the core. A worker receives an owned copy of
/// its context and shares no mutable state with its siblings; it never writes
/// to the reasoning ledger.
#[async_trait]
pub trait Subagent: Send + Sync {
    /// Execute the sub-task carried by `context`
    async fn run(&self, context: SubagentContext) -> Result<SubagentResponse>;

    /// Name used in outcomes and trace entries
    fn name(&self) -> &str;
}

/// Everything a worker is told about its sub-task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentContext {
    pub run_id: Uuid,
    /// Position of the sub-task in dispatch order
    pub index: usize,
    pub subtask: SubTask,
    /// Objective of the parent research run
    pub objective: String,
    /// Constraints inherited from the parent request
    pub constraints: Vec<String>,
    /// Metadata inherited from the parent request
    pub metadata: HashMap<String, String>,
}

impl SubagentContext {
    /// The query the worker should answer.
    pub fn query(&self) -> &str {
        &self.subtask.query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubagentStatus {
    Success,
    Failed,
}

/// What a worker returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentResponse {
    pub status: SubagentStatus,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque record of the tool calls the worker made
    #[serde(default)]
    pub tool_trace: Vec<serde_json::Value>,
}

impl SubagentResponse {
    /// A successful response.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: SubagentStatus::Success,
            output: output.into(),
            error: None,
            tool_trace: Vec::new(),
        }
    }

    /// A failed response.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: SubagentStatus::Failed,
            output: String::new(),
            error: Some(error.into()),
            tool_trace: Vec::new(),
        }
    }

    /// Attach a tool-call trace.
    pub fn with_tool_trace(mut self, trace: Vec<serde_json::Value>) -> Self {
        self.tool_trace = trace;
        self
    }
}

/// Result of dispatching exactly one sub-task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentOutcome {
    /// The sub-task this outcome belongs to.
    pub subtask: SubTask,
    /// Name of the worker that handled it.
    pub agent: String,
    pub status: SubagentStatus,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub tool_trace: Vec<serde_json::Value>,
    /// Wall-clock time spent on the sub-task.
    pub duration_ms: u64,
}

impl SubagentOutcome {
    /// Build an outcome from a worker response.
    ///
    /// A "successful" response with an empty output is downgraded to a failure.
    pub fn from_response(
        subtask: SubTask,
        agent: impl Into<String>,
        response: SubagentResponse,
        elapsed: Duration,
    ) -> Self {
        let (status, error) = match response.status {
            SubagentStatus::Success if response.output.trim().is_empty() => (
                SubagentStatus::Failed,
                Some("worker returned an empty output".to_string()),
            ),
            status => (status, response.error),
        };

        Self {
            subtask,
            agent: agent.into(),
            status,
            output: response.output,
            error,
            tool_trace: response.tool_trace,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    /// A failed outcome with no worker response.
    pub fn failed(
        subtask: SubTask,
        agent: impl Into<String>,
        error: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            subtask,
            agent: agent.into(),
            status: SubagentStatus::Failed,
            output: String::new(),
            error: Some(error.into()),
            tool_trace: Vec::new(),
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    /// Whether the sub-task succeeded.
    pub fn succeeded(&self) -> bool {
        self.status == SubagentStatus::Success
    }
}
