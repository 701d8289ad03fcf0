//! Subagent Registry
//!
//! Routes sub-tasks to specialized workers by their focus tag. Every registry
//! has a default worker, so any focus produced by the decomposer (including
//! free-form tags from the LLM strategy) resolves to some worker.
//!
//! Focus tags are matched case-insensitively.

use crate::agents::Subagent;
use crate::types::{AppError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of workers keyed by focus tag
#[derive(Clone)]
pub struct SubagentRegistry {
    agents: HashMap<String, Arc<dyn Subagent>>,
    default_agent: Arc<dyn Subagent>,
}

impl SubagentRegistry {
    /// Create a registry that sends every sub-task to `default_agent`
    pub fn new(default_agent: Arc<dyn Subagent>) -> Self {
        Self {
            agents: HashMap::new(),
            default_agent,
        }
    }

    /// Start building a registry
    pub fn builder() -> SubagentRegistryBuilder {
        SubagentRegistryBuilder::new()
    }

    /// Register a worker for a focus tag, replacing any previous one
    pub fn register(&mut self, focus: &str, agent: Arc<dyn Subagent>) {
        self.agents.insert(normalize(focus), agent);
    }

    /// Worker for `focus`, falling back to the default worker
    pub fn resolve(&self, focus: &str) -> Arc<dyn Subagent> {
        self.agents
            .get(&normalize(focus))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_agent))
    }

    /// Check if a dedicated worker exists for `focus`
    pub fn has_agent(&self, focus: &str) -> bool {
        self.agents.contains_key(&normalize(focus))
    }

    /// Registered focus tags, sorted
    pub fn focus_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    /// The fallback worker
    pub fn default_agent(&self) -> &Arc<dyn Subagent> {
        &self.default_agent
    }

    /// Resource descriptions used when planning, one per worker
    pub fn resource_names(&self) -> Vec<String> {
        let mut resources: Vec<String> = self
            .focus_names()
            .into_iter()
            .map(|focus| format!("{} ({})", self.resolve(&focus).name(), focus))
            .collect();
        resources.push(format!("{} (default)", self.default_agent.name()));
        resources
    }
}

fn normalize(focus: &str) -> String {
    focus.trim().to_lowercase()
}

/// Builder for [`SubagentRegistry`]
#[derive(Default)]
pub struct SubagentRegistryBuilder {
    agents: HashMap<String, Arc<dyn Subagent>>,
    default_agent: Option<Arc<dyn Subagent>>,
}

impl SubagentRegistryBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker for a focus tag
    pub fn with_agent(mut self, focus: &str, agent: Arc<dyn Subagent>) -> Self {
        self.agents.insert(normalize(focus), agent);
        self
    }

    /// Set the fallback worker
    pub fn with_default_agent(mut self, agent: Arc<dyn Subagent>) -> Self {
        self.default_agent = Some(agent);
        self
    }

    /// Build the registry; a default worker is required
    pub fn build(self) -> Result<SubagentRegistry> {
        let default_agent = self.default_agent.ok_or_else(|| {
            AppError::Configuration("A default subagent is required for SubagentRegistry".into())
        })?;

        Ok(SubagentRegistry {
            agents: self.agents,
            default_agent,
        })
    }
}
