//! TOML-based configuration for research runs
//!
//! A `research.toml` file tunes the orchestrator and logging:
//!
//! ```toml
//! [orchestrator]
//! max_subtasks = 3
//! max_replans = 2
//! execution_mode = "parallel"   # or "sequential"
//! worker_timeout_ms = 30000
//! phase_timeout_ms = 120000
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use crate::research::{ExecutionMode, OrchestratorConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure loaded from research.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The `[orchestrator]` table. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default = "default_max_subtasks")]
    pub max_subtasks: usize,

    #[serde(default = "default_max_replans")]
    pub max_replans: u32,

    #[serde(default)]
    pub execution_mode: ExecutionMode,

    #[serde(default = "default_worker_timeout_ms")]
    pub worker_timeout_ms: u64,

    #[serde(default = "default_phase_timeout_ms")]
    pub phase_timeout_ms: u64,

    #[serde(default = "default_decomposition_timeout_ms")]
    pub decomposition_timeout_ms: u64,

    #[serde(default = "default_synthesis_timeout_ms")]
    pub synthesis_timeout_ms: u64,

    #[serde(default = "default_loop_window")]
    pub loop_window: usize,

    #[serde(default = "default_loop_threshold")]
    pub loop_threshold: usize,
}

fn default_max_subtasks() -> usize {
    3
}

fn default_max_replans() -> u32 {
    2
}

fn default_worker_timeout_ms() -> u64 {
    30_000
}

fn default_phase_timeout_ms() -> u64 {
    120_000
}

fn default_decomposition_timeout_ms() -> u64 {
    30_000
}

fn default_synthesis_timeout_ms() -> u64 {
    60_000
}

fn default_loop_window() -> usize {
    6
}

fn default_loop_threshold() -> usize {
    3
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_subtasks: default_max_subtasks(),
            max_replans: default_max_replans(),
            execution_mode: ExecutionMode::default(),
            worker_timeout_ms: default_worker_timeout_ms(),
            phase_timeout_ms: default_phase_timeout_ms(),
            decomposition_timeout_ms: default_decomposition_timeout_ms(),
            synthesis_timeout_ms: default_synthesis_timeout_ms(),
            loop_window: default_loop_window(),
            loop_threshold: default_loop_threshold(),
        }
    }
}

/// The `[logging]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ResearchConfig {
    /// Load and validate configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ResearchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.orchestrator_config()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Runtime orchestrator settings
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let section = &self.orchestrator;
        OrchestratorConfig {
            max_subtasks: section.max_subtasks,
            max_replans: section.max_replans,
            execution_mode: section.execution_mode,
            worker_timeout: Duration::from_millis(section.worker_timeout_ms),
            phase_timeout: Duration::from_millis(section.phase_timeout_ms),
            decomposition_timeout: Duration::from_millis(section.decomposition_timeout_ms),
            synthesis_timeout: Duration::from_millis(section.synthesis_timeout_ms),
            loop_window: section.loop_window,
            loop_threshold: section.loop_threshold,
        }
    }
}
