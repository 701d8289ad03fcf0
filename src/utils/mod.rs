/// Tracing subscriber initialization.
pub mod logging;
/// TOML configuration (`research.toml`) loading and validation.
pub mod toml_config;

pub use logging::init_tracing;
pub use toml_config::{ConfigError, LoggingConfig, OrchestratorSection, ResearchConfig};
