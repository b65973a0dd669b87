//! worldgate-core: shared types and configuration for the worldgate
//! instance orchestrator.

pub mod config;
pub mod types;

pub use config::{ConfigError, WorldgateConfig, parse_duration};
pub use types::*;
