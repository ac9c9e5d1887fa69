//! KDL configuration parsing for dockit.
//!
//! This crate handles parsing of:
//! - The `docker.build` options namespace
//! - Orchestrator endpoints (GraphQL, webhooks, workspace)

pub mod error;
pub mod file;
mod kdl_ext;

pub use error::{ConfigError, ConfigResult};
pub use file::{DockitConfig, OrchestratorConfig, load_config, parse_config, parse_config_with_env};
