//! Docker goal execution for dockit.
//!
//! Provides:
//! - A tokio-based process runner that streams output to log sinks
//! - Registry credential resolution against the orchestrator's store
//! - Default Dockerfile and image naming strategies
//! - The goal state machine (check, login, build, push, run, link)
//! - An HTTP client for the orchestrator's GraphQL and webhook APIs

pub mod goal;
pub mod naming;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod registry;
pub mod sink;

pub use goal::{DockerGoalExecutor, GoalVariant, RunSpec};
pub use naming::{DefaultDockerfile, DefaultImageNameCreator, FixedDockerfile, LocalVersionSource};
pub use orchestrator::{LocalImageLinker, OrchestratorClient, OrchestratorError};
pub use process::{TokioProcessRunner, check_builder};
pub use progress::{Phase, ProgressReporter};
pub use registry::RegistryResolver;
pub use sink::{ChannelSink, DiscardSink, MemorySink, TracingSink};
