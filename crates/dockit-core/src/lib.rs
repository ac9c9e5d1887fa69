//! Core domain types and traits for dockit.
//!
//! This crate contains:
//! - Build options, registry credentials and image references
//! - Goal invocation context and execution results
//! - Process runner and log sink traits
//! - Collaborator traits for the orchestrator (credential store, versions, image links)
//! - Naming strategy traits (Dockerfile locator, image name creator)

pub mod error;
pub mod goal;
pub mod id;
pub mod image;
pub mod log;
pub mod options;
pub mod orchestrator;
pub mod process;
pub mod strategy;

pub use error::{Error, Result};
pub use goal::{ExecutionMode, ExecutionResult, ExternalUrl, GoalInvocation, Project, Revision};
pub use id::InvocationId;
pub use image::ImageReference;
pub use log::{LogLine, LogSink, LogStream};
pub use orchestrator::{
    CredentialStore, ImageLink, ImageLinker, RegistryProvider, RegistrySecret, VersionSource,
};
pub use options::{BuildOptions, BuildOptionsOverlay, Builder, RegistryCredential};
pub use process::{ProcessRunner, ProcessSpec};
pub use strategy::{DockerfileLocator, ImageNameCreator};
