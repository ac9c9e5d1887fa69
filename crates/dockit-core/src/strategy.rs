//! Substitutable naming strategies.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::{BuildOptions, ImageReference, Project, Result, Revision};

/// Chooses the Dockerfile for a project.
///
/// Returns exactly one path relative to the project root. Existence is not
/// checked; a missing file fails the build.
#[async_trait]
pub trait DockerfileLocator: Send + Sync {
    async fn locate(&self, project: &Project) -> Result<PathBuf>;
}

#[async_trait]
impl<F> DockerfileLocator for F
where
    F: Fn(&Project) -> PathBuf + Send + Sync,
{
    async fn locate(&self, project: &Project) -> Result<PathBuf> {
        Ok(self(project))
    }
}

/// Computes the images a build produces.
///
/// Must be side-effect free and return the same references when called
/// again for the same revision.
#[async_trait]
pub trait ImageNameCreator: Send + Sync {
    async fn create_names(
        &self,
        project: &Project,
        revision: &Revision,
        options: &BuildOptions,
    ) -> Result<Vec<ImageReference>>;
}
