//! Collaborators provided by the delivery orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Result, Revision};

/// A Docker registry registered with the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryProvider {
    pub id: String,
    pub name: String,
    /// Registry URL, usually with a scheme (`https://registry.example.com`).
    pub url: String,
    pub credential_id: Option<String>,
}

/// A secret held for a registry provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySecret {
    pub owner_login: String,
    pub secret: String,
}

impl std::fmt::Debug for RegistrySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrySecret")
            .field("owner_login", &self.owner_login)
            .finish_non_exhaustive()
    }
}

/// Read-only access to registry credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// All Docker registry providers for the workspace.
    async fn registry_providers(&self) -> Result<Vec<RegistryProvider>>;

    /// Secret by credential id; `None` when the store has no such secret.
    async fn secret(&self, credential_id: &str) -> Result<Option<RegistrySecret>>;
}

/// Resolves the build version for a revision.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn version(&self, revision: &Revision) -> Result<String>;
}

/// Payload of an image-link notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLink {
    pub owner: String,
    pub repo: String,
    pub sha: String,
    pub image: String,
    pub workspace_id: String,
}

/// Tells the orchestrator which image a revision produced.
#[async_trait]
pub trait ImageLinker: Send + Sync {
    /// `Ok(false)` means the orchestrator rejected the link.
    async fn link_image(&self, link: &ImageLink) -> Result<bool>;
}
