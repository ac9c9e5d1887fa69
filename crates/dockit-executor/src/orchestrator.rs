//! HTTP client for the orchestrator's GraphQL and webhook APIs.

use async_trait::async_trait;
use dockit_core::{
    CredentialStore, Error, ImageLink, ImageLinker, RegistryProvider, RegistrySecret, Result,
    Revision, VersionSource,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

const REGISTRY_PROVIDERS_QUERY: &str = r#"query DockerRegistryProviders {
  DockerRegistryProvider {
    id
    name
    url
    credential { id }
  }
}"#;

const CREDENTIAL_QUERY: &str = r#"query CredentialById($id: ID!) {
  Credential(id: $id) {
    owner { login }
    secret
  }
}"#;

const VERSION_QUERY: &str = r#"query BuildVersion($owner: String!, $repo: String!, $sha: String!, $branch: String!) {
  BuildVersion(owner: $owner, repo: $repo, sha: $sha, branch: $branch) {
    version
  }
}"#;

/// Orchestrator API client.
///
/// Implements the credential store, version service and image-link
/// collaborators over one `reqwest` client.
pub struct OrchestratorClient {
    client: reqwest::Client,
    graphql_url: Url,
    webhook_url: Url,
    token: Option<String>,
}

impl OrchestratorClient {
    pub fn new(graphql_url: Url, webhook_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            graphql_url,
            webhook_url,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Run a GraphQL query and return its `data`.
    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> std::result::Result<T, OrchestratorError> {
        let mut request = self
            .client
            .post(self.graphql_url.clone())
            .header("User-Agent", "dockit")
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OrchestratorError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::Api(format!("{}: {}", status, text)));
        }

        let body: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| OrchestratorError::Parse(e.to_string()))?;

        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(OrchestratorError::Api(messages.join("; ")));
        }

        body.data
            .ok_or_else(|| OrchestratorError::Parse("response has no data".to_string()))
    }

    /// `<webhook>/link-image/teams/<workspace>`
    pub fn link_image_url(&self, workspace_id: &str) -> std::result::Result<Url, OrchestratorError> {
        let mut url = self.webhook_url.clone();
        url.path_segments_mut()
            .map_err(|_| OrchestratorError::InvalidUrl(self.webhook_url.to_string()))?
            .pop_if_empty()
            .extend(["link-image", "teams", workspace_id]);
        Ok(url)
    }
}

/// Body of an image-link webhook call.
pub fn link_payload(link: &ImageLink) -> Value {
    json!({
        "git": {
            "owner": link.owner,
            "repo": link.repo,
            "sha": link.sha,
        },
        "docker": {
            "image": link.image,
        },
        "type": "link-image",
    })
}

#[async_trait]
impl CredentialStore for OrchestratorClient {
    async fn registry_providers(&self) -> Result<Vec<RegistryProvider>> {
        let data: ProvidersData = self
            .query(REGISTRY_PROVIDERS_QUERY, json!({}))
            .await
            .map_err(|e| Error::CredentialStore(e.to_string()))?;

        debug!(count = data.providers.len(), "Fetched registry providers");
        Ok(data
            .providers
            .into_iter()
            .map(|p| RegistryProvider {
                id: p.id,
                name: p.name,
                url: p.url,
                credential_id: p.credential.map(|c| c.id),
            })
            .collect())
    }

    async fn secret(&self, credential_id: &str) -> Result<Option<RegistrySecret>> {
        let data: CredentialData = self
            .query(CREDENTIAL_QUERY, json!({ "id": credential_id }))
            .await
            .map_err(|e| Error::CredentialStore(e.to_string()))?;

        Ok(data.credentials.into_iter().next().map(|c| RegistrySecret {
            owner_login: c.owner.login,
            secret: c.secret,
        }))
    }
}

#[async_trait]
impl VersionSource for OrchestratorClient {
    async fn version(&self, revision: &Revision) -> Result<String> {
        let data: VersionData = self
            .query(
                VERSION_QUERY,
                json!({
                    "owner": revision.owner,
                    "repo": revision.repo,
                    "sha": revision.sha,
                    "branch": revision.branch,
                }),
            )
            .await
            .map_err(|e| Error::VersionLookup(e.to_string()))?;

        data.versions
            .into_iter()
            .next()
            .map(|v| v.version)
            .ok_or_else(|| {
                Error::VersionLookup(format!(
                    "no version recorded for {}@{}",
                    revision.slug(),
                    revision.sha
                ))
            })
    }
}

#[async_trait]
impl ImageLinker for OrchestratorClient {
    async fn link_image(&self, link: &ImageLink) -> Result<bool> {
        let url = self
            .link_image_url(&link.workspace_id)
            .map_err(|e| Error::NotificationFailed(e.to_string()))?;

        let mut request = self
            .client
            .post(url)
            .header("User-Agent", "dockit")
            .json(&link_payload(link));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::NotificationFailed(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), image = %link.image, "Image link rejected");
            return Ok(false);
        }

        Ok(true)
    }
}

/// Accepts every link without contacting an orchestrator.
///
/// For local runs where there is no orchestrator to notify.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalImageLinker;

#[async_trait]
impl ImageLinker for LocalImageLinker {
    async fn link_image(&self, link: &ImageLink) -> Result<bool> {
        info!(
            image = %link.image,
            repo = %format!("{}/{}", link.owner, link.repo),
            sha = %link.sha,
            "Image built"
        );
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ProvidersData {
    #[serde(rename = "DockerRegistryProvider", default)]
    providers: Vec<ProviderNode>,
}

#[derive(Debug, Deserialize)]
struct ProviderNode {
    id: String,
    name: String,
    url: String,
    credential: Option<IdNode>,
}

#[derive(Debug, Deserialize)]
struct IdNode {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CredentialData {
    #[serde(rename = "Credential", default)]
    credentials: Vec<CredentialNode>,
}

#[derive(Debug, Deserialize)]
struct CredentialNode {
    owner: OwnerNode,
    secret: String,
}

#[derive(Debug, Deserialize)]
struct OwnerNode {
    login: String,
}

#[derive(Debug, Deserialize)]
struct VersionData {
    #[serde(rename = "BuildVersion", default)]
    versions: Vec<VersionNode>,
}

#[derive(Debug, Deserialize)]
struct VersionNode {
    version: String,
}

/// Orchestrator API errors.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}
