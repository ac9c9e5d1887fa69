//! Image references.

use serde::{Deserialize, Serialize};

/// A named image with one or more tags, optionally under a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub registry: Option<String>,
    pub name: String,
    pub tags: Vec<String>,
}

impl ImageReference {
    pub fn new(registry: Option<String>, name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            registry: registry.filter(|r| !r.is_empty()),
            name: name.into(),
            tags: vec![tag.into()],
        }
    }

    /// `registry/name` without a tag.
    pub fn repository(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry.trim_end_matches('/'), self.name),
            None => self.name.clone(),
        }
    }

    /// One `registry/name:tag` string per tag.
    pub fn references(&self) -> Vec<String> {
        let repository = self.repository();
        self.tags
            .iter()
            .map(|tag| format!("{}:{}", repository, tag))
            .collect()
    }

    /// Browser URL for the repository.
    ///
    /// Hub namespaces (no dot or colon in the registry) link to hub.docker.com.
    pub fn browse_url(&self) -> String {
        match &self.registry {
            Some(registry) if registry.contains('.') || registry.contains(':') => {
                format!("https://{}", self.repository())
            }
            Some(namespace) => format!("https://hub.docker.com/r/{}/{}", namespace, self.name),
            None => format!("https://hub.docker.com/_/{}", self.name),
        }
    }
}

/// Flatten references in order: every tag of the first image, then the next.
pub fn flatten_references(images: &[ImageReference]) -> Vec<String> {
    images.iter().flat_map(|i| i.references()).collect()
}
