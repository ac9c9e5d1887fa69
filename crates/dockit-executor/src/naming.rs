//! Default Dockerfile and image naming strategies.

use async_trait::async_trait;
use dockit_core::{
    BuildOptions, DockerfileLocator, ImageNameCreator, ImageReference, Project, Result, Revision,
    VersionSource,
};
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

/// `Dockerfile` in the project root.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDockerfile;

#[async_trait]
impl DockerfileLocator for DefaultDockerfile {
    async fn locate(&self, _project: &Project) -> Result<PathBuf> {
        Ok(PathBuf::from("Dockerfile"))
    }
}

/// A configured path relative to the project root.
#[derive(Debug, Clone)]
pub struct FixedDockerfile(PathBuf);

impl FixedDockerfile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }
}

#[async_trait]
impl DockerfileLocator for FixedDockerfile {
    async fn locate(&self, _project: &Project) -> Result<PathBuf> {
        Ok(self.0.clone())
    }
}

// Characters docker accepts in a tag
static INVALID_TAG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]+").unwrap());

// Characters docker accepts in a repository name component
static INVALID_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_./-]+").unwrap());

/// Name = project name, tag = build version of the revision.
///
/// Produces one reference per configured registry, or a single
/// registry-less reference when none is configured.
pub struct DefaultImageNameCreator {
    versions: Arc<dyn VersionSource>,
}

impl DefaultImageNameCreator {
    pub fn new(versions: Arc<dyn VersionSource>) -> Self {
        Self { versions }
    }
}

#[async_trait]
impl ImageNameCreator for DefaultImageNameCreator {
    async fn create_names(
        &self,
        project: &Project,
        revision: &Revision,
        options: &BuildOptions,
    ) -> Result<Vec<ImageReference>> {
        let version = self.versions.version(revision).await?;
        let tag = sanitize_tag(&version);
        let name = sanitize_name(&project.name);

        let mut hosts: Vec<&str> = Vec::new();
        for registry in &options.registries {
            if !registry.host.is_empty() && !hosts.contains(&registry.host.as_str()) {
                hosts.push(&registry.host);
            }
        }

        if hosts.is_empty() {
            return Ok(vec![ImageReference::new(None, name, tag)]);
        }

        Ok(hosts
            .into_iter()
            .map(|host| ImageReference::new(Some(host.to_string()), name.clone(), tag.clone()))
            .collect())
    }
}

/// Make a string usable as a docker tag (max 128 chars, no leading `.`/`-`).
pub fn sanitize_tag(raw: &str) -> String {
    let tag = INVALID_TAG_CHARS.replace_all(raw.trim(), "-");
    let tag = tag.trim_start_matches(['.', '-']);
    let tag: String = tag.chars().take(128).collect();
    if tag.is_empty() {
        "latest".to_string()
    } else {
        tag
    }
}

/// Lowercase a project name and replace characters docker rejects.
pub fn sanitize_name(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    INVALID_NAME_CHARS
        .replace_all(&lower, "-")
        .trim_matches(['-', '.', '_', '/'])
        .to_string()
}

/// Version computed from the revision alone: `<base>-<short sha>`.
///
/// Used when no orchestrator version service is configured.
#[derive(Debug, Clone)]
pub struct LocalVersionSource {
    base: String,
}

impl LocalVersionSource {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

impl Default for LocalVersionSource {
    fn default() -> Self {
        Self::new("0.1.0")
    }
}

#[async_trait]
impl VersionSource for LocalVersionSource {
    async fn version(&self, revision: &Revision) -> Result<String> {
        if revision.sha.is_empty() {
            return Ok(self.base.clone());
        }
        Ok(format!("{}-{}", self.base, revision.short_sha()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockit_core::RegistryCredential;

    fn revision() -> Revision {
        Revision {
            owner: "acme".to_string(),
            repo: "api".to_string(),
            sha: "9f2c4e1d0b".to_string(),
            branch: "main".to_string(),
        }
    }

    fn creator() -> DefaultImageNameCreator {
        DefaultImageNameCreator::new(Arc::new(LocalVersionSource::new("1.4.0")))
    }

    #[tokio::test]
    async fn test_default_dockerfile() {
        let project = Project::new("api", "/work/api");
        assert_eq!(
            DefaultDockerfile.locate(&project).await.unwrap(),
            PathBuf::from("Dockerfile")
        );
        assert_eq!(
            FixedDockerfile::new("docker/api.Dockerfile")
                .locate(&project)
                .await
                .unwrap(),
            PathBuf::from("docker/api.Dockerfile")
        );
    }

    #[tokio::test]
    async fn test_closure_locator() {
        let locator = |project: &Project| PathBuf::from(format!("{}.Dockerfile", project.name));
        let path = locator.locate(&Project::new("web", "/work/web")).await.unwrap();
        assert_eq!(path, PathBuf::from("web.Dockerfile"));
    }

    #[tokio::test]
    async fn test_name_without_registry() {
        let names = creator()
            .create_names(
                &Project::new("api", "/work/api"),
                &revision(),
                &BuildOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(names.len(), 1);
        assert_eq!(names[0].references(), vec!["api:1.4.0-9f2c4e1"]);
    }

    #[tokio::test]
    async fn test_one_name_per_registry() {
        let options = BuildOptions {
            registries: vec![
                RegistryCredential::new("registry.example.com"),
                RegistryCredential::new("acme"),
                RegistryCredential::new("registry.example.com"),
            ],
            ..Default::default()
        };

        let names = creator()
            .create_names(&Project::new("Api Server", "/w"), &revision(), &options)
            .await
            .unwrap();

        let refs: Vec<String> = names.iter().flat_map(|n| n.references()).collect();
        assert_eq!(
            refs,
            vec![
                "registry.example.com/api-server:1.4.0-9f2c4e1",
                "acme/api-server:1.4.0-9f2c4e1"
            ]
        );
    }

    #[tokio::test]
    async fn test_names_are_idempotent() {
        let creator = creator();
        let project = Project::new("api", "/work/api");
        let options = BuildOptions {
            registries: vec![RegistryCredential::new("ghcr.io/acme")],
            ..Default::default()
        };

        let first = creator
            .create_names(&project, &revision(), &options)
            .await
            .unwrap();
        let second = creator
            .create_names(&project, &revision(), &options)
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_sanitize_tag() {
        assert_eq!(sanitize_tag("1.0.0+build.5"), "1.0.0-build.5");
        assert_eq!(sanitize_tag("feature/login"), "feature-login");
        assert_eq!(sanitize_tag("-.oops"), "oops");
        assert_eq!(sanitize_tag(""), "latest");
        assert_eq!(sanitize_tag(&"a".repeat(200)).len(), 128);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("My_Service"), "my_service");
        assert_eq!(sanitize_name("web app"), "web-app");
    }

    #[tokio::test]
    async fn test_local_version_without_sha() {
        let version = LocalVersionSource::default()
            .version(&Revision::default())
            .await
            .unwrap();
        assert_eq!(version, "0.1.0");
    }
}
