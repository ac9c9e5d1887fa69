//! `dockit.kdl` parsing.

use crate::kdl_ext::{
    get_all_string_args, get_bool_prop, get_first_bool_arg, get_first_string_arg,
    get_string_prop,
};
use crate::{ConfigError, ConfigResult};
use dockit_core::{BuildOptionsOverlay, Builder, RegistryCredential};
use kdl::{KdlDocument, KdlNode};
use std::path::{Path, PathBuf};
use url::Url;

/// Parsed contents of a `dockit.kdl` file.
#[derive(Debug, Clone, Default)]
pub struct DockitConfig {
    /// Project name override; defaults to the repository name.
    pub project: Option<String>,
    /// The `docker.build` namespace, as an overlay over the defaults.
    pub build: BuildOptionsOverlay,
    pub orchestrator: Option<OrchestratorConfig>,
}

/// Where the orchestrator's APIs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub graphql_url: Url,
    pub webhook_url: Url,
    pub workspace: Option<String>,
    pub token: Option<String>,
}

/// Read and parse a configuration file, resolving `*-env` values from the
/// process environment.
pub fn load_config(path: &Path) -> ConfigResult<DockitConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse configuration from KDL text.
pub fn parse_config(kdl: &str) -> ConfigResult<DockitConfig> {
    parse_config_with_env(kdl, |name| std::env::var(name).ok())
}

/// Parse configuration, looking up `*-env` references with `env`.
pub fn parse_config_with_env<F>(kdl: &str, env: F) -> ConfigResult<DockitConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let doc: KdlDocument = kdl.parse()?;
    let mut config = DockitConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                config.project = Some(
                    get_first_string_arg(node)
                        .ok_or_else(|| ConfigError::MissingField("project name".to_string()))?,
                );
            }
            "docker" => {
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        if child.name().value() == "build" {
                            config.build = parse_build(child, &env)?;
                        }
                    }
                }
            }
            "orchestrator" => {
                config.orchestrator = Some(parse_orchestrator(node, &env)?);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_build<F>(node: &KdlNode, env: &F) -> ConfigResult<BuildOptionsOverlay>
where
    F: Fn(&str) -> Option<String>,
{
    let mut overlay = BuildOptionsOverlay::default();
    let mut registries = Vec::new();

    let Some(children) = node.children() else {
        return Ok(overlay);
    };

    for child in children.nodes() {
        match child.name().value() {
            "push" => {
                overlay.push = Some(get_first_bool_arg(child).ok_or_else(|| {
                    ConfigError::InvalidValue {
                        field: "push".to_string(),
                        message: "expected #true or #false".to_string(),
                    }
                })?);
            }
            "builder" => {
                let value = get_first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("builder".to_string()))?;
                let builder = value
                    .parse::<Builder>()
                    .map_err(|message| ConfigError::InvalidValue {
                        field: "builder".to_string(),
                        message,
                    })?;
                overlay.builder = Some(builder);
            }
            "builder-path" => {
                overlay.builder_path = get_first_string_arg(child);
            }
            "builder-args" => {
                overlay.builder_args = Some(get_all_string_args(child));
            }
            "dockerfile" => {
                overlay.dockerfile = get_first_string_arg(child).map(PathBuf::from);
            }
            "config" => {
                let raw = secret_value(child, "env", env)?
                    .ok_or_else(|| ConfigError::MissingField("config".to_string()))?;
                validate_docker_config(&raw)?;
                overlay.config = Some(raw);
            }
            "registry" => {
                registries.push(parse_registry(child, env)?);
            }
            "user" => {
                overlay.user = get_first_string_arg(child);
            }
            "password" => {
                overlay.password = secret_value(child, "env", env)?;
            }
            _ => {}
        }
    }

    if !registries.is_empty() {
        overlay.registries = Some(registries);
    }

    Ok(overlay)
}

fn parse_registry<F>(node: &KdlNode, env: &F) -> ConfigResult<RegistryCredential>
where
    F: Fn(&str) -> Option<String>,
{
    let host = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("registry host".to_string()))?;

    let password = match get_string_prop(node, "password") {
        Some(password) => Some(password),
        None => match get_string_prop(node, "password-env") {
            Some(var) => Some(env(&var).ok_or(ConfigError::MissingEnv(var))?),
            None => None,
        },
    };

    Ok(RegistryCredential {
        host,
        user: get_string_prop(node, "user"),
        secret: password,
        label: get_string_prop(node, "label"),
        display: get_bool_prop(node, "display").unwrap_or(false),
    })
}

fn parse_orchestrator<F>(node: &KdlNode, env: &F) -> ConfigResult<OrchestratorConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut graphql_url = None;
    let mut webhook_url = None;
    let mut workspace = None;
    let mut token = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "graphql-url" => graphql_url = Some(parse_url(child, "graphql-url")?),
                "webhook-url" => webhook_url = Some(parse_url(child, "webhook-url")?),
                "workspace" => workspace = get_first_string_arg(child),
                "token" => token = secret_value(child, "env", env)?,
                _ => {}
            }
        }
    }

    Ok(OrchestratorConfig {
        graphql_url: graphql_url
            .ok_or_else(|| ConfigError::MissingField("orchestrator graphql-url".to_string()))?,
        webhook_url: webhook_url
            .ok_or_else(|| ConfigError::MissingField("orchestrator webhook-url".to_string()))?,
        workspace,
        token,
    })
}

fn parse_url(node: &KdlNode, field: &str) -> ConfigResult<Url> {
    let raw = get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    Url::parse(&raw).map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        message: e.to_string(),
    })
}

/// A literal first argument, or the value of the variable named by `env_prop`.
fn secret_value<F>(node: &KdlNode, env_prop: &str, env: &F) -> ConfigResult<Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = get_first_string_arg(node) {
        return Ok(Some(value));
    }
    match get_string_prop(node, env_prop) {
        Some(var) => env(&var).map(Some).ok_or(ConfigError::MissingEnv(var)),
        None => Ok(None),
    }
}

fn validate_docker_config(raw: &str) -> ConfigResult<()> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            message: e.to_string(),
        })?;
    if !value.is_object() {
        return Err(ConfigError::InvalidValue {
            field: "config".to_string(),
            message: "docker config must be a JSON object".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_full_build_section() {
        let kdl = r#"
            project "api"

            docker {
                build {
                    push #true
                    builder "docker"
                    builder-path "/usr/local/bin/docker"
                    builder-args "--pull" "--no-cache"
                    dockerfile "docker/Dockerfile"
                    registry "registry.example.com" user="bot" password="s3cret" label="Example" display=#true
                }
            }
        "#;

        let config = parse_config_with_env(kdl, no_env).unwrap();
        assert_eq!(config.project.as_deref(), Some("api"));

        let build = config.build;
        assert_eq!(build.push, Some(true));
        assert_eq!(build.builder, Some(Builder::Docker));
        assert_eq!(build.builder_path.as_deref(), Some("/usr/local/bin/docker"));
        assert_eq!(
            build.builder_args,
            Some(vec!["--pull".to_string(), "--no-cache".to_string()])
        );
        assert_eq!(build.dockerfile, Some(PathBuf::from("docker/Dockerfile")));

        let registries = build.registries.unwrap();
        assert_eq!(registries.len(), 1);
        assert_eq!(registries[0].host, "registry.example.com");
        assert_eq!(registries[0].user.as_deref(), Some("bot"));
        assert_eq!(registries[0].secret.as_deref(), Some("s3cret"));
        assert_eq!(registries[0].label.as_deref(), Some("Example"));
        assert!(registries[0].display);
    }

    #[test]
    fn test_parse_shorthand_credentials_from_env() {
        let kdl = r#"
            docker {
                build {
                    user "bot"
                    password env="REGISTRY_PASSWORD"
                }
            }
        "#;

        let vars: HashMap<&str, &str> = [("REGISTRY_PASSWORD", "from-env")].into();
        let config =
            parse_config_with_env(kdl, |name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.build.user.as_deref(), Some("bot"));
        assert_eq!(config.build.password.as_deref(), Some("from-env"));
        assert!(config.build.registries.is_none());
    }

    #[test]
    fn test_missing_env_is_an_error() {
        let kdl = r#"
            docker {
                build {
                    registry "ghcr.io" user="bot" password-env="GHCR_TOKEN"
                }
            }
        "#;

        let result = parse_config_with_env(kdl, no_env);
        assert!(matches!(result, Err(ConfigError::MissingEnv(var)) if var == "GHCR_TOKEN"));
    }

    #[test]
    fn test_unknown_builder_rejected() {
        let kdl = r#"
            docker {
                build {
                    builder "buildah"
                }
            }
        "#;

        let result = parse_config_with_env(kdl, no_env);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "builder"
        ));
    }

    #[test]
    fn test_raw_config_must_be_json_object() {
        let good = r#"
            docker {
                build {
                    config "{\"auths\":{}}"
                }
            }
        "#;
        let config = parse_config_with_env(good, no_env).unwrap();
        assert_eq!(config.build.config.as_deref(), Some("{\"auths\":{}}"));

        let bad = r#"
            docker {
                build {
                    config "[1, 2]"
                }
            }
        "#;
        assert!(parse_config_with_env(bad, no_env).is_err());
    }

    #[test]
    fn test_parse_orchestrator() {
        let kdl = r#"
            orchestrator {
                graphql-url "https://api.example.com/graphql"
                webhook-url "https://webhook.example.com"
                workspace "T123"
                token env="DOCKIT_TOKEN"
            }
        "#;

        let config =
            parse_config_with_env(kdl, |name| (name == "DOCKIT_TOKEN").then(|| "tok".to_string()))
                .unwrap();
        let orchestrator = config.orchestrator.unwrap();
        assert_eq!(orchestrator.graphql_url.as_str(), "https://api.example.com/graphql");
        assert_eq!(orchestrator.workspace.as_deref(), Some("T123"));
        assert_eq!(orchestrator.token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_orchestrator_requires_urls() {
        let kdl = r#"
            orchestrator {
                workspace "T123"
            }
        "#;

        let result = parse_config_with_env(kdl, no_env);
        assert!(matches!(result, Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_empty_document() {
        let config = parse_config_with_env("", no_env).unwrap();
        assert!(config.project.is_none());
        assert_eq!(config.build, BuildOptionsOverlay::default());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dockit.kdl");
        std::fs::write(
            &path,
            r#"
            docker {
                build {
                    push #false
                }
            }
            "#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.build.push, Some(false));
    }
}
