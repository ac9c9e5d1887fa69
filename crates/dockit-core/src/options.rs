//! Build options and registry credentials.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::goal::ExecutionMode;

/// The external tool used to produce images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Builder {
    #[default]
    Docker,
    Kaniko,
}

impl Builder {
    /// Executable used when no builder path is configured.
    pub fn default_path(&self) -> &'static str {
        match self {
            Builder::Docker => "docker",
            Builder::Kaniko => "/kaniko/executor",
        }
    }

    /// Arguments of the no-op invocation used to check availability.
    pub fn probe_args(&self) -> &'static [&'static str] {
        match self {
            Builder::Docker => &["help"],
            Builder::Kaniko => &["--help"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Builder::Docker => "docker",
            Builder::Kaniko => "kaniko",
        }
    }
}

impl fmt::Display for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Builder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Builder::Docker),
            "kaniko" => Ok(Builder::Kaniko),
            other => Err(format!("unknown builder '{}', expected docker or kaniko", other)),
        }
    }
}

/// Credentials for one container registry.
///
/// An empty `host` means the default registry (Docker Hub).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredential {
    pub host: String,
    pub user: Option<String>,
    pub secret: Option<String>,
    /// Display name for external links.
    pub label: Option<String>,
    /// Whether pushed images get an external URL in the goal result.
    pub display: bool,
}

impl RegistryCredential {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_login(mut self, user: impl Into<String>, secret: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.secret = Some(secret.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn displayed(mut self, display: bool) -> Self {
        self.display = display;
        self
    }

    /// Both user and secret are present and non-empty.
    pub fn has_login(&self) -> bool {
        non_empty(&self.user) && non_empty(&self.secret)
    }

    /// Hosts like `registry.example.com` or `localhost:5000` are passed to
    /// `docker login` explicitly; a bare account name such as `myorg` is
    /// treated as a Docker Hub namespace.
    pub fn is_custom_host(&self) -> bool {
        self.host.chars().any(|c| !c.is_ascii_alphanumeric())
    }

    /// Names of the fields a push to this registry still needs.
    pub fn missing_push_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("registry");
        }
        if !non_empty(&self.user) {
            missing.push("user");
        }
        if !non_empty(&self.secret) {
            missing.push("password");
        }
        missing
    }
}

// Keeps the secret out of logs and panics.
impl fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredential")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("label", &self.label)
            .field("display", &self.display)
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Fully merged options for a Docker goal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Explicit push setting; `None` pushes everywhere except local mode.
    pub push: Option<bool>,
    /// Registries to log in to and push to.
    pub registries: Vec<RegistryCredential>,
    pub builder: Builder,
    /// Extra arguments appended to `docker build` (or passed to `docker run`).
    pub builder_args: Vec<String>,
    /// Builder executable; defaults to [`Builder::default_path`].
    pub builder_path: Option<String>,
    /// Dockerfile path relative to the project root.
    pub dockerfile: Option<PathBuf>,
    /// Raw docker `config.json` contents.
    pub config: Option<String>,
}

impl BuildOptions {
    pub fn builder_path(&self) -> &str {
        self.builder_path
            .as_deref()
            .unwrap_or_else(|| self.builder.default_path())
    }

    /// Configuration wins over discovery: a raw config or any explicit
    /// registry disables the credential store lookup.
    pub fn has_explicit_registries(&self) -> bool {
        self.config.is_some() || !self.registries.is_empty()
    }

    pub fn push_enabled(&self, mode: ExecutionMode) -> bool {
        self.push.unwrap_or(mode != ExecutionMode::Local)
    }

    /// Overlay runtime-discovered registries.
    pub fn with_registries(mut self, registries: Vec<RegistryCredential>) -> Self {
        self.registries = registries;
        self
    }

    /// Apply an overlay on top of these options. Set fields in the overlay win.
    pub fn merge(mut self, overlay: BuildOptionsOverlay) -> Self {
        if overlay.push.is_some() {
            self.push = overlay.push;
        }
        if let Some(registries) = overlay.registries {
            self.registries = registries;
        }
        if overlay.registry.is_some() || overlay.user.is_some() || overlay.password.is_some() {
            if self.registries.is_empty() {
                self.registries.push(RegistryCredential::default());
            }
            let first = &mut self.registries[0];
            if let Some(host) = overlay.registry {
                first.host = host;
            }
            if overlay.user.is_some() {
                first.user = overlay.user;
            }
            if overlay.password.is_some() {
                first.secret = overlay.password;
            }
        }
        if let Some(builder) = overlay.builder {
            self.builder = builder;
        }
        if let Some(args) = overlay.builder_args {
            self.builder_args = args;
        }
        if overlay.builder_path.is_some() {
            self.builder_path = overlay.builder_path;
        }
        if overlay.dockerfile.is_some() {
            self.dockerfile = overlay.dockerfile;
        }
        if overlay.config.is_some() {
            self.config = overlay.config;
        }
        self
    }
}

/// A partial set of options, as read from a configuration layer or a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptionsOverlay {
    pub push: Option<bool>,
    pub registries: Option<Vec<RegistryCredential>>,
    /// Shorthand for the first registry's host.
    pub registry: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub builder: Option<Builder>,
    pub builder_args: Option<Vec<String>>,
    pub builder_path: Option<String>,
    pub dockerfile: Option<PathBuf>,
    pub config: Option<String>,
}

impl BuildOptionsOverlay {
    /// Combine two overlays; fields set in `other` win.
    pub fn then(self, other: BuildOptionsOverlay) -> Self {
        Self {
            push: other.push.or(self.push),
            registries: other.registries.or(self.registries),
            registry: other.registry.or(self.registry),
            user: other.user.or(self.user),
            password: other.password.or(self.password),
            builder: other.builder.or(self.builder),
            builder_args: other.builder_args.or(self.builder_args),
            builder_path: other.builder_path.or(self.builder_path),
            dockerfile: other.dockerfile.or(self.dockerfile),
            config: other.config.or(self.config),
        }
    }
}
