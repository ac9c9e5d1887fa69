//! Goal invocation context and execution results.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{Error, InvocationId, LogSink};

/// Source revision a goal runs against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub owner: String,
    pub repo: String,
    pub sha: String,
    pub branch: String,
}

impl Revision {
    /// First seven characters of the commit SHA.
    pub fn short_sha(&self) -> &str {
        let end = self
            .sha
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.sha.len());
        &self.sha[..end]
    }

    /// `owner/repo`.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// The checked-out project a goal builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
}

impl Project {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }
}

/// How the orchestrator is running this goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Developer machine; pushing is off unless asked for.
    Local,
    #[default]
    Managed,
}

/// Everything the orchestrator hands to one goal invocation.
///
/// All fields are owned by the invocation; nothing here is shared between
/// concurrent goals.
#[derive(Clone)]
pub struct GoalInvocation {
    pub id: InvocationId,
    pub revision: Revision,
    pub workspace_id: String,
    pub project: Project,
    pub mode: ExecutionMode,
    pub log: Arc<dyn LogSink>,
    pub cancel: CancellationToken,
    /// Parent of the per-invocation `DOCKER_CONFIG` directories.
    pub scratch_dir: PathBuf,
}

impl GoalInvocation {
    pub fn new(revision: Revision, project: Project, log: Arc<dyn LogSink>) -> Self {
        Self {
            id: InvocationId::new(),
            revision,
            workspace_id: String::new(),
            project,
            mode: ExecutionMode::default(),
            log,
            cancel: CancellationToken::new(),
            scratch_dir: std::env::temp_dir().join("dockit"),
        }
    }

    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = workspace_id.into();
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn docker_config_dir(&self) -> PathBuf {
        self.id.docker_config_dir(&self.scratch_dir)
    }

    pub fn project_root(&self) -> &Path {
        &self.project.root
    }
}

impl std::fmt::Debug for GoalInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoalInvocation")
            .field("id", &self.id)
            .field("revision", &self.revision)
            .field("workspace_id", &self.workspace_id)
            .field("project", &self.project)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// A link shown next to the goal in the orchestrator UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUrl {
    pub label: Option<String>,
    pub url: String,
}

/// Outcome of a stage or a whole goal. Code `0` is success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub code: i32,
    pub message: Option<String>,
    pub external_urls: Vec<ExternalUrl>,
    /// The orchestrator may schedule the goal again.
    pub retry_feasible: bool,
}

impl ExecutionResult {
    pub fn success() -> Self {
        Self {
            code: 0,
            message: None,
            external_urls: Vec::new(),
            retry_feasible: false,
        }
    }

    /// A failed process or stage; retry-feasible.
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            external_urls: Vec::new(),
            retry_feasible: true,
        }
    }

    pub fn with_external_urls(mut self, urls: Vec<ExternalUrl>) -> Self {
        self.external_urls = urls;
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

impl From<Error> for ExecutionResult {
    fn from(err: Error) -> Self {
        Self {
            code: err.exit_code(),
            message: Some(err.to_string()),
            external_urls: Vec::new(),
            retry_feasible: err.is_retry_feasible(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_sha() {
        let revision = Revision {
            sha: "0123456789abcdef".to_string(),
            ..Default::default()
        };
        assert_eq!(revision.short_sha(), "0123456");

        let short = Revision {
            sha: "abc".to_string(),
            ..Default::default()
        };
        assert_eq!(short.short_sha(), "abc");
    }

    #[test]
    fn test_result_from_error() {
        let result = ExecutionResult::from(Error::NotificationFailed(
            "Image link failed".to_string(),
        ));
        assert_eq!(result.code, 1);
        assert_eq!(result.message.as_deref(), Some("Image link failed"));
        assert!(!result.is_success());

        let fatal = ExecutionResult::from(Error::Configuration("docker missing".to_string()));
        assert!(!fatal.retry_feasible);
    }
}
