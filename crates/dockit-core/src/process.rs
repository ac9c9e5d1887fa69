//! External process invocation.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::{ExecutionResult, LogSink, Result};

/// Secrets shorter than this are only masked as whole words.
const MIN_SUBSTRING_SECRET_LEN: usize = 4;

const MASK: &str = "***";

/// A command to run, with its environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the ambient environment.
    pub env: BTreeMap<String, String>,
    pub current_dir: Option<PathBuf>,
    /// Values masked whenever the command line is displayed.
    pub secrets: Vec<String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Mark an argument value as secret.
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.push(value);
        }
        self
    }

    /// The subcommand (first argument), e.g. `build` for `docker build`.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Command line with secrets replaced by `***`.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if self.secrets.iter().any(|secret| secret == arg) {
                line.push_str(MASK);
            } else {
                line.push_str(&self.mask(arg));
            }
        }
        line
    }

    /// Replace every secret occurring in `text`.
    ///
    /// Short secrets would match inside ordinary words, so they are only
    /// replaced where they stand alone between spaces.
    pub fn mask(&self, text: &str) -> String {
        self.secrets.iter().fold(text.to_string(), |acc, secret| {
            if secret.chars().count() >= MIN_SUBSTRING_SECRET_LEN {
                acc.replace(secret.as_str(), MASK)
            } else {
                acc.split(' ')
                    .map(|word| if word == secret { MASK } else { word })
                    .collect::<Vec<_>>()
                    .join(" ")
            }
        })
    }
}

/// Spawns external executables.
///
/// A nonzero exit is reported as an `Ok` result with that code; `Err` is
/// reserved for failing to run the process at all, or cancellation.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        spec: &ProcessSpec,
        log: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_masks_secrets() {
        let spec = ProcessSpec::new("docker")
            .args(["login", "--username", "bot", "--password", "hunter2"])
            .secret("hunter2");

        assert_eq!(
            spec.display(),
            "docker login --username bot --password ***"
        );
        assert_eq!(spec.mask("token hunter2 rejected"), "token *** rejected");
        assert_eq!(spec.subcommand(), Some("login"));
    }

    #[test]
    fn test_short_secret_only_masks_whole_words() {
        let spec = ProcessSpec::new("docker")
            .args(["login", "--username", "a", "--password", "a"])
            .secret("a");

        assert_eq!(spec.display(), "docker login --username *** --password ***");
        assert_eq!(
            spec.mask("docker build . -t api:latest"),
            "docker build . -t api:latest"
        );
        assert_eq!(spec.mask("password a rejected"), "password *** rejected");
    }

    #[test]
    fn test_long_secret_masked_inside_words() {
        let spec = ProcessSpec::new("sh").secret("s3cr3t");
        assert_eq!(spec.mask("auth=s3cr3t;"), "auth=***;");
    }

    #[test]
    fn test_empty_secret_is_ignored() {
        let spec = ProcessSpec::new("docker").arg("push").secret("");
        assert!(spec.secrets.is_empty());
        assert_eq!(spec.display(), "docker push");
    }
}
