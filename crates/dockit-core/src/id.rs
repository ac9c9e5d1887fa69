//! Invocation identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Identifies a single goal invocation.
///
/// Time-ordered (UUIDv7) so scratch directories sort by start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct InvocationId(Uuid);

impl InvocationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The `DOCKER_CONFIG` directory for this invocation under `base`.
    ///
    /// Concurrent invocations on one host never share a directory, so their
    /// `docker login` sessions stay apart.
    pub fn docker_config_dir(&self, base: &Path) -> PathBuf {
        base.join(self.0.to_string()).join(".docker")
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for InvocationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_config_dir_is_scoped_per_invocation() {
        let base = Path::new("/tmp/dockit");
        let a = InvocationId::new();
        let b = InvocationId::new();

        assert_ne!(a.docker_config_dir(base), b.docker_config_dir(base));
        assert!(a.docker_config_dir(base).starts_with(base));
        assert!(a.docker_config_dir(base).ends_with(".docker"));
    }

    #[test]
    fn test_parse_round_trip() {
        let id = InvocationId::new();
        let parsed: InvocationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
