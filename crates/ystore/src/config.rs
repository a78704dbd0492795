//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

use ystore_types::ConnectionOptions;

/// Environment variable overriding the repository directory.
pub const REPO_ENV: &str = "YANGSTORE_REPO";

/// Compiled-in default repository directory.
pub const DEFAULT_REPO: &str = "/var/lib/yangstore";

/// Default subscriber-ack timeout for the commit pipeline.
pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of one store instance.
///
/// The repository directory doubles as the shared-region prefix: every
/// process attaching to the same directory shares the same store, and
/// tests isolate instances by pointing each at its own directory.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Where regions, schemas, datastore files, and replay logs live.
    pub repo_dir: PathBuf,
    /// How long commits wait for subscriber acknowledgements.
    pub apply_timeout: Duration,
    /// Uid allowed to elevate a session's effective user.
    pub superuser_uid: u32,
    /// Connection behaviour flags applied to connections using this
    /// config unless they override.
    pub options: ConnectionOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            repo_dir: resolve_repo_dir(),
            apply_timeout: DEFAULT_APPLY_TIMEOUT,
            superuser_uid: 0,
            options: ConnectionOptions::DEFAULT,
        }
    }
}

impl StoreConfig {
    /// A config rooted at an explicit repository directory.
    #[must_use]
    pub fn at(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_apply_timeout(mut self, timeout: Duration) -> Self {
        self.apply_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Explicit override beats the environment beats the compiled default.
fn resolve_repo_dir() -> PathBuf {
    std::env::var_os(REPO_ENV)
        .map_or_else(|| PathBuf::from(DEFAULT_REPO), PathBuf::from)
}

/// The repository path this process would use by default.
#[must_use]
pub fn repo_path() -> PathBuf {
    resolve_repo_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins() {
        let cfg = StoreConfig::at("/tmp/x");
        assert_eq!(cfg.repo_dir, PathBuf::from("/tmp/x"));
        assert_eq!(cfg.apply_timeout, DEFAULT_APPLY_TIMEOUT);
    }

    #[test]
    fn builder_chains() {
        let cfg = StoreConfig::at("/tmp/x")
            .with_apply_timeout(Duration::from_secs(1))
            .with_options(ConnectionOptions::CACHE_RUNNING);
        assert_eq!(cfg.apply_timeout, Duration::from_secs(1));
        assert!(cfg.options.contains(ConnectionOptions::CACHE_RUNNING));
    }
}
