//! # contract: seams between the orchestrator and the external tools
//!
//! Each pipeline stage that shells out to an external process (version
//! control, site compiler, directory mirror) sits behind a trait here. The
//! production implementations live in [`crate::synchronise`],
//! [`crate::build`] and [`crate::publish`]; tests use the `mockall` mocks.
//!
//! All methods block until the external process has finished. A stage never
//! panics: every failure comes back as the matching [`DeployError`] variant
//! (`SyncFailed`, `BuildFailed`, `PublishFailed`).
//!
//! [`DeployError`]: crate::error::DeployError

use crate::error::DeployResult;
use crate::identity::RepositoryIdentity;
use std::path::{Path, PathBuf};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// How the working copy was brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No working copy existed; cloned fresh.
    Cloned,
    /// Fetched and reset to a new head.
    Updated,
    /// Fetched; the head did not move.
    Unchanged,
    /// The incremental update failed and a fresh clone replaced the copy.
    Recloned,
}

/// Output of a successful compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub output_dir: PathBuf,
    /// Combined stdout/stderr of the compiler.
    pub log: String,
}

/// What a mirror run reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub target_dir: PathBuf,
    /// Mirror tool statistics, verbatim.
    pub stats: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasOutcome {
    Created,
    /// An alias pointing elsewhere was replaced.
    Replaced,
    /// Already pointed at the target.
    Unchanged,
    /// Alias path equals the target path.
    NotNeeded,
}

/// Keeps the local working copy of a repository in line with its remote.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait RepositorySynchroniser: Send + Sync {
    fn synchronise(
        &self,
        identity: &RepositoryIdentity,
        working_dir: &Path,
    ) -> DeployResult<SyncOutcome>;
}

/// Compiles a working copy into a static site.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait SiteBuilder: Send + Sync {
    /// Build `input` into the fresh directory `output`. The compiler's own
    /// diagnostics are returned verbatim inside `BuildFailed`.
    fn build(&self, site: &str, input: &Path, output: &Path) -> DeployResult<BuildOutput>;
}

/// Moves built output into the web root and maintains domain aliases.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait SitePublisher: Send + Sync {
    /// Mirror `scratch` into `target` with delete semantics, then remove
    /// `scratch`. On failure `scratch` is kept for diagnosis.
    fn publish(&self, site: &str, scratch: &Path, target: &Path) -> DeployResult<PublishReport>;

    /// Point the symlink at `alias` to `target`.
    fn reconcile_alias(&self, site: &str, alias: &Path, target: &Path)
        -> DeployResult<AliasOutcome>;
}
