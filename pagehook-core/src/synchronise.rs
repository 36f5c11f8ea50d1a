//! Repository synchronisation: keeps `<repos-root>/<owner>-<name>/` equal to
//! the remote branch head.
//!
//! The working copy is a disposable mirror, never a source of truth:
//!   - absent: clone it
//!   - present: fetch the branch and hard-reset onto it, discarding local drift
//!   - fetch or reset fails, or the directory is not a git checkout: clone
//!     into a sibling temp directory and swap it in, so a half-fetched tree
//!     never stays in place
//!
//! Git is driven as an external process; exit status 0 is success.

use crate::contract::{RepositorySynchroniser, SyncOutcome};
use crate::error::{DeployError, DeployResult};
use crate::identity::RepositoryIdentity;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct GitSynchroniser {
    git_program: String,
    url_template: String,
}

impl GitSynchroniser {
    pub fn new(url_template: &str) -> Self {
        Self {
            git_program: "git".to_string(),
            url_template: url_template.to_string(),
        }
    }

    /// Run git in `dir` (or the current directory), returning trimmed stdout.
    fn git<I, S>(&self, dir: Option<&Path>, args: I) -> Result<String, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.git_program);
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        debug!(command = ?cmd, "[SYNC] Running git");

        let output = cmd
            .output()
            .map_err(|e| format!("failed to launch {}: {e}", self.git_program))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(format!(
                "{:?} exited with {}: {}",
                cmd,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }

    fn clone_into(&self, url: &str, branch: &str, dir: &Path) -> Result<(), String> {
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
        }
        let result = self.git(
            None,
            [
                OsStr::new("clone"),
                OsStr::new("--quiet"),
                OsStr::new("--branch"),
                OsStr::new(branch),
                OsStr::new(url),
                dir.as_os_str(),
            ],
        );
        if result.is_err() && dir.exists() {
            let _ = fs::remove_dir_all(dir);
        }
        result.map(|_| ())
    }

    /// Fetch and hard-reset an existing checkout.
    fn update(&self, dir: &Path, branch: &str) -> Result<SyncOutcome, String> {
        let before = self.git(Some(dir), ["rev-parse", "HEAD"]).ok();
        self.git(Some(dir), ["fetch", "--quiet", "origin", branch])?;
        let fetched = self.git(Some(dir), ["rev-parse", "FETCH_HEAD"])?;

        if let Some(before) = before.as_deref().filter(|b| *b != fetched) {
            match self.git(Some(dir), ["merge-base", before, fetched.as_str()]) {
                Ok(base) if base == before => {
                    debug!(path = %dir.display(), "[SYNC] Fast-forward to fetched head");
                }
                Ok(base) if base == fetched => {
                    warn!(path = %dir.display(), "[SYNC] Working copy ahead of remote; discarding local commits");
                }
                _ => {
                    warn!(path = %dir.display(), "[SYNC] Working copy diverged from remote; resetting");
                }
            }
        }

        self.git(Some(dir), ["reset", "--quiet", "--hard", "FETCH_HEAD"])?;
        self.git(Some(dir), ["clean", "--quiet", "-fd"])?;

        if before.as_deref() == Some(fetched.as_str()) {
            Ok(SyncOutcome::Unchanged)
        } else {
            Ok(SyncOutcome::Updated)
        }
    }

    /// Clone next to `dir`, then replace `dir` with the fresh copy.
    fn reclone(&self, url: &str, branch: &str, dir: &Path) -> Result<(), String> {
        let temp = sibling_temp_path(dir);
        self.clone_into(url, branch, &temp)?;

        if let Err(e) = fs::remove_dir_all(dir) {
            let _ = fs::remove_dir_all(&temp);
            return Err(format!("failed to remove stale working copy {}: {e}", dir.display()));
        }
        fs::rename(&temp, dir).map_err(|e| {
            format!(
                "failed to move fresh clone {} into place at {}: {e}",
                temp.display(),
                dir.display()
            )
        })
    }
}

fn sibling_temp_path(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".to_string());
    dir.with_file_name(format!("{name}.reclone-{}", Uuid::new_v4()))
}

impl RepositorySynchroniser for GitSynchroniser {
    fn synchronise(
        &self,
        identity: &RepositoryIdentity,
        working_dir: &Path,
    ) -> DeployResult<SyncOutcome> {
        let url = identity.clone_url(&self.url_template);
        let branch = identity.branch();
        let fail = |detail: String| {
            error!(repo = %identity, path = %working_dir.display(), detail = %detail, "[SYNC][ERROR] Sync failed");
            DeployError::SyncFailed {
                repo: identity.to_string(),
                detail,
            }
        };

        if !working_dir.exists() {
            info!(repo = %identity, url = %url, path = %working_dir.display(), "[SYNC] Cloning fresh working copy");
            self.clone_into(&url, branch, working_dir).map_err(fail)?;
            return Ok(SyncOutcome::Cloned);
        }

        if working_dir.join(".git").exists() {
            match self.update(working_dir, branch) {
                Ok(outcome) => {
                    info!(repo = %identity, ?outcome, "[SYNC] Working copy up to date");
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!(repo = %identity, error = %e, "[SYNC] Incremental update failed; re-cloning");
                }
            }
        } else {
            warn!(repo = %identity, path = %working_dir.display(), "[SYNC] Not a git checkout; re-cloning");
        }

        self.reclone(&url, branch, working_dir).map_err(fail)?;
        info!(repo = %identity, path = %working_dir.display(), "[SYNC] Replaced working copy with fresh clone");
        Ok(SyncOutcome::Recloned)
    }
}
