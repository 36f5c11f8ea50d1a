//! Publishing: mirror a scratch build into the web root, then keep the
//! custom-domain symlink pointing at it.
//!
//! The mirror is `rsync -a --delete`, so the target ends up with exactly the
//! scratch file set. Rsync deletes in place, so this is close to atomic for a
//! reader but not strictly so. Alias paths are only ever removed when they are
//! symlinks; a real directory at an alias path is left alone. A site's own
//! target directory must never be a symlink: mirroring through one would
//! overwrite whatever site it points at.

use crate::contract::{AliasOutcome, PublishReport, SitePublisher};
use crate::error::{DeployError, DeployResult};
use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct RsyncPublisher {
    rsync_program: String,
}

impl Default for RsyncPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl RsyncPublisher {
    pub fn new() -> Self {
        Self {
            rsync_program: "rsync".to_string(),
        }
    }
}

/// Meaning of an rsync exit status, from rsync(1).
pub fn describe_rsync_exit(code: i32) -> &'static str {
    match code {
        0 => "success",
        1 => "syntax or usage error",
        2 => "protocol incompatibility",
        3 => "errors selecting input/output files, dirs",
        4 => "requested action not supported",
        5 => "error starting client-server protocol",
        6 => "daemon unable to append to log-file",
        10 => "error in socket I/O",
        11 => "error in file I/O",
        12 => "error in rsync protocol data stream",
        13 => "errors with program diagnostics",
        14 => "error in IPC code",
        20 => "received SIGUSR1 or SIGINT",
        21 => "some error returned by waitpid()",
        22 => "error allocating core memory buffers",
        23 => "partial transfer due to error",
        24 => "partial transfer due to vanished source files",
        25 => "the --max-delete limit stopped deletions",
        30 => "timeout in data send/receive",
        35 => "timeout waiting for daemon connection",
        _ => "unknown rsync exit status",
    }
}

impl SitePublisher for RsyncPublisher {
    fn publish(&self, site: &str, scratch: &Path, target: &Path) -> DeployResult<PublishReport> {
        let failed = |detail: String| {
            error!(site, scratch = %scratch.display(), detail = %detail, "[PUBLISH][ERROR] Publish failed; scratch kept");
            DeployError::PublishFailed {
                site: site.to_string(),
                detail,
            }
        };

        if is_symlink(target) {
            return Err(failed(format!(
                "{} is a symlink; refusing to publish through it",
                target.display()
            )));
        }
        fs::create_dir_all(target)
            .map_err(|e| failed(format!("failed to create {}: {e}", target.display())))?;

        info!(site, scratch = %scratch.display(), target = %target.display(), "[PUBLISH] Mirroring build output");
        let output = Command::new(&self.rsync_program)
            .arg("-a")
            .arg("--delete")
            .arg("--stats")
            .arg(scratch.join("."))
            .arg(target)
            .output()
            .map_err(|e| failed(format!("failed to launch {}: {e}", self.rsync_program)))?;

        if !output.status.success() {
            let reason = match output.status.code() {
                Some(code) => format!("exit {code} ({})", describe_rsync_exit(code)),
                None => "terminated by signal".to_string(),
            };
            return Err(failed(format!(
                "rsync {reason}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        if let Err(e) = fs::remove_dir_all(scratch) {
            warn!(site, scratch = %scratch.display(), error = %e, "[PUBLISH] Failed to remove scratch after publish");
        }

        info!(site, target = %target.display(), "[PUBLISH] Published");
        Ok(PublishReport {
            target_dir: target.to_path_buf(),
            stats: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        })
    }

    fn reconcile_alias(
        &self,
        site: &str,
        alias: &Path,
        target: &Path,
    ) -> DeployResult<AliasOutcome> {
        if alias == target {
            return Ok(AliasOutcome::NotNeeded);
        }
        let failed = |detail: String| {
            error!(site, alias = %alias.display(), detail = %detail, "[PUBLISH][ERROR] Alias reconcile failed");
            DeployError::PublishFailed {
                site: site.to_string(),
                detail,
            }
        };
        if is_symlink(target) {
            return Err(failed(format!(
                "target {} is itself a symlink; refusing to alias it",
                target.display()
            )));
        }

        let outcome = match fs::symlink_metadata(alias) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => AliasOutcome::Created,
            Err(e) => return Err(failed(format!("failed to inspect {}: {e}", alias.display()))),
            Ok(meta) if meta.file_type().is_symlink() => {
                let current = fs::read_link(alias)
                    .map_err(|e| failed(format!("failed to read {}: {e}", alias.display())))?;
                if current == target {
                    return Ok(AliasOutcome::Unchanged);
                }
                AliasOutcome::Replaced
            }
            Ok(_) => {
                return Err(failed(format!(
                    "{} exists and is not a symlink; refusing to replace it",
                    alias.display()
                )))
            }
        };

        if let Some(parent) = alias.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| failed(format!("failed to create {}: {e}", parent.display())))?;
        }

        // Build the link beside the alias and rename it over, so readers see
        // either the old link or the new one.
        let staging = alias.with_file_name(format!(
            ".{}.link-{}",
            alias
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Uuid::new_v4()
        ));
        symlink_dir(target, &staging)
            .map_err(|e| failed(format!("failed to create symlink {}: {e}", staging.display())))?;
        if let Err(e) = fs::rename(&staging, alias) {
            let _ = fs::remove_file(&staging);
            return Err(failed(format!("failed to move symlink into {}: {e}", alias.display())));
        }

        info!(site, alias = %alias.display(), target = %target.display(), ?outcome, "[PUBLISH] Domain alias in place");
        Ok(outcome)
    }
}

/// Remove the alias at `path` if, and only if, it is a symlink. Returns
/// whether anything was removed.
pub fn remove_alias(path: &Path) -> DeployResult<bool> {
    match fs::symlink_metadata(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(path)?;
            info!(alias = %path.display(), "[PUBLISH] Removed stale domain alias");
            Ok(true)
        }
        Ok(_) => {
            warn!(alias = %path.display(), "[PUBLISH] Stale alias is not a symlink; leaving it in place");
            Ok(false)
        }
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink())
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
