//! Build invocation: runs the configured site compiler against a working copy.
//!
//! The compiler is opaque. It is started in the working copy with `{input}`
//! and `{output}` substituted into its arguments, and any non-success is a
//! hard `BuildFailed` carrying its output verbatim.

use crate::config::CompilerConfig;
use crate::contract::{BuildOutput, SiteBuilder};
use crate::error::{DeployError, DeployResult};
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{error, info};

pub struct CommandCompiler {
    config: CompilerConfig,
}

impl CommandCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    fn expand_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.display().to_string();
        self.config
            .args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

impl SiteBuilder for CommandCompiler {
    fn build(&self, site: &str, input: &Path, output: &Path) -> DeployResult<BuildOutput> {
        let failed = |detail: String| {
            error!(site, "[BUILD][ERROR] Compiler failed");
            DeployError::BuildFailed {
                site: site.to_string(),
                output: detail,
            }
        };

        // Scratch must start empty so stale files never leak into a publish.
        if output.exists() {
            fs::remove_dir_all(output)
                .map_err(|e| failed(format!("failed to clear scratch {}: {e}", output.display())))?;
        }
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| failed(format!("failed to create {}: {e}", parent.display())))?;
        }

        let args = self.expand_args(input, output);
        info!(site, program = %self.config.program, ?args, input = %input.display(), "[BUILD] Invoking compiler");

        let result = Command::new(&self.config.program)
            .args(&args)
            .current_dir(input)
            .output()
            .map_err(|e| failed(format!("failed to launch {}: {e}", self.config.program)))?;

        let mut log = String::from_utf8_lossy(&result.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&result.stderr));

        if !result.status.success() {
            return Err(failed(format!("{} exited with {}\n{}", self.config.program, result.status, log)));
        }
        if !output.is_dir() {
            return Err(failed(format!(
                "{} reported success but produced no output at {}\n{}",
                self.config.program,
                output.display(),
                log
            )));
        }

        info!(site, output = %output.display(), "[BUILD] Compiler succeeded");
        Ok(BuildOutput {
            output_dir: output.to_path_buf(),
            log,
        })
    }
}
