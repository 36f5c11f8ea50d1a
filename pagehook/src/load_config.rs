/// `load_config` module: turns the operator's YAML file into the core's `DeployConfig`.
///
/// This is the only place where the untrusted YAML is parsed. Everything but
/// `home` is optional; missing values fall back to the layout derived from
/// `home` (see `DeployConfig::from_home`). The `PAGEHOOK_HOME` environment
/// variable, when set, replaces `home`.
///
/// # Errors
/// All errors use `anyhow::Error` and surface at the CLI boundary.
use anyhow::{Context, Result};
use pagehook_core::config::{CompilerConfig, DeployConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const HOME_ENV: &str = "PAGEHOOK_HOME";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub home: Option<PathBuf>,
    pub platform_suffix: Option<String>,
    pub default_branch: Option<String>,
    pub git_url_template: Option<String>,
    pub compiler: Option<CompilerConfig>,
    #[serde(default)]
    pub paths: PathsSection,
}

/// Per-root overrides of the home-derived layout.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsSection {
    pub repos: Option<PathBuf>,
    pub tmp: Option<PathBuf>,
    pub www: Option<PathBuf>,
    pub logs: Option<PathBuf>,
    pub database: Option<PathBuf>,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DeployConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let config = resolve(raw, std::env::var_os(HOME_ENV).map(PathBuf::from))
        .with_context(|| format!("Invalid configuration in {}", path_ref.display()))?;
    config.trace_loaded();
    Ok(config)
}

/// Merge the parsed file with the home override into a full config.
pub fn resolve(raw: RawConfig, home_override: Option<PathBuf>) -> Result<DeployConfig> {
    let home = match home_override.or(raw.home) {
        Some(home) => home,
        None => {
            error!("No home directory configured");
            anyhow::bail!("'home' must be set in the config file or via {HOME_ENV}");
        }
    };

    let mut config = DeployConfig::from_home(&home);
    if let Some(suffix) = raw.platform_suffix {
        config.platform_suffix = suffix.trim_matches('.').to_lowercase();
    }
    if let Some(branch) = raw.default_branch {
        config.default_branch = branch;
    }
    if let Some(template) = raw.git_url_template {
        config.git_url_template = template;
    }
    if let Some(compiler) = raw.compiler {
        config.compiler = compiler;
    }

    let paths = raw.paths;
    if let Some(p) = paths.repos {
        config.repos_root = p;
    }
    if let Some(p) = paths.tmp {
        config.tmp_root = p;
    }
    if let Some(p) = paths.www {
        config.www_root = p;
    }
    if let Some(p) = paths.logs {
        config.logs_root = p;
    }
    if let Some(p) = paths.database {
        config.database = p;
    }

    if config.platform_suffix.is_empty() {
        anyhow::bail!("'platform_suffix' must not be empty");
    }
    if config.compiler.program.trim().is_empty() {
        anyhow::bail!("'compiler.program' must not be empty");
    }

    info!(home = %home.display(), "Config resolved");
    Ok(config)
}
