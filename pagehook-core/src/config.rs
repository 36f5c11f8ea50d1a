use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_PLATFORM_SUFFIX: &str = "ruhoh.com";
pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_GIT_URL_TEMPLATE: &str = "https://github.com/{owner}/{name}.git";

/// Everything the pipeline needs to know about the host. Built once at
/// startup and passed to every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Working copies: `<repos_root>/<owner>-<name>/`
    pub repos_root: PathBuf,
    /// Scratch build output: `<tmp_root>/<site-domain>/`
    pub tmp_root: PathBuf,
    /// Published sites and custom-domain symlinks.
    pub www_root: PathBuf,
    /// Audit logs: `<logs_root>/<site-domain>.txt`
    pub logs_root: PathBuf,
    /// SQLite file holding the domain mappings.
    pub database: PathBuf,
    pub platform_suffix: String,
    pub default_branch: String,
    /// Clone URL with `{owner}` and `{name}` placeholders.
    pub git_url_template: String,
    pub compiler: CompilerConfig,
}

/// The external site compiler. `{input}` and `{output}` in `args` are
/// replaced with the working copy and the scratch directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompilerConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: "ruhoh".to_string(),
            args: vec!["compile".to_string(), "{output}".to_string()],
        }
    }
}

impl DeployConfig {
    /// Standard layout rooted under one operator-chosen home directory.
    pub fn from_home(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref();
        Self {
            repos_root: home.join("repos"),
            tmp_root: home.join("tmp"),
            www_root: home.join("www"),
            logs_root: home.join("logs"),
            database: home.join("database.db"),
            platform_suffix: DEFAULT_PLATFORM_SUFFIX.to_string(),
            default_branch: DEFAULT_BRANCH.to_string(),
            git_url_template: DEFAULT_GIT_URL_TEMPLATE.to_string(),
            compiler: CompilerConfig::default(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            repos_root = %self.repos_root.display(),
            www_root = %self.www_root.display(),
            platform_suffix = %self.platform_suffix,
            compiler = %self.compiler.program,
            "Loaded DeployConfig"
        );
        debug!(?self, "DeployConfig loaded (full debug)");
    }
}
