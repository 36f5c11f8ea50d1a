//! Webhook payload parsing and repository identity validation.
//!
//! The payload is parsed into a typed shape first and validated second. Any
//! missing, null, empty or wrongly typed field is an `InvalidPayload`; a
//! present field that breaks the naming rules is an `InvalidIdentity`.

use crate::error::{DeployError, DeployResult};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

static OWNER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]+$").expect("owner pattern compiles"));
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.-]+$").expect("name pattern compiles"));
static BRANCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w./-]+$").expect("branch pattern compiles"));

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    repository: Option<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    name: Option<String>,
    owner: Option<RawOwner>,
    default_branch: Option<String>,
    master_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOwner {
    name: Option<String>,
}

/// The repository a deployment is about. Only constructible through
/// validation, and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryIdentity {
    owner: String,
    name: String,
    branch: String,
}

impl RepositoryIdentity {
    pub fn new(owner: &str, name: &str, branch: &str) -> DeployResult<Self> {
        let owner = owner.trim();
        let name = name.trim();
        let branch = branch.trim();

        if !OWNER_RE.is_match(owner) {
            return Err(DeployError::InvalidIdentity {
                field: "owner",
                value: owner.to_string(),
            });
        }
        if !NAME_RE.is_match(name) {
            return Err(DeployError::InvalidIdentity {
                field: "repository name",
                value: name.to_string(),
            });
        }
        if !BRANCH_RE.is_match(branch) || branch.starts_with('-') || branch.contains("..") {
            return Err(DeployError::InvalidIdentity {
                field: "branch",
                value: branch.to_string(),
            });
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            branch: branch.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// `<owner>.<suffix>`, lowercased: the site every user gets by default.
    pub fn canonical_site_name(&self, suffix: &str) -> String {
        format!("{}.{}", self.owner.to_lowercase(), suffix)
    }

    /// The domain this repository publishes to. The repository named after
    /// the canonical site publishes there; any other repository gets
    /// `<owner>-<name>.<suffix>`.
    pub fn site_domain(&self, suffix: &str) -> String {
        let canonical = self.canonical_site_name(suffix);
        if self.name.eq_ignore_ascii_case(&canonical) {
            canonical
        } else {
            format!(
                "{}-{}.{}",
                self.owner.to_lowercase(),
                self.name.to_lowercase(),
                suffix
            )
        }
    }

    /// Directory name of the local working copy.
    pub fn working_copy_name(&self) -> String {
        format!("{}-{}", self.owner, self.name)
    }

    pub fn clone_url(&self, template: &str) -> String {
        template
            .replace("{owner}", &self.owner)
            .replace("{name}", &self.name)
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.branch)
    }
}

/// Parse an inbound webhook payload into a validated identity.
///
/// The branch comes from `ref` (`refs/heads/<branch>`), then the
/// repository's `default_branch` or `master_branch`, then `default_branch`.
pub fn parse_payload(payload: &Value, default_branch: &str) -> DeployResult<RepositoryIdentity> {
    let parsed: WebhookPayload = serde_json::from_value(payload.clone())
        .map_err(|e| DeployError::InvalidPayload(format!("unrecognised payload shape: {e}")))?;

    let repository = parsed
        .repository
        .ok_or_else(|| DeployError::InvalidPayload("missing 'repository'".into()))?;
    let name = non_empty(repository.name, "repository.name")?;
    let owner = repository
        .owner
        .ok_or_else(|| DeployError::InvalidPayload("missing 'repository.owner'".into()))?;
    let owner = non_empty(owner.name, "repository.owner.name")?;

    let present = |b: &String| !b.trim().is_empty();
    let branch = parsed
        .git_ref
        .as_deref()
        .and_then(|r| r.strip_prefix("refs/heads/"))
        .map(str::to_string)
        .filter(present)
        .or(repository.default_branch.filter(present))
        .or(repository.master_branch.filter(present))
        .unwrap_or_else(|| default_branch.to_string());

    RepositoryIdentity::new(&owner, &name, &branch)
}

fn non_empty(value: Option<String>, field: &str) -> DeployResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(DeployError::InvalidPayload(format!("'{field}' is empty"))),
        None => Err(DeployError::InvalidPayload(format!("missing '{field}'"))),
    }
}

/// Where a payload appears to come from.
///
/// Best-effort sniffing of the repository URL, used for log labels only. It
/// is not a security boundary and must not gate any action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    GitHub,
    Unknown,
}

impl Provider {
    pub fn detect(payload: &Value) -> Self {
        let repository = payload.get("repository");
        let is_github = ["url", "html_url"].iter().any(|key| {
            repository
                .and_then(|r| r.get(key))
                .and_then(Value::as_str)
                .is_some_and(|url| url.contains("github.com"))
        });
        if is_github {
            Provider::GitHub
        } else {
            Provider::Unknown
        }
    }
}
