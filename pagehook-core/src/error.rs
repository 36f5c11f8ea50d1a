//! Error taxonomy for the deployment pipeline.
//!
//! Validation and domain-policy errors carry a reason that can be shown to the
//! user as is. Infrastructure errors (sync, build, publish) carry the full
//! diagnostic for the audit log, but only a generic message is surfaced.

use thiserror::Error;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Error, Debug)]
pub enum DeployError {
    /// Payload is malformed or lacks `repository.name` / `repository.owner.name`.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Payload is well-formed but a field breaks the naming rules.
    #[error("invalid {field} '{value}'")]
    InvalidIdentity { field: &'static str, value: String },

    /// Custom domain inside the platform namespace that the user does not own.
    #[error("the domain '{domain}' is reserved: domains ending in '.{suffix}' must start with '{user}'")]
    ReservedDomain {
        domain: String,
        user: String,
        suffix: String,
    },

    /// Not a plain hostname: labels of letters, digits and hyphens joined by
    /// single dots.
    #[error("'{domain}' is not a valid domain name")]
    InvalidDomain { domain: String },

    /// The domain is the published address of a different site.
    #[error("the domain '{domain}' is the address of another site and cannot be used as a custom domain")]
    SiteDomainTaken { domain: String },

    #[error("the domain '{domain}' is already in use by another account")]
    DomainConflict { domain: String },

    #[error("the domain '{domain}' is already bound to your site '{site}'")]
    DomainAlreadyBound { domain: String, site: String },

    #[error("repository sync failed for {repo}: {detail}")]
    SyncFailed { repo: String, detail: String },

    #[error("build failed for {site}:\n{output}")]
    BuildFailed { site: String, output: String },

    #[error("publish failed for {site}: {detail}")]
    PublishFailed { site: String, detail: String },

    #[error("mapping store error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// Failures of the external tools or the host, as opposed to user input.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            DeployError::SyncFailed { .. }
                | DeployError::BuildFailed { .. }
                | DeployError::PublishFailed { .. }
                | DeployError::Storage(_)
                | DeployError::Io(_)
        )
    }

    /// Message safe to show to the person who triggered the deployment.
    pub fn user_message(&self) -> String {
        if self.is_infrastructure() {
            "Deployment failed. Check the site log for details.".to_string()
        } else {
            self.to_string()
        }
    }
}
