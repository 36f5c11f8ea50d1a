use crate::config::DeployConfig;
use crate::identity::RepositoryIdentity;
use crate::mapping::{is_valid_domain, DomainMapping};
use std::path::PathBuf;

/// Paths one deployment touches. Derived from the identity, the owner's
/// domain mapping and the config; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentLayout {
    pub site: String,
    pub working_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub target_dir: PathBuf,
    /// Symlink for the custom domain, when the owner's mapping binds one to
    /// this site.
    pub alias: Option<PathBuf>,
    pub log_file: PathBuf,
}

impl DeploymentLayout {
    pub fn new(
        config: &DeployConfig,
        identity: &RepositoryIdentity,
        mapping: Option<&DomainMapping>,
    ) -> Self {
        let site = identity.site_domain(&config.platform_suffix);
        let alias = mapping
            .filter(|m| m.bound_site(&config.platform_suffix) == site)
            .and_then(|m| m.custom_domain.as_deref())
            .filter(|domain| is_valid_domain(domain))
            .map(|domain| config.www_root.join(domain));

        Self {
            working_dir: config.repos_root.join(identity.working_copy_name()),
            scratch_dir: config.tmp_root.join(&site),
            target_dir: config.www_root.join(&site),
            alias,
            log_file: config.logs_root.join(format!("{site}.txt")),
            site,
        }
    }
}
