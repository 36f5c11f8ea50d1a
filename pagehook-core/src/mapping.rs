//! Persisted association between a user and their custom domain.
//!
//! One row per user in a SQLite `mappings` table. A [`DomainMapping`] keeps a
//! snapshot of what was last persisted, so [`MappingStore::save`] can tell
//! when the domain (or the site it points at) changed and remove the stale
//! alias symlink from the web root.

use crate::config::DeployConfig;
use crate::error::{DeployError, DeployResult};
use crate::publish::remove_alias;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use tracing::{info, warn};

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)+$")
        .expect("hostname pattern compiles")
});

/// Whether `domain` is a lowercase hostname with at least two labels. Such a
/// name is always a single path component, so joining it onto the web root
/// stays inside the web root.
pub fn is_valid_domain(domain: &str) -> bool {
    domain.len() <= 253
        && domain.split('.').all(|label| label.len() <= 63)
        && HOSTNAME_RE.is_match(domain)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Persisted {
    custom_domain: Option<String>,
    site: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMapping {
    pub user: String,
    pub custom_domain: Option<String>,
    /// Site domain the custom domain aliases. `None` means the user's
    /// canonical site.
    pub site: Option<String>,
    persisted: Option<Persisted>,
}

impl DomainMapping {
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            custom_domain: None,
            site: None,
            persisted: None,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.persisted.is_some()
    }

    /// Custom domain as it was when last loaded or saved.
    pub fn previous_domain(&self) -> Option<&str> {
        self.persisted
            .as_ref()
            .and_then(|p| p.custom_domain.as_deref())
    }

    pub fn bound_site(&self, suffix: &str) -> String {
        self.site
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.user.to_lowercase(), suffix))
    }

    fn current(&self) -> Persisted {
        Persisted {
            custom_domain: self.custom_domain.clone(),
            site: self.site.clone(),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let custom_domain: Option<String> = row.get(1)?;
        let site: Option<String> = row.get(2)?;
        let custom_domain = custom_domain.filter(|d| !d.is_empty());
        Ok(Self {
            user: row.get(0)?,
            custom_domain: custom_domain.clone(),
            site: site.clone(),
            persisted: Some(Persisted {
                custom_domain,
                site,
            }),
        })
    }
}

/// What a save did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub changed: bool,
    /// The previous custom domain, when the mapping moved away from it.
    pub stale_alias: Option<String>,
    pub removed_alias: bool,
}

/// Result of a domain request from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    Saved(SaveOutcome),
    /// The domain already points at this user's site.
    Unchanged,
}

pub struct MappingStore {
    conn: Connection,
    platform_suffix: String,
    alias_root: Option<PathBuf>,
}

impl MappingStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path, platform_suffix: &str) -> DeployResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn, platform_suffix)
    }

    /// In-memory store, for tests.
    pub fn open_in_memory(platform_suffix: &str) -> DeployResult<Self> {
        Self::init(Connection::open_in_memory()?, platform_suffix)
    }

    /// Store at the configured database path, cleaning aliases in the web root.
    pub fn from_config(config: &DeployConfig) -> DeployResult<Self> {
        Ok(Self::open(&config.database, &config.platform_suffix)?
            .with_alias_cleanup(&config.www_root))
    }

    /// Remove stale alias symlinks under `www_root` whenever a save changes a
    /// mapping.
    pub fn with_alias_cleanup(mut self, www_root: &Path) -> Self {
        self.alias_root = Some(www_root.to_path_buf());
        self
    }

    fn init(conn: Connection, platform_suffix: &str) -> DeployResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS mappings (
                username TEXT PRIMARY KEY NOT NULL,
                domain TEXT,
                site TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_mappings_domain ON mappings(domain);
            ",
        )?;
        Ok(Self {
            conn,
            platform_suffix: platform_suffix.to_string(),
            alias_root: None,
        })
    }

    pub fn platform_suffix(&self) -> &str {
        &self.platform_suffix
    }

    pub fn find_by_user(&self, user: &str) -> DeployResult<Option<DomainMapping>> {
        let mapping = self
            .conn
            .query_row(
                "SELECT username, domain, site FROM mappings WHERE username = ?1",
                params![user],
                DomainMapping::from_row,
            )
            .optional()?;
        Ok(mapping)
    }

    /// Existing mapping for `user`, or a blank unsaved one.
    pub fn find_or_create(&self, user: &str) -> DeployResult<DomainMapping> {
        Ok(self
            .find_by_user(user)?
            .unwrap_or_else(|| DomainMapping::new(user)))
    }

    pub fn find_by_domain(&self, domain: &str) -> DeployResult<Option<DomainMapping>> {
        let mapping = self
            .conn
            .query_row(
                "SELECT username, domain, site FROM mappings WHERE domain = ?1",
                params![domain],
                DomainMapping::from_row,
            )
            .optional()?;
        Ok(mapping)
    }

    /// Upsert `mapping`. Rejects malformed domains, domains in the platform
    /// namespace that the user does not own, and other sites' addresses.
    pub fn save(&self, mapping: &mut DomainMapping) -> DeployResult<SaveOutcome> {
        if let Some(domain) = &mapping.custom_domain {
            let site = mapping.bound_site(&self.platform_suffix);
            self.check_domain(&mapping.user, &site, domain)?;
        }

        self.conn.execute(
            "INSERT INTO mappings (username, domain, site) VALUES (?1, ?2, ?3)
             ON CONFLICT(username) DO UPDATE SET domain = excluded.domain, site = excluded.site",
            params![mapping.user, mapping.custom_domain, mapping.site],
        )?;

        let current = mapping.current();
        let previous = mapping.persisted.replace(current.clone());
        let changed = previous.as_ref() != Some(&current);
        let stale_alias = if changed {
            previous.and_then(|p| p.custom_domain)
        } else {
            None
        };

        let removed_alias = match (&stale_alias, &self.alias_root) {
            (Some(old), Some(root)) if !is_valid_domain(old) => {
                warn!(user = %mapping.user, alias = %old, root = %root.display(), "[MAPPING] Stale alias is not a plain domain; not removing it");
                false
            }
            (Some(old), Some(root)) => match remove_alias(&root.join(old)) {
                Ok(removed) => removed,
                Err(e) => {
                    warn!(user = %mapping.user, alias = %old, error = %e, "[MAPPING] Failed to remove stale alias");
                    false
                }
            },
            _ => false,
        };

        info!(
            user = %mapping.user,
            domain = ?mapping.custom_domain,
            site = ?mapping.site,
            changed,
            stale_alias = ?stale_alias,
            "[MAPPING] Saved domain mapping"
        );

        Ok(SaveOutcome {
            changed,
            stale_alias,
            removed_alias,
        })
    }

    /// Handle a user's request to serve `site` under `domain`.
    ///
    /// Domains are unique across all users. A domain owned by someone else is
    /// a `DomainConflict`; one this user already bound to another of their
    /// sites is `DomainAlreadyBound`; the same binding again is a no-op. An
    /// empty domain clears the custom domain. Malformed domains and the
    /// addresses of other sites are rejected before any lookup.
    pub fn assign_domain(&self, user: &str, site: &str, domain: &str) -> DeployResult<AssignOutcome> {
        let domain = domain.trim().trim_end_matches('.').to_lowercase();
        let mut mapping = self.find_or_create(user)?;

        if domain.is_empty() {
            mapping.custom_domain = None;
            mapping.site = None;
            return Ok(AssignOutcome::Saved(self.save(&mut mapping)?));
        }
        self.check_domain(user, site, &domain)?;

        if let Some(existing) = self.find_by_domain(&domain)? {
            if existing.user != user {
                return Err(DeployError::DomainConflict { domain });
            }
            let bound = existing.bound_site(&self.platform_suffix);
            if bound != site {
                return Err(DeployError::DomainAlreadyBound {
                    domain,
                    site: bound,
                });
            }
            info!(user, domain = %domain, site, "[MAPPING] Domain already bound to this site");
            return Ok(AssignOutcome::Unchanged);
        }

        mapping.custom_domain = Some(domain);
        mapping.site = Some(site.to_string());
        Ok(AssignOutcome::Saved(self.save(&mut mapping)?))
    }

    fn check_domain(&self, user: &str, site: &str, domain: &str) -> DeployResult<()> {
        if !is_valid_domain(domain) {
            return Err(DeployError::InvalidDomain {
                domain: domain.to_string(),
            });
        }
        self.check_reserved(user, domain)?;
        if domain != site && self.is_site_address(domain) {
            return Err(DeployError::SiteDomainTaken {
                domain: domain.to_string(),
            });
        }
        Ok(())
    }

    /// Whether `domain` has the shape of a published site address,
    /// `<owner>.<suffix>` or `<owner>-<name>.<suffix>`. Owners never contain
    /// dots, so a platform domain whose first label has no hyphen and which
    /// has more labels before the suffix cannot be a site.
    fn is_site_address(&self, domain: &str) -> bool {
        let suffix = format!(".{}", self.platform_suffix.to_lowercase());
        let Some(host) = domain.strip_suffix(&suffix) else {
            return false;
        };
        let first_label = host.split('.').next().unwrap_or_default();
        !host.contains('.') || first_label.contains('-')
    }

    fn check_reserved(&self, user: &str, domain: &str) -> DeployResult<()> {
        let suffix = self.platform_suffix.to_lowercase();
        let domain = domain.to_lowercase();
        let reserved = domain == suffix || domain.ends_with(&format!(".{suffix}"));
        if !reserved {
            return Ok(());
        }
        let owned = domain
            .strip_prefix(&user.to_lowercase())
            .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('-'));
        if owned {
            Ok(())
        } else {
            Err(DeployError::ReservedDomain {
                domain,
                user: user.to_string(),
                suffix: self.platform_suffix.clone(),
            })
        }
    }
}

/// Shared, lock-guarded access to the store across concurrent deployments.
#[derive(Clone)]
pub struct MappingHandle {
    inner: Arc<Mutex<MappingStore>>,
}

impl MappingHandle {
    pub fn new(store: MappingStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn lock(&self) -> DeployResult<MutexGuard<'_, MappingStore>> {
        self.inner
            .lock()
            .map_err(|e| DeployError::Io(std::io::Error::other(format!("mapping store lock poisoned: {e}"))))
    }
}
