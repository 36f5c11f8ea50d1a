//! Deployment orchestration: validate → sync → build → publish.
//!
//! [`Deployer`] runs one deployment as a small state machine
//! (`Validating → Syncing → Building → Publishing → Done`). The first failing
//! stage ends the run. Whatever happens, the caller gets a [`DeployReport`]
//! back, never an `Err` or a panic.
//!
//! # Audit log
//! Once the site is known, every outcome is appended to the site's audit log:
//! `SUCCESS ...` or `FAILED at <stage>: <detail>`, with the external tool's
//! output in full. Payloads that fail validation have no site and are only
//! traced.
//!
//! # Concurrency
//! Deployments of different sites share nothing but the mapping store and can
//! run in parallel. Two deployments of the same site must not overlap; the
//! caller serialises them. [`deploy_batch`] does that for a batch of payloads
//! by running each site's deployments in order on one blocking task.

use crate::audit::AuditLog;
use crate::build::CommandCompiler;
use crate::config::DeployConfig;
use crate::contract::{
    AliasOutcome, RepositorySynchroniser, SiteBuilder, SitePublisher, SyncOutcome,
};
use crate::error::DeployError;
use crate::identity::{parse_payload, Provider, RepositoryIdentity};
use crate::layout::DeploymentLayout;
use crate::mapping::MappingHandle;
use crate::publish::RsyncPublisher;
use crate::synchronise::GitSynchroniser;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStage {
    Validating,
    Syncing,
    Building,
    Publishing,
    Done,
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployStage::Validating => "validating",
            DeployStage::Syncing => "syncing",
            DeployStage::Building => "building",
            DeployStage::Publishing => "publishing",
            DeployStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal state of one deployment.
#[derive(Debug, Clone)]
pub struct DeployReport {
    /// Site domain; `None` when the payload never validated.
    pub site: Option<String>,
    /// `Done` on success, otherwise the stage that failed.
    pub stage: DeployStage,
    pub success: bool,
    /// Full failure detail, as written to the audit log.
    pub error: Option<String>,
    /// What to show the person who triggered the deployment.
    pub user_message: String,
    pub sync: Option<SyncOutcome>,
    pub target_dir: Option<PathBuf>,
    pub alias: Option<AliasOutcome>,
}

impl DeployReport {
    fn failed(site: Option<String>, stage: DeployStage, err: &DeployError) -> Self {
        Self {
            site,
            stage,
            success: false,
            error: Some(err.to_string()),
            user_message: err.user_message(),
            sync: None,
            target_dir: None,
            alias: None,
        }
    }
}

pub struct Deployer<S, B, P> {
    config: DeployConfig,
    synchroniser: S,
    builder: B,
    publisher: P,
    mappings: MappingHandle,
    audit: AuditLog,
}

impl Deployer<GitSynchroniser, CommandCompiler, RsyncPublisher> {
    /// Production wiring: git, the configured compiler and rsync.
    pub fn from_config(config: DeployConfig, mappings: MappingHandle) -> Self {
        let synchroniser = GitSynchroniser::new(&config.git_url_template);
        let builder = CommandCompiler::new(config.compiler.clone());
        Self::new(config, synchroniser, builder, RsyncPublisher::new(), mappings)
    }
}

impl<S, B, P> Deployer<S, B, P>
where
    S: RepositorySynchroniser,
    B: SiteBuilder,
    P: SitePublisher,
{
    pub fn new(
        config: DeployConfig,
        synchroniser: S,
        builder: B,
        publisher: P,
        mappings: MappingHandle,
    ) -> Self {
        let audit = AuditLog::new(&config.logs_root);
        Self {
            config,
            synchroniser,
            builder,
            publisher,
            mappings,
            audit,
        }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn mappings(&self) -> &MappingHandle {
        &self.mappings
    }

    /// Validate a raw webhook payload and deploy it. Invalid payloads are
    /// rejected before any filesystem work.
    pub fn deploy_payload(&self, payload: &Value) -> DeployReport {
        let provider = Provider::detect(payload);
        match parse_payload(payload, &self.config.default_branch) {
            Ok(identity) => {
                info!(repo = %identity, ?provider, "[DEPLOY] Accepted webhook payload");
                self.deploy(&identity)
            }
            Err(e) => {
                warn!(?provider, error = %e, "[DEPLOY] Rejected webhook payload");
                DeployReport::failed(None, DeployStage::Validating, &e)
            }
        }
    }

    pub fn deploy(&self, identity: &RepositoryIdentity) -> DeployReport {
        let site = identity.site_domain(&self.config.platform_suffix);
        info!(repo = %identity, site = %site, "[DEPLOY] Starting deployment");

        match self.run(identity) {
            Ok(report) => {
                let target = report
                    .target_dir
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                self.record(&site, &format!("SUCCESS {identity} published to {target}"));
                info!(site = %site, sync = ?report.sync, alias = ?report.alias, "[DEPLOY] Deployment succeeded");
                report
            }
            Err((stage, e)) => {
                self.record(&site, &format!("FAILED at {stage}: {e}"));
                error!(site = %site, %stage, error = %e, "[DEPLOY][ERROR] Deployment failed");
                DeployReport::failed(Some(site), stage, &e)
            }
        }
    }

    fn run(&self, identity: &RepositoryIdentity) -> Result<DeployReport, (DeployStage, DeployError)> {
        let mapping = self
            .mappings
            .lock()
            .and_then(|store| store.find_by_user(identity.owner()))
            .map_err(|e| (DeployStage::Validating, e))?;
        let layout = DeploymentLayout::new(&self.config, identity, mapping.as_ref());

        let sync = self
            .synchroniser
            .synchronise(identity, &layout.working_dir)
            .map_err(|e| (DeployStage::Syncing, e))?;

        let built = self
            .builder
            .build(&layout.site, &layout.working_dir, &layout.scratch_dir)
            .map_err(|e| (DeployStage::Building, e))?;

        let published = self
            .publisher
            .publish(&layout.site, &built.output_dir, &layout.target_dir)
            .map_err(|e| (DeployStage::Publishing, e))?;

        let alias = match &layout.alias {
            Some(alias) => Some(
                self.publisher
                    .reconcile_alias(&layout.site, alias, &published.target_dir)
                    .map_err(|e| (DeployStage::Publishing, e))?,
            ),
            None => None,
        };

        Ok(DeployReport {
            site: Some(layout.site.clone()),
            stage: DeployStage::Done,
            success: true,
            error: None,
            user_message: format!("Deployed {} to {}.", identity, layout.site),
            sync: Some(sync),
            target_dir: Some(published.target_dir),
            alias,
        })
    }

    fn record(&self, site: &str, message: &str) {
        if let Err(e) = self.audit.append(site, message) {
            warn!(site, error = %e, "[DEPLOY] Failed to write audit log");
        }
    }
}

/// Deploy a batch of payloads. Sites run concurrently; deployments of the
/// same site run one after another in arrival order. Reports come back in
/// input order.
///
/// If a site's task panics, the stage it reached is lost with it. Its
/// deployments without a report are then reported as failed at
/// [`DeployStage::Validating`], with the join error as detail, and are not
/// audit-logged.
pub async fn deploy_batch<S, B, P>(
    deployer: Arc<Deployer<S, B, P>>,
    payloads: Vec<Value>,
) -> Vec<DeployReport>
where
    S: RepositorySynchroniser + 'static,
    B: SiteBuilder + 'static,
    P: SitePublisher + 'static,
{
    let mut reports: Vec<Option<DeployReport>> = vec![None; payloads.len()];
    let mut by_site: BTreeMap<String, Vec<(usize, RepositoryIdentity)>> = BTreeMap::new();

    for (index, payload) in payloads.iter().enumerate() {
        match parse_payload(payload, &deployer.config.default_branch) {
            Ok(identity) => {
                let site = identity.site_domain(&deployer.config.platform_suffix);
                by_site.entry(site).or_default().push((index, identity));
            }
            Err(e) => {
                warn!(index, error = %e, "[DEPLOY] Rejected webhook payload in batch");
                reports[index] = Some(DeployReport::failed(None, DeployStage::Validating, &e));
            }
        }
    }
    info!(sites = by_site.len(), payloads = payloads.len(), "[DEPLOY] Running batch");

    let tasks = by_site.into_iter().map(|(site, jobs)| {
        let deployer = Arc::clone(&deployer);
        let indices: Vec<usize> = jobs.iter().map(|(i, _)| *i).collect();
        let handle = tokio::task::spawn_blocking(move || {
            jobs.into_iter()
                .map(|(index, identity)| (index, deployer.deploy(&identity)))
                .collect::<Vec<_>>()
        });
        async move { (site, indices, handle.await) }
    });

    for (site, indices, joined) in join_all(tasks).await {
        match joined {
            Ok(done) => {
                for (index, report) in done {
                    reports[index] = Some(report);
                }
            }
            Err(e) => {
                error!(site = %site, error = %e, "[DEPLOY][ERROR] Deployment task aborted");
                // The panic took the reached stage with it.
                let err = DeployError::Io(std::io::Error::other(format!("deployment task aborted: {e}")));
                for index in indices {
                    reports[index].get_or_insert_with(|| {
                        DeployReport::failed(Some(site.clone()), DeployStage::Validating, &err)
                    });
                }
            }
        }
    }

    reports
        .into_iter()
        .map(|report| {
            report.unwrap_or_else(|| {
                let err = DeployError::Io(std::io::Error::other("deployment produced no report"));
                DeployReport::failed(None, DeployStage::Validating, &err)
            })
        })
        .collect()
}
