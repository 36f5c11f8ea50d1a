///
/// This module implements the CLI for pagehook: command parsing and the
/// glue between the operator, the webhook payloads and `pagehook-core`.
///
/// All pipeline logic lives in [`pagehook-core`]. This module stands in for
/// the HTTP layer: it reads payloads from files (or stdin), hands them to the
/// deployer and reports each outcome.
///
/// ## How To Use
/// - Deploy from webhook payloads: `pagehook deploy --config pagehook.yaml --payload push.json`
/// - Bind a custom domain: `pagehook domain --config pagehook.yaml --user alice --domain alice.dev`
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`pagehook-core`]: ../../pagehook-core/
use crate::load_config::load_config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pagehook_core::deploy::{deploy_batch, DeployReport, Deployer};
use pagehook_core::identity::RepositoryIdentity;
use pagehook_core::mapping::{AssignOutcome, MappingHandle, MappingStore};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// CLI for pagehook: publish static sites from repository webhooks.
#[derive(Parser)]
#[clap(
    name = "pagehook",
    version,
    about = "Synchronise, compile and publish static sites from repository webhooks"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy the repositories named by one or more webhook payloads
    Deploy {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// JSON payload file; `-` reads stdin. Repeat for a batch.
        #[clap(long, required = true)]
        payload: Vec<PathBuf>,
    },
    /// Bind a custom domain to one of a user's sites and redeploy it
    Domain {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Account name (the repository owner)
        #[clap(long)]
        user: String,
        /// Repository whose site the domain serves; defaults to `<user>.<suffix>`
        #[clap(long)]
        repo: Option<String>,
        /// Custom domain; an empty string removes the current one
        #[clap(long)]
        domain: String,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Deploy { config, payload } => {
            let config = load_config(config)?;
            tracing::info!(command = "deploy", payloads = payload.len(), "Starting deployment");
            let store = MappingStore::from_config(&config).context("Failed to open mapping store")?;
            let deployer = Arc::new(Deployer::from_config(config, MappingHandle::new(store)));

            let payloads = payload
                .iter()
                .map(|p| read_payload(p))
                .collect::<Result<Vec<_>>>()?;
            let reports = deploy_batch(deployer, payloads).await;
            for report in &reports {
                print_report(report);
            }

            let failed = reports.iter().filter(|r| !r.success).count();
            if failed > 0 {
                tracing::error!(command = "deploy", failed, total = reports.len(), "Deployment finished with failures");
                anyhow::bail!("{failed} of {} deployments failed", reports.len());
            }
            tracing::info!(command = "deploy", total = reports.len(), "Deployment complete");
            Ok(())
        }
        Commands::Domain {
            config,
            user,
            repo,
            domain,
        } => {
            let config = load_config(config)?;
            let repo = repo.unwrap_or_else(|| format!("{}.{}", user.to_lowercase(), config.platform_suffix));
            let identity = RepositoryIdentity::new(&user, &repo, &config.default_branch)
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            let site = identity.site_domain(&config.platform_suffix);

            let store = MappingStore::from_config(&config).context("Failed to open mapping store")?;
            let outcome = match store.assign_domain(&user, &site, &domain) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(command = "domain", user = %user, error = %e, "Domain request rejected");
                    anyhow::bail!(e.user_message());
                }
            };

            match outcome {
                AssignOutcome::Unchanged => {
                    println!("Saved, unchanged: {domain} already serves {site}.");
                    Ok(())
                }
                AssignOutcome::Saved(saved) if !saved.changed => {
                    println!("Saved, unchanged.");
                    Ok(())
                }
                AssignOutcome::Saved(_) => {
                    println!("Saved. Redeploying {site}...");
                    let deployer = Deployer::from_config(config, MappingHandle::new(store));
                    let report = tokio::task::spawn_blocking(move || deployer.deploy(&identity))
                        .await
                        .context("Deployment task aborted")?;
                    print_report(&report);
                    if report.success {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!(report.user_message))
                    }
                }
            }
        }
    }
}

/// Read one payload. Text that is not JSON becomes `null`, which the deployer
/// rejects as an invalid payload.
fn read_payload(path: &Path) -> Result<Value> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read payload from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload file {}", path.display()))?
    };

    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(payload = %path.display(), error = %e, "Payload is not valid JSON");
            Ok(Value::Null)
        }
    }
}

fn print_report(report: &DeployReport) {
    let site = report.site.as_deref().unwrap_or("<invalid payload>");
    if report.success {
        println!("[ok] {site}: {}", report.user_message);
    } else {
        println!("[failed at {}] {site}: {}", report.stage, report.user_message);
    }
}
