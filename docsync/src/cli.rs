///
/// This module implements the CLI interface for docsync: command parsing,
/// argument validation and the async entrypoint used by `main` and the integration tests.
///
/// All sync logic (data model, Graph access, reconciliation, the action dispatcher)
/// lives in the [`docsync-core`] crate. This module wires collaborators together:
/// it loads the YAML config, builds the Graph client from environment secrets,
/// opens the snapshot-backed store and hands them to the core.
///
/// ## Commands
/// - `sync`: run one synchronisation for an organization, optionally only when due.
/// - `dispatch`: read one JSON action request (file or stdin) and print the JSON response.
///
/// [`docsync-core`]: ../../docsync-core/
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsync_core::contract::DocumentStore;
use docsync_core::dispatch::Dispatcher;
use docsync_core::store::MemoryStore;
use docsync_core::synchronise::{synchronise, SyncOptions};
use serde_json::json;
use tokio::io::AsyncReadExt;

use crate::client::graph_client_from_env;
use crate::load_config::{load_config, CliConfig};

/// CLI for docsync: mirror SharePoint document libraries into the document store.
#[derive(Parser)]
#[clap(
    name = "docsync",
    version,
    about = "Delta-sync SharePoint document libraries into an organization's document index"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronise one organization's configured library
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Organization whose configuration should be synced
        #[clap(long)]
        organization: String,
        /// Ignore the stored delta token and rebuild from a full crawl
        #[clap(long)]
        full: bool,
        /// Skip the run unless the configured interval has elapsed
        #[clap(long)]
        if_due: bool,
    },
    /// Handle one JSON action request and print the JSON response
    Dispatch {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// File holding the request; reads stdin when omitted or `-`
        #[clap(long)]
        request: Option<PathBuf>,
    },
}

fn sync_options(config: &CliConfig, full_sync: bool) -> SyncOptions {
    SyncOptions {
        full_sync,
        path_retry_delay: config.sync.path_retry_delay(),
    }
}

async fn read_request(source: Option<&PathBuf>) -> Result<serde_json::Value> {
    let raw = match source {
        Some(path) if path.as_os_str() != "-" => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading request file {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("reading request from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("request is not valid JSON")
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync {
            config,
            organization,
            full,
            if_due,
        } => {
            let config = load_config(config)?;
            let store = MemoryStore::open(&config.store_path)
                .await
                .context("opening document store")?;

            if if_due {
                let configuration = store
                    .get_configuration(&organization)
                    .await?
                    .ok_or_else(|| {
                        anyhow::anyhow!("no SharePoint configuration for organization {organization}")
                    })?;
                if !configuration.is_due(chrono::Utc::now()) {
                    tracing::info!(
                        command = "sync",
                        organization = %organization,
                        last_sync_at = ?configuration.last_sync_at,
                        "Sync not due yet; skipping"
                    );
                    println!(
                        "{}",
                        json!({ "skipped": true, "organization_id": organization })
                    );
                    return Ok(());
                }
            }

            let graph = graph_client_from_env(&config)?;
            tracing::info!(command = "sync", organization = %organization, full, "Starting synchronisation");
            match synchronise(&graph, &store, &organization, &sync_options(&config, full)).await {
                Ok(report) => {
                    tracing::info!(command = "sync", ?report, "Synchronisation complete");
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Dispatch { config, request } => {
            let config = load_config(config)?;
            let request = read_request(request.as_ref()).await?;
            let store = MemoryStore::open(&config.store_path)
                .await
                .context("opening document store")?;
            let graph = graph_client_from_env(&config)?;

            let dispatcher = Dispatcher::new(&graph, &store, sync_options(&config, false));
            let response = dispatcher.dispatch_json(request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);

            if response.success {
                return Ok(());
            }
            let message = response.error.unwrap_or_default();
            tracing::error!(command = "dispatch", error = %message, "Action failed");
            Err(anyhow::anyhow!("action failed: {message}"))
        }
    }
}
