//! High-level pipeline: one sync run for one organization.
//!
//! A run moves its [`SyncLog`] from `running` to either `success` or `error`:
//!   1. Load the configuration and open a `running` log.
//!   2. Pick a strategy. **Full** when requested or when no delta token is
//!      stored: purge existing records, walk the tree, then ask Graph for a
//!      fresh token. **Incremental** otherwise: follow the stored token.
//!   3. Incremental runs drop items outside the configured root.
//!   4. Reconcile every item.
//!   5. Flush the records, persist the new token and success metadata, close the log.
//!
//! Any failure in steps 2–5 records the message on the configuration and the
//! log, leaves the stored token untouched, and is returned to the caller.
//! There is no retry loop and no cross-run lock; a scheduler invoking this
//! again is a fresh attempt.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::contract::{DocumentStore, DriveProvider};
use crate::delta::fetch_delta;
use crate::error::{SyncError, SyncResult};
use crate::listing::collect_tree;
use crate::model::{DeltaToken, DriveItem, SyncConfiguration, SyncLog, SyncStatus, SyncType};
use crate::reconcile::{reconcile, retain_in_scope, ReconcileCounts};
use crate::resolve::DEFAULT_RETRY_DELAY;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Forces a full resync even when a delta token is stored.
    pub full_sync: bool,
    /// Pause before the single path-resolution retry.
    pub path_retry_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            full_sync: false,
            path_retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct SynchroniseReport {
    pub sync_type: SyncType,
    pub items_found: usize,
    #[serde(flatten)]
    pub counts: ReconcileCounts,
    pub log_id: uuid::Uuid,
}

/// Runs one sync for `organization_id`.
#[instrument(skip(provider, store, options), fields(full = options.full_sync))]
pub async fn synchronise<P, S>(
    provider: &P,
    store: &S,
    organization_id: &str,
    options: &SyncOptions,
) -> SyncResult<SynchroniseReport>
where
    P: DriveProvider + ?Sized,
    S: DocumentStore + ?Sized,
{
    let configuration = store
        .get_configuration(organization_id)
        .await?
        .ok_or_else(|| {
            SyncError::Config(format!(
                "no SharePoint configuration for organization {organization_id}"
            ))
        })?;

    let sync_type = if options.full_sync || configuration.delta_token.is_none() {
        SyncType::Full
    } else {
        SyncType::Incremental
    };
    let mut log = SyncLog::start(&configuration, sync_type);
    store.insert_sync_log(log.clone()).await?;
    info!(?sync_type, root = %configuration.root_path, "[SYNC] Starting run");

    let outcome = match run_strategy(provider, store, &configuration, sync_type, options).await {
        Ok((found, counts, token)) => {
            record_success(store, configuration, &log, found, counts, token).await
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(report) => Ok(report),
        Err(e) => {
            error!(error = %e, "[SYNC][ERROR] Run failed");
            let message = e.to_string();
            let now = Utc::now();

            // Re-read: only the error metadata may change, never the token.
            let current = store.get_configuration(organization_id).await;
            match current {
                Ok(Some(mut current)) => {
                    current.last_sync_at = Some(now);
                    current.last_sync_status = Some(SyncStatus::Error);
                    current.last_sync_error = Some(message.clone());
                    current.updated_at = now;
                    if let Err(store_err) = store.save_configuration(current).await {
                        warn!(error = %store_err, "Failed to record sync error on configuration");
                    }
                }
                Ok(None) => warn!("Configuration vanished during failed run"),
                Err(store_err) => warn!(error = %store_err, "Failed to reload configuration"),
            }

            log.status = SyncStatus::Error;
            log.error_message = Some(message);
            log.completed_at = Some(now);
            if let Err(store_err) = store.update_sync_log(log).await {
                warn!(error = %store_err, "Failed to finalise sync log");
            }
            Err(e)
        }
    }
}

/// Stores the new token and success metadata, then closes the log.
async fn record_success<S>(
    store: &S,
    mut configuration: SyncConfiguration,
    log: &SyncLog,
    found: usize,
    counts: ReconcileCounts,
    token: DeltaToken,
) -> SyncResult<SynchroniseReport>
where
    S: DocumentStore + ?Sized,
{
    let now = Utc::now();
    configuration.delta_token = Some(token.clone());
    configuration.last_sync_at = Some(now);
    configuration.last_sync_status = Some(SyncStatus::Success);
    configuration.last_sync_error = None;
    configuration.updated_at = now;
    store.save_configuration(configuration).await?;

    let mut done = log.clone();
    done.status = SyncStatus::Success;
    done.items_found = found;
    done.items_added = counts.added;
    done.items_updated = counts.updated;
    done.items_deleted = counts.deleted;
    done.delta_token_new = Some(token);
    done.completed_at = Some(now);
    store.update_sync_log(done).await?;

    info!(
        found,
        added = counts.added,
        updated = counts.updated,
        deleted = counts.deleted,
        "[SYNC] Run succeeded"
    );
    Ok(SynchroniseReport {
        sync_type: log.sync_type,
        items_found: found,
        counts,
        log_id: log.id,
    })
}

async fn run_strategy<P, S>(
    provider: &P,
    store: &S,
    configuration: &SyncConfiguration,
    sync_type: SyncType,
    options: &SyncOptions,
) -> SyncResult<(usize, ReconcileCounts, DeltaToken)>
where
    P: DriveProvider + ?Sized,
    S: DocumentStore + ?Sized,
{
    let (items, token): (Vec<DriveItem>, DeltaToken) = match sync_type {
        SyncType::Full => {
            let purged = store.purge_documents(configuration.id).await?;
            info!(purged, "[SYNC] Purged records before full sync");
            let items = collect_tree(
                provider,
                &configuration.drive_id,
                &configuration.root_path,
                options.path_retry_delay,
            )
            .await?;
            let token = provider
                .latest_delta_token(&configuration.drive_id)
                .await?;
            (items, token)
        }
        SyncType::Incremental => {
            let stored = configuration
                .delta_token
                .as_ref()
                .ok_or_else(|| SyncError::Config("incremental sync without delta token".into()))?;
            let batch = fetch_delta(provider, stored).await?;
            let in_scope = retain_in_scope(batch.items, &configuration.root_path);
            (in_scope, batch.token)
        }
    };

    let counts = reconcile(store, configuration, &items).await?;
    // Records must be durable before the token that covers them is saved.
    store.flush().await?;
    Ok((items.len(), counts, token))
}
