//! Maps fetched drive items onto persisted document records.
//!
//! Deletions only ever flip `is_deleted`; rows are never removed here.
//! Everything else is upserted keyed by `(configuration_id, external_id)`.
//! There is no coordination between concurrent runs: the last write wins.

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use tracing::{debug, warn};

use crate::contract::DocumentStore;
use crate::error::SyncResult;
use crate::model::{normalize_root_path, DocumentRecord, DriveItem, SyncConfiguration};

const ROOT_MARKER: &str = "root:";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Turns a Graph `parentReference.path` (`/drives/D/root:/A/B`) into a drive path (`/A/B`).
pub fn drive_path(parent_path: &str) -> Option<String> {
    let idx = parent_path.find(ROOT_MARKER)?;
    let tail = &parent_path[idx + ROOT_MARKER.len()..];
    let decoded = percent_decode_str(tail).decode_utf8_lossy();
    Some(normalize_root_path(&decoded))
}

/// Strips `root_path` from a drive path. `None` when the path lies outside the root.
///
/// Matching is ASCII case-insensitive and only on whole segments.
pub fn relative_to_root(path: &str, root_path: &str) -> Option<String> {
    let root = normalize_root_path(root_path);
    if root == "/" {
        return Some(normalize_root_path(path));
    }
    if path.eq_ignore_ascii_case(&root) {
        return Some("/".to_string());
    }
    let prefix = path.get(..root.len())?;
    if prefix.eq_ignore_ascii_case(&root) && path[root.len()..].starts_with('/') {
        Some(path[root.len()..].to_string())
    } else {
        None
    }
}

/// Folder of `item` relative to `root_path`, or `None` when unknown or out of scope.
pub fn relative_folder_path(item: &DriveItem, root_path: &str) -> Option<String> {
    let path = drive_path(item.parent_path()?)?;
    relative_to_root(&path, root_path)
}

/// Keeps deletions and items whose parent lies under `root_path`.
///
/// Scope is read from `parentReference.path`. Delta responses may omit it; with
/// a root other than `/` such live changes are dropped here and only picked up
/// again by the next full sync.
pub fn retain_in_scope(items: Vec<DriveItem>, root_path: &str) -> Vec<DriveItem> {
    if normalize_root_path(root_path) == "/" {
        return items;
    }
    items
        .into_iter()
        .filter(|item| item.is_deleted() || relative_folder_path(item, root_path).is_some())
        .collect()
}

/// Inserts or refreshes the record for one live item.
pub async fn upsert_item<S>(
    store: &S,
    configuration: &SyncConfiguration,
    item: &DriveItem,
    folder_path: String,
    synced_at: DateTime<Utc>,
) -> SyncResult<Upsert>
where
    S: DocumentStore + ?Sized,
{
    match store.find_document(configuration.id, &item.id).await? {
        Some(mut existing) => {
            existing.apply_item(item, folder_path, synced_at);
            store.update_document(existing).await?;
            Ok(Upsert::Updated)
        }
        None => {
            let record = DocumentRecord::from_item(configuration, item, folder_path, synced_at);
            store.insert_document(record).await?;
            Ok(Upsert::Inserted)
        }
    }
}

/// Applies `items` to the store one write at a time.
pub async fn reconcile<S>(
    store: &S,
    configuration: &SyncConfiguration,
    items: &[DriveItem],
) -> SyncResult<ReconcileCounts>
where
    S: DocumentStore + ?Sized,
{
    let mut counts = ReconcileCounts::default();
    let now = Utc::now();

    for item in items {
        if item.is_deleted() {
            match store.mark_deleted(configuration.id, &item.id, now).await {
                Ok(true) => counts.deleted += 1,
                Ok(false) => debug!(external_id = %item.id, "Deletion for unknown item ignored"),
                Err(e) => {
                    warn!(external_id = %item.id, error = %e, "Failed to mark document deleted")
                }
            }
            continue;
        }
        if item.is_drive_root() {
            continue;
        }

        let folder_path =
            relative_folder_path(item, &configuration.root_path).unwrap_or_else(|| "/".into());
        match upsert_item(store, configuration, item, folder_path, now).await? {
            Upsert::Inserted => counts.added += 1,
            Upsert::Updated => counts.updated += 1,
        }
    }

    debug!(?counts, "Reconciled items");
    Ok(counts)
}
