//! In-process [`DocumentStore`] with optional JSON snapshot persistence.
//!
//! State lives behind a `tokio::sync::Mutex`. When opened with a path:
//! - configuration and log writes are applied to a copy of the snapshot, the
//!   copy is written to disk (sibling temp file, then rename) and only then
//!   swapped in, so a failed write leaves memory untouched;
//! - document writes change memory only and mark the snapshot dirty until the
//!   next [`DocumentStore::flush`] or write-through.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::contract::DocumentStore;
use crate::error::{SyncError, SyncResult};
use crate::model::{DocumentRecord, SyncConfiguration, SyncLog};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    /// Keyed by organization id.
    configurations: HashMap<String, SyncConfiguration>,
    /// Keyed by configuration id, then external item id.
    documents: HashMap<Uuid, HashMap<String, DocumentRecord>>,
    logs: Vec<SyncLog>,
}

#[derive(Debug, Default)]
struct State {
    snapshot: Snapshot,
    /// Document writes not yet on disk.
    dirty: bool,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the snapshot at `path` (empty when the file does not exist yet).
    pub async fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot: Snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };
        info!(
            path = %path.display(),
            configurations = snapshot.configurations.len(),
            "Opened document store"
        );
        Ok(Self {
            state: Mutex::new(State {
                snapshot,
                dirty: false,
            }),
            path: Some(path),
        })
    }

    async fn persist(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "Persisted store snapshot");
        Ok(())
    }

    /// Applies `change` and makes the whole snapshot durable before exposing it.
    async fn write_through<R>(
        &self,
        change: impl FnOnce(&mut Snapshot) -> SyncResult<R>,
    ) -> SyncResult<R> {
        let mut state = self.state.lock().await;
        if self.path.is_none() {
            return change(&mut state.snapshot);
        }
        let mut next = state.snapshot.clone();
        let out = change(&mut next)?;
        self.persist(&next).await?;
        state.snapshot = next;
        state.dirty = false;
        Ok(out)
    }

    /// Applies `change` in memory; it reaches disk with the next flush.
    async fn buffer<R>(&self, change: impl FnOnce(&mut Snapshot) -> SyncResult<R>) -> SyncResult<R> {
        let mut state = self.state.lock().await;
        let out = change(&mut state.snapshot)?;
        state.dirty |= self.path.is_some();
        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_configuration(
        &self,
        organization_id: &str,
    ) -> SyncResult<Option<SyncConfiguration>> {
        let state = self.state.lock().await;
        Ok(state.snapshot.configurations.get(organization_id).cloned())
    }

    async fn save_configuration(&self, configuration: SyncConfiguration) -> SyncResult<()> {
        self.write_through(|snapshot| {
            snapshot
                .configurations
                .insert(configuration.organization_id.clone(), configuration);
            Ok(())
        })
        .await
    }

    async fn delete_configuration(&self, organization_id: &str) -> SyncResult<bool> {
        self.write_through(|snapshot| {
            let Some(configuration) = snapshot.configurations.remove(organization_id) else {
                return Ok(false);
            };
            snapshot.documents.remove(&configuration.id);
            snapshot
                .logs
                .retain(|log| log.configuration_id != configuration.id);
            Ok(true)
        })
        .await
    }

    async fn find_document(
        &self,
        configuration_id: Uuid,
        external_id: &str,
    ) -> SyncResult<Option<DocumentRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .snapshot
            .documents
            .get(&configuration_id)
            .and_then(|docs| docs.get(external_id))
            .cloned())
    }

    async fn insert_document(&self, record: DocumentRecord) -> SyncResult<()> {
        self.buffer(|snapshot| {
            let docs = snapshot.documents.entry(record.configuration_id).or_default();
            if docs.contains_key(&record.external_id) {
                return Err(SyncError::Store(format!(
                    "document {} already exists for configuration {}",
                    record.external_id, record.configuration_id
                )));
            }
            docs.insert(record.external_id.clone(), record);
            Ok(())
        })
        .await
    }

    async fn update_document(&self, record: DocumentRecord) -> SyncResult<()> {
        self.buffer(|snapshot| {
            let slot = snapshot
                .documents
                .get_mut(&record.configuration_id)
                .and_then(|docs| docs.get_mut(&record.external_id))
                .ok_or_else(|| {
                    SyncError::Store(format!("document {} does not exist", record.external_id))
                })?;
            *slot = record;
            Ok(())
        })
        .await
    }

    async fn mark_deleted(
        &self,
        configuration_id: Uuid,
        external_id: &str,
        deleted_at: DateTime<Utc>,
    ) -> SyncResult<bool> {
        self.buffer(|snapshot| {
            let record = snapshot
                .documents
                .get_mut(&configuration_id)
                .and_then(|docs| docs.get_mut(external_id));
            match record {
                Some(record) if !record.is_deleted => {
                    record.is_deleted = true;
                    record.deleted_at = Some(deleted_at);
                    record.synced_at = deleted_at;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
        .await
    }

    async fn purge_documents(&self, configuration_id: Uuid) -> SyncResult<usize> {
        self.buffer(|snapshot| {
            Ok(snapshot
                .documents
                .remove(&configuration_id)
                .map(|docs| docs.len())
                .unwrap_or(0))
        })
        .await
    }

    async fn list_documents(&self, configuration_id: Uuid) -> SyncResult<Vec<DocumentRecord>> {
        let state = self.state.lock().await;
        let mut docs: Vec<DocumentRecord> = state
            .snapshot
            .documents
            .get(&configuration_id)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        docs.sort_by(|a, b| {
            a.folder_path
                .cmp(&b.folder_path)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(docs)
    }

    async fn insert_sync_log(&self, log: SyncLog) -> SyncResult<()> {
        self.write_through(|snapshot| {
            snapshot.logs.push(log);
            Ok(())
        })
        .await
    }

    async fn update_sync_log(&self, log: SyncLog) -> SyncResult<()> {
        self.write_through(|snapshot| {
            let slot = snapshot
                .logs
                .iter_mut()
                .find(|existing| existing.id == log.id)
                .ok_or_else(|| SyncError::Store(format!("sync log {} does not exist", log.id)))?;
            *slot = log;
            Ok(())
        })
        .await
    }

    async fn list_sync_logs(
        &self,
        configuration_id: Uuid,
        limit: usize,
    ) -> SyncResult<Vec<SyncLog>> {
        let state = self.state.lock().await;
        let mut logs: Vec<SyncLog> = state
            .snapshot
            .logs
            .iter()
            .rev()
            .filter(|log| log.configuration_id == configuration_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        logs.truncate(limit);
        Ok(logs)
    }

    async fn flush(&self) -> SyncResult<()> {
        let mut state = self.state.lock().await;
        if !state.dirty {
            return Ok(());
        }
        self.persist(&state.snapshot).await?;
        state.dirty = false;
        Ok(())
    }
}
