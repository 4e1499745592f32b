//! # contract: the seams between sync logic and the outside world
//!
//! Three traits separate the sync pipeline from its collaborators:
//! - [`TokenProvider`] hands out bearer tokens for Graph.
//! - [`DriveProvider`] addresses drive items, pages and uploads.
//! - [`DocumentStore`] persists configurations, document records and sync logs.
//!
//! Every orchestration function takes these as explicit parameters, so tests
//! substitute the `mockall` mocks generated here (exported under the
//! `test-export-mocks` feature) or the in-process [`crate::store::MemoryStore`].
//!
//! ## Durability
//! Configuration and log writes are durable when they return. Document writes
//! may be buffered until [`DocumentStore::flush`]; callers flush before saving
//! a delta token that covers them.
//!
//! ## Errors
//! All methods return [`SyncResult`]. Implementors map transport failures into
//! [`crate::error::SyncError`] and reserve `SyncError::NotFound` for 404s, since
//! the path resolver retries on exactly that variant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::SyncResult;
use crate::model::{
    DeltaToken, DocumentRecord, Drive, DriveItem, Site, SyncConfiguration, SyncLog,
};

/// One page of a Graph collection response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default)]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.deltaLink")]
    pub delta_link: Option<String>,
}

/// Source of bearer tokens for Graph requests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token valid for at least the next request.
    async fn access_token(&self) -> SyncResult<String>;
}

/// Item-level access to a Graph drive.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DriveProvider: Send + Sync {
    /// Looks an item up by its path below the drive root (`/a/b`).
    async fn item_by_path(&self, drive_id: &str, path: &str) -> SyncResult<DriveItem>;

    /// Returns the drive's root folder.
    async fn drive_root(&self, drive_id: &str) -> SyncResult<DriveItem>;

    /// First page of a folder's children.
    async fn children_page(&self, drive_id: &str, folder_id: &str) -> SyncResult<Page<DriveItem>>;

    /// Follows an absolute `@odata.nextLink` or delta link.
    async fn follow_link(&self, link: &str) -> SyncResult<Page<DriveItem>>;

    /// Asks for a delta token representing "now", without enumerating items.
    async fn latest_delta_token(&self, drive_id: &str) -> SyncResult<DeltaToken>;

    /// Single-request content upload to `path` (including the file name).
    async fn upload_content(
        &self,
        drive_id: &str,
        path: &str,
        content: Vec<u8>,
    ) -> SyncResult<DriveItem>;

    /// Document libraries of a site.
    async fn list_drives(&self, site_id: &str) -> SyncResult<Vec<Drive>>;

    /// Resolves a site from its host name and server-relative path.
    async fn site_by_path(&self, hostname: &str, site_path: &str) -> SyncResult<Site>;
}

/// Persistence for the three record kinds docsync owns.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_configuration(&self, organization_id: &str)
        -> SyncResult<Option<SyncConfiguration>>;

    /// Inserts or replaces the organization's configuration.
    async fn save_configuration(&self, configuration: SyncConfiguration) -> SyncResult<()>;

    /// Removes the configuration together with its documents and logs.
    async fn delete_configuration(&self, organization_id: &str) -> SyncResult<bool>;

    async fn find_document(
        &self,
        configuration_id: Uuid,
        external_id: &str,
    ) -> SyncResult<Option<DocumentRecord>>;

    /// Fails when `(configuration_id, external_id)` already exists.
    async fn insert_document(&self, record: DocumentRecord) -> SyncResult<()>;

    async fn update_document(&self, record: DocumentRecord) -> SyncResult<()>;

    /// Flags a live record as deleted. Returns false when no live record matched.
    async fn mark_deleted(
        &self,
        configuration_id: Uuid,
        external_id: &str,
        deleted_at: DateTime<Utc>,
    ) -> SyncResult<bool>;

    /// Physically removes every record of a configuration. Returns the count removed.
    async fn purge_documents(&self, configuration_id: Uuid) -> SyncResult<usize>;

    async fn list_documents(&self, configuration_id: Uuid) -> SyncResult<Vec<DocumentRecord>>;

    async fn insert_sync_log(&self, log: SyncLog) -> SyncResult<()>;

    async fn update_sync_log(&self, log: SyncLog) -> SyncResult<()>;

    /// Most recent logs first.
    async fn list_sync_logs(&self, configuration_id: Uuid, limit: usize)
        -> SyncResult<Vec<SyncLog>>;

    /// Makes buffered document writes durable. Stores that write through return `Ok(())`.
    async fn flush(&self) -> SyncResult<()>;
}
