//! Persisted records (configuration, documents, sync logs) and the Graph drive-item shape.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque continuation cursor handed out by Graph delta queries.
///
/// The wrapped value is an absolute URL today, but it is only ever followed,
/// never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaToken(String);

impl DeltaToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeltaToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Full,
    Incremental,
}

/// Per-organization sync settings plus the state carried between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfiguration {
    pub id: Uuid,
    pub organization_id: String,
    pub site_id: String,
    pub site_url: Option<String>,
    pub drive_id: String,
    pub drive_name: Option<String>,
    /// Folder scope inside the drive, `/` for the whole drive.
    pub root_path: String,
    pub delta_token: Option<DeltaToken>,
    pub sync_enabled: bool,
    pub sync_interval_minutes: u32,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_status: Option<SyncStatus>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_SYNC_INTERVAL_MINUTES: u32 = 60;

impl SyncConfiguration {
    pub fn new(
        organization_id: impl Into<String>,
        site_id: impl Into<String>,
        drive_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id: organization_id.into(),
            site_id: site_id.into(),
            site_url: None,
            drive_id: drive_id.into(),
            drive_name: None,
            root_path: "/".to_string(),
            delta_token: None,
            sync_enabled: true,
            sync_interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
            last_sync_at: None,
            last_sync_status: None,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a scheduler should start a run at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.sync_enabled {
            return false;
        }
        match self.last_sync_at {
            None => true,
            Some(last) => last + Duration::minutes(i64::from(self.sync_interval_minutes)) <= now,
        }
    }
}

/// Normalises a user supplied folder path to `/a/b` form (`/` for the drive root).
pub fn normalize_root_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.trim().is_empty()).collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Local mirror of one SharePoint file or folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub configuration_id: Uuid,
    pub organization_id: String,
    pub external_id: String,
    pub name: String,
    pub extension: Option<String>,
    pub size: Option<u64>,
    pub is_folder: bool,
    pub mime_type: Option<String>,
    pub web_url: Option<String>,
    pub download_url: Option<String>,
    /// Parent folder relative to the configuration's root path.
    pub folder_path: String,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
    pub external_created_at: Option<DateTime<Utc>>,
    pub external_modified_at: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Builds a fresh record for `item` under `configuration`.
    pub fn from_item(
        configuration: &SyncConfiguration,
        item: &DriveItem,
        folder_path: String,
        synced_at: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            id: Uuid::new_v4(),
            configuration_id: configuration.id,
            organization_id: configuration.organization_id.clone(),
            external_id: item.id.clone(),
            name: String::new(),
            extension: None,
            size: None,
            is_folder: false,
            mime_type: None,
            web_url: None,
            download_url: None,
            folder_path: String::new(),
            created_by: None,
            modified_by: None,
            external_created_at: None,
            external_modified_at: None,
            etag: None,
            is_deleted: false,
            deleted_at: None,
            synced_at,
        };
        record.apply_item(item, folder_path, synced_at);
        record
    }

    /// Overwrites every provider-derived field and revives the record.
    pub fn apply_item(&mut self, item: &DriveItem, folder_path: String, synced_at: DateTime<Utc>) {
        self.name = item.name.clone().unwrap_or_default();
        self.is_folder = item.is_folder();
        self.extension = if self.is_folder {
            None
        } else {
            file_extension(&self.name)
        };
        self.size = item.size;
        self.mime_type = item.file.as_ref().and_then(|f| f.mime_type.clone());
        self.web_url = item.web_url.clone();
        self.download_url = item.download_url.clone();
        self.folder_path = folder_path;
        self.created_by = item.created_by.as_ref().and_then(IdentitySet::display_name);
        self.modified_by = item
            .last_modified_by
            .as_ref()
            .and_then(IdentitySet::display_name);
        self.external_created_at = item.created_date_time;
        self.external_modified_at = item.last_modified_date_time;
        self.etag = item.e_tag.clone();
        self.is_deleted = false;
        self.deleted_at = None;
        self.synced_at = synced_at;
    }
}

/// Lower-cased extension without the dot; `None` for dotfiles and extensionless names.
pub fn file_extension(name: &str) -> Option<String> {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => Some(name[idx + 1..].to_lowercase()),
        _ => None,
    }
}

/// One row per sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: Uuid,
    pub configuration_id: Uuid,
    pub organization_id: String,
    pub status: SyncStatus,
    pub sync_type: SyncType,
    pub items_found: usize,
    pub items_added: usize,
    pub items_updated: usize,
    pub items_deleted: usize,
    pub delta_token_used: Option<DeltaToken>,
    pub delta_token_new: Option<DeltaToken>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncLog {
    pub fn start(configuration: &SyncConfiguration, sync_type: SyncType) -> Self {
        Self {
            id: Uuid::new_v4(),
            configuration_id: configuration.id,
            organization_id: configuration.organization_id.clone(),
            status: SyncStatus::Running,
            sync_type,
            items_found: 0,
            items_added: 0,
            items_updated: 0,
            items_deleted: 0,
            delta_token_used: match sync_type {
                SyncType::Incremental => configuration.delta_token.clone(),
                SyncType::Full => None,
            },
            delta_token_new: None,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

// ---- Graph drive item ----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReference {
    pub drive_id: Option<String>,
    pub id: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFacet {
    pub child_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeletedFacet {
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentitySet {
    pub user: Option<Identity>,
}

impl IdentitySet {
    fn display_name(&self) -> Option<String> {
        self.user.as_ref().and_then(|u| u.display_name.clone())
    }
}

/// The subset of a Graph `driveItem` docsync reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub web_url: Option<String>,
    pub e_tag: Option<String>,
    pub created_date_time: Option<DateTime<Utc>>,
    pub last_modified_date_time: Option<DateTime<Utc>>,
    pub parent_reference: Option<ItemReference>,
    pub file: Option<FileFacet>,
    pub folder: Option<FolderFacet>,
    pub root: Option<serde_json::Value>,
    pub deleted: Option<DeletedFacet>,
    #[serde(rename = "@removed")]
    pub removed: Option<serde_json::Value>,
    pub created_by: Option<IdentitySet>,
    pub last_modified_by: Option<IdentitySet>,
    #[serde(rename = "@microsoft.graph.downloadUrl")]
    pub download_url: Option<String>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.is_some() || self.removed.is_some()
    }

    pub fn is_drive_root(&self) -> bool {
        self.root.is_some()
    }

    pub fn parent_path(&self) -> Option<&str> {
        self.parent_reference.as_ref()?.path.as_deref()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// A document library of a SharePoint site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drive {
    pub id: String,
    pub name: Option<String>,
    pub drive_type: Option<String>,
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub web_url: Option<String>,
}
