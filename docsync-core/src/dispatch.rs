//! JSON-in / JSON-out action dispatcher.
//!
//! Requests are objects tagged by `action`; every action carries an
//! `organization_id`. Responses are `{"success": true, "data": ...}` or
//! `{"success": false, "error": "..."}`, never a transport-level failure.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, instrument};

use crate::contract::{DocumentStore, DriveProvider};
use crate::error::{SyncError, SyncResult};
use crate::listing::{browse_folder, BrowseTarget};
use crate::model::{normalize_root_path, SyncConfiguration};
use crate::synchronise::{synchronise, SyncOptions};
use crate::upload::upload_file;

const DEFAULT_LOG_LIMIT: usize = 20;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    SaveConfig(SaveConfig),
    GetConfig(OrganizationOnly),
    DeleteConfig(OrganizationOnly),
    ResolveSite(ResolveSite),
    ListDrives(ListDrives),
    BrowseFolders(BrowseFolders),
    UploadFile(UploadFile),
    RunSync(RunSync),
    ListDocuments(ListDocuments),
    SyncLogs(SyncLogs),
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationOnly {
    pub organization_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveConfig {
    pub organization_id: String,
    pub site_id: String,
    pub site_url: Option<String>,
    pub drive_id: String,
    pub drive_name: Option<String>,
    pub root_path: Option<String>,
    pub sync_enabled: Option<bool>,
    pub sync_interval_minutes: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveSite {
    pub organization_id: String,
    pub hostname: String,
    #[serde(default)]
    pub site_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListDrives {
    pub organization_id: String,
    pub site_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowseFolders {
    pub organization_id: String,
    pub drive_id: Option<String>,
    pub folder_id: Option<String>,
    pub path: Option<String>,
    #[serde(default)]
    pub include_files: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadFile {
    pub organization_id: String,
    #[serde(default)]
    pub folder_path: String,
    pub file_name: String,
    pub content_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunSync {
    pub organization_id: String,
    #[serde(default)]
    pub full_sync: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListDocuments {
    pub organization_id: String,
    #[serde(default)]
    pub include_deleted: bool,
    pub folder_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncLogs {
    pub organization_id: String,
    pub limit: Option<usize>,
}

impl ActionRequest {
    pub fn organization_id(&self) -> &str {
        match self {
            ActionRequest::SaveConfig(r) => &r.organization_id,
            ActionRequest::GetConfig(r) | ActionRequest::DeleteConfig(r) => &r.organization_id,
            ActionRequest::ResolveSite(r) => &r.organization_id,
            ActionRequest::ListDrives(r) => &r.organization_id,
            ActionRequest::BrowseFolders(r) => &r.organization_id,
            ActionRequest::UploadFile(r) => &r.organization_id,
            ActionRequest::RunSync(r) => &r.organization_id,
            ActionRequest::ListDocuments(r) => &r.organization_id,
            ActionRequest::SyncLogs(r) => &r.organization_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActionRequest::SaveConfig(_) => "save_config",
            ActionRequest::GetConfig(_) => "get_config",
            ActionRequest::DeleteConfig(_) => "delete_config",
            ActionRequest::ResolveSite(_) => "resolve_site",
            ActionRequest::ListDrives(_) => "list_drives",
            ActionRequest::BrowseFolders(_) => "browse_folders",
            ActionRequest::UploadFile(_) => "upload_file",
            ActionRequest::RunSync(_) => "run_sync",
            ActionRequest::ListDocuments(_) => "list_documents",
            ActionRequest::SyncLogs(_) => "sync_logs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Routes [`ActionRequest`]s to the sync operations over injected collaborators.
pub struct Dispatcher<'a, P: ?Sized, S: ?Sized> {
    provider: &'a P,
    store: &'a S,
    options: SyncOptions,
}

impl<'a, P, S> Dispatcher<'a, P, S>
where
    P: DriveProvider + ?Sized,
    S: DocumentStore + ?Sized,
{
    pub fn new(provider: &'a P, store: &'a S, options: SyncOptions) -> Self {
        Self {
            provider,
            store,
            options,
        }
    }

    /// Parses a raw JSON request and handles it.
    pub async fn dispatch_json(&self, request: Value) -> ActionResponse {
        match serde_json::from_value::<ActionRequest>(request) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => ActionResponse::failed(format!("invalid request: {e}")),
        }
    }

    #[instrument(skip(self, request), fields(action = request.name(), organization_id = request.organization_id()))]
    pub async fn dispatch(&self, request: ActionRequest) -> ActionResponse {
        if request.organization_id().trim().is_empty() {
            return ActionResponse::failed("organization_id is required");
        }
        match self.handle(request).await {
            Ok(data) => ActionResponse::ok(data),
            Err(e) => {
                error!(error = %e, "Action failed");
                ActionResponse::failed(e.to_string())
            }
        }
    }

    async fn handle(&self, request: ActionRequest) -> SyncResult<Value> {
        match request {
            ActionRequest::SaveConfig(req) => self.save_config(req).await,
            ActionRequest::GetConfig(req) => {
                let configuration = self.store.get_configuration(&req.organization_id).await?;
                let recent_logs = match &configuration {
                    Some(c) => self.store.list_sync_logs(c.id, 5).await?,
                    None => Vec::new(),
                };
                Ok(json!({ "configuration": configuration, "recent_logs": recent_logs }))
            }
            ActionRequest::DeleteConfig(req) => {
                let deleted = self.store.delete_configuration(&req.organization_id).await?;
                info!(deleted, "Deleted configuration");
                Ok(json!({ "deleted": deleted }))
            }
            ActionRequest::ResolveSite(req) => {
                if req.hostname.trim().is_empty() {
                    return Err(SyncError::Config("hostname is required".into()));
                }
                let site = self.provider.site_by_path(&req.hostname, &req.site_path).await?;
                Ok(serde_json::to_value(site)?)
            }
            ActionRequest::ListDrives(req) => {
                let site_id = match req.site_id {
                    Some(site_id) => site_id,
                    None => self.configuration(&req.organization_id).await?.site_id,
                };
                let drives = self.provider.list_drives(&site_id).await?;
                Ok(json!({ "drives": drives }))
            }
            ActionRequest::BrowseFolders(req) => {
                let drive_id = match req.drive_id {
                    Some(drive_id) => drive_id,
                    None => self.configuration(&req.organization_id).await?.drive_id,
                };
                let target = match (req.folder_id, req.path) {
                    (Some(folder_id), _) => BrowseTarget::FolderId(folder_id),
                    (None, path) => BrowseTarget::Path(path.unwrap_or_else(|| "/".into())),
                };
                let listing = browse_folder(
                    self.provider,
                    &drive_id,
                    &target,
                    req.include_files,
                    self.options.path_retry_delay,
                )
                .await?;
                Ok(serde_json::to_value(listing)?)
            }
            ActionRequest::UploadFile(req) => {
                let configuration = self.configuration(&req.organization_id).await?;
                let content = BASE64
                    .decode(req.content_base64.as_bytes())
                    .map_err(|e| SyncError::Config(format!("content_base64 is not valid base64: {e}")))?;
                let record = upload_file(
                    self.provider,
                    self.store,
                    &configuration,
                    &req.folder_path,
                    &req.file_name,
                    content,
                )
                .await?;
                Ok(serde_json::to_value(record)?)
            }
            ActionRequest::RunSync(req) => {
                let options = SyncOptions {
                    full_sync: req.full_sync,
                    ..self.options.clone()
                };
                let report =
                    synchronise(self.provider, self.store, &req.organization_id, &options).await?;
                Ok(serde_json::to_value(report)?)
            }
            ActionRequest::ListDocuments(req) => {
                let configuration = self.configuration(&req.organization_id).await?;
                let folder = req.folder_path.as_deref().map(normalize_root_path);
                let documents: Vec<_> = self
                    .store
                    .list_documents(configuration.id)
                    .await?
                    .into_iter()
                    .filter(|doc| req.include_deleted || !doc.is_deleted)
                    .filter(|doc| folder.as_ref().map_or(true, |f| &doc.folder_path == f))
                    .collect();
                Ok(json!({ "documents": documents }))
            }
            ActionRequest::SyncLogs(req) => {
                let configuration = self.configuration(&req.organization_id).await?;
                let logs = self
                    .store
                    .list_sync_logs(configuration.id, req.limit.unwrap_or(DEFAULT_LOG_LIMIT))
                    .await?;
                Ok(json!({ "logs": logs }))
            }
        }
    }

    async fn configuration(&self, organization_id: &str) -> SyncResult<SyncConfiguration> {
        self.store
            .get_configuration(organization_id)
            .await?
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "no SharePoint configuration for organization {organization_id}"
                ))
            })
    }

    /// Creates or edits the configuration. Changing the drive or root path
    /// purges all records and clears the delta token, forcing a full resync.
    async fn save_config(&self, req: SaveConfig) -> SyncResult<Value> {
        if req.site_id.trim().is_empty() || req.drive_id.trim().is_empty() {
            return Err(SyncError::Config("site_id and drive_id are required".into()));
        }
        if req.sync_interval_minutes == Some(0) {
            return Err(SyncError::Config(
                "sync_interval_minutes must be at least 1".into(),
            ));
        }

        let existing = self.store.get_configuration(&req.organization_id).await?;
        let mut scope_changed = false;
        let mut configuration = match existing {
            Some(mut current) => {
                let new_root = req
                    .root_path
                    .as_deref()
                    .map(normalize_root_path)
                    .unwrap_or_else(|| current.root_path.clone());
                scope_changed = new_root != normalize_root_path(&current.root_path)
                    || req.drive_id != current.drive_id;
                if scope_changed {
                    current.delta_token = None;
                }
                current.root_path = new_root;
                current.updated_at = Utc::now();
                current
            }
            None => {
                let mut fresh =
                    SyncConfiguration::new(&req.organization_id, &req.site_id, &req.drive_id);
                if let Some(root) = req.root_path.as_deref() {
                    fresh.root_path = normalize_root_path(root);
                }
                fresh
            }
        };

        configuration.site_id = req.site_id;
        configuration.drive_id = req.drive_id;
        if req.site_url.is_some() {
            configuration.site_url = req.site_url;
        }
        if req.drive_name.is_some() {
            configuration.drive_name = req.drive_name;
        }
        if let Some(enabled) = req.sync_enabled {
            configuration.sync_enabled = enabled;
        }
        if let Some(interval) = req.sync_interval_minutes {
            configuration.sync_interval_minutes = interval;
        }

        // The cleared token is stored before the purge: if the purge fails,
        // the next run is still a full one and purges again.
        self.store.save_configuration(configuration.clone()).await?;
        if scope_changed {
            let purged = self.store.purge_documents(configuration.id).await?;
            self.store.flush().await?;
            info!(purged, root = %configuration.root_path, "Sync scope changed, purged records and cleared delta token");
        }
        Ok(serde_json::to_value(configuration)?)
    }
}
