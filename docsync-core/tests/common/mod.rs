//! Shared fixtures: an in-memory drive tree that speaks the `DriveProvider` contract.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsync_core::contract::{DocumentStore, DriveProvider, Page};
use docsync_core::error::{SyncError, SyncResult};
use docsync_core::model::{
    DeletedFacet, DeltaToken, DocumentRecord, Drive, DriveItem, FileFacet, FolderFacet,
    ItemReference, Site, SyncConfiguration, SyncLog,
};
use docsync_core::store::MemoryStore;
use uuid::Uuid;

pub const DRIVE: &str = "D";
pub const ROOT_ID: &str = "root-id";

pub fn parent_reference(parent_drive_path: &str) -> ItemReference {
    let suffix = if parent_drive_path == "/" {
        ""
    } else {
        parent_drive_path
    };
    ItemReference {
        drive_id: Some(DRIVE.into()),
        id: None,
        path: Some(format!("/drives/{DRIVE}/root:{suffix}")),
    }
}

pub fn folder_item(id: &str, name: &str, parent_drive_path: &str) -> DriveItem {
    DriveItem {
        id: id.into(),
        name: Some(name.into()),
        parent_reference: Some(parent_reference(parent_drive_path)),
        folder: Some(FolderFacet { child_count: None }),
        e_tag: Some(format!("etag-{id}")),
        ..Default::default()
    }
}

pub fn file_item(id: &str, name: &str, parent_drive_path: &str) -> DriveItem {
    DriveItem {
        id: id.into(),
        name: Some(name.into()),
        size: Some(1024),
        parent_reference: Some(parent_reference(parent_drive_path)),
        file: Some(FileFacet {
            mime_type: Some("application/pdf".into()),
        }),
        e_tag: Some(format!("etag-{id}")),
        web_url: Some(format!("https://contoso.sharepoint.com/{name}")),
        ..Default::default()
    }
}

pub fn deleted_item(id: &str) -> DriveItem {
    DriveItem {
        id: id.into(),
        deleted: Some(DeletedFacet {
            state: Some("deleted".into()),
        }),
        ..Default::default()
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// A drive held in memory. Children are served in pages of `page_size`.
pub struct FakeDrive {
    pub page_size: usize,
    children: HashMap<String, Vec<DriveItem>>,
    drive_paths: HashMap<String, String>,
    by_path: HashMap<String, DriveItem>,
    /// Paths whose direct lookup answers 404 this many more times.
    pub not_found_budget: Mutex<HashMap<String, usize>>,
    /// Paths whose direct lookup always answers 404.
    pub unaddressable: HashSet<String>,
    /// Folder ids whose listing fails with a 500.
    pub broken_folders: HashSet<String>,
    /// Delta link → page.
    pub delta_pages: HashMap<String, Page<DriveItem>>,
    pub latest_token: String,
    pub calls: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeDrive {
    pub fn new() -> Self {
        let mut drive_paths = HashMap::new();
        drive_paths.insert(ROOT_ID.to_string(), "/".to_string());
        Self {
            page_size: 2,
            children: HashMap::new(),
            drive_paths,
            by_path: HashMap::new(),
            not_found_budget: Mutex::new(HashMap::new()),
            unaddressable: HashSet::new(),
            broken_folders: HashSet::new(),
            delta_pages: HashMap::new(),
            latest_token: "https://graph.test/delta?token=latest-1".into(),
            calls: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn add_folder(&mut self, parent_id: &str, id: &str, name: &str) -> &mut Self {
        let parent_path = self.drive_paths[parent_id].clone();
        let item = folder_item(id, name, &parent_path);
        let path = join(&parent_path, name);
        self.drive_paths.insert(id.to_string(), path.clone());
        self.by_path.insert(path, item.clone());
        self.children.entry(parent_id.to_string()).or_default().push(item);
        self
    }

    pub fn add_file(&mut self, parent_id: &str, id: &str, name: &str) -> &mut Self {
        let parent_path = self.drive_paths[parent_id].clone();
        let item = file_item(id, name, &parent_path);
        self.by_path.insert(join(&parent_path, name), item.clone());
        self.children.entry(parent_id.to_string()).or_default().push(item);
        self
    }

    /// Registers a delta chain: each page links to the next, the last one closes with `final_link`.
    pub fn add_delta_chain(&mut self, first_link: &str, pages: Vec<Vec<DriveItem>>, final_link: &str) {
        let count = pages.len();
        let mut link = first_link.to_string();
        for (idx, items) in pages.into_iter().enumerate() {
            let last = idx + 1 == count;
            let next = format!("{first_link}&page={}", idx + 1);
            self.delta_pages.insert(
                link.clone(),
                Page {
                    value: items,
                    next_link: (!last).then(|| next.clone()),
                    delta_link: last.then(|| final_link.to_string()),
                },
            );
            link = next;
        }
    }

    pub fn drive_path(&self, id: &str) -> Option<&String> {
        self.drive_paths.get(id)
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn root_item(&self) -> DriveItem {
        DriveItem {
            id: ROOT_ID.into(),
            name: Some("root".into()),
            folder: Some(FolderFacet { child_count: None }),
            root: Some(serde_json::json!({})),
            ..Default::default()
        }
    }

    fn page_of(&self, folder_id: &str, index: usize) -> Page<DriveItem> {
        let all = self.children.get(folder_id).cloned().unwrap_or_default();
        let chunks: Vec<Vec<DriveItem>> = all.chunks(self.page_size.max(1)).map(|c| c.to_vec()).collect();
        let value = chunks.get(index).cloned().unwrap_or_default();
        let next_link =
            (index + 1 < chunks.len()).then(|| format!("page://{folder_id}/{}", index + 1));
        Page {
            value,
            next_link,
            delta_link: None,
        }
    }
}

#[async_trait]
impl DriveProvider for FakeDrive {
    async fn item_by_path(&self, _drive_id: &str, path: &str) -> SyncResult<DriveItem> {
        self.record(format!("item_by_path:{path}"));
        if self.unaddressable.contains(path) {
            return Err(SyncError::NotFound(path.into()));
        }
        {
            let mut budget = self.not_found_budget.lock().unwrap();
            if let Some(remaining) = budget.get_mut(path) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SyncError::NotFound(path.into()));
                }
            }
        }
        self.by_path
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(path.into()))
    }

    async fn drive_root(&self, _drive_id: &str) -> SyncResult<DriveItem> {
        self.record("drive_root".into());
        Ok(self.root_item())
    }

    async fn children_page(&self, _drive_id: &str, folder_id: &str) -> SyncResult<Page<DriveItem>> {
        self.record(format!("children:{folder_id}"));
        if self.broken_folders.contains(folder_id) {
            return Err(SyncError::GraphApi {
                status: 500,
                message: "generalException: boom".into(),
            });
        }
        Ok(self.page_of(folder_id, 0))
    }

    async fn follow_link(&self, link: &str) -> SyncResult<Page<DriveItem>> {
        self.record(format!("follow:{link}"));
        if let Some(rest) = link.strip_prefix("page://") {
            let (folder, index) = rest
                .rsplit_once('/')
                .ok_or_else(|| SyncError::Protocol(link.into()))?;
            let index: usize = index.parse().map_err(|_| SyncError::Protocol(link.into()))?;
            return Ok(self.page_of(folder, index));
        }
        self.delta_pages.get(link).cloned().ok_or_else(|| SyncError::GraphApi {
            status: 410,
            message: format!("resyncRequired: unknown delta link {link}"),
        })
    }

    async fn latest_delta_token(&self, _drive_id: &str) -> SyncResult<DeltaToken> {
        self.record("latest_delta_token".into());
        Ok(DeltaToken::new(self.latest_token.clone()))
    }

    async fn upload_content(&self, _drive_id: &str, path: &str, content: Vec<u8>) -> SyncResult<DriveItem> {
        self.record(format!("upload:{path}"));
        let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
        let parent = if parent.is_empty() { "/" } else { parent };
        self.uploads.lock().unwrap().push((path.to_string(), content.clone()));
        let mut item = file_item(&format!("up-{name}"), name, parent);
        item.size = Some(content.len() as u64);
        Ok(item)
    }

    async fn list_drives(&self, site_id: &str) -> SyncResult<Vec<Drive>> {
        self.record(format!("list_drives:{site_id}"));
        Ok(vec![Drive {
            id: DRIVE.into(),
            name: Some("Documents".into()),
            drive_type: Some("documentLibrary".into()),
            web_url: None,
        }])
    }

    async fn site_by_path(&self, hostname: &str, site_path: &str) -> SyncResult<Site> {
        self.record(format!("site:{hostname}:{site_path}"));
        Ok(Site {
            id: format!("{hostname},site-guid,web-guid"),
            name: Some(site_path.trim_matches('/').to_string()),
            display_name: Some("Legal".into()),
            web_url: Some(format!("https://{hostname}{site_path}")),
        })
    }
}

/// `/Contracts/{2024/{nda.pdf, msa.pdf}, 2023/{old.pdf}, index.pdf}` plus `/HR/handbook.pdf`.
pub fn contracts_drive() -> FakeDrive {
    let mut drive = FakeDrive::new();
    drive
        .add_folder(ROOT_ID, "contracts", "Contracts")
        .add_folder(ROOT_ID, "hr", "HR")
        .add_file("hr", "handbook", "handbook.pdf")
        .add_folder("contracts", "y2024", "2024")
        .add_folder("contracts", "y2023", "2023")
        .add_file("contracts", "index", "index.pdf")
        .add_file("y2024", "nda", "nda.pdf")
        .add_file("y2024", "msa", "msa.pdf")
        .add_file("y2023", "old", "old.pdf");
    drive
}

/// Delegates to a [`MemoryStore`] but fails selected writes.
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_insert_of: Option<&'static str>,
    pub fail_mark_deleted: bool,
    /// Number of upcoming `save_configuration` calls that fail.
    pub failing_saves: AtomicUsize,
}

impl FlakyStore {
    pub fn wrap(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_insert_of: None,
            fail_mark_deleted: false,
            failing_saves: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get_configuration(&self, organization_id: &str) -> SyncResult<Option<SyncConfiguration>> {
        self.inner.get_configuration(organization_id).await
    }
    async fn save_configuration(&self, configuration: SyncConfiguration) -> SyncResult<()> {
        let failing = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SyncError::Store("write failed".into()));
        }
        self.inner.save_configuration(configuration).await
    }
    async fn delete_configuration(&self, organization_id: &str) -> SyncResult<bool> {
        self.inner.delete_configuration(organization_id).await
    }
    async fn find_document(&self, configuration_id: Uuid, external_id: &str) -> SyncResult<Option<DocumentRecord>> {
        self.inner.find_document(configuration_id, external_id).await
    }
    async fn insert_document(&self, record: DocumentRecord) -> SyncResult<()> {
        if self.fail_insert_of == Some(record.external_id.as_str()) {
            return Err(SyncError::Store("connection reset".into()));
        }
        self.inner.insert_document(record).await
    }
    async fn update_document(&self, record: DocumentRecord) -> SyncResult<()> {
        self.inner.update_document(record).await
    }
    async fn mark_deleted(&self, configuration_id: Uuid, external_id: &str, deleted_at: DateTime<Utc>) -> SyncResult<bool> {
        if self.fail_mark_deleted {
            return Err(SyncError::Store("deadlock detected".into()));
        }
        self.inner.mark_deleted(configuration_id, external_id, deleted_at).await
    }
    async fn purge_documents(&self, configuration_id: Uuid) -> SyncResult<usize> {
        self.inner.purge_documents(configuration_id).await
    }
    async fn list_documents(&self, configuration_id: Uuid) -> SyncResult<Vec<DocumentRecord>> {
        self.inner.list_documents(configuration_id).await
    }
    async fn insert_sync_log(&self, log: SyncLog) -> SyncResult<()> {
        self.inner.insert_sync_log(log).await
    }
    async fn update_sync_log(&self, log: SyncLog) -> SyncResult<()> {
        self.inner.update_sync_log(log).await
    }
    async fn list_sync_logs(&self, configuration_id: Uuid, limit: usize) -> SyncResult<Vec<SyncLog>> {
        self.inner.list_sync_logs(configuration_id, limit).await
    }
    async fn flush(&self) -> SyncResult<()> {
        self.inner.flush().await
    }
}
