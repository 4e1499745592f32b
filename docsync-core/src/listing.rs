//! Folder listing: single-level pagination and the full-tree walk used by full syncs.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::contract::DriveProvider;
use crate::error::SyncResult;
use crate::model::DriveItem;
use crate::resolve::{resolve_folder, ResolvedFolder};

/// Every immediate child of `folder_id`, following `@odata.nextLink` to exhaustion.
pub async fn list_children<P>(
    provider: &P,
    drive_id: &str,
    folder_id: &str,
) -> SyncResult<Vec<DriveItem>>
where
    P: DriveProvider + ?Sized,
{
    let mut page = provider.children_page(drive_id, folder_id).await?;
    let mut items = std::mem::take(&mut page.value);
    let mut pages = 1usize;

    while let Some(next) = page.next_link.take() {
        page = provider.follow_link(&next).await?;
        items.append(&mut page.value);
        pages += 1;
    }

    debug!(folder_id, pages, count = items.len(), "Listed folder children");
    Ok(items)
}

/// Collects every file and folder below `root_path` (the starting folder excluded).
///
/// Depth-first over an explicit stack; one listing per folder, no batching.
#[instrument(skip(provider))]
pub async fn collect_tree<P>(
    provider: &P,
    drive_id: &str,
    root_path: &str,
    retry_delay: Duration,
) -> SyncResult<Vec<DriveItem>>
where
    P: DriveProvider + ?Sized,
{
    let start = resolve_folder(provider, drive_id, root_path, retry_delay).await?;
    let mut pending = vec![start.id];
    let mut collected = Vec::new();
    let mut folders = 0usize;

    while let Some(folder_id) = pending.pop() {
        folders += 1;
        let children = list_children(provider, drive_id, &folder_id).await?;
        // Reverse keeps the walk in provider order once popped.
        pending.extend(
            children
                .iter()
                .rev()
                .filter(|child| child.is_folder())
                .map(|child| child.id.clone()),
        );
        collected.extend(children);
    }

    info!(folders, items = collected.len(), "Collected folder tree");
    Ok(collected)
}

/// One row of a folder picker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowseEntry {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
    pub child_count: Option<u64>,
    pub size: Option<u64>,
    pub web_url: Option<String>,
}

impl From<&DriveItem> for BrowseEntry {
    fn from(item: &DriveItem) -> Self {
        Self {
            id: item.id.clone(),
            name: item.display_name().to_string(),
            is_folder: item.is_folder(),
            child_count: item.folder.as_ref().and_then(|f| f.child_count),
            size: item.size,
            web_url: item.web_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowseListing {
    pub folder: ResolvedFolder,
    pub entries: Vec<BrowseEntry>,
}

/// Where a browse request starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseTarget {
    Path(String),
    FolderId(String),
}

/// Single-level listing for pickers. Files are dropped unless `include_files`.
pub async fn browse_folder<P>(
    provider: &P,
    drive_id: &str,
    target: &BrowseTarget,
    include_files: bool,
    retry_delay: Duration,
) -> SyncResult<BrowseListing>
where
    P: DriveProvider + ?Sized,
{
    let folder = match target {
        BrowseTarget::Path(path) => resolve_folder(provider, drive_id, path, retry_delay).await?,
        BrowseTarget::FolderId(id) => ResolvedFolder {
            id: id.clone(),
            name: String::new(),
        },
    };
    let children = list_children(provider, drive_id, &folder.id).await?;
    let entries = children
        .iter()
        .filter(|child| include_files || child.is_folder())
        .map(BrowseEntry::from)
        .collect();
    Ok(BrowseListing { folder, entries })
}
