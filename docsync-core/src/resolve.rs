//! Folder path → drive item id resolution.
//!
//! Direct `root:/path` addressing is tried first. SharePoint occasionally
//! answers 404 for folders that exist (freshly created, or with names whose
//! casing differs from the request), so a 404 gets one delayed retry and then
//! a case-insensitive walk from the drive root, one segment at a time.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::contract::DriveProvider;
use crate::error::{SyncError, SyncResult};
use crate::listing::list_children;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFolder {
    pub id: String,
    pub name: String,
}

/// Resolves `path` inside `drive_id`. `""` and `/` resolve to the drive root.
#[instrument(skip(provider))]
pub async fn resolve_folder<P>(
    provider: &P,
    drive_id: &str,
    path: &str,
    retry_delay: Duration,
) -> SyncResult<ResolvedFolder>
where
    P: DriveProvider + ?Sized,
{
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        let root = provider.drive_root(drive_id).await?;
        return Ok(ResolvedFolder {
            name: root.display_name().to_string(),
            id: root.id,
        });
    }
    let joined = format!("/{}", segments.join("/"));

    match provider.item_by_path(drive_id, &joined).await {
        Ok(item) => {
            return Ok(ResolvedFolder {
                name: item.display_name().to_string(),
                id: item.id,
            })
        }
        Err(e) if e.is_not_found() => {
            debug!(path = %joined, ?retry_delay, "Direct path lookup returned 404, retrying once");
        }
        Err(e) => return Err(e),
    }

    tokio::time::sleep(retry_delay).await;
    match provider.item_by_path(drive_id, &joined).await {
        Ok(item) => {
            return Ok(ResolvedFolder {
                name: item.display_name().to_string(),
                id: item.id,
            })
        }
        Err(e) if e.is_not_found() => {
            warn!(path = %joined, "Path still unresolved after retry, walking segments");
        }
        Err(e) => return Err(e),
    }

    walk_segments(provider, drive_id, &segments).await
}

async fn walk_segments<P>(
    provider: &P,
    drive_id: &str,
    segments: &[&str],
) -> SyncResult<ResolvedFolder>
where
    P: DriveProvider + ?Sized,
{
    let root = provider.drive_root(drive_id).await?;
    let mut current = ResolvedFolder {
        name: root.display_name().to_string(),
        id: root.id,
    };

    for segment in segments {
        let children = list_children(provider, drive_id, &current.id).await?;
        let found = children
            .iter()
            .find(|child| child.is_folder() && child.display_name().eq_ignore_ascii_case(segment));
        match found {
            Some(child) => {
                current = ResolvedFolder {
                    id: child.id.clone(),
                    name: child.display_name().to_string(),
                };
            }
            None => {
                return Err(SyncError::SegmentNotFound {
                    segment: segment.to_string(),
                    available: children
                        .iter()
                        .map(|c| c.display_name().to_string())
                        .collect(),
                });
            }
        }
    }

    info!(folder_id = %current.id, "Resolved folder by walking segments");
    Ok(current)
}
