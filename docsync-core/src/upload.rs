//! Direct small-file upload with an immediate record upsert.
//!
//! The uploaded item is written to the store right away so listings show it
//! before the next delta run picks it up (which then counts it as an update).

use chrono::Utc;
use tracing::{info, instrument};

use crate::contract::{DocumentStore, DriveProvider};
use crate::error::{SyncError, SyncResult};
use crate::model::{normalize_root_path, DocumentRecord, SyncConfiguration};
use crate::reconcile::{relative_folder_path, upsert_item};

/// Graph's single-request PUT limit for content uploads.
pub const MAX_SIMPLE_UPLOAD_BYTES: usize = 4 * 1024 * 1024;

/// Drive path for `file_name` inside `folder_path`, itself relative to the configured root.
pub fn upload_target(root_path: &str, folder_path: &str, file_name: &str) -> String {
    let root = normalize_root_path(root_path);
    let folder = normalize_root_path(folder_path);
    let mut target = String::new();
    if root != "/" {
        target.push_str(&root);
    }
    if folder != "/" {
        target.push_str(&folder);
    }
    target.push('/');
    target.push_str(file_name);
    target
}

#[instrument(skip(provider, store, configuration, content), fields(bytes = content.len()))]
pub async fn upload_file<P, S>(
    provider: &P,
    store: &S,
    configuration: &SyncConfiguration,
    folder_path: &str,
    file_name: &str,
    content: Vec<u8>,
) -> SyncResult<DocumentRecord>
where
    P: DriveProvider + ?Sized,
    S: DocumentStore + ?Sized,
{
    let file_name = file_name.trim();
    if file_name.is_empty() || file_name.contains('/') || file_name.contains('\\') {
        return Err(SyncError::Config(format!("invalid file name {file_name:?}")));
    }
    if content.len() > MAX_SIMPLE_UPLOAD_BYTES {
        return Err(SyncError::UploadTooLarge {
            size: content.len(),
            limit: MAX_SIMPLE_UPLOAD_BYTES,
        });
    }

    let target = upload_target(&configuration.root_path, folder_path, file_name);
    let item = provider
        .upload_content(&configuration.drive_id, &target, content)
        .await?;

    let relative = relative_folder_path(&item, &configuration.root_path)
        .unwrap_or_else(|| normalize_root_path(folder_path));
    upsert_item(store, configuration, &item, relative, Utc::now()).await?;
    store.flush().await?;

    let record = store
        .find_document(configuration.id, &item.id)
        .await?
        .ok_or_else(|| SyncError::Store(format!("uploaded document {} not found", item.id)))?;
    info!(external_id = %record.external_id, path = %target, "Uploaded file");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_joins_root_folder_and_name() {
        assert_eq!(upload_target("/", "/", "a.pdf"), "/a.pdf");
        assert_eq!(upload_target("/Contracts", "/", "a.pdf"), "/Contracts/a.pdf");
        assert_eq!(upload_target("/Contracts", "2024/Q1", "a.pdf"), "/Contracts/2024/Q1/a.pdf");
        assert_eq!(upload_target("", "/2024/", "a.pdf"), "/2024/a.pdf");
    }
}
