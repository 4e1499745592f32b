//! Incremental change fetch via Graph delta links.

use tracing::{debug, info, instrument};

use crate::contract::DriveProvider;
use crate::error::{SyncError, SyncResult};
use crate::model::{DeltaToken, DriveItem};

/// Changes since a token was issued, plus the token to store for next time.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaBatch {
    pub items: Vec<DriveItem>,
    pub token: DeltaToken,
}

/// Follows `token` and every `@odata.nextLink` until a page carries the closing delta link.
#[instrument(skip_all)]
pub async fn fetch_delta<P>(provider: &P, token: &DeltaToken) -> SyncResult<DeltaBatch>
where
    P: DriveProvider + ?Sized,
{
    let mut link = token.as_str().to_string();
    let mut items = Vec::new();
    let mut pages = 0usize;

    loop {
        let mut page = provider.follow_link(&link).await?;
        pages += 1;
        items.append(&mut page.value);

        if let Some(delta_link) = page.delta_link {
            info!(pages, changes = items.len(), "Delta fetch complete");
            return Ok(DeltaBatch {
                items,
                token: DeltaToken::new(delta_link),
            });
        }
        match page.next_link {
            Some(next) => {
                debug!(pages, "Following delta nextLink");
                link = next;
            }
            None => {
                return Err(SyncError::Protocol(
                    "delta page carried neither nextLink nor deltaLink".into(),
                ))
            }
        }
    }
}
