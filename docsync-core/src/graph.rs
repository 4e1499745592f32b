//! Microsoft Graph drive client.
//!
//! Implements [`DriveProvider`] over reqwest: path addressing
//! (`drives/{id}/root:/a/b`), id addressing (`drives/{id}/items/{item}/children`),
//! link following for paging and delta queries, and single-request uploads.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::contract::{DriveProvider, Page, TokenProvider};
use crate::error::{SyncError, SyncResult};
use crate::model::{DeltaToken, Drive, DriveItem, Site};

pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ODataError {
    error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
struct ODataErrorBody {
    code: String,
    message: String,
}

/// Connection settings for [`GraphClient`].
#[derive(Debug, Clone)]
pub struct GraphSettings {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Builds the shared HTTP client for Graph and token requests.
pub fn http_client(timeout: Duration) -> SyncResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SyncError::Config(format!("Failed to create HTTP client: {e}")))
}

pub struct GraphClient {
    http_client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    base_url: Url,
}

impl GraphClient {
    pub fn new(
        settings: &GraphSettings,
        http_client: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
    ) -> SyncResult<Self> {
        let base_url = Url::parse(&settings.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Config(format!(
                "Graph base URL {} cannot be used as a base",
                settings.base_url
            )));
        }
        Ok(Self {
            http_client,
            tokens,
            base_url,
        })
    }

    fn endpoint<'a, I>(&self, segments: I) -> Url
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> SyncResult<T> {
        let token = self.tokens.access_token().await?;
        debug!(%url, "GET");
        let response = self.http_client.get(url).bearer_auth(token).send().await?;
        let response = check_status(response, url).await?;
        Ok(response.json().await?)
    }
}

/// Maps non-success responses to `NotFound` / `GraphApi`, embedding the body text.
async fn check_status(response: reqwest::Response, url: &str) -> SyncResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(SyncError::NotFound(url.to_string()));
    }
    let message = match serde_json::from_str::<ODataError>(&body) {
        Ok(odata) => format!("{}: {}", odata.error.code, odata.error.message),
        Err(_) => body,
    };
    Err(SyncError::GraphApi {
        status: status.as_u16(),
        message,
    })
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[async_trait]
impl DriveProvider for GraphClient {
    #[instrument(skip(self))]
    async fn item_by_path(&self, drive_id: &str, path: &str) -> SyncResult<DriveItem> {
        if path_segments(path).next().is_none() {
            return self.drive_root(drive_id).await;
        }
        let url = self.endpoint(["drives", drive_id, "root:"].into_iter().chain(path_segments(path)));
        self.get_json(url.as_str()).await
    }

    async fn drive_root(&self, drive_id: &str) -> SyncResult<DriveItem> {
        let url = self.endpoint(["drives", drive_id, "root"]);
        self.get_json(url.as_str()).await
    }

    async fn children_page(&self, drive_id: &str, folder_id: &str) -> SyncResult<Page<DriveItem>> {
        let url = self.endpoint(["drives", drive_id, "items", folder_id, "children"]);
        self.get_json(url.as_str()).await
    }

    async fn follow_link(&self, link: &str) -> SyncResult<Page<DriveItem>> {
        self.get_json(link).await
    }

    #[instrument(skip(self))]
    async fn latest_delta_token(&self, drive_id: &str) -> SyncResult<DeltaToken> {
        let mut url = self.endpoint(["drives", drive_id, "root", "delta"]);
        url.query_pairs_mut().append_pair("token", "latest");
        let page: Page<DriveItem> = self.get_json(url.as_str()).await?;
        page.delta_link
            .map(DeltaToken::new)
            .ok_or_else(|| SyncError::Protocol("delta?token=latest returned no deltaLink".into()))
    }

    #[instrument(skip(self, content), fields(bytes = content.len()))]
    async fn upload_content(
        &self,
        drive_id: &str,
        path: &str,
        content: Vec<u8>,
    ) -> SyncResult<DriveItem> {
        let mut segments: Vec<String> = path_segments(path).map(str::to_string).collect();
        match segments.last_mut() {
            Some(name) => name.push(':'),
            None => return Err(SyncError::Config("Upload path has no file name".into())),
        }
        let url = self.endpoint(
            ["drives", drive_id, "root:"]
                .into_iter()
                .chain(segments.iter().map(String::as_str))
                .chain(["content"]),
        );

        let token = self.tokens.access_token().await?;
        let response = self
            .http_client
            .put(url.as_str())
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(content)
            .send()
            .await?;
        let response = check_status(response, url.as_str()).await?;
        Ok(response.json().await?)
    }

    async fn list_drives(&self, site_id: &str) -> SyncResult<Vec<Drive>> {
        let url = self.endpoint(["sites", site_id, "drives"]);
        let mut page: Page<Drive> = self.get_json(url.as_str()).await?;
        let mut drives = std::mem::take(&mut page.value);
        while let Some(next) = page.next_link.take() {
            page = self.get_json(&next).await?;
            drives.append(&mut page.value);
        }
        Ok(drives)
    }

    async fn site_by_path(&self, hostname: &str, site_path: &str) -> SyncResult<Site> {
        let url = if path_segments(site_path).next().is_none() {
            self.endpoint(["sites", hostname])
        } else {
            let host = format!("{hostname}:");
            self.endpoint(["sites", host.as_str()].into_iter().chain(path_segments(site_path)))
        };
        self.get_json(url.as_str()).await
    }
}
