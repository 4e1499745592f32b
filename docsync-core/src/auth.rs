//! Client-credentials OAuth2 token provider for Microsoft Graph.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::contract::TokenProvider;
use crate::error::{SyncError, SyncResult};

pub const DEFAULT_LOGIN_URL: &str = "https://login.microsoftonline.com";
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Service principal credentials for one Azure AD tenant.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

/// Exchanges [`Credentials`] for bearer tokens and caches them until shortly before expiry.
#[derive(Debug)]
pub struct ClientCredentials {
    credentials: Credentials,
    login_url: String,
    scope: String,
    http_client: reqwest::Client,
    cached_token: RwLock<Option<CachedToken>>,
    grace_period: Duration,
}

impl ClientCredentials {
    pub fn new(credentials: Credentials, http_client: reqwest::Client) -> Self {
        Self {
            credentials,
            login_url: DEFAULT_LOGIN_URL.to_string(),
            scope: GRAPH_SCOPE.to_string(),
            http_client,
            cached_token: RwLock::new(None),
            grace_period: Duration::minutes(5),
        }
    }

    /// Points the provider at a different identity endpoint (sovereign clouds, tests).
    pub fn with_login_url(mut self, login_url: impl Into<String>) -> Self {
        self.login_url = login_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Drops the cached token so the next call hits the token endpoint.
    pub async fn invalidate(&self) {
        *self.cached_token.write().await = None;
    }

    #[instrument(skip(self), fields(tenant_id = %self.credentials.tenant_id))]
    async fn acquire_token(&self) -> SyncResult<CachedToken> {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_url, self.credentials.tenant_id
        );
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            (
                "client_secret",
                self.credentials.client_secret.expose_secret().as_str(),
            ),
            ("scope", self.scope.as_str()),
        ];

        let response = self.http_client.post(&token_url).form(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Auth {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = Utc::now() + Duration::seconds(token.expires_in);
        debug!(%expires_at, "Acquired Graph access token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    async fn access_token(&self) -> SyncResult<String> {
        {
            let cache = self.cached_token.read().await;
            if let Some(token) = cache.as_ref() {
                if !token.is_expired(self.grace_period) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let fresh = self.acquire_token().await?;
        let access_token = fresh.access_token.clone();
        *self.cached_token.write().await = Some(fresh);
        Ok(access_token)
    }
}
