#![doc = "Wires the core Graph client and token provider from CLI config plus environment secrets."]
//
//! # Client construction
//!
//! Secrets never live in the YAML file. The service principal is read from:
//! - `SHAREPOINT_TENANT_ID`
//! - `SHAREPOINT_CLIENT_ID`
//! - `SHAREPOINT_CLIENT_SECRET`
//!
//! A missing variable is fatal; nothing is retried.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use docsync_core::auth::{ClientCredentials, Credentials};
use docsync_core::graph::{http_client, GraphClient, GraphSettings};
use secrecy::SecretString;

use crate::load_config::CliConfig;

pub const TENANT_ID_VAR: &str = "SHAREPOINT_TENANT_ID";
pub const CLIENT_ID_VAR: &str = "SHAREPOINT_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "SHAREPOINT_CLIENT_SECRET";

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => Err(anyhow::anyhow!("{name} is set but empty")),
        Err(e) => {
            tracing::error!(error = ?e, var = name, "Missing SharePoint credential in environment");
            Err(anyhow::anyhow!("{name} missing in environment"))
        }
    }
}

pub fn credentials_from_env() -> Result<Credentials> {
    Ok(Credentials {
        tenant_id: required(TENANT_ID_VAR)?,
        client_id: required(CLIENT_ID_VAR)?,
        client_secret: SecretString::new(required(CLIENT_SECRET_VAR)?),
    })
}

/// Builds a Graph client whose tokens come from the environment's service principal.
pub fn graph_client_from_env(config: &CliConfig) -> Result<GraphClient> {
    let credentials = credentials_from_env()?;
    let timeout = Duration::from_secs(config.graph.timeout_secs);
    let http = http_client(timeout).context("building HTTP client")?;

    let tokens = ClientCredentials::new(credentials, http.clone())
        .with_login_url(config.graph.login_url.clone());
    let settings = GraphSettings {
        base_url: config.graph.base_url.clone(),
        timeout,
    };
    tracing::info!(graph = %settings.base_url, "Initialized Graph client from environment");
    GraphClient::new(&settings, http, Arc::new(tokens)).context("building Graph client")
}
