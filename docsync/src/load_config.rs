/// `load_config` module: Loads the static YAML config for the CLI.
///
/// The file carries no secrets. Service-principal credentials are read from the
/// environment by [`crate::client::credentials_from_env`].
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics, and are surfaced at the CLI boundary.
use anyhow::Result;
use docsync_core::graph::{DEFAULT_GRAPH_URL, DEFAULT_TIMEOUT};
use docsync_core::resolve::DEFAULT_RETRY_DELAY;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    /// JSON snapshot file backing the document store.
    pub store_path: PathBuf,
    #[serde(default)]
    pub graph: GraphSection,
    #[serde(default)]
    pub sync: SyncSection,
}

#[derive(Debug, Deserialize)]
pub struct GraphSection {
    #[serde(default = "default_graph_url")]
    pub base_url: String,
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            base_url: default_graph_url(),
            login_url: default_login_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_retry_delay_ms")]
    pub path_retry_delay_ms: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            path_retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl SyncSection {
    pub fn path_retry_delay(&self) -> Duration {
        Duration::from_millis(self.path_retry_delay_ms)
    }
}

fn default_graph_url() -> String {
    DEFAULT_GRAPH_URL.to_string()
}

fn default_login_url() -> String {
    docsync_core::auth::DEFAULT_LOGIN_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

/// Loads a static YAML config file (no secrets).
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if config.graph.timeout_secs == 0 {
        return Err(anyhow::anyhow!("graph.timeout_secs must be greater than zero"));
    }

    info!(
        store_path = %config.store_path.display(),
        graph = %config.graph.base_url,
        "Parsed config YAML successfully"
    );
    Ok(config)
}
