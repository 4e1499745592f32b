use assert_cmd::Command;
use chrono::Utc;
use docsync_core::contract::DocumentStore;
use docsync_core::model::SyncConfiguration;
use docsync_core::store::MemoryStore;
use predicates::prelude::*;
use serde_json::json;
use std::fs::write;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENV_VARS: [&str; 3] = [
    "SHAREPOINT_TENANT_ID",
    "SHAREPOINT_CLIENT_ID",
    "SHAREPOINT_CLIENT_SECRET",
];

/// Writes a config file pointing the store into `dir` and Graph at `server_uri`.
fn write_config(dir: &Path, server_uri: &str) -> std::path::PathBuf {
    let config = dir.join("docsync.yaml");
    let yaml = format!(
        "store_path: {}\ngraph:\n  base_url: {server_uri}/v1.0\n  login_url: {server_uri}\n  timeout_secs: 5\nsync:\n  path_retry_delay_ms: 0\n",
        dir.join("state.json").display()
    );
    write(&config, yaml).expect("Writing temp config failed");
    config
}

fn docsync() -> Command {
    let mut cmd = Command::cargo_bin("docsync").expect("Binary exists");
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn with_credentials(cmd: &mut Command) -> &mut Command {
    cmd.env("SHAREPOINT_TENANT_ID", "tenant-1")
        .env("SHAREPOINT_CLIENT_ID", "client-1")
        .env("SHAREPOINT_CLIENT_SECRET", "s3cret")
}

#[test]
fn sync_fails_for_missing_config_file() {
    docsync()
        .args(["sync", "--config", "does-not-exist.yaml", "--organization", "org-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn sync_without_credentials_names_the_missing_variable() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:9");

    docsync()
        .arg("sync")
        .arg("--config")
        .arg(&config)
        .args(["--organization", "org-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SHAREPOINT_TENANT_ID"));
}

#[tokio::test]
async fn sync_if_due_skips_recent_configuration() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:9");

    let mut configuration = SyncConfiguration::new("org-1", "site-1", "D");
    configuration.last_sync_at = Some(Utc::now());
    let store = MemoryStore::open(dir.path().join("state.json")).await.unwrap();
    store.save_configuration(configuration).await.unwrap();

    // No credentials needed: nothing is fetched when the run is skipped.
    docsync()
        .arg("sync")
        .arg("--config")
        .arg(&config)
        .args(["--organization", "org-1", "--if-due"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"skipped\":true"));
}

#[test]
fn dispatch_save_then_get_config_round_trips_through_store() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:9");

    let save = json!({
        "action": "save_config",
        "organization_id": "org-1",
        "site_id": "site-1",
        "drive_id": "D",
        "root_path": "Contracts/"
    });
    let mut cmd = docsync();
    with_credentials(&mut cmd)
        .arg("dispatch")
        .arg("--config")
        .arg(&config)
        .write_stdin(save.to_string())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success\": true"));

    let request = dir.path().join("get.json");
    write(
        &request,
        json!({"action": "get_config", "organization_id": "org-1"}).to_string(),
    )
    .unwrap();
    let mut cmd = docsync();
    with_credentials(&mut cmd)
        .arg("dispatch")
        .arg("--config")
        .arg(&config)
        .arg("--request")
        .arg(&request)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"root_path\": \"/Contracts\""));
}

#[test]
fn dispatch_failure_prints_response_and_exits_non_zero() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:9");

    let mut cmd = docsync();
    with_credentials(&mut cmd)
        .arg("dispatch")
        .arg("--config")
        .arg(&config)
        .write_stdin(json!({"action": "run_sync", "organization_id": ""}).to_string())
        .assert()
        .failure()
        .stdout(predicate::str::contains("organization_id is required"));
}

#[tokio::test(flavor = "multi_thread")]
async fn dispatch_list_drives_calls_graph_with_fetched_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "cli-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1/drives"))
        .and(header("authorization", "Bearer cli-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "D", "name": "Documents", "driveType": "documentLibrary"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());
    let request = json!({
        "action": "list_drives",
        "organization_id": "org-1",
        "site_id": "site-1"
    });

    let mut cmd = docsync();
    with_credentials(&mut cmd)
        .arg("dispatch")
        .arg("--config")
        .arg(&config)
        .write_stdin(request.to_string())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": \"D\""));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use docsync::cli::{run, Cli, Commands};

    // A dummy path is enough: the event fires before the config is read.
    let cli = Cli {
        command: Commands::Sync {
            config: std::path::PathBuf::from("dummy.yaml"),
            organization: "org-1".into(),
            full: false,
            if_due: false,
        },
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
