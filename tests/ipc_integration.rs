//! HTTP API driven through the axum router directly (`tower::ServiceExt::oneshot`),
//! with an in-memory service manager.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use dpi_core::config::{AppContext, Settings};
use dpi_core::ipc::IPCServer;
use dpi_core::service::{ServiceBackend, ServiceController, ServiceError, ServiceState};
use dpi_core::shutdown::ShutdownCoordinator;
use dpi_core::supervisor::{ConsoleBuffer, OutputFilter, ProcessSupervisor};

#[derive(Default)]
struct MemoryServices {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ServiceBackend for MemoryServices {
    async fn query(&self, name: &str) -> Result<ServiceState, ServiceError> {
        self.calls.lock().unwrap().push(format!("query {}", name));
        Ok(ServiceState::NotInstalled)
    }

    async fn request_stop(&self, name: &str) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().push(format!("stop {}", name));
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().push(format!("start {}", name));
        Ok(())
    }

    async fn create(&self, name: &str, _bin_path: &str, _description: &str) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().push(format!("create {}", name));
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().push(format!("delete {}", name));
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    base: PathBuf,
    app: Router,
    backend: Arc<MemoryServices>,
}

const PROFILES: &str = "[SCRIPT_OPTIONS]\n\n\
[general]\nexecutable = {ZAPRET_FOLDER}/winws.exe\nargs = --wf-tcp=80,443;\n    --hostlist={BLACKLIST_FILES_0}\n\n\
[sleepy]\nexecutable = /bin/sh\nargs = -c;\n    sleep 30\n";

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_path_buf();
    std::fs::write(base.join("profiles.ini"), PROFILES).unwrap();

    let ctx = Arc::new(AppContext::new(Settings {
        base_folder: Some(base.clone()),
        config_file: PathBuf::from("profiles.ini"),
        ..Settings::default()
    }));
    ctx.reload_profiles(&ctx.default_config_path()).unwrap();

    let console = Arc::new(ConsoleBuffer::new());
    let supervisor = Arc::new(ProcessSupervisor::new(
        OutputFilter::from_settings(&ctx.settings.output),
        console.clone(),
    ));
    let backend = Arc::new(MemoryServices::default());
    let services = Arc::new(
        ServiceController::new(backend.clone(), ctx.placeholders().service_required_files())
            .with_polling(std::time::Duration::from_millis(1), 2),
    );
    let shutdown = Arc::new(ShutdownCoordinator::new(
        ctx.settings.service_name.clone(),
        services.clone(),
        supervisor.clone(),
    ));

    let app = IPCServer::new(ctx, supervisor, services, shutdown, console).router();
    Harness {
        _dir: dir,
        base,
        app,
        backend,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 256).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn names(json: &Value) -> Vec<String> {
    json["profiles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn lists_loaded_profiles() {
    let h = harness();
    let (status, json) = call(&h.app, "GET", "/api/profiles", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&json), vec!["general", "sleepy"]);

    let general = &json["profiles"][0];
    let expected_exe = h.base.join("zapret").join("winws.exe");
    assert_eq!(general["executable"], json!(expected_exe));
}

#[tokio::test]
async fn failed_reload_keeps_previous_profiles() {
    let h = harness();
    std::fs::write(
        h.base.join("broken.ini"),
        "[a]\nexecutable = a.exe\nargs = -1\n[a]\nexecutable = a.exe\nargs = -1\n",
    )
    .unwrap();

    let (status, json) = call(&h.app, "POST", "/api/profiles/reload", Some(json!({ "path": "broken.ini" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "DUPLICATE_SECTION");
    assert_eq!(json["success"], false);

    let (_, json) = call(&h.app, "GET", "/api/profiles", None).await;
    assert_eq!(names(&json), vec!["general", "sleepy"]);
}

#[tokio::test]
async fn unknown_profile_is_404() {
    let h = harness();
    let (status, json) = call(&h.app, "POST", "/api/profile/nope/start", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "PROFILE_NOT_FOUND");
}

#[tokio::test]
async fn missing_engine_binary_is_rejected() {
    let h = harness();
    let (status, json) = call(&h.app, "POST", "/api/profile/general/start", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "EXECUTABLE_NOT_FOUND");

    let (_, status_json) = call(&h.app, "GET", "/api/status", None).await;
    assert_eq!(status_json["processes"][0]["state"]["state"], "idle");
}

#[cfg(unix)]
#[tokio::test]
async fn double_start_conflicts_and_stop_all_cleans_up() {
    let h = harness();
    let (status, json) = call(&h.app, "POST", "/api/profile/sleepy/start", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert!(json["process"]["pid"].as_u64().unwrap() > 0);

    let (status, json) = call(&h.app, "POST", "/api/profile/sleepy/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error_code"], "ALREADY_RUNNING");

    let (_, json) = call(&h.app, "GET", "/api/status", None).await;
    assert_eq!(json["processes"][0]["state"]["state"], "running");
    assert_eq!(json["service"]["state"], "not_installed");

    let (status, json) = call(&h.app, "POST", "/api/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let steps: Vec<&str> = json["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["step"].as_str().unwrap())
        .collect();
    assert_eq!(steps, vec!["stop_service", "terminate_primary", "terminate_auxiliary"]);

    let (_, json) = call(&h.app, "GET", "/api/console", None).await;
    let kinds: Vec<&str> = json["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event"]["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds.first(), Some(&"started"));
    assert_eq!(kinds.last(), Some(&"finished"));
}

#[cfg(unix)]
#[tokio::test]
async fn auxiliary_run_waits_for_exit_code() {
    let h = harness();
    std::fs::write(
        h.base.join("aux.ini"),
        "[exit7]\nexecutable = /bin/sh\nargs = -c;exit 7\n",
    )
    .unwrap();
    let (status, _) = call(&h.app, "POST", "/api/profiles/reload", Some(json!({ "path": "aux.ini" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(
        &h.app,
        "POST",
        "/api/profile/exit7/start",
        Some(json!({ "role": "auxiliary", "capture": false, "wait": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["exit_code"], 7);
}

#[tokio::test]
async fn service_install_reports_every_missing_file() {
    let h = harness();
    let (status, json) = call(&h.app, "POST", "/api/service/install", Some(json!({ "profile": "general" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "SERVICE_FILES_MISSING");
    let message = json["error"].as_str().unwrap();
    for file in ["winws.exe", "russia-blacklist.txt", "quic_initial_www_google_com.bin"] {
        assert!(message.contains(file), "{message}");
    }
    assert!(!h.backend.calls.lock().unwrap().iter().any(|c| c.starts_with("create")));
}

#[tokio::test]
async fn service_install_with_files_present() {
    let h = harness();
    let zapret = h.base.join("zapret");
    let black = h.base.join("black");
    std::fs::create_dir_all(&zapret).unwrap();
    std::fs::create_dir_all(&black).unwrap();
    for file in [
        zapret.join("winws.exe"),
        zapret.join("quic_initial_www_google_com.bin"),
        zapret.join("tls_clienthello_www_google_com.bin"),
        black.join("russia-blacklist.txt"),
    ] {
        touch(&file);
    }

    let (status, json) = call(&h.app, "POST", "/api/service/install", Some(json!({ "profile": "general" }))).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    let calls = h.backend.calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["query zapret", "create zapret", "start zapret"]);
}

#[tokio::test]
async fn convert_command_builds_section() {
    let h = harness();
    let (status, json) = call(
        &h.app,
        "POST",
        "/api/command/convert",
        Some(json!({
            "command": "\"%BIN%winws.exe\" --wf-tcp=443 --hostlist=\"%LISTS%list.txt\"",
            "name": "mine",
            "method": "youtube",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["section"],
        "[mine]\nexecutable = {ZAPRET_FOLDER}/winws.exe\nargs = --wf-tcp=443;\n    --hostlist={BLACKLIST_FILES_1}\n"
    );

    let (status, json) = call(&h.app, "POST", "/api/command/convert", Some(json!({ "command": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_update_source_is_404() {
    let h = harness();
    let (status, json) = call(&h.app, "POST", "/api/updates/nothing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "NOT_FOUND");
}

fn touch(path: &Path) {
    std::fs::write(path, b"").unwrap();
}
