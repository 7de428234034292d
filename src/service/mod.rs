//! Control of the one OS service that runs the bypass engine unattended.
//!
//! Operations go through a [`ServiceBackend`]; [`ScBackend`] drives the
//! Windows service manager with `sc.exe`.

pub mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::LaunchProfile;
use crate::utils::{self, quote_arg};

pub use error::ServiceError;

pub const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const STOP_POLL_ATTEMPTS: u32 = 15;

/// `ERROR_SERVICE_DOES_NOT_EXIST`
const SERVICE_DOES_NOT_EXIST: i32 = 1060;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    NotInstalled,
    Stopped,
    Running,
    Unknown,
}

#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// `Ok(NotInstalled)` only for the "does not exist" answer; other
    /// failures are errors.
    async fn query(&self, name: &str) -> Result<ServiceState, ServiceError>;
    async fn request_stop(&self, name: &str) -> Result<(), ServiceError>;
    async fn start(&self, name: &str) -> Result<(), ServiceError>;
    async fn create(&self, name: &str, bin_path: &str, description: &str) -> Result<(), ServiceError>;
    async fn delete(&self, name: &str) -> Result<(), ServiceError>;
}

// ─── sc.exe backend ──────────────────────────────────────────

struct ScOutput {
    code: Option<i32>,
    text: String,
}

impl ScOutput {
    fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ScBackend;

impl ScBackend {
    async fn sc(&self, args: &[&str]) -> Result<ScOutput, ServiceError> {
        tracing::debug!("sc {}", args.join(" "));
        let output = utils::hidden_command("sc").args(args).output().await?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            text.push('\n');
            text.push_str(stderr.trim());
        }
        Ok(ScOutput {
            code: output.status.code(),
            text,
        })
    }
}

#[async_trait]
impl ServiceBackend for ScBackend {
    async fn query(&self, name: &str) -> Result<ServiceState, ServiceError> {
        let out = self.sc(&["query", name]).await?;
        match parse_query_output(out.code, &out.text) {
            Some(state) => Ok(state),
            None => Err(ServiceError::Query {
                name: name.to_string(),
                message: summarize(&out.text),
            }),
        }
    }

    async fn request_stop(&self, name: &str) -> Result<(), ServiceError> {
        let out = self.sc(&["stop", name]).await?;
        if out.success() {
            Ok(())
        } else {
            Err(ServiceError::Control {
                name: name.to_string(),
                action: "stop",
                message: summarize(&out.text),
            })
        }
    }

    async fn start(&self, name: &str) -> Result<(), ServiceError> {
        let out = self.sc(&["start", name]).await?;
        if out.success() {
            Ok(())
        } else {
            Err(ServiceError::Control {
                name: name.to_string(),
                action: "start",
                message: summarize(&out.text),
            })
        }
    }

    async fn create(&self, name: &str, bin_path: &str, description: &str) -> Result<(), ServiceError> {
        let out = self
            .sc(&["create", name, "binPath=", bin_path, "DisplayName=", name, "start=", "auto"])
            .await?;
        if !out.success() {
            return Err(ServiceError::Create {
                name: name.to_string(),
                message: summarize(&out.text),
            });
        }
        if !description.is_empty() {
            let desc = self.sc(&["description", name, description]).await?;
            if !desc.success() {
                tracing::warn!("Service '{}' created but description not set: {}", name, summarize(&desc.text));
            }
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ServiceError> {
        let out = self.sc(&["delete", name]).await?;
        if out.success() {
            Ok(())
        } else {
            Err(ServiceError::Delete {
                name: name.to_string(),
                message: summarize(&out.text),
            })
        }
    }
}

/// Interpret `sc query` output. `None` for failures other than "does not
/// exist".
pub fn parse_query_output(code: Option<i32>, text: &str) -> Option<ServiceState> {
    if code == Some(SERVICE_DOES_NOT_EXIST) || text.contains(&format!("FAILED {}", SERVICE_DOES_NOT_EXIST)) {
        return Some(ServiceState::NotInstalled);
    }
    if code != Some(0) {
        return None;
    }
    let state_line = text
        .lines()
        .map(str::trim)
        .find(|l| l.to_uppercase().starts_with("STATE"));
    let state = match state_line {
        Some(line) => {
            let upper = line.to_uppercase();
            if upper.contains("RUNNING") {
                ServiceState::Running
            } else if upper.contains("STOPPED") {
                ServiceState::Stopped
            } else {
                ServiceState::Unknown
            }
        }
        None => ServiceState::Unknown,
    };
    Some(state)
}

fn summarize(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        "no output".to_string()
    } else {
        lines.join(" ")
    }
}

// ─── Controller ──────────────────────────────────────────────

pub struct ServiceController {
    backend: Arc<dyn ServiceBackend>,
    required_files: Vec<PathBuf>,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl ServiceController {
    /// `required_files` must all exist before a service is created.
    pub fn new(backend: Arc<dyn ServiceBackend>, required_files: Vec<PathBuf>) -> Self {
        Self {
            backend,
            required_files,
            poll_interval: STOP_POLL_INTERVAL,
            poll_attempts: STOP_POLL_ATTEMPTS,
        }
    }

    pub fn with_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts.max(1);
        self
    }

    pub fn required_files(&self) -> &[PathBuf] {
        &self.required_files
    }

    pub async fn status(&self, name: &str) -> ServiceState {
        match self.backend.query(name).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("{}", e);
                ServiceState::Unknown
            }
        }
    }

    /// Stop `name` and wait until it reports stopped. Already stopped or not
    /// installed is success.
    pub async fn stop(&self, name: &str) -> Result<(), ServiceError> {
        match self.status(name).await {
            ServiceState::Stopped | ServiceState::NotInstalled => {
                tracing::debug!("Service '{}' is not running", name);
                return Ok(());
            }
            ServiceState::Running | ServiceState::Unknown => {}
        }

        tracing::info!("Stopping service '{}'", name);
        self.backend.request_stop(name).await?;

        for _ in 0..self.poll_attempts {
            tokio::time::sleep(self.poll_interval).await;
            if matches!(
                self.status(name).await,
                ServiceState::Stopped | ServiceState::NotInstalled
            ) {
                tracing::info!("Service '{}' stopped", name);
                return Ok(());
            }
        }

        let err = ServiceError::StopTimeout {
            name: name.to_string(),
            attempts: self.poll_attempts,
        };
        tracing::warn!("{}", err);
        Err(err)
    }

    /// Create `name` running `bin_path_with_args`. Every required file is
    /// checked first and all missing ones are reported together.
    pub async fn create(
        &self,
        name: &str,
        bin_path_with_args: &str,
        description: &str,
    ) -> Result<(), ServiceError> {
        let missing: Vec<PathBuf> = self
            .required_files
            .iter()
            .filter(|p| !p.exists())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::MissingFiles { missing });
        }
        tracing::info!("Creating service '{}': {}", name, bin_path_with_args);
        self.backend.create(name, bin_path_with_args, description).await
    }

    /// Delete `name`. Always asks the service manager; there is no
    /// not-installed shortcut.
    pub async fn delete(&self, name: &str) -> Result<(), ServiceError> {
        tracing::info!("Deleting service '{}'", name);
        self.backend.delete(name).await
    }

    /// Create and start a service running `profile`. An existing service of
    /// the same name is stopped and replaced.
    pub async fn install(
        &self,
        name: &str,
        profile: &LaunchProfile,
        description: &str,
    ) -> Result<(), ServiceError> {
        if self.status(name).await != ServiceState::NotInstalled {
            self.uninstall(name).await?;
        }
        self.create(name, &service_command_line(&profile.executable, &profile.args), description)
            .await?;
        self.backend.start(name).await
    }

    /// Stop (best effort) and delete.
    pub async fn uninstall(&self, name: &str) -> Result<(), ServiceError> {
        if let Err(e) = self.stop(name).await {
            tracing::warn!("Continuing with delete: {}", e);
        }
        self.delete(name).await
    }
}

/// `binPath` value: quoted executable followed by its arguments.
pub fn service_command_line(executable: &Path, args: &[String]) -> String {
    let mut parts = vec![format!("\"{}\"", executable.display())];
    parts.extend(args.iter().map(|a| quote_arg(a)));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBackend {
        states: Mutex<VecDeque<ServiceState>>,
        calls: Mutex<Vec<String>>,
        fail_delete: bool,
    }

    impl FakeBackend {
        fn with_states(states: &[ServiceState]) -> Self {
            Self {
                states: Mutex::new(states.iter().copied().collect()),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ServiceBackend for FakeBackend {
        async fn query(&self, name: &str) -> Result<ServiceState, ServiceError> {
            self.record(format!("query {}", name));
            let mut states = self.states.lock().unwrap();
            // last scripted state repeats
            let state = if states.len() > 1 { states.pop_front() } else { states.front().copied() };
            Ok(state.unwrap_or(ServiceState::NotInstalled))
        }

        async fn request_stop(&self, name: &str) -> Result<(), ServiceError> {
            self.record(format!("stop {}", name));
            Ok(())
        }

        async fn start(&self, name: &str) -> Result<(), ServiceError> {
            self.record(format!("start {}", name));
            Ok(())
        }

        async fn create(&self, name: &str, bin_path: &str, _description: &str) -> Result<(), ServiceError> {
            self.record(format!("create {} {}", name, bin_path));
            Ok(())
        }

        async fn delete(&self, name: &str) -> Result<(), ServiceError> {
            self.record(format!("delete {}", name));
            if self.fail_delete {
                return Err(ServiceError::Delete {
                    name: name.to_string(),
                    message: "[SC] DeleteService FAILED 1060".to_string(),
                });
            }
            Ok(())
        }
    }

    fn controller(backend: Arc<FakeBackend>, required: Vec<PathBuf>) -> ServiceController {
        ServiceController::new(backend, required).with_polling(Duration::from_millis(1), 3)
    }

    const RUNNING: &str = "SERVICE_NAME: zapret\n        TYPE               : 10  WIN32_OWN_PROCESS\n        STATE              : 4  RUNNING\n                                (STOPPABLE, NOT_PAUSABLE, IGNORES_SHUTDOWN)\n        WIN32_EXIT_CODE    : 0  (0x0)\n";
    const STOPPED: &str = "SERVICE_NAME: zapret\n        TYPE               : 10  WIN32_OWN_PROCESS\n        STATE              : 1  STOPPED\n";

    #[test]
    fn parses_sc_query() {
        assert_eq!(parse_query_output(Some(0), RUNNING), Some(ServiceState::Running));
        assert_eq!(parse_query_output(Some(0), STOPPED), Some(ServiceState::Stopped));
        assert_eq!(
            parse_query_output(Some(1060), "[SC] EnumQueryServicesStatus:OpenService FAILED 1060:"),
            Some(ServiceState::NotInstalled)
        );
        assert_eq!(
            parse_query_output(Some(0), "SERVICE_NAME: zapret\n STATE : 3  STOP_PENDING\n"),
            Some(ServiceState::Unknown)
        );
        assert_eq!(parse_query_output(Some(5), "[SC] OpenSCManager FAILED 5:\n\nAccess is denied."), None);
    }

    #[tokio::test]
    async fn stop_is_noop_when_stopped_or_missing() {
        for state in [ServiceState::Stopped, ServiceState::NotInstalled] {
            let backend = Arc::new(FakeBackend::with_states(&[state]));
            controller(backend.clone(), vec![]).stop("zapret").await.unwrap();
            assert_eq!(backend.calls(), vec!["query zapret"]);
        }
    }

    #[tokio::test]
    async fn stop_polls_until_stopped() {
        let backend = Arc::new(FakeBackend::with_states(&[
            ServiceState::Running,
            ServiceState::Running,
            ServiceState::Stopped,
        ]));
        controller(backend.clone(), vec![]).stop("zapret").await.unwrap();
        let calls = backend.calls();
        assert!(calls.contains(&"stop zapret".to_string()));
        assert_eq!(calls.iter().filter(|c| c.starts_with("query")).count(), 3);
    }

    #[tokio::test]
    async fn stop_times_out_after_polling_budget() {
        let backend = Arc::new(FakeBackend::with_states(&[ServiceState::Running]));
        let err = controller(backend.clone(), vec![]).stop("zapret").await.unwrap_err();
        assert!(matches!(err, ServiceError::StopTimeout { attempts: 3, .. }));
        assert_eq!(err.error_code(), "SERVICE_STOP_TIMEOUT");
        // initial query + 3 polls
        assert_eq!(backend.calls().iter().filter(|c| c.starts_with("query")).count(), 4);
    }

    #[tokio::test]
    async fn uninstall_deletes_even_when_stop_times_out() {
        let backend = Arc::new(FakeBackend::with_states(&[ServiceState::Running]));
        controller(backend.clone(), vec![]).uninstall("zapret").await.unwrap();
        let calls = backend.calls();
        assert!(calls.contains(&"stop zapret".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("delete zapret"));
    }

    #[tokio::test]
    async fn create_lists_every_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("winws.exe");
        std::fs::write(&present, b"").unwrap();
        let missing_a = dir.path().join("russia-blacklist.txt");
        let missing_b = dir.path().join("quic_initial_www_google_com.bin");

        let backend = Arc::new(FakeBackend::default());
        let ctl = controller(backend.clone(), vec![present, missing_a.clone(), missing_b.clone()]);
        let err = ctl.create("zapret", "\"winws.exe\"", "").await.unwrap_err();

        match &err {
            ServiceError::MissingFiles { missing } => assert_eq!(missing, &vec![missing_a.clone(), missing_b.clone()]),
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("russia-blacklist.txt"));
        assert!(message.contains("quic_initial_www_google_com.bin"));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_is_attempted_unconditionally() {
        let backend = Arc::new(FakeBackend {
            fail_delete: true,
            ..FakeBackend::default()
        });
        let err = controller(backend.clone(), vec![]).delete("zapret").await.unwrap_err();
        assert!(matches!(err, ServiceError::Delete { .. }));
        assert_eq!(backend.calls(), vec!["delete zapret"]);
    }

    #[tokio::test]
    async fn install_creates_then_starts() {
        let backend = Arc::new(FakeBackend::with_states(&[ServiceState::NotInstalled]));
        let profile = LaunchProfile::new(
            "general",
            PathBuf::from("C:/dpi/zapret/winws.exe"),
            vec!["--wf-tcp=80,443".to_string(), "--hostlist=C:/dpi/black list/a.txt".to_string()],
        );
        controller(backend.clone(), vec![])
            .install("zapret", &profile, "desc")
            .await
            .unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                "query zapret".to_string(),
                "create zapret \"C:/dpi/zapret/winws.exe\" --wf-tcp=80,443 \"--hostlist=C:/dpi/black list/a.txt\"".to_string(),
                "start zapret".to_string(),
            ]
        );
    }
}
