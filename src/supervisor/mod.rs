pub mod error;
pub mod output;
pub mod process;
pub mod state_machine;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};

use crate::config::LaunchProfile;
use crate::utils;

pub use error::ProcessError;
pub use output::{ConsoleBuffer, LineClass, OutputFilter, ProcessEvent, ProcessObserver};
pub use process::{GracefulStop, OsTerminate};
pub use state_machine::ProcessState;
use state_machine::StateMachine;

/// How long a graceful stop, and then a forced kill, may take.
pub const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);
/// After the child exits, how long to keep reading pipes that a grandchild
/// may still hold open.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Independent slot a supervised process occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The long-running bypass engine.
    Primary,
    /// Secondary helper tools.
    Auxiliary,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Primary, Role::Auxiliary];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => write!(f, "primary"),
            Role::Auxiliary => write!(f, "auxiliary"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessHandle {
    pub role: Role,
    pub pid: u32,
    pub command_line: Vec<String>,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum TerminateOutcome {
    NotRunning,
    Graceful,
    Killed,
    Failed(String),
}

impl TerminateOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self, TerminateOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleStatus {
    pub role: Role,
    pub state: ProcessState,
    pub process: Option<ProcessHandle>,
}

#[derive(Default)]
struct Slot {
    machine: StateMachine,
    handle: Option<ProcessHandle>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited_rx: Option<watch::Receiver<bool>>,
}

type Slots = Arc<Mutex<HashMap<Role, Slot>>>;

fn lock_slots(slots: &Mutex<HashMap<Role, Slot>>) -> MutexGuard<'_, HashMap<Role, Slot>> {
    match slots.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!("Supervisor slot lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Starts, observes and stops at most one child per [`Role`].
///
/// Output of captured children is read by a worker task per child, filtered
/// by [`OutputFilter`] and delivered to the observer. `Finished` is always the
/// last event of a process and is sent after the slot reads `Exited`.
pub struct ProcessSupervisor {
    slots: Slots,
    filter: Arc<OutputFilter>,
    observer: Arc<dyn ProcessObserver>,
    terminate_timeout: Duration,
    graceful: Arc<dyn process::GracefulStop>,
    orphan_process: Option<String>,
}

impl ProcessSupervisor {
    pub fn new(filter: OutputFilter, observer: Arc<dyn ProcessObserver>) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            filter: Arc::new(filter),
            observer,
            terminate_timeout: TERMINATE_TIMEOUT,
            graceful: Arc::new(process::OsTerminate),
            orphan_process: None,
        }
    }

    pub fn with_terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    pub fn with_graceful_stop(mut self, graceful: Arc<dyn process::GracefulStop>) -> Self {
        self.graceful = graceful;
        self
    }

    /// Kill stray processes with this image name before the primary role
    /// starts.
    pub fn with_orphan_sweep(mut self, image_name: Option<String>) -> Self {
        self.orphan_process = image_name.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn state(&self, role: Role) -> ProcessState {
        lock_slots(&self.slots)
            .get(&role)
            .map(|slot| slot.machine.state)
            .unwrap_or(ProcessState::Idle)
    }

    pub fn handle(&self, role: Role) -> Option<ProcessHandle> {
        lock_slots(&self.slots)
            .get(&role)
            .and_then(|slot| slot.handle.clone())
    }

    pub fn is_running(&self, role: Role) -> bool {
        self.state(role).is_alive()
    }

    pub fn status(&self) -> Vec<RoleStatus> {
        let slots = lock_slots(&self.slots);
        Role::ALL
            .iter()
            .map(|role| {
                let slot = slots.get(role);
                RoleStatus {
                    role: *role,
                    state: slot.map(|s| s.machine.state).unwrap_or(ProcessState::Idle),
                    process: slot.and_then(|s| s.handle.clone()),
                }
            })
            .collect()
    }

    /// Clear an `Exited` slot back to `Idle`. Other states are left alone.
    pub fn acknowledge(&self, role: Role) {
        let mut slots = lock_slots(&self.slots);
        if let Some(slot) = slots.get_mut(&role) {
            if matches!(slot.machine.state, ProcessState::Exited(_))
                && slot.machine.transition(ProcessState::Idle).is_ok()
            {
                slot.handle = None;
                slot.exited_rx = None;
            }
        }
    }

    /// Spawn `profile` in `role`. With `capture` the child's stdout and
    /// stderr are read and filtered; without it they are discarded.
    pub async fn start(
        &self,
        role: Role,
        profile: &LaunchProfile,
        capture: bool,
    ) -> Result<ProcessHandle, ProcessError> {
        if !self.state(role).accepts_start() {
            return Err(ProcessError::AlreadyRunning(role));
        }
        check_executable(&profile.executable)?;

        if role == Role::Primary {
            if let Some(image) = &self.orphan_process {
                let swept = crate::process_monitor::kill_by_name_async(image, &self.live_pids()).await;
                if !swept.is_empty() {
                    tracing::info!("Swept {} stray {} process(es)", swept.len(), image);
                }
            }
        }

        let (handle, child, kill_rx, exited_tx) = {
            let mut slots = lock_slots(&self.slots);
            let slot = slots.entry(role).or_default();
            // re-check: another start may have won the race while sweeping
            if !slot.machine.state.accepts_start() {
                return Err(ProcessError::AlreadyRunning(role));
            }
            slot.machine.transition(ProcessState::Starting)?;

            let mut child = match spawn_child(profile, capture) {
                Ok(child) => child,
                Err(e) => {
                    slot.machine.transition(ProcessState::Idle)?;
                    slot.handle = None;
                    return Err(e);
                }
            };

            let handle = ProcessHandle {
                role,
                pid: child.id().unwrap_or_default(),
                command_line: profile.command_line(),
                display_name: profile.name.clone(),
            };
            let (kill_tx, kill_rx) = oneshot::channel();
            let (exited_tx, exited_rx) = watch::channel(false);

            if let Err(e) = slot.machine.transition(ProcessState::Running) {
                let _ = child.start_kill();
                return Err(e.into());
            }
            slot.handle = Some(handle.clone());
            slot.kill_tx = Some(kill_tx);
            slot.exited_rx = Some(exited_rx);
            (handle, child, kill_rx, exited_tx)
        };

        self.observer.notify(ProcessEvent::Started {
            role,
            display_name: handle.display_name.clone(),
            pid: handle.pid,
        });

        let worker = OutputWorker {
            role,
            display_name: handle.display_name.clone(),
            filter: self.filter.clone(),
            observer: self.observer.clone(),
            slots: self.slots.clone(),
            exited_tx,
        };
        tokio::spawn(worker.run(child, kill_rx));

        Ok(handle)
    }

    /// Start without capture and wait for the process to exit. Returns its
    /// exit code. The slot is left `Idle`.
    pub async fn run_to_completion(
        &self,
        role: Role,
        profile: &LaunchProfile,
    ) -> Result<Option<i32>, ProcessError> {
        self.start(role, profile, false).await?;
        let exited_rx = lock_slots(&self.slots)
            .get(&role)
            .and_then(|slot| slot.exited_rx.clone());
        if let Some(mut rx) = exited_rx {
            exited(&mut rx).await;
        }
        let code = match self.state(role) {
            ProcessState::Exited(code) => code,
            _ => None,
        };
        self.acknowledge(role);
        Ok(code)
    }

    /// Stop the process in `role`: graceful request first, forced kill after
    /// the timeout. Never returns an error; failures are reported through the
    /// outcome and a `Warning` event.
    pub async fn terminate(&self, role: Role) -> TerminateOutcome {
        let (pid, exited_rx, kill_tx) = {
            let mut slots = lock_slots(&self.slots);
            let Some(slot) = slots.get_mut(&role) else {
                return TerminateOutcome::NotRunning;
            };
            match slot.machine.state {
                ProcessState::Running => {
                    if let Err(e) = slot.machine.transition(ProcessState::Terminating) {
                        tracing::warn!("[{}] {}", role, e);
                    }
                }
                ProcessState::Terminating => {}
                _ => return TerminateOutcome::NotRunning,
            }
            let Some(rx) = slot.exited_rx.clone() else {
                return TerminateOutcome::NotRunning;
            };
            let pid = slot.handle.as_ref().map(|h| h.pid).unwrap_or_default();
            (pid, rx, slot.kill_tx.take())
        };
        let mut exited_rx = exited_rx;

        tracing::info!("[{}] Stopping PID {}", role, pid);
        match self.graceful.request_stop(pid).await {
            Ok(()) => {
                if wait_for_exit(&mut exited_rx, self.terminate_timeout).await {
                    return TerminateOutcome::Graceful;
                }
                tracing::warn!("[{}] PID {} still alive after {:?}, killing", role, pid, self.terminate_timeout);
            }
            Err(e) => {
                let already_exited = *exited_rx.borrow();
                if already_exited {
                    return TerminateOutcome::Graceful;
                }
                tracing::info!("[{}] Graceful stop of PID {} not delivered ({}), killing", role, pid, e);
            }
        }

        if let Some(tx) = kill_tx {
            // a closed receiver means the worker already saw the exit
            let _ = tx.send(());
        }
        if wait_for_exit(&mut exited_rx, self.terminate_timeout).await {
            return TerminateOutcome::Killed;
        }

        let message = format!("PID {} did not exit after a forced kill", pid);
        self.warn(role, message.clone());
        TerminateOutcome::Failed(message)
    }

    fn warn(&self, role: Role, message: String) {
        self.observer.notify(ProcessEvent::Warning { role, message });
    }

    fn live_pids(&self) -> Vec<u32> {
        lock_slots(&self.slots)
            .values()
            .filter(|slot| slot.machine.state.is_alive())
            .filter_map(|slot| slot.handle.as_ref().map(|h| h.pid))
            .collect()
    }
}

fn check_executable(path: &Path) -> Result<(), ProcessError> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta,
        _ => return Err(ProcessError::ExecutableNotFound(path.to_path_buf())),
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(ProcessError::PermissionDenied(path.to_path_buf()));
        }
    }
    #[cfg(not(unix))]
    let _ = meta;
    Ok(())
}

fn spawn_child(profile: &LaunchProfile, capture: bool) -> Result<Child, ProcessError> {
    let mut cmd = Command::new(&profile.executable);
    cmd.args(&profile.args).stdin(Stdio::null());
    if let Some(dir) = profile.executable.parent().filter(|d| !d.as_os_str().is_empty()) {
        cmd.current_dir(dir);
    }
    if capture {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }
    utils::apply_creation_flags(&mut cmd);

    tracing::info!("Spawning: {}", profile.command_line().join(" "));
    cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ProcessError::ExecutableNotFound(profile.executable.clone()),
        std::io::ErrorKind::PermissionDenied => ProcessError::PermissionDenied(profile.executable.clone()),
        _ => ProcessError::Spawn {
            path: profile.executable.clone(),
            source: e,
        },
    })
}

async fn exited(rx: &mut watch::Receiver<bool>) {
    loop {
        let done = *rx.borrow();
        if done || rx.changed().await.is_err() {
            return;
        }
    }
}

async fn wait_for_exit(rx: &mut watch::Receiver<bool>, limit: Duration) -> bool {
    if tokio::time::timeout(limit, exited(rx)).await.is_err() {
        return false;
    }
    let done = *rx.borrow();
    done
}

// ─── Output worker ───────────────────────────────────────────

/// Line reader that keeps partial lines across cancelled reads and decodes
/// lossily, so non-UTF-8 console output never stalls the pipe.
struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> Option<String> {
        match self.inner.read_until(b'\n', &mut self.buf).await {
            Ok(0) if self.buf.is_empty() => None,
            Ok(_) => {
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                self.buf.clear();
                Some(line)
            }
            Err(e) => {
                tracing::debug!("Output pipe read failed: {}", e);
                None
            }
        }
    }
}

/// Next line of an optional stream; pending forever once the stream is gone.
async fn next_from<R: AsyncRead + Unpin>(reader: &mut Option<LineReader<R>>) -> Option<String> {
    match reader.as_mut() {
        Some(r) => r.next_line().await,
        None => std::future::pending().await,
    }
}

async fn kill_requested(rx: &mut Option<oneshot::Receiver<()>>) {
    match rx.as_mut() {
        Some(r) => {
            if r.await.is_err() {
                // sender dropped without a request
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}

struct OutputWorker {
    role: Role,
    display_name: String,
    filter: Arc<OutputFilter>,
    observer: Arc<dyn ProcessObserver>,
    slots: Slots,
    exited_tx: watch::Sender<bool>,
}

impl OutputWorker {
    async fn run(self, mut child: Child, kill_rx: oneshot::Receiver<()>) {
        let mut stdout = child.stdout.take().map(LineReader::new);
        let mut stderr = child.stderr.take().map(LineReader::new);
        let mut kill_rx = Some(kill_rx);

        // kill and exit are polled ahead of output; lines still buffered at
        // exit are read by the drain loop below
        let status: std::io::Result<ExitStatus> = loop {
            tokio::select! {
                biased;
                _ = kill_requested(&mut kill_rx) => {
                    kill_rx = None;
                    if let Err(e) = child.start_kill() {
                        tracing::warn!("[{}] Kill failed: {}", self.role, e);
                    }
                }
                status = child.wait() => break status,
                line = next_from(&mut stdout) => match line {
                    Some(line) => self.deliver(&line),
                    None => stdout = None,
                },
                line = next_from(&mut stderr) => match line {
                    Some(line) => self.deliver(&line),
                    None => stderr = None,
                },
            }
        };

        let grace = tokio::time::sleep(OUTPUT_DRAIN_GRACE);
        tokio::pin!(grace);
        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                biased;
                line = next_from(&mut stdout) => match line {
                    Some(line) => self.deliver(&line),
                    None => stdout = None,
                },
                line = next_from(&mut stderr) => match line {
                    Some(line) => self.deliver(&line),
                    None => stderr = None,
                },
                _ = &mut grace => {
                    tracing::debug!("[{}] Output still open after exit, detaching", self.role);
                    break;
                }
            }
        }

        let exit_code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::warn!("[{}] Failed to collect exit status: {}", self.role, e);
                None
            }
        };
        {
            let mut slots = lock_slots(&self.slots);
            if let Some(slot) = slots.get_mut(&self.role) {
                if let Err(e) = slot.machine.transition(ProcessState::Exited(exit_code)) {
                    tracing::warn!("[{}] {}", self.role, e);
                }
                slot.kill_tx = None;
            }
        }
        // observers of Finished already see the slot as Exited
        self.observer.notify(ProcessEvent::Finished {
            role: self.role,
            display_name: self.display_name.clone(),
            exit_code,
        });
        let _ = self.exited_tx.send(true);
    }

    fn deliver(&self, raw: &str) {
        match self.filter.classify(raw) {
            LineClass::Suppressed => {}
            LineClass::Ready => self.observer.notify(ProcessEvent::Ready {
                role: self.role,
                message: self.filter.ready_message().to_string(),
            }),
            LineClass::Pass(line) => self.observer.notify(ProcessEvent::Output {
                role: self.role,
                line,
            }),
        }
    }
}
