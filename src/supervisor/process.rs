//! OS-level signalling of supervised children.

use anyhow::Result;
use async_trait::async_trait;

/// The graceful half of a stop. An error means the request could not be
/// delivered, and the supervisor moves straight to a forced kill.
#[async_trait]
pub trait GracefulStop: Send + Sync {
    async fn request_stop(&self, pid: u32) -> Result<()>;
}

/// [`request_terminate`] as a [`GracefulStop`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OsTerminate;

#[async_trait]
impl GracefulStop for OsTerminate {
    async fn request_stop(&self, pid: u32) -> Result<()> {
        request_terminate(pid).await
    }
}

/// Ask a process to exit. Windows: `taskkill /PID <pid> /T` without `/F`,
/// which posts a close request to the process tree. Unix: SIGTERM.
#[cfg(target_os = "windows")]
pub async fn request_terminate(pid: u32) -> Result<()> {
    let output = crate::utils::hidden_command("taskkill")
        .args(["/PID", &pid.to_string(), "/T"])
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run taskkill for PID {}: {}", pid, e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("taskkill /PID {} failed: {}", pid, stderr.trim());
    }
    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub async fn request_terminate(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| anyhow::anyhow!("PID {} out of range", pid))?;
    kill(Pid::from_raw(raw), Signal::SIGTERM)
        .map_err(|e| anyhow::anyhow!("SIGTERM to PID {} failed: {}", pid, e))
}
