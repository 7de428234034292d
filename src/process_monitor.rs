use sysinfo::System;

/// Kill every process named `name` except the PIDs in `keep`.
/// Returns the PIDs that were signalled.
pub fn kill_by_name(name: &str, keep: &[u32]) -> Vec<u32> {
    let mut sys = System::new();
    sys.refresh_processes();

    let mut killed = Vec::new();
    for (pid, process) in sys.processes() {
        if !process.name().eq_ignore_ascii_case(name) || keep.contains(&pid.as_u32()) {
            continue;
        }
        if process.kill() {
            tracing::info!("Killed stray {} (PID {})", name, pid);
            killed.push(pid.as_u32());
        } else {
            tracing::warn!("Failed to kill stray {} (PID {})", name, pid);
        }
    }
    killed
}

// ── Async wrappers ─────────────────────────────────────────
// sysinfo scans the whole process table synchronously; keep it off the
// runtime worker threads.

pub async fn kill_by_name_async(name: &str, keep: &[u32]) -> Vec<u32> {
    let name = name.to_string();
    let keep = keep.to_vec();
    tokio::task::spawn_blocking(move || kill_by_name(&name, &keep))
        .await
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_name_kills_nothing() {
        assert!(kill_by_name_async("no-such-process-name-4711.exe", &[]).await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stray_process_is_killed_and_kept_pid_survives() {
        // a uniquely named copy of sleep so nothing else on the host matches
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("dpisweep4711");
        std::fs::copy("/bin/sleep", &image).unwrap();

        let mut stray = tokio::process::Command::new(&image).arg("30").spawn().unwrap();
        let mut kept = tokio::process::Command::new(&image).arg("30").spawn().unwrap();
        let stray_pid = stray.id().unwrap();
        let kept_pid = kept.id().unwrap();

        let killed = kill_by_name_async("dpisweep4711", &[kept_pid]).await;
        assert!(killed.contains(&stray_pid));
        assert!(!killed.contains(&kept_pid));

        let status = tokio::time::timeout(std::time::Duration::from_secs(5), stray.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(!status.success());
        assert!(kept.try_wait().unwrap().is_none());
        kept.kill().await.unwrap();
    }
}
