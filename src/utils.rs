//! Shared helpers for spawning child processes.

use std::ffi::OsStr;

use tokio::process::Command;

/// Apply platform-specific flags to hide the console window on Windows.
/// On non-Windows platforms, this is a no-op.
#[cfg(target_os = "windows")]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    cmd
}

/// Command for a console helper tool (`sc`, `taskkill`) that never opens a
/// window and whose output is captured.
pub fn hidden_command<S: AsRef<OsStr>>(program: S) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(std::process::Stdio::null()).kill_on_drop(true);
    apply_creation_flags(&mut cmd);
    cmd
}

/// Quote an argument for a Windows command line when it contains spaces.
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() || arg.contains(' ') || arg.contains('\t') {
        format!("\"{}\"", arg.trim_matches('"'))
    } else {
        arg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_only_when_needed() {
        assert_eq!(quote_arg("--wf-tcp=80,443"), "--wf-tcp=80,443");
        assert_eq!(quote_arg(r"C:\Program Files\zapret\winws.exe"), r#""C:\Program Files\zapret\winws.exe""#);
        assert_eq!(quote_arg(r#""C:\a b""#), r#""C:\a b""#);
        assert_eq!(quote_arg(""), "\"\"");
    }
}
