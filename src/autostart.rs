//! Launch at logon through a value under the current user's `Run` key.
//! The value being present is what "enabled" means.

use std::path::Path;

pub const STARTUP_FLAG: &str = "--autostart";
#[cfg_attr(not(windows), allow(dead_code))]
const RUN_KEY_PATH: &str = "Software\\Microsoft\\Windows\\CurrentVersion\\Run";

#[derive(thiserror::Error, Debug)]
pub enum AutostartError {
    #[error("autostart is only available on Windows")]
    Unsupported,

    #[error("failed to resolve executable: {0}")]
    Executable(std::io::Error),

    #[error("startup registry access failed: {0}")]
    Registry(std::io::Error),
}

impl AutostartError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unsupported => "AUTOSTART_UNSUPPORTED",
            Self::Executable(_) => "AUTOSTART_EXECUTABLE",
            Self::Registry(_) => "AUTOSTART_REGISTRY",
        }
    }
}

/// Registry data for `exe_path`: quoted path plus the startup flag.
pub fn startup_command_for_exe(exe_path: &Path) -> String {
    format!("\"{}\" {}", exe_path.display(), STARTUP_FLAG)
}

pub fn launched_from_startup_flag() -> bool {
    std::env::args().any(|arg| arg == STARTUP_FLAG)
}

#[derive(Debug, Clone)]
pub struct Autostart {
    value_name: String,
}

impl Autostart {
    pub fn new(value_name: impl Into<String>) -> Self {
        Self {
            value_name: value_name.into(),
        }
    }

    pub fn value_name(&self) -> &str {
        &self.value_name
    }
}

#[cfg(windows)]
impl Autostart {
    fn run_key(&self) -> Result<winreg::RegKey, AutostartError> {
        use winreg::enums::HKEY_CURRENT_USER;
        use winreg::RegKey;

        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let (run_key, _) = hkcu
            .create_subkey(RUN_KEY_PATH)
            .map_err(AutostartError::Registry)?;
        Ok(run_key)
    }

    pub fn is_enabled(&self) -> bool {
        match self.run_key() {
            Ok(key) => key.get_value::<String, _>(&self.value_name).is_ok(),
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    pub fn enable(&self) -> Result<(), AutostartError> {
        let exe_path = std::env::current_exe().map_err(AutostartError::Executable)?;
        let command = startup_command_for_exe(&exe_path);
        self.run_key()?
            .set_value(&self.value_name, &command)
            .map_err(AutostartError::Registry)?;
        tracing::info!("Autostart enabled: {}", command);
        Ok(())
    }

    /// Removing an absent value is success.
    pub fn disable(&self) -> Result<(), AutostartError> {
        match self.run_key()?.delete_value(&self.value_name) {
            Ok(()) => {
                tracing::info!("Autostart disabled");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AutostartError::Registry(e)),
        }
    }
}

#[cfg(not(windows))]
impl Autostart {
    pub fn is_enabled(&self) -> bool {
        false
    }

    pub fn enable(&self) -> Result<(), AutostartError> {
        Err(AutostartError::Unsupported)
    }

    pub fn disable(&self) -> Result<(), AutostartError> {
        Err(AutostartError::Unsupported)
    }
}
