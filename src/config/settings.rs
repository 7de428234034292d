use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const DEFAULT_SETTINGS_PATH: &str = "config/settings.toml";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:57480";

/// Daemon settings (`config/settings.toml`).
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Settings {
    /// Root of the bundled folder layout. Defaults to the executable's folder.
    pub base_folder: Option<PathBuf>,
    /// Profile INI, relative to the base folder unless absolute.
    pub config_file: PathBuf,
    pub listen_addr: String,
    pub service_name: String,
    pub service_description: String,
    pub autostart_value: String,
    /// Image name of stray instances swept before the primary role starts.
    pub orphan_process: Option<String>,
    pub output: OutputSettings,
    pub updates: Vec<UpdateSource>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OutputSettings {
    /// Case-insensitive substrings of child output lines that are dropped.
    pub noise: Vec<String>,
    pub ready_marker: String,
    pub ready_message: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UpdateSource {
    pub name: String,
    pub url: String,
    /// File, or folder when `extract` is set. Relative to the base folder.
    pub destination: PathBuf,
    #[serde(default)]
    pub extract: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_folder: None,
            config_file: PathBuf::from("config").join("default.ini"),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            service_name: "zapret".to_string(),
            service_description: "zapret DPI bypass (winws)".to_string(),
            autostart_value: "DpiCore".to_string(),
            orphan_process: Some(super::placeholders::ZAPRET_BINARY.to_string()),
            output: OutputSettings::default(),
            updates: Vec::new(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            noise: vec![
                "loading hostlist".to_string(),
                "loaded".to_string(),
                "desync profile(s)".to_string(),
            ],
            ready_marker: "capture is started".to_string(),
            ready_message: "Bypass is active".to_string(),
        }
    }
}

impl Settings {
    /// Missing file means defaults; a file that exists but does not parse is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("Settings file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&s)
            .map_err(|e| anyhow::anyhow!("Invalid settings file {}: {}", path.display(), e))?;
        Ok(settings)
    }

    /// Base folder: configured value, else the running executable's folder,
    /// else the current directory.
    pub fn resolve_base_folder(&self) -> PathBuf {
        if let Some(base) = &self.base_folder {
            return base.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn update_source(&self, name: &str) -> Option<&UpdateSource> {
        self.updates.iter().find(|u| u.name == name)
    }
}
