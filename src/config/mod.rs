pub mod error;
pub mod ini;
pub mod placeholders;
pub mod settings;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub use error::ConfigError;
pub use placeholders::PlaceholderTable;
pub use settings::Settings;
pub use store::{ConfigStore, LaunchProfile, ProfileSet};

/// Process-wide context, built once at startup and shared by `Arc`.
///
/// Settings, base folder and placeholder table never change after
/// construction. The profile set is an immutable snapshot that is swapped
/// as a whole by [`AppContext::reload_profiles`].
pub struct AppContext {
    pub settings: Settings,
    base_folder: PathBuf,
    placeholders: PlaceholderTable,
    profiles: RwLock<Arc<ProfileSet>>,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        let base_folder = settings.resolve_base_folder();
        let placeholders = PlaceholderTable::new(&base_folder);
        Self {
            settings,
            base_folder,
            placeholders,
            profiles: RwLock::new(Arc::new(ProfileSet::default())),
        }
    }

    pub fn base_folder(&self) -> &Path {
        &self.base_folder
    }

    pub fn placeholders(&self) -> &PlaceholderTable {
        &self.placeholders
    }

    /// Resolve a settings path against the base folder.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_folder.join(path)
        }
    }

    pub fn default_config_path(&self) -> PathBuf {
        self.resolve_path(&self.settings.config_file)
    }

    /// Current snapshot. Cheap to clone; stays valid across reloads.
    pub fn profiles(&self) -> Arc<ProfileSet> {
        match self.profiles.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn profile(&self, name: &str) -> Result<LaunchProfile, ConfigError> {
        self.profiles()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))
    }

    /// Load `path` and, only if it validates, replace the current snapshot.
    /// On failure the previous snapshot stays active.
    pub fn reload_profiles(&self, path: &Path) -> Result<Arc<ProfileSet>, ConfigError> {
        let loaded = match ConfigStore::new(&self.placeholders).load(path) {
            Ok(set) => Arc::new(set),
            Err(e) => {
                tracing::warn!(
                    "Keeping previous profiles, failed to load {}: {}",
                    path.display(),
                    e
                );
                return Err(e);
            }
        };

        let mut guard = match self.profiles.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = loaded.clone();
        Ok(loaded)
    }
}
