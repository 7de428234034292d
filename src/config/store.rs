//! Profile INI -> resolved [`LaunchProfile`] set.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::error::ConfigError;
use super::ini::{find_duplicate_section, IniDocument, IniSection};
use super::placeholders::{find_unresolved, PlaceholderTable};

/// Marker section carried by every profile file; never a profile itself.
pub const SCRIPT_OPTIONS: &str = "SCRIPT_OPTIONS";

/// Separator between argument tokens inside an `args` value.
pub const ARG_SEPARATOR: char = ';';

/// One user-selectable launch configuration with every placeholder resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchProfile {
    pub name: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
}

impl LaunchProfile {
    pub fn new(name: &str, executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            executable: executable.into(),
            args,
        }
    }

    /// Executable followed by its arguments.
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.executable.to_string_lossy().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Immutable result of one successful load. Replaced wholesale on reload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileSet {
    source: Option<PathBuf>,
    profiles: Vec<LaunchProfile>,
}

impl ProfileSet {
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&LaunchProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LaunchProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

pub struct ConfigStore<'a> {
    placeholders: &'a PlaceholderTable,
}

impl<'a> ConfigStore<'a> {
    pub fn new(placeholders: &'a PlaceholderTable) -> Self {
        Self { placeholders }
    }

    /// Read and validate a profile file. Only the file itself is touched.
    pub fn load(&self, path: &Path) -> Result<ProfileSet, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let set = self.load_str(&text, Some(path))?;
        tracing::info!("Loaded {} profiles from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn load_str(&self, text: &str, source: Option<&Path>) -> Result<ProfileSet, ConfigError> {
        // The parser merges repeated headers, so duplicates are caught on the raw text.
        if let Some(name) = find_duplicate_section(text, &[SCRIPT_OPTIONS]) {
            return Err(ConfigError::DuplicateSection(name));
        }

        let doc = IniDocument::parse(text)?;
        let profiles = doc
            .sections()
            .iter()
            .filter(|s| s.name != SCRIPT_OPTIONS)
            .map(|s| self.resolve_section(s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProfileSet {
            source: source.map(Path::to_path_buf),
            profiles,
        })
    }

    fn resolve_section(&self, section: &IniSection) -> Result<LaunchProfile, ConfigError> {
        let raw_exe = required(section, "executable")?;
        let raw_args = required(section, "args")?;

        let executable = self.resolve_executable(&section.name, raw_exe)?;

        let args = split_args(raw_args)
            .into_iter()
            .map(|token| {
                let resolved = self.placeholders.substitute(&token);
                match find_unresolved(&resolved) {
                    Some(token) => Err(ConfigError::UnresolvedPlaceholder {
                        section: section.name.clone(),
                        token,
                    }),
                    None => Ok(resolved),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LaunchProfile {
            name: section.name.clone(),
            executable,
            args,
        })
    }

    fn resolve_executable(&self, section: &str, raw: &str) -> Result<PathBuf, ConfigError> {
        let resolved = self.placeholders.substitute(raw.trim());
        if let Some(token) = find_unresolved(&resolved) {
            return Err(ConfigError::UnresolvedPlaceholder {
                section: section.to_string(),
                token,
            });
        }
        if resolved.is_empty() {
            return Err(ConfigError::EmptyExecutable(section.to_string()));
        }

        let path = PathBuf::from(resolved);
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.placeholders.base_folder().join(path))
        }
    }
}

fn required<'s>(section: &'s IniSection, key: &str) -> Result<&'s str, ConfigError> {
    section.get(key).ok_or_else(|| ConfigError::MissingKey {
        section: section.name.clone(),
        key: key.to_string(),
    })
}

/// Split an `args` value into tokens. Line breaks become spaces first, then
/// the value is cut on `;`, each piece trimmed and empty pieces dropped.
pub fn split_args(raw: &str) -> Vec<String> {
    raw.replace("\r\n", " ")
        .replace('\n', " ")
        .split(ARG_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
