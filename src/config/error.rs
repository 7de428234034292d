use std::path::PathBuf;

/// Failures while reading or validating a profile INI file.
/// All of them abort the load and leave the previous profile set in place.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("section [{0}] is defined more than once")]
    DuplicateSection(String),

    #[error("section [{section}] is missing required key '{key}'")]
    MissingKey { section: String, key: String },

    #[error("section [{section}] has unresolved placeholder {token}")]
    UnresolvedPlaceholder { section: String, token: String },

    #[error("section [{0}] has an empty 'executable'")]
    EmptyExecutable(String),

    #[error("profile '{0}' not found")]
    ProfileNotFound(String),
}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "CONFIG_READ_ERROR",
            Self::Parse { .. } => "CONFIG_PARSE_ERROR",
            Self::DuplicateSection(_) => "DUPLICATE_SECTION",
            Self::MissingKey { .. } => "MISSING_KEY",
            Self::UnresolvedPlaceholder { .. } => "UNRESOLVED_PLACEHOLDER",
            Self::EmptyExecutable(_) => "EMPTY_EXECUTABLE",
            Self::ProfileNotFound(_) => "PROFILE_NOT_FOUND",
        }
    }
}
