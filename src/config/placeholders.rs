//! Symbolic `{NAME}` tokens used in profile INI files and the absolute
//! paths they stand for.

use std::path::{Path, PathBuf};

use regex::Regex;

pub const BASE_FOLDER: &str = "{BASE_FOLDER}";
pub const ZAPRET_FOLDER: &str = "{ZAPRET_FOLDER}";
pub const BLACKLIST_FOLDER: &str = "{BLACKLIST_FOLDER}";

/// Blacklist files shipped in the blacklist folder, in `{BLACKLIST_FILES_n}` order.
pub const BLACKLIST_FILE_NAMES: [&str; 4] = [
    "russia-blacklist.txt",
    "russia-youtube.txt",
    "discord-blacklist.txt",
    "custom-blacklist.txt",
];

pub const ZAPRET_DIR_NAME: &str = "zapret";
pub const BLACKLIST_DIR_NAME: &str = "black";
pub const ZAPRET_BINARY: &str = "winws.exe";

/// Fake-packet blobs winws needs next to its binary.
pub const ZAPRET_BLOBS: [&str; 2] = [
    "quic_initial_www_google_com.bin",
    "tls_clienthello_www_google_com.bin",
];

pub fn blacklist_token(index: usize) -> String {
    format!("{{BLACKLIST_FILES_{}}}", index)
}

/// Token -> absolute path table. Built once per `AppContext` and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct PlaceholderTable {
    base: PathBuf,
    entries: Vec<(String, String)>,
}

impl PlaceholderTable {
    pub fn new(base: &Path) -> Self {
        let zapret = base.join(ZAPRET_DIR_NAME);
        let black = base.join(BLACKLIST_DIR_NAME);

        let mut entries = vec![
            (BASE_FOLDER.to_string(), path_string(base)),
            (ZAPRET_FOLDER.to_string(), path_string(&zapret)),
            (BLACKLIST_FOLDER.to_string(), path_string(&black)),
        ];
        for (i, file) in BLACKLIST_FILE_NAMES.iter().enumerate() {
            entries.push((blacklist_token(i), path_string(&black.join(file))));
        }

        Self {
            base: base.to_path_buf(),
            entries,
        }
    }

    pub fn base_folder(&self) -> &Path {
        &self.base
    }

    pub fn zapret_folder(&self) -> PathBuf {
        self.base.join(ZAPRET_DIR_NAME)
    }

    pub fn blacklist_folder(&self) -> PathBuf {
        self.base.join(BLACKLIST_DIR_NAME)
    }

    pub fn blacklist_file(&self, index: usize) -> Option<PathBuf> {
        BLACKLIST_FILE_NAMES
            .get(index)
            .map(|name| self.blacklist_folder().join(name))
    }

    pub fn lookup(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, v)| v.as_str())
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    /// Literal find-and-replace of every known token.
    pub fn substitute(&self, input: &str) -> String {
        let mut out = input.to_string();
        for (token, value) in &self.entries {
            if out.contains(token.as_str()) {
                out = out.replace(token.as_str(), value);
            }
        }
        out
    }

    /// Files that must exist before the service can be registered:
    /// the winws binary, the main blacklist and both fake-packet blobs.
    pub fn service_required_files(&self) -> Vec<PathBuf> {
        let zapret = self.zapret_folder();
        let mut files = vec![zapret.join(ZAPRET_BINARY)];
        if let Some(list) = self.blacklist_file(0) {
            files.push(list);
        }
        files.extend(ZAPRET_BLOBS.iter().map(|blob| zapret.join(blob)));
        files
    }
}

/// First `{NAME}` token left in `value`, if any.
pub fn find_unresolved(value: &str) -> Option<String> {
    thread_local! {
        static TOKEN: Regex = Regex::new(r"\{[A-Za-z0-9_]+\}").expect("static regex");
    }
    TOKEN.with(|re| re.find(value).map(|m| m.as_str().to_string()))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
