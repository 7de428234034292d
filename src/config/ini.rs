//! Minimal INI reader for profile files.
//!
//! Sections keep file order. Indented lines continue the previous value and
//! are appended with a newline. Keys are case-insensitive. Whole-line
//! comments start with `#` or `;`.

use regex::Regex;

use super::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniSection {
    pub name: String,
    entries: Vec<(String, String)>,
}

impl IniSection {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct IniDocument {
    sections: Vec<IniSection>,
}

impl IniDocument {
    pub fn sections(&self) -> &[IniSection] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Parse INI text. Repeated section headers are merged here, so callers
    /// that must reject them run [`find_duplicate_section`] first.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut doc = IniDocument::default();
        let mut current: Option<usize> = None;
        let mut last_key: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() {
                last_key = None;
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            let indented = raw.starts_with(' ') || raw.starts_with('\t');
            if indented {
                if let (Some(sec), Some(key)) = (current, last_key.as_ref()) {
                    let section = &mut doc.sections[sec];
                    if let Some((_, value)) = section.entries.iter_mut().find(|(k, _)| k == key) {
                        if !value.is_empty() {
                            value.push('\n');
                        }
                        value.push_str(trimmed);
                        continue;
                    }
                }
            }

            if let Some(name) = section_header(trimmed) {
                current = Some(match doc.sections.iter().position(|s| s.name == name) {
                    Some(pos) => pos,
                    None => {
                        doc.sections.push(IniSection::new(&name));
                        doc.sections.len() - 1
                    }
                });
                last_key = None;
                continue;
            }

            let sec = current.ok_or_else(|| ConfigError::Parse {
                line: line_no,
                message: "key/value pair before the first section header".to_string(),
            })?;

            let split_at = trimmed.find(&['=', ':'][..]).ok_or_else(|| ConfigError::Parse {
                line: line_no,
                message: format!("expected 'key = value', got '{}'", trimmed),
            })?;

            let key = trimmed[..split_at].trim().to_lowercase();
            let value = trimmed[split_at + 1..].trim().to_string();
            if key.is_empty() {
                return Err(ConfigError::Parse {
                    line: line_no,
                    message: "empty key".to_string(),
                });
            }

            let section = &mut doc.sections[sec];
            if section.entries.iter().any(|(k, _)| *k == key) {
                return Err(ConfigError::Parse {
                    line: line_no,
                    message: format!("option '{}' repeated in section [{}]", key, section.name),
                });
            }
            section.entries.push((key.clone(), value));
            last_key = Some(key);
        }

        Ok(doc)
    }
}

fn section_header(line: &str) -> Option<String> {
    thread_local! {
        static HEADER: Regex = Regex::new(r"^\[(?P<name>[^\]]+)\]\s*$").expect("static regex");
    }
    HEADER.with(|re| re.captures(line).map(|caps| caps["name"].trim().to_string()))
}

/// Raw-text scan for a `[name]` header that appears more than once.
/// Headers named in `ignore` are skipped.
pub fn find_duplicate_section(text: &str, ignore: &[&str]) -> Option<String> {
    let mut seen: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if !(line.starts_with('[') && line.ends_with(']')) || line.len() < 2 {
            continue;
        }
        let name = line[1..line.len() - 1].trim();
        if ignore.contains(&name) {
            continue;
        }
        if seen.contains(&name) {
            return Some(name.to_string());
        }
        seen.push(name);
    }
    None
}
