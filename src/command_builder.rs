//! Turns a winws invocation copied out of a `.bat` script into a profile
//! section for the INI file.
//!
//! ```text
//! start "zapret: general" /min "%BIN%winws.exe" --wf-tcp=80,443 ^
//! --filter-tcp=443 --hostlist="%LISTS%list-general.txt" --dpi-desync=fake
//! ```
//! becomes
//! ```text
//! [general]
//! executable = {ZAPRET_FOLDER}/winws.exe
//! args = --wf-tcp=80,443;
//!     --filter-tcp=443;
//!     --hostlist={BLACKLIST_FILES_0};
//!     --dpi-desync=fake
//! ```

use regex::Regex;
use serde::Deserialize;

use crate::config::placeholders::{blacklist_token, ZAPRET_BINARY, ZAPRET_FOLDER};

/// Script variables and their placeholder equivalents. Longer patterns first.
const PATH_TOKENS: [(&str, &str); 5] = [
    ("%~dp0bin\\", "{ZAPRET_FOLDER}/"),
    ("%~dp0lists\\", "{BLACKLIST_FOLDER}/"),
    ("%BIN%", "{ZAPRET_FOLDER}/"),
    ("%LISTS%", "{BLACKLIST_FOLDER}/"),
    ("%~dp0", "{BASE_FOLDER}/"),
];

/// Which blacklist file `--hostlist*` options are pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostlistMethod {
    Blacklist,
    Youtube,
    Discord,
    Custom,
    /// Leave hostlist paths to the regular path substitution.
    Keep,
}

impl HostlistMethod {
    pub fn placeholder(self) -> Option<String> {
        match self {
            Self::Blacklist => Some(blacklist_token(0)),
            Self::Youtube => Some(blacklist_token(1)),
            Self::Discord => Some(blacklist_token(2)),
            Self::Custom => Some(blacklist_token(3)),
            Self::Keep => None,
        }
    }
}

impl std::str::FromStr for HostlistMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blacklist" => Ok(Self::Blacklist),
            "youtube" => Ok(Self::Youtube),
            "discord" => Ok(Self::Discord),
            "custom" => Ok(Self::Custom),
            "keep" => Ok(Self::Keep),
            other => Err(format!("unknown hostlist method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedCommand {
    pub executable: String,
    pub args: Vec<String>,
}

impl ConvertedCommand {
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// INI section text, one argument per continuation line.
    pub fn to_section(&self, profile_name: &str) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!(
            "[{}]\nexecutable = {}\nargs = {}\n",
            profile_name,
            self.executable,
            self.args.join(";\n    ")
        )
    }
}

/// Parse a raw script invocation into placeholder-based executable + args.
pub fn convert(raw: &str, method: HostlistMethod) -> ConvertedCommand {
    let joined = raw
        .replace("^\r\n", " ")
        .replace("^\n", " ")
        .replace(|c: char| c == '\r' || c == '\n', " ");

    let (exe_name, rest) = strip_launcher(&joined);
    let cleaned = rest.replace(|c: char| c == '"' || c == '^', "");

    let args = cleaned
        .split("--")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| rewrite_token(&format!("--{}", t), method))
        .collect();

    ConvertedCommand {
        executable: format!("{}/{}", ZAPRET_FOLDER, exe_name),
        args,
    }
}

/// Convert and render in one step. Empty input gives empty output.
pub fn build_section(raw: &str, profile_name: &str, method: HostlistMethod) -> String {
    convert(raw, method).to_section(profile_name)
}

/// Drop everything up to and including the launched `.exe`. Returns the exe
/// file name (winws.exe when none is named) and the remaining argument text.
fn strip_launcher(text: &str) -> (String, &str) {
    thread_local! {
        static LAUNCHER: Regex =
            Regex::new(r#"(?i)^.*?(?P<file>[A-Za-z0-9_.\-]+\.exe)"?"#).expect("static regex");
    }
    let found = LAUNCHER.with(|re| {
        re.captures(text)
            .map(|caps| (caps["file"].to_string(), caps.get(0).map(|m| m.end()).unwrap_or(0)))
    });

    match found {
        Some((file, end)) => (file, &text[end..]),
        None => (ZAPRET_BINARY.to_string(), text),
    }
}

fn rewrite_token(token: &str, method: HostlistMethod) -> String {
    if let Some(rewritten) = rewrite_hostlist(token, method) {
        return rewritten;
    }
    substitute_paths(token)
}

/// `--hostlist=...`, `--hostlist-exclude=...`, `--hostlist-auto=...` get the
/// selected blacklist placeholder. `--hostlist-domains` carries literal
/// domains and is not a file option.
fn rewrite_hostlist(token: &str, method: HostlistMethod) -> Option<String> {
    if !token.starts_with("--hostlist") {
        return None;
    }
    let (key, _) = token.split_once('=')?;
    if key == "--hostlist-domains" {
        return None;
    }
    method.placeholder().map(|placeholder| format!("{}={}", key, placeholder))
}

fn substitute_paths(token: &str) -> String {
    let mut out = token.to_string();
    for (pattern, replacement) in PATH_TOKENS {
        if out.contains(pattern) {
            out = out.replace(pattern, replacement);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERAL_BAT: &str = "start \"zapret: general\" /min \"%BIN%winws.exe\" --wf-tcp=80,443 --wf-udp=443,50000-50100 ^\n--filter-udp=443 --hostlist=\"%LISTS%list-general.txt\" --dpi-desync=fake --dpi-desync-repeats=6 --dpi-desync-fake-quic=\"%BIN%quic_initial_www_google_com.bin\" --new ^\n--filter-tcp=443 --hostlist-domains=discord.media --dpi-desync=fake";

    #[test]
    fn strips_launcher_and_splits_on_double_dash() {
        let cmd = convert(GENERAL_BAT, HostlistMethod::Blacklist);
        assert_eq!(cmd.executable, "{ZAPRET_FOLDER}/winws.exe");
        assert_eq!(cmd.args[0], "--wf-tcp=80,443");
        assert_eq!(cmd.args[1], "--wf-udp=443,50000-50100");
        assert!(cmd.args.iter().all(|a| a.starts_with("--")));
        assert!(cmd.args.iter().all(|a| !a.contains('"') && !a.contains('^')));
        assert!(cmd.args.contains(&"--new".to_string()));
    }

    #[test]
    fn hostlist_follows_method() {
        let cmd = convert(GENERAL_BAT, HostlistMethod::Discord);
        assert!(cmd.args.contains(&"--hostlist={BLACKLIST_FILES_2}".to_string()));
        assert!(cmd.args.contains(&"--hostlist-domains=discord.media".to_string()));

        let kept = convert(GENERAL_BAT, HostlistMethod::Keep);
        assert!(kept.args.contains(&"--hostlist={BLACKLIST_FOLDER}/list-general.txt".to_string()));
    }

    #[test]
    fn script_variables_become_placeholders() {
        let cmd = convert(GENERAL_BAT, HostlistMethod::Blacklist);
        assert!(cmd.args.contains(
            &"--dpi-desync-fake-quic={ZAPRET_FOLDER}/quic_initial_www_google_com.bin".to_string()
        ));
        let dp0 = convert("\"%~dp0bin\\winws.exe\" --ipset=%~dp0lists\\ipset-all.txt", HostlistMethod::Keep);
        assert_eq!(dp0.args, vec!["--ipset={BLACKLIST_FOLDER}/ipset-all.txt"]);
    }

    #[test]
    fn section_text_shape() {
        let section = build_section("winws.exe --a=1 --b", "demo", HostlistMethod::Blacklist);
        assert_eq!(
            section,
            "[demo]\nexecutable = {ZAPRET_FOLDER}/winws.exe\nargs = --a=1;\n    --b\n"
        );
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert_eq!(build_section("", "x", HostlistMethod::Blacklist), "");
        assert_eq!(build_section("  \n ", "x", HostlistMethod::Blacklist), "");
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("YouTube".parse::<HostlistMethod>(), Ok(HostlistMethod::Youtube));
        assert!("everything".parse::<HostlistMethod>().is_err());
    }
}
