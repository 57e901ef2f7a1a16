//! Host platform detection and the `platforms:` matching rules for tasks.
//!
//! A task instance that declares `platforms: [...]` only runs on hosts
//! whose label (or Linux distro ID / ID_LIKE) appears in that list. An
//! empty list means "all platforms".

use std::collections::HashSet;
use std::fs;

/// The running host's platform, as reported to task `platforms:` filters.
#[derive(Debug, Clone)]
pub struct Os {
    /// `linux`, `darwin`, or `windows`.
    label: &'static str,
    /// On Linux, the distro ID plus every `ID_LIKE` token. Empty elsewhere.
    distro_tokens: HashSet<String>,
}

impl Os {
    /// Detect the current host's platform.
    pub fn current() -> Self {
        let label = Self::host_label();
        let distro_tokens = if label == "linux" {
            read_os_release().unwrap_or_default()
        } else {
            HashSet::new()
        };
        Self {
            label,
            distro_tokens,
        }
    }

    #[cfg(target_os = "linux")]
    fn host_label() -> &'static str {
        "linux"
    }
    #[cfg(target_os = "macos")]
    fn host_label() -> &'static str {
        "darwin"
    }
    #[cfg(target_os = "windows")]
    fn host_label() -> &'static str {
        "windows"
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    fn host_label() -> &'static str {
        "unix"
    }

    /// Does `wanted` (one entry from a task's `platforms:` list) match this host?
    pub fn matches(&self, wanted: &str) -> bool {
        let wanted = wanted.to_ascii_lowercase();
        match wanted.as_str() {
            "unix" => self.label != "windows",
            "macos" | "osx" => self.label == "darwin",
            other if other == self.label => true,
            other => self.distro_tokens.contains(other),
        }
    }

    /// A task whose `platforms:` list is non-empty is active only if at
    /// least one entry matches this host; an empty list always matches.
    pub fn matches_any(&self, platforms: &[String]) -> bool {
        platforms.is_empty() || platforms.iter().any(|p| self.matches(p))
    }

    pub fn label(&self) -> &str {
        self.label
    }
}

fn read_os_release() -> Option<HashSet<String>> {
    let content = fs::read_to_string("/etc/os-release")
        .or_else(|_| fs::read_to_string("/usr/lib/os-release"))
        .ok()?;
    Some(parse_os_release(&content))
}

fn parse_os_release(content: &str) -> HashSet<String> {
    let mut tokens = HashSet::new();
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key != "ID" && key != "ID_LIKE" {
            continue;
        }
        let value = value.trim().trim_matches('"');
        for token in value.split_whitespace() {
            tokens.insert(token.to_ascii_lowercase());
        }
    }
    tokens
}
