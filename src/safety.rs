use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::models::file_entry::FileEntry;
use crate::scope_path;

/// Locations that are never scanned into, moved from, or moved to.
pub const DEFAULT_DENY_LIST: &[&str] = &[
    "/System",
    "/Library",
    "/Applications",
    "/usr",
    "/bin",
    "/sbin",
    "/etc",
    "~/.ssh",
    "~/.config",
    "C:\\Windows",
    "C:\\Program Files",
    "C:\\Program Files (x86)",
];

const RESERVED_NAMES: &[&str] = &[
    ".ds_store",
    "thumbs.db",
    "ehthumbs.db",
    "desktop.ini",
    "$recycle.bin",
    "system volume information",
    "icon\r",
];

#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    deny_prefixes: Vec<String>,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl SafetyPolicy {
    pub fn new(additions: &[String]) -> Self {
        let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        let mut deny_prefixes = Vec::new();

        let configured = DEFAULT_DENY_LIST
            .iter()
            .map(|s| s.to_string())
            .chain(additions.iter().cloned());
        for raw in configured {
            let Some(expanded) = expand_home(&raw, home.as_deref()) else {
                continue;
            };
            let normalized = scope_path::normalize(&expanded.to_string_lossy());
            if !deny_prefixes.contains(&normalized) {
                deny_prefixes.push(normalized);
            }
            // /etc is /private/etc on macOS; match both spellings.
            if let Ok(canonical) = std::fs::canonicalize(&expanded) {
                let canonical = scope_path::normalize(&canonical.to_string_lossy());
                if !deny_prefixes.contains(&canonical) {
                    deny_prefixes.push(canonical);
                }
            }
        }

        Self { deny_prefixes }
    }

    pub fn deny_prefixes(&self) -> &[String] {
        &self.deny_prefixes
    }

    pub fn is_denied(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.deny_prefixes
            .iter()
            .any(|prefix| matches_prefix(&path, prefix))
    }

    /// Canonicalizes the directory a request names and refuses denied locations.
    pub fn check_root(&self, root: &Path) -> Result<PathBuf, AppError> {
        let canonical = std::fs::canonicalize(root).map_err(|e| AppError::DirectoryUnreadable {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        if !canonical.is_dir() {
            return Err(AppError::DirectoryUnreadable {
                path: root.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }
        if self.is_denied(root) || self.is_denied(&canonical) {
            return Err(AppError::UnsafePath(root.display().to_string()));
        }
        Ok(canonical)
    }

    /// Resolves `path` against the canonical `root` and returns the absolute location
    /// only when it is a strict descendant of the root and not on the deny list.
    pub fn resolve_in_scope(&self, path: &Path, root: &Path) -> Option<PathBuf> {
        let resolved = scope_path::resolve_for_scope(path, root)?;
        let within = scope_path::is_strict_descendant(
            &resolved.to_string_lossy(),
            &root.to_string_lossy(),
        );
        if !within || self.is_denied(&resolved) {
            return None;
        }
        Some(resolved)
    }

    pub fn is_within_scope(&self, path: &Path, root: &Path) -> bool {
        self.resolve_in_scope(path, root).is_some()
    }
}

fn expand_home(raw: &str, home: Option<&Path>) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed == "~" {
        return home.map(Path::to_path_buf);
    }
    if let Some(rest) = trimmed.strip_prefix("~/") {
        return home.map(|h| h.join(rest));
    }
    Some(PathBuf::from(trimmed))
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    let normalized = scope_path::normalize(path);
    if is_windows_style_path(prefix) || cfg!(windows) {
        let normalized_lower = normalized.to_ascii_lowercase();
        let prefix_lower = prefix.to_ascii_lowercase();
        normalized_lower == prefix_lower || normalized_lower.starts_with(&format!("{prefix_lower}/"))
    } else {
        normalized == prefix || normalized.starts_with(&format!("{prefix}/"))
    }
}

fn is_windows_style_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}

/// Checks the shape of a root-relative path coming back from the model.
pub fn validate_relative(path: &str) -> Result<(), String> {
    if path.trim().is_empty() {
        return Err("path is empty".to_string());
    }
    if path.contains('\0') {
        return Err("path contains a NUL byte".to_string());
    }
    if path.starts_with('/') || path.starts_with('\\') || is_windows_style_path(path) {
        return Err(format!("path must be relative: {path}"));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(format!("path traversal (.. component) not allowed: {path}"));
    }
    Ok(())
}

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

pub fn is_reserved_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("~$") || RESERVED_NAMES.contains(&lower.as_str())
}

pub fn is_hidden_or_system(entry: &FileEntry) -> bool {
    entry.hidden || entry.is_system || is_hidden_name(&entry.name) || is_reserved_name(&entry.name)
}
