use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{PipelineConfig, DEFAULT_MAX_FILES};
use crate::error::AppError;
use crate::models::file_entry::FileEntry;
use crate::safety::{self, SafetyPolicy};

/// Listing of one directory taken at plan time. Paths are relative to `root`.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub root: PathBuf,
    pub entries: Vec<FileEntry>,
}

impl Snapshot {
    /// Entries the model is allowed to see: plain files that are neither hidden nor system.
    pub fn visible_files(&self) -> Vec<&FileEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_directory && !safety::is_hidden_or_system(e))
            .collect()
    }

    pub fn find(&self, relative_path: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.relative_path == relative_path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub total_files: usize,
    pub total_size: u64,
    pub extensions: BTreeMap<String, usize>,
}

pub fn file_entry_from_path(path: &Path, root: &Path) -> Option<FileEntry> {
    let metadata = fs::symlink_metadata(path).ok()?;
    let name = path.file_name()?.to_string_lossy().to_string();
    let extension = Path::new(&name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    let relative_path = path
        .strip_prefix(root)
        .ok()?
        .to_string_lossy()
        .replace('\\', "/");

    Some(FileEntry {
        extension,
        size_bytes: if metadata.is_dir() { 0 } else { metadata.len() },
        modified_at: metadata
            .modified()
            .ok()
            .map(chrono::DateTime::<chrono::Utc>::from),
        relative_path,
        is_directory: metadata.is_dir(),
        hidden: safety::is_hidden_name(&name),
        is_system: safety::is_reserved_name(&name),
        name,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Upper bound on AI-visible files; flagged entries do not count.
    pub max_files: usize,
    pub recursive: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            recursive: false,
        }
    }
}

impl From<&PipelineConfig> for ScanOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_files: config.max_files,
            recursive: config.recursive,
        }
    }
}

/// Lists the direct children of `root`, or the whole tree below it when
/// `options.recursive` is set. Hidden, system and out-of-scope directories are
/// never entered. Symlinks are never followed.
pub fn scan(root: &Path, policy: &SafetyPolicy, options: &ScanOptions) -> Result<Snapshot, AppError> {
    let root = policy.check_root(root)?;
    fs::read_dir(&root).map_err(|e| AppError::DirectoryUnreadable {
        path: root.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut entries = Vec::new();
    let mut visible_count = 0usize;
    let mut walker = walkdir::WalkDir::new(&root)
        .min_depth(1)
        .max_depth(if options.recursive { usize::MAX } else { 1 })
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(item) = walker.next() {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let path = item.path();
        let is_dir = item.file_type().is_dir();
        if !policy.is_within_scope(path, &root) {
            warn!(path = %path.display(), "excluding entry outside the allowed scope");
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }
        let Some(entry) = file_entry_from_path(path, &root) else {
            continue;
        };

        let flagged = safety::is_hidden_or_system(&entry);
        if is_dir && flagged {
            walker.skip_current_dir();
        }
        if !entry.is_directory && !flagged {
            if visible_count >= options.max_files {
                warn!(root = %root.display(), max_files = options.max_files, "directory listing truncated");
                break;
            }
            visible_count += 1;
        }
        entries.push(entry);
    }

    debug!(
        root = %root.display(),
        count = entries.len(),
        visible = visible_count,
        recursive = options.recursive,
        "scanned directory"
    );
    Ok(Snapshot { root, entries })
}

pub fn summarize(entries: &[&FileEntry]) -> ScanSummary {
    let mut summary = ScanSummary::default();
    for entry in entries.iter().filter(|e| !e.is_directory) {
        summary.total_files += 1;
        summary.total_size += entry.size_bytes;
        let key = entry.extension.clone().unwrap_or_else(|| "(none)".to_string());
        *summary.extensions.entry(key).or_insert(0) += 1;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("photo.jpg"), b"jpeg bytes").unwrap();
        fs::write(tmp.path().join("doc.pdf"), b"%PDF").unwrap();
        fs::write(tmp.path().join(".hidden"), b"secret").unwrap();
        tmp
    }

    #[test]
    fn scan_lists_direct_children_with_flags() {
        let tmp = sandbox();
        let snapshot = scan(tmp.path(), &SafetyPolicy::default(), &ScanOptions::default()).unwrap();

        let names: Vec<&str> = snapshot.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".hidden", "doc.pdf", "photo.jpg"]);

        let hidden = snapshot.find(".hidden").unwrap();
        assert!(hidden.hidden);
        let photo = snapshot.find("photo.jpg").unwrap();
        assert_eq!(photo.extension.as_deref(), Some("jpg"));
        assert_eq!(photo.size_bytes, 10);
        assert!(photo.modified_at.is_some());
    }

    #[test]
    fn scan_does_not_descend() {
        let tmp = sandbox();
        fs::create_dir(tmp.path().join("Pictures")).unwrap();
        fs::write(tmp.path().join("Pictures").join("old.png"), b"png").unwrap();

        let snapshot = scan(tmp.path(), &SafetyPolicy::default(), &ScanOptions::default()).unwrap();
        assert!(snapshot.find("Pictures").unwrap().is_directory);
        assert!(snapshot.find("Pictures/old.png").is_none());
        assert!(snapshot.entries.iter().all(|e| !e.relative_path.contains('/')));
    }

    #[test]
    fn visible_files_exclude_hidden_system_and_directories() {
        let tmp = sandbox();
        fs::create_dir(tmp.path().join("Docs")).unwrap();
        fs::write(tmp.path().join("Thumbs.db"), b"").unwrap();

        let snapshot = scan(tmp.path(), &SafetyPolicy::default(), &ScanOptions::default()).unwrap();
        let visible: Vec<&str> = snapshot
            .visible_files()
            .iter()
            .map(|e| e.relative_path.as_str())
            .collect();
        assert_eq!(visible, vec!["doc.pdf", "photo.jpg"]);
    }

    fn capped(max_files: usize) -> ScanOptions {
        ScanOptions {
            max_files,
            ..ScanOptions::default()
        }
    }

    fn visible_paths(snapshot: &Snapshot) -> Vec<&str> {
        snapshot
            .visible_files()
            .iter()
            .map(|e| e.relative_path.as_str())
            .collect()
    }

    #[test]
    fn scan_caps_visible_files_at_max_files() {
        let tmp = sandbox();
        let snapshot = scan(tmp.path(), &SafetyPolicy::default(), &capped(1)).unwrap();
        assert_eq!(visible_paths(&snapshot), vec!["doc.pdf"]);
        assert!(snapshot.find(".hidden").is_some());
    }

    #[test]
    fn hidden_entries_do_not_use_up_the_cap() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(".a"), b"a").unwrap();
        fs::write(tmp.path().join(".b"), b"b").unwrap();
        fs::write(tmp.path().join("photo.jpg"), b"jpg").unwrap();

        let snapshot = scan(tmp.path(), &SafetyPolicy::default(), &capped(2)).unwrap();
        assert_eq!(visible_paths(&snapshot), vec!["photo.jpg"]);
        assert_eq!(snapshot.entries.len(), 3);
    }

    #[test]
    fn recursive_scan_skips_hidden_directories() {
        let tmp = sandbox();
        fs::create_dir_all(tmp.path().join("Projects/site")).unwrap();
        fs::write(tmp.path().join("Projects/site/index.html"), b"<html>").unwrap();
        fs::write(tmp.path().join("Projects/.env"), b"KEY=1").unwrap();
        fs::create_dir_all(tmp.path().join(".git/objects")).unwrap();
        fs::write(tmp.path().join(".git/config"), b"[core]").unwrap();
        fs::write(tmp.path().join(".git/objects/ab"), b"blob").unwrap();

        let options = ScanOptions {
            recursive: true,
            ..ScanOptions::default()
        };
        let snapshot = scan(tmp.path(), &SafetyPolicy::default(), &options).unwrap();

        assert_eq!(
            visible_paths(&snapshot),
            vec!["Projects/site/index.html", "doc.pdf", "photo.jpg"]
        );
        assert!(snapshot.find(".git").unwrap().hidden);
        assert!(snapshot.find(".git/config").is_none());
        assert!(snapshot.find(".git/objects/ab").is_none());
        assert!(snapshot.find("Projects/.env").unwrap().hidden);
    }

    #[test]
    fn recursive_scan_does_not_follow_directory_symlinks() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), b"x").unwrap();
        let tmp = sandbox();
        #[cfg(unix)]
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("linked")).unwrap();

        let options = ScanOptions {
            recursive: true,
            ..ScanOptions::default()
        };
        let snapshot = scan(tmp.path(), &SafetyPolicy::default(), &options).unwrap();
        assert!(snapshot
            .entries
            .iter()
            .all(|e| !e.relative_path.ends_with("secret.txt")));
    }

    #[test]
    fn scan_missing_directory_is_unreadable() {
        let tmp = tempfile::tempdir().unwrap();
        let err = scan(&tmp.path().join("nope"), &SafetyPolicy::default(), &capped(10)).unwrap_err();
        assert_eq!(err.kind(), "directory_unreadable");
    }

    #[test]
    fn summary_counts_extensions() {
        let tmp = sandbox();
        fs::write(tmp.path().join("Makefile"), b"all:").unwrap();
        fs::write(tmp.path().join("b.JPG"), b"x").unwrap();
        let snapshot = scan(tmp.path(), &SafetyPolicy::default(), &ScanOptions::default()).unwrap();

        let summary = summarize(&snapshot.visible_files());
        assert_eq!(summary.total_files, 4);
        assert_eq!(summary.extensions.get("jpg"), Some(&2));
        assert_eq!(summary.extensions.get("(none)"), Some(&1));
        assert_eq!(summary.total_size, 10 + 4 + 4 + 1);
    }
}
