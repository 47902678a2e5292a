use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immediate child of a scanned directory. Paths are relative to the scan root
/// and always use `/` as separator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub extension: Option<String>,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub relative_path: String,
    pub is_directory: bool,
    pub hidden: bool,
    pub is_system: bool,
}
