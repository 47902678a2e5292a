use std::path::{Component, Path, PathBuf};

pub fn normalize(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }
    normalized
}

/// True when `path` is `root` itself or sits below it. Both sides are compared as
/// normalized strings, case-insensitively on Windows.
pub fn is_within_scope(path: &str, root: &str) -> bool {
    let path = normalize(path);
    let root = normalize(root);

    if path == root {
        return true;
    }

    if root == "/" {
        return path.starts_with('/');
    }

    if cfg!(windows) {
        let path_lower = path.to_ascii_lowercase();
        let root_lower = root.to_ascii_lowercase();
        return path_lower.starts_with(&(root_lower + "/"));
    }

    path.starts_with(&(root + "/"))
}

/// Like [`is_within_scope`] but the root itself does not count.
pub fn is_strict_descendant(path: &str, root: &str) -> bool {
    let same = if cfg!(windows) {
        normalize(path).eq_ignore_ascii_case(&normalize(root))
    } else {
        normalize(path) == normalize(root)
    };
    !same && is_within_scope(path, root)
}

/// Folds `.` and `..` without touching the filesystem. Returns `None` when `..`
/// would climb above the first component.
pub fn lexical_normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
        }
    }
    Some(out)
}

/// Resolves `path` (absolute, or relative to `root`) to the location it names on
/// disk. Existing parent directories are canonicalized so symlinked folders are
/// followed, but the final component is kept as-is so a symlinked file is judged
/// by where it lives rather than where it points.
pub fn resolve_for_scope(path: &Path, root: &Path) -> Option<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let normalized = lexical_normalize(&joined)?;
    let file_name = normalized.file_name()?.to_os_string();
    let parent = normalized.parent()?;

    let mut missing = Vec::new();
    let mut cursor = parent;
    let canonical_parent = loop {
        match std::fs::canonicalize(cursor) {
            Ok(canonical) => break canonical,
            Err(_) => {
                missing.push(cursor.file_name()?.to_os_string());
                cursor = cursor.parent()?;
            }
        }
    };

    let mut resolved = canonical_parent;
    for part in missing.iter().rev() {
        resolved.push(part);
    }
    resolved.push(file_name);
    Some(resolved)
}
