use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::OnConflict;
use crate::models::action::{CheckedAction, Disposition, ResolvedAction};
use crate::safety::SafetyPolicy;

const MAX_RENAME_SUFFIX: usize = 999;

fn exists_on_disk(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// First `stem_N.ext` next to `destination` that is neither on disk nor reserved.
fn alternate_destination(
    relative: &str,
    root: &Path,
    reserved: &HashSet<PathBuf>,
) -> Option<(String, PathBuf)> {
    let (parent, file_name) = match relative.rsplit_once('/') {
        Some((parent, name)) => (Some(parent), name),
        None => (None, relative),
    };
    let (stem, extension) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };

    (1..=MAX_RENAME_SUFFIX).find_map(|n| {
        let candidate_name = match extension {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = match parent {
            Some(parent) => format!("{parent}/{candidate_name}"),
            None => candidate_name,
        };
        let absolute = root.join(&candidate);
        (!exists_on_disk(&absolute) && !reserved.contains(&absolute)).then_some((candidate, absolute))
    })
}

/// Decides what happens to each checked action. Earlier actions win a shared
/// destination; later ones see it as taken.
pub fn resolve_conflicts(
    actions: Vec<CheckedAction>,
    root: &Path,
    policy: &SafetyPolicy,
    on_conflict: OnConflict,
) -> Vec<ResolvedAction> {
    let mut reserved: HashSet<PathBuf> = HashSet::new();

    actions
        .into_iter()
        .map(|checked| {
            let action = checked.action;
            let naive_source = root.join(&action.source);
            let naive_destination = root.join(&action.destination);

            let skip_invalid = |reason: String| ResolvedAction {
                action: action.clone(),
                disposition: Disposition::SkipInvalid { reason },
                source_path: naive_source.clone(),
                destination_path: naive_destination.clone(),
            };

            if let Some(reason) = checked.violation {
                return skip_invalid(reason);
            }
            let Some(source_path) = policy.resolve_in_scope(Path::new(&action.source), root) else {
                return skip_invalid(format!("source is outside the allowed scope: {}", action.source));
            };
            let Some(destination_path) =
                policy.resolve_in_scope(Path::new(&action.destination), root)
            else {
                return skip_invalid(format!(
                    "destination is outside the allowed scope: {}",
                    action.destination
                ));
            };
            if source_path == destination_path {
                return skip_invalid("source and destination are the same".to_string());
            }

            let taken = exists_on_disk(&destination_path) || reserved.contains(&destination_path);
            let (disposition, destination_path) = if !taken {
                (Disposition::Execute, destination_path)
            } else {
                match on_conflict {
                    OnConflict::Skip => (Disposition::SkipExists, destination_path),
                    OnConflict::Rename => {
                        match alternate_destination(&action.destination, root, &reserved) {
                            Some((destination, absolute)) => {
                                (Disposition::RenameOnConflict { destination }, absolute)
                            }
                            None => (Disposition::SkipExists, destination_path),
                        }
                    }
                }
            };

            if disposition.is_executable() {
                reserved.insert(destination_path.clone());
            }
            debug!(source = %action.source, disposition = disposition.as_str(), "resolved action");

            ResolvedAction {
                action,
                disposition,
                source_path,
                destination_path,
            }
        })
        .collect()
}
