use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::models::action::{Disposition, ResolvedAction};
use crate::models::outcome::{ExecutionOutcome, ExecutionReport, ReasonCode};
use crate::safety::SafetyPolicy;

/// Why a single move did not happen.
#[derive(Debug)]
pub struct MoveFailure {
    pub reason: ReasonCode,
    pub message: String,
    /// True when nothing was attempted (scope check failed).
    pub refused: bool,
}

impl MoveFailure {
    fn new(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            refused: false,
        }
    }

    fn from_io(err: std::io::Error) -> Self {
        Self::new(ReasonCode::from_io_error(&err), err.to_string())
    }
}

/// Moves `source` to `destination` (both relative to `root`) after re-checking
/// scope against the live filesystem. Never overwrites.
pub fn move_entry(
    root: &Path,
    policy: &SafetyPolicy,
    source: &str,
    destination: &str,
) -> Result<(), MoveFailure> {
    let refuse = |what: &str, path: &str| MoveFailure {
        reason: ReasonCode::Invalid,
        message: format!("{what} is outside the allowed scope: {path}"),
        refused: true,
    };
    let source_path = policy
        .resolve_in_scope(Path::new(source), root)
        .ok_or_else(|| refuse("source", source))?;
    let destination_path = policy
        .resolve_in_scope(Path::new(destination), root)
        .ok_or_else(|| refuse("destination", destination))?;

    let source_meta = match fs::symlink_metadata(&source_path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MoveFailure::new(
                ReasonCode::NotFound,
                format!("source no longer exists: {source}"),
            ));
        }
        Err(e) => return Err(MoveFailure::from_io(e)),
    };

    if let Some(parent) = destination_path.parent() {
        fs::create_dir_all(parent).map_err(MoveFailure::from_io)?;
    }
    let occupied = || {
        MoveFailure::new(
            ReasonCode::DestinationExists,
            format!("destination already exists: {destination}"),
        )
    };
    if fs::symlink_metadata(&destination_path).is_ok() {
        return Err(occupied());
    }

    // A hard link is created atomically and fails on an existing target, so a
    // file that appears after the check above is never replaced.
    if source_meta.is_file() {
        match fs::hard_link(&source_path, &destination_path) {
            Ok(()) => {
                if let Err(e) = fs::remove_file(&source_path) {
                    let _ = fs::remove_file(&destination_path);
                    return Err(MoveFailure::from_io(e));
                }
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Err(occupied()),
            Err(e) => {
                debug!(error = %e, source, "hard link unavailable, falling back to rename");
            }
        }
    }

    fs::rename(&source_path, &destination_path).map_err(MoveFailure::from_io)
}

/// Runs resolved actions one by one in order. A failure never stops the batch;
/// a raised cancel flag skips everything not yet started.
pub fn execute_actions(
    root: &Path,
    policy: &SafetyPolicy,
    actions: &[ResolvedAction],
    cancel_flag: &AtomicBool,
) -> ExecutionReport {
    let mut outcomes = Vec::with_capacity(actions.len());

    for (index, resolved) in actions.iter().enumerate() {
        let source = resolved.action.source.as_str();
        let destination = resolved.final_destination();

        let outcome = match &resolved.disposition {
            Disposition::SkipExists => ExecutionOutcome::skipped(
                index,
                source,
                destination,
                ReasonCode::DestinationExists,
                "destination already exists",
            ),
            Disposition::SkipInvalid { reason } => {
                ExecutionOutcome::skipped(index, source, destination, ReasonCode::Invalid, reason)
            }
            Disposition::Execute | Disposition::RenameOnConflict { .. } => {
                if cancel_flag.load(Ordering::Relaxed) {
                    ExecutionOutcome::skipped(
                        index,
                        source,
                        destination,
                        ReasonCode::Cancelled,
                        "organization cancelled",
                    )
                } else {
                    match move_entry(root, policy, source, destination) {
                        Ok(()) => ExecutionOutcome::success(index, source, destination),
                        Err(failure) if failure.refused => ExecutionOutcome::skipped(
                            index,
                            source,
                            destination,
                            failure.reason,
                            failure.message,
                        ),
                        Err(failure) => ExecutionOutcome::failed(
                            index,
                            source,
                            destination,
                            failure.reason,
                            failure.message,
                        ),
                    }
                }
            }
        };

        match outcome.reason {
            None => info!(index, source, destination, "moved"),
            Some(reason) => warn!(
                index,
                source,
                destination,
                status = outcome.status.as_str(),
                reason = reason.as_str(),
                "action not applied"
            ),
        }
        outcomes.push(outcome);
    }

    ExecutionReport::from_outcomes(outcomes)
}
