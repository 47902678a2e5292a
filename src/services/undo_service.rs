use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::data::repository;
use crate::error::AppError;
use crate::models::operation::OperationRecord;
use crate::models::outcome::{ExecutionOutcome, ExecutionReport, OutcomeStatus};
use crate::safety::SafetyPolicy;
use crate::services::file_service;

#[derive(Debug, Clone, Serialize)]
pub struct UndoReport {
    pub plan_id: String,
    pub report: ExecutionReport,
}

/// Stores every successful move of a plan so the plan can be reverted later.
pub fn record_moves(
    conn: &Connection,
    plan_id: &str,
    root: &Path,
    outcomes: &[ExecutionOutcome],
) -> Result<usize, AppError> {
    let root_path = root.to_string_lossy();
    let mut recorded = 0;
    for outcome in outcomes.iter().filter(|o| o.status == OutcomeStatus::Success) {
        let record = OperationRecord {
            operation_id: uuid::Uuid::new_v4().to_string(),
            plan_id: plan_id.to_string(),
            root_path: root_path.to_string(),
            source: outcome.source.clone(),
            destination: outcome.destination.clone(),
            executed_at: outcome.executed_at.clone(),
            undone: false,
        };
        repository::insert_operation(conn, &record)?;
        recorded += 1;
    }
    Ok(recorded)
}

/// Moves the files of the most recent applied plan under `root` back where they
/// came from, newest move first. Moves that cannot be reverted stay recorded.
pub fn undo_last_apply(
    conn: &Connection,
    policy: &SafetyPolicy,
    root: &Path,
) -> Result<UndoReport, AppError> {
    let root_path = root.to_string_lossy();
    let plan_id = repository::latest_undoable_plan(conn, &root_path)?
        .ok_or_else(|| AppError::General("nothing to undo".to_string()))?;
    let operations = repository::list_plan_operations(conn, &plan_id)?;

    let mut outcomes = Vec::with_capacity(operations.len());
    for (index, op) in operations.iter().enumerate() {
        let outcome = match file_service::move_entry(root, policy, &op.destination, &op.source) {
            Ok(()) => {
                repository::mark_undone(conn, &op.operation_id)?;
                ExecutionOutcome::success(index, &op.destination, &op.source)
            }
            Err(failure) if failure.refused => ExecutionOutcome::skipped(
                index,
                &op.destination,
                &op.source,
                failure.reason,
                failure.message,
            ),
            Err(failure) => {
                warn!(operation = %op.operation_id, error = %failure.message, "undo move failed");
                ExecutionOutcome::failed(
                    index,
                    &op.destination,
                    &op.source,
                    failure.reason,
                    failure.message,
                )
            }
        };
        outcomes.push(outcome);
    }

    let report = ExecutionReport::from_outcomes(outcomes);
    info!(plan = %plan_id, summary = %report.summary(), "undo finished");
    Ok(UndoReport { plan_id, report })
}
