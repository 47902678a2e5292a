use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::AppError;
use crate::models::operation::OperationRecord;
use crate::models::outcome::ExecutionOutcome;

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>, AppError> {
    let value = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_settings(conn: &Connection) -> Result<Vec<(String, String)>, AppError> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionLogEntry {
    pub session_id: String,
    pub plan_id: String,
    pub root_path: String,
    pub action_index: usize,
    pub source: String,
    pub destination: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub executed_at: String,
}

pub fn insert_execution_outcome(
    conn: &Connection,
    session_id: &str,
    plan_id: &str,
    root_path: &str,
    outcome: &ExecutionOutcome,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO execution_log (session_id, plan_id, root_path, action_index, source, destination, status, reason, message, executed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            session_id,
            plan_id,
            root_path,
            outcome.index as i64,
            outcome.source,
            outcome.destination,
            outcome.status.as_str(),
            outcome.reason.map(|r| r.as_str()),
            outcome.message,
            outcome.executed_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_execution_log(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<ExecutionLogEntry>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT session_id, plan_id, root_path, action_index, source, destination, status, reason, message, executed_at
         FROM execution_log WHERE session_id = ?1 ORDER BY id ASC",
    )?;

    let entries = stmt
        .query_map(params![session_id], |row| {
            let index: i64 = row.get(3)?;
            Ok(ExecutionLogEntry {
                session_id: row.get(0)?,
                plan_id: row.get(1)?,
                root_path: row.get(2)?,
                action_index: index.max(0) as usize,
                source: row.get(4)?,
                destination: row.get(5)?,
                status: row.get(6)?,
                reason: row.get(7)?,
                message: row.get(8)?,
                executed_at: row.get(9)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(entries)
}

pub fn insert_operation(conn: &Connection, record: &OperationRecord) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO undo_log (operation_id, plan_id, root_path, source, destination, executed_at, undone)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.operation_id,
            record.plan_id,
            record.root_path,
            record.source,
            record.destination,
            record.executed_at,
            record.undone,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn latest_undoable_plan(conn: &Connection, root_path: &str) -> Result<Option<String>, AppError> {
    let plan_id = conn
        .query_row(
            "SELECT plan_id FROM undo_log WHERE root_path = ?1 AND undone = 0 ORDER BY id DESC LIMIT 1",
            params![root_path],
            |row| row.get(0),
        )
        .optional()?;
    Ok(plan_id)
}

/// Pending operations of a plan, newest first.
pub fn list_plan_operations(
    conn: &Connection,
    plan_id: &str,
) -> Result<Vec<OperationRecord>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT operation_id, plan_id, root_path, source, destination, executed_at, undone
         FROM undo_log WHERE plan_id = ?1 AND undone = 0 ORDER BY id DESC",
    )?;

    let records = stmt
        .query_map(params![plan_id], |row| {
            Ok(OperationRecord {
                operation_id: row.get(0)?,
                plan_id: row.get(1)?,
                root_path: row.get(2)?,
                source: row.get(3)?,
                destination: row.get(4)?,
                executed_at: row.get(5)?,
                undone: row.get(6)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(records)
}

pub fn mark_undone(conn: &Connection, operation_id: &str) -> Result<usize, AppError> {
    let count = conn.execute(
        "UPDATE undo_log SET undone = 1 WHERE operation_id = ?1",
        params![operation_id],
    )?;
    Ok(count)
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    pub endpoint: String,
    pub summary: Option<String>,
    pub created_at: String,
}

pub fn insert_audit_log(
    conn: &Connection,
    endpoint: &str,
    summary: Option<&str>,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO audit_log (endpoint, summary) VALUES (?1, ?2)",
        params![endpoint, summary],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_audit_log(conn: &Connection, limit: usize) -> Result<Vec<AuditLogEntry>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT endpoint, summary, created_at FROM audit_log ORDER BY id DESC LIMIT ?1",
    )?;
    let entries = stmt
        .query_map(params![limit as i64], |row| {
            Ok(AuditLogEntry {
                endpoint: row.get(0)?,
                summary: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(entries)
}
