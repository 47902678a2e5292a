use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{info, warn};

use crate::data::repository;
use crate::error::AppError;
use crate::models::action::ResolvedAction;
use crate::models::file_entry::FileEntry;
use crate::models::outcome::ExecutionReport;
use crate::services::ai_service::PlanModel;
use crate::services::scan_service::{self, ScanOptions, ScanSummary};
use crate::services::session_service::Turn;
use crate::services::{
    conflict_service, file_service, plan_service, prompt_service, undo_service,
};
use crate::state::{AppState, PendingPlan};

pub const PLAN_ENDPOINT: &str = "organize/plan";
pub const APPLY_ENDPOINT: &str = "organize/apply";
pub const DECLINE_ENDPOINT: &str = "organize/decline";
pub const UNDO_ENDPOINT: &str = "organize/undo";

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// What the UI shows before the user confirms: the files the model saw and
/// the fate of every proposed action.
#[derive(Debug, Clone, Serialize)]
pub struct PlanPreview {
    pub plan_id: Option<String>,
    pub root: String,
    pub visible_files: Vec<FileEntry>,
    pub summary: ScanSummary,
    pub actions: Vec<ResolvedAction>,
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

pub fn is_organize_cancelled(cancel_flag: &AtomicBool) -> bool {
    cancel_flag.load(Ordering::Relaxed)
}

fn summarize_organize_error(error_message: &str, max_chars: usize) -> String {
    let sanitized = error_message.replace(['\n', '\r'], " ");
    let mut iter = sanitized.chars();
    let mut out = String::new();
    for _ in 0..max_chars {
        let Some(ch) = iter.next() else {
            return out;
        };
        out.push(ch);
    }
    if iter.next().is_some() {
        out.push_str("...");
    }
    out
}

fn build_organize_audit_summary(event: &OrganizeTelemetryEvent<'_>) -> String {
    let mut parts = vec![
        format!("operation={}", event.operation),
        format!("outcome={}", event.outcome),
        format!("session={}", event.session_id),
    ];

    if let Some(actions) = event.action_count {
        parts.push(format!("actions={actions}"));
    }
    if let Some(failed) = event.failed_count {
        parts.push(format!("failed={failed}"));
    }
    if let Some(kind) = event.error_kind {
        parts.push(format!("error_kind={kind}"));
    }
    if let Some(message) = event.error_message {
        parts.push(format!("error={}", summarize_organize_error(message, 120)));
    }

    parts.join(" ")
}

pub struct OrganizeTelemetryEvent<'a> {
    pub endpoint: &'a str,
    pub operation: &'a str,
    pub outcome: &'a str,
    pub session_id: &'a str,
    pub action_count: Option<usize>,
    pub failed_count: Option<usize>,
    pub error_kind: Option<&'a str>,
    pub error_message: Option<&'a str>,
}

impl<'a> OrganizeTelemetryEvent<'a> {
    fn ok(endpoint: &'a str, operation: &'a str, session_id: &'a str) -> Self {
        Self {
            endpoint,
            operation,
            outcome: "ok",
            session_id,
            action_count: None,
            failed_count: None,
            error_kind: None,
            error_message: None,
        }
    }

    fn error(
        endpoint: &'a str,
        operation: &'a str,
        session_id: &'a str,
        err: &'a AppError,
        message: &'a str,
    ) -> Self {
        Self {
            outcome: if matches!(err, AppError::Cancelled) {
                "cancelled"
            } else {
                "error"
            },
            error_kind: Some(err.kind()),
            error_message: Some(message),
            ..Self::ok(endpoint, operation, session_id)
        }
    }
}

pub fn record_organize_telemetry(state: &AppState, event: OrganizeTelemetryEvent<'_>) {
    let summary = build_organize_audit_summary(&event);

    {
        let conn = state.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = repository::insert_audit_log(&conn, event.endpoint, Some(&summary)) {
            warn!(error = %e, "failed to write audit log");
        }
    }

    if event.outcome == "error" {
        warn!(endpoint = event.endpoint, "{summary}");
    } else {
        info!(endpoint = event.endpoint, "{summary}");
    }
}

fn record_failure(state: &AppState, endpoint: &str, operation: &str, session_id: &str, err: &AppError) {
    let message = err.to_string();
    record_organize_telemetry(
        state,
        OrganizeTelemetryEvent::error(endpoint, operation, session_id, err, &message),
    );
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

async fn build_plan<M: PlanModel>(
    state: &AppState,
    model: &M,
    session_id: &str,
    root: &Path,
    instruction: &str,
) -> Result<PlanPreview, AppError> {
    let cancel_flag = state.reset_organize_cancel_flag(session_id);

    let snapshot = scan_service::scan(root, &state.policy, &ScanOptions::from(&state.config))?;
    let visible = snapshot.visible_files();
    let summary = scan_service::summarize(&visible);
    let request = state.with_session(session_id, |session| {
        prompt_service::build_request(instruction, &visible, &session.context)
    })?;
    info!(
        root = %snapshot.root.display(),
        visible = visible.len(),
        "requesting organization plan"
    );

    let proposed = plan_service::request_plan(
        model,
        &request,
        cancel_flag.clone(),
        state.config.ai_timeout(),
    )
    .await?;
    if is_organize_cancelled(&cancel_flag) {
        return Err(AppError::Cancelled);
    }

    let checked = plan_service::check_against_snapshot(proposed.clone(), &snapshot);
    let resolved = conflict_service::resolve_conflicts(
        checked,
        &snapshot.root,
        &state.policy,
        state.config.on_conflict,
    );

    let instruction = instruction.trim().to_string();
    let plan_id = if proposed.is_empty() {
        state.with_session(session_id, |session| {
            session.pending = None;
            session.context.push(Turn {
                instruction,
                actions: Vec::new(),
                outcomes: Vec::new(),
                declined: false,
            });
        });
        None
    } else {
        let plan_id = uuid::Uuid::new_v4().to_string();
        let pending = PendingPlan {
            plan_id: plan_id.clone(),
            root: snapshot.root.clone(),
            instruction,
            proposed,
            resolved: resolved.clone(),
        };
        state.with_session(session_id, |session| session.pending = Some(pending));
        Some(plan_id)
    };

    Ok(PlanPreview {
        plan_id,
        root: snapshot.root.to_string_lossy().to_string(),
        visible_files: visible.into_iter().cloned().collect(),
        summary,
        actions: resolved,
    })
}

/// Scan, ask the model, validate and resolve. Nothing on disk changes here.
pub async fn run_plan_pipeline<M: PlanModel>(
    state: &AppState,
    model: &M,
    session_id: &str,
    root: &Path,
    instruction: &str,
) -> Result<PlanPreview, AppError> {
    state.open_session(session_id);
    let result = build_plan(state, model, session_id, root, instruction).await;
    state.clear_organize_cancel_flag(session_id);

    match &result {
        Ok(preview) => record_organize_telemetry(
            state,
            OrganizeTelemetryEvent {
                action_count: Some(preview.actions.len()),
                ..OrganizeTelemetryEvent::ok(PLAN_ENDPOINT, "plan", session_id)
            },
        ),
        Err(err) => record_failure(state, PLAN_ENDPOINT, "plan", session_id, err),
    }
    result
}

// ---------------------------------------------------------------------------
// Apply / decline
// ---------------------------------------------------------------------------

fn take_pending(state: &AppState, session_id: &str, plan_id: &str) -> Result<PendingPlan, AppError> {
    state
        .with_session(session_id, |session| match &session.pending {
            Some(pending) if pending.plan_id == plan_id => session.pending.take(),
            _ => None,
        })
        .ok_or_else(|| AppError::General(format!("No pending plan with id {plan_id}")))
}

fn persist_outcomes(state: &AppState, session_id: &str, pending: &PendingPlan, report: &ExecutionReport) {
    let conn = state.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let root_path = pending.root.to_string_lossy();
    for outcome in &report.outcomes {
        if let Err(e) = repository::insert_execution_outcome(
            &conn,
            session_id,
            &pending.plan_id,
            &root_path,
            outcome,
        ) {
            warn!(error = %e, index = outcome.index, "failed to write execution log");
        }
    }
    if let Err(e) = undo_service::record_moves(&conn, &pending.plan_id, &pending.root, &report.outcomes) {
        warn!(error = %e, plan = %pending.plan_id, "failed to record undo entries");
    }
}

fn apply_plan(state: &AppState, session_id: &str, plan_id: &str) -> Result<ExecutionReport, AppError> {
    let pending = take_pending(state, session_id, plan_id)?;
    let cancel_flag = state.reset_organize_cancel_flag(session_id);

    let report = state.with_root_lock(&pending.root, || {
        let report =
            file_service::execute_actions(&pending.root, &state.policy, &pending.resolved, &cancel_flag);
        persist_outcomes(state, session_id, &pending, &report);
        report
    });
    info!(plan = %pending.plan_id, summary = %report.summary(), "plan applied");

    state.with_session(session_id, |session| {
        session.context.push(Turn {
            instruction: pending.instruction,
            actions: pending.proposed,
            outcomes: report.outcomes.clone(),
            declined: false,
        });
    });
    Ok(report)
}

/// Executes a previously previewed plan. Every action gets an outcome; the
/// batch never aborts part way except through cancellation.
pub fn run_apply_pipeline(
    state: &AppState,
    session_id: &str,
    plan_id: &str,
) -> Result<ExecutionReport, AppError> {
    let result = apply_plan(state, session_id, plan_id);
    state.clear_organize_cancel_flag(session_id);

    match &result {
        Ok(report) => record_organize_telemetry(
            state,
            OrganizeTelemetryEvent {
                action_count: Some(report.outcomes.len()),
                failed_count: Some(report.failed),
                ..OrganizeTelemetryEvent::ok(APPLY_ENDPOINT, "apply", session_id)
            },
        ),
        Err(err) => record_failure(state, APPLY_ENDPOINT, "apply", session_id, err),
    }
    result
}

pub fn decline_plan(state: &AppState, session_id: &str, plan_id: &str) -> Result<(), AppError> {
    let pending = take_pending(state, session_id, plan_id)?;
    let action_count = pending.proposed.len();
    state.with_session(session_id, |session| {
        session.context.push(Turn {
            instruction: pending.instruction,
            actions: pending.proposed,
            outcomes: Vec::new(),
            declined: true,
        });
    });
    record_organize_telemetry(
        state,
        OrganizeTelemetryEvent {
            action_count: Some(action_count),
            ..OrganizeTelemetryEvent::ok(DECLINE_ENDPOINT, "decline", session_id)
        },
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Undo
// ---------------------------------------------------------------------------

fn undo_plan(state: &AppState, root: &Path) -> Result<undo_service::UndoReport, AppError> {
    let root = state.policy.check_root(root)?;
    state.with_root_lock(&root, || {
        let conn = state.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        undo_service::undo_last_apply(&conn, &state.policy, &root)
    })
}

/// Reverts the most recent applied plan under `root`, holding the same root
/// lock an apply would.
pub fn run_undo_pipeline(
    state: &AppState,
    session_id: &str,
    root: &Path,
) -> Result<undo_service::UndoReport, AppError> {
    let result = undo_plan(state, root);

    match &result {
        Ok(undo) => record_organize_telemetry(
            state,
            OrganizeTelemetryEvent {
                action_count: Some(undo.report.outcomes.len()),
                failed_count: Some(undo.report.failed),
                ..OrganizeTelemetryEvent::ok(UNDO_ENDPOINT, "undo", session_id)
            },
        ),
        Err(err) => record_failure(state, UNDO_ENDPOINT, "undo", session_id, err),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OnConflict, PipelineConfig};
    use crate::data::migrations::run_migrations;
    use crate::models::action::Disposition;
    use crate::models::outcome::{OutcomeStatus, ReasonCode};
    use crate::services::ai_service::testing::{ScriptedModel, StalledModel};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state(config: PipelineConfig) -> AppState {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        AppState::new(conn, config)
    }

    fn sandbox() -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        fs::write(root.join("photo.jpg"), b"jpg").unwrap();
        fs::write(root.join("doc.pdf"), b"pdf").unwrap();
        fs::write(root.join(".hidden"), b"secret").unwrap();
        (tmp, root)
    }

    fn reply(pairs: &[(&str, &str)]) -> Result<String, AppError> {
        let actions = pairs
            .iter()
            .map(|(source, destination)| {
                serde_json::json!({
                    "action_type": "move",
                    "source": source,
                    "destination": destination,
                    "reason": "sorting",
                })
            })
            .collect::<Vec<_>>();
        Ok(format!(
            "```json\n{}\n```",
            serde_json::json!({ "actions": actions })
        ))
    }

    #[test]
    fn build_organize_audit_summary_includes_compact_error_context() {
        let err = AppError::General("line one\nline two".to_string());
        let message = err.to_string();
        let event = OrganizeTelemetryEvent {
            action_count: Some(7),
            ..OrganizeTelemetryEvent::error(APPLY_ENDPOINT, "apply", "session-123", &err, &message)
        };
        let summary = build_organize_audit_summary(&event);
        assert_eq!(
            summary,
            "operation=apply outcome=error session=session-123 actions=7 error_kind=other error=line one line two"
        );
    }

    #[test]
    fn summarize_organize_error_truncates_long_messages() {
        let long = "x".repeat(200);
        let summary = summarize_organize_error(&long, 10);
        assert_eq!(summary, "xxxxxxxxxx...");
    }

    #[tokio::test]
    async fn images_to_pictures_scenario() {
        let (_tmp, root) = sandbox();
        let state = test_state(PipelineConfig::default());
        let model = ScriptedModel::new(vec![reply(&[("photo.jpg", "Pictures/photo.jpg")])]);

        let preview = run_plan_pipeline(&state, &model, "s1", &root, "move images to Pictures")
            .await
            .unwrap();

        let visible: Vec<&str> = preview
            .visible_files
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(visible, vec!["doc.pdf", "photo.jpg"]);
        assert!(!model.requests()[0].user.contains(".hidden"));

        assert_eq!(preview.actions.len(), 1);
        assert_eq!(preview.actions[0].action.source, "photo.jpg");
        assert_eq!(preview.actions[0].final_destination(), "Pictures/photo.jpg");
        assert_eq!(preview.actions[0].disposition, Disposition::Execute);
        assert!(root.join("photo.jpg").exists());

        let plan_id = preview.plan_id.unwrap();
        let report = run_apply_pipeline(&state, "s1", &plan_id).unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(root.join("Pictures/photo.jpg").exists());

        let conn = state.db.lock().unwrap();
        let log = repository::list_execution_log(&conn, "s1").unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, "success");
    }

    #[tokio::test]
    async fn traversal_destination_is_skip_invalid_and_untouched() {
        let (_tmp, root) = sandbox();
        let state = test_state(PipelineConfig::default());
        let model = ScriptedModel::new(vec![reply(&[
            ("doc.pdf", "../../etc/passwd"),
            ("photo.jpg", "Pictures/photo.jpg"),
        ])]);

        let preview = run_plan_pipeline(&state, &model, "s1", &root, "be sneaky")
            .await
            .unwrap();
        assert!(matches!(
            preview.actions[0].disposition,
            Disposition::SkipInvalid { .. }
        ));
        assert_eq!(preview.actions[1].disposition, Disposition::Execute);

        let report = run_apply_pipeline(&state, "s1", preview.plan_id.as_deref().unwrap()).unwrap();
        assert_eq!(report.outcomes[0].status, OutcomeStatus::Skipped);
        assert_eq!(report.outcomes[0].reason, Some(ReasonCode::Invalid));
        assert_eq!(report.outcomes[1].status, OutcomeStatus::Success);
        assert!(root.join("doc.pdf").exists());
    }

    #[tokio::test]
    async fn existing_destination_is_skipped_not_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        fs::write(root.join("report.pdf"), b"new").unwrap();
        fs::create_dir(root.join("Docs")).unwrap();
        fs::write(root.join("Docs/report.pdf"), b"old").unwrap();

        let state = test_state(PipelineConfig {
            on_conflict: OnConflict::Skip,
            ..PipelineConfig::default()
        });
        let model = ScriptedModel::new(vec![reply(&[("report.pdf", "Docs/report.pdf")])]);
        let preview = run_plan_pipeline(&state, &model, "s1", &root, "file the report")
            .await
            .unwrap();
        assert_eq!(preview.actions[0].disposition, Disposition::SkipExists);

        let report = run_apply_pipeline(&state, "s1", preview.plan_id.as_deref().unwrap()).unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(fs::read(root.join("Docs/report.pdf")).unwrap(), b"old");
        assert_eq!(fs::read(root.join("report.pdf")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn next_request_carries_previous_turn() {
        let (_tmp, root) = sandbox();
        let state = test_state(PipelineConfig::default());
        let model = ScriptedModel::new(vec![
            reply(&[("photo.jpg", "Pictures/photo.jpg")]),
            reply(&[("doc.pdf", "Docs/doc.pdf")]),
        ]);

        let first = run_plan_pipeline(&state, &model, "s1", &root, "move images to Pictures")
            .await
            .unwrap();
        decline_plan(&state, "s1", first.plan_id.as_deref().unwrap()).unwrap();

        run_plan_pipeline(&state, &model, "s1", &root, "then just the pdf")
            .await
            .unwrap();
        let second_request = &model.requests()[1];
        assert!(second_request.user.contains("move images to Pictures"));
        assert!(second_request.user.contains("declined by the user"));
        assert!(root.join("photo.jpg").exists());
    }

    #[tokio::test]
    async fn empty_plan_has_no_pending_id() {
        let (_tmp, root) = sandbox();
        let state = test_state(PipelineConfig::default());
        let model = ScriptedModel::new(vec![Ok("{\"actions\": []}".to_string())]);

        let preview = run_plan_pipeline(&state, &model, "s1", &root, "delete everything")
            .await
            .unwrap();
        assert!(preview.plan_id.is_none());
        assert!(preview.actions.is_empty());
        assert_eq!(state.with_session("s1", |s| s.context.len()), 1);
    }

    #[tokio::test]
    async fn unparseable_replies_surface_plan_failure_and_audit() {
        let (_tmp, root) = sandbox();
        let state = test_state(PipelineConfig::default());
        let model = ScriptedModel::new(vec![
            Ok("I'd rather not.".to_string()),
            Ok("Still no.".to_string()),
        ]);

        let err = run_plan_pipeline(&state, &model, "s1", &root, "tidy up")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "plan_generation_failed");
        assert_eq!(err.raw_response(), Some("Still no."));

        let conn = state.db.lock().unwrap();
        let audit = repository::list_audit_log(&conn, 5).unwrap();
        assert!(audit[0]
            .summary
            .as_deref()
            .unwrap()
            .contains("error_kind=plan_generation_failed"));
    }

    #[tokio::test]
    async fn invalid_instruction_and_unreadable_root_abort() {
        let (_tmp, root) = sandbox();
        let state = test_state(PipelineConfig::default());
        let model = ScriptedModel::new(Vec::new());

        let err = run_plan_pipeline(&state, &model, "s1", &root, "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInstruction(_)));

        let err = run_plan_pipeline(&state, &model, "s1", &root.join("missing"), "tidy")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DirectoryUnreadable { .. }));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn cancelling_a_pending_plan_request() {
        let (_tmp, root) = sandbox();
        let mut config = PipelineConfig::default();
        config.ai_timeout_secs = 30;
        let state = Arc::new(test_state(config));

        let canceller = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            canceller.mark_organize_cancelled(Some("s1"));
        });

        let err = run_plan_pipeline(&state, &StalledModel, "s1", &root, "tidy")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        assert!(state.with_session("s1", |s| s.pending.is_none()));
    }

    #[tokio::test]
    async fn apply_requires_matching_plan_id() {
        let (_tmp, root) = sandbox();
        let state = test_state(PipelineConfig::default());
        let model = ScriptedModel::new(vec![reply(&[("photo.jpg", "Pictures/photo.jpg")])]);
        let preview = run_plan_pipeline(&state, &model, "s1", &root, "images")
            .await
            .unwrap();

        assert!(run_apply_pipeline(&state, "s1", "not-the-plan").is_err());
        let plan_id = preview.plan_id.unwrap();
        run_apply_pipeline(&state, "s1", &plan_id).unwrap();
        assert!(run_apply_pipeline(&state, "s1", &plan_id).is_err());
    }

    #[tokio::test]
    async fn undo_reverts_the_last_applied_plan() {
        let (_tmp, root) = sandbox();
        let state = test_state(PipelineConfig::default());
        let model = ScriptedModel::new(vec![reply(&[
            ("photo.jpg", "Pictures/photo.jpg"),
            ("doc.pdf", "Docs/doc.pdf"),
        ])]);
        let preview = run_plan_pipeline(&state, &model, "s1", &root, "sort")
            .await
            .unwrap();
        run_apply_pipeline(&state, "s1", preview.plan_id.as_deref().unwrap()).unwrap();
        assert!(!root.join("photo.jpg").exists());

        let undo = run_undo_pipeline(&state, "s1", &root).unwrap();
        assert_eq!(undo.report.succeeded, 2);
        assert!(root.join("photo.jpg").exists());
        assert!(root.join("doc.pdf").exists());
    }

    #[tokio::test]
    async fn concurrent_applies_on_one_root_never_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        fs::write(root.join("draft.txt"), b"from session a").unwrap();
        fs::write(root.join("final.txt"), b"from session b").unwrap();

        let state = test_state(PipelineConfig::default());
        let model_a = ScriptedModel::new(vec![reply(&[("draft.txt", "Docs/report.txt")])]);
        let model_b = ScriptedModel::new(vec![reply(&[("final.txt", "Docs/report.txt")])]);
        let plan_a = run_plan_pipeline(&state, &model_a, "a", &root, "file the draft")
            .await
            .unwrap()
            .plan_id
            .unwrap();
        let plan_b = run_plan_pipeline(&state, &model_b, "b", &root, "file the final")
            .await
            .unwrap()
            .plan_id
            .unwrap();

        let (report_a, report_b) = std::thread::scope(|scope| {
            let a = scope.spawn(|| run_apply_pipeline(&state, "a", &plan_a).unwrap());
            let b = scope.spawn(|| run_apply_pipeline(&state, "b", &plan_b).unwrap());
            (a.join().unwrap(), b.join().unwrap())
        });

        let outcomes = [&report_a.outcomes[0], &report_b.outcomes[0]];
        let winners = outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Success)
            .count();
        assert_eq!(winners, 1);
        let loser = outcomes
            .iter()
            .find(|o| o.status != OutcomeStatus::Success)
            .unwrap();
        assert_eq!(loser.status, OutcomeStatus::Failed);
        assert_eq!(loser.reason, Some(ReasonCode::DestinationExists));

        let landed = fs::read(root.join("Docs/report.txt")).unwrap();
        let (kept_source, expected) = if report_a.succeeded == 1 {
            ("final.txt", b"from session a".as_slice())
        } else {
            ("draft.txt", b"from session b".as_slice())
        };
        assert_eq!(landed, expected);
        assert!(root.join(kept_source).exists());
        assert!(state.root_locks.lock().unwrap().is_empty());
    }
}
