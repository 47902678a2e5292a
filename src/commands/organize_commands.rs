use std::path::Path;

use crate::commands::organize_pipeline::{self, PlanPreview};
use crate::data::repository::{self, ExecutionLogEntry};
use crate::error::AppError;
use crate::models::outcome::ExecutionReport;
use crate::services::ai_service::{HttpPlanModel, PlanModel};
use crate::services::undo_service::UndoReport;
use crate::state::AppState;

pub fn new_organize_session(state: &AppState) -> String {
    let session_id = uuid::Uuid::new_v4().to_string();
    state.open_session(&session_id);
    session_id
}

/// Builds the HTTP model from the configured provider and injected key.
pub fn configured_model(state: &AppState) -> Result<HttpPlanModel, AppError> {
    let api_key = state.config.api_key.clone().unwrap_or_default();
    HttpPlanModel::new(state.config.ai.clone(), api_key, state.config.ai_timeout())
}

pub async fn send_organize_plan(
    state: &AppState,
    session_id: &str,
    root: &str,
    instruction: &str,
) -> Result<PlanPreview, AppError> {
    let model = configured_model(state)?;
    send_organize_plan_with(state, &model, session_id, root, instruction).await
}

pub async fn send_organize_plan_with<M: PlanModel>(
    state: &AppState,
    model: &M,
    session_id: &str,
    root: &str,
    instruction: &str,
) -> Result<PlanPreview, AppError> {
    organize_pipeline::run_plan_pipeline(state, model, session_id, Path::new(root), instruction)
        .await
}

pub fn send_organize_apply(
    state: &AppState,
    session_id: &str,
    plan_id: &str,
) -> Result<ExecutionReport, AppError> {
    organize_pipeline::run_apply_pipeline(state, session_id, plan_id)
}

pub fn decline_organize_plan(
    state: &AppState,
    session_id: &str,
    plan_id: &str,
) -> Result<(), AppError> {
    organize_pipeline::decline_plan(state, session_id, plan_id)
}

/// Raises the cancel flag of one session, or of every active one.
pub fn cancel_organize(state: &AppState, session_id: Option<&str>) {
    state.mark_organize_cancelled(session_id);
}

pub fn get_session_history(state: &AppState, session_id: &str) -> Vec<String> {
    state.with_session(session_id, |session| session.context.summaries())
}

pub fn get_execution_log(
    state: &AppState,
    session_id: &str,
) -> Result<Vec<ExecutionLogEntry>, AppError> {
    let conn = state.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    repository::list_execution_log(&conn, session_id)
}

pub fn undo_last_apply(
    state: &AppState,
    session_id: &str,
    root: &str,
) -> Result<UndoReport, AppError> {
    organize_pipeline::run_undo_pipeline(state, session_id, Path::new(root))
}

pub fn end_organize_session(state: &AppState, session_id: &str) -> bool {
    state.close_session(session_id)
}
