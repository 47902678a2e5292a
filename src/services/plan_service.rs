use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::action::{ActionType, CheckedAction, ProposedAction};
use crate::safety;
use crate::services::ai_service::PlanModel;
use crate::services::prompt_service::PlanRequest;
use crate::services::scan_service::Snapshot;

pub const MAX_PLAN_ATTEMPTS: usize = 2;
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanParseError {
    #[error("no JSON object found in the reply")]
    NoJson,
    #[error("reply is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("top-level JSON value is not an object")]
    NotAnObject,
    #[error("\"actions\" is not an array")]
    ActionsNotArray,
    #[error("action {index} is invalid: {detail}")]
    InvalidAction { index: usize, detail: String },
}

#[derive(Deserialize)]
struct RawAction {
    action_type: String,
    source: String,
    destination: String,
    reason: String,
}

pub fn extract_json_payload(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + "```json".len()..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        if let Some(newline) = rest.find('\n') {
            let body = &rest[newline + 1..];
            if let Some(end) = body.find("```") {
                return Some(body[..end].trim().to_string());
            }
        }
    }

    // First object in the prose that is valid JSON on its own; one carrying
    // "actions" wins over an earlier unrelated object.
    let mut first_object: Option<&str> = None;
    for (start, _) in trimmed.match_indices('{') {
        let candidate = &trimmed[start..];
        let mut stream =
            serde_json::Deserializer::from_str(candidate).into_iter::<serde_json::Value>();
        if let Some(Ok(serde_json::Value::Object(object))) = stream.next() {
            let payload = &candidate[..stream.byte_offset()];
            if object.contains_key("actions") {
                return Some(payload.to_string());
            }
            first_object.get_or_insert(payload);
        }
    }
    if let Some(payload) = first_object {
        return Some(payload.to_string());
    }

    // Nothing parses; keep the widest brace span so the parse error says why.
    let first = trimmed.find('{')?;
    let last = trimmed.rfind('}')?;
    (first <= last).then(|| trimmed[first..=last].to_string())
}

/// Parses model output into typed actions. Shape problems fail the whole reply;
/// whether the paths make sense is left to [`check_against_snapshot`].
pub fn parse_plan_response(text: &str) -> Result<Vec<ProposedAction>, PlanParseError> {
    let payload = extract_json_payload(text).ok_or(PlanParseError::NoJson)?;
    let value: serde_json::Value =
        serde_json::from_str(&payload).map_err(|e| PlanParseError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(PlanParseError::NotAnObject)?;

    let items = match object.get("actions") {
        None | Some(serde_json::Value::Null) => return Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => items,
        Some(_) => return Err(PlanParseError::ActionsNotArray),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let raw = RawAction::deserialize(item).map_err(|e| PlanParseError::InvalidAction {
                index,
                detail: e.to_string(),
            })?;
            let action_type = raw
                .action_type
                .parse::<ActionType>()
                .map_err(|detail| PlanParseError::InvalidAction { index, detail })?;
            Ok(ProposedAction {
                action_type,
                source: raw.source,
                destination: raw.destination,
                reason: raw.reason,
            })
        })
        .collect()
}

fn normalize_relative(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Checks each action against the listing it was planned from. Problems are
/// attached to the action rather than failing the plan.
pub fn check_against_snapshot(
    actions: Vec<ProposedAction>,
    snapshot: &Snapshot,
) -> Vec<CheckedAction> {
    let visible: HashSet<&str> = snapshot
        .visible_files()
        .into_iter()
        .map(|entry| entry.relative_path.as_str())
        .collect();
    let mut claimed_sources: HashSet<String> = HashSet::new();

    actions
        .into_iter()
        .map(|mut action| {
            let violation = (|| {
                safety::validate_relative(&action.source)?;
                safety::validate_relative(&action.destination)?;

                let source = normalize_relative(&action.source);
                let mut destination = normalize_relative(&action.destination);
                if action.destination.ends_with('/') || action.destination.ends_with('\\') {
                    let file_name = source.rsplit('/').next().unwrap_or(&source);
                    destination = format!("{destination}/{file_name}");
                }
                action.source = source;
                action.destination = destination;

                if !visible.contains(action.source.as_str()) {
                    return Err(format!(
                        "source is not a visible file in this directory: {}",
                        action.source
                    ));
                }
                if action.destination.is_empty() {
                    return Err("destination is empty".to_string());
                }
                if action.source == action.destination {
                    return Err("source and destination are the same".to_string());
                }
                if !claimed_sources.insert(action.source.clone()) {
                    return Err(format!(
                        "source already used by an earlier action: {}",
                        action.source
                    ));
                }
                Ok(())
            })()
            .err();

            if let Some(reason) = &violation {
                warn!(source = %action.source, destination = %action.destination, reason = %reason, "action rejected");
            }
            CheckedAction { action, violation }
        })
        .collect()
}

/// Awaits `call` while polling the cancel flag and a deadline.
pub async fn complete_with_cancellation<F>(
    call: F,
    cancel_flag: &AtomicBool,
    timeout: Duration,
) -> Result<String, AppError>
where
    F: Future<Output = Result<String, AppError>>,
{
    let started = tokio::time::Instant::now();
    tokio::pin!(call);

    loop {
        if cancel_flag.load(Ordering::Relaxed) {
            return Err(AppError::Cancelled);
        }
        tokio::select! {
            result = &mut call => return result,
            _ = tokio::time::sleep(CANCEL_POLL_INTERVAL) => {
                if cancel_flag.load(Ordering::Relaxed) {
                    return Err(AppError::Cancelled);
                }
                if started.elapsed() >= timeout {
                    return Err(AppError::General(format!(
                        "model request timed out after {}s",
                        timeout.as_secs_f32()
                    )));
                }
            }
        }
    }
}

/// Asks the model for a plan, retrying once on an unusable reply or a failed call.
pub async fn request_plan<M: PlanModel>(
    model: &M,
    request: &PlanRequest,
    cancel_flag: Arc<AtomicBool>,
    timeout: Duration,
) -> Result<Vec<ProposedAction>, AppError> {
    let mut current = request.clone();
    let mut last_reason = String::new();
    let mut last_raw: Option<String> = None;

    for attempt in 1..=MAX_PLAN_ATTEMPTS {
        let reply =
            complete_with_cancellation(model.complete(&current), &cancel_flag, timeout).await;
        match reply {
            Ok(text) => match parse_plan_response(&text) {
                Ok(actions) => {
                    info!(attempt, actions = actions.len(), "plan parsed");
                    return Ok(actions);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "model reply could not be parsed");
                    last_reason = e.to_string();
                    last_raw = Some(text);
                    current = request.with_retry_note(&last_reason);
                }
            },
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(e) => {
                warn!(attempt, error = %e, kind = e.kind(), "model call failed");
                last_reason = e.to_string();
                current = request.clone();
            }
        }
    }

    Err(AppError::PlanGenerationFailed {
        reason: last_reason,
        raw_response: last_raw,
    })
}
