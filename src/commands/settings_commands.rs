use crate::config::PIPELINE_SETTING_KEYS;
use crate::data::repository::{self, AuditLogEntry};
use crate::error::AppError;
use crate::state::AppState;

const BLOCKED_SETTINGS_KEYS: &[&str] = &["api_key"];

fn ensure_accessible(key: &str, verb: &str) -> Result<(), AppError> {
    if BLOCKED_SETTINGS_KEYS.contains(&key) {
        return Err(AppError::General(format!(
            "Setting '{key}' cannot be {verb} via generic endpoint"
        )));
    }
    Ok(())
}

pub fn get_setting(state: &AppState, key: &str) -> Result<Option<String>, AppError> {
    ensure_accessible(key, "accessed")?;
    let conn = state.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    repository::get_setting(&conn, key)
}

/// Stores a setting. Pipeline keys are validated first; the new value is
/// picked up the next time the configuration is loaded.
pub fn set_setting(state: &AppState, key: &str, value: &str) -> Result<(), AppError> {
    ensure_accessible(key, "modified")?;
    if PIPELINE_SETTING_KEYS.contains(&key) {
        state.config.clone().apply_setting(key, value)?;
    }
    let conn = state.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    repository::set_setting(&conn, key, value)
}

pub fn list_settings(state: &AppState) -> Result<Vec<(String, String)>, AppError> {
    let conn = state.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let settings = repository::list_settings(&conn)?;
    Ok(settings
        .into_iter()
        .filter(|(key, _)| !BLOCKED_SETTINGS_KEYS.contains(&key.as_str()))
        .collect())
}

pub fn get_audit_log(state: &AppState, limit: Option<usize>) -> Result<Vec<AuditLogEntry>, AppError> {
    let conn = state.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    repository::list_audit_log(&conn, limit.unwrap_or(100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, KEY_MAX_FILES, KEY_ON_CONFLICT};
    use crate::data::migrations::run_migrations;

    fn test_state() -> AppState {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        AppState::new(conn, PipelineConfig::default())
    }

    #[test]
    fn api_key_is_never_readable_or_writable() {
        let state = test_state();
        assert!(get_setting(&state, "api_key").is_err());
        assert!(set_setting(&state, "api_key", "sk-test").is_err());
    }

    #[test]
    fn pipeline_keys_are_validated_before_storing() {
        let state = test_state();
        assert!(set_setting(&state, KEY_ON_CONFLICT, "overwrite").is_err());
        assert_eq!(get_setting(&state, KEY_ON_CONFLICT).unwrap(), None);

        set_setting(&state, KEY_ON_CONFLICT, "rename").unwrap();
        set_setting(&state, KEY_MAX_FILES, "500").unwrap();
        assert_eq!(
            get_setting(&state, KEY_ON_CONFLICT).unwrap().as_deref(),
            Some("rename")
        );

        let conn = state.db.lock().unwrap();
        let loaded = PipelineConfig::load(&conn, None).unwrap();
        assert_eq!(loaded.max_files, 500);
    }

    #[test]
    fn unrelated_keys_round_trip() {
        let state = test_state();
        set_setting(&state, "theme", "dark").unwrap();
        let all = list_settings(&state).unwrap();
        assert!(all.contains(&("theme".to_string(), "dark".to_string())));
    }
}
