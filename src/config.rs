use std::time::Duration;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::data::repository;
use crate::error::AppError;
use crate::services::ai_service::{AiProvider, AiSettings};
use crate::services::session_service::DEFAULT_HISTORY_TURNS;

pub const DEFAULT_MAX_FILES: usize = 10_000;
pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 20;

pub const KEY_ON_CONFLICT: &str = "on_conflict";
pub const KEY_DENY_LIST_ADDITIONS: &str = "deny_list_additions";
pub const KEY_MAX_FILES: &str = "max_files";
pub const KEY_RECURSIVE: &str = "recursive";
pub const KEY_HISTORY_TURNS: &str = "history_turns";
pub const KEY_AI_TIMEOUT_SECS: &str = "ai_timeout_secs";
pub const KEY_AI_PROVIDER: &str = "ai_provider";
pub const KEY_AI_MODEL: &str = "ai_model";
pub const KEY_AI_BASE_URL: &str = "ai_base_url";

pub const PIPELINE_SETTING_KEYS: &[&str] = &[
    KEY_ON_CONFLICT,
    KEY_DENY_LIST_ADDITIONS,
    KEY_MAX_FILES,
    KEY_RECURSIVE,
    KEY_HISTORY_TURNS,
    KEY_AI_TIMEOUT_SECS,
    KEY_AI_PROVIDER,
    KEY_AI_MODEL,
    KEY_AI_BASE_URL,
];

/// What to do when a destination is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnConflict {
    #[default]
    Skip,
    Rename,
}

impl OnConflict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Rename => "rename",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "rename" => Some(Self::Rename),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub on_conflict: OnConflict,
    pub deny_list_additions: Vec<String>,
    pub max_files: usize,
    /// Descend into subdirectories when scanning. Off by default.
    pub recursive: bool,
    pub history_turns: usize,
    pub ai_timeout_secs: u64,
    pub ai: AiSettings,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            on_conflict: OnConflict::Skip,
            deny_list_additions: Vec::new(),
            max_files: DEFAULT_MAX_FILES,
            recursive: false,
            history_turns: DEFAULT_HISTORY_TURNS,
            ai_timeout_secs: DEFAULT_AI_TIMEOUT_SECS,
            ai: AiSettings::default(),
            api_key: None,
        }
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u64, AppError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(AppError::General(format!(
            "Setting '{key}' must be a positive integer, got '{value}'"
        ))),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AppError::General(format!(
            "Setting '{key}' must be true or false, got '{value}'"
        ))),
    }
}

fn optional_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl PipelineConfig {
    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }

    /// Applies one stored setting. Unknown keys are ignored.
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Result<(), AppError> {
        match key {
            KEY_ON_CONFLICT => {
                self.on_conflict = OnConflict::parse(value).ok_or_else(|| {
                    AppError::General(format!(
                        "Setting '{key}' must be 'skip' or 'rename', got '{value}'"
                    ))
                })?;
            }
            KEY_DENY_LIST_ADDITIONS => {
                let entries: Vec<String> = serde_json::from_str(value)?;
                self.deny_list_additions = entries
                    .into_iter()
                    .filter(|entry| !entry.trim().is_empty())
                    .collect();
            }
            KEY_MAX_FILES => self.max_files = parse_positive(key, value)? as usize,
            KEY_RECURSIVE => self.recursive = parse_flag(key, value)?,
            KEY_HISTORY_TURNS => self.history_turns = parse_positive(key, value)? as usize,
            KEY_AI_TIMEOUT_SECS => self.ai_timeout_secs = parse_positive(key, value)?,
            KEY_AI_PROVIDER => {
                self.ai.provider = AiProvider::parse(value).ok_or_else(|| {
                    AppError::General(format!("Unknown AI provider '{value}'"))
                })?;
            }
            KEY_AI_MODEL => self.ai.model = optional_text(value),
            KEY_AI_BASE_URL => self.ai.base_url = optional_text(value),
            _ => {}
        }
        Ok(())
    }

    /// Defaults overlaid with whatever the settings table holds. The API key
    /// comes from the caller's credential store and is never read from the table.
    pub fn load(conn: &Connection, api_key: Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();
        for key in PIPELINE_SETTING_KEYS {
            if let Some(value) = repository::get_setting(conn, key)? {
                config.apply_setting(key, &value)?;
            }
        }
        config.api_key = api_key.filter(|k| !k.trim().is_empty());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::migrations::run_migrations;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.on_conflict, OnConflict::Skip);
        assert_eq!(config.max_files, 10_000);
        assert!(!config.recursive);
        assert_eq!(config.history_turns, 3);
        assert_eq!(config.ai_timeout(), Duration::from_secs(20));
        assert_eq!(config.ai.provider, AiProvider::Claude);
    }

    #[test]
    fn load_overlays_stored_settings() {
        let conn = setup_db();
        repository::set_setting(&conn, KEY_ON_CONFLICT, "rename").unwrap();
        repository::set_setting(&conn, KEY_DENY_LIST_ADDITIONS, r#"["/srv/private", ""]"#)
            .unwrap();
        repository::set_setting(&conn, KEY_AI_PROVIDER, "glm").unwrap();
        repository::set_setting(&conn, KEY_AI_MODEL, "  ").unwrap();
        repository::set_setting(&conn, KEY_RECURSIVE, "true").unwrap();

        let config = PipelineConfig::load(&conn, Some("sk-test".to_string())).unwrap();
        assert_eq!(config.on_conflict, OnConflict::Rename);
        assert!(config.recursive);
        assert_eq!(config.deny_list_additions, vec!["/srv/private".to_string()]);
        assert_eq!(config.ai.provider, AiProvider::Glm);
        assert_eq!(config.ai.model, None);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = PipelineConfig::default();
        assert!(config.apply_setting(KEY_ON_CONFLICT, "overwrite").is_err());
        assert!(config.apply_setting(KEY_MAX_FILES, "0").is_err());
        assert!(config.apply_setting(KEY_RECURSIVE, "sometimes").is_err());
        assert!(config.apply_setting(KEY_AI_TIMEOUT_SECS, "soon").is_err());
        assert!(config.apply_setting(KEY_DENY_LIST_ADDITIONS, "/not/json").is_err());
        assert!(config.apply_setting("theme", "dark").is_ok());
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn api_key_is_not_serialized() {
        let config = PipelineConfig {
            api_key: Some("secret".to_string()),
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
