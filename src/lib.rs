pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod models;
pub mod safety;
pub(crate) mod scope_path;
pub mod services;
pub mod state;

use std::path::Path;
use std::time::Duration;

use config::PipelineConfig;
use data::migrations;
use error::AppError;
use state::AppState;

fn init_db(db_path: &Path) -> Result<rusqlite::Connection, AppError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = rusqlite::Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

/// Opens (or creates) the database at `db_path` and builds the shared state
/// with a configuration the caller already resolved.
pub fn init(db_path: &Path, config: PipelineConfig) -> Result<AppState, AppError> {
    let conn = init_db(db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");
    Ok(AppState::new(conn, config))
}

/// Like [`init`], but the configuration is read from the settings table.
pub fn init_from_settings(db_path: &Path, api_key: Option<String>) -> Result<AppState, AppError> {
    let conn = init_db(db_path)?;
    let config = PipelineConfig::load(&conn, api_key)?;
    tracing::info!(
        db = %db_path.display(),
        on_conflict = config.on_conflict.as_str(),
        provider = config.ai.provider.as_str(),
        "configuration loaded"
    );
    Ok(AppState::new(conn, config))
}

/// Default database location in the platform data directory.
pub fn default_db_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("", "", "freeu").map(|dirs| dirs.data_dir().join("freeu.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OnConflict, KEY_ON_CONFLICT};

    #[test]
    fn init_creates_database_and_reads_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested/freeu.db");

        let state = init(&db_path, PipelineConfig::default()).unwrap();
        commands::settings_commands::set_setting(&state, KEY_ON_CONFLICT, "rename").unwrap();
        drop(state);

        let reloaded = init_from_settings(&db_path, None).unwrap();
        assert_eq!(reloaded.config.on_conflict, OnConflict::Rename);
        assert!(db_path.exists());
    }
}
