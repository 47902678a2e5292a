use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::models::action::{ProposedAction, ResolvedAction};
use crate::safety::SafetyPolicy;
use crate::services::session_service::SessionContext;

/// A plan shown to the user and waiting for confirm or decline.
#[derive(Debug, Clone, Serialize)]
pub struct PendingPlan {
    pub plan_id: String,
    pub root: PathBuf,
    pub instruction: String,
    pub proposed: Vec<ProposedAction>,
    pub resolved: Vec<ResolvedAction>,
}

#[derive(Debug)]
pub struct OrganizeSession {
    pub context: SessionContext,
    pub pending: Option<PendingPlan>,
}

pub struct AppState {
    pub db: Mutex<rusqlite::Connection>,
    pub config: PipelineConfig,
    pub policy: Arc<SafetyPolicy>,
    pub organize_cancel_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
    pub sessions: Mutex<HashMap<String, OrganizeSession>>,
    pub root_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(conn: rusqlite::Connection, config: PipelineConfig) -> Self {
        let policy = Arc::new(SafetyPolicy::new(&config.deny_list_additions));
        Self {
            db: Mutex::new(conn),
            config,
            policy,
            organize_cancel_flags: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            root_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn reset_organize_cancel_flag(&self, session_id: &str) -> Arc<AtomicBool> {
        let mut flags = self
            .organize_cancel_flags
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let flag = flags
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();
        flag.store(false, Ordering::Relaxed);
        flag
    }

    pub fn mark_organize_cancelled(&self, session_id: Option<&str>) {
        let flags = self
            .organize_cancel_flags
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(id) = session_id {
            if let Some(flag) = flags.get(id) {
                flag.store(true, Ordering::Relaxed);
            }
            return;
        }

        for flag in flags.values() {
            flag.store(true, Ordering::Relaxed);
        }
    }

    pub fn clear_organize_cancel_flag(&self, session_id: &str) {
        let mut flags = self
            .organize_cancel_flags
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        flags.remove(session_id);
    }

    /// Lock shared by every apply or undo touching `root`.
    pub fn root_lock(&self, root: &Path) -> Arc<Mutex<()>> {
        let mut locks = self
            .root_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(root.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `f` while holding the lock for `root`, then forgets the lock if no
    /// other caller is waiting on it.
    pub fn with_root_lock<R>(&self, root: &Path, f: impl FnOnce() -> R) -> R {
        let lock = self.root_lock(root);
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f()
        };
        drop(lock);

        let mut locks = self
            .root_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks
            .get(root)
            .is_some_and(|shared| Arc::strong_count(shared) == 1)
        {
            locks.remove(root);
        }
        result
    }

    pub fn open_session(&self, session_id: &str) {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| OrganizeSession {
                context: SessionContext::new(self.config.history_turns),
                pending: None,
            });
    }

    /// Runs `f` against the session, creating it on first use.
    pub fn with_session<R>(&self, session_id: &str, f: impl FnOnce(&mut OrganizeSession) -> R) -> R {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| OrganizeSession {
                context: SessionContext::new(self.config.history_turns),
                pending: None,
            });
        f(session)
    }

    pub fn close_session(&self, session_id: &str) -> bool {
        self.clear_organize_cancel_flag(session_id);
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.remove(session_id).is_some()
    }
}
