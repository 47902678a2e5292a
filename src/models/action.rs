use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Move,
}

impl ActionType {
    pub const ALL: &'static [ActionType] = &[ActionType::Move];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "move" => Ok(Self::Move),
            _ => Err(format!("unsupported action_type: {s}")),
        }
    }
}

/// One step of a model-proposed plan, exactly as it appeared in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub action_type: ActionType,
    pub source: String,
    pub destination: String,
    pub reason: String,
}

/// A proposed action after it was checked against the scan it was planned from.
/// `violation` is set when the action must never run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckedAction {
    pub action: ProposedAction,
    pub violation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disposition {
    Execute,
    SkipExists,
    SkipInvalid { reason: String },
    RenameOnConflict { destination: String },
}

impl Disposition {
    pub fn is_executable(&self) -> bool {
        matches!(self, Self::Execute | Self::RenameOnConflict { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::SkipExists => "skip-exists",
            Self::SkipInvalid { .. } => "skip-invalid",
            Self::RenameOnConflict { .. } => "rename-on-conflict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAction {
    pub action: ProposedAction,
    pub disposition: Disposition,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
}

impl ResolvedAction {
    /// Relative destination the move will actually land on.
    pub fn final_destination(&self) -> &str {
        match &self.disposition {
            Disposition::RenameOnConflict { destination } => destination,
            _ => &self.action.destination,
        }
    }
}
