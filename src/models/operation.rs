use serde::{Deserialize, Serialize};

/// A completed move, kept so the plan that produced it can be reverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_id: String,
    pub plan_id: String,
    pub root_path: String,
    pub source: String,
    pub destination: String,
    pub executed_at: String,
    pub undone: bool,
}
