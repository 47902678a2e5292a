use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    General(String),

    #[error("Directory unreadable: {path} ({reason})")]
    DirectoryUnreadable { path: String, reason: String },

    #[error("Invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("Plan generation failed: {reason}")]
    PlanGenerationFailed {
        reason: String,
        raw_response: Option<String>,
    },

    #[error("Unsafe path: {0}")]
    UnsafePath(String),

    #[error("organization cancelled")]
    Cancelled,
}

impl AppError {
    /// Short stable label used in audit summaries and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(e) if e.to_string().contains("database is locked") => "db_locked",
            Self::Database(_) => "database",
            Self::Io(_) => "io",
            Self::Serde(_) => "serialization",
            Self::Http(_) => "http",
            Self::General(_) => "other",
            Self::DirectoryUnreadable { .. } => "directory_unreadable",
            Self::InvalidInstruction(_) => "invalid_instruction",
            Self::PlanGenerationFailed { .. } => "plan_generation_failed",
            Self::UnsafePath(_) => "unsafe_path",
            Self::Cancelled => "cancelled",
        }
    }

    /// The offending model output attached to a failed plan, if any.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::PlanGenerationFailed { raw_response, .. } => raw_response.as_deref(),
            _ => None,
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
