use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Skipped,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    NotFound,
    PermissionDenied,
    DestinationExists,
    IoError,
    Invalid,
    Cancelled,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::PermissionDenied => "permission-denied",
            Self::DestinationExists => "destination-exists",
            Self::IoError => "io-error",
            Self::Invalid => "invalid",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_io_error(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => Self::DestinationExists,
            _ => Self::IoError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub index: usize,
    pub source: String,
    pub destination: String,
    pub status: OutcomeStatus,
    pub reason: Option<ReasonCode>,
    pub message: Option<String>,
    pub executed_at: String,
}

impl ExecutionOutcome {
    pub fn success(index: usize, source: &str, destination: &str) -> Self {
        Self::record(index, source, destination, OutcomeStatus::Success, None, None)
    }

    pub fn failed(
        index: usize,
        source: &str,
        destination: &str,
        reason: ReasonCode,
        message: impl Into<String>,
    ) -> Self {
        Self::record(
            index,
            source,
            destination,
            OutcomeStatus::Failed,
            Some(reason),
            Some(message.into()),
        )
    }

    pub fn skipped(
        index: usize,
        source: &str,
        destination: &str,
        reason: ReasonCode,
        message: impl Into<String>,
    ) -> Self {
        Self::record(
            index,
            source,
            destination,
            OutcomeStatus::Skipped,
            Some(reason),
            Some(message.into()),
        )
    }

    fn record(
        index: usize,
        source: &str,
        destination: &str,
        status: OutcomeStatus,
        reason: Option<ReasonCode>,
        message: Option<String>,
    ) -> Self {
        Self {
            index,
            source: source.to_string(),
            destination: destination.to_string(),
            status,
            reason,
            message,
            executed_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub outcomes: Vec<ExecutionOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ExecutionReport {
    pub fn from_outcomes(outcomes: Vec<ExecutionOutcome>) -> Self {
        let count = |status| outcomes.iter().filter(|o| o.status == status).count();
        let succeeded = count(OutcomeStatus::Success);
        let failed = count(OutcomeStatus::Failed);
        let skipped = count(OutcomeStatus::Skipped);
        Self {
            outcomes,
            succeeded,
            failed,
            skipped,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} skipped",
            self.succeeded, self.failed, self.skipped
        )
    }
}
