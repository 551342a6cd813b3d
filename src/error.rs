use std::time::Duration;

/// Coarse classification of a [`DashboardError`].
///
/// The refresh pipeline only cares about which bucket an error falls in:
/// network and protocol failures keep stale data and retry on the next tick,
/// shape mismatches are reported without producing records, and a rejected
/// concurrent trigger is never shown as an error banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Protocol,
    ShapeMismatch,
    ConcurrentTriggerRejected,
    Configuration,
}

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("Gateway error from {endpoint}: {message}")]
    Protocol { endpoint: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Historical payload shape mismatch: {field} has {actual} entries, expected {expected}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("A manual analysis is already in flight")]
    ConcurrentTriggerRejected,

    #[error("No API credential configured for manual analysis")]
    MissingCredential,

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DashboardError {
    /// Classify this error into the pipeline's failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DashboardError::Http(_) | DashboardError::Timeout { .. } | DashboardError::Task(_) => {
                ErrorKind::Network
            }
            DashboardError::Protocol { .. } | DashboardError::Json(_) => ErrorKind::Protocol,
            DashboardError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            DashboardError::ConcurrentTriggerRejected => ErrorKind::ConcurrentTriggerRejected,
            DashboardError::MissingCredential
            | DashboardError::InvalidHeader(_)
            | DashboardError::Config(_)
            | DashboardError::Io(_)
            | DashboardError::Toml(_) => ErrorKind::Configuration,
        }
    }

    /// Whether the next scheduled refresh can be expected to recover from this.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Protocol)
    }

    pub(crate) fn protocol(endpoint: &str, message: impl Into<String>) -> Self {
        DashboardError::Protocol {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
