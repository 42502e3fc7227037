use thiserror::Error;

/// Main error type for the catalyst trading system
#[derive(Error, Debug)]
pub enum CatalystError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited by {source_name}: retry after {retry_after_secs}s")]
    RateLimited {
        source_name: String,
        retry_after_secs: u64,
    },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed parse error: {0}")]
    FeedParse(String),

    // Operator / upstream input errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cycle already running: {0}")]
    Busy(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Collaborator / infrastructure errors
    #[error("Dependency down: {component} - {reason}")]
    DependencyDown { component: String, reason: String },

    #[error("Deadline exceeded in {operation} after {elapsed_ms}ms")]
    DeadlineExceeded { operation: String, elapsed_ms: u64 },

    // Cycle state machine errors
    #[error("Invalid cycle transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Operation cancelled")]
    Cancelled,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CatalystError {
    /// HTTP status code for the API surface
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Busy(_) => 409,
            Self::RateLimited { .. } => 429,
            Self::DependencyDown { .. } => 503,
            Self::DeadlineExceeded { .. } => 504,
            _ => 500,
        }
    }

    /// Stable machine-readable error code for API payloads
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Busy(_) => "cycle_busy",
            Self::RateLimited { .. } => "rate_limited",
            Self::DependencyDown { .. } => "dependency_down",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::Database(_) | Self::Migration(_) => "persistence_error",
            Self::Cancelled => "cancelled",
            _ => "internal_error",
        }
    }

    /// Transient errors are retried in-stage with backoff; everything else
    /// either fails the stage or the cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::DeadlineExceeded { .. } | Self::FeedParse(_)
        )
    }
}

/// Result type alias for CatalystError
pub type Result<T> = std::result::Result<T, CatalystError>;
