/// Shared error type used across all Scriberr crates.
///
/// Every variant maps to a stable kind tag that handlers translate into an
/// HTTP status via a single table (see the server's error module).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("queue full")]
    QueueFull,

    #[error("shutting down")]
    ShuttingDown,

    #[error("engine failed: {0}")]
    EngineFailed(String),

    #[error("upstream: {0}")]
    Upstream(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Stable tag surfaced in responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::QueueFull => "queue_full",
            Self::ShuttingDown => "shutting_down",
            Self::EngineFailed(_) => "engine_failed",
            Self::Upstream(_) => "upstream",
            Self::Io(_) | Self::Json(_) | Self::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
