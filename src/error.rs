use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeskflowError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DeskflowError {
    /// Short machine-readable kind, used in REST error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Authentication(_) => "authentication",
            Self::RateLimit(_) => "rate_limit",
            Self::Backend(_) => "backend",
            Self::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for DeskflowError {
    fn from(value: reqwest::Error) -> Self {
        Self::Backend(value.to_string())
    }
}

impl From<serde_json::Error> for DeskflowError {
    fn from(value: serde_json::Error) -> Self {
        Self::Backend(format!("Unexpected payload: {}", value))
    }
}

pub type DeskflowResult<T> = Result<T, DeskflowError>;

pub(crate) fn validation(msg: impl Into<String>) -> DeskflowError {
    DeskflowError::Validation(msg.into())
}

pub(crate) fn not_found(msg: impl Into<String>) -> DeskflowError {
    DeskflowError::NotFound(msg.into())
}
