use thiserror::Error;

/// Failure modes of the two external collaborators (chat + embedding).
///
/// `RateLimited`, `Api`, and `Network` are upstream-unavailable per the
/// error handling design; `Parse` and `DimensionMismatch` are
/// upstream-malformed / fatal-configuration respectively.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, LlmError>;
