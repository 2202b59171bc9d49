use thiserror::Error;

/// Shared error taxonomy for the memory engine, per the five error kinds of
/// the error handling design: invalid input, upstream-unavailable,
/// upstream-malformed, store-failure, dimension-mismatch.
#[derive(Debug, Error)]
pub enum LongmemError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid message: {0}")]
    InvalidInput(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

impl LongmemError {
    /// Short error code, mirroring the wire-facing codes other crates in
    /// this lineage attach to their error enums.
    pub fn code(&self) -> &'static str {
        match self {
            LongmemError::Config(_) => "CONFIG_ERROR",
            LongmemError::InvalidInput(_) => "INVALID_INPUT",
            LongmemError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            LongmemError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, LongmemError>;
