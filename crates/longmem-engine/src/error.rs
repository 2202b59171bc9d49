use thiserror::Error;

/// Errors surfaced by the engine facade and its components. Wraps the
/// lower crates' errors via `#[from]` and adds the invalid-input variant
/// that only makes sense at the message-normalizer boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid message: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Llm(#[from] longmem_llm::LlmError),

    #[error(transparent)]
    Store(#[from] longmem_store::StoreError),

    #[error(transparent)]
    Config(#[from] longmem_core::LongmemError),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "INVALID_INPUT",
            EngineError::Llm(_) => "UPSTREAM_UNAVAILABLE",
            EngineError::Store(_) => "STORE_FAILURE",
            EngineError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
