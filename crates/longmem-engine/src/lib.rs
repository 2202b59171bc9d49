//! longmem-engine — the memory-state engine itself: message
//! normalization, short-term buffering, LLM-driven fact extraction,
//! retrieval, and offline two-phase consolidation.
//!
//! | component | module |
//! |---|---|
//! | message normalizer | [`normalizer`] |
//! | short-term buffer | [`buffer`] |
//! | extractor | [`extractor`] |
//! | retriever | [`retriever`] |
//! | consolidator | [`consolidator`] |
//! | facade | [`engine`] |
//!
//! There is no transport layer here — [`engine::Engine`] is the surface a
//! host embeds directly.

pub mod buffer;
pub mod consolidator;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod normalizer;
pub mod retriever;
pub mod types;

pub use engine::Engine;
pub use error::{EngineError, Result};
pub use types::{
    AddMemoryOutcome, EmbeddingOperationUsage, ExtractedFact, InputMessage, NormalizedMessage,
    OperationUsage, TokenStatistics, UpdateAction, UpdateDecision,
};
