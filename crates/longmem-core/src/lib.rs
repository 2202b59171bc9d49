//! `longmem-core` — shared configuration, error taxonomy, and domain
//! constants for the memory engine.
//!
//! Every other crate in this workspace depends on this one for the
//! [`error::LongmemError`] type and the [`config::EngineConfig`] loader.
//! Nothing in here talks to a network or a database; that lives in
//! `longmem-llm` and `longmem-store` respectively.

pub mod config;
pub mod error;

pub use config::{EngineConfig, RetrieveStrategy, RoleFilter, UpdateMode};
pub use error::{LongmemError, Result};
