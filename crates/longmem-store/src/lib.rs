//! longmem-store — SQLite-backed persistence for extracted facts.
//!
//! | concern | approach |
//! |---|---|
//! | schema | single `memories` table, see [`db::init_db`] |
//! | embeddings | raw little-endian `f32` blobs, see [`vector`] |
//! | search | brute-force cosine similarity, no native vector index |
//! | concurrency | `Mutex<Connection>` — one connection, serialized access |

mod db;
mod error;
mod store;
mod types;
mod vector;

pub use error::{Result, StoreError};
pub use store::FactStore;
pub use types::{FactPatch, FactRecord, Filters, SearchHit, UpdateQueueEntry};
pub use vector::{cosine_similarity, decode_embedding, encode_embedding};
