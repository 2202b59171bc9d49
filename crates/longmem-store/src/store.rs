use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{FactPatch, FactRecord, Filters, SearchHit, UpdateQueueEntry};
use crate::vector::{cosine_similarity, decode_embedding, encode_embedding};

/// Persists [`FactRecord`]s with their embeddings and exposes CRUD plus
/// brute-force cosine similarity search with metadata filters.
///
/// Thread-safe: wraps the SQLite connection in a `Mutex`. Per §5 the
/// engine assumes exclusive access to the store for the duration of a
/// public operation, so the mutex exists for `Send + Sync`, not to
/// arbitrate concurrent writers.
pub struct FactStore {
    db: Mutex<Connection>,
    dimensions: usize,
}

impl FactStore {
    /// Wrap an already-open connection, creating the schema if absent.
    pub fn new(conn: Connection, dimensions: usize) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            dimensions,
        })
    }

    /// Open (or create) a SQLite database file at `path`.
    pub fn open(path: &str, dimensions: usize) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::new(conn, dimensions)
    }

    /// Open an in-memory database — used by tests and by hosts that don't
    /// need durability across process restarts.
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::new(conn, dimensions)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Upsert by `id`. Idempotent: inserting the same `id` twice with the
    /// same contents leaves the store unchanged.
    pub fn insert(&self, record: &FactRecord, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        let update_queue_json = serde_json::to_string(&record.update_queue)?;
        let blob = encode_embedding(embedding);

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO memories
                (id, timeStamp, floatTimeStamp, weekday, category, subcategory,
                 memoryClass, memory, originalMemory, compressedMemory, topicId,
                 topicSummary, speakerId, speakerName, hitTime, updateQueue,
                 embedding, createdAt)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)
             ON CONFLICT(id) DO UPDATE SET
                timeStamp=excluded.timeStamp, floatTimeStamp=excluded.floatTimeStamp,
                weekday=excluded.weekday, category=excluded.category,
                subcategory=excluded.subcategory, memoryClass=excluded.memoryClass,
                memory=excluded.memory, originalMemory=excluded.originalMemory,
                compressedMemory=excluded.compressedMemory, topicId=excluded.topicId,
                topicSummary=excluded.topicSummary, speakerId=excluded.speakerId,
                speakerName=excluded.speakerName, hitTime=excluded.hitTime,
                updateQueue=excluded.updateQueue, embedding=excluded.embedding",
            params![
                record.id,
                record.time_stamp,
                record.float_time_stamp,
                record.weekday,
                record.category,
                record.subcategory,
                record.memory_class,
                record.memory,
                record.original_memory,
                record.compressed_memory,
                record.topic_id,
                record.topic_summary,
                record.speaker_id,
                record.speaker_name,
                record.hit_time as i64,
                update_queue_json,
                blob,
                record.created_at,
            ],
        )?;
        debug!(id = %record.id, "fact inserted");
        Ok(())
    }

    /// Single-record read including the embedding.
    pub fn get(&self, id: &str) -> Result<Option<(FactRecord, Vec<f32>)>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(SELECT_ALL_WHERE_ID, params![id], row_to_record_with_blob)
            .optional()?;
        Ok(row.map(|(record, blob)| (record, decode_embedding(&blob))))
    }

    /// Full scan. Order is unspecified — callers (the consolidator) must
    /// tolerate large results and should not assume any particular order.
    pub fn get_all(&self, include_embedding: bool) -> Result<Vec<(FactRecord, Option<Vec<f32>>)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(SELECT_ALL)?;
        let rows = stmt.query_map([], row_to_record_with_blob)?;
        let mut out = Vec::new();
        for row in rows {
            let (record, blob) = row?;
            out.push((record, if include_embedding { Some(decode_embedding(&blob)) } else { None }));
        }
        Ok(out)
    }

    /// Field-level patch. `originalMemory` and identity fields are not
    /// reachable through [`FactPatch`] at all.
    pub fn update(&self, id: &str, patch: &FactPatch, embedding: Option<&[f32]>) -> Result<()> {
        if let Some(emb) = embedding {
            if emb.len() != self.dimensions {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimensions,
                    got: emb.len(),
                });
            }
        }

        let db = self.db.lock().unwrap();
        let exists: Option<i64> = db
            .query_row("SELECT 1 FROM memories WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound { id: id.to_string() });
        }

        if let Some(ref memory) = patch.memory {
            db.execute("UPDATE memories SET memory = ?1 WHERE id = ?2", params![memory, id])?;
        }
        if let Some(ref category) = patch.category {
            db.execute("UPDATE memories SET category = ?1 WHERE id = ?2", params![category, id])?;
        }
        if let Some(ref subcategory) = patch.subcategory {
            db.execute(
                "UPDATE memories SET subcategory = ?1 WHERE id = ?2",
                params![subcategory, id],
            )?;
        }
        if let Some(hit_time) = patch.hit_time {
            db.execute(
                "UPDATE memories SET hitTime = ?1 WHERE id = ?2",
                params![hit_time as i64, id],
            )?;
        }
        if let Some(ref queue) = patch.update_queue {
            let json = serde_json::to_string(queue)?;
            db.execute(
                "UPDATE memories SET updateQueue = ?1 WHERE id = ?2",
                params![json, id],
            )?;
        }
        if let Some(emb) = embedding {
            let blob = encode_embedding(emb);
            db.execute(
                "UPDATE memories SET embedding = ?1 WHERE id = ?2",
                params![blob, id],
            )?;
        }
        debug!(id = %id, "fact updated");
        Ok(())
    }

    /// Hard remove. There is no soft-delete state.
    pub fn delete(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        debug!(id = %id, "fact deleted");
        Ok(())
    }

    pub fn count(&self) -> Result<u64> {
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    /// Top-k by cosine similarity, descending, ties broken by ascending
    /// `id`. Brute-force: filters are applied first via SQL, then every
    /// remaining row's embedding is scored in Rust.
    pub fn search(&self, query: &[f32], k: usize, filters: &Filters) -> Result<Vec<SearchHit>> {
        let (sql, sql_params) = build_filtered_select(filters);
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(sql_params.iter()), row_to_record_with_blob)?;

        let mut scored: Vec<SearchHit> = Vec::new();
        for row in rows {
            let (record, blob) = row?;
            let embedding = decode_embedding(&blob);
            let score = cosine_similarity(query, &embedding);
            scored.push(SearchHit { record, score });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

const SELECT_ALL: &str = "SELECT id, timeStamp, floatTimeStamp, weekday, category, subcategory,
           memoryClass, memory, originalMemory, compressedMemory, topicId,
           topicSummary, speakerId, speakerName, hitTime, updateQueue,
           embedding, createdAt
    FROM memories";

const SELECT_ALL_WHERE_ID: &str = "SELECT id, timeStamp, floatTimeStamp, weekday, category, subcategory,
           memoryClass, memory, originalMemory, compressedMemory, topicId,
           topicSummary, speakerId, speakerName, hitTime, updateQueue,
           embedding, createdAt
    FROM memories WHERE id = ?1";

/// Build a `SELECT ... FROM memories WHERE ...` for `search`/`get_all`
/// filter predicates, all AND-combined.
fn build_filtered_select(filters: &Filters) -> (String, Vec<String>) {
    let mut sql = SELECT_ALL.to_string();
    let mut clauses = Vec::new();
    let mut sql_params = Vec::new();

    if let Some(gte) = filters.float_time_stamp_gte {
        clauses.push(format!("floatTimeStamp >= ?{}", sql_params.len() + 1));
        sql_params.push(gte.to_string());
    }
    if let Some(lte) = filters.float_time_stamp_lte {
        clauses.push(format!("floatTimeStamp <= ?{}", sql_params.len() + 1));
        sql_params.push(lte.to_string());
    }
    if let Some(ref speaker_id) = filters.speaker_id {
        clauses.push(format!("speakerId = ?{}", sql_params.len() + 1));
        sql_params.push(speaker_id.clone());
    }
    if let Some(ref category) = filters.category {
        clauses.push(format!("category = ?{}", sql_params.len() + 1));
        sql_params.push(category.clone());
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    (sql, sql_params)
}

fn row_to_record_with_blob(row: &rusqlite::Row<'_>) -> rusqlite::Result<(FactRecord, Vec<u8>)> {
    let update_queue_json: Option<String> = row.get(15)?;
    let update_queue: Vec<UpdateQueueEntry> = update_queue_json
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    let blob: Vec<u8> = row.get(16)?;

    let record = FactRecord {
        id: row.get(0)?,
        time_stamp: row.get(1)?,
        float_time_stamp: row.get(2)?,
        weekday: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        category: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        subcategory: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        memory_class: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        memory: row.get(7)?,
        original_memory: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        compressed_memory: row.get(9)?,
        topic_id: row.get(10)?,
        topic_summary: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
        speaker_id: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
        speaker_name: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
        hit_time: row.get::<_, i64>(14)? as u64,
        update_queue,
        created_at: row.get(17)?,
    };
    Ok((record, blob))
}
