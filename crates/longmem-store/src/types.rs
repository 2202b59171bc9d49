use serde::{Deserialize, Serialize};

/// A candidate source fact and its cosine similarity, as built by
/// consolidation phase 1 and consumed by phase 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateQueueEntry {
    pub candidate_id: String,
    pub score: f64,
}

/// The single persistent entity: one atomic fact extracted from dialog,
/// its vector embedding, and the metadata needed to place and re-find it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactRecord {
    pub id: String,
    pub time_stamp: String,
    pub float_time_stamp: f64,
    pub weekday: String,
    pub category: String,
    pub subcategory: String,
    pub memory_class: String,
    pub memory: String,
    pub original_memory: String,
    /// Reserved — compression of raw text is an explicit non-goal of the
    /// core; this column always stays `None` but is carried in the schema
    /// because §6 names it and a future compression pass would populate it
    /// without a migration.
    pub compressed_memory: Option<String>,
    pub topic_id: Option<i64>,
    pub topic_summary: String,
    pub speaker_id: String,
    pub speaker_name: String,
    pub hit_time: u64,
    pub update_queue: Vec<UpdateQueueEntry>,
    pub created_at: String,
}

/// AND-combined predicates for [`crate::FactStore::search`] and
/// [`crate::FactStore::get_all`].
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub float_time_stamp_gte: Option<f64>,
    pub float_time_stamp_lte: Option<f64>,
    pub speaker_id: Option<String>,
    pub category: Option<String>,
}

impl Filters {
    pub fn matches(&self, record: &FactRecord) -> bool {
        if let Some(gte) = self.float_time_stamp_gte {
            if record.float_time_stamp < gte {
                return false;
            }
        }
        if let Some(lte) = self.float_time_stamp_lte {
            if record.float_time_stamp > lte {
                return false;
            }
        }
        if let Some(ref speaker_id) = self.speaker_id {
            if &record.speaker_id != speaker_id {
                return false;
            }
        }
        if let Some(ref category) = self.category {
            if &record.category != category {
                return false;
            }
        }
        true
    }
}

/// One hit from [`crate::FactStore::search`]: the record, its cosine
/// similarity against the query vector, and nothing else — callers that
/// need the embedding back use `get`.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: FactRecord,
    pub score: f64,
}

/// Field-level patch applied by [`crate::FactStore::update`]. `None`
/// leaves a field unchanged. `original_memory` and identity fields are
/// not patchable through this type at all — the store's `update` method
/// simply has no parameter for them.
#[derive(Debug, Clone, Default)]
pub struct FactPatch {
    pub memory: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub hit_time: Option<u64>,
    pub update_queue: Option<Vec<UpdateQueueEntry>>,
}
