use serde::{Deserialize, Serialize};

/// One dialog turn as delivered by a host, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputMessage {
    pub role: String,
    pub content: String,
    /// A session marker, conventionally `"YYYY/MM/DD (Ddd) HH:MM"` but
    /// other ISO-ish forms are accepted — see [`crate::normalizer`].
    pub time_stamp: String,
}

/// A message after the normalizer has assigned it a strictly-ordered
/// instant, weekday, and sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub role: String,
    pub content: String,
    /// The original session marker, kept for debugging.
    pub session_time: String,
    /// The bumped instant, ISO-8601.
    pub time_stamp: String,
    pub float_time_stamp: f64,
    pub weekday: String,
    pub sequence_number: u64,
}

/// One `(source_id, fact)` pair returned by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub source_id: i64,
    pub fact: String,
}

/// The parsed JSON reply from the extractor's chat call.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExtractorReply {
    Wrapped { data: Vec<ExtractedFact> },
    Bare(Vec<ExtractedFact>),
}

impl ExtractorReply {
    pub fn into_facts(self) -> Vec<ExtractedFact> {
        match self {
            ExtractorReply::Wrapped { data } => data,
            ExtractorReply::Bare(facts) => facts,
        }
    }
}

/// The decision action consolidation phase 2 applies to a target record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    Update,
    Delete,
    Ignore,
}

impl Default for UpdateAction {
    fn default() -> Self {
        Self::Ignore
    }
}

/// The parsed JSON reply from the consolidator's "update decision" call.
/// Missing or unrecognized `action` defaults to `ignore` via
/// `#[serde(default)]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDecision {
    #[serde(default)]
    pub action: UpdateAction,
    pub new_memory: Option<String>,
}

/// Usage accumulated by one kind of collaborator call.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OperationUsage {
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Usage accumulated purely from embedding calls — no prompt/completion
/// split, just a token total, per §4.4.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EmbeddingOperationUsage {
    pub calls: u64,
    pub tokens: u64,
}

/// Accumulated counters across the engine's lifetime, returned by
/// `get_token_statistics`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TokenStatistics {
    pub add_memory: OperationUsage,
    pub update: OperationUsage,
    pub embedding: EmbeddingOperationUsage,
}

/// Result of one `add_memory` call: how many facts were created, plus the
/// raw extractor exchange for audit, when extraction actually ran.
#[derive(Debug, Clone, Default)]
pub struct AddMemoryOutcome {
    pub facts_created: usize,
    pub extraction_ran: bool,
    pub raw_prompt: Option<String>,
    pub raw_response: Option<String>,
}
