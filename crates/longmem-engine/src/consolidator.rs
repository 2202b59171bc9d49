use std::collections::HashMap;

use longmem_llm::{ChatMessage, ChatProvider, ChatRequest};
use longmem_store::{FactPatch, FactStore, Filters, UpdateQueueEntry};
use tracing::warn;

use crate::error::Result;
use crate::types::{OperationUsage, UpdateAction, UpdateDecision};

const DECISION_SYSTEM_PROMPT: &str = "You decide how a stored fact should change given related, \
earlier facts about the same person. Respond as JSON: \
{\"action\":\"update\"|\"delete\"|\"ignore\",\"new_memory\":<string, only when action is update>}. \
Choose update when the earlier facts show the current fact is outdated or should be merged with \
them, delete when the earlier facts show the current fact is no longer true, and ignore \
otherwise.";

/// Phase 1 — queue construction. Computed against the unchanged snapshot
/// so scores stay comparable across records; the only mutation is each
/// record's own `update_queue`.
pub fn construct_update_queue_all_entries(store: &FactStore, top_k: usize, keep_top_n: usize) -> Result<()> {
    let snapshot = store.get_all(true)?;

    for (record, embedding) in &snapshot {
        let embedding = embedding.as_ref().expect("get_all(true) always returns embeddings");
        let filters = Filters {
            float_time_stamp_lte: Some(record.float_time_stamp),
            ..Default::default()
        };
        let hits = store.search(embedding, top_k, &filters)?;

        let queue: Vec<UpdateQueueEntry> = hits
            .into_iter()
            .filter(|hit| hit.record.id != record.id)
            .take(keep_top_n)
            .map(|hit| UpdateQueueEntry {
                candidate_id: hit.record.id,
                score: hit.score,
            })
            .collect();

        store.update(
            &record.id,
            &FactPatch {
                update_queue: Some(queue),
                ..Default::default()
            },
            None,
        )?;
    }

    Ok(())
}

/// Phase 2 — decision and mutation. Targets are derived by inverting every
/// record's `update_queue`: a record `s` with an entry `(t.id, score)` at
/// or above the threshold makes `s` a source for target `t`. Targets are
/// visited in sorted-id order for reproducible tests; the contract only
/// requires each target be visited at most once.
pub async fn offline_update_all_entries(
    store: &FactStore,
    provider: &dyn ChatProvider,
    model: &str,
    max_tokens: u32,
    score_threshold: f64,
) -> Result<OperationUsage> {
    let snapshot = store.get_all(false)?;
    let by_id: HashMap<String, _> = snapshot.iter().map(|(r, _)| (r.id.clone(), r.clone())).collect();

    let mut sources_by_target: HashMap<String, Vec<String>> = HashMap::new();
    for (record, _) in &snapshot {
        for entry in &record.update_queue {
            if entry.score >= score_threshold {
                sources_by_target
                    .entry(entry.candidate_id.clone())
                    .or_default()
                    .push(record.id.clone());
            }
        }
    }

    let mut target_ids: Vec<&String> = sources_by_target.keys().collect();
    target_ids.sort();

    let mut usage = OperationUsage::default();

    for target_id in target_ids {
        let Some(target) = by_id.get(target_id) else {
            // target was deleted between phase 1 and phase 2: tolerated.
            continue;
        };
        let source_ids = &sources_by_target[target_id];
        let sources: Vec<_> = source_ids.iter().filter_map(|id| by_id.get(id)).collect();
        if sources.is_empty() {
            continue;
        }

        let user_prompt = build_decision_prompt(&target.memory, &sources.iter().map(|s| s.memory.clone()).collect::<Vec<_>>());
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: DECISION_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt,
                },
            ],
            max_tokens,
            json_mode: true,
        };

        match provider.send(&request).await {
            Ok(response) => {
                usage.calls += 1;
                usage.prompt_tokens += response.usage.prompt_tokens as u64;
                usage.completion_tokens += response.usage.completion_tokens as u64;
                usage.total_tokens += response.usage.total_tokens as u64;

                let decision = parse_decision(&response.content);
                apply_decision(store, target_id, decision)?;
            }
            Err(err) => {
                warn!(target = %target_id, error = %err, "consolidation decision call failed, treating as ignore");
            }
        }
    }

    Ok(usage)
}

fn build_decision_prompt(current: &str, related: &[String]) -> String {
    let bullets: Vec<String> = related.iter().map(|m| format!("- {m}")).collect();
    format!("Current fact: {current}\nRelated earlier facts:\n{}", bullets.join("\n"))
}

fn apply_decision(store: &FactStore, target_id: &str, decision: UpdateDecision) -> Result<()> {
    match decision.action {
        UpdateAction::Ignore => Ok(()),
        UpdateAction::Delete => {
            store.delete(target_id)?;
            Ok(())
        }
        UpdateAction::Update => {
            if let Some(new_memory) = decision.new_memory.filter(|m| !m.is_empty()) {
                store.update(
                    target_id,
                    &FactPatch {
                        memory: Some(new_memory),
                        ..Default::default()
                    },
                    None,
                )?;
            }
            Ok(())
        }
    }
}

fn parse_decision(content: &str) -> UpdateDecision {
    let stripped = strip_code_fence(content);
    serde_json::from_str(stripped).unwrap_or_default()
}

fn strip_code_fence(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches('\n');
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use longmem_llm::{ChatResponse, ChatUsage};
    use longmem_store::FactRecord;
    use std::sync::Mutex;

    fn record(id: &str, memory: &str, float_ts: f64) -> FactRecord {
        FactRecord {
            id: id.to_string(),
            time_stamp: "2024-01-15T10:00:00Z".to_string(),
            float_time_stamp: float_ts,
            weekday: "Mon".to_string(),
            category: String::new(),
            subcategory: String::new(),
            memory_class: String::new(),
            memory: memory.to_string(),
            original_memory: memory.to_string(),
            compressed_memory: None,
            topic_id: None,
            topic_summary: String::new(),
            speaker_id: String::new(),
            speaker_name: String::new(),
            hit_time: 0,
            update_queue: Vec::new(),
            created_at: "2024-01-15T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn phase1_excludes_self_and_respects_temporal_direction() {
        let store = FactStore::open_in_memory(2).unwrap();
        store.insert(&record("old", "lives in Tokyo", 100.0), &[1.0, 0.0]).unwrap();
        store.insert(&record("new", "lives in Osaka", 200.0), &[1.0, 0.0]).unwrap();

        construct_update_queue_all_entries(&store, 20, 10).unwrap();

        let (old, _) = store.get("old").unwrap().unwrap();
        let (new, _) = store.get("new").unwrap().unwrap();

        assert!(old.update_queue.iter().all(|e| e.candidate_id != "old"));
        assert!(new.update_queue.iter().any(|e| e.candidate_id == "old"));
        assert!(old.update_queue.iter().all(|e| e.candidate_id != "new"));
    }

    struct FixedDecision(String);

    #[async_trait]
    impl ChatProvider for FixedDecision {
        async fn send(&self, _req: &ChatRequest) -> longmem_llm::Result<ChatResponse> {
            Ok(ChatResponse {
                content: self.0.clone(),
                usage: ChatUsage::default(),
            })
        }
    }

    #[tokio::test]
    async fn phase2_applies_update_decision() {
        let store = FactStore::open_in_memory(2).unwrap();
        store.insert(&record("old", "lives in Tokyo", 100.0), &[1.0, 0.0]).unwrap();
        let mut target = record("new", "lives in Osaka", 200.0);
        target.update_queue = vec![UpdateQueueEntry {
            candidate_id: "old".to_string(),
            score: 0.95,
        }];
        store.insert(&target, &[1.0, 0.0]).unwrap();

        let provider = FixedDecision(r#"{"action":"update","new_memory":"moved from Tokyo to Osaka"}"#.to_string());
        offline_update_all_entries(&store, &provider, "gpt-4o-mini", 256, 0.9).await.unwrap();

        let (updated, _) = store.get("new").unwrap().unwrap();
        assert_eq!(updated.memory, "moved from Tokyo to Osaka");
        assert_eq!(updated.original_memory, "lives in Osaka", "original_memory is write-once");
    }

    #[tokio::test]
    async fn phase2_applies_delete_decision() {
        let store = FactStore::open_in_memory(2).unwrap();
        store.insert(&record("old", "likes coffee", 100.0), &[1.0, 0.0]).unwrap();
        let mut target = record("new", "actually dislikes coffee now", 200.0);
        target.update_queue = vec![UpdateQueueEntry {
            candidate_id: "old".to_string(),
            score: 0.95,
        }];
        store.insert(&target, &[1.0, 0.0]).unwrap();

        let provider = FixedDecision(r#"{"action":"delete"}"#.to_string());
        offline_update_all_entries(&store, &provider, "gpt-4o-mini", 256, 0.9).await.unwrap();

        assert!(store.get("new").unwrap().is_none());
    }

    #[tokio::test]
    async fn below_threshold_entries_do_not_trigger_a_decision() {
        let store = FactStore::open_in_memory(2).unwrap();
        store.insert(&record("old", "likes coffee", 100.0), &[1.0, 0.0]).unwrap();
        let mut target = record("new", "likes tea", 200.0);
        target.update_queue = vec![UpdateQueueEntry {
            candidate_id: "old".to_string(),
            score: 0.5,
        }];
        store.insert(&target, &[1.0, 0.0]).unwrap();

        let calls = Mutex::new(0);
        struct CountingProvider<'a>(&'a Mutex<u32>);
        #[async_trait]
        impl<'a> ChatProvider for CountingProvider<'a> {
            async fn send(&self, _req: &ChatRequest) -> longmem_llm::Result<ChatResponse> {
                *self.0.lock().unwrap() += 1;
                Ok(ChatResponse {
                    content: r#"{"action":"ignore"}"#.to_string(),
                    usage: ChatUsage::default(),
                })
            }
        }

        let provider = CountingProvider(&calls);
        offline_update_all_entries(&store, &provider, "gpt-4o-mini", 256, 0.9).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn idempotent_when_decisions_are_all_ignore() {
        let store = FactStore::open_in_memory(2).unwrap();
        store.insert(&record("old", "likes coffee", 100.0), &[1.0, 0.0]).unwrap();
        let mut target = record("new", "likes tea", 200.0);
        target.update_queue = vec![UpdateQueueEntry {
            candidate_id: "old".to_string(),
            score: 0.95,
        }];
        store.insert(&target, &[1.0, 0.0]).unwrap();

        let provider = FixedDecision(r#"{"action":"ignore"}"#.to_string());
        offline_update_all_entries(&store, &provider, "gpt-4o-mini", 256, 0.9).await.unwrap();
        let first_memory = store.get("new").unwrap().unwrap().0.memory;
        offline_update_all_entries(&store, &provider, "gpt-4o-mini", 256, 0.9).await.unwrap();
        let second_memory = store.get("new").unwrap().unwrap().0.memory;

        assert_eq!(first_memory, second_memory);
    }

    #[tokio::test]
    async fn unparseable_decision_reply_is_treated_as_ignore() {
        let store = FactStore::open_in_memory(2).unwrap();
        store.insert(&record("old", "likes coffee", 100.0), &[1.0, 0.0]).unwrap();
        let mut target = record("new", "likes tea", 200.0);
        target.update_queue = vec![UpdateQueueEntry {
            candidate_id: "old".to_string(),
            score: 0.95,
        }];
        store.insert(&target, &[1.0, 0.0]).unwrap();

        let provider = FixedDecision("not json".to_string());
        offline_update_all_entries(&store, &provider, "gpt-4o-mini", 256, 0.9).await.unwrap();

        let (unchanged, _) = store.get("new").unwrap().unwrap();
        assert_eq!(unchanged.memory, "likes tea");
    }
}
