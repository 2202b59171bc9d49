use longmem_core::config::RoleFilter;
use longmem_llm::{ChatMessage, ChatProvider, ChatRequest, ChatUsage};
use tracing::warn;

use crate::error::Result;
use crate::types::{ExtractedFact, ExtractorReply, NormalizedMessage};

const SYSTEM_PROMPT: &str = "You extract atomic factual assertions from a conversation segment. \
Given a list of timestamped, numbered lines, produce JSON of the form \
{\"data\":[{\"source_id\":<int>,\"fact\":<string>}, ...]}. One assertion per atomic fact. \
Do not infer beyond light rephrasing of what was actually said. If nothing factual was said, \
return {\"data\":[]}.";

/// What one extractor call returned: the parsed facts plus the raw
/// exchange, kept for audit regardless of whether parsing succeeded.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub facts: Vec<ExtractedFact>,
    pub usage: ChatUsage,
    pub raw_prompt: String,
    pub raw_response: String,
}

/// Drop messages whose role the filter excludes, then render the segment
/// per the fixed line format and ask the LLM for atomic facts.
///
/// A caller that receives `Err` from this function must treat it as a
/// zero-fact extraction for this segment and continue with the next one
/// (§7, upstream-unavailable / upstream-malformed) — this function itself
/// does not swallow errors so the caller can log with full context.
pub async fn extract_facts(
    provider: &dyn ChatProvider,
    model: &str,
    max_tokens: u32,
    segment: &[NormalizedMessage],
    role_filter: RoleFilter,
    topic_index: u64,
) -> Result<ExtractionResult> {
    let rendered = render_segment(segment, role_filter);
    let user_prompt = format!("--- Topic {topic_index} ---\n{rendered}");

    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user_prompt.clone(),
            },
        ],
        max_tokens,
        json_mode: true,
    };

    let response = provider.send(&request).await?;
    let facts = parse_reply(&response.content).unwrap_or_else(|err| {
        warn!(error = %err, "extractor reply failed to parse, treating as zero facts");
        Vec::new()
    });

    Ok(ExtractionResult {
        facts,
        usage: response.usage,
        raw_prompt: user_prompt,
        raw_response: response.content,
    })
}

fn render_segment(segment: &[NormalizedMessage], role_filter: RoleFilter) -> String {
    segment
        .iter()
        .filter(|m| role_matches(&m.role, role_filter))
        .map(|m| {
            let source_id = m.sequence_number / 2;
            let speaker_name = &m.role;
            format!("[{}, {}] {}.{}: {}", m.time_stamp, m.weekday, source_id, speaker_name, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn role_matches(role: &str, filter: RoleFilter) -> bool {
    match filter {
        RoleFilter::UserOnly => role == "user",
        RoleFilter::AssistantOnly => role == "assistant",
        RoleFilter::Hybrid => true,
    }
}

/// Strip a surrounding code fence if present, then parse as either the
/// `{"data": [...]}` wrapped form or a bare array.
fn parse_reply(content: &str) -> std::result::Result<Vec<ExtractedFact>, serde_json::Error> {
    let stripped = strip_code_fence(content);
    let reply: ExtractorReply = serde_json::from_str(stripped)?;
    Ok(reply.into_facts())
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
    use longmem_llm::ChatResponse;

    fn message(role: &str, content: &str, seq: u64) -> NormalizedMessage {
        NormalizedMessage {
            role: role.to_string(),
            content: content.to_string(),
            session_time: "2024/01/15 (Mon) 10:00".to_string(),
            time_stamp: "2024-01-15T10:00:00+00:00".to_string(),
            float_time_stamp: 1_705_312_800.0,
            weekday: "Mon".to_string(),
            sequence_number: seq,
        }
    }

    struct FixedReply(String);

    #[async_trait]
    impl ChatProvider for FixedReply {
        async fn send(&self, _req: &ChatRequest) -> longmem_llm::Result<ChatResponse> {
            Ok(ChatResponse {
                content: self.0.clone(),
                usage: ChatUsage::default(),
            })
        }
    }

    #[test]
    fn renders_only_messages_the_filter_keeps() {
        let segment = vec![message("user", "hi there", 0), message("assistant", "hello", 1)];
        let rendered = render_segment(&segment, RoleFilter::UserOnly);
        assert!(rendered.contains("hi there"));
        assert!(!rendered.contains("hello"));
    }

    #[test]
    fn source_id_is_sequence_divided_by_two() {
        let segment = vec![message("user", "a", 4), message("assistant", "b", 5)];
        let rendered = render_segment(&segment, RoleFilter::Hybrid);
        assert!(rendered.contains("2.user: a"));
        assert!(rendered.contains("2.assistant: b"));
    }

    #[test]
    fn parses_wrapped_data_form() {
        let facts = parse_reply(r#"{"data":[{"source_id":0,"fact":"likes tea"}]}"#).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].fact, "likes tea");
    }

    #[test]
    fn parses_bare_array_form() {
        let facts = parse_reply(r#"[{"source_id":1,"fact":"lives in Tokyo"}]"#).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].source_id, 1);
    }

    #[test]
    fn strips_a_json_code_fence() {
        let wrapped = "```json\n{\"data\":[]}\n```";
        let facts = parse_reply(wrapped).unwrap();
        assert!(facts.is_empty());
    }

    #[test]
    fn ignores_extra_keys_on_items() {
        let facts = parse_reply(r#"{"data":[{"source_id":0,"fact":"x","confidence":0.9}]}"#).unwrap();
        assert_eq!(facts.len(), 1);
    }

    #[tokio::test]
    async fn malformed_reply_yields_zero_facts_not_an_error() {
        let provider = FixedReply("not json at all".to_string());
        let segment = vec![message("user", "hi", 0)];
        let result = extract_facts(&provider, "gpt-4o-mini", 512, &segment, RoleFilter::Hybrid, 0)
            .await
            .unwrap();
        assert!(result.facts.is_empty());
    }
}
