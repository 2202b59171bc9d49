use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::{EngineError, Result};
use crate::types::{InputMessage, NormalizedMessage};

/// Parses session markers, assigns strictly-increasing instants to
/// messages that share one marker, and attaches weekday and sequence
/// number. One normalizer instance owns the per-marker cursor state for
/// its whole lifetime — reuse it across `add_memory` calls so the
/// monotonicity guarantee holds session-wide, not just per batch.
pub struct Normalizer {
    offset_ms: i64,
    cursors: HashMap<String, i64>,
    next_sequence_number: u64,
}

impl Normalizer {
    pub fn new(offset_ms: i64) -> Self {
        Self {
            offset_ms,
            cursors: HashMap::new(),
            next_sequence_number: 0,
        }
    }

    /// Normalize a batch. Rejects the whole batch on the first
    /// unparseable or missing timestamp — no partial ingestion.
    ///
    /// Sequence numbers keep counting up across calls, the same way
    /// `cursors` does — a segment handed to the Extractor may span
    /// several `normalize()` calls (the short-term buffer exists
    /// precisely to accumulate across them), and source ids derived from
    /// sequence numbers must stay unique within it.
    pub fn normalize(&mut self, messages: Vec<InputMessage>) -> Result<Vec<NormalizedMessage>> {
        let mut out = Vec::with_capacity(messages.len());
        for msg in messages.into_iter() {
            if msg.time_stamp.trim().is_empty() {
                return Err(EngineError::InvalidInput("message is missing timeStamp".to_string()));
            }

            let naive = parse_marker(&msg.time_stamp).ok_or_else(|| {
                EngineError::InvalidInput(format!("unparseable timeStamp: {}", msg.time_stamp))
            })?;
            let epoch_ms = naive.and_utc().timestamp_millis();

            let assigned_ms = match self.cursors.get(&msg.time_stamp) {
                Some(&prev) => prev + self.offset_ms,
                None => epoch_ms,
            };
            self.cursors.insert(msg.time_stamp.clone(), assigned_ms);

            let assigned: DateTime<Utc> = DateTime::from_timestamp_millis(assigned_ms)
                .ok_or_else(|| EngineError::InvalidInput(format!("timestamp out of range: {}", msg.time_stamp)))?;

            out.push(NormalizedMessage {
                role: msg.role,
                content: msg.content,
                session_time: msg.time_stamp,
                time_stamp: assigned.to_rfc3339(),
                float_time_stamp: assigned_ms as f64 / 1000.0,
                weekday: format!("{}", assigned.weekday()),
                sequence_number: self.next_sequence_number,
            });
            self.next_sequence_number += 1;
        }
        Ok(out)
    }
}

/// `date (YYYY[/-]MM[/-]DD)` ws `(weekday-token)` ws `HH:MM[:SS]`, falling
/// back to a permissive ISO parse.
fn parse_marker(marker: &str) -> Option<NaiveDateTime> {
    if let Some(dt) = parse_grammar(marker) {
        return Some(dt);
    }
    parse_iso_fallback(marker)
}

fn parse_grammar(marker: &str) -> Option<NaiveDateTime> {
    let marker = marker.trim();
    let mut parts = marker.splitn(2, char::is_whitespace);
    let date_part = parts.next()?;
    let remainder = parts.next()?.trim();

    let after_open = remainder.strip_prefix('(')?;
    let (_weekday_token, after_paren) = after_open.split_once(')')?;
    let time_part = after_paren.trim();

    let date = parse_date(date_part)?;
    let time = parse_time(time_part)?;
    Some(NaiveDateTime::new(date, time))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let sep = if s.contains('/') { '/' } else { '-' };
    let mut it = s.splitn(3, sep);
    let year: i32 = it.next()?.parse().ok()?;
    let month: u32 = it.next()?.parse().ok()?;
    let day: u32 = it.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let mut it = s.splitn(3, ':');
    let hour: u32 = it.next()?.parse().ok()?;
    let minute: u32 = it.next()?.parse().ok()?;
    let second: u32 = it.next().and_then(|x| x.parse().ok()).unwrap_or(0);
    NaiveTime::from_hms_opt(hour, minute, second)
}

fn parse_iso_fallback(marker: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(marker) {
        return Some(dt.naive_utc());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(marker, fmt) {
            return Some(dt);
        }
    }
    None
}
