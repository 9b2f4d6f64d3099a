//! Conversation boundary detection.
//!
//! Only assistant turns reliably carry timestamps, so gaps are measured
//! between consecutive timed assistant messages. When a gap exceeds the
//! threshold, or when time runs backwards, the new segment starts right
//! after the previous assistant message: untimed human prompts travel with the reply they prompted, and
//! anything after the final assistant stays in the final segment.

use chrono::{DateTime, Duration, Utc};

use crate::models::{ChatMessage, ConversationSegment, Role};

/// Split `messages` into segments separated by assistant gaps longer than
/// `gap_minutes`. Concatenating the result reproduces the input.
pub fn segment(messages: Vec<ChatMessage>, gap_minutes: i64) -> Vec<ConversationSegment> {
    if messages.is_empty() {
        return Vec::new();
    }

    let gap = Duration::minutes(gap_minutes);
    let mut splits = Vec::new();
    let mut last_assistant: Option<usize> = None;
    let mut last_time: Option<DateTime<Utc>> = None;

    for (i, message) in messages.iter().enumerate() {
        if message.role != Role::Assistant {
            continue;
        }
        if let Some(ts) = message.timestamp {
            if let (Some(prev_idx), Some(prev_ts)) = (last_assistant, last_time) {
                if ts - prev_ts > gap || ts < prev_ts {
                    splits.push(prev_idx + 1);
                }
            }
            last_time = Some(ts);
        }
        last_assistant = Some(i);
    }

    let mut segments = Vec::with_capacity(splits.len() + 1);
    let mut rest = messages;
    for split in splits.into_iter().rev() {
        let tail = rest.split_off(split);
        segments.push(build_segment(tail));
    }
    segments.push(build_segment(rest));
    segments.reverse();
    segments
}

fn build_segment(messages: Vec<ChatMessage>) -> ConversationSegment {
    let mut times = messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .filter_map(|m| m.timestamp);
    let start_time = times.next();
    let end_time = times.last().or(start_time);

    ConversationSegment {
        message_count: messages.len(),
        messages,
        start_time,
        end_time,
    }
}

/// Segments that ended at or after `since`. Untimed segments are kept.
pub fn select_recent(
    segments: Vec<ConversationSegment>,
    since: DateTime<Utc>,
) -> Vec<ConversationSegment> {
    segments
        .into_iter()
        .filter(|s| s.end_time.map_or(true, |end| end >= since))
        .collect()
}
