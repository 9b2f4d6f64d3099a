//! Per-role message-volume limiting.

use serde::Serialize;

use crate::models::{ChatMessage, Role};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LimitMetadata {
    pub truncated: bool,
    pub original_human: usize,
    pub original_ai: usize,
    pub removed_human: usize,
    pub removed_ai: usize,
}

/// Keep the most recent `max_human` human and `max_ai` assistant messages.
///
/// Removal happens only from the oldest end of each role; the survivors keep
/// their original relative order.
pub fn limit_messages(
    messages: Vec<ChatMessage>,
    max_human: usize,
    max_ai: usize,
) -> (Vec<ChatMessage>, LimitMetadata) {
    let original_human = messages.iter().filter(|m| m.role == Role::Human).count();
    let original_ai = messages.len() - original_human;

    let removed_human = original_human.saturating_sub(max_human);
    let removed_ai = original_ai.saturating_sub(max_ai);

    let metadata = LimitMetadata {
        truncated: removed_human > 0 || removed_ai > 0,
        original_human,
        original_ai,
        removed_human,
        removed_ai,
    };

    if !metadata.truncated {
        return (messages, metadata);
    }

    let mut skip_human = removed_human;
    let mut skip_ai = removed_ai;
    let kept = messages
        .into_iter()
        .filter(|m| {
            let budget = match m.role {
                Role::Human => &mut skip_human,
                Role::Assistant => &mut skip_ai,
            };
            if *budget > 0 {
                *budget -= 1;
                false
            } else {
                true
            }
        })
        .collect();

    (kept, metadata)
}
