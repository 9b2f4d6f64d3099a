//! Context assembly.
//!
//! A [`JournalContext`] is everything the section generators see for one
//! commit. It is built from whatever collection produced; a source that
//! failed contributes an empty collection, never a missing field.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::chat::extract::StoreFormat;
use crate::chat::limit::LimitMetadata;
use crate::diff::{DiffSet, SizeTier};
use crate::models::{CommitRef, ConversationSegment, FileDiff};

/// Anything that can be handed to a section generator as its data block.
pub trait PromptContext {
    fn prompt_data(&self) -> String;
}

/// Output of the chat half of collection.
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    pub databases: Vec<PathBuf>,
    pub formats: Vec<StoreFormat>,
    pub segments: Vec<ConversationSegment>,
    pub skipped_rows: usize,
    pub limit: LimitMetadata,
}

/// How complete the collected context is.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionQuality {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_tier: Option<SizeTier>,
    pub diff_truncated: bool,
    pub omitted_files: usize,
    pub skipped_binary: usize,
    pub skipped_generated: usize,
    pub chat_databases: usize,
    pub chat_formats: Vec<StoreFormat>,
    pub skipped_chat_rows: usize,
    pub chat_limit: LimitMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalContext {
    pub commit: CommitRef,
    pub diffs: BTreeMap<String, FileDiff>,
    pub conversations: Vec<ConversationSegment>,
    pub quality: CollectionQuality,
}

impl JournalContext {
    pub fn assemble(commit: CommitRef, diffs: DiffSet, chat: ChatContext) -> Self {
        let quality = CollectionQuality {
            diff_tier: diffs.tier,
            diff_truncated: diffs.is_truncated(),
            omitted_files: diffs.omitted,
            skipped_binary: diffs.skipped_binary.len(),
            skipped_generated: diffs.skipped_generated.len(),
            chat_databases: chat.databases.len(),
            chat_formats: chat.formats,
            skipped_chat_rows: chat.skipped_rows,
            chat_limit: chat.limit,
        };

        Self {
            commit,
            diffs: diffs.files,
            conversations: chat.segments,
            quality,
        }
    }

    pub fn message_count(&self) -> usize {
        self.conversations.iter().map(|s| s.message_count).sum()
    }
}

impl PromptContext for JournalContext {
    fn prompt_data(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
