//! Core data models used throughout devjournal.
//!
//! These types represent the commit, chat, and generated-section records that
//! flow through the journal pipeline. Everything here is created fresh for a
//! single worker run; only [`JournalEntry`] (and the period summaries built
//! from the same section types) is ever persisted.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One file touched by a commit, as reported by `git diff --numstat`.
///
/// `insertions` / `deletions` are `None` for binary files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedFile {
    pub path: String,
    pub insertions: Option<u64>,
    pub deletions: Option<u64>,
}

impl ChangedFile {
    pub fn is_binary(&self) -> bool {
        self.insertions.is_none() && self.deletions.is_none()
    }
}

/// An immutable reference to one git commit, resolved at trigger time.
#[derive(Debug, Clone, Serialize)]
pub struct CommitRef {
    pub hash: String,
    pub short_hash: String,
    /// First parent, `None` for the initial commit.
    pub parent: Option<String>,
    pub author: String,
    pub author_email: String,
    /// Author date, keeping the author's UTC offset.
    pub timestamp: DateTime<FixedOffset>,
    pub message: String,
    pub files: Vec<ChangedFile>,
}

impl CommitRef {
    /// First line of the commit message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }

    /// Calendar date of the commit in the author's timezone. Daily journal
    /// files are keyed by this date.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    pub fn insertions(&self) -> u64 {
        self.files.iter().filter_map(|f| f.insertions).sum()
    }

    pub fn deletions(&self) -> u64 {
        self.files.iter().filter_map(|f| f.deletions).sum()
    }
}

/// Diff text for a single file, possibly cut to a size ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub text: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

/// A single chat turn read from the IDE's chat store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    /// Usually only present on assistant turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            text: text.into(),
            timestamp: None,
        }
    }

    pub fn assistant(text: impl Into<String>, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp,
        }
    }
}

/// A contiguous run of chat messages judged to belong to one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSegment {
    pub messages: Vec<ChatMessage>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub message_count: usize,
}

/// The eight named sections of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    TechnicalSynopsis,
    Accomplishments,
    Frustrations,
    ToneMood,
    DiscussionNotes,
    CommitMetadata,
    TerminalCommands,
}

impl SectionKind {
    pub const ALL: [SectionKind; 8] = [
        SectionKind::Summary,
        SectionKind::TechnicalSynopsis,
        SectionKind::Accomplishments,
        SectionKind::Frustrations,
        SectionKind::ToneMood,
        SectionKind::DiscussionNotes,
        SectionKind::CommitMetadata,
        SectionKind::TerminalCommands,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Summary => "summary",
            SectionKind::TechnicalSynopsis => "technical_synopsis",
            SectionKind::Accomplishments => "accomplishments",
            SectionKind::Frustrations => "frustrations",
            SectionKind::ToneMood => "tone_mood",
            SectionKind::DiscussionNotes => "discussion_notes",
            SectionKind::CommitMetadata => "commit_metadata",
            SectionKind::TerminalCommands => "terminal_commands",
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Output of one section generator.
///
/// `fallback` is set when generation failed and `value` holds the
/// type-appropriate empty default instead of model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionResult<T> {
    pub value: T,
    pub fallback: bool,
}

impl<T> SectionResult<T> {
    pub fn generated(value: T) -> Self {
        Self {
            value,
            fallback: false,
        }
    }
}

impl<T: Default> SectionResult<T> {
    pub fn fallback() -> Self {
        Self {
            value: T::default(),
            fallback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToneMood {
    pub mood: String,
    pub indicators: String,
}

/// A complete journal entry for one commit.
///
/// Every section is a struct field, so an entry cannot be missing one; failed
/// sections carry their empty default with `fallback` set.
#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub commit: CommitRef,
    pub summary: SectionResult<String>,
    pub technical_synopsis: SectionResult<String>,
    pub accomplishments: SectionResult<Vec<String>>,
    pub frustrations: SectionResult<Vec<String>>,
    pub tone_mood: SectionResult<Option<ToneMood>>,
    pub discussion_notes: SectionResult<Vec<String>>,
    pub commit_metadata: SectionResult<BTreeMap<String, String>>,
    pub terminal_commands: SectionResult<Vec<String>>,
}

impl JournalEntry {
    /// Fallback flag of every section, in [`SectionKind::ALL`] order.
    pub fn section_status(&self) -> [(SectionKind, bool); 8] {
        [
            (SectionKind::Summary, self.summary.fallback),
            (SectionKind::TechnicalSynopsis, self.technical_synopsis.fallback),
            (SectionKind::Accomplishments, self.accomplishments.fallback),
            (SectionKind::Frustrations, self.frustrations.fallback),
            (SectionKind::ToneMood, self.tone_mood.fallback),
            (SectionKind::DiscussionNotes, self.discussion_notes.fallback),
            (SectionKind::CommitMetadata, self.commit_metadata.fallback),
            (SectionKind::TerminalCommands, self.terminal_commands.fallback),
        ]
    }

    pub fn fallback_sections(&self) -> Vec<SectionKind> {
        self.section_status()
            .into_iter()
            .filter(|(_, fallback)| *fallback)
            .map(|(kind, _)| kind)
            .collect()
    }
}
