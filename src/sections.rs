//! Section generators.
//!
//! Six sections are written by the language model; each one is its own unit
//! of work with its own fallback boundary, so one failed call only blanks its
//! own section. Commit metadata is computed locally and terminal commands are
//! retired (always an empty list).
//!
//! Every generator sends a fixed instruction constant as the prompt and the
//! serialized context as the data block, then parses the reply into the
//! section's type:
//!
//! | Section | Type | Parser |
//! |---------|------|--------|
//! | summary, technical synopsis | `String` | [`parse_text`] |
//! | accomplishments, frustrations, discussion notes | `Vec<String>` | [`parse_list`] |
//! | tone/mood | `Option<ToneMood>` | [`parse_mood`] |

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::context::{CollectionQuality, PromptContext};
use crate::llm::{complete_checked, LanguageModel};
use crate::models::{CommitRef, SectionKind, SectionResult, ToneMood};
use crate::telemetry::{categorize, CategorizedError, ErrorCategory, Telemetry};

pub const SUMMARY_PROMPT: &str = "You are writing an engineering journal. Using the development \
context provided (commit metadata, code diffs, and AI chat conversations), write a concise \
narrative summary of what was done and why, in two to four sentences of plain prose. Write in \
the first person plural past tense. Do not invent details that are not supported by the context. \
Reply with the summary only.";

pub const TECHNICAL_SYNOPSIS_PROMPT: &str = "You are writing an engineering journal. Using the \
development context provided, write a short technical synopsis of the code changes: which \
components changed, what the key implementation decisions were, and any notable patterns or \
trade-offs. Use one or two short paragraphs of plain prose. Reply with the synopsis only.";

pub const ACCOMPLISHMENTS_PROMPT: &str = "You are writing an engineering journal. Using the \
development context provided, list what was accomplished. Reply with one accomplishment per line, \
each starting with \"- \". If nothing was accomplished, reply with exactly: None";

pub const FRUSTRATIONS_PROMPT: &str = "You are writing an engineering journal. Using the \
development context provided, list any frustrations, roadblocks, or problems that were hit, as \
evidenced by the chat conversations or the changes themselves. Reply with one item per line, each \
starting with \"- \". If there is no evidence of frustration, reply with exactly: None";

pub const TONE_MOOD_PROMPT: &str = "You are writing an engineering journal. Using the development \
context provided, infer the developer's mood from the language of the chat conversations and \
commit messages. Reply with exactly two lines:\nMood: <one or two words>\nIndicators: <the \
evidence, in one sentence>";

pub const DISCUSSION_NOTES_PROMPT: &str = "You are writing an engineering journal. From the AI chat \
conversations in the development context provided, extract the notable points of discussion: \
questions asked, options weighed, and decisions reached. Reply with one note per line, each \
starting with \"- \". If there were no relevant conversations, reply with exactly: None";

/// The model-written sections shared by journal entries and period summaries.
#[derive(Debug, Clone, Serialize)]
pub struct AiSections {
    pub summary: SectionResult<String>,
    pub technical_synopsis: SectionResult<String>,
    pub accomplishments: SectionResult<Vec<String>>,
    pub frustrations: SectionResult<Vec<String>>,
    pub tone_mood: SectionResult<Option<ToneMood>>,
    pub discussion_notes: SectionResult<Vec<String>>,
}

impl AiSections {
    pub fn all_fell_back(&self) -> bool {
        self.summary.fallback
            && self.technical_synopsis.fallback
            && self.accomplishments.fallback
            && self.frustrations.fallback
            && self.tone_mood.fallback
            && self.discussion_notes.fallback
    }
}

/// Run the six model-backed generators in turn. Never fails.
pub async fn generate_ai_sections(
    model: &dyn LanguageModel,
    context: &dyn PromptContext,
    telemetry: &mut Telemetry,
) -> AiSections {
    let data = context.prompt_data();
    AiSections {
        summary: generate_summary(model, &data, telemetry).await,
        technical_synopsis: generate_technical_synopsis(model, &data, telemetry).await,
        accomplishments: generate_accomplishments(model, &data, telemetry).await,
        frustrations: generate_frustrations(model, &data, telemetry).await,
        tone_mood: generate_tone_mood(model, &data, telemetry).await,
        discussion_notes: generate_discussion_notes(model, &data, telemetry).await,
    }
}

pub async fn generate_summary(
    model: &dyn LanguageModel,
    data: &str,
    telemetry: &mut Telemetry,
) -> SectionResult<String> {
    run_section(model, SectionKind::Summary, SUMMARY_PROMPT, data, telemetry, parse_text).await
}

pub async fn generate_technical_synopsis(
    model: &dyn LanguageModel,
    data: &str,
    telemetry: &mut Telemetry,
) -> SectionResult<String> {
    run_section(
        model,
        SectionKind::TechnicalSynopsis,
        TECHNICAL_SYNOPSIS_PROMPT,
        data,
        telemetry,
        parse_text,
    )
    .await
}

pub async fn generate_accomplishments(
    model: &dyn LanguageModel,
    data: &str,
    telemetry: &mut Telemetry,
) -> SectionResult<Vec<String>> {
    run_section(
        model,
        SectionKind::Accomplishments,
        ACCOMPLISHMENTS_PROMPT,
        data,
        telemetry,
        parse_list,
    )
    .await
}

pub async fn generate_frustrations(
    model: &dyn LanguageModel,
    data: &str,
    telemetry: &mut Telemetry,
) -> SectionResult<Vec<String>> {
    run_section(
        model,
        SectionKind::Frustrations,
        FRUSTRATIONS_PROMPT,
        data,
        telemetry,
        parse_list,
    )
    .await
}

pub async fn generate_tone_mood(
    model: &dyn LanguageModel,
    data: &str,
    telemetry: &mut Telemetry,
) -> SectionResult<Option<ToneMood>> {
    run_section(
        model,
        SectionKind::ToneMood,
        TONE_MOOD_PROMPT,
        data,
        telemetry,
        |text| parse_mood(text).map(Some),
    )
    .await
}

pub async fn generate_discussion_notes(
    model: &dyn LanguageModel,
    data: &str,
    telemetry: &mut Telemetry,
) -> SectionResult<Vec<String>> {
    run_section(
        model,
        SectionKind::DiscussionNotes,
        DISCUSSION_NOTES_PROMPT,
        data,
        telemetry,
        parse_list,
    )
    .await
}

/// Commit facts computed without the model.
pub fn generate_commit_metadata(
    commit: &CommitRef,
    quality: &CollectionQuality,
    telemetry: &mut Telemetry,
) -> SectionResult<BTreeMap<String, String>> {
    let started = Instant::now();
    let mut meta = BTreeMap::new();

    meta.insert("author".to_string(), commit.author.clone());
    meta.insert("date".to_string(), commit.timestamp.to_rfc3339());
    meta.insert("files_changed".to_string(), commit.files.len().to_string());
    meta.insert("insertions".to_string(), commit.insertions().to_string());
    meta.insert("deletions".to_string(), commit.deletions().to_string());
    if let Some(tier) = quality.diff_tier {
        meta.insert("size_tier".to_string(), tier.as_str().to_string());
    }
    if quality.skipped_binary > 0 {
        meta.insert("binary_files".to_string(), quality.skipped_binary.to_string());
    }
    if quality.skipped_generated > 0 {
        meta.insert(
            "generated_files".to_string(),
            quality.skipped_generated.to_string(),
        );
    }
    if quality.omitted_files > 0 {
        meta.insert("omitted_files".to_string(), quality.omitted_files.to_string());
    }
    if quality.chat_databases > 0 {
        meta.insert(
            "chat_messages".to_string(),
            (quality.chat_limit.original_human + quality.chat_limit.original_ai
                - quality.chat_limit.removed_human
                - quality.chat_limit.removed_ai)
                .to_string(),
        );
    }

    telemetry.record(&event_name(SectionKind::CommitMetadata), started, Ok(()));
    SectionResult::generated(meta)
}

/// Retired section: always empty, never a fallback.
pub fn generate_terminal_commands(telemetry: &mut Telemetry) -> SectionResult<Vec<String>> {
    telemetry.record(&event_name(SectionKind::TerminalCommands), Instant::now(), Ok(()));
    SectionResult::generated(Vec::new())
}

fn event_name(kind: SectionKind) -> String {
    format!("section:{}", kind)
}

async fn run_section<T, F>(
    model: &dyn LanguageModel,
    kind: SectionKind,
    prompt: &str,
    data: &str,
    telemetry: &mut Telemetry,
    parse: F,
) -> SectionResult<T>
where
    T: Default,
    F: Fn(&str) -> Option<T>,
{
    let started = Instant::now();
    let outcome = match complete_checked(model, prompt, data).await {
        Ok(text) => parse(text.as_str()).ok_or_else(|| {
            anyhow::Error::new(CategorizedError::new(
                ErrorCategory::Response,
                "unparseable completion",
            ))
        }),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(value) => {
            telemetry.record(&event_name(kind), started, Ok(()));
            SectionResult::generated(value)
        }
        Err(e) => {
            let category = categorize(&e);
            tracing::warn!(section = %kind, category = %category, error = %format!("{:#}", e), "section fell back");
            telemetry.record(&event_name(kind), started, Err(category));
            SectionResult::fallback()
        }
    }
}

// ============ Parsers ============

/// Trimmed text; `None` when empty.
pub fn parse_text(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// One item per line with bullet or number markers removed.
///
/// A reply of just "None" is a valid empty list.
pub fn parse_list(text: &str) -> Option<Vec<String>> {
    let items: Vec<String> = text
        .lines()
        .map(strip_marker)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if items.is_empty() {
        return None;
    }
    if items.len() == 1 && is_none_marker(&items[0]) {
        return Some(Vec::new());
    }
    Some(items)
}

/// `Mood:` and `Indicators:` lines, case-insensitive; the mood is required.
pub fn parse_mood(text: &str) -> Option<ToneMood> {
    let mut mood = None;
    let mut indicators = String::new();

    for line in text.lines() {
        let line = strip_marker(line).trim_matches('*');
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_matches('*').trim();
        match label.trim().trim_matches('*').to_lowercase().as_str() {
            "mood" if !value.is_empty() => mood = Some(value.to_string()),
            "indicators" => indicators = value.to_string(),
            _ => {}
        }
    }

    mood.map(|mood| ToneMood { mood, indicators })
}

fn strip_marker(line: &str) -> &str {
    let line = line.trim();
    if let Some(rest) = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
    {
        return rest.trim();
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim();
        }
    }
    line
}

fn is_none_marker(item: &str) -> bool {
    matches!(
        item.trim_end_matches('.').to_lowercase().as_str(),
        "none" | "n/a" | "nothing"
    )
}
