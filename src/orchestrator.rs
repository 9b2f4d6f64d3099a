//! Per-commit pipeline.
//!
//! ```text
//! Collecting ──▶ Generating ──▶ Assembling ──▶ Done
//!     │
//!     └──▶ Failed   (commit could not be resolved)
//! ```
//!
//! Collection is soft everywhere except commit resolution: a diff or chat
//! failure becomes an empty collection. Each section generator is isolated,
//! so a run that reaches `Generating` always produces a complete entry.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::chat::{self, limit_messages, segment, select_recent};
use crate::config::{ChatConfig, Config};
use crate::context::{ChatContext, JournalContext};
use crate::diff::{self, DiffSet};
use crate::git;
use crate::journal::{self, JournalLayout};
use crate::llm::LanguageModel;
use crate::models::{CommitRef, JournalEntry, SectionKind};
use crate::sections::{generate_ai_sections, generate_commit_metadata, generate_terminal_commands};
use crate::summary::generate_due_summaries;
use crate::telemetry::{categorize, ErrorCategory, Telemetry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Collecting,
    Generating,
    Assembling,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Collecting => "collecting",
            Phase::Generating => "generating",
            Phase::Assembling => "assembling",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }

    fn event(self) -> String {
        format!("phase:{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Entry written.
    Done,
    /// `journal.enabled = false`; nothing collected.
    Disabled,
    /// Nothing written. `phase` is where the run stopped.
    Failed { phase: Phase, reason: String },
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub entry_path: Option<PathBuf>,
    pub fallback_sections: Vec<SectionKind>,
    pub summaries: Vec<PathBuf>,
    pub telemetry: Telemetry,
}

impl RunReport {
    fn stopped(outcome: RunOutcome, telemetry: Telemetry) -> Self {
        Self {
            outcome,
            entry_path: None,
            fallback_sections: Vec::new(),
            summaries: Vec::new(),
            telemetry,
        }
    }
}

/// Collect, generate, and assemble the entry for `rev`.
///
/// Errors only when the commit cannot be resolved.
pub async fn generate_entry(
    config: &Config,
    repo: &Path,
    rev: &str,
    model: &dyn LanguageModel,
    telemetry: &mut Telemetry,
) -> Result<JournalEntry> {
    let started = Instant::now();
    let commit = match git::resolve_commit(repo, rev) {
        Ok(commit) => commit,
        Err(e) => {
            telemetry.record(&Phase::Collecting.event(), started, Err(ErrorCategory::Commit));
            return Err(e);
        }
    };
    tracing::info!(commit = %commit.short_hash, files = commit.files.len(), "collecting context");

    let diffs = collect_diffs_soft(config, repo, &commit, telemetry);
    let chat = collect_chat(&config.chat, repo, &commit, telemetry).await;
    telemetry.record(&Phase::Collecting.event(), started, Ok(()));

    let context = JournalContext::assemble(commit, diffs, chat);
    Ok(generate_sections(model, context, telemetry).await)
}

fn collect_diffs_soft(
    config: &Config,
    repo: &Path,
    commit: &CommitRef,
    telemetry: &mut Telemetry,
) -> DiffSet {
    let started = Instant::now();
    match diff::collect_diffs(repo, commit, &config.diff) {
        Ok(set) => {
            telemetry.record("collect:diff", started, Ok(()));
            set
        }
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "diff collection failed; continuing without diffs");
            telemetry.record("collect:diff", started, Err(ErrorCategory::Diff));
            DiffSet::default()
        }
    }
}

/// Locate, extract, limit, and segment the chat history relevant to
/// `commit`. Never fails; unreadable databases are skipped.
pub async fn collect_chat(
    config: &ChatConfig,
    repo: &Path,
    commit: &CommitRef,
    telemetry: &mut Telemetry,
) -> ChatContext {
    if !config.enabled {
        return ChatContext::default();
    }
    let started = Instant::now();
    let lookback = ChronoDuration::hours(config.lookback_hours);

    let located = chat::locate_chat_databases(config);
    let selected = chat::select_for_repo(
        &located,
        repo,
        Duration::from_secs(config.lookback_hours.max(0) as u64 * 3600),
    );

    let mut ctx = ChatContext::default();
    let mut messages = Vec::new();
    let mut failures = 0usize;

    for db in selected.iter().rev() {
        match chat::extract_messages(db).await {
            Ok(extraction) => {
                ctx.skipped_rows += extraction.skipped;
                if let Some(format) = extraction.format {
                    ctx.formats.push(format);
                }
                messages.extend(extraction.messages);
                ctx.databases.push(db.clone());
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(db = %db.display(), error = %format!("{:#}", e), "skipping chat database");
            }
        }
    }

    let messages = chat::sort_chronologically(messages);
    let (limited, limit) =
        limit_messages(messages, config.max_human_messages, config.max_ai_messages);
    ctx.limit = limit;

    let since = match &commit.parent {
        Some(parent) => git::author_time(repo, parent)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| commit.timestamp.with_timezone(&Utc) - lookback),
        None => commit.timestamp.with_timezone(&Utc) - lookback,
    };
    ctx.segments = select_recent(segment(limited, config.gap_minutes), since);

    tracing::debug!(
        located = located.len(),
        used = ctx.databases.len(),
        segments = ctx.segments.len(),
        "chat context collected"
    );
    let outcome = if failures > 0 && ctx.databases.is_empty() {
        Err(ErrorCategory::Chat)
    } else {
        Ok(())
    };
    telemetry.record("collect:chat", started, outcome);
    ctx
}

/// Run every generator over `context` and assemble the entry.
pub async fn generate_sections(
    model: &dyn LanguageModel,
    context: JournalContext,
    telemetry: &mut Telemetry,
) -> JournalEntry {
    let started = Instant::now();
    let ai = generate_ai_sections(model, &context, telemetry).await;
    let commit_metadata = generate_commit_metadata(&context.commit, &context.quality, telemetry);
    let terminal_commands = generate_terminal_commands(telemetry);
    telemetry.record(&Phase::Generating.event(), started, Ok(()));

    let started = Instant::now();
    let entry = JournalEntry {
        commit: context.commit,
        summary: ai.summary,
        technical_synopsis: ai.technical_synopsis,
        accomplishments: ai.accomplishments,
        frustrations: ai.frustrations,
        tone_mood: ai.tone_mood,
        discussion_notes: ai.discussion_notes,
        commit_metadata,
        terminal_commands,
    };
    telemetry.record(&Phase::Assembling.event(), started, Ok(()));
    entry
}

/// Full run for one commit: entry, save, then any due summaries.
///
/// Never returns an error; failures are reported in [`RunReport::outcome`].
pub async fn run_for_commit(
    config: &Config,
    repo: &Path,
    rev: &str,
    model: &dyn LanguageModel,
) -> RunReport {
    let mut telemetry = Telemetry::new();
    let run_started = Instant::now();

    if !config.journal.enabled {
        tracing::info!("journal disabled; skipping");
        return RunReport::stopped(RunOutcome::Disabled, telemetry);
    }

    let entry = match generate_entry(config, repo, rev, model, &mut telemetry).await {
        Ok(entry) => entry,
        Err(e) => {
            tracing::error!(rev, error = %format!("{:#}", e), "cannot resolve commit; nothing written");
            telemetry.record(&Phase::Failed.event(), run_started, Err(ErrorCategory::Commit));
            let reason = format!("{:#}", e);
            return RunReport::stopped(
                RunOutcome::Failed {
                    phase: Phase::Collecting,
                    reason,
                },
                telemetry,
            );
        }
    };

    let root = config.journal_root(repo);
    let entry_path = match journal::save_entry(&entry, &root) {
        Ok(path) => path,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "failed to save journal entry");
            telemetry.record(&Phase::Failed.event(), run_started, Err(categorize(&e)));
            let reason = format!("{:#}", e);
            return RunReport::stopped(
                RunOutcome::Failed {
                    phase: Phase::Assembling,
                    reason,
                },
                telemetry,
            );
        }
    };

    let summaries = if config.journal.auto_summaries {
        let layout = JournalLayout::new(&root);
        generate_due_summaries(&layout, entry.commit.date(), model, &mut telemetry).await
    } else {
        Vec::new()
    };

    telemetry.record(&Phase::Done.event(), run_started, Ok(()));
    RunReport {
        outcome: RunOutcome::Done,
        entry_path: Some(entry_path),
        fallback_sections: entry.fallback_sections(),
        summaries,
        telemetry,
    }
}
