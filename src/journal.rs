//! Journal files on disk.
//!
//! ```text
//! <journal root>/
//! ├── daily/2025-06-03.md            appended per commit and reflection
//! ├── summaries/{daily,weekly,...}/  one file per period, see [`crate::summary`]
//! └── .summary.lock                  guards summary check-then-write
//! ```
//!
//! Appends to a daily file hold an exclusive advisory lock on that file so
//! concurrent workers never interleave partial entries.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::{JournalEntry, ToneMood};
use crate::summary::SummaryKind;

const ENTRY_SEPARATOR: &str = "---\n\n";

/// Paths inside one journal root.
#[derive(Debug, Clone)]
pub struct JournalLayout {
    root: PathBuf,
}

impl JournalLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn daily_dir(&self) -> PathBuf {
        self.root.join("daily")
    }

    pub fn daily_path(&self, date: NaiveDate) -> PathBuf {
        self.daily_dir().join(format!("{}.md", date.format("%Y-%m-%d")))
    }

    pub fn summary_dir(&self, kind: SummaryKind) -> PathBuf {
        self.root.join("summaries").join(kind.dir_name())
    }

    pub fn summary_path(&self, kind: SummaryKind, key: &str) -> PathBuf {
        self.summary_dir(kind).join(format!("{}.md", key))
    }

    pub fn summary_lock_path(&self) -> PathBuf {
        self.root.join(".summary.lock")
    }

    /// Dates that have a daily journal file, ascending.
    pub fn daily_dates(&self) -> Result<Vec<NaiveDate>> {
        let dir = self.daily_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut dates = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }
}

/// Exclusive advisory lock on a file, released on drop.
pub(crate) struct FileLock {
    file: File,
}

impl FileLock {
    /// Block until the lock on `path` is held. The file is created if
    /// missing and never truncated.
    pub(crate) fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", path.display()))?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Append `entry` to its daily file and return that file's path.
pub fn save_entry(entry: &JournalEntry, base_dir: &Path) -> Result<PathBuf> {
    let layout = JournalLayout::new(base_dir);
    let path = layout.daily_path(entry.commit.date());
    append_to_daily(&path, entry.commit.date(), &render_entry(entry))?;
    tracing::info!(path = %path.display(), commit = %entry.commit.short_hash, "journal entry saved");
    Ok(path)
}

/// Append a manual reflection to the daily file for `now`'s date.
pub fn append_reflection(base_dir: &Path, text: &str, now: DateTime<FixedOffset>) -> Result<PathBuf> {
    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!("Reflection text is empty");
    }

    let layout = JournalLayout::new(base_dir);
    let date = now.date_naive();
    let path = layout.daily_path(date);
    let block = format!(
        "### {} · Reflection\n\n{}\n\n{}",
        now.format("%H:%M"),
        text,
        ENTRY_SEPARATOR
    );
    append_to_daily(&path, date, &block)?;
    Ok(path)
}

fn append_to_daily(path: &Path, date: NaiveDate, block: &str) -> Result<()> {
    let mut lock = FileLock::acquire(path)?;
    let is_new = lock.file.metadata()?.len() == 0;

    let mut out = String::new();
    if is_new {
        out.push_str(&format!("# Daily journal: {}\n\n", date.format("%Y-%m-%d")));
    }
    out.push_str(block);

    lock.file
        .write_all(out.as_bytes())
        .with_context(|| format!("Failed to append to {}", path.display()))?;
    lock.file.flush()?;
    Ok(())
}

/// Markdown for one entry. Sections with nothing to say are left out.
pub fn render_entry(entry: &JournalEntry) -> String {
    let commit = &entry.commit;
    let mut out = format!(
        "### {} · Commit {}: {}\n\n",
        commit.timestamp.format("%H:%M"),
        commit.short_hash,
        commit.subject()
    );

    push_text(&mut out, "Summary", &entry.summary.value);
    push_text(&mut out, "Technical Synopsis", &entry.technical_synopsis.value);
    push_list(&mut out, "Accomplishments", &entry.accomplishments.value);
    push_list(&mut out, "Frustrations or Roadblocks", &entry.frustrations.value);
    push_mood(&mut out, entry.tone_mood.value.as_ref());
    push_list(&mut out, "Discussion Notes", &entry.discussion_notes.value);
    push_list(&mut out, "Terminal Commands", &entry.terminal_commands.value);

    if !entry.commit_metadata.value.is_empty() {
        out.push_str("#### Commit Metadata\n\n");
        for (key, value) in &entry.commit_metadata.value {
            out.push_str(&format!("- **{}:** {}\n", key, value));
        }
        out.push('\n');
    }

    let fallbacks = entry.fallback_sections();
    if !fallbacks.is_empty() {
        let names: Vec<&str> = fallbacks.iter().map(|k| k.name()).collect();
        out.push_str(&format!("<!-- unavailable: {} -->\n\n", names.join(", ")));
    }

    out.push_str(ENTRY_SEPARATOR);
    out
}

pub(crate) fn push_text(out: &mut String, title: &str, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    out.push_str(&format!("#### {}\n\n{}\n\n", title, text.trim()));
}

pub(crate) fn push_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("#### {}\n\n", title));
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
    out.push('\n');
}

pub(crate) fn push_mood(out: &mut String, mood: Option<&ToneMood>) {
    let Some(mood) = mood else {
        return;
    };
    out.push_str(&format!("#### Tone/Mood\n\n> Mood: {}\n", mood.mood));
    if !mood.indicators.is_empty() {
        out.push_str(&format!("> Indicators: {}\n", mood.indicators));
    }
    out.push('\n');
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::context::test_support::sample_commit;
    use crate::models::{JournalEntry, SectionResult, ToneMood};
    use std::collections::BTreeMap;

    pub fn sample_entry() -> JournalEntry {
        JournalEntry {
            commit: sample_commit(),
            summary: SectionResult::generated("Added retries to the sync job.".into()),
            technical_synopsis: SectionResult::fallback(),
            accomplishments: SectionResult::generated(vec!["Added retries".into()]),
            frustrations: SectionResult::generated(Vec::new()),
            tone_mood: SectionResult::generated(Some(ToneMood {
                mood: "Focused".into(),
                indicators: "terse messages".into(),
            })),
            discussion_notes: SectionResult::generated(Vec::new()),
            commit_metadata: SectionResult::generated(BTreeMap::from([(
                "files_changed".to_string(),
                "1".to_string(),
            )])),
            terminal_commands: SectionResult::generated(Vec::new()),
        }
    }
}
