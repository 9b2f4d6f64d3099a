//! Period summaries.
//!
//! After each journal entry the worker checks every summary kind. When the
//! period before the current one has source material and no summary file,
//! that period is summarized with the same section generators used for
//! entries.
//!
//! | Kind | Key | Sources |
//! |------|-----|---------|
//! | daily | `2025-06-03` | that day's journal |
//! | weekly | `2025-W23` (ISO week) | daily journals |
//! | monthly | `2025-06` | daily journals |
//! | quarterly | `2025-Q2` | monthly summaries, else daily journals |
//! | yearly | `2025` | quarterly summaries, else daily journals |
//!
//! A summary file is written at most once: the existence check and the
//! write happen under an exclusive lock on `.summary.lock`, and the file
//! itself appears by atomic rename.

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use crate::context::PromptContext;
use crate::diff::floor_char_boundary;
use crate::journal::{push_list, push_mood, push_text, FileLock, JournalLayout};
use crate::llm::LanguageModel;
use crate::sections::{generate_ai_sections, AiSections};
use crate::telemetry::{categorize, Telemetry};

/// Upper bound on source text handed to the model for one summary.
pub const SOURCE_BUDGET_BYTES: usize = 120 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl SummaryKind {
    pub const ALL: [SummaryKind; 5] = [
        SummaryKind::Daily,
        SummaryKind::Weekly,
        SummaryKind::Monthly,
        SummaryKind::Quarterly,
        SummaryKind::Yearly,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            SummaryKind::Daily => "daily",
            SummaryKind::Weekly => "weekly",
            SummaryKind::Monthly => "monthly",
            SummaryKind::Quarterly => "quarterly",
            SummaryKind::Yearly => "yearly",
        }
    }

    fn title(self) -> &'static str {
        match self {
            SummaryKind::Daily => "Daily",
            SummaryKind::Weekly => "Weekly",
            SummaryKind::Monthly => "Monthly",
            SummaryKind::Quarterly => "Quarterly",
            SummaryKind::Yearly => "Yearly",
        }
    }
}

/// A calendar period with inclusive bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Period {
    pub kind: SummaryKind,
    pub key: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    /// The period of `kind` that contains `date`.
    pub fn containing(kind: SummaryKind, date: NaiveDate) -> Self {
        let (key, start, end) = match kind {
            SummaryKind::Daily => (date.format("%Y-%m-%d").to_string(), date, date),
            SummaryKind::Weekly => {
                let week = date.iso_week();
                let start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
                (
                    format!("{:04}-W{:02}", week.year(), week.week()),
                    start,
                    start + Duration::days(6),
                )
            }
            SummaryKind::Monthly => {
                let start = first_of_month(date.year(), date.month());
                (date.format("%Y-%m").to_string(), start, next_month(start) - Duration::days(1))
            }
            SummaryKind::Quarterly => {
                let quarter = (date.month() - 1) / 3 + 1;
                let start = first_of_month(date.year(), (quarter - 1) * 3 + 1);
                let end = next_month(next_month(next_month(start))) - Duration::days(1);
                (format!("{}-Q{}", date.year(), quarter), start, end)
            }
            SummaryKind::Yearly => {
                let start = first_of_month(date.year(), 1);
                let end = first_of_month(date.year() + 1, 1) - Duration::days(1);
                (date.year().to_string(), start, end)
            }
        };
        Self {
            kind,
            key,
            start,
            end,
        }
    }

    pub fn previous(&self) -> Self {
        Self::containing(self.kind, self.start - Duration::days(1))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Parse a period key such as `2025-W23` or `2025-Q2`.
    pub fn from_key(kind: SummaryKind, key: &str) -> Result<Self> {
        let invalid = || anyhow::anyhow!("Invalid {} period key: '{}'", kind.dir_name(), key);
        let anchor = match kind {
            SummaryKind::Daily => NaiveDate::parse_from_str(key, "%Y-%m-%d").map_err(|_| invalid())?,
            SummaryKind::Weekly => {
                let (year, week) = key.split_once("-W").ok_or_else(invalid)?;
                let year: i32 = year.parse().map_err(|_| invalid())?;
                let week: u32 = week.parse().map_err(|_| invalid())?;
                NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(invalid)?
            }
            SummaryKind::Monthly => {
                NaiveDate::parse_from_str(&format!("{}-01", key), "%Y-%m-%d").map_err(|_| invalid())?
            }
            SummaryKind::Quarterly => {
                let (year, quarter) = key.split_once("-Q").ok_or_else(invalid)?;
                let year: i32 = year.parse().map_err(|_| invalid())?;
                let quarter: u32 = quarter.parse().map_err(|_| invalid())?;
                if !(1..=4).contains(&quarter) {
                    return Err(invalid());
                }
                NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1).ok_or_else(invalid)?
            }
            SummaryKind::Yearly => {
                let year: i32 = key.parse().map_err(|_| invalid())?;
                NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid)?
            }
        };
        let period = Self::containing(kind, anchor);
        if period.key != key {
            return Err(invalid());
        }
        Ok(period)
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

fn next_month(first: NaiveDate) -> NaiveDate {
    if first.month() == 12 {
        first_of_month(first.year() + 1, 1)
    } else {
        first_of_month(first.year(), first.month() + 1)
    }
}

// ============ Sources ============

#[derive(Debug, Clone, Serialize)]
pub struct SourceDoc {
    pub label: String,
    pub text: String,
}

/// Everything the generators see for one period.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryContext {
    pub period: Period,
    pub sources: Vec<SourceDoc>,
    /// Set when sources were cut to fit [`SOURCE_BUDGET_BYTES`].
    pub truncated: bool,
}

impl PromptContext for SummaryContext {
    fn prompt_data(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl SummaryContext {
    pub fn load(layout: &JournalLayout, period: &Period) -> Result<Self> {
        let docs = collect_sources(layout, period)?;
        let (sources, truncated) = apply_budget(docs, SOURCE_BUDGET_BYTES);
        Ok(Self {
            period: period.clone(),
            sources,
            truncated,
        })
    }
}

fn collect_sources(layout: &JournalLayout, period: &Period) -> Result<Vec<SourceDoc>> {
    let finer = match period.kind {
        SummaryKind::Quarterly => Some(SummaryKind::Monthly),
        SummaryKind::Yearly => Some(SummaryKind::Quarterly),
        _ => None,
    };

    if let Some(finer) = finer {
        let docs = summaries_within(layout, finer, period)?;
        if !docs.is_empty() {
            return Ok(docs);
        }
    }
    daily_within(layout, period)
}

fn daily_within(layout: &JournalLayout, period: &Period) -> Result<Vec<SourceDoc>> {
    let mut docs = Vec::new();
    for date in layout.daily_dates()? {
        if !period.contains(date) {
            continue;
        }
        let path = layout.daily_path(date);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        docs.push(SourceDoc {
            label: format!("daily journal {}", date.format("%Y-%m-%d")),
            text,
        });
    }
    Ok(docs)
}

fn summaries_within(
    layout: &JournalLayout,
    kind: SummaryKind,
    period: &Period,
) -> Result<Vec<SourceDoc>> {
    let mut docs = Vec::new();
    let mut current = Period::containing(kind, period.start);
    while current.start <= period.end {
        let path = layout.summary_path(kind, &current.key);
        if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            docs.push(SourceDoc {
                label: format!("{} summary {}", kind.dir_name(), current.key),
                text,
            });
        }
        current = Period::containing(kind, current.end + Duration::days(1));
    }
    Ok(docs)
}

/// Keep sources in order until the byte budget is spent, cutting the last
/// one that fits partially.
fn apply_budget(docs: Vec<SourceDoc>, budget: usize) -> (Vec<SourceDoc>, bool) {
    let mut used = 0;
    let mut kept = Vec::new();
    let mut truncated = false;

    for mut doc in docs {
        let remaining = budget - used;
        if remaining == 0 {
            truncated = true;
            break;
        }
        if doc.text.len() > remaining {
            doc.text.truncate(floor_char_boundary(&doc.text, remaining));
            truncated = true;
        }
        used += doc.text.len();
        kept.push(doc);
    }
    (kept, truncated)
}

// ============ Due-check ============

/// The period of `kind` that should be summarized as of `date`, if any.
///
/// Daily: the latest journal day before `date`. Other kinds: the period
/// before the one containing `date`. Either way it must have sources and no
/// summary file yet.
pub fn due_period(layout: &JournalLayout, kind: SummaryKind, date: NaiveDate) -> Result<Option<Period>> {
    let candidate = match kind {
        SummaryKind::Daily => {
            let Some(latest) = layout.daily_dates()?.into_iter().filter(|d| *d < date).max() else {
                return Ok(None);
            };
            Period::containing(kind, latest)
        }
        _ => Period::containing(kind, date).previous(),
    };

    if layout.summary_path(kind, &candidate.key).exists() {
        return Ok(None);
    }
    if collect_sources(layout, &candidate)?.is_empty() {
        return Ok(None);
    }
    Ok(Some(candidate))
}

pub fn should_generate_summary(layout: &JournalLayout, kind: SummaryKind, date: NaiveDate) -> bool {
    match due_period(layout, kind, date) {
        Ok(period) => period.is_some(),
        Err(e) => {
            tracing::warn!(kind = kind.dir_name(), error = %format!("{:#}", e), "summary check failed");
            false
        }
    }
}

// ============ Generation ============

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub period: Period,
    pub source_count: usize,
    pub sections: AiSections,
}

/// Summarize `period`. `None` when it has no sources.
pub async fn summarize_period(
    layout: &JournalLayout,
    period: &Period,
    model: &dyn LanguageModel,
    telemetry: &mut Telemetry,
) -> Result<Option<Summary>> {
    let context = SummaryContext::load(layout, period)?;
    if context.sources.is_empty() {
        return Ok(None);
    }
    let sections = generate_ai_sections(model, &context, telemetry).await;
    Ok(Some(Summary {
        period: period.clone(),
        source_count: context.sources.len(),
        sections,
    }))
}

/// Write `summary` unless its file already exists. Returns the new file's
/// path, or `None` when another run got there first.
pub fn write_summary(layout: &JournalLayout, summary: &Summary) -> Result<Option<PathBuf>> {
    let _lock = FileLock::acquire(&layout.summary_lock_path())?;

    let path = layout.summary_path(summary.period.kind, &summary.period.key);
    if path.exists() {
        return Ok(None);
    }

    let dir = layout.summary_dir(summary.period.kind);
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let tmp = dir.join(format!(".{}.md.{}.tmp", summary.period.key, uuid::Uuid::new_v4()));
    {
        let mut file = std::fs::File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(render_summary(summary).as_bytes())?;
        file.sync_all()?;
    }
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to move summary into {}", path.display()));
    }

    Ok(Some(path))
}

pub fn render_summary(summary: &Summary) -> String {
    let period = &summary.period;
    let mut out = format!(
        "# {} summary: {}\n\n_{} to {} · {} source document(s)_\n\n",
        period.kind.title(),
        period.key,
        period.start.format("%Y-%m-%d"),
        period.end.format("%Y-%m-%d"),
        summary.source_count
    );

    let s = &summary.sections;
    push_text(&mut out, "Summary", &s.summary.value);
    push_text(&mut out, "Technical Synopsis", &s.technical_synopsis.value);
    push_list(&mut out, "Accomplishments", &s.accomplishments.value);
    push_list(&mut out, "Frustrations or Roadblocks", &s.frustrations.value);
    push_mood(&mut out, s.tone_mood.value.as_ref());
    push_list(&mut out, "Discussion Notes", &s.discussion_notes.value);
    out
}

/// Summarize and write one period. `None` when there was nothing to write:
/// no sources, every section fell back, or the file already exists.
pub async fn generate_period_summary(
    layout: &JournalLayout,
    period: &Period,
    model: &dyn LanguageModel,
    telemetry: &mut Telemetry,
) -> Result<Option<PathBuf>> {
    if layout.summary_path(period.kind, &period.key).exists() {
        return Ok(None);
    }
    let Some(summary) = summarize_period(layout, period, model, telemetry).await? else {
        return Ok(None);
    };
    if summary.sections.all_fell_back() {
        tracing::warn!(period = %period.key, "every summary section fell back; not writing");
        return Ok(None);
    }
    write_summary(layout, &summary)
}

/// Check every kind and write whichever summaries are due as of `date`.
/// Failures are logged per kind and never propagate.
pub async fn generate_due_summaries(
    layout: &JournalLayout,
    date: NaiveDate,
    model: &dyn LanguageModel,
    telemetry: &mut Telemetry,
) -> Vec<PathBuf> {
    let mut written = Vec::new();

    for kind in SummaryKind::ALL {
        let started = Instant::now();
        let period = match due_period(layout, kind, date) {
            Ok(Some(period)) => period,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(kind = kind.dir_name(), error = %format!("{:#}", e), "summary check failed");
                continue;
            }
        };

        let event = format!("summary:{}", kind.dir_name());
        match generate_period_summary(layout, &period, model, telemetry).await {
            Ok(Some(path)) => {
                tracing::info!(path = %path.display(), "summary written");
                telemetry.record(&event, started, Ok(()));
                written.push(path);
            }
            Ok(None) => telemetry.record(&event, started, Ok(())),
            Err(e) => {
                tracing::warn!(period = %period.key, error = %format!("{:#}", e), "summary failed");
                telemetry.record(&event, started, Err(categorize(&e)));
            }
        }
    }

    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::DisabledModel;
    use crate::sections::test_support::ScriptedModel;
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn write_daily(layout: &JournalLayout, day: &str, text: &str) {
        std::fs::create_dir_all(layout.daily_dir()).unwrap();
        std::fs::write(layout.daily_path(date(day)), text).unwrap();
    }

    #[test]
    fn test_period_keys() {
        let d = date("2025-06-03");
        assert_eq!(Period::containing(SummaryKind::Daily, d).key, "2025-06-03");
        assert_eq!(Period::containing(SummaryKind::Weekly, d).key, "2025-W23");
        assert_eq!(Period::containing(SummaryKind::Monthly, d).key, "2025-06");
        assert_eq!(Period::containing(SummaryKind::Quarterly, d).key, "2025-Q2");
        assert_eq!(Period::containing(SummaryKind::Yearly, d).key, "2025");

        let week = Period::containing(SummaryKind::Weekly, d);
        assert_eq!(week.start, date("2025-06-02"));
        assert_eq!(week.end, date("2025-06-08"));
        let quarter = Period::containing(SummaryKind::Quarterly, d);
        assert_eq!(quarter.start, date("2025-04-01"));
        assert_eq!(quarter.end, date("2025-06-30"));
    }

    #[test]
    fn test_previous_crosses_year_boundaries() {
        let q1 = Period::containing(SummaryKind::Quarterly, date("2025-02-10"));
        assert_eq!(q1.previous().key, "2024-Q4");

        // 2024-12-30 already belongs to ISO week 1 of 2025.
        let w1 = Period::containing(SummaryKind::Weekly, date("2025-01-02"));
        assert_eq!(w1.key, "2025-W01");
        assert_eq!(w1.start, date("2024-12-30"));
        assert_eq!(w1.previous().key, "2024-W52");
    }

    #[test]
    fn test_from_key() {
        let week = Period::from_key(SummaryKind::Weekly, "2025-W23").unwrap();
        assert_eq!(week.start, date("2025-06-02"));
        let quarter = Period::from_key(SummaryKind::Quarterly, "2025-Q4").unwrap();
        assert_eq!(quarter.end, date("2025-12-31"));
        assert!(Period::from_key(SummaryKind::Quarterly, "2025-Q5").is_err());
        assert!(Period::from_key(SummaryKind::Monthly, "June").is_err());
    }

    #[test]
    fn test_daily_due_for_latest_previous_journal() {
        let tmp = TempDir::new().unwrap();
        let layout = JournalLayout::new(tmp.path());
        assert!(!should_generate_summary(&layout, SummaryKind::Daily, date("2025-06-03")));

        write_daily(&layout, "2025-05-29", "older");
        write_daily(&layout, "2025-06-02", "yesterday");
        write_daily(&layout, "2025-06-03", "today");

        let due = due_period(&layout, SummaryKind::Daily, date("2025-06-03")).unwrap().unwrap();
        assert_eq!(due.key, "2025-06-02");

        std::fs::create_dir_all(layout.summary_dir(SummaryKind::Daily)).unwrap();
        std::fs::write(layout.summary_path(SummaryKind::Daily, "2025-06-02"), "done").unwrap();
        assert!(!should_generate_summary(&layout, SummaryKind::Daily, date("2025-06-03")));
    }

    #[test]
    fn test_weekly_due_only_with_sources() {
        let tmp = TempDir::new().unwrap();
        let layout = JournalLayout::new(tmp.path());
        write_daily(&layout, "2025-06-03", "this week");
        assert!(!should_generate_summary(&layout, SummaryKind::Weekly, date("2025-06-03")));

        write_daily(&layout, "2025-05-28", "last week");
        assert!(should_generate_summary(&layout, SummaryKind::Weekly, date("2025-06-03")));
    }

    #[test]
    fn test_quarterly_prefers_monthly_summaries() {
        let tmp = TempDir::new().unwrap();
        let layout = JournalLayout::new(tmp.path());
        write_daily(&layout, "2025-05-10", "daily text");
        let quarter = Period::from_key(SummaryKind::Quarterly, "2025-Q2").unwrap();

        let docs = collect_sources(&layout, &quarter).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].label.starts_with("daily journal"));

        std::fs::create_dir_all(layout.summary_dir(SummaryKind::Monthly)).unwrap();
        std::fs::write(layout.summary_path(SummaryKind::Monthly, "2025-04"), "april").unwrap();
        std::fs::write(layout.summary_path(SummaryKind::Monthly, "2025-06"), "june").unwrap();

        let docs = collect_sources(&layout, &quarter).unwrap();
        let labels: Vec<&str> = docs.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["monthly summary 2025-04", "monthly summary 2025-06"]);
    }

    #[test]
    fn test_apply_budget() {
        let docs = vec![
            SourceDoc {
                label: "a".into(),
                text: "x".repeat(60),
            },
            SourceDoc {
                label: "b".into(),
                text: "y".repeat(60),
            },
            SourceDoc {
                label: "c".into(),
                text: "z".repeat(60),
            },
        ];
        let (kept, truncated) = apply_budget(docs, 100);
        assert!(truncated);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.iter().map(|d| d.text.len()).sum::<usize>(), 100);
    }

    #[tokio::test]
    async fn test_due_summaries_are_idempotent() {
        let tmp = TempDir::new().unwrap();
        let layout = JournalLayout::new(tmp.path());
        write_daily(&layout, "2025-05-28", "# Daily journal: 2025-05-28\n\nwork");
        write_daily(&layout, "2025-06-03", "# Daily journal: 2025-06-03\n\nmore work");
        let model = ScriptedModel { fail_on: vec![] };

        let mut telemetry = Telemetry::new();
        let first = generate_due_summaries(&layout, date("2025-06-03"), &model, &mut telemetry).await;
        let names: Vec<String> = first
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(
            names,
            [
                "summaries/daily/2025-05-28.md",
                "summaries/weekly/2025-W22.md",
                "summaries/monthly/2025-05.md",
            ]
        );
        let before = std::fs::read_to_string(&first[1]).unwrap();
        assert!(before.starts_with("# Weekly summary: 2025-W22"));
        assert!(before.contains("We added retries to the sync job."));

        let second = generate_due_summaries(&layout, date("2025-06-03"), &model, &mut telemetry).await;
        assert!(second.is_empty());
        assert_eq!(std::fs::read_to_string(&first[1]).unwrap(), before);
    }

    #[tokio::test]
    async fn test_all_fallback_summary_not_written() {
        let tmp = TempDir::new().unwrap();
        let layout = JournalLayout::new(tmp.path());
        write_daily(&layout, "2025-06-02", "work");
        let mut telemetry = Telemetry::new();

        let written = generate_due_summaries(&layout, date("2025-06-03"), &DisabledModel, &mut telemetry).await;
        assert!(written.is_empty());
        assert!(should_generate_summary(&layout, SummaryKind::Daily, date("2025-06-03")));
    }

    #[test]
    fn test_write_summary_skips_existing() {
        let tmp = TempDir::new().unwrap();
        let layout = JournalLayout::new(tmp.path());
        let period = Period::from_key(SummaryKind::Monthly, "2025-05").unwrap();
        let summary = Summary {
            period: period.clone(),
            source_count: 1,
            sections: AiSections {
                summary: crate::models::SectionResult::generated("May went well.".into()),
                technical_synopsis: crate::models::SectionResult::fallback(),
                accomplishments: crate::models::SectionResult::fallback(),
                frustrations: crate::models::SectionResult::fallback(),
                tone_mood: crate::models::SectionResult::fallback(),
                discussion_notes: crate::models::SectionResult::fallback(),
            },
        };

        let path = write_summary(&layout, &summary).unwrap().unwrap();
        assert!(write_summary(&layout, &summary).unwrap().is_none());
        let leftovers: Vec<_> = std::fs::read_dir(layout.summary_dir(SummaryKind::Monthly))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        assert!(std::fs::read_to_string(path).unwrap().contains("May went well."));
    }
}
