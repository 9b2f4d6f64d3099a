//! Commit diff collection with adaptive size limits.
//!
//! Per-file and total byte ceilings depend on how many diffable files the
//! commit touches:
//!
//! | Tier | Files | Per file | Total | File cap |
//! |------|-------|----------|-------|----------|
//! | small | ≤ 5 | 10 KiB | 50 KiB | none |
//! | mid | 6–20 | 2.5 KiB | 50 KiB | none |
//! | large | > 20 | 1 KiB | 25 KiB | 50 |
//!
//! A file over its per-file ceiling is cut and gets [`TRUNCATION_MARKER`]
//! appended. Once the next diff would overflow the total ceiling (or the file
//! cap is reached) collection stops and a [`OMITTED_SENTINEL`] entry records
//! how many files were left out. The sum of all returned texts, sentinel
//! included, never exceeds the total ceiling.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::DiffConfig;
use crate::git;
use crate::models::{CommitRef, FileDiff};

/// Map key of the entry that records omitted files.
pub const OMITTED_SENTINEL: &str = "__diffs_omitted__";

pub const TRUNCATION_MARKER: &str = "\n... [diff truncated]";

/// Bytes held back from the total budget for the sentinel text.
const SENTINEL_RESERVE: usize = 160;

const GENERATED_GLOBS: &[&str] = &[
    "**/*.min.js",
    "**/*.min.css",
    "**/*.map",
    "**/*.pyc",
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/Cargo.lock",
    "**/poetry.lock",
    "**/Pipfile.lock",
    "**/composer.lock",
    "**/Gemfile.lock",
    "**/go.sum",
    "**/node_modules/**",
    "**/dist/**",
    "**/build/**",
    "**/target/**",
    "**/__pycache__/**",
    "**/.pytest_cache/**",
    "**/.mypy_cache/**",
    "**/.cache/**",
    "**/.next/**",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeTier {
    Small,
    Mid,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    pub per_file: usize,
    pub total: usize,
    pub max_files: Option<usize>,
}

impl SizeTier {
    pub fn as_str(self) -> &'static str {
        match self {
            SizeTier::Small => "small",
            SizeTier::Mid => "mid",
            SizeTier::Large => "large",
        }
    }

    pub fn for_file_count(count: usize) -> Self {
        match count {
            0..=5 => SizeTier::Small,
            6..=20 => SizeTier::Mid,
            _ => SizeTier::Large,
        }
    }

    pub fn limits(self, config: &DiffConfig) -> TierLimits {
        match self {
            SizeTier::Small => TierLimits {
                per_file: config.small_per_file_bytes,
                total: config.small_total_bytes,
                max_files: None,
            },
            SizeTier::Mid => TierLimits {
                per_file: config.mid_per_file_bytes,
                total: config.small_total_bytes,
                max_files: None,
            },
            SizeTier::Large => TierLimits {
                per_file: config.large_per_file_bytes,
                total: config.large_total_bytes,
                max_files: Some(config.large_max_files),
            },
        }
    }
}

/// Result of diff collection for one commit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffSet {
    pub tier: Option<SizeTier>,
    /// Total-byte ceiling applied to this commit.
    pub ceiling: usize,
    pub files: BTreeMap<String, FileDiff>,
    /// Diffable files left out because of the total ceiling or file cap.
    pub omitted: usize,
    pub skipped_binary: Vec<String>,
    pub skipped_generated: Vec<String>,
    /// Files whose patch could not be produced.
    pub failed: Vec<String>,
}

impl DiffSet {
    /// Sum of all diff texts, sentinel included.
    pub fn payload_bytes(&self) -> usize {
        self.files.values().map(|d| d.text.len()).sum()
    }

    pub fn is_truncated(&self) -> bool {
        self.omitted > 0 || self.files.values().any(|d| d.truncated)
    }
}

/// Collect per-file diffs for `commit` against its first parent (or the empty
/// tree for a root commit).
///
/// Only setup failures (bad exclude globs, unresolvable empty tree) are
/// returned as errors; a file whose patch fails is skipped and listed in
/// [`DiffSet::failed`].
pub fn collect_diffs(repo: &Path, commit: &CommitRef, config: &DiffConfig) -> Result<DiffSet> {
    let generated = generated_globset(&config.exclude_globs)?;
    let base = match &commit.parent {
        Some(parent) => parent.clone(),
        None => git::empty_tree(repo)?,
    };

    let mut set = DiffSet::default();
    let mut candidates = Vec::new();
    for file in &commit.files {
        if file.is_binary() {
            set.skipped_binary.push(file.path.clone());
        } else if generated.is_match(&file.path) {
            set.skipped_generated.push(file.path.clone());
        } else {
            candidates.push(file.path.clone());
        }
    }

    let tier = SizeTier::for_file_count(candidates.len());
    let limits = tier.limits(config);
    set.tier = Some(tier);

    let budgeted = budget_diffs(&candidates, limits, |path| {
        git::file_patch(repo, &base, &commit.hash, path)
    });
    set.ceiling = limits.total;
    set.files = budgeted.files;
    set.omitted = budgeted.omitted;
    set.failed = budgeted.failed;

    tracing::debug!(
        commit = %commit.short_hash,
        tier = ?tier,
        files = set.files.len(),
        omitted = set.omitted,
        bytes = set.payload_bytes(),
        "collected diffs"
    );

    Ok(set)
}

pub(crate) struct Budgeted {
    pub files: BTreeMap<String, FileDiff>,
    pub omitted: usize,
    pub failed: Vec<String>,
}

/// Fetch diffs in order until the file cap or total budget is reached.
pub(crate) fn budget_diffs<F>(paths: &[String], limits: TierLimits, mut fetch: F) -> Budgeted
where
    F: FnMut(&str) -> Result<String>,
{
    let reserve = SENTINEL_RESERVE.min(limits.total);
    let budget = limits.total - reserve;
    let capped = limits
        .max_files
        .map(|max| paths.len().min(max))
        .unwrap_or(paths.len());

    let mut files = BTreeMap::new();
    let mut failed = Vec::new();
    let mut used = 0usize;
    let mut omitted = paths.len() - capped;
    let mut reason = "file limit";

    for (i, path) in paths[..capped].iter().enumerate() {
        let raw = match fetch(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "skipping diff");
                failed.push(path.clone());
                continue;
            }
        };

        let diff = truncate_diff(raw, limits.per_file);
        if used + diff.text.len() > budget {
            omitted = paths.len() - i;
            reason = "size limit";
            break;
        }
        used += diff.text.len();
        files.insert(path.clone(), diff);
    }

    if omitted > 0 {
        let mut note = format!(
            "{} more file(s) omitted: {} of {} bytes reached",
            omitted, reason, limits.total
        );
        note.truncate(floor_char_boundary(&note, reserve));
        files.insert(
            OMITTED_SENTINEL.to_string(),
            FileDiff {
                text: note,
                truncated: true,
            },
        );
    }

    Budgeted {
        files,
        omitted,
        failed,
    }
}

/// Cut `text` to at most `max` bytes (on a char boundary) and mark it.
pub fn truncate_diff(text: String, max: usize) -> FileDiff {
    if text.len() <= max {
        return FileDiff {
            text,
            truncated: false,
        };
    }
    let cut = floor_char_boundary(&text, max);
    let mut truncated = text[..cut].to_string();
    truncated.push_str(TRUNCATION_MARKER);
    FileDiff {
        text: truncated,
        truncated: true,
    }
}

pub(crate) fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn generated_globset(extra: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in GENERATED_GLOBS {
        builder.add(Glob::new(pattern)?);
    }
    for pattern in extra {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_support::{commit_all, init_repo};
    use tempfile::TempDir;

    fn paths(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("src/file_{:02}.rs", i)).collect()
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(SizeTier::for_file_count(0), SizeTier::Small);
        assert_eq!(SizeTier::for_file_count(5), SizeTier::Small);
        assert_eq!(SizeTier::for_file_count(6), SizeTier::Mid);
        assert_eq!(SizeTier::for_file_count(20), SizeTier::Mid);
        assert_eq!(SizeTier::for_file_count(21), SizeTier::Large);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "é".repeat(10); // 20 bytes
        let diff = truncate_diff(text, 5);
        assert!(diff.truncated);
        assert!(diff.text.starts_with("éé"));
        assert!(diff.text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_small_diffs_pass_through() {
        let config = DiffConfig::default();
        let limits = SizeTier::Small.limits(&config);
        let result = budget_diffs(&paths(2), limits, |p| Ok(format!("+ change in {}", p)));
        assert_eq!(result.files.len(), 2);
        assert_eq!(result.omitted, 0);
        assert!(!result.files.contains_key(OMITTED_SENTINEL));
        assert!(result.files.values().all(|d| !d.truncated));
    }

    #[test]
    fn test_small_tier_per_file_ceiling() {
        let config = DiffConfig::default();
        let limits = SizeTier::Small.limits(&config);
        let result = budget_diffs(&paths(3), limits, |_| Ok("x".repeat(30_000)));
        for diff in result.files.values() {
            assert!(diff.truncated);
            assert!(diff.text.len() <= limits.per_file + TRUNCATION_MARKER.len());
        }
    }

    #[test]
    fn test_total_ceiling_adds_sentinel() {
        let limits = TierLimits {
            per_file: 1000,
            total: 2500,
            max_files: None,
        };
        let result = budget_diffs(&paths(5), limits, |_| Ok("y".repeat(900)));
        assert_eq!(result.files.len(), 3); // two diffs + sentinel
        assert_eq!(result.omitted, 3);
        let sentinel = &result.files[OMITTED_SENTINEL];
        assert!(sentinel.text.contains("3 more file(s) omitted"));
        let payload: usize = result.files.values().map(|d| d.text.len()).sum();
        assert!(payload <= limits.total);
    }

    #[test]
    fn test_file_cap_adds_sentinel() {
        let limits = TierLimits {
            per_file: 100,
            total: 100_000,
            max_files: Some(4),
        };
        let result = budget_diffs(&paths(10), limits, |_| Ok("z".to_string()));
        assert_eq!(result.omitted, 6);
        assert_eq!(result.files.len(), 5);
        assert!(result.files[OMITTED_SENTINEL].text.contains("file limit"));
    }

    #[test]
    fn test_failed_fetch_is_skipped() {
        let config = DiffConfig::default();
        let limits = SizeTier::Small.limits(&config);
        let result = budget_diffs(&paths(3), limits, |p| {
            if p.ends_with("01.rs") {
                anyhow::bail!("unreadable")
            }
            Ok("ok".to_string())
        });
        assert_eq!(result.files.len(), 2);
        assert_eq!(result.failed, vec!["src/file_01.rs".to_string()]);
    }

    #[test]
    fn test_payload_never_exceeds_ceiling() {
        let config = DiffConfig::default();
        for count in [1usize, 5, 6, 20, 21, 30, 80] {
            let tier = SizeTier::for_file_count(count);
            let limits = tier.limits(&config);
            let result = budget_diffs(&paths(count), limits, |_| Ok("d".repeat(12_000)));
            let payload: usize = result.files.values().map(|d| d.text.len()).sum();
            assert!(
                payload <= limits.total,
                "{} files: payload {} > ceiling {}",
                count,
                payload,
                limits.total
            );
        }
    }

    #[test]
    fn test_generated_patterns() {
        let set = generated_globset(&["**/*.snap".to_string()]).unwrap();
        assert!(set.is_match("package-lock.json"));
        assert!(set.is_match("web/dist/app.js"));
        assert!(set.is_match("static/app.min.js"));
        assert!(set.is_match("Cargo.lock"));
        assert!(set.is_match("tests/__snapshots__/a.snap"));
        assert!(!set.is_match("src/lib.rs"));
    }

    #[test]
    fn test_collect_diffs_thirty_files_uses_large_tier() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path();
        init_repo(repo);
        std::fs::write(repo.join("README.md"), "readme\n").unwrap();
        commit_all(repo, "init");

        let body: String = (0..200).map(|i| format!("line {}\n", i)).collect();
        for i in 0..30 {
            std::fs::write(repo.join(format!("file_{:02}.txt", i)), &body).unwrap();
        }
        commit_all(repo, "thirty files");

        let commit = git::resolve_commit(repo, "HEAD").unwrap();
        let config = DiffConfig::default();
        let set = collect_diffs(repo, &commit, &config).unwrap();

        assert_eq!(set.tier, Some(SizeTier::Large));
        assert!(set.payload_bytes() <= config.large_total_bytes);
        assert!(set.files.contains_key(OMITTED_SENTINEL));
        assert!(set.omitted > 0);
        assert!(set
            .files
            .iter()
            .filter(|(k, _)| k.as_str() != OMITTED_SENTINEL)
            .all(|(_, d)| d.truncated));
    }

    #[test]
    fn test_collect_diffs_skips_generated_and_binary() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path();
        init_repo(repo);
        std::fs::write(repo.join("main.py"), "print('hi')\n").unwrap();
        std::fs::write(repo.join("package-lock.json"), "{}\n").unwrap();
        std::fs::write(repo.join("logo.bin"), [0u8, 159, 146, 150, 0, 1, 2]).unwrap();
        commit_all(repo, "root commit");

        let commit = git::resolve_commit(repo, "HEAD").unwrap();
        let set = collect_diffs(repo, &commit, &DiffConfig::default()).unwrap();

        assert_eq!(set.tier, Some(SizeTier::Small));
        assert_eq!(set.files.len(), 1);
        assert!(set.files["main.py"].text.contains("print('hi')"));
        assert_eq!(set.skipped_generated, vec!["package-lock.json".to_string()]);
        assert_eq!(set.skipped_binary, vec!["logo.bin".to_string()]);
    }
}
