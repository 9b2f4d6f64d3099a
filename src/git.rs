//! Commit metadata via the `git` CLI.
//!
//! Everything shells out to `git` the same way: run in the repository
//! directory, fail with the trimmed stderr on a non-zero exit, return stdout.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::models::{ChangedFile, CommitRef};

const FIELD_SEP: char = '\u{1f}';

pub(crate) fn run_git(repo: &Path, args: &[&str]) -> Result<String> {
    let subcommand = args.iter().find(|a| !a.starts_with('-')).copied().unwrap_or("");
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute 'git {}'. Is git installed?", subcommand))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", subcommand, stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Top-level directory of the work tree containing `path`.
pub fn repo_root(path: &Path) -> Result<PathBuf> {
    let out = run_git(path, &["rev-parse", "--show-toplevel"])?;
    Ok(PathBuf::from(out.trim()))
}

/// Resolve `rev` to a full [`CommitRef`] including the changed-file list.
///
/// This is the only collection step whose failure aborts a run.
pub fn resolve_commit(repo: &Path, rev: &str) -> Result<CommitRef> {
    let spec = format!("{}^{{commit}}", rev);
    let hash = run_git(repo, &["rev-parse", "--verify", "--quiet", &spec])
        .with_context(|| format!("Unknown commit reference: {}", rev))?
        .trim()
        .to_string();
    if hash.is_empty() {
        bail!("Unknown commit reference: {}", rev);
    }

    let format = "--format=%h%x1f%P%x1f%an%x1f%ae%x1f%aI%x1f%B";
    let raw = run_git(repo, &["show", "-s", format, &hash])?;
    let mut fields = raw.splitn(6, FIELD_SEP);

    let short_hash = fields.next().unwrap_or_default().trim().to_string();
    let parents = fields.next().unwrap_or_default().trim().to_string();
    let author = fields.next().unwrap_or_default().trim().to_string();
    let author_email = fields.next().unwrap_or_default().trim().to_string();
    let date_str = fields.next().unwrap_or_default().trim().to_string();
    let message = fields.next().unwrap_or_default().trim().to_string();

    let timestamp = DateTime::parse_from_rfc3339(&date_str)
        .with_context(|| format!("Unparseable author date '{}' for {}", date_str, hash))?;

    let parent = parents.split_whitespace().next().map(str::to_string);
    let base = match &parent {
        Some(p) => p.clone(),
        None => empty_tree(repo)?,
    };
    let files = changed_files(repo, &base, &hash)?;

    Ok(CommitRef {
        hash,
        short_hash,
        parent,
        author,
        author_email,
        timestamp,
        message,
        files,
    })
}

pub fn author_time(repo: &Path, rev: &str) -> Result<DateTime<FixedOffset>> {
    let out = run_git(repo, &["show", "-s", "--format=%aI", rev])?;
    DateTime::parse_from_rfc3339(out.trim())
        .with_context(|| format!("Unparseable author date for {}", rev))
}

/// Hash of the empty tree, used as the diff base for a root commit.
pub fn empty_tree(repo: &Path) -> Result<String> {
    let out = run_git(repo, &["hash-object", "-t", "tree", "--stdin"])?;
    Ok(out.trim().to_string())
}

/// Files changed between `base` and `commit`, renames reported as
/// delete + add.
pub fn changed_files(repo: &Path, base: &str, commit: &str) -> Result<Vec<ChangedFile>> {
    let out = run_git(
        repo,
        &["diff", "--numstat", "-z", "--no-renames", base, commit],
    )?;
    Ok(parse_numstat_z(&out))
}

/// Unified patch for one file between `base` and `commit`. The path is
/// matched literally, never as a glob or pathspec magic.
pub fn file_patch(repo: &Path, base: &str, commit: &str, path: &str) -> Result<String> {
    run_git(
        repo,
        &[
            "--literal-pathspecs",
            "diff",
            "--no-color",
            "--no-ext-diff",
            "--no-renames",
            base,
            commit,
            "--",
            path,
        ],
    )
}

/// `HEAD` hash and absolute git dir in a single `git` invocation.
pub fn head_and_git_dir(repo: &Path) -> Result<(String, PathBuf)> {
    let out = run_git(repo, &["rev-parse", "HEAD", "--absolute-git-dir"])?;
    let mut lines = out.lines();
    let head = lines.next().unwrap_or_default().trim().to_string();
    let git_dir = lines.next().unwrap_or_default().trim().to_string();
    if head.is_empty() || git_dir.is_empty() {
        bail!("git rev-parse returned incomplete output");
    }
    Ok((head, PathBuf::from(git_dir)))
}

/// Hooks directory, honouring `core.hooksPath`.
pub fn hooks_dir(repo: &Path) -> Result<PathBuf> {
    let out = run_git(repo, &["rev-parse", "--git-path", "hooks"])?;
    let path = PathBuf::from(out.trim());
    Ok(if path.is_absolute() {
        path
    } else {
        repo.join(path)
    })
}

/// Parse `git diff --numstat -z --no-renames` output.
///
/// Records look like `<added>\t<deleted>\t<path>\0`; binary files report
/// `-` for both counts.
fn parse_numstat_z(out: &str) -> Vec<ChangedFile> {
    out.split('\0')
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| {
            let mut parts = record.splitn(3, '\t');
            let added = parts.next()?.trim();
            let deleted = parts.next()?.trim();
            let path = parts.next()?.to_string();
            Some(ChangedFile {
                path,
                insertions: added.parse().ok(),
                deletions: deleted.parse().ok(),
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::process::Command;

    pub fn git(repo: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(repo)
            .env("GIT_AUTHOR_NAME", "Ada Lovelace")
            .env("GIT_AUTHOR_EMAIL", "ada@example.com")
            .env("GIT_COMMITTER_NAME", "Ada Lovelace")
            .env("GIT_COMMITTER_EMAIL", "ada@example.com")
            .status()
            .expect("git must be installed for tests");
        assert!(status.success(), "git {:?} failed", args);
    }

    pub fn init_repo(repo: &Path) {
        git(repo, &["init", "-q"]);
        git(repo, &["config", "commit.gpgsign", "false"]);
    }

    pub fn commit_all(repo: &Path, message: &str) {
        git(repo, &["add", "-A"]);
        git(repo, &["commit", "-q", "-m", message]);
    }
}
