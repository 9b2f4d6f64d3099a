//! Hook-side dispatch.
//!
//! The post-commit hook must return immediately, so all it does is resolve
//! `HEAD` and launch `devjournal worker` as a detached process whose output
//! goes to `<git-dir>/devjournal/worker.log`. The worker is never waited on
//! and outlives the hook.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::git;

/// Setting this to `1`, `true`, or `yes` turns the hook into a no-op.
pub const BYPASS_ENV: &str = "DEVJOURNAL_DISABLE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Spawned {
        pid: u32,
        commit: String,
        log: PathBuf,
    },
    Bypassed,
    /// Nothing launched; the reason is also logged.
    Skipped(String),
}

pub fn bypass_requested() -> bool {
    std::env::var(BYPASS_ENV)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Launch a worker for the repository's current `HEAD`. Never fails.
pub fn on_commit(repo: &Path) -> DispatchOutcome {
    if bypass_requested() {
        tracing::debug!("{} set; skipping", BYPASS_ENV);
        return DispatchOutcome::Bypassed;
    }

    match dispatch(repo) {
        Ok(outcome) => outcome,
        Err(e) => {
            let reason = format!("{:#}", e);
            tracing::warn!(error = %reason, "worker not started");
            DispatchOutcome::Skipped(reason)
        }
    }
}

fn dispatch(repo: &Path) -> Result<DispatchOutcome> {
    let exe = std::env::current_exe().context("Failed to locate the devjournal executable")?;
    launch(repo, &exe)
}

fn launch(repo: &Path, exe: &Path) -> Result<DispatchOutcome> {
    let (commit, git_dir) = git::head_and_git_dir(repo)?;
    // The worker runs with the repo as its cwd, so hand it an absolute path.
    let repo = repo.canonicalize().unwrap_or_else(|_| repo.to_path_buf());
    let log = git_dir.join("devjournal").join("worker.log");

    let pid = spawn_worker(exe, &repo, &commit, &log)?;
    tracing::debug!(pid, commit = %commit, "worker started");
    Ok(DispatchOutcome::Spawned { pid, commit, log })
}

/// Start `exe worker --repo <repo> --commit <commit>` detached from the
/// caller, with output appended to `log`.
pub fn spawn_worker(exe: &Path, repo: &Path, commit: &str, log: &Path) -> Result<u32> {
    if let Some(parent) = log.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .with_context(|| format!("Failed to open {}", log.display()))?;

    let mut cmd = Command::new(exe);
    cmd.arg("worker")
        .arg("--repo")
        .arg(repo)
        .arg("--commit")
        .arg(commit)
        .current_dir(repo)
        .stdin(Stdio::null())
        .stdout(Stdio::from(file.try_clone()?))
        .stderr(Stdio::from(file));
    detach(&mut cmd);

    let child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn {}", exe.display()))?;
    Ok(child.id())
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // New session: the worker survives the hook's process group going away.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}
