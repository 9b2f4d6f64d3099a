//! `post-commit` hook installation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::git;

pub const HOOK_NAME: &str = "post-commit";

/// The line the hook runs. Output is discarded and failures ignored so the
/// commit is never affected.
pub const HOOK_LINE: &str = "devjournal hook --repo \"$(pwd)\" >/dev/null 2>&1 || true";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookInstall {
    Created,
    /// Added to an existing hook script.
    Appended,
    AlreadyInstalled,
}

/// Install (or extend) the repository's `post-commit` hook.
pub fn install_hook(repo: &Path) -> Result<(HookInstall, PathBuf)> {
    let dir = git::hooks_dir(repo)?;
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(HOOK_NAME);

    let result = if path.exists() {
        let existing = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if existing.lines().any(|l| l.trim() == HOOK_LINE) {
            return Ok((HookInstall::AlreadyInstalled, path));
        }
        let mut updated = existing;
        if !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(HOOK_LINE);
        updated.push('\n');
        std::fs::write(&path, updated)?;
        HookInstall::Appended
    } else {
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", HOOK_LINE))?;
        HookInstall::Created
    };

    make_executable(&path)?;
    Ok((result, path))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms)
        .with_context(|| format!("Failed to make {} executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
