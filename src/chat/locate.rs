//! Discovery of the IDE's per-workspace chat databases.
//!
//! The IDE (Cursor) keeps one `state.vscdb` SQLite file per workspace under a
//! `workspaceStorage` directory whose location depends on the platform:
//!
//! | Platform | Root |
//! |----------|------|
//! | override | `chat.workspace_storage` |
//! | Windows | `%APPDATA%\Cursor\User\workspaceStorage` |
//! | WSL | `/mnt/c/Users/<user>/AppData/Roaming/Cursor/User/workspaceStorage` |
//! | macOS | `~/Library/Application Support/Cursor/User/workspaceStorage` |
//! | Linux | `$XDG_CONFIG_HOME/Cursor/User/workspaceStorage` |
//! | remote | `~/.cursor-server/data/User/workspaceStorage` |
//!
//! Discovery never fails: an empty result only means the journal entry is
//! written without chat context.

use percent_encoding::percent_decode_str;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

use crate::config::ChatConfig;

pub const STATE_DB_FILE: &str = "state.vscdb";
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
const STORAGE_TAIL: [&str; 3] = ["Cursor", "User", "workspaceStorage"];

/// All per-workspace chat databases, newest first.
pub fn locate_chat_databases(config: &ChatConfig) -> Vec<PathBuf> {
    let roots = candidate_roots(config);
    let found = scan_roots(&roots);
    tracing::debug!(roots = roots.len(), databases = found.len(), "chat store discovery");
    found
}

/// Storage roots in lookup order. Roots need not exist.
///
/// A configured `workspace_storage` replaces platform discovery entirely.
pub fn candidate_roots(config: &ChatConfig) -> Vec<PathBuf> {
    match &config.workspace_storage {
        Some(path) => vec![path.clone()],
        None => platform_roots(),
    }
}

fn platform_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    let home = dirs::home_dir();

    if cfg!(windows) {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            roots.push(with_storage_tail(PathBuf::from(appdata)));
        }
    }

    if cfg!(target_os = "linux") && is_wsl() {
        roots.extend(wsl_roots(Path::new("/mnt/c/Users")));
    }

    if cfg!(target_os = "macos") {
        if let Some(home) = &home {
            roots.push(with_storage_tail(
                home.join("Library").join("Application Support"),
            ));
        }
    }

    if cfg!(target_os = "linux") {
        if let Some(config_dir) = dirs::config_dir() {
            roots.push(with_storage_tail(config_dir));
        }
    }

    if let Some(home) = &home {
        roots.push(
            home.join(".cursor-server")
                .join("data")
                .join("User")
                .join("workspaceStorage"),
        );
    }

    roots
}

fn with_storage_tail(base: PathBuf) -> PathBuf {
    STORAGE_TAIL.iter().fold(base, |p, part| p.join(part))
}

fn is_wsl() -> bool {
    std::fs::read_to_string("/proc/version")
        .map(|v| v.to_lowercase().contains("microsoft"))
        .unwrap_or(false)
}

/// Windows profile roots as seen from inside WSL.
fn wsl_roots(users_dir: &Path) -> Vec<PathBuf> {
    const SKIP: [&str; 4] = ["Public", "Default", "Default User", "All Users"];

    let Ok(entries) = std::fs::read_dir(users_dir) else {
        return Vec::new();
    };
    let mut roots: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter(|e| !SKIP.contains(&e.file_name().to_string_lossy().as_ref()))
        .map(|e| with_storage_tail(e.path().join("AppData").join("Roaming")))
        .collect();
    roots.sort();
    roots
}

/// Find valid databases under each root. A root may also be a direct path to
/// a database file.
pub fn scan_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut found: Vec<(PathBuf, SystemTime)> = Vec::new();

    for root in roots {
        let candidates: Vec<PathBuf> = if root.is_file() {
            vec![root.clone()]
        } else if root.is_dir() {
            WalkDir::new(root)
                .min_depth(1)
                .max_depth(2)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && e.file_name() == STATE_DB_FILE)
                .map(|e| e.into_path())
                .collect()
        } else {
            continue;
        };

        for path in candidates {
            if !is_sqlite_file(&path) {
                tracing::debug!(path = %path.display(), "ignoring non-sqlite candidate");
                continue;
            }
            let key = path.canonicalize().unwrap_or_else(|_| path.clone());
            if !seen.insert(key) {
                continue;
            }
            let modified = modified_time(&path);
            found.push((path, modified));
        }
    }

    found.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    found.into_iter().map(|(p, _)| p).collect()
}

fn is_sqlite_file(path: &Path) -> bool {
    use std::io::Read;

    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut header = [0u8; 16];
    file.read_exact(&mut header).is_ok() && &header == SQLITE_HEADER
}

fn modified_time(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Workspace folder recorded next to a database in `workspace.json`.
pub fn workspace_folder(db_path: &Path) -> Option<String> {
    let json_path = db_path.parent()?.join("workspace.json");
    let content = std::fs::read_to_string(json_path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&content).ok()?;
    let uri = value
        .get("folder")
        .or_else(|| value.get("workspace"))
        .and_then(|v| v.as_str())?;
    folder_uri_to_path(uri)
}

/// Convert a workspace URI into a plain path string.
///
/// Handles `file://` and `vscode-remote://<authority>` URIs, percent-decoding
/// and Windows drive prefixes (`/c:/Users` → `c:/Users`).
pub fn folder_uri_to_path(uri: &str) -> Option<String> {
    let rest = if let Some(rest) = uri.strip_prefix("file://") {
        rest
    } else if let Some(rest) = uri.strip_prefix("vscode-remote://") {
        &rest[rest.find('/')?..]
    } else {
        uri
    };

    let decoded = percent_decode_str(rest).decode_utf8().ok()?.to_string();
    let bytes = decoded.as_bytes();
    let path = if bytes.len() >= 3 && bytes[0] == b'/' && bytes[2] == b':' {
        decoded[1..].to_string()
    } else {
        decoded
    };
    Some(path)
}

fn normalize(path: &str) -> String {
    let mut p = path.replace('\\', "/");
    // Verbatim prefixes from `canonicalize` on Windows
    if let Some(rest) = p.strip_prefix("//?/UNC/") {
        p = format!("//{}", rest);
    } else if let Some(rest) = p.strip_prefix("//?/") {
        p = rest.to_string();
    }
    while p.len() > 1 && p.ends_with('/') {
        p.pop();
    }
    // Windows drive letters are case-insensitive
    let bytes = p.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' {
        p = p[..1].to_lowercase() + &p[1..];
    }
    p
}

pub fn folder_matches_repo(folder: &str, repo: &Path) -> bool {
    let repo = repo.canonicalize().unwrap_or_else(|_| repo.to_path_buf());
    normalize(folder) == normalize(&repo.to_string_lossy())
}

/// Narrow discovered databases to the ones relevant for `repo`.
///
/// Databases whose workspace folder is the repository win. Without a match,
/// the single most recently modified database touched within `lookback` is
/// used. `dbs` must be newest first, as returned by
/// [`locate_chat_databases`].
pub fn select_for_repo(dbs: &[PathBuf], repo: &Path, lookback: Duration) -> Vec<PathBuf> {
    let matching: Vec<PathBuf> = dbs
        .iter()
        .filter(|db| {
            workspace_folder(db)
                .map(|folder| folder_matches_repo(&folder, repo))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    if !matching.is_empty() {
        return matching;
    }

    let now = SystemTime::now();
    dbs.iter()
        .find(|db| {
            now.duration_since(modified_time(db))
                .map(|age| age <= lookback)
                .unwrap_or(true)
        })
        .cloned()
        .into_iter()
        .collect()
}
