//! Layered TOML configuration.
//!
//! Layers, lowest precedence first, are deep-merged table by table:
//!
//! 1. built-in defaults
//! 2. `<user config dir>/devjournal/config.toml`
//! 3. `<repo>/.devjournal.toml`
//! 4. an explicit `--config <path>`
//!
//! The merged document is deserialized once and validated; the rest of the
//! crate only ever sees the resulting [`Config`] value.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const PROJECT_CONFIG_FILE: &str = ".devjournal.toml";

/// One week.
pub const MAX_GAP_MINUTES: i64 = 7 * 24 * 60;
/// One year.
pub const MAX_LOOKBACK_HOURS: i64 = 365 * 24;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub diff: DiffConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JournalConfig {
    /// Journal root. Relative paths resolve against the repository root.
    #[serde(default = "default_journal_path")]
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub auto_summaries: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: default_journal_path(),
            enabled: true,
            auto_summaries: true,
        }
    }
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("journal")
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides IDE workspace-storage discovery. May point at a directory
    /// of workspace folders or directly at a `state.vscdb` file.
    #[serde(default)]
    pub workspace_storage: Option<PathBuf>,
    #[serde(default = "default_max_messages")]
    pub max_human_messages: usize,
    #[serde(default = "default_max_messages")]
    pub max_ai_messages: usize,
    #[serde(default = "default_gap_minutes")]
    pub gap_minutes: i64,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workspace_storage: None,
            max_human_messages: default_max_messages(),
            max_ai_messages: default_max_messages(),
            gap_minutes: default_gap_minutes(),
            lookback_hours: default_lookback_hours(),
        }
    }
}

fn default_max_messages() -> usize {
    200
}
fn default_gap_minutes() -> i64 {
    30
}
fn default_lookback_hours() -> i64 {
    48
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiffConfig {
    #[serde(default = "default_small_per_file")]
    pub small_per_file_bytes: usize,
    #[serde(default = "default_mid_per_file")]
    pub mid_per_file_bytes: usize,
    #[serde(default = "default_large_per_file")]
    pub large_per_file_bytes: usize,
    #[serde(default = "default_small_total")]
    pub small_total_bytes: usize,
    #[serde(default = "default_large_total")]
    pub large_total_bytes: usize,
    #[serde(default = "default_large_max_files")]
    pub large_max_files: usize,
    /// Extra globs treated as generated files, on top of the built-in list.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            small_per_file_bytes: default_small_per_file(),
            mid_per_file_bytes: default_mid_per_file(),
            large_per_file_bytes: default_large_per_file(),
            small_total_bytes: default_small_total(),
            large_total_bytes: default_large_total(),
            large_max_files: default_large_max_files(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_small_per_file() -> usize {
    10 * 1024
}
fn default_mid_per_file() -> usize {
    2560
}
fn default_large_per_file() -> usize {
    1024
}
fn default_small_total() -> usize {
    50 * 1024
}
fn default_large_total() -> usize {
    25 * 1024
}
fn default_large_max_files() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// Absolute journal root for a repository.
    pub fn journal_root(&self, repo: &Path) -> PathBuf {
        if self.journal.path.is_absolute() {
            self.journal.path.clone()
        } else {
            repo.join(&self.journal.path)
        }
    }
}

/// User-global config file, e.g. `~/.config/devjournal/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("devjournal").join("config.toml"))
}

/// Load the layered configuration for `repo`.
///
/// Missing global and project files are skipped; a missing explicit file is
/// an error.
pub fn load_config(explicit: Option<&Path>, repo: &Path) -> Result<Config> {
    let mut layers = Vec::new();
    if let Some(global) = global_config_path() {
        if global.is_file() {
            layers.push(global);
        }
    }
    let project = repo.join(PROJECT_CONFIG_FILE);
    if project.is_file() {
        layers.push(project);
    }
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("Config file not found: {}", path.display());
        }
        layers.push(path.to_path_buf());
    }
    load_layers(&layers)
}

/// Merge the given files in order (later wins) and validate the result.
pub fn load_layers(paths: &[PathBuf]) -> Result<Config> {
    let mut merged = toml::Value::Table(toml::map::Map::new());

    for path in paths {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let layer: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        merge_values(&mut merged, layer);
    }

    let config: Config = merged
        .try_into()
        .with_context(|| "Failed to parse merged configuration")?;
    validate(&config)?;
    Ok(config)
}

fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.chat.max_human_messages == 0 || config.chat.max_ai_messages == 0 {
        bail!("chat.max_human_messages and chat.max_ai_messages must be > 0");
    }
    if !(1..=MAX_GAP_MINUTES).contains(&config.chat.gap_minutes) {
        bail!("chat.gap_minutes must be between 1 and {}", MAX_GAP_MINUTES);
    }
    if !(1..=MAX_LOOKBACK_HOURS).contains(&config.chat.lookback_hours) {
        bail!("chat.lookback_hours must be between 1 and {}", MAX_LOOKBACK_HOURS);
    }

    let diff = &config.diff;
    if diff.small_per_file_bytes == 0
        || diff.mid_per_file_bytes == 0
        || diff.large_per_file_bytes == 0
    {
        bail!("diff per-file limits must be > 0");
    }
    if diff.small_total_bytes == 0 || diff.large_total_bytes == 0 {
        bail!("diff total limits must be > 0");
    }
    if diff.large_max_files == 0 {
        bail!("diff.large_max_files must be > 0");
    }

    if config.llm.timeout_secs == 0 {
        bail!("llm.timeout_secs must be > 0");
    }
    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_files() {
        let config = load_layers(&[]).unwrap();
        assert_eq!(config.chat.max_human_messages, 200);
        assert_eq!(config.chat.max_ai_messages, 200);
        assert_eq!(config.chat.gap_minutes, 30);
        assert_eq!(config.diff.small_per_file_bytes, 10240);
        assert_eq!(config.llm.provider, "openai");
        assert!(config.journal.enabled);
    }

    #[test]
    fn test_later_layer_wins_per_key() {
        let tmp = TempDir::new().unwrap();
        let global = write(
            &tmp,
            "global.toml",
            "[llm]\nmodel = \"global-model\"\ntimeout_secs = 10\n[chat]\ngap_minutes = 45\n",
        );
        let project = write(&tmp, "project.toml", "[llm]\nmodel = \"project-model\"\n");

        let config = load_layers(&[global, project]).unwrap();
        assert_eq!(config.llm.model, "project-model");
        // untouched keys from the lower layer survive the merge
        assert_eq!(config.llm.timeout_secs, 10);
        assert_eq!(config.chat.gap_minutes, 45);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "c.toml", "[llm]\nprovider = \"carrier-pigeon\"\n");
        let err = load_layers(&[path]).unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "c.toml", "[chat]\nmax_ai_messages = 0\n");
        assert!(load_layers(&[path]).is_err());
    }

    #[test]
    fn test_oversized_windows_rejected() {
        let tmp = TempDir::new().unwrap();
        let gap = write(&tmp, "gap.toml", "[chat]\ngap_minutes = 9223372036854775807\n");
        let err = load_layers(&[gap]).unwrap_err();
        assert!(err.to_string().contains("chat.gap_minutes"));

        let lookback = write(&tmp, "lookback.toml", "[chat]\nlookback_hours = 1000000000\n");
        let err = load_layers(&[lookback]).unwrap_err();
        assert!(err.to_string().contains("chat.lookback_hours"));

        let edge = write(&tmp, "edge.toml", "[chat]\ngap_minutes = 10080\nlookback_hours = 8760\n");
        assert!(load_layers(&[edge]).is_ok());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        assert!(load_config(Some(&missing), tmp.path()).is_err());
    }

    #[test]
    fn test_project_file_is_picked_up() {
        let tmp = TempDir::new().unwrap();
        write(&tmp, PROJECT_CONFIG_FILE, "[journal]\npath = \"notes\"\n");
        let config = load_config(None, tmp.path()).unwrap();
        assert_eq!(config.journal_root(tmp.path()), tmp.path().join("notes"));
    }
}
