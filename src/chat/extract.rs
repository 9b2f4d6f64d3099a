//! Conversation extraction from the IDE's chat databases.
//!
//! Each workspace database has a key/value `ItemTable`. Over its lifetime the
//! IDE has stored conversations in three shapes, each under its own key:
//!
//! | Format | Discriminator key | Payload |
//! |--------|-------------------|---------|
//! | [`StoreFormat::Composer`] | `composer.composerData` | composer ids; bodies live in the global `cursorDiskKV` table |
//! | [`StoreFormat::ChatView`] | `workbench.panel.aichat.view.aichat.chatdata` | `tabs[].bubbles[]` |
//! | [`StoreFormat::LegacyPrompts`] | `aiService.prompts` | prompt list plus `aiService.generations` |
//!
//! Formats are probed newest first; the first one that yields messages wins.
//! Every variant parser produces the same [`ChatMessage`] shape, and the
//! result is put in time order with [`sort_chronologically`]. Databases are
//! opened read-only and never written.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

use super::locate::STATE_DB_FILE;
use crate::models::{ChatMessage, Role};

const ITEM_TABLE: &str = "ItemTable";
const GLOBAL_KV_TABLE: &str = "cursorDiskKV";
const GENERATIONS_KEY: &str = "aiService.generations";

/// Closed set of known conversation storage formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFormat {
    Composer,
    ChatView,
    LegacyPrompts,
}

impl StoreFormat {
    /// Newest first.
    pub const ALL: [StoreFormat; 3] = [
        StoreFormat::Composer,
        StoreFormat::ChatView,
        StoreFormat::LegacyPrompts,
    ];

    pub fn discriminator_key(self) -> &'static str {
        match self {
            StoreFormat::Composer => "composer.composerData",
            StoreFormat::ChatView => "workbench.panel.aichat.view.aichat.chatdata",
            StoreFormat::LegacyPrompts => "aiService.prompts",
        }
    }
}

/// Messages parsed from one payload plus the count of malformed records.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub messages: Vec<ChatMessage>,
    pub skipped: usize,
}

impl ParseOutcome {
    fn push(&mut self, message: Option<ChatMessage>) {
        match message {
            Some(m) => self.messages.push(m),
            None => self.skipped += 1,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Extraction {
    /// Format the messages came from; `None` when no known key was present.
    pub format: Option<StoreFormat>,
    pub messages: Vec<ChatMessage>,
    pub skipped: usize,
}

/// Read all conversation messages from one workspace database.
///
/// Unknown or absent keys produce an empty extraction. Errors are returned
/// only when the database itself cannot be opened or queried.
pub async fn extract_messages(db_path: &Path) -> Result<Extraction> {
    let pool = open_read_only(db_path).await?;
    let result = extract_from_pool(&pool, db_path).await;
    pool.close().await;
    result
}

async fn extract_from_pool(pool: &SqlitePool, db_path: &Path) -> Result<Extraction> {
    if !table_exists(pool, ITEM_TABLE).await? {
        return Ok(Extraction::default());
    }

    let mut extraction = Extraction::default();

    for format in StoreFormat::ALL {
        let Some(raw) = read_value(pool, ITEM_TABLE, format.discriminator_key()).await? else {
            continue;
        };

        let outcome = match format {
            StoreFormat::Composer => match extract_composer(db_path, &raw).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(
                        db = %db_path.display(),
                        error = %format!("{:#}", e),
                        "composer store unreadable; trying older formats"
                    );
                    ParseOutcome {
                        messages: Vec::new(),
                        skipped: 1,
                    }
                }
            },
            StoreFormat::ChatView => parse_chat_view(&raw),
            StoreFormat::LegacyPrompts => {
                let generations = read_value(pool, ITEM_TABLE, GENERATIONS_KEY).await?;
                parse_legacy(&raw, generations.as_deref())
            }
        };

        extraction.skipped += outcome.skipped;
        if extraction.format.is_none() {
            extraction.format = Some(format);
        }
        if !outcome.messages.is_empty() {
            extraction.format = Some(format);
            extraction.messages = sort_chronologically(outcome.messages);
            break;
        }
    }

    tracing::debug!(
        db = %db_path.display(),
        format = ?extraction.format,
        messages = extraction.messages.len(),
        skipped = extraction.skipped,
        "extracted chat messages"
    );
    Ok(extraction)
}

async fn open_read_only(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open chat database: {}", path.display()))?;

    Ok(pool)
}

async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name = ?",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

async fn read_value(pool: &SqlitePool, table: &str, key: &str) -> Result<Option<String>> {
    let sql = format!("SELECT CAST(value AS TEXT) FROM {} WHERE key = ?", table);
    let value: Option<Option<String>> = sqlx::query_scalar(&sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to read key '{}'", key))?;
    Ok(value.flatten())
}

/// Order messages by assistant timestamp.
///
/// The stream is cut into turns, each ending at a timed assistant message;
/// untimed messages stay in the turn of the reply that follows them. Turns
/// are stably sorted by that reply's time. A trailing turn without a timed
/// reply keeps the time of the turn before it, so it stays in place.
pub fn sort_chronologically(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut turns: Vec<(Option<DateTime<Utc>>, Vec<ChatMessage>)> = Vec::new();
    let mut current = Vec::new();
    for message in messages {
        let closes_turn = message.role == Role::Assistant && message.timestamp.is_some();
        let time = message.timestamp;
        current.push(message);
        if closes_turn {
            turns.push((time, std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        let last = turns.last().and_then(|(time, _)| *time);
        turns.push((last, current));
    }

    turns.sort_by_key(|(time, _)| *time);
    turns.into_iter().flat_map(|(_, turn)| turn).collect()
}

// ============ Composer ============

#[derive(Debug, Clone, PartialEq, Eq)]
struct ComposerHeader {
    id: String,
    created_at: i64,
}

/// The shared global database sits at `User/globalStorage/state.vscdb`,
/// two levels above a workspace database.
fn global_db_path(workspace_db: &Path) -> Option<PathBuf> {
    let user_dir = workspace_db.parent()?.parent()?.parent()?;
    Some(user_dir.join("globalStorage").join(STATE_DB_FILE))
}

async fn extract_composer(db_path: &Path, index_raw: &str) -> Result<ParseOutcome> {
    let (headers, mut outcome) = parse_composer_index(index_raw);
    if headers.is_empty() {
        return Ok(outcome);
    }

    let Some(global) = global_db_path(db_path).filter(|p| p.is_file()) else {
        tracing::warn!(db = %db_path.display(), "composer data present but global database missing");
        return Ok(outcome);
    };

    let pool = open_read_only(&global).await?;
    let result = read_composers(&pool, &headers, &mut outcome).await;
    pool.close().await;
    result?;

    Ok(outcome)
}

async fn read_composers(
    pool: &SqlitePool,
    headers: &[ComposerHeader],
    outcome: &mut ParseOutcome,
) -> Result<()> {
    if !table_exists(pool, GLOBAL_KV_TABLE).await? {
        return Ok(());
    }

    for header in headers {
        let key = format!("composerData:{}", header.id);
        let Some(raw) = read_value(pool, GLOBAL_KV_TABLE, &key).await? else {
            outcome.skipped += 1;
            continue;
        };
        let Ok(body) = serde_json::from_str::<Value>(&raw) else {
            outcome.skipped += 1;
            continue;
        };

        let inline = body
            .get("conversation")
            .and_then(|c| c.as_array())
            .filter(|c| !c.is_empty());
        if let Some(bubbles) = inline {
            for bubble in bubbles {
                outcome.push(parse_bubble(bubble));
            }
            continue;
        }

        let bubble_ids = body
            .get("fullConversationHeadersOnly")
            .and_then(|h| h.as_array())
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|h| h.get("bubbleId").and_then(|b| b.as_str()))
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        for bubble_id in bubble_ids {
            let key = format!("bubbleId:{}:{}", header.id, bubble_id);
            let bubble = read_value(pool, GLOBAL_KV_TABLE, &key)
                .await?
                .and_then(|raw| serde_json::from_str::<Value>(&raw).ok());
            outcome.push(bubble.as_ref().and_then(parse_bubble));
        }
    }

    Ok(())
}

/// Parse the workspace's composer index, oldest conversation first.
fn parse_composer_index(raw: &str) -> (Vec<ComposerHeader>, ParseOutcome) {
    let mut outcome = ParseOutcome::default();
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        outcome.skipped += 1;
        return (Vec::new(), outcome);
    };

    let mut headers = Vec::new();
    for composer in value
        .get("allComposers")
        .and_then(|a| a.as_array())
        .into_iter()
        .flatten()
    {
        match composer.get("composerId").and_then(|id| id.as_str()) {
            Some(id) => headers.push(ComposerHeader {
                id: id.to_string(),
                created_at: composer
                    .get("createdAt")
                    .and_then(|c| c.as_i64())
                    .unwrap_or(0),
            }),
            None => outcome.skipped += 1,
        }
    }
    headers.sort_by_key(|h| h.created_at);
    (headers, outcome)
}

// ============ Chat view ============

pub fn parse_chat_view(raw: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        outcome.skipped += 1;
        return outcome;
    };

    for tab in value
        .get("tabs")
        .and_then(|t| t.as_array())
        .into_iter()
        .flatten()
    {
        for bubble in tab
            .get("bubbles")
            .and_then(|b| b.as_array())
            .into_iter()
            .flatten()
        {
            outcome.push(parse_bubble(bubble));
        }
    }
    outcome
}

// ============ Legacy prompts ============

/// Prompts carry no role or timestamp; generations are the assistant side
/// with `unixMs`. The two lists are interleaved pairwise.
pub fn parse_legacy(prompts_raw: &str, generations_raw: Option<&str>) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    let prompts = match serde_json::from_str::<Value>(prompts_raw) {
        Ok(Value::Array(items)) => items,
        _ => {
            outcome.skipped += 1;
            Vec::new()
        }
    };
    let generations = match generations_raw.map(serde_json::from_str::<Value>) {
        Some(Ok(Value::Array(items))) => items,
        Some(_) => {
            outcome.skipped += 1;
            Vec::new()
        }
        None => Vec::new(),
    };

    for i in 0..prompts.len().max(generations.len()) {
        if let Some(prompt) = prompts.get(i) {
            outcome.push(non_empty_text(prompt, &["text", "prompt"]).map(ChatMessage::human));
        }
        if let Some(generation) = generations.get(i) {
            let timestamp = generation.get("unixMs").and_then(parse_timestamp);
            outcome.push(
                non_empty_text(generation, &["textDescription", "text"])
                    .map(|text| ChatMessage::assistant(text, timestamp)),
            );
        }
    }
    outcome
}

// ============ Shared field parsing ============

/// Parse one bubble (a single turn) from any of the JSON formats.
pub fn parse_bubble(value: &Value) -> Option<ChatMessage> {
    let role = value
        .get("type")
        .or_else(|| value.get("role"))
        .and_then(normalize_role)?;
    let text = non_empty_text(value, &["text", "rawText", "content"])?;

    let timestamp = ["createdAt", "timestamp", "unixMs"]
        .iter()
        .find_map(|key| value.get(*key).and_then(parse_timestamp))
        .or_else(|| {
            let timing = value.get("timingInfo")?;
            ["clientEndTime", "clientRpcSendTime", "clientStartTime"]
                .iter()
                .find_map(|key| timing.get(*key).and_then(parse_timestamp))
        });

    Some(ChatMessage {
        role,
        text,
        timestamp,
    })
}

/// Map the stored role (numeric or string) onto [`Role`].
pub fn normalize_role(value: &Value) -> Option<Role> {
    match value {
        Value::Number(n) => match n.as_i64()? {
            1 => Some(Role::Human),
            2 => Some(Role::Assistant),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "user" | "human" => Some(Role::Human),
            "2" | "ai" | "assistant" | "bot" => Some(Role::Assistant),
            _ => None,
        },
        _ => None,
    }
}

/// Epoch milliseconds, epoch seconds, or an RFC 3339 string.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let millis = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
                return Some(dt.with_timezone(&Utc));
            }
            s.trim().parse::<i64>().ok()?
        }
        _ => return None,
    };
    if millis <= 0 {
        return None;
    }
    // Anything below 1e11 is too small to be milliseconds since 1973.
    let millis = if millis < 100_000_000_000 {
        millis * 1000
    } else {
        millis
    };
    Utc.timestamp_millis_opt(millis).single()
}

fn non_empty_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_db(path: &Path, table: &str, rows: &[(&str, String)]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query(&format!(
            "CREATE TABLE {} (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB)",
            table
        ))
        .execute(&pool)
        .await
        .unwrap();
        for (key, value) in rows {
            sqlx::query(&format!("INSERT INTO {} (key, value) VALUES (?, ?)", table))
                .bind(*key)
                .bind(value.as_bytes())
                .execute(&pool)
                .await
                .unwrap();
        }
        pool.close().await;
    }

    #[test]
    fn test_normalize_role_variants() {
        assert_eq!(normalize_role(&json!(1)), Some(Role::Human));
        assert_eq!(normalize_role(&json!(2)), Some(Role::Assistant));
        assert_eq!(normalize_role(&json!("user")), Some(Role::Human));
        assert_eq!(normalize_role(&json!("AI")), Some(Role::Assistant));
        assert_eq!(normalize_role(&json!("assistant")), Some(Role::Assistant));
        assert_eq!(normalize_role(&json!(7)), None);
        assert_eq!(normalize_role(&json!(null)), None);
    }

    #[test]
    fn test_parse_timestamp_units() {
        let ms = parse_timestamp(&json!(1_717_430_400_000i64)).unwrap();
        let secs = parse_timestamp(&json!(1_717_430_400i64)).unwrap();
        let iso = parse_timestamp(&json!("2024-06-03T16:00:00Z")).unwrap();
        assert_eq!(ms, secs);
        assert_eq!(ms, iso);
        assert!(parse_timestamp(&json!("yesterday")).is_none());
    }

    #[test]
    fn test_chat_view_skips_malformed_bubbles() {
        let raw = json!({
            "tabs": [{
                "tabId": "t1",
                "bubbles": [
                    {"type": "user", "text": "why does the build fail?"},
                    {"type": "ai", "rawText": "The lockfile is stale."},
                    {"type": "system", "text": "ignored"},
                    {"type": "user", "text": "   "}
                ]
            }]
        })
        .to_string();

        let outcome = parse_chat_view(&raw);
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[0].role, Role::Human);
        assert_eq!(outcome.messages[1].text, "The lockfile is stale.");
        assert_eq!(outcome.skipped, 2);
    }

    #[test]
    fn test_chat_view_invalid_payload_counts_as_skipped() {
        let outcome = parse_chat_view("{not json");
        assert!(outcome.messages.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_legacy_interleaves_prompts_and_generations() {
        let prompts = json!([{"text": "first"}, {"text": "second"}]).to_string();
        let generations = json!([
            {"unixMs": 1_717_430_400_000i64, "textDescription": "answer one"},
        ])
        .to_string();

        let outcome = parse_legacy(&prompts, Some(generations.as_str()));
        let roles: Vec<Role> = outcome.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::Human, Role::Assistant, Role::Human]);
        assert!(outcome.messages[1].timestamp.is_some());
        assert!(outcome.messages[0].timestamp.is_none());
    }

    #[test]
    fn test_global_db_path() {
        let ws = Path::new("/x/User/workspaceStorage/abc/state.vscdb");
        assert_eq!(
            global_db_path(ws).unwrap(),
            PathBuf::from("/x/User/globalStorage/state.vscdb")
        );
    }

    #[tokio::test]
    async fn test_extract_missing_keys_is_empty() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("ws").join(STATE_DB_FILE);
        create_db(&db, ITEM_TABLE, &[("unrelated.key", "{}".to_string())]).await;

        let extraction = extract_messages(&db).await.unwrap();
        assert!(extraction.format.is_none());
        assert!(extraction.messages.is_empty());
    }

    #[tokio::test]
    async fn test_extract_chat_view_database() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("ws").join(STATE_DB_FILE);
        let payload = json!({
            "tabs": [{"bubbles": [
                {"type": 1, "text": "add retries"},
                {"type": 2, "text": "Added exponential backoff."}
            ]}]
        })
        .to_string();
        create_db(
            &db,
            ITEM_TABLE,
            &[(StoreFormat::ChatView.discriminator_key(), payload)],
        )
        .await;

        let extraction = extract_messages(&db).await.unwrap();
        assert_eq!(extraction.format, Some(StoreFormat::ChatView));
        assert_eq!(extraction.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_extract_composer_from_global_store() {
        let tmp = TempDir::new().unwrap();
        let user = tmp.path().join("User");
        let ws_db = user.join("workspaceStorage").join("abc").join(STATE_DB_FILE);
        let global_db = user.join("globalStorage").join(STATE_DB_FILE);

        let index = json!({"allComposers": [
            {"composerId": "late", "createdAt": 2000},
            {"composerId": "early", "createdAt": 1000}
        ]})
        .to_string();
        create_db(
            &ws_db,
            ITEM_TABLE,
            &[(StoreFormat::Composer.discriminator_key(), index)],
        )
        .await;

        let early = json!({"conversation": [
            {"type": 1, "text": "early question"},
            {"type": 2, "text": "early answer", "createdAt": "2024-06-03T10:00:00Z"}
        ]})
        .to_string();
        let late = json!({"fullConversationHeadersOnly": [
            {"bubbleId": "b1", "type": 1},
            {"bubbleId": "b2", "type": 2},
            {"bubbleId": "missing", "type": 2}
        ]})
        .to_string();
        let b1 = json!({"type": 1, "text": "late question"}).to_string();
        let b2 = json!({
            "type": 2,
            "text": "late answer",
            "timingInfo": {"clientEndTime": 1_717_430_400_000i64}
        })
        .to_string();
        create_db(
            &global_db,
            GLOBAL_KV_TABLE,
            &[
                ("composerData:early", early),
                ("composerData:late", late),
                ("bubbleId:late:b1", b1),
                ("bubbleId:late:b2", b2),
            ],
        )
        .await;

        let extraction = extract_messages(&ws_db).await.unwrap();
        assert_eq!(extraction.format, Some(StoreFormat::Composer));
        let texts: Vec<&str> = extraction.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            ["early question", "early answer", "late question", "late answer"]
        );
        assert!(extraction.messages[3].timestamp.is_some());
        assert_eq!(extraction.skipped, 1);
    }

    #[test]
    fn test_sort_chronologically_keeps_prompts_with_replies() {
        let at = |h: u32| Some(Utc.with_ymd_and_hms(2024, 6, 3, h, 0, 0).unwrap());
        let messages = vec![
            ChatMessage::human("late q"),
            ChatMessage::assistant("late a", at(11)),
            ChatMessage::human("early q"),
            ChatMessage::assistant("early a", at(9)),
            ChatMessage::human("trailing"),
        ];
        let sorted = sort_chronologically(messages);
        let texts: Vec<&str> = sorted.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["early q", "early a", "trailing", "late q", "late a"]);
    }

    #[test]
    fn test_sort_chronologically_untimed_stream_unchanged() {
        let messages = vec![
            ChatMessage::human("one"),
            ChatMessage::assistant("two", None),
            ChatMessage::human("three"),
        ];
        assert_eq!(sort_chronologically(messages.clone()), messages);
    }

    #[tokio::test]
    async fn test_overlapping_composers_segment_in_time_order() {
        use crate::chat::boundary::segment;

        let tmp = TempDir::new().unwrap();
        let user = tmp.path().join("User");
        let ws_db = user.join("workspaceStorage").join("abc").join(STATE_DB_FILE);
        let global_db = user.join("globalStorage").join(STATE_DB_FILE);

        let index = json!({"allComposers": [
            {"composerId": "a", "createdAt": 1},
            {"composerId": "b", "createdAt": 2}
        ]})
        .to_string();
        create_db(
            &ws_db,
            ITEM_TABLE,
            &[(StoreFormat::Composer.discriminator_key(), index)],
        )
        .await;

        let turns = |times: &[&str]| {
            let bubbles: Vec<Value> = times
                .iter()
                .flat_map(|t| {
                    [
                        json!({"type": 1, "text": format!("question {}", t)}),
                        json!({"type": 2, "text": format!("answer {}", t), "createdAt": t}),
                    ]
                })
                .collect();
            json!({ "conversation": bubbles }).to_string()
        };
        let a = turns(&[
            "2024-06-03T09:00:00Z",
            "2024-06-03T09:10:00Z",
            "2024-06-03T11:00:00Z",
            "2024-06-03T12:00:00Z",
        ]);
        let b = turns(&["2024-06-03T10:00:00Z", "2024-06-03T10:20:00Z"]);
        create_db(
            &global_db,
            GLOBAL_KV_TABLE,
            &[("composerData:a", a), ("composerData:b", b)],
        )
        .await;

        let extraction = extract_messages(&ws_db).await.unwrap();
        assert_eq!(extraction.messages.len(), 12);
        assert_eq!(extraction.messages[4].text, "question 2024-06-03T10:00:00Z");
        assert_eq!(extraction.messages[5].text, "answer 2024-06-03T10:00:00Z");

        let segments = segment(extraction.messages, 30);
        let spans: Vec<(u32, u32)> = segments
            .iter()
            .map(|s| {
                use chrono::Timelike;
                (s.start_time.unwrap().hour(), s.end_time.unwrap().hour())
            })
            .collect();
        assert_eq!(spans, [(9, 9), (10, 10), (11, 11), (12, 12)]);
        for s in &segments {
            assert!(s.start_time <= s.end_time);
        }
        for pair in segments.windows(2) {
            assert!(pair[0].end_time < pair[1].start_time);
        }
    }

    #[tokio::test]
    async fn test_unreadable_global_store_falls_back_to_chat_view() {
        let tmp = TempDir::new().unwrap();
        let user = tmp.path().join("User");
        let ws_db = user.join("workspaceStorage").join("abc").join(STATE_DB_FILE);
        let global_db = user.join("globalStorage").join(STATE_DB_FILE);

        let index = json!({"allComposers": [{"composerId": "c1", "createdAt": 1}]}).to_string();
        let chat_view = json!({
            "tabs": [{"bubbles": [
                {"type": 1, "text": "why is CI red?"},
                {"type": 2, "text": "A flaky test."}
            ]}]
        })
        .to_string();
        create_db(
            &ws_db,
            ITEM_TABLE,
            &[
                (StoreFormat::Composer.discriminator_key(), index),
                (StoreFormat::ChatView.discriminator_key(), chat_view),
            ],
        )
        .await;
        std::fs::create_dir_all(global_db.parent().unwrap()).unwrap();
        std::fs::write(&global_db, vec![0x42u8; 4096]).unwrap();

        let extraction = extract_messages(&ws_db).await.unwrap();
        assert_eq!(extraction.format, Some(StoreFormat::ChatView));
        assert_eq!(extraction.messages.len(), 2);
        assert!(extraction.skipped >= 1);
    }

    #[tokio::test]
    async fn test_extract_falls_back_to_older_format() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("User").join("workspaceStorage").join("w").join(STATE_DB_FILE);
        // composer index present, but no global database next to it
        let index = json!({"allComposers": [{"composerId": "c1", "createdAt": 1}]}).to_string();
        let prompts = json!([{"text": "legacy prompt"}]).to_string();
        create_db(
            &db,
            ITEM_TABLE,
            &[
                (StoreFormat::Composer.discriminator_key(), index),
                (StoreFormat::LegacyPrompts.discriminator_key(), prompts),
            ],
        )
        .await;

        let extraction = extract_messages(&db).await.unwrap();
        assert_eq!(extraction.format, Some(StoreFormat::LegacyPrompts));
        assert_eq!(extraction.messages, vec![ChatMessage::human("legacy prompt")]);
    }
}
