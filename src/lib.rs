//! # devjournal
//!
//! Engineering-journal entries written automatically from git activity.
//!
//! A `post-commit` hook launches a detached worker. The worker collects the
//! commit's metadata and diffs plus recent AI chat history from the IDE's
//! local SQLite stores, asks a language model for each journal section
//! separately, and appends the entry to a daily markdown file. Period
//! summaries (daily through yearly) are written when a period closes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  spawn   ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ git hook │────────▶│    worker    │──▶│   sections   │──▶│ journal/ │
//! │ dispatch │ detached │ diff + chat  │   │ (8, isolated)│   │ markdown │
//! └──────────┘          └──────────────┘   └──────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! devjournal install-hook            # add the post-commit hook
//! git commit -m "..."                # entry appears in journal/daily/
//! devjournal generate --commit HEAD~1
//! devjournal summarize --kind weekly
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Layered TOML configuration |
//! | [`models`] | Core data types |
//! | [`git`] | Commit metadata via the `git` CLI |
//! | [`diff`] | Per-file diffs with adaptive size limits |
//! | [`chat`] | IDE chat discovery, extraction, limiting, segmentation |
//! | [`context`] | Context assembly for the generators |
//! | [`llm`] | Language-model client |
//! | [`sections`] | The eight section generators |
//! | [`orchestrator`] | Per-commit pipeline |
//! | [`journal`] | Daily journal files |
//! | [`summary`] | Period summaries |
//! | [`dispatch`] | Hook-side worker launch |
//! | [`hook`] | Hook installation |
//! | [`telemetry`] | Per-run phase events |

pub mod chat;
pub mod config;
pub mod context;
pub mod diff;
pub mod dispatch;
pub mod git;
pub mod hook;
pub mod journal;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod sections;
pub mod summary;
pub mod telemetry;
