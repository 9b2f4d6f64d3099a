//! # devjournal CLI
//!
//! The `devjournal` binary is both the git hook entry point and the manual
//! interface to the journal.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `devjournal hook` | Called by `post-commit`; starts a detached worker and returns |
//! | `devjournal generate` | Write the entry for a commit in the foreground |
//! | `devjournal summarize --kind <kind>` | Write a period summary |
//! | `devjournal reflect "<text>"` | Add a manual reflection to today's journal |
//! | `devjournal install-hook` | Install the `post-commit` hook |
//! | `devjournal chat-dbs` | List discovered IDE chat databases |
//!
//! ## Examples
//!
//! ```bash
//! # Regenerate the entry for the previous commit
//! devjournal generate --commit HEAD~1
//!
//! # Summarize last week by key
//! devjournal summarize --kind weekly --period 2025-W23
//!
//! # Verbose worker logs
//! DEVJOURNAL_LOG=devjournal=debug devjournal generate
//! ```

use anyhow::{bail, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use devjournal::chat;
use devjournal::config::{self, Config};
use devjournal::dispatch::{self, DispatchOutcome};
use devjournal::git;
use devjournal::hook::{self, HookInstall};
use devjournal::journal::{self, JournalLayout};
use devjournal::llm::{self, DisabledModel, LanguageModel};
use devjournal::orchestrator::{self, RunOutcome, RunReport};
use devjournal::summary::{self, Period, SummaryKind};

/// devjournal: engineering-journal entries generated from git commits and
/// AI chat history.
#[derive(Parser)]
#[command(
    name = "devjournal",
    about = "devjournal: engineering-journal entries generated from git commits and AI chat history",
    version,
    long_about = "devjournal runs from a git post-commit hook. For every commit it collects the \
    diff, recent AI chat conversations from the IDE, and commit metadata, asks a language model to \
    write each journal section, and appends the entry to a daily markdown file. Daily, weekly, \
    monthly, quarterly, and yearly summaries are written as periods close."
)]
struct Cli {
    /// Explicit configuration file (TOML).
    ///
    /// Takes precedence over `<repo>/.devjournal.toml` and the user-level
    /// `devjournal/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Entry point for the post-commit hook.
    ///
    /// Resolves HEAD, starts `devjournal worker` detached, and returns at
    /// once. Always exits 0. Set DEVJOURNAL_DISABLE=1 to skip.
    Hook {
        /// Repository path (defaults to the current directory).
        #[arg(long)]
        repo: Option<PathBuf>,
    },

    /// Generate the entry for one commit (used by `hook`).
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        repo: PathBuf,
        #[arg(long)]
        commit: String,
    },

    /// Generate the journal entry for a commit in the foreground.
    ///
    /// Also writes any summaries that became due.
    Generate {
        /// Repository path (defaults to the current directory).
        #[arg(long)]
        repo: Option<PathBuf>,

        /// Commit to journal.
        #[arg(long, default_value = "HEAD")]
        commit: String,
    },

    /// Write a period summary if it does not exist yet.
    Summarize {
        /// Summary kind.
        #[arg(long, value_enum)]
        kind: SummaryKind,

        /// Any date inside the period (YYYY-MM-DD). Defaults to the previous
        /// period relative to today.
        #[arg(long, conflicts_with = "period")]
        date: Option<NaiveDate>,

        /// Period key, e.g. `2025-06-03`, `2025-W23`, `2025-06`, `2025-Q2`, `2025`.
        #[arg(long)]
        period: Option<String>,

        /// Repository path (defaults to the current directory).
        #[arg(long)]
        repo: Option<PathBuf>,
    },

    /// Add a manual reflection to today's journal.
    Reflect {
        /// Reflection text.
        text: String,

        /// Repository path (defaults to the current directory).
        #[arg(long)]
        repo: Option<PathBuf>,
    },

    /// Install the post-commit hook in a repository.
    InstallHook {
        /// Repository path (defaults to the current directory).
        #[arg(long)]
        repo: Option<PathBuf>,
    },

    /// List discovered IDE chat databases.
    ///
    /// Databases whose workspace matches the repository are marked with `*`.
    ChatDbs {
        /// Repository path (defaults to the current directory).
        #[arg(long)]
        repo: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("DEVJOURNAL_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("devjournal=info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Hook { repo } => {
            let repo = repo
                .or_else(|| std::env::current_dir().ok())
                .unwrap_or_else(|| PathBuf::from("."));
            match dispatch::on_commit(&repo) {
                DispatchOutcome::Spawned { pid, commit, log } => {
                    println!("devjournal worker {} started for {} (log: {})", pid, commit, log.display());
                }
                DispatchOutcome::Bypassed => println!("devjournal disabled"),
                DispatchOutcome::Skipped(reason) => println!("devjournal skipped: {}", reason),
            }
        }
        Commands::Worker { repo, commit } => {
            run_worker(cli.config.as_deref(), &repo, &commit).await;
        }
        Commands::Generate { repo, commit } => {
            let repo = resolve_repo(repo)?;
            let cfg = config::load_config(cli.config.as_deref(), &repo)?;
            let model = build_model(&cfg)?;
            let report = orchestrator::run_for_commit(&cfg, &repo, &commit, model.as_ref()).await;
            print_report(&report);
            if let RunOutcome::Failed { reason, .. } = &report.outcome {
                bail!("No entry written: {}", reason);
            }
        }
        Commands::Summarize {
            kind,
            date,
            period,
            repo,
        } => {
            let repo = resolve_repo(repo)?;
            let cfg = config::load_config(cli.config.as_deref(), &repo)?;
            let period = match (period, date) {
                (Some(key), _) => Period::from_key(kind, &key)?,
                (None, Some(date)) => Period::containing(kind, date),
                (None, None) => Period::containing(kind, Local::now().date_naive()).previous(),
            };

            let model = build_model(&cfg)?;
            let layout = JournalLayout::new(cfg.journal_root(&repo));
            let mut telemetry = devjournal::telemetry::Telemetry::new();
            match summary::generate_period_summary(&layout, &period, model.as_ref(), &mut telemetry)
                .await?
            {
                Some(path) => println!("Wrote {}", path.display()),
                None => println!(
                    "Nothing written for {} {} (already exists, no sources, or every section failed).",
                    kind.dir_name(),
                    period.key
                ),
            }
        }
        Commands::Reflect { text, repo } => {
            let repo = resolve_repo(repo)?;
            let cfg = config::load_config(cli.config.as_deref(), &repo)?;
            let now: DateTime<FixedOffset> = Local::now().into();
            let path = journal::append_reflection(&cfg.journal_root(&repo), &text, now)?;
            println!("Reflection added to {}", path.display());
        }
        Commands::InstallHook { repo } => {
            let repo = resolve_repo(repo)?;
            let (result, path) = hook::install_hook(&repo)?;
            match result {
                HookInstall::Created => println!("Installed {}", path.display()),
                HookInstall::Appended => println!("Added devjournal to {}", path.display()),
                HookInstall::AlreadyInstalled => println!("Already installed in {}", path.display()),
            }
        }
        Commands::ChatDbs { repo } => {
            let repo = resolve_repo(repo)?;
            let cfg = config::load_config(cli.config.as_deref(), &repo)?;
            list_chat_dbs(&cfg, &repo);
        }
    }

    Ok(())
}

/// Background run for the hook. Every failure is logged; the process still
/// exits 0.
async fn run_worker(explicit: Option<&Path>, repo: &Path, commit: &str) {
    let cfg = match config::load_config(explicit, repo) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "invalid configuration; worker exiting");
            return;
        }
    };
    let model = build_model(&cfg).unwrap_or_else(|e| {
        tracing::warn!(error = %format!("{:#}", e), "language model unavailable");
        Box::new(DisabledModel)
    });

    let report = orchestrator::run_for_commit(&cfg, repo, commit, model.as_ref()).await;
    print_report(&report);
}

fn build_model(cfg: &Config) -> Result<Box<dyn LanguageModel>> {
    if !cfg.llm.is_enabled() {
        return Ok(Box::new(DisabledModel));
    }
    llm::create_model(&cfg.llm)
}

fn resolve_repo(repo: Option<PathBuf>) -> Result<PathBuf> {
    let start = match repo {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    git::repo_root(&start)
}

fn print_report(report: &RunReport) {
    match &report.outcome {
        RunOutcome::Done => {
            if let Some(path) = &report.entry_path {
                println!("Entry written to {}", path.display());
            }
            if !report.fallback_sections.is_empty() {
                let names: Vec<&str> = report.fallback_sections.iter().map(|k| k.name()).collect();
                println!("Sections unavailable: {}", names.join(", "));
            }
            for path in &report.summaries {
                println!("Summary written to {}", path.display());
            }
        }
        RunOutcome::Disabled => println!("Journal disabled in configuration."),
        RunOutcome::Failed { phase, reason } => {
            println!("Run failed during {}: {}", phase.as_str(), reason);
        }
    }
    tracing::info!(
        run_id = report.telemetry.run_id(),
        events = report.telemetry.events().len(),
        failures = report.telemetry.failures().count(),
        "run finished"
    );
}

fn list_chat_dbs(cfg: &Config, repo: &Path) {
    if !cfg.chat.enabled {
        println!("Chat collection is disabled in configuration.");
    }
    let dbs = chat::locate_chat_databases(&cfg.chat);
    if dbs.is_empty() {
        println!("No chat databases found.");
        return;
    }

    let lookback = std::time::Duration::from_secs(cfg.chat.lookback_hours.max(0) as u64 * 3600);
    let selected = chat::select_for_repo(&dbs, repo, lookback);

    println!("{:<3} {:<60} WORKSPACE", "", "DATABASE");
    for db in &dbs {
        let marker = if selected.contains(db) { "*" } else { "" };
        let folder = chat::locate::workspace_folder(db).unwrap_or_else(|| "-".to_string());
        println!("{:<3} {:<60} {}", marker, db.display(), folder);
    }
}
