//! # tokenspy
//!
//! Command-line front end: inspect providers and pricing, analyze request
//! bodies, ingest captured exchanges into the usage database, and query it.
//! Results are printed to stdout as pretty JSON; diagnostics go to stderr.

#![deny(unsafe_code)]

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokenspy_core::logging::{LogLevel, bootstrap_dispatch, init_subscriber};
use tokenspy_providers::global_registry;
use tokenspy_settings::{TokenSpySettings, load_settings_from_path, settings_path};
use tokenspy_store::SqliteUsageStore;
use tracing::debug;

/// LLM usage tracking.
#[derive(Parser, Debug)]
#[command(name = "tokenspy", about = "LLM usage tracking", version)]
struct Cli {
    /// Settings file (default: `~/.tokenspy/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Usage database path (overrides settings).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Log level (overrides settings; `RUST_LOG` still wins).
    #[arg(long, global = true, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered providers with their upstream URLs.
    Providers,

    /// Show the rates a provider applies to a model.
    Pricing {
        /// Provider name.
        provider: String,
        /// Model name.
        model: String,
    },

    /// Analyze a request body.
    Analyze {
        /// Provider name.
        #[arg(long)]
        provider: String,
        /// JSON request body file.
        request: PathBuf,
        /// Also print the body as it would be forwarded upstream.
        #[arg(long)]
        rewrite: bool,
    },

    /// Record a captured exchange in the usage database.
    Ingest(IngestArgs),

    /// List recent usage records.
    Usage {
        /// Only this agent.
        #[arg(long)]
        agent: Option<String>,
        /// Window in hours.
        #[arg(long)]
        hours: Option<u32>,
        /// Maximum rows.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Per-agent totals and averages.
    Summary {
        /// Window in hours.
        #[arg(long)]
        hours: Option<u32>,
    },

    /// Session health for one agent.
    Status {
        /// Agent name.
        agent: String,
        /// History threshold in characters.
        #[arg(long)]
        char_limit: Option<u64>,
    },

    /// Latest records for a live feed.
    Recent {
        /// Maximum rows.
        #[arg(long)]
        limit: Option<u32>,
        /// Only rows with a larger id.
        #[arg(long)]
        after_id: Option<i64>,
    },
}

/// Arguments for `ingest`.
#[derive(Args, Debug)]
pub(crate) struct IngestArgs {
    /// Provider name.
    #[arg(long)]
    pub provider: String,
    /// Agent that issued the request.
    #[arg(long)]
    pub agent: String,
    /// JSON request body file.
    #[arg(long)]
    pub request: PathBuf,
    /// Response file: a JSON body, or an SSE transcript with `--stream`.
    #[arg(long)]
    pub response: PathBuf,
    /// Treat the response as an SSE transcript.
    #[arg(long)]
    pub stream: bool,
    /// Exchange duration to record, in milliseconds.
    #[arg(long)]
    pub duration_ms: Option<u64>,
}

fn parse_log_level(s: &str) -> std::result::Result<LogLevel, String> {
    LogLevel::parse(s).ok_or_else(|| format!("unknown log level: {s}"))
}

/// Settings from file and env, with command-line overrides on top.
fn resolve_settings(cli: &Cli) -> Result<TokenSpySettings> {
    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(ref db_path) = cli.db_path {
        settings.storage.db_path = db_path.display().to_string();
    }
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    Ok(settings)
}

/// [`resolve_settings`] under a stderr subscriber at the command-line level,
/// so warnings raised while loading reach the user.
fn load_settings(cli: &Cli) -> Result<TokenSpySettings> {
    let bootstrap = bootstrap_dispatch(cli.log_level.unwrap_or_default());
    tracing::dispatcher::with_default(&bootstrap, || resolve_settings(cli))
}

fn open_store(settings: &TokenSpySettings) -> Result<SqliteUsageStore> {
    SqliteUsageStore::from_settings(settings).with_context(|| {
        format!(
            "Failed to open usage database: {}",
            settings.storage.db_path
        )
    })
}

fn run(cli: Cli, settings: &TokenSpySettings) -> Result<serde_json::Value> {
    let registry = global_registry();
    let query = &settings.query;
    match cli.command {
        Command::Providers => commands::providers(registry, settings),
        Command::Pricing { provider, model } => {
            commands::pricing(registry, settings, &provider, &model)
        }
        Command::Analyze {
            provider,
            request,
            rewrite,
        } => commands::analyze(registry, settings, &provider, &request, rewrite),
        Command::Ingest(args) => {
            commands::ingest(registry, settings, &open_store(settings)?, &args)
        }
        Command::Usage {
            agent,
            hours,
            limit,
        } => commands::usage(
            &open_store(settings)?,
            agent.as_deref(),
            hours.unwrap_or(query.default_hours),
            limit.unwrap_or(query.usage_limit),
        ),
        Command::Summary { hours } => commands::summary(
            &open_store(settings)?,
            hours.unwrap_or(query.default_hours),
        ),
        Command::Status { agent, char_limit } => commands::status(
            &open_store(settings)?,
            &agent,
            char_limit.unwrap_or(settings.session.char_limit),
        ),
        Command::Recent { limit, after_id } => commands::recent(
            &open_store(settings)?,
            limit.unwrap_or(query.recent_limit),
            after_id,
        ),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_subscriber(settings.logging.level, settings.logging.format);
    debug!(db_path = %settings.storage.db_path, "settings resolved");

    let output = run(cli, &settings)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to render output")?
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
