//! uindex CLI - leadership index for a researcher
//!
//! Usage: uindex [OPTIONS] <AUTHOR_NAME>
//!
//! Prints a text report, or the full result as JSON with --json.

use chrono::{Local, NaiveDate};
use clap::Parser;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use uindex_lib::settings::{default_settings_path, Settings};
use uindex_lib::{report, CacheMode, Pipeline};

const LOG_PREFIX: &str = "uindex.log";
const LOG_RETENTION_DAYS: i64 = 7;
const SECS_PER_DAY: u64 = 24 * 60 * 60;
const MAX_TTL_DAYS: u64 = 36500;

// ============================================================================
// Logging Infrastructure
// ============================================================================

/// Remove daily log files (uindex.log.YYYY-MM-DD) older than the retention window
fn clean_old_logs(log_dir: &Path) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };
    let cutoff = Local::now().date_naive() - chrono::Duration::days(LOG_RETENTION_DAYS);

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date_str) = name.strip_prefix(LOG_PREFIX).and_then(|s| s.strip_prefix('.')) else {
            continue;
        };
        if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
            if date < cutoff {
                let _ = fs::remove_file(&path);
            }
        }
    }
}

/// Stderr at `warn` (or `debug` with -v, or RUST_LOG), plus a daily file at `debug`
fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "warn" };
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let log_dir = dirs::data_dir()
        .map(|p| p.join("uindex").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));

    if fs::create_dir_all(&log_dir).is_err() {
        tracing_subscriber::registry().with(stderr_layer).init();
        return None;
    }
    clean_old_logs(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("uindex_lib=debug,uindex=debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Some(guard)
}

// ============================================================================
// Main CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "uindex")]
#[command(version, about = "Calculate the U-index (first/last-author citation index) from PubMed and OpenAlex", long_about = None)]
struct Cli {
    /// Author name as searched on PubMed, e.g. "Smith John"
    author_name: String,

    /// Skip the cache entirely, fetch fresh data
    #[arg(long)]
    no_cache: bool,

    /// Fetch fresh data and overwrite the cached result
    #[arg(long, conflicts_with = "no_cache")]
    refresh: bool,

    /// Cache directory (default: user cache dir)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Days a cached result stays valid
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=MAX_TTL_DAYS))]
    ttl_days: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Remove expired cache entries before running
    #[arg(long)]
    purge_expired: bool,

    /// Settings file (default: <config dir>/uindex/settings.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output the full result as JSON
    #[arg(long)]
    json: bool,

    /// Detailed logging
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    /// Settings file values with this run's flags applied on top
    fn settings(&self) -> Settings {
        let path = self.config.clone().unwrap_or_else(default_settings_path);
        let mut settings = Settings::load(&path);

        if let Some(dir) = &self.cache_dir {
            settings.cache_dir = Some(dir.clone());
        }
        if let Some(days) = self.ttl_days {
            settings.cache_ttl_secs = days.saturating_mul(SECS_PER_DAY);
        }
        if let Some(secs) = self.timeout {
            settings.request_timeout_secs = secs;
        }
        if self.no_cache {
            settings.cache_enabled = false;
        }
        settings
    }

    fn cache_mode(&self, settings: &Settings) -> CacheMode {
        if self.no_cache || !settings.cache_enabled {
            CacheMode::Bypass
        } else if self.refresh {
            CacheMode::ForceRefresh
        } else {
            CacheMode::Use
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose);

    if let Err(e) = run_cli(cli).await {
        report_failure(&mut io::stderr(), &e);
        std::process::exit(1);
    }
}

/// Write a fatal error to `out` directly; the log filter only decides
/// whether the log file also gets it.
fn report_failure(out: &mut dyn Write, message: &str) {
    let _ = writeln!(out, "Error: {}", message);
    tracing::error!("Error: {}", message);
}

async fn run_cli(cli: Cli) -> Result<(), String> {
    let settings = cli.settings();
    let mode = cli.cache_mode(&settings);

    let pipeline = Pipeline::from_settings(&settings).map_err(|e| e.to_string())?;

    if let Some(cache) = pipeline.cache() {
        if cli.verbose {
            eprintln!("[verbose] Using cache: {}", cache.path().display());
        }
        if cli.purge_expired {
            let removed = cache.purge_expired().map_err(|e| e.to_string())?;
            eprintln!("Purged {} expired cache entries", removed);
        }
    }

    let results = pipeline
        .run(&cli.author_name, mode)
        .await
        .map_err(|e| e.to_string())?;

    if cli.json {
        let json = report::render_json(&results)
            .map_err(|e| format!("Failed to serialize result: {}", e))?;
        println!("{}", json);
    } else {
        print!("{}", report::render_text(&results));
    }

    Ok(())
}
