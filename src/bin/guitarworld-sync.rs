//! CLI binary for guitarworld-sync.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `SyncConfig` and prints the run summary.

use anyhow::{Context, Result};
use clap::Parser;
use guitarworld_sync::{
    extract_xsrf_token, list_catalog, sync, CatalogItem, SheetError, SyncConfig, SyncProgressCallback, SyncSummary,
    ProgressCallback, COOKIES_ENV,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the catalog plus a log line per
/// finished item. Items finish out of order when concurrency > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_sync_start` tells us how many items there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading catalog…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} scores  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Syncing");
        self.bar.reset_eta();
    }

    fn elapsed(&self, position: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .map(|mut t| t.remove(&position))
            .ok()
            .flatten()
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl SyncProgressCallback for CliProgressCallback {
    fn on_sync_start(&self, total_items: usize) {
        self.activate_bar(total_items);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_items} purchased scores"))
        ));
    }

    fn on_item_start(&self, position: usize, _total: usize, item: &CatalogItem) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(position, Instant::now());
        }
        self.bar.set_message(item.display_title());
    }

    fn on_item_complete(&self, position: usize, total: usize, item: &CatalogItem, skipped: bool) {
        let (mark, label) = if skipped {
            (dim("–"), dim("exists"))
        } else {
            (green("✓"), green("created"))
        };
        self.bar.println(format!(
            "  {} {:>4}/{:<4} {:<8} {}  {}",
            mark,
            position,
            total,
            label,
            item.display_title(),
            self.elapsed(position),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, position: usize, total: usize, item: &CatalogItem, error: &SheetError) {
        let error = error.to_string();
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error
        };
        self.bar.println(format!(
            "  {} {:>4}/{:<4} {}  {}  {}",
            red("✗"),
            position,
            total,
            item.display_title(),
            red(&msg),
            self.elapsed(position),
        ));
        self.bar.inc(1);
    }

    fn on_sync_complete(&self, _summary: &SyncSummary) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Sync everything into ./pdfs (cookies from the environment)
  export GUITARWORLD_COOKIES='XSRF-TOKEN=...; laravel_session=...'
  guitarworld-sync

  # Different library location, more workers
  guitarworld-sync --output ~/Music/Tabs --concurrency 5

  # See what is in the catalog and what is already synced
  guitarworld-sync --list-only

  # Machine-readable summary
  guitarworld-sync --json > summary.json

OUTPUT LAYOUT:
  <output>/<creator>/[<category>] <title> - <subtitle>.pdf

  A score whose PDF already exists is skipped, so re-running only fetches
  what is new or what failed last time.

FLAG SPELLING:
  Long flags take two dashes: --output / -o, --concurrency / -c.
  Single-dash long forms such as -output are not accepted.

ENVIRONMENT VARIABLES:
  GUITARWORLD_COOKIES     Cookie header of a logged-in browser session (required)
  GUITARWORLD_XSRF_TOKEN  XSRF token, if it is not part of the cookies
  RUST_LOG                Override the log filter (e.g. guitarworld_sync=debug)

SETUP:
  1. Log in at https://user.guitarworld.com.cn in your browser.
  2. Open developer tools, copy the Cookie request header of any page.
  3. export GUITARWORLD_COOKIES='<that header>'
"#;

/// Download purchased Guitar World scores as PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "guitarworld-sync",
    version,
    about = "Download purchased Guitar World sheet music as one PDF per score",
    long_about = "Read the list of scores purchased on Guitar World, download each score's \
page images and assemble them into an A4 PDF per score. Scores already on disk are skipped.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Root directory of the PDF library.
    #[arg(short, long, env = "GUITARWORLD_OUTPUT", default_value = "./pdfs")]
    output: PathBuf,

    /// Number of scores processed at the same time.
    #[arg(short, long, env = "GUITARWORLD_CONCURRENCY", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..=32))]
    concurrency: u32,

    /// Browser cookie header of a logged-in session.
    #[arg(long, env = COOKIES_ENV, hide_env_values = true)]
    cookies: Option<String>,

    /// XSRF token; extracted from the cookies when not given.
    #[arg(long, env = "GUITARWORLD_XSRF_TOKEN", hide_env_values = true)]
    xsrf_token: Option<String>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "GUITARWORLD_REQUEST_TIMEOUT", default_value_t = 60)]
    request_timeout: u64,

    /// Pause after each score before the next one is admitted (ms).
    #[arg(long, env = "GUITARWORLD_TASK_PACING_MS", default_value_t = 1000)]
    task_pacing_ms: u64,

    /// Pause between image downloads of one score (ms).
    #[arg(long, env = "GUITARWORLD_DOWNLOAD_PACING_MS", default_value_t = 200)]
    download_pacing_ms: u64,

    /// Print the catalog and the target path of every score, download nothing.
    #[arg(long)]
    list_only: bool,

    /// Print the result as JSON on stdout.
    #[arg(long, env = "GUITARWORLD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "GUITARWORLD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "GUITARWORLD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "GUITARWORLD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level item logs when it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // The client logs this at WARN, which the progress-bar filter hides.
    if show_progress && xsrf_token_missing(cli.cookies.as_deref(), cli.xsrf_token.as_deref()) {
        eprintln!(
            "{} {}",
            yellow("⚠"),
            yellow("XSRF-TOKEN not found in cookies; requests may be rejected")
        );
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn SyncProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── List-only mode ───────────────────────────────────────────────────
    if cli.list_only {
        let entries = list_catalog(&config)
            .await
            .context("Failed to read catalog")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("Failed to serialise catalog")?
            );
        } else {
            for e in &entries {
                let mark = if e.exists { green("✓") } else { dim("·") };
                println!("{} {:>8}  {}", mark, e.item.id, e.path.display());
            }
            if !cli.quiet {
                let synced = entries.iter().filter(|e| e.exists).count();
                eprintln!(
                    "{} scores, {} already synced, {} missing",
                    bold(&entries.len().to_string()),
                    synced,
                    entries.len() - synced
                );
            }
        }
        return Ok(());
    }

    // ── Run sync ─────────────────────────────────────────────────────────
    let summary = sync(&config).await.context("Sync failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        print_summary(&summary, &config);
    }

    Ok(())
}

fn print_summary(summary: &SyncSummary, config: &SyncConfig) {
    let mark = if summary.failed == 0 {
        green("✔")
    } else if summary.failed == summary.total {
        red("✘")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{}  {} scores: {} created, {} skipped, {} failed  {}  →  {}",
        mark,
        bold(&summary.total.to_string()),
        green(&summary.created.to_string()),
        summary.skipped,
        if summary.failed > 0 {
            red(&summary.failed.to_string())
        } else {
            summary.failed.to_string()
        },
        dim(&format!("{}ms", summary.duration_ms)),
        bold(&config.output_dir.display().to_string()),
    );

    for f in &summary.failures {
        if let Some(e) = f.error() {
            eprintln!(
                "   {} {} (ID: {}): {}",
                red("✗"),
                f.item.display_title(),
                f.item.id,
                e
            );
        }
    }
    if summary.failed > 0 {
        eprintln!("   {}", dim("Run again to retry the failed scores."));
    }
}

/// True when cookies are present but no XSRF token can be had from either
/// `--xsrf-token` or the cookie string. Absent cookies fail the run later.
fn xsrf_token_missing(cookies: Option<&str>, explicit: Option<&str>) -> bool {
    let Some(cookies) = cookies.filter(|c| !c.trim().is_empty()) else {
        return false;
    };
    let explicit = explicit.is_some_and(|t| !t.trim().is_empty());
    !explicit && extract_xsrf_token(cookies).is_none()
}

/// Map CLI args to `SyncConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<SyncConfig> {
    let mut builder = SyncConfig::builder()
        .output_dir(&cli.output)
        .concurrency(cli.concurrency as usize)
        .request_timeout_secs(cli.request_timeout)
        .task_pacing_ms(cli.task_pacing_ms)
        .download_pacing_ms(cli.download_pacing_ms);

    if let Some(ref cookies) = cli.cookies {
        builder = builder.cookies(cookies.clone());
    }
    if let Some(ref token) = cli.xsrf_token {
        builder = builder.xsrf_token(token.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_check_warns_only_without_any_token() {
        assert!(xsrf_token_missing(Some("laravel_session=abc"), None));
        assert!(xsrf_token_missing(Some("a=1"), Some("  ")));
        assert!(xsrf_token_missing(Some("XSRF-TOKEN=; a=1"), None));
        assert!(!xsrf_token_missing(Some("XSRF-TOKEN=tok; a=1"), None));
        assert!(!xsrf_token_missing(Some("a=1"), Some("tok")));
        // Missing cookies are reported as a fatal error instead.
        assert!(!xsrf_token_missing(None, None));
        assert!(!xsrf_token_missing(Some("   "), None));
    }

    #[test]
    fn long_flags_parse() {
        let cli = Cli::try_parse_from([
            "guitarworld-sync",
            "--output",
            "/tmp/lib",
            "--concurrency",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.output, PathBuf::from("/tmp/lib"));
        assert_eq!(cli.concurrency, 5);

        let cli = Cli::try_parse_from(["guitarworld-sync", "-o", "lib", "-c", "2"]).unwrap();
        assert_eq!(cli.output, PathBuf::from("lib"));
        assert_eq!(cli.concurrency, 2);
    }

    #[test]
    fn concurrency_out_of_range_is_rejected() {
        assert!(Cli::try_parse_from(["guitarworld-sync", "--concurrency", "0"]).is_err());
        assert!(Cli::try_parse_from(["guitarworld-sync", "--concurrency", "33"]).is_err());
    }
}
