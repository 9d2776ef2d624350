//! CLI binary for dmx-grabber.
//!
//! A thin shim over the library crate that maps CLI flags to `GrabConfig`,
//! renders a progress bar while the session runs, and prints the final
//! statistics table.

use anyhow::{Context, Result};
use clap::Parser;
use dmx_grabber::{
    run, GrabConfig, SessionProgressCallback, SessionStats,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
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

const BANNER: &str = r#"
 ___  __  ____  _  _     ___  ____   __   ____  ____  ____  ____
(   \(  )(  __)( \/ )   / __)(  _ \ / _\ (  _ \(  _ \(  __)(  _ \
 ) D ()(  ) _)  )  (   ( (_ \ )   //    \ ) _ ( ) _ ( ) _)  )   /
(____/(__)(____)(_/\_)   \___/(__\_)\_/\_/(____/(____/(____)(__\_)
"#;

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar across all pages of the session,
/// error lines printed above it. Completions arrive in completion order
/// (not page order) under a multi-worker pool, which is fine for a bar.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Bar length is set by `on_session_start` once enumeration is done.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("counting pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl SessionProgressCallback for CliProgressCallback {
    fn on_session_start(&self, total_tasks: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>5}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        self.bar.set_length(total_tasks as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Decoding");
        self.bar.reset_eta();
    }

    fn on_task_complete(&self, filename: &str, page: usize, _codes_found: usize) {
        self.bar.set_message(format!("{filename} p.{page}"));
        self.bar.inc(1);
    }

    fn on_task_error(&self, filename: &str, page: usize, error: String) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.len() > 80 {
            format!("{}\u{2026}", &error[..79])
        } else {
            error
        };
        self.bar
            .println(format!("  {} {filename} p.{page}  {}", red("✗"), red(&msg)));
        self.bar.inc(1);
    }

    fn on_session_complete(&self, _pages_processed: usize, _codes_found: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process everything under data/input into output/results.csv
  dmx-grabber

  # Four parallel workers, custom directories
  dmx-grabber -i scans/ -o out/codes.csv -w 4

  # Continue an interrupted run, skipping pages already done
  dmx-grabber -i scans/ -o out/codes.csv -w 4 --resume

  # Raw normalised codes only, no field parsing
  dmx-grabber --no-parse

  # Smoke-test the first 20 pages at higher resolution
  dmx-grabber --limit 20 --dpi 600

OUTPUT FILES:
  <output>                one normalised code string per line, no header
  <output>.progress.csv   processed (filename,page) pairs, drives --resume

RESUME:
  Re-run with --resume against the same output path. Pages listed in the
  progress sidecar are skipped; new codes are appended in order. Delete
  both files to start from scratch.
"#;

/// Bulk-extract GS1 DataMatrix marking codes from PDF files.
#[derive(Parser, Debug)]
#[command(
    name = "dmx-grabber",
    version,
    about = "Bulk-extract GS1 DataMatrix marking codes from PDF files",
    long_about = "Scan a directory of PDF files, decode the DataMatrix symbol on every page, \
normalise the GS1 payload and append the codes to a CSV — resumable, ordered, parallel.",
    disable_version_flag = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory with PDF files.
    #[arg(short, long, default_value = "data/input")]
    input: PathBuf,

    /// Output CSV path (non-.csv suffix is rewritten to .csv).
    #[arg(short, long, default_value = "output/results.csv")]
    output: PathBuf,

    /// Rendering DPI, minimum 72.
    #[arg(long, default_value_t = 300)]
    dpi: u32,

    /// Number of parallel page workers.
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Skip pages already listed in the progress sidecar.
    #[arg(long)]
    resume: bool,

    /// Do not parse codes into marking fields (still normalises).
    #[arg(long)]
    no_parse: bool,

    /// Maximum number of pages to process this session.
    #[arg(long)]
    limit: Option<usize>,

    /// Print the session statistics as JSON instead of the table.
    #[arg(long)]
    json: bool,

    /// Print version and exit.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The progress bar is the primary feedback; keep library logs quiet
    // unless RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if !cli.json {
        eprintln!("{}", cyan(BANNER));
        eprintln!(
            "{} v{} — bulk DataMatrix extraction from PDF\n",
            bold("DMX Grabber"),
            env!("CARGO_PKG_VERSION")
        );
    }

    let progress = (!cli.json).then(CliProgressCallback::new_dynamic);

    let mut builder = GrabConfig::builder()
        .input_dir(&cli.input)
        .output(&cli.output)
        .dpi(cli.dpi)
        .workers(cli.workers)
        .parse_marks(!cli.no_parse)
        .resume(cli.resume)
        .limit(cli.limit);
    if let Some(cb) = &progress {
        builder = builder.progress_callback(Arc::clone(cb) as Arc<dyn SessionProgressCallback>);
    }
    let config = builder.build().context("Invalid configuration")?;

    if !cli.json {
        print_run_info(&config);
    }
    // The builder may have rewritten the suffix; report the real path.
    let output_path = config.output.clone();

    let started = Instant::now();
    let stats = run(config).await?;
    let elapsed = started.elapsed().as_secs_f64();

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
        return Ok(());
    }

    print_stats_table(&stats, elapsed);

    if !stats.errors.is_empty() {
        eprintln!("\n{}", bold(&red("Errors:")));
        for (i, err) in stats.errors.iter().enumerate() {
            eprintln!("  {} {}", dim(&format!("{:>3}.", i + 1)), red(err));
        }
    }

    eprintln!();
    if stats.interrupted {
        eprintln!(
            "{} {}",
            yellow("⚠"),
            bold("Interrupted — progress saved. Re-run with --resume to continue.")
        );
    } else if stats.total_codes > 0 {
        eprintln!(
            "{} {} {}",
            green("✔"),
            bold("Done! Codes written to"),
            bold(&output_path.display().to_string())
        );
    } else {
        eprintln!(
            "{} {}",
            yellow("⚠"),
            bold("No codes found on any page.")
        );
        eprintln!(
            "{}",
            dim("  Try a higher resolution (--dpi 600) or check the PDF files.")
        );
    }

    Ok(())
}

fn print_run_info(config: &GrabConfig) {
    eprintln!("  {}  {}", bold("Input:  "), config.input_dir.display());
    eprintln!("  {}  {}", bold("Output: "), config.output.display());
    eprintln!("  {}  {}", bold("DPI:    "), config.dpi);
    eprintln!("  {}  {}", bold("Workers:"), config.workers);
    eprintln!(
        "  {}  {}",
        bold("Parsing:"),
        if config.parse_marks { "on" } else { "off" }
    );
    if config.resume {
        eprintln!("  {}  on", bold("Resume: "));
    }
    if let Some(limit) = config.limit {
        eprintln!("  {}  {}", bold("Limit:  "), limit);
    }
    eprintln!();
}

fn print_stats_table(stats: &SessionStats, elapsed: f64) {
    let row = |label: &str, value: String| {
        eprintln!("  {:<28} {}", bold(label), green(&value));
    };

    eprintln!("\n{}", bold(&cyan("Session statistics")));
    row("Files total", stats.total_files.to_string());
    row("Files processed", stats.processed_files.to_string());
    row("Pages total", stats.total_pages.to_string());
    row("Pages processed", stats.pages_processed.to_string());
    row("Codes found", stats.total_codes.to_string());
    row("Pages without codes", stats.pages_empty.to_string());
    row("Pages with errors", stats.pages_errored.to_string());
    row("Files with errors", stats.files_with_errors.to_string());
    if stats.resumed_from > 0 {
        row("Pages skipped (resume)", stats.resumed_from.to_string());
    }
    row(
        "Success rate",
        format!("{:.1}%", stats.success_rate() * 100.0),
    );
    row("Elapsed", format_elapsed(elapsed));
    if stats.pages_processed > 0 {
        row(
            "Speed",
            format!("{:.2} s/page", elapsed / stats.pages_processed as f64),
        );
    }
}

/// Seconds → human-readable duration.
fn format_elapsed(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{seconds:.1} s");
    }
    let minutes = (seconds / 60.0) as u64;
    let secs = seconds % 60.0;
    if minutes < 60 {
        return format!("{minutes} min {secs:.0} s");
    }
    format!("{} h {} min", minutes / 60, minutes % 60)
}
