//! Session driver: the top-level entry point wiring enumeration, the
//! scheduler, the sink and cancellation together.
//!
//! The driver owns [`SessionStats`] for the whole run. Workers never see it;
//! they communicate through their outcomes only, and the scheduler folds
//! those into the counters on the main task.

use crate::config::GrabConfig;
use crate::error::GrabError;
use crate::output::SessionStats;
use crate::pipeline::decode::{RxingDecoder, SymbolDecoder};
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use crate::pipeline::worker::WorkerOptions;
use crate::scheduler::{enumerate_tasks, list_pdf_files, Scheduler};
use crate::sink::{load_progress, CsvSink};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Run a full extraction session.
///
/// Enumerates `*.pdf` files under `config.input_dir`, processes every page
/// not already in the resume set, and appends the decoded code strings to
/// `config.output` in file-then-page order.
///
/// # Returns
/// `Ok(SessionStats)` on normal completion **and** on operator interrupt
/// (with `interrupted` set); progress saved so far is on disk either way.
///
/// # Errors
/// Returns `Err(GrabError)` only for fatal conditions: invalid input
/// directory, no PDF files, or an unwritable output path. Per-file and
/// per-page failures are recorded in the stats instead.
pub async fn run(config: GrabConfig) -> Result<SessionStats, GrabError> {
    let mut stats = SessionStats::default();

    if !config.input_dir.is_dir() {
        return Err(GrabError::InputDirMissing {
            path: config.input_dir.clone(),
        });
    }

    let rasterizer: Arc<dyn PageRasterizer> = config
        .rasterizer
        .clone()
        .unwrap_or_else(|| Arc::new(PdfiumRasterizer));
    let decoder: Arc<dyn SymbolDecoder> = config
        .decoder
        .clone()
        .unwrap_or_else(|| Arc::new(RxingDecoder));

    let files = list_pdf_files(&config.input_dir)?;
    stats.total_files = files.len();
    info!(
        files = files.len(),
        input = %config.input_dir.display(),
        output = %config.output.display(),
        workers = config.workers,
        dpi = config.dpi,
        "session start"
    );

    let resume_set = if config.resume {
        load_progress(&config.output)?
    } else {
        HashSet::new()
    };

    let tasks = enumerate_tasks(
        &files,
        rasterizer.as_ref(),
        &resume_set,
        config.limit,
        &mut stats,
    );
    info!(
        tasks = tasks.len(),
        resumed = stats.resumed_from,
        "enumeration complete"
    );

    if let Some(cb) = &config.progress_callback {
        cb.on_session_start(tasks.len());
    }

    let mut sink = CsvSink::open(&config.output)?;

    // Single interrupt hook for the whole session. Workers never observe
    // the signal; the scheduler stops dispatching, in-flight pages finish,
    // and the final flush below still runs.
    let cancel = Arc::new(AtomicBool::new(false));
    let interrupt_watcher = tokio::spawn(watch_for_interrupt(Arc::clone(&cancel)));

    let scheduler = Scheduler::new(
        Arc::clone(&rasterizer),
        Arc::clone(&decoder),
        WorkerOptions {
            dpi: config.dpi,
            roi: config.roi,
            parse_marks: config.parse_marks,
        },
        config.workers,
        config.save_every,
        config.progress_callback.clone(),
    );

    let result = scheduler.run(tasks, &mut sink, &mut stats, &cancel).await;
    interrupt_watcher.abort();

    // Flush even when the scheduler failed: committed pages stay resumable.
    sink.flush()?;
    result?;

    stats.interrupted = cancel.load(Ordering::Relaxed);
    if stats.interrupted {
        warn!(
            pages = stats.pages_processed,
            "session interrupted; progress saved, resume with --resume"
        );
    } else {
        info!(
            pages = stats.pages_processed,
            codes = stats.total_codes,
            empty = stats.pages_empty,
            "session complete"
        );
    }

    if let Some(cb) = &config.progress_callback {
        cb.on_session_complete(stats.pages_processed, stats.total_codes);
    }

    Ok(stats)
}

async fn watch_for_interrupt(cancel: Arc<AtomicBool>) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received; waiting for in-flight pages");
        cancel.store(true, Ordering::Relaxed);
    }
}
