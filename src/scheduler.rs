//! Task enumeration and the ordered-completion scheduler.
//!
//! ## Ordered commit over unordered workers
//!
//! The classic pool idiom (submit N tasks, consume results as they finish)
//! would interleave pages from different files in the output. Instead the
//! scheduler precomputes the ordered list of page keys, lets completions
//! arrive in any order into a small staging map, and commits to the sink
//! only from a monotonic cursor over that list. Output order is therefore a
//! pure function of enumeration order, independent of worker interleaving,
//! at a steady-state cost of O(workers) staged entries.
//!
//! The scheduler owns every [`PdfTask`] until dispatch and is the only
//! writer of the sink and of the session counters; workers stay pure.

use crate::error::GrabError;
use crate::output::{PageOutcome, SessionStats};
use crate::pipeline::decode::SymbolDecoder;
use crate::pipeline::render::PageRasterizer;
use crate::pipeline::worker::{self, WorkerOptions};
use crate::progress::ProgressCallback;
use crate::sink::CsvSink;
use futures::{future, stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One unit of work: a single page of a single PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfTask {
    pub path: PathBuf,
    /// 0-based page index; outcomes report `page_index + 1`.
    pub page_index: usize,
}

/// Key identifying a page in the sink, the staging map and the resume set.
pub(crate) type PageKey = (String, usize);

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn task_key(task: &PdfTask) -> PageKey {
    (file_name_of(&task.path), task.page_index + 1)
}

/// All `*.pdf` files in the input directory, sorted by filename.
pub(crate) fn list_pdf_files(input_dir: &Path) -> Result<Vec<PathBuf>, GrabError> {
    let entries = fs::read_dir(input_dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GrabError::InputDirMissing {
                path: input_dir.to_path_buf(),
            }
        } else {
            GrabError::Internal(format!("cannot read '{}': {e}", input_dir.display()))
        }
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .collect();
    files.sort_by_key(|path| path.file_name().map(|n| n.to_os_string()));

    if files.is_empty() {
        return Err(GrabError::NoPdfsFound {
            path: input_dir.to_path_buf(),
        });
    }
    Ok(files)
}

/// Expand files into per-page tasks, skipping resumed pages and applying the
/// global limit.
///
/// A file whose page count cannot be read is recorded in the stats and
/// skipped; the session continues with the remaining files.
pub(crate) fn enumerate_tasks(
    files: &[PathBuf],
    rasterizer: &dyn PageRasterizer,
    resume_set: &HashSet<PageKey>,
    limit: Option<usize>,
    stats: &mut SessionStats,
) -> Vec<PdfTask> {
    let mut tasks = Vec::new();
    for path in files {
        let filename = file_name_of(path);
        match rasterizer.page_count(path) {
            Ok(count) => {
                debug!(file = %filename, pages = count, "enumerated");
                stats.total_pages += count;
                for page_index in 0..count {
                    if resume_set.contains(&(filename.clone(), page_index + 1)) {
                        stats.resumed_from += 1;
                    } else {
                        tasks.push(PdfTask {
                            path: path.clone(),
                            page_index,
                        });
                    }
                }
            }
            Err(e) => {
                warn!(file = %filename, error = %e, "skipping unreadable file");
                stats.files_with_errors += 1;
                stats.errors.push(format!("{filename}: {e}"));
            }
        }
    }

    if let Some(limit) = limit {
        // Global cap across the whole task list, not per file.
        tasks.truncate(limit);
    }
    tasks
}

/// Drives the worker pool and commits outcomes to the sink in task order.
pub(crate) struct Scheduler {
    rasterizer: Arc<dyn PageRasterizer>,
    decoder: Arc<dyn SymbolDecoder>,
    opts: WorkerOptions,
    workers: usize,
    save_every: usize,
    callback: Option<ProgressCallback>,
}

impl Scheduler {
    pub(crate) fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        decoder: Arc<dyn SymbolDecoder>,
        opts: WorkerOptions,
        workers: usize,
        save_every: usize,
        callback: Option<ProgressCallback>,
    ) -> Self {
        Self {
            rasterizer,
            decoder,
            opts,
            workers,
            save_every,
            callback,
        }
    }

    /// Run every task to completion (or until cancellation), appending
    /// outcomes to the sink strictly in task order.
    ///
    /// The caller performs the final flush; this method only flushes full
    /// batches.
    pub(crate) async fn run(
        &self,
        tasks: Vec<PdfTask>,
        sink: &mut CsvSink,
        stats: &mut SessionStats,
        cancel: &Arc<AtomicBool>,
    ) -> Result<(), GrabError> {
        if self.workers <= 1 {
            self.run_inline(tasks, sink, stats, cancel).await
        } else {
            self.run_pool(tasks, sink, stats, cancel).await
        }
    }

    /// Single-worker mode: strict task order, stream to the sink directly.
    async fn run_inline(
        &self,
        tasks: Vec<PdfTask>,
        sink: &mut CsvSink,
        stats: &mut SessionStats,
        cancel: &Arc<AtomicBool>,
    ) -> Result<(), GrabError> {
        let mut remaining = per_file_task_counts(&tasks);
        for task in tasks {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let key = task_key(&task);
            let outcomes = self.dispatch(task).await?;
            self.record(&key, &outcomes, &mut remaining, stats);
            sink.append(&outcomes);
            if sink.pending_pages() >= self.save_every {
                sink.flush()?;
            }
        }
        Ok(())
    }

    /// Pool mode: out-of-order execution, in-order commit via the staging map.
    async fn run_pool(
        &self,
        tasks: Vec<PdfTask>,
        sink: &mut CsvSink,
        stats: &mut SessionStats,
        cancel: &Arc<AtomicBool>,
    ) -> Result<(), GrabError> {
        let keys: Vec<PageKey> = tasks.iter().map(task_key).collect();
        let mut remaining = per_file_task_counts(&tasks);
        let mut staging: HashMap<PageKey, Vec<PageOutcome>> = HashMap::new();
        let mut cursor = 0usize;

        let cancel_flag = Arc::clone(cancel);
        let mut completions = stream::iter(tasks)
            // Checked at dispatch: once the flag flips, no further task is
            // submitted; in-flight tasks finish normally below.
            .take_while(move |_| future::ready(!cancel_flag.load(Ordering::Relaxed)))
            .map(|task| {
                let rasterizer = Arc::clone(&self.rasterizer);
                let decoder = Arc::clone(&self.decoder);
                let opts = self.opts;
                tokio::task::spawn_blocking(move || {
                    let outcomes = worker::process_page(
                        rasterizer.as_ref(),
                        decoder.as_ref(),
                        &task.path,
                        task.page_index,
                        &opts,
                    );
                    (task_key(&task), outcomes)
                })
            })
            .buffer_unordered(self.workers);

        while let Some(joined) = completions.next().await {
            let (key, outcomes) =
                joined.map_err(|e| GrabError::Internal(format!("worker task panicked: {e}")))?;
            self.record(&key, &outcomes, &mut remaining, stats);
            staging.insert(key, outcomes);

            // Drain everything contiguous from the cursor.
            while cursor < keys.len() {
                let Some(ready) = staging.remove(&keys[cursor]) else {
                    break;
                };
                sink.append(&ready);
                cursor += 1;
                if sink.pending_pages() >= self.save_every {
                    sink.flush()?;
                }
            }
        }

        // On cancellation, staged entries past the first gap are dropped:
        // their pages are absent from the progress log and will be re-run
        // by a future resume session.
        if !staging.is_empty() {
            info!(dropped = staging.len(), "uncommitted staged pages at shutdown");
        }
        Ok(())
    }

    async fn dispatch(&self, task: PdfTask) -> Result<Vec<PageOutcome>, GrabError> {
        let rasterizer = Arc::clone(&self.rasterizer);
        let decoder = Arc::clone(&self.decoder);
        let opts = self.opts;
        tokio::task::spawn_blocking(move || {
            worker::process_page(
                rasterizer.as_ref(),
                decoder.as_ref(),
                &task.path,
                task.page_index,
                &opts,
            )
        })
        .await
        .map_err(|e| GrabError::Internal(format!("worker task panicked: {e}")))
    }

    /// Update counters and fire progress events for one completed task.
    fn record(
        &self,
        key: &PageKey,
        outcomes: &[PageOutcome],
        remaining: &mut HashMap<String, usize>,
        stats: &mut SessionStats,
    ) {
        stats.pages_processed += 1;
        let mut codes_found = 0usize;
        let mut error: Option<String> = None;
        for outcome in outcomes {
            match outcome {
                PageOutcome::Found { .. } => {
                    stats.total_codes += 1;
                    codes_found += 1;
                }
                PageOutcome::NotFound { .. } => stats.pages_empty += 1,
                PageOutcome::Error { message, .. } => {
                    stats.pages_errored += 1;
                    stats
                        .errors
                        .push(format!("{} page {}: {}", key.0, key.1, message));
                    error = Some(message.clone());
                }
            }
        }

        if let Some(left) = remaining.get_mut(&key.0) {
            *left -= 1;
            if *left == 0 {
                remaining.remove(&key.0);
                stats.processed_files += 1;
            }
        }

        if let Some(cb) = &self.callback {
            match error {
                Some(message) => cb.on_task_error(&key.0, key.1, message),
                None => cb.on_task_complete(&key.0, key.1, codes_found),
            }
        }
    }
}

fn per_file_task_counts(tasks: &[PdfTask]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for task in tasks {
        *counts.entry(file_name_of(&task.path)).or_insert(0) += 1;
    }
    counts
}
