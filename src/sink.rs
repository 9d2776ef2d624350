//! Incremental CSV sink and the resume progress sidecar.
//!
//! ## Why a sidecar instead of re-reading the output?
//!
//! The output file is a bare list of code strings and carries no page
//! identity, so it cannot answer "which pages are done". The sidecar at
//! `<output>.progress.csv` records `(filename, page)` per completed page.
//! Both files are opened in append mode and never rewritten. There is no
//! fsync per page, so a crash mid-batch can leave a partial line; the
//! resume protocol tolerates duplicate sidecar rows and, at worst, one
//! re-decoded page's codes appearing twice.
//!
//! The sink is written from the scheduler task only. Workers never touch
//! disk outputs.

use crate::error::GrabError;
use crate::output::PageOutcome;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Pages buffered between flushes.
pub const SAVE_EVERY: usize = 50;

/// Sidecar header, written only when the file is newly created or empty.
const PROGRESS_HEADER: &str = "filename,page";

/// Path of the progress sidecar for a given output path.
pub fn progress_path_for(output: &Path) -> PathBuf {
    PathBuf::from(format!("{}.progress.csv", output.display()))
}

/// Buffered, append-only writer for the code list and the progress sidecar.
pub struct CsvSink {
    output_path: PathBuf,
    progress_path: PathBuf,
    output: File,
    progress: File,
    code_buf: Vec<String>,
    progress_buf: Vec<(String, usize)>,
    pending_pages: usize,
    header_needed: bool,
}

impl CsvSink {
    /// Open (creating if necessary) the output file and its sidecar.
    ///
    /// Parent directories are created; both files are opened with append
    /// semantics so prior sessions' lines are never rewritten.
    pub fn open(output: &Path) -> Result<Self, GrabError> {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| GrabError::OutputWrite {
                    path: output.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let progress_path = progress_path_for(output);
        let open_append = |path: &Path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| GrabError::OutputWrite {
                    path: path.to_path_buf(),
                    source: e,
                })
        };

        let output_file = open_append(output)?;
        let progress_file = open_append(&progress_path)?;
        let header_needed = progress_file
            .metadata()
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        Ok(Self {
            output_path: output.to_path_buf(),
            progress_path,
            output: output_file,
            progress: progress_file,
            code_buf: Vec::new(),
            progress_buf: Vec::new(),
            pending_pages: 0,
            header_needed,
        })
    }

    /// Buffer the outcomes of one or more pages.
    ///
    /// `Found` outcomes with a non-empty code contribute a code line; every
    /// outcome contributes a progress entry, errors included (a broken page
    /// is not retried on resume).
    pub fn append(&mut self, outcomes: &[PageOutcome]) {
        let mut last_page: Option<(&str, usize)> = None;
        for outcome in outcomes {
            if let PageOutcome::Found { raw_code, .. } = outcome {
                if !raw_code.is_empty() {
                    self.code_buf.push(sanitize_code(raw_code));
                }
            }
            let key = (outcome.filename(), outcome.page());
            if last_page != Some(key) {
                self.progress_buf
                    .push((outcome.filename().to_string(), outcome.page()));
                self.pending_pages += 1;
                last_page = Some(key);
            }
        }
    }

    /// Pages buffered since the last flush.
    pub fn pending_pages(&self) -> usize {
        self.pending_pages
    }

    /// Write buffered codes and progress entries to disk.
    pub fn flush(&mut self) -> Result<(), GrabError> {
        if !self.code_buf.is_empty() {
            let mut block = self.code_buf.join("\n");
            block.push('\n');
            self.output
                .write_all(block.as_bytes())
                .and_then(|_| self.output.flush())
                .map_err(|e| GrabError::OutputWrite {
                    path: self.output_path.clone(),
                    source: e,
                })?;
            debug!(codes = self.code_buf.len(), "flushed code lines");
            self.code_buf.clear();
        }

        if !self.progress_buf.is_empty() {
            let mut block = String::new();
            if self.header_needed {
                block.push_str(PROGRESS_HEADER);
                block.push('\n');
            }
            for (filename, page) in &self.progress_buf {
                block.push_str(filename);
                block.push(',');
                block.push_str(&page.to_string());
                block.push('\n');
            }
            self.progress
                .write_all(block.as_bytes())
                .and_then(|_| self.progress.flush())
                .map_err(|e| GrabError::OutputWrite {
                    path: self.progress_path.clone(),
                    source: e,
                })?;
            self.header_needed = false;
            self.progress_buf.clear();
        }

        self.pending_pages = 0;
        Ok(())
    }
}

/// Escape C0 control characters for the single-column code list.
///
/// `0x1D` is semantically meaningful in GS1 and passes through untouched;
/// tab and LF are delimiters and also pass; every other C0 byte becomes a
/// literal `\xNN` escape.
fn sanitize_code(code: &str) -> String {
    if code
        .chars()
        .all(|c| c as u32 >= 0x20 || matches!(c, '\u{1D}' | '\t' | '\n'))
    {
        return code.to_string();
    }
    let mut out = String::with_capacity(code.len() + 8);
    for c in code.chars() {
        match c {
            '\u{1D}' | '\t' | '\n' => out.push(c),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Read the resume set from the progress sidecar.
///
/// A missing sidecar yields the empty set; first runs are not an error.
/// Duplicate rows (possible after a crash mid-batch) collapse into the set.
pub fn load_progress(output: &Path) -> Result<HashSet<(String, usize)>, GrabError> {
    let path = progress_path_for(output);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no progress sidecar, starting fresh");
            return Ok(HashSet::new());
        }
        Err(e) => return Err(GrabError::ProgressRead { path, source: e }),
    };

    let mut set = HashSet::new();
    for line in content.lines() {
        let line = line.trim_end();
        if line.is_empty() || line == PROGRESS_HEADER {
            continue;
        }
        // rsplit so filenames containing commas still round-trip.
        let Some((filename, page)) = line.rsplit_once(',') else {
            continue;
        };
        let Ok(page) = page.trim().parse::<usize>() else {
            // A partial line from a crashed append; ignore it so the page
            // gets re-processed.
            continue;
        };
        set.insert((filename.to_string(), page));
    }

    info!(entries = set.len(), "loaded progress sidecar");
    Ok(set)
}
