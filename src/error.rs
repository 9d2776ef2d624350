//! Error types for the dmx-grabber library.
//!
//! Two distinct failure modes get two distinct treatments:
//!
//! * [`GrabError`] — **Fatal or file-level**: returned as `Err` from the
//!   library entry points. Configuration and input errors abort the session
//!   before any work; file-level errors (unreadable PDF, page-count failure)
//!   are caught by the scheduler, recorded in
//!   [`crate::output::SessionStats::errors`], and the session continues with
//!   the remaining files.
//!
//! * **Page-level errors** are never propagated as `Err` at all: the page
//!   worker converts any rasteriser or decoder failure into a single
//!   [`crate::output::PageOutcome::Error`] so one bad page cannot take down
//!   a thousand-page batch.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the dmx-grabber library.
///
/// Page-level failures are carried inside
/// [`crate::output::PageOutcome::Error`] rather than propagated here.
#[derive(Debug, Error)]
pub enum GrabError {
    // ── Input errors ──────────────────────────────────────────────────────

    /// Input directory does not exist.
    #[error("Input directory not found: '{path}'\nCreate it and place PDF files inside.")]
    InputDirMissing { path: PathBuf },

    /// Input directory exists but contains no `*.pdf` files.
    #[error("No PDF files found in '{path}'")]
    NoPdfsFound { path: PathBuf },

    /// PDF file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────

    /// The file could not be opened or parsed as a PDF.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Requested page index exceeds the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// The rasteriser returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterFailed { page: usize, detail: String },

    // ── Decoder errors ────────────────────────────────────────────────────

    /// Internal failure inside the DataMatrix decoding library.
    ///
    /// "Nothing found" is NOT an error; the decoder adapter returns an
    /// empty list for that.
    #[error("DataMatrix decoder failure: {detail}")]
    DecodeFailed { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────

    /// Could not create or append to the output CSV / progress sidecar.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The progress sidecar exists but could not be read.
    #[error("Failed to read progress sidecar '{path}': {source}")]
    ProgressRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────

    /// Builder or CLI validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────

    /// Unexpected internal error (e.g. a worker task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}
