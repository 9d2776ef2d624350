//! # dmx-grabber
//!
//! Extract GS1 DataMatrix marking codes ("Честный Знак") from large batches
//! of PDF files into a resumable, ordered CSV list.
//!
//! ## Why this crate?
//!
//! Marking workflows deliver thousands-of-pages PDFs where every sheet
//! carries one small DataMatrix symbol in a roughly known corner. Decoding
//! them one page at a time in a viewer does not scale, and naive batch
//! scripts lose everything on the first crash three hours in. This crate
//! runs a pool of page workers with an ordered incremental sink: output
//! order is deterministic regardless of worker interleaving, and an
//! interrupted run resumes exactly where it stopped.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. Enumerate  sorted *.pdf → (file, page) tasks, minus resumed pages
//!  ├─ 2. Render     rasterise the ROI (or full page) via pdfium
//!  ├─ 3. Decode     DataMatrix detection via rxing; raw pass then binarised
//!  ├─ 4. Normalise  canonicalise GS1 group separators to 0x1D
//!  ├─ 5. Parse      GTIN / serial / verification key / crypto tail
//!  └─ 6. Sink       ordered append to results.csv + progress sidecar
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dmx_grabber::{run, GrabConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GrabConfig::builder()
//!         .input_dir("data/input")
//!         .output("output/results.csv")
//!         .workers(4)
//!         .resume(true)
//!         .build()?;
//!     let stats = run(config).await?;
//!     eprintln!(
//!         "{} codes from {} pages ({} empty)",
//!         stats.total_codes, stats.pages_processed, stats.pages_empty
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `dmx-grabber` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! dmx-grabber = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod gs1;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod session;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GrabConfig, GrabConfigBuilder, Roi, DEFAULT_ROI};
pub use error::GrabError;
pub use gs1::{normalize_gs1_raw, parse_honest_mark, HonestMarkCode, GS};
pub use output::{PageOutcome, SessionStats};
pub use pipeline::decode::{
    RxingDecoder, SymbolDecoder, FIRST_PASS_TIMEOUT_MS, MAX_CODES_PER_PAGE,
    SECOND_PASS_TIMEOUT_MS,
};
pub use pipeline::preprocess::{ADAPTIVE_BLOCK_SIZE, ADAPTIVE_OFFSET};
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer};
pub use progress::{NoopProgressCallback, ProgressCallback, SessionProgressCallback};
pub use scheduler::PdfTask;
pub use session::run;
pub use sink::{load_progress, progress_path_for, SAVE_EVERY};
