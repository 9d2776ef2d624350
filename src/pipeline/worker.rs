//! The page worker: one task in, a list of outcomes out.
//!
//! The worker is a pure function over the rasteriser and decoder adapters:
//! it touches no shared state and no disk, which is what makes the pool
//! trivially parallel. Pixel buffers live only inside one invocation and are
//! dropped before the outcomes are returned.
//!
//! ## The fallback ladder
//!
//! Decoding the full sheet at full effort for every page would dominate the
//! session wall-clock, so the worker escalates only as needed:
//!
//! 1. ROI render, raw decode (fast budget)
//! 2. ROI render, binarised decode (generous budget)
//! 3. full-page render, raw decode — only when a ROI was configured
//! 4. full-page render, binarised decode
//!
//! The first step that yields payloads wins. Most symbol-bearing pages exit
//! at step 1; the expensive steps only run for pages that would otherwise be
//! reported empty.

use crate::config::Roi;
use crate::error::GrabError;
use crate::gs1::{normalize_gs1_raw, parse_honest_mark};
use crate::output::PageOutcome;
use crate::pipeline::decode::{
    SymbolDecoder, FIRST_PASS_TIMEOUT_MS, MAX_CODES_PER_PAGE, SECOND_PASS_TIMEOUT_MS,
};
use crate::pipeline::preprocess;
use crate::pipeline::render::PageRasterizer;
use image::DynamicImage;
use std::path::Path;
use tracing::debug;

/// Per-task knobs the scheduler hands to every worker invocation.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub dpi: u32,
    pub roi: Option<Roi>,
    pub parse_marks: bool,
}

/// Process one page: render, decode with fallbacks, normalise, parse.
///
/// `page_index` is 0-based; the outcomes carry the 1-based page number.
/// This function never returns an error; rasteriser and decoder failures
/// become a single [`PageOutcome::Error`].
pub fn process_page(
    rasterizer: &dyn PageRasterizer,
    decoder: &dyn SymbolDecoder,
    pdf_path: &Path,
    page_index: usize,
    opts: &WorkerOptions,
) -> Vec<PageOutcome> {
    let filename = pdf_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| pdf_path.display().to_string());
    let page = page_index + 1;

    match run_ladder(rasterizer, decoder, pdf_path, page_index, opts) {
        Ok(payloads) if payloads.is_empty() => vec![PageOutcome::NotFound { filename, page }],
        Ok(payloads) => payloads
            .into_iter()
            .map(|payload| {
                // Payloads are raw bytes; conversion to UTF-8 is lenient.
                let text = String::from_utf8_lossy(&payload);
                let raw_code = normalize_gs1_raw(&text);
                let parsed = opts.parse_marks.then(|| parse_honest_mark(&text));
                PageOutcome::Found {
                    filename: filename.clone(),
                    page,
                    raw_code,
                    parsed,
                }
            })
            .collect(),
        Err(e) => vec![PageOutcome::Error {
            filename,
            page,
            message: e.to_string(),
        }],
    }
}

/// ROI attempt first; full page only when the ROI came up empty.
fn run_ladder(
    rasterizer: &dyn PageRasterizer,
    decoder: &dyn SymbolDecoder,
    pdf_path: &Path,
    page_index: usize,
    opts: &WorkerOptions,
) -> Result<Vec<Vec<u8>>, GrabError> {
    let payloads = decode_two_pass(rasterizer, decoder, pdf_path, page_index, opts.dpi, opts.roi)?;
    if payloads.is_empty() && opts.roi.is_some() {
        debug!(page = page_index + 1, "ROI empty, retrying full page");
        return decode_two_pass(rasterizer, decoder, pdf_path, page_index, opts.dpi, None);
    }
    Ok(payloads)
}

/// Raw decode with the fast budget, then binarised decode with the generous
/// budget. The rendered image is dropped on return.
fn decode_two_pass(
    rasterizer: &dyn PageRasterizer,
    decoder: &dyn SymbolDecoder,
    pdf_path: &Path,
    page_index: usize,
    dpi: u32,
    clip: Option<Roi>,
) -> Result<Vec<Vec<u8>>, GrabError> {
    let image = rasterizer.render(pdf_path, page_index, dpi, clip)?;

    let payloads = decoder.decode(&image, FIRST_PASS_TIMEOUT_MS, MAX_CODES_PER_PAGE)?;
    if !payloads.is_empty() {
        return Ok(payloads);
    }

    let binary = DynamicImage::ImageLuma8(preprocess::binarize(&image));
    decoder.decode(&binary, SECOND_PASS_TIMEOUT_MS, MAX_CODES_PER_PAGE)
}
