//! DataMatrix detection and decoding over rendered page images.
//!
//! The decoder is a black box behind [`SymbolDecoder`]: pixels in, payload
//! byte strings out. "Nothing on this page" is an empty result, never an
//! error; only an internal library failure maps to
//! [`GrabError::DecodeFailed`].
//!
//! The production implementation is [`RxingDecoder`], built on the pure-Rust
//! ZXing port. rxing does not expose a wall-clock deadline, so the caller's
//! time budget selects the effort profile instead: a budget at least as
//! large as [`SECOND_PASS_TIMEOUT_MS`] turns on the exhaustive `TryHarder`
//! search, the short first-pass budget keeps the fast path.

use crate::error::GrabError;
use image::DynamicImage;
use rxing::{BarcodeFormat, DecodeHints, Exceptions};
use std::collections::HashSet;
use tracing::trace;

/// Budget for the first decode attempt on the raw render.
pub const FIRST_PASS_TIMEOUT_MS: u64 = 200;
/// Budget for the retry on the binarised image.
pub const SECOND_PASS_TIMEOUT_MS: u64 = 800;
/// At most one symbol is expected per page; downstream code does not assume
/// this and handles any count.
pub const MAX_CODES_PER_PAGE: usize = 1;

/// Decode DataMatrix symbols out of a page image.
pub trait SymbolDecoder: Send + Sync {
    /// Return up to `max_codes` decoded payloads, or an empty vector when
    /// nothing is found within the budget.
    fn decode(
        &self,
        image: &DynamicImage,
        timeout_ms: u64,
        max_codes: usize,
    ) -> Result<Vec<Vec<u8>>, GrabError>;
}

/// Production decoder backed by rxing, restricted to the DataMatrix format.
pub struct RxingDecoder;

impl SymbolDecoder for RxingDecoder {
    fn decode(
        &self,
        image: &DynamicImage,
        timeout_ms: u64,
        max_codes: usize,
    ) -> Result<Vec<Vec<u8>>, GrabError> {
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();

        let mut hints = DecodeHints {
            PossibleFormats: Some(HashSet::from([BarcodeFormat::DATA_MATRIX])),
            TryHarder: Some(timeout_ms >= SECOND_PASS_TIMEOUT_MS),
            ..Default::default()
        };

        match rxing::helpers::detect_multiple_in_luma_with_hints(
            luma.into_raw(),
            width,
            height,
            &mut hints,
        ) {
            Ok(results) => {
                trace!(found = results.len(), width, height, "decode pass");
                Ok(results
                    .into_iter()
                    .take(max_codes)
                    .map(|r| r.getText().as_bytes().to_vec())
                    .collect())
            }
            // A miss is normal control flow, not a failure.
            Err(Exceptions::NotFoundException(_)) => Ok(Vec::new()),
            Err(e) => Err(GrabError::DecodeFailed {
                detail: e.to_string(),
            }),
        }
    }
}
