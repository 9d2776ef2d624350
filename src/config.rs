//! Configuration types for a DataMatrix extraction session.
//!
//! All session behaviour is controlled through [`GrabConfig`], built via its
//! [`GrabConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share configs across tasks and to diff two runs to understand why
//! their outputs differ.

use crate::error::GrabError;
use crate::pipeline::decode::SymbolDecoder;
use crate::pipeline::render::PageRasterizer;
use crate::progress::ProgressCallback;
use crate::sink::SAVE_EVERY;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Normalised region of interest on a page, each coordinate in `0..=1`.
///
/// Rendering a clip instead of the full sheet keeps the image handed to the
/// decoder small; the symbol sits in a roughly known corner of the sheet for
/// the print layouts this tool targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Roi {
    /// Check the rectangle invariants: `0 ≤ x0 < x1 ≤ 1`, `0 ≤ y0 < y1 ≤ 1`.
    pub fn validate(&self) -> Result<(), GrabError> {
        let ok = self.x0 >= 0.0
            && self.y0 >= 0.0
            && self.x0 < self.x1
            && self.y0 < self.y1
            && self.x1 <= 1.0
            && self.y1 <= 1.0;
        if ok {
            Ok(())
        } else {
            Err(GrabError::InvalidConfig(format!(
                "ROI must satisfy 0 <= x0 < x1 <= 1 and 0 <= y0 < y1 <= 1, got ({}, {}, {}, {})",
                self.x0, self.y0, self.x1, self.y1
            )))
        }
    }
}

/// Region the first decode pass looks at: the top-left quarter of the sheet,
/// where the marking layouts this tool targets place the symbol.
pub const DEFAULT_ROI: Roi = Roi {
    x0: 0.0,
    y0: 0.0,
    x1: 0.5,
    y1: 0.5,
};

/// Configuration for one extraction session.
///
/// Built via [`GrabConfig::builder()`] or [`GrabConfig::default()`].
///
/// # Example
/// ```rust
/// use dmx_grabber::GrabConfig;
///
/// let config = GrabConfig::builder()
///     .input_dir("data/input")
///     .output("output/results.csv")
///     .dpi(300)
///     .workers(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct GrabConfig {
    /// Directory scanned for `*.pdf` files. Default: `data/input`.
    pub input_dir: PathBuf,

    /// Output CSV path. Default: `output/results.csv`.
    ///
    /// A non-`.csv` suffix is rewritten to `.csv` by [`GrabConfigBuilder::build`]
    /// (with a warning); the progress sidecar lives next to it at
    /// `<output>.progress.csv`.
    pub output: PathBuf,

    /// Rendering DPI. Minimum 72 (the PDF native unit). Default: 300.
    ///
    /// 300 DPI resolves the small DataMatrix modules on typical paper scans;
    /// values above 1200 only cost render time and memory.
    pub dpi: u32,

    /// Worker count. 1 selects the inline single-worker mode; above 1, a
    /// pool of that many parallel page workers. Default: 1.
    pub workers: usize,

    /// Parse each decoded payload into marking fields. When false the
    /// payload is still normalised before it reaches the sink. Default: true.
    pub parse_marks: bool,

    /// Load the progress sidecar and skip pages already listed there.
    /// Default: false.
    pub resume: bool,

    /// Cap on the number of tasks processed this session, applied after
    /// resume filtering. `None` = no cap.
    pub limit: Option<usize>,

    /// Region rendered for the first decode attempt; `None` disables the
    /// ROI pass and every page is decoded full-sheet only.
    /// Default: [`DEFAULT_ROI`].
    pub roi: Option<Roi>,

    /// Pages buffered in the sink between flushes. Default: [`SAVE_EVERY`].
    pub save_every: usize,

    /// Per-task progress events for the embedding application.
    pub progress_callback: Option<ProgressCallback>,

    /// Rasteriser override; `None` uses the pdfium-backed default.
    pub rasterizer: Option<Arc<dyn PageRasterizer>>,

    /// Decoder override; `None` uses the rxing-backed default.
    pub decoder: Option<Arc<dyn SymbolDecoder>>,
}

impl Default for GrabConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/input"),
            output: PathBuf::from("output/results.csv"),
            dpi: 300,
            workers: 1,
            parse_marks: true,
            resume: false,
            limit: None,
            roi: Some(DEFAULT_ROI),
            save_every: SAVE_EVERY,
            progress_callback: None,
            rasterizer: None,
            decoder: None,
        }
    }
}

impl fmt::Debug for GrabConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrabConfig")
            .field("input_dir", &self.input_dir)
            .field("output", &self.output)
            .field("dpi", &self.dpi)
            .field("workers", &self.workers)
            .field("parse_marks", &self.parse_marks)
            .field("resume", &self.resume)
            .field("limit", &self.limit)
            .field("roi", &self.roi)
            .field("save_every", &self.save_every)
            .field(
                "rasterizer",
                &self.rasterizer.as_ref().map(|_| "<dyn PageRasterizer>"),
            )
            .field("decoder", &self.decoder.as_ref().map(|_| "<dyn SymbolDecoder>"))
            .finish()
    }
}

impl GrabConfig {
    /// Create a new builder for `GrabConfig`.
    pub fn builder() -> GrabConfigBuilder {
        GrabConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GrabConfig`].
#[derive(Debug)]
pub struct GrabConfigBuilder {
    config: GrabConfig,
}

impl GrabConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output = path.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn parse_marks(mut self, v: bool) -> Self {
        self.config.parse_marks = v;
        self
    }

    pub fn resume(mut self, v: bool) -> Self {
        self.config.resume = v;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.config.limit = limit;
        self
    }

    pub fn roi(mut self, roi: Option<Roi>) -> Self {
        self.config.roi = roi;
        self
    }

    pub fn save_every(mut self, n: usize) -> Self {
        self.config.save_every = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn SymbolDecoder>) -> Self {
        self.config.decoder = Some(decoder);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Rewrites a non-`.csv` output suffix to `.csv` (warned, not an error,
    /// matching the CLI contract).
    pub fn build(self) -> Result<GrabConfig, GrabError> {
        let mut config = self.config;

        if config.dpi < 72 {
            return Err(GrabError::InvalidConfig(format!(
                "DPI must be >= 72, got {}",
                config.dpi
            )));
        }
        if config.dpi > 1200 {
            warn!(dpi = config.dpi, "DPI above 1200 slows rendering with no decode benefit");
        }
        if config.workers == 0 {
            return Err(GrabError::InvalidConfig("workers must be >= 1".into()));
        }
        if config.limit == Some(0) {
            return Err(GrabError::InvalidConfig("limit must be >= 1".into()));
        }
        if let Some(roi) = &config.roi {
            roi.validate()?;
        }

        let csv_suffix = config
            .output
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !csv_suffix {
            let rewritten = config.output.with_extension("csv");
            warn!(
                from = %config.output.display(),
                to = %rewritten.display(),
                "output path rewritten to .csv suffix"
            );
            config.output = rewritten;
        }

        Ok(config)
    }
}
