//! Outcome and statistics types produced by the extraction pipeline.

use crate::gs1::HonestMarkCode;
use serde::{Deserialize, Serialize};

/// The result of processing one PDF page, produced by the page worker.
///
/// A page normally yields exactly one outcome. `Found` is emitted once per
/// decoded symbol, so a page can in principle yield several; the decoder is
/// currently capped at one symbol per page, but nothing downstream assumes
/// that cardinality.
///
/// Page numbers here are 1-based (human-facing). The scheduler works with
/// 0-based page indices; the translation happens exactly once, at the worker
/// boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PageOutcome {
    /// A DataMatrix symbol was decoded on this page.
    Found {
        filename: String,
        page: usize,
        /// The decoded payload after GS1 normalisation ([`crate::gs1`]),
        /// never the untouched scanner output.
        raw_code: String,
        /// Parsed marking fields; `None` when parsing is disabled.
        parsed: Option<HonestMarkCode>,
    },
    /// All decode passes came up empty. Normal control flow, not an error.
    NotFound { filename: String, page: usize },
    /// Rasterisation or decoding failed for this page.
    Error {
        filename: String,
        page: usize,
        message: String,
    },
}

impl PageOutcome {
    /// File the outcome belongs to.
    pub fn filename(&self) -> &str {
        match self {
            PageOutcome::Found { filename, .. }
            | PageOutcome::NotFound { filename, .. }
            | PageOutcome::Error { filename, .. } => filename,
        }
    }

    /// 1-based page number.
    pub fn page(&self) -> usize {
        match self {
            PageOutcome::Found { page, .. }
            | PageOutcome::NotFound { page, .. }
            | PageOutcome::Error { page, .. } => *page,
        }
    }
}

/// Aggregate counters for one extraction session.
///
/// Owned exclusively by the session driver; workers contribute through their
/// [`PageOutcome`]s only, and the scheduler updates the counters on the main
/// task as completions arrive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// PDF files discovered during enumeration.
    pub total_files: usize,
    /// Files whose last enumerated page completed this session.
    pub processed_files: usize,
    /// Pages across all files that reported a page count.
    pub total_pages: usize,
    /// Tasks dispatched and completed this session.
    pub pages_processed: usize,
    /// `Found` outcomes.
    pub total_codes: usize,
    /// `NotFound` outcomes.
    pub pages_empty: usize,
    /// `Error` outcomes.
    pub pages_errored: usize,
    /// Files skipped entirely (unreadable, page count failed).
    pub files_with_errors: usize,
    /// Pages skipped at enumeration because the progress sidecar already
    /// listed them.
    pub resumed_from: usize,
    /// Set when the session was cut short by an operator interrupt.
    pub interrupted: bool,
    /// Human-readable error descriptions, file-level and page-level.
    pub errors: Vec<String>,
}

impl SessionStats {
    /// Fraction of processed pages that yielded at least one code, in `0..=1`.
    pub fn success_rate(&self) -> f64 {
        if self.pages_processed == 0 {
            return 0.0;
        }
        (self.pages_processed - self.pages_empty) as f64 / self.pages_processed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_zero_when_nothing_processed() {
        assert_eq!(SessionStats::default().success_rate(), 0.0);
    }

    #[test]
    fn success_rate_counts_non_empty_pages() {
        let stats = SessionStats {
            pages_processed: 10,
            pages_empty: 4,
            ..Default::default()
        };
        assert!((stats.success_rate() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn outcome_accessors_cover_all_variants() {
        let found = PageOutcome::Found {
            filename: "a.pdf".into(),
            page: 3,
            raw_code: "code".into(),
            parsed: None,
        };
        let missing = PageOutcome::NotFound {
            filename: "b.pdf".into(),
            page: 1,
        };
        let failed = PageOutcome::Error {
            filename: "c.pdf".into(),
            page: 7,
            message: "boom".into(),
        };

        assert_eq!(found.filename(), "a.pdf");
        assert_eq!(found.page(), 3);
        assert_eq!(missing.filename(), "b.pdf");
        assert_eq!(missing.page(), 1);
        assert_eq!(failed.filename(), "c.pdf");
        assert_eq!(failed.page(), 7);
    }
}
