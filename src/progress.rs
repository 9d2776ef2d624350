//! Progress-callback trait for per-page session events.
//!
//! Inject an [`Arc<dyn SessionProgressCallback>`] via
//! [`crate::config::GrabConfigBuilder::progress_callback`] to receive events
//! as the scheduler records each completed page.
//!
//! Callbacks are invoked from the scheduler task only, in completion order.
//! Under a multi-worker pool that is not page order; the sink, not the
//! callback, is what sees ordered data. The trait is `Send + Sync` because
//! the config that carries it crosses task boundaries.

use std::sync::Arc;

/// Called by the scheduler as the session progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait SessionProgressCallback: Send + Sync {
    /// Called once after enumeration, before any page is dispatched.
    ///
    /// `total_tasks` is the number of pages that will actually be processed
    /// this session: already-resumed pages and the `limit` cap are excluded.
    fn on_session_start(&self, total_tasks: usize) {
        let _ = total_tasks;
    }

    /// Called when a page finished without a page-level error.
    ///
    /// `codes_found` is 0 for an empty page.
    fn on_task_complete(&self, filename: &str, page: usize, codes_found: usize) {
        let _ = (filename, page, codes_found);
    }

    /// Called when a page failed to render or decode.
    fn on_task_error(&self, filename: &str, page: usize, error: String) {
        let _ = (filename, page, error);
    }

    /// Called once after the last completion, including interrupted runs.
    fn on_session_complete(&self, pages_processed: usize, codes_found: usize) {
        let _ = (pages_processed, codes_found);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SessionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GrabConfig`].
pub type ProgressCallback = Arc<dyn SessionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        completes: AtomicUsize,
        errors: AtomicUsize,
        final_codes: AtomicUsize,
    }

    impl SessionProgressCallback for TrackingCallback {
        fn on_task_complete(&self, _filename: &str, _page: usize, _codes_found: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_task_error(&self, _filename: &str, _page: usize, _error: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_session_complete(&self, _pages: usize, codes: usize) {
            self.final_codes.store(codes, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_session_start(5);
        cb.on_task_complete("a.pdf", 1, 1);
        cb.on_task_error("a.pdf", 2, "render failed".to_string());
        cb.on_session_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            final_codes: AtomicUsize::new(0),
        };

        tracker.on_session_start(3);
        tracker.on_task_complete("a.pdf", 1, 1);
        tracker.on_task_complete("a.pdf", 2, 0);
        tracker.on_task_error("a.pdf", 3, "decoder blew up".to_string());
        tracker.on_session_complete(3, 1);

        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.final_codes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn SessionProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_session_start(10);
        cb.on_task_complete("x.pdf", 1, 0);
    }
}
