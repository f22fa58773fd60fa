//! Progress-callback trait for per-asset and per-diagram conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline copies assets and renders diagrams.
//!
//! # Example
//!
//! ```rust
//! use md2post::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     rendered: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_diagram_complete(&self, index: usize, total: usize) {
//!         let done = self.rendered.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("diagram {} done ({}/{})", index, done, total);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     rendered: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it copies assets and renders diagrams.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// Diagram and asset events arrive interleaved and in completion order, not
/// document order. Implementations must protect shared mutable state with
/// appropriate synchronisation primitives (e.g. `Mutex`, `AtomicUsize`).
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after the document is parsed and all work is planned.
    ///
    /// # Arguments
    /// * `assets`  : number of asset copies scheduled
    /// * `diagrams`: number of diagram blocks found
    fn on_conversion_start(&self, assets: usize, diagrams: usize) {
        let _ = (assets, diagrams);
    }

    /// Called when an asset lands in the assets directory.
    fn on_asset_copied(&self, reference: &str, link: &str) {
        let _ = (reference, link);
    }

    /// Called when an asset could not be copied.
    fn on_asset_error(&self, reference: &str, error: &str) {
        let _ = (reference, error);
    }

    /// Called just before a diagram's source is handed to the renderer.
    ///
    /// # Arguments
    /// * `index`: 0-based diagram index in document order
    /// * `total`: number of diagrams in the document
    fn on_diagram_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a diagram was rendered to PNG.
    fn on_diagram_complete(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a diagram failed; its code block stays in the output.
    fn on_diagram_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after the output document has been written.
    ///
    /// # Arguments
    /// * `diagrams_total`   : diagrams found
    /// * `diagrams_rendered`: diagrams replaced by images
    fn on_conversion_complete(&self, diagrams_total: usize, diagrams_rendered: usize) {
        let _ = (diagrams_total, diagrams_rendered);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        copied: AtomicUsize,
        asset_errors: AtomicUsize,
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        planned_diagrams: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_conversion_start(&self, _assets: usize, diagrams: usize) {
            self.planned_diagrams.store(diagrams, Ordering::SeqCst);
        }

        fn on_asset_copied(&self, _reference: &str, _link: &str) {
            self.copied.fetch_add(1, Ordering::SeqCst);
        }

        fn on_asset_error(&self, _reference: &str, _error: &str) {
            self.asset_errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_diagram_start(&self, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_diagram_complete(&self, _index: usize, _total: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_diagram_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(2, 3);
        cb.on_asset_copied("/a.png", "./assets/x/a.png");
        cb.on_asset_error("/b.png", "not found");
        cb.on_diagram_start(0, 3);
        cb.on_diagram_complete(0, 3);
        cb.on_diagram_error(1, 3, "syntax error");
        cb.on_conversion_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_conversion_start(1, 2);
        assert_eq!(tracker.planned_diagrams.load(Ordering::SeqCst), 2);

        tracker.on_asset_copied("/a.png", "./assets/x/a.png");
        tracker.on_diagram_start(0, 2);
        tracker.on_diagram_start(1, 2);
        tracker.on_diagram_complete(1, 2);
        tracker.on_diagram_error(0, 2, "mmdc not found");

        assert_eq!(tracker.copied.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.asset_errors.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ConversionProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_conversion_start(0, 1);
        cb.on_diagram_start(0, 1);
        cb.on_diagram_complete(0, 1);
    }
}
