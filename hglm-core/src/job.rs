//! Cooperative cancellation and progress reporting for a running fit.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Cloneable handle shared between the caller and a running fit.
///
/// The fit polls [`JobHandle::stop_requested`] before every EM iteration and
/// at the start of every partition map; the caller may request a stop from
/// any thread.
#[derive(Debug, Clone, Default)]
pub struct JobHandle {
    stop: Arc<AtomicBool>,
    progress: Arc<AtomicUsize>,
}

impl JobHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Record the number of committed EM iterations.
    pub fn update(&self, iterations: usize) {
        self.progress.store(iterations, Ordering::Relaxed);
    }

    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::Relaxed)
    }
}
