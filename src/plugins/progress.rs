use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives load progress, typically to drive a splash screen.
///
/// During one load `increment_progress` is called exactly `1 + plugin_count`
/// times: once for resolving the load context and once per settled `init()`.
pub trait ProgressObserver: Send + Sync {
    fn set_max_progress(&self, max: usize);
    fn increment_progress(&self);
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn set_max_progress(&self, _max: usize) {}
    fn increment_progress(&self) {}
}

/// Reports progress through `tracing` at debug level.
#[derive(Debug, Default)]
pub struct LoggingProgress {
    max: AtomicUsize,
    current: AtomicUsize,
}

impl LoggingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::Relaxed)
    }
}

impl ProgressObserver for LoggingProgress {
    fn set_max_progress(&self, max: usize) {
        self.max.store(max, Ordering::Relaxed);
        self.current.store(0, Ordering::Relaxed);
        tracing::debug!(max, "Load progress started");
    }

    fn increment_progress(&self) {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(current, max = self.max(), "Load progress");
    }
}
