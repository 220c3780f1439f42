//! Progress reporting and cooperative cancellation for long operations.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ReleaseError, ReleaseResult};

/// Receives progress updates pushed synchronously by a long operation.
///
/// Implementations must return promptly; the operation waits for every
/// listener before continuing.
pub trait ProgressListener: Send + Sync {
    fn update_progress(&self, percent: u8, note: &str);
}

impl<F> ProgressListener for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn update_progress(&self, percent: u8, note: &str) {
        self(percent, note)
    }
}

/// Fans progress updates out to zero or more listeners.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    listeners: Vec<Arc<dyn ProgressListener>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ProgressListener>) {
        self.listeners.push(listener);
    }

    pub fn report(&self, percent: u8, note: &str) {
        let percent = percent.min(100);
        for listener in &self.listeners {
            listener.update_progress(percent, note);
        }
    }

    /// Report `done` out of `total` as a percentage.
    pub fn report_fraction(&self, done: usize, total: usize, note: &str) {
        let percent = if total == 0 { 100 } else { done * 100 / total };
        self.report(percent.min(100) as u8, note);
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// A cloneable flag checked between processed units.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`ReleaseError::Cancelled`] once the flag is raised.
    pub fn check(&self) -> ReleaseResult<()> {
        if self.is_cancelled() {
            Err(ReleaseError::Cancelled)
        } else {
            Ok(())
        }
    }
}
