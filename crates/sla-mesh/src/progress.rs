//! Progress reporting and cancellation for staged jobs.
//!
//! A job advances through coarse steps. Each step sets the tracker to its
//! position and hands a [`Progress`] snapshot to the caller's callback.
//! Worker threads only read the atomic cancellation flag.
//!
//! ```
//! use sla_mesh::progress::{ProgressCallback, ProgressTracker};
//!
//! let callback: ProgressCallback = Box::new(|progress| {
//!     println!("{}%: {}", progress.percent(), progress.message);
//!     progress.percent() < 50 // stop once half way
//! });
//!
//! let tracker = ProgressTracker::new(100);
//! tracker.set(30);
//! assert!(tracker.report(Some(&callback), "Placing heads"));
//! tracker.set(60);
//! assert!(!tracker.report(Some(&callback), "Routing"));
//! assert!(tracker.is_cancelled());
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Progress information passed to callbacks.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Position reached so far.
    pub current: u64,

    /// Position at which the job is finished.
    pub total: u64,

    /// Label of the step being entered.
    pub message: String,

    /// Time since the job started.
    pub elapsed: Duration,

    /// Linear extrapolation of `elapsed`, once there is something to go by.
    pub estimated_remaining: Option<Duration>,
}

impl Progress {
    /// Progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64 / self.total as f64).min(1.0)
        }
    }

    /// Progress as a percentage (0 to 100).
    #[inline]
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }
}

/// Callback function for progress reporting.
///
/// Returns `true` to continue, `false` to request cancellation.
pub type ProgressCallback = Box<dyn Fn(&Progress) -> bool + Send + Sync>;

/// Shared position and cancellation flag of one job.
#[derive(Debug)]
pub struct ProgressTracker {
    current: AtomicU64,
    total: u64,
    cancelled: AtomicBool,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            current: AtomicU64::new(0),
            total,
            cancelled: AtomicBool::new(false),
            start_time: Instant::now(),
        }
    }

    /// Move to `value`. Positions may go down, e.g. when a job aborts.
    #[inline]
    pub fn set(&self, value: u64) {
        self.current.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Check if cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation. There is no way back.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn estimated_remaining(&self) -> Option<Duration> {
        let current = self.current();
        if current == 0 || current >= self.total {
            return None;
        }
        let secs = self.elapsed().as_secs_f64() * (self.total - current) as f64 / current as f64;
        secs.is_finite().then(|| Duration::from_secs_f64(secs))
    }

    /// Snapshot of the current state.
    pub fn snapshot(&self, message: impl Into<String>) -> Progress {
        Progress {
            current: self.current(),
            total: self.total,
            message: message.into(),
            elapsed: self.elapsed(),
            estimated_remaining: self.estimated_remaining(),
        }
    }

    /// Hand a snapshot to `callback`.
    ///
    /// Returns `false` if the job is cancelled, either before the call or
    /// because the callback asked for it.
    pub fn report(&self, callback: Option<&ProgressCallback>, message: impl Into<String>) -> bool {
        if let Some(callback) = callback
            && !callback(&self.snapshot(message))
        {
            self.cancel();
        }
        !self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_progress_fraction() {
        let tracker = ProgressTracker::new(100);
        tracker.set(25);
        let p = tracker.snapshot("test");
        assert!((p.fraction() - 0.25).abs() < 1e-10);
        assert_eq!(p.percent(), 25);
        assert_eq!(p.message, "test");

        assert_eq!(ProgressTracker::new(0).snapshot("").fraction(), 0.0);
    }

    #[test]
    fn test_position_can_go_back() {
        let tracker = ProgressTracker::new(100);
        tracker.set(75);
        tracker.set(0);
        assert_eq!(tracker.current(), 0);
        assert!(tracker.snapshot("").estimated_remaining.is_none());
        assert_eq!(tracker.total(), 100);
    }

    #[test]
    fn test_callback_cancels() {
        let tracker = ProgressTracker::new(10);
        let callback: ProgressCallback = Box::new(|_| false);
        assert!(!tracker.report(Some(&callback), "step"));
        assert!(tracker.is_cancelled());
        // Stays cancelled without a callback
        assert!(!tracker.report(None, "step"));
    }

    #[test]
    fn test_every_report_reaches_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let callback: ProgressCallback = Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        let tracker = ProgressTracker::new(10);
        for i in 0..5 {
            tracker.set(i);
            assert!(tracker.report(Some(&callback), "step"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_cancel_seen_across_threads() {
        let tracker = Arc::new(ProgressTracker::new(4));
        let remote = Arc::clone(&tracker);
        std::thread::spawn(move || remote.cancel())
            .join()
            .unwrap();
        assert!(tracker.is_cancelled());
    }
}
