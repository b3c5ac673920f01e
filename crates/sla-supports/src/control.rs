//! Status reporting, cancellation and pausing for a generation run.

use std::time::Duration;

use sla_mesh::progress::{ProgressCallback, ProgressTracker};
use tracing::debug;

use crate::error::{SupportError, SupportResult};

/// Loop iterations between cancellation checks.
pub const CHECK_STRIDE: usize = 16;

/// Predicate polled by the generator.
pub type ControlPredicate = Box<dyn Fn() -> bool + Send + Sync>;

/// Hooks a caller uses to observe and steer a running generation.
///
/// Cancellation can come from three places: the stop predicate, a progress
/// callback returning `false`, or [`JobControl::cancel`]. Once requested it
/// is sticky.
pub struct JobControl {
    progress: Option<ProgressCallback>,
    stop: Option<ControlPredicate>,
    pause: Option<ControlPredicate>,
    tracker: ProgressTracker,
    pause_poll: Duration,
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JobControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobControl")
            .field("has_progress", &self.progress.is_some())
            .field("has_stop", &self.stop.is_some())
            .field("has_pause", &self.pause.is_some())
            .field("cancelled", &self.tracker.is_cancelled())
            .finish()
    }
}

impl JobControl {
    /// A control with no hooks; the run can still be cancelled with
    /// [`JobControl::cancel`].
    pub fn new() -> Self {
        Self {
            progress: None,
            stop: None,
            pause: None,
            tracker: ProgressTracker::new(100),
            pause_poll: Duration::from_millis(50),
        }
    }

    /// Receive a [`Progress`](sla_mesh::Progress) on every step transition.
    /// Percent is `current` out of `total = 100`; the message is the step label.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Stop the run as soon as `predicate` returns true.
    pub fn with_stop_predicate(mut self, predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.stop = Some(Box::new(predicate));
        self
    }

    /// Hold the run between steps while `predicate` returns true.
    pub fn with_pause_predicate(
        mut self,
        predicate: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.pause = Some(Box::new(predicate));
        self
    }

    /// How often a paused run re-checks its predicates.
    pub fn with_pause_poll(mut self, interval: Duration) -> Self {
        self.pause_poll = interval;
        self
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.tracker.cancel();
    }

    /// True once cancellation has been requested by any source.
    pub fn stop_requested(&self) -> bool {
        if self.tracker.is_cancelled() {
            return true;
        }
        if self.stop.as_ref().is_some_and(|stop| stop()) {
            self.tracker.cancel();
            return true;
        }
        false
    }

    /// True while the pause predicate holds.
    pub fn pause_requested(&self) -> bool {
        self.pause.as_ref().is_some_and(|pause| pause())
    }

    /// Report a step transition.
    pub fn report(&self, percent: u32, label: &str) {
        self.tracker.set(u64::from(percent));
        debug!(percent, label, "Support generation step");

        self.tracker.report(self.progress.as_ref(), label);
    }

    /// Fail with [`SupportError::Stopped`] if cancellation was requested.
    pub fn check_now(&self) -> SupportResult<()> {
        if self.stop_requested() {
            Err(SupportError::Stopped)
        } else {
            Ok(())
        }
    }

    /// Strided variant of [`JobControl::check_now`] for loop bodies.
    ///
    /// Only every [`CHECK_STRIDE`]-th iteration polls the predicates.
    #[inline]
    pub fn check(&self, iteration: usize) -> SupportResult<()> {
        if iteration % CHECK_STRIDE == 0 {
            self.check_now()
        } else {
            Ok(())
        }
    }

    /// Block while paused. Returns early with an error if cancelled.
    pub fn wait_while_paused(&self) -> SupportResult<()> {
        while self.pause_requested() {
            self.check_now()?;
            std::thread::sleep(self.pause_poll);
        }
        self.check_now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[test]
    fn test_no_hooks_never_stops() {
        let control = JobControl::new();
        assert!(control.check_now().is_ok());
        control.report(50, "half");
        assert!(control.wait_while_paused().is_ok());
    }

    #[test]
    fn test_cancel_is_sticky() {
        let control = JobControl::new();
        control.cancel();
        assert!(matches!(control.check_now(), Err(SupportError::Stopped)));
        assert!(control.stop_requested());
    }

    #[test]
    fn test_stride() {
        let control = JobControl::new().with_stop_predicate(|| true);
        assert!(control.check(1).is_ok());
        assert!(control.check(15).is_ok());
        assert!(control.check(16).is_err());
    }

    #[test]
    fn test_progress_callback_can_cancel() {
        let last = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&last);
        let control = JobControl::new().with_progress(Box::new(move |p| {
            seen.store(p.percent(), Ordering::SeqCst);
            p.percent() < 30
        }));

        control.report(10, "Filtering");
        assert!(control.check_now().is_ok());
        control.report(30, "Generate pinheads");
        assert_eq!(last.load(Ordering::SeqCst), 30);
        assert!(control.check_now().is_err());
    }

    #[test]
    fn test_pause_then_release() {
        let paused = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&paused);
        let polls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&polls);

        let control = JobControl::new()
            .with_pause_poll(Duration::from_millis(1))
            .with_pause_predicate(move || {
                if counter.fetch_add(1, Ordering::SeqCst) >= 3 {
                    flag.store(false, Ordering::SeqCst);
                }
                flag.load(Ordering::SeqCst)
            });

        assert!(control.wait_while_paused().is_ok());
        assert!(!paused.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_while_paused() {
        let control = JobControl::new()
            .with_pause_poll(Duration::from_millis(1))
            .with_pause_predicate(|| true)
            .with_stop_predicate(|| true);
        assert!(matches!(
            control.wait_while_paused(),
            Err(SupportError::Stopped)
        ));
    }
}
