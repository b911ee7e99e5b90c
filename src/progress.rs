//! Progress reporting and cooperative abort, as seen from the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// Capability implemented by the pipeline object that owns progress and
/// abort state.
///
/// `update_progress` is only ever invoked from the thread driving a
/// dispatch, so implementations need no interior synchronization for it.
/// `abort_requested` is polled from worker threads at every task start and
/// must be cheap; the engine never writes the flag, it only reads it.
pub trait ProgressObserver: Sync {
    /// Receive a completion fraction in `[0.0, 1.0]`. Reported as 0.0 before
    /// dispatch, 1.0 after, and opportunistically in between.
    fn update_progress(&self, fraction: f32);

    /// Cooperative cancellation flag.
    fn abort_requested(&self) -> bool {
        false
    }

    /// Name used to attribute the abort diagnostic.
    fn pipeline_name(&self) -> &str {
        "pipeline"
    }
}

/// Per-dispatch progress accounting: an atomic completed count plus the
/// identity of the one thread allowed to report. Created fresh for every
/// top-level call and discarded when it returns.
pub(crate) struct ProgressState {
    completed: AtomicU64,
    total: u64,
    reporting_thread: ThreadId,
}

impl ProgressState {
    /// Bind reporting to the current thread, the one driving the dispatch.
    pub(crate) fn for_current_thread(total: u64) -> Self {
        Self {
            completed: AtomicU64::new(0),
            total,
            reporting_thread: thread::current().id(),
        }
    }

    /// Record `count` finished elements. The fraction is reported only when
    /// called from the reporting thread, so the observer sees a
    /// single-threaded, non-decreasing sequence; increments landing on other
    /// workers still count but are reported later, or not at all.
    pub(crate) fn record(&self, count: u64, observer: &dyn ProgressObserver) {
        let done = self.completed.fetch_add(count, Ordering::Relaxed) + count;
        if thread::current().id() == self.reporting_thread {
            observer.update_progress(done as f32 / self.total as f32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        fractions: Mutex<Vec<f32>>,
    }

    impl ProgressObserver for Recorder {
        fn update_progress(&self, fraction: f32) {
            self.fractions.lock().unwrap().push(fraction);
        }
    }

    #[test]
    fn test_reporting_thread_updates_observer() {
        let recorder = Recorder {
            fractions: Mutex::new(Vec::new()),
        };
        let state = ProgressState::for_current_thread(4);

        state.record(1, &recorder);
        state.record(2, &recorder);
        state.record(1, &recorder);

        let fractions = recorder.fractions.lock().unwrap();
        assert_eq!(*fractions, vec![0.25, 0.75, 1.0]);
    }

    #[test]
    fn test_other_threads_count_but_do_not_report() {
        let recorder = Recorder {
            fractions: Mutex::new(Vec::new()),
        };
        let state = ProgressState::for_current_thread(2);

        std::thread::scope(|scope| {
            scope.spawn(|| state.record(1, &recorder));
        });
        assert!(recorder.fractions.lock().unwrap().is_empty());

        // The increment from the worker thread is still visible here.
        state.record(1, &recorder);
        assert_eq!(*recorder.fractions.lock().unwrap(), vec![1.0]);
    }
}
