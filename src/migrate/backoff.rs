use std::time::Duration;

use tracing::warn;

use crate::migrate::dispatcher::{Dispatcher, Task};

/// Default Retry-After assumed when a throttle signal carries no hint.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 2;

/// Converts a throttling signal into a bounded pause-resume cycle without
/// losing the failed unit of work.
///
/// This controller owns the only resubmission path in the system: a
/// rate-limited unit is requeued here exactly once per failure, iteratively.
/// The cycle is pause, requeue, sleep out the window, resume. Overlapping
/// windows from concurrent failures resolve to the shortest sleep resuming
/// dispatch first; the longer sleepers resume again harmlessly.
pub struct BackoffController {
    dispatcher: Dispatcher,
    default_retry_after_secs: u64,
}

impl BackoffController {
    pub fn new(dispatcher: Dispatcher, default_retry_after_secs: u64) -> Self {
        Self {
            dispatcher,
            default_retry_after_secs,
        }
    }

    /// Throttle window for a signal, with a one-second grace margin on top of
    /// the service hint.
    pub fn delay_for(&self, retry_after_secs: Option<u64>) -> Duration {
        Duration::from_secs(retry_after_secs.unwrap_or(self.default_retry_after_secs) + 1)
    }

    /// Run one throttle cycle for a failed unit: pause dispatch, requeue the
    /// unit (it sits queued while paused), sleep, resume.
    pub async fn throttle(&self, retry_after_secs: Option<u64>, unit: Task) {
        let delay = self.delay_for(retry_after_secs);
        warn!(
            delay_secs = delay.as_secs(),
            retry_after = ?retry_after_secs,
            "rate limited; pausing dispatch and requeueing unit"
        );
        self.dispatcher.pause().await;
        self.dispatcher.submit(unit).await;
        tokio::time::sleep(delay).await;
        self.dispatcher.resume().await;
    }
}
