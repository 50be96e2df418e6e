//! Cooperative suspension until a point in time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::clock::Clock;

/// How a suspension ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// The due time was reached
    Fired,

    /// The instance was cancelled while suspended
    Cancelled,
}

/// Parks a task until a deadline without holding a worker thread
#[derive(Clone)]
pub struct DelayScheduler {
    clock: Arc<dyn Clock>,
}

impl DelayScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Suspend until `fire_at`, or until `cancel` is triggered.
    ///
    /// A deadline that already passed fires without suspending, so resuming
    /// after the due time never delays again.
    pub async fn suspend_until(
        &self,
        fire_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> TimerOutcome {
        if cancel.is_cancelled() {
            return TimerOutcome::Cancelled;
        }
        if self.clock.now() >= fire_at {
            return TimerOutcome::Fired;
        }

        debug!(%fire_at, "Suspending until due time");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => TimerOutcome::Cancelled,
            _ = self.clock.sleep_until(fire_at) => TimerOutcome::Fired,
        }
    }
}
