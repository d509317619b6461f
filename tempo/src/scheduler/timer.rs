use std::time::Duration;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Fixed-period pacing clock.
///
/// Missed ticks are replayed in a burst so a stalled loop catches up instead of silently
/// lowering the long-run rate.
pub(crate) struct Timer {
    interval: Interval,
    period: Duration,
    ticks: u64,
}

impl Timer {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        Self {
            interval,
            period,
            ticks: 0,
        }
    }

    /// Wait for the next tick and return how many ticks have fired so far, this one
    /// included. NOTE: The first tick completes instantly.
    pub async fn tick(&mut self) -> u64 {
        let scheduled = self.interval.tick().await;
        self.ticks += 1;

        let lag = Instant::now().saturating_duration_since(scheduled);
        if lag > self.period {
            trace!("Tick {} fired {lag:?} late", self.ticks);
        }

        self.ticks
    }
}

impl std::fmt::Display for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", humantime::format_duration(self.period))
    }
}
