//! Injectable time source.
//!
//! The session itself takes `now` as an argument on every call; only the
//! async runner reads a clock. [`TokioClock`] follows tokio's clock so that
//! tests running with paused time see simulated wall-clock values.

use chrono::{DateTime, TimeDelta, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Translate a wall-clock deadline into a tokio instant for `sleep_until`.
    fn instant_for(&self, at: DateTime<Utc>) -> tokio::time::Instant {
        let delay = (at - self.now()).to_std().unwrap_or_default();
        tokio::time::Instant::now() + delay
    }
}

/// Wall clock anchored at construction and advanced by tokio's monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    wall: DateTime<Utc>,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// Anchor the clock at an arbitrary wall-clock instant.
    pub fn anchored_at(wall: DateTime<Utc>) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            wall,
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.origin.elapsed()).unwrap_or(TimeDelta::zero());
        self.wall + elapsed
    }

    fn instant_for(&self, at: DateTime<Utc>) -> tokio::time::Instant {
        let offset = (at - self.wall).to_std().unwrap_or_default();
        self.origin + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn follows_paused_tokio_time() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = TokioClock::anchored_at(start);
        tokio::time::advance(std::time::Duration::from_secs(90)).await;
        assert_eq!(clock.now(), start + TimeDelta::seconds(90));
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadlines_map_to_origin() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = TokioClock::anchored_at(start);
        let instant = clock.instant_for(start - TimeDelta::seconds(5));
        assert!(instant <= tokio::time::Instant::now());
    }
}
