//! Progress throttling.
//!
//! A fast connection produces thousands of chunks per second; the engine only
//! needs a handful of progress events. The final reading always passes.

use std::time::Duration;

use tokio::time::Instant;

/// Rate-limiter for native progress events of one transfer.
#[derive(Debug)]
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
        }
    }

    /// Whether a reading of `bytes_received` out of `bytes_total` should be
    /// reported now.
    ///
    /// The first reading and the one that reaches a known total are always
    /// reported.
    pub fn should_emit(&mut self, bytes_received: u64, bytes_total: u64) -> bool {
        let now = Instant::now();
        let complete = bytes_total > 0 && bytes_received >= bytes_total;
        match self.last_emit {
            Some(last) if !complete && now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_reading_passes() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(100));
        assert!(throttle.should_emit(1, 100));
    }

    #[tokio::test(start_paused = true)]
    async fn respects_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(50));
        assert!(throttle.should_emit(1, 100));
        assert!(!throttle.should_emit(2, 100));

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(throttle.should_emit(3, 100));
    }

    #[tokio::test(start_paused = true)]
    async fn final_reading_is_never_dropped() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(10));
        assert!(throttle.should_emit(10, 100));
        assert!(!throttle.should_emit(50, 100));
        assert!(throttle.should_emit(100, 100));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_total_is_only_time_based() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(100));
        assert!(throttle.should_emit(10, 0));
        assert!(!throttle.should_emit(20, 0));
    }
}
