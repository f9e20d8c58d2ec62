//! Byte counts to percentages.
//!
//! The bridge is fed every native progress report for one operation and
//! decides which ones become caller-visible percentages.

/// Converts `(bytes_received, bytes_total)` reports into percentages.
///
/// Guarantees for one operation:
///
/// - nothing is emitted while the total is unknown (0)
/// - reports with fewer bytes than an earlier one are stale and dropped
/// - emitted percentages lie in `[0, 100)` and strictly increase
/// - a smaller total after a larger one never regresses the percentage
///
/// The 100% reading is withheld: completion is announced by the terminal
/// notification, which is always the last one delivered.
#[derive(Debug, Clone, Default)]
pub struct ProgressBridge {
    last_received: u64,
    last_percentage: Option<f64>,
}

impl ProgressBridge {
    /// Create a bridge for a fresh operation.
    pub const fn new() -> Self {
        Self {
            last_received: 0,
            last_percentage: None,
        }
    }

    /// Feed one native report, returning the percentage to deliver, if any.
    pub fn observe(&mut self, bytes_received: u64, bytes_total: u64) -> Option<f64> {
        if bytes_received < self.last_received {
            return None;
        }
        self.last_received = bytes_received;

        let percentage = percentage_of(bytes_received, bytes_total)?;
        if percentage >= 100.0 {
            return None;
        }
        if self.last_percentage.is_some_and(|last| percentage <= last) {
            return None;
        }
        self.last_percentage = Some(percentage);
        Some(percentage)
    }

    /// Highest percentage emitted so far.
    pub const fn last_percentage(&self) -> Option<f64> {
        self.last_percentage
    }
}

/// `100 * received / total`, clamped to `[0, 100]` and rounded to two decimals.
#[allow(clippy::cast_precision_loss)]
fn percentage_of(bytes_received: u64, bytes_total: u64) -> Option<f64> {
    if bytes_total == 0 {
        return None;
    }
    let raw = 100.0 * bytes_received as f64 / bytes_total as f64;
    Some(((raw * 100.0).round() / 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn withholds_until_total_known() {
        let mut bridge = ProgressBridge::new();
        assert_eq!(bridge.observe(100, 0), None);
        assert_eq!(bridge.observe(250, 1000), Some(25.0));
    }

    #[test]
    fn two_chunks_emit_half_then_withhold_full() {
        let mut bridge = ProgressBridge::new();
        assert_eq!(bridge.observe(500, 1000), Some(50.0));
        assert_eq!(bridge.observe(1000, 1000), None);
        assert_eq!(bridge.last_percentage(), Some(50.0));
    }

    #[test]
    fn drops_stale_reports() {
        let mut bridge = ProgressBridge::new();
        assert_eq!(bridge.observe(600, 1000), Some(60.0));
        assert_eq!(bridge.observe(400, 1000), None);
        assert_eq!(bridge.observe(600, 1000), None);
        assert_eq!(bridge.observe(700, 1000), Some(70.0));
    }

    #[test]
    fn larger_total_does_not_regress() {
        let mut bridge = ProgressBridge::new();
        assert_eq!(bridge.observe(500, 1000), Some(50.0));
        // Total grew: 600/2000 = 30% is below the previous maximum
        assert_eq!(bridge.observe(600, 2000), None);
        assert_eq!(bridge.observe(1200, 2000), Some(60.0));
    }

    #[test]
    fn smaller_total_clamps() {
        let mut bridge = ProgressBridge::new();
        assert_eq!(bridge.observe(500, 1000), Some(50.0));
        assert_eq!(bridge.observe(900, 800), None);
    }

    #[test]
    fn rounds_to_two_decimals() {
        let mut bridge = ProgressBridge::new();
        assert_eq!(bridge.observe(1, 3), Some(33.33));
    }

    proptest! {
        #[test]
        fn percentages_are_bounded_and_increasing(
            mut received in proptest::collection::vec(0u64..10_000, 1..64),
            totals in proptest::collection::vec(0u64..10_000, 1..64),
        ) {
            received.sort_unstable();
            let mut bridge = ProgressBridge::new();
            let mut previous: Option<f64> = None;

            for (i, bytes) in received.iter().enumerate() {
                let total = totals[i % totals.len()];
                if let Some(pct) = bridge.observe(*bytes, total) {
                    prop_assert!((0.0..100.0).contains(&pct));
                    if let Some(prev) = previous {
                        prop_assert!(pct > prev);
                    }
                    previous = Some(pct);
                }
            }
        }
    }
}
