//! Per-operation-type timing: a rolling µs-per-unit used to size chunks.

use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct PerfTracker {
    tot_time: Duration,
    tot_ops: u64,
    us_per_op: f64,
}

impl Default for PerfTracker {
    fn default() -> Self {
        // Seeded at 1 µs/unit so the first barrier of a new operation type
        // still gets a usable plan.
        Self {
            tot_time: Duration::ZERO,
            tot_ops: 1,
            us_per_op: 1.0,
        }
    }
}

impl PerfTracker {
    pub fn track(&mut self, time: Duration, ops: u64) {
        self.tot_time += time;
        self.tot_ops += ops;
        if self.tot_ops > 0 {
            self.us_per_op = self.tot_time.as_secs_f64() * 1e6 / self.tot_ops as f64;
        }
    }

    pub fn us_per_op(&self) -> f64 {
        self.us_per_op
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_to_observed_rate() {
        let mut pt = PerfTracker::default();
        assert_eq!(pt.us_per_op(), 1.0);
        pt.track(Duration::from_micros(2000), 1000);
        assert!((pt.us_per_op() - 2.0).abs() < 0.01);
        pt.track(Duration::from_micros(2000), 1000);
        assert!((pt.us_per_op() - 2.0).abs() < 0.01);
    }
}
