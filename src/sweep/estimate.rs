//! Run-time estimation.
//!
//! Before a run the estimate is static: every step costs the settle time plus a
//! fixed communication overhead. Once a run starts, the pace observed so far
//! replaces the static figure.

use std::time::Duration;

/// Static estimate of total sweep time in seconds: `steps × (settle + overhead)`.
pub fn estimate(step_count: usize, settle_time_secs: f64, overhead_per_step_secs: f64) -> f64 {
    step_count as f64 * (settle_time_secs + overhead_per_step_secs)
}

/// [`estimate`] as a `Duration`, clamped at zero for nonsensical inputs.
pub fn estimate_duration(
    step_count: usize,
    settle_time_secs: f64,
    overhead_per_step_secs: f64,
) -> Duration {
    let secs = estimate(step_count, settle_time_secs, overhead_per_step_secs);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// Progress snapshot after a completed step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pace {
    /// Completed fraction as a percentage, 0–100.
    pub percent_complete: f64,
    pub elapsed: Duration,
    pub remaining: Duration,
}

/// Live estimator driven by the running average time per completed step.
#[derive(Debug, Clone, Copy)]
pub struct PaceEstimator {
    total_points: usize,
}

impl PaceEstimator {
    pub fn new(total_points: usize) -> Self {
        Self { total_points }
    }

    pub fn total_points(&self) -> usize {
        self.total_points
    }

    /// Computes progress after `completed` steps took `elapsed` in total.
    ///
    /// `remaining = (total - completed) × elapsed / completed`. With nothing
    /// completed yet there is no pace, so remaining is zero.
    pub fn pace(&self, completed: usize, elapsed: Duration) -> Pace {
        let completed = completed.min(self.total_points);
        let remaining_steps = self.total_points - completed;

        let remaining = if completed == 0 {
            Duration::ZERO
        } else {
            let per_step = elapsed.as_secs_f64() / completed as f64;
            Duration::from_secs_f64(per_step * remaining_steps as f64)
        };

        let percent_complete = if self.total_points == 0 {
            100.0
        } else {
            completed as f64 / self.total_points as f64 * 100.0
        };

        Pace {
            percent_complete,
            elapsed,
            remaining,
        }
    }
}

/// Formats a duration as `MM:SS`; minutes are not wrapped at an hour.
pub fn format_mmss(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_estimate_matches_formula() {
        for n in [1usize, 2, 11, 100, 10_000] {
            for (s, o) in [(0.0, 0.0), (0.5, 0.9), (2.0, 0.25), (0.1, 0.0)] {
                assert_eq!(estimate(n, s, o), n as f64 * (s + o));
            }
        }
    }

    #[test]
    fn test_default_run_estimate() {
        // 0 → 5 V in 0.5 V steps: 11 points at 0.5 s settle + 0.9 s overhead
        let secs = estimate(11, 0.5, 0.9);
        assert!((secs - 15.4).abs() < 1e-9);
        assert_eq!(format_mmss(estimate_duration(11, 0.5, 0.9)), "00:15");
    }

    #[test]
    fn test_negative_estimate_clamps_to_zero() {
        assert_eq!(estimate_duration(3, -5.0, 0.0), Duration::ZERO);
    }

    #[test]
    fn test_running_pace() {
        let est = PaceEstimator::new(10);
        let pace = est.pace(4, Duration::from_secs(8));
        assert_eq!(pace.percent_complete, 40.0);
        assert_eq!(pace.remaining, Duration::from_secs(12));
        assert_eq!(pace.elapsed, Duration::from_secs(8));
    }

    #[test]
    fn test_pace_at_completion() {
        let est = PaceEstimator::new(3);
        let pace = est.pace(3, Duration::from_millis(900));
        assert_eq!(pace.percent_complete, 100.0);
        assert_eq!(pace.remaining, Duration::ZERO);
    }

    #[test]
    fn test_pace_before_first_step() {
        let pace = PaceEstimator::new(5).pace(0, Duration::from_secs(1));
        assert_eq!(pace.percent_complete, 0.0);
        assert_eq!(pace.remaining, Duration::ZERO);
    }

    #[test]
    fn test_format_mmss() {
        assert_eq!(format_mmss(Duration::ZERO), "00:00");
        assert_eq!(format_mmss(Duration::from_secs(75)), "01:15");
        assert_eq!(format_mmss(Duration::from_secs(3725)), "62:05");
    }
}
