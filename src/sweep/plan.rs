//! Set-point planning for a voltage sweep.

use crate::error::{AppResult, SweepError};
use serde::{Deserialize, Serialize};

/// Direction of travel from start to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepDirection {
    Ascending,
    Descending,
}

/// Ordered, immutable list of set-point voltages for one run.
///
/// Points are `start ± i·step` for `i` in `0..count`, with
/// `count = floor(|stop - start| / step) + 1`. The last point is never snapped
/// to `stop`; a 5.0 → 0.0 sweep with a 2.0 V step ends at 1.0 V.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPlan {
    points: Vec<f64>,
    direction: SweepDirection,
}

impl SweepPlan {
    /// Builds the plan for `start → stop` in increments of `step`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if `step` is not strictly positive, or if any input
    /// is not finite.
    pub fn new(start: f64, stop: f64, step: f64) -> AppResult<Self> {
        if !step.is_finite() || step <= 0.0 {
            return Err(SweepError::InvalidParameter(format!(
                "step voltage must be > 0 (got {})",
                step
            )));
        }
        if !start.is_finite() || !stop.is_finite() {
            return Err(SweepError::InvalidParameter(format!(
                "start/stop voltages must be finite (got {} → {})",
                start, stop
            )));
        }

        let count = step_count(start, stop, step)?;
        let (direction, points) = if start <= stop {
            (
                SweepDirection::Ascending,
                (0..count).map(|i| start + i as f64 * step).collect(),
            )
        } else {
            (
                SweepDirection::Descending,
                (0..count).map(|i| start - i as f64 * step).collect(),
            )
        };

        Ok(Self { points, direction })
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; a valid plan has at least one point.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn direction(&self) -> SweepDirection {
        self.direction
    }

    /// First set-point, used to pre-load the supply before output is enabled.
    pub fn first(&self) -> f64 {
        self.points.first().copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().copied()
    }
}

/// Upper bound on points in one plan.
pub const MAX_POINTS: usize = 1_000_000;

/// `floor(|stop - start| / step) + 1`. Caller guarantees `step > 0`.
///
/// # Errors
///
/// `InvalidParameter` if the count is not finite or exceeds [`MAX_POINTS`].
pub fn step_count(start: f64, stop: f64, step: f64) -> AppResult<usize> {
    let intervals = ((stop - start).abs() / step).floor();
    let count = if intervals.is_finite() && intervals < MAX_POINTS as f64 {
        (intervals as usize).checked_add(1)
    } else {
        None
    };
    count
        .filter(|&n| n <= MAX_POINTS)
        .ok_or_else(|| {
            SweepError::InvalidParameter(format!(
                "{} → {} in {} V steps exceeds {} points",
                start, stop, step, MAX_POINTS
            ))
        })
}

/// Convenience wrapper returning just the set-points.
pub fn plan(start: f64, stop: f64, step: f64) -> AppResult<Vec<f64>> {
    SweepPlan::new(start, stop, step).map(|p| p.points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", actual, expected);
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{:?} vs {:?}", actual, expected);
        }
    }

    #[test]
    fn test_ascending_half_volt_steps() {
        let points = plan(0.0, 1.0, 0.5).unwrap();
        assert_close(&points, &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_descending_does_not_snap_to_stop() {
        let p = SweepPlan::new(5.0, 0.0, 2.0).unwrap();
        assert_eq!(p.direction(), SweepDirection::Descending);
        assert_close(p.points(), &[5.0, 3.0, 1.0]);
    }

    #[test]
    fn test_single_point_when_start_equals_stop() {
        let p = SweepPlan::new(3.3, 3.3, 0.1).unwrap();
        assert_eq!(p.points(), &[3.3]);
        assert_eq!(p.first(), 3.3);
        assert!(!p.is_empty());
    }

    #[test]
    fn test_non_positive_step_rejected() {
        for step in [0.0, -0.5, f64::NAN] {
            let err = SweepPlan::new(0.0, 1.0, step).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        }
    }

    #[test]
    fn test_non_finite_bounds_rejected() {
        assert!(SweepPlan::new(f64::INFINITY, 1.0, 0.1).is_err());
        assert!(SweepPlan::new(0.0, f64::NAN, 0.1).is_err());
    }

    #[test]
    fn test_length_and_monotonicity_ascending() {
        let cases = [(0.0, 5.0, 0.5), (-2.0, 2.0, 0.3), (0.0, 0.05, 0.1), (1.0, 10.0, 0.7)];
        for (start, stop, step) in cases {
            let p = SweepPlan::new(start, stop, step).unwrap();
            let expected = ((stop - start) / step).floor() as usize + 1;
            assert_eq!(p.len(), expected, "start={start} stop={stop} step={step}");
            for w in p.points().windows(2) {
                assert!((w[1] - w[0] - step).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_length_and_monotonicity_descending() {
        let cases = [(5.0, 0.0, 0.5), (2.0, -2.0, 0.3), (10.0, 1.0, 0.7)];
        for (start, stop, step) in cases {
            let p = SweepPlan::new(start, stop, step).unwrap();
            let expected = ((start - stop) / step).floor() as usize + 1;
            assert_eq!(p.len(), expected, "start={start} stop={stop} step={step}");
            for w in p.points().windows(2) {
                assert!((w[0] - w[1] - step).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_tiny_step_rejected_instead_of_overflowing() {
        let err = step_count(0.0, 1e300, 1e-300).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        let err = SweepPlan::new(0.0, 1e300, 1e-300).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert!(SweepPlan::new(0.0, 10.0, 1e-9).is_err());
    }

    #[test]
    fn test_count_at_the_point_cap() {
        assert_eq!(step_count(0.0, 999_999.0, 1.0).unwrap(), MAX_POINTS);
        assert!(step_count(0.0, 1_000_000.0, 1.0).is_err());
        assert_eq!(step_count(2.0, 0.0, 0.5).unwrap(), 5);
    }

    #[test]
    fn test_step_larger_than_span() {
        assert_close(&plan(0.0, 0.4, 1.0).unwrap(), &[0.0]);
        assert_close(&plan(0.4, 0.0, 1.0).unwrap(), &[0.4]);
    }
}
