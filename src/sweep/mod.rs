//! Sweep parameters, set-point planning and time estimation.
//!
//! Everything here is pure; no instrument I/O happens in this module.

pub mod estimate;
pub mod plan;

pub use estimate::{estimate, estimate_duration, format_mmss, Pace, PaceEstimator};
pub use plan::{plan, step_count, SweepDirection, SweepPlan};

use crate::error::{AppResult, SweepError};
use crate::instrument::Channel;
use std::time::Duration;

/// Immutable per-run sweep parameters.
///
/// Numeric fields are expected to be validated by the caller; the sequencer
/// itself only insists on `step_voltage > 0` (see [`SweepConfig::plan`]).
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub start_voltage: f64,
    pub stop_voltage: f64,
    pub step_voltage: f64,
    /// Delay between commanding a set-point and reading the meter, in seconds
    pub settle_time_secs: f64,
    /// Supply current limit in amps
    pub current_limit: f64,
    pub channel: Channel,
    /// Auto high-impedance input on the meter (vs. fixed 10 MΩ)
    pub high_impedance: bool,
}

impl SweepConfig {
    /// Builds the set-point plan; rejects a non-positive step.
    pub fn plan(&self) -> AppResult<SweepPlan> {
        SweepPlan::new(self.start_voltage, self.stop_voltage, self.step_voltage)
    }

    /// Settle delay as a `Duration`, clamped at zero.
    pub fn settle_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.settle_time_secs).unwrap_or(Duration::ZERO)
    }

    /// Checks the ranges a caller is expected to enforce before starting a run.
    ///
    /// The CLI calls this; the sequencer does not, matching the contract that
    /// parameters arrive pre-validated.
    pub fn validate(&self) -> AppResult<()> {
        self.plan()?;
        if !self.settle_time_secs.is_finite() || self.settle_time_secs < 0.0 {
            return Err(SweepError::InvalidParameter(format!(
                "settle time must be >= 0 (got {})",
                self.settle_time_secs
            )));
        }
        if !self.current_limit.is_finite() || self.current_limit <= 0.0 {
            return Err(SweepError::InvalidParameter(format!(
                "current limit must be > 0 (got {})",
                self.current_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SweepConfig {
        SweepConfig {
            start_voltage: 0.0,
            stop_voltage: 5.0,
            step_voltage: 0.5,
            settle_time_secs: 0.5,
            current_limit: 1.0,
            channel: Channel::One,
            high_impedance: true,
        }
    }

    #[test]
    fn test_valid_config() {
        let cfg = config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.plan().unwrap().len(), 11);
        assert_eq!(cfg.settle_time(), Duration::from_millis(500));
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut cfg = config();
        cfg.current_limit = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.settle_time_secs = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.step_voltage = 0.0;
        assert!(cfg.validate().is_err());
    }
}
