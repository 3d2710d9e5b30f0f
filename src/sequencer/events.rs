//! Events posted from the sweep worker to its caller.
//!
//! The worker owns all run state; the caller only ever sees copies of it
//! through these messages. Delivery is one-directional over an unbounded
//! channel, so posting never blocks the worker.

use crate::error::{ErrorKind, SweepError};
use chrono::{DateTime, Local};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Level;

pub type EventSender = mpsc::UnboundedSender<SequencerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SequencerEvent>;

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Connecting,
    Configuring,
    Sweeping,
    Finalizing,
    Completed,
    Aborted,
    Failed,
}

impl SequencerState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SequencerState::Completed | SequencerState::Aborted | SequencerState::Failed
        )
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every planned point was measured and recorded
    Completed,
    /// Cancellation was honored at a point boundary
    Aborted,
    /// A fault ended the run early
    Failed,
}

impl From<RunOutcome> for SequencerState {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => SequencerState::Completed,
            RunOutcome::Aborted => SequencerState::Aborted,
            RunOutcome::Failed => SequencerState::Failed,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Timestamped status line.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub level: Level,
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Emitted once per completed set-point.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Points finished so far, including this one
    pub completed: usize,
    pub total: usize,
    pub percent_complete: f64,
    /// Since the output was enabled
    pub elapsed: Duration,
    /// Running-average estimate
    pub remaining: Duration,
    pub set_voltage: f64,
    /// `NaN` if the reading could not be parsed
    pub measured_voltage: f64,
}

/// The error that ended a failed run, flattened for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFault {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SweepError> for RunFault {
    fn from(err: &SweepError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for RunFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Terminal payload of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Wall time from run start until teardown finished
    pub elapsed: Duration,
    pub records_written: usize,
    /// Set when `outcome` is `Failed`
    pub error: Option<RunFault>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome != RunOutcome::Failed
    }
}

#[derive(Debug, Clone)]
pub enum SequencerEvent {
    /// A state-machine transition (the new state)
    State(SequencerState),
    Log(LogLine),
    Progress(ProgressUpdate),
    /// Always the last event of a run
    Finished(RunReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SequencerState::from(RunOutcome::Aborted).is_terminal());
        assert!(SequencerState::Failed.is_terminal());
        assert!(!SequencerState::Finalizing.is_terminal());
        assert!(!SequencerState::Idle.is_terminal());
    }

    #[test]
    fn test_fault_display_uses_kind_name() {
        let err = SweepError::Parse("x".into());
        let fault = RunFault::from(&SweepError::Storage("disk full".into()));
        assert_eq!(fault.kind, ErrorKind::IoFault);
        assert!(fault.to_string().starts_with("IOFault: "));
        assert_eq!(RunFault::from(&err).kind, ErrorKind::ParseFault);
    }

    #[test]
    fn test_aborted_run_is_not_a_failure() {
        let report = RunReport {
            outcome: RunOutcome::Aborted,
            elapsed: Duration::from_secs(3),
            records_written: 2,
            error: None,
        };
        assert!(report.is_success());
    }
}
