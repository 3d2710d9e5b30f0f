//! Core library for the sweep_daq bench logger.
//!
//! Steps a programmable power supply through a list of voltages, reads a
//! multimeter at each set-point and streams the results to a CSV file. The
//! `sweep_daq` binary is a thin command-line caller over this crate.
//!
//! - [`sweep`]: set-point planning and time estimation (pure)
//! - [`hardware`]: SCPI transports (TCP socket, VISA, mock)
//! - [`instrument`]: instrument sessions, supply and meter command sets
//! - [`storage`]: durable result sink
//! - [`sequencer`]: the run state machine, its worker and events
//! - [`config`], [`error`], [`logging`]: ambient plumbing

pub mod config;
pub mod error;
pub mod hardware;
pub mod instrument;
pub mod logging;
pub mod sequencer;
pub mod storage;
pub mod sweep;

pub use error::{AppResult, ErrorKind, SweepError};
pub use sequencer::{
    BenchAddresses, RunOutcome, RunReport, SequencerEvent, SequencerState, SweepHandle,
    SweepSequencer,
};
pub use sweep::{SweepConfig, SweepPlan};
