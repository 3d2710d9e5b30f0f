//! Digital multimeter in DC-voltage mode (Keysight EDU34450A-style SCPI).

use super::session::{CloseOutcome, InstrumentSession};
use crate::error::{AppResult, SweepError};
use std::fmt;

/// Input impedance selection for DC voltage.
///
/// `Auto` uses >10 GΩ on the 100 mV and 1 V ranges and 10 MΩ elsewhere;
/// `Fixed` keeps 10 MΩ on every range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpedanceMode {
    Auto,
    Fixed,
}

impl ImpedanceMode {
    pub fn from_high_impedance(enabled: bool) -> Self {
        if enabled {
            ImpedanceMode::Auto
        } else {
            ImpedanceMode::Fixed
        }
    }

    fn command(self) -> &'static str {
        match self {
            ImpedanceMode::Auto => "VOLT:IMP:AUTO ON",
            ImpedanceMode::Fixed => "VOLT:IMP:AUTO OFF",
        }
    }
}

impl fmt::Display for ImpedanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImpedanceMode::Auto => f.write_str("High-Z mode enabled (10G\u{3a9} for 100mV/1V ranges)"),
            ImpedanceMode::Fixed => f.write_str("High-Z mode disabled (using standard impedance)"),
        }
    }
}

pub struct Multimeter {
    session: InstrumentSession,
}

impl Multimeter {
    pub fn new(session: InstrumentSession) -> Self {
        Self { session }
    }

    pub fn session_mut(&mut self) -> &mut InstrumentSession {
        &mut self.session
    }

    pub async fn configure(&mut self, impedance: ImpedanceMode) -> AppResult<()> {
        self.session.write("CONF:VOLT:DC").await?;
        self.session.write(impedance.command()).await
    }

    /// Trigger a reading and return the raw reply.
    pub async fn read_raw(&mut self) -> AppResult<String> {
        self.session.query("READ?").await
    }

    pub async fn close(&mut self) -> CloseOutcome {
        self.session.close().await
    }
}

/// Parse a meter reply such as `+1.23456789E+00`.
///
/// # Errors
///
/// `Parse` if the reply is not a number.
pub fn parse_reading(raw: &str) -> AppResult<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| SweepError::Parse(format!("'{}' is not a number", raw.trim())))
}
