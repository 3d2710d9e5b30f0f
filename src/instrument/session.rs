//! One instrument, one transport.
//!
//! A session is created by [`InstrumentSession::connect`] and owns its
//! transport exclusively until [`InstrumentSession::close`]. Transport errors
//! are mapped into the crate taxonomy here: failures while opening become
//! `Connection`, everything afterwards becomes `Instrument`. Nothing is retried.

use crate::error::{AppResult, SweepError};
use crate::hardware::{ScpiTransport, TransportOpener};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Which bench instrument a session drives (used for log lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentRole {
    PowerSupply,
    Multimeter,
}

impl fmt::Display for InstrumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentRole::PowerSupply => f.write_str("PSU"),
            InstrumentRole::Multimeter => f.write_str("DMM"),
        }
    }
}

/// Result of a best-effort close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    AlreadyClosed,
    /// The handle was released but the transport reported an error.
    Failed(String),
}

pub struct InstrumentSession {
    role: InstrumentRole,
    resource: String,
    transport: Option<Box<dyn ScpiTransport>>,
}

impl InstrumentSession {
    /// Open `resource` through `opener`.
    ///
    /// # Errors
    ///
    /// `Connection` if the address cannot be opened.
    pub async fn connect(
        opener: &dyn TransportOpener,
        role: InstrumentRole,
        resource: &str,
        timeout: Duration,
    ) -> AppResult<Self> {
        debug!("Opening {} at '{}'", role, resource);
        let transport = opener
            .open(resource, timeout)
            .await
            .map_err(|e| SweepError::connection(resource, &e))?;

        Ok(Self::from_transport(role, transport))
    }

    /// Wrap an already-open transport.
    pub fn from_transport(role: InstrumentRole, transport: Box<dyn ScpiTransport>) -> Self {
        Self {
            role,
            resource: transport.resource_name().to_string(),
            transport: Some(transport),
        }
    }

    pub fn role(&self) -> InstrumentRole {
        self.role
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    fn transport(&mut self) -> AppResult<&mut Box<dyn ScpiTransport>> {
        let role = self.role;
        self.transport
            .as_mut()
            .ok_or_else(|| SweepError::Instrument(format!("{} session is closed", role)))
    }

    /// Standard `*IDN?` identification query.
    pub async fn identify(&mut self) -> AppResult<String> {
        self.query("*IDN?").await
    }

    pub async fn write(&mut self, cmd: &str) -> AppResult<()> {
        self.transport()?
            .write(cmd)
            .await
            .map_err(|e| SweepError::instrument(&e))
    }

    pub async fn query(&mut self, cmd: &str) -> AppResult<String> {
        self.transport()?
            .query(cmd)
            .await
            .map_err(|e| SweepError::instrument(&e))
    }

    /// Release the transport. Never fails; a second call is a no-op.
    pub async fn close(&mut self) -> CloseOutcome {
        let Some(mut transport) = self.transport.take() else {
            return CloseOutcome::AlreadyClosed;
        };

        match transport.close().await {
            Ok(()) => {
                debug!("{} '{}' closed", self.role, self.resource);
                CloseOutcome::Closed
            }
            Err(e) => {
                warn!("{} '{}' close failed: {:#}", self.role, self.resource, e);
                CloseOutcome::Failed(format!("{:#}", e))
            }
        }
    }
}

impl fmt::Debug for InstrumentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentSession")
            .field("role", &self.role)
            .field("resource", &self.resource)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::hardware::MockBench;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_connect_and_identify() {
        let bench = MockBench::new();
        let mut psu = InstrumentSession::connect(
            &bench,
            InstrumentRole::PowerSupply,
            MockBench::PSU_RESOURCE,
            TIMEOUT,
        )
        .await
        .unwrap();

        assert!(psu.is_open());
        assert_eq!(psu.resource(), MockBench::PSU_RESOURCE);
        let idn = psu.identify().await.unwrap();
        assert!(idn.starts_with("MOCK,"));
    }

    #[tokio::test]
    async fn test_unreachable_address_is_connection_error() {
        let bench = MockBench::new();
        bench.set_unreachable(MockBench::DMM_RESOURCE);
        let err = InstrumentSession::connect(
            &bench,
            InstrumentRole::Multimeter,
            MockBench::DMM_RESOURCE,
            TIMEOUT,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_transport_fault_is_instrument_error() {
        let bench = MockBench::new();
        bench.dmm.fail_on("READ?", 1);
        let mut dmm = InstrumentSession::connect(
            &bench,
            InstrumentRole::Multimeter,
            MockBench::DMM_RESOURCE,
            TIMEOUT,
        )
        .await
        .unwrap();

        let err = dmm.query("READ?").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InstrumentFault);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_swallows_errors() {
        let bench = MockBench::new();
        bench.psu.fail_close();
        let mut psu = InstrumentSession::connect(
            &bench,
            InstrumentRole::PowerSupply,
            MockBench::PSU_RESOURCE,
            TIMEOUT,
        )
        .await
        .unwrap();

        assert!(matches!(psu.close().await, CloseOutcome::Failed(_)));
        assert_eq!(psu.close().await, CloseOutcome::AlreadyClosed);
        assert!(!psu.is_open());
        assert_eq!(psu.write("OUTP OFF").await.unwrap_err().kind(), ErrorKind::InstrumentFault);
    }
}
