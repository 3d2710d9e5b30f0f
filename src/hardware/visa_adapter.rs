//! VISA Hardware Adapter for USB/GPIB/LXI instruments
//!
//! Wraps `visa-rs` behind the [`ScpiTransport`] interface. VISA calls are
//! synchronous, so every operation runs on Tokio's blocking pool.
//!
//! Supports resource strings like:
//! - "USB0::0x2A8D::0x8E01::CN12345678::INSTR" (USB-TMC)
//! - "GPIB0::5::INSTR" (GPIB)
//! - "TCPIP0::192.168.1.100::inst0::INSTR" (VXI-11 / LXI)
//!
//! Without the `instrument_visa` feature the adapter still exists, but opening
//! a resource fails with a feature-not-enabled error.

use super::ScpiTransport;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "instrument_visa")]
use anyhow::{anyhow, Context};
#[cfg(feature = "instrument_visa")]
use std::sync::{Arc, Mutex};

#[cfg(not(feature = "instrument_visa"))]
use crate::error::SweepError;

#[cfg(feature = "instrument_visa")]
mod session {
    use anyhow::{anyhow, bail, Context, Result};
    use std::ffi::CString;
    use std::io::{Read, Write};
    use std::time::Duration;
    use visa_rs::prelude::*;

    /// Resource manager plus the instrument opened from it.
    ///
    /// Dropping the default resource manager closes every session it opened,
    /// so the two are kept together.
    pub(super) struct VisaSession {
        _rm: DefaultRM,
        instr: Instrument,
    }

    impl VisaSession {
        pub(super) fn open(resource: &str, timeout: Duration) -> Result<Self> {
            let rm = DefaultRM::new().context("Failed to create VISA resource manager")?;
            let c_string = CString::new(resource).context("Failed to create CString")?;
            let visa_string = visa_rs::VisaString::from(c_string);
            let instr = rm
                .open(&visa_string, AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
                .with_context(|| format!("Failed to open VISA resource: {}", resource))?;

            let timeout_ms = super::timeout_millis(timeout)?;
            let attr = visa_rs::attribute::AttrTmoValue::new_checked(timeout_ms)
                .ok_or_else(|| anyhow!("Invalid VISA timeout {}ms", timeout_ms))?;
            instr
                .set_attr(attr)
                .with_context(|| format!("Failed to set VISA timeout to {}ms", timeout_ms))?;

            Ok(Self { _rm: rm, instr })
        }

        pub(super) fn write_line(&mut self, line: &str) -> Result<()> {
            (&self.instr)
                .write_all(line.as_bytes())
                .with_context(|| format!("VISA write failed for: {}", line.trim()))
        }

        pub(super) fn read_line(&mut self) -> Result<String> {
            let mut buf = [0u8; 4096];
            let n = (&self.instr)
                .read(&mut buf)
                .context("VISA read failed")?;
            if n == 0 {
                bail!("VISA read returned no data");
            }
            Ok(String::from_utf8_lossy(&buf[..n])
                .trim_end_matches('\0')
                .trim()
                .to_string())
        }
    }
}

/// SCPI line terminator appended to every command.
#[cfg(feature = "instrument_visa")]
const LINE_TERMINATOR: &str = "\n";

/// VISA takes its timeout as a `u32` millisecond count.
#[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
fn timeout_millis(timeout: Duration) -> Result<u32> {
    u32::try_from(timeout.as_millis())
        .map_err(|_| anyhow::anyhow!("VISA timeout {:?} exceeds {}ms", timeout, u32::MAX))
}

/// VISA adapter for instrument communication
pub struct VisaAdapter {
    /// VISA resource string (e.g., "GPIB0::1::INSTR")
    resource_name: String,

    #[cfg(feature = "instrument_visa")]
    session: Option<Arc<Mutex<session::VisaSession>>>,
}

impl VisaAdapter {
    /// Open a VISA resource.
    ///
    /// The resource manager and session are created on a blocking thread.
    #[cfg(feature = "instrument_visa")]
    pub async fn open(resource_name: String, timeout: Duration) -> Result<Self> {
        let resource = resource_name.clone();
        let session = tokio::task::spawn_blocking(move || {
            session::VisaSession::open(&resource, timeout)
        })
        .await
        .context("VISA open task panicked")??;

        tracing::debug!(
            "VISA resource '{}' opened with {}ms timeout",
            resource_name,
            timeout.as_millis()
        );

        Ok(Self {
            resource_name,
            session: Some(Arc::new(Mutex::new(session))),
        })
    }

    #[cfg(not(feature = "instrument_visa"))]
    pub async fn open(resource_name: String, _timeout: Duration) -> Result<Self> {
        tracing::warn!(
            "Cannot open '{}': VISA support not compiled in",
            resource_name
        );
        Err(SweepError::FeatureNotEnabled("instrument_visa".to_string()).into())
    }

    #[cfg(feature = "instrument_visa")]
    async fn transact(&mut self, cmd: &str, expect_reply: bool) -> Result<String> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| anyhow!("VISA resource '{}' is closed", self.resource_name))?
            .clone();
        let line = format!("{}{}", cmd, LINE_TERMINATOR);

        tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| anyhow!("VISA session lock poisoned"))?;
            guard.write_line(&line)?;
            if expect_reply {
                guard.read_line()
            } else {
                Ok(String::new())
            }
        })
        .await
        .context("VISA I/O task panicked")?
    }
}

#[async_trait]
impl ScpiTransport for VisaAdapter {
    #[cfg(feature = "instrument_visa")]
    async fn write(&mut self, cmd: &str) -> Result<()> {
        self.transact(cmd, false).await?;
        tracing::debug!("VISA write sent: {}", cmd);
        Ok(())
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn write(&mut self, _cmd: &str) -> Result<()> {
        Err(SweepError::FeatureNotEnabled("instrument_visa".to_string()).into())
    }

    #[cfg(feature = "instrument_visa")]
    async fn query(&mut self, cmd: &str) -> Result<String> {
        let response = self.transact(cmd, true).await?;
        tracing::debug!("VISA query '{}' -> '{}'", cmd, response);
        Ok(response)
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn query(&mut self, _cmd: &str) -> Result<String> {
        Err(SweepError::FeatureNotEnabled("instrument_visa".to_string()).into())
    }

    async fn close(&mut self) -> Result<()> {
        #[cfg(feature = "instrument_visa")]
        {
            if self.session.take().is_some() {
                tracing::debug!("VISA resource '{}' closed", self.resource_name);
            }
        }
        Ok(())
    }

    fn resource_name(&self) -> &str {
        &self.resource_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_millis_rejects_oversized_values() {
        assert_eq!(timeout_millis(Duration::from_millis(5000)).unwrap(), 5000);
        assert_eq!(
            timeout_millis(Duration::from_millis(u64::from(u32::MAX))).unwrap(),
            u32::MAX
        );
        assert!(timeout_millis(Duration::from_millis(u64::from(u32::MAX) + 1)).is_err());
    }

    #[cfg(not(feature = "instrument_visa"))]
    #[tokio::test]
    async fn test_open_without_feature_is_reported() {
        let err = VisaAdapter::open("GPIB0::5::INSTR".to_string(), Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("instrument_visa"));
    }
}
