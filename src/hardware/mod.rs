//! Hardware Communication Adapters
//!
//! Low-level SCPI transports: raw TCP sockets, VISA resources and an in-memory
//! mock. Each transport is owned by exactly one instrument session, so the
//! trait takes `&mut self` and no locking is involved.

pub mod mock_adapter;
pub mod tcp_adapter;
pub mod visa_adapter;

pub use mock_adapter::{MockAdapter, MockBench};
pub use tcp_adapter::TcpScpiAdapter;
pub use visa_adapter::VisaAdapter;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Line-oriented SCPI transport.
///
/// Implementations append their own terminator to outgoing commands and strip
/// it from replies. Every call is bounded by the transport timeout; a timeout
/// is reported as an error like any other fault.
#[async_trait]
pub trait ScpiTransport: Send {
    /// Send a command; no reply is read.
    async fn write(&mut self, cmd: &str) -> Result<()>;

    /// Send a query and return the trimmed reply.
    async fn query(&mut self, cmd: &str) -> Result<String>;

    /// Release the underlying handle. Calling it twice is harmless.
    async fn close(&mut self) -> Result<()>;

    /// Resource string this transport was opened with.
    fn resource_name(&self) -> &str;
}

/// Opens transports by resource string.
///
/// The sequencer receives one of these instead of constructing transports
/// itself, so tests can hand it a [`MockBench`].
#[async_trait]
pub trait TransportOpener: Send + Sync {
    async fn open(&self, resource: &str, timeout: Duration) -> Result<Box<dyn ScpiTransport>>;
}

/// Parsed form of an instrument address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Raw SCPI socket, e.g. `TCPIP0::192.168.1.20::5025::SOCKET` or `192.168.1.20:5025`
    TcpSocket { host: String, port: u16 },
    /// Anything else that looks like a VISA resource (USB0::…, GPIB0::…, TCPIP0::…::INSTR)
    Visa(String),
}

impl FromStr for Resource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("Empty instrument address");
        }

        if s.contains("::") {
            let parts: Vec<&str> = s.split("::").collect();
            let is_socket = parts.len() == 4
                && parts[0].to_ascii_uppercase().starts_with("TCPIP")
                && parts[3].eq_ignore_ascii_case("SOCKET");
            if is_socket {
                let port = parts[2]
                    .parse::<u16>()
                    .map_err(|_| anyhow!("Invalid port '{}' in resource '{}'", parts[2], s))?;
                return Ok(Resource::TcpSocket {
                    host: parts[1].to_string(),
                    port,
                });
            }
            return Ok(Resource::Visa(s.to_string()));
        }

        if let Some((host, port)) = s.rsplit_once(':') {
            if let Ok(port) = port.parse::<u16>() {
                if !host.is_empty() {
                    return Ok(Resource::TcpSocket {
                        host: host.to_string(),
                        port,
                    });
                }
            }
        }

        bail!("Unrecognized instrument address '{}'", s)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::TcpSocket { host, port } => write!(f, "TCPIP0::{}::{}::SOCKET", host, port),
            Resource::Visa(s) => f.write_str(s),
        }
    }
}

/// Default opener: raw sockets over TCP, everything else through VISA.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceOpener;

#[async_trait]
impl TransportOpener for ResourceOpener {
    async fn open(&self, resource: &str, timeout: Duration) -> Result<Box<dyn ScpiTransport>> {
        match resource.parse::<Resource>()? {
            Resource::TcpSocket { host, port } => {
                let adapter = TcpScpiAdapter::connect(&host, port, timeout).await?;
                Ok(Box::new(adapter))
            }
            Resource::Visa(name) => {
                let adapter = VisaAdapter::open(name, timeout).await?;
                Ok(Box::new(adapter))
            }
        }
    }
}
