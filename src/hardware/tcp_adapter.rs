//! SCPI over raw TCP sockets
//!
//! Most LAN-capable bench instruments (Keysight, Rigol, Siglent) expose a raw
//! SCPI socket on port 5025. Commands are newline-terminated; each reply is a
//! single line.

use super::ScpiTransport;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Conventional raw-socket SCPI port.
pub const DEFAULT_PORT: u16 = 5025;

/// Async SCPI client over one TCP connection
pub struct TcpScpiAdapter {
    stream: Option<BufReader<TcpStream>>,
    resource_name: String,
    timeout: Duration,
}

impl TcpScpiAdapter {
    /// Connect to `host:port`, bounded by `io_timeout`.
    ///
    /// The same timeout then applies to every write and query.
    pub async fn connect(host: &str, port: u16, io_timeout: Duration) -> Result<Self> {
        let stream = timeout(io_timeout, TcpStream::connect((host, port)))
            .await
            .with_context(|| format!("Connection timeout to {}:{}", host, port))?
            .with_context(|| format!("Failed to connect to {}:{}", host, port))?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        tracing::debug!("SCPI socket open to {}:{}", host, port);

        Ok(Self {
            stream: Some(BufReader::new(stream)),
            resource_name: format!("TCPIP0::{}::{}::SOCKET", host, port),
            timeout: io_timeout,
        })
    }

    fn stream(&mut self) -> Result<&mut BufReader<TcpStream>> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => bail!("SCPI socket '{}' is closed", self.resource_name),
        }
    }

    async fn send_line(&mut self, cmd: &str) -> Result<()> {
        let io_timeout = self.timeout;
        let line = format!("{}\n", cmd);
        let stream = self.stream()?;

        let send = async {
            stream.get_mut().write_all(line.as_bytes()).await?;
            stream.get_mut().flush().await
        };
        timeout(io_timeout, send)
            .await
            .with_context(|| format!("Timeout writing command: {}", cmd))?
            .with_context(|| format!("Failed to write command: {}", cmd))
    }
}

#[async_trait]
impl ScpiTransport for TcpScpiAdapter {
    async fn write(&mut self, cmd: &str) -> Result<()> {
        tracing::debug!("SCPI write: {}", cmd);
        self.send_line(cmd).await
    }

    async fn query(&mut self, cmd: &str) -> Result<String> {
        tracing::debug!("SCPI query: {}", cmd);
        self.send_line(cmd).await?;

        let io_timeout = self.timeout;
        let stream = self.stream()?;
        let mut response = String::new();
        match timeout(io_timeout, stream.read_line(&mut response)).await {
            Ok(Ok(0)) => bail!("Connection closed by instrument"),
            Ok(Ok(_)) => {
                let trimmed = response.trim().to_string();
                tracing::debug!("SCPI response: {:?}", trimmed);
                Ok(trimmed)
            }
            Ok(Err(e)) => Err(e).context("Failed to read response"),
            Err(_) => bail!("Timeout waiting for response to: {}", cmd),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream
                .get_mut()
                .shutdown()
                .await
                .context("Failed to shut down SCPI socket")?;
            tracing::debug!("SCPI socket '{}' closed", self.resource_name);
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
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Minimal fake instrument: answers `*IDN?` and `READ?`, stays silent otherwise.
    async fn spawn_fake_instrument() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let reply = match line.trim() {
                    "*IDN?" => Some("Keysight Technologies,E36313A,MY00000001,1.0.0"),
                    "READ?" => Some("+1.23456000E+00"),
                    _ => None,
                };
                if let Some(reply) = reply {
                    write_half
                        .write_all(format!("{}\n", reply).as_bytes())
                        .await
                        .unwrap();
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_query_and_write_roundtrip() {
        let addr = spawn_fake_instrument().await;
        let mut adapter = TcpScpiAdapter::connect("127.0.0.1", addr.port(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(
            adapter.resource_name(),
            format!("TCPIP0::127.0.0.1::{}::SOCKET", addr.port())
        );

        adapter.write("VOLT 1.5").await.unwrap();
        let idn = adapter.query("*IDN?").await.unwrap();
        assert!(idn.starts_with("Keysight Technologies,E36313A"));

        let reading: f64 = adapter.query("READ?").await.unwrap().parse().unwrap();
        assert!((reading - 1.23456).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_query_times_out_on_silent_instrument() {
        let addr = spawn_fake_instrument().await;
        let mut adapter =
            TcpScpiAdapter::connect("127.0.0.1", addr.port(), Duration::from_millis(100))
                .await
                .unwrap();

        let err = adapter.query("MEAS:CURR?").await.unwrap_err();
        assert!(err.to_string().contains("Timeout"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let _ = socket.read_to_end(&mut buf).await;
        });

        let mut adapter = TcpScpiAdapter::connect("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();
        adapter.close().await.unwrap();
        adapter.close().await.unwrap();
        assert!(adapter.write("OUTP OFF").await.is_err());
    }
}
