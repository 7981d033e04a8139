//! Line-oriented transport underneath the APRS session.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info, warn};

/// A bidirectional line stream to an APRS-IS server
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self, host: &str, port: u16) -> io::Result<()>;

    /// Next line with its terminator stripped, `None` at end of stream
    async fn read_line(&mut self) -> io::Result<Option<String>>;

    async fn send_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Safe to call on a closed transport
    async fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Tokio TCP transport
#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<(BufReader<OwnedReadHalf>, OwnedWriteHalf)>,
    line_buffer: Vec<u8>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_connected() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "transport is not connected")
    }
}

#[async_trait]
impl Transport for TcpTransport {
    #[tracing::instrument(skip(self))]
    async fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        self.close().await;

        let server_address = format!("{}:{}", host, port);
        let all_addrs: Vec<_> = tokio::net::lookup_host(&server_address).await?.collect();
        if all_addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("DNS resolution returned no addresses for {}", server_address),
            ));
        }

        // Prefer IPv4
        let ipv4_addrs: Vec<_> = all_addrs.iter().filter(|a| a.is_ipv4()).cloned().collect();
        let mut addrs = if ipv4_addrs.is_empty() {
            warn!(
                "No IPv4 addresses found for {}, falling back to all addresses",
                server_address
            );
            all_addrs
        } else {
            debug!(
                "DNS resolved {} to {} IPv4 address(es)",
                server_address,
                ipv4_addrs.len()
            );
            ipv4_addrs
        };

        {
            use rand::seq::SliceRandom;
            let mut rng = rand::rng();
            addrs.shuffle(&mut rng);
        }

        let mut last_error = None;
        for addr in &addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    info!("Connected to APRS server at {}", addr);
                    let (reader, writer) = stream.into_split();
                    self.stream = Some((BufReader::new(reader), writer));
                    return Ok(());
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(Self::not_connected))
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        let (reader, _) = self.stream.as_mut().ok_or_else(Self::not_connected)?;

        self.line_buffer.clear();
        if reader.read_until(b'\n', &mut self.line_buffer).await? == 0 {
            return Ok(None);
        }

        while matches!(self.line_buffer.last(), Some(b'\n' | b'\r')) {
            self.line_buffer.pop();
        }

        let line = match String::from_utf8(std::mem::take(&mut self.line_buffer)) {
            Ok(line) => line,
            Err(e) => {
                debug!("Invalid UTF-8 in stream, replacing invalid bytes");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        Ok(Some(line))
    }

    async fn send_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let (_, writer) = self.stream.as_mut().ok_or_else(Self::not_connected)?;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    async fn close(&mut self) {
        if let Some((_, mut writer)) = self.stream.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Error shutting down APRS connection: {}", e);
            }
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_reads_lines_and_writes_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"# aprsc 2.1.19\r\nFLR1>APRS\n")
                .await
                .unwrap();
            let mut reader = BufReader::new(socket);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            line
        });

        let mut transport = TcpTransport::new();
        transport.connect("127.0.0.1", port).await.unwrap();
        assert!(transport.is_open());

        assert_eq!(
            transport.read_line().await.unwrap().as_deref(),
            Some("# aprsc 2.1.19")
        );
        assert_eq!(
            transport.read_line().await.unwrap().as_deref(),
            Some("FLR1>APRS")
        );
        transport.send_all(b"user N0CALL pass -1\n").await.unwrap();

        assert_eq!(server.await.unwrap(), "user N0CALL pass -1\n");
        assert_eq!(transport.read_line().await.unwrap(), None);

        transport.close().await;
        transport.close().await;
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_read_without_connection() {
        let mut transport = TcpTransport::new();
        let err = transport.read_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
