//! Anonymization providers
//!
//! A provider hands out fresh network identities. The Tor implementation
//! talks to the control port and issues `SIGNAL NEWNYM`; the direct one
//! does nothing and is used when requests are not proxied.

use crate::transport::TransportError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// How long a control-port conversation may take before giving up
const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of anonymized network identities
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Requests a brand-new identity
    ///
    /// Returns once the provider has confirmed the identity is ready.
    async fn new_identity(&self) -> Result<(), TransportError>;
}

/// Provider for un-proxied runs; identities never change
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectIdentity;

#[async_trait]
impl IdentityProvider for DirectIdentity {
    async fn new_identity(&self) -> Result<(), TransportError> {
        tracing::debug!("Direct transport, no identity to rotate");
        Ok(())
    }
}

/// Tor control-port client
#[derive(Debug, Clone)]
pub struct TorControl {
    addr: String,
    password: Option<String>,
}

impl TorControl {
    /// Creates a client for the control port at `addr`
    pub fn new(addr: impl Into<String>, password: Option<String>) -> Self {
        Self {
            addr: addr.into(),
            password,
        }
    }

    async fn signal_newnym(&self) -> Result<(), TransportError> {
        let stream = TcpStream::connect(&self.addr).await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let authenticate = match &self.password {
            Some(password) => format!("AUTHENTICATE \"{}\"\r\n", escape_quoted(password)),
            None => "AUTHENTICATE\r\n".to_string(),
        };

        command(&mut write_half, &mut reader, &authenticate).await?;
        command(&mut write_half, &mut reader, "SIGNAL NEWNYM\r\n").await?;

        // Best effort; the identity is already confirmed
        let _ = write_half.write_all(b"QUIT\r\n").await;

        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for TorControl {
    async fn new_identity(&self) -> Result<(), TransportError> {
        tracing::debug!("Requesting new Tor identity via {}", self.addr);

        match tokio::time::timeout(CONTROL_TIMEOUT, self.signal_newnym()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ProviderRejected(format!(
                "control port {} did not answer within {:?}",
                self.addr, CONTROL_TIMEOUT
            ))),
        }
    }
}

/// Sends one control command and waits for a `250` reply
async fn command<W, R>(
    writer: &mut W,
    reader: &mut BufReader<R>,
    line: &str,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;

    let reply = read_reply(reader).await?;
    if reply.starts_with("250") {
        Ok(())
    } else {
        Err(TransportError::ProviderRejected(reply))
    }
}

/// Reads a (possibly multi-line) control reply and returns its final line
///
/// Intermediate lines use `250-` or `250+`; the last one has a space in
/// the fourth column.
async fn read_reply<R>(reader: &mut BufReader<R>) -> Result<String, TransportError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Err(TransportError::ProviderRejected(
                "control connection closed".to_string(),
            ));
        }

        let line = line.trim_end().to_string();
        if line.len() < 4 || line.as_bytes()[3] == b' ' {
            return Ok(line);
        }
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
