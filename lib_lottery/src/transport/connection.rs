//! # Connection
//!
//! Owns exactly one `TcpStream` for one logical exchange with the aggregator:
//! a batch (with or without an acknowledgment), a finish notification, or a
//! winners query. The session never reuses a connection across exchanges.
//!
//! Every operation races against the shutdown `CancellationToken`, so a
//! termination request unblocks a pending connect, write or read and surfaces
//! as `TransportError::Cancelled`. After any failure the connection is
//! poisoned: further sends and reads return `TransportError::Closed` and the
//! caller is expected to `close()` it.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::loggers::loggerlocal::{LoggerLocal, DEBUG, ERROR, FATAL, INFO};
use crate::loggers::logrecord::Logrecord;

/// Upper bound for a single response line. Protects against a peer that
/// never sends a newline.
pub const MAX_RESPONSE_SIZE: usize = 64 * 1024;

const READ_CHUNK_SIZE: usize = 1024;

/// Timeouts applied to every connection of a session.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Maximum time to establish the TCP connection.
    pub connect_timeout: Duration,
    /// Maximum time to wait for a response line. `None` waits indefinitely.
    pub response_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            response_timeout: None,
        }
    }
}

/// # Connection
///
/// A single-exchange TCP connection.
pub struct Connection {
    address: String,
    agency: String,
    stream: Option<TcpStream>,
    poisoned: bool,
    response_timeout: Option<Duration>,
    cancel: CancellationToken,
    logger: Arc<LoggerLocal>,
}

impl Connection {
    /// Establishes a TCP connection to `address`.
    ///
    /// Refusal, DNS failure and `connect_timeout` all surface as
    /// `TransportError::Connect` carrying the target address.
    pub async fn open(
        address: &str,
        agency: &str,
        options: &ConnectionOptions,
        cancel: CancellationToken,
        logger: Arc<LoggerLocal>,
    ) -> Result<Self, TransportError> {
        let attempt = tokio::time::timeout(options.connect_timeout, TcpStream::connect(address));

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled(address.to_string())),
            outcome = attempt => outcome,
        };

        let stream = match outcome {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(Self::connect_failed(address, agency, source, &logger).await);
            }
            Err(_) => {
                let source = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no connection after {:?}", options.connect_timeout),
                );
                return Err(Self::connect_failed(address, agency, source, &logger).await);
            }
        };

        logger
            .event(
                INFO,
                Logrecord::action("connect", "success")
                    .field("client_id", agency)
                    .field("address", address),
            )
            .await;

        Ok(Self {
            address: address.to_string(),
            agency: agency.to_string(),
            stream: Some(stream),
            poisoned: false,
            response_timeout: options.response_timeout,
            cancel,
            logger,
        })
    }

    async fn connect_failed(
        address: &str,
        agency: &str,
        source: io::Error,
        logger: &LoggerLocal,
    ) -> TransportError {
        logger
            .event(
                FATAL,
                Logrecord::action("connect", "fail")
                    .field("client_id", agency)
                    .field("address", address)
                    .field("error", &source),
            )
            .await;
        TransportError::Connect {
            address: address.to_string(),
            source,
        }
    }

    /// True until `close()` has run.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Writes the whole buffer, looping over partial writes.
    ///
    /// Any socket error poisons the connection; it must be closed and not
    /// retried.
    pub async fn send_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.poisoned {
            return Err(TransportError::Closed(self.address.clone()));
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::Closed(self.address.clone()))?;

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            outcome = write_fully(stream, bytes) => Some(outcome),
        };

        match outcome {
            None => {
                self.poisoned = true;
                Err(TransportError::Cancelled(self.address.clone()))
            }
            Some(Ok(())) => {
                self.logger
                    .event(
                        DEBUG,
                        Logrecord::action("send_message", "success")
                            .field("client_id", &self.agency)
                            .field("bytes", bytes.len()),
                    )
                    .await;
                Ok(())
            }
            Some(Err((written, source))) => {
                self.poisoned = true;
                self.logger
                    .event(
                        ERROR,
                        Logrecord::action("send_message", "fail")
                            .field("client_id", &self.agency)
                            .field("error", &source),
                    )
                    .await;
                Err(TransportError::Send {
                    address: self.address.clone(),
                    written,
                    total: bytes.len(),
                    source,
                })
            }
        }
    }

    /// Reads one response line and returns it trimmed.
    ///
    /// Fails on I/O error, on a response timeout, or when the peer closes the
    /// stream before sending a single byte.
    pub async fn receive_line(&mut self) -> Result<String, TransportError> {
        if self.poisoned {
            return Err(TransportError::Closed(self.address.clone()));
        }
        let response_timeout = self.response_timeout;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::Closed(self.address.clone()))?;

        let read = async move {
            match response_timeout {
                Some(limit) => match tokio::time::timeout(limit, read_line(stream)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no response after {:?}", limit),
                    )),
                },
                None => read_line(stream).await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            outcome = read => Some(outcome),
        };

        match outcome {
            None => {
                self.poisoned = true;
                Err(TransportError::Cancelled(self.address.clone()))
            }
            Some(Ok(line)) => {
                self.logger
                    .event(
                        DEBUG,
                        Logrecord::action("receive_message", "success")
                            .field("client_id", &self.agency)
                            .field("msg", &line),
                    )
                    .await;
                Ok(line)
            }
            Some(Err(source)) => {
                self.poisoned = true;
                self.logger
                    .event(
                        ERROR,
                        Logrecord::action("receive_message", "fail")
                            .field("client_id", &self.agency)
                            .field("error", &source),
                    )
                    .await;
                Err(TransportError::Receive {
                    address: self.address.clone(),
                    source,
                })
            }
        }
    }

    /// Releases the socket. Idempotent: only the first call touches the
    /// socket and logs; a failed shutdown is recorded, never raised.
    pub async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        match stream.shutdown().await {
            Ok(()) => {
                self.logger
                    .event(
                        INFO,
                        Logrecord::action("close_connection", "success").field("client_id", &self.agency),
                    )
                    .await;
            }
            Err(e) => {
                self.logger
                    .event(
                        ERROR,
                        Logrecord::action("close_connection", "fail")
                            .field("client_id", &self.agency)
                            .field("error", &e),
                    )
                    .await;
            }
        }
    }
}

/// Writes `bytes` completely, looping over short writes. On failure returns
/// how many bytes made it out together with the error.
pub(crate) async fn write_fully<W>(writer: &mut W, bytes: &[u8]) -> Result<(), (usize, io::Error)>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < bytes.len() {
        match writer.write(&bytes[written..]).await {
            Ok(0) => {
                return Err((
                    written,
                    io::Error::new(io::ErrorKind::WriteZero, "socket accepted zero bytes"),
                ));
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err((written, e)),
        }
    }
    writer.flush().await.map_err(|e| (written, e))
}

/// Reads until the first `\n` (or end-of-stream after at least one byte) and
/// returns the first line, trimmed. Bytes that are not UTF-8 are replaced, so
/// a garbled reply still reaches the decoder as text.
pub(crate) async fn read_line<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if buffer.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before any response byte",
                ));
            }
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if chunk[..n].contains(&b'\n') {
            break;
        }
        if buffer.len() > MAX_RESPONSE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("response exceeds {} bytes without a newline", MAX_RESPONSE_SIZE),
            ));
        }
    }

    let end = buffer.iter().position(|b| *b == b'\n').unwrap_or(buffer.len());
    Ok(String::from_utf8_lossy(&buffer[..end]).trim().to_string())
}
