//! Per-connection session handler.
//!
//! Each accepted connection gets its own `Session` that:
//! - Greets the client with who is already connected
//! - Reads the client's display name and registers it
//! - Relays every following line to the other clients
//! - Deregisters and announces the departure when the client leaves
//!
//! Outgoing lines never touch the socket from the session task itself. They
//! are queued on the session's outbox and written by a dedicated writer task,
//! so a broadcast never waits on a slow client.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_core::{DisplayName, SessionId, SessionState};
use relay_protocol::{decode_line, encode_line, ClientLine, FrameError, ServerLine, MAX_LINE_BYTES};

use crate::registry::{Outbox, RegistryError, RegistryHandle};

/// Default write timeout per line (10 seconds)
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffered read half of a client connection.
type LineReader = BufReader<OwnedReadHalf>;

/// Server-side handler for one connected client.
pub struct Session {
    /// Identity used for registration and broadcast exclusion
    session_id: SessionId,

    /// Remote address, for logs
    peer: SocketAddr,

    /// Handle to the session registry
    registry: RegistryHandle,

    /// Cancelled on server shutdown or when the writer task fails
    shutdown: CancellationToken,

    /// How long one line may take to reach the client
    write_timeout: Duration,

    /// Protocol state
    state: SessionState,
}

impl Session {
    /// Creates a new session for an accepted connection.
    ///
    /// # Arguments
    ///
    /// * `peer` - Remote address of the connection
    /// * `session_id` - Unique number for this connection
    /// * `registry` - Handle to the session registry
    /// * `shutdown` - Token that ends the session when cancelled
    pub fn new(
        peer: SocketAddr,
        session_id: SessionId,
        registry: RegistryHandle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            peer,
            registry,
            shutdown,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            state: SessionState::Connected,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Runs the session on `stream` until the client leaves or the
    /// connection fails.
    ///
    /// Returns the state the session ended in (always `Closed`).
    pub async fn run(mut self, stream: TcpStream) -> SessionState {
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let (outbox, inbox) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_lines(
            writer,
            inbox,
            self.write_timeout,
            self.shutdown.clone(),
            self.session_id,
        ));

        match self.join(&mut reader, &outbox).await {
            Ok(name) => {
                self.relay(&mut reader, &name).await;
                self.leave(name, outbox, writer_task).await;
            }
            Err(e) => {
                debug!(
                    session_id = %self.session_id,
                    peer = %self.peer,
                    error = %e,
                    "Client left before joining"
                );
                self.close(outbox, writer_task).await;
            }
        }

        self.state
    }

    /// Greets the client, reads its name and registers it.
    async fn join(
        &mut self,
        reader: &mut LineReader,
        outbox: &Outbox,
    ) -> Result<DisplayName, SessionError> {
        self.transition(SessionState::Joining);

        let greeting = if self.registry.has_any().await {
            // Built from the snapshot, so a roster that emptied in between
            // still renders as "no users"
            ServerLine::roster(self.registry.snapshot_names().await)
        } else {
            ServerLine::NoUsers
        };
        outbox
            .send(greeting.to_string())
            .map_err(|_| SessionError::WriterClosed)?;

        let name = match self.read_line(reader).await? {
            Some(line) => DisplayName::from(line),
            None => return Err(SessionError::Eof),
        };

        self.registry
            .add_name(name.clone(), self.session_id, outbox.clone())
            .await?;
        self.transition(SessionState::Active);

        info!(
            session_id = %self.session_id,
            peer = %self.peer,
            name = %name,
            "Client joined"
        );

        self.registry
            .broadcast(ServerLine::UserJoined(name.clone()).to_string(), self.session_id)
            .await;

        Ok(name)
    }

    /// Relays the client's lines until it says bye or the connection ends.
    async fn relay(&mut self, reader: &mut LineReader, name: &DisplayName) {
        loop {
            let line = match self.read_line(reader).await {
                Ok(Some(line)) => ClientLine::parse(line),
                Ok(None) => {
                    debug!(session_id = %self.session_id, "Client sent EOF");
                    break;
                }
                Err(e) => {
                    warn!(
                        session_id = %self.session_id,
                        name = %name,
                        error = %e,
                        "Read failed, disconnecting"
                    );
                    break;
                }
            };

            debug!(
                session_id = %self.session_id,
                bytes = line.text().len(),
                "Relaying line"
            );

            self.registry
                .broadcast(ServerLine::chat(name, line.text()).to_string(), self.session_id)
                .await;

            if line.is_bye() {
                debug!(session_id = %self.session_id, "Client said bye");
                break;
            }
        }

        self.transition(SessionState::Leaving);
    }

    /// Deregisters, closes the connection and announces the departure.
    async fn leave(&mut self, name: DisplayName, outbox: Outbox, writer_task: JoinHandle<()>) {
        let removed = self
            .registry
            .remove_name(name.clone(), self.session_id)
            .await;

        self.close(outbox, writer_task).await;

        if removed {
            self.registry
                .broadcast(ServerLine::UserLeft(name).to_string(), self.session_id)
                .await;
        }
    }

    /// Lets the writer flush what is queued, then shuts the connection down.
    async fn close(&mut self, outbox: Outbox, writer_task: JoinHandle<()>) {
        // Once the registry has dropped its copy too, the writer drains and exits
        drop(outbox);

        if let Err(e) = writer_task.await {
            warn!(
                session_id = %self.session_id,
                error = %e,
                "Writer task failed"
            );
        }

        self.transition(SessionState::Closed);
        info!(
            session_id = %self.session_id,
            peer = %self.peer,
            "Connection closed"
        );
    }

    /// Reads one line from the client.
    ///
    /// Returns `Ok(None)` on a clean end of stream.
    async fn read_line(&self, reader: &mut LineReader) -> Result<Option<String>, SessionError> {
        let mut raw = Vec::new();
        // One byte over the limit so an over-long line is detectable
        let mut limited = reader.take(MAX_LINE_BYTES as u64 + 1);

        let bytes_read = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(SessionError::Shutdown),
            result = limited.read_until(b'\n', &mut raw) => {
                result.map_err(|e| SessionError::Io(e.to_string()))?
            }
        };

        if bytes_read == 0 {
            return Ok(None);
        }

        Ok(Some(decode_line(&raw)?))
    }

    fn transition(&mut self, next: SessionState) {
        match self.state.advance(next) {
            Ok(state) => {
                debug!(
                    session_id = %self.session_id,
                    from = %self.state,
                    to = %state,
                    "Session state changed"
                );
                self.state = state;
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Ignoring state change");
            }
        }
    }
}

/// Drains a session's outbox onto the socket.
///
/// Ends when every outbox sender is gone (shutting the write half down) or
/// on the first failed write (cancelling `on_failure` so the session stops
/// reading).
async fn write_lines(
    writer: OwnedWriteHalf,
    mut inbox: mpsc::UnboundedReceiver<String>,
    write_timeout: Duration,
    on_failure: CancellationToken,
    session_id: SessionId,
) {
    let mut writer = BufWriter::new(writer);

    while let Some(line) = inbox.recv().await {
        if let Err(e) = write_line(&mut writer, &line, write_timeout).await {
            warn!(
                session_id = %session_id,
                error = %e,
                "Failed to write to client"
            );
            on_failure.cancel();
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(session_id = %session_id, error = %e, "Shutdown of write half failed");
    }
}

/// Writes and flushes one line.
async fn write_line(
    writer: &mut BufWriter<OwnedWriteHalf>,
    line: &str,
    write_timeout: Duration,
) -> Result<(), SessionError> {
    let bytes = encode_line(line);

    match timeout(write_timeout, async {
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SessionError::Io(e.to_string())),
        Err(_) => Err(SessionError::WriteTimeout),
    }
}

/// Errors that end a session.
///
/// None of these reach the registry or any other session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Connection closed")]
    Eof,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Writer task stopped")]
    WriterClosed,

    #[error("Server shutting down")]
    Shutdown,

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        assert_eq!(SessionError::Eof.to_string(), "Connection closed");
        assert_eq!(
            SessionError::Registry(RegistryError::ChannelClosed).to_string(),
            "Registry error: response channel closed"
        );

        let err = SessionError::from(FrameError::LineTooLong {
            max: MAX_LINE_BYTES,
        });
        assert!(err.to_string().contains(&MAX_LINE_BYTES.to_string()));
    }

    #[tokio::test]
    async fn test_writer_shuts_down_when_outbox_closes() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();

        let (_read, write) = server_side.into_split();
        let (outbox, inbox) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(write_lines(
            write,
            inbox,
            DEFAULT_WRITE_TIMEOUT,
            token.clone(),
            SessionId::new(1),
        ));

        outbox.send("first".to_string()).unwrap();
        outbox.send("second".to_string()).unwrap();
        drop(outbox);
        task.await.unwrap();

        let mut received = String::new();
        let mut client = client;
        client.read_to_string(&mut received).await.unwrap();

        assert_eq!(received, "first\nsecond\n");
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_writer_timeout_cancels_session() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Connected but never read from
        let _client = TcpStream::connect(addr).await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();

        let (_read, write) = server_side.into_split();
        let (outbox, inbox) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(write_lines(
            write,
            inbox,
            Duration::from_millis(100),
            token.clone(),
            SessionId::new(1),
        ));

        // Far more than the socket buffers hold
        let line = "x".repeat(MAX_LINE_BYTES - 1);
        for _ in 0..256 {
            outbox.send(line.clone()).unwrap();
        }

        timeout(Duration::from_secs(5), task)
            .await
            .expect("writer did not give up")
            .unwrap();
        assert!(token.is_cancelled());
    }
}
