//! Per-connection state machine on the server side.
//!
//! A session starts `Unregistered`. Its first accepted frame becomes the
//! username; after that every frame is a chat line, except the `END`
//! sentinel which half-closes the connection. The registry entry is only
//! removed once the transport reports the close, never on `END` itself.

use std::{io, net::SocketAddr, sync::Arc};

use tokio::{
    io::AsyncRead,
    net::TcpStream,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{
    broadcast,
    connection::{ConnectionHandle, run_writer},
    error::{ConnectionFailure, RegisterError},
    frame::{FrameReader, Framing},
    registry::ConnectionRegistry,
};

/// Reply to an accepted username.
pub const INSTRUCTIONS: &str = "Write a message below: (Type 'END' to disconnect)";

/// Line a client sends to ask for a disconnect.
pub const END_SENTINEL: &str = "END";

pub fn username_taken_message(username: &str) -> String {
    format!("Username '{username}' is already in use.\nPlease choose another username:")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unregistered,
    Registered { username: String },
    Closed,
}

/// Something that happened on the connection's read side.
#[derive(Debug)]
pub enum SessionEvent {
    Frame(String),
    Closed,
    Errored(io::Error),
}

pub type FailureSink = mpsc::UnboundedSender<ConnectionFailure>;

pub struct ServerSession {
    connection: ConnectionHandle,
    registry: Arc<ConnectionRegistry>,
    state: SessionState,
}

impl ServerSession {
    pub fn new(connection: ConnectionHandle, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            connection,
            registry,
            state: SessionState::Unregistered,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Applies one event. A transport error closes the session and is handed
    /// back to the caller once the registry entry is gone.
    pub async fn handle(&mut self, event: SessionEvent) -> io::Result<()> {
        if self.state == SessionState::Closed {
            debug!(peer = %self.connection.peer(), ?event, "event after close ignored");
            return Ok(());
        }

        match event {
            SessionEvent::Frame(text) => {
                self.handle_frame(text).await;
                Ok(())
            }
            SessionEvent::Closed => {
                self.close().await;
                Ok(())
            }
            SessionEvent::Errored(err) => {
                self.close().await;
                Err(err)
            }
        }
    }

    /// Pulls frames until the connection closes or fails.
    pub async fn run<R>(&mut self, mut frames: FrameReader<R>) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        while self.state != SessionState::Closed {
            let event = match frames.next_frame().await {
                Ok(Some(text)) => SessionEvent::Frame(text),
                Ok(None) => SessionEvent::Closed,
                Err(err) => SessionEvent::Errored(err),
            };
            self.handle(event).await?;
        }
        Ok(())
    }

    async fn handle_frame(&mut self, text: String) {
        if self.state == SessionState::Unregistered {
            return self.try_register(text).await;
        }
        let SessionState::Registered { username } = &self.state else {
            return;
        };

        let peer = self.connection.peer();
        if text == END_SENTINEL {
            debug!(%peer, "client asked to disconnect");
            self.connection.shutdown();
        } else {
            info!("{peer} -> [{username}]: {text}");
            broadcast::deliver(&self.registry, &text, self.connection.id()).await;
        }
    }

    async fn try_register(&mut self, username: String) {
        let peer = self.connection.peer();
        match self.registry.register(self.connection.clone(), &username).await {
            Ok(()) => {
                info!("username '{username}' set for connection {peer}");
                self.connection.send(INSTRUCTIONS);
                self.state = SessionState::Registered { username };
            }
            Err(RegisterError::UsernameTaken(taken)) => {
                debug!(%peer, username = %taken, "username rejected");
                self.connection.send(username_taken_message(&taken));
            }
            Err(err @ RegisterError::AlreadyRegistered(_)) => {
                warn!(%peer, error = %err, "session and registry disagree");
            }
        }
    }

    async fn close(&mut self) {
        let peer = self.connection.peer();
        match self.registry.unregister(self.connection.id()).await {
            Some(username) => info!("connection with '{username}' ({peer}) ended"),
            None => info!("connection with unregistered client ({peer}) ended"),
        }
        self.state = SessionState::Closed;
    }
}

/// Spawns the reader and writer tasks for a freshly accepted connection.
///
/// Transport errors from either task are forwarded to `failures`; what
/// happens next is the server's decision.
pub fn spawn(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    framing: Framing,
    failures: FailureSink,
) {
    let (reader, writer) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let connection = ConnectionHandle::new(registry.next_id(), peer, outbound_tx);

    let writer_failures = failures.clone();
    tokio::spawn(async move {
        if let Err(err) = run_writer(writer, outbound_rx, framing).await {
            report(&writer_failures, ConnectionFailure::new(peer, err));
        }
    });

    tokio::spawn(async move {
        let mut session = ServerSession::new(connection, registry);
        if let Err(err) = session.run(FrameReader::new(reader, framing)).await {
            report(&failures, ConnectionFailure::new(peer, err));
        }
    });
}

fn report(failures: &FailureSink, failure: ConnectionFailure) {
    if let Err(unsent) = failures.send(failure) {
        warn!(error = %unsent.0, "connection failed after the server stopped listening");
    }
}
