use std::{io, net::SocketAddr};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::debug;

use crate::frame::{Framing, write_frame};

pub type ConnectionId = u64;

/// Work queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Half-close the write side. Anything queued afterwards is discarded.
    Shutdown,
}

/// Cheap, cloneable handle to a live connection's outbound side.
///
/// Sends never wait on the socket: text is queued for the connection's own
/// writer task, so a slow peer only ever stalls itself.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, peer: SocketAddr, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { id, peer, outbound }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queues `text` for delivery. Returns `false` if the writer is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.outbound.send(Outbound::Text(text.into())).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.outbound.send(Outbound::Shutdown).is_ok()
    }
}

/// Drains `queue` onto `writer` until every handle is dropped or a shutdown
/// is requested.
pub async fn run_writer<W>(
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    framing: Framing,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = queue.recv().await {
        match item {
            Outbound::Text(text) => write_frame(&mut writer, &text, framing).await?,
            Outbound::Shutdown => {
                writer.shutdown().await?;
                queue.close();
                let discarded = std::iter::from_fn(|| queue.try_recv().ok()).count();
                if discarded > 0 {
                    debug!(discarded, "dropped output queued after shutdown");
                }
                return Ok(());
            }
        }
    }
    Ok(())
}
