use tracing::debug;

use crate::{connection::ConnectionId, registry::ConnectionRegistry};

/// Formats a chat line the way every recipient sees it.
pub fn format_chat_line(username: &str, line: &str) -> String {
    format!("[{username}]: {line}")
}

/// Relays `line` from `origin` to every other registered connection.
///
/// Each recipient is an independent best-effort send: a recipient whose
/// writer has already gone away is skipped and the rest still receive the
/// line. Does nothing if `origin` is not registered.
pub async fn deliver(registry: &ConnectionRegistry, line: &str, origin: ConnectionId) {
    let Some(username) = registry.username_of(origin).await else {
        debug!(origin, "ignoring line from unregistered connection");
        return;
    };

    let message = format_chat_line(&username, line);
    let recipients = registry.all_other_connections(origin).await;

    let mut delivered = 0usize;
    for recipient in &recipients {
        if recipient.send(message.clone()) {
            delivered += 1;
        } else {
            debug!(peer = %recipient.peer(), "recipient went away mid-broadcast");
        }
    }

    debug!(%username, delivered, recipients = recipients.len(), "broadcast complete");
}
