//! Non-blocking outbound handle over a connection.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{Connection, ConnectionId};

/// A clonable, non-blocking sender for one connection's outbound side.
///
/// The game layer holds these in its registry and pushes encoded events
/// without awaiting the socket. A dedicated writer task drains the queue
/// and performs the actual sends; when the peer goes away the task exits
/// and subsequent [`ConnectionHandle::send`] calls silently drop, which
/// matches the broadcast contract that a dead connection never blocks or
/// fails a game operation.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ConnectionHandle {
    /// Spawns a writer task over `conn` and returns the handle feeding it.
    ///
    /// The task exits when every handle clone is dropped or when a send
    /// on the underlying connection fails.
    pub fn spawn_writer<C>(conn: C) -> Self
    where
        C: Connection + Clone,
    {
        let id = conn.id();
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

        tokio::spawn(async move {
            while let Some(data) = rx.recv().await {
                if let Err(e) = conn.send(&data).await {
                    debug!(conn_id = %conn.id(), error = %e, "outbound write failed, stopping writer");
                    break;
                }
            }
            trace!(conn_id = %conn.id(), "writer task finished");
        });

        Self { id, tx }
    }

    /// Builds a handle from a raw channel sender.
    ///
    /// Used by tests and by callers that want to capture outbound traffic
    /// instead of writing to a real socket.
    pub fn from_sender(id: ConnectionId, tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { id, tx }
    }

    /// Queues `data` for delivery. Never blocks; silently drops if the
    /// writer task has exited.
    pub fn send(&self, data: Vec<u8>) {
        if self.tx.send(data).is_err() {
            trace!(conn_id = %self.id, "dropping message for closed connection");
        }
    }

    /// Whether the writer task is still draining the queue.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// The identifier of the underlying connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture_handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::from_sender(ConnectionId::new(9), tx), rx)
    }

    #[tokio::test]
    async fn test_send_queues_data_in_order() {
        let (handle, mut rx) = capture_handle();

        handle.send(b"first".to_vec());
        handle.send(b"second".to_vec());

        assert_eq!(rx.recv().await.unwrap(), b"first");
        assert_eq!(rx.recv().await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_send_after_receiver_drop_does_not_panic() {
        let (handle, rx) = capture_handle();
        drop(rx);

        assert!(!handle.is_open());
        handle.send(b"into the void".to_vec());
    }

    #[tokio::test]
    async fn test_clones_feed_the_same_queue() {
        let (handle, mut rx) = capture_handle();
        let clone = handle.clone();

        clone.send(b"via clone".to_vec());
        assert_eq!(rx.recv().await.unwrap(), b"via clone");
        assert_eq!(clone.id(), handle.id());
    }
}
