//! In-process transport: two connection ends joined by channels.

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, Notify, mpsc};

use crate::{Connection, ConnectionId, Connector, TransportError};

const CHANNEL_CAPACITY: usize = 64;

static NEXT_MEMORY_ID: AtomicU64 = AtomicU64::new(1);

/// A message, or the reason the sending end failed.
type Frame = Result<Vec<u8>, String>;

/// One end of an in-memory connection.
///
/// Messages sent on one end arrive, in order, on the other. Closing an
/// end makes its own `recv` return `Ok(None)` and, once the messages
/// already in flight are drained, the peer's `recv` as well.
/// [`fail`](Self::fail) ends the peer's `recv` with an error instead.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    tx: Mutex<Option<mpsc::Sender<Frame>>>,
    rx: Mutex<mpsc::Receiver<Frame>>,
    closed: AtomicBool,
    close_notify: Notify,
}

impl MemoryConnection {
    /// Creates two connected ends.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_b) = mpsc::channel(CHANNEL_CAPACITY);
        (Self::end(tx_b, rx_a), Self::end(tx_a, rx_b))
    }

    fn end(tx: mpsc::Sender<Frame>, rx: mpsc::Receiver<Frame>) -> Self {
        Self {
            id: ConnectionId::new(NEXT_MEMORY_ID.fetch_add(1, Ordering::Relaxed)),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }

    /// Returns `true` once [`close`](Connection::close) was called on this end.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Breaks the link from this end: once the messages already in
    /// flight are drained, the peer's `recv` fails with
    /// [`TransportError::ReceiveFailed`] carrying `reason`.
    pub async fn fail(&self, reason: &str) {
        let Some(tx) = self.tx.lock().await.take() else {
            return;
        };
        // The peer may already be gone; nothing left to break then.
        let _ = tx.send(Err(reason.to_string())).await;
    }
}

impl Connection for MemoryConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let tx = self
            .tx
            .lock()
            .await
            .clone()
            .ok_or_else(|| TransportError::ConnectionClosed("local end closed".into()))?;
        tx.send(Ok(data.to_vec()))
            .await
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        // Register for the close wakeup before checking the flag, so a
        // close racing with this call can't be missed.
        let closing = self.close_notify.notified();
        if self.is_closed() {
            return Ok(None);
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = closing => Ok(None),
            frame = rx.recv() => match frame {
                Some(Ok(data)) => Ok(Some(data)),
                Some(Err(reason)) => Err(TransportError::ReceiveFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    reason,
                ))),
                None => Ok(None),
            },
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        self.close_notify.notify_waiters();
        self.tx.lock().await.take();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// A [`Connector`] that hands out one pre-built [`MemoryConnection`].
///
/// A second `connect` fails, as a real single-use endpoint would after
/// the client already holds its connection.
#[derive(Debug)]
pub struct MemoryConnector {
    conn: StdMutex<Option<MemoryConnection>>,
}

impl MemoryConnector {
    /// Wraps the client's end of a [`MemoryConnection::pair`].
    pub fn new(conn: MemoryConnection) -> Self {
        Self {
            conn: StdMutex::new(Some(conn)),
        }
    }

    /// A connector whose `connect` always fails; for exercising the
    /// connect-failure path.
    pub fn refusing() -> Self {
        Self {
            conn: StdMutex::new(None),
        }
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<Self::Connection, TransportError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        conn.ok_or_else(|| {
            TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory endpoint already taken",
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_in_order() {
        let (a, b) = MemoryConnection::pair();
        a.send(b"one").await.unwrap();
        a.send(b"two").await.unwrap();
        assert_eq!(b.recv().await.unwrap().unwrap(), b"one");
        assert_eq!(b.recv().await.unwrap().unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_pair_is_duplex() {
        let (a, b) = MemoryConnection::pair();
        b.send(b"pong").await.unwrap();
        assert_eq!(a.recv().await.unwrap().unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_close_wakes_local_recv() {
        let (a, _b) = MemoryConnection::pair();
        let a = std::sync::Arc::new(a);
        let reader = {
            let a = std::sync::Arc::clone(&a);
            tokio::spawn(async move { a.recv().await })
        };
        tokio::task::yield_now().await;
        a.close().await.unwrap();
        assert!(reader.await.unwrap().unwrap().is_none());
        assert!(a.is_closed());
    }

    #[tokio::test]
    async fn test_close_ends_peer_recv() {
        let (a, b) = MemoryConnection::pair();
        a.send(b"last").await.unwrap();
        a.close().await.unwrap();
        assert_eq!(b.recv().await.unwrap().unwrap(), b"last");
        assert!(b.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_errors_peer_recv() {
        let (a, b) = MemoryConnection::pair();
        a.send(b"before").await.unwrap();
        a.fail("link reset").await;

        assert_eq!(b.recv().await.unwrap().unwrap(), b"before");
        match b.recv().await {
            Err(TransportError::ReceiveFailed(e)) => assert!(e.to_string().contains("link reset")),
            other => panic!("expected ReceiveFailed, got {other:?}"),
        }
        assert!(matches!(
            a.send(b"after").await,
            Err(TransportError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (a, _b) = MemoryConnection::pair();
        a.close().await.unwrap();
        assert!(matches!(
            a.send(b"x").await,
            Err(TransportError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_connector_hands_out_connection_once() {
        let (a, _b) = MemoryConnection::pair();
        let connector = MemoryConnector::new(a);
        assert!(connector.connect().await.is_ok());
        assert!(matches!(
            connector.connect().await,
            Err(TransportError::ConnectFailed(_))
        ));
    }
}
