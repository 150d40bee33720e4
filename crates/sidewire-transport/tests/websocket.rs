//! Integration tests for the WebSocket client transport.
//!
//! Each test binds a real tokio-tungstenite server on a loopback port
//! and points a [`WebSocketConnector`] at it, so bytes actually cross a
//! socket.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use sidewire_transport::{Connection, Connector, TransportError, WebSocketConnector};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener on a random port and returns it with its URL.
    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        (listener, format!("ws://{addr}/omega_side"))
    }

    async fn accept(listener: &TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake should succeed")
    }

    #[tokio::test]
    async fn test_websocket_send_and_receive() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(async move { accept(&listener).await });

        let conn = WebSocketConnector::new(url)
            .connect()
            .await
            .expect("client should connect");
        let mut server_ws = server.await.expect("task should complete");

        assert!(conn.id().into_inner() > 0);

        // --- Client sends JSON, server sees a text frame ---
        conn.send(br#"{"client":1}"#).await.expect("send should succeed");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "JSON should travel as a text frame");
        assert_eq!(msg.into_data().as_ref(), br#"{"client":1}"#);

        // --- Server sends text, client receives bytes ---
        server_ws
            .send(Message::Text(r#"{"client":0}"#.into()))
            .await
            .unwrap();
        let received = conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, br#"{"client":0}"#);

        // --- Binary frames are passed through too ---
        server_ws
            .send(Message::Binary(vec![1u8, 2, 3].into()))
            .await
            .unwrap();
        assert_eq!(conn.recv().await.unwrap().unwrap(), vec![1u8, 2, 3]);
    }

    #[tokio::test]
    async fn test_send_does_not_wait_for_pending_recv() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(async move { accept(&listener).await });

        let conn = std::sync::Arc::new(WebSocketConnector::new(url).connect().await.unwrap());
        let mut server_ws = server.await.unwrap();

        // A reader parked in recv must not block a concurrent send.
        let reader = {
            let conn = std::sync::Arc::clone(&conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        tokio::time::timeout(Duration::from_secs(2), conn.send(b"hello"))
            .await
            .expect("send should not be blocked by recv")
            .unwrap();
        let msg = server_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"hello");

        server_ws.send(Message::Text("bye".into())).await.unwrap();
        assert_eq!(reader.await.unwrap().unwrap().unwrap(), b"bye");
    }

    #[tokio::test]
    async fn test_recv_returns_none_on_server_close() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(async move { accept(&listener).await });

        let conn = WebSocketConnector::new(url).connect().await.unwrap();
        let mut server_ws = server.await.unwrap();

        server_ws.send(Message::Close(None)).await.unwrap();

        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on server close");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop, so the port is very likely closed.
        let (listener, url) = bind().await;
        drop(listener);

        let result = WebSocketConnector::new(url).connect().await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
