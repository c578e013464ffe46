//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! through the crate's own client, so both halves of the link are covered.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use relaychat_transport::{Connection, Transport, WebSocketTransport, connect};

    async fn bound() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let url = format!("ws://{}", transport.local_addr().expect("should have addr"));
        (transport, url)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, url) = bound().await;
        let server = tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let client = connect(&url).await.expect("client should connect");
        let server_conn = server.await.expect("task should complete");
        assert_ne!(server_conn.id(), client.id());

        server_conn.send(b"hello from proxy").await.unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), b"hello from proxy");

        client.send(b"hello from lobby").await.unwrap();
        assert_eq!(server_conn.recv().await.unwrap().unwrap(), b"hello from lobby");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_peer_close() {
        let (mut transport, url) = bound().await;
        let server = tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let client = connect(&url).await.unwrap();
        let server_conn = server.await.unwrap();

        client.close().await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_send_not_blocked_by_pending_recv() {
        let (mut transport, url) = bound().await;
        let server = tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let client = std::sync::Arc::new(connect(&url).await.unwrap());
        let server_conn = server.await.unwrap();

        // Park a reader on the client before anything is sent.
        let reader = {
            let client = client.clone();
            tokio::spawn(async move { client.recv().await })
        };
        tokio::task::yield_now().await;

        tokio::time::timeout(Duration::from_secs(2), client.send(b"ping"))
            .await
            .expect("send must not wait for the reader")
            .unwrap();
        assert_eq!(server_conn.recv().await.unwrap().unwrap(), b"ping");

        server_conn.send(b"pong").await.unwrap();
        let got = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(got, b"pong");
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let (transport, url) = bound().await;
        drop(transport);

        let err = connect(&url).await.err().expect("connect should fail");
        assert!(err.to_string().contains(&url));
    }

    #[tokio::test]
    async fn test_accept_after_shutdown_returns_shutdown() {
        let (mut transport, _url) = bound().await;
        transport.shutdown().await.unwrap();
        assert!(matches!(
            transport.accept().await,
            Err(relaychat_transport::TransportError::Shutdown)
        ));
    }
}
