//! Relay links over binary WebSocket frames.
//!
//! The proxy side binds a [`WebSocketTransport`] and accepts
//! [`ServerConnection`]s; game servers dial out with [`connect`] and get a
//! [`ClientConnection`]. Both are the same [`WebSocketConnection`] over a
//! different byte stream.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Socket link ids count up; see [`ConnectionId`].
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// A connection accepted by [`WebSocketTransport`].
pub type ServerConnection = WebSocketConnection<TcpStream>;

/// A connection opened with [`connect`].
pub type ClientConnection = WebSocketConnection<MaybeTlsStream<TcpStream>>;

/// The proxy's listening socket.
pub struct WebSocketTransport {
    listener: TcpListener,
    shut_down: AtomicBool,
}

impl WebSocketTransport {
    /// Starts listening on `addr` (`host:port`).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::Bind)?;
        tracing::info!(addr, "relay listener bound");
        Ok(Self {
            listener,
            shut_down: AtomicBool::new(false),
        })
    }

    /// The address actually bound, useful after binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::Bind)
    }
}

impl Transport for WebSocketTransport {
    type Connection = ServerConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }

        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;

        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| TransportError::Handshake {
                peer: addr,
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?;

        let conn = WebSocketConnection::new(ws);
        tracing::debug!(id = %conn.id(), %addr, "accepted WebSocket connection");
        Ok(conn)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.shut_down.store(true, Ordering::Release);
        Ok(())
    }
}

/// Dials a WebSocket endpoint such as `ws://proxy.internal:25577/relay`.
pub async fn connect(url: &str) -> Result<ClientConnection, TransportError> {
    let (ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::ConnectFailed {
            url: url.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e),
        })?;

    let conn = WebSocketConnection::new(ws);
    tracing::debug!(id = %conn.id(), url, "opened WebSocket connection");
    Ok(conn)
}

/// One relay link over a WebSocket.
///
/// The socket is split so the read half and the write half are locked
/// independently.
pub struct WebSocketConnection<S> {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
}

impl<S> WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(ws: WebSocketStream<S>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: next_id(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

fn broken_pipe(e: tokio_tungstenite::tungstenite::Error) -> TransportError {
    TransportError::SendFailed(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
}

impl<S> Connection for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Error = TransportError;

    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error> {
        let message = Message::Binary(frame.to_vec().into());
        self.sink.lock().await.send(message).await.map_err(broken_pipe)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(broken_pipe)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
