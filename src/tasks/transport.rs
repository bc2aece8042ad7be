// Push transport seam for task progress
//
// The synchronizer only sees ProgressTransport/ProgressConnection, so tests
// drive the state machine with a scripted fake instead of real sockets. The
// production implementation connects to ws(s)://<host>/ws/progress/{task_id}
// and yields one JSON TaskSnapshot per text frame.

use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One observable event on an open push connection.
#[derive(Debug)]
pub enum TransportEvent {
    /// Raw text frame; the synchronizer parses it into a TaskSnapshot.
    Message(String),
    /// Transport-level fault. The connection state is not changed by this
    /// event; the subsequent Closed drives the state machine.
    Error(TransportError),
    /// The channel ended, either server-side or after a fault.
    Closed,
}

#[async_trait]
pub trait ProgressTransport: Send + Sync {
    async fn connect(&self, task_id: &str)
        -> Result<Box<dyn ProgressConnection>, TransportError>;
}

#[async_trait]
pub trait ProgressConnection: Send {
    /// Wait for the next event. After Closed is returned the connection is
    /// spent and yields only Closed.
    async fn next_event(&mut self) -> TransportEvent;

    async fn close(&mut self);
}

pub struct WebSocketTransport {
    ws_base_url: String,
}

impl WebSocketTransport {
    pub fn new(ws_base_url: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, task_id: &str) -> String {
        format!("{}/ws/progress/{}", self.ws_base_url, task_id)
    }
}

#[async_trait]
impl ProgressTransport for WebSocketTransport {
    async fn connect(
        &self,
        task_id: &str,
    ) -> Result<Box<dyn ProgressConnection>, TransportError> {
        let url = self.url_for(task_id);
        log::debug!("Connecting progress channel: {}", url);

        let (stream, _) = connect_async(&url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        log::debug!("Progress channel open for task {}", task_id);
        Ok(Box::new(WebSocketConnection { stream }))
    }
}

struct WebSocketConnection {
    stream: WsStream,
}

#[async_trait]
impl ProgressConnection for WebSocketConnection {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return TransportEvent::Message(text.to_string());
                }
                Some(Ok(Message::Close(_))) | None => return TransportEvent::Closed,
                Some(Ok(Message::Binary(_))) => {
                    log::warn!("Ignoring binary frame on progress channel");
                }
                Some(Ok(_)) => {
                    // Ping/pong handled by the library
                }
                Some(Err(e)) => {
                    return TransportEvent::Error(TransportError::WebSocket(e.to_string()));
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
