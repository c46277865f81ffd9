//! Generic WebSocket liquidation subscription.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::error::Error as WsError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::ConnectorError;
use crate::market::connector::LiquidationSubscription;
use crate::market::market_data::LiquidationBatch;
use crate::market::message_parser::MessageParser;
use crate::market::streams::LiquidationStream;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Design: WebSocketSubscription<P: MessageParser> is generic over the parser.
// Connection, lifetime tracking and error classification are shared; each
// venue only implements MessageParser.
// No reader task and no channel: frames are read when the owner asks for the
// next batch, so the socket itself is the only buffer.

/// A single WebSocket connection carrying one liquidation subscription.
pub struct WebSocketSubscription<P: MessageParser> {
    parser: Arc<P>,
    stream: LiquidationStream,
    write: Option<SplitSink<WsStream, Message>>,
    read: Option<SplitStream<WsStream>>,
    connected_at: Instant, // for the 24h reconnection limit
}

impl<P: MessageParser> WebSocketSubscription<P> {
    /// Connects (falling back to the secondary endpoint) and subscribes.
    pub async fn connect(parser: Arc<P>, stream: LiquidationStream) -> Result<Self, ConnectorError> {
        let ws = match open(parser.endpoint(), parser.name()).await {
            Ok(ws) => ws,
            Err(err) => match parser.fallback_endpoint() {
                Some(fallback) if err.is_recoverable() => {
                    tracing::warn!(venue = parser.name(), error = %err, fallback, "primary endpoint failed, trying fallback");
                    open(fallback, parser.name()).await?
                }
                _ => return Err(err),
            },
        };
        let (mut write, read) = ws.split();

        let msg = parser.format_subscribe(&stream);
        write
            .send(Message::Text(msg.into()))
            .await
            .map_err(|e| classify(parser.name(), e))?;
        tracing::info!(venue = parser.name(), ?stream, "subscribed to liquidations");

        Ok(Self {
            parser,
            stream,
            write: Some(write),
            read: Some(read),
            connected_at: Instant::now(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.parser.name()
    }

    pub fn stream(&self) -> &LiquidationStream {
        &self.stream
    }

    /// Checks if connection needs refresh (approaching 24h limit).
    pub fn needs_reconnect(&self) -> bool {
        let max_duration = Duration::from_secs(self.parser.max_connection_duration_secs());
        self.connected_at.elapsed() > max_duration
    }
}

#[async_trait]
impl<P: MessageParser> LiquidationSubscription for WebSocketSubscription<P> {
    async fn next_batch(&mut self) -> Result<LiquidationBatch, ConnectorError> {
        if self.needs_reconnect() {
            return Err(ConnectorError::transport("connection lifetime exceeded"));
        }
        let name = self.parser.name();
        let read = self
            .read
            .as_mut()
            .ok_or_else(|| ConnectorError::transport("subscription closed"))?;

        loop {
            let Some(frame) = read.next().await else {
                return Err(ConnectorError::transport("stream ended"));
            };
            match frame {
                Ok(Message::Text(text)) => {
                    // Control messages (subscription acks, etc.) are skipped
                    if let Some(batch) = self.parser.parse_message(&text)? {
                        return Ok(batch);
                    }
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pong handled automatically by tungstenite
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(venue = name, ?frame, "server closed liquidation feed");
                    return Err(ConnectorError::transport("connection closed by server"));
                }
                Ok(_) => {
                    // Binary frames are not used for liquidation data
                }
                Err(e) => return Err(classify(name, e)),
            }
        }
    }

    async fn close(&mut self) {
        let name = self.parser.name();
        if let Some(mut write) = self.write.take() {
            let msg = self.parser.format_unsubscribe(&self.stream);
            // Best effort: the peer may already be gone
            if let Err(e) = write.send(Message::Text(msg.into())).await {
                tracing::debug!(venue = name, error = %e, "unsubscribe not delivered");
            }
            if let Err(e) = write.close().await {
                tracing::debug!(venue = name, error = %e, "close handshake failed");
            }
        }
        self.read = None;
        tracing::info!(venue = name, "liquidation subscription released");
    }
}

async fn open(endpoint: &str, name: &'static str) -> Result<WsStream, ConnectorError> {
    tracing::info!(venue = name, endpoint, "connecting");
    let (ws, _response) = connect_async(endpoint).await.map_err(|e| classify(name, e))?;
    Ok(ws)
}

/// Handshake rejections are permanent; everything else on the wire can be retried.
fn classify(venue: &str, err: WsError) -> ConnectorError {
    match err {
        WsError::Http(response) if matches!(response.status().as_u16(), 401 | 403) => {
            ConnectorError::Subscription {
                venue: venue.to_string(),
                reason: format!("handshake rejected with HTTP {}", response.status()),
            }
        }
        WsError::Url(e) => ConnectorError::Subscription {
            venue: venue.to_string(),
            reason: format!("invalid endpoint: {e}"),
        },
        other => ConnectorError::transport(other),
    }
}
