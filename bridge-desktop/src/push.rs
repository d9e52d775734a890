//! WebSocket push channel.
//!
//! One socket per subscription. A background task pumps text frames into the
//! subscription's inbound queue and writes outbound JSON messages to the
//! socket. Non-JSON text frames are logged and skipped.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    push::{PushChannel, PushFrame, PushSubscription},
};
use core_async::sync::mpsc;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

const DEFAULT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct WebSocketPushChannel {
    base_url: String,
    auth_token: Option<String>,
    buffer: usize,
}

impl WebSocketPushChannel {
    /// `base_url` is the WebSocket root, e.g. `wss://host/ws/`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Token sent as the `token` query parameter on connect.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    fn topic_url(&self, topic: &str) -> String {
        let mut url = format!(
            "{}/{}/",
            self.base_url.trim_end_matches('/'),
            topic.trim_matches('/')
        );
        if let Some(token) = &self.auth_token {
            url.push_str("?token=");
            url.push_str(token);
        }
        url
    }
}

#[async_trait]
impl PushChannel for WebSocketPushChannel {
    async fn subscribe(&self, topic: &str) -> Result<PushSubscription> {
        let url = self.topic_url(topic);
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| BridgeError::Network(format!("websocket connect failed: {e}")))?;

        debug!(topic, "Push subscription opened");

        let (mut sink, mut stream) = socket.split();
        let (inbound_tx, inbound_rx) = mpsc::channel::<Result<PushFrame>>(self.buffer);
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<PushFrame>();
        let topic_name = topic.to_string();

        core_async::task::spawn(async move {
            let mut outbound_open = true;
            loop {
                tokio::select! {
                    message = stream.next() => match message {
                        Some(Ok(Message::Text(text))) => match serde_json::from_str::<PushFrame>(&text) {
                            Ok(frame) => {
                                if inbound_tx.send(Ok(frame)).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => warn!(topic = %topic_name, error = %err, "Skipping malformed push frame"),
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(topic = %topic_name, "Push subscription closed by server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(topic = %topic_name, error = %err, "Push connection failed");
                            let _ = inbound_tx.send(Err(BridgeError::Network(err.to_string()))).await;
                            break;
                        }
                    },
                    outbound = outbound_rx.recv(), if outbound_open => match outbound {
                        Some(frame) => {
                            if let Err(err) = sink.send(Message::Text(frame.to_string())).await {
                                let _ = inbound_tx.send(Err(BridgeError::Network(err.to_string()))).await;
                                break;
                            }
                        }
                        None => outbound_open = false,
                    },
                    _ = inbound_tx.closed() => break,
                }
            }
            let _ = sink.close().await;
        });

        Ok(PushSubscription::from_receiver(topic, inbound_rx).with_outbound(outbound_tx))
    }
}
