//! Server push channel.
//!
//! A [`PushChannel`] opens one persistent subscription per topic (for the
//! backend: `pending-file/{id}` or `conversion/{id}`). Frames arrive as JSON
//! values; decoding them is the subscriber's job.
//!
//! Stream semantics:
//! - `Some(Ok(frame))` - a message
//! - `Some(Err(_))` - the connection failed; no further frames follow
//! - `None` - the server closed the subscription

use async_trait::async_trait;
use core_async::sync::mpsc;
use futures::stream::{BoxStream, StreamExt};
use std::fmt;

use crate::error::{BridgeError, Result};

/// A decoded JSON message.
pub type PushFrame = serde_json::Value;

pub struct PushSubscription {
    topic: String,
    inbound: BoxStream<'static, Result<PushFrame>>,
    outbound: Option<mpsc::UnboundedSender<PushFrame>>,
}

impl PushSubscription {
    pub fn new(topic: impl Into<String>, inbound: BoxStream<'static, Result<PushFrame>>) -> Self {
        Self {
            topic: topic.into(),
            inbound,
            outbound: None,
        }
    }

    /// Build a subscription fed by an mpsc receiver.
    pub fn from_receiver(
        topic: impl Into<String>,
        mut receiver: mpsc::Receiver<Result<PushFrame>>,
    ) -> Self {
        let inbound = futures::stream::poll_fn(move |cx| receiver.poll_recv(cx)).boxed();
        Self::new(topic, inbound)
    }

    /// Attach a sender for client-to-server messages.
    pub fn with_outbound(mut self, outbound: mpsc::UnboundedSender<PushFrame>) -> Self {
        self.outbound = Some(outbound);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn next(&mut self) -> Option<Result<PushFrame>> {
        self.inbound.next().await
    }

    /// Send a message upstream. Receive-only subscriptions report `NotAvailable`.
    pub fn send(&self, frame: PushFrame) -> Result<()> {
        let outbound = self.outbound.as_ref().ok_or_else(|| {
            BridgeError::NotAvailable(format!("push topic '{}' is receive-only", self.topic))
        })?;
        outbound
            .send(frame)
            .map_err(|_| BridgeError::Network(format!("push topic '{}' is closed", self.topic)))
    }
}

impl fmt::Debug for PushSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushSubscription")
            .field("topic", &self.topic)
            .field("bidirectional", &self.outbound.is_some())
            .finish()
    }
}

#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Open a subscription for `topic`.
    ///
    /// Connection failures may surface here or as the first stream item.
    async fn subscribe(&self, topic: &str) -> Result<PushSubscription>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscription_from_receiver_yields_then_closes() {
        let (tx, rx) = mpsc::channel(4);
        let mut subscription = PushSubscription::from_receiver("pending-file/abc", rx);

        tx.send(Ok(json!({"type": "progress", "progress": 40})))
            .await
            .unwrap();
        drop(tx);

        let frame = subscription.next().await.unwrap().unwrap();
        assert_eq!(frame["progress"], 40);
        assert!(subscription.next().await.is_none());
    }

    #[tokio::test]
    async fn test_receive_only_subscription_rejects_send() {
        let (_tx, rx) = mpsc::channel(1);
        let subscription = PushSubscription::from_receiver("conversion/1", rx);

        let err = subscription.send(json!({"action": "status"})).unwrap_err();
        assert!(matches!(err, BridgeError::NotAvailable(_)));
    }

    #[tokio::test]
    async fn test_outbound_messages_are_forwarded() {
        let (_tx, rx) = mpsc::channel(1);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let subscription = PushSubscription::from_receiver("conversion/1", rx).with_outbound(out_tx);

        subscription.send(json!({"action": "status"})).unwrap();
        assert_eq!(out_rx.recv().await.unwrap()["action"], "status");
    }
}
