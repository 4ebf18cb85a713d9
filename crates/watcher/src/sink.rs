use crate::error::SinkError;
use async_trait::async_trait;
use chainrelay_types::Message;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Consumer of canonical messages. Shared by every chain's listener, so
/// implementations must accept concurrent deliveries. Delivery is
/// at-least-once; deduplicate on [`Message::key`].
#[async_trait]
pub trait RelaySink: Send + Sync {
    async fn forward(&self, message: Message) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: RelaySink + ?Sized> RelaySink for Arc<T> {
    async fn forward(&self, message: Message) -> Result<(), SinkError> {
        (**self).forward(message).await
    }
}

/// Hands messages to a bounded channel; applies backpressure when the
/// consumer falls behind.
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<Message>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl RelaySink for ChannelSink {
    async fn forward(&self, message: Message) -> Result<(), SinkError> {
        self.sender.send(message).await.map_err(|_| SinkError::Closed)
    }
}
