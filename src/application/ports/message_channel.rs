use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Where rejected or expired messages are redirected for operator
/// inspection instead of silent loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterTarget {
    pub exchange: String,
    pub routing_key: String,
}

/// Declaration-time contract for one queue.
#[derive(Debug, Clone)]
pub struct QueueSpec {
    pub name: String,
    /// Survive broker restart. A no-op for the in-process binding.
    pub durable: bool,
    /// Messages older than this are dead-lettered (or dropped) at delivery.
    pub message_ttl: Option<Duration>,
    /// Bound on queue depth; the oldest message is evicted beyond it.
    /// Acceptable only for progress/heartbeat-style queues.
    pub max_length: Option<usize>,
    pub dead_letter: Option<DeadLetterTarget>,
    /// Topic bindings: exact routing keys, or prefixes ending in `.*`.
    pub bindings: Vec<String>,
}

impl QueueSpec {
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            message_ttl: None,
            max_length: None,
            dead_letter: None,
            bindings: Vec::new(),
        }
    }

    pub fn bind(mut self, routing_key: impl Into<String>) -> Self {
        self.bindings.push(routing_key.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.message_ttl = Some(ttl);
        self
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn with_dead_letter(mut self, target: DeadLetterTarget) -> Self {
        self.dead_letter = Some(target);
        self
    }
}

/// One message handed to a consumer. Must be explicitly acknowledged or
/// rejected; there is no implicit retry via error bubbling.
#[derive(Debug)]
pub struct Delivery {
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub redelivered: bool,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(
        routing_key: String,
        payload: Vec<u8>,
        redelivered: bool,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self {
            routing_key,
            payload,
            redelivered,
            acker,
        }
    }

    pub async fn ack(self) -> Result<(), ChannelError> {
        self.acker.ack().await
    }

    /// `requeue: true` puts the message back for redelivery; `false` sends
    /// it to the queue's dead-letter target, if any.
    pub async fn reject(self, requeue: bool) -> Result<(), ChannelError> {
        self.acker.reject(requeue).await
    }
}

/// Backend-specific acknowledgement handle.
#[async_trait]
pub trait Acker: Send + Sync + std::fmt::Debug {
    async fn ack(&self) -> Result<(), ChannelError>;
    async fn reject(&self, requeue: bool) -> Result<(), ChannelError>;
}

/// Abstraction over a durable, topic-routed broker. The broker itself is an
/// external collaborator; only this contract is owned here.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), ChannelError>;

    async fn publish(&self, routing_key: &str, payload: Vec<u8>) -> Result<(), ChannelError>;

    /// Attaches a consumer to a declared queue. Multiple consumers on one
    /// queue share its messages (competing consumers).
    async fn consume(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<Delivery>, ChannelError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("queue not declared: {0}")]
    UnknownQueue(String),
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error("consume failed: {0}")]
    ConsumeFailed(String),
    #[error("channel closed")]
    Closed,
}

/// Serializes a message and publishes it under `routing_key`.
pub async fn publish_json<T: serde::Serialize>(
    channel: &dyn MessageChannel,
    routing_key: &str,
    message: &T,
) -> Result<(), ChannelError> {
    let payload =
        serde_json::to_vec(message).map_err(|e| ChannelError::PublishFailed(e.to_string()))?;
    channel.publish(routing_key, payload).await
}
