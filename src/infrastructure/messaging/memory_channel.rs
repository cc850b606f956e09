use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::application::ports::{Acker, ChannelError, Delivery, MessageChannel, QueueSpec};

/// In-process topic router implementing the message channel contract:
/// topic bindings, per-queue TTL, max-length eviction, and dead-lettering
/// on reject. The `durable` flag is a no-op here — all state dies with the
/// process, which is exactly the single-process/dev deployment this
/// binding is for. Multi-process deployments bind a real broker instead.
///
/// Unlike a durable broker, this binding does not redeliver unacked
/// messages: a delivery leaves the buffer when sent, and ack is a no-op.
/// A consumer that dies holding an unacked delivery loses it. Recovery of
/// in-flight messages across crashes is a durable-binding property only.
pub struct InMemoryChannel {
    state: Arc<Mutex<ChannelState>>,
    events: mpsc::UnboundedSender<AckEvent>,
}

#[derive(Default)]
struct ChannelState {
    queues: HashMap<String, QueueState>,
}

struct QueueState {
    spec: QueueSpec,
    buffer: VecDeque<Stored>,
    consumers: Vec<mpsc::UnboundedSender<Delivery>>,
    next_consumer: usize,
}

#[derive(Debug, Clone)]
struct Stored {
    routing_key: String,
    payload: Vec<u8>,
    enqueued_at: Instant,
    redelivered: bool,
}

#[derive(Debug)]
enum AckEvent {
    Ack,
    Reject {
        queue: String,
        message: Stored,
        requeue: bool,
    },
}

impl InMemoryChannel {
    pub fn new() -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            state: Arc::new(Mutex::new(ChannelState::default())),
            events: tx,
        });

        // Background task resolving rejects: requeue at the front, or
        // redirect to the queue's dead-letter target.
        let state = Arc::clone(&channel.state);
        let events = channel.events.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    AckEvent::Ack => {}
                    AckEvent::Reject {
                        queue,
                        mut message,
                        requeue,
                    } => {
                        let mut guard = state.lock().expect("channel state poisoned");
                        if requeue {
                            message.redelivered = true;
                            if let Some(q) = guard.queues.get_mut(&queue) {
                                q.buffer.push_front(message);
                            }
                            deliver_ready(&mut guard, &queue, &events);
                        } else {
                            let target = guard
                                .queues
                                .get(&queue)
                                .and_then(|q| q.spec.dead_letter.clone());
                            match target {
                                Some(dl) => {
                                    route(&mut guard, &dl.routing_key, message.payload, &events)
                                }
                                None => tracing::warn!(
                                    queue,
                                    routing_key = message.routing_key,
                                    "Rejected message dropped: queue has no dead-letter target"
                                ),
                            }
                        }
                    }
                }
            }
        });

        channel
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), ChannelError> {
        let mut guard = self.state.lock().expect("channel state poisoned");
        // Redeclaration keeps buffered messages and consumers.
        guard
            .queues
            .entry(spec.name.clone())
            .and_modify(|q| q.spec = spec.clone())
            .or_insert_with(|| QueueState {
                spec: spec.clone(),
                buffer: VecDeque::new(),
                consumers: Vec::new(),
                next_consumer: 0,
            });
        Ok(())
    }

    async fn publish(&self, routing_key: &str, payload: Vec<u8>) -> Result<(), ChannelError> {
        let mut guard = self.state.lock().expect("channel state poisoned");
        route(&mut guard, routing_key, payload, &self.events);
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<Delivery>, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.state.lock().expect("channel state poisoned");
        let q = guard
            .queues
            .get_mut(queue)
            .ok_or_else(|| ChannelError::UnknownQueue(queue.to_string()))?;
        q.consumers.push(tx);
        deliver_ready(&mut guard, queue, &self.events);
        Ok(rx)
    }
}

/// Exact match, or a binding ending in `.*` matching by prefix.
fn binding_matches(binding: &str, routing_key: &str) -> bool {
    if let Some(prefix) = binding.strip_suffix(".*") {
        routing_key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'))
    } else {
        binding == routing_key
    }
}

fn route(
    state: &mut ChannelState,
    routing_key: &str,
    payload: Vec<u8>,
    events: &mpsc::UnboundedSender<AckEvent>,
) {
    let targets: Vec<String> = state
        .queues
        .iter()
        .filter(|(_, q)| {
            q.spec
                .bindings
                .iter()
                .any(|b| binding_matches(b, routing_key))
        })
        .map(|(name, _)| name.clone())
        .collect();

    if targets.is_empty() {
        tracing::debug!(routing_key, "Message matched no queue binding");
        return;
    }

    for name in targets {
        let evicted = {
            let q = state.queues.get_mut(&name).expect("queue vanished");
            q.buffer.push_back(Stored {
                routing_key: routing_key.to_string(),
                payload: payload.clone(),
                enqueued_at: Instant::now(),
                redelivered: false,
            });
            // Oldest-first eviction beyond the length bound.
            match q.spec.max_length {
                Some(max) if q.buffer.len() > max => q.buffer.pop_front(),
                _ => None,
            }
        };

        if let Some(old) = evicted {
            dead_letter_or_drop(state, &name, old, events, "evicted past max-length");
        }
        deliver_ready(state, &name, events);
    }
}

fn dead_letter_or_drop(
    state: &mut ChannelState,
    queue: &str,
    message: Stored,
    events: &mpsc::UnboundedSender<AckEvent>,
    why: &str,
) {
    let target = state
        .queues
        .get(queue)
        .and_then(|q| q.spec.dead_letter.clone());
    match target {
        Some(dl) => route(state, &dl.routing_key, message.payload, events),
        None => tracing::debug!(queue, why, "Message dropped"),
    }
}

/// Drains ready messages to consumers, round-robin, honoring TTL.
fn deliver_ready(state: &mut ChannelState, queue: &str, events: &mpsc::UnboundedSender<AckEvent>) {
    loop {
        let (message, expired) = {
            let q = match state.queues.get_mut(queue) {
                Some(q) => q,
                None => return,
            };
            if q.consumers.is_empty() {
                return;
            }
            let Some(message) = q.buffer.pop_front() else {
                return;
            };
            let expired = q
                .spec
                .message_ttl
                .is_some_and(|ttl| message.enqueued_at.elapsed() > ttl);
            (message, expired)
        };

        if expired {
            dead_letter_or_drop(state, queue, message, events, "expired past TTL");
            continue;
        }

        let q = state.queues.get_mut(queue).expect("queue vanished");
        let mut dispatched = false;
        while !q.consumers.is_empty() {
            let idx = q.next_consumer % q.consumers.len();
            let delivery = Delivery::new(
                message.routing_key.clone(),
                message.payload.clone(),
                message.redelivered,
                Box::new(MemoryAcker {
                    queue: queue.to_string(),
                    message: message.clone(),
                    events: events.clone(),
                }),
            );
            match q.consumers[idx].send(delivery) {
                Ok(()) => {
                    q.next_consumer = idx + 1;
                    dispatched = true;
                    break;
                }
                Err(_) => {
                    // Consumer went away; forget it and try the next one.
                    q.consumers.remove(idx);
                }
            }
        }

        if !dispatched {
            q.buffer.push_front(message);
            return;
        }
    }
}

#[derive(Debug)]
struct MemoryAcker {
    queue: String,
    message: Stored,
    events: mpsc::UnboundedSender<AckEvent>,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self) -> Result<(), ChannelError> {
        self.events
            .send(AckEvent::Ack)
            .map_err(|_| ChannelError::Closed)
    }

    async fn reject(&self, requeue: bool) -> Result<(), ChannelError> {
        self.events
            .send(AckEvent::Reject {
                queue: self.queue.clone(),
                message: self.message.clone(),
                requeue,
            })
            .map_err(|_| ChannelError::Closed)
    }
}
