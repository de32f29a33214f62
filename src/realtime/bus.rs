//! Channel bus
//!
//! Best-effort, at-least-once fan-out of realtime messages to the
//! subscribers of an exact channel+topic. Publishing never blocks on
//! subscriber behavior: slow consumers lag and eventually drop messages
//! rather than exert backpressure on the publishing workflow.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::realtime::channel::{AiStreamMessage, Channel, Topic, WorkflowUpdate};

/// Message on the wire, tagged by topic
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    Update(WorkflowUpdate),
    AiStream(AiStreamMessage),
}

impl BusMessage {
    pub fn topic(&self) -> Topic {
        match self {
            BusMessage::Update(_) => Topic::Updates,
            BusMessage::AiStream(_) => Topic::AiStream,
        }
    }
}

/// Publish seam between workflow execution and the realtime transport.
///
/// Publish failures are logged and swallowed; they never fail the workflow.
#[async_trait]
pub trait ChannelBus: Send + Sync {
    async fn publish(&self, channel: &Channel, message: BusMessage);
}

/// In-process bus backed by one broadcast queue per channel+topic.
///
/// Per-publisher ordering holds because `broadcast::Sender::send` appends in
/// call order; there is no ordering guarantee across concurrent publishers
/// on different channels.
pub struct BroadcastBus {
    senders: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
    capacity: usize,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    fn key(channel: &Channel, topic: Topic) -> String {
        format!("{}#{}", channel.name(), topic)
    }

    /// Subscribe to one channel+topic. Only messages published after this
    /// call are delivered; a resubscribing consumer gets no replay.
    pub fn subscribe(&self, channel: &Channel, topic: Topic) -> broadcast::Receiver<BusMessage> {
        let key = Self::key(channel, topic);
        let mut senders = self.senders.write().expect("bus lock poisoned");
        senders
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl ChannelBus for BroadcastBus {
    async fn publish(&self, channel: &Channel, message: BusMessage) {
        let key = Self::key(channel, message.topic());
        let sender = {
            let senders = self.senders.read().expect("bus lock poisoned");
            senders.get(&key).cloned()
        };

        match sender {
            Some(sender) => {
                // A send error only means nobody is subscribed right now
                if sender.send(message).is_err() {
                    debug!(channel = %channel, "No subscribers for realtime message");
                }
            }
            None => {
                debug!(channel = %channel, "Dropping realtime message for unknown channel");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::channel::StatusLabel;
    use uuid::Uuid;

    fn channel() -> Channel {
        Channel::new(Uuid::new_v4(), Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber_in_order() {
        let bus = BroadcastBus::default();
        let channel = channel();
        let mut receiver = bus.subscribe(&channel, Topic::Updates);

        for i in 0..5 {
            bus.publish(
                &channel,
                BusMessage::Update(WorkflowUpdate::progress("step", i, 5)),
            )
            .await;
        }

        for i in 0..5u64 {
            let BusMessage::Update(WorkflowUpdate::Progress { data: Some(data), .. }) =
                receiver.recv().await.unwrap()
            else {
                panic!("expected progress update");
            };
            assert_eq!(data.current, i);
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_a_noop() {
        let bus = BroadcastBus::default();
        // Must not panic or block
        bus.publish(
            &channel(),
            BusMessage::Update(WorkflowUpdate::status("fire and forget", StatusLabel::Running)),
        )
        .await;
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = BroadcastBus::default();
        let channel = channel();
        let mut updates = bus.subscribe(&channel, Topic::Updates);
        let mut ai = bus.subscribe(&channel, Topic::AiStream);

        bus.publish(&channel, BusMessage::AiStream(AiStreamMessage::chunk("hi")))
            .await;

        let message = ai.recv().await.unwrap();
        assert_eq!(message.topic(), Topic::AiStream);
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let bus = BroadcastBus::default();
        let a = channel();
        let b = channel();
        let mut receiver_b = bus.subscribe(&b, Topic::Updates);

        // Force channel A's queue into existence, then publish to it
        let _receiver_a = bus.subscribe(&a, Topic::Updates);
        bus.publish(
            &a,
            BusMessage::Update(WorkflowUpdate::status("only for A", StatusLabel::Running)),
        )
        .await;

        assert!(receiver_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ai_stream_terminates_with_complete_marker() {
        let bus = BroadcastBus::default();
        let channel = channel();
        let mut receiver = bus.subscribe(&channel, Topic::AiStream);

        bus.publish(&channel, BusMessage::AiStream(AiStreamMessage::chunk("a")))
            .await;
        bus.publish(&channel, BusMessage::AiStream(AiStreamMessage::chunk("b")))
            .await;
        bus.publish(&channel, BusMessage::AiStream(AiStreamMessage::complete()))
            .await;

        let mut chunks = Vec::new();
        loop {
            let BusMessage::AiStream(message) = receiver.recv().await.unwrap() else {
                panic!("expected ai-stream message");
            };
            if message.is_complete {
                break;
            }
            chunks.push(message.chunk);
        }
        assert_eq!(chunks, vec!["a", "b"]);
    }
}
