//! Topic-partitioned publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the engine tick.  Publishing is synchronous and never awaits, so the
//! single-threaded engine can publish from inside its tick without a runtime.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Reactions`] | Reaction-trigger transitions |
//! | [`Topic::Behaviors`] | Behavior switches (start / finish / resume) |
//! | [`Topic::Vision`] | Results posted by the vision worker |
//! | [`Topic::SystemAlerts`] | Faults and shutdown notices |

use tokio::sync::broadcast;
use tracing::{trace, warn};
use tread_types::{Event, TreadError};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Reaction-trigger transitions published by the behavior manager.
    Reactions,
    /// Behavior switches published by the behavior manager.
    Behaviors,
    /// Vision worker results (illumination, processed-frame notices).
    Vision,
    /// Faults and lifecycle notices.
    SystemAlerts,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    reactions: broadcast::Sender<Event>,
    behaviors: broadcast::Sender<Event>,
    vision: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (reactions, _) = broadcast::channel(capacity);
        let (behaviors, _) = broadcast::channel(capacity);
        let (vision, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            reactions,
            behaviors,
            vision,
            system_alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`TreadError::Channel`] when nobody is listening on the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, TreadError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| TreadError::Channel(format!("No subscribers for topic {:?}", topic)))
    }

    /// Publish `event`, treating "no subscribers" as a normal condition.
    ///
    /// The engine uses this for fire-and-forget notifications.
    pub fn notify(&self, topic: Topic, event: Event) {
        if self.publish_to(topic, event).is_err() {
            trace!(topic = ?topic, "event dropped: no subscribers");
        }
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live receivers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Reactions => &self.reactions,
            Topic::Behaviors => &self.behaviors,
            Topic::Vision => &self.vision,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking poll used from the synchronous engine tick and tests.
    ///
    /// Lag is logged and skipped; returns `None` when nothing is pending.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tread_types::{EventPayload, ReactionTrigger};

    fn make_event(source: &str) -> Event {
        Event::new(
            source,
            EventPayload::ReactionTriggerTransition {
                old: None,
                new: Some(ReactionTrigger::CliffDetected),
            },
        )
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Reactions);

        let event = make_event("tread-runtime::test");
        bus.publish_to(Topic::Reactions, event.clone())?;

        let received = rx.recv().await?;
        assert_eq!(received.id, event.id);
        assert_eq!(received.source, event.source);
        Ok(())
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe_to(Topic::Behaviors);
        let mut rx2 = bus.subscribe_to(Topic::Behaviors);

        let event = make_event("behavior_manager");
        bus.publish_to(Topic::Behaviors, event.clone())?;

        assert_eq!(rx1.recv().await?.id, event.id);
        assert_eq!(rx2.recv().await?.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_no_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::Vision, make_event("test"));
        assert!(matches!(result, Err(TreadError::Channel(_))));
    }

    #[test]
    fn notify_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.notify(Topic::SystemAlerts, make_event("test"));
        assert_eq!(bus.subscriber_count(Topic::SystemAlerts), 0);
    }

    #[test]
    fn try_recv_returns_none_when_empty() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Reactions);
        assert!(rx.try_recv().is_none());

        bus.notify(Topic::Reactions, make_event("test"));
        assert!(rx.try_recv().is_some());
        assert!(rx.try_recv().is_none());
    }

    /// A subscriber on `SystemAlerts` must not receive events published to
    /// `Reactions` because they are routed through separate channels.
    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut alerts_sub = bus.subscribe_to(Topic::SystemAlerts);
        let _reactions_sub = bus.subscribe_to(Topic::Reactions);

        bus.publish_to(Topic::Reactions, make_event("behavior_manager"))?;

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            alerts_sub.recv(),
        )
        .await;

        assert!(
            result.is_err(),
            "SystemAlerts subscriber must not receive a Reactions event"
        );
        Ok(())
    }

    #[test]
    fn try_recv_skips_past_lag() {
        let bus = EventBus::new(4);
        let mut slow_sub = bus.subscribe_to(Topic::Vision);
        for _ in 0..32 {
            bus.notify(Topic::Vision, make_event("flood"));
        }
        // The oldest events were overwritten; the receiver still yields the
        // surviving ones instead of erroring out.
        assert!(slow_sub.try_recv().is_some());
    }
}
