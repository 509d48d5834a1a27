//! Topic-based publish/subscribe bus for controller status events.
//!
//! Uses [`tokio::sync::broadcast`] channels so every subscriber sees every
//! event and a slow subscriber never blocks a behaviour.  Behaviours run on
//! plain threads, so publishing is synchronous and receivers offer both a
//! non-blocking [`TopicReceiver::try_recv`] and an async
//! [`TopicReceiver::recv`].
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Telemetry`] | Patrol distance readings |
//! | [`Topic::BehaviorStatus`] | Patrol state changes, touches, pose changes |
//! | [`Topic::SystemAlerts`] | Hardware faults, disabled features, notices |

use pawctl_types::Event;
use tokio::sync::broadcast;
use tracing::warn;

/// Events buffered per topic before a slow subscriber starts losing the
/// oldest ones.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// High-rate sensor readings.
    Telemetry,
    /// Decisions made by behaviours.
    BehaviorStatus,
    /// Faults and operator-relevant notices.
    SystemAlerts,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Telemetry, Topic::BehaviorStatus, Topic::SystemAlerts];
}

/// Shared event bus.  Clones share the same channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    telemetry: broadcast::Sender<Event>,
    behavior_status: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` applies to every topic independently and must be non-zero.
    pub fn new(capacity: usize) -> Self {
        let (telemetry, _) = broadcast::channel(capacity);
        let (behavior_status, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            telemetry,
            behavior_status,
            system_alerts,
        }
    }

    /// Publish `event` on `topic`.
    ///
    /// Returns how many subscribers were handed the event.  Publishing with
    /// nobody listening is normal and returns `0`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        self.topic_sender(topic).send(event).unwrap_or(0)
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Telemetry => &self.telemetry,
            Topic::BehaviorStatus => &self.behavior_status,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiver bound to a single [`Topic`].  Obtained via
/// [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event.
    ///
    /// Returns `Err(Lagged(n))` when this receiver fell behind and lost `n`
    /// events, `Err(Closed)` once every bus handle is gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Next buffered event, if any.  Lag is logged and skipped over.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "status subscriber lagged");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// Every buffered event, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}
