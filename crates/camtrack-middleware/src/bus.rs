//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels so that every subscriber receives
//! every message without any single subscriber blocking the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Observations`] | Raw poses from the upstream tracker |
//! | [`Topic::FilteredPoses`] | Smoothed poses for downstream consumers |

use camtrack_types::{Event, TrackError};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 256;

/// Routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Observations,
    FilteredPoses,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    observations: broadcast::Sender<Event>,
    filtered_poses: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every topic independently.
    ///
    /// # Errors
    ///
    /// [`TrackError::InvalidConfiguration`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, TrackError> {
        if capacity == 0 {
            return Err(TrackError::InvalidConfiguration(
                "bus capacity must be greater than 0".to_string(),
            ));
        }
        let (observations, _) = broadcast::channel(capacity);
        let (filtered_poses, _) = broadcast::channel(capacity);
        Ok(Self {
            observations,
            filtered_poses,
        })
    }

    /// Publish `event` to `topic`.
    ///
    /// Returns the number of receivers that were handed the event, or
    /// [`TrackError::Channel`] when nobody is subscribed to the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, TrackError> {
        self.sender(topic)
            .send(event)
            .map_err(|_| TrackError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Subscribe to `topic`.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.sender(topic).receiver_count()
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Observations => &self.observations,
            Topic::FilteredPoses => &self.filtered_poses,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        let (observations, _) = broadcast::channel(DEFAULT_CAPACITY);
        let (filtered_poses, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            observations,
            filtered_poses,
        }
    }
}

/// An async receiver bound to a single [`Topic`] channel.
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   events were dropped.
    /// * `Err(RecvError::Closed)` – every sender has been dropped.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}
