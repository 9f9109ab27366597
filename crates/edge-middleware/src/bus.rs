//! [`EventBus`] – topic-partitioned broadcast of runtime [`Event`]s.
//!
//! Each [`Topic`] owns its own [`tokio::sync::broadcast`] channel, so a slow
//! observer of one lane never delays another.  Publishing is synchronous and
//! needs no async runtime: the supervisor publishes from inside its critical
//! section.  Observers either `await` [`TopicReceiver::recv`] or poll with
//! [`TopicReceiver::try_next`].
//!
//! # Topics
//!
//! | Topic | Published by | Carries |
//! |---|---|---|
//! | [`Topic::StateChanges`] | supervisor | `StateChanged` for every committed transition |
//! | [`Topic::Faults`] | runtime context | error descriptors, slot timeouts |
//! | [`Topic::Audit`] | supervisor | every audit record, transition or audit-only |
//! | [`Topic::Gateway`] | runtime context | traffic cleared for the gateway (closed in `Stop`) |

use edge_types::Event;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{trace, warn};

/// Events buffered per topic before the slowest receiver starts lagging.
const DEFAULT_CAPACITY: usize = 256;

/// Routing lane of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    StateChanges,
    Faults,
    Audit,
    Gateway,
}

const TOPIC_COUNT: usize = 4;

impl Topic {
    pub const ALL: [Topic; TOPIC_COUNT] = [
        Topic::StateChanges,
        Topic::Faults,
        Topic::Audit,
        Topic::Gateway,
    ];

    const fn lane(self) -> usize {
        self as usize
    }
}

/// Cloneable handle; every clone feeds the same channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    lanes: [Sender<Event>; TOPIC_COUNT],
}

impl EventBus {
    /// # Panics
    ///
    /// If `capacity` is zero (tokio broadcast requirement).  Runtime
    /// configuration rejects a zero capacity before this is reached.
    pub fn new(capacity: usize) -> Self {
        Self {
            lanes: std::array::from_fn(|_| broadcast::channel(capacity).0),
        }
    }

    /// Hand `event` to every current subscriber of `topic` and return how
    /// many there were.  Nobody listening is normal and yields `0`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        self.sender(topic).send(event).unwrap_or_else(|_| {
            trace!(?topic, "event published with no subscribers");
            0
        })
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            inner: self.sender(topic).subscribe(),
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.sender(topic).receiver_count()
    }

    fn sender(&self, topic: Topic) -> &Sender<Event> {
        &self.lanes[topic.lane()]
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Subscription to one [`Topic`].
pub struct TopicReceiver {
    topic: Topic,
    inner: Receiver<Event>,
}

impl TopicReceiver {
    /// Next event on the topic.
    ///
    /// `RecvError::Lagged(n)` reports `n` events lost to a full buffer; the
    /// receiver stays usable.  `RecvError::Closed` means every bus handle is
    /// gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.inner.recv().await
    }

    /// Next buffered event without waiting.  Lag gaps are logged and
    /// skipped.
    pub fn try_next(&mut self) -> Option<Event> {
        loop {
            match self.inner.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(topic = ?self.topic, missed, "subscriber lagged; events lost");
                }
                Err(_) => return None,
            }
        }
    }

    /// Every event currently buffered, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}
