//! Core types for the event stream.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Reserved topic that matches every topic in a subscribe request.
pub const TOPIC_ALL: &str = "*";

/// Reserved key that matches every key within a topic's key list.
pub const KEY_ALL: &str = "*";

/// Category of an event (e.g. "job", "deployment").
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(pub String);

impl Topic {
    /// The wildcard topic.
    pub fn all() -> Self {
        Topic(TOPIC_ALL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Topic(s.to_string())
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Topic(s)
    }
}

// Lets request maps be probed with a plain &str (wildcard lookups on the
// filter path).
impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A single event published to the stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Category this event belongs to.
    pub topic: Topic,

    /// Application-defined type within the topic (e.g. "JobRegistered").
    pub event_type: String,

    /// Primary key of the entity the event concerns.
    pub key: String,

    /// Additional keys the event may be matched on.
    pub filter_keys: Vec<String>,

    /// Index of the batch this event was published at.
    pub index: u64,

    /// Namespace of the entity; empty for unnamespaced events.
    pub namespace: String,

    /// Application-defined payload.
    pub payload: serde_json::Value,
}

/// An indexed batch of events, shared immutably between the buffer and every
/// subscription reading it.
#[derive(Clone, Debug, PartialEq)]
pub struct EventBatch {
    /// Index the batch was published at.
    pub index: u64,

    /// Events in publish order.
    pub events: Arc<[Event]>,
}

impl EventBatch {
    pub fn new(index: u64, events: Vec<Event>) -> Self {
        EventBatch {
            index,
            events: events.into(),
        }
    }

    /// Batch with no events, used for buffer seed and start positions.
    pub fn empty(index: u64) -> Self {
        EventBatch::new(index, Vec::new())
    }
}

/// Parameters of a subscription, fixed at subscribe time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Opaque credential the subscription was authorized with. Not
    /// interpreted by the stream core.
    pub token: String,

    /// Index to resume the stream from. Zero starts at the oldest batch the
    /// buffer retains.
    pub index: u64,

    /// Namespace to restrict events to; empty matches every namespace.
    pub namespace: String,

    /// Topics to subscribe to, each with the keys to match within it.
    /// [`TOPIC_ALL`] subscribes to every topic and [`KEY_ALL`] to every key
    /// of a topic.
    pub topics: HashMap<Topic, Vec<String>>,

    /// Require the stream to resume exactly at `index` rather than at the
    /// closest index the buffer still retains.
    pub start_exactly_at_index: bool,
}

impl SubscribeRequest {
    /// Key list an event on `topic` is matched against: the topic's own
    /// entry when present, otherwise the wildcard entry.
    pub(crate) fn topic_keys(&self, topic: &Topic) -> Option<&[String]> {
        self.topics
            .get(topic)
            .or_else(|| self.topics.get(TOPIC_ALL))
            .map(Vec::as_slice)
    }
}
