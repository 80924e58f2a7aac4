//! Change notifications published by tables and views

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::Id;
use crate::value::Record;

/// Event topics a table or view publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Add,
    Update,
    Remove,
    /// Wildcard: receives every event. Can be subscribed to, never triggered.
    #[serde(rename = "*")]
    All,
}

/// Payload delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub topic: Topic,
    /// Ids affected by the change
    pub items: Vec<Id>,
    /// Current records for `Update` events
    pub data: Vec<Record>,
    /// Records as they were before an `Update` or `Remove`
    pub old_data: Vec<Record>,
    /// Lets the originator of a change recognize its own echo
    pub sender_id: Option<String>,
}

impl ChangeEvent {
    pub fn new(topic: Topic, items: Vec<Id>) -> Self {
        Self {
            topic,
            items,
            data: Vec::new(),
            old_data: Vec::new(),
            sender_id: None,
        }
    }

    pub fn with_data(mut self, data: Vec<Record>) -> Self {
        self.data = data;
        self
    }

    pub fn with_old_data(mut self, old_data: Vec<Record>) -> Self {
        self.old_data = old_data;
        self
    }

    pub fn with_sender(mut self, sender_id: Option<&str>) -> Self {
        self.sender_id = sender_id.map(str::to_string);
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Cannot trigger the wildcard topic '*'")]
    WildcardTrigger,
}

/// Listener callback
pub type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Synchronous publish/subscribe bus keyed by [`Topic`].
///
/// Listeners of the triggered topic run first, in registration order, then
/// wildcard listeners in registration order. No lock is held while a
/// listener runs, so listeners may subscribe, unsubscribe or read the
/// publishing table.
pub struct EventBus {
    listeners: Arc<Mutex<AHashMap<Topic, Vec<(SubscriptionId, Listener)>>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(AHashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to a topic
    pub fn on(&self, topic: Topic, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(topic)
            .or_default()
            .push((id, listener));
        id
    }

    /// Unsubscribe. Returns false if the subscription was already gone.
    pub fn off(&self, subscription: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        for list in listeners.values_mut() {
            if let Some(pos) = list.iter().position(|(id, _)| *id == subscription) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Publish an event
    pub fn trigger(&self, event: &ChangeEvent) -> Result<(), EventError> {
        if event.topic == Topic::All {
            return Err(EventError::WildcardTrigger);
        }

        let targets: Vec<Listener> = {
            let listeners = self.listeners.lock();
            [event.topic, Topic::All]
                .iter()
                .filter_map(|topic| listeners.get(topic))
                .flat_map(|list| list.iter().map(|(_, l)| l.clone()))
                .collect()
        };

        for listener in targets {
            listener(event);
        }
        Ok(())
    }

    /// Number of listeners on a topic
    pub fn listener_count(&self, topic: Topic) -> usize {
        self.listeners.lock().get(&topic).map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a listener from a closure
pub fn listener_from_fn<F>(f: F) -> Listener
where
    F: Fn(&ChangeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Listener) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |name: &str| {
            let log = log_clone.clone();
            let name = name.to_string();
            listener_from_fn(move |event: &ChangeEvent| {
                log.lock().push(format!("{}:{:?}", name, event.topic));
            })
        };
        (log, make)
    }

    #[test]
    fn test_wildcard_runs_after_topic_listeners() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        bus.on(Topic::All, make("star"));
        bus.on(Topic::Add, make("first"));
        bus.on(Topic::Add, make("second"));
        bus.on(Topic::Remove, make("remove"));

        bus.trigger(&ChangeEvent::new(Topic::Add, vec![Id::Int(1)])).unwrap();

        assert_eq!(*log.lock(), vec!["first:Add", "second:Add", "star:Add"]);
    }

    #[test]
    fn test_off_removes_listener() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        let sub = bus.on(Topic::Update, make("a"));
        assert!(bus.off(sub));
        assert!(!bus.off(sub));

        bus.trigger(&ChangeEvent::new(Topic::Update, vec![])).unwrap();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_wildcard_cannot_be_triggered() {
        let bus = EventBus::new();
        let result = bus.trigger(&ChangeEvent::new(Topic::All, vec![]));
        assert_eq!(result, Err(EventError::WildcardTrigger));
    }

    #[test]
    fn test_listener_may_subscribe_during_dispatch() {
        let bus = Arc::new(EventBus::new());
        let bus_clone = bus.clone();
        bus.on(
            Topic::Add,
            listener_from_fn(move |_| {
                bus_clone.on(Topic::Add, listener_from_fn(|_| {}));
            }),
        );

        bus.trigger(&ChangeEvent::new(Topic::Add, vec![])).unwrap();
        assert_eq!(bus.listener_count(Topic::Add), 2);
    }
}
