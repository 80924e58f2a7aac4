//! Change queue configuration

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Batching options for a change queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Debounce delay in milliseconds. `None` disables the automatic flush.
    pub delay: Option<u64>,

    /// Flush as soon as this many calls are buffered. `None` is unbounded.
    pub max: Option<usize>,
}

impl QueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay = Some(delay_ms);
        self
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    pub fn delay_duration(&self) -> Option<Duration> {
        self.delay.map(Duration::from_millis)
    }

    /// Whether a buffer of `len` calls must be flushed right away
    pub fn is_exceeded(&self, len: usize) -> bool {
        self.max.is_some_and(|max| len >= max)
    }
}

/// `queue` accepts `false`, `true` or an options object
#[derive(Deserialize)]
#[serde(untagged)]
enum QueueSetting {
    Flag(bool),
    Options(QueueOptions),
}

pub(crate) fn deserialize_queue<'de, D>(deserializer: D) -> Result<Option<QueueOptions>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<QueueSetting>::deserialize(deserializer)? {
        None | Some(QueueSetting::Flag(false)) => None,
        Some(QueueSetting::Flag(true)) => Some(QueueOptions::default()),
        Some(QueueSetting::Options(options)) => Some(options),
    })
}

pub(crate) fn serialize_queue<S>(queue: &Option<QueueOptions>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match queue {
        None => serializer.serialize_bool(false),
        Some(options) => options.serialize(serializer),
    }
}
