//! Bounded history of lifecycle events
//!
//! The log keeps the most recent [`EVENT_LOG_CAPACITY`] events. Appending to a full
//! log evicts the oldest entry under the same lock, so concurrent producers never
//! observe a log that is over capacity.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of events retained by default
pub const EVENT_LOG_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    NodeAdded,
    NodeRemoved,
    AssessmentPaused,
    AssessmentResumed,
}

impl fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleEventKind::NodeAdded => "node added",
            LifecycleEventKind::NodeRemoved => "node removed",
            LifecycleEventKind::AssessmentPaused => "assessment paused",
            LifecycleEventKind::AssessmentResumed => "assessment resumed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: LifecycleEventKind,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleEventKind, timestamp: DateTime<Utc>) -> Self {
        Self { kind, timestamp }
    }
}

#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    events: Mutex<VecDeque<LifecycleEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity + 1)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event, evicting the oldest entries beyond capacity
    pub fn append(&self, event: LifecycleEvent) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
    }

    /// Copy of the retained events, most recent last
    pub fn snapshot(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Kinds of the retained events, most recent last
    pub fn kinds(&self) -> Vec<LifecycleEventKind> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|event| event.kind)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
