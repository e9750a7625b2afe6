//! In-memory transport with a scripted process set and a manual clock
//!
//! Useful for:
//! - Driving the engine in tests without a live middleware
//! - Replaying recorded channel values deterministically
//!
//! Time only moves when [`InMemoryTransport::advance`] or [`InMemoryTransport::set_time`]
//! is called.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use super::{ChannelBus, Observation, Subscription, Transport};
use crate::error::TransportError;

#[derive(Debug)]
struct State {
    processes: HashSet<String>,
    clock: DateTime<Utc>,

    /// Channels whose subscription never completes
    stalled: HashSet<String>,

    /// Channels whose subscription reports a lost transport
    refused: HashSet<String>,

    /// Number of upcoming polls answered with `Unavailable`
    unavailable_polls: usize,
    unavailable_subscriptions: usize,

    disconnected: bool,
}

#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    state: Arc<Mutex<State>>,
    bus: ChannelBus,
}

impl InMemoryTransport {
    /// Create a transport whose clock starts at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                processes: HashSet::new(),
                clock: start,
                stalled: HashSet::new(),
                refused: HashSet::new(),
                unavailable_polls: 0,
                unavailable_subscriptions: 0,
                disconnected: false,
            })),
            bus: ChannelBus::new(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_process(&self, name: impl Into<String>) {
        self.state().processes.insert(name.into());
    }

    pub fn remove_process(&self, name: &str) {
        self.state().processes.remove(name);
    }

    pub fn set_time(&self, time: DateTime<Utc>) {
        self.state().clock = time;
    }

    /// Move the clock forward, stopping at the latest representable time
    pub fn advance(&self, by: Duration) {
        let mut state = self.state();
        let advanced = chrono::Duration::from_std(by)
            .ok()
            .and_then(|by| state.clock.checked_add_signed(by));

        state.clock = match advanced {
            Some(clock) => clock,
            None => {
                warn!("clock advance by {by:?} overflows, saturating");
                DateTime::<Utc>::MAX_UTC
            }
        };
    }

    /// Make every future subscription to `channel` hang forever
    pub fn stall_channel(&self, channel: impl Into<String>) {
        self.state().stalled.insert(channel.into());
    }

    /// Answer every future subscription to `channel` with `Disconnected`
    ///
    /// Presence polls keep working.
    pub fn refuse_channel(&self, channel: impl Into<String>) {
        self.state().refused.insert(channel.into());
    }

    /// Answer the next `subscriptions` subscriptions with `Unavailable`
    pub fn fail_next_subscriptions(&self, subscriptions: usize) {
        self.state().unavailable_subscriptions = subscriptions;
    }

    /// Answer the next `polls` presence polls with `Unavailable`
    pub fn fail_next_polls(&self, polls: usize) {
        self.state().unavailable_polls = polls;
    }

    /// Fail every future call with `Disconnected` and close open subscriptions
    pub fn disconnect(&self) {
        self.state().disconnected = true;
        self.bus.close();
    }

    /// Publish a value stamped with the current clock
    pub fn publish(&self, channel: &str, value: Value) -> usize {
        let now = self.current_time();
        self.bus.publish(channel, Observation::new(value, now))
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.bus.subscriber_count(channel)
    }

    /// Wait until `channel` has at least `count` live subscriptions
    pub async fn wait_for_subscribers(&self, channel: &str, count: usize) {
        while self.subscriber_count(channel) < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn list_process_names(&self) -> Result<HashSet<String>, TransportError> {
        let mut state = self.state();

        if state.disconnected {
            return Err(TransportError::Disconnected);
        }

        if state.unavailable_polls > 0 {
            state.unavailable_polls -= 1;
            return Err(TransportError::Unavailable(
                "scripted poll failure".to_string(),
            ));
        }

        Ok(state.processes.clone())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        let stalled = {
            let mut state = self.state();
            if state.disconnected || state.refused.contains(channel) {
                return Err(TransportError::Disconnected);
            }
            if state.unavailable_subscriptions > 0 {
                state.unavailable_subscriptions -= 1;
                return Err(TransportError::Unavailable(
                    "scripted subscription failure".to_string(),
                ));
            }
            state.stalled.contains(channel)
        };

        if stalled {
            debug!("subscription to {channel} stalls");
            return futures::future::pending().await;
        }

        Ok(self.bus.subscribe(channel))
    }

    fn current_time(&self) -> DateTime<Utc> {
        self.state().clock
    }
}
