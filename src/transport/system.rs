//! Transport backed by the local process table
//!
//! Presence is answered from the OS process list (via `sysinfo`). Channel values are
//! pushed into the transport's [`ChannelBus`] by whoever produces them; the `assessor`
//! binary feeds it from stdin.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sysinfo::{ProcessesToUpdate, System};
use tracing::trace;

use super::{ChannelBus, Observation, Subscription, Transport};
use crate::error::TransportError;

#[derive(Clone)]
pub struct SystemTransport {
    system: Arc<Mutex<System>>,
    bus: ChannelBus,
}

impl SystemTransport {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
            bus: ChannelBus::new(),
        }
    }

    /// Bus that feeds channel subscriptions
    pub fn bus(&self) -> &ChannelBus {
        &self.bus
    }

    pub fn publish(&self, channel: &str, value: Value) -> usize {
        self.bus
            .publish(channel, Observation::new(value, Utc::now()))
    }
}

impl Default for SystemTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SystemTransport {
    async fn list_process_names(&self) -> Result<HashSet<String>, TransportError> {
        let system = Arc::clone(&self.system);

        let names = tokio::task::spawn_blocking(move || {
            let mut system = system.lock().unwrap_or_else(PoisonError::into_inner);
            let refreshed = system.refresh_processes(ProcessesToUpdate::All, true);
            trace!("refreshed {refreshed} processes");

            system
                .processes()
                .values()
                .map(|process| process.name().to_string_lossy().into_owned())
                .collect::<HashSet<_>>()
        })
        .await
        .map_err(|e| TransportError::Unavailable(format!("process refresh failed: {e}")))?;

        Ok(names)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        Ok(self.bus.subscribe(channel))
    }

    fn current_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
