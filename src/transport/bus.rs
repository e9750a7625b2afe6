//! Fan-out of channel values to every live subscription

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{trace, warn};

use super::{Observation, Subscription};

/// Line format accepted by [`ChannelBus::feed_json_lines`]
#[derive(Debug, Deserialize)]
struct Envelope {
    channel: String,
    value: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelBus {
    subscribers: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Observation>>>>>,
}

impl ChannelBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .push(tx);

        UnboundedReceiverStream::new(rx).boxed()
    }

    /// Deliver an observation to every live subscription of `channel`
    ///
    /// Returns the number of subscriptions that received it. Dropped subscriptions are
    /// pruned on the way.
    pub fn publish(&self, channel: &str, observation: Observation) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(senders) = subscribers.get_mut(channel) else {
            trace!("no subscribers for {channel}");
            return 0;
        };

        senders.retain(|tx| tx.send(observation.clone()).is_ok());
        senders.len()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or_default()
    }

    /// End every subscription stream
    pub fn close(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Publish `{"channel": "...", "value": ...}` lines until the reader is exhausted
    ///
    /// Malformed lines are logged and skipped. Returns the number of published lines.
    pub async fn feed_json_lines<R, C>(&self, reader: R, clock: C) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
        C: Fn() -> chrono::DateTime<chrono::Utc>,
    {
        let mut lines = reader.lines();
        let mut published = 0;

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Envelope>(line) {
                Ok(Envelope { channel, value }) => {
                    self.publish(&channel, Observation::new(value, clock()));
                    published += 1;
                }
                Err(e) => warn!("skipping malformed line: {e}"),
            }
        }

        Ok(published)
    }
}
