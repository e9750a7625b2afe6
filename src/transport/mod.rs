//! Boundary to the transport that discovers processes and carries channel values
//!
//! The assessment engine never talks to a concrete middleware. It consumes the
//! [`Transport`] trait, which answers three questions:
//!
//! - which processes are alive right now (`list_process_names`)
//! - which values arrive on a channel (`subscribe`)
//! - what time it is (`current_time`)
//!
//! ## Implementations
//!
//! - **InMemoryTransport**: scripted process set and manual clock, for tests and demos
//! - **SystemTransport**: the OS process table, with channel values pushed into a bus

pub mod bus;
pub mod memory;
pub mod system;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

pub use bus::ChannelBus;
pub use memory::InMemoryTransport;
pub use system::SystemTransport;

/// One value received on a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub value: Value,
    pub received_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(value: Value, received_at: DateTime<Utc>) -> Self {
        Self { value, received_at }
    }
}

/// Values of one channel, in arrival order
///
/// The stream ends when the transport closes the channel. Dropping it cancels the
/// subscription.
pub type Subscription = BoxStream<'static, Observation>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Names of the processes currently alive
    async fn list_process_names(&self) -> Result<HashSet<String>, TransportError>;

    /// Start receiving values of a channel
    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError>;

    fn current_time(&self) -> DateTime<Utc>;
}
