//! Runtime assessment of a monitored process
//!
//! The engine waits for a target process to appear, evaluates every value published
//! on the configured channels against declarative requirements while the target
//! runs, and emits an [`AssessmentReport`] with aggregate metrics once the target
//! disappears.

pub mod actors;
pub mod config;
pub mod error;
pub mod event_log;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod report;
pub mod requirement;
pub mod transport;

pub use actors::{AssessmentState, EngineHandle};
pub use config::{AssessmentConfig, ChannelSpec, MetricSpec, parse_config, read_config_file};
pub use error::{ConfigError, EngineError, TransportError};
pub use event_log::{EventLog, LifecycleEvent, LifecycleEventKind};
pub use lifecycle::Phase;
pub use metrics::{MetricKey, Metrics};
pub use report::{AssessmentReport, ChannelResult, ChannelStatus, MetricOutcome};
pub use requirement::{Comparator, Mode, Requirement, Target, Verdict};
pub use transport::{InMemoryTransport, Observation, SystemTransport, Transport};
