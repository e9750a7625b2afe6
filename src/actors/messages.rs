//! Message types for actor communication
//!
//! Commands are sent to the engine actor over an mpsc channel. Queries carry a
//! oneshot sender for the reply.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::lifecycle::Phase;
use crate::metrics::Metrics;

/// Commands that can be sent to the AssessmentEngine
#[derive(Debug)]
pub enum EngineCommand {
    /// Suspend lifecycle handling; channel assessors keep evaluating
    Pause,

    Resume,

    /// Snapshot of the engine's current state
    GetState {
        respond_to: oneshot::Sender<AssessmentState>,
    },

    /// Stop monitoring
    ///
    /// A running cycle is drained and reported before the engine exits.
    Shutdown,
}

/// Mutable state of the current assessment cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AssessmentState {
    pub phase: Phase,

    /// Set when the cycle enters `Running`
    pub start_time: Option<DateTime<Utc>>,

    /// Zeroed until the cycle ends
    pub metrics: Metrics,
}
