//! Final assessment report and its per-channel / per-metric parts

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event_log::LifecycleEvent;
use crate::metrics::Metrics;
use crate::requirement::Verdict;

/// Reason recorded for requirements that never saw an in-window value
pub const NO_VALUES_OBSERVED: &str = "no values observed";

/// Outcome of one channel requirement over the whole cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementOutcome {
    pub requirement_index: usize,
    pub passed: bool,
    pub reason: Option<String>,

    /// Number of values this requirement was evaluated against
    pub evaluations: u64,

    /// Number of those evaluations that did not pass
    pub failures: u64,
}

impl RequirementOutcome {
    pub fn pending(requirement_index: usize) -> Self {
        Self {
            requirement_index,
            passed: false,
            reason: Some(NO_VALUES_OBSERVED.to_string()),
            evaluations: 0,
            failures: 0,
        }
    }

    pub fn invalid(requirement_index: usize, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::pending(requirement_index)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelStatus {
    Completed,
    FailedToStart { reason: String },
    /// The assessor task died before handing over its result
    Aborted { reason: String },
}

/// Everything a channel assessor accumulated during one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelResult {
    pub channel_name: String,
    pub status: ChannelStatus,
    pub message_count: u64,
    pub requirement_outcomes: Vec<RequirementOutcome>,
}

impl ChannelResult {
    /// Result for a channel that never became active
    pub fn failed_to_start(
        channel_name: impl Into<String>,
        requirement_count: usize,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        Self {
            channel_name: channel_name.into(),
            requirement_outcomes: (0..requirement_count)
                .map(|index| RequirementOutcome::invalid(index, reason.clone()))
                .collect(),
            status: ChannelStatus::FailedToStart { reason },
            message_count: 0,
        }
    }

    /// Result for a channel whose assessor task was lost
    pub fn aborted(
        channel_name: impl Into<String>,
        requirement_count: usize,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        Self {
            status: ChannelStatus::Aborted {
                reason: reason.clone(),
            },
            ..Self::failed_to_start(channel_name, requirement_count, reason)
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ChannelStatus::Completed
    }

    pub fn passed(&self) -> bool {
        self.is_completed() && self.requirement_outcomes.iter().all(|o| o.passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricOutcome {
    pub metric_name: String,
    pub requirement_index: usize,
    #[serde(flatten)]
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentReport {
    pub target_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub metrics: Metrics,
    pub channels: Vec<ChannelResult>,
    pub metric_outcomes: Vec<MetricOutcome>,
    pub events: Vec<LifecycleEvent>,
}

impl AssessmentReport {
    /// Whether every channel and metric requirement passed
    pub fn passed(&self) -> bool {
        self.channels.iter().all(ChannelResult::passed)
            && self.metric_outcomes.iter().all(|o| o.verdict.is_passed())
    }

    pub fn channel(&self, channel_name: &str) -> Option<&ChannelResult> {
        self.channels
            .iter()
            .find(|channel| channel.channel_name == channel_name)
    }

    pub fn metric_outcomes_for<'a>(
        &'a self,
        metric_name: &'a str,
    ) -> impl Iterator<Item = &'a MetricOutcome> + 'a {
        self.metric_outcomes
            .iter()
            .filter(move |outcome| outcome.metric_name == metric_name)
    }
}
