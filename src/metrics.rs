//! Aggregate metrics of one assessment cycle and their requirement checks

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::config::MetricSpec;
use crate::report::MetricOutcome;
use crate::requirement::{NON_NUMERIC_TARGET, Verdict, evaluate_numeric};

pub const UNKNOWN_METRIC: &str = "unknown metric";
pub const METRIC_UNDEFINED: &str = "metric undefined";
pub const SKIPPED_AFTER_INVALID_TARGET: &str = "skipped after invalid target";

/// The metrics the engine knows how to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKey {
    ExecutionTime,
    NumberOfMessages,
    Frequency,
}

impl MetricKey {
    pub const ALL: [MetricKey; 3] = [
        MetricKey::ExecutionTime,
        MetricKey::NumberOfMessages,
        MetricKey::Frequency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::ExecutionTime => "execution_time",
            MetricKey::NumberOfMessages => "number_of_messages",
            MetricKey::Frequency => "frequency",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Aggregate metrics; all zero / unset until a cycle ends
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Metrics {
    /// Seconds between the start and the end of the cycle
    pub execution_time: f64,

    /// Messages received across all channels that started
    pub number_of_messages: u64,

    /// Messages per second, `None` when the execution time is zero
    pub frequency: Option<f64>,
}

impl Metrics {
    pub fn compute(execution_time: f64, number_of_messages: u64) -> Self {
        let frequency = if execution_time > 0.0 {
            Some(number_of_messages as f64 / execution_time)
        } else {
            info!("execution time is {execution_time}s, frequency is undefined");
            None
        };

        Self {
            execution_time,
            number_of_messages,
            frequency,
        }
    }

    pub fn value(&self, key: MetricKey) -> Option<f64> {
        match key {
            MetricKey::ExecutionTime => Some(self.execution_time),
            MetricKey::NumberOfMessages => Some(self.number_of_messages as f64),
            MetricKey::Frequency => self.frequency,
        }
    }
}

pub struct MetricAssessor;

impl MetricAssessor {
    /// Evaluate every metric requirement, in configuration order
    ///
    /// Unknown or undefined metrics produce `Invalid` outcomes instead of aborting. An
    /// invalid target skips the remaining requirements of the same metric.
    #[instrument(skip_all)]
    pub fn assess(metrics: &Metrics, specs: &[MetricSpec]) -> Vec<MetricOutcome> {
        let mut outcomes = vec![];

        for spec in specs {
            let total = spec.requirements.len();

            let Ok(key) = spec.metric_name.parse::<MetricKey>() else {
                error!("metric '{}' not found", spec.metric_name);
                outcomes.extend((0..total).map(|index| MetricOutcome {
                    metric_name: spec.metric_name.clone(),
                    requirement_index: index,
                    verdict: Verdict::Invalid(UNKNOWN_METRIC.to_string()),
                }));
                continue;
            };

            info!(
                "assessing metric '{}' with {total} requirements",
                spec.metric_name
            );

            let value = metrics.value(key);
            let mut skip_remaining = false;

            for (index, requirement) in spec.requirements.iter().enumerate() {
                let verdict = match value {
                    _ if skip_remaining => {
                        Verdict::Invalid(SKIPPED_AFTER_INVALID_TARGET.to_string())
                    }
                    None => Verdict::Invalid(METRIC_UNDEFINED.to_string()),
                    Some(value) => evaluate_numeric(value, requirement),
                };

                if matches!(&verdict, Verdict::Invalid(reason) if reason == NON_NUMERIC_TARGET) {
                    skip_remaining = true;
                }

                let position = index + 1;
                match &verdict {
                    Verdict::Passed => info!(
                        "requirement {position} of {total} of metric '{key}' PASSED"
                    ),
                    Verdict::Failed => warn!(
                        "requirement {position} of {total} of metric '{key}' FAILED (value: {value:?})"
                    ),
                    Verdict::Invalid(reason) => error!(
                        "requirement {position} of {total} of metric '{key}' FAILED - {reason}"
                    ),
                }

                outcomes.push(MetricOutcome {
                    metric_name: spec.metric_name.clone(),
                    requirement_index: index,
                    verdict,
                });
            }
        }

        outcomes
    }
}
