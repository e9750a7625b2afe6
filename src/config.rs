use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::ConfigError;
use crate::metrics::MetricKey;
use crate::requirement::{Comparator, DEFAULT_TOLERANCE, Mode, Requirement, Target};

/// Configuration as written in the file, before defaults are resolved
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawConfig {
    pub target_name: String,

    /// Seconds between two presence polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,

    /// Seconds a channel may take to confirm its subscription
    #[serde(default = "default_subscribe_timeout")]
    pub subscribe_timeout: f64,

    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,

    /// Keep monitoring after a cycle ends and wait for the target to come back
    #[serde(default)]
    pub continuous: bool,

    #[serde(default)]
    pub channels: Vec<RawChannel>,

    #[serde(default)]
    pub metrics: Vec<RawMetric>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawChannel {
    pub channel: String,
    #[serde(default)]
    pub requirements: Vec<RawRequirement>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawMetric {
    pub metric: String,
    #[serde(default)]
    pub requirements: Vec<RawRequirement>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawRequirement {
    pub mode: Option<Mode>,
    pub target: Value,
    #[serde(default)]
    pub comparator: Comparator,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default)]
    pub temporal_consistency: bool,
    pub timein: Option<f64>,
    pub timeout: Option<f64>,
    pub field: Option<String>,
}

fn default_poll_interval() -> f64 {
    1.0
}

fn default_subscribe_timeout() -> f64 {
    5.0
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("./log")
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

/// A monitored channel and the requirements checked against its values
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub channel_name: String,
    pub requirements: Vec<Requirement>,
}

/// An aggregate metric and the requirements checked against it
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub metric_name: String,
    pub requirements: Vec<Requirement>,
}

/// Validated, immutable assessment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentConfig {
    pub target_name: String,
    pub poll_interval: Duration,
    pub subscribe_timeout: Duration,
    pub log_directory: PathBuf,
    pub continuous: bool,
    pub channels: Vec<ChannelSpec>,
    pub metrics: Vec<MetricSpec>,
}

impl AssessmentConfig {
    /// Configuration with defaults and no channels or metrics
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            poll_interval: Duration::from_secs_f64(default_poll_interval()),
            subscribe_timeout: Duration::from_secs_f64(default_subscribe_timeout()),
            log_directory: default_log_directory(),
            continuous: false,
            channels: vec![],
            metrics: vec![],
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_subscribe_timeout(mut self, subscribe_timeout: Duration) -> Self {
        self.subscribe_timeout = subscribe_timeout;
        self
    }

    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    pub fn with_channel(
        mut self,
        channel_name: impl Into<String>,
        requirements: Vec<Requirement>,
    ) -> Self {
        self.channels.push(ChannelSpec {
            channel_name: channel_name.into(),
            requirements,
        });
        self
    }

    pub fn with_metric(mut self, metric: MetricKey, requirements: Vec<Requirement>) -> Self {
        self.metrics.push(MetricSpec {
            metric_name: metric.as_str().to_string(),
            requirements,
        });
        self
    }
}

impl TryFrom<RawConfig> for AssessmentConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let target_name = raw.target_name.trim().to_string();
        if target_name.is_empty() {
            return Err(ConfigError::EmptyTargetName);
        }

        let poll_interval = positive_duration(raw.poll_interval, "setup", "poll_interval")?;
        let subscribe_timeout =
            positive_duration(raw.subscribe_timeout, "setup", "subscribe_timeout")?;

        let mut seen = HashSet::new();
        let mut channels = Vec::with_capacity(raw.channels.len());
        for channel in raw.channels {
            if !seen.insert(channel.channel.clone()) {
                return Err(ConfigError::DuplicateChannel(channel.channel));
            }

            let scope = format!("channel '{}'", channel.channel);
            channels.push(ChannelSpec {
                requirements: resolve_requirements(&scope, channel.requirements, Mode::Exists)?,
                channel_name: channel.channel,
            });
        }

        let mut seen = HashSet::new();
        let mut metrics = Vec::with_capacity(raw.metrics.len());
        for metric in raw.metrics {
            let key = metric
                .metric
                .parse::<MetricKey>()
                .map_err(ConfigError::UnknownMetric)?;
            if !seen.insert(key) {
                return Err(ConfigError::DuplicateMetric(metric.metric));
            }

            let scope = format!("metric '{}'", metric.metric);
            metrics.push(MetricSpec {
                requirements: resolve_requirements(&scope, metric.requirements, Mode::Total)?,
                metric_name: metric.metric,
            });
        }

        Ok(Self {
            target_name,
            poll_interval,
            subscribe_timeout,
            log_directory: raw.log_directory,
            continuous: raw.continuous,
            channels,
            metrics,
        })
    }
}

fn resolve_requirements(
    scope: &str,
    requirements: Vec<RawRequirement>,
    default_mode: Mode,
) -> Result<Vec<Requirement>, ConfigError> {
    requirements
        .into_iter()
        .enumerate()
        .map(|(index, raw)| resolve_requirement(scope, index + 1, raw, default_mode))
        .collect()
}

fn resolve_requirement(
    scope: &str,
    index: usize,
    raw: RawRequirement,
    default_mode: Mode,
) -> Result<Requirement, ConfigError> {
    let target = parse_target(&raw.target).map_err(|reason| ConfigError::InvalidTarget {
        scope: scope.to_string(),
        index,
        reason,
    })?;

    if raw.tolerance.is_nan() || raw.tolerance < 0.0 {
        return Err(ConfigError::NegativeTolerance {
            scope: scope.to_string(),
            index,
        });
    }

    let timein = raw
        .timein
        .map(|secs| duration(secs, scope, "timein"))
        .transpose()?;
    let timeout = raw
        .timeout
        .map(|secs| duration(secs, scope, "timeout"))
        .transpose()?;

    Ok(Requirement {
        mode: raw.mode.unwrap_or(default_mode),
        target,
        comparator: raw.comparator,
        tolerance: raw.tolerance,
        temporal_consistency: raw.temporal_consistency,
        timein,
        timeout,
        field: raw.field,
    })
}

/// Accepts `2.0`, `{"min": 1.0, "max": 3.0}` and `[{"min": 1.0}, {"max": 3.0}]`
fn parse_target(value: &Value) -> Result<Target, String> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .map(Target::Scalar)
            .ok_or_else(|| format!("{number} is not representable as a float")),
        Value::Object(bounds) => parse_bounds([bounds]),
        Value::Array(items) => {
            let bounds = items
                .iter()
                .map(|item| {
                    item.as_object()
                        .ok_or_else(|| format!("range entry {item} is not an object"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            parse_bounds(bounds)
        }
        other => Err(format!(
            "expected a number or a {{min, max}} range, got {other}"
        )),
    }
}

fn parse_bounds<'a>(maps: impl IntoIterator<Item = &'a Map<String, Value>>) -> Result<Target, String> {
    let mut min = None;
    let mut max = None;

    for (key, value) in maps.into_iter().flatten() {
        let bound = value
            .as_f64()
            .ok_or_else(|| format!("bound '{key}' is not numeric"))?;
        match key.as_str() {
            "min" => min = Some(bound),
            "max" => max = Some(bound),
            other => return Err(format!("unknown bound '{other}'")),
        }
    }

    if min.is_none() && max.is_none() {
        return Err("range needs at least one of min or max".to_string());
    }

    Ok(Target::Range { min, max })
}

fn duration(secs: f64, scope: &str, field: &'static str) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidDuration {
        scope: scope.to_string(),
        field,
    })
}

fn positive_duration(secs: f64, scope: &str, field: &'static str) -> Result<Duration, ConfigError> {
    match duration(secs, scope, field)? {
        Duration::ZERO => Err(ConfigError::InvalidDuration {
            scope: scope.to_string(),
            field,
        }),
        duration => Ok(duration),
    }
}

pub fn parse_config(content: &str) -> Result<AssessmentConfig, ConfigError> {
    let raw: RawConfig = serde_json::from_str(content)?;
    trace!("loaded raw config: {raw:?}");
    AssessmentConfig::try_from(raw)
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<AssessmentConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content).inspect(|config| trace!("loaded config: {config:?}"))
}
