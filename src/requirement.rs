//! Requirement model and the pure evaluator deciding pass/fail for one value
//!
//! ## Evaluation Rules
//!
//! ```text
//! Scalar target:
//!   "=" / "!="         → |value - target| <= tolerance counts as equal
//!   "<" "<=" ">" ">="  → exact ordering against target
//!
//! Range target {min?, max?}:
//!   "="   → min - tol <= value <= max + tol
//!   "!="  → outside the padded range
//!   "<"   → lower bound padded, value < max
//!   "<="  → lower bound padded, value <= max
//!   ">"   → value > min, upper bound padded
//!   ">="  → value >= min, upper bound padded
//! ```
//!
//! Evaluation never mutates anything, so the same inputs always produce the same verdict.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tolerance applied when a requirement does not configure one
pub const DEFAULT_TOLERANCE: f64 = 0.05;

pub const VALUE_NOT_NUMERIC: &str = "value not numeric";
pub const NON_NUMERIC_TARGET: &str = "non-numeric target";

/// Relational operator used when comparing an observed value against a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Comparator {
    #[default]
    #[serde(rename = "=", alias = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        };
        f.write_str(symbol)
    }
}

/// How a requirement is applied to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Every observed value is evaluated
    Exists,
    /// Every observed value is evaluated and the verdict is inverted
    Absent,
    /// The aggregate (message count or metric value) is evaluated once
    Total,
}

/// What an observed value is compared against
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Target {
    Scalar(f64),
    Range { min: Option<f64>, max: Option<f64> },
}

/// A declarative pass/fail rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Requirement {
    pub mode: Mode,
    pub target: Target,
    pub comparator: Comparator,
    pub tolerance: f64,

    /// Once failed, stays failed for the rest of the cycle
    pub temporal_consistency: bool,

    /// Only observations at least this long after the cycle start are evaluated
    pub timein: Option<Duration>,

    /// Only observations at most this long after the cycle start are evaluated
    pub timeout: Option<Duration>,

    /// Dotted path selecting the number inside a structured value
    pub field: Option<String>,
}

impl Requirement {
    /// Create a requirement with the channel defaults
    pub fn new(target: Target) -> Self {
        Self {
            mode: Mode::Exists,
            target,
            comparator: Comparator::default(),
            tolerance: DEFAULT_TOLERANCE,
            temporal_consistency: false,
            timein: None,
            timeout: None,
            field: None,
        }
    }

    pub fn scalar(target: f64) -> Self {
        Self::new(Target::Scalar(target))
    }

    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        Self::new(Target::Range { min, max })
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_temporal_consistency(mut self, temporal_consistency: bool) -> Self {
        self.temporal_consistency = temporal_consistency;
        self
    }

    pub fn with_window(mut self, timein: Option<Duration>, timeout: Option<Duration>) -> Self {
        self.timein = timein;
        self.timeout = timeout;
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Whether an observation received `elapsed` after the cycle start is inside the window
    pub fn in_window(&self, elapsed: Duration) -> bool {
        self.timein.is_none_or(|timein| elapsed >= timein)
            && self.timeout.is_none_or(|timeout| elapsed <= timeout)
    }
}

/// Result of evaluating one value against one requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    Invalid(String),
}

impl Verdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Verdict::Invalid(_))
    }

    fn from_check(passed: bool) -> Self {
        if passed {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }

    fn invert(self) -> Self {
        match self {
            Verdict::Passed => Verdict::Failed,
            Verdict::Failed => Verdict::Passed,
            invalid => invalid,
        }
    }
}

/// Evaluate a (possibly structured) observed value against a requirement
pub fn evaluate(value: &Value, requirement: &Requirement) -> Verdict {
    let observed = match requirement.field.as_deref() {
        Some(path) => extract_field(value, path),
        None => Some(value),
    };

    match observed.and_then(Value::as_f64) {
        Some(number) => evaluate_numeric(number, requirement),
        None => Verdict::Invalid(VALUE_NOT_NUMERIC.to_string()),
    }
}

/// Evaluate a number against a requirement
pub fn evaluate_numeric(value: f64, requirement: &Requirement) -> Verdict {
    if value.is_nan() {
        return Verdict::Invalid(VALUE_NOT_NUMERIC.to_string());
    }

    let tolerance = requirement.tolerance;
    let verdict = match requirement.target {
        Target::Scalar(target) if target.is_nan() => {
            return Verdict::Invalid(NON_NUMERIC_TARGET.to_string());
        }
        Target::Scalar(target) => {
            Verdict::from_check(compare_scalar(value, target, tolerance, requirement.comparator))
        }
        Target::Range { min, max } => {
            let bounds_numeric = min.is_some() || max.is_some();
            if !bounds_numeric || min.is_some_and(f64::is_nan) || max.is_some_and(f64::is_nan) {
                return Verdict::Invalid(NON_NUMERIC_TARGET.to_string());
            }
            Verdict::from_check(compare_range(value, min, max, tolerance, requirement.comparator))
        }
    };

    match requirement.mode {
        Mode::Absent => verdict.invert(),
        Mode::Exists | Mode::Total => verdict,
    }
}

fn compare_scalar(value: f64, target: f64, tolerance: f64, comparator: Comparator) -> bool {
    match comparator {
        Comparator::Eq => (value - target).abs() <= tolerance,
        Comparator::Ne => (value - target).abs() > tolerance,
        Comparator::Lt => value < target,
        Comparator::Le => value <= target,
        Comparator::Gt => value > target,
        Comparator::Ge => value >= target,
    }
}

fn compare_range(
    value: f64,
    min: Option<f64>,
    max: Option<f64>,
    tolerance: f64,
    comparator: Comparator,
) -> bool {
    let lower_padded = min.is_none_or(|min| value >= min - tolerance);
    let upper_padded = max.is_none_or(|max| value <= max + tolerance);

    match comparator {
        Comparator::Eq => lower_padded && upper_padded,
        Comparator::Ne => !(lower_padded && upper_padded),
        Comparator::Lt => lower_padded && max.is_none_or(|max| value < max),
        Comparator::Le => lower_padded && max.is_none_or(|max| value <= max),
        Comparator::Gt => min.is_none_or(|min| value > min) && upper_padded,
        Comparator::Ge => min.is_none_or(|min| value >= min) && upper_padded,
    }
}

/// Follow a dotted path (`linear.x`, `points.0`) into a structured value
fn extract_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}
