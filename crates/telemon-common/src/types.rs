use serde::{Deserialize, Serialize};

/// Aggregation kind of a metric.
///
/// Gauges keep the most recent value, counters accumulate every increment.
///
/// # Examples
///
/// ```
/// use telemon_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("histogram".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(ValidationError::UnknownKind(s.to_string())),
        }
    }
}

/// A named value tagged with its kind, as held by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    pub kind: MetricKind,
    pub value: f64,
}

impl Metric {
    pub fn new(kind: MetricKind, id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            value,
        }
    }
}

/// Structured form of a single metric, used both as the JSON push body and
/// as one line of the persisted log.
///
/// Exactly one of `delta` (counter) or `value` (gauge) is populated.
///
/// # Examples
///
/// ```
/// use telemon_common::types::{MetricKind, MetricPayload};
///
/// let payload = MetricPayload::new(MetricKind::Counter, "poll_count", 2.0);
/// assert_eq!(payload.delta, Some(2.0));
/// assert_eq!(payload.value, None);
/// assert_eq!(payload.amount().unwrap(), 2.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricPayload {
    pub fn new(kind: MetricKind, id: impl Into<String>, amount: f64) -> Self {
        let (delta, value) = match kind {
            MetricKind::Counter => (Some(amount), None),
            MetricKind::Gauge => (None, Some(amount)),
        };
        Self {
            id: id.into(),
            kind,
            delta,
            value,
        }
    }

    /// Returns the number carried for this payload's kind.
    pub fn amount(&self) -> Result<f64, ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingName);
        }
        match self.kind {
            MetricKind::Counter => self.delta.ok_or(ValidationError::MissingDelta),
            MetricKind::Gauge => self.value.ok_or(ValidationError::MissingValue),
        }
    }
}

impl From<&Metric> for MetricPayload {
    fn from(metric: &Metric) -> Self {
        MetricPayload::new(metric.kind, metric.id.clone(), metric.value)
    }
}

/// Boundary validation failures; nothing is mutated when one is raised.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown metric type '{0}', expected gauge or counter")]
    UnknownKind(String),

    #[error("metric name must not be empty")]
    MissingName,

    #[error("field 'delta' is required for counter metrics")]
    MissingDelta,

    #[error("field 'value' is required for gauge metrics")]
    MissingValue,

    #[error("invalid metric value '{0}'")]
    InvalidValue(String),
}

/// Parses a positional value segment such as `"527"` or `"1.5"`.
pub fn parse_value(raw: &str) -> Result<f64, ValidationError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::InvalidValue(raw.to_string()))
}
