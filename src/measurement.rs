//! Numeric measurements forwarded to the monitoring server.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::{level::Level, log_record::MetricPath};

/// Numeric payload of a [`Measurement`].
///
/// The concrete representation varies by producer; the event codec only
/// ever reads it through [`MeasureValue::as_f64`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MeasureValue {
    Int64(i64),
    Float(f64),
    /// Numerator over denominator. A zero denominator yields NaN or infinity.
    Fraction(i64, i64),
}

impl MeasureValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            MeasureValue::Int64(v) => v as f64,
            MeasureValue::Float(v) => v,
            MeasureValue::Fraction(n, d) => n as f64 / d as f64,
        }
    }
}

impl From<i64> for MeasureValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for MeasureValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Unit {
    #[default]
    Scalar,
    Seconds,
    Bytes,
    Percent,
    Other(String),
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Scalar => f.write_str("scalar"),
            Unit::Seconds => f.write_str("s"),
            Unit::Bytes => f.write_str("B"),
            Unit::Percent => f.write_str("%"),
            Unit::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Measurement {
    pub path: MetricPath,
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub unit: Unit,
    pub value: MeasureValue,
}

impl Measurement {
    /// Construct an `info` scalar measurement taken now.
    pub fn new(path: impl Into<MetricPath>, value: impl Into<MeasureValue>) -> Self {
        Self {
            path: path.into(),
            timestamp: Utc::now(),
            level: Level::Info,
            unit: Unit::Scalar,
            value: value.into(),
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Extract the numeric value regardless of its representation.
    pub fn value_f64(&self) -> f64 {
        self.value.as_f64()
    }
}
