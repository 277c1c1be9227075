//! Log record representation consumed by the event codec.
//!
//! Records are produced by the hosting logging pipeline and handed to the
//! target by value. Nothing in this crate mutates a record after it has been
//! enqueued.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::level::Level;

/// Hierarchical, dot-separated name of the component that produced a record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MetricPath(Vec<String>);

impl MetricPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for MetricPath {
    fn from(value: &str) -> Self {
        Self::new(value.split('.').filter(|s| !s.is_empty()))
    }
}

impl fmt::Display for MetricPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[derive(Clone, Debug)]
pub struct LogRecord {
    /// The log message content.
    pub message: String,
    /// Free-form structured data; insertion order is preserved.
    pub data: Map<String, Value>,
    pub level: Level,
    /// Tags appended after the target's configured tags.
    pub tags: Vec<String>,
    /// Time the record was created.
    pub timestamp: DateTime<Utc>,
    /// Name of the component that produced the record.
    pub path: MetricPath,
    /// Rendered error associated with the record, if any.
    pub error: Option<String>,
}

impl LogRecord {
    /// Construct a record at `path` with the current time and no data.
    pub fn new(path: impl Into<MetricPath>, level: Level, message: &str) -> Self {
        Self {
            message: message.to_owned(),
            data: Map::new(),
            level,
            tags: Vec::new(),
            timestamp: Utc::now(),
            path: path.into(),
            error: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Attach a structured datum; a repeated key keeps its original position.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_error(mut self, error: &dyn std::error::Error) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} - {}", self.level, self.path, self.message)
    }
}
