//! Pure translation of log records and measurements into Riemann events.
//!
//! Nothing here performs I/O and every function is deterministic for a given
//! input, which keeps the codec trivially testable.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{level::Level, log_record::LogRecord, measurement::Measurement};

/// Service name used when an event has neither a path nor a message.
pub const UNNAMED_SERVICE: &str = "unnamed";

/// Health state reported for an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    Ok,
    Warning,
    Critical,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Ok => "ok",
            State::Warning => "warning",
            State::Critical => "critical",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One metric or state data point destined for the server.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub service_metric: f64,
    pub time_epoch_seconds: i64,
    pub state: State,
    pub service: String,
    pub host: String,
    pub description: String,
    pub tags: Vec<String>,
    pub ttl_seconds: f32,
    pub attributes: Vec<(String, String)>,
}

/// Converts a record's structured data into event attributes.
pub type AttributeMapper = Arc<dyn Fn(&Map<String, Value>) -> Vec<(String, String)> + Send + Sync>;

/// Map a severity level onto an event state.
pub fn severity_to_state(level: Level) -> State {
    match level {
        Level::Verbose | Level::Debug | Level::Info => State::Ok,
        Level::Warn => State::Warning,
        Level::Error | Level::Fatal => State::Critical,
    }
}

/// Whole seconds since the Unix epoch.
///
/// The wire format only carries second resolution, so anything finer is
/// dropped. Times before the epoch round towards negative infinity.
pub fn epoch_seconds(timestamp: &DateTime<Utc>) -> i64 {
    timestamp.timestamp()
}

/// Render every datum as a string, keeping insertion order.
///
/// String values are used verbatim; everything else is rendered as compact
/// JSON.
pub fn stringify_attributes(data: &Map<String, Value>) -> Vec<(String, String)> {
    data.iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}

fn concat_tags(default_tags: &[String], record_tags: &[String]) -> Vec<String> {
    let mut tags = Vec::with_capacity(default_tags.len() + record_tags.len());
    tags.extend_from_slice(default_tags);
    tags.extend_from_slice(record_tags);
    tags
}

/// `path.message`, or just the message when the path is empty. Falls back
/// to [`UNNAMED_SERVICE`] when both are empty.
fn log_service(record: &LogRecord) -> String {
    match (record.path.is_empty(), record.message.is_empty()) {
        (false, _) => format!("{}.{}", record.path, record.message),
        (true, false) => record.message.clone(),
        (true, true) => UNNAMED_SERVICE.to_owned(),
    }
}

/// Build the event describing a log record.
pub fn from_log(
    hostname: &str,
    ttl: f32,
    default_tags: &[String],
    attribute_mapper: &dyn Fn(&Map<String, Value>) -> Vec<(String, String)>,
    record: &LogRecord,
) -> Event {
    Event {
        service_metric: 0.0,
        time_epoch_seconds: epoch_seconds(&record.timestamp),
        state: severity_to_state(record.level),
        service: log_service(record),
        host: hostname.to_owned(),
        description: record.error.clone().unwrap_or_default(),
        tags: concat_tags(default_tags, &record.tags),
        ttl_seconds: ttl,
        attributes: attribute_mapper(&record.data),
    }
}

/// Build the event describing a measurement.
pub fn from_measurement(
    hostname: &str,
    ttl: f32,
    default_tags: &[String],
    measurement: &Measurement,
) -> Event {
    let service = if measurement.path.is_empty() {
        UNNAMED_SERVICE.to_owned()
    } else {
        measurement.path.to_string()
    };
    Event {
        service_metric: measurement.value_f64(),
        time_epoch_seconds: epoch_seconds(&measurement.timestamp),
        state: severity_to_state(measurement.level),
        service,
        host: hostname.to_owned(),
        description: String::new(),
        tags: default_tags.to_vec(),
        ttl_seconds: ttl,
        attributes: Vec::new(),
    }
}
