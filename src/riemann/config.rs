//! Configuration consumed by the Riemann target lifecycle.
//!
//! `RiemannTargetBuilder` constructs these values before passing them to
//! [`RiemannTarget`](super::RiemannTarget) for runtime use. A config holds
//! factories and conversion functions, never live resources, so it can be
//! cloned and shared across any number of targets.

use std::{env, fmt, fs, sync::Arc, time::Duration};

use crate::{
    log_record::LogRecord, measurement::Measurement, rate_limited_warner::DEFAULT_WARN_INTERVAL,
};

use super::{
    event::{self, AttributeMapper, Event},
    transport::{ConnectOptions, ConnectionFactory, Endpoint, default_factory},
};

/// Default bounded channel capacity used by the target.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
/// Default connection timeout applied when establishing sockets.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read and write timeout for one request/response round trip.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);
/// Default maximum frame size (in bytes) for requests and responses.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 20; // 1 MiB
/// Default time callers wait for the worker to acknowledge flush or shutdown.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);
/// Default event time-to-live in seconds.
pub const DEFAULT_TTL_SECS: f32 = 10.0;
/// Hostname reported when the machine name cannot be determined.
pub const FALLBACK_HOSTNAME: &str = "localhost";

/// Builds the event for a log record.
pub type LogConverter = Arc<dyn Fn(&LogRecord) -> Event + Send + Sync>;
/// Builds the event for a measurement.
pub type MeasurementConverter = Arc<dyn Fn(&Measurement) -> Event + Send + Sync>;

/// Name of the local machine.
///
/// Consults `HOSTNAME`, then `COMPUTERNAME`, then `/etc/hostname`, falling
/// back to [`FALLBACK_HOSTNAME`].
pub fn local_hostname() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .into_iter()
        .filter_map(|key| env::var(key).ok())
        .chain(fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_owned())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_HOSTNAME.to_owned())
}

/// The standard log conversion bound to a host identity.
pub fn default_log_converter(
    hostname: String,
    ttl: f32,
    tags: Vec<String>,
    attribute_mapper: AttributeMapper,
) -> LogConverter {
    Arc::new(move |record: &LogRecord| {
        event::from_log(&hostname, ttl, &tags, &*attribute_mapper, record)
    })
}

/// The standard measurement conversion bound to a host identity.
pub fn default_measurement_converter(
    hostname: String,
    ttl: f32,
    tags: Vec<String>,
) -> MeasurementConverter {
    Arc::new(move |measurement: &Measurement| {
        event::from_measurement(&hostname, ttl, &tags, measurement)
    })
}

/// Configuration object describing how to construct a
/// [`RiemannTarget`](super::RiemannTarget).
///
/// The conversion functions are bound to `hostname`, `ttl` and `tags` when
/// the config is built; changing those fields afterwards does not rebind
/// them. Use the builder to change host identity.
#[derive(Clone)]
pub struct RiemannConfig {
    pub connect: ConnectOptions,
    pub connection_factory: ConnectionFactory,
    pub capacity: usize,
    pub max_frame_size: usize,
    pub hostname: String,
    pub tags: Vec<String>,
    pub ttl: f32,
    pub log_converter: LogConverter,
    pub measurement_converter: MeasurementConverter,
    pub warn_interval: Duration,
    pub ack_timeout: Duration,
}

impl Default for RiemannConfig {
    fn default() -> Self {
        let hostname = local_hostname();
        let attribute_mapper: AttributeMapper = Arc::new(event::stringify_attributes);
        Self {
            connect: ConnectOptions {
                endpoint: Endpoint::default(),
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
                io_timeout: Some(DEFAULT_IO_TIMEOUT),
                validator: None,
                tls_domain: None,
            },
            connection_factory: default_factory(),
            capacity: DEFAULT_CHANNEL_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            log_converter: default_log_converter(
                hostname.clone(),
                DEFAULT_TTL_SECS,
                Vec::new(),
                attribute_mapper,
            ),
            measurement_converter: default_measurement_converter(
                hostname.clone(),
                DEFAULT_TTL_SECS,
                Vec::new(),
            ),
            hostname,
            tags: Vec::new(),
            ttl: DEFAULT_TTL_SECS,
            warn_interval: DEFAULT_WARN_INTERVAL,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

impl RiemannConfig {
    /// Override the connection factory.
    pub fn with_connection_factory(mut self, factory: ConnectionFactory) -> Self {
        self.connection_factory = factory;
        self
    }
}

impl fmt::Debug for RiemannConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiemannConfig")
            .field("connect", &self.connect)
            .field("capacity", &self.capacity)
            .field("max_frame_size", &self.max_frame_size)
            .field("hostname", &self.hostname)
            .field("tags", &self.tags)
            .field("ttl", &self.ttl)
            .field("warn_interval", &self.warn_interval)
            .field("ack_timeout", &self.ack_timeout)
            .finish_non_exhaustive()
    }
}
