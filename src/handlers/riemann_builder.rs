//! Builder for [`RiemannTarget`](crate::riemann::RiemannTarget).
//!
//! Exposes endpoint selection, timeout tuning, TLS validation, host identity
//! and event conversion overrides. Every default is resolved when the
//! configuration is built; building performs no network I/O until
//! [`build_inner`](HandlerBuilderTrait::build_inner) connects.

use std::{fmt, sync::Arc, time::Duration};

use crate::riemann::{
    AttributeMapper, CertificateValidator, ConnectionFactory, Endpoint, LogConverter,
    MeasurementConverter, RiemannConfig, RiemannTarget, default_log_converter,
    default_measurement_converter, event::stringify_attributes, local_hostname,
};

use super::{HandlerBuildError, HandlerBuilderTrait};

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(HandlerBuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

#[derive(Clone, Default)]
struct TlsConfig {
    validator: Option<Arc<dyn CertificateValidator>>,
    domain: Option<String>,
}

/// Builder for constructing [`RiemannTarget`] instances.
#[derive(Clone, Default)]
pub struct RiemannTargetBuilder {
    endpoint: Option<Endpoint>,
    capacity: Option<usize>,
    connect_timeout_ms: Option<u64>,
    io_timeout_ms: Option<u64>,
    no_io_timeout: bool,
    ack_timeout_ms: Option<u64>,
    max_frame_size: Option<usize>,
    tls: TlsConfig,
    connection_factory: Option<ConnectionFactory>,
    hostname: Option<String>,
    tags: Vec<String>,
    ttl_secs: Option<f32>,
    attribute_mapper: Option<AttributeMapper>,
    log_converter: Option<LogConverter>,
    measurement_converter: Option<MeasurementConverter>,
}

impl RiemannTargetBuilder {
    /// Create a builder targeting the default local endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send events to `host:port` over TCP.
    pub fn with_tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.endpoint = Some(Endpoint::new(host, port));
        self
    }

    /// Negotiate TLS and let `validator` decide whether to trust the server.
    pub fn with_tls(mut self, validator: Arc<dyn CertificateValidator>) -> Self {
        self.tls.validator = Some(validator);
        self
    }

    /// Name presented during the TLS handshake; defaults to the host.
    pub fn with_tls_domain(mut self, domain: impl Into<String>) -> Self {
        self.tls.domain = Some(domain.into());
        self
    }

    /// Replace the standard TCP/TLS connection factory.
    pub fn with_connection_factory(mut self, factory: ConnectionFactory) -> Self {
        self.connection_factory = Some(factory);
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Append a tag sent with every event ahead of per-record tags.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Disable the read/write timeout so a silent server blocks the worker
    /// indefinitely.
    pub fn without_io_timeout(mut self) -> Self {
        self.no_io_timeout = true;
        self.io_timeout_ms = None;
        self
    }

    option_setter!(
        #[doc = "Set the bounded inbox capacity."]
        with_capacity,
        capacity,
        usize
    );
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(
        #[doc = "Bound each request/response round trip."]
        with_io_timeout_ms,
        io_timeout_ms,
        u64
    );
    option_setter!(with_ack_timeout_ms, ack_timeout_ms, u64);
    option_setter!(with_max_frame_size, max_frame_size, usize);
    option_setter!(
        #[doc = "Seconds the server should consider each event valid."]
        with_ttl_secs,
        ttl_secs,
        f32
    );
    option_setter!(
        #[doc = "Override how record data becomes event attributes."]
        with_attribute_mapper,
        attribute_mapper,
        AttributeMapper
    );
    option_setter!(
        #[doc = "Override the whole log record to event conversion."]
        with_log_converter,
        log_converter,
        LogConverter
    );
    option_setter!(
        #[doc = "Override the whole measurement to event conversion."]
        with_measurement_converter,
        measurement_converter,
        MeasurementConverter
    );

    fn validate(&self) -> Result<(), HandlerBuildError> {
        self.validate_endpoint()?;
        self.validate_sizes()?;
        self.validate_timeouts()?;
        self.validate_identity()?;
        Ok(())
    }

    fn validate_endpoint(&self) -> Result<(), HandlerBuildError> {
        if let Some(endpoint) = &self.endpoint {
            if endpoint.host.trim().is_empty() {
                return Err(HandlerBuildError::InvalidConfig(
                    "tcp host must not be empty".into(),
                ));
            }
            ensure_positive!(endpoint.port, "port")?;
        }
        Ok(())
    }

    fn validate_sizes(&self) -> Result<(), HandlerBuildError> {
        if let Some(capacity) = self.capacity {
            ensure_positive!(capacity, "capacity")?;
        }
        if let Some(size) = self.max_frame_size {
            ensure_positive!(size, "max_frame_size")?;
        }
        Ok(())
    }

    fn validate_timeouts(&self) -> Result<(), HandlerBuildError> {
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.io_timeout_ms {
            ensure_positive!(timeout, "io_timeout_ms")?;
        }
        if let Some(timeout) = self.ack_timeout_ms {
            ensure_positive!(timeout, "ack_timeout_ms")?;
        }
        Ok(())
    }

    fn validate_identity(&self) -> Result<(), HandlerBuildError> {
        if let Some(ttl) = self.ttl_secs
            && !(ttl.is_finite() && ttl > 0.0)
        {
            return Err(HandlerBuildError::InvalidConfig(format!(
                "ttl_secs must be a positive number, got {ttl}"
            )));
        }
        if let Some(hostname) = &self.hostname
            && hostname.trim().is_empty()
        {
            return Err(HandlerBuildError::InvalidConfig(
                "hostname must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Validate the settings and resolve every default.
    pub fn build_config(&self) -> Result<RiemannConfig, HandlerBuildError> {
        self.validate()?;
        let mut config = RiemannConfig::default();
        self.apply_connection_fields(&mut config);
        self.apply_identity(&mut config);
        Ok(config)
    }

    fn apply_connection_fields(&self, config: &mut RiemannConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.connect.endpoint = endpoint.clone();
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.connect.connect_timeout = Duration::from_millis(timeout);
        }
        if self.no_io_timeout {
            config.connect.io_timeout = None;
        } else if let Some(timeout) = self.io_timeout_ms {
            config.connect.io_timeout = Some(Duration::from_millis(timeout));
        }
        config.connect.validator = self.tls.validator.clone();
        config.connect.tls_domain = self.tls.domain.clone();
        if let Some(factory) = &self.connection_factory {
            config.connection_factory = Arc::clone(factory);
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(timeout) = self.ack_timeout_ms {
            config.ack_timeout = Duration::from_millis(timeout);
        }
        if let Some(size) = self.max_frame_size {
            config.max_frame_size = size;
        }
    }

    fn apply_identity(&self, config: &mut RiemannConfig) {
        let hostname = self.hostname.clone().unwrap_or_else(local_hostname);
        let ttl = self.ttl_secs.unwrap_or(config.ttl);
        let mapper = self
            .attribute_mapper
            .clone()
            .unwrap_or_else(|| Arc::new(stringify_attributes));

        config.log_converter = self.log_converter.clone().unwrap_or_else(|| {
            default_log_converter(hostname.clone(), ttl, self.tags.clone(), mapper)
        });
        config.measurement_converter = self.measurement_converter.clone().unwrap_or_else(|| {
            default_measurement_converter(hostname.clone(), ttl, self.tags.clone())
        });
        config.hostname = hostname;
        config.ttl = ttl;
        config.tags = self.tags.clone();
    }
}

impl HandlerBuilderTrait for RiemannTargetBuilder {
    type Handler = RiemannTarget;

    fn build_inner(&self) -> Result<Self::Handler, HandlerBuildError> {
        let config = self.build_config()?;
        Ok(RiemannTarget::with_config(config)?)
    }
}

impl fmt::Debug for RiemannTargetBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiemannTargetBuilder")
            .field("endpoint", &self.endpoint)
            .field("capacity", &self.capacity)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("io_timeout_ms", &self.io_timeout_ms)
            .field("no_io_timeout", &self.no_io_timeout)
            .field("ack_timeout_ms", &self.ack_timeout_ms)
            .field("max_frame_size", &self.max_frame_size)
            .field("tls", &self.tls.validator.is_some())
            .field("tls_domain", &self.tls.domain)
            .field("custom_factory", &self.connection_factory.is_some())
            .field("hostname", &self.hostname)
            .field("tags", &self.tags)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}
