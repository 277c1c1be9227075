//! Ships log records and measurements to a Riemann server.
//!
//! Build a [`RiemannTarget`] with [`RiemannTargetBuilder`], then feed it
//! through [`TargetTrait`]. Each target owns a background worker and a single
//! TCP or TLS connection.

pub mod handler;
pub mod handlers;
pub mod level;
pub mod log_record;
pub mod measurement;
pub mod rate_limited_warner;
pub mod riemann;

pub use handler::{HandlerError, TargetTrait};
pub use handlers::{HandlerBuildError, HandlerBuilderTrait, RiemannTargetBuilder};
pub use level::{Level, ParseLevelError};
pub use log_record::{LogRecord, MetricPath};
pub use measurement::{MeasureValue, Measurement, Unit};
pub use riemann::{
    AttributeMapper, CertificateValidator, ConnectOptions, Connection, ConnectionFactory, Endpoint,
    Event, LogConverter, MeasurementConverter, PeerCertificate, PolicyErrors, RiemannConfig,
    RiemannTarget, State, TransportError, validator_fn,
};
