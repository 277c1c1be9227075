//! Riemann transport target.
//!
//! This module defines [`RiemannTarget`], which converts
//! [`LogRecord`](crate::log_record::LogRecord) and
//! [`Measurement`](crate::measurement::Measurement) values into Riemann
//! events and delivers them over a persistent TCP or TLS connection. A single
//! worker thread owns the connection, sends one event per command and waits
//! for the server's acknowledgement before taking the next command. A
//! server-reported error stops the worker; nothing is retried.

mod config;
pub mod event;
mod error;
mod handler;
pub mod proto;
pub mod transport;
mod worker;


pub use config::{
    DEFAULT_ACK_TIMEOUT, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IO_TIMEOUT,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_TTL_SECS, LogConverter, MeasurementConverter, RiemannConfig,
    default_log_converter, default_measurement_converter, local_hostname,
};
pub use error::TransportError;
pub use event::{AttributeMapper, Event, State};
pub use handler::RiemannTarget;
pub use transport::{
    CertificateValidator, ConnectOptions, Connection, ConnectionFactory, Duplex, Endpoint,
    PeerCertificate, PolicyErrors, SocketHandle, validator_fn,
};
