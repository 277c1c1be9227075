//! Target builders and associated traits.
//!
//! Provides a builder API for constructing targets in a type-safe manner.
//! Builders validate their settings before any connection is attempted and
//! implement [`HandlerBuilderTrait`].

use thiserror::Error;

use crate::riemann::TransportError;

pub mod riemann_builder;

pub use riemann_builder::RiemannTargetBuilder;

/// Errors that may occur while building a target.
#[derive(Debug, Error)]
pub enum HandlerBuildError {
    /// Invalid user supplied configuration.
    #[error("invalid target configuration: {0}")]
    InvalidConfig(String),
    /// The target could not connect to its server.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Trait implemented by all target builders.
pub trait HandlerBuilderTrait: Send + Sync {
    type Handler;

    /// Build the target, connecting it to its server.
    fn build_inner(&self) -> Result<Self::Handler, HandlerBuildError>;
}
