//! Failures that stop the transport actor.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket could not be opened, the TLS handshake failed or the
    /// certificate validator refused the peer.
    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),
    /// Writing the request or reading the response failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode server response: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
    /// The server answered with `ok = false`.
    #[error("server reported error: {0}")]
    Server(String),
    #[error("transport worker panicked")]
    WorkerPanicked,
}

impl TransportError {
    /// Text reported by the server, when this is a server-side error.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            TransportError::Server(msg) => Some(msg),
            _ => None,
        }
    }
}
