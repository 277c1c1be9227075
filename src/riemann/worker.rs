//! Worker thread driving the Riemann connection.
//!
//! The worker is a small state machine that owns exactly one [`Connection`].
//! It blocks on its inbox, handles one command at a time and stops for good
//! on the first transport fault: there is no reconnect and no retry.

use std::{
    io::Write,
    slice,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{
    Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError, bounded,
};
use log::{debug, error, warn};

use crate::{
    handler::HandlerError, log_record::LogRecord, measurement::Measurement,
    rate_limited_warner::RateLimitedWarner,
};

use super::{
    config::{LogConverter, MeasurementConverter, RiemannConfig},
    error::TransportError,
    event::Event,
    proto::{encode_events, read_response},
    transport::Connection,
};

/// Commands processed by the worker thread.
#[derive(Debug)]
pub enum RiemannCommand {
    Log(LogRecord),
    Measurement(Measurement),
    Flush(Sender<()>),
    Shutdown(Sender<()>),
}

/// Exit status of the worker thread.
pub type WorkerResult = Result<(), TransportError>;

enum ActorState {
    Running(Connection),
    ShuttingDown {
        connection: Connection,
        ack: Option<Sender<()>>,
    },
    Stopped,
}

struct Worker {
    log_converter: LogConverter,
    measurement_converter: MeasurementConverter,
    max_frame_size: usize,
}

/// Connect, then start the worker thread.
///
/// The connection is established before this returns, so no command can
/// reach the worker before it is ready. A failure to connect is returned to
/// the caller and no thread is started.
pub fn spawn_worker(
    config: RiemannConfig,
) -> Result<(Sender<RiemannCommand>, JoinHandle<WorkerResult>), TransportError> {
    let connection =
        (config.connection_factory)(&config.connect).map_err(TransportError::Connect)?;
    debug!("RiemannTarget connected to {}", config.connect.endpoint);
    let (tx, rx) = bounded(config.capacity);
    let worker = Worker {
        log_converter: config.log_converter,
        measurement_converter: config.measurement_converter,
        max_frame_size: config.max_frame_size,
    };
    let handle = thread::Builder::new()
        .name("riemann-target".into())
        .spawn(move || worker.run(connection, rx))?;
    Ok((tx, handle))
}

impl Worker {
    fn run(self, connection: Connection, rx: Receiver<RiemannCommand>) -> WorkerResult {
        let mut state = ActorState::Running(connection);
        loop {
            state = match state {
                ActorState::Running(connection) => self.step(connection, &rx)?,
                ActorState::ShuttingDown { connection, ack } => {
                    dispose(connection);
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                    debug!("RiemannTarget stopped");
                    ActorState::Stopped
                }
                ActorState::Stopped => return Ok(()),
            };
        }
    }

    fn step(
        &self,
        mut connection: Connection,
        rx: &Receiver<RiemannCommand>,
    ) -> Result<ActorState, TransportError> {
        let event = match rx.recv() {
            Ok(RiemannCommand::Log(record)) => (self.log_converter)(&record),
            Ok(RiemannCommand::Measurement(measurement)) => {
                (self.measurement_converter)(&measurement)
            }
            Ok(RiemannCommand::Flush(ack)) => {
                // Ignore send error: the caller may have given up waiting.
                let _ = ack.send(());
                return Ok(ActorState::Running(connection));
            }
            Ok(RiemannCommand::Shutdown(ack)) => {
                return Ok(ActorState::ShuttingDown {
                    connection,
                    ack: Some(ack),
                });
            }
            Err(_) => {
                return Ok(ActorState::ShuttingDown {
                    connection,
                    ack: None,
                });
            }
        };

        if let Err(err) = self.deliver(&mut connection, &event) {
            error!("RiemannTarget stopping after transport fault: {err}");
            dispose(connection);
            discard_pending(rx);
            return Err(err);
        }
        Ok(ActorState::Running(connection))
    }

    /// Send a single-event request and wait for the server's verdict.
    fn deliver(&self, connection: &mut Connection, event: &Event) -> WorkerResult {
        let frame = encode_events(slice::from_ref(event), self.max_frame_size)?;
        connection.stream.write_all(&frame)?;
        connection.stream.flush()?;
        let response = read_response(&mut *connection.stream, self.max_frame_size)?;
        if response.ok {
            Ok(())
        } else {
            Err(TransportError::Server(response.error.unwrap_or_default()))
        }
    }
}

/// Close the stream, then the socket. A failure closing one does not stop
/// the other from being closed.
fn dispose(mut connection: Connection) {
    if let Err(err) = connection.stream.close() {
        warn!("RiemannTarget failed to close stream: {err}");
    }
    if let Err(err) = connection.socket.close() {
        warn!("RiemannTarget failed to close socket: {err}");
    }
}

/// Drop every queued command so callers waiting on an ack see the worker
/// has stopped instead of timing out.
fn discard_pending(rx: &Receiver<RiemannCommand>) {
    let discarded = rx.try_iter().count();
    if discarded > 0 {
        warn!("RiemannTarget discarded {discarded} queued commands after fault");
    }
}

pub fn enqueue(
    tx: &Sender<RiemannCommand>,
    command: RiemannCommand,
    warner: &RateLimitedWarner,
) -> Result<(), HandlerError> {
    match tx.try_send(command) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            warner.record_drop();
            warner.warn_if_due(|count| {
                warn!("RiemannTarget queue full; dropped {count} commands");
            });
            Err(HandlerError::QueueFull)
        }
        Err(TrySendError::Disconnected(_)) => {
            warner.record_drop();
            warner.warn_if_due(|count| {
                warn!("RiemannTarget stopped; dropped {count} commands");
            });
            Err(HandlerError::Closed)
        }
    }
}

/// Why an acknowledged command did not complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckError {
    /// The worker has stopped and will never answer.
    Stopped,
    /// The worker did not answer in time.
    TimedOut,
}

/// Send a command carrying an acknowledgement channel and wait for the ack.
///
/// The total wait, including time spent queueing the command, is bounded by
/// `timeout`.
pub fn request_ack(
    tx: &Sender<RiemannCommand>,
    make_command: impl FnOnce(Sender<()>) -> RiemannCommand,
    timeout: Duration,
) -> Result<(), AckError> {
    let deadline = Instant::now() + timeout;
    let (ack_tx, ack_rx) = bounded(1);
    match tx.send_timeout(make_command(ack_tx), timeout) {
        Ok(()) => {}
        Err(SendTimeoutError::Disconnected(_)) => return Err(AckError::Stopped),
        Err(SendTimeoutError::Timeout(_)) => return Err(AckError::TimedOut),
    }
    let remaining = deadline.saturating_duration_since(Instant::now());
    match ack_rx.recv_timeout(remaining) {
        Ok(()) => Ok(()),
        Err(RecvTimeoutError::Disconnected) => Err(AckError::Stopped),
        Err(RecvTimeoutError::Timeout) => Err(AckError::TimedOut),
    }
}

pub fn flush_queue(tx: &Sender<RiemannCommand>, timeout: Duration) -> bool {
    request_ack(tx, RiemannCommand::Flush, timeout).is_ok()
}

/// Ask the worker to stop. Returns `false` only when the worker is still
/// running after `timeout`.
pub fn shutdown_worker(tx: &Sender<RiemannCommand>, timeout: Duration) -> bool {
    !matches!(
        request_ack(tx, RiemannCommand::Shutdown, timeout),
        Err(AckError::TimedOut)
    )
}
