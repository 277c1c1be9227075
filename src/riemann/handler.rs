//! Public target type exported by the crate.

use std::{thread::JoinHandle, time::Duration};

use crossbeam_channel::Sender;

use crate::{
    handler::{HandlerError, TargetTrait},
    log_record::LogRecord,
    measurement::Measurement,
    rate_limited_warner::RateLimitedWarner,
};

use super::{
    config::RiemannConfig,
    error::TransportError,
    transport::Endpoint,
    worker::{RiemannCommand, WorkerResult, enqueue, flush_queue, shutdown_worker, spawn_worker},
};

/// Target forwarding records and measurements to a Riemann server.
///
/// Each target owns one worker thread and one connection. Commands are
/// delivered strictly in submission order. The worker stops permanently on
/// the first transport fault; [`close`](Self::close) reports that fault.
pub struct RiemannTarget {
    tx: Option<Sender<RiemannCommand>>,
    handle: Option<JoinHandle<WorkerResult>>,
    warner: RateLimitedWarner,
    ack_timeout: Duration,
}

impl RiemannTarget {
    /// Connect to `endpoint` with the default configuration.
    pub fn new(endpoint: Endpoint) -> Result<Self, TransportError> {
        let mut config = RiemannConfig::default();
        config.connect.endpoint = endpoint;
        Self::with_config(config)
    }

    /// Connect using `config` and start the worker.
    ///
    /// Fails without starting a worker when the connection cannot be
    /// established.
    pub fn with_config(config: RiemannConfig) -> Result<Self, TransportError> {
        let ack_timeout = config.ack_timeout;
        let warner = RateLimitedWarner::new(config.warn_interval);
        let (tx, handle) = spawn_worker(config)?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            warner,
            ack_timeout,
        })
    }

    /// Wait until every previously enqueued command has been processed.
    pub fn flush(&self) -> bool {
        <Self as TargetTrait>::flush(self)
    }

    /// Shut the worker down and report how it ended.
    ///
    /// Returns the transport fault that stopped the worker, if any. Calling
    /// `close` again after it has returned yields `Ok(())`.
    pub fn close(&mut self) -> WorkerResult {
        let stopping = self.request_shutdown();
        let finished = self.handle.as_ref().is_none_or(JoinHandle::is_finished);
        if stopping || finished {
            self.join_worker()
        } else {
            log::warn!(
                "RiemannTarget: worker did not stop within {:?}; detaching",
                self.ack_timeout
            );
            self.handle = None;
            Ok(())
        }
    }

    fn sender(&self) -> Option<&Sender<RiemannCommand>> {
        self.tx.as_ref()
    }

    fn request_shutdown(&mut self) -> bool {
        let Some(tx) = self.tx.take() else {
            return true;
        };
        shutdown_worker(&tx, self.ack_timeout)
    }

    fn join_worker(&mut self) -> WorkerResult {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle.join().unwrap_or(Err(TransportError::WorkerPanicked))
    }

    fn send(&self, command: RiemannCommand) -> Result<(), HandlerError> {
        let Some(tx) = self.sender() else {
            self.warner.record_drop();
            self.warner.warn_if_due(|count| {
                log::warn!("RiemannTarget dropped {count} commands after shutdown");
            });
            return Err(HandlerError::Closed);
        };
        enqueue(tx, command, &self.warner)
    }
}

impl TargetTrait for RiemannTarget {
    fn log(&self, record: LogRecord) -> Result<(), HandlerError> {
        self.send(RiemannCommand::Log(record))
    }

    fn measure(&self, measurement: Measurement) -> Result<(), HandlerError> {
        self.send(RiemannCommand::Measurement(measurement))
    }

    fn flush(&self) -> bool {
        let Some(tx) = self.sender() else {
            return false;
        };
        self.warner.flush(|count| {
            log::warn!("RiemannTarget dropped {count} commands in the last interval");
        });
        flush_queue(tx, self.ack_timeout)
    }
}

impl Drop for RiemannTarget {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("RiemannTarget closed after fault: {err}");
        }
    }
}

impl std::fmt::Debug for RiemannTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiemannTarget")
            .field("closed", &self.tx.is_none())
            .field("ack_timeout", &self.ack_timeout)
            .finish()
    }
}
