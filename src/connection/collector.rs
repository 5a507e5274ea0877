use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, RecvTimeoutError},
    },
    time::Duration,
};

use crate::{Error, protocol::Response};

pub(crate) type Delivery = Result<Response, Error>;

/// Receiving end of one batch of one lane.
///
/// The reader thread is the only producer and the owning iterator the only
/// consumer. Messages come out in the order the server produced them; the
/// last one of a batch is a terminal message, after which the channel is
/// disconnected.
#[derive(Debug)]
pub struct Collector {
    receiver: Receiver<Delivery>,
    arrived: Arc<AtomicBool>,
}

impl Collector {
    pub(crate) fn new(receiver: Receiver<Delivery>, arrived: Arc<AtomicBool>) -> Self {
        Self { receiver, arrived }
    }

    /// Whether the first message of the batch has reached this collector.
    /// Never blocks and never consumes anything.
    pub fn has_arrived(&self) -> bool {
        self.arrived.load(Ordering::Acquire)
    }

    /// Waits up to `timeout` for the next message. A timeout leaves the
    /// collector untouched and may be retried.
    pub fn poll(&mut self, timeout: Duration) -> Result<Response, Error> {
        match self.receiver.recv_timeout(timeout) {
            Ok(delivery) => delivery,
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ConnectionClosed),
        }
    }

    /// Waits for the next message without a bound.
    pub fn take(&mut self) -> Result<Response, Error> {
        match self.receiver.recv() {
            Ok(delivery) => delivery,
            Err(_) => Err(Error::ConnectionClosed),
        }
    }
}
