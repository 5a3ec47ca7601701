//! In-process record pipe
//!
//! Behaves like a message queue between two threads of the same process:
//! bounded, record-preserving, blocking send. Used by the tests and for
//! running the bridge and peer in one process.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use bytes::Bytes;

use super::{InboundChannel, OutboundChannel, TransportError};

/// Sending end of a memory pipe
#[derive(Clone)]
pub struct PipeSender {
    tx: SyncSender<Bytes>,
}

/// Receiving end of a memory pipe
pub struct PipeReceiver {
    rx: Receiver<Bytes>,
}

/// Create a pipe holding at most `capacity` records in flight
pub fn pipe(capacity: usize) -> (PipeSender, PipeReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (PipeSender { tx }, PipeReceiver { rx })
}

impl PipeSender {
    /// Non-blocking send, for callers that would rather drop than wait
    pub fn try_send(&self, record: &[u8]) -> Result<(), TransportError> {
        self.tx
            .try_send(Bytes::copy_from_slice(record))
            .map_err(|e| match e {
                mpsc::TrySendError::Full(_) => TransportError::Full,
                mpsc::TrySendError::Disconnected(_) => TransportError::Disconnected,
            })
    }
}

impl OutboundChannel for PipeSender {
    fn send(&mut self, record: &[u8]) -> Result<(), TransportError> {
        self.tx
            .send(Bytes::copy_from_slice(record))
            .map_err(|_| TransportError::Disconnected)
    }
}

impl InboundChannel for PipeReceiver {
    fn recv(&mut self, poll: Duration) -> Result<Option<Bytes>, TransportError> {
        match self.rx.recv_timeout(poll) {
            Ok(record) => Ok(Some(record)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}
