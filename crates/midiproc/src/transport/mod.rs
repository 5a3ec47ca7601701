//! One-directional byte channels to the remote process
//!
//! The bridge only needs two things from a transport: push a record out, and
//! wait a bounded time for a record to come in. Keeping the wait bounded lets
//! the input worker notice the shutdown flag without a separate wakeup path.

use std::time::Duration;

use bytes::Bytes;

pub mod memory;
#[cfg(feature = "zmq-transport")]
pub mod zmq;

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Channel disconnected")]
    Disconnected,

    #[error("Channel full")]
    Full,

    #[error("Socket error: {0}")]
    Socket(String),
}

/// Sending half (bridge -> remote)
pub trait OutboundChannel: Send {
    fn send(&mut self, record: &[u8]) -> Result<(), TransportError>;
}

/// Receiving half (remote -> bridge)
pub trait InboundChannel: Send {
    /// Wait up to `poll` for one record
    ///
    /// `Ok(None)` means nothing arrived in time. Any `Err` is treated as a
    /// dead channel by the caller.
    fn recv(&mut self, poll: Duration) -> Result<Option<Bytes>, TransportError>;
}

impl<T: OutboundChannel + ?Sized> OutboundChannel for Box<T> {
    fn send(&mut self, record: &[u8]) -> Result<(), TransportError> {
        (**self).send(record)
    }
}

impl<T: InboundChannel + ?Sized> InboundChannel for Box<T> {
    fn recv(&mut self, poll: Duration) -> Result<Option<Bytes>, TransportError> {
        (**self).recv(poll)
    }
}
