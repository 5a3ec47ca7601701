//! ZeroMQ PUSH/PULL channels
//!
//! The bridge binds both sockets; the remote side connects. PUSH/PULL keeps
//! message boundaries, so one ZMQ message is one wire record.

use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use super::{InboundChannel, OutboundChannel, TransportError};

fn socket_err(e: zmq::Error) -> TransportError {
    TransportError::Socket(e.to_string())
}

fn open(ctx: &zmq::Context, kind: zmq::SocketType) -> Result<zmq::Socket, TransportError> {
    let socket = ctx.socket(kind).map_err(socket_err)?;
    // Don't hold the process open on exit with unsent records
    socket.set_linger(0).map_err(socket_err)?;
    Ok(socket)
}

/// PUSH socket carrying records out
pub struct ZmqOutbound {
    socket: zmq::Socket,
}

impl ZmqOutbound {
    pub fn bind(ctx: &zmq::Context, endpoint: &str) -> Result<Self, TransportError> {
        let socket = open(ctx, zmq::PUSH)?;
        socket.bind(endpoint).map_err(socket_err)?;
        debug!("outbound PUSH bound to {}", endpoint);
        Ok(Self { socket })
    }

    pub fn connect(ctx: &zmq::Context, endpoint: &str) -> Result<Self, TransportError> {
        let socket = open(ctx, zmq::PUSH)?;
        socket.connect(endpoint).map_err(socket_err)?;
        debug!("outbound PUSH connected to {}", endpoint);
        Ok(Self { socket })
    }
}

impl OutboundChannel for ZmqOutbound {
    fn send(&mut self, record: &[u8]) -> Result<(), TransportError> {
        self.socket.send(record, 0).map_err(socket_err)
    }
}

/// PULL socket carrying records in
pub struct ZmqInbound {
    socket: zmq::Socket,
}

impl ZmqInbound {
    pub fn bind(ctx: &zmq::Context, endpoint: &str) -> Result<Self, TransportError> {
        let socket = open(ctx, zmq::PULL)?;
        socket.bind(endpoint).map_err(socket_err)?;
        debug!("inbound PULL bound to {}", endpoint);
        Ok(Self { socket })
    }

    pub fn connect(ctx: &zmq::Context, endpoint: &str) -> Result<Self, TransportError> {
        let socket = open(ctx, zmq::PULL)?;
        socket.connect(endpoint).map_err(socket_err)?;
        debug!("inbound PULL connected to {}", endpoint);
        Ok(Self { socket })
    }
}

impl InboundChannel for ZmqInbound {
    fn recv(&mut self, poll: Duration) -> Result<Option<Bytes>, TransportError> {
        let ready = self
            .socket
            .poll(zmq::POLLIN, poll.as_millis() as i64)
            .map_err(socket_err)?;
        if ready == 0 {
            return Ok(None);
        }
        let record = self.socket.recv_bytes(0).map_err(socket_err)?;
        Ok(Some(Bytes::from(record)))
    }
}
