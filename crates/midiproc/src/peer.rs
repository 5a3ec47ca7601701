//! The far side of the bridge
//!
//! Receives captured records, rewrites them and sends them back to be
//! scheduled. With the identity transform this is a plain echo, which turns
//! the bridge into a delay-free loopback.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::event::{encode_midi_message, Event};
use crate::shared::Shutdown;
use crate::transport::{InboundChannel, OutboundChannel, TransportError};
use crate::wire;

/// Rewrite applied to every record the peer echoes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerTransform {
    /// Semitones added to note-on/note-off pitches, clamped to 0..=127
    pub transpose: i8,
    /// Frames added to every scheduled time
    pub delay: u64,
}

impl PeerTransform {
    pub fn is_identity(&self) -> bool {
        self.transpose == 0 && self.delay == 0
    }

    pub fn apply(&self, event: &Event) -> Event {
        let time = event.time().saturating_add(self.delay);
        let transposed = match event.message() {
            Some(msg) if msg.is_note() && self.transpose != 0 => {
                Some(encode_midi_message(&msg.transposed(self.transpose)))
            }
            _ => None,
        };
        let payload = transposed.as_deref().unwrap_or(event.payload());

        // Encoded notes are 3 bytes, well under the payload limit
        Event::new(payload, time).unwrap_or(*event)
    }
}

/// Counters for one peer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerSummary {
    pub echoed: u64,
    pub malformed: u64,
}

/// Receive, transform, send back
#[derive(Debug)]
pub struct Peer<I, O> {
    inbound: I,
    outbound: O,
    transform: PeerTransform,
    poll: Duration,
}

impl<I: InboundChannel, O: OutboundChannel> Peer<I, O> {
    pub fn new(inbound: I, outbound: O, transform: PeerTransform) -> Self {
        Self {
            inbound,
            outbound,
            transform,
            poll: Duration::from_millis(100),
        }
    }

    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Loop until `shutdown` is raised or a channel fails
    pub fn run(&mut self, shutdown: &Shutdown) -> Result<PeerSummary, TransportError> {
        info!("Peer running with {:?}", self.transform);
        let mut summary = PeerSummary::default();

        while !shutdown.is_set() {
            let Some(record) = self.inbound.recv(self.poll)? else {
                continue;
            };
            let event = match wire::decode(&record) {
                Ok(event) => event,
                Err(e) => {
                    summary.malformed += 1;
                    warn!("Skipping malformed record: {}", e);
                    continue;
                }
            };

            let reply = self.transform.apply(&event);
            self.outbound.send(&wire::encode(&reply))?;
            summary.echoed += 1;
            debug!("Echoed {:?} -> {:?}", event, reply);
        }

        info!(
            "Peer stopped: {} echoed, {} malformed",
            summary.echoed, summary.malformed
        );
        Ok(summary)
    }
}
