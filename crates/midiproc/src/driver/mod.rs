//! What the bridge sees of the audio/MIDI host
//!
//! The host hands the callback a batch of input events for one period and a
//! writable output buffer. [`MidiPortBuffer`] is a preallocated output buffer
//! with midi-port semantics, used by the clocked host and by tests.

#[cfg(feature = "midir-driver")]
mod clocked;

#[cfg(feature = "midir-driver")]
pub use clocked::{ClockedMidiDriver, DriverConfig, DriverError};

/// One input event delivered for the current period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent<'a> {
    pub bytes: &'a [u8],
    /// Frames since the start of the period
    pub offset: u32,
}

impl<'a> InputEvent<'a> {
    pub fn new(bytes: &'a [u8], offset: u32) -> Self {
        Self { bytes, offset }
    }
}

/// Why an output reservation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReserveError {
    #[error("Output buffer has no room for {0} bytes")]
    NoSpace(usize),

    #[error("Output buffer event limit reached")]
    TooManyEvents,

    #[error("Offset {offset} outside period of {frames} frames")]
    OffsetOutOfRange { offset: u32, frames: u32 },

    #[error("Offset {offset} is earlier than last written offset {last}")]
    OutOfOrder { offset: u32, last: u32 },
}

/// Per-period output sink
///
/// Implementations must not block or allocate; `reserve` either copies the
/// bytes in at `offset` or fails.
pub trait OutputBuffer {
    fn reserve(&mut self, offset: u32, data: &[u8]) -> Result<(), ReserveError>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    offset: u32,
    start: usize,
    len: usize,
}

/// Fixed-capacity output buffer for one period
///
/// Events must be written in non-decreasing offset order, all within the
/// current period. Storage is reserved up front and reused across periods.
#[derive(Debug)]
pub struct MidiPortBuffer {
    data: Vec<u8>,
    entries: Vec<Entry>,
    byte_capacity: usize,
    max_events: usize,
    frames: u32,
}

impl MidiPortBuffer {
    pub fn new(byte_capacity: usize, max_events: usize) -> Self {
        Self {
            data: Vec::with_capacity(byte_capacity),
            entries: Vec::with_capacity(max_events),
            byte_capacity,
            max_events,
            frames: 0,
        }
    }

    /// Drop all events and start a period of `frames` frames
    pub fn clear(&mut self, frames: u32) {
        self.data.clear();
        self.entries.clear();
        self.frames = frames;
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Written events as `(offset, bytes)` in write order
    pub fn events(&self) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        self.entries
            .iter()
            .map(move |e| (e.offset, &self.data[e.start..e.start + e.len]))
    }
}

impl OutputBuffer for MidiPortBuffer {
    fn reserve(&mut self, offset: u32, data: &[u8]) -> Result<(), ReserveError> {
        if offset >= self.frames {
            return Err(ReserveError::OffsetOutOfRange {
                offset,
                frames: self.frames,
            });
        }
        if let Some(last) = self.entries.last() {
            if offset < last.offset {
                return Err(ReserveError::OutOfOrder {
                    offset,
                    last: last.offset,
                });
            }
        }
        if self.entries.len() >= self.max_events {
            return Err(ReserveError::TooManyEvents);
        }
        if self.data.len() + data.len() > self.byte_capacity {
            return Err(ReserveError::NoSpace(data.len()));
        }

        let start = self.data.len();
        self.data.extend_from_slice(data);
        self.entries.push(Entry {
            offset,
            start,
            len: data.len(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_read_back() {
        let mut buf = MidiPortBuffer::new(64, 8);
        buf.clear(256);
        buf.reserve(0, &[0x90, 60, 100]).unwrap();
        buf.reserve(10, &[0x80, 60, 0]).unwrap();

        let events: Vec<(u32, Vec<u8>)> = buf.events().map(|(o, b)| (o, b.to_vec())).collect();
        assert_eq!(
            events,
            vec![(0, vec![0x90, 60, 100]), (10, vec![0x80, 60, 0])]
        );
    }

    #[test]
    fn test_same_offset_allowed() {
        let mut buf = MidiPortBuffer::new(64, 8);
        buf.clear(16);
        buf.reserve(3, &[0x90, 60, 100]).unwrap();
        buf.reserve(3, &[0x90, 64, 100]).unwrap();
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_offset_past_period_rejected() {
        let mut buf = MidiPortBuffer::new(64, 8);
        buf.clear(16);
        assert_eq!(
            buf.reserve(16, &[0xF8]),
            Err(ReserveError::OffsetOutOfRange {
                offset: 16,
                frames: 16
            })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut buf = MidiPortBuffer::new(64, 8);
        buf.clear(64);
        buf.reserve(20, &[0xF8]).unwrap();
        assert_eq!(
            buf.reserve(5, &[0xF8]),
            Err(ReserveError::OutOfOrder {
                offset: 5,
                last: 20
            })
        );
    }

    #[test]
    fn test_byte_and_event_limits() {
        let mut buf = MidiPortBuffer::new(4, 8);
        buf.clear(64);
        buf.reserve(0, &[0x90, 60, 100]).unwrap();
        assert_eq!(buf.reserve(1, &[0x80, 60]), Err(ReserveError::NoSpace(2)));
        buf.reserve(1, &[0xF8]).unwrap();

        let mut buf = MidiPortBuffer::new(64, 1);
        buf.clear(64);
        buf.reserve(0, &[0xF8]).unwrap();
        assert_eq!(buf.reserve(0, &[0xF8]), Err(ReserveError::TooManyEvents));
    }

    #[test]
    fn test_clear_resets_period() {
        let mut buf = MidiPortBuffer::new(8, 2);
        buf.clear(32);
        buf.reserve(30, &[0xF8]).unwrap();
        buf.clear(32);
        assert!(buf.is_empty());
        buf.reserve(0, &[0xF8]).unwrap();
        assert_eq!(buf.frames(), 32);
    }
}
