//! Timestamped MIDI events and byte-level message helpers
//!
//! An [`Event`] is the unit every other part of the bridge moves around: the
//! capture path copies device bytes into one, the input worker decodes one from
//! a wire record, the pool stores them and the heap orders them by time.
//! Events are plain `Copy` data with a fixed-size payload so they can live in
//! preallocated storage and cross the RT boundary without allocation.

use tracing::debug;

/// Maximum payload carried by a single event (bytes)
pub const MAX_EVENT_LEN: usize = 128;

/// A captured or scheduled MIDI event
///
/// `time` is the absolute scheduled time in frames since the bridge started.
/// It is fixed at construction; there is no setter.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Event {
    data: [u8; MAX_EVENT_LEN],
    len: u32,
    time: u64,
}

/// Error type for event construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("Payload too long: {0} bytes (max {MAX_EVENT_LEN})")]
    PayloadTooLong(usize),
}

impl Event {
    /// Copy `bytes` into a new event scheduled at `time`
    pub fn new(bytes: &[u8], time: u64) -> Result<Self, EventError> {
        if bytes.len() > MAX_EVENT_LEN {
            return Err(EventError::PayloadTooLong(bytes.len()));
        }
        let mut data = [0u8; MAX_EVENT_LEN];
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            data,
            len: bytes.len() as u32,
            time,
        })
    }

    /// The first `len` bytes of the payload
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Absolute scheduled time in frames
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Parse the payload as a channel message
    pub fn message(&self) -> Option<MidiMessage> {
        parse_midi_bytes(self.payload())
    }
}

impl Default for Event {
    fn default() -> Self {
        Self {
            data: [0u8; MAX_EVENT_LEN],
            len: 0,
            time: 0,
        }
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("payload", &self.payload())
            .field("time", &self.time)
            .finish()
    }
}

/// A decoded channel voice message
///
/// Only the kinds the bridge and peer act on are modelled. Anything else
/// (system messages, aftertouch, sysex) stays as raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    /// Also produced for a note-on with velocity 0
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    /// Raw 14-bit value, 0x2000 is centre
    PitchBend { channel: u8, value: u16 },
}

impl MidiMessage {
    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => channel,
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self, MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. })
    }

    /// Shift a note by `semitones`, clamped to 0..=127; other kinds unchanged
    pub fn transposed(self, semitones: i8) -> Self {
        let shift = |pitch: u8| (i16::from(pitch) + i16::from(semitones)).clamp(0, 127) as u8;
        match self {
            MidiMessage::NoteOn { channel, pitch, velocity } => MidiMessage::NoteOn {
                channel,
                pitch: shift(pitch),
                velocity,
            },
            MidiMessage::NoteOff { channel, pitch, velocity } => MidiMessage::NoteOff {
                channel,
                pitch: shift(pitch),
                velocity,
            },
            other => other,
        }
    }
}

/// Decode a channel voice message; `None` for other or truncated input
pub fn parse_midi_bytes(data: &[u8]) -> Option<MidiMessage> {
    let (&status, rest) = data.split_first()?;
    let channel = status & 0x0F;
    let message = match (status >> 4, rest) {
        (0x9, &[pitch, 0, ..]) => MidiMessage::NoteOff {
            channel,
            pitch,
            velocity: 0,
        },
        (0x9, &[pitch, velocity, ..]) => MidiMessage::NoteOn { channel, pitch, velocity },
        (0x8, &[pitch, velocity, ..]) => MidiMessage::NoteOff { channel, pitch, velocity },
        (0xB, &[controller, value, ..]) => MidiMessage::ControlChange {
            channel,
            controller,
            value,
        },
        (0xC, &[program, ..]) => MidiMessage::ProgramChange { channel, program },
        (0xE, &[lsb, msb, ..]) => MidiMessage::PitchBend {
            channel,
            value: (u16::from(msb & 0x7F) << 7) | u16::from(lsb & 0x7F),
        },
        _ => {
            debug!("Not a channel voice message: {:02X?}", data);
            return None;
        }
    };
    Some(message)
}

/// Encode a message back to its wire bytes
pub fn encode_midi_message(msg: &MidiMessage) -> Vec<u8> {
    let status = |kind: u8, channel: u8| (kind << 4) | (channel & 0x0F);
    match *msg {
        MidiMessage::NoteOn { channel, pitch, velocity } => {
            vec![status(0x9, channel), pitch, velocity]
        }
        MidiMessage::NoteOff { channel, pitch, velocity } => {
            vec![status(0x8, channel), pitch, velocity]
        }
        MidiMessage::ControlChange {
            channel,
            controller,
            value,
        } => vec![status(0xB, channel), controller, value],
        MidiMessage::ProgramChange { channel, program } => vec![status(0xC, channel), program],
        MidiMessage::PitchBend { channel, value } => vec![
            status(0xE, channel),
            (value & 0x7F) as u8,
            ((value >> 7) & 0x7F) as u8,
        ],
    }
}
