//! Duplicate note suppression for the emit path
//!
//! Overlapping note-ons for the same channel/pitch (legato lines, echoes from
//! the remote side) are reference counted. With suppression enabled only the
//! outermost pair reaches the device: the note-on that takes the count from 0
//! to 1 and the note-off that brings it back to 0.
//!
//! Runs inside the RT callback, so it works on raw status bytes and never logs.

/// Default table width (MIDI channels)
pub const CHANNELS: usize = 16;

/// Default table height (MIDI pitches)
pub const PITCHES: usize = 128;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;

/// Which repeated events get collapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterModes {
    /// Emit a note-on only for the first concurrently active instance
    pub suppress_note_on: bool,
    /// Emit a note-off only when the last overlapping instance is released
    pub suppress_note_off: bool,
}

impl FilterModes {
    pub fn both() -> Self {
        Self {
            suppress_note_on: true,
            suppress_note_off: true,
        }
    }
}

/// Per channel/pitch saturating counters
pub struct NoteFilter {
    counts: Box<[u8]>,
    channels: usize,
    pitches: usize,
    modes: FilterModes,
}

impl NoteFilter {
    /// Full 16 x 128 table
    pub fn new(modes: FilterModes) -> Self {
        Self::with_table(CHANNELS, PITCHES, modes)
    }

    /// Table covering only `channels` x `pitches`; notes outside are rejected
    pub fn with_table(channels: usize, pitches: usize, modes: FilterModes) -> Self {
        Self {
            counts: vec![0u8; channels * pitches].into_boxed_slice(),
            channels,
            pitches,
            modes,
        }
    }

    pub fn modes(&self) -> FilterModes {
        self.modes
    }

    /// Number of currently active instances of a note
    pub fn active(&self, channel: u8, pitch: u8) -> u8 {
        self.index(channel, pitch)
            .map(|idx| self.counts[idx])
            .unwrap_or(0)
    }

    /// Decide whether an event may go out, updating the counters
    pub fn should_emit(&mut self, bytes: &[u8]) -> bool {
        let Some(&status) = bytes.first() else {
            return false;
        };
        let kind = status & 0xF0;
        if kind != NOTE_ON && kind != NOTE_OFF {
            return true;
        }
        if bytes.len() < 3 {
            return false;
        }

        let channel = status & 0x0F;
        let pitch = bytes[1];
        let velocity = bytes[2];
        let Some(idx) = self.index(channel, pitch) else {
            return false;
        };

        if kind == NOTE_ON && velocity > 0 {
            self.note_on(idx)
        } else {
            self.note_off(idx)
        }
    }

    fn note_on(&mut self, idx: usize) -> bool {
        let count = &mut self.counts[idx];
        if *count == u8::MAX {
            return false;
        }
        *count += 1;
        if self.modes.suppress_note_on {
            *count == 1
        } else {
            true
        }
    }

    fn note_off(&mut self, idx: usize) -> bool {
        let count = &mut self.counts[idx];
        if *count == 0 {
            return false;
        }
        *count -= 1;
        if self.modes.suppress_note_off {
            *count == 0
        } else {
            true
        }
    }

    fn index(&self, channel: u8, pitch: u8) -> Option<usize> {
        let (channel, pitch) = (channel as usize, pitch as usize);
        if channel >= self.channels || pitch >= self.pitches {
            return None;
        }
        Some(channel * self.pitches + pitch)
    }
}

impl std::fmt::Debug for NoteFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let active = self.counts.iter().filter(|&&c| c > 0).count();
        f.debug_struct("NoteFilter")
            .field("channels", &self.channels)
            .field("pitches", &self.pitches)
            .field("modes", &self.modes)
            .field("active_notes", &active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ON: [u8; 3] = [0x90, 60, 100];
    const OFF: [u8; 3] = [0x80, 60, 0];

    #[test]
    fn test_pairing_with_both_modes() {
        let mut filter = NoteFilter::new(FilterModes::both());
        let ons: Vec<bool> = (0..3).map(|_| filter.should_emit(&ON)).collect();
        let offs: Vec<bool> = (0..3).map(|_| filter.should_emit(&OFF)).collect();

        assert_eq!(ons, vec![true, false, false]);
        assert_eq!(offs, vec![false, false, true]);
        assert_eq!(filter.active(0, 60), 0);
    }

    #[test]
    fn test_modes_disabled_emit_everything_tracked() {
        let mut filter = NoteFilter::new(FilterModes::default());
        for _ in 0..3 {
            assert!(filter.should_emit(&ON));
        }
        assert_eq!(filter.active(0, 60), 3);
        for _ in 0..3 {
            assert!(filter.should_emit(&OFF));
        }
        // Nothing left to release
        assert!(!filter.should_emit(&OFF));
    }

    #[test]
    fn test_only_note_on_suppression() {
        let modes = FilterModes {
            suppress_note_on: true,
            suppress_note_off: false,
        };
        let mut filter = NoteFilter::new(modes);
        assert!(filter.should_emit(&ON));
        assert!(!filter.should_emit(&ON));
        assert!(filter.should_emit(&OFF));
        assert!(filter.should_emit(&OFF));
    }

    #[test]
    fn test_velocity_zero_note_on_releases() {
        let mut filter = NoteFilter::new(FilterModes::both());
        assert!(filter.should_emit(&[0x95, 64, 90]));
        assert_eq!(filter.active(5, 64), 1);
        assert!(filter.should_emit(&[0x95, 64, 0]));
        assert_eq!(filter.active(5, 64), 0);
    }

    #[test]
    fn test_note_off_without_note_on_rejected() {
        let mut filter = NoteFilter::new(FilterModes::default());
        assert!(!filter.should_emit(&OFF));
        assert!(!filter.should_emit(&[0x90, 60, 0]));
    }

    #[test]
    fn test_channel_outside_table_rejected() {
        let mut filter = NoteFilter::with_table(4, PITCHES, FilterModes::default());
        assert!(!filter.should_emit(&[0x94, 60, 100]));
        assert!(!filter.should_emit(&[0x9F, 60, 100]));
        assert!(filter.should_emit(&[0x93, 60, 100]));

        let mut filter = NoteFilter::with_table(4, PITCHES, FilterModes::both());
        assert!(!filter.should_emit(&[0x94, 60, 100]));
    }

    #[test]
    fn test_pitch_outside_table_rejected() {
        let mut filter = NoteFilter::new(FilterModes::default());
        assert!(!filter.should_emit(&[0x90, 200, 100]));
        assert!(!filter.should_emit(&[0x80, 128, 0]));
    }

    #[test]
    fn test_counter_saturates() {
        let mut filter = NoteFilter::new(FilterModes::default());
        for _ in 0..u8::MAX {
            assert!(filter.should_emit(&ON));
        }
        assert_eq!(filter.active(0, 60), u8::MAX);
        assert!(!filter.should_emit(&ON));
        assert_eq!(filter.active(0, 60), u8::MAX);
    }

    #[test]
    fn test_other_messages_pass_through() {
        let mut filter = NoteFilter::new(FilterModes::both());
        assert!(filter.should_emit(&[0xB0, 7, 100]));
        assert!(filter.should_emit(&[0xC3, 42]));
        assert!(filter.should_emit(&[0xF8]));
        assert!(filter.should_emit(&[0xE0, 0x00, 0x40]));
        assert_eq!(filter.active(0, 7), 0);
    }

    #[test]
    fn test_malformed_notes_rejected() {
        let mut filter = NoteFilter::new(FilterModes::default());
        assert!(!filter.should_emit(&[]));
        assert!(!filter.should_emit(&[0x90, 60]));
        assert!(!filter.should_emit(&[0x80]));
    }

    #[test]
    fn test_channels_tracked_independently() {
        let mut filter = NoteFilter::new(FilterModes::both());
        assert!(filter.should_emit(&[0x90, 60, 100]));
        assert!(filter.should_emit(&[0x91, 60, 100]));
        assert!(filter.should_emit(&[0x90, 61, 100]));
        assert!(filter.should_emit(&[0x81, 60, 0]));
        assert_eq!(filter.active(0, 60), 1);
    }
}
