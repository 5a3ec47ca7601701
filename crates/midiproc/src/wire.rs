//! Fixed-layout event records for the IPC channels
//!
//! ## Wire Format
//!
//! Every record is exactly [`RECORD_LEN`] bytes, little-endian, no padding:
//!
//! ```text
//! Offset  Size  Field
//! 0       8     channel tag (i64, always CHANNEL_TAG)
//! 8       128   payload (only the first `length` bytes are meaningful)
//! 136     4     length (u32)
//! 140     8     scheduled time (u64, frames since bridge start)
//! ```
//!
//! Both directions use the same layout. Payload bytes past `length` are zero
//! on encode and ignored on decode.

use bytes::{Buf, BufMut};

use crate::event::{Event, MAX_EVENT_LEN};

/// The only defined channel tag
pub const CHANNEL_TAG: i64 = 1;

/// Size of one encoded record
pub const RECORD_LEN: usize = 8 + MAX_EVENT_LEN + 4 + 8;

/// Errors decoding a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("Record has wrong size: expected {expected} bytes, got {actual}")]
    BadLength { expected: usize, actual: usize },

    #[error("Unknown channel tag: {0}")]
    UnknownTag(i64),

    #[error("Payload length {0} exceeds {MAX_EVENT_LEN}")]
    PayloadTooLong(u32),
}

/// Encode an event into a record
pub fn encode(event: &Event) -> [u8; RECORD_LEN] {
    let mut payload = [0u8; MAX_EVENT_LEN];
    payload[..event.len()].copy_from_slice(event.payload());

    let mut record = [0u8; RECORD_LEN];
    let mut buf = &mut record[..];
    buf.put_i64_le(CHANNEL_TAG);
    buf.put_slice(&payload);
    buf.put_u32_le(event.len() as u32);
    buf.put_u64_le(event.time());
    record
}

/// Decode a record into an event
pub fn decode(record: &[u8]) -> Result<Event, WireError> {
    if record.len() != RECORD_LEN {
        return Err(WireError::BadLength {
            expected: RECORD_LEN,
            actual: record.len(),
        });
    }

    let mut buf = record;
    let tag = buf.get_i64_le();
    if tag != CHANNEL_TAG {
        return Err(WireError::UnknownTag(tag));
    }

    let mut payload = [0u8; MAX_EVENT_LEN];
    buf.copy_to_slice(&mut payload);
    let len = buf.get_u32_le();
    let time = buf.get_u64_le();

    if len as usize > MAX_EVENT_LEN {
        return Err(WireError::PayloadTooLong(len));
    }
    Event::new(&payload[..len as usize], time).map_err(|_| WireError::PayloadTooLong(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_len() {
        assert_eq!(RECORD_LEN, 148);
    }

    #[test]
    fn test_encode_layout() {
        let event = Event::new(&[0x90, 60, 100], 1000).unwrap();
        let record = encode(&event);

        assert_eq!(&record[0..8], &1i64.to_le_bytes());
        assert_eq!(&record[8..11], &[0x90, 60, 100]);
        assert!(record[11..136].iter().all(|&b| b == 0));
        assert_eq!(&record[136..140], &3u32.to_le_bytes());
        assert_eq!(&record[140..148], &1000u64.to_le_bytes());
    }

    #[test]
    fn test_decode_encoded() {
        let event = Event::new(&[0x80, 60, 0], 1050).unwrap();
        let decoded = decode(&encode(&event)).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decode_ignores_bytes_past_length() {
        let event = Event::new(&[0xC0, 5], 42).unwrap();
        let mut record = encode(&event);
        record[8 + 2] = 0xAA;
        record[8 + 100] = 0x55;
        let decoded = decode(&record).unwrap();
        assert_eq!(decoded.payload(), &[0xC0, 5]);
        assert_eq!(decoded.time(), 42);
    }

    #[test]
    fn test_decode_rejects_wrong_size() {
        let record = [0u8; RECORD_LEN - 1];
        assert_eq!(
            decode(&record),
            Err(WireError::BadLength {
                expected: RECORD_LEN,
                actual: RECORD_LEN - 1
            })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let event = Event::new(&[0x90, 60, 100], 0).unwrap();
        let mut record = encode(&event);
        record[0..8].copy_from_slice(&2i64.to_le_bytes());
        assert_eq!(decode(&record), Err(WireError::UnknownTag(2)));
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let event = Event::new(&[0x90, 60, 100], 0).unwrap();
        let mut record = encode(&event);
        record[136..140].copy_from_slice(&129u32.to_le_bytes());
        assert_eq!(decode(&record), Err(WireError::PayloadTooLong(129)));
    }
}
