//! Moving single data beats between the data bus and a payload buffer.
//!
//! A beat of `n` bytes occupies the `n` least significant byte lanes of the bus. Beat `k` of a
//! burst lives at offset `k * n` in the payload buffer.

use crate::tlm::Payload;
use bitvec::order::Lsb0;
use bitvec::view::BitView;

/// Copies write beat `beat` of `beat_bytes` bytes from `data` into the payload buffer, and records
/// the byte enables derived from `strb`.
///
/// Returns `false` if the beat lies (partly) beyond the end of the buffer, in which case nothing is
/// copied.
pub(crate) fn unpack_write_beat(
    payload: &mut Payload,
    beat: usize,
    beat_bytes: usize,
    data: &[u8],
    strb: u64,
) -> bool {
    let offset = beat * beat_bytes;
    let end = offset + beat_bytes;
    if end > payload.data_length() || beat_bytes > data.len() {
        return false;
    }

    payload.data_mut()[offset..end].copy_from_slice(&data[..beat_bytes]);

    let lanes = strb.view_bits::<Lsb0>();
    let enables = &mut payload.byte_enable_mut()[offset..end];
    for (enable, lane) in enables.iter_mut().zip(lanes.iter()) {
        *enable = if *lane {
            Payload::BYTE_ENABLED
        } else {
            Payload::BYTE_DISABLED
        };
    }
    true
}

/// Copies read beat `beat` of `beat_bytes` bytes from the payload buffer onto `bus`. Byte lanes
/// not covered by the beat are cleared.
///
/// Returns `false` if the beat lies (partly) beyond the end of the buffer, in which case `bus` is
/// left untouched.
pub(crate) fn pack_read_beat(
    bus: &mut [u8],
    payload: &Payload,
    beat: usize,
    beat_bytes: usize,
) -> bool {
    let offset = beat * beat_bytes;
    let end = offset + beat_bytes;
    if end > payload.data_length() || beat_bytes > bus.len() {
        return false;
    }

    let (lanes, unused) = bus.split_at_mut(beat_bytes);
    lanes.copy_from_slice(&payload.data()[offset..end]);
    unused.fill(0);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlm::Command;

    #[test]
    fn test_unpack_write_beats() {
        let mut payload = Payload::new(Command::Write, 0, 8);
        assert!(unpack_write_beat(&mut payload, 0, 4, &[1, 2, 3, 4], 0b1111));
        assert!(unpack_write_beat(&mut payload, 1, 4, &[5, 6, 7, 8], 0b0101));
        assert_eq!(&[1, 2, 3, 4, 5, 6, 7, 8], payload.data());
        assert_eq!(
            &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0xFF, 0x00],
            payload.byte_enable()
        );
    }

    #[test]
    fn test_unpack_narrow_beat_uses_low_lanes() {
        let mut payload = Payload::new(Command::Write, 0, 4);
        let bus = [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7];
        assert!(unpack_write_beat(&mut payload, 1, 2, &bus, 0xFF));
        assert_eq!(&[0, 0, 0xA0, 0xA1], payload.data());
        assert_eq!(&[0x00, 0x00, 0xFF, 0xFF], payload.byte_enable());
    }

    #[test]
    fn test_unpack_overrun() {
        let mut payload = Payload::new(Command::Write, 0, 4);
        assert!(!unpack_write_beat(&mut payload, 1, 4, &[1, 2, 3, 4], 0xF));
        assert_eq!(&[0, 0, 0, 0], payload.data());
    }

    #[test]
    fn test_pack_read_beat() {
        let mut payload = Payload::new(Command::Read, 0, 4);
        payload.data_mut().copy_from_slice(&[9, 8, 7, 6]);
        let mut bus = [0xEE; 4];
        assert!(pack_read_beat(&mut bus, &payload, 1, 2));
        assert_eq!([7, 6, 0, 0], bus);
        assert!(!pack_read_beat(&mut bus, &payload, 2, 2));
        assert_eq!([7, 6, 0, 0], bus);
    }
}
