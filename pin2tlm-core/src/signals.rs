//! Pin-level view of the five AXI4 channels.
//!
//! The adaptor samples a [`PinInputs`] once per rising clock edge and drives a [`PinOutputs`] in
//! response. Data buses are represented as little-endian byte lanes, i.e. `data[0]` is the least
//! significant byte of the bus.

use crate::BusWidth;

/// Burst addressing mode, as encoded on `AxBURST`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Burst {
    Fixed = 0,
    #[default]
    Incr = 1,
    Wrap = 2,
    Reserved = 3,
}

impl Burst {
    /// Decodes a 2-bit `AxBURST` value. Only the two least significant bits of `value` are used.
    pub fn from_u2(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Fixed,
            1 => Self::Incr,
            2 => Self::Wrap,
            _ => Self::Reserved,
        }
    }

    pub fn to_u2(self) -> u8 {
        self as u8
    }
}

/// Response code, as encoded on `BRESP` and `RRESP`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Response {
    #[default]
    Okay = 0,
    ExOkay = 1,
    SlvErr = 2,
    DecErr = 3,
}

impl Response {
    /// Decodes a 2-bit response value. Only the two least significant bits of `value` are used.
    pub fn from_u2(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Okay,
            1 => Self::ExOkay,
            2 => Self::SlvErr,
            _ => Self::DecErr,
        }
    }

    pub fn to_u2(self) -> u8 {
        self as u8
    }
}

/// Payload of the write-address (`AW*`) or read-address (`AR*`) channel.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct AddressChannel {
    pub id: u32,
    pub addr: u64,
    /// Number of beats in the burst, minus one.
    pub len: u8,
    /// Beat size code: a beat is `1 << size` bytes. Only the three least significant bits count.
    pub size: u8,
    /// Raw 2-bit burst mode, see [`Burst::from_u2`].
    pub burst: u8,
    pub lock: bool,
    pub cache: u8,
    pub prot: u8,
    pub qos: u8,
    pub region: u8,
}

impl AddressChannel {
    /// Returns the number of bytes moved by a single beat.
    pub fn beat_bytes(&self) -> usize {
        1 << (self.size & 0b111)
    }

    /// Returns the number of beats in the burst.
    pub fn beats(&self) -> usize {
        self.len as usize + 1
    }

    /// Returns the number of bytes moved by the whole burst.
    pub fn burst_bytes(&self) -> usize {
        self.beat_bytes() * self.beats()
    }
}

/// Payload of the write-data (`W*`) channel.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WriteDataBeat {
    /// One byte per byte lane.
    pub data: Box<[u8]>,
    /// Write strobe, bit `n` qualifies `data[n]`.
    pub strb: u64,
    pub last: bool,
}

impl WriteDataBeat {
    /// Returns an all-zero beat for a bus of `width`.
    pub fn idle(width: BusWidth) -> Self {
        Self {
            data: vec![0; width.lanes()].into_boxed_slice(),
            strb: 0,
            last: false,
        }
    }
}

/// Every input the adaptor samples on a rising clock edge.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PinInputs {
    /// Active-low reset.
    pub resetn: bool,

    pub aw_valid: bool,
    pub aw: AddressChannel,

    pub w_valid: bool,
    pub w: WriteDataBeat,

    pub b_ready: bool,

    pub ar_valid: bool,
    pub ar: AddressChannel,

    pub r_ready: bool,
}

impl PinInputs {
    /// Returns inputs with reset deasserted, no valid signal raised, and both response channels
    /// ready.
    pub fn idle(width: BusWidth) -> Self {
        Self {
            resetn: true,
            aw_valid: false,
            aw: AddressChannel::default(),
            w_valid: false,
            w: WriteDataBeat::idle(width),
            b_ready: true,
            ar_valid: false,
            ar: AddressChannel::default(),
            r_ready: true,
        }
    }
}

/// Every output the adaptor drives.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PinOutputs {
    pub aw_ready: bool,

    pub w_ready: bool,

    pub b_valid: bool,
    pub b_id: u32,
    pub b_resp: Response,

    pub ar_ready: bool,

    pub r_valid: bool,
    pub r_id: u32,
    pub r_data: Box<[u8]>,
    pub r_resp: Response,
    pub r_last: bool,
}

impl PinOutputs {
    /// Returns the outputs as driven right after reset.
    pub(crate) fn new(width: BusWidth) -> Self {
        Self {
            aw_ready: false,
            w_ready: false,
            b_valid: false,
            b_id: 0,
            b_resp: Response::Okay,
            ar_ready: true,
            r_valid: false,
            r_id: 0,
            r_data: vec![0; width.lanes()].into_boxed_slice(),
            r_resp: Response::Okay,
            r_last: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_decoding() {
        assert_eq!(Burst::Fixed, Burst::from_u2(0));
        assert_eq!(Burst::Incr, Burst::from_u2(1));
        assert_eq!(Burst::Wrap, Burst::from_u2(2));
        assert_eq!(Burst::Reserved, Burst::from_u2(3));
        // Upper bits are not part of the field.
        assert_eq!(Burst::Incr, Burst::from_u2(0b101));
    }

    #[test]
    fn test_response_codes() {
        for code in 0..4 {
            assert_eq!(code, Response::from_u2(code).to_u2());
        }
        assert_eq!(Response::SlvErr, Response::from_u2(2));
    }

    #[test]
    fn test_burst_sizing() {
        let ar = AddressChannel {
            len: 3,
            size: 2,
            ..Default::default()
        };
        assert_eq!(4, ar.beat_bytes());
        assert_eq!(4, ar.beats());
        assert_eq!(16, ar.burst_bytes());

        let single = AddressChannel::default();
        assert_eq!(1, single.beat_bytes());
        assert_eq!(1, single.burst_bytes());
    }
}
