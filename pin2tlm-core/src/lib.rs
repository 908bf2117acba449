#[macro_use]
extern crate static_assertions;

use std::fmt;

pub mod adaptor;
mod beat;
pub mod error;
pub mod registry;
pub mod signals;
pub mod tlm;

pub use adaptor::{Config, Pin2TlmAdaptor};
pub use error::{Error, Result};

/// Width of the AXI data bus, expressed in bytes.
///
/// Valid widths are the powers of two from a single byte up to [`BusWidth::MAX_BYTES`]. The upper
/// limit keeps one write strobe bit per byte lane inside a `u64`.
// Maintains the invariant that self.0 is a power of two in 1..=MAX_BYTES.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BusWidth(u32);

const_assert!(BusWidth::MAX_BYTES <= u64::BITS);

impl BusWidth {
    /// Widest supported data bus (512 bits).
    pub const MAX_BYTES: u32 = 64;

    /// 32-bit data bus.
    pub const BITS_32: Self = Self(4);

    /// 64-bit data bus.
    pub const BITS_64: Self = Self(8);

    /// 128-bit data bus.
    pub const BITS_128: Self = Self(16);

    /// Creates a bus width of `bytes` byte lanes. Returns `None` if `bytes` is not a power of two,
    /// or is larger than [`BusWidth::MAX_BYTES`].
    pub fn new(bytes: u32) -> Option<Self> {
        (bytes.is_power_of_two() && bytes <= Self::MAX_BYTES).then_some(Self(bytes))
    }

    /// Creates a bus width from a width in bits, which must be a multiple of 8.
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits % 8 != 0 {
            None
        } else {
            Self::new(bits / 8)
        }
    }

    /// Returns the number of byte lanes.
    pub fn bytes(self) -> u32 {
        self.0
    }

    /// Returns the width in bits.
    pub fn bits(self) -> u32 {
        self.0 * 8
    }

    /// Returns the number of byte lanes as a `usize`, convenient for sizing beat buffers.
    pub fn lanes(self) -> usize {
        self.0 as usize
    }

    /// Returns a strobe with one bit set per byte lane.
    pub fn strobe_mask(self) -> u64 {
        u64::MAX >> (u64::BITS - self.0)
    }
}

impl Default for BusWidth {
    fn default() -> Self {
        Self::BITS_32
    }
}

impl fmt::Display for BusWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}
