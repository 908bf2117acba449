//! Canned traffic patterns for the bench.

use crate::master::Master;
use crate::memory::MemoryTarget;
use clap::ValueEnum;
use pin2tlm_core::BusWidth;

/// Size of the memory behind the adaptor.
pub const MEMORY_SIZE: usize = 0x1_0000;

/// Every burst gets a region of its own, large enough for 256 beats on the widest bus.
const REGION_SIZE: u64 = 0x4000;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
pub enum Scenario {
    /// One single-beat read.
    SingleRead,
    /// Two read bursts with different IDs.
    BurstRead,
    /// Two write bursts with different IDs.
    BurstWrite,
    /// Reads and writes in flight together, one read sharing its ID with a write.
    Mixed,
}

#[derive(Debug, Clone)]
pub struct ExpectedRead {
    pub id: u32,
    pub address: u64,
    pub length: usize,
}

#[derive(Debug, Clone)]
pub struct ExpectedWrite {
    pub id: u32,
    pub address: u64,
    pub data: Vec<u8>,
}

/// What the memory and the master must hold once the traffic finished.
#[derive(Debug, Clone, Default)]
pub struct Expectations {
    pub reads: Vec<ExpectedRead>,
    pub writes: Vec<ExpectedWrite>,
}

/// Initial memory contents: a byte pattern that differs between neighbouring addresses and
/// between regions.
pub fn pattern(address: u64) -> u8 {
    (address as u8) ^ ((address >> 8) as u8) ^ 0xA5
}

impl Scenario {
    /// Fills `memory` with [`pattern`], queues the traffic on `master`, and returns what the run
    /// should produce. Bursts are `len + 1` beats wide, except for [`Scenario::SingleRead`].
    pub fn prepare(
        self,
        width: BusWidth,
        len: u8,
        memory: &MemoryTarget,
        master: &mut Master,
    ) -> Expectations {
        let contents: Vec<u8> = (0..memory.len() as u64).map(pattern).collect();
        memory.load(0, &contents);

        let size = width.bytes().trailing_zeros() as u8;
        let burst_bytes = (usize::from(len) + 1) * width.lanes();
        let mut expect = Expectations::default();

        let mut read = |id: u32, region: u64, len: u8| {
            let address = region * REGION_SIZE;
            master.read(id, address, len, size);
            expect.reads.push(ExpectedRead {
                id,
                address,
                length: (usize::from(len) + 1) * width.lanes(),
            });
        };
        match self {
            Self::SingleRead => read(1, 0, 0),
            Self::BurstRead => {
                read(1, 0, len);
                read(2, 1, len);
            }
            Self::BurstWrite => {}
            Self::Mixed => {
                read(1, 0, len);
                read(2, 1, len);
            }
        }

        let writes: &[(u32, u64)] = match self {
            Self::SingleRead | Self::BurstRead => &[],
            Self::BurstWrite => &[(1, 2), (2, 3)],
            Self::Mixed => &[(1, 2), (3, 3)],
        };
        for &(id, region) in writes {
            let address = region * REGION_SIZE;
            let data: Vec<u8> = (0..burst_bytes)
                .map(|i| (i as u8).wrapping_mul(7).wrapping_add(id as u8))
                .collect();
            master.write(id, address, size, &data);
            expect.writes.push(ExpectedWrite { id, address, data });
        }

        expect
    }
}
