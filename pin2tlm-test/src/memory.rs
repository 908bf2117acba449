//! Byte-addressed memory exposed as a transaction-level target.

use pin2tlm_core::tlm::{
    BackwardTransport, Command, Delay, ForwardTransport, Phase, ReadPhase, SyncStatus, Transaction,
    WritePhase,
};
use pin2tlm_core::Result;
use std::cell::RefCell;
use std::collections::VecDeque;

/// When the target reports progress on a transaction it received.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Timing {
    /// All progress is reported from inside the forward call.
    SameInstant,
    /// One step of progress is reported per call to [`MemoryTarget::tick`].
    Deferred,
}

/// A transaction the target still owes progress notifications for.
#[derive(Debug)]
struct Pending {
    trans: Transaction,
    /// Read beats not yet announced. Always `0` for writes.
    beats_left: usize,
    /// Whether the final read beat was already preceded by a partial response.
    announced: bool,
}

/// Byte-based memory that executes every transaction as an incrementing burst starting at the
/// payload address, as soon as the request arrives.
///
/// Accesses that fall (partly) outside the memory read zeros and drop writes for the bytes that
/// are out of range.
#[derive(Debug)]
pub struct MemoryTarget {
    data: RefCell<Vec<u8>>,
    /// The highest byte address.
    max_address: u64,
    timing: Timing,
    /// Precede the final read beat with a partial response, as some targets do.
    announce_partial: bool,
    pending: RefCell<VecDeque<Pending>>,
}

impl MemoryTarget {
    /// Create a new zero-initialized memory that holds `size` bytes.
    ///
    /// Returns `None` if `size` is zero.
    pub fn new(size: usize, timing: Timing, announce_partial: bool) -> Option<Self> {
        if size == 0 {
            return None;
        }
        Some(Self {
            data: RefCell::new(vec![0; size]),
            max_address: (size - 1) as u64,
            timing,
            announce_partial,
            pending: RefCell::new(VecDeque::new()),
        })
    }

    /// Returns the size expressed in bytes. Guaranteed to be at least one.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.max_address as usize + 1
    }

    /// Returns the number of transactions still waiting for a progress notification.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Reads a range of bytes into `buf`. Bytes of `buf` whose address is out of range are zeroed.
    pub fn read(&self, buf: &mut [u8], address: u64) {
        buf.fill(0);
        if address > self.max_address || buf.is_empty() {
            return;
        }
        let size = buf.len().min((self.max_address - address) as usize + 1);
        let start = address as usize;
        buf[..size].copy_from_slice(&self.data.borrow()[start..start + size]);
    }

    /// Writes a range of bytes from `buf`. A byte is only written if `byte_enable` is empty or
    /// has `0xFF` at the same offset.
    pub fn write(&self, address: u64, buf: &[u8], byte_enable: &[u8]) {
        if address > self.max_address || buf.is_empty() {
            return;
        }
        let size = buf.len().min((self.max_address - address) as usize + 1);
        let start = address as usize;
        let mut data = self.data.borrow_mut();
        for (offset, &byte) in buf[..size].iter().enumerate() {
            if byte_enable.get(offset).map_or(true, |&enable| enable == 0xFF) {
                data[start + offset] = byte;
            }
        }
    }

    /// Writes `buf` at `address` without any byte masking.
    pub fn load(&self, address: u64, buf: &[u8]) {
        self.write(address, buf, &[]);
    }

    /// Delivers one progress notification for every pending transaction.
    pub fn tick(&self, initiator: &dyn BackwardTransport) -> Result<()> {
        let count = self.pending.borrow().len();
        for _ in 0..count {
            let Some(mut pending) = self.pending.borrow_mut().pop_front() else {
                break;
            };
            if !self.step(&mut pending, initiator)? {
                self.pending.borrow_mut().push_back(pending);
            }
        }
        Ok(())
    }

    fn execute(&self, trans: &Transaction) -> Result<Pending> {
        let mut payload = trans.borrow_mut();
        let address = payload.address();
        let beats_left = match payload.command() {
            Command::Read => {
                self.read(payload.data_mut(), address);
                payload.axi()?.beats()
            }
            Command::Write => {
                self.write(address, payload.data(), payload.byte_enable());
                0
            }
        };
        Ok(Pending {
            trans: trans.clone(),
            beats_left,
            announced: false,
        })
    }

    /// Reports the next phase of `pending`. Returns `true` once the transaction is finished.
    fn step(&self, pending: &mut Pending, initiator: &dyn BackwardTransport) -> Result<bool> {
        let is_read = pending.trans.borrow().is_read();
        let mut delay = Delay::ZERO;

        if !is_read {
            let mut phase = Phase::Write(WritePhase::BeginResp);
            initiator.nb_transport_bw(&pending.trans, &mut phase, &mut delay)?;
            return Ok(true);
        }

        let mut phase = if pending.beats_left > 1 {
            pending.beats_left -= 1;
            Phase::Read(ReadPhase::BeginPartialResp)
        } else if self.announce_partial && !pending.announced {
            pending.announced = true;
            Phase::Read(ReadPhase::BeginPartialResp)
        } else {
            pending.beats_left = 0;
            Phase::Read(ReadPhase::BeginResp)
        };
        let finished = phase == Phase::Read(ReadPhase::BeginResp);
        initiator.nb_transport_bw(&pending.trans, &mut phase, &mut delay)?;
        Ok(finished)
    }
}

impl ForwardTransport for MemoryTarget {
    fn nb_transport_fw(
        &self,
        trans: &Transaction,
        phase: &mut Phase,
        delay: &mut Delay,
        initiator: &dyn BackwardTransport,
    ) -> Result<SyncStatus> {
        let _ = delay;
        let end_req = match *phase {
            Phase::Read(ReadPhase::BeginReq) => Phase::Read(ReadPhase::EndReq),
            Phase::Write(WritePhase::BeginReq) => Phase::Write(WritePhase::EndReq),
            _ => return Ok(SyncStatus::Accepted),
        };

        let mut pending = self.execute(trans)?;
        match self.timing {
            Timing::SameInstant => while !self.step(&mut pending, initiator)? {},
            Timing::Deferred => self.pending.borrow_mut().push_back(pending),
        }

        *phase = end_req;
        Ok(SyncStatus::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write() {
        let memory = MemoryTarget::new(16, Timing::SameInstant, false).unwrap();
        assert_eq!(16, memory.len());
        memory.load(4, &[1, 2, 3, 4]);
        memory.write(6, &[9, 9], &[0x00, 0xFF]);

        let mut buf = [0xEE; 6];
        memory.read(&mut buf, 3);
        assert_eq!([0, 1, 2, 3, 9, 0], buf);
    }

    #[test]
    fn test_out_of_range() {
        let memory = MemoryTarget::new(4, Timing::SameInstant, false).unwrap();
        memory.load(2, &[1, 2, 3, 4]);
        let mut buf = [0xEE; 4];
        memory.read(&mut buf, 2);
        assert_eq!([1, 2, 0, 0], buf);
        memory.read(&mut buf, 100);
        assert_eq!([0; 4], buf);
        assert!(MemoryTarget::new(0, Timing::Deferred, false).is_none());
    }
}
