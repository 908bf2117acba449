//! Registry of in-flight transactions, keyed by direction and AXI ID.

use crate::error::{Error, Result};
use crate::tlm::{Command, Phase, Transaction};
use generational_arena::{Arena, Index};
use log::{debug, error};
use nohash::IntMap;
use std::hash::{Hash, Hasher};

/// Identifies one in-flight transaction.
///
/// Reads and writes have separate key spaces, so a read and a write may be in flight with the
/// same AXI ID at the same time.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TransactionKey {
    pub direction: Command,
    pub id: u32,
}

impl TransactionKey {
    pub fn new(direction: Command, id: u32) -> Self {
        Self { direction, id }
    }

    pub fn read(id: u32) -> Self {
        Self::new(Command::Read, id)
    }

    pub fn write(id: u32) -> Self {
        Self::new(Command::Write, id)
    }

    fn as_u64(self) -> u64 {
        let direction = match self.direction {
            Command::Read => 0,
            Command::Write => 1,
        };
        (direction << 32) | self.id as u64
    }
}

// `IntMap` requires the key to be hashed through a single integer write.
impl Hash for TransactionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.as_u64());
    }
}

impl nohash::IsEnabled for TransactionKey {}

/// A transaction together with its current protocol phase.
///
/// The phase lives here rather than in the payload, so the payload itself stays phase-agnostic.
#[derive(Debug)]
pub struct Handle {
    trans: Transaction,
    phase: Phase,
    /// Number of data beats already moved between the pins and the payload buffer.
    beats_done: usize,
}

impl Handle {
    pub fn transaction(&self) -> &Transaction {
        &self.trans
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn beats_done(&self) -> usize {
        self.beats_done
    }

    /// Counts one more beat as moved, returning the index of that beat.
    pub fn advance_beat(&mut self) -> usize {
        let beat = self.beats_done;
        self.beats_done += 1;
        beat
    }
}

/// Owns the [`Handle`] of every transaction between its address handshake and its terminal phase.
///
/// Entries are only ever removed by [`Registry::retire`] (or [`Registry::drain`]), there is no
/// implicit eviction.
#[derive(Debug, Default)]
pub struct Registry {
    handles: Arena<Handle>,
    index: IntMap<TransactionKey, Index>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `trans` under `key` at `phase`.
    ///
    /// Fails if a transaction is already in flight under `key`.
    pub fn create(
        &mut self,
        key: TransactionKey,
        phase: Phase,
        trans: Transaction,
    ) -> Result<&mut Handle> {
        if self.index.contains_key(&key) {
            error!(
                "Transaction ID {} ({}) is already in flight",
                key.id, key.direction
            );
            return Err(Error::DuplicateId {
                direction: key.direction,
                id: key.id,
            });
        }

        debug!(axi_id = key.id; "Registering {} transaction at {phase}", key.direction);
        let index = self.handles.insert(Handle {
            trans,
            phase,
            beats_done: 0,
        });
        self.index.insert(key, index);
        Ok(&mut self.handles[index])
    }

    /// Returns the handle registered under `key`, failing if there is none.
    pub fn lookup(&self, key: TransactionKey) -> Result<&Handle> {
        self.find(key).ok_or_else(|| invalid_id(key))
    }

    /// Returns the handle registered under `key` mutably, failing if there is none.
    pub fn lookup_mut(&mut self, key: TransactionKey) -> Result<&mut Handle> {
        let index = *self.index.get(&key).ok_or_else(|| invalid_id(key))?;
        self.handles.get_mut(index).ok_or_else(|| invalid_id(key))
    }

    /// Like [`Registry::lookup`], but a miss is not an error.
    pub fn find(&self, key: TransactionKey) -> Option<&Handle> {
        self.index
            .get(&key)
            .and_then(|&index| self.handles.get(index))
    }

    /// Like [`Registry::lookup_mut`], but a miss is not an error.
    pub fn find_mut(&mut self, key: TransactionKey) -> Option<&mut Handle> {
        let index = *self.index.get(&key)?;
        self.handles.get_mut(index)
    }

    /// Removes the handle registered under `key`.
    ///
    /// The returned handle owns the registry's reference to the transaction; dropping it releases
    /// that reference.
    pub fn retire(&mut self, key: TransactionKey) -> Result<Handle> {
        let index = self.index.remove(&key).ok_or_else(|| invalid_id(key))?;
        debug!(axi_id = key.id; "Retiring {} transaction", key.direction);
        self.handles.remove(index).ok_or_else(|| invalid_id(key))
    }

    pub fn contains(&self, key: TransactionKey) -> bool {
        self.index.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Removes every handle, returning them together with their keys.
    pub fn drain(&mut self) -> impl Iterator<Item = (TransactionKey, Handle)> + '_ {
        let handles = &mut self.handles;
        self.index
            .drain()
            .filter_map(move |(key, index)| handles.remove(index).map(|handle| (key, handle)))
    }
}

fn invalid_id(key: TransactionKey) -> Error {
    error!("Invalid transaction ID {} ({})", key.id, key.direction);
    Error::InvalidId {
        direction: key.direction,
        id: key.id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlm::{Payload, ReadPhase, WritePhase};

    fn read_trans() -> Transaction {
        Transaction::new(Payload::new(Command::Read, 0, 4))
    }

    #[test]
    fn test_create_and_lookup() {
        let mut registry = Registry::new();
        let trans = read_trans();
        registry
            .create(
                TransactionKey::read(7),
                Phase::Read(ReadPhase::BeginReq),
                trans.clone(),
            )
            .unwrap();

        let handle = registry.lookup(TransactionKey::read(7)).unwrap();
        assert!(handle.transaction().ptr_eq(&trans));
        assert_eq!(Phase::Read(ReadPhase::BeginReq), handle.phase());
        assert_eq!(0, handle.beats_done());
        assert_eq!(1, registry.len());
    }

    #[test]
    fn test_duplicate_id() {
        let mut registry = Registry::new();
        let key = TransactionKey::read(1);
        let phase = Phase::Read(ReadPhase::BeginReq);
        registry.create(key, phase, read_trans()).unwrap();
        let err = registry.create(key, phase, read_trans()).unwrap_err();
        assert_eq!(
            Error::DuplicateId {
                direction: Command::Read,
                id: 1
            },
            err
        );
        assert_eq!(1, registry.len());
    }

    #[test]
    fn test_directions_do_not_collide() {
        let mut registry = Registry::new();
        registry
            .create(
                TransactionKey::read(5),
                Phase::Read(ReadPhase::BeginReq),
                read_trans(),
            )
            .unwrap();
        registry
            .create(
                TransactionKey::write(5),
                Phase::Write(WritePhase::BeginPartialReq),
                Transaction::new(Payload::new(Command::Write, 0, 4)),
            )
            .unwrap();
        assert_eq!(2, registry.len());
        registry.retire(TransactionKey::read(5)).unwrap();
        assert!(registry.contains(TransactionKey::write(5)));
    }

    #[test]
    fn test_retire_releases_reference() {
        let mut registry = Registry::new();
        let trans = read_trans();
        registry
            .create(
                TransactionKey::read(2),
                Phase::Read(ReadPhase::BeginReq),
                trans.clone(),
            )
            .unwrap();
        assert_eq!(2, trans.ref_count());

        drop(registry.retire(TransactionKey::read(2)).unwrap());
        assert_eq!(1, trans.ref_count());
        assert!(registry.is_empty());
        assert_eq!(
            Error::InvalidId {
                direction: Command::Read,
                id: 2
            },
            registry.lookup(TransactionKey::read(2)).unwrap_err()
        );
        assert!(registry.retire(TransactionKey::read(2)).is_err());
    }

    #[test]
    fn test_id_reuse_after_retire() {
        let mut registry = Registry::new();
        let key = TransactionKey::read(9);
        let phase = Phase::Read(ReadPhase::BeginReq);
        registry.create(key, phase, read_trans()).unwrap();
        registry.retire(key).unwrap();
        registry.create(key, phase, read_trans()).unwrap();
        assert_eq!(1, registry.len());
    }

    #[test]
    fn test_drain() {
        let mut registry = Registry::new();
        for id in 0..3 {
            registry
                .create(
                    TransactionKey::read(id),
                    Phase::Read(ReadPhase::BeginReq),
                    read_trans(),
                )
                .unwrap();
        }
        let mut ids: Vec<u32> = registry.drain().map(|(key, _)| key.id).collect();
        ids.sort_unstable();
        assert_eq!(vec![0, 1, 2], ids);
        assert!(registry.is_empty());
    }
}
