//! Transaction-level side of the adaptor.
//!
//! A [`Transaction`] carries a whole burst between the pin-level and transaction-level domains.
//! It is handed to the downstream target through [`ForwardTransport`], and the target reports
//! progress back through [`BackwardTransport`], possibly from inside the forward call.

use crate::error::{Error, Result};
use crate::signals::{AddressChannel, Burst, Response};
use log::error;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::fmt::Debug;
use std::rc::Rc;
use std::time::Duration;

/// Timing annotation passed along with every transport call.
///
/// The adaptor works at clock-edge granularity and never advances it.
pub type Delay = Duration;

/// Direction of a transfer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Command {
    Read,
    Write,
}

impl Command {
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Command::Read => "RD",
            Command::Write => "WR",
        })
    }
}

/// Protocol phases of a read transaction.
///
/// Reads never have a partial request, since the address handshake carries everything the
/// target needs.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReadPhase {
    BeginReq,
    EndReq,
    /// The target has data for one beat, and more beats follow.
    BeginPartialResp,
    EndPartialResp,
    /// The target has data for the final beat.
    BeginResp,
    EndResp,
}

/// Protocol phases of a write transaction.
///
/// Writes never have a partial response, since there is a single write response per burst.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WritePhase {
    /// The address is known but data beats are still being collected.
    BeginPartialReq,
    EndPartialReq,
    BeginReq,
    EndReq,
    BeginResp,
    EndResp,
}

/// Current point in a transaction's lifecycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Phase {
    Read(ReadPhase),
    Write(WritePhase),
}

impl Phase {
    pub fn direction(self) -> Command {
        match self {
            Phase::Read(_) => Command::Read,
            Phase::Write(_) => Command::Write,
        }
    }

    /// Returns `true` for the phase after which the transaction no longer exists.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::Read(ReadPhase::EndResp) | Phase::Write(WritePhase::EndResp)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Phase::Read(ReadPhase::BeginReq) | Phase::Write(WritePhase::BeginReq) => "BEGIN_REQ",
            Phase::Read(ReadPhase::EndReq) | Phase::Write(WritePhase::EndReq) => "END_REQ",
            Phase::Read(ReadPhase::BeginResp) | Phase::Write(WritePhase::BeginResp) => {
                "BEGIN_RESP"
            }
            Phase::Read(ReadPhase::EndResp) | Phase::Write(WritePhase::EndResp) => "END_RESP",
            Phase::Read(ReadPhase::BeginPartialResp) => "BEGIN_PARTIAL_RESP",
            Phase::Read(ReadPhase::EndPartialResp) => "END_PARTIAL_RESP",
            Phase::Write(WritePhase::BeginPartialReq) => "BEGIN_PARTIAL_REQ",
            Phase::Write(WritePhase::EndPartialReq) => "END_PARTIAL_REQ",
        })
    }
}

/// Result of a nonblocking transport call.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SyncStatus {
    /// The callee took note of the phase, but did not change it.
    Accepted,
    /// The callee moved the phase on; the caller must continue from the returned phase.
    Updated,
    /// The callee finished the transaction in this call.
    Completed,
}

/// AXI metadata attached to a [`Payload`].
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct AxiExtension {
    pub id: u32,
    /// Beat size code, a beat is `1 << size` bytes.
    pub size: u8,
    /// Number of beats in the burst, minus one.
    pub length: u8,
    pub burst: Burst,
    pub exclusive: bool,
    pub cache: u8,
    pub prot: u8,
    pub qos: u8,
    pub region: u8,
    /// Response reported by the target, driven on `RRESP` for reads.
    pub resp: Response,
}

impl AxiExtension {
    /// Captures the metadata of an address-channel handshake.
    pub fn from_address_channel(channel: &AddressChannel) -> Self {
        Self {
            id: channel.id,
            size: channel.size & 0b111,
            length: channel.len,
            burst: Burst::from_u2(channel.burst),
            exclusive: channel.lock,
            cache: channel.cache,
            prot: channel.prot,
            qos: channel.qos,
            region: channel.region,
            resp: Response::Okay,
        }
    }

    pub fn beat_bytes(&self) -> usize {
        1 << self.size
    }

    pub fn beats(&self) -> usize {
        self.length as usize + 1
    }
}

/// A transfer request together with its data.
///
/// The data buffer is sized when the payload is created and is never resized afterwards.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Payload {
    address: u64,
    command: Command,
    data: Box<[u8]>,
    streaming_width: usize,
    /// One byte per data byte, `0xFF` if the byte is enabled. Empty if all bytes are enabled.
    byte_enable: Box<[u8]>,
    extension: Option<AxiExtension>,
}

impl Payload {
    /// Byte-enable value of an enabled byte.
    pub const BYTE_ENABLED: u8 = 0xFF;

    /// Byte-enable value of a disabled byte.
    pub const BYTE_DISABLED: u8 = 0x00;

    /// Creates a payload with a zeroed buffer of `data_length` bytes and no byte enables.
    pub fn new(command: Command, address: u64, data_length: usize) -> Self {
        Self {
            address,
            command,
            data: vec![0; data_length].into_boxed_slice(),
            streaming_width: data_length,
            byte_enable: Box::default(),
            extension: None,
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn set_address(&mut self, address: u64) {
        self.address = address;
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn is_read(&self) -> bool {
        self.command.is_read()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn data_length(&self) -> usize {
        self.data.len()
    }

    pub fn streaming_width(&self) -> usize {
        self.streaming_width
    }

    pub fn set_streaming_width(&mut self, streaming_width: usize) {
        self.streaming_width = streaming_width;
    }

    /// Returns the byte enables, or an empty slice if every byte is enabled.
    pub fn byte_enable(&self) -> &[u8] {
        &self.byte_enable
    }

    pub fn byte_enable_length(&self) -> usize {
        self.byte_enable.len()
    }

    /// Returns `true` if the byte at `offset` into the data buffer is enabled.
    pub fn is_byte_enabled(&self, offset: usize) -> bool {
        self.byte_enable
            .get(offset)
            .map_or(true, |&enable| enable == Self::BYTE_ENABLED)
    }

    /// Returns mutable byte enables, allocating them (all disabled) on first use.
    pub(crate) fn byte_enable_mut(&mut self) -> &mut [u8] {
        if self.byte_enable.is_empty() {
            self.byte_enable = vec![Self::BYTE_DISABLED; self.data.len()].into_boxed_slice();
        }
        &mut self.byte_enable
    }

    pub fn set_extension(&mut self, extension: AxiExtension) {
        self.extension = Some(extension);
    }

    /// Returns the AXI metadata, failing if the payload never had any attached.
    pub fn axi(&self) -> Result<&AxiExtension> {
        self.extension.as_ref().ok_or_else(|| {
            error!("axi4_extension missing on {} payload", self.command);
            Error::MissingExtension
        })
    }
}

/// Shared handle to a [`Payload`].
///
/// The adaptor keeps one reference for as long as the transaction is in flight. A target that
/// needs the transaction after returning from a transport call clones the handle, and drops it
/// when done. The payload is freed once the last handle is gone.
#[derive(Debug, Clone)]
pub struct Transaction(Rc<RefCell<Payload>>);

impl Transaction {
    pub fn new(payload: Payload) -> Self {
        Self(Rc::new(RefCell::new(payload)))
    }

    /// Immutably borrows the payload.
    ///
    /// # Panics
    ///
    /// Panics if the payload is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, Payload> {
        self.0.borrow()
    }

    /// Mutably borrows the payload.
    ///
    /// # Panics
    ///
    /// Panics if the payload is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, Payload> {
        self.0.borrow_mut()
    }

    /// Returns the number of handles to this transaction that are alive.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Returns `true` if both handles refer to the same transaction.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Transport interface of a transaction-level target.
pub trait ForwardTransport: Debug {
    /// Offers `trans` to the target at `phase`.
    ///
    /// The target may call back through `initiator` before returning, in which case those calls
    /// happen within the same simulated instant. If the target returns [`SyncStatus::Updated`],
    /// `phase` holds the phase the transaction moved to.
    ///
    /// Must not hold a borrow of `trans` while calling back into `initiator`.
    fn nb_transport_fw(
        &self,
        trans: &Transaction,
        phase: &mut Phase,
        delay: &mut Delay,
        initiator: &dyn BackwardTransport,
    ) -> Result<SyncStatus>;
}

/// Transport interface through which a target reports progress of a transaction.
pub trait BackwardTransport {
    /// Notifies the initiator that `trans` reached `phase`. On [`SyncStatus::Updated`] the
    /// initiator has written its follow-up phase into `phase`.
    fn nb_transport_bw(
        &self,
        trans: &Transaction,
        phase: &mut Phase,
        delay: &mut Delay,
    ) -> Result<SyncStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Read(ReadPhase::EndResp).is_terminal());
        assert!(Phase::Write(WritePhase::EndResp).is_terminal());
        assert!(!Phase::Read(ReadPhase::EndPartialResp).is_terminal());
        assert!(!Phase::Write(WritePhase::BeginResp).is_terminal());
        assert_eq!(Command::Write, Phase::Write(WritePhase::BeginReq).direction());
    }

    #[test]
    fn test_missing_extension() {
        let mut payload = Payload::new(Command::Read, 0x40, 8);
        assert_eq!(Err(Error::MissingExtension), payload.axi().map(|_| ()));
        payload.set_extension(AxiExtension {
            id: 3,
            ..Default::default()
        });
        assert_eq!(3, payload.axi().unwrap().id);
    }

    #[test]
    fn test_byte_enables() {
        let mut payload = Payload::new(Command::Write, 0, 4);
        assert_eq!(0, payload.byte_enable_length());
        assert!(payload.is_byte_enabled(2));
        payload.byte_enable_mut()[1] = Payload::BYTE_ENABLED;
        assert_eq!(4, payload.byte_enable_length());
        assert!(payload.is_byte_enabled(1));
        assert!(!payload.is_byte_enabled(2));
    }

    #[test]
    fn test_reference_counting() {
        let trans = Transaction::new(Payload::new(Command::Read, 0, 4));
        assert_eq!(1, trans.ref_count());
        let held = trans.clone();
        assert_eq!(2, trans.ref_count());
        assert!(held.ptr_eq(&trans));
        drop(held);
        assert_eq!(1, trans.ref_count());
    }
}
