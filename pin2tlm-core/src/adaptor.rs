//! Bridge from a pin-level AXI4 master to a transaction-level target.
//!
//! On every rising clock edge [`Pin2TlmAdaptor::tick`] samples the five AXI channels, turns
//! completed address handshakes into [`Transaction`]s, collects write data beats into them, and
//! forwards them to the target. The target reports progress through
//! [`BackwardTransport::nb_transport_bw`], which the adaptor turns back into read data beats on the
//! pins and uses to retire finished transactions.
//!
//! Both paths share the transaction [`Registry`]. The backward path may be entered from inside the
//! forward call (same simulated instant), so the adaptor never holds a borrow of its state across
//! a call into the target.

use crate::beat;
use crate::error::{Error, Result};
use crate::registry::{Registry, TransactionKey};
use crate::signals::{AddressChannel, PinInputs, PinOutputs, Response};
use crate::tlm::{
    AxiExtension, BackwardTransport, Command, Delay, ForwardTransport, Payload, Phase, ReadPhase,
    SyncStatus, Transaction, WritePhase,
};
use crate::BusWidth;
use log::{debug, error, trace, warn};
use std::cell::RefCell;
use std::collections::VecDeque;

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Width of the data bus on the pin-level side.
    pub bus_width: BusWidth,
    /// If `true`, asserting reset also drops every in-flight transaction. Otherwise reset only
    /// affects the pins, and transactions survive it.
    pub flush_on_reset: bool,
}

/// A read data beat waiting for the read-data channel.
#[derive(Debug, Clone)]
struct ReadBeat {
    id: u32,
    data: Box<[u8]>,
    resp: Response,
    last: bool,
}

/// A write response waiting for the write-response channel.
#[derive(Debug, Clone, Copy)]
struct WriteResponse {
    id: u32,
    resp: Response,
}

#[derive(Debug)]
struct State {
    registry: Registry,
    outputs: PinOutputs,
    /// IDs of write bursts whose address handshake completed, in the order their data beats must
    /// arrive.
    write_order: VecDeque<u32>,
    /// Read beats produced while the read-data channel was occupied.
    read_beats: VecDeque<ReadBeat>,
    /// Write responses produced while the write-response channel was occupied.
    write_responses: VecDeque<WriteResponse>,
}

impl State {
    fn new(width: BusWidth) -> Self {
        Self {
            registry: Registry::new(),
            outputs: PinOutputs::new(width),
            write_order: VecDeque::new(),
            read_beats: VecDeque::new(),
            write_responses: VecDeque::new(),
        }
    }

    /// Frees the response channels whose handshake completes on this edge.
    fn accept_responses(&mut self, inputs: &PinInputs) {
        if self.outputs.r_valid && inputs.r_ready {
            self.outputs.r_valid = false;
            self.outputs.r_last = false;
        }
        if self.outputs.b_valid && inputs.b_ready {
            self.outputs.b_valid = false;
        }
    }

    /// Puts the oldest queued beat and response on any response channel that is free.
    fn drive_responses(&mut self) {
        if !self.outputs.r_valid {
            if let Some(beat) = self.read_beats.pop_front() {
                self.outputs.r_valid = true;
                self.outputs.r_id = beat.id;
                self.outputs.r_data = beat.data;
                self.outputs.r_resp = beat.resp;
                self.outputs.r_last = beat.last;
            }
        }
        if !self.outputs.b_valid {
            if let Some(response) = self.write_responses.pop_front() {
                self.outputs.b_valid = true;
                self.outputs.b_id = response.id;
                self.outputs.b_resp = response.resp;
            }
        }
    }
}

/// A transaction ready to be handed to the target.
struct Dispatch {
    key: TransactionKey,
    trans: Transaction,
    phase: Phase,
}

/// Converts pin-level AXI4 traffic into transactions for `T`, and the target's progress
/// notifications back into pin-level responses.
#[derive(Debug)]
pub struct Pin2TlmAdaptor<T: ForwardTransport> {
    config: Config,
    target: T,
    state: RefCell<State>,
}

impl<T: ForwardTransport> Pin2TlmAdaptor<T> {
    /// Creates an adaptor forwarding to `target`, with its outputs in reset state.
    pub fn new(config: Config, target: T) -> Self {
        let state = RefCell::new(State::new(config.bus_width));
        Self {
            config,
            target,
            state,
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Returns the outputs as currently driven.
    pub fn outputs(&self) -> PinOutputs {
        self.state.borrow().outputs.clone()
    }

    /// Returns the number of transactions in flight.
    pub fn in_flight(&self) -> usize {
        self.state.borrow().registry.len()
    }

    /// Returns the in-flight transaction registered under `direction` and `id`.
    pub fn transaction(&self, direction: Command, id: u32) -> Result<Transaction> {
        let state = self.state.borrow();
        let handle = state.registry.lookup(TransactionKey::new(direction, id))?;
        Ok(handle.transaction().clone())
    }

    /// Returns the current phase of the transaction registered under `direction` and `id`.
    pub fn phase(&self, direction: Command, id: u32) -> Result<Phase> {
        let state = self.state.borrow();
        let handle = state.registry.lookup(TransactionKey::new(direction, id))?;
        Ok(handle.phase())
    }

    /// Drives the reset values onto the outputs.
    ///
    /// All valid and last signals are deasserted, the read-address channel is made ready and the
    /// write-address channel not ready. Responses that were still waiting for their channel are
    /// dropped. In-flight transactions are left alone unless [`Config::flush_on_reset`] is set.
    pub fn reset(&self) {
        trace!("Reset adaptor");
        let mut state = self.state.borrow_mut();
        let outputs = &mut state.outputs;
        outputs.r_valid = false;
        outputs.r_last = false;
        outputs.b_valid = false;
        outputs.ar_ready = true;
        outputs.aw_ready = false;
        outputs.w_ready = false;
        state.read_beats.clear();
        state.write_responses.clear();

        if self.config.flush_on_reset && !state.registry.is_empty() {
            let flushed = state.registry.drain().count();
            state.write_order.clear();
            debug!("Flushed {flushed} in-flight transactions on reset");
        }
    }

    /// Advances the adaptor by one rising clock edge, sampling `inputs`.
    ///
    /// A handshake on an input channel happens if its valid input is high while the matching ready
    /// output, as driven before this edge, is high. Transactions that became ready during this edge
    /// are forwarded to the target before returning.
    ///
    /// A protocol error on one channel does not hold back the others: every handshake of the edge
    /// is still processed and forwarded, after which the first error is returned.
    pub fn tick(&self, inputs: &PinInputs) -> Result<()> {
        if !inputs.resetn {
            self.reset();
            return Ok(());
        }

        let (dispatches, mut result) = self.sample(inputs);
        for dispatch in dispatches {
            result = result.and(self.dispatch(dispatch));
        }
        result
    }

    /// Samples all channels, returning the transactions that must be forwarded together with the
    /// first error any channel ran into.
    fn sample(&self, inputs: &PinInputs) -> (Vec<Dispatch>, Result<()>) {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let mut dispatches = Vec::new();
        let mut result = Ok(());

        state.accept_responses(inputs);

        let ar_handshake = inputs.ar_valid && state.outputs.ar_ready;
        let aw_handshake = inputs.aw_valid && state.outputs.aw_ready;
        let w_handshake = inputs.w_valid && state.outputs.w_ready;

        if inputs.ar_valid {
            state.outputs.ar_ready = true;
        }
        if inputs.aw_valid {
            state.outputs.aw_ready = true;
        }

        if ar_handshake {
            match self.sample_read_address(state, &inputs.ar) {
                Ok(dispatch) => dispatches.push(dispatch),
                Err(err) => result = result.and(Err(err)),
            }
        }
        if aw_handshake {
            result = result.and(self.sample_write_address(state, &inputs.aw));
        }
        if w_handshake {
            match self.sample_write_data(state, inputs) {
                Ok(Some(dispatch)) => dispatches.push(dispatch),
                Ok(None) => {}
                Err(err) => result = result.and(Err(err)),
            }
        }

        state.outputs.w_ready = !state.write_order.is_empty();
        state.drive_responses();
        (dispatches, result)
    }

    /// Builds a transaction for an address handshake, with a buffer for the whole burst.
    fn new_transaction(&self, command: Command, channel: &AddressChannel) -> Result<Transaction> {
        let width = self.config.bus_width;
        if channel.beat_bytes() > width.lanes() {
            error!(
                "{command} burst (axi_id:{}) uses {}-byte beats on a {width} bus",
                channel.id,
                channel.beat_bytes()
            );
            return Err(Error::BeatTooWide {
                beat_bytes: channel.beat_bytes(),
                width,
            });
        }

        let length = channel.burst_bytes();
        let mut payload = Payload::new(command, channel.addr, length);
        payload.set_streaming_width(length);
        payload.set_extension(AxiExtension::from_address_channel(channel));
        Ok(Transaction::new(payload))
    }

    fn sample_read_address(&self, state: &mut State, ar: &AddressChannel) -> Result<Dispatch> {
        trace!(axi_id = ar.id; "Read address handshake at {:#x}, {} beats", ar.addr, ar.beats());
        let key = TransactionKey::read(ar.id);
        let trans = self.new_transaction(Command::Read, ar)?;
        let phase = Phase::Read(ReadPhase::BeginReq);
        state.registry.create(key, phase, trans.clone())?;
        Ok(Dispatch { key, trans, phase })
    }

    fn sample_write_address(&self, state: &mut State, aw: &AddressChannel) -> Result<()> {
        trace!(axi_id = aw.id; "Write address handshake at {:#x}, {} beats", aw.addr, aw.beats());
        let key = TransactionKey::write(aw.id);
        let trans = self.new_transaction(Command::Write, aw)?;
        state
            .registry
            .create(key, Phase::Write(WritePhase::BeginPartialReq), trans)?;
        state.write_order.push_back(aw.id);
        Ok(())
    }

    /// Stores one write beat. Returns the transaction once its final beat arrived.
    fn sample_write_data(&self, state: &mut State, inputs: &PinInputs) -> Result<Option<Dispatch>> {
        // `w_ready` is only raised while a burst waits for data.
        let Some(&id) = state.write_order.front() else {
            return Ok(None);
        };
        let width = self.config.bus_width;
        if inputs.w.data.len() != width.lanes() {
            error!(
                "Write beat (axi_id:{id}) carries {} byte lanes on a {width} bus",
                inputs.w.data.len()
            );
            return Err(Error::DataWidthMismatch {
                lanes: inputs.w.data.len(),
                width,
            });
        }
        let key = TransactionKey::write(id);
        let handle = state.registry.lookup_mut(key)?;
        let trans = handle.transaction().clone();

        let (beat_bytes, beats) = {
            let payload = trans.borrow();
            let ext = payload.axi()?;
            (ext.beat_bytes(), ext.beats())
        };

        let beat = handle.advance_beat();
        let stored = beat::unpack_write_beat(
            &mut trans.borrow_mut(),
            beat,
            beat_bytes,
            &inputs.w.data,
            inputs.w.strb & width.strobe_mask(),
        );
        if !stored {
            error!("Write burst (axi_id:{id}) overran its {beats} beats");
            return Err(Error::BurstOverrun { id, beat, beats });
        }
        trace!(axi_id = id; "Write beat {}/{beats}", beat + 1);

        if !inputs.w.last {
            return Ok(None);
        }
        if beat + 1 < beats {
            warn!(
                "Write burst (axi_id:{id}) ended after {} of {beats} beats",
                beat + 1
            );
        }

        let phase = Phase::Write(WritePhase::BeginReq);
        handle.set_phase(phase);
        state.write_order.pop_front();
        // The response is given optimistically, the target cannot report write errors.
        state.write_responses.push_back(WriteResponse {
            id,
            resp: Response::Okay,
        });
        Ok(Some(Dispatch { key, trans, phase }))
    }

    /// Hands a transaction to the target, then applies the phase the target returned.
    fn dispatch(&self, dispatch: Dispatch) -> Result<()> {
        let Dispatch { key, trans, phase } = dispatch;
        let mut next = phase;
        let mut delay = Delay::ZERO;
        trace!(axi_id = key.id; "Forwarding {} trans at {phase}", key.direction);

        let status = self
            .target
            .nb_transport_fw(&trans, &mut next, &mut delay, self)?;

        match status {
            SyncStatus::Accepted => {}
            SyncStatus::Updated => {
                let mut state = self.state.borrow_mut();
                let state = &mut *state;
                // A backward call from within the forward call may already have moved the
                // transaction on, or retired it.
                let current = state.registry.find(key).map(|handle| handle.phase());
                if current != Some(phase) {
                    return Ok(());
                }
                if is_begin_response(next) {
                    trace!(axi_id = key.id; "Target answered with {next} in forward call");
                    self.progress(state, key, &trans, next)?;
                } else {
                    state.registry.lookup_mut(key)?.set_phase(next);
                }
            }
            SyncStatus::Completed => self.complete(key, &trans)?,
        }
        Ok(())
    }

    /// Finishes a transaction the target completed in a single forward call.
    fn complete(&self, key: TransactionKey, trans: &Transaction) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        if !state.registry.contains(key) {
            return Ok(());
        }
        trace!(axi_id = key.id; "{} trans completed in forward call", key.direction);

        if key.direction.is_read() {
            let beats = trans.borrow().axi()?.beats();
            loop {
                let remaining = beats.saturating_sub(state.registry.lookup(key)?.beats_done());
                if remaining == 0 {
                    break;
                }
                self.send_read_beat(state, key, trans, remaining == 1)?;
            }
            state.drive_responses();
        }
        state
            .registry
            .lookup_mut(key)?
            .set_phase(terminal_phase(key.direction));
        state.registry.retire(key)?;
        Ok(())
    }

    /// Queues the next beat of a read transaction for the read-data channel, and moves the
    /// transaction's address on by one bus width.
    fn send_read_beat(
        &self,
        state: &mut State,
        key: TransactionKey,
        trans: &Transaction,
        last: bool,
    ) -> Result<()> {
        let width = self.config.bus_width;
        let handle = state.registry.lookup_mut(key)?;
        let beat = handle.advance_beat();

        let mut payload = trans.borrow_mut();
        let (beat_bytes, resp) = {
            let ext = payload.axi()?;
            (ext.beat_bytes(), ext.resp)
        };
        let mut data = vec![0; width.lanes()].into_boxed_slice();
        if !beat::pack_read_beat(&mut data, &payload, beat, beat_bytes) {
            warn!(
                "Read burst (axi_id:{}) has no data for beat {}, driving zeros",
                key.id,
                beat + 1
            );
        }
        let address = payload.address() + u64::from(width.bytes());
        payload.set_address(address);

        trace!(axi_id = key.id; "Read beat {} (last: {last})", beat + 1);
        state.read_beats.push_back(ReadBeat {
            id: key.id,
            data,
            resp,
            last,
        });
        Ok(())
    }

    /// Applies a phase reported by the target, either through the backward path or as the answer
    /// to a forward call. Returns the follow-up phase, after which a finished transaction is
    /// retired.
    fn progress(
        &self,
        state: &mut State,
        key: TransactionKey,
        trans: &Transaction,
        phase: Phase,
    ) -> Result<(Phase, SyncStatus)> {
        let (next, status) = match (phase, key.direction) {
            (Phase::Read(read), Command::Read) => {
                let (next, status) = self.read_progress(state, key, trans, read)?;
                (Phase::Read(next), status)
            }
            (Phase::Write(write), Command::Write) => {
                let (next, status) = self.write_progress(write);
                (Phase::Write(next), status)
            }
            _ => {
                error!(
                    "Phase {phase} does not apply to {} trans (axi_id:{})",
                    key.direction, key.id
                );
                return Err(Error::UnexpectedPhase {
                    direction: key.direction,
                    id: key.id,
                    phase,
                });
            }
        };

        state.registry.lookup_mut(key)?.set_phase(next);
        if next.is_terminal() {
            state.registry.retire(key)?;
        }
        state.drive_responses();
        Ok((next, status))
    }

    /// Applies a read-side phase reported by the target. Returns the follow-up phase.
    fn read_progress(
        &self,
        state: &mut State,
        key: TransactionKey,
        trans: &Transaction,
        phase: ReadPhase,
    ) -> Result<(ReadPhase, SyncStatus)> {
        let beats = trans.borrow().axi()?.beats();
        let remaining = beats.saturating_sub(state.registry.lookup(key)?.beats_done());

        match phase {
            ReadPhase::BeginPartialResp if remaining > 1 => {
                self.send_read_beat(state, key, trans, false)?;
                Ok((ReadPhase::EndPartialResp, SyncStatus::Updated))
            }
            ReadPhase::BeginResp => {
                if remaining != 1 {
                    warn!(
                        "Read burst (axi_id:{}) finished with {remaining} beats outstanding",
                        key.id
                    );
                }
                self.send_read_beat(state, key, trans, true)?;
                Ok((ReadPhase::EndResp, SyncStatus::Updated))
            }
            // Some targets announce a partial response even when only the final beat is left.
            // It is acknowledged without putting anything on the bus.
            ReadPhase::BeginPartialResp => Ok((ReadPhase::EndPartialResp, SyncStatus::Updated)),
            other => Ok((other, SyncStatus::Accepted)),
        }
    }

    /// Applies a write-side phase reported by the target. Returns the follow-up phase.
    fn write_progress(&self, phase: WritePhase) -> (WritePhase, SyncStatus) {
        match phase {
            // The write response was already driven when the last data beat arrived.
            WritePhase::BeginResp => (WritePhase::EndResp, SyncStatus::Updated),
            other => (other, SyncStatus::Accepted),
        }
    }
}

/// Returns `true` for the phases with which a target hands over response data.
fn is_begin_response(phase: Phase) -> bool {
    matches!(
        phase,
        Phase::Read(ReadPhase::BeginPartialResp | ReadPhase::BeginResp)
            | Phase::Write(WritePhase::BeginResp)
    )
}

fn terminal_phase(direction: Command) -> Phase {
    match direction {
        Command::Read => Phase::Read(ReadPhase::EndResp),
        Command::Write => Phase::Write(WritePhase::EndResp),
    }
}

impl<T: ForwardTransport> BackwardTransport for Pin2TlmAdaptor<T> {
    fn nb_transport_bw(
        &self,
        trans: &Transaction,
        phase: &mut Phase,
        delay: &mut Delay,
    ) -> Result<SyncStatus> {
        let _ = delay;
        let (direction, id) = {
            let payload = trans.borrow();
            (payload.command(), payload.axi()?.id)
        };
        let key = TransactionKey::new(direction, id);

        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        // Fail before touching anything if the transaction is unknown.
        state.registry.lookup(key)?;
        trace!(axi_id = id; "Enter bw status: {phase} of {direction} trans");

        let (next, status) = self.progress(state, key, trans, *phase)?;
        *phase = next;
        trace!(axi_id = id; "Exit bw status: {next} of {direction} trans");

        Ok(status)
    }
}
