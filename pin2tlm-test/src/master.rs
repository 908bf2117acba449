//! Pin-level AXI4 master that plays a fixed list of requests.

use log::warn;
use pin2tlm_core::signals::{AddressChannel, PinInputs, PinOutputs, Response, WriteDataBeat};
use pin2tlm_core::BusWidth;
use std::collections::{HashMap, VecDeque};

/// Data collected for one read burst.
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    beat_bytes: usize,
    pub data: Vec<u8>,
    pub responses: Vec<Response>,
    /// Set once the beat flagged as last arrived.
    pub complete: bool,
}

/// Drives the master side of the five channels, one clock edge at a time.
///
/// Address requests are issued in the order they were queued. The master always accepts read data
/// and write responses, unless backpressure is enabled, in which case it stalls both response
/// channels every other cycle.
#[derive(Debug)]
pub struct Master {
    width: BusWidth,
    reset_cycles: u32,
    backpressure: bool,
    cycle: u64,
    reads: VecDeque<AddressChannel>,
    writes: VecDeque<AddressChannel>,
    beats: VecDeque<WriteDataBeat>,
    read_results: HashMap<u32, ReadResult>,
    write_responses: Vec<(u32, Response)>,
    outstanding_reads: usize,
    outstanding_writes: usize,
}

impl Master {
    /// Creates a master that holds reset for `reset_cycles` edges before issuing requests.
    pub fn new(width: BusWidth, reset_cycles: u32, backpressure: bool) -> Self {
        Self {
            width,
            reset_cycles,
            backpressure,
            cycle: 0,
            reads: VecDeque::new(),
            writes: VecDeque::new(),
            beats: VecDeque::new(),
            read_results: HashMap::new(),
            write_responses: Vec::new(),
            outstanding_reads: 0,
            outstanding_writes: 0,
        }
    }

    /// Queues an incrementing read burst of `len + 1` beats of `1 << size` bytes.
    pub fn read(&mut self, id: u32, addr: u64, len: u8, size: u8) {
        self.reads.push_back(AddressChannel {
            id,
            addr,
            len,
            size,
            burst: 1,
            ..Default::default()
        });
    }

    /// Queues an incrementing write burst carrying `data`, split into beats of `1 << size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `data` is empty, is not a whole number of beats, or needs more than 256 beats.
    /// Also panics if a beat is wider than the bus.
    pub fn write(&mut self, id: u32, addr: u64, size: u8, data: &[u8]) {
        let beat_bytes = 1usize << size;
        assert!(!data.is_empty() && data.len() % beat_bytes == 0);
        let beats = data.len() / beat_bytes;
        let len = u8::try_from(beats - 1).expect("burst longer than 256 beats");
        let lanes = u32::try_from(beat_bytes)
            .ok()
            .and_then(BusWidth::new)
            .expect("beat size is not a valid bus width");

        self.writes.push_back(AddressChannel {
            id,
            addr,
            len,
            size,
            burst: 1,
            ..Default::default()
        });
        for (i, chunk) in data.chunks(beat_bytes).enumerate() {
            let mut beat = WriteDataBeat::idle(self.width);
            beat.data[..beat_bytes].copy_from_slice(chunk);
            beat.strb = lanes.strobe_mask();
            beat.last = i == beats - 1;
            self.beats.push_back(beat);
        }
    }

    /// Returns `true` once every queued request went out and got its response.
    pub fn is_done(&self) -> bool {
        self.reads.is_empty()
            && self.writes.is_empty()
            && self.beats.is_empty()
            && self.outstanding_reads == 0
            && self.outstanding_writes == 0
    }

    pub fn read_result(&self, id: u32) -> Option<&ReadResult> {
        self.read_results.get(&id)
    }

    pub fn write_responses(&self) -> &[(u32, Response)] {
        &self.write_responses
    }

    /// Returns the inputs to present at the next rising edge, given the adaptor's `outputs` as
    /// driven before that edge. Handshakes completing on that edge are accounted for right away.
    pub fn drive(&mut self, outputs: &PinOutputs) -> PinInputs {
        let mut inputs = PinInputs::idle(self.width);
        self.cycle += 1;
        if self.reset_cycles > 0 {
            self.reset_cycles -= 1;
            inputs.resetn = false;
            return inputs;
        }

        let stall = self.backpressure && self.cycle % 2 == 0;
        inputs.r_ready = !stall;
        inputs.b_ready = !stall;

        if outputs.r_valid && inputs.r_ready {
            self.take_read_beat(outputs);
        }
        if outputs.b_valid && inputs.b_ready {
            self.write_responses.push((outputs.b_id, outputs.b_resp));
            self.outstanding_writes = self.outstanding_writes.saturating_sub(1);
        }

        if let Some(ar) = self.reads.front() {
            inputs.ar_valid = true;
            inputs.ar = ar.clone();
            if outputs.ar_ready {
                self.read_results.insert(
                    ar.id,
                    ReadResult {
                        beat_bytes: ar.beat_bytes(),
                        ..Default::default()
                    },
                );
                self.outstanding_reads += 1;
                self.reads.pop_front();
            }
        }

        if let Some(aw) = self.writes.front() {
            inputs.aw_valid = true;
            inputs.aw = aw.clone();
            if outputs.aw_ready {
                self.outstanding_writes += 1;
                self.writes.pop_front();
            }
        }

        if let Some(beat) = self.beats.front() {
            inputs.w_valid = true;
            inputs.w = beat.clone();
            if outputs.w_ready {
                self.beats.pop_front();
            }
        }

        inputs
    }

    fn take_read_beat(&mut self, outputs: &PinOutputs) {
        let Some(result) = self.read_results.get_mut(&outputs.r_id) else {
            warn!("Read data for unknown ID {}", outputs.r_id);
            return;
        };
        if result.complete {
            warn!("Read data for finished ID {}", outputs.r_id);
            return;
        }
        result
            .data
            .extend_from_slice(&outputs.r_data[..result.beat_bytes]);
        result.responses.push(outputs.r_resp);
        if outputs.r_last {
            result.complete = true;
            self.outstanding_reads = self.outstanding_reads.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holds_reset() {
        let width = BusWidth::BITS_32;
        let mut master = Master::new(width, 2, false);
        master.read(1, 0, 0, 2);
        let outputs = PinOutputs {
            aw_ready: false,
            w_ready: false,
            b_valid: false,
            b_id: 0,
            b_resp: Response::Okay,
            ar_ready: true,
            r_valid: false,
            r_id: 0,
            r_data: vec![0; 4].into_boxed_slice(),
            r_resp: Response::Okay,
            r_last: false,
        };
        assert!(!master.drive(&outputs).resetn);
        assert!(!master.drive(&outputs).resetn);
        let inputs = master.drive(&outputs);
        assert!(inputs.resetn);
        assert!(inputs.ar_valid);
        assert!(!master.is_done());
    }

    #[test]
    fn test_write_beats() {
        let mut master = Master::new(BusWidth::BITS_64, 0, false);
        master.write(5, 0x10, 2, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(1, master.writes.len());
        assert_eq!(1, master.writes[0].len);
        assert_eq!(2, master.beats.len());
        assert_eq!(0xF, master.beats[0].strb);
        assert!(!master.beats[0].last);
        assert_eq!(&[5, 6, 7, 8, 0, 0, 0, 0], &*master.beats[1].data);
        assert!(master.beats[1].last);
    }
}
