//! Clocked test bench: a pin-level master, the adaptor, and a memory target.

use crate::master::Master;
use crate::memory::MemoryTarget;
use crate::scenario::Expectations;
use log::{debug, trace};
use pin2tlm_core::signals::Response;
use pin2tlm_core::{Config, Pin2TlmAdaptor};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("adaptor error: {0}")]
    Adaptor(#[from] pin2tlm_core::Error),
    #[error("traffic did not finish within {0} cycles")]
    Timeout(u64),
    #[error("read burst (axi_id:{0}) never completed")]
    ReadMissing(u32),
    #[error("read burst (axi_id:{id}) returned {actual:02x?}, expected {expected:02x?}")]
    ReadMismatch {
        id: u32,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },
    #[error("write burst (axi_id:{id}) left {actual:02x?} at {address:#x}, expected {expected:02x?}")]
    WriteMismatch {
        id: u32,
        address: u64,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },
    #[error("write burst (axi_id:{0}) got no OKAY response")]
    WriteResponse(u32),
}

pub struct Bench {
    adaptor: Pin2TlmAdaptor<MemoryTarget>,
    master: Master,
    expect: Expectations,
    cycle: u64,
}

impl Bench {
    pub fn new(
        config: Config,
        target: MemoryTarget,
        master: Master,
        expect: Expectations,
    ) -> Self {
        Self {
            adaptor: Pin2TlmAdaptor::new(config, target),
            master,
            expect,
            cycle: 0,
        }
    }

    pub fn adaptor(&self) -> &Pin2TlmAdaptor<MemoryTarget> {
        &self.adaptor
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Returns `true` once the master got all its responses and nothing is left in flight.
    pub fn is_done(&self) -> bool {
        self.master.is_done()
            && self.adaptor.in_flight() == 0
            && self.adaptor.target().pending() == 0
    }

    /// Advances the whole bench by one rising clock edge.
    pub fn step(&mut self) -> Result<(), BenchError> {
        let outputs = self.adaptor.outputs();
        let inputs = self.master.drive(&outputs);
        self.adaptor.tick(&inputs)?;
        self.adaptor.target().tick(&self.adaptor)?;
        self.cycle += 1;
        trace!("Cycle {} done, {} in flight", self.cycle, self.adaptor.in_flight());
        Ok(())
    }

    /// Steps until all traffic finished, returning the number of cycles that took.
    pub fn run(&mut self, max_cycles: u64) -> Result<u64, BenchError> {
        while !self.is_done() {
            if self.cycle >= max_cycles {
                return Err(BenchError::Timeout(max_cycles));
            }
            self.step()?;
        }
        debug!("Traffic finished after {} cycles", self.cycle);
        Ok(self.cycle)
    }

    /// Checks the data the master read and the data left in memory against the expectations.
    pub fn verify(&self) -> Result<(), BenchError> {
        for read in &self.expect.reads {
            let result = self
                .master
                .read_result(read.id)
                .filter(|result| result.complete)
                .ok_or(BenchError::ReadMissing(read.id))?;
            let expected: Vec<u8> = (read.address..read.address + read.length as u64)
                .map(crate::scenario::pattern)
                .collect();
            if result.data != expected || result.responses.iter().any(|&r| r != Response::Okay) {
                return Err(BenchError::ReadMismatch {
                    id: read.id,
                    expected,
                    actual: result.data.clone(),
                });
            }
        }

        for write in &self.expect.writes {
            let mut actual = vec![0; write.data.len()];
            self.adaptor.target().read(&mut actual, write.address);
            if actual != write.data {
                return Err(BenchError::WriteMismatch {
                    id: write.id,
                    address: write.address,
                    expected: write.data.clone(),
                    actual,
                });
            }
            let okay = self
                .master
                .write_responses()
                .contains(&(write.id, Response::Okay));
            if !okay {
                return Err(BenchError::WriteResponse(write.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Timing;
    use crate::scenario::{Scenario, MEMORY_SIZE};
    use pin2tlm_core::BusWidth;

    struct Options {
        width: BusWidth,
        len: u8,
        timing: Timing,
        announce_partial: bool,
        backpressure: bool,
    }

    impl Default for Options {
        fn default() -> Self {
            Self {
                width: BusWidth::BITS_32,
                len: 3,
                timing: Timing::SameInstant,
                announce_partial: false,
                backpressure: false,
            }
        }
    }

    fn bench(scenario: Scenario, options: Options) -> Bench {
        let target = MemoryTarget::new(MEMORY_SIZE, options.timing, options.announce_partial)
            .unwrap();
        let mut master = Master::new(options.width, 2, options.backpressure);
        let expect = scenario.prepare(options.width, options.len, &target, &mut master);
        let config = Config {
            bus_width: options.width,
            ..Default::default()
        };
        Bench::new(config, target, master, expect)
    }

    fn run(scenario: Scenario, options: Options) {
        let mut bench = bench(scenario, options);
        bench.run(1000).unwrap();
        bench.verify().unwrap();
    }

    #[test]
    fn test_single_read() {
        run(Scenario::SingleRead, Options::default());
    }

    #[test]
    fn test_burst_read() {
        run(Scenario::BurstRead, Options::default());
    }

    #[test]
    fn test_burst_write() {
        run(Scenario::BurstWrite, Options::default());
    }

    #[test]
    fn test_mixed() {
        run(Scenario::Mixed, Options::default());
    }

    #[test]
    fn test_deferred_target() {
        for scenario in [Scenario::BurstRead, Scenario::BurstWrite, Scenario::Mixed] {
            run(
                scenario,
                Options {
                    timing: Timing::Deferred,
                    ..Default::default()
                },
            );
        }
    }

    #[test]
    fn test_announced_final_beat() {
        for timing in [Timing::SameInstant, Timing::Deferred] {
            run(
                Scenario::Mixed,
                Options {
                    timing,
                    announce_partial: true,
                    ..Default::default()
                },
            );
        }
    }

    #[test]
    fn test_backpressure() {
        for timing in [Timing::SameInstant, Timing::Deferred] {
            run(
                Scenario::Mixed,
                Options {
                    timing,
                    backpressure: true,
                    ..Default::default()
                },
            );
        }
    }

    #[test]
    fn test_wide_bus() {
        run(
            Scenario::Mixed,
            Options {
                width: BusWidth::BITS_128,
                len: 7,
                timing: Timing::Deferred,
                ..Default::default()
            },
        );
    }

    #[test]
    fn test_timeout() {
        let mut bench = bench(Scenario::BurstRead, Options::default());
        assert!(matches!(bench.run(3), Err(BenchError::Timeout(3))));
        assert_eq!(3, bench.cycle());
        assert!(!bench.is_done());
    }

    #[test]
    fn test_unfinished_read_fails_verification() {
        let bench = bench(Scenario::SingleRead, Options::default());
        assert!(matches!(bench.verify(), Err(BenchError::ReadMissing(1))));
        assert_eq!(0, bench.adaptor().in_flight());
    }
}
