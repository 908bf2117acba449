use bench::Bench;
use clap::Parser;
use log::{error, info};
use master::Master;
use memory::{MemoryTarget, Timing};
use pin2tlm_core::{BusWidth, Config};
use scenario::{Scenario, MEMORY_SIZE};
use std::process::ExitCode;

mod bench;
mod master;
mod memory;
mod scenario;

/// Cycles the master holds reset low before it starts issuing requests.
const RESET_CYCLES: u32 = 2;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Traffic to run through the adaptor
    #[arg(value_enum)]
    scenario: Scenario,
    /// Width of the data bus in bits
    #[arg(long, default_value_t = 32)]
    bus_width: u32,
    /// Burst length, encoded as on the bus (beats minus one)
    #[arg(long, default_value_t = 3)]
    len: u8,
    /// Let the memory respond one step per cycle instead of inside the forward call
    #[arg(long)]
    deferred: bool,
    /// Let the memory announce the final read beat with a partial response first
    #[arg(long)]
    announce_partial: bool,
    /// Stall the read-data and write-response channels every other cycle
    #[arg(long)]
    backpressure: bool,
    /// Drop in-flight transactions when reset is asserted
    #[arg(long)]
    flush_on_reset: bool,
    #[arg(long, default_value_t = 1000)]
    max_cycles: u64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let Some(bus_width) = BusWidth::from_bits(args.bus_width) else {
        error!("Unsupported bus width: {} bits", args.bus_width);
        return ExitCode::FAILURE;
    };
    let timing = if args.deferred {
        Timing::Deferred
    } else {
        Timing::SameInstant
    };
    let target = MemoryTarget::new(MEMORY_SIZE, timing, args.announce_partial)
        .expect("memory size is non-zero");
    let mut master = Master::new(bus_width, RESET_CYCLES, args.backpressure);
    let expect = args
        .scenario
        .prepare(bus_width, args.len, &target, &mut master);
    let config = Config {
        bus_width,
        flush_on_reset: args.flush_on_reset,
    };
    info!("Running {:?} on a {bus_width} bus", args.scenario);

    let mut bench = Bench::new(config, target, master, expect);
    match bench.run(args.max_cycles).and_then(|cycles| {
        bench.verify()?;
        Ok(cycles)
    }) {
        Ok(cycles) => {
            println!("{:?} passed after {cycles} cycles", args.scenario);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!(
                "{:?} failed after {} cycles with {} transactions in flight: {err}",
                args.scenario,
                bench.cycle(),
                bench.adaptor().in_flight()
            );
            ExitCode::FAILURE
        }
    }
}
