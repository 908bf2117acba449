//! Errors raised by the adaptor.
//!
//! None of these are transient: each one points at a protocol violation by the attached bus master
//! or the downstream target, or at an integration bug. They are logged where they are detected and
//! then propagated to the caller, which is expected to stop the simulation.

use crate::tlm::{Command, Phase};
use crate::BusWidth;
use thiserror::Error;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    #[error("invalid transaction ID {id} ({direction})")]
    InvalidId { direction: Command, id: u32 },
    #[error("transaction ID {id} ({direction}) is already in flight")]
    DuplicateId { direction: Command, id: u32 },
    #[error("AXI extension missing")]
    MissingExtension,
    #[error("write burst (axi_id:{id}) received beat {beat}, but only {beats} beats were announced")]
    BurstOverrun { id: u32, beat: usize, beats: usize },
    #[error("phase {phase} cannot be applied to a {direction} transaction (axi_id:{id})")]
    UnexpectedPhase {
        direction: Command,
        id: u32,
        phase: Phase,
    },
    #[error("beat of {beat_bytes} bytes does not fit on a {width} data bus")]
    BeatTooWide { beat_bytes: usize, width: BusWidth },
    #[error("write data of {lanes} byte lanes sampled on a {width} data bus")]
    DataWidthMismatch { lanes: usize, width: BusWidth },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
