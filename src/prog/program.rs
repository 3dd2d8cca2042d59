//! Immutable, finalized programs.

use super::instruction::Instruction;
use serde::{Deserialize, Serialize};

/// Which end of a flow a program drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Client,
    Server,
}

impl Side {
    pub fn peer(self) -> Side {
        match self {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        }
    }
}

/// Transport flavor the program assumes: ordered byte stream, or discrete
/// messages (datagram-like).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Stream,
    Message,
}

/// A finalized program: an ordered instruction list plus its payload buffers.
///
/// Immutable once built. One `Program` is shared read-only by every flow
/// instance of its template; per-flow mutable state (instruction pointer,
/// variable bindings, byte counters) lives in the emulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub(crate) side: Side,
    pub(crate) mode: Mode,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) buffers: Vec<Vec<u8>>,
    pub(crate) tx_bytes: u64,
    pub(crate) rx_watermark: u64,
    pub(crate) num_vars: u8,
}

impl Program {
    pub fn side(&self) -> Side {
        self.side
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn buffers(&self) -> &[Vec<u8>] {
        &self.buffers
    }

    pub fn buffer(&self, idx: usize) -> &[u8] {
        &self.buffers[idx]
    }

    /// Total payload bytes this program transmits on a straight-line pass
    /// (loops not expanded).
    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes
    }

    /// Final cumulative receive watermark of the program.
    pub fn rx_watermark(&self) -> u64 {
        self.rx_watermark
    }

    pub fn num_vars(&self) -> u8 {
        self.num_vars
    }
}
