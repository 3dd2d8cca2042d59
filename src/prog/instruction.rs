//! Program instruction set.
//!
//! A program is an ordered list of `Instruction` values; the engine walks the
//! list with an instruction pointer per flow instance. Serialized command
//! names follow the engine database format (`tx`, `rx`, `delay`, ...), so a
//! compiled profile can be diffed against engine-side dumps.

use serde::{Deserialize, Serialize};

/// Per-flow variable register. Programs address variables by register id;
/// names exist only in the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarId(pub u8);

/// Index into a program's buffer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufId(pub u16);

/// Engine bound on distinct flow variables per program.
pub const MAX_FLOW_VARS: usize = 8;

/// One program instruction.
///
/// `JmpNz`/`JmpDp` carry the resolved absolute target index — the index of
/// the instruction *following* the named label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Instruction {
    /// Transmit one buffer (a stream chunk, or a datagram in message mode).
    #[serde(rename = "tx")]
    Send { buf_index: BufId },
    /// Wait for received bytes. `min_bytes` is the cumulative watermark for
    /// the whole program; with `partial` the instruction completes on any
    /// newly delivered byte instead.
    #[serde(rename = "rx")]
    Recv {
        min_bytes: u64,
        #[serde(default)]
        partial: bool,
    },
    /// Suspend this flow for `usec`.
    Delay { usec: u64 },
    /// Suspend this flow for a uniformly sampled duration in range.
    #[serde(rename = "delay_rnd")]
    DelayRand { min_usec: u64, max_usec: u64 },
    /// Initialize or overwrite a counter variable.
    SetVar { id: VarId, val: u64 },
    /// Snapshot current virtual time (ns) into a variable.
    SetTickVar { id: VarId },
    /// Position marker; executes as a no-op.
    SetLabel { label: String },
    /// Decrement `id`, jump to `offset` while the result is non-zero.
    JmpNz { id: VarId, offset: usize },
    /// Jump to `offset` while time elapsed since the tick snapshot in `id`
    /// is below `duration_usec`.
    JmpDp {
        id: VarId,
        offset: usize,
        duration_usec: u64,
    },
    /// Toggle blocking for subsequent sends.
    #[serde(rename = "tx_mode")]
    SetSendBlocking { blocking: bool },
    /// Actively open the transport (client side).
    Connect,
    /// Passively complete an open (server side).
    Accept,
    /// Abort the connection hard; terminal for both sides.
    Reset,
    /// Suspend until the peer has closed its side, without closing ours.
    #[serde(rename = "nc")]
    WaitForPeerClose,
}

impl Instruction {
    /// Jump instructions reference another position in the program.
    pub fn is_jump(&self) -> bool {
        matches!(self, Instruction::JmpNz { .. } | Instruction::JmpDp { .. })
    }
}
