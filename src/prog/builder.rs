//! Append-only program construction.
//!
//! The builder owns the growing instruction list plus the label and variable
//! tables. Structural errors are raised as early as possible: bad variable
//! use fails at the offending call, while jump targets may legitimately
//! reference labels that are emitted later, so unresolved labels only fail at
//! `finalize`.

use super::error::ProgramError;
use super::instruction::{BufId, Instruction, MAX_FLOW_VARS, VarId};
use super::program::{Mode, Program, Side};
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Counter,
    Tick,
}

#[derive(Debug)]
pub struct ProgramBuilder {
    side: Side,
    mode: Mode,
    instructions: Vec<Instruction>,
    buffers: Vec<Vec<u8>>,
    buf_ids: HashMap<Vec<u8>, BufId>,
    labels: HashMap<String, usize>,
    // (instruction index, label name) pairs resolved at finalize
    fixups: Vec<(usize, String)>,
    var_ids: HashMap<String, (VarId, VarKind)>,
    tx_bytes: u64,
    rx_watermark: u64,
}

impl ProgramBuilder {
    /// Stream-mode builder for one side of a flow.
    pub fn new(side: Side) -> Self {
        Self::with_mode(side, Mode::Stream)
    }

    pub fn with_mode(side: Side, mode: Mode) -> Self {
        Self {
            side,
            mode,
            instructions: Vec::new(),
            buffers: Vec::new(),
            buf_ids: HashMap::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            var_ids: HashMap::new(),
            tx_bytes: 0,
            rx_watermark: 0,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of instructions appended so far. The next appended instruction
    /// gets this index.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Append a send of `payload`. Identical payloads share one buffer slot.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), ProgramError> {
        if payload.is_empty() {
            return Err(ProgramError::EmptyBuffer);
        }
        let buf_index = match self.buf_ids.get(payload) {
            Some(&id) => id,
            None => {
                let id = BufId(self.buffers.len() as u16);
                self.buffers.push(payload.to_vec());
                self.buf_ids.insert(payload.to_vec(), id);
                id
            }
        };
        self.tx_bytes = self.tx_bytes.saturating_add(payload.len() as u64);
        self.instructions.push(Instruction::Send { buf_index });
        Ok(())
    }

    /// Append a receive of `bytes` more bytes; the flow suspends until the
    /// program's cumulative delivered-byte watermark is reached.
    pub fn recv(&mut self, bytes: u64) -> Result<(), ProgramError> {
        self.push_recv(bytes, false)
    }

    /// As `recv`, but the instruction is satisfied by any newly delivered
    /// byte; accumulation is the program's job (counting variable + jump).
    pub fn recv_partial(&mut self, bytes: u64) -> Result<(), ProgramError> {
        self.push_recv(bytes, true)
    }

    fn push_recv(&mut self, bytes: u64, partial: bool) -> Result<(), ProgramError> {
        if bytes == 0 {
            return Err(ProgramError::ZeroRecvBytes);
        }
        self.rx_watermark = self.rx_watermark.saturating_add(bytes);
        self.instructions.push(Instruction::Recv {
            min_bytes: self.rx_watermark,
            partial,
        });
        Ok(())
    }

    /// Suspend this flow for `usec`; other flows are unaffected.
    pub fn delay(&mut self, usec: u64) {
        self.instructions.push(Instruction::Delay { usec });
    }

    pub fn delay_rand(&mut self, min_usec: u64, max_usec: u64) -> Result<(), ProgramError> {
        if min_usec > max_usec {
            return Err(ProgramError::BadDelayRange);
        }
        self.instructions
            .push(Instruction::DelayRand { min_usec, max_usec });
        Ok(())
    }

    /// Initialize or overwrite a per-flow counter.
    pub fn set_var(&mut self, name: &str, val: u64) -> Result<(), ProgramError> {
        let id = self.var(name, VarKind::Counter)?;
        self.instructions.push(Instruction::SetVar { id, val });
        Ok(())
    }

    /// Snapshot current virtual time into a variable, for `jmp_dp`.
    pub fn set_tick_var(&mut self, name: &str) -> Result<(), ProgramError> {
        let id = self.var(name, VarKind::Tick)?;
        self.instructions.push(Instruction::SetTickVar { id });
        Ok(())
    }

    /// Mark the current position; jumps land on the instruction after it.
    pub fn set_label(&mut self, label: &str) -> Result<(), ProgramError> {
        if self.labels.contains_key(label) {
            return Err(ProgramError::DuplicateLabel(label.to_string()));
        }
        self.labels.insert(label.to_string(), self.instructions.len());
        self.instructions.push(Instruction::SetLabel {
            label: label.to_string(),
        });
        Ok(())
    }

    /// Decrement-and-test loop jump: the body between `label` and this
    /// instruction runs exactly N times after `set_var(var, N)`.
    pub fn jmp_nz(&mut self, var: &str, label: &str) -> Result<(), ProgramError> {
        let id = self.counter(var)?;
        self.fixups.push((self.instructions.len(), label.to_string()));
        self.instructions.push(Instruction::JmpNz { id, offset: 0 });
        Ok(())
    }

    /// Time-bounded loop jump: repeats while less than `duration_usec` has
    /// elapsed since the `set_tick_var` snapshot in `var`.
    pub fn jmp_dp(
        &mut self,
        var: &str,
        label: &str,
        duration_usec: u64,
    ) -> Result<(), ProgramError> {
        let id = self.tick(var)?;
        self.fixups.push((self.instructions.len(), label.to_string()));
        self.instructions.push(Instruction::JmpDp {
            id,
            offset: 0,
            duration_usec,
        });
        Ok(())
    }

    /// Toggle whether subsequent sends wait for the transfer to complete
    /// (`true`, default) or pipeline into the transport buffer (`false`).
    pub fn set_send_blocking(&mut self, blocking: bool) {
        self.instructions
            .push(Instruction::SetSendBlocking { blocking });
    }

    /// Actively open the transport. Client programs only.
    pub fn connect(&mut self) -> Result<(), ProgramError> {
        if self.side != Side::Client {
            return Err(ProgramError::SideRestricted {
                op: "connect",
                side: self.side,
            });
        }
        self.instructions.push(Instruction::Connect);
        Ok(())
    }

    /// Passively complete an open. Server programs only.
    pub fn accept(&mut self) -> Result<(), ProgramError> {
        if self.side != Side::Server {
            return Err(ProgramError::SideRestricted {
                op: "accept",
                side: self.side,
            });
        }
        self.instructions.push(Instruction::Accept);
        Ok(())
    }

    /// Abort the connection hard (no graceful close).
    pub fn reset(&mut self) {
        self.instructions.push(Instruction::Reset);
    }

    /// Hold this side open until the peer closes first.
    pub fn wait_for_peer_close(&mut self) {
        self.instructions.push(Instruction::WaitForPeerClose);
    }

    /// Resolve all jump targets and freeze the program.
    pub fn finalize(mut self) -> Result<Program, ProgramError> {
        for (at, label) in std::mem::take(&mut self.fixups) {
            let target = *self
                .labels
                .get(&label)
                .ok_or_else(|| ProgramError::UndefinedLabel(label.clone()))?
                + 1;
            match &mut self.instructions[at] {
                Instruction::JmpNz { offset, .. } | Instruction::JmpDp { offset, .. } => {
                    *offset = target;
                }
                other => unreachable!("fixup on non-jump instruction {other:?}"),
            }
        }
        trace!(
            side = ?self.side,
            instructions = self.instructions.len(),
            buffers = self.buffers.len(),
            "程序已定稿"
        );
        Ok(Program {
            side: self.side,
            mode: self.mode,
            instructions: self.instructions,
            buffers: self.buffers,
            tx_bytes: self.tx_bytes,
            rx_watermark: self.rx_watermark,
            num_vars: self.var_ids.len() as u8,
        })
    }

    fn var(&mut self, name: &str, kind: VarKind) -> Result<VarId, ProgramError> {
        if let Some(&(id, existing)) = self.var_ids.get(name) {
            if existing != kind {
                return Err(match kind {
                    VarKind::Counter => ProgramError::NotACounter(name.to_string()),
                    VarKind::Tick => ProgramError::NotATickVar(name.to_string()),
                });
            }
            return Ok(id);
        }
        if self.var_ids.len() >= MAX_FLOW_VARS {
            return Err(ProgramError::TooManyVars);
        }
        let id = VarId(self.var_ids.len() as u8);
        self.var_ids.insert(name.to_string(), (id, kind));
        Ok(id)
    }

    fn counter(&self, name: &str) -> Result<VarId, ProgramError> {
        match self.var_ids.get(name) {
            Some(&(id, VarKind::Counter)) => Ok(id),
            Some(_) => Err(ProgramError::NotACounter(name.to_string())),
            None => Err(ProgramError::UnknownVar(name.to_string())),
        }
    }

    fn tick(&self, name: &str) -> Result<VarId, ProgramError> {
        match self.var_ids.get(name) {
            Some(&(id, VarKind::Tick)) => Ok(id),
            Some(_) => Err(ProgramError::NotATickVar(name.to_string())),
            None => Err(ProgramError::UnknownVar(name.to_string())),
        }
    }
}
