//! Per-flow instance state.
//!
//! A flow instance owns the *mutable* execution state of both sides; the
//! programs themselves are shared immutably across all instances of a
//! template.

use super::transport::Transport;
use crate::prog::{MAX_FLOW_VARS, Program, Side};
use crate::sim::SimTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub type FlowId = u64;

/// How a flow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Both programs ran off their instruction list.
    Finished,
    /// A `reset` instruction aborted the connection.
    Reset,
    /// The watchdog killed a flow that stopped making progress.
    Stalled,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Finished => write!(f, "finished"),
            EndReason::Reset => write!(f, "reset"),
            EndReason::Stalled => write!(f, "stalled"),
        }
    }
}

/// Why a side is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    None,
    /// Connection setup in flight.
    Established,
    /// Blocking send waiting for its transfer to complete.
    TxAck,
    /// Pipelined sends filled the transport queue.
    TxWindow,
    /// Current `recv` instruction unsatisfied.
    Rx,
    Delay,
    PeerClose,
}

#[derive(Debug)]
pub(crate) struct SideState {
    /// Instruction pointer into the side's program.
    pub ip: usize,
    pub vars: [u64; MAX_FLOW_VARS],
    /// Bytes delivered from the peer so far.
    pub rx_delivered: u64,
    /// Bytes already consumed by `recv` instructions.
    pub rx_consumed: u64,
    pub tx_bytes: u64,
    pub blocking: bool,
    pub wait: Wait,
    /// Ran off the end of the program (graceful half-close).
    pub closed: bool,
    /// Terminated by a reset, local or remote.
    pub aborted: bool,
    /// Observed the peer's half-close.
    pub peer_closed: bool,
}

impl SideState {
    fn new() -> Self {
        Self {
            ip: 0,
            vars: [0; MAX_FLOW_VARS],
            rx_delivered: 0,
            rx_consumed: 0,
            tx_bytes: 0,
            blocking: true,
            wait: Wait::None,
            closed: false,
            aborted: false,
            peer_closed: false,
        }
    }

    pub fn terminal(&self) -> bool {
        self.closed || self.aborted
    }
}

pub(crate) fn side_index(side: Side) -> usize {
    match side {
        Side::Client => 0,
        Side::Server => 1,
    }
}

/// One instantiated client-server connection pair.
#[derive(Debug)]
pub struct FlowInstance {
    pub id: FlowId,
    pub template_idx: usize,
    pub client_ip: Ipv4Addr,
    pub server_ip: Ipv4Addr,
    pub port: u16,
    pub(crate) programs: [Arc<Program>; 2],
    pub(crate) sides: [SideState; 2],
    pub(crate) transport: Transport,
    pub started_at: Option<SimTime>,
    pub ended_at: Option<SimTime>,
    pub end: Option<EndReason>,
}

impl FlowInstance {
    pub(crate) fn new(
        id: FlowId,
        template_idx: usize,
        client_ip: Ipv4Addr,
        server_ip: Ipv4Addr,
        port: u16,
        client_prog: Arc<Program>,
        server_prog: Arc<Program>,
    ) -> Self {
        Self {
            id,
            template_idx,
            client_ip,
            server_ip,
            port,
            programs: [client_prog, server_prog],
            sides: [SideState::new(), SideState::new()],
            transport: Transport::new(),
            started_at: None,
            ended_at: None,
            end: None,
        }
    }

    pub(crate) fn program(&self, side: Side) -> &Program {
        &self.programs[side_index(side)]
    }

    pub(crate) fn side(&self, side: Side) -> &SideState {
        &self.sides[side_index(side)]
    }

    pub(crate) fn side_mut(&mut self, side: Side) -> &mut SideState {
        &mut self.sides[side_index(side)]
    }

    pub fn is_done(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end
    }

    pub fn tx_bytes(&self, side: Side) -> u64 {
        self.sides[side_index(side)].tx_bytes
    }

    pub fn rx_bytes(&self, side: Side) -> u64 {
        self.sides[side_index(side)].rx_delivered
    }

    /// Duration from start to end, when the flow has ended.
    pub fn duration(&self) -> Option<SimTime> {
        match (self.started_at, self.ended_at) {
            (Some(s), Some(e)) => Some(e.saturating_since(s)),
            _ => None,
        }
    }
}
