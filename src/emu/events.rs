//! Emulation events.
//!
//! Every suspension of a flow side is resumed by exactly one of these; the
//! emulator never polls. Each event downcasts the world to `EmuWorld` and
//! hands off to the execution logic.

use super::flow::FlowId;
use super::world::EmuWorld;
use crate::prog::Side;
use crate::sim::{Event, Simulator, World};

fn emu_world(world: &mut dyn World) -> &mut EmuWorld {
    world
        .as_any_mut()
        .downcast_mut::<EmuWorld>()
        .expect("world must be EmuWorld")
}

/// 启动一个流实例
#[derive(Debug)]
pub struct StartFlow {
    pub flow: FlowId,
}

impl Event for StartFlow {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        emu_world(world).start_flow(self.flow, sim);
    }
}

/// What a `Resume` wakes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKind {
    Delay,
    TxAck,
}

/// Wake a side after a delay expiry or a completed blocking transfer.
/// Ignored when the side is no longer in the matching wait state.
#[derive(Debug)]
pub struct Resume {
    pub flow: FlowId,
    pub side: Side,
    pub kind: ResumeKind,
}

impl Event for Resume {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        emu_world(world).on_resume(self.flow, self.side, self.kind, sim);
    }
}

/// Bytes arriving at the receiving side, one latency after their send.
#[derive(Debug)]
pub struct Deliver {
    pub flow: FlowId,
    pub to: Side,
    pub bytes: u64,
}

impl Event for Deliver {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        emu_world(world).on_deliver(self.flow, self.to, self.bytes, sim);
    }
}

/// Handshake completion; wakes both sides waiting on establishment.
#[derive(Debug)]
pub struct ConnEstablished {
    pub flow: FlowId,
}

impl Event for ConnEstablished {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        emu_world(world).on_established(self.flow, sim);
    }
}

/// The peer's half-close becoming visible on this side.
#[derive(Debug)]
pub struct PeerClosed {
    pub flow: FlowId,
    pub to: Side,
}

impl Event for PeerClosed {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        emu_world(world).on_peer_closed(self.flow, self.to, sim);
    }
}

/// The peer's hard reset becoming visible on this side.
#[derive(Debug)]
pub struct PeerReset {
    pub flow: FlowId,
    pub to: Side,
}

impl Event for PeerReset {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        emu_world(world).on_peer_reset(self.flow, self.to, sim);
    }
}

/// Stall watchdog; kills a flow that outlived `max_flow_lifetime`.
#[derive(Debug)]
pub struct FlowWatchdog {
    pub flow: FlowId,
}

impl Event for FlowWatchdog {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        emu_world(world).on_watchdog(self.flow, sim);
    }
}
