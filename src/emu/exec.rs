//! Instruction stepping.
//!
//! `step_side` runs one side forward until it suspends or terminates. The
//! flow is taken out of the table for the duration of a step so events and
//! trace pushes can borrow the world freely.

use super::events::{ConnEstablished, Deliver, FlowWatchdog, PeerClosed, PeerReset, Resume,
    ResumeKind};
use super::flow::{EndReason, FlowId, FlowInstance, Wait, side_index};
use super::transport::ConnState;
use super::world::EmuWorld;
use crate::profile::mix64;
use crate::prog::{Instruction, Side};
use crate::sim::{SimTime, Simulator};
use crate::viz::FlowEventKind;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// 一次唤醒内的指令步数上限；超过视为无挂起的忙循环（程序缺陷）。
const MAX_STEPS_PER_WAKE: u32 = 1_000_000;

impl EmuWorld {
    pub(crate) fn start_flow(&mut self, id: FlowId, sim: &mut Simulator) {
        {
            let Some(flow) = self.flows.get_mut(&id) else {
                return;
            };
            flow.started_at = Some(sim.now());
            let kind = FlowEventKind::FlowStart {
                client_ip: flow.client_ip.to_string(),
                server_ip: flow.server_ip.to_string(),
                port: flow.port,
            };
            self.stats.flows_started += 1;
            self.viz_push(sim.now().0, Some(id), None, kind);
        }
        debug!(flow = id, "流启动");
        sim.schedule_after(self.cfg.max_flow_lifetime, FlowWatchdog { flow: id });
        self.step_side(id, Side::Client, sim);
        self.step_side(id, Side::Server, sim);
    }

    /// Run `side` of flow `id` until it suspends or terminates.
    #[tracing::instrument(skip(self, sim), fields(flow = id, side = ?side))]
    pub(crate) fn step_side(&mut self, id: FlowId, side: Side, sim: &mut Simulator) {
        let Some(mut flow) = self.flows.remove(&id) else {
            return;
        };
        let prog = Arc::clone(&flow.programs[side_index(side)]);
        let peer = side.peer();
        let mut steps: u32 = 0;

        loop {
            let s = flow.side(side);
            if s.terminal() || s.wait != Wait::None {
                break;
            }
            steps += 1;
            if steps > MAX_STEPS_PER_WAKE {
                warn!(flow = id, ?side, "忙循环超出步数上限，终止该流");
                self.kill_stalled(&mut flow, 0, sim);
                break;
            }
            let ip = s.ip;
            if ip >= prog.len() {
                // 程序走完：半关闭本侧
                self.close_side(&mut flow, side, sim);
                break;
            }

            trace!(ip, instr = ?prog.instructions()[ip], "执行指令");
            match prog.instructions()[ip].clone() {
                Instruction::SetLabel { .. } => {
                    flow.side_mut(side).ip += 1;
                }
                Instruction::SetVar { id: var, val } => {
                    flow.side_mut(side).vars[var.0 as usize] = val;
                    flow.side_mut(side).ip += 1;
                    self.viz_push(
                        sim.now().0,
                        Some(id),
                        Some(side),
                        FlowEventKind::VarSet { id: var.0, val },
                    );
                }
                Instruction::SetTickVar { id: var } => {
                    let now = sim.now().0;
                    flow.side_mut(side).vars[var.0 as usize] = now;
                    flow.side_mut(side).ip += 1;
                    self.viz_push(
                        sim.now().0,
                        Some(id),
                        Some(side),
                        FlowEventKind::VarSet { id: var.0, val: now },
                    );
                }
                Instruction::SetSendBlocking { blocking } => {
                    flow.side_mut(side).blocking = blocking;
                    flow.side_mut(side).ip += 1;
                }
                Instruction::Delay { usec } => {
                    self.suspend_delay(&mut flow, side, usec, sim);
                    break;
                }
                Instruction::DelayRand { min_usec, max_usec } => {
                    // 按流/位置/时刻混合抽样，跨运行稳定
                    let span = max_usec - min_usec + 1;
                    let key = self.cfg.seed ^ id.rotate_left(32) ^ (ip as u64) ^ sim.now().0;
                    let usec = min_usec + mix64(key) % span;
                    self.suspend_delay(&mut flow, side, usec, sim);
                    break;
                }
                Instruction::Send { buf_index } => {
                    if !flow.transport.is_established() {
                        self.begin_connect(&mut flow, side, sim);
                        break;
                    }
                    let bytes = prog.buffer(buf_index.0 as usize).len() as u64;
                    let blocking = flow.side(side).blocking;
                    flow.side_mut(side).tx_bytes += bytes;
                    flow.transport.queued[side_index(side)] += bytes;
                    match side {
                        Side::Client => self.stats.client_tx_bytes += bytes,
                        Side::Server => self.stats.server_tx_bytes += bytes,
                    }
                    self.viz_push(
                        sim.now().0,
                        Some(id),
                        Some(side),
                        FlowEventKind::Tx { bytes, blocking },
                    );
                    sim.schedule_after(
                        self.cfg.latency,
                        Deliver {
                            flow: id,
                            to: peer,
                            bytes,
                        },
                    );

                    let s = flow.side_mut(side);
                    s.ip += 1;
                    if blocking {
                        s.wait = Wait::TxAck;
                        let rtt = SimTime(self.cfg.latency.0.saturating_mul(2));
                        sim.schedule_after(
                            rtt,
                            Resume {
                                flow: id,
                                side,
                                kind: ResumeKind::TxAck,
                            },
                        );
                        break;
                    }
                    if flow.transport.queued[side_index(side)] > self.cfg.tx_buf_bytes {
                        // 管道化发送打满传输缓冲，等投递腾出空间
                        flow.side_mut(side).wait = Wait::TxWindow;
                        break;
                    }
                }
                Instruction::Recv { min_bytes, partial } => {
                    if !flow.transport.is_established() {
                        self.begin_connect(&mut flow, side, sim);
                        break;
                    }
                    let s = flow.side_mut(side);
                    let satisfied = if partial {
                        s.rx_delivered > s.rx_consumed
                    } else {
                        s.rx_delivered >= min_bytes
                    };
                    if !satisfied {
                        s.wait = Wait::Rx;
                        break;
                    }
                    if partial {
                        s.rx_consumed = s.rx_delivered;
                    } else {
                        s.rx_consumed = s.rx_consumed.max(min_bytes);
                    }
                    s.ip += 1;
                    self.viz_push(
                        sim.now().0,
                        Some(id),
                        Some(side),
                        FlowEventKind::RxSatisfied { min_bytes, partial },
                    );
                }
                Instruction::JmpNz { id: var, offset } => {
                    let s = flow.side_mut(side);
                    let val = s.vars[var.0 as usize].saturating_sub(1);
                    s.vars[var.0 as usize] = val;
                    let taken = val != 0;
                    s.ip = if taken { offset } else { ip + 1 };
                    self.viz_push(
                        sim.now().0,
                        Some(id),
                        Some(side),
                        FlowEventKind::Jump {
                            target: offset,
                            taken,
                        },
                    );
                }
                Instruction::JmpDp {
                    id: var,
                    offset,
                    duration_usec,
                } => {
                    let s = flow.side_mut(side);
                    let elapsed = sim.now().0.saturating_sub(s.vars[var.0 as usize]);
                    let taken = elapsed < SimTime::from_micros(duration_usec).0;
                    s.ip = if taken { offset } else { ip + 1 };
                    self.viz_push(
                        sim.now().0,
                        Some(id),
                        Some(side),
                        FlowEventKind::Jump {
                            target: offset,
                            taken,
                        },
                    );
                }
                Instruction::Connect | Instruction::Accept => {
                    if flow.transport.is_established() {
                        flow.side_mut(side).ip += 1;
                    } else {
                        self.begin_connect(&mut flow, side, sim);
                        break;
                    }
                }
                Instruction::Reset => {
                    self.reset_side(&mut flow, side, sim);
                    break;
                }
                Instruction::WaitForPeerClose => {
                    let s = flow.side_mut(side);
                    if s.peer_closed {
                        s.ip += 1;
                    } else {
                        s.wait = Wait::PeerClose;
                        break;
                    }
                }
            }
        }

        self.flows.insert(id, flow);
    }

    fn suspend_delay(&mut self, flow: &mut FlowInstance, side: Side, usec: u64, sim: &mut Simulator) {
        let s = flow.side_mut(side);
        s.ip += 1;
        s.wait = Wait::Delay;
        self.viz_push(
            sim.now().0,
            Some(flow.id),
            Some(side),
            FlowEventKind::DelayStart { usec },
        );
        sim.schedule_after(
            SimTime::from_micros(usec),
            Resume {
                flow: flow.id,
                side,
                kind: ResumeKind::Delay,
            },
        );
    }

    /// Park `side` until the transport is up; the client side initiates the
    /// handshake if nobody has yet.
    fn begin_connect(&mut self, flow: &mut FlowInstance, side: Side, sim: &mut Simulator) {
        flow.side_mut(side).wait = Wait::Established;
        if side == Side::Client && flow.transport.state == ConnState::Closed {
            flow.transport.state = ConnState::Connecting;
            let handshake = SimTime(self.cfg.connect_latency.0.saturating_mul(2));
            sim.schedule_after(handshake, ConnEstablished { flow: flow.id });
        }
    }

    fn close_side(&mut self, flow: &mut FlowInstance, side: Side, sim: &mut Simulator) {
        let s = flow.side_mut(side);
        s.closed = true;
        s.wait = Wait::None;
        self.viz_push(sim.now().0, Some(flow.id), Some(side), FlowEventKind::HalfClose);
        sim.schedule_after(
            self.cfg.latency,
            PeerClosed {
                flow: flow.id,
                to: side.peer(),
            },
        );
        self.maybe_finish(flow, sim);
    }

    fn reset_side(&mut self, flow: &mut FlowInstance, side: Side, sim: &mut Simulator) {
        let s = flow.side_mut(side);
        s.aborted = true;
        s.wait = Wait::None;
        self.viz_push(sim.now().0, Some(flow.id), Some(side), FlowEventKind::Reset);
        sim.schedule_after(
            self.cfg.latency,
            PeerReset {
                flow: flow.id,
                to: side.peer(),
            },
        );
        self.maybe_finish(flow, sim);
    }

    fn maybe_finish(&mut self, flow: &mut FlowInstance, sim: &mut Simulator) {
        if flow.ended_at.is_some() {
            return;
        }
        if !(flow.side(Side::Client).terminal() && flow.side(Side::Server).terminal()) {
            return;
        }
        let aborted =
            flow.side(Side::Client).aborted || flow.side(Side::Server).aborted;
        let reason = if aborted {
            EndReason::Reset
        } else {
            EndReason::Finished
        };
        flow.ended_at = Some(sim.now());
        flow.end = Some(reason);
        match reason {
            EndReason::Finished => self.stats.flows_finished += 1,
            EndReason::Reset => self.stats.flows_reset += 1,
            EndReason::Stalled => {}
        }
        debug!(flow = flow.id, %reason, "流结束");
        self.viz_push(
            sim.now().0,
            Some(flow.id),
            None,
            FlowEventKind::FlowDone { reason },
        );
    }

    pub(crate) fn on_resume(
        &mut self,
        id: FlowId,
        side: Side,
        kind: ResumeKind,
        sim: &mut Simulator,
    ) {
        {
            let Some(flow) = self.flows.get_mut(&id) else {
                return;
            };
            let expected = match kind {
                ResumeKind::Delay => Wait::Delay,
                ResumeKind::TxAck => Wait::TxAck,
            };
            let s = flow.side_mut(side);
            if s.terminal() || s.wait != expected {
                return;
            }
            s.wait = Wait::None;
        }
        self.step_side(id, side, sim);
    }

    pub(crate) fn on_deliver(&mut self, id: FlowId, to: Side, bytes: u64, sim: &mut Simulator) {
        let from = to.peer();
        let (wake_rx, wake_tx) = {
            let Some(flow) = self.flows.get_mut(&id) else {
                return;
            };
            flow.side_mut(to).rx_delivered += bytes;
            let queued = &mut flow.transport.queued[side_index(from)];
            *queued = queued.saturating_sub(bytes);
            let drained = flow.transport.queued[side_index(from)] <= self.cfg.tx_buf_bytes;

            let wake_rx = flow.side(to).wait == Wait::Rx && !flow.side(to).terminal();
            let wake_tx = flow.side(from).wait == Wait::TxWindow && drained;
            if wake_rx {
                flow.side_mut(to).wait = Wait::None;
            }
            if wake_tx {
                flow.side_mut(from).wait = Wait::None;
            }
            (wake_rx, wake_tx)
        };
        if wake_rx {
            self.step_side(id, to, sim);
        }
        if wake_tx {
            self.step_side(id, from, sim);
        }
    }

    pub(crate) fn on_established(&mut self, id: FlowId, sim: &mut Simulator) {
        let mut wake = [false, false];
        {
            let Some(flow) = self.flows.get_mut(&id) else {
                return;
            };
            flow.transport.state = ConnState::Established;
            for side in [Side::Client, Side::Server] {
                let s = flow.side_mut(side);
                if s.wait == Wait::Established {
                    s.wait = Wait::None;
                    wake[side_index(side)] = true;
                }
            }
        }
        self.viz_push(sim.now().0, Some(id), None, FlowEventKind::Established);
        for side in [Side::Client, Side::Server] {
            if wake[side_index(side)] {
                self.step_side(id, side, sim);
            }
        }
    }

    pub(crate) fn on_peer_closed(&mut self, id: FlowId, to: Side, sim: &mut Simulator) {
        {
            let Some(flow) = self.flows.get_mut(&id) else {
                return;
            };
            let s = flow.side_mut(to);
            s.peer_closed = true;
            if s.terminal() || s.wait != Wait::PeerClose {
                return;
            }
            s.wait = Wait::None;
        }
        self.step_side(id, to, sim);
    }

    pub(crate) fn on_peer_reset(&mut self, id: FlowId, to: Side, sim: &mut Simulator) {
        let Some(mut flow) = self.flows.remove(&id) else {
            return;
        };
        let s = flow.side_mut(to);
        if !s.terminal() {
            s.aborted = true;
            s.wait = Wait::None;
        }
        self.maybe_finish(&mut flow, sim);
        self.flows.insert(id, flow);
    }

    pub(crate) fn on_watchdog(&mut self, id: FlowId, sim: &mut Simulator) {
        let Some(mut flow) = self.flows.remove(&id) else {
            return;
        };
        if flow.ended_at.is_some() {
            self.flows.insert(id, flow);
            return;
        }

        // 统计未满足的接收水位，作为停滞报告的一部分
        let mut unmet_rx_bytes = 0;
        for side in [Side::Client, Side::Server] {
            let s = flow.side(side);
            if s.wait != Wait::Rx {
                continue;
            }
            if let Some(Instruction::Recv { min_bytes, .. }) =
                flow.program(side).instructions().get(s.ip)
            {
                unmet_rx_bytes += min_bytes.saturating_sub(s.rx_delivered);
            }
        }

        debug!(flow = id, unmet_rx_bytes, "看门狗终止停滞流");
        self.kill_stalled(&mut flow, unmet_rx_bytes, sim);
        self.flows.insert(id, flow);
    }

    /// Abort both sides of a stuck flow and record it as stalled.
    fn kill_stalled(&mut self, flow: &mut FlowInstance, unmet_rx_bytes: u64, sim: &mut Simulator) {
        if flow.ended_at.is_some() {
            return;
        }
        for side in [Side::Client, Side::Server] {
            let s = flow.side_mut(side);
            s.aborted = true;
            s.wait = Wait::None;
        }
        flow.ended_at = Some(sim.now());
        flow.end = Some(EndReason::Stalled);
        self.stats.flows_stalled += 1;
        self.viz_push(
            sim.now().0,
            Some(flow.id),
            None,
            FlowEventKind::Stalled { unmet_rx_bytes },
        );
        self.viz_push(
            sim.now().0,
            Some(flow.id),
            None,
            FlowEventKind::FlowDone {
                reason: EndReason::Stalled,
            },
        );
    }
}
