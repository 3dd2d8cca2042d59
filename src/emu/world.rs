//! Emulation world: the flow table and its aggregate state.

use super::config::EmuConfig;
use super::events::StartFlow;
use super::flow::{FlowId, FlowInstance};
use super::stats::EmuStats;
use crate::profile::Profile;
use crate::prog::Side;
use crate::sim::{SimTime, Simulator, World};
use crate::viz::{FlowEvent, FlowEventKind, FlowEventLogger};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// 流量仿真世界：持有全部流实例与统计。
#[derive(Default)]
pub struct EmuWorld {
    pub cfg: EmuConfig,
    pub flows: HashMap<FlowId, FlowInstance>,
    pub stats: EmuStats,
    pub viz: Option<FlowEventLogger>,
    next_flow_id: FlowId,
}

impl World for EmuWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl EmuWorld {
    pub fn new(cfg: EmuConfig) -> Self {
        Self {
            cfg,
            flows: HashMap::new(),
            stats: EmuStats::default(),
            viz: None,
            next_flow_id: 0,
        }
    }

    /// Instantiate `cfg.flows_per_template` flows per template pair and
    /// schedule their starts on the template's cps cadence.
    pub fn spawn_flows(&mut self, profile: &Profile, sim: &mut Simulator) {
        for (t_idx, pair) in profile.templates().iter().enumerate() {
            let client_prog = Arc::new(pair.client.program.clone());
            let server_prog = Arc::new(pair.server.program.clone());
            let ip_gen = profile.ip_gen_for(t_idx);
            let cps = pair.client.cps;

            for i in 0..self.cfg.flows_per_template {
                let id = self.next_flow_id;
                self.next_flow_id += 1;
                let (client_ip, server_ip) = ip_gen.pair(i, self.cfg.seed);
                let flow = FlowInstance::new(
                    id,
                    t_idx,
                    client_ip,
                    server_ip,
                    pair.client.port,
                    Arc::clone(&client_prog),
                    Arc::clone(&server_prog),
                );
                self.flows.insert(id, flow);

                let start_ns = (i as f64 * 1_000_000_000.0 / cps).round() as u64;
                sim.schedule(SimTime(start_ns), StartFlow { flow: id });
            }
        }
        info!(
            flows = self.flows.len(),
            templates = profile.templates().len(),
            "流已实例化"
        );
    }

    /// Emit the run meta event; call after enabling `viz` and before running.
    pub fn emit_viz_meta(&mut self, templates: usize) {
        let kind = FlowEventKind::Meta {
            flows_per_template: self.cfg.flows_per_template,
            templates,
            latency_ns: self.cfg.latency.0,
            seed: self.cfg.seed,
        };
        self.viz_push(0, None, None, kind);
    }

    pub(crate) fn viz_push(
        &mut self,
        t_ns: u64,
        flow_id: Option<FlowId>,
        side: Option<Side>,
        kind: FlowEventKind,
    ) {
        if let Some(viz) = &mut self.viz {
            viz.push(FlowEvent {
                t_ns,
                flow_id,
                side,
                kind,
            });
        }
    }

    /// Flows in id order, for deterministic reporting.
    pub fn flows_by_id(&self) -> Vec<&FlowInstance> {
        let mut flows: Vec<&FlowInstance> = self.flows.values().collect();
        flows.sort_by_key(|f| f.id);
        flows
    }
}
