//! Compilation of a `Profile` into the engine-facing JSON database.
//!
//! The database carries a deduplicated base64 buffer pool, a deduplicated
//! program list, IP generator descriptors, and per-template indices into all
//! three. Compiling the same profile twice yields byte-identical output.

use super::ip_gen::{IpDistribution, IpGen, IpGenDist};
use super::profile::Profile;
use crate::prog::{BufId, Instruction, Mode, Program};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledProfile {
    /// Base64 payloads, shared across all programs.
    pub buf_list: Vec<String>,
    pub program_list: Vec<CompiledProgram>,
    pub ip_gen_dist_list: Vec<CompiledIpGenDist>,
    pub templates: Vec<CompiledTemplate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledProgram {
    /// Stream (connection-oriented) vs. message-oriented program.
    pub stream: bool,
    /// Commands with buffer indices rewritten into the global pool.
    pub commands: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledIpGenDist {
    pub ip_start: String,
    pub ip_end: String,
    pub distribution: IpDistribution,
    /// `"c"` for client ranges, `"s"` for server ranges.
    pub dir: String,
    pub ip_offset: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTemplate {
    pub client_template: CompiledClientTemplate,
    pub server_template: CompiledServerTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledClientTemplate {
    pub program_index: usize,
    pub port: u16,
    pub cps: f64,
    pub dist_client: usize,
    pub dist_server: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledServerTemplate {
    pub program_index: usize,
    pub assoc: Vec<CompiledAssocRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledAssocRule {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_end: Option<String>,
}

impl CompiledProfile {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("serialize compiled profile")
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).expect("serialize compiled profile")
    }
}

#[derive(Default)]
struct Interner {
    buf_list: Vec<String>,
    buf_ids: HashMap<Vec<u8>, usize>,
    // originals kept side by side for equality-based dedup
    programs: Vec<Program>,
    program_list: Vec<CompiledProgram>,
    dists: Vec<CompiledIpGenDist>,
}

impl Interner {
    fn buf(&mut self, payload: &[u8]) -> usize {
        if let Some(&idx) = self.buf_ids.get(payload) {
            return idx;
        }
        let idx = self.buf_list.len();
        self.buf_list.push(BASE64.encode(payload));
        self.buf_ids.insert(payload.to_vec(), idx);
        idx
    }

    fn program(&mut self, prog: &Program) -> usize {
        if let Some(idx) = self.programs.iter().position(|p| p == prog) {
            return idx;
        }
        let commands = prog
            .instructions()
            .iter()
            .map(|ins| match ins {
                Instruction::Send { buf_index } => {
                    let global = self.buf(prog.buffer(buf_index.0 as usize));
                    Instruction::Send {
                        buf_index: BufId(global as u16),
                    }
                }
                other => other.clone(),
            })
            .collect();
        self.programs.push(prog.clone());
        self.program_list.push(CompiledProgram {
            stream: prog.mode() == Mode::Stream,
            commands,
        });
        self.program_list.len() - 1
    }

    fn dist(&mut self, dist: &IpGenDist, dir: &str, ip_offset: Ipv4Addr) -> usize {
        let entry = CompiledIpGenDist {
            ip_start: dist.range.start().to_string(),
            ip_end: dist.range.end().to_string(),
            distribution: dist.distribution,
            dir: dir.to_string(),
            ip_offset: ip_offset.to_string(),
        };
        if let Some(idx) = self.dists.iter().position(|d| *d == entry) {
            return idx;
        }
        self.dists.push(entry);
        self.dists.len() - 1
    }
}

/// Compile `profile` into the engine database form.
pub fn compile(profile: &Profile) -> CompiledProfile {
    let mut interner = Interner::default();
    let mut templates = Vec::with_capacity(profile.templates().len());

    for (idx, pair) in profile.templates().iter().enumerate() {
        let ip_gen: &IpGen = profile.ip_gen_for(idx);
        let dist_client = interner.dist(&ip_gen.client, "c", ip_gen.ip_offset);
        let dist_server = interner.dist(&ip_gen.server, "s", ip_gen.ip_offset);

        let client_template = CompiledClientTemplate {
            program_index: interner.program(&pair.client.program),
            port: pair.client.port,
            cps: pair.client.cps,
            dist_client,
            dist_server,
        };
        let server_template = CompiledServerTemplate {
            program_index: interner.program(&pair.server.program),
            assoc: pair
                .server
                .assoc
                .rules()
                .iter()
                .map(|r| CompiledAssocRule {
                    port: r.port,
                    ip_start: r.ip_range.map(|ip| ip.start().to_string()),
                    ip_end: r.ip_range.map(|ip| ip.end().to_string()),
                })
                .collect(),
        };
        templates.push(CompiledTemplate {
            client_template,
            server_template,
        });
    }

    debug!(
        bufs = interner.buf_list.len(),
        programs = interner.program_list.len(),
        templates = templates.len(),
        "profile 编译完成"
    );
    CompiledProfile {
        buf_list: interner.buf_list,
        program_list: interner.program_list,
        ip_gen_dist_list: interner.dists,
        templates,
    }
}
