//! JSON authoring format for profiles.
//!
//! A `ProfileSpec` document describes programs as op lists mirroring the
//! `ProgramBuilder` API, so spec-authored programs run through exactly the
//! same validation as hand-built ones. Unknown keys are rejected up front.

use super::error::ProfileError;
use super::ip_gen::{IpDistribution, IpGen, IpGenDist, IpRange};
use super::profile::Profile;
use super::template::{Association, ClientTemplate, ServerTemplate, TemplatePair};
use crate::prog::{
    DEFAULT_LOOP_BYTE_CEILING, Mode, ProgramBuilder, ProgramError, Side, emit_chunk_loop,
};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecError {
    #[error("unsupported schema_version {0}")]
    UnsupportedSchema(u32),
    #[error("bad ipv4 address `{0}`")]
    BadIp(String),
    #[error("send op needs exactly one of `data` or `size`")]
    SendPayload,
    #[error(transparent)]
    Program(#[from] ProgramError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileSpec {
    pub schema_version: u32,
    #[serde(default)]
    pub meta: Option<SpecMeta>,
    #[serde(default)]
    pub defaults: Option<SpecDefaults>,
    pub ip_gen: IpGenSpec,
    pub templates: Vec<TemplateSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecMeta {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecDefaults {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub cps: Option<f64>,
    /// Loop-variable byte ceiling used by `send_chunks` expansion.
    #[serde(default)]
    pub byte_ceiling: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpGenSpec {
    pub client: IpGenDistSpec,
    pub server: IpGenDistSpec,
    #[serde(default)]
    pub ip_offset: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpGenDistSpec {
    /// `[start, end]`, inclusive.
    pub ip_range: [String; 2],
    #[serde(default)]
    pub distribution: Option<IpDistribution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSpec {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub cps: Option<f64>,
    #[serde(default)]
    pub ip_gen: Option<IpGenSpec>,
    /// Message-oriented (datagram) template instead of a byte stream.
    #[serde(default)]
    pub message_mode: bool,
    pub client: Vec<OpSpec>,
    pub server: Vec<OpSpec>,
}

/// One builder operation in spec form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpSpec {
    /// Literal UTF-8 payload (`data`) or generated filler of `size` bytes.
    Send {
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        size: Option<u64>,
    },
    Recv {
        bytes: u64,
        #[serde(default)]
        partial: bool,
    },
    Delay {
        usec: u64,
    },
    DelayRand {
        min_usec: u64,
        max_usec: u64,
    },
    SetVar {
        name: String,
        val: u64,
    },
    SetTickVar {
        name: String,
    },
    SetLabel {
        label: String,
    },
    JmpNz {
        var: String,
        label: String,
    },
    JmpDp {
        var: String,
        label: String,
        duration_usec: u64,
    },
    SetSendBlocking {
        blocking: bool,
    },
    Connect,
    Accept,
    Reset,
    WaitForPeerClose,
    /// `count` sends of `size` filler bytes, expanded through the loop
    /// splitter.
    SendChunks {
        size: u64,
        count: u64,
    },
}

/// Build a validated `Profile` from its spec document.
pub fn build_profile(spec: &ProfileSpec) -> Result<Profile, SpecError> {
    if spec.schema_version != 1 {
        return Err(SpecError::UnsupportedSchema(spec.schema_version));
    }
    let defaults = spec.defaults.clone().unwrap_or_default();
    let ceiling = defaults.byte_ceiling.unwrap_or(DEFAULT_LOOP_BYTE_CEILING);
    let default_ip_gen = ip_gen_from(&spec.ip_gen)?;

    let mut pairs = Vec::with_capacity(spec.templates.len());
    for t in &spec.templates {
        let mode = if t.message_mode {
            Mode::Message
        } else {
            Mode::Stream
        };
        let mut cb = ProgramBuilder::with_mode(Side::Client, mode);
        for op in &t.client {
            apply(op, &mut cb, ceiling)?;
        }
        let mut sb = ProgramBuilder::with_mode(Side::Server, mode);
        for op in &t.server {
            apply(op, &mut sb, ceiling)?;
        }

        let port = t.port.or(defaults.port).unwrap_or(80);
        let cps = t.cps.or(defaults.cps).unwrap_or(1.0);
        let ip_gen = t.ip_gen.as_ref().map(ip_gen_from).transpose()?;
        let client = ClientTemplate::new(cb.finalize()?, ip_gen, port, cps)?;
        let server = ServerTemplate::new(sb.finalize()?, Association::by_port(port))?;
        pairs.push(TemplatePair::new(client, server)?);
    }
    Ok(Profile::new(default_ip_gen, pairs)?)
}

fn apply(op: &OpSpec, b: &mut ProgramBuilder, ceiling: u64) -> Result<(), SpecError> {
    match op {
        OpSpec::Send { data, size } => match (data, size) {
            (Some(data), None) => b.send(data.as_bytes())?,
            (None, Some(size)) => b.send(&filler(*size))?,
            _ => return Err(SpecError::SendPayload),
        },
        OpSpec::Recv { bytes, partial } => {
            if *partial {
                b.recv_partial(*bytes)?
            } else {
                b.recv(*bytes)?
            }
        }
        OpSpec::Delay { usec } => b.delay(*usec),
        OpSpec::DelayRand { min_usec, max_usec } => b.delay_rand(*min_usec, *max_usec)?,
        OpSpec::SetVar { name, val } => b.set_var(name, *val)?,
        OpSpec::SetTickVar { name } => b.set_tick_var(name)?,
        OpSpec::SetLabel { label } => b.set_label(label)?,
        OpSpec::JmpNz { var, label } => b.jmp_nz(var, label)?,
        OpSpec::JmpDp {
            var,
            label,
            duration_usec,
        } => b.jmp_dp(var, label, *duration_usec)?,
        OpSpec::SetSendBlocking { blocking } => b.set_send_blocking(*blocking),
        OpSpec::Connect => b.connect()?,
        OpSpec::Accept => b.accept()?,
        OpSpec::Reset => b.reset(),
        OpSpec::WaitForPeerClose => b.wait_for_peer_close(),
        OpSpec::SendChunks { size, count } => emit_chunk_loop(b, &filler(*size), *count, ceiling)?,
    }
    Ok(())
}

/// Printable repeating filler for generated payloads.
fn filler(n: u64) -> Vec<u8> {
    const PATTERN: &[u8; 16] = b"0123456789abcdef";
    (0..n).map(|i| PATTERN[(i % 16) as usize]).collect()
}

fn ip_gen_from(spec: &IpGenSpec) -> Result<IpGen, SpecError> {
    let mut ip_gen = IpGen::new(dist_from(&spec.client)?, dist_from(&spec.server)?);
    if let Some(offset) = &spec.ip_offset {
        ip_gen = ip_gen.with_offset(parse_ip(offset)?);
    }
    Ok(ip_gen)
}

fn dist_from(spec: &IpGenDistSpec) -> Result<IpGenDist, SpecError> {
    let range = IpRange::new(parse_ip(&spec.ip_range[0])?, parse_ip(&spec.ip_range[1])?)?;
    Ok(IpGenDist {
        range,
        distribution: spec.distribution.unwrap_or(IpDistribution::Seq),
    })
}

fn parse_ip(raw: &str) -> Result<Ipv4Addr, SpecError> {
    raw.parse::<Ipv4Addr>()
        .map_err(|_| SpecError::BadIp(raw.to_string()))
}
