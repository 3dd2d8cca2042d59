//! Per-flow IP address generation.
//!
//! Deterministic: flow `i` always draws the same pair for a given seed, so a
//! profile replays identically across runs.

use super::error::ProfileError;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Inclusive IPv4 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRange {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl IpRange {
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self, ProfileError> {
        if u32::from(start) > u32::from(end) {
            return Err(ProfileError::BadIpRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Ipv4Addr {
        self.start
    }

    pub fn end(&self) -> Ipv4Addr {
        self.end
    }

    /// Number of addresses in the range (at least 1).
    pub fn len(&self) -> u64 {
        u64::from(u32::from(self.end)) - u64::from(u32::from(self.start)) + 1
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        (u32::from(self.start)..=u32::from(self.end)).contains(&u32::from(addr))
    }

    /// Address at `offset`, wrapping once the range is exhausted.
    pub fn addr(&self, offset: u64) -> Ipv4Addr {
        let idx = (offset % self.len()) as u32;
        Ipv4Addr::from(u32::from(self.start).wrapping_add(idx))
    }
}

/// How addresses are drawn from a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpDistribution {
    /// In order; no repeat until the range is exhausted, then wrap.
    Seq,
    /// Uniform pseudo-random draw (deterministic under a fixed seed).
    Rand,
}

/// One side's address generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpGenDist {
    pub range: IpRange,
    pub distribution: IpDistribution,
}

impl IpGenDist {
    pub fn seq(range: IpRange) -> Self {
        Self {
            range,
            distribution: IpDistribution::Seq,
        }
    }

    /// Address for flow `i`.
    pub fn nth(&self, i: u64, seed: u64) -> Ipv4Addr {
        match self.distribution {
            IpDistribution::Seq => self.range.addr(i),
            IpDistribution::Rand => self.range.addr(mix64(seed ^ i)),
        }
    }
}

/// Paired client/server address generation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpGen {
    pub client: IpGenDist,
    pub server: IpGenDist,
    /// Per-port-group stride carried through to the compiled database.
    pub ip_offset: Ipv4Addr,
}

impl IpGen {
    pub fn new(client: IpGenDist, server: IpGenDist) -> Self {
        Self {
            client,
            server,
            ip_offset: Ipv4Addr::new(1, 0, 0, 0),
        }
    }

    pub fn with_offset(mut self, ip_offset: Ipv4Addr) -> Self {
        self.ip_offset = ip_offset;
        self
    }

    /// (client, server) addresses of flow `i`.
    pub fn pair(&self, i: u64, seed: u64) -> (Ipv4Addr, Ipv4Addr) {
        (
            self.client.nth(i, seed),
            // 两侧独立混合，避免 client/server 抽样相关联
            self.server.nth(i, seed.rotate_left(17)),
        )
    }
}

/// 一个简单、确定性的 64-bit mixing（替代 RandomState，保证跨运行稳定）。
pub(crate) fn mix64(mut x: u64) -> u64 {
    // splitmix64
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
