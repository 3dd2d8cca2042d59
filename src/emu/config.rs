//! Emulator configuration.

use crate::sim::SimTime;

/// Plainly-typed emulator knobs, validated by construction (no dynamic
/// key/value lookup).
#[derive(Debug, Clone)]
pub struct EmuConfig {
    /// Flow instances spawned per template pair.
    pub flows_per_template: u64,
    /// One-way byte delivery latency.
    pub latency: SimTime,
    /// One-way handshake latency; establishment completes after a round trip.
    pub connect_latency: SimTime,
    /// Transport queue capacity bounding pipelined (non-blocking) sends.
    pub tx_buf_bytes: u64,
    /// Watchdog: a flow still running after this long is reported stalled.
    pub max_flow_lifetime: SimTime,
    /// Seed for the deterministic delay/address sampling.
    pub seed: u64,
}

impl Default for EmuConfig {
    fn default() -> Self {
        let latency = SimTime::from_micros(50);
        Self {
            flows_per_template: 1,
            latency,
            connect_latency: latency,
            tx_buf_bytes: 64 * 1024,
            max_flow_lifetime: SimTime::from_secs(60),
            seed: 1,
        }
    }
}
