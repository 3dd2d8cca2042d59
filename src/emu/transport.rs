//! Per-flow in-memory transport.
//!
//! Byte-count modeling only: a send of `n` bytes reaches the peer `latency`
//! later; ordering within a direction is preserved and nothing is lost.

/// Connection lifecycle of one flow's transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnState {
    Closed,
    Connecting,
    Established,
}

#[derive(Debug)]
pub(crate) struct Transport {
    pub state: ConnState,
    /// Bytes queued but not yet delivered, indexed by sending side.
    pub queued: [u64; 2],
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: ConnState::Closed,
            queued: [0, 0],
        }
    }

    pub fn is_established(&self) -> bool {
        self.state == ConnState::Established
    }
}
