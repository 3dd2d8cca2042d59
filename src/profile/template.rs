//! Flow templates: a client program and a server program bound together with
//! addressing and association rules.

use super::error::ProfileError;
use super::ip_gen::{IpGen, IpRange};
use crate::prog::{Program, Side};

/// Server-side demultiplex rule: inbound flows match by destination port,
/// optionally narrowed to a destination address range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssocRule {
    pub port: u16,
    pub ip_range: Option<IpRange>,
}

impl AssocRule {
    pub fn port(port: u16) -> Self {
        Self {
            port,
            ip_range: None,
        }
    }
}

/// Non-empty list of association rules for one server template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    rules: Vec<AssocRule>,
}

impl Association {
    pub fn new(rules: Vec<AssocRule>) -> Result<Self, ProfileError> {
        if rules.is_empty() {
            return Err(ProfileError::EmptyAssociation);
        }
        Ok(Self { rules })
    }

    pub fn by_port(port: u16) -> Self {
        Self {
            rules: vec![AssocRule::port(port)],
        }
    }

    pub fn rules(&self) -> &[AssocRule] {
        &self.rules
    }

    pub fn matches_port(&self, port: u16) -> bool {
        self.rules.iter().any(|r| r.port == port)
    }
}

/// The active side of a template: which program runs, where flows go, and how
/// fast they are spawned.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientTemplate {
    pub program: Program,
    /// Overrides the profile default when set.
    pub ip_gen: Option<IpGen>,
    pub port: u16,
    /// Connections per second; drives the flow-start cadence.
    pub cps: f64,
}

impl ClientTemplate {
    pub fn new(
        program: Program,
        ip_gen: Option<IpGen>,
        port: u16,
        cps: f64,
    ) -> Result<Self, ProfileError> {
        if program.side() != Side::Client {
            return Err(ProfileError::ClientSideMismatch);
        }
        if !cps.is_finite() || cps <= 0.0 {
            return Err(ProfileError::BadCps(cps));
        }
        Ok(Self {
            program,
            ip_gen,
            port,
            cps,
        })
    }
}

/// The passive side: the program inbound flows are handed to, per association.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerTemplate {
    pub program: Program,
    pub assoc: Association,
}

impl ServerTemplate {
    pub fn new(program: Program, assoc: Association) -> Result<Self, ProfileError> {
        if program.side() != Side::Server {
            return Err(ProfileError::ServerSideMismatch);
        }
        Ok(Self { program, assoc })
    }
}

/// One class of flows: exactly one client program paired with one server
/// program.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplatePair {
    pub client: ClientTemplate,
    pub server: ServerTemplate,
}

impl TemplatePair {
    pub fn new(client: ClientTemplate, server: ServerTemplate) -> Result<Self, ProfileError> {
        if client.program.mode() != server.program.mode() {
            return Err(ProfileError::ModeMismatch);
        }
        if !server.assoc.matches_port(client.port) {
            return Err(ProfileError::PortNotAssociated(client.port));
        }
        Ok(Self { client, server })
    }
}
