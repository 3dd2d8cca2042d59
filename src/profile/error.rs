//! Profile validation errors.

use crate::prog::ProgramError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("bad ip range: start {start} is above end {end}")]
    BadIpRange { start: String, end: String },
    #[error("client template needs a client-side program")]
    ClientSideMismatch,
    #[error("server template needs a server-side program")]
    ServerSideMismatch,
    #[error("client and server programs of one template must share a mode")]
    ModeMismatch,
    #[error("client port {0} matches no association rule of its server template")]
    PortNotAssociated(u16),
    #[error("port {0} is claimed by more than one server template")]
    DuplicateAssocPort(u16),
    #[error("an association needs at least one rule")]
    EmptyAssociation,
    #[error("profile needs at least one template pair")]
    NoTemplates,
    #[error("cps must be a positive finite number, got {0}")]
    BadCps(f64),
    #[error(transparent)]
    Program(#[from] ProgramError),
}
