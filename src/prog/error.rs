//! Program build errors.
//!
//! Everything here is raised synchronously while authoring or finalizing a
//! program; nothing is deferred to execution time.

use super::instruction::MAX_FLOW_VARS;
use super::program::Side;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("jump target label `{0}` is not defined in this program")]
    UndefinedLabel(String),
    #[error("label `{0}` is already defined")]
    DuplicateLabel(String),
    #[error("variable `{0}` is used before set_var/set_tick_var")]
    UnknownVar(String),
    #[error("program uses more than {MAX_FLOW_VARS} flow variables")]
    TooManyVars,
    #[error("variable `{0}` is a tick snapshot, not a counter")]
    NotACounter(String),
    #[error("variable `{0}` is a counter, not a tick snapshot")]
    NotATickVar(String),
    #[error("send payload must not be empty")]
    EmptyBuffer,
    #[error("recv byte count must be positive")]
    ZeroRecvBytes,
    #[error("delay_rand needs min_usec <= max_usec")]
    BadDelayRange,
    #[error("`{op}` is not valid in a {side:?} program")]
    SideRestricted { op: &'static str, side: Side },
    #[error("loop split needs positive chunk size and count within u64 range")]
    BadLoopSplit,
}
