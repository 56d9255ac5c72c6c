//! Error kinds surfaced by the coupling runtime (`spec.md` §7).

use thiserror::Error;

/// The single error type returned by every public operation of the
/// coupling runtime. Each variant corresponds to one of the error kinds
/// `spec.md` §7 specifies; none are recovered internally — they propagate
/// synchronously from the API call that caused them.
#[derive(Debug, Error)]
pub enum CouplingError {
    /// Malformed or inconsistent configuration: unknown participant, no
    /// participants declared, or a parallel participant declared without a
    /// master.
    #[error("configuration error: {0}")]
    Config(String),

    /// A contract violation by the caller: invalid ID, out-of-range vertex
    /// index, wrong-arity data operation, or a lifecycle ordering breach
    /// that is the caller's responsibility to avoid.
    #[error("usage error: {0}")]
    Usage(String),

    /// An operation that is valid in principle but was invoked in the wrong
    /// lifecycle phase (e.g. `advance` before `initialize`).
    #[error("state error: {0}")]
    State(String),

    /// Inter-participant inconsistency detected at runtime: a mismatched
    /// `Δt` across ranks, or handshake corruption during finalize.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A channel-level I/O failure. Always fatal; there is no retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// A failed invariant assertion internal to the runtime. Always fatal.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CouplingError>;

impl From<std::io::Error> for CouplingError {
    fn from(err: std::io::Error) -> Self {
        CouplingError::Transport(err.to_string())
    }
}

impl From<serde_yaml::Error> for CouplingError {
    fn from(err: serde_yaml::Error) -> Self {
        CouplingError::Config(err.to_string())
    }
}
