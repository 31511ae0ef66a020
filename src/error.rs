//! Structured error kinds for the ring's core operations.
//!
//! `NotFound` is not really an error — a `lookup` that reaches the right
//! owner and finds nothing absent returns it as a distinguished value, per
//! spec. It is carried in this enum purely for plumbing convenience; the
//! controller and RPC layers never surface it as a user-visible failure.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("rpc call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("routing diverged: exceeded {0} hops")]
    RoutingDiverged(u32),

    #[error("key not found")]
    NotFound,

    #[error("node state not ready: {0}")]
    StateNotReady(String),
}

pub type NodeResult<T> = Result<T, NodeError>;
