//! Crate-level error type. Decode and framing errors have their own
//! lightweight enums ([`crate::codec::CodecError`], [`crate::wire::FrameError`])
//! because callers handle them differently (fall back to `Unknown`, or tear
//! the connection down); `KvError` is reserved for failures that reach a
//! binary's `main` and should abort the process.

use thiserror::Error;

/// A fatal error surfaced to `main`. Handlers and the connection state
/// machine never produce this -- see spec §7's propagation policy.
#[derive(Error, Debug)]
pub enum KvError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create the readiness poller: {0}")]
    PollInit(#[source] std::io::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
