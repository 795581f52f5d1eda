//! The error taxonomy of the protocol core.
//!
//! Every fallible operation in this crate returns one of these variants; see
//! the module docs on [`crate::frame`], [`crate::message`] and
//! [`crate::bind_state`] for where each one is raised.

use thiserror::Error;

/// A common result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy described by the protocol specification.
#[derive(Debug, Error)]
pub enum Error {
    /// The frame was malformed, or violated a length/field constraint.
    #[error("invalid packet ({reason}): {line}")]
    InvalidPacket {
        /// The raw line that failed to parse.
        line: String,
        /// Which validation rule rejected the line.
        reason: &'static str,
    },

    /// The frame was well-formed but a known command code's payload did not
    /// match its expected shape.
    #[error("invalid payload for code {code}: {reason}")]
    InvalidPayload {
        /// The command code whose parser failed.
        code: String,
        /// A short description of what was wrong.
        reason: String,
    },

    /// The source/destination address types were inconsistent for the code.
    #[error("invalid address set for code {code}: {reason}")]
    InvalidAddrSet {
        /// The command code the message carried.
        code: String,
        /// A short description of the inconsistency.
        reason: String,
    },

    /// A bind-state transmission was attempted that the current state does
    /// not permit. The context moves to `Unknown`.
    #[error("bind flow error in state {state}: {action}")]
    BindFlowError {
        /// The state the context was in when the bad transmission happened.
        state: &'static str,
        /// The transmission that was attempted.
        action: &'static str,
    },

    /// An operation was attempted on a terminal/unknown bind context, or a
    /// context was re-initialised over an existing non-terminal one.
    #[error("bind state error: {reason}")]
    BindStateError {
        /// A short description of the illegal operation.
        reason: String,
    },

    /// An entity invariant was violated (e.g. two controllers claiming the
    /// same device).
    #[error("corrupt state: {reason}")]
    CorruptState {
        /// A short description of the violated invariant.
        reason: String,
    },

    /// The underlying serial transport failed.
    #[error("io fault: {0}")]
    IoFault(#[from] std::io::Error),

    /// The underlying serial port failed to open or configure.
    #[error("serial fault: {0}")]
    SerialFault(#[from] tokio_serial::Error),
}
