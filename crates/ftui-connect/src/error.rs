#![forbid(unsafe_code)]

//! Error types for store-connected bindings.
//!
//! Only structural misuse is reported as an error. Late store notifications
//! and scheduler actions that fire after a binding has been torn down are
//! silent no-ops, and selector panics propagate to the caller unchanged.

use crate::binding::Phase;

/// Errors from binding lifecycle and configuration operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// A lifecycle transition was requested from a phase that does not allow it.
    #[error("cannot {action} a binding in the {phase} phase")]
    InvalidTransition {
        /// Phase the binding was in when the transition was requested.
        phase: Phase,
        /// Name of the rejected transition (e.g. `"mount"`).
        action: &'static str,
    },
    /// A configuration document could not be parsed.
    #[error("invalid connect config: {0}")]
    Config(String),
}

/// Convenience alias for results carrying a [`ConnectError`].
pub type Result<T> = std::result::Result<T, ConnectError>;
