//! Internal invariant-violation errors. These indicate bugs in the
//! compiler itself (impossible-by-construction states, an unknown opcode,
//! an exhausted register search) rather than a malformed input program —
//! user-visible diagnostics live in `katara_ir::issues` and
//! `katara_interp`'s `HeapError` instead.

use thiserror::Error;

/// The internal-invariant error type shared across backend crates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KataraError {
    #[error("invariant violation: {message}")]
    Invariant { message: String },

    #[error("unknown opcode: {message}")]
    UnknownOpcode { message: String },

    #[error("register allocation failure: {message}")]
    RegisterAllocation { message: String },

    #[error("encoding failure: {message}")]
    Encoding { message: String },

    #[error("linking failure: {message}")]
    Linking { message: String },
}

/// Result type alias for internal-invariant-fallible operations.
pub type KataraResult<T> = Result<T, KataraError>;

impl KataraError {
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant { message: message.into() }
    }

    pub fn unknown_opcode(message: impl Into<String>) -> Self {
        Self::UnknownOpcode { message: message.into() }
    }

    pub fn register_allocation(message: impl Into<String>) -> Self {
        Self::RegisterAllocation { message: message.into() }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding { message: message.into() }
    }

    pub fn linking(message: impl Into<String>) -> Self {
        Self::Linking { message: message.into() }
    }
}
