//! Shared diagnostics, source spans and error types for the Katara
//! compiler backend: the IR data model, verifier, liveness/interference
//! analysis, register allocator, interpreter and x86-64 backend all build
//! on the types in this crate rather than inventing their own.

pub mod diagnostics;
pub mod error;
pub mod span;

pub use diagnostics::{Diagnostic, Severity};
pub use error::{KataraError, KataraResult};
pub use span::{Position, Span};
