//! Shared foundation types for the AILANG pipeline.
//!
//! Every stage (lexer, parser, type checker, elaborator, runtime, CLI)
//! depends on this crate for source spans, structured diagnostics with
//! stable codes, and the deterministic JSON value used both by the language
//! and by tooling output.

pub mod diag;
pub mod json;
pub mod span;

pub use diag::{Code, Diagnostic};
pub use json::{decode as json_decode, encode as json_encode, Json, JsonError};
pub use span::Span;
