//! Structured diagnostics with stable short codes.
//!
//! Every user-facing failure in the pipeline funnels into a [`Diagnostic`]:
//! a stable code, a one-line summary, an optional source span, and an
//! optional actionable hint ("Run with `--caps IO`"). Phases collect
//! diagnostics rather than aborting on the first, so a single run can report
//! multiple type errors.

use std::fmt;

use serde::Serialize;

use crate::span::Span;

/// Stable short codes for every diagnostic the pipeline can produce.
///
/// Codes are part of the tool contract: tests, editors, and the eval harness
/// match on them, so variants are append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Code {
    // Parser.
    ParUnexpected,
    ParUnterminated,
    // Type checker.
    TcUnify,
    TcOccurs,
    TcRowKind,
    TcAmbiguous,
    TcNoInstance,
    TcRecFieldMissing,
    TcRecDuplicate,
    // Elaborator.
    ElMixedEq,
    // Runtime.
    RtMatchNonExhaustive,
    RtDivZero,
    RtStackOverflow,
    /// A value's runtime tag defeated dispatch — unreachable after a clean
    /// type check, but still reported structurally rather than panicking.
    RtType,
    // Capability runtime.
    CapMissing,
    CapPolicy,
    // Module runtime.
    GlobalUndefined,
    ImportCycle,
    ModEntryNotFound,
    ModArity,
    // JSON.
    JsonDecode,
}

impl Code {
    /// The wire form of the code, e.g. `"TC_UNIFY"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Code::ParUnexpected => "PAR_UNEXPECTED",
            Code::ParUnterminated => "PAR_UNTERMINATED",
            Code::TcUnify => "TC_UNIFY",
            Code::TcOccurs => "TC_OCCURS",
            Code::TcRowKind => "TC_ROW_KIND",
            Code::TcAmbiguous => "TC_AMBIGUOUS",
            Code::TcNoInstance => "TC_NO_INSTANCE",
            Code::TcRecFieldMissing => "TC_REC_FIELD_MISSING",
            Code::TcRecDuplicate => "TC_REC_DUPLICATE",
            Code::ElMixedEq => "EL_MIXED_EQ",
            Code::RtMatchNonExhaustive => "RT_MATCH_NON_EXHAUSTIVE",
            Code::RtDivZero => "RT_DIV_ZERO",
            Code::RtStackOverflow => "RT_STACK_OVERFLOW",
            Code::RtType => "RT_TYPE",
            Code::CapMissing => "CAP_MISSING",
            Code::CapPolicy => "CAP_POLICY",
            Code::GlobalUndefined => "GLOBAL_UNDEFINED",
            Code::ImportCycle => "IMPORT_CYCLE",
            Code::ModEntryNotFound => "MOD_ENTRY_NOT_FOUND",
            Code::ModArity => "MOD_ARITY",
            Code::JsonDecode => "JSON_DECODE",
        }
    }

    /// Process exit code for a run that failed with this diagnostic.
    ///
    /// 2 is reserved for missing capabilities so harnesses can distinguish
    /// "program was denied an effect" from ordinary failures; everything
    /// else is a generic 1. (3, usage errors, never reaches a diagnostic.)
    pub fn exit_code(self) -> i32 {
        match self {
            Code::CapMissing => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: Code,
    pub message: String,
    pub span: Option<Span>,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            message: message.into(),
            span: None,
            hint: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_wire_forms() {
        assert_eq!(Code::TcUnify.as_str(), "TC_UNIFY");
        assert_eq!(Code::CapMissing.as_str(), "CAP_MISSING");
        assert_eq!(Code::ImportCycle.as_str(), "IMPORT_CYCLE");
        assert_eq!(Code::RtMatchNonExhaustive.as_str(), "RT_MATCH_NON_EXHAUSTIVE");
    }

    #[test]
    fn exit_codes() {
        assert_eq!(Code::CapMissing.exit_code(), 2);
        assert_eq!(Code::TcUnify.exit_code(), 1);
        assert_eq!(Code::RtDivZero.exit_code(), 1);
    }

    #[test]
    fn display_includes_code_and_hint() {
        let d = Diagnostic::new(Code::CapMissing, "effect IO requires the IO capability")
            .with_hint("Run with --caps IO");
        assert_eq!(
            d.to_string(),
            "CAP_MISSING: effect IO requires the IO capability (hint: Run with --caps IO)"
        );
    }
}
