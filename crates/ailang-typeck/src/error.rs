//! Type error types with provenance tracking.
//!
//! Every structural error carries a `ConstraintOrigin` recording where the
//! constraint was generated, so messages can point at the exact source
//! location instead of just naming two types. `TypeError::to_diagnostic`
//! maps each variant onto its stable code from the shared taxonomy.

use std::fmt;

use ailang_common::{Code, Diagnostic, Span};

use crate::ty::{RowKind, Ty, TyVar};

/// Where a type constraint came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintOrigin {
    /// Argument `param_idx` of a call.
    FnArg { call_site: Span, param_idx: usize },
    /// A binary operator application.
    BinOp { op_span: Span },
    /// The two branches of an `if`.
    IfBranches { if_span: Span },
    /// The condition of an `if` (must be Bool).
    IfCond { span: Span },
    /// A type ascription or declared signature.
    Annotation { span: Span },
    /// A `let` binding.
    LetBinding { span: Span },
    /// A pattern checked against the scrutinee type.
    Pattern { span: Span },
    /// A match arm body unified with its siblings.
    MatchArm { span: Span },
    /// A guard expression (must be Bool).
    Guard { span: Span },
    /// A record field access.
    FieldAccess { span: Span },
    /// A record update.
    RecordUpdate { span: Span },
    /// A call's latent effect row absorbed into the caller's row.
    EffectCall { span: Span },
    /// Synthetic constraints with no single source position.
    Builtin,
}

impl ConstraintOrigin {
    pub fn span(self) -> Option<Span> {
        match self {
            ConstraintOrigin::FnArg { call_site, .. } => Some(call_site),
            ConstraintOrigin::BinOp { op_span } => Some(op_span),
            ConstraintOrigin::IfBranches { if_span } => Some(if_span),
            ConstraintOrigin::IfCond { span }
            | ConstraintOrigin::Annotation { span }
            | ConstraintOrigin::LetBinding { span }
            | ConstraintOrigin::Pattern { span }
            | ConstraintOrigin::MatchArm { span }
            | ConstraintOrigin::Guard { span }
            | ConstraintOrigin::FieldAccess { span }
            | ConstraintOrigin::RecordUpdate { span }
            | ConstraintOrigin::EffectCall { span } => Some(span),
            ConstraintOrigin::Builtin => None,
        }
    }
}

/// A type error found during inference or constraint solving.
#[derive(Clone, Debug)]
pub enum TypeError {
    /// Two types that should be equal are not.
    Mismatch {
        expected: Ty,
        found: Ty,
        origin: ConstraintOrigin,
    },
    /// A type variable occurs in its own definition (infinite type).
    InfiniteType {
        var: TyVar,
        ty: Ty,
        origin: ConstraintOrigin,
    },
    /// A record row met an effect row.
    RowKindMismatch {
        left: RowKind,
        right: RowKind,
        origin: ConstraintOrigin,
    },
    /// A row lacks a required label. For record rows this is a missing
    /// field; for effect rows it means an effect the caller never declared.
    RowMissingLabel {
        label: String,
        row: Ty,
        kind: RowKind,
        origin: ConstraintOrigin,
    },
    /// A record literal spelled the same label twice.
    DuplicateField {
        label: String,
        first: Span,
        second: Span,
    },
    /// Function called with the wrong number of arguments.
    ArityMismatch {
        expected: usize,
        found: usize,
        origin: ConstraintOrigin,
    },
    /// A name is not in scope.
    UnboundVariable { name: String, span: Span },
    /// A constructor name is not defined by any type declaration in scope.
    UnknownConstructor { name: String, span: Span },
    /// A constructor applied to the wrong number of arguments.
    CtorArity {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    /// A type annotation references an unknown type or type variable.
    UnknownTypeName { name: String, span: Span },
    /// An effect annotation uses a label outside the known effect set.
    UnknownEffect { name: String, span: Span },
    /// An import references a module the loader did not provide.
    ImportModuleNotFound { module: String, span: Span },
    /// An import references a name the module does not export.
    ImportNameNotFound {
        module: String,
        name: String,
        span: Span,
        available: Vec<String>,
    },
    /// A class constraint could not be discharged at a ground type.
    NoInstance {
        class: String,
        ty: Ty,
        span: Span,
    },
    /// A class constraint is still ambiguous after defaulting.
    Ambiguous {
        class: String,
        ty: Ty,
        span: Span,
    },
}

impl TypeError {
    /// Map onto the stable diagnostic code taxonomy.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let (code, span, hint) = match self {
            TypeError::Mismatch { origin, .. } => (Code::TcUnify, origin.span(), None),
            TypeError::InfiniteType { origin, .. } => (Code::TcOccurs, origin.span(), None),
            TypeError::RowKindMismatch { origin, .. } => (Code::TcRowKind, origin.span(), None),
            TypeError::RowMissingLabel { kind, origin, .. } => {
                let code = match kind {
                    RowKind::Record => Code::TcRecFieldMissing,
                    RowKind::Effect => Code::TcUnify,
                };
                let hint = match kind {
                    RowKind::Effect => {
                        Some("declare the effect in the function signature, e.g. `! {IO}`".to_string())
                    }
                    RowKind::Record => None,
                };
                (code, origin.span(), hint)
            }
            TypeError::DuplicateField { second, .. } => {
                (Code::TcRecDuplicate, Some(*second), None)
            }
            TypeError::ArityMismatch { origin, .. } => (Code::TcUnify, origin.span(), None),
            TypeError::UnboundVariable { span, name } => (
                Code::TcUnify,
                Some(*span),
                Some(format!("`{}` is not defined; check imports", name)),
            ),
            TypeError::UnknownConstructor { span, .. } => (Code::TcUnify, Some(*span), None),
            TypeError::CtorArity { span, .. } => (Code::TcUnify, Some(*span), None),
            TypeError::UnknownTypeName { span, .. } => (Code::TcUnify, Some(*span), None),
            TypeError::UnknownEffect { span, .. } => (
                Code::TcUnify,
                Some(*span),
                Some("known effects are IO, FS, Clock, and Net".to_string()),
            ),
            TypeError::ImportModuleNotFound { span, .. } => (Code::TcUnify, Some(*span), None),
            TypeError::ImportNameNotFound {
                span, available, ..
            } => {
                let hint = if available.is_empty() {
                    None
                } else {
                    Some(format!("exported names: {}", available.join(", ")))
                };
                (Code::TcUnify, Some(*span), hint)
            }
            TypeError::NoInstance { span, .. } => (Code::TcNoInstance, Some(*span), None),
            TypeError::Ambiguous { span, .. } => (
                Code::TcAmbiguous,
                Some(*span),
                Some("add a type annotation to fix the numeric type".to_string()),
            ),
        };
        let mut diag = Diagnostic::new(code, self.to_string());
        if let Some(span) = span {
            diag = diag.with_span(span);
        }
        if let Some(hint) = hint {
            diag = diag.with_hint(hint);
        }
        diag
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::Mismatch {
                expected, found, ..
            } => write!(f, "type mismatch: expected `{}`, found `{}`", expected, found),
            TypeError::InfiniteType { var, ty, .. } => {
                write!(f, "infinite type: `?{}` occurs in `{}`", var.0, ty)
            }
            TypeError::RowKindMismatch { left, right, .. } => write!(
                f,
                "cannot mix a {} row with a {} row",
                left, right
            ),
            TypeError::RowMissingLabel {
                label, row, kind, ..
            } => match kind {
                RowKind::Record => {
                    write!(f, "record `{{{}}}` has no field `{}`", DisplayTy(row), label)
                }
                RowKind::Effect => write!(
                    f,
                    "effect `{}` is not declared in the enclosing function's effect row",
                    label
                ),
            },
            TypeError::DuplicateField { label, .. } => {
                write!(f, "duplicate record field `{}`", label)
            }
            TypeError::ArityMismatch {
                expected, found, ..
            } => write!(
                f,
                "arity mismatch: expected {} arguments, found {}",
                expected, found
            ),
            TypeError::UnboundVariable { name, .. } => {
                write!(f, "unbound variable `{}`", name)
            }
            TypeError::UnknownConstructor { name, .. } => {
                write!(f, "unknown constructor `{}`", name)
            }
            TypeError::CtorArity {
                name,
                expected,
                found,
                ..
            } => write!(
                f,
                "constructor `{}` takes {} arguments, found {}",
                name, expected, found
            ),
            TypeError::UnknownTypeName { name, .. } => {
                write!(f, "unknown type `{}`", name)
            }
            TypeError::UnknownEffect { name, .. } => {
                write!(f, "unknown effect `{}`", name)
            }
            TypeError::ImportModuleNotFound { module, .. } => {
                write!(f, "module `{}` not found", module)
            }
            TypeError::ImportNameNotFound { module, name, .. } => {
                write!(f, "`{}` is not exported by module `{}`", name, module)
            }
            TypeError::NoInstance { class, ty, .. } => {
                write!(f, "no instance of `{}` for type `{}`", class, ty)
            }
            TypeError::Ambiguous { class, ty, .. } => write!(
                f,
                "ambiguous type: `{}` constraint on `{}` could not be resolved",
                class, ty
            ),
        }
    }
}

/// Row display without the `Record(...)` wrapper noise in messages.
struct DisplayTy<'a>(&'a Ty);

impl fmt::Display for DisplayTy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_maps_to_tc_unify() {
        let err = TypeError::Mismatch {
            expected: Ty::int(),
            found: Ty::string(),
            origin: ConstraintOrigin::Builtin,
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.code, Code::TcUnify);
        assert!(diag.message.contains("Int"));
        assert!(diag.message.contains("String"));
    }

    #[test]
    fn missing_record_field_maps_to_rec_field_missing() {
        let err = TypeError::RowMissingLabel {
            label: "age".into(),
            row: Ty::RowEmpty(RowKind::Record),
            kind: RowKind::Record,
            origin: ConstraintOrigin::Builtin,
        };
        assert_eq!(err.to_diagnostic().code, Code::TcRecFieldMissing);
    }

    #[test]
    fn missing_effect_hints_at_signature() {
        let err = TypeError::RowMissingLabel {
            label: "IO".into(),
            row: Ty::RowEmpty(RowKind::Effect),
            kind: RowKind::Effect,
            origin: ConstraintOrigin::Builtin,
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.code, Code::TcUnify);
        assert!(diag.hint.unwrap().contains("! {IO}"));
    }

    #[test]
    fn ambiguous_maps_to_tc_ambiguous() {
        let err = TypeError::Ambiguous {
            class: "Num".into(),
            ty: Ty::Var(TyVar(0)),
            span: Span::new(0, 1),
        };
        assert_eq!(err.to_diagnostic().code, Code::TcAmbiguous);
    }
}
