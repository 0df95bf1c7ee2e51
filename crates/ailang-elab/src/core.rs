//! The Core AST: the simplified tree the evaluator executes.
//!
//! Core is what remains after elaboration: blocks are nested lets, record
//! updates are `RecordExtend`, list patterns are `Cons`/`Nil` constructor
//! patterns, and every overloaded operator is an explicit [`DictApp`].

use ailang_common::Span;

use crate::pattern::MatchPlan;

/// A Core expression with its originating source span.
#[derive(Debug, Clone)]
pub struct CoreExpr {
    pub kind: CoreExprKind,
    pub span: Span,
}

impl CoreExpr {
    pub fn new(kind: CoreExprKind, span: Span) -> Self {
        CoreExpr { kind, span }
    }
}

#[derive(Debug, Clone)]
pub enum CoreExprKind {
    Lit(CoreLit),
    /// A module-local or lexically-bound name.
    Var(String),
    /// A reference into another module's exports.
    GlobalRef { module: String, name: String },
    Lam {
        params: Vec<String>,
        body: Box<CoreExpr>,
    },
    App {
        func: Box<CoreExpr>,
        args: Vec<CoreExpr>,
    },
    Let {
        name: String,
        value: Box<CoreExpr>,
        body: Box<CoreExpr>,
    },
    LetRec {
        bindings: Vec<(String, CoreExpr)>,
        body: Box<CoreExpr>,
    },
    If {
        cond: Box<CoreExpr>,
        then_e: Box<CoreExpr>,
        else_e: Box<CoreExpr>,
    },
    Match {
        scrutinee: Box<CoreExpr>,
        arms: Vec<CoreArm>,
        plan: MatchPlan,
    },
    Record(Vec<(String, CoreExpr)>),
    RecordAccess {
        base: Box<CoreExpr>,
        label: String,
    },
    /// Functional record update: `base` with `fields` replaced.
    RecordExtend {
        base: Box<CoreExpr>,
        fields: Vec<(String, CoreExpr)>,
    },
    List(Vec<CoreExpr>),
    /// `Cons(head, tail)` — produced by list-building primitives.
    Cons {
        head: Box<CoreExpr>,
        tail: Box<CoreExpr>,
    },
    /// The empty list.
    Nil,
    ConstructorApp {
        name: String,
        args: Vec<CoreExpr>,
    },
    /// Overload resolution made explicit: `DictApp(Num/Int, "add", [a, b])`
    /// dispatches to the builtin `_add_Int`.
    DictApp {
        dict: DictRef,
        method: String,
        args: Vec<CoreExpr>,
    },
}

/// A resolved dictionary reference: class plus the instance's type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictRef {
    pub class: String,
    pub type_name: String,
}

impl DictRef {
    /// The builtin implementing `method` for this dictionary, following
    /// the `_method_Type` naming convention: `_add_Int`, `_eq_Float`, ...
    pub fn builtin_name(&self, method: &str) -> String {
        format!("_{}_{}", method, self.type_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoreLit {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Unit,
}

/// One arm of a Core match.
#[derive(Debug, Clone)]
pub struct CoreArm {
    pub pattern: CorePattern,
    pub guard: Option<CoreExpr>,
    pub body: CoreExpr,
}

/// Patterns after desugaring. List patterns are gone: `[p, ...r]` became
/// `Cons(p, r)` and `[]` became `Nil`.
#[derive(Debug, Clone, PartialEq)]
pub enum CorePattern {
    Wildcard,
    Var(String),
    Lit(CoreLit),
    Ctor {
        name: String,
        args: Vec<CorePattern>,
    },
    Record {
        fields: Vec<(String, CorePattern)>,
        rest: Option<String>,
    },
}

impl CorePattern {
    /// Whether this pattern matches every value of its type. Record
    /// patterns only inspect fields the type guarantees, so they are
    /// irrefutable when their sub-patterns are.
    pub fn is_irrefutable(&self) -> bool {
        match self {
            CorePattern::Wildcard | CorePattern::Var(_) => true,
            CorePattern::Lit(_) | CorePattern::Ctor { .. } => false,
            CorePattern::Record { fields, .. } => {
                fields.iter().all(|(_, p)| p.is_irrefutable())
            }
        }
    }
}

// ── Modules ─────────────────────────────────────────────────────────────

/// An elaborated module, ready for the loader.
#[derive(Debug, Clone)]
pub struct CoreModule {
    pub path: String,
    /// Import paths in declaration order.
    pub imports: Vec<String>,
    /// Top-level declarations in source order.
    pub decls: Vec<CoreDecl>,
    /// Names this module exports.
    pub exports: Vec<String>,
}

/// A top-level Core declaration.
#[derive(Debug, Clone)]
pub enum CoreDecl {
    /// A mutually-recursive group of bindings (all the module's functions).
    LetRec(Vec<(String, CoreExpr)>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dict_builtin_naming_convention() {
        let num_int = DictRef {
            class: "Num".into(),
            type_name: "Int".into(),
        };
        assert_eq!(num_int.builtin_name("add"), "_add_Int");
        let eq_float = DictRef {
            class: "Eq".into(),
            type_name: "Float".into(),
        };
        assert_eq!(eq_float.builtin_name("eq"), "_eq_Float");
    }

    #[test]
    fn record_patterns_are_irrefutable_when_subs_are() {
        let p = CorePattern::Record {
            fields: vec![("x".into(), CorePattern::Var("a".into()))],
            rest: None,
        };
        assert!(p.is_irrefutable());
        let q = CorePattern::Record {
            fields: vec![("x".into(), CorePattern::Lit(CoreLit::Int(1)))],
            rest: None,
        };
        assert!(!q.is_irrefutable());
    }
}
