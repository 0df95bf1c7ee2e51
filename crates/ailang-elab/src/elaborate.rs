//! Surface → Core lowering.
//!
//! Consumes a type-checked surface module and produces a [`CoreModule`]:
//!
//! - blocks become right-nested `Let`s (discarded statements bind `_`),
//!   with a trailing `()` when the block ends in a binding
//! - record updates become `RecordExtend` over the base
//! - list patterns desugar right-to-left into `Cons`/`Nil` patterns
//! - `&&` / `||` / `!` / `!=` become `If` (short-circuit preserved)
//! - every overloaded operator becomes a `DictApp` against the dictionary
//!   the solver resolved for that node
//! - imported names become `GlobalRef`s; locals stay `Var`s
//!
//! Mixed-type equality is re-checked here: even if a defaulting race let
//! two different ground types meet an `Eq` dictionary, elaboration refuses
//! with `EL_MIXED_EQ` rather than leaving a runtime trap.

use ailang_common::{Code, Diagnostic, Span};
use ailang_syntax::ast::*;
use ailang_typeck::solve::is_ground;
use ailang_typeck::{NameOrigin, Ty, TypeckResult};

use crate::core::{
    CoreArm, CoreDecl, CoreExpr, CoreExprKind, CoreLit, CoreModule, CorePattern, DictRef,
};
use crate::pattern::compile_match;

/// The result of elaborating one module.
pub struct ElabResult {
    pub module: CoreModule,
    pub errors: Vec<Diagnostic>,
}

impl ElabResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Lower a type-checked module to Core.
pub fn elaborate_module(module: &Module, tcx: &TypeckResult) -> ElabResult {
    let mut el = Elaborator {
        tcx,
        errors: Vec::new(),
    };

    let mut bindings = Vec::new();
    let mut exports = Vec::new();
    for decl in &module.decls {
        if let Decl::Func(func) = decl {
            let body = el.elab_expr(&func.body);
            let params: Vec<String> = func.params.iter().map(|p| p.name.clone()).collect();
            let lam = CoreExpr::new(
                CoreExprKind::Lam {
                    params,
                    body: Box::new(body),
                },
                func.span,
            );
            bindings.push((func.name.clone(), lam));
            if func.exported {
                exports.push(func.name.clone());
            }
        }
    }

    ElabResult {
        module: CoreModule {
            path: module.path.clone(),
            imports: module.imports.iter().map(|i| i.module.clone()).collect(),
            decls: vec![CoreDecl::LetRec(bindings)],
            exports,
        },
        errors: el.errors,
    }
}

/// The `EL_MIXED_EQ` defense, factored out so it can be exercised
/// directly: equality may only be elaborated when both operand types are
/// the same ground type.
pub fn check_eq_operands(lhs: &Ty, rhs: &Ty, span: Span) -> Option<Diagnostic> {
    if is_ground(lhs) && is_ground(rhs) && lhs != rhs {
        Some(
            Diagnostic::new(
                Code::ElMixedEq,
                format!("cannot compare `{}` with `{}` for equality", lhs, rhs),
            )
            .with_span(span),
        )
    } else {
        None
    }
}

struct Elaborator<'a> {
    tcx: &'a TypeckResult,
    errors: Vec<Diagnostic>,
}

impl<'a> Elaborator<'a> {
    fn elab_expr(&mut self, expr: &Expr) -> CoreExpr {
        let kind = self.elab_expr_kind(expr);
        CoreExpr::new(kind, expr.span)
    }

    fn elab_expr_kind(&mut self, expr: &Expr) -> CoreExprKind {
        match &expr.kind {
            ExprKind::Lit(lit) => CoreExprKind::Lit(elab_lit(lit)),

            ExprKind::Var(name) => match self.tcx.name_origins.get(&expr.id) {
                Some(NameOrigin::Module(module)) => CoreExprKind::GlobalRef {
                    module: module.clone(),
                    name: name.clone(),
                },
                _ => CoreExprKind::Var(name.clone()),
            },

            ExprKind::Ctor(name, args) => CoreExprKind::ConstructorApp {
                name: name.clone(),
                args: args.iter().map(|a| self.elab_expr(a)).collect(),
            },

            ExprKind::Lambda(params, body) => CoreExprKind::Lam {
                params: params.clone(),
                body: Box::new(self.elab_expr(body)),
            },

            ExprKind::Call(callee, args) => CoreExprKind::App {
                func: Box::new(self.elab_expr(callee)),
                args: args.iter().map(|a| self.elab_expr(a)).collect(),
            },

            ExprKind::Binary(op, lhs, rhs) => self.elab_binary(expr, *op, lhs, rhs),

            ExprKind::Unary(UnOp::Neg, operand) => CoreExprKind::DictApp {
                dict: self.dict_for(expr),
                method: "neg".to_string(),
                args: vec![self.elab_expr(operand)],
            },

            ExprKind::Unary(UnOp::Not, operand) => CoreExprKind::If {
                cond: Box::new(self.elab_expr(operand)),
                then_e: Box::new(bool_lit(false, expr.span)),
                else_e: Box::new(bool_lit(true, expr.span)),
            },

            ExprKind::Let {
                name,
                value,
                body,
                recursive,
                ann: _,
            } => {
                let value = self.elab_expr(value);
                let body = self.elab_expr(body);
                if *recursive {
                    CoreExprKind::LetRec {
                        bindings: vec![(name.clone(), value)],
                        body: Box::new(body),
                    }
                } else {
                    CoreExprKind::Let {
                        name: name.clone(),
                        value: Box::new(value),
                        body: Box::new(body),
                    }
                }
            }

            ExprKind::If(cond, then_e, else_e) => CoreExprKind::If {
                cond: Box::new(self.elab_expr(cond)),
                then_e: Box::new(self.elab_expr(then_e)),
                else_e: Box::new(self.elab_expr(else_e)),
            },

            ExprKind::Match(scrutinee, arms) => {
                let core_arms: Vec<CoreArm> = arms
                    .iter()
                    .map(|arm| CoreArm {
                        pattern: elab_pattern(&arm.pattern),
                        guard: arm.guard.as_ref().map(|g| self.elab_expr(g)),
                        body: self.elab_expr(&arm.body),
                    })
                    .collect();
                let plan = compile_match(&core_arms, &self.tcx.adts);
                CoreExprKind::Match {
                    scrutinee: Box::new(self.elab_expr(scrutinee)),
                    arms: core_arms,
                    plan,
                }
            }

            ExprKind::Record(fields) => CoreExprKind::Record(
                fields
                    .iter()
                    .map(|(label, value, _)| (label.clone(), self.elab_expr(value)))
                    .collect(),
            ),

            ExprKind::RecordAccess(base, label) => CoreExprKind::RecordAccess {
                base: Box::new(self.elab_expr(base)),
                label: label.clone(),
            },

            ExprKind::RecordUpdate(base, fields) => CoreExprKind::RecordExtend {
                base: Box::new(self.elab_expr(base)),
                fields: fields
                    .iter()
                    .map(|(label, value, _)| (label.clone(), self.elab_expr(value)))
                    .collect(),
            },

            ExprKind::List(items) => {
                CoreExprKind::List(items.iter().map(|i| self.elab_expr(i)).collect())
            }

            ExprKind::Block(stmts) => self.elab_block(stmts, expr.span),

            ExprKind::Annot(inner, _) => self.elab_expr_kind(inner),
        }
    }

    /// `{ s1; s2; e }` → `Let(_, s1, Let(_, s2, e))`. A block ending in a
    /// binding gets a trailing `()`.
    fn elab_block(&mut self, stmts: &[Stmt], span: Span) -> CoreExprKind {
        let ends_with_expr = matches!(stmts.last(), Some(Stmt::Expr(_)));
        let mut result: CoreExpr = if ends_with_expr {
            match stmts.last() {
                Some(Stmt::Expr(e)) => self.elab_expr(e),
                _ => unreachable!("checked by ends_with_expr"),
            }
        } else {
            CoreExpr::new(CoreExprKind::Lit(CoreLit::Unit), span)
        };
        let prefix_len = if ends_with_expr {
            stmts.len() - 1
        } else {
            stmts.len()
        };
        for stmt in stmts[..prefix_len].iter().rev() {
            result = match stmt {
                Stmt::Let {
                    name, value, span, ..
                } => CoreExpr::new(
                    CoreExprKind::Let {
                        name: name.clone(),
                        value: Box::new(self.elab_expr(value)),
                        body: Box::new(result),
                    },
                    *span,
                ),
                Stmt::Expr(e) => {
                    let value = self.elab_expr(e);
                    CoreExpr::new(
                        CoreExprKind::Let {
                            name: "_".to_string(),
                            value: Box::new(value),
                            body: Box::new(result),
                        },
                        e.span,
                    )
                }
            };
        }
        result.kind
    }

    fn elab_binary(&mut self, expr: &Expr, op: BinOp, lhs: &Expr, rhs: &Expr) -> CoreExprKind {
        match op {
            BinOp::And => CoreExprKind::If {
                cond: Box::new(self.elab_expr(lhs)),
                then_e: Box::new(self.elab_expr(rhs)),
                else_e: Box::new(bool_lit(false, expr.span)),
            },
            BinOp::Or => CoreExprKind::If {
                cond: Box::new(self.elab_expr(lhs)),
                then_e: Box::new(bool_lit(true, expr.span)),
                else_e: Box::new(self.elab_expr(rhs)),
            },
            BinOp::Concat => CoreExprKind::DictApp {
                dict: DictRef {
                    class: "Str".to_string(),
                    type_name: "String".to_string(),
                },
                method: "concat".to_string(),
                args: vec![self.elab_expr(lhs), self.elab_expr(rhs)],
            },
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let method = match op {
                    BinOp::Add => "add",
                    BinOp::Sub => "sub",
                    BinOp::Mul => "mul",
                    BinOp::Div => "div",
                    _ => "mod",
                };
                CoreExprKind::DictApp {
                    dict: self.dict_for(expr),
                    method: method.to_string(),
                    args: vec![self.elab_expr(lhs), self.elab_expr(rhs)],
                }
            }
            BinOp::Eq | BinOp::Ne => {
                self.check_mixed_eq(expr, lhs, rhs);
                let eq = CoreExprKind::DictApp {
                    dict: self.dict_for(expr),
                    method: "eq".to_string(),
                    args: vec![self.elab_expr(lhs), self.elab_expr(rhs)],
                };
                if op == BinOp::Eq {
                    eq
                } else {
                    CoreExprKind::If {
                        cond: Box::new(CoreExpr::new(eq, expr.span)),
                        then_e: Box::new(bool_lit(false, expr.span)),
                        else_e: Box::new(bool_lit(true, expr.span)),
                    }
                }
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let method = match op {
                    BinOp::Lt => "lt",
                    BinOp::Le => "le",
                    BinOp::Gt => "gt",
                    _ => "ge",
                };
                CoreExprKind::DictApp {
                    dict: self.dict_for(expr),
                    method: method.to_string(),
                    args: vec![self.elab_expr(lhs), self.elab_expr(rhs)],
                }
            }
        }
    }

    fn check_mixed_eq(&mut self, expr: &Expr, lhs: &Expr, rhs: &Expr) {
        let (Some(lhs_ty), Some(rhs_ty)) = (
            self.tcx.node_types.get(&lhs.id),
            self.tcx.node_types.get(&rhs.id),
        ) else {
            return;
        };
        if let Some(diag) = check_eq_operands(lhs_ty, rhs_ty, expr.span) {
            self.errors.push(diag);
        }
    }

    /// The dictionary the solver resolved for this operator node. Clean
    /// type checking guarantees presence; absence means the pipeline was
    /// driven past a failed solve, which is itself an error.
    fn dict_for(&mut self, expr: &Expr) -> DictRef {
        match self.tcx.node_dicts.get(&expr.id) {
            Some(dict) => DictRef {
                class: dict.class.as_str().to_string(),
                type_name: dict.type_name.clone(),
            },
            None => {
                self.errors.push(
                    Diagnostic::new(
                        Code::TcNoInstance,
                        "operator has no resolved dictionary (module elaborated after a failed solve)",
                    )
                    .with_span(expr.span),
                );
                DictRef {
                    class: "Num".to_string(),
                    type_name: "Int".to_string(),
                }
            }
        }
    }
}

fn bool_lit(value: bool, span: Span) -> CoreExpr {
    CoreExpr::new(CoreExprKind::Lit(CoreLit::Bool(value)), span)
}

fn elab_lit(lit: &Lit) -> CoreLit {
    match lit {
        Lit::Int(n) => CoreLit::Int(*n),
        Lit::Float(f) => CoreLit::Float(*f),
        Lit::Str(s) => CoreLit::Str(s.clone()),
        Lit::Bool(b) => CoreLit::Bool(*b),
        Lit::Unit => CoreLit::Unit,
    }
}

/// Desugar a surface pattern. Spread list patterns unroll right-to-left
/// into nested `Cons` patterns, the final tail being the spread variable
/// (or `Nil` without one); `[...r]` is just `r`.
pub fn elab_pattern(pattern: &Pattern) -> CorePattern {
    match &pattern.kind {
        PatKind::Wildcard => CorePattern::Wildcard,
        PatKind::Var(name) => CorePattern::Var(name.clone()),
        PatKind::Lit(lit) => CorePattern::Lit(elab_lit(lit)),
        PatKind::Ctor(name, args) => CorePattern::Ctor {
            name: name.clone(),
            args: args.iter().map(elab_pattern).collect(),
        },
        PatKind::Record(fields, rest) => CorePattern::Record {
            fields: fields
                .iter()
                .map(|(label, sub)| {
                    let pat = match sub {
                        Some(p) => elab_pattern(p),
                        None => CorePattern::Var(label.clone()),
                    };
                    (label.clone(), pat)
                })
                .collect(),
            rest: rest.clone(),
        },
        PatKind::List(items, rest) => {
            let mut tail = match rest {
                Some(name) => CorePattern::Var(name.clone()),
                None => CorePattern::Ctor {
                    name: "Nil".to_string(),
                    args: Vec::new(),
                },
            };
            for item in items.iter().rev() {
                tail = CorePattern::Ctor {
                    name: "Cons".to_string(),
                    args: vec![elab_pattern(item), tail],
                };
            }
            tail
        }
    }
}
