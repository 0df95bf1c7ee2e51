//! The tree-walking evaluator.
//!
//! Strict, pure, left-to-right. Closures capture their environment chain
//! by reference; `letrec` pre-binds slots so recursion groups see each
//! other. Matches dispatch through the compiled plan: a `Switch` walk
//! prunes impossible arms, then the leaf's ordered candidates are
//! re-matched in full so guard failure falls through exactly as a linear
//! scan would.
//!
//! Recursion is guarded by a frame counter: past the limit the run aborts
//! with a structured `RT_STACK_OVERFLOW` instead of taking the host stack
//! down.

use std::cell::Cell;
use std::rc::Rc;

use ailang_common::{Code, Diagnostic, Span};
use ailang_elab::{
    AccessPath, CaseKey, CoreArm, CoreExpr, CoreExprKind, CoreLit, CorePattern, DecisionTree,
    MatchPlan,
};

use crate::builtins::registry;
use crate::effects::EffContext;
use crate::env::{Env, EnvRef};
use crate::loader::ModuleInstance;
use crate::value::{Closure, Value};

/// Frames of user-level application allowed before `RT_STACK_OVERFLOW`.
pub const MAX_DEPTH: usize = 10_000;

pub struct Evaluator<'c> {
    ctx: &'c EffContext,
    depth: Cell<usize>,
}

impl<'c> Evaluator<'c> {
    pub fn new(ctx: &'c EffContext) -> Self {
        Evaluator {
            ctx,
            depth: Cell::new(0),
        }
    }

    pub fn eval(
        &self,
        expr: &CoreExpr,
        env: &EnvRef,
        module: &Rc<ModuleInstance>,
    ) -> Result<Value, Diagnostic> {
        match &expr.kind {
            CoreExprKind::Lit(lit) => Ok(lit_value(lit)),

            CoreExprKind::Var(name) => env.lookup(name).ok_or_else(|| {
                Diagnostic::new(Code::RtType, format!("unbound variable `{}`", name))
                    .with_span(expr.span)
            }),

            CoreExprKind::GlobalRef { module: target, name } => module
                .resolve_global(target, name)
                .map_err(|d| with_span(d, expr.span)),

            CoreExprKind::Lam { params, body } => Ok(Value::Closure(Rc::new(Closure {
                params: params.clone(),
                body: (**body).clone(),
                env: Rc::clone(env),
                module: Rc::clone(module),
            }))),

            CoreExprKind::App { func, args } => {
                let callee = self.eval(func, env, module)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval(arg, env, module)?);
                }
                self.apply(callee, arg_values, expr.span)
            }

            CoreExprKind::Let { name, value, body } => {
                let bound = self.eval(value, env, module)?;
                let child = Env::child(env);
                child.define(name.clone(), bound);
                self.eval(body, &child, module)
            }

            CoreExprKind::LetRec { bindings, body } => {
                let child = Env::child(env);
                for (name, _) in bindings {
                    child.define(name.clone(), Value::Unit);
                }
                for (name, value_expr) in bindings {
                    let value = self.eval(value_expr, &child, module)?;
                    child.define(name.clone(), value);
                }
                self.eval(body, &child, module)
            }

            CoreExprKind::If {
                cond,
                then_e,
                else_e,
            } => match self.eval(cond, env, module)? {
                Value::Bool(true) => self.eval(then_e, env, module),
                Value::Bool(false) => self.eval(else_e, env, module),
                other => Err(Diagnostic::new(
                    Code::RtType,
                    format!("if condition must be Bool, got {}", other.tag()),
                )
                .with_span(cond.span)),
            },

            CoreExprKind::Match {
                scrutinee,
                arms,
                plan,
            } => {
                let value = self.eval(scrutinee, env, module)?;
                self.eval_match(&value, arms, plan, env, module, expr.span)
            }

            CoreExprKind::Record(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for (label, value_expr) in fields {
                    out.push((label.clone(), self.eval(value_expr, env, module)?));
                }
                Ok(Value::record(out))
            }

            CoreExprKind::RecordAccess { base, label } => {
                let value = self.eval(base, env, module)?;
                value.field(label).cloned().ok_or_else(|| {
                    Diagnostic::new(
                        Code::RtType,
                        format!("{} value has no field `{}`", value.tag(), label),
                    )
                    .with_span(expr.span)
                })
            }

            CoreExprKind::RecordExtend { base, fields } => {
                let base_value = self.eval(base, env, module)?;
                let Value::Record(base_fields) = &base_value else {
                    return Err(Diagnostic::new(
                        Code::RtType,
                        format!("cannot update a {} value", base_value.tag()),
                    )
                    .with_span(expr.span));
                };
                let mut out: Vec<(String, Value)> = base_fields.as_ref().clone();
                for (label, value_expr) in fields {
                    let value = self.eval(value_expr, env, module)?;
                    match out.iter_mut().find(|(l, _)| l == label) {
                        Some(slot) => slot.1 = value,
                        None => out.push((label.clone(), value)),
                    }
                }
                Ok(Value::record(out))
            }

            CoreExprKind::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, env, module)?);
                }
                Ok(Value::list(out))
            }

            CoreExprKind::Cons { head, tail } => {
                let head_value = self.eval(head, env, module)?;
                let tail_value = self.eval(tail, env, module)?;
                let Value::List(items) = &tail_value else {
                    return Err(Diagnostic::new(
                        Code::RtType,
                        format!("cons tail must be a List, got {}", tail_value.tag()),
                    )
                    .with_span(expr.span));
                };
                let mut out = Vec::with_capacity(items.len() + 1);
                out.push(head_value);
                out.extend(items.iter().cloned());
                Ok(Value::list(out))
            }

            CoreExprKind::Nil => Ok(Value::list(Vec::new())),

            CoreExprKind::ConstructorApp { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env, module)?);
                }
                Ok(Value::ctor(name.clone(), values))
            }

            CoreExprKind::DictApp { dict, method, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env, module)?);
                }
                let builtin = dict.builtin_name(method);
                registry()
                    .call(&builtin, self.ctx, &values)
                    .map_err(|d| with_span(d, expr.span))
            }
        }
    }

    /// Apply a callable to already-evaluated arguments.
    pub fn apply(
        &self,
        callee: Value,
        args: Vec<Value>,
        span: Span,
    ) -> Result<Value, Diagnostic> {
        match callee {
            Value::Closure(closure) => {
                if args.len() != closure.params.len() {
                    return Err(Diagnostic::new(
                        Code::RtType,
                        format!(
                            "function takes {} arguments, got {}",
                            closure.params.len(),
                            args.len()
                        ),
                    )
                    .with_span(span));
                }
                let depth = self.depth.get() + 1;
                if depth > MAX_DEPTH {
                    return Err(Diagnostic::new(
                        Code::RtStackOverflow,
                        format!("recursion deeper than {} frames", MAX_DEPTH),
                    )
                    .with_span(span));
                }
                self.depth.set(depth);
                let frame = Env::child(&closure.env);
                for (param, value) in closure.params.iter().zip(args) {
                    frame.define(param.clone(), value);
                }
                let result = self.eval(&closure.body, &frame, &closure.module);
                self.depth.set(self.depth.get() - 1);
                result
            }
            Value::Builtin(name) => registry()
                .call(name, self.ctx, &args)
                .map_err(|d| with_span(d, span)),
            other => Err(Diagnostic::new(
                Code::RtType,
                format!("{} value is not callable", other.tag()),
            )
            .with_span(span)),
        }
    }

    // ── Match dispatch ──────────────────────────────────────────────────

    fn eval_match(
        &self,
        scrutinee: &Value,
        arms: &[CoreArm],
        plan: &MatchPlan,
        env: &EnvRef,
        module: &Rc<ModuleInstance>,
        span: Span,
    ) -> Result<Value, Diagnostic> {
        let candidates: Vec<usize> = match plan {
            MatchPlan::Linear => (0..arms.len()).collect(),
            MatchPlan::Tree(tree) => match self.walk_tree(tree, scrutinee, span)? {
                Some(candidates) => candidates,
                None => return Err(non_exhaustive(scrutinee, span)),
            },
        };
        self.try_candidates(scrutinee, arms, &candidates, env, module, span)
    }

    /// Walk the decision tree down to a leaf. `None` means a `Fail` node
    /// or an unmatched switch: no arm can take this value.
    fn walk_tree(
        &self,
        tree: &DecisionTree,
        scrutinee: &Value,
        span: Span,
    ) -> Result<Option<Vec<usize>>, Diagnostic> {
        match tree {
            DecisionTree::Leaf { candidates } => Ok(Some(candidates.clone())),
            DecisionTree::Fail => Ok(None),
            DecisionTree::Switch {
                path,
                cases,
                default,
            } => {
                let value = value_at(path, scrutinee, span)?;
                for (key, subtree) in cases {
                    if key_matches(key, &value) {
                        return self.walk_tree(subtree, scrutinee, span);
                    }
                }
                match default {
                    Some(subtree) => self.walk_tree(subtree, scrutinee, span),
                    None => Ok(None),
                }
            }
        }
    }

    /// Try each candidate arm in order: full pattern re-match (binding
    /// variables), then the guard; a false guard falls through.
    fn try_candidates(
        &self,
        scrutinee: &Value,
        arms: &[CoreArm],
        candidates: &[usize],
        env: &EnvRef,
        module: &Rc<ModuleInstance>,
        span: Span,
    ) -> Result<Value, Diagnostic> {
        for &idx in candidates {
            let arm = &arms[idx];
            let Some(bindings) = try_match(&arm.pattern, scrutinee) else {
                continue;
            };
            let arm_env = Env::child(env);
            for (name, value) in bindings {
                arm_env.define(name, value);
            }
            if let Some(guard) = &arm.guard {
                match self.eval(guard, &arm_env, module)? {
                    Value::Bool(true) => {}
                    Value::Bool(false) => continue,
                    other => {
                        return Err(Diagnostic::new(
                            Code::RtType,
                            format!("guard must be Bool, got {}", other.tag()),
                        )
                        .with_span(guard.span))
                    }
                }
            }
            return self.eval(&arm.body, &arm_env, module);
        }
        Err(non_exhaustive(scrutinee, span))
    }
}

fn non_exhaustive(scrutinee: &Value, span: Span) -> Diagnostic {
    Diagnostic::new(
        Code::RtMatchNonExhaustive,
        format!("no pattern matches {}", scrutinee.render()),
    )
    .with_span(span)
}

fn with_span(diag: Diagnostic, span: Span) -> Diagnostic {
    if diag.span.is_none() {
        diag.with_span(span)
    } else {
        diag
    }
}

fn lit_value(lit: &CoreLit) -> Value {
    match lit {
        CoreLit::Int(n) => Value::Int(*n),
        CoreLit::Float(f) => Value::Float(*f),
        CoreLit::Str(s) => Value::str(s.clone()),
        CoreLit::Bool(b) => Value::Bool(*b),
        CoreLit::Unit => Value::Unit,
    }
}

// ── Pattern matching against values ─────────────────────────────────────

/// Match a pattern against a value, returning its bindings on success.
pub fn try_match(pattern: &CorePattern, value: &Value) -> Option<Vec<(String, Value)>> {
    let mut bindings = Vec::new();
    if match_into(pattern, value, &mut bindings) {
        Some(bindings)
    } else {
        None
    }
}

fn match_into(
    pattern: &CorePattern,
    value: &Value,
    bindings: &mut Vec<(String, Value)>,
) -> bool {
    match pattern {
        CorePattern::Wildcard => true,
        CorePattern::Var(name) => {
            bindings.push((name.clone(), value.clone()));
            true
        }
        CorePattern::Lit(lit) => lit_matches(lit, value),
        CorePattern::Ctor { name, args } => match value {
            // Lists are first-class values; Cons/Nil patterns view them
            // structurally. A user type reusing those names still carries
            // ordinary constructor values and takes the generic arm below.
            Value::List(items) => match name.as_str() {
                "Cons" if !items.is_empty() && args.len() == 2 => {
                    let head = &items[0];
                    let tail = Value::list(items[1..].to_vec());
                    match_into(&args[0], head, bindings) && match_into(&args[1], &tail, bindings)
                }
                "Nil" => items.is_empty(),
                _ => false,
            },
            Value::Ctor {
                name: value_name,
                args: value_args,
            } => {
                value_name.as_str() == name
                    && value_args.len() == args.len()
                    && args
                        .iter()
                        .zip(value_args.iter())
                        .all(|(p, v)| match_into(p, v, bindings))
            }
            _ => false,
        },
        CorePattern::Record { fields, rest } => {
            for (label, sub) in fields {
                let Some(field_value) = value.field(label) else {
                    return false;
                };
                if !match_into(sub, &field_value.clone(), bindings) {
                    return false;
                }
            }
            if let Some(rest_name) = rest {
                let Value::Record(all) = value else {
                    return false;
                };
                let remaining: Vec<(String, Value)> = all
                    .iter()
                    .filter(|(l, _)| !fields.iter().any(|(fl, _)| fl == l))
                    .cloned()
                    .collect();
                bindings.push((rest_name.clone(), Value::record(remaining)));
            }
            true
        }
    }
}

fn lit_matches(lit: &CoreLit, value: &Value) -> bool {
    match (lit, value) {
        (CoreLit::Int(a), Value::Int(b)) => a == b,
        (CoreLit::Float(a), Value::Float(b)) => a == b,
        (CoreLit::Str(a), Value::Str(b)) => a == b.as_ref(),
        (CoreLit::Bool(a), Value::Bool(b)) => a == b,
        (CoreLit::Unit, Value::Unit) => true,
        _ => false,
    }
}

/// Extract the sub-value a decision-tree path points at.
fn value_at(path: &AccessPath, scrutinee: &Value, span: Span) -> Result<Value, Diagnostic> {
    match path {
        AccessPath::Root => Ok(scrutinee.clone()),
        AccessPath::CtorArg(parent, idx) => {
            let parent_value = value_at(parent, scrutinee, span)?;
            match &parent_value {
                Value::Ctor { args, .. } if *idx < args.len() => Ok(args[*idx].clone()),
                Value::List(items) if !items.is_empty() => match idx {
                    0 => Ok(items[0].clone()),
                    1 => Ok(Value::list(items[1..].to_vec())),
                    _ => Err(bad_path(&parent_value, span)),
                },
                _ => Err(bad_path(&parent_value, span)),
            }
        }
        AccessPath::Field(parent, label) => {
            let parent_value = value_at(parent, scrutinee, span)?;
            parent_value
                .field(label)
                .cloned()
                .ok_or_else(|| bad_path(&parent_value, span))
        }
    }
}

fn bad_path(value: &Value, span: Span) -> Diagnostic {
    Diagnostic::new(
        Code::RtType,
        format!("decision tree path does not apply to {}", value.tag()),
    )
    .with_span(span)
}

fn key_matches(key: &CaseKey, value: &Value) -> bool {
    match key {
        CaseKey::Ctor(name) => match value {
            Value::List(items) => match name.as_str() {
                "Cons" => !items.is_empty(),
                "Nil" => items.is_empty(),
                _ => false,
            },
            Value::Ctor { name: vn, .. } => vn.as_str() == name,
            _ => false,
        },
        CaseKey::Lit(lit) => lit_matches(lit, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_pat(n: i64) -> CorePattern {
        CorePattern::Lit(CoreLit::Int(n))
    }

    #[test]
    fn literal_patterns_match_by_value() {
        assert!(try_match(&int_pat(3), &Value::Int(3)).is_some());
        assert!(try_match(&int_pat(3), &Value::Int(4)).is_none());
        assert!(try_match(&int_pat(3), &Value::Float(3.0)).is_none());
    }

    #[test]
    fn var_pattern_binds() {
        let binds = try_match(&CorePattern::Var("x".into()), &Value::Int(9)).unwrap();
        assert_eq!(binds.len(), 1);
        assert_eq!(binds[0].0, "x");
    }

    #[test]
    fn cons_pattern_splits_head_and_tail() {
        let pattern = CorePattern::Ctor {
            name: "Cons".into(),
            args: vec![CorePattern::Var("h".into()), CorePattern::Var("t".into())],
        };
        let value = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let binds = try_match(&pattern, &value).unwrap();
        assert!(matches!(binds[0].1, Value::Int(1)));
        match &binds[1].1 {
            Value::List(items) => assert_eq!(items.len(), 2),
            other => panic!("tail should be a list, got {:?}", other),
        }
        assert!(try_match(&pattern, &Value::list(vec![])).is_none());
    }

    #[test]
    fn nil_pattern_matches_only_empty() {
        let nil = CorePattern::Ctor {
            name: "Nil".into(),
            args: vec![],
        };
        assert!(try_match(&nil, &Value::list(vec![])).is_some());
        assert!(try_match(&nil, &Value::list(vec![Value::Int(1)])).is_none());
    }

    #[test]
    fn record_pattern_rest_binds_the_remaining_fields() {
        let pattern = CorePattern::Record {
            fields: vec![("x".into(), CorePattern::Var("x".into()))],
            rest: Some("others".into()),
        };
        let value = Value::record(vec![
            ("x".into(), Value::Int(1)),
            ("y".into(), Value::Int(2)),
            ("z".into(), Value::Int(3)),
        ]);
        let binds = try_match(&pattern, &value).unwrap();
        assert_eq!(binds.len(), 2);
        match &binds[1].1 {
            Value::Record(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].0, "y");
            }
            other => panic!("rest should be a record, got {:?}", other),
        }
    }

    #[test]
    fn ctor_pattern_requires_name_and_arity() {
        let pattern = CorePattern::Ctor {
            name: "Some".into(),
            args: vec![CorePattern::Wildcard],
        };
        assert!(try_match(&pattern, &Value::ctor("Some", vec![Value::Int(1)])).is_some());
        assert!(try_match(&pattern, &Value::ctor("None", vec![])).is_none());
    }
}
