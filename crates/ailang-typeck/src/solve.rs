//! Class constraint solving: ground check, instance lookup, defaulting.
//!
//! Runs after structural unification has finished. Order matters:
//!
//! 1. Discharge every constraint whose type is fully ground against the
//!    instance table, recording the resolved dictionary per call site.
//! 2. Default each still-ambiguous variable that carries exactly one
//!    numeric constraint (`Num → Int`, `Fractional → Float`), then retry.
//! 3. Anything left is `TC_AMBIGUOUS` (free variable) or `TC_NO_INSTANCE`
//!    (rigid generic with no declared constraint syntax to carry it).
//!
//! The ground check treats *every* variable-like form — unification
//! variables and rigid generics alike — as non-ground. A historical bug in
//! the original system let a second variable representation slip through
//! the check and default prematurely; the tests below pin the fix.

use ailang_common::Span;
use ailang_syntax::NodeId;
use rustc_hash::FxHashMap;

use crate::error::TypeError;
use crate::ty::{Ty, TyVar};
use crate::unify::InferCtx;

/// The compiler-known classes operators dispatch through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Class {
    /// `+ - * /` and unary negation. Instances: Int, Float.
    Num,
    /// Division-heavy fractional arithmetic. Instance: Float. Kept in the
    /// defaulting table even though surface operators route through `Num`.
    Fractional,
    /// `%`. Instance: Int only, so modulo on Float fails to type-check.
    Integral,
    /// `==` and `!=`. Instances: Int, Float, Bool, String, Unit.
    Eq,
    /// `< <= > >=`. Instances: Int, Float, String.
    Ord,
}

impl Class {
    pub fn as_str(self) -> &'static str {
        match self {
            Class::Num => "Num",
            Class::Fractional => "Fractional",
            Class::Integral => "Integral",
            Class::Eq => "Eq",
            Class::Ord => "Ord",
        }
    }

    pub fn from_name(name: &str) -> Option<Class> {
        Some(match name {
            "Num" => Class::Num,
            "Fractional" => Class::Fractional,
            "Integral" => Class::Integral,
            "Eq" => Class::Eq,
            "Ord" => Class::Ord,
            _ => return None,
        })
    }
}

/// A class constraint generated at an operator call site.
#[derive(Clone, Debug)]
pub struct ClassConstraint {
    pub class: Class,
    pub ty: Ty,
    /// The expression node whose elaboration needs the dictionary.
    pub node: NodeId,
    pub span: Span,
}

/// The resolved dictionary for a call site: which instance discharged the
/// constraint. The elaborator combines this with the operator's method name
/// to form a `DictApp`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedDict {
    pub class: Class,
    /// The instance's type name, e.g. `"Int"`.
    pub type_name: String,
}

/// The instance table. Default instances come from the prelude; running
/// with `AILANG_NO_PRELUDE=1` starts empty (tests only).
#[derive(Clone, Debug)]
pub struct InstanceTable {
    instances: FxHashMap<Class, Vec<&'static str>>,
}

impl InstanceTable {
    /// The prelude's default instances.
    pub fn prelude() -> Self {
        let mut instances = FxHashMap::default();
        instances.insert(Class::Num, vec!["Int", "Float"]);
        instances.insert(Class::Fractional, vec!["Float"]);
        instances.insert(Class::Integral, vec!["Int"]);
        instances.insert(Class::Eq, vec!["Int", "Float", "Bool", "String", "Unit"]);
        instances.insert(Class::Ord, vec!["Int", "Float", "String"]);
        InstanceTable { instances }
    }

    /// No instances at all. `AILANG_NO_PRELUDE=1` — tests only.
    pub fn empty() -> Self {
        InstanceTable {
            instances: FxHashMap::default(),
        }
    }

    pub fn has_instance(&self, class: Class, type_name: &str) -> bool {
        self.instances
            .get(&class)
            .is_some_and(|types| types.contains(&type_name))
    }
}

/// Whether a type is fully ground: no variable-like form anywhere.
///
/// Both `Ty::Var` and `Ty::Rigid` count as variables here. Recognizing
/// every variable representation uniformly is load-bearing: a form missed
/// here makes the defaulter treat a fresh variable as concrete and pick an
/// instance prematurely.
pub fn is_ground(ty: &Ty) -> bool {
    match ty {
        Ty::Var(_) | Ty::Rigid(..) => false,
        Ty::Con(_) | Ty::RowEmpty(_) => true,
        Ty::App(con, args) => is_ground(con) && args.iter().all(is_ground),
        Ty::Fun {
            params,
            effects,
            ret,
        } => params.iter().all(is_ground) && is_ground(effects) && is_ground(ret),
        Ty::Record(row) => is_ground(row),
        Ty::RowExtend { field, tail, .. } => is_ground(field) && is_ground(tail),
    }
}

/// Solve all deferred class constraints. Returns the dictionary resolved
/// for each constraint's node, plus any errors.
pub fn solve(
    ctx: &mut InferCtx,
    constraints: &[ClassConstraint],
    instances: &InstanceTable,
) -> (FxHashMap<NodeId, ResolvedDict>, Vec<TypeError>) {
    let mut dicts = FxHashMap::default();
    let mut errors = Vec::new();
    let mut held: Vec<&ClassConstraint> = Vec::new();

    // Phase 1: discharge ground constraints.
    for constraint in constraints {
        let resolved = ctx.resolve(constraint.ty.clone());
        if is_ground(&resolved) {
            discharge(constraint, &resolved, instances, &mut dicts, &mut errors);
        } else {
            held.push(constraint);
        }
    }

    // Phase 2: defaulting. Only a bare variable with exactly one numeric
    // constraint defaults; a variable already unified with a concrete type
    // was dispatched in phase 1 and never reaches this point.
    let mut by_var: FxHashMap<TyVar, Vec<&ClassConstraint>> = FxHashMap::default();
    for constraint in &held {
        if let Ty::Var(v) = ctx.resolve(constraint.ty.clone()) {
            by_var.entry(v).or_default().push(constraint);
        }
    }
    for (var, var_constraints) in &by_var {
        if var_constraints.len() != 1 {
            continue;
        }
        let default_ty = match var_constraints[0].class {
            Class::Num => Some(Ty::int()),
            Class::Fractional => Some(Ty::float()),
            _ => None,
        };
        if let Some(ty) = default_ty {
            // Cannot conflict: the variable is unbound.
            let _ = ctx.unify(
                Ty::Var(*var),
                ty,
                crate::error::ConstraintOrigin::Builtin,
            );
        }
    }

    // Phase 3: retry held constraints; leftovers are ambiguous or hit a
    // rigid generic that cannot carry a constraint.
    for constraint in held {
        let resolved = ctx.resolve(constraint.ty.clone());
        if is_ground(&resolved) {
            discharge(constraint, &resolved, instances, &mut dicts, &mut errors);
        } else if contains_rigid(&resolved) {
            errors.push(TypeError::NoInstance {
                class: constraint.class.as_str().to_string(),
                ty: resolved,
                span: constraint.span,
            });
        } else {
            errors.push(TypeError::Ambiguous {
                class: constraint.class.as_str().to_string(),
                ty: resolved,
                span: constraint.span,
            });
        }
    }

    (dicts, errors)
}

fn discharge(
    constraint: &ClassConstraint,
    resolved: &Ty,
    instances: &InstanceTable,
    dicts: &mut FxHashMap<NodeId, ResolvedDict>,
    errors: &mut Vec<TypeError>,
) {
    let type_name = match resolved {
        Ty::Con(con) => Some(con.name.clone()),
        _ => None,
    };
    match type_name {
        Some(name) if instances.has_instance(constraint.class, &name) => {
            dicts.insert(
                constraint.node,
                ResolvedDict {
                    class: constraint.class,
                    type_name: name,
                },
            );
        }
        _ => {
            errors.push(TypeError::NoInstance {
                class: constraint.class.as_str().to_string(),
                ty: resolved.clone(),
                span: constraint.span,
            });
        }
    }
}

fn contains_rigid(ty: &Ty) -> bool {
    match ty {
        Ty::Rigid(..) => true,
        Ty::Var(_) | Ty::Con(_) | Ty::RowEmpty(_) => false,
        Ty::App(con, args) => contains_rigid(con) || args.iter().any(contains_rigid),
        Ty::Fun {
            params,
            effects,
            ret,
        } => params.iter().any(contains_rigid) || contains_rigid(effects) || contains_rigid(ret),
        Ty::Record(row) => contains_rigid(row),
        Ty::RowExtend { field, tail, .. } => contains_rigid(field) || contains_rigid(tail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Kind;

    fn constraint(class: Class, ty: Ty, node: u32) -> ClassConstraint {
        ClassConstraint {
            class,
            ty,
            node: NodeId(node),
            span: Span::new(0, 1),
        }
    }

    #[test]
    fn ground_constraint_discharges_against_instance() {
        let mut ctx = InferCtx::new();
        let cs = vec![constraint(Class::Num, Ty::int(), 0)];
        let (dicts, errors) = solve(&mut ctx, &cs, &InstanceTable::prelude());
        assert!(errors.is_empty());
        assert_eq!(
            dicts.get(&NodeId(0)),
            Some(&ResolvedDict {
                class: Class::Num,
                type_name: "Int".into()
            })
        );
    }

    #[test]
    fn missing_instance_is_reported() {
        let mut ctx = InferCtx::new();
        // Modulo on Float: Integral has no Float instance.
        let cs = vec![constraint(Class::Integral, Ty::float(), 0)];
        let (dicts, errors) = solve(&mut ctx, &cs, &InstanceTable::prelude());
        assert!(dicts.is_empty());
        assert!(matches!(errors[0], TypeError::NoInstance { .. }));
    }

    #[test]
    fn single_num_constraint_defaults_to_int() {
        let mut ctx = InferCtx::new();
        let a = ctx.fresh_var();
        let cs = vec![constraint(Class::Num, a.clone(), 0)];
        let (dicts, errors) = solve(&mut ctx, &cs, &InstanceTable::prelude());
        assert!(errors.is_empty());
        assert_eq!(dicts.get(&NodeId(0)).unwrap().type_name, "Int");
        assert_eq!(ctx.resolve(a), Ty::int());
    }

    #[test]
    fn single_fractional_constraint_defaults_to_float() {
        let mut ctx = InferCtx::new();
        let a = ctx.fresh_var();
        let cs = vec![constraint(Class::Fractional, a.clone(), 0)];
        let (dicts, errors) = solve(&mut ctx, &cs, &InstanceTable::prelude());
        assert!(errors.is_empty());
        assert_eq!(dicts.get(&NodeId(0)).unwrap().type_name, "Float");
    }

    #[test]
    fn defaulting_never_touches_already_concrete_vars() {
        let mut ctx = InferCtx::new();
        let a = ctx.fresh_var();
        ctx.unify(
            a.clone(),
            Ty::float(),
            crate::error::ConstraintOrigin::Builtin,
        )
        .unwrap();
        let cs = vec![constraint(Class::Num, a.clone(), 0)];
        let (dicts, errors) = solve(&mut ctx, &cs, &InstanceTable::prelude());
        // Already Float: dispatched in phase 1, not defaulted to Int.
        assert!(errors.is_empty());
        assert_eq!(dicts.get(&NodeId(0)).unwrap().type_name, "Float");
    }

    #[test]
    fn eq_constraint_on_free_var_is_ambiguous_not_defaulted() {
        let mut ctx = InferCtx::new();
        let a = ctx.fresh_var();
        let cs = vec![constraint(Class::Eq, a, 0)];
        let (dicts, errors) = solve(&mut ctx, &cs, &InstanceTable::prelude());
        assert!(dicts.is_empty());
        assert!(matches!(errors[0], TypeError::Ambiguous { .. }));
    }

    #[test]
    fn two_constraints_on_one_var_do_not_default() {
        let mut ctx = InferCtx::new();
        let a = ctx.fresh_var();
        let cs = vec![
            constraint(Class::Num, a.clone(), 0),
            constraint(Class::Eq, a, 1),
        ];
        let (_, errors) = solve(&mut ctx, &cs, &InstanceTable::prelude());
        assert_eq!(errors.len(), 2, "both constraints stay unresolved");
    }

    #[test]
    fn ground_check_rejects_every_variable_form() {
        // The regression the taxonomy's design notes call out: a second
        // variable representation (here `Rigid`) must be just as non-ground
        // as an ordinary unification variable.
        assert!(!is_ground(&Ty::Var(TyVar(0))));
        assert!(!is_ground(&Ty::Rigid("a".into(), Kind::Star)));
        assert!(!is_ground(&Ty::list(Ty::Var(TyVar(0)))));
        assert!(!is_ground(&Ty::list(Ty::Rigid("a".into(), Kind::Star))));
        assert!(is_ground(&Ty::list(Ty::int())));
    }

    #[test]
    fn rigid_constraint_is_no_instance_not_default() {
        let mut ctx = InferCtx::new();
        let cs = vec![constraint(Class::Num, Ty::Rigid("a".into(), Kind::Star), 0)];
        let (dicts, errors) = solve(&mut ctx, &cs, &InstanceTable::prelude());
        assert!(dicts.is_empty());
        assert!(matches!(errors[0], TypeError::NoInstance { .. }));
    }

    #[test]
    fn no_prelude_means_no_instances() {
        let mut ctx = InferCtx::new();
        let cs = vec![constraint(Class::Eq, Ty::int(), 0)];
        let (dicts, errors) = solve(&mut ctx, &cs, &InstanceTable::empty());
        assert!(dicts.is_empty());
        assert!(matches!(errors[0], TypeError::NoInstance { .. }));
    }
}
