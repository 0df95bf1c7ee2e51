//! Unification engine for AILANG's Hindley-Milner inference.
//!
//! Implements structural unification over `ena`'s union-find table, extended
//! with the standard row-rewriting algorithm so record rows and effect rows
//! unify label-by-label regardless of order. Supports occurs check,
//! kind-checked row variables, level-based generalization, and scheme
//! instantiation.

use std::collections::HashSet;

use ena::unify::InPlaceUnificationTable;
use rustc_hash::FxHashMap;

use crate::error::{ConstraintOrigin, TypeError};
use crate::ty::{Kind, RowKind, Scheme, SchemeConstraint, Ty, TyVar};

/// The inference context: unification table, per-variable kinds and levels,
/// and the accumulated error list.
pub struct InferCtx {
    table: InPlaceUnificationTable<TyVar>,
    /// Kind of each variable, indexed by `TyVar.0`.
    var_kinds: Vec<Kind>,
    /// Level at which each variable was created, indexed by `TyVar.0`.
    var_levels: Vec<u32>,
    /// Current let-nesting level for generalization.
    current_level: u32,
    /// Type errors accumulated during inference.
    pub errors: Vec<TypeError>,
}

impl InferCtx {
    pub fn new() -> Self {
        InferCtx {
            table: InPlaceUnificationTable::new(),
            var_kinds: Vec::new(),
            var_levels: Vec::new(),
            current_level: 0,
            errors: Vec::new(),
        }
    }

    // ── Variable creation ───────────────────────────────────────────────

    fn fresh(&mut self, kind: Kind) -> Ty {
        let var = self.table.new_key(None);
        while self.var_kinds.len() <= var.0 as usize {
            self.var_kinds.push(Kind::Star);
            self.var_levels.push(0);
        }
        self.var_kinds[var.0 as usize] = kind;
        self.var_levels[var.0 as usize] = self.current_level;
        Ty::Var(var)
    }

    /// A fresh star-kinded type variable at the current level.
    pub fn fresh_var(&mut self) -> Ty {
        self.fresh(Kind::Star)
    }

    /// A fresh row variable of the given flavor.
    pub fn fresh_row(&mut self, kind: RowKind) -> Ty {
        self.fresh(Kind::Row(kind))
    }

    /// The kind of a type. Variables consult the side table; rigid markers
    /// carry their kind; row forms are rows; everything else is `Star`.
    pub fn kind_of(&mut self, ty: &Ty) -> Kind {
        match ty {
            Ty::Var(v) => self.var_kinds[v.0 as usize],
            Ty::Rigid(_, kind) => *kind,
            Ty::RowEmpty(k) => Kind::Row(*k),
            Ty::RowExtend { kind, .. } => Kind::Row(*kind),
            _ => Kind::Star,
        }
    }

    // ── Resolution ──────────────────────────────────────────────────────

    /// Resolve a type by following union-find indirection, recursively.
    ///
    /// Unbound variables normalize to their root key so two unified-but-
    /// unbound variables resolve to the same representative; generalization
    /// depends on that.
    pub fn resolve(&mut self, ty: Ty) -> Ty {
        match ty {
            Ty::Var(v) => match self.table.probe_value(v) {
                Some(inner) => self.resolve(inner),
                None => Ty::Var(self.table.find(v)),
            },
            Ty::Rigid(..) | Ty::Con(_) | Ty::RowEmpty(_) => ty,
            Ty::App(con, args) => {
                let con = Box::new(self.resolve(*con));
                let args = args.into_iter().map(|a| self.resolve(a)).collect();
                Ty::App(con, args)
            }
            Ty::Fun {
                params,
                effects,
                ret,
            } => Ty::Fun {
                params: params.into_iter().map(|p| self.resolve(p)).collect(),
                effects: Box::new(self.resolve(*effects)),
                ret: Box::new(self.resolve(*ret)),
            },
            Ty::Record(row) => Ty::Record(Box::new(self.resolve(*row))),
            Ty::RowExtend {
                label,
                field,
                tail,
                kind,
            } => Ty::RowExtend {
                label,
                field: Box::new(self.resolve(*field)),
                tail: Box::new(self.resolve(*tail)),
                kind,
            },
        }
    }

    // ── Occurs check ────────────────────────────────────────────────────

    /// Whether `var` occurs anywhere within `ty` (following bindings).
    /// Prevents infinite types like `a ~ (a) -> Int` and infinite rows.
    pub fn occurs_in(&mut self, var: TyVar, ty: &Ty) -> bool {
        match ty {
            Ty::Var(v) => {
                if self.table.unioned(*v, var) {
                    return true;
                }
                match self.table.probe_value(*v) {
                    Some(inner) => self.occurs_in(var, &inner),
                    None => false,
                }
            }
            Ty::Rigid(..) | Ty::Con(_) | Ty::RowEmpty(_) => false,
            Ty::App(con, args) => {
                self.occurs_in(var, con) || args.iter().any(|a| self.occurs_in(var, a))
            }
            Ty::Fun {
                params,
                effects,
                ret,
            } => {
                params.iter().any(|p| self.occurs_in(var, p))
                    || self.occurs_in(var, effects)
                    || self.occurs_in(var, ret)
            }
            Ty::Record(row) => self.occurs_in(var, row),
            Ty::RowExtend { field, tail, .. } => {
                self.occurs_in(var, field) || self.occurs_in(var, tail)
            }
        }
    }

    // ── Unification ─────────────────────────────────────────────────────

    /// Unify two types, making them equal. Errors are recorded and also
    /// returned so callers can stop early when they want to.
    pub fn unify(&mut self, a: Ty, b: Ty, origin: ConstraintOrigin) -> Result<(), TypeError> {
        let a = self.resolve(a);
        let b = self.resolve(b);

        match (a, b) {
            (Ty::Var(v1), Ty::Var(v2)) if v1 == v2 => Ok(()),

            (Ty::Var(v1), Ty::Var(v2)) => {
                let k1 = self.var_kinds[v1.0 as usize];
                let k2 = self.var_kinds[v2.0 as usize];
                if let (Kind::Row(r1), Kind::Row(r2)) = (k1, k2) {
                    if r1 != r2 {
                        return self.fail(TypeError::RowKindMismatch {
                            left: r1,
                            right: r2,
                            origin,
                        });
                    }
                }
                if k1 != k2 {
                    return self.fail(TypeError::Mismatch {
                        expected: Ty::Var(v1),
                        found: Ty::Var(v2),
                        origin,
                    });
                }
                self.table
                    .unify_var_var(v1, v2)
                    .expect("unifying two unbound vars cannot conflict");
                Ok(())
            }

            (Ty::Var(v), ty) | (ty, Ty::Var(v)) => self.bind_var(v, ty, origin),

            (Ty::Rigid(a_name, a_kind), Ty::Rigid(b_name, b_kind)) => {
                if a_name == b_name && a_kind == b_kind {
                    Ok(())
                } else {
                    self.fail(TypeError::Mismatch {
                        expected: Ty::Rigid(a_name, a_kind),
                        found: Ty::Rigid(b_name, b_kind),
                        origin,
                    })
                }
            }

            (Ty::Con(c1), Ty::Con(c2)) => {
                if c1 == c2 {
                    Ok(())
                } else {
                    self.fail(TypeError::Mismatch {
                        expected: Ty::Con(c1),
                        found: Ty::Con(c2),
                        origin,
                    })
                }
            }

            (Ty::App(c1, a1), Ty::App(c2, a2)) => {
                self.unify(*c1, *c2, origin)?;
                if a1.len() != a2.len() {
                    return self.fail(TypeError::ArityMismatch {
                        expected: a1.len(),
                        found: a2.len(),
                        origin,
                    });
                }
                for (x, y) in a1.into_iter().zip(a2) {
                    self.unify(x, y, origin)?;
                }
                Ok(())
            }

            (
                Ty::Fun {
                    params: p1,
                    effects: e1,
                    ret: r1,
                },
                Ty::Fun {
                    params: p2,
                    effects: e2,
                    ret: r2,
                },
            ) => {
                if p1.len() != p2.len() {
                    return self.fail(TypeError::ArityMismatch {
                        expected: p1.len(),
                        found: p2.len(),
                        origin,
                    });
                }
                for (x, y) in p1.into_iter().zip(p2) {
                    self.unify(x, y, origin)?;
                }
                self.unify(*e1, *e2, origin)?;
                self.unify(*r1, *r2, origin)
            }

            (Ty::Record(row1), Ty::Record(row2)) => self.unify(*row1, *row2, origin),

            (Ty::RowEmpty(k1), Ty::RowEmpty(k2)) => {
                if k1 == k2 {
                    Ok(())
                } else {
                    self.fail(TypeError::RowKindMismatch {
                        left: k1,
                        right: k2,
                        origin,
                    })
                }
            }

            (
                Ty::RowExtend {
                    label,
                    field,
                    tail,
                    kind,
                },
                other,
            )
            | (
                other,
                Ty::RowExtend {
                    label,
                    field,
                    tail,
                    kind,
                },
            ) => {
                if let Kind::Row(other_kind) = self.kind_of(&other) {
                    if other_kind != kind {
                        return self.fail(TypeError::RowKindMismatch {
                            left: kind,
                            right: other_kind,
                            origin,
                        });
                    }
                } else {
                    let extend = Ty::RowExtend {
                        label,
                        field,
                        tail,
                        kind,
                    };
                    return self.fail(TypeError::Mismatch {
                        expected: extend,
                        found: other,
                        origin,
                    });
                }
                // Side condition of the row-rewriting algorithm: if both
                // rows end in the same variable, inserting the label would
                // require an infinite row. Capture the tail's end variable
                // before the rewrite can bind it.
                let own_tail_end = self.row_tail_var(&tail);
                let (other_field, other_rest, bound) =
                    self.rewrite_row(other, &label, kind, origin)?;
                if bound.is_some() && bound == own_tail_end {
                    let var = bound.expect("checked is_some");
                    return self.fail(TypeError::InfiniteType {
                        var,
                        ty: Ty::RowExtend {
                            label,
                            field,
                            tail,
                            kind,
                        },
                        origin,
                    });
                }
                self.unify(*field, other_field, origin)?;
                self.unify(*tail, other_rest, origin)
            }

            (a, b) => self.fail(TypeError::Mismatch {
                expected: a,
                found: b,
                origin,
            }),
        }
    }

    fn bind_var(&mut self, v: TyVar, ty: Ty, origin: ConstraintOrigin) -> Result<(), TypeError> {
        let var_kind = self.var_kinds[v.0 as usize];
        let ty_kind = self.kind_of(&ty);
        if var_kind != ty_kind {
            let err = match (var_kind, ty_kind) {
                (Kind::Row(a), Kind::Row(b)) => TypeError::RowKindMismatch {
                    left: a,
                    right: b,
                    origin,
                },
                _ => TypeError::Mismatch {
                    expected: Ty::Var(v),
                    found: ty,
                    origin,
                },
            };
            return self.fail(err);
        }
        if self.occurs_in(v, &ty) {
            return self.fail(TypeError::InfiniteType { var: v, ty, origin });
        }
        self.table
            .unify_var_value(v, Some(ty))
            .expect("binding after occurs check cannot conflict");
        Ok(())
    }

    /// The variable ending a row, if the row's tail is open.
    fn row_tail_var(&mut self, row: &Ty) -> Option<TyVar> {
        let mut cur = self.resolve(row.clone());
        loop {
            match cur {
                Ty::RowExtend { tail, .. } => cur = self.resolve(*tail),
                Ty::Var(v) => return Some(self.find_root(v)),
                _ => return None,
            }
        }
    }

    fn find_root(&mut self, v: TyVar) -> TyVar {
        self.table.find(v)
    }

    /// Rewrite a row so that `label` is at the head.
    ///
    /// Returns the field type at `label`, the remainder of the row, and the
    /// variable this rewrite had to bind (when the row ended in a variable
    /// and the label was inserted). When the row ends in the empty row the
    /// label is genuinely missing.
    fn rewrite_row(
        &mut self,
        row: Ty,
        label: &str,
        kind: RowKind,
        origin: ConstraintOrigin,
    ) -> Result<(Ty, Ty, Option<TyVar>), TypeError> {
        let row = self.resolve(row);
        match row {
            Ty::RowExtend {
                label: l2,
                field: f2,
                tail: t2,
                kind: k2,
            } => {
                if l2 == label {
                    Ok((*f2, *t2, None))
                } else {
                    let (found_field, rest, bound) =
                        self.rewrite_row(*t2, label, kind, origin)?;
                    let rebuilt = Ty::RowExtend {
                        label: l2,
                        field: f2,
                        tail: Box::new(rest),
                        kind: k2,
                    };
                    Ok((found_field, rebuilt, bound))
                }
            }
            Ty::Var(v) => {
                let root = self.find_root(v);
                let field = match kind {
                    RowKind::Record => self.fresh_var(),
                    RowKind::Effect => Ty::unit(),
                };
                let tail = self.fresh_row(kind);
                let extended = Ty::RowExtend {
                    label: label.to_string(),
                    field: Box::new(field.clone()),
                    tail: Box::new(tail.clone()),
                    kind,
                };
                self.bind_var(v, extended, origin)?;
                Ok((field, tail, Some(root)))
            }
            other => {
                let err = TypeError::RowMissingLabel {
                    label: label.to_string(),
                    row: other,
                    kind,
                    origin,
                };
                self.errors.push(err.clone());
                Err(err)
            }
        }
    }

    fn fail(&mut self, err: TypeError) -> Result<(), TypeError> {
        self.errors.push(err.clone());
        Err(err)
    }

    // ── Level management ────────────────────────────────────────────────

    pub fn enter_level(&mut self) {
        self.current_level += 1;
    }

    pub fn leave_level(&mut self) {
        debug_assert!(self.current_level > 0, "cannot leave level 0");
        self.current_level -= 1;
    }

    // ── Generalization ──────────────────────────────────────────────────

    /// Generalize a type into a scheme, quantifying variables created at a
    /// deeper level than the current one, except those in `excluded`.
    ///
    /// `excluded` carries variables with pending class constraints: they
    /// stay monomorphic so each operator call site resolves to exactly one
    /// dictionary (see the solver).
    pub fn generalize(&mut self, ty: Ty, excluded: &HashSet<TyVar>) -> Scheme {
        let resolved = self.resolve(ty);
        let mut free = Vec::new();
        self.collect_generalizable(&resolved, &mut free);
        let mut seen = HashSet::new();
        free.retain(|(v, _)| !excluded.contains(v) && seen.insert(*v));
        Scheme {
            vars: free,
            constraints: Vec::new(),
            ty: resolved,
        }
    }

    fn collect_generalizable(&mut self, ty: &Ty, out: &mut Vec<(TyVar, Kind)>) {
        match ty {
            Ty::Var(v) => match self.table.probe_value(*v) {
                Some(inner) => self.collect_generalizable(&inner, out),
                None => {
                    let root = self.table.find(*v);
                    let level = self.var_levels.get(root.0 as usize).copied().unwrap_or(0);
                    if level > self.current_level {
                        out.push((root, self.var_kinds[root.0 as usize]));
                    }
                }
            },
            Ty::Rigid(..) | Ty::Con(_) | Ty::RowEmpty(_) => {}
            Ty::App(con, args) => {
                self.collect_generalizable(con, out);
                for a in args {
                    self.collect_generalizable(a, out);
                }
            }
            Ty::Fun {
                params,
                effects,
                ret,
            } => {
                for p in params {
                    self.collect_generalizable(p, out);
                }
                self.collect_generalizable(effects, out);
                self.collect_generalizable(ret, out);
            }
            Ty::Record(row) => self.collect_generalizable(row, out),
            Ty::RowExtend { field, tail, .. } => {
                self.collect_generalizable(field, out);
                self.collect_generalizable(tail, out);
            }
        }
    }

    // ── Instantiation ───────────────────────────────────────────────────

    /// Instantiate a scheme with fresh variables, returning the type and
    /// the scheme's constraints with the same substitution applied. The
    /// caller re-emits those constraints at the reference site.
    pub fn instantiate(&mut self, scheme: &Scheme) -> (Ty, Vec<SchemeConstraint>) {
        if scheme.vars.is_empty() && scheme.constraints.is_empty() {
            return (scheme.ty.clone(), Vec::new());
        }
        let subst: FxHashMap<TyVar, Ty> = scheme
            .vars
            .iter()
            .map(|(v, kind)| (*v, self.fresh(*kind)))
            .collect();
        let ty = apply_subst(&scheme.ty, &subst);
        let constraints = scheme
            .constraints
            .iter()
            .map(|c| SchemeConstraint {
                class: c.class.clone(),
                ty: apply_subst(&c.ty, &subst),
            })
            .collect();
        (ty, constraints)
    }
}

impl Default for InferCtx {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply a substitution to a scheme's stored (context-free) type. Unlike
/// `resolve`, this never consults the unification table: scheme types only
/// reference their own quantified variables.
fn apply_subst(ty: &Ty, subst: &FxHashMap<TyVar, Ty>) -> Ty {
    match ty {
        Ty::Var(v) => subst.get(v).cloned().unwrap_or_else(|| ty.clone()),
        Ty::Rigid(..) | Ty::Con(_) | Ty::RowEmpty(_) => ty.clone(),
        Ty::App(con, args) => Ty::App(
            Box::new(apply_subst(con, subst)),
            args.iter().map(|a| apply_subst(a, subst)).collect(),
        ),
        Ty::Fun {
            params,
            effects,
            ret,
        } => Ty::Fun {
            params: params.iter().map(|p| apply_subst(p, subst)).collect(),
            effects: Box::new(apply_subst(effects, subst)),
            ret: Box::new(apply_subst(ret, subst)),
        },
        Ty::Record(row) => Ty::Record(Box::new(apply_subst(row, subst))),
        Ty::RowExtend {
            label,
            field,
            tail,
            kind,
        } => Ty::RowExtend {
            label: label.clone(),
            field: Box::new(apply_subst(field, subst)),
            tail: Box::new(apply_subst(tail, subst)),
            kind: *kind,
        },
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
