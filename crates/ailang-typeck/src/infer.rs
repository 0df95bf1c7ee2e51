//! Inference engine for AILANG.
//!
//! Walks the surface AST, generates constraints, and solves them via
//! unification. Implements Hindley-Milner inference with:
//! - Let-polymorphism (level-based generalize + instantiate)
//! - Monomorphic literal typing: integer literals are `Int` immediately,
//!   decimal literals are `Float` immediately
//! - Row-polymorphic records and effect rows (one unifier for both)
//! - Class constraints for overloaded operators, deferred to the solver
//! - Rigid generics for declared signatures (`func id[a](x: a) -> a`)
//!
//! Effect discipline: every function body carries an ambient effect row —
//! the closed declared row for named functions, an open row variable for
//! lambdas. Each call site's latent effect row is absorbed into the ambient
//! row label by label through ordinary row unification, so an undeclared
//! effect surfaces as a row error pointing at the call.

use std::collections::HashSet;

use ailang_common::{Diagnostic, Span};
use ailang_syntax::ast::*;
use rustc_hash::FxHashMap;

use crate::env::TypeEnv;
use crate::error::{ConstraintOrigin, TypeError};
use crate::solve::{self, Class, ClassConstraint, InstanceTable, ResolvedDict};
use crate::ty::{Kind, RowKind, Scheme, SchemeConstraint, Ty, TyCon, TyVar};
use crate::unify::InferCtx;

/// The effect labels the runtime knows how to gate.
pub const KNOWN_EFFECTS: &[&str] = &["IO", "FS", "Clock", "Net"];

// ── ADT registry ────────────────────────────────────────────────────────

/// A registered algebraic data type.
#[derive(Clone, Debug)]
pub struct AdtInfo {
    pub name: String,
    pub params: Vec<String>,
    pub ctors: Vec<CtorInfo>,
}

/// One constructor of an ADT. Argument types reference the ADT's parameters
/// as `Ty::Rigid`.
#[derive(Clone, Debug)]
pub struct CtorInfo {
    pub name: String,
    pub args: Vec<Ty>,
}

/// Registry of ADT definitions, plus a constructor-name → owner index.
/// The evaluator and the pattern compiler consult this for variant counts.
#[derive(Clone, Debug, Default)]
pub struct AdtRegistry {
    adts: FxHashMap<String, AdtInfo>,
    ctor_owner: FxHashMap<String, String>,
}

impl AdtRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: AdtInfo) {
        for ctor in &info.ctors {
            self.ctor_owner
                .insert(ctor.name.clone(), info.name.clone());
        }
        self.adts.insert(info.name.clone(), info);
    }

    pub fn lookup_adt(&self, name: &str) -> Option<&AdtInfo> {
        self.adts.get(name)
    }

    /// Find a constructor and its owning ADT by constructor name.
    pub fn lookup_ctor(&self, name: &str) -> Option<(&AdtInfo, &CtorInfo)> {
        let owner = self.ctor_owner.get(name)?;
        let adt = self.adts.get(owner)?;
        let ctor = adt.ctors.iter().find(|c| c.name == name)?;
        Some((adt, ctor))
    }

    /// All constructor names of the ADT owning `ctor_name`. Used by the
    /// pattern compiler for exhaustiveness accounting.
    pub fn sibling_ctors(&self, ctor_name: &str) -> Option<Vec<String>> {
        let owner = self.ctor_owner.get(ctor_name)?;
        let adt = self.adts.get(owner)?;
        Some(adt.ctors.iter().map(|c| c.name.clone()).collect())
    }
}

// ── Results ─────────────────────────────────────────────────────────────

/// Where a name reference resolves. The elaborator turns `Module` origins
/// into `GlobalRef`s and leaves locals as plain variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameOrigin {
    Local,
    Module(String),
}

/// Everything later phases need from type checking one module.
pub struct TypeckResult {
    /// Schemes for exported top-level functions.
    pub interface: FxHashMap<String, Scheme>,
    /// Schemes for every top-level function.
    pub bindings: FxHashMap<String, Scheme>,
    /// Fully-resolved type per expression node (after defaulting).
    pub node_types: FxHashMap<NodeId, Ty>,
    /// Resolved dictionary per overloaded-operator node.
    pub node_dicts: FxHashMap<NodeId, ResolvedDict>,
    /// Resolution of each `Var` node.
    pub name_origins: FxHashMap<NodeId, NameOrigin>,
    pub adts: AdtRegistry,
    pub errors: Vec<Diagnostic>,
}

impl TypeckResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Type-check one module against the interfaces of its imports.
///
/// `imports` maps module paths to exported name → scheme; `prelude` is the
/// auto-imported pseudo-module (`show`, etc.); `instances` is the class
/// instance table (empty under `AILANG_NO_PRELUDE=1`).
pub fn check_module(
    module: &Module,
    imports: &FxHashMap<String, FxHashMap<String, Scheme>>,
    prelude: &FxHashMap<String, Scheme>,
    instances: &InstanceTable,
) -> TypeckResult {
    let mut inf = Inferencer {
        ctx: InferCtx::new(),
        env: TypeEnv::new(),
        adts: AdtRegistry::new(),
        constraints: Vec::new(),
        node_types: FxHashMap::default(),
        name_origins: FxHashMap::default(),
        import_origin: FxHashMap::default(),
        ambient: Vec::new(),
        generics: Vec::new(),
        errors: Vec::new(),
        fresh_generic: 0,
    };

    // Prelude names are visible without an import.
    for (name, scheme) in prelude {
        inf.env.insert(name.clone(), scheme.clone());
        inf.import_origin
            .insert(name.clone(), "std/prelude".to_string());
    }

    inf.register_adts(module);
    inf.bind_imports(module, imports);

    // Pre-bind every function's declared scheme so bodies can call forward
    // and recursively.
    let mut decl_types: Vec<(usize, Ty, Vec<(String, Kind)>)> = Vec::new();
    for (idx, decl) in module.decls.iter().enumerate() {
        if let Decl::Func(func) = decl {
            let (decl_ty, generics) = inf.declared_type(func);
            let scheme = Scheme::from_rigid(&generics, &decl_ty);
            inf.env.insert(func.name.clone(), scheme);
            decl_types.push((idx, decl_ty, generics));
        }
    }

    // Check each body against its declared (rigid) type.
    for (idx, decl_ty, generics) in &decl_types {
        let Decl::Func(func) = &module.decls[*idx] else {
            continue;
        };
        inf.check_func_body(func, decl_ty, generics);
    }

    // Solve deferred class constraints; defaulting runs last.
    let (dicts, solve_errors) = solve::solve(&mut inf.ctx, &inf.constraints, instances);

    // Zonk node types now that defaulting has bound what it will.
    let node_ids: Vec<NodeId> = inf.node_types.keys().copied().collect();
    for id in node_ids {
        let ty = inf.node_types[&id].clone();
        let resolved = inf.ctx.resolve(ty);
        inf.node_types.insert(id, resolved);
    }

    let mut bindings = FxHashMap::default();
    let mut interface = FxHashMap::default();
    for decl in &module.decls {
        if let Decl::Func(func) = decl {
            if let Some(scheme) = inf.env.lookup(&func.name) {
                bindings.insert(func.name.clone(), scheme.clone());
                if func.exported {
                    interface.insert(func.name.clone(), scheme.clone());
                }
            }
        }
    }

    let mut errors: Vec<Diagnostic> = Vec::new();
    for err in inf.ctx.errors.iter().chain(&inf.errors).chain(&solve_errors) {
        errors.push(err.to_diagnostic());
    }

    TypeckResult {
        interface,
        bindings,
        node_types: inf.node_types,
        node_dicts: dicts,
        name_origins: inf.name_origins,
        adts: inf.adts,
        errors,
    }
}

// ── The inferencer ──────────────────────────────────────────────────────

struct Inferencer {
    ctx: InferCtx,
    env: TypeEnv,
    adts: AdtRegistry,
    constraints: Vec<ClassConstraint>,
    node_types: FxHashMap<NodeId, Ty>,
    name_origins: FxHashMap<NodeId, NameOrigin>,
    /// Name → module path for imported (and prelude) bindings.
    import_origin: FxHashMap<String, String>,
    /// Stack of ambient effect rows, one per enclosing function body.
    ambient: Vec<Ty>,
    /// Scoped generic names (declared `[a, r]` lists and ADT parameters).
    generics: Vec<FxHashMap<String, Kind>>,
    errors: Vec<TypeError>,
    /// Counter for implicit row generics on un-tailed record parameters.
    fresh_generic: u32,
}

impl Inferencer {
    // ── Declarations ────────────────────────────────────────────────────

    fn register_adts(&mut self, module: &Module) {
        // Built-in ADTs first; a module defining its own `Option` simply
        // shadows the prelude one.
        for adt in prelude_adts() {
            self.adts.register(adt);
        }
        // Pass 1: names and parameters, so constructors can reference any
        // sibling type (including themselves).
        for decl in &module.decls {
            if let Decl::Type(td) = decl {
                self.adts.register(AdtInfo {
                    name: td.name.clone(),
                    params: td.params.clone(),
                    ctors: Vec::new(),
                });
            }
        }
        // Pass 2: constructor argument types with the ADT's parameters in
        // scope as rigid generics.
        for decl in &module.decls {
            if let Decl::Type(td) = decl {
                let scope: FxHashMap<String, Kind> = td
                    .params
                    .iter()
                    .map(|p| (p.clone(), Kind::Star))
                    .collect();
                self.generics.push(scope);
                let ctors: Vec<CtorInfo> = td
                    .ctors
                    .iter()
                    .map(|ctor| CtorInfo {
                        name: ctor.name.clone(),
                        args: ctor.args.iter().map(|a| self.ast_type(a)).collect(),
                    })
                    .collect();
                self.generics.pop();
                self.adts.register(AdtInfo {
                    name: td.name.clone(),
                    params: td.params.clone(),
                    ctors,
                });
            }
        }
    }

    fn bind_imports(
        &mut self,
        module: &Module,
        imports: &FxHashMap<String, FxHashMap<String, Scheme>>,
    ) {
        for import in &module.imports {
            let Some(exports) = imports.get(&import.module) else {
                self.errors.push(TypeError::ImportModuleNotFound {
                    module: import.module.clone(),
                    span: import.span,
                });
                continue;
            };
            for (name, span) in &import.names {
                match exports.get(name) {
                    Some(scheme) => {
                        self.env.insert(name.clone(), scheme.clone());
                        self.import_origin
                            .insert(name.clone(), import.module.clone());
                    }
                    None => {
                        let mut available: Vec<String> =
                            exports.keys().cloned().collect();
                        available.sort();
                        self.errors.push(TypeError::ImportNameNotFound {
                            module: import.module.clone(),
                            name: name.clone(),
                            span: *span,
                            available,
                        });
                    }
                }
            }
        }
    }

    /// Build a function's declared type with rigid generics. Returns the
    /// rigid type (for checking the body) and the generic list (for
    /// building the exported scheme), including any implicit row generics
    /// added to un-tailed record parameters.
    fn declared_type(&mut self, func: &FuncDecl) -> (Ty, Vec<(String, Kind)>) {
        let mut generics: Vec<(String, Kind)> = func
            .generics
            .iter()
            .map(|name| (name.clone(), generic_kind(name, func)))
            .collect();

        let scope: FxHashMap<String, Kind> = generics.iter().cloned().collect();
        self.generics.push(scope);

        let mut params = Vec::new();
        for param in &func.params {
            let ty = self.param_type(&param.ty, &mut generics);
            params.push(ty);
        }
        let ret = self.ast_type(&func.ret);
        let effects = self.declared_effect_row(func);
        self.generics.pop();

        (
            Ty::Fun {
                params,
                effects: Box::new(effects),
                ret: Box::new(ret),
            },
            generics,
        )
    }

    /// A parameter's annotation. A record type with no explicit tail gets
    /// an implicit row generic so the function accepts any extension of the
    /// written fields (row subsumption at call sites).
    fn param_type(&mut self, te: &TypeExpr, generics: &mut Vec<(String, Kind)>) -> Ty {
        if let TypeExpr::Record(fields, None, span) = te {
            let mut tail_name = format!("r{}", self.fresh_generic);
            self.fresh_generic += 1;
            // Never collide with a declared generic.
            while self.lookup_generic(&tail_name).is_some() {
                tail_name = format!("r{}", self.fresh_generic);
                self.fresh_generic += 1;
            }
            generics.push((tail_name.clone(), Kind::Row(RowKind::Record)));
            self.generics
                .last_mut()
                .expect("generics scope pushed by declared_type")
                .insert(tail_name.clone(), Kind::Row(RowKind::Record));
            let with_tail = TypeExpr::Record(fields.clone(), Some(tail_name), *span);
            return self.ast_type(&with_tail);
        }
        self.ast_type(te)
    }

    fn declared_effect_row(&mut self, func: &FuncDecl) -> Ty {
        let mut row = Ty::RowEmpty(RowKind::Effect);
        if let Some(labels) = &func.effects {
            for label in labels.iter().rev() {
                if !KNOWN_EFFECTS.contains(&label.as_str()) {
                    self.errors.push(TypeError::UnknownEffect {
                        name: label.clone(),
                        span: func.span,
                    });
                }
                row = Ty::RowExtend {
                    label: label.clone(),
                    field: Box::new(Ty::unit()),
                    tail: Box::new(row),
                    kind: RowKind::Effect,
                };
            }
        }
        row
    }

    fn check_func_body(&mut self, func: &FuncDecl, decl_ty: &Ty, generics: &[(String, Kind)]) {
        let Ty::Fun {
            params,
            effects,
            ret,
        } = decl_ty
        else {
            return;
        };
        let scope: FxHashMap<String, Kind> = generics.iter().cloned().collect();
        self.generics.push(scope);
        self.env.push_scope();
        for (param, ty) in func.params.iter().zip(params) {
            self.env.insert(param.name.clone(), Scheme::mono(ty.clone()));
        }
        self.ambient.push(effects.as_ref().clone());

        let body_ty = self.infer_expr(&func.body);
        let _ = self.ctx.unify(
            body_ty,
            ret.as_ref().clone(),
            ConstraintOrigin::Annotation { span: func.span },
        );

        self.ambient.pop();
        self.env.pop_scope();
        self.generics.pop();
    }

    // ── Types as written ────────────────────────────────────────────────

    fn lookup_generic(&self, name: &str) -> Option<Kind> {
        self.generics
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn ast_type(&mut self, te: &TypeExpr) -> Ty {
        match te {
            TypeExpr::Unit(_) => Ty::unit(),
            TypeExpr::Name(name, span) => {
                if name.chars().next().is_some_and(char::is_lowercase) {
                    match self.lookup_generic(name) {
                        Some(kind) => Ty::Rigid(name.clone(), kind),
                        None => {
                            self.errors.push(TypeError::UnknownTypeName {
                                name: name.clone(),
                                span: *span,
                            });
                            self.ctx.fresh_var()
                        }
                    }
                } else {
                    match name.as_str() {
                        "Int" | "Float" | "String" | "Bool" | "Unit" => {
                            Ty::Con(TyCon::new(name.clone()))
                        }
                        _ => match self.adts.lookup_adt(name) {
                            Some(adt) if adt.params.is_empty() => {
                                Ty::Con(TyCon::new(name.clone()))
                            }
                            Some(adt) => {
                                self.errors.push(TypeError::CtorArity {
                                    name: name.clone(),
                                    expected: adt.params.len(),
                                    found: 0,
                                    span: *span,
                                });
                                self.ctx.fresh_var()
                            }
                            None => {
                                self.errors.push(TypeError::UnknownTypeName {
                                    name: name.clone(),
                                    span: *span,
                                });
                                self.ctx.fresh_var()
                            }
                        },
                    }
                }
            }
            TypeExpr::App(name, args, span) => {
                let arg_tys: Vec<Ty> = args.iter().map(|a| self.ast_type(a)).collect();
                let expected_arity = if name == "List" {
                    Some(1)
                } else {
                    self.adts.lookup_adt(name).map(|adt| adt.params.len())
                };
                match expected_arity {
                    Some(expected) if expected == arg_tys.len() => {
                        Ty::App(Box::new(Ty::Con(TyCon::new(name.clone()))), arg_tys)
                    }
                    Some(expected) => {
                        self.errors.push(TypeError::CtorArity {
                            name: name.clone(),
                            expected,
                            found: arg_tys.len(),
                            span: *span,
                        });
                        self.ctx.fresh_var()
                    }
                    None => {
                        self.errors.push(TypeError::UnknownTypeName {
                            name: name.clone(),
                            span: *span,
                        });
                        self.ctx.fresh_var()
                    }
                }
            }
            TypeExpr::Func(params, ret, effects, _) => {
                let params = params.iter().map(|p| self.ast_type(p)).collect();
                let ret = self.ast_type(ret);
                let mut row = Ty::RowEmpty(RowKind::Effect);
                if let Some(labels) = effects {
                    for label in labels.iter().rev() {
                        row = Ty::RowExtend {
                            label: label.clone(),
                            field: Box::new(Ty::unit()),
                            tail: Box::new(row),
                            kind: RowKind::Effect,
                        };
                    }
                }
                Ty::Fun {
                    params,
                    effects: Box::new(row),
                    ret: Box::new(ret),
                }
            }
            TypeExpr::Record(fields, tail, _) => {
                self.check_duplicate_labels(fields.iter().map(|(l, _, s)| (l.as_str(), *s)));
                let mut row = match tail {
                    Some(name) => match self.lookup_generic(name) {
                        Some(Kind::Row(RowKind::Record)) => {
                            Ty::Rigid(name.clone(), Kind::Row(RowKind::Record))
                        }
                        Some(_) | None => {
                            // Undeclared, or declared as a non-row generic.
                            self.errors.push(TypeError::UnknownTypeName {
                                name: name.clone(),
                                span: te.span(),
                            });
                            self.ctx.fresh_row(RowKind::Record)
                        }
                    },
                    None => Ty::RowEmpty(RowKind::Record),
                };
                for (label, field_te, _) in fields.iter().rev() {
                    let field = self.ast_type(field_te);
                    row = Ty::RowExtend {
                        label: label.clone(),
                        field: Box::new(field),
                        tail: Box::new(row),
                        kind: RowKind::Record,
                    };
                }
                Ty::Record(Box::new(row))
            }
        }
    }

    fn check_duplicate_labels<'a>(&mut self, labels: impl Iterator<Item = (&'a str, Span)>) {
        let mut seen: Vec<(&str, Span)> = Vec::new();
        for (label, span) in labels {
            if let Some((_, first)) = seen.iter().find(|(l, _)| *l == label) {
                self.errors.push(TypeError::DuplicateField {
                    label: label.to_string(),
                    first: *first,
                    second: span,
                });
            } else {
                seen.push((label, span));
            }
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn record_ty(&mut self, id: NodeId, ty: Ty) -> Ty {
        self.node_types.insert(id, ty.clone());
        ty
    }

    fn infer_expr(&mut self, expr: &Expr) -> Ty {
        let ty = self.infer_expr_kind(expr);
        self.record_ty(expr.id, ty)
    }

    fn infer_expr_kind(&mut self, expr: &Expr) -> Ty {
        match &expr.kind {
            ExprKind::Lit(lit) => lit_type(lit),

            ExprKind::Var(name) => {
                let (depth, scheme) = match self.env.lookup_with_depth(name) {
                    Some((depth, scheme)) => (depth, scheme.clone()),
                    None => {
                        self.errors.push(TypeError::UnboundVariable {
                            name: name.clone(),
                            span: expr.span,
                        });
                        return self.ctx.fresh_var();
                    }
                };
                // Imported names live in the root scope; a local that
                // shadows one must still resolve locally.
                let origin = match self.import_origin.get(name) {
                    Some(module) if depth == 0 => NameOrigin::Module(module.clone()),
                    _ => NameOrigin::Local,
                };
                self.name_origins.insert(expr.id, origin);
                let (ty, constraints) = self.ctx.instantiate(&scheme);
                self.emit_scheme_constraints(expr.id, expr.span, constraints);
                ty
            }

            ExprKind::Ctor(name, args) => {
                let Some((adt, ctor)) = self.adts.lookup_ctor(name) else {
                    self.errors.push(TypeError::UnknownConstructor {
                        name: name.clone(),
                        span: expr.span,
                    });
                    for arg in args {
                        self.infer_expr(arg);
                    }
                    return self.ctx.fresh_var();
                };
                let adt_name = adt.name.clone();
                let adt_params = adt.params.clone();
                let ctor_args = ctor.args.clone();
                if ctor_args.len() != args.len() {
                    self.errors.push(TypeError::CtorArity {
                        name: name.clone(),
                        expected: ctor_args.len(),
                        found: args.len(),
                        span: expr.span,
                    });
                }
                // Instantiate the ADT's parameters fresh for this use.
                let subst: FxHashMap<String, Ty> = adt_params
                    .iter()
                    .map(|p| (p.clone(), self.ctx.fresh_var()))
                    .collect();
                for (arg, arg_decl_ty) in args.iter().zip(&ctor_args) {
                    let expected = subst_rigid(arg_decl_ty, &subst);
                    let found = self.infer_expr(arg);
                    let _ = self.ctx.unify(
                        expected,
                        found,
                        ConstraintOrigin::FnArg {
                            call_site: expr.span,
                            param_idx: 0,
                        },
                    );
                }
                adt_instance_ty(&adt_name, &adt_params, &subst)
            }

            ExprKind::Lambda(params, body) => {
                self.env.push_scope();
                let param_tys: Vec<Ty> = params
                    .iter()
                    .map(|p| {
                        let ty = self.ctx.fresh_var();
                        self.env.insert(p.clone(), Scheme::mono(ty.clone()));
                        ty
                    })
                    .collect();
                let eff = self.ctx.fresh_row(RowKind::Effect);
                self.ambient.push(eff.clone());
                let body_ty = self.infer_expr(body);
                self.ambient.pop();
                self.env.pop_scope();
                Ty::Fun {
                    params: param_tys,
                    effects: Box::new(eff),
                    ret: Box::new(body_ty),
                }
            }

            ExprKind::Call(callee, args) => {
                let callee_ty = self.infer_expr(callee);
                let arg_tys: Vec<Ty> = args.iter().map(|a| self.infer_expr(a)).collect();
                let ret = self.ctx.fresh_var();
                let eff = self.ctx.fresh_row(RowKind::Effect);
                let expected = Ty::Fun {
                    params: arg_tys,
                    effects: Box::new(eff.clone()),
                    ret: Box::new(ret.clone()),
                };
                let _ = self.ctx.unify(
                    callee_ty,
                    expected,
                    ConstraintOrigin::FnArg {
                        call_site: expr.span,
                        param_idx: 0,
                    },
                );
                self.absorb_effects(eff, expr.span);
                ret
            }

            ExprKind::Binary(op, lhs, rhs) => self.infer_binary(expr, *op, lhs, rhs),

            ExprKind::Unary(UnOp::Neg, operand) => {
                let ty = self.infer_expr(operand);
                self.constraints.push(ClassConstraint {
                    class: Class::Num,
                    ty: ty.clone(),
                    node: expr.id,
                    span: expr.span,
                });
                ty
            }

            ExprKind::Unary(UnOp::Not, operand) => {
                let ty = self.infer_expr(operand);
                let _ = self.ctx.unify(
                    ty,
                    Ty::bool(),
                    ConstraintOrigin::BinOp { op_span: expr.span },
                );
                Ty::bool()
            }

            ExprKind::Let {
                name,
                ann,
                value,
                body,
                recursive,
            } => {
                self.env.push_scope();
                let scheme = self.infer_binding(name, ann.as_ref(), value, *recursive, expr.span);
                self.env.insert(name.clone(), scheme);
                let body_ty = self.infer_expr(body);
                self.env.pop_scope();
                body_ty
            }

            ExprKind::If(cond, then_e, else_e) => {
                let cond_ty = self.infer_expr(cond);
                let _ = self.ctx.unify(
                    cond_ty,
                    Ty::bool(),
                    ConstraintOrigin::IfCond { span: cond.span },
                );
                let then_ty = self.infer_expr(then_e);
                let else_ty = self.infer_expr(else_e);
                let _ = self.ctx.unify(
                    then_ty.clone(),
                    else_ty,
                    ConstraintOrigin::IfBranches { if_span: expr.span },
                );
                then_ty
            }

            ExprKind::Match(scrutinee, arms) => {
                let scrut_ty = self.infer_expr(scrutinee);
                let result = self.ctx.fresh_var();
                for arm in arms {
                    self.env.push_scope();
                    self.check_pattern(&arm.pattern, &scrut_ty);
                    if let Some(guard) = &arm.guard {
                        let guard_ty = self.infer_expr(guard);
                        let _ = self.ctx.unify(
                            guard_ty,
                            Ty::bool(),
                            ConstraintOrigin::Guard { span: guard.span },
                        );
                    }
                    let body_ty = self.infer_expr(&arm.body);
                    let _ = self.ctx.unify(
                        body_ty,
                        result.clone(),
                        ConstraintOrigin::MatchArm { span: arm.span },
                    );
                    self.env.pop_scope();
                }
                result
            }

            ExprKind::Record(fields) => {
                self.check_duplicate_labels(fields.iter().map(|(l, _, s)| (l.as_str(), *s)));
                let mut row = Ty::RowEmpty(RowKind::Record);
                let field_tys: Vec<(String, Ty)> = fields
                    .iter()
                    .map(|(label, value, _)| (label.clone(), self.infer_expr(value)))
                    .collect();
                for (label, ty) in field_tys.into_iter().rev() {
                    row = Ty::RowExtend {
                        label,
                        field: Box::new(ty),
                        tail: Box::new(row),
                        kind: RowKind::Record,
                    };
                }
                Ty::Record(Box::new(row))
            }

            ExprKind::RecordAccess(base, label) => {
                let base_ty = self.infer_expr(base);
                let field = self.ctx.fresh_var();
                let tail = self.ctx.fresh_row(RowKind::Record);
                let wanted = Ty::Record(Box::new(Ty::RowExtend {
                    label: label.clone(),
                    field: Box::new(field.clone()),
                    tail: Box::new(tail),
                    kind: RowKind::Record,
                }));
                let _ = self.ctx.unify(
                    base_ty,
                    wanted,
                    ConstraintOrigin::FieldAccess { span: expr.span },
                );
                field
            }

            ExprKind::RecordUpdate(base, fields) => {
                self.check_duplicate_labels(fields.iter().map(|(l, _, s)| (l.as_str(), *s)));
                let base_ty = self.infer_expr(base);
                for (label, value, span) in fields {
                    let value_ty = self.infer_expr(value);
                    let tail = self.ctx.fresh_row(RowKind::Record);
                    let wanted = Ty::Record(Box::new(Ty::RowExtend {
                        label: label.clone(),
                        field: Box::new(value_ty),
                        tail: Box::new(tail),
                        kind: RowKind::Record,
                    }));
                    // Updates are type-preserving: the base must already
                    // have the field at the new value's type.
                    let _ = self.ctx.unify(
                        base_ty.clone(),
                        wanted,
                        ConstraintOrigin::RecordUpdate { span: *span },
                    );
                }
                base_ty
            }

            ExprKind::List(items) => {
                let elem = self.ctx.fresh_var();
                for item in items {
                    let item_ty = self.infer_expr(item);
                    let _ = self.ctx.unify(
                        item_ty,
                        elem.clone(),
                        ConstraintOrigin::FnArg {
                            call_site: item.span,
                            param_idx: 0,
                        },
                    );
                }
                Ty::list(elem)
            }

            ExprKind::Block(stmts) => {
                self.env.push_scope();
                let mut last_ty = Ty::unit();
                let mut last_was_let = stmts.is_empty();
                for stmt in stmts {
                    match stmt {
                        Stmt::Let {
                            name,
                            ann,
                            value,
                            span,
                        } => {
                            let scheme =
                                self.infer_binding(name, ann.as_ref(), value, false, *span);
                            self.env.insert(name.clone(), scheme);
                            last_was_let = true;
                        }
                        Stmt::Expr(e) => {
                            last_ty = self.infer_expr(e);
                            last_was_let = false;
                        }
                    }
                }
                self.env.pop_scope();
                // A block ending in a binding (or empty) yields unit; the
                // elaborator inserts the trailing `()` to match.
                if last_was_let {
                    Ty::unit()
                } else {
                    last_ty
                }
            }

            ExprKind::Annot(inner, te) => {
                let inner_ty = self.infer_expr(inner);
                let ann_ty = self.ast_type(te);
                let _ = self.ctx.unify(
                    inner_ty,
                    ann_ty.clone(),
                    ConstraintOrigin::Annotation { span: expr.span },
                );
                ann_ty
            }
        }
    }

    fn infer_binary(&mut self, expr: &Expr, op: BinOp, lhs: &Expr, rhs: &Expr) -> Ty {
        let lhs_ty = self.infer_expr(lhs);
        let rhs_ty = self.infer_expr(rhs);
        let origin = ConstraintOrigin::BinOp { op_span: expr.span };
        match op {
            BinOp::And | BinOp::Or => {
                let _ = self.ctx.unify(lhs_ty, Ty::bool(), origin);
                let _ = self.ctx.unify(rhs_ty, Ty::bool(), origin);
                Ty::bool()
            }
            BinOp::Concat => {
                let _ = self.ctx.unify(lhs_ty, Ty::string(), origin);
                let _ = self.ctx.unify(rhs_ty, Ty::string(), origin);
                Ty::string()
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                let _ = self.ctx.unify(lhs_ty.clone(), rhs_ty, origin);
                self.constraints.push(ClassConstraint {
                    class: Class::Num,
                    ty: lhs_ty.clone(),
                    node: expr.id,
                    span: expr.span,
                });
                lhs_ty
            }
            BinOp::Mod => {
                let _ = self.ctx.unify(lhs_ty.clone(), rhs_ty, origin);
                self.constraints.push(ClassConstraint {
                    class: Class::Integral,
                    ty: lhs_ty.clone(),
                    node: expr.id,
                    span: expr.span,
                });
                lhs_ty
            }
            BinOp::Eq | BinOp::Ne => {
                let _ = self.ctx.unify(lhs_ty.clone(), rhs_ty, origin);
                self.constraints.push(ClassConstraint {
                    class: Class::Eq,
                    ty: lhs_ty,
                    node: expr.id,
                    span: expr.span,
                });
                Ty::bool()
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let _ = self.ctx.unify(lhs_ty.clone(), rhs_ty, origin);
                self.constraints.push(ClassConstraint {
                    class: Class::Ord,
                    ty: lhs_ty,
                    node: expr.id,
                    span: expr.span,
                });
                Ty::bool()
            }
        }
    }

    /// Infer a `let` binding's value and generalize it. Variables with
    /// pending class constraints stay monomorphic so every operator site
    /// keeps a single dictionary.
    fn infer_binding(
        &mut self,
        name: &str,
        ann: Option<&TypeExpr>,
        value: &Expr,
        recursive: bool,
        span: Span,
    ) -> Scheme {
        self.ctx.enter_level();
        let value_ty = if recursive {
            let placeholder = self.ctx.fresh_var();
            self.env.push_scope();
            self.env
                .insert(name.to_string(), Scheme::mono(placeholder.clone()));
            let ty = self.infer_expr(value);
            let _ = self
                .ctx
                .unify(placeholder, ty.clone(), ConstraintOrigin::LetBinding { span });
            self.env.pop_scope();
            ty
        } else {
            self.infer_expr(value)
        };
        if let Some(ann) = ann {
            let ann_ty = self.ast_type(ann);
            let _ = self
                .ctx
                .unify(value_ty.clone(), ann_ty, ConstraintOrigin::Annotation { span });
        }
        self.ctx.leave_level();
        let excluded = self.constrained_vars();
        self.ctx.generalize(value_ty, &excluded)
    }

    /// The set of variables mentioned by any pending class constraint.
    fn constrained_vars(&mut self) -> HashSet<TyVar> {
        let mut out = HashSet::new();
        let tys: Vec<Ty> = self.constraints.iter().map(|c| c.ty.clone()).collect();
        for ty in tys {
            let resolved = self.ctx.resolve(ty);
            collect_vars(&resolved, &mut out);
        }
        out
    }

    fn emit_scheme_constraints(
        &mut self,
        node: NodeId,
        span: Span,
        constraints: Vec<SchemeConstraint>,
    ) {
        for constraint in constraints {
            match Class::from_name(&constraint.class) {
                Some(class) => self.constraints.push(ClassConstraint {
                    class,
                    ty: constraint.ty,
                    node,
                    span,
                }),
                None => self.errors.push(TypeError::NoInstance {
                    class: constraint.class,
                    ty: constraint.ty,
                    span,
                }),
            }
        }
    }

    /// Absorb a call's latent effect row into the enclosing ambient row.
    ///
    /// Every concrete label of the latent row must unify into the ambient
    /// row: a closed ambient (declared signature) rejects undeclared labels
    /// with a row error; an open ambient (lambda) accumulates them.
    fn absorb_effects(&mut self, latent: Ty, span: Span) {
        let Some(ambient) = self.ambient.last().cloned() else {
            return;
        };
        let latent = self.ctx.resolve(latent);
        for label in latent.row_labels() {
            let tail = self.ctx.fresh_row(RowKind::Effect);
            let wanted = Ty::RowExtend {
                label: label.to_string(),
                field: Box::new(Ty::unit()),
                tail: Box::new(tail),
                kind: RowKind::Effect,
            };
            let _ = self.ctx.unify(
                wanted,
                ambient.clone(),
                ConstraintOrigin::EffectCall { span },
            );
        }
    }

    // ── Patterns ────────────────────────────────────────────────────────

    fn check_pattern(&mut self, pattern: &Pattern, expected: &Ty) {
        let origin = ConstraintOrigin::Pattern {
            span: pattern.span,
        };
        match &pattern.kind {
            PatKind::Wildcard => {}
            PatKind::Var(name) => {
                self.env
                    .insert(name.clone(), Scheme::mono(expected.clone()));
            }
            PatKind::Lit(lit) => {
                let _ = self.ctx.unify(expected.clone(), lit_type(lit), origin);
            }
            PatKind::Ctor(name, args) => {
                let Some((adt, ctor)) = self.adts.lookup_ctor(name) else {
                    self.errors.push(TypeError::UnknownConstructor {
                        name: name.clone(),
                        span: pattern.span,
                    });
                    return;
                };
                let adt_name = adt.name.clone();
                let adt_params = adt.params.clone();
                let ctor_args = ctor.args.clone();
                if ctor_args.len() != args.len() {
                    self.errors.push(TypeError::CtorArity {
                        name: name.clone(),
                        expected: ctor_args.len(),
                        found: args.len(),
                        span: pattern.span,
                    });
                    return;
                }
                let subst: FxHashMap<String, Ty> = adt_params
                    .iter()
                    .map(|p| (p.clone(), self.ctx.fresh_var()))
                    .collect();
                let adt_ty = adt_instance_ty(&adt_name, &adt_params, &subst);
                let _ = self.ctx.unify(expected.clone(), adt_ty, origin);
                for (sub, arg_decl_ty) in args.iter().zip(&ctor_args) {
                    let sub_expected = subst_rigid(arg_decl_ty, &subst);
                    self.check_pattern(sub, &sub_expected);
                }
            }
            PatKind::List(items, rest) => {
                let elem = self.ctx.fresh_var();
                let _ = self
                    .ctx
                    .unify(expected.clone(), Ty::list(elem.clone()), origin);
                for item in items {
                    self.check_pattern(item, &elem);
                }
                if let Some(rest) = rest {
                    self.env
                        .insert(rest.clone(), Scheme::mono(Ty::list(elem)));
                }
            }
            PatKind::Record(fields, rest) => {
                let mut row = self.ctx.fresh_row(RowKind::Record);
                if let Some(rest) = rest {
                    self.env
                        .insert(rest.clone(), Scheme::mono(Ty::Record(Box::new(row.clone()))));
                }
                for (label, sub) in fields.iter().rev() {
                    let field_ty = self.ctx.fresh_var();
                    match sub {
                        Some(sub) => self.check_pattern(sub, &field_ty),
                        None => self
                            .env
                            .insert(label.clone(), Scheme::mono(field_ty.clone())),
                    }
                    row = Ty::RowExtend {
                        label: label.clone(),
                        field: Box::new(field_ty),
                        tail: Box::new(row),
                        kind: RowKind::Record,
                    };
                }
                let _ = self
                    .ctx
                    .unify(expected.clone(), Ty::Record(Box::new(row)), origin);
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn lit_type(lit: &Lit) -> Ty {
    match lit {
        Lit::Int(_) => Ty::int(),
        Lit::Float(_) => Ty::float(),
        Lit::Str(_) => Ty::string(),
        Lit::Bool(_) => Ty::bool(),
        Lit::Unit => Ty::unit(),
    }
}

/// Replace an ADT's rigid parameter references with the instantiation map.
fn subst_rigid(ty: &Ty, subst: &FxHashMap<String, Ty>) -> Ty {
    match ty {
        Ty::Rigid(name, _) => subst.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Ty::Var(_) | Ty::Con(_) | Ty::RowEmpty(_) => ty.clone(),
        Ty::App(con, args) => Ty::App(
            Box::new(subst_rigid(con, subst)),
            args.iter().map(|a| subst_rigid(a, subst)).collect(),
        ),
        Ty::Fun {
            params,
            effects,
            ret,
        } => Ty::Fun {
            params: params.iter().map(|p| subst_rigid(p, subst)).collect(),
            effects: Box::new(subst_rigid(effects, subst)),
            ret: Box::new(subst_rigid(ret, subst)),
        },
        Ty::Record(row) => Ty::Record(Box::new(subst_rigid(row, subst))),
        Ty::RowExtend {
            label,
            field,
            tail,
            kind,
        } => Ty::RowExtend {
            label: label.clone(),
            field: Box::new(subst_rigid(field, subst)),
            tail: Box::new(subst_rigid(tail, subst)),
            kind: *kind,
        },
    }
}

fn adt_instance_ty(name: &str, params: &[String], subst: &FxHashMap<String, Ty>) -> Ty {
    if params.is_empty() {
        Ty::Con(TyCon::new(name))
    } else {
        let args = params
            .iter()
            .map(|p| subst.get(p).cloned().expect("every param is in the subst"))
            .collect();
        Ty::App(Box::new(Ty::Con(TyCon::new(name))), args)
    }
}

fn collect_vars(ty: &Ty, out: &mut HashSet<TyVar>) {
    match ty {
        Ty::Var(v) => {
            out.insert(*v);
        }
        Ty::Rigid(..) | Ty::Con(_) | Ty::RowEmpty(_) => {}
        Ty::App(con, args) => {
            collect_vars(con, out);
            for a in args {
                collect_vars(a, out);
            }
        }
        Ty::Fun {
            params,
            effects,
            ret,
        } => {
            for p in params {
                collect_vars(p, out);
            }
            collect_vars(effects, out);
            collect_vars(ret, out);
        }
        Ty::Record(row) => collect_vars(row, out),
        Ty::RowExtend { field, tail, .. } => {
            collect_vars(field, out);
            collect_vars(tail, out);
        }
    }
}

/// The ADTs every module sees without declaring them: `Option`, `Result`,
/// and the `Json` value tree (`JField` stands in for a key/value pair).
pub fn prelude_adts() -> Vec<AdtInfo> {
    let a = || Ty::Rigid("a".into(), Kind::Star);
    let e = || Ty::Rigid("e".into(), Kind::Star);
    let json = || Ty::Con(TyCon::new("Json"));
    vec![
        AdtInfo {
            name: "Option".into(),
            params: vec!["a".into()],
            ctors: vec![
                CtorInfo {
                    name: "Some".into(),
                    args: vec![a()],
                },
                CtorInfo {
                    name: "None".into(),
                    args: vec![],
                },
            ],
        },
        AdtInfo {
            name: "Result".into(),
            params: vec!["a".into(), "e".into()],
            ctors: vec![
                CtorInfo {
                    name: "Ok".into(),
                    args: vec![a()],
                },
                CtorInfo {
                    name: "Err".into(),
                    args: vec![e()],
                },
            ],
        },
        AdtInfo {
            name: "Json".into(),
            params: vec![],
            ctors: vec![
                CtorInfo {
                    name: "JNull".into(),
                    args: vec![],
                },
                CtorInfo {
                    name: "JBool".into(),
                    args: vec![Ty::bool()],
                },
                CtorInfo {
                    name: "JNumber".into(),
                    args: vec![Ty::float()],
                },
                CtorInfo {
                    name: "JString".into(),
                    args: vec![Ty::string()],
                },
                CtorInfo {
                    name: "JArray".into(),
                    args: vec![Ty::list(json())],
                },
                CtorInfo {
                    name: "JObject".into(),
                    args: vec![Ty::list(Ty::Con(TyCon::new("JField")))],
                },
            ],
        },
        AdtInfo {
            name: "JField".into(),
            params: vec![],
            ctors: vec![CtorInfo {
                name: "JField".into(),
                args: vec![Ty::string(), json()],
            }],
        },
    ]
}

/// Decide a declared generic's kind by how the signature uses it: a name
/// appearing as a record row tail is a record row variable, anything else
/// is an ordinary type variable.
fn generic_kind(name: &str, func: &FuncDecl) -> Kind {
    fn used_as_tail(te: &TypeExpr, name: &str) -> bool {
        match te {
            TypeExpr::Unit(_) | TypeExpr::Name(_, _) => false,
            TypeExpr::App(_, args, _) => args.iter().any(|a| used_as_tail(a, name)),
            TypeExpr::Func(params, ret, _, _) => {
                params.iter().any(|p| used_as_tail(p, name)) || used_as_tail(ret, name)
            }
            TypeExpr::Record(fields, tail, _) => {
                tail.as_deref() == Some(name)
                    || fields.iter().any(|(_, f, _)| used_as_tail(f, name))
            }
        }
    }
    let in_params = func.params.iter().any(|p| used_as_tail(&p.ty, name));
    if in_params || used_as_tail(&func.ret, name) {
        Kind::Row(RowKind::Record)
    } else {
        Kind::Star
    }
}
