//! Type representation for the AILANG type system.
//!
//! Defines the core `Ty` enum, type constructors (`TyCon`), type variables
//! (`TyVar`), kinds, rows, and polymorphic type schemes (`Scheme`). Rows are
//! first-class: record types and effect rows share the same structural shape
//! (`RowEmpty` / `RowExtend` / row variable) distinguished by [`RowKind`].

use std::collections::HashMap;
use std::fmt;

/// A type variable, identified by a `u32` index into the unification table.
///
/// The variable's kind (star or row) lives in a side table owned by the
/// inference context; `ena` handles the union-find mechanics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TyVar(pub u32);

/// Which flavor of row a row type is. Record rows and effect rows never mix;
/// unifying across kinds is a `TC_ROW_KIND` error.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RowKind {
    Record,
    Effect,
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKind::Record => write!(f, "record"),
            RowKind::Effect => write!(f, "effect"),
        }
    }
}

/// The kind of a type variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Ordinary types.
    Star,
    /// Rows of the given flavor.
    Row(RowKind),
}

/// A type constructor: a named type like `Int`, `String`, `Option`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TyCon {
    pub name: String,
}

impl TyCon {
    pub fn new(name: impl Into<String>) -> Self {
        TyCon { name: name.into() }
    }
}

impl fmt::Display for TyCon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == "Unit" {
            write!(f, "()")
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// An AILANG type.
///
/// - `Var`: an inference variable, resolved by unification
/// - `Rigid`: a declared generic (`a` in `func id[a](x: a) -> a`) — behaves
///   like a constant during the body check, and like a variable to the
///   ground check (any variable-like form is non-ground)
/// - `Con`: a concrete constructor (Int, Bool, an ADT name)
/// - `App`: a constructor applied to arguments (`List[Int]`)
/// - `Fun`: params, an effect row, and a result
/// - `Record`: a record type wrapping a row
/// - `RowEmpty` / `RowExtend`: row structure shared by records and effects
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    Var(TyVar),
    Rigid(String, Kind),
    Con(TyCon),
    App(Box<Ty>, Vec<Ty>),
    Fun {
        params: Vec<Ty>,
        effects: Box<Ty>,
        ret: Box<Ty>,
    },
    Record(Box<Ty>),
    RowEmpty(RowKind),
    RowExtend {
        label: String,
        /// For effect rows the field type is conventionally `()` and never
        /// inspected; only the label carries meaning.
        field: Box<Ty>,
        tail: Box<Ty>,
        kind: RowKind,
    },
}

impl Ty {
    pub fn int() -> Ty {
        Ty::Con(TyCon::new("Int"))
    }

    pub fn float() -> Ty {
        Ty::Con(TyCon::new("Float"))
    }

    pub fn string() -> Ty {
        Ty::Con(TyCon::new("String"))
    }

    pub fn bool() -> Ty {
        Ty::Con(TyCon::new("Bool"))
    }

    pub fn unit() -> Ty {
        Ty::Con(TyCon::new("Unit"))
    }

    /// `List[T]`
    pub fn list(inner: Ty) -> Ty {
        Ty::App(Box::new(Ty::Con(TyCon::new("List"))), vec![inner])
    }

    /// A pure function type (empty effect row).
    pub fn fun(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Fun {
            params,
            effects: Box::new(Ty::RowEmpty(RowKind::Effect)),
            ret: Box::new(ret),
        }
    }

    /// A function type with an explicit effect row.
    pub fn fun_with_effects(params: Vec<Ty>, effects: Ty, ret: Ty) -> Ty {
        Ty::Fun {
            params,
            effects: Box::new(effects),
            ret: Box::new(ret),
        }
    }

    /// A closed effect row from a list of labels.
    pub fn effect_row(labels: &[&str]) -> Ty {
        let mut row = Ty::RowEmpty(RowKind::Effect);
        for label in labels.iter().rev() {
            row = Ty::RowExtend {
                label: (*label).to_string(),
                field: Box::new(Ty::unit()),
                tail: Box::new(row),
                kind: RowKind::Effect,
            };
        }
        row
    }

    /// A closed record type from label/type pairs.
    pub fn record(fields: Vec<(&str, Ty)>) -> Ty {
        let mut row = Ty::RowEmpty(RowKind::Record);
        for (label, field) in fields.into_iter().rev() {
            row = Ty::RowExtend {
                label: label.to_string(),
                field: Box::new(field),
                tail: Box::new(row),
                kind: RowKind::Record,
            };
        }
        Ty::Record(Box::new(row))
    }

    /// Whether this is a row form (empty, extend, or a row-kinded variable
    /// must be determined by the context's kind table — see
    /// `InferCtx::kind_of`).
    pub fn is_row_form(&self) -> bool {
        matches!(self, Ty::RowEmpty(_) | Ty::RowExtend { .. })
    }

    /// The concrete labels of a row, in order, ignoring the tail.
    pub fn row_labels(&self) -> Vec<&str> {
        let mut labels = Vec::new();
        let mut cur = self;
        while let Ty::RowExtend { label, tail, .. } = cur {
            labels.push(label.as_str());
            cur = tail;
        }
        labels
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Var(v) => write!(f, "?{}", v.0),
            Ty::Rigid(name, _) => write!(f, "{}", name),
            Ty::Con(c) => write!(f, "{}", c),
            Ty::App(con, args) => {
                write!(f, "{}", con)?;
                if !args.is_empty() {
                    write!(f, "[")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            Ty::Fun {
                params,
                effects,
                ret,
            } => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)?;
                if !matches!(effects.as_ref(), Ty::RowEmpty(_)) {
                    write!(f, " ! {{{}}}", DisplayRow(effects))?;
                }
                Ok(())
            }
            Ty::Record(row) => write!(f, "{{{}}}", DisplayRecordRow(row)),
            Ty::RowEmpty(_) => write!(f, "<>"),
            Ty::RowExtend { .. } => write!(f, "<{}>", DisplayRow(self)),
        }
    }
}

/// Display helper for effect rows: `IO, FS | ?3`.
struct DisplayRow<'a>(&'a Ty);

impl fmt::Display for DisplayRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cur = self.0;
        let mut first = true;
        loop {
            match cur {
                Ty::RowExtend { label, tail, .. } => {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", label)?;
                    first = false;
                    cur = tail;
                }
                Ty::RowEmpty(_) => return Ok(()),
                other => {
                    if !first {
                        write!(f, " | ")?;
                    }
                    return write!(f, "{}", other);
                }
            }
        }
    }
}

/// Display helper for record rows: `name: String, age: Int | r`.
struct DisplayRecordRow<'a>(&'a Ty);

impl fmt::Display for DisplayRecordRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cur = self.0;
        let mut first = true;
        loop {
            match cur {
                Ty::RowExtend {
                    label, field, tail, ..
                } => {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", label, field)?;
                    first = false;
                    cur = tail;
                }
                Ty::RowEmpty(_) => return Ok(()),
                other => {
                    if first {
                        return write!(f, "{}", other);
                    }
                    return write!(f, " | {}", other);
                }
            }
        }
    }
}

// ── Schemes ─────────────────────────────────────────────────────────────

/// A deferred class constraint carried by a scheme: `Num a`.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemeConstraint {
    pub class: String,
    pub ty: Ty,
}

/// A polymorphic type scheme: `∀ vars. constraints ⇒ ty`.
#[derive(Clone, Debug)]
pub struct Scheme {
    /// Quantified variables with their kinds.
    pub vars: Vec<(TyVar, Kind)>,
    /// Deferred class constraints, re-emitted on instantiation.
    pub constraints: Vec<SchemeConstraint>,
    /// The underlying type (may reference `vars`).
    pub ty: Ty,
}

impl Scheme {
    /// A monomorphic scheme (no quantified variables, no constraints).
    pub fn mono(ty: Ty) -> Self {
        Scheme {
            vars: Vec::new(),
            constraints: Vec::new(),
            ty,
        }
    }

    /// Build a self-contained scheme from a type containing `Rigid` markers
    /// for the given generic names, replacing each marker with a sequential
    /// quantified variable.
    ///
    /// Declared signatures type-check their bodies against rigid constants;
    /// the exported scheme must instead quantify, and it must not reference
    /// any particular inference context's unification table. Sequential IDs
    /// from zero keep exported schemes independent of the exporting module,
    /// which matters for cross-module import.
    pub fn from_rigid(generics: &[(String, Kind)], ty: &Ty) -> Self {
        let mut mapping: HashMap<String, (TyVar, Kind)> = HashMap::new();
        for (i, (name, kind)) in generics.iter().enumerate() {
            mapping.insert(name.clone(), (TyVar(i as u32), *kind));
        }
        let new_ty = replace_rigid(ty, &mapping);
        Scheme {
            vars: generics
                .iter()
                .enumerate()
                .map(|(i, (_, kind))| (TyVar(i as u32), *kind))
                .collect(),
            constraints: Vec::new(),
            ty: new_ty,
        }
    }
}

fn replace_rigid(ty: &Ty, mapping: &HashMap<String, (TyVar, Kind)>) -> Ty {
    match ty {
        Ty::Rigid(name, _) => match mapping.get(name) {
            Some((var, _)) => Ty::Var(*var),
            None => ty.clone(),
        },
        Ty::Var(_) | Ty::Con(_) | Ty::RowEmpty(_) => ty.clone(),
        Ty::App(con, args) => Ty::App(
            Box::new(replace_rigid(con, mapping)),
            args.iter().map(|a| replace_rigid(a, mapping)).collect(),
        ),
        Ty::Fun {
            params,
            effects,
            ret,
        } => Ty::Fun {
            params: params.iter().map(|p| replace_rigid(p, mapping)).collect(),
            effects: Box::new(replace_rigid(effects, mapping)),
            ret: Box::new(replace_rigid(ret, mapping)),
        },
        Ty::Record(row) => Ty::Record(Box::new(replace_rigid(row, mapping))),
        Ty::RowExtend {
            label,
            field,
            tail,
            kind,
        } => Ty::RowExtend {
            label: label.clone(),
            field: Box::new(replace_rigid(field, mapping)),
            tail: Box::new(replace_rigid(tail, mapping)),
            kind: *kind,
        },
    }
}

// ── ena trait implementations ───────────────────────────────────────────

impl ena::unify::UnifyKey for TyVar {
    type Value = Option<Ty>;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        TyVar(u)
    }

    fn tag() -> &'static str {
        "TyVar"
    }
}

impl ena::unify::EqUnifyValue for Ty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_primitives_and_functions() {
        assert_eq!(format!("{}", Ty::int()), "Int");
        assert_eq!(format!("{}", Ty::unit()), "()");
        assert_eq!(
            format!("{}", Ty::fun(vec![Ty::int(), Ty::string()], Ty::bool())),
            "(Int, String) -> Bool"
        );
        assert_eq!(format!("{}", Ty::list(Ty::int())), "List[Int]");
    }

    #[test]
    fn display_effectful_function() {
        let ty = Ty::fun_with_effects(
            vec![Ty::string()],
            Ty::effect_row(&["IO"]),
            Ty::unit(),
        );
        assert_eq!(format!("{}", ty), "(String) -> () ! {IO}");
    }

    #[test]
    fn display_record_with_tail() {
        let row = Ty::RowExtend {
            label: "name".into(),
            field: Box::new(Ty::string()),
            tail: Box::new(Ty::Rigid("r".into(), Kind::Row(RowKind::Record))),
            kind: RowKind::Record,
        };
        assert_eq!(
            format!("{}", Ty::Record(Box::new(row))),
            "{name: String | r}"
        );
    }

    #[test]
    fn row_labels_ignore_tail() {
        let row = Ty::effect_row(&["IO", "FS"]);
        assert_eq!(row.row_labels(), vec!["IO", "FS"]);
    }

    #[test]
    fn from_rigid_quantifies_in_declaration_order() {
        let ty = Ty::Fun {
            params: vec![Ty::Rigid("a".into(), Kind::Star)],
            effects: Box::new(Ty::RowEmpty(RowKind::Effect)),
            ret: Box::new(Ty::Rigid("a".into(), Kind::Star)),
        };
        let scheme = Scheme::from_rigid(&[("a".to_string(), Kind::Star)], &ty);
        assert_eq!(scheme.vars.len(), 1);
        match &scheme.ty {
            Ty::Fun { params, ret, .. } => {
                assert_eq!(params[0], Ty::Var(TyVar(0)));
                assert_eq!(ret.as_ref(), &Ty::Var(TyVar(0)));
            }
            other => panic!("expected function type, got {:?}", other),
        }
    }
}
