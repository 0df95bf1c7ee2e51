//! Pattern matrix to decision tree compilation.
//!
//! The matrix algorithm: one row per arm, one column per value position.
//!
//! 1. Empty matrix → `Fail` (non-exhaustive at runtime).
//! 2. First row all irrefutable → `Leaf` carrying the remaining rows' arm
//!    indices as ordered candidates (guards fall through at runtime).
//! 3. Otherwise test column 0: partition rows by head constructor/literal,
//!    sending irrefutable rows to every partition and to the default.
//!    Specializing a constructor row replaces column 0 with the
//!    constructor's argument columns.
//!
//! Record patterns never discriminate (the type guarantees their fields),
//! so they count as irrefutable here; their sub-patterns are decided by the
//! leaf re-match. Lists arrive desugared to `Cons`/`Nil`, which switch like
//! any two-variant type.

use ailang_typeck::AdtRegistry;

use crate::core::{CoreArm, CorePattern};
use crate::pattern::{AccessPath, CaseKey, DecisionTree, MatchPlan};

/// Compile a match's arms into a plan.
pub fn compile_match(arms: &[CoreArm], adts: &AdtRegistry) -> MatchPlan {
    if !can_compile_to_tree(arms) {
        return MatchPlan::Linear;
    }
    let rows: Vec<Row> = arms
        .iter()
        .enumerate()
        .map(|(idx, arm)| Row {
            pats: vec![arm.pattern.clone()],
            arm: idx,
        })
        .collect();
    let matrix = Matrix {
        rows,
        paths: vec![AccessPath::Root],
    };
    MatchPlan::Tree(compile_matrix(matrix, adts))
}

/// The small-match fast path: a tree only pays off once at least two arms
/// can be discriminated by a head constructor or literal.
fn can_compile_to_tree(arms: &[CoreArm]) -> bool {
    let discriminating = arms
        .iter()
        .filter(|arm| !arm.pattern.is_irrefutable())
        .count();
    discriminating >= 2
}

// ── Matrix ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Row {
    pats: Vec<CorePattern>,
    arm: usize,
}

#[derive(Debug, Clone)]
struct Matrix {
    rows: Vec<Row>,
    paths: Vec<AccessPath>,
}

fn compile_matrix(matrix: Matrix, adts: &AdtRegistry) -> DecisionTree {
    if matrix.rows.is_empty() {
        return DecisionTree::Fail;
    }

    // First row irrefutable: every remaining row is a candidate, in order.
    // The leaf re-match plus guard evaluation picks the winner.
    if row_is_irrefutable(&matrix.rows[0]) {
        let mut candidates = Vec::new();
        for row in &matrix.rows {
            if !candidates.contains(&row.arm) {
                candidates.push(row.arm);
            }
        }
        return DecisionTree::Leaf { candidates };
    }

    // Column 0 is always the test column.
    let keys = head_keys(&matrix);
    if keys.is_empty() {
        return compile_matrix(drop_column(&matrix), adts);
    }

    let path = matrix.paths[0].clone();
    let mut cases = Vec::new();
    for (key, arity) in &keys {
        let specialized = specialize(&matrix, key, *arity);
        cases.push((key.clone(), compile_matrix(specialized, adts)));
    }

    // The default branch handles values matching none of the keys. It can
    // be omitted when the keys exhaust the scrutinee's constructors.
    let default_matrix = default_of(&matrix);
    let default = if signature_is_complete(&keys, adts) {
        None
    } else if default_matrix.rows.is_empty() {
        Some(Box::new(DecisionTree::Fail))
    } else {
        Some(Box::new(compile_matrix(default_matrix, adts)))
    };

    DecisionTree::Switch {
        path,
        cases,
        default,
    }
}

fn row_is_irrefutable(row: &Row) -> bool {
    row.pats.iter().all(|p| p.is_irrefutable())
}

/// Distinct head keys in column 0, in order of first appearance, with the
/// constructor arity needed for specialization.
fn head_keys(matrix: &Matrix) -> Vec<(CaseKey, usize)> {
    let mut keys: Vec<(CaseKey, usize)> = Vec::new();
    for row in &matrix.rows {
        let key = match &row.pats[0] {
            CorePattern::Ctor { name, args } => Some((CaseKey::Ctor(name.clone()), args.len())),
            CorePattern::Lit(lit) => Some((CaseKey::Lit(lit.clone()), 0)),
            _ => None,
        };
        if let Some((key, arity)) = key {
            if !keys.iter().any(|(k, _)| *k == key) {
                keys.push((key, arity));
            }
        }
    }
    keys
}

/// Whether the collected keys cover every value of the scrutinee type:
/// all constructors of an ADT (lists count as Cons + Nil), or both Bools.
fn signature_is_complete(keys: &[(CaseKey, usize)], adts: &AdtRegistry) -> bool {
    let ctor_names: Vec<&str> = keys
        .iter()
        .filter_map(|(k, _)| match k {
            CaseKey::Ctor(name) => Some(name.as_str()),
            CaseKey::Lit(_) => None,
        })
        .collect();
    if ctor_names.len() != keys.len() {
        // Mixed or literal keys: Bool is the only finite literal domain.
        let mut saw_true = false;
        let mut saw_false = false;
        for (key, _) in keys {
            match key {
                CaseKey::Lit(crate::core::CoreLit::Bool(true)) => saw_true = true,
                CaseKey::Lit(crate::core::CoreLit::Bool(false)) => saw_false = true,
                _ => return false,
            }
        }
        return saw_true && saw_false;
    }
    let Some(first) = ctor_names.first() else {
        return false;
    };
    let all = if *first == "Cons" || *first == "Nil" {
        vec!["Cons".to_string(), "Nil".to_string()]
    } else {
        match adts.sibling_ctors(first) {
            Some(all) => all,
            None => return false,
        }
    };
    all.iter().all(|c| ctor_names.contains(&c.as_str()))
}

/// Rows whose column 0 matches `key`, with column 0 replaced by the
/// constructor's argument columns. Irrefutable rows match every key.
fn specialize(matrix: &Matrix, key: &CaseKey, arity: usize) -> Matrix {
    let mut rows = Vec::new();
    for row in &matrix.rows {
        let sub_pats: Option<Vec<CorePattern>> = match (&row.pats[0], key) {
            (CorePattern::Ctor { name, args }, CaseKey::Ctor(key_name)) if name == key_name => {
                Some(args.clone())
            }
            (CorePattern::Lit(lit), CaseKey::Lit(key_lit)) if lit == key_lit => Some(Vec::new()),
            (p, _) if p.is_irrefutable() => Some(vec![CorePattern::Wildcard; arity]),
            _ => None,
        };
        if let Some(mut sub_pats) = sub_pats {
            sub_pats.extend(row.pats[1..].iter().cloned());
            rows.push(Row {
                pats: sub_pats,
                arm: row.arm,
            });
        }
    }
    let mut paths: Vec<AccessPath> = (0..arity)
        .map(|i| AccessPath::CtorArg(Box::new(matrix.paths[0].clone()), i))
        .collect();
    paths.extend(matrix.paths[1..].iter().cloned());
    Matrix { rows, paths }
}

/// Rows whose column 0 is irrefutable, with column 0 removed.
fn default_of(matrix: &Matrix) -> Matrix {
    let rows = matrix
        .rows
        .iter()
        .filter(|row| row.pats[0].is_irrefutable())
        .map(|row| Row {
            pats: row.pats[1..].to_vec(),
            arm: row.arm,
        })
        .collect();
    Matrix {
        rows,
        paths: matrix.paths[1..].to_vec(),
    }
}

/// Remove a column every row treats as irrefutable.
fn drop_column(matrix: &Matrix) -> Matrix {
    Matrix {
        rows: matrix
            .rows
            .iter()
            .map(|row| Row {
                pats: row.pats[1..].to_vec(),
                arm: row.arm,
            })
            .collect(),
        paths: matrix.paths[1..].to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CoreExpr, CoreExprKind, CoreLit};
    use ailang_common::Span;
    use ailang_typeck::infer::{AdtInfo, CtorInfo};

    fn unit_body() -> CoreExpr {
        CoreExpr::new(CoreExprKind::Lit(CoreLit::Unit), Span::DUMMY)
    }

    fn arm(pattern: CorePattern) -> CoreArm {
        CoreArm {
            pattern,
            guard: None,
            body: unit_body(),
        }
    }

    fn option_registry() -> AdtRegistry {
        let mut adts = AdtRegistry::new();
        adts.register(AdtInfo {
            name: "Option".into(),
            params: vec!["a".into()],
            ctors: vec![
                CtorInfo {
                    name: "Some".into(),
                    args: vec![ailang_typeck::Ty::Rigid(
                        "a".into(),
                        ailang_typeck::Kind::Star,
                    )],
                },
                CtorInfo {
                    name: "None".into(),
                    args: vec![],
                },
            ],
        });
        adts
    }

    fn ctor(name: &str, args: Vec<CorePattern>) -> CorePattern {
        CorePattern::Ctor {
            name: name.into(),
            args,
        }
    }

    #[test]
    fn single_discriminating_arm_stays_linear() {
        let arms = vec![
            arm(ctor("Some", vec![CorePattern::Var("v".into())])),
            arm(CorePattern::Wildcard),
        ];
        assert_eq!(compile_match(&arms, &option_registry()), MatchPlan::Linear);
    }

    #[test]
    fn complete_adt_match_needs_no_default() {
        let arms = vec![
            arm(ctor("Some", vec![CorePattern::Var("v".into())])),
            arm(ctor("None", vec![])),
        ];
        let MatchPlan::Tree(tree) = compile_match(&arms, &option_registry()) else {
            panic!("expected a tree");
        };
        match tree {
            DecisionTree::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert!(default.is_none(), "Some + None exhaust Option");
                assert_eq!(
                    cases[0].1,
                    DecisionTree::Leaf {
                        candidates: vec![0]
                    }
                );
                assert_eq!(
                    cases[1].1,
                    DecisionTree::Leaf {
                        candidates: vec![1]
                    }
                );
            }
            other => panic!("expected a switch, got {:?}", other),
        }
    }

    #[test]
    fn incomplete_literal_match_fails_by_default() {
        let arms = vec![
            arm(CorePattern::Lit(CoreLit::Int(0))),
            arm(CorePattern::Lit(CoreLit::Int(1))),
        ];
        let MatchPlan::Tree(tree) = compile_match(&arms, &option_registry()) else {
            panic!("expected a tree");
        };
        match tree {
            DecisionTree::Switch { default, .. } => {
                assert_eq!(default.as_deref(), Some(&DecisionTree::Fail));
            }
            other => panic!("expected a switch, got {:?}", other),
        }
    }

    #[test]
    fn wildcard_row_feeds_every_case_and_the_default() {
        let arms = vec![
            arm(CorePattern::Lit(CoreLit::Int(0))),
            arm(CorePattern::Var("n".into())),
        ];
        let MatchPlan::Tree(tree) = compile_match(&arms, &option_registry()) else {
            panic!("expected a tree");
        };
        match tree {
            DecisionTree::Switch { cases, default, .. } => {
                // The 0 case keeps both arms as candidates (arm 1 could
                // win if arm 0 had a failing guard).
                assert_eq!(
                    cases[0].1,
                    DecisionTree::Leaf {
                        candidates: vec![0, 1]
                    }
                );
                assert_eq!(
                    default.as_deref(),
                    Some(&DecisionTree::Leaf {
                        candidates: vec![1]
                    })
                );
            }
            other => panic!("expected a switch, got {:?}", other),
        }
    }

    #[test]
    fn bool_true_false_is_complete() {
        let arms = vec![
            arm(CorePattern::Lit(CoreLit::Bool(true))),
            arm(CorePattern::Lit(CoreLit::Bool(false))),
        ];
        let MatchPlan::Tree(tree) = compile_match(&arms, &option_registry()) else {
            panic!("expected a tree");
        };
        match tree {
            DecisionTree::Switch { default, .. } => assert!(default.is_none()),
            other => panic!("expected a switch, got {:?}", other),
        }
    }

    #[test]
    fn cons_nil_switches_like_a_two_variant_type() {
        let arms = vec![
            arm(ctor(
                "Cons",
                vec![CorePattern::Var("x".into()), CorePattern::Var("rest".into())],
            )),
            arm(ctor("Nil", vec![])),
        ];
        let MatchPlan::Tree(tree) = compile_match(&arms, &option_registry()) else {
            panic!("expected a tree");
        };
        match tree {
            DecisionTree::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert!(default.is_none());
            }
            other => panic!("expected a switch, got {:?}", other),
        }
    }

    #[test]
    fn nested_ctor_patterns_specialize_into_argument_columns() {
        // match o { Some(0) => ..., Some(n) => ..., None => ... }
        let arms = vec![
            arm(ctor("Some", vec![CorePattern::Lit(CoreLit::Int(0))])),
            arm(ctor("Some", vec![CorePattern::Var("n".into())])),
            arm(ctor("None", vec![])),
        ];
        let MatchPlan::Tree(tree) = compile_match(&arms, &option_registry()) else {
            panic!("expected a tree");
        };
        let DecisionTree::Switch { cases, .. } = tree else {
            panic!("expected a switch");
        };
        // Inside the Some case there is a second switch on the argument.
        match &cases[0].1 {
            DecisionTree::Switch { path, cases, .. } => {
                assert_eq!(
                    *path,
                    AccessPath::CtorArg(Box::new(AccessPath::Root), 0)
                );
                assert_eq!(
                    cases[0].1,
                    DecisionTree::Leaf {
                        candidates: vec![0, 1]
                    }
                );
            }
            other => panic!("expected a nested switch, got {:?}", other),
        }
    }
}
