//! Elaboration for AILANG: surface AST → Core AST.
//!
//! [`elaborate_module`] lowers a type-checked module into [`core::CoreModule`],
//! inserting dictionaries for overloaded operators, desugaring blocks and
//! list patterns, and compiling every `match` to a [`pattern::MatchPlan`].
//!
//! Pipeline position: `ailang-typeck` → **ailang-elab** → `ailang-rt`.

pub mod core;
pub mod elaborate;
pub mod pattern;

pub use crate::core::{
    CoreArm, CoreDecl, CoreExpr, CoreExprKind, CoreLit, CoreModule, CorePattern, DictRef,
};
pub use elaborate::{check_eq_operands, elab_pattern, elaborate_module, ElabResult};
pub use pattern::{AccessPath, CaseKey, DecisionTree, MatchPlan};
