//! Pattern match compilation to decision trees.
//!
//! A `match` compiles to a [`MatchPlan`]: either a linear scan (the
//! small-match fast path) or a [`DecisionTree`] built from a pattern
//! matrix. Interior `Switch` nodes test a constructor tag or literal at an
//! [`AccessPath`] into the scrutinee; `Leaf` nodes carry the ordered arm
//! candidates that could still match, so guard fall-through keeps linear
//! semantics while the tree prunes impossible arms.

pub mod compile;

pub use compile::compile_match;

use crate::core::CoreLit;

/// How to reach a sub-value of the scrutinee.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccessPath {
    /// The scrutinee itself.
    Root,
    /// Argument `idx` of a constructor value (for lists: 0 = head of a
    /// `Cons`, 1 = tail).
    CtorArg(Box<AccessPath>, usize),
    /// A named record field.
    Field(Box<AccessPath>, String),
}

/// A switch case key: a constructor name or a literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseKey {
    /// A constructor tag; `"Cons"` and `"Nil"` cover lists.
    Ctor(String),
    Lit(CoreLit),
}

/// A compiled decision tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionTree {
    /// The arms that could still match, in source order. The evaluator
    /// re-matches each candidate's full pattern (binding its variables),
    /// evaluates its guard, and falls through on guard failure.
    Leaf { candidates: Vec<usize> },
    /// Test the value at `path` against each case key.
    Switch {
        path: AccessPath,
        cases: Vec<(CaseKey, DecisionTree)>,
        default: Option<Box<DecisionTree>>,
    },
    /// No arm can match: `RT_MATCH_NON_EXHAUSTIVE` at runtime.
    Fail,
}

/// The compiled form of one `match` expression.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchPlan {
    /// Try arms top to bottom. Chosen when fewer than two arms carry a
    /// discriminating (literal or constructor) pattern, where a tree
    /// cannot beat the scan.
    Linear,
    Tree(DecisionTree),
}
