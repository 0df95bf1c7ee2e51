//! Lexical type environment: name → scheme, with nested scopes.

use rustc_hash::FxHashMap;

use crate::ty::Scheme;

/// A stack of scopes mapping names to their type schemes. Lookup walks from
/// the innermost scope outward.
#[derive(Debug, Default)]
pub struct TypeEnv {
    frames: Vec<FxHashMap<String, Scheme>>,
}

impl TypeEnv {
    pub fn new() -> Self {
        TypeEnv {
            frames: vec![FxHashMap::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.frames.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.frames.len() > 1, "cannot pop the root scope");
        self.frames.pop();
    }

    /// Bind a name in the innermost scope, shadowing outer bindings.
    pub fn insert(&mut self, name: impl Into<String>, scheme: Scheme) {
        self.frames
            .last_mut()
            .expect("env always has a root scope")
            .insert(name.into(), scheme);
    }

    pub fn lookup(&self, name: &str) -> Option<&Scheme> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Like `lookup`, but also reports which frame the binding lives in
    /// (0 = the root scope). Callers use this to tell module-level names
    /// apart from locals that shadow them.
    pub fn lookup_with_depth(&self, name: &str) -> Option<(usize, &Scheme)> {
        self.frames
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, frame)| frame.get(name).map(|s| (depth, s)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}
