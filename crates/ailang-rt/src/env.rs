//! Lexical runtime environments.
//!
//! Frames form a parent-linked chain; closures keep an `Rc` to their frame.
//! Bindings are write-once except for the `letrec` protocol: recursive
//! groups pre-bind every name to a placeholder, then overwrite each slot
//! after evaluating its right-hand side, which is what lets closures in the
//! group see each other.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::value::Value;

pub type EnvRef = Rc<Env>;

#[derive(Default)]
pub struct Env {
    vars: RefCell<FxHashMap<String, Value>>,
    parent: Option<EnvRef>,
}

impl Env {
    pub fn root() -> EnvRef {
        Rc::new(Env::default())
    }

    pub fn child(parent: &EnvRef) -> EnvRef {
        Rc::new(Env {
            vars: RefCell::new(FxHashMap::default()),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Bind (or, for `letrec` slots, overwrite) a name in this frame.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.vars.borrow_mut().insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_sees_parent_bindings() {
        let root = Env::root();
        root.define("x", Value::Int(1));
        let child = Env::child(&root);
        assert!(matches!(child.lookup("x"), Some(Value::Int(1))));
    }

    #[test]
    fn child_shadows_without_touching_parent() {
        let root = Env::root();
        root.define("x", Value::Int(1));
        let child = Env::child(&root);
        child.define("x", Value::Int(2));
        assert!(matches!(child.lookup("x"), Some(Value::Int(2))));
        assert!(matches!(root.lookup("x"), Some(Value::Int(1))));
    }

    #[test]
    fn letrec_slot_overwrite_is_visible_through_the_chain() {
        let root = Env::root();
        root.define("f", Value::Unit);
        let child = Env::child(&root);
        root.define("f", Value::Int(7));
        assert!(matches!(child.lookup("f"), Some(Value::Int(7))));
    }
}
