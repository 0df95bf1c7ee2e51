//! Runtime values.
//!
//! Every value is immutable; sharing is by `Rc`. Records preserve field
//! insertion order. Closures capture their lexical environment and the
//! module instance they were defined in, so cross-module references always
//! resolve through the defining module's imports.

use std::fmt;
use std::rc::Rc;

use ailang_common::{Code, Diagnostic};
use ailang_elab::CoreExpr;

use crate::env::EnvRef;
use crate::loader::ModuleInstance;

#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(Rc<String>),
    Bool(bool),
    Unit,
    List(Rc<Vec<Value>>),
    /// Fields in insertion order; lookup is linear, records are small.
    Record(Rc<Vec<(String, Value)>>),
    Ctor {
        name: Rc<String>,
        args: Rc<Vec<Value>>,
    },
    Closure(Rc<Closure>),
    /// A reference into the builtin registry.
    Builtin(&'static str),
}

pub struct Closure {
    pub params: Vec<String>,
    pub body: CoreExpr,
    pub env: EnvRef,
    /// The module whose imports resolve this closure's `GlobalRef`s.
    pub module: Rc<ModuleInstance>,
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn record(fields: Vec<(String, Value)>) -> Value {
        Value::Record(Rc::new(fields))
    }

    pub fn ctor(name: impl Into<String>, args: Vec<Value>) -> Value {
        Value::Ctor {
            name: Rc::new(name.into()),
            args: Rc::new(args),
        }
    }

    pub fn ok(value: Value) -> Value {
        Value::ctor("Ok", vec![value])
    }

    pub fn err(message: impl Into<String>) -> Value {
        Value::ctor("Err", vec![Value::str(message)])
    }

    /// A short tag name for diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Str(_) => "String",
            Value::Bool(_) => "Bool",
            Value::Unit => "Unit",
            Value::List(_) => "List",
            Value::Record(_) => "Record",
            Value::Ctor { .. } => "Constructor",
            Value::Closure(_) => "Function",
            Value::Builtin(_) => "Function",
        }
    }

    pub fn field(&self, label: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(l, _)| l == label).map(|(_, v)| v),
            _ => None,
        }
    }

    /// The `show` forms: stable textual output for primitives. Everything
    /// else is an error until explicitly supported.
    pub fn show(&self) -> Result<String, Diagnostic> {
        match self {
            Value::Int(n) => Ok(n.to_string()),
            Value::Float(f) => Ok(format_float(*f)),
            Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
            Value::Str(s) => Ok(s.as_ref().clone()),
            other => Err(Diagnostic::new(
                Code::RtType,
                format!("show is not supported for {} values", other.tag()),
            )),
        }
    }

    /// Structural rendering for driver output and error messages. Unlike
    /// `show`, this is total.
    pub fn render(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => format!("{:?}", s),
            Value::Bool(b) => b.to_string(),
            Value::Unit => "()".to_string(),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.render()).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Record(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(l, v)| format!("{}: {}", l, v.render()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Ctor { name, args } => {
                if args.is_empty() {
                    name.as_ref().clone()
                } else {
                    let inner: Vec<String> = args.iter().map(|v| v.render()).collect();
                    format!("{}({})", name, inner.join(", "))
                }
            }
            Value::Closure(_) | Value::Builtin(_) => "<function>".to_string(),
        }
    }
}

/// Float rendering: shortest form that reads back, integral values without
/// a trailing `.0` kept distinguishable from Ints by context.
pub fn format_float(f: f64) -> String {
    if f.is_infinite() {
        return if f > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if f.is_nan() {
        return "NaN".to_string();
    }
    format!("{}", f)
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_primitives() {
        assert_eq!(Value::Int(42).show().unwrap(), "42");
        assert_eq!(Value::Float(3.14).show().unwrap(), "3.14");
        assert_eq!(Value::Float(42.0).show().unwrap(), "42");
        assert_eq!(Value::Bool(true).show().unwrap(), "true");
        assert_eq!(Value::str("hi").show().unwrap(), "hi");
    }

    #[test]
    fn show_rejects_compound_values() {
        let err = Value::list(vec![Value::Int(1)]).show().unwrap_err();
        assert_eq!(err.code, Code::RtType);
    }

    #[test]
    fn render_is_total_and_structural() {
        let v = Value::ctor(
            "Some",
            vec![Value::record(vec![("x".into(), Value::Int(1))])],
        );
        assert_eq!(v.render(), "Some({x: 1})");
        assert_eq!(Value::list(vec![]).render(), "[]");
        assert_eq!(Value::Unit.render(), "()");
    }

    #[test]
    fn show_then_read_round_trips_primitives() {
        for n in [0i64, 1, -1, 42, i64::MAX, i64::MIN] {
            let shown = Value::Int(n).show().unwrap();
            assert_eq!(shown.parse::<i64>().unwrap(), n);
        }
        for f in [0.5f64, -2.25, 3.14, 42.0, 1e100] {
            let shown = Value::Float(f).show().unwrap();
            assert_eq!(shown.parse::<f64>().unwrap(), f);
        }
        for b in [true, false] {
            let shown = Value::Bool(b).show().unwrap();
            assert_eq!(shown.parse::<bool>().unwrap(), b);
        }
        // Strings show verbatim, so read is the identity.
        assert_eq!(Value::str("round trip").show().unwrap(), "round trip");
    }

    #[test]
    fn record_field_lookup_keeps_insertion_order() {
        let v = Value::record(vec![
            ("z".into(), Value::Int(1)),
            ("a".into(), Value::Int(2)),
        ]);
        assert_eq!(v.render(), "{z: 1, a: 2}");
        assert!(matches!(v.field("a"), Some(Value::Int(2))));
        assert!(v.field("missing").is_none());
    }
}
