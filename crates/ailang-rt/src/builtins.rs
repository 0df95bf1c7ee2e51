//! The builtin registry.
//!
//! One declarative table describes every primitive: its pseudo-module, its
//! `_name`, arity, purity, a factory for its scheme, and the Rust
//! implementation. The registry is populated once, frozen behind a
//! `OnceLock`, and validated by `doctor builtins` — the single piece of
//! process-wide state in the runtime.
//!
//! Naming: dictionary methods resolve to `_method_Type` (`_add_Int`,
//! `_eq_Float`); builtins with a `surface_name` are additionally exported
//! by their pseudo-module (`std/io` exports `println` → `_io_println`).

use std::sync::OnceLock;

use ailang_common::{json, Code, Diagnostic, Json};
use ailang_typeck::ty::{Kind, Scheme, Ty, TyCon, TyVar};
use rustc_hash::FxHashMap;

use crate::effects::net::HttpResponse;
use crate::effects::{clock, fs, io, net, EffContext};
use crate::value::{format_float, Value};

pub type BuiltinImpl = fn(&EffContext, &[Value]) -> Result<Value, Diagnostic>;

pub struct BuiltinSpec {
    /// Pseudo-module used for resolution, e.g. `"std/io"`.
    pub module: &'static str,
    /// The internal name, `_`-prefixed by convention.
    pub name: &'static str,
    /// Name exported by the pseudo-module, when the builtin is callable
    /// from the surface language (dictionary methods are not).
    pub surface_name: Option<&'static str>,
    pub arity: usize,
    pub is_pure: bool,
    pub type_factory: fn() -> Scheme,
    pub run: BuiltinImpl,
}

pub struct BuiltinRegistry {
    specs: Vec<BuiltinSpec>,
    by_name: FxHashMap<&'static str, usize>,
}

/// The frozen process-wide registry.
pub fn registry() -> &'static BuiltinRegistry {
    static REGISTRY: OnceLock<BuiltinRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let specs = all_specs();
        let mut by_name = FxHashMap::default();
        for (i, spec) in specs.iter().enumerate() {
            by_name.insert(spec.name, i);
        }
        BuiltinRegistry { specs, by_name }
    })
}

impl BuiltinRegistry {
    pub fn get(&self, name: &str) -> Option<&BuiltinSpec> {
        self.by_name.get(name).map(|&i| &self.specs[i])
    }

    pub fn specs(&self) -> &[BuiltinSpec] {
        &self.specs
    }

    /// The surface exports of a pseudo-module, e.g. `std/io`.
    pub fn module_exports(&self, module: &str) -> Vec<&BuiltinSpec> {
        self.specs
            .iter()
            .filter(|s| s.module == module && s.surface_name.is_some())
            .collect()
    }

    /// All pseudo-module paths with at least one surface export, sorted.
    pub fn module_paths(&self) -> Vec<&'static str> {
        let mut paths: Vec<&'static str> = self
            .specs
            .iter()
            .filter(|s| s.surface_name.is_some())
            .map(|s| s.module)
            .collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }

    /// Invoke a builtin by internal name, checking arity.
    pub fn call(
        &self,
        name: &str,
        ctx: &EffContext,
        args: &[Value],
    ) -> Result<Value, Diagnostic> {
        let spec = self.get(name).ok_or_else(|| {
            Diagnostic::new(Code::RtType, format!("unknown builtin `{}`", name))
        })?;
        if args.len() != spec.arity {
            return Err(Diagnostic::new(
                Code::RtType,
                format!(
                    "builtin `{}` takes {} arguments, got {}",
                    name,
                    spec.arity,
                    args.len()
                ),
            ));
        }
        (spec.run)(ctx, args)
    }

    /// The `doctor builtins` self-check: registration invariants that a
    /// bad edit to the table would break.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen = FxHashMap::default();
        for spec in &self.specs {
            if !spec.name.starts_with('_') {
                problems.push(format!("`{}`: internal names must start with `_`", spec.name));
            }
            if let Some(prev) = seen.insert(spec.name, spec.module) {
                problems.push(format!(
                    "`{}` registered twice ({} and {})",
                    spec.name, prev, spec.module
                ));
            }
            let scheme = (spec.type_factory)();
            let (param_count, effect_labels) = match &scheme.ty {
                Ty::Fun {
                    params, effects, ..
                } => (params.len(), effect_labels(effects)),
                _ => {
                    problems.push(format!("`{}`: scheme is not a function type", spec.name));
                    continue;
                }
            };
            if param_count != spec.arity {
                problems.push(format!(
                    "`{}`: arity {} does not match scheme ({} params)",
                    spec.name, spec.arity, param_count
                ));
            }
            if spec.is_pure && !effect_labels.is_empty() {
                problems.push(format!(
                    "`{}`: pure builtin carries effect row {:?}",
                    spec.name, effect_labels
                ));
            }
            if !spec.is_pure && effect_labels.is_empty() {
                problems.push(format!(
                    "`{}`: impure builtin has an empty effect row",
                    spec.name
                ));
            }
            if let Some(expected) = module_effect(spec.module) {
                if !spec.is_pure && effect_labels != vec![expected.to_string()] {
                    problems.push(format!(
                        "`{}`: module {} implies effect {}, scheme says {:?}",
                        spec.name, spec.module, expected, effect_labels
                    ));
                }
            }
        }
        // Surface names must be unique within a module.
        let mut surface = FxHashMap::default();
        for spec in &self.specs {
            if let Some(name) = spec.surface_name {
                if surface.insert((spec.module, name), spec.name).is_some() {
                    problems.push(format!(
                        "{} exports `{}` more than once",
                        spec.module, name
                    ));
                }
            }
        }
        problems
    }
}

/// The effect a pseudo-module's operations live under.
fn module_effect(module: &str) -> Option<&'static str> {
    match module {
        "std/io" => Some("IO"),
        "std/fs" => Some("FS"),
        "std/clock" => Some("Clock"),
        "std/net" => Some("Net"),
        _ => None,
    }
}

fn effect_labels(row: &Ty) -> Vec<String> {
    row.row_labels().iter().map(|s| s.to_string()).collect()
}

// ── Scheme factories ────────────────────────────────────────────────────

fn mono(params: Vec<Ty>, ret: Ty) -> Scheme {
    Scheme::mono(Ty::fun(params, ret))
}

fn effectful(params: Vec<Ty>, effect: &str, ret: Ty) -> Scheme {
    Scheme::mono(Ty::fun_with_effects(
        params,
        Ty::effect_row(&[effect]),
        ret,
    ))
}

fn result_ty(ok: Ty, err: Ty) -> Ty {
    Ty::App(Box::new(Ty::Con(TyCon::new("Result"))), vec![ok, err])
}

fn json_ty() -> Ty {
    Ty::Con(TyCon::new("Json"))
}

fn http_response_ty() -> Ty {
    Ty::record(vec![("status", Ty::int()), ("body", Ty::string())])
}

fn header_list_ty() -> Ty {
    Ty::list(Ty::record(vec![
        ("name", Ty::string()),
        ("value", Ty::string()),
    ]))
}

/// `∀a. (a) -> String`
fn show_scheme() -> Scheme {
    let a = TyVar(0);
    Scheme {
        vars: vec![(a, Kind::Star)],
        constraints: Vec::new(),
        ty: Ty::fun(vec![Ty::Var(a)], Ty::string()),
    }
}

// ── Argument accessors ──────────────────────────────────────────────────

fn type_err(expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::new(
        Code::RtType,
        format!("expected {}, got {}", expected, got.tag()),
    )
}

fn arg_int(args: &[Value], i: usize) -> Result<i64, Diagnostic> {
    match &args[i] {
        Value::Int(n) => Ok(*n),
        other => Err(type_err("Int", other)),
    }
}

fn arg_float(args: &[Value], i: usize) -> Result<f64, Diagnostic> {
    match &args[i] {
        Value::Float(f) => Ok(*f),
        other => Err(type_err("Float", other)),
    }
}

fn arg_str<'a>(args: &'a [Value], i: usize) -> Result<&'a str, Diagnostic> {
    match &args[i] {
        Value::Str(s) => Ok(s.as_str()),
        other => Err(type_err("String", other)),
    }
}

fn arg_bool(args: &[Value], i: usize) -> Result<bool, Diagnostic> {
    match &args[i] {
        Value::Bool(b) => Ok(*b),
        other => Err(type_err("Bool", other)),
    }
}

fn div_zero() -> Diagnostic {
    Diagnostic::new(Code::RtDivZero, "division by zero")
}

// ── The table ───────────────────────────────────────────────────────────

fn all_specs() -> Vec<BuiltinSpec> {
    let mut specs: Vec<BuiltinSpec> = Vec::new();

    let mut pure = |module: &'static str,
                    name: &'static str,
                    surface: Option<&'static str>,
                    arity: usize,
                    type_factory: fn() -> Scheme,
                    run: BuiltinImpl| {
        specs.push(BuiltinSpec {
            module,
            name,
            surface_name: surface,
            arity,
            is_pure: true,
            type_factory,
            run,
        });
    };

    // ── Int arithmetic (Num/Integral dictionary methods) ────────────
    pure("std/prelude", "_add_Int", None, 2, || mono(vec![Ty::int(), Ty::int()], Ty::int()), |_, a| {
        Ok(Value::Int(arg_int(a, 0)?.wrapping_add(arg_int(a, 1)?)))
    });
    pure("std/prelude", "_sub_Int", None, 2, || mono(vec![Ty::int(), Ty::int()], Ty::int()), |_, a| {
        Ok(Value::Int(arg_int(a, 0)?.wrapping_sub(arg_int(a, 1)?)))
    });
    pure("std/prelude", "_mul_Int", None, 2, || mono(vec![Ty::int(), Ty::int()], Ty::int()), |_, a| {
        Ok(Value::Int(arg_int(a, 0)?.wrapping_mul(arg_int(a, 1)?)))
    });
    pure("std/prelude", "_div_Int", None, 2, || mono(vec![Ty::int(), Ty::int()], Ty::int()), |_, a| {
        let (x, y) = (arg_int(a, 0)?, arg_int(a, 1)?);
        if y == 0 {
            return Err(div_zero());
        }
        Ok(Value::Int(x.wrapping_div(y)))
    });
    pure("std/prelude", "_mod_Int", None, 2, || mono(vec![Ty::int(), Ty::int()], Ty::int()), |_, a| {
        let (x, y) = (arg_int(a, 0)?, arg_int(a, 1)?);
        if y == 0 {
            return Err(div_zero());
        }
        Ok(Value::Int(x.wrapping_rem(y)))
    });
    pure("std/prelude", "_neg_Int", None, 1, || mono(vec![Ty::int()], Ty::int()), |_, a| {
        Ok(Value::Int(arg_int(a, 0)?.wrapping_neg()))
    });

    // ── Float arithmetic ────────────────────────────────────────────
    pure("std/prelude", "_add_Float", None, 2, || mono(vec![Ty::float(), Ty::float()], Ty::float()), |_, a| {
        Ok(Value::Float(arg_float(a, 0)? + arg_float(a, 1)?))
    });
    pure("std/prelude", "_sub_Float", None, 2, || mono(vec![Ty::float(), Ty::float()], Ty::float()), |_, a| {
        Ok(Value::Float(arg_float(a, 0)? - arg_float(a, 1)?))
    });
    pure("std/prelude", "_mul_Float", None, 2, || mono(vec![Ty::float(), Ty::float()], Ty::float()), |_, a| {
        Ok(Value::Float(arg_float(a, 0)? * arg_float(a, 1)?))
    });
    pure("std/prelude", "_div_Float", None, 2, || mono(vec![Ty::float(), Ty::float()], Ty::float()), |_, a| {
        Ok(Value::Float(arg_float(a, 0)? / arg_float(a, 1)?))
    });
    pure("std/prelude", "_neg_Float", None, 1, || mono(vec![Ty::float()], Ty::float()), |_, a| {
        Ok(Value::Float(-arg_float(a, 0)?))
    });

    // ── Equality (Eq dictionary methods) ────────────────────────────
    pure("std/prelude", "_eq_Int", None, 2, || mono(vec![Ty::int(), Ty::int()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_int(a, 0)? == arg_int(a, 1)?))
    });
    pure("std/prelude", "_eq_Float", None, 2, || mono(vec![Ty::float(), Ty::float()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_float(a, 0)? == arg_float(a, 1)?))
    });
    pure("std/prelude", "_eq_Bool", None, 2, || mono(vec![Ty::bool(), Ty::bool()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_bool(a, 0)? == arg_bool(a, 1)?))
    });
    pure("std/prelude", "_eq_String", None, 2, || mono(vec![Ty::string(), Ty::string()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_str(a, 0)? == arg_str(a, 1)?))
    });
    pure("std/prelude", "_eq_Unit", None, 2, || mono(vec![Ty::unit(), Ty::unit()], Ty::bool()), |_, _| {
        Ok(Value::Bool(true))
    });

    // ── Ordering (Ord dictionary methods) ───────────────────────────
    pure("std/prelude", "_lt_Int", None, 2, || mono(vec![Ty::int(), Ty::int()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_int(a, 0)? < arg_int(a, 1)?))
    });
    pure("std/prelude", "_le_Int", None, 2, || mono(vec![Ty::int(), Ty::int()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_int(a, 0)? <= arg_int(a, 1)?))
    });
    pure("std/prelude", "_gt_Int", None, 2, || mono(vec![Ty::int(), Ty::int()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_int(a, 0)? > arg_int(a, 1)?))
    });
    pure("std/prelude", "_ge_Int", None, 2, || mono(vec![Ty::int(), Ty::int()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_int(a, 0)? >= arg_int(a, 1)?))
    });
    pure("std/prelude", "_lt_Float", None, 2, || mono(vec![Ty::float(), Ty::float()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_float(a, 0)? < arg_float(a, 1)?))
    });
    pure("std/prelude", "_le_Float", None, 2, || mono(vec![Ty::float(), Ty::float()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_float(a, 0)? <= arg_float(a, 1)?))
    });
    pure("std/prelude", "_gt_Float", None, 2, || mono(vec![Ty::float(), Ty::float()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_float(a, 0)? > arg_float(a, 1)?))
    });
    pure("std/prelude", "_ge_Float", None, 2, || mono(vec![Ty::float(), Ty::float()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_float(a, 0)? >= arg_float(a, 1)?))
    });
    pure("std/prelude", "_lt_String", None, 2, || mono(vec![Ty::string(), Ty::string()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_str(a, 0)? < arg_str(a, 1)?))
    });
    pure("std/prelude", "_le_String", None, 2, || mono(vec![Ty::string(), Ty::string()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_str(a, 0)? <= arg_str(a, 1)?))
    });
    pure("std/prelude", "_gt_String", None, 2, || mono(vec![Ty::string(), Ty::string()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_str(a, 0)? > arg_str(a, 1)?))
    });
    pure("std/prelude", "_ge_String", None, 2, || mono(vec![Ty::string(), Ty::string()], Ty::bool()), |_, a| {
        Ok(Value::Bool(arg_str(a, 0)? >= arg_str(a, 1)?))
    });

    // ── Strings ─────────────────────────────────────────────────────
    pure("std/prelude", "_concat_String", None, 2, || mono(vec![Ty::string(), Ty::string()], Ty::string()), |_, a| {
        Ok(Value::str(format!("{}{}", arg_str(a, 0)?, arg_str(a, 1)?)))
    });
    pure("std/string", "_str_len", Some("length"), 1, || mono(vec![Ty::string()], Ty::int()), |_, a| {
        Ok(Value::Int(arg_str(a, 0)?.chars().count() as i64))
    });
    pure("std/string", "_str_slice", Some("slice"), 3, || mono(vec![Ty::string(), Ty::int(), Ty::int()], Ty::string()), |_, a| {
        let s = arg_str(a, 0)?;
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len() as i64;
        let start = arg_int(a, 1)?.clamp(0, len) as usize;
        let end = arg_int(a, 2)?.clamp(0, len) as usize;
        if start >= end {
            return Ok(Value::str(""));
        }
        Ok(Value::str(chars[start..end].iter().collect::<String>()))
    });

    // ── Conversions ─────────────────────────────────────────────────
    pure("std/prelude", "_int_to_float", Some("intToFloat"), 1, || mono(vec![Ty::int()], Ty::float()), |_, a| {
        Ok(Value::Float(arg_int(a, 0)? as f64))
    });
    pure("std/prelude", "_float_to_int", Some("floatToInt"), 1, || mono(vec![Ty::float()], Ty::int()), |_, a| {
        Ok(Value::Int(arg_float(a, 0)?.trunc() as i64))
    });

    // ── show ────────────────────────────────────────────────────────
    pure("std/prelude", "_show", Some("show"), 1, show_scheme, |_, a| {
        Ok(Value::str(a[0].show()?))
    });

    // ── JSON ────────────────────────────────────────────────────────
    pure("std/json", "_json_encode", Some("encode"), 1, || mono(vec![json_ty()], Ty::string()), |_, a| {
        let value = json_from_value(&a[0])?;
        Ok(Value::str(json::encode(&value)))
    });
    pure("std/json", "_json_decode", Some("decode"), 1, || mono(vec![Ty::string()], result_ty(json_ty(), Ty::string())), |_, a| {
        match json::decode(arg_str(a, 0)?) {
            Ok(value) => Ok(Value::ok(json_to_value(&value))),
            Err(e) => Ok(Value::err(e.to_string())),
        }
    });

    drop(pure);

    let mut impure = |module: &'static str,
                      name: &'static str,
                      surface: Option<&'static str>,
                      arity: usize,
                      type_factory: fn() -> Scheme,
                      run: BuiltinImpl| {
        specs.push(BuiltinSpec {
            module,
            name,
            surface_name: surface,
            arity,
            is_pure: false,
            type_factory,
            run,
        });
    };

    // ── IO ──────────────────────────────────────────────────────────
    impure("std/io", "_io_print", Some("print"), 1, || effectful(vec![Ty::string()], "IO", Ty::unit()), |ctx, a| {
        io::print(ctx, arg_str(a, 0)?)?;
        Ok(Value::Unit)
    });
    impure("std/io", "_io_println", Some("println"), 1, || effectful(vec![Ty::string()], "IO", Ty::unit()), |ctx, a| {
        io::println(ctx, arg_str(a, 0)?)?;
        Ok(Value::Unit)
    });
    impure("std/io", "_io_readLine", Some("readLine"), 0, || effectful(vec![], "IO", Ty::string()), |ctx, _| {
        Ok(Value::str(io::read_line(ctx)?))
    });

    // ── FS ──────────────────────────────────────────────────────────
    impure("std/fs", "_fs_readFile", Some("readFile"), 1, || effectful(vec![Ty::string()], "FS", result_ty(Ty::string(), Ty::string())), |ctx, a| {
        Ok(match fs::read_file(ctx, arg_str(a, 0)?)? {
            Ok(contents) => Value::ok(Value::str(contents)),
            Err(message) => Value::err(message),
        })
    });
    impure("std/fs", "_fs_writeFile", Some("writeFile"), 2, || effectful(vec![Ty::string(), Ty::string()], "FS", result_ty(Ty::unit(), Ty::string())), |ctx, a| {
        Ok(match fs::write_file(ctx, arg_str(a, 0)?, arg_str(a, 1)?)? {
            Ok(()) => Value::ok(Value::Unit),
            Err(message) => Value::err(message),
        })
    });
    impure("std/fs", "_fs_exists", Some("exists"), 1, || effectful(vec![Ty::string()], "FS", Ty::bool()), |ctx, a| {
        Ok(Value::Bool(fs::exists(ctx, arg_str(a, 0)?)?))
    });

    // ── Clock ───────────────────────────────────────────────────────
    impure("std/clock", "_clock_now", Some("now"), 0, || effectful(vec![], "Clock", Ty::int()), |ctx, _| {
        Ok(Value::Int(clock::now(ctx)?))
    });
    impure("std/clock", "_clock_sleep", Some("sleep"), 1, || effectful(vec![Ty::int()], "Clock", Ty::unit()), |ctx, a| {
        clock::sleep(ctx, arg_int(a, 0)?)?;
        Ok(Value::Unit)
    });

    // ── Net ─────────────────────────────────────────────────────────
    impure("std/net", "_net_httpRequest", Some("httpRequest"), 4, || {
        effectful(
            vec![Ty::string(), Ty::string(), header_list_ty(), Ty::string()],
            "Net",
            result_ty(http_response_ty(), Ty::string()),
        )
    }, |ctx, a| {
        let method = arg_str(a, 0)?;
        let url = arg_str(a, 1)?;
        let headers = headers_from_value(&a[2])?;
        let body = arg_str(a, 3)?;
        Ok(match net::http_request(ctx, method, url, &headers, body)? {
            Ok(HttpResponse { status, body }) => Value::ok(Value::record(vec![
                ("status".to_string(), Value::Int(status as i64)),
                ("body".to_string(), Value::str(body)),
            ])),
            Err(message) => Value::err(message),
        })
    });

    specs
}

// ── Json ⇄ Value bridging ───────────────────────────────────────────────

/// Convert a language-level `Json` constructor tree into the canonical
/// JSON value. Rejects non-finite numbers (they have no JSON form).
pub fn json_from_value(value: &Value) -> Result<Json, Diagnostic> {
    let Value::Ctor { name, args } = value else {
        return Err(type_err("Json", value));
    };
    match (name.as_str(), args.as_slice()) {
        ("JNull", []) => Ok(Json::Null),
        ("JBool", [Value::Bool(b)]) => Ok(Json::Bool(*b)),
        ("JNumber", [Value::Float(f)]) => {
            if !f.is_finite() {
                return Err(Diagnostic::new(
                    Code::RtType,
                    format!("{} has no JSON representation", format_float(*f)),
                ));
            }
            Ok(Json::Number(*f))
        }
        ("JString", [Value::Str(s)]) => Ok(Json::String(s.as_ref().clone())),
        ("JArray", [Value::List(items)]) => {
            let converted: Result<Vec<Json>, Diagnostic> =
                items.iter().map(json_from_value).collect();
            Ok(Json::Array(converted?))
        }
        ("JObject", [Value::List(fields)]) => {
            let mut out = Vec::with_capacity(fields.len());
            for field in fields.iter() {
                let Value::Ctor { name, args } = field else {
                    return Err(type_err("JField", field));
                };
                match (name.as_str(), args.as_slice()) {
                    ("JField", [Value::Str(key), val]) => {
                        out.push((key.as_ref().clone(), json_from_value(val)?));
                    }
                    _ => return Err(type_err("JField", field)),
                }
            }
            Ok(Json::Object(out))
        }
        _ => Err(type_err("Json", value)),
    }
}

/// Convert a canonical JSON value into the language-level constructor
/// tree, preserving object key order.
pub fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::ctor("JNull", vec![]),
        Json::Bool(b) => Value::ctor("JBool", vec![Value::Bool(*b)]),
        Json::Number(n) => Value::ctor("JNumber", vec![Value::Float(*n)]),
        Json::String(s) => Value::ctor("JString", vec![Value::str(s.clone())]),
        Json::Array(items) => Value::ctor(
            "JArray",
            vec![Value::list(items.iter().map(json_to_value).collect())],
        ),
        Json::Object(fields) => Value::ctor(
            "JObject",
            vec![Value::list(
                fields
                    .iter()
                    .map(|(k, v)| {
                        Value::ctor("JField", vec![Value::str(k.clone()), json_to_value(v)])
                    })
                    .collect(),
            )],
        ),
    }
}

fn headers_from_value(value: &Value) -> Result<Vec<(String, String)>, Diagnostic> {
    let Value::List(items) = value else {
        return Err(type_err("List of headers", value));
    };
    let mut headers = Vec::with_capacity(items.len());
    for item in items.iter() {
        let (Some(Value::Str(name)), Some(Value::Str(val))) =
            (item.field("name"), item.field("value"))
        else {
            return Err(type_err("{name: String, value: String}", item));
        };
        headers.push((name.as_ref().clone(), val.as_ref().clone()));
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::RunEnv;

    fn sink_context() -> EffContext {
        EffContext::new(
            RunEnv::default(),
            Box::new(Vec::new()),
            Box::new(std::io::Cursor::new(Vec::new())),
        )
    }

    #[test]
    fn registry_validates_clean() {
        let problems = registry().validate();
        assert!(problems.is_empty(), "doctor found: {:?}", problems);
    }

    #[test]
    fn every_dictionary_method_the_elaborator_can_emit_exists() {
        let reg = registry();
        for ty in ["Int", "Float"] {
            for method in ["add", "sub", "mul", "div", "neg", "eq"] {
                let name = format!("_{}_{}", method, ty);
                assert!(reg.get(&name).is_some(), "missing builtin {}", name);
            }
        }
        for ty in ["Int", "Float", "String"] {
            for method in ["lt", "le", "gt", "ge"] {
                let name = format!("_{}_{}", method, ty);
                assert!(reg.get(&name).is_some(), "missing builtin {}", name);
            }
        }
        for name in ["_mod_Int", "_eq_Bool", "_eq_String", "_eq_Unit", "_concat_String"] {
            assert!(reg.get(name).is_some(), "missing builtin {}", name);
        }
    }

    #[test]
    fn arithmetic_dispatches() {
        let ctx = sink_context();
        let reg = registry();
        let v = reg
            .call("_add_Int", &ctx, &[Value::Int(40), Value::Int(2)])
            .unwrap();
        assert!(matches!(v, Value::Int(42)));
        let v = reg
            .call("_mul_Float", &ctx, &[Value::Float(2.5), Value::Float(4.0)])
            .unwrap();
        assert!(matches!(v, Value::Float(f) if f == 10.0));
    }

    #[test]
    fn integer_division_by_zero_is_structured() {
        let ctx = sink_context();
        let err = registry()
            .call("_div_Int", &ctx, &[Value::Int(1), Value::Int(0)])
            .unwrap_err();
        assert_eq!(err.code, Code::RtDivZero);
        let err = registry()
            .call("_mod_Int", &ctx, &[Value::Int(1), Value::Int(0)])
            .unwrap_err();
        assert_eq!(err.code, Code::RtDivZero);
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let ctx = sink_context();
        let err = registry().call("_add_Int", &ctx, &[Value::Int(1)]).unwrap_err();
        assert_eq!(err.code, Code::RtType);
    }

    #[test]
    fn show_formats_primitives() {
        let ctx = sink_context();
        let reg = registry();
        let cases = [
            (Value::Int(42), "42"),
            (Value::Bool(true), "true"),
            (Value::Float(3.14), "3.14"),
            (Value::str("plain"), "plain"),
        ];
        for (input, expected) in cases {
            let out = reg.call("_show", &ctx, &[input]).unwrap();
            match out {
                Value::Str(s) => assert_eq!(s.as_str(), expected),
                other => panic!("show returned {:?}", other),
            }
        }
    }

    #[test]
    fn str_slice_clamps_and_counts_chars() {
        let ctx = sink_context();
        let reg = registry();
        let out = reg
            .call(
                "_str_slice",
                &ctx,
                &[Value::str("héllo"), Value::Int(1), Value::Int(3)],
            )
            .unwrap();
        assert!(matches!(out, Value::Str(s) if s.as_str() == "él"));
        let out = reg
            .call(
                "_str_slice",
                &ctx,
                &[Value::str("ab"), Value::Int(-5), Value::Int(99)],
            )
            .unwrap();
        assert!(matches!(out, Value::Str(s) if s.as_str() == "ab"));
    }

    #[test]
    fn json_round_trips_through_the_value_bridge() {
        let ctx = sink_context();
        let reg = registry();
        let text = r#"[{"k":1},{"k":2}]"#;
        let decoded = reg
            .call("_json_decode", &ctx, &[Value::str(text)])
            .unwrap();
        let Value::Ctor { name, args } = &decoded else {
            panic!("expected Ok ctor");
        };
        assert_eq!(name.as_str(), "Ok");
        let encoded = reg
            .call("_json_encode", &ctx, &[args[0].clone()])
            .unwrap();
        assert!(matches!(encoded, Value::Str(s) if s.as_str() == text));
    }

    #[test]
    fn json_decode_failure_is_a_language_err() {
        let ctx = sink_context();
        let out = registry()
            .call("_json_decode", &ctx, &[Value::str("{nope")])
            .unwrap();
        assert!(matches!(out, Value::Ctor { name, .. } if name.as_str() == "Err"));
    }

    #[test]
    fn effectful_builtins_gate_on_capabilities() {
        let ctx = sink_context();
        let err = registry()
            .call("_io_println", &ctx, &[Value::str("hi")])
            .unwrap_err();
        assert_eq!(err.code, Code::CapMissing);
        assert_eq!(err.hint.as_deref(), Some("Run with --caps IO"));
    }

    #[test]
    fn pure_builtins_never_need_capabilities() {
        // No grants at all: every pure builtin must still work.
        let ctx = sink_context();
        assert!(registry()
            .call("_eq_String", &ctx, &[Value::str("a"), Value::str("a")])
            .is_ok());
    }
}
