//! The driver: wires parse → infer → elaborate → load → preflight → run.
//!
//! Exposed as a library so the CLI is a thin shell and the scenario tests
//! drive the whole pipeline in-process with a captured stdout.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use ailang_common::{json, Code, Diagnostic, Json};
use ailang_syntax::parse_module;
use ailang_typeck::ty::Ty;

use crate::builtins::json_to_value;
use crate::effects::{EffContext, RunEnv};
use crate::eval::Evaluator;
use crate::loader::{Loader, LoadErrors, ModuleResolver};
use crate::value::Value;

/// Everything one run needs, resolved from flags and environment before
/// the pipeline starts. No other configuration channel exists.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub entry: String,
    pub args_json: Option<String>,
    pub caps: Vec<String>,
    pub auto_caps: bool,
    pub net_allow: Vec<String>,
    pub net_max_bytes: usize,
    pub fs_sandbox: Option<PathBuf>,
    pub seed: i64,
    pub tz: String,
    pub locale: String,
    pub no_prelude: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            entry: "main".to_string(),
            args_json: None,
            caps: Vec::new(),
            auto_caps: false,
            net_allow: Vec::new(),
            net_max_bytes: 5 * 1024 * 1024,
            fs_sandbox: None,
            seed: 0,
            tz: "UTC".to_string(),
            locale: "C".to_string(),
            no_prelude: false,
        }
    }
}

impl RunConfig {
    /// Layer environment variables under the flag values: a flag that was
    /// set explicitly wins, the environment fills the rest.
    pub fn apply_env(mut self) -> Self {
        if self.seed == 0 {
            if let Ok(seed) = std::env::var("AILANG_SEED") {
                self.seed = seed.parse().unwrap_or(0);
            }
        }
        if let Ok(tz) = std::env::var("TZ") {
            self.tz = tz;
        }
        if let Ok(lang) = std::env::var("LANG") {
            self.locale = lang;
        }
        if self.fs_sandbox.is_none() {
            if let Ok(dir) = std::env::var("AILANG_FS_SANDBOX") {
                self.fs_sandbox = Some(PathBuf::from(dir));
            }
        }
        if std::env::var("AILANG_AUTO_CAPS").as_deref() == Ok("1") {
            self.auto_caps = true;
        }
        if std::env::var("AILANG_NO_PRELUDE").as_deref() == Ok("1") {
            self.no_prelude = true;
        }
        self
    }

    fn build_context(&self, stdout: Box<dyn Write>, stdin: Box<dyn BufRead>) -> EffContext {
        let mut env = RunEnv::new(self.seed, self.tz.clone(), self.locale.clone());
        env.sandbox_dir = self.fs_sandbox.clone();
        env.net.allow = self.net_allow.clone();
        env.net.max_bytes = self.net_max_bytes;
        let ctx = EffContext::new(env, stdout, stdin);
        for cap in &self.caps {
            ctx.grant(cap);
        }
        ctx
    }
}

/// Run the module at `module_path` (resolvable through `resolver`) and
/// invoke its entrypoint. Program output and the printed result go to
/// `stdout`.
pub fn run_with_resolver(
    resolver: &dyn ModuleResolver,
    module_path: &str,
    config: &RunConfig,
    stdout: Box<dyn Write>,
    stdin: Box<dyn BufRead>,
) -> Result<(), LoadErrors> {
    let ctx = config.build_context(stdout, stdin);
    let mut loader = Loader::new(resolver, config.no_prelude);
    let instance = loader.load_and_evaluate(module_path, &ctx)?;

    // Entrypoint lookup: interface first (arity and argument type), value
    // second.
    let Some(scheme) = instance.interface_scheme(&config.entry) else {
        return Err(vec![Diagnostic::new(
            Code::ModEntryNotFound,
            format!(
                "module `{}` does not export an entrypoint named `{}`",
                module_path, config.entry
            ),
        )]);
    };
    let Ty::Fun {
        params, effects, ..
    } = &scheme.ty
    else {
        return Err(vec![Diagnostic::new(
            Code::ModEntryNotFound,
            format!("`{}` is not a function", config.entry),
        )]);
    };

    // Preflight: the entrypoint's effect row names the capabilities the
    // run needs. Fail fast with the exact grant hint, or auto-grant.
    let required: Vec<String> = effects.row_labels().iter().map(|s| s.to_string()).collect();
    let missing: Vec<String> = required
        .iter()
        .filter(|e| !ctx.has(e))
        .cloned()
        .collect();
    if !missing.is_empty() {
        if config.auto_caps {
            for effect in &missing {
                ctx.grant(effect);
            }
        } else {
            return Err(vec![Diagnostic::new(
                Code::CapMissing,
                format!(
                    "entrypoint `{}` declares effects {{{}}} but {{{}}} {} not granted",
                    config.entry,
                    required.join(", "),
                    missing.join(", "),
                    if missing.len() == 1 { "was" } else { "were" },
                ),
            )
            .with_hint(format!("Run with --caps {}", missing.join(",")))]);
        }
    }

    let args = match params.len() {
        0 => Vec::new(),
        1 => {
            let Some(raw) = &config.args_json else {
                return Err(vec![Diagnostic::new(
                    Code::ModArity,
                    format!("entrypoint `{}` takes an argument", config.entry),
                )
                .with_hint("pass it with --args-json")]);
            };
            let decoded = json::decode(raw).map_err(|e| {
                vec![Diagnostic::new(Code::JsonDecode, format!("invalid --args-json: {}", e))]
            })?;
            vec![json_arg_to_value(&decoded, &params[0]).map_err(|d| vec![d])?]
        }
        n => {
            return Err(vec![Diagnostic::new(
                Code::ModArity,
                format!(
                    "entrypoint `{}` takes {} arguments; only arity 0 or 1 is supported",
                    config.entry, n
                ),
            )])
        }
    };

    let entry_value = instance.export(&config.entry).ok_or_else(|| {
        vec![Diagnostic::new(
            Code::ModEntryNotFound,
            format!("entrypoint `{}` has no runtime binding", config.entry),
        )]
    })?;

    let evaluator = Evaluator::new(&ctx);
    let result = evaluator
        .apply(entry_value, args, ailang_common::Span::DUMMY)
        .map_err(|d| vec![d])?;

    if !matches!(result, Value::Unit) {
        ctx.write_stdout(&format!("{}\n", result.render()))
            .map_err(|d| vec![d])?;
    }
    Ok(())
}

/// Run a module given its file path: the source root is derived by
/// stripping the declared module path from the file path, so sibling
/// imports resolve next to it.
pub fn run_file(
    file: &Path,
    config: &RunConfig,
    stdout: Box<dyn Write>,
    stdin: Box<dyn BufRead>,
) -> Result<(), LoadErrors> {
    let source = std::fs::read_to_string(file).map_err(|e| {
        vec![Diagnostic::new(
            Code::GlobalUndefined,
            format!("cannot read `{}`: {}", file.display(), e),
        )]
    })?;
    let parsed = parse_module(&source);
    if !parsed.errors.is_empty() {
        return Err(parsed.errors);
    }
    let Some(module) = parsed.module else {
        return Err(vec![Diagnostic::new(
            Code::ParUnexpected,
            format!("`{}` is not a module", file.display()),
        )]);
    };

    let resolver = FileRootResolver::new(file, &module.path, source);
    run_with_resolver(&resolver, &module.path, config, stdout, stdin)
}

/// Serves the root module from the file the user named, and everything
/// else from the derived source root.
struct FileRootResolver {
    primary_path: String,
    primary_source: String,
    root: PathBuf,
}

impl FileRootResolver {
    fn new(file: &Path, declared: &str, source: String) -> Self {
        // /src/t/fib.ail declaring `module t/fib` has source root /src.
        let mut root = file.parent().unwrap_or(Path::new(".")).to_path_buf();
        let segments = declared.split('/').count();
        for _ in 1..segments {
            if let Some(parent) = root.parent() {
                root = parent.to_path_buf();
            }
        }
        FileRootResolver {
            primary_path: declared.to_string(),
            primary_source: source,
            root,
        }
    }
}

impl ModuleResolver for FileRootResolver {
    fn load_source(&self, path: &str) -> Option<String> {
        if path == self.primary_path {
            return Some(self.primary_source.clone());
        }
        std::fs::read_to_string(self.root.join(format!("{}.ail", path))).ok()
    }
}

// ── JSON argument decoding ──────────────────────────────────────────────

/// Decode a JSON document into a runtime value, guided by the entrypoint
/// parameter's type from the interface.
pub fn json_arg_to_value(json_value: &Json, ty: &Ty) -> Result<Value, Diagnostic> {
    let fail = |expected: &str| {
        Err(Diagnostic::new(
            Code::JsonDecode,
            format!(
                "cannot decode `{}` as {}",
                json::encode(json_value),
                expected
            ),
        ))
    };
    match ty {
        Ty::Con(con) => match (con.name.as_str(), json_value) {
            ("Int", Json::Number(n)) if n.fract() == 0.0 => Ok(Value::Int(*n as i64)),
            ("Int", _) => fail("Int"),
            ("Float", Json::Number(n)) => Ok(Value::Float(*n)),
            ("Float", _) => fail("Float"),
            ("String", Json::String(s)) => Ok(Value::str(s.clone())),
            ("String", _) => fail("String"),
            ("Bool", Json::Bool(b)) => Ok(Value::Bool(*b)),
            ("Bool", _) => fail("Bool"),
            ("Unit", Json::Null) => Ok(Value::Unit),
            ("Unit", _) => fail("()"),
            ("Json", _) => Ok(json_to_value(json_value)),
            (other, _) => fail(other),
        },
        Ty::App(con, args) => match (con.as_ref(), json_value) {
            (Ty::Con(c), Json::Array(items)) if c.name == "List" && args.len() == 1 => {
                let converted: Result<Vec<Value>, Diagnostic> = items
                    .iter()
                    .map(|item| json_arg_to_value(item, &args[0]))
                    .collect();
                Ok(Value::list(converted?))
            }
            (Ty::Con(c), Json::Null) if c.name == "Option" => {
                Ok(Value::ctor("None", vec![]))
            }
            (Ty::Con(c), _) if c.name == "Option" && args.len() == 1 => Ok(Value::ctor(
                "Some",
                vec![json_arg_to_value(json_value, &args[0])?],
            )),
            _ => fail(&format!("{}", ty)),
        },
        Ty::Record(row) => {
            let Json::Object(_) = json_value else {
                return fail("a record");
            };
            let mut fields = Vec::new();
            let mut remaining = row.as_ref();
            loop {
                match remaining {
                    Ty::RowExtend {
                        label, field, tail, ..
                    } => {
                        let Some(field_json) = json_value.get(label) else {
                            return fail(&format!("a record with field `{}`", label));
                        };
                        fields.push((label.clone(), json_arg_to_value(field_json, field)?));
                        remaining = tail;
                    }
                    _ => break,
                }
            }
            Ok(Value::record(fields))
        }
        _ => fail(&format!("{}", ty)),
    }
}

/// A writer that appends to a shared buffer. The scenario tests use this
/// to observe program output in-process; it is `Send` so runs can happen
/// on a dedicated large-stack thread (see [`run_on_eval_thread`]).
#[derive(Clone, Default)]
pub struct SharedWriter(pub std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("writer lock")).into_owned()
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("writer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Stack reserved for evaluation. The depth guard caps user recursion at
/// 10k frames; this keeps the host stack from being the real limit.
pub const EVAL_STACK_BYTES: usize = 256 * 1024 * 1024;

/// Run a closure on a thread with a large stack and wait for it. The
/// evaluator's recursion guard, not the OS, should decide when a program
/// is too deep.
pub fn run_on_eval_thread<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    std::thread::Builder::new()
        .name("ailang-eval".to_string())
        .stack_size(EVAL_STACK_BYTES)
        .spawn(f)
        .expect("spawning the evaluation thread")
        .join()
        .expect("evaluation thread completed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_int_requires_an_integral_number() {
        assert!(json_arg_to_value(&Json::Number(41.0), &Ty::int()).is_ok());
        assert!(json_arg_to_value(&Json::Number(41.5), &Ty::int()).is_err());
        assert!(json_arg_to_value(&Json::String("41".into()), &Ty::int()).is_err());
    }

    #[test]
    fn json_list_and_record_decode_structurally() {
        let list = Json::Array(vec![Json::Number(1.0), Json::Number(2.0)]);
        let v = json_arg_to_value(&list, &Ty::list(Ty::int())).unwrap();
        assert!(matches!(v, Value::List(items) if items.len() == 2));

        let record = Json::Object(vec![
            ("x".to_string(), Json::Number(1.0)),
            ("y".to_string(), Json::String("s".into())),
        ]);
        let ty = Ty::record(vec![("x", Ty::int()), ("y", Ty::string())]);
        let v = json_arg_to_value(&record, &ty).unwrap();
        assert!(matches!(v.field("x"), Some(Value::Int(1))));
    }

    #[test]
    fn json_option_uses_null_for_none() {
        let option_int = Ty::App(
            Box::new(Ty::Con(ailang_typeck::TyCon::new("Option"))),
            vec![Ty::int()],
        );
        let none = json_arg_to_value(&Json::Null, &option_int).unwrap();
        assert!(matches!(none, Value::Ctor { name, .. } if name.as_str() == "None"));
        let some = json_arg_to_value(&Json::Number(3.0), &option_int).unwrap();
        assert!(matches!(some, Value::Ctor { name, .. } if name.as_str() == "Some"));
    }

    #[test]
    fn missing_record_field_is_a_decode_error() {
        let record = Json::Object(vec![("x".to_string(), Json::Number(1.0))]);
        let ty = Ty::record(vec![("x", Ty::int()), ("y", Ty::string())]);
        let err = json_arg_to_value(&record, &ty).unwrap_err();
        assert_eq!(err.code, Code::JsonDecode);
    }
}
