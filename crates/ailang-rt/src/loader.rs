//! Module runtime: loading, ordering, evaluating, and caching modules.
//!
//! The protocol for `load_and_evaluate(path)`:
//!
//! 1. Cached instances return immediately — the same value or the same
//!    init error every time (init-once).
//! 2. Otherwise the source is resolved and parsed, a fresh instance goes
//!    into the cache *before* recursing, and the path joins the visiting
//!    stack. An import already on that stack is a cycle, reported with the
//!    exact chain `A → B → … → A`.
//! 3. Imports load recursively; the module then type-checks against their
//!    interfaces and elaborates to Core.
//! 4. Evaluation runs per the dependency graph's topological order
//!    (alphabetical tie-breaks), binding each module's top-level `letrec`
//!    group and filtering exports from bindings by the interface's export
//!    set. Cross-module references resolve through `import_refs` → exports
//!    only, so non-exported bindings stay invisible.
//!
//! Pseudo-modules (`std/io`, `std/prelude`, …) materialize from the
//! builtin registry; `std/prelude` is wired into every module's imports so
//! `show` and friends resolve without an explicit import.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use ailang_common::{Code, Diagnostic};
use ailang_elab::{elaborate_module, CoreDecl, CoreModule};
use ailang_syntax::parse_module;
use ailang_typeck::ty::Scheme;
use ailang_typeck::{check_module, InstanceTable};
use rustc_hash::FxHashMap;

use crate::builtins::registry;
use crate::effects::EffContext;
use crate::eval::Evaluator;
use crate::graph::{topological_sort, ModuleGraph};
use crate::value::Value;

/// Aggregated failures from one load; phase boundaries report all of them.
pub type LoadErrors = Vec<Diagnostic>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InitState {
    /// Loaded (or loading); not yet evaluated.
    Pending,
    Done,
    Failed,
}

/// One loaded module. Created before its imports recurse, filled in as the
/// pipeline stages complete, evaluated exactly once.
pub struct ModuleInstance {
    pub path: String,
    pub imports: RefCell<Vec<String>>,
    /// Type-level exports: name → scheme.
    pub interface: RefCell<FxHashMap<String, Scheme>>,
    /// Elaborated declarations, consumed by evaluation.
    pub core: RefCell<Option<CoreModule>>,
    /// All top-level value bindings.
    pub bindings: RefCell<FxHashMap<String, Value>>,
    /// The subset of bindings named by the export set.
    pub exports: RefCell<FxHashMap<String, Value>>,
    /// Instances of imported modules, keyed by path.
    pub import_refs: RefCell<FxHashMap<String, Rc<ModuleInstance>>>,
    state: Cell<InitState>,
    init_error: RefCell<Option<LoadErrors>>,
}

impl ModuleInstance {
    fn new(path: &str) -> Rc<Self> {
        Rc::new(ModuleInstance {
            path: path.to_string(),
            imports: RefCell::new(Vec::new()),
            interface: RefCell::new(FxHashMap::default()),
            core: RefCell::new(None),
            bindings: RefCell::new(FxHashMap::default()),
            exports: RefCell::new(FxHashMap::default()),
            import_refs: RefCell::new(FxHashMap::default()),
            state: Cell::new(InitState::Pending),
            init_error: RefCell::new(None),
        })
    }

    pub fn export(&self, name: &str) -> Option<Value> {
        self.exports.borrow().get(name).cloned()
    }

    pub fn interface_scheme(&self, name: &str) -> Option<Scheme> {
        self.interface.borrow().get(name).cloned()
    }

    /// Resolve a `GlobalRef` through this module's imports. Non-exported
    /// names of the target module are invisible by construction.
    pub fn resolve_global(&self, module: &str, name: &str) -> Result<Value, Diagnostic> {
        let refs = self.import_refs.borrow();
        let Some(target) = refs.get(module) else {
            return Err(Diagnostic::new(
                Code::GlobalUndefined,
                format!("module `{}` is not imported by `{}`", module, self.path),
            ));
        };
        target.export(name).ok_or_else(|| {
            Diagnostic::new(
                Code::GlobalUndefined,
                format!("`{}` is not exported by module `{}`", name, module),
            )
        })
    }

    fn fail(&self, errors: LoadErrors) -> LoadErrors {
        self.state.set(InitState::Failed);
        *self.init_error.borrow_mut() = Some(errors.clone());
        errors
    }
}

/// Maps module paths to source text. The production resolver reads
/// `<root>/<path>.ail`; tests provide in-memory maps.
pub trait ModuleResolver {
    fn load_source(&self, path: &str) -> Option<String>;
}

pub struct FsResolver {
    pub root: PathBuf,
}

impl ModuleResolver for FsResolver {
    fn load_source(&self, path: &str) -> Option<String> {
        let file = self.root.join(format!("{}.ail", path));
        std::fs::read_to_string(file).ok()
    }
}

/// In-memory resolver for tests and tooling.
#[derive(Default)]
pub struct MapResolver {
    pub sources: FxHashMap<String, String>,
}

impl MapResolver {
    pub fn add(&mut self, path: &str, source: &str) {
        self.sources.insert(path.to_string(), source.to_string());
    }
}

impl ModuleResolver for MapResolver {
    fn load_source(&self, path: &str) -> Option<String> {
        self.sources.get(path).cloned()
    }
}

/// The loader: cache, visiting stack, dependency graph, and the class
/// instance table the type checker runs with.
pub struct Loader<'r> {
    resolver: &'r dyn ModuleResolver,
    instances: FxHashMap<String, Rc<ModuleInstance>>,
    visiting: Vec<String>,
    class_instances: InstanceTable,
    graph: ModuleGraph,
}

impl<'r> Loader<'r> {
    pub fn new(resolver: &'r dyn ModuleResolver, no_prelude: bool) -> Self {
        Loader {
            resolver,
            instances: FxHashMap::default(),
            visiting: Vec::new(),
            class_instances: if no_prelude {
                InstanceTable::empty()
            } else {
                InstanceTable::prelude()
            },
            graph: ModuleGraph::new(),
        }
    }

    /// Load the module tree rooted at `path`, then evaluate every loaded
    /// module in topological order. Idempotent per loader.
    pub fn load_and_evaluate(
        &mut self,
        path: &str,
        ctx: &EffContext,
    ) -> Result<Rc<ModuleInstance>, LoadErrors> {
        self.load(path)?;
        self.evaluate_all(ctx)?;
        Ok(Rc::clone(&self.instances[path]))
    }

    // ── Load phase: parse, recurse, type-check, elaborate ───────────────

    fn load(&mut self, path: &str) -> Result<Rc<ModuleInstance>, LoadErrors> {
        // A path on the visiting stack means we walked back into a module
        // whose imports are still being loaded: a cycle.
        if let Some(pos) = self.visiting.iter().position(|p| p == path) {
            let mut chain: Vec<&str> = self.visiting[pos..].iter().map(String::as_str).collect();
            chain.push(path);
            return Err(vec![Diagnostic::new(
                Code::ImportCycle,
                format!("import cycle: {}", chain.join(" → ")),
            )]);
        }

        if let Some(instance) = self.instances.get(path) {
            return match instance.state.get() {
                InitState::Failed => Err(instance
                    .init_error
                    .borrow()
                    .clone()
                    .unwrap_or_default()),
                _ => Ok(Rc::clone(instance)),
            };
        }

        if path.starts_with("std/") {
            return self.load_std_module(path);
        }

        let Some(source) = self.resolver.load_source(path) else {
            return Err(vec![Diagnostic::new(
                Code::GlobalUndefined,
                format!("module `{}` not found", path),
            )]);
        };

        let parsed = parse_module(&source);
        if !parsed.errors.is_empty() {
            return Err(parsed.errors);
        }
        let Some(module) = parsed.module else {
            return Err(vec![Diagnostic::new(
                Code::ParUnexpected,
                format!("`{}` is not a module", path),
            )]);
        };
        if module.path != path {
            return Err(vec![Diagnostic::new(
                Code::ParUnexpected,
                format!(
                    "file for `{}` declares `module {}`",
                    path, module.path
                ),
            )]);
        }

        // Cache before recursing; push onto the visiting stack.
        let instance = ModuleInstance::new(path);
        self.instances.insert(path.to_string(), Rc::clone(&instance));
        let graph_id = self.graph.add_module(path);
        self.visiting.push(path.to_string());

        let mut import_interfaces: FxHashMap<String, FxHashMap<String, Scheme>> =
            FxHashMap::default();
        for import in &module.imports {
            match self.load(&import.module) {
                Ok(child) => {
                    let child_id = self.graph.add_module(&import.module);
                    self.graph.add_dependency(graph_id, child_id);
                    import_interfaces
                        .insert(import.module.clone(), child.interface.borrow().clone());
                    instance
                        .import_refs
                        .borrow_mut()
                        .insert(import.module.clone(), child);
                }
                Err(errors) => {
                    self.visiting.pop();
                    return Err(instance.fail(errors));
                }
            }
        }

        // The prelude is an implicit import of every module.
        match self.load("std/prelude") {
            Ok(prelude) => {
                let prelude_id = self.graph.add_module("std/prelude");
                self.graph.add_dependency(graph_id, prelude_id);
                instance
                    .import_refs
                    .borrow_mut()
                    .insert("std/prelude".to_string(), prelude);
            }
            Err(errors) => {
                self.visiting.pop();
                return Err(instance.fail(errors));
            }
        }
        self.visiting.pop();

        let prelude_interface = self.instances["std/prelude"].interface.borrow().clone();
        let tcx = check_module(
            &module,
            &import_interfaces,
            &prelude_interface,
            &self.class_instances,
        );
        if !tcx.errors.is_empty() {
            return Err(instance.fail(tcx.errors));
        }

        let elab = elaborate_module(&module, &tcx);
        if !elab.errors.is_empty() {
            return Err(instance.fail(elab.errors));
        }

        *instance.imports.borrow_mut() = elab.module.imports.clone();
        *instance.interface.borrow_mut() = tcx.interface;
        *instance.core.borrow_mut() = Some(elab.module);
        Ok(instance)
    }

    /// Materialize a pseudo-module from the builtin registry: exports are
    /// builtin values, the interface comes from each spec's type factory.
    fn load_std_module(&mut self, path: &str) -> Result<Rc<ModuleInstance>, LoadErrors> {
        let specs = registry().module_exports(path);
        if specs.is_empty() {
            return Err(vec![Diagnostic::new(
                Code::GlobalUndefined,
                format!("module `{}` not found", path),
            )]);
        }
        let instance = ModuleInstance::new(path);
        for spec in specs {
            let surface = spec.surface_name.expect("module_exports filters on surface_name");
            instance
                .interface
                .borrow_mut()
                .insert(surface.to_string(), (spec.type_factory)());
            let value = Value::Builtin(spec.name);
            instance
                .bindings
                .borrow_mut()
                .insert(surface.to_string(), value.clone());
            instance
                .exports
                .borrow_mut()
                .insert(surface.to_string(), value);
        }
        instance.state.set(InitState::Done);
        self.graph.add_module(path);
        self.instances.insert(path.to_string(), Rc::clone(&instance));
        Ok(instance)
    }

    // ── Evaluate phase: topological order, init-once ────────────────────

    fn evaluate_all(&mut self, ctx: &EffContext) -> Result<(), LoadErrors> {
        let order = topological_sort(&self.graph).map_err(|cycle| {
            // The visiting stack catches cycles first; this is the
            // belt-and-suspenders path for graphs assembled by tooling.
            vec![Diagnostic::new(
                Code::ImportCycle,
                format!("import cycle: {}", cycle.cycle_path.join(" → ")),
            )]
        })?;

        for id in order {
            let path = self.graph.get(id).path.clone();
            let instance = Rc::clone(&self.instances[&path]);
            self.evaluate_instance(&instance, ctx)?;
        }
        Ok(())
    }

    fn evaluate_instance(
        &self,
        instance: &Rc<ModuleInstance>,
        ctx: &EffContext,
    ) -> Result<(), LoadErrors> {
        match instance.state.get() {
            InitState::Done => return Ok(()),
            InitState::Failed => {
                return Err(instance.init_error.borrow().clone().unwrap_or_default())
            }
            InitState::Pending => {}
        }

        let core = instance
            .core
            .borrow()
            .clone()
            .expect("loaded modules carry their Core before evaluation");

        let evaluator = Evaluator::new(ctx);
        let env = crate::env::Env::root();
        for decl in &core.decls {
            let CoreDecl::LetRec(bindings) = decl;
            // letrec protocol: bind every name first, then overwrite each
            // slot, so the closures see their whole recursion group.
            for (name, _) in bindings {
                env.define(name.clone(), Value::Unit);
            }
            for (name, expr) in bindings {
                match evaluator.eval(expr, &env, instance) {
                    Ok(value) => {
                        env.define(name.clone(), value.clone());
                        instance.bindings.borrow_mut().insert(name.clone(), value);
                    }
                    Err(err) => return Err(instance.fail(vec![err])),
                }
            }
        }

        // Exports ⊆ Bindings, filtered by the interface's export set.
        for name in &core.exports {
            let Some(value) = instance.bindings.borrow().get(name).cloned() else {
                return Err(instance.fail(vec![Diagnostic::new(
                    Code::GlobalUndefined,
                    format!("export `{}` has no binding in `{}`", name, instance.path),
                )]));
            };
            instance.exports.borrow_mut().insert(name.clone(), value);
        }

        instance.state.set(InitState::Done);
        Ok(())
    }
}
