//! The AILANG runtime.
//!
//! Executes elaborated Core modules: a strict tree-walking [`eval::Evaluator`],
//! the frozen [`builtins::registry`], the capability-gated
//! [`effects::EffContext`], and the [`loader::Loader`] that orders and
//! evaluates module graphs. [`pipeline`] is the driver the CLI and the
//! scenario tests share.

pub mod builtins;
pub mod effects;
pub mod env;
pub mod eval;
pub mod graph;
pub mod loader;
pub mod pipeline;
pub mod value;

pub use builtins::{registry, BuiltinRegistry, BuiltinSpec};
pub use effects::{Capability, EffContext, NetPolicy, RunEnv};
pub use eval::Evaluator;
pub use loader::{FsResolver, LoadErrors, Loader, MapResolver, ModuleInstance, ModuleResolver};
pub use pipeline::{run_file, run_on_eval_thread, run_with_resolver, RunConfig, SharedWriter};
pub use value::Value;
