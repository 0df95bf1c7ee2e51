//! Type inference for AILANG.
//!
//! The entry point is [`infer::check_module`]: given a parsed module, the
//! interfaces of its imports, the prelude bindings, and the class instance
//! table, it produces a [`infer::TypeckResult`] with schemes for every
//! top-level function, per-node resolved types, per-operator resolved
//! dictionaries, and diagnostics.
//!
//! Pipeline position: `ailang-syntax` → **ailang-typeck** → `ailang-elab`.

pub mod env;
pub mod error;
pub mod infer;
pub mod solve;
pub mod ty;
pub mod unify;

pub use error::{ConstraintOrigin, TypeError};
pub use infer::{check_module, AdtRegistry, NameOrigin, TypeckResult};
pub use solve::{Class, InstanceTable, ResolvedDict};
pub use ty::{Kind, RowKind, Scheme, Ty, TyCon, TyVar};
pub use unify::InferCtx;
