//! FS effect handlers: readFile, writeFile, exists.
//!
//! With a sandbox directory configured, every path is re-rooted under it:
//! absolute prefixes and `..` components are stripped before joining, so a
//! program cannot name anything outside the sandbox.

use std::path::{Component, Path, PathBuf};

use ailang_common::Diagnostic;

use crate::effects::EffContext;

/// Resolve a program-supplied path against the sandbox, if one is set.
pub fn resolve_path(ctx: &EffContext, raw: &str) -> PathBuf {
    match &ctx.env.sandbox_dir {
        None => PathBuf::from(raw),
        Some(root) => {
            let mut clean = PathBuf::new();
            for component in Path::new(raw).components() {
                match component {
                    Component::Normal(part) => clean.push(part),
                    // RootDir, Prefix, CurDir, and ParentDir all vanish:
                    // escapes become plain sandbox-relative lookups.
                    _ => {}
                }
            }
            root.join(clean)
        }
    }
}

/// Read a file as UTF-8. IO failures are language-level `Err` strings, so
/// the return type here is `Result<Result<contents, message>, _>` with the
/// outer layer reserved for capability denial.
pub fn read_file(ctx: &EffContext, path: &str) -> Result<Result<String, String>, Diagnostic> {
    ctx.require("FS")?;
    let resolved = resolve_path(ctx, path);
    Ok(std::fs::read_to_string(&resolved).map_err(|e| e.to_string()))
}

pub fn write_file(
    ctx: &EffContext,
    path: &str,
    content: &str,
) -> Result<Result<(), String>, Diagnostic> {
    ctx.require("FS")?;
    let resolved = resolve_path(ctx, path);
    if let Some(parent) = resolved.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return Ok(Err(e.to_string()));
            }
        }
    }
    Ok(std::fs::write(&resolved, content).map_err(|e| e.to_string()))
}

pub fn exists(ctx: &EffContext, path: &str) -> Result<bool, Diagnostic> {
    ctx.require("FS")?;
    Ok(resolve_path(ctx, path).exists())
}
