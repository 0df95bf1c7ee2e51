//! Clock effect handlers: now, sleep.
//!
//! With a non-zero seed the clock is virtual: `now` returns a monotonic
//! counter derived from the seed and `sleep` is a no-op, so seeded runs
//! are reproducible byte for byte.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ailang_common::{Code, Diagnostic};

use crate::effects::EffContext;

/// Current time in epoch milliseconds (or virtual ticks when seeded).
pub fn now(ctx: &EffContext) -> Result<i64, Diagnostic> {
    ctx.require("Clock")?;
    if ctx.env.seed != 0 {
        let current = ctx.env.virtual_now.get();
        ctx.env.virtual_now.set(current + 1);
        return Ok(current);
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .map_err(|e| Diagnostic::new(Code::CapPolicy, format!("system clock error: {}", e)))
}

/// Sleep for `millis`. A no-op in deterministic mode.
pub fn sleep(ctx: &EffContext, millis: i64) -> Result<(), Diagnostic> {
    ctx.require("Clock")?;
    if ctx.env.seed != 0 || millis <= 0 {
        return Ok(());
    }
    std::thread::sleep(Duration::from_millis(millis as u64));
    Ok(())
}
