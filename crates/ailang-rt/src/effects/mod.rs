//! Capability-gated effect runtime.
//!
//! Every effectful builtin checks the [`EffContext`] for a capability
//! grant before doing anything observable. The context also owns the
//! deterministic knobs (seed, tz, locale, FS sandbox, net policy) and the
//! stdio sinks, so tests can capture program output in-process.

pub mod clock;
pub mod fs;
pub mod io;
pub mod net;

use std::cell::{Cell, RefCell};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use ailang_common::{Code, Diagnostic};
use rustc_hash::FxHashMap;

/// A runtime token authorizing use of a named effect. Grants are per-run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    pub meta: Option<String>,
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Capability {
            name: name.into(),
            meta: None,
        }
    }
}

/// Outbound HTTP policy. Applies regardless of how the capability was
/// granted; auto-caps never bypasses it.
#[derive(Clone, Debug)]
pub struct NetPolicy {
    /// Allowed hosts: exact matches, plus subdomains of each entry.
    pub allow: Vec<String>,
    /// Response body cap in bytes.
    pub max_bytes: usize,
    pub timeout: Duration,
}

impl Default for NetPolicy {
    fn default() -> Self {
        NetPolicy {
            allow: Vec::new(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Deterministic environment knobs, seeded from flags and environment
/// variables at startup.
#[derive(Debug)]
pub struct RunEnv {
    /// Non-zero seed switches the Clock effect to a virtual counter.
    pub seed: i64,
    pub tz: String,
    pub locale: String,
    pub sandbox_dir: Option<PathBuf>,
    pub net: NetPolicy,
    /// Monotonic virtual clock state (deterministic mode only).
    pub(crate) virtual_now: Cell<i64>,
}

impl RunEnv {
    pub fn new(seed: i64, tz: String, locale: String) -> Self {
        RunEnv {
            virtual_now: Cell::new(seed),
            seed,
            tz,
            locale,
            sandbox_dir: None,
            net: NetPolicy::default(),
        }
    }
}

impl Default for RunEnv {
    fn default() -> Self {
        RunEnv::new(0, "UTC".to_string(), "C".to_string())
    }
}

/// The capability context for one run: granted capabilities, environment
/// knobs, and the stdio endpoints effect handlers write to.
pub struct EffContext {
    caps: RefCell<FxHashMap<String, Capability>>,
    pub env: RunEnv,
    stdout: RefCell<Box<dyn Write>>,
    stdin: RefCell<Box<dyn BufRead>>,
}

impl EffContext {
    pub fn new(env: RunEnv, stdout: Box<dyn Write>, stdin: Box<dyn BufRead>) -> Self {
        EffContext {
            caps: RefCell::new(FxHashMap::default()),
            env,
            stdout: RefCell::new(stdout),
            stdin: RefCell::new(stdin),
        }
    }

    /// A context writing to the process's real stdio.
    pub fn with_real_stdio(env: RunEnv) -> Self {
        EffContext::new(
            env,
            Box::new(std::io::stdout()),
            Box::new(std::io::BufReader::new(std::io::stdin())),
        )
    }

    pub fn grant(&self, name: &str) {
        self.caps
            .borrow_mut()
            .insert(name.to_string(), Capability::new(name));
    }

    pub fn has(&self, name: &str) -> bool {
        self.caps.borrow().contains_key(name)
    }

    pub fn granted(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caps.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// The capability gate every effect operation passes through.
    pub fn require(&self, effect: &str) -> Result<(), Diagnostic> {
        if self.has(effect) {
            Ok(())
        } else {
            Err(Diagnostic::new(
                Code::CapMissing,
                format!("effect {} requires the {} capability", effect, effect),
            )
            .with_hint(format!("Run with --caps {}", effect)))
        }
    }

    pub(crate) fn write_stdout(&self, text: &str) -> Result<(), Diagnostic> {
        let mut out = self.stdout.borrow_mut();
        out.write_all(text.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| Diagnostic::new(Code::CapPolicy, format!("stdout write failed: {}", e)))
    }

    pub(crate) fn read_stdin_line(&self) -> Result<String, Diagnostic> {
        let mut line = String::new();
        self.stdin
            .borrow_mut()
            .read_line(&mut line)
            .map_err(|e| Diagnostic::new(Code::CapPolicy, format!("stdin read failed: {}", e)))?;
        // Strip the trailing newline; EOF yields the empty string.
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }
}
