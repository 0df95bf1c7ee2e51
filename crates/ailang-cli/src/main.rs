//! The `ailang` command line.
//!
//! Subcommands: `run` (execute a module), `normalize` / `suggest-imports` /
//! `apply` (source tooling emitting versioned JSON documents), and
//! `doctor builtins` (registry self-check).
//!
//! Exit codes: 0 success, 1 runtime or compile error, 2 missing
//! capability, 3 usage error.

mod edits;

use std::path::PathBuf;
use std::process::ExitCode;

use ailang_common::{span::line_col, Diagnostic};
use ailang_rt::{registry, run_file, run_on_eval_thread, RunConfig};
use ariadne::{Label, Report, ReportKind, Source};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ailang", version, about = "The AILANG interpreter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a module's entrypoint.
    Run {
        /// Entrypoint name (an exported function of arity 0 or 1).
        #[arg(long, default_value = "main")]
        entry: String,
        /// JSON document decoded as the entrypoint's argument.
        #[arg(long)]
        args_json: Option<String>,
        /// Capabilities to grant, comma separated (IO,FS,Clock,Net).
        #[arg(long, value_delimiter = ',')]
        caps: Vec<String>,
        /// Grant whatever the entrypoint's effect row declares.
        #[arg(long)]
        auto_caps: bool,
        /// Domains outbound HTTP may contact, comma separated.
        #[arg(long, value_delimiter = ',')]
        net_allow: Vec<String>,
        /// Response body cap in bytes.
        #[arg(long, default_value_t = 5 * 1024 * 1024)]
        net_max_bytes: usize,
        /// Re-root all FS paths under this directory.
        #[arg(long)]
        fs_sandbox: Option<PathBuf>,
        file: PathBuf,
    },
    /// Emit the edit list that wraps a fragment into a valid module.
    Normalize {
        file: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Resolve unresolved identifiers against the standard library.
    SuggestImports {
        file: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Apply edit lists bottom-up and emit the corrected source.
    Apply {
        file: PathBuf,
        edits: Vec<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Self-checks. `doctor builtins` validates the builtin registry.
    Doctor { what: String },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version are not usage errors.
            if err.use_stderr() {
                let _ = err.print();
                return ExitCode::from(3);
            }
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
    };

    let code = match cli.command {
        Command::Run {
            entry,
            args_json,
            caps,
            auto_caps,
            net_allow,
            net_max_bytes,
            fs_sandbox,
            file,
        } => {
            let config = RunConfig {
                entry,
                args_json,
                caps,
                auto_caps,
                net_allow,
                net_max_bytes,
                fs_sandbox,
                ..RunConfig::default()
            }
            .apply_env();
            cmd_run(file, config)
        }
        Command::Normalize { file, output } => cmd_normalize(&file, &output),
        Command::SuggestImports { file, output } => cmd_suggest_imports(&file, &output),
        Command::Apply {
            file,
            edits,
            output,
        } => cmd_apply(&file, &edits, output.as_deref()),
        Command::Doctor { what } => cmd_doctor(&what),
    };
    ExitCode::from(code)
}

// ── run ─────────────────────────────────────────────────────────────────

fn cmd_run(file: PathBuf, config: RunConfig) -> u8 {
    let run_target = file.clone();
    let result = run_on_eval_thread(move || {
        run_file(
            &run_target,
            &config,
            Box::new(std::io::stdout()),
            Box::new(std::io::BufReader::new(std::io::stdin())),
        )
    });
    match result {
        Ok(()) => 0,
        Err(errors) => {
            let source = std::fs::read_to_string(&file).ok();
            for error in &errors {
                render_diagnostic(error, &file, source.as_deref());
            }
            errors
                .first()
                .map(|e| e.code.exit_code() as u8)
                .unwrap_or(1)
        }
    }
}

/// Render one diagnostic: an ariadne report when the span falls inside the
/// root file, a plain line otherwise.
fn render_diagnostic(diag: &Diagnostic, file: &PathBuf, source: Option<&str>) {
    let name = file.display().to_string();
    let id = name.as_str();
    if let (Some(span), Some(source)) = (diag.span, source) {
        if (span.end as usize) <= source.len() {
            let range = span.start as usize..span.end as usize;
            let mut report = Report::build(ReportKind::Error, (id, range.clone()))
                .with_code(diag.code.as_str())
                .with_message(&diag.message)
                .with_label(Label::new((id, range)).with_message(&diag.message));
            if let Some(hint) = &diag.hint {
                report = report.with_help(hint);
            }
            let _ = report.finish().eprint((id, Source::from(source)));
            return;
        }
    }
    eprintln!("error[{}]: {}", diag.code, diag.message);
    if let Some(span) = diag.span {
        if let Some(source) = source {
            let (line, col) = line_col(source, span.start);
            eprintln!("  --> {}:{}:{}", name, line, col);
        }
    }
    if let Some(hint) = &diag.hint {
        eprintln!("  help: {}", hint);
    }
}

// ── Tooling commands ────────────────────────────────────────────────────

fn cmd_normalize(file: &PathBuf, output: &PathBuf) -> u8 {
    let Ok(source) = std::fs::read_to_string(file) else {
        eprintln!("error: cannot read {}", file.display());
        return 3;
    };
    let list = edits::normalize(&source);
    write_json(output, &list)
}

fn cmd_suggest_imports(file: &PathBuf, output: &PathBuf) -> u8 {
    let Ok(source) = std::fs::read_to_string(file) else {
        eprintln!("error: cannot read {}", file.display());
        return 3;
    };
    let suggestions = edits::suggest_imports(&source);
    write_json(output, &suggestions)
}

fn cmd_apply(file: &PathBuf, edit_files: &[PathBuf], output: Option<&std::path::Path>) -> u8 {
    let Ok(source) = std::fs::read_to_string(file) else {
        eprintln!("error: cannot read {}", file.display());
        return 3;
    };
    let mut lists = Vec::new();
    for edit_file in edit_files {
        let Ok(text) = std::fs::read_to_string(edit_file) else {
            eprintln!("error: cannot read {}", edit_file.display());
            return 3;
        };
        match serde_json::from_str::<edits::EditList>(&text) {
            Ok(list) => lists.push(list),
            Err(e) => {
                eprintln!("error[JSON_DECODE]: {} is not an edit list: {}", edit_file.display(), e);
                return 1;
            }
        }
    }
    match edits::apply(&source, &lists) {
        Ok((rewritten, result)) => {
            let target = output.map(|p| p.to_path_buf()).unwrap_or_else(|| file.clone());
            if std::fs::write(&target, rewritten).is_err() {
                eprintln!("error: cannot write {}", target.display());
                return 1;
            }
            println!("{}", serde_json::to_string(&result).expect("result serializes"));
            if result.validation == "ok" {
                0
            } else {
                1
            }
        }
        Err(diag) => {
            eprintln!("error[{}]: {}", diag.code, diag.message);
            1
        }
    }
}

fn cmd_doctor(what: &str) -> u8 {
    match what {
        "builtins" => {
            let problems = registry().validate();
            if problems.is_empty() {
                println!(
                    "builtin registry ok ({} builtins)",
                    registry().specs().len()
                );
                0
            } else {
                for problem in &problems {
                    eprintln!("doctor: {}", problem);
                }
                1
            }
        }
        other => {
            eprintln!("error: unknown doctor check `{}` (try `builtins`)", other);
            3
        }
    }
}

fn write_json<T: serde::Serialize>(output: &PathBuf, value: &T) -> u8 {
    let text = serde_json::to_string_pretty(value).expect("documents serialize");
    if std::fs::write(output, format!("{}\n", text)).is_err() {
        eprintln!("error: cannot write {}", output.display());
        return 1;
    }
    0
}
