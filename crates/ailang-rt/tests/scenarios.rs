//! End-to-end scenario tests.
//!
//! Each test assembles module sources in an in-memory resolver, drives the
//! full pipeline through the library driver with a captured stdout, and
//! asserts on output and diagnostics — the same path the CLI takes, minus
//! the process boundary.

use ailang_common::Code;
use ailang_rt::{run_on_eval_thread, run_with_resolver, MapResolver, RunConfig, SharedWriter};

fn run(
    sources: &[(&str, &str)],
    root: &str,
    config: RunConfig,
) -> (Result<(), Vec<ailang_common::Diagnostic>>, String) {
    let sources: Vec<(String, String)> = sources
        .iter()
        .map(|(p, s)| (p.to_string(), s.to_string()))
        .collect();
    let root = root.to_string();
    // Evaluation happens on the dedicated large-stack thread, exactly as
    // the CLI runs it; the 10k-frame guard is the binding limit.
    run_on_eval_thread(move || {
        let mut resolver = MapResolver::default();
        for (path, source) in &sources {
            resolver.add(path, source);
        }
        let out = SharedWriter::default();
        let result = run_with_resolver(
            &resolver,
            &root,
            &config,
            Box::new(out.clone()),
            Box::new(std::io::Cursor::new(Vec::new())),
        );
        (result, out.contents())
    })
}

fn caps(names: &[&str]) -> RunConfig {
    RunConfig {
        caps: names.iter().map(|s| s.to_string()).collect(),
        ..RunConfig::default()
    }
}

// ── S1: recursion + IO ──────────────────────────────────────────────────

const FIB: &str = "module t/fib\n\
    import std/io (println)\n\
    export func fib(n: Int) -> Int = if n < 2 then n else fib(n-1) + fib(n-2)\n\
    export func main() -> () ! {IO} { println(show(fib(10))) }";

#[test]
fn s1_fib_prints_55() {
    let (result, output) = run(&[("t/fib", FIB)], "t/fib", caps(&["IO"]));
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "55\n");
}

// ── S2: ADT + match ─────────────────────────────────────────────────────

#[test]
fn s2_adt_match_runs() {
    let source = "module t/opt\n\
        type Option[a] = Some(a) | None\n\
        export func orElse(o: Option[Int], d: Int) -> Int =\n\
          match o { Some(v) => v, None => d }\n\
        export func check() -> Int = orElse(Some(3), 9) + orElse(None, 7)\n\
        export func main() -> Int = check()";
    let (result, output) = run(&[("t/opt", source)], "t/opt", RunConfig::default());
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "10\n");
}

// ── S3: row-polymorphic record ──────────────────────────────────────────

#[test]
fn s3_row_polymorphic_call_evaluates() {
    let source = "module t/rec\n\
        export func name[r](p: {name: String | r}) -> String = p.name\n\
        export func main() -> String = name({name: \"A\", age: 30})";
    let (result, output) = run(&[("t/rec", source)], "t/rec", RunConfig::default());
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "\"A\"\n");
}

// ── S4: capability denial ───────────────────────────────────────────────

const HELLO_IO: &str = "module t/io\n\
    import std/io (println)\n\
    export func main() -> () ! {IO} { println(\"hi\") }";

#[test]
fn s4_missing_capability_fails_with_cap_missing_and_no_output() {
    let (result, output) = run(&[("t/io", HELLO_IO)], "t/io", RunConfig::default());
    let errors = result.unwrap_err();
    assert_eq!(errors[0].code, Code::CapMissing);
    assert_eq!(errors[0].code.exit_code(), 2);
    assert_eq!(errors[0].hint.as_deref(), Some("Run with --caps IO"));
    assert_eq!(output, "", "no observable effect may have happened");
}

#[test]
fn s4_auto_caps_grants_the_declared_row() {
    let config = RunConfig {
        auto_caps: true,
        ..RunConfig::default()
    };
    let (result, output) = run(&[("t/io", HELLO_IO)], "t/io", config);
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "hi\n");
}

// ── S5: import cycle ────────────────────────────────────────────────────

#[test]
fn s5_cycle_reports_the_exact_chain() {
    let sources = [
        (
            "t/a",
            "module t/a\nimport t/b (b)\nexport func a() -> Int = b()\nexport func main() -> () = ()",
        ),
        (
            "t/b",
            "module t/b\nimport t/c (c)\nexport func b() -> Int = c()",
        ),
        (
            "t/c",
            "module t/c\nimport t/a (a)\nexport func c() -> Int = a()",
        ),
    ];
    let (result, _) = run(&sources, "t/a", RunConfig::default());
    let errors = result.unwrap_err();
    assert_eq!(errors[0].code, Code::ImportCycle);
    assert!(
        errors[0].message.contains("t/a → t/b → t/c → t/a"),
        "chain missing from: {}",
        errors[0].message
    );
}

#[test]
fn self_import_is_a_cycle_at_load_time() {
    // A module importing itself is caught by the loader's visiting stack
    // before the dependency graph ever sees an edge.
    let source = "module t/selfish\n\
        import t/selfish (f)\n\
        export func f() -> Int = 1\n\
        export func main() -> () = ()";
    let (result, _) = run(&[("t/selfish", source)], "t/selfish", RunConfig::default());
    let errors = result.unwrap_err();
    assert_eq!(errors[0].code, Code::ImportCycle);
    assert!(
        errors[0].message.contains("t/selfish → t/selfish"),
        "chain missing from: {}",
        errors[0].message
    );
}

// ── S6: JSON round-trip at the language level ───────────────────────────

#[test]
fn s6_json_decode_then_encode_is_byte_identical() {
    let source = "module t/json\n\
        import std/json (encode, decode)\n\
        import std/io (println)\n\
        export func main() -> () ! {IO} {\n\
          match decode(\"[{\\\"k\\\":1},{\\\"k\\\":2}]\") {\n\
            Ok(j) => println(encode(j)),\n\
            Err(e) => println(e)\n\
          }\n\
        }";
    let (result, output) = run(&[("t/json", source)], "t/json", caps(&["IO"]));
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "[{\"k\":1},{\"k\":2}]\n");
}

// ── Cross-module behavior ───────────────────────────────────────────────

#[test]
fn cross_module_import_resolves_exports_only() {
    let sources = [
        (
            "app/lib",
            "module app/lib\n\
             export func double(n: Int) -> Int = n * 2\n\
             func hidden() -> Int = 13",
        ),
        (
            "app/main",
            "module app/main\n\
             import app/lib (double)\n\
             export func main() -> Int = double(21)",
        ),
    ];
    let (result, output) = run(&sources, "app/main", RunConfig::default());
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "42\n");
}

#[test]
fn importing_a_non_exported_name_is_rejected() {
    let sources = [
        (
            "app/lib",
            "module app/lib\n\
             export func double(n: Int) -> Int = n * 2\n\
             func hidden() -> Int = 13",
        ),
        (
            "app/main",
            "module app/main\n\
             import app/lib (hidden)\n\
             export func main() -> Int = hidden()",
        ),
    ];
    let (result, _) = run(&sources, "app/main", RunConfig::default());
    let errors = result.unwrap_err();
    assert!(errors[0].message.contains("hidden"));
}

#[test]
fn module_init_is_deterministic_across_runs() {
    // Property: identical sources give identical observable results.
    let sources = [
        (
            "app/lib",
            "module app/lib\nexport func base() -> Int = 40",
        ),
        (
            "app/main",
            "module app/main\n\
             import app/lib (base)\n\
             export func main() -> Int = base() + 2",
        ),
    ];
    let (r1, out1) = run(&sources, "app/main", RunConfig::default());
    let (r2, out2) = run(&sources, "app/main", RunConfig::default());
    assert!(r1.is_ok() && r2.is_ok());
    assert_eq!(out1, out2);
    assert_eq!(out1, "42\n");
}

// ── Match semantics ─────────────────────────────────────────────────────

#[test]
fn tree_compiled_match_agrees_with_linear_semantics() {
    // Guards force fall-through; every input is checked against the
    // answer a top-down linear scan would give.
    let source = "module t/match\n\
        type Shape = Circle(Int) | Square(Int) | Dot\n\
        export func classify(s: Shape) -> Int =\n\
          match s {\n\
            Circle(r) if r > 10 => 1,\n\
            Circle(r) => 2,\n\
            Square(n) if n == 0 => 3,\n\
            Square(n) => 4,\n\
            Dot => 5\n\
          }\n\
        export func main() -> Int =\n\
          classify(Circle(11)) * 10000 +\n\
          classify(Circle(2)) * 1000 +\n\
          classify(Square(0)) * 100 +\n\
          classify(Square(9)) * 10 +\n\
          classify(Dot)";
    let (result, output) = run(&[("t/match", source)], "t/match", RunConfig::default());
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "12345\n");
}

#[test]
fn exhaustive_adt_match_never_fails_at_runtime() {
    let source = "module t/m\n\
        type Option[a] = Some(a) | None\n\
        export func f(o: Option[Int]) -> Int = match o { Some(v) => v, None => 0 }\n\
        export func main() -> Int = f(Some(1)) + f(None)";
    let (result, output) = run(&[("t/m", source)], "t/m", RunConfig::default());
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "1\n");
}

#[test]
fn guarded_match_with_no_fallback_is_non_exhaustive_at_runtime() {
    let source = "module t/m\n\
        export func f(n: Int) -> Int = match n { x if x > 0 => x, 0 => 0 }\n\
        export func main() -> Int = f(-5)";
    let (result, _) = run(&[("t/m", source)], "t/m", RunConfig::default());
    let errors = result.unwrap_err();
    assert_eq!(errors[0].code, Code::RtMatchNonExhaustive);
    assert!(errors[0].message.contains("-5"));
}

#[test]
fn list_spread_patterns_recurse() {
    let source = "module t/list\n\
        export func sum(xs: List[Int]) -> Int =\n\
          match xs { [x, ...rest] => x + sum(rest), [] => 0 }\n\
        export func main() -> Int = sum([1, 2, 3, 4, 5])";
    let (result, output) = run(&[("t/list", source)], "t/list", RunConfig::default());
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "15\n");
}

// ── Runtime failure modes ───────────────────────────────────────────────

#[test]
fn division_by_zero_is_rt_div_zero() {
    let source = "module t/div\n\
        export func main() -> Int = 1 / 0";
    let (result, _) = run(&[("t/div", source)], "t/div", RunConfig::default());
    let errors = result.unwrap_err();
    assert_eq!(errors[0].code, Code::RtDivZero);
}

#[test]
fn runaway_recursion_is_a_structured_overflow() {
    let source = "module t/loop\n\
        export func spin(n: Int) -> Int = spin(n + 1)\n\
        export func main() -> Int = spin(0)";
    let (result, _) = run(&[("t/loop", source)], "t/loop", RunConfig::default());
    let errors = result.unwrap_err();
    assert_eq!(errors[0].code, Code::RtStackOverflow);
}

#[test]
fn deep_but_reasonable_recursion_succeeds() {
    let source = "module t/deep\n\
        export func count(n: Int) -> Int = if n == 0 then 0 else 1 + count(n - 1)\n\
        export func main() -> Int = count(9000)";
    let (result, output) = run(&[("t/deep", source)], "t/deep", RunConfig::default());
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "9000\n");
}

#[test]
fn missing_entrypoint_is_mod_entry_not_found() {
    let source = "module t/noentry\nexport func other() -> Int = 1";
    let (result, _) = run(&[("t/noentry", source)], "t/noentry", RunConfig::default());
    let errors = result.unwrap_err();
    assert_eq!(errors[0].code, Code::ModEntryNotFound);
}

// ── Entry arity and JSON arguments ──────────────────────────────────────

#[test]
fn arity_one_entry_decodes_its_json_argument() {
    let source = "module t/arg\n\
        export func main(n: Int) -> Int = n + 1";
    let config = RunConfig {
        args_json: Some("41".to_string()),
        ..RunConfig::default()
    };
    let (result, output) = run(&[("t/arg", source)], "t/arg", config);
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "42\n");
}

#[test]
fn bad_json_argument_is_json_decode() {
    let source = "module t/arg\nexport func main(n: Int) -> Int = n";
    let config = RunConfig {
        args_json: Some("{nope".to_string()),
        ..RunConfig::default()
    };
    let (result, _) = run(&[("t/arg", source)], "t/arg", config);
    assert_eq!(result.unwrap_err()[0].code, Code::JsonDecode);
}

#[test]
fn arity_two_entry_is_rejected() {
    let source = "module t/arg\nexport func main(a: Int, b: Int) -> Int = a + b";
    let (result, _) = run(&[("t/arg", source)], "t/arg", RunConfig::default());
    assert_eq!(result.unwrap_err()[0].code, Code::ModArity);
}

// ── Deterministic clock ─────────────────────────────────────────────────

#[test]
fn seeded_clock_makes_now_reproducible() {
    let source = "module t/clock\n\
        import std/clock (now)\n\
        import std/io (println)\n\
        export func main() -> () ! {IO, Clock} {\n\
          println(show(now()));\n\
          println(show(now()))\n\
        }";
    let config = RunConfig {
        seed: 100,
        caps: vec!["IO".into(), "Clock".into()],
        ..RunConfig::default()
    };
    let (result, output) = run(&[("t/clock", source)], "t/clock", config);
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "100\n101\n");
}

// ── FS sandbox ──────────────────────────────────────────────────────────

#[test]
fn fs_effects_stay_inside_the_sandbox() {
    let tmp = tempfile::tempdir().unwrap();
    let source = "module t/fs\n\
        import std/fs (writeFile, readFile)\n\
        import std/io (println)\n\
        export func main() -> () ! {IO, FS} {\n\
          match writeFile(\"/data/note.txt\", \"stored\") {\n\
            Ok(u) => match readFile(\"data/note.txt\") {\n\
              Ok(text) => println(text),\n\
              Err(e) => println(e)\n\
            },\n\
            Err(e) => println(e)\n\
          }\n\
        }";
    let config = RunConfig {
        caps: vec!["IO".into(), "FS".into()],
        fs_sandbox: Some(tmp.path().to_path_buf()),
        ..RunConfig::default()
    };
    let (result, output) = run(&[("t/fs", source)], "t/fs", config);
    assert!(result.is_ok(), "{:?}", result);
    // The absolute path was re-rooted: both spellings hit the same file.
    assert_eq!(output, "stored\n");
    assert!(tmp.path().join("data/note.txt").exists());
}

// ── Records ─────────────────────────────────────────────────────────────

#[test]
fn record_update_is_functional() {
    let source = "module t/rec\n\
        export func main() -> Int {\n\
          let p = {x: 1, y: 2};\n\
          let q = { p | x: 10 };\n\
          p.x + q.x + q.y\n\
        }";
    let (result, output) = run(&[("t/rec", source)], "t/rec", RunConfig::default());
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "13\n");
}

// ── Blocks, lets, lambdas ───────────────────────────────────────────────

#[test]
fn letrec_expression_supports_local_recursion() {
    let source = "module t/letrec\n\
        export func main() -> Int =\n\
          letrec go = \\n. if n == 0 then 0 else n + go(n - 1) in go(10)";
    let (result, output) = run(&[("t/letrec", source)], "t/letrec", RunConfig::default());
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "55\n");
}

#[test]
fn closures_capture_their_environment() {
    let source = "module t/close\n\
        export func main() -> Int {\n\
          let base = 40;\n\
          let add = \\n. n + base;\n\
          add(2)\n\
        }";
    let (result, output) = run(&[("t/close", source)], "t/close", RunConfig::default());
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "42\n");
}

#[test]
fn string_concat_and_comparison() {
    let source = "module t/str\n\
        import std/string (length)\n\
        export func main() -> Int =\n\
          if \"ab\" ++ \"cd\" == \"abcd\" then length(\"abcd\") else 0";
    let (result, output) = run(&[("t/str", source)], "t/str", RunConfig::default());
    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(output, "4\n");
}
