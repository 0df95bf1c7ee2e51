//! Inference integration tests.
//!
//! Each test parses a module, type-checks it against a small import
//! environment, and asserts on the resulting schemes or diagnostics.

use ailang_common::Code;
use ailang_syntax::parse_module;
use ailang_typeck::ty::{Kind, Scheme, Ty, TyVar};
use ailang_typeck::{check_module, InstanceTable, TypeckResult};
use rustc_hash::FxHashMap;

/// `show : ∀a. (a) -> String` plus nothing else — the smallest prelude the
/// scenario programs need.
fn test_prelude() -> FxHashMap<String, Scheme> {
    let mut prelude = FxHashMap::default();
    let a = TyVar(0);
    prelude.insert(
        "show".to_string(),
        Scheme {
            vars: vec![(a, Kind::Star)],
            constraints: Vec::new(),
            ty: Ty::fun(vec![Ty::Var(a)], Ty::string()),
        },
    );
    prelude
}

/// An import environment containing `std/io` with `println` and `print`.
fn std_io() -> FxHashMap<String, FxHashMap<String, Scheme>> {
    let mut io = FxHashMap::default();
    for name in ["println", "print"] {
        io.insert(
            name.to_string(),
            Scheme::mono(Ty::fun_with_effects(
                vec![Ty::string()],
                Ty::effect_row(&["IO"]),
                Ty::unit(),
            )),
        );
    }
    let mut imports = FxHashMap::default();
    imports.insert("std/io".to_string(), io);
    imports
}

fn check(source: &str) -> TypeckResult {
    let parsed = parse_module(source);
    assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
    check_module(
        &parsed.module.expect("module parses"),
        &std_io(),
        &test_prelude(),
        &InstanceTable::prelude(),
    )
}

fn check_ok(source: &str) -> TypeckResult {
    let result = check(source);
    assert!(result.errors.is_empty(), "type errors: {:?}", result.errors);
    result
}

fn codes(result: &TypeckResult) -> Vec<Code> {
    result.errors.iter().map(|d| d.code).collect()
}

// ── Scenario programs ───────────────────────────────────────────────────

#[test]
fn s1_recursion_and_io_type_checks() {
    let result = check_ok(
        "module t/fib\n\
         import std/io (println)\n\
         export func fib(n: Int) -> Int = if n < 2 then n else fib(n-1) + fib(n-2)\n\
         export func main() -> () ! {IO} { println(show(fib(10))) }",
    );
    let fib = &result.interface["fib"];
    assert_eq!(format!("{}", fib.ty), "(Int) -> Int");
    let main = &result.interface["main"];
    assert_eq!(format!("{}", main.ty), "() -> () ! {IO}");
}

#[test]
fn s2_adt_and_match_infers_option_int() {
    let result = check_ok(
        "module t/opt\n\
         type Option[a] = Some(a) | None\n\
         export func orElse(o: Option[Int], d: Int) -> Int =\n\
           match o { Some(v) => v, None => d }\n\
         export func main() -> () = ()",
    );
    let or_else = &result.interface["orElse"];
    assert_eq!(format!("{}", or_else.ty), "(Option[Int], Int) -> Int");
}

#[test]
fn s3_row_polymorphic_record_access() {
    let result = check_ok(
        "module t/rec\n\
         export func name[r](p: {name: String | r}) -> String = p.name\n\
         export func main() -> () = ()",
    );
    let name = &result.interface["name"];
    assert_eq!(name.vars.len(), 1, "the row variable is quantified");
}

// ── Row subsumption ─────────────────────────────────────────────────────

#[test]
fn record_parameter_accepts_wider_records() {
    // A function declared for {x: Int} must accept {x: Int, y: String}:
    // the parameter row gets an implicit row generic.
    check_ok(
        "module t/rows\n\
         export func getX(p: {x: Int}) -> Int = p.x\n\
         export func main() -> Int = getX({x: 1, y: \"s\"})",
    );
}

#[test]
fn missing_record_field_is_rejected() {
    let result = check(
        "module t/rows\n\
         export func getX(p: {x: Int}) -> Int = p.x\n\
         export func main() -> Int = getX({y: \"s\"})",
    );
    assert!(codes(&result).contains(&Code::TcRecFieldMissing));
}

#[test]
fn duplicate_record_label_is_rejected() {
    let result = check(
        "module t/rows\n\
         export func main() -> Int = {a: 1, a: 2}.a",
    );
    assert!(codes(&result).contains(&Code::TcRecDuplicate));
}

// ── Literals and numeric classes ────────────────────────────────────────

#[test]
fn integer_literals_are_int_immediately() {
    let result = check_ok(
        "module t/lit\n\
         export func main() -> Int = 1 + 2",
    );
    assert!(result
        .node_dicts
        .values()
        .any(|d| d.type_name == "Int"));
}

#[test]
fn float_literals_are_float_immediately() {
    let result = check_ok(
        "module t/lit\n\
         export func main() -> Float = 1.5 + 2.5",
    );
    assert!(result
        .node_dicts
        .values()
        .any(|d| d.type_name == "Float"));
}

#[test]
fn mixed_int_float_arithmetic_is_rejected() {
    let result = check(
        "module t/lit\n\
         export func main() -> Int = 1 + 2.0",
    );
    assert!(codes(&result).contains(&Code::TcUnify));
}

#[test]
fn modulo_on_float_has_no_instance() {
    let result = check(
        "module t/lit\n\
         export func main() -> Float = 1.5 % 2.0",
    );
    assert!(codes(&result).contains(&Code::TcNoInstance));
}

#[test]
fn equality_on_mixed_ground_types_is_rejected_statically() {
    let result = check(
        "module t/lit\n\
         export func main() -> Bool = 1 == 1.5",
    );
    assert!(!result.errors.is_empty());
}

// ── Effects ─────────────────────────────────────────────────────────────

#[test]
fn undeclared_effect_is_a_row_error() {
    let result = check(
        "module t/eff\n\
         import std/io (println)\n\
         export func main() -> () = println(\"hi\")",
    );
    let diags = &result.errors;
    assert!(!diags.is_empty());
    assert!(
        diags.iter().any(|d| d
            .hint
            .as_deref()
            .is_some_and(|h| h.contains("! {IO}"))),
        "expected the effect hint, got {:?}",
        diags
    );
}

#[test]
fn declared_effect_allows_the_call() {
    check_ok(
        "module t/eff\n\
         import std/io (println)\n\
         export func main() -> () ! {IO} = println(\"hi\")",
    );
}

#[test]
fn effects_propagate_through_local_helpers() {
    // `greet` performs IO, so `main` calling it must declare IO too.
    let result = check(
        "module t/eff\n\
         import std/io (println)\n\
         export func greet() -> () ! {IO} = println(\"hi\")\n\
         export func main() -> () = greet()",
    );
    assert!(!result.errors.is_empty());
}

#[test]
fn unknown_effect_label_is_rejected() {
    let result = check(
        "module t/eff\n\
         export func main() -> () ! {Teleport} = ()",
    );
    assert!(!result.errors.is_empty());
}

// ── Declared generics are rigid ─────────────────────────────────────────

#[test]
fn declared_generic_cannot_be_specialized_by_the_body() {
    let result = check(
        "module t/gen\n\
         export func id[a](x: a) -> a = 0",
    );
    assert!(codes(&result).contains(&Code::TcUnify));
}

#[test]
fn identity_function_infers_polymorphic_scheme() {
    let result = check_ok(
        "module t/gen\n\
         export func id[a](x: a) -> a = x\n\
         export func main() -> Int = id(41) + 1",
    );
    assert_eq!(result.interface["id"].vars.len(), 1);
}

#[test]
fn arithmetic_on_unconstrained_generic_has_no_instance() {
    let result = check(
        "module t/gen\n\
         export func double[a](x: a) -> a = x + x",
    );
    assert!(codes(&result).contains(&Code::TcNoInstance));
}

// ── Imports ─────────────────────────────────────────────────────────────

#[test]
fn missing_import_name_lists_available_exports() {
    let result = check(
        "module t/imp\n\
         import std/io (fprintln)\n\
         export func main() -> () = ()",
    );
    assert!(result
        .errors
        .iter()
        .any(|d| d.hint.as_deref().is_some_and(|h| h.contains("println"))));
}

#[test]
fn unknown_module_is_reported() {
    let result = check(
        "module t/imp\n\
         import std/nope (thing)\n\
         export func main() -> () = ()",
    );
    assert!(result
        .errors
        .iter()
        .any(|d| d.message.contains("std/nope")));
}

// ── Misc ────────────────────────────────────────────────────────────────

#[test]
fn occurs_check_fires_on_self_application() {
    let result = check(
        "module t/occ\n\
         export func main() -> () = (\\f. f(f))(\\x. x)",
    );
    assert!(codes(&result).contains(&Code::TcOccurs));
}

#[test]
fn match_arms_must_agree() {
    let result = check(
        "module t/m\n\
         type Option[a] = Some(a) | None\n\
         export func f(o: Option[Int]) -> Int =\n\
           match o { Some(v) => v, None => \"zero\" }",
    );
    assert!(codes(&result).contains(&Code::TcUnify));
}

#[test]
fn guards_must_be_bool() {
    let result = check(
        "module t/m\n\
         export func f(n: Int) -> Int = match n { x if x + 1 => x, _ => 0 }",
    );
    assert!(codes(&result).contains(&Code::TcUnify));
}

#[test]
fn blocks_bind_lets_in_sequence() {
    check_ok(
        "module t/blk\n\
         export func main() -> Int {\n\
           let a = 1;\n\
           let b = a + 1;\n\
           a + b\n\
         }",
    );
}

#[test]
fn list_elements_must_agree() {
    let result = check(
        "module t/list\n\
         export func main() -> List[Int] = [1, \"two\"]",
    );
    assert!(codes(&result).contains(&Code::TcUnify));
}

#[test]
fn spread_pattern_binds_rest_as_list() {
    check_ok(
        "module t/list\n\
         export func sum(xs: List[Int]) -> Int =\n\
           match xs { [x, ...rest] => x + sum(rest), [] => 0 }",
    );
}

// ── Rendered interfaces ─────────────────────────────────────────────────

#[test]
fn interface_rendering_snapshot() {
    let result = check_ok(
        "module t/api\n\
         type Shape = Circle(Float) | Dot\n\
         export func area(s: Shape) -> Float =\n\
           match s { Circle(r) => r * r * 3.14, Dot => 0.0 }\n\
         export func describe(s: Shape) -> () ! {IO} = ()\n\
         export func pick[a](o: Option[a], d: a) -> a =\n\
           match o { Some(v) => v, None => d }",
    );
    let mut names: Vec<&String> = result.interface.keys().collect();
    names.sort();
    let rendered: Vec<String> = names
        .iter()
        .map(|n| format!("{}: {}", n, result.interface[n.as_str()].ty))
        .collect();
    insta::assert_snapshot!(rendered.join("\n"), @r###"
    area: (Shape) -> Float
    describe: (Shape) -> () ! {IO}
    pick: (Option[?0], ?0) -> ?0
    "###);
}
