//! Parser integration tests.
//!
//! Each test parses a module snippet and asserts on the AST shape. The
//! snippets mirror the forms the scenario programs use, so a regression
//! here is a regression in every downstream phase.

use ailang_syntax::ast::*;
use ailang_syntax::parse_module;

fn parse_ok(source: &str) -> Module {
    let out = parse_module(source);
    assert!(
        out.errors.is_empty(),
        "unexpected parse errors: {:?}",
        out.errors
    );
    out.module.expect("module should parse")
}

fn only_func(module: &Module) -> &FuncDecl {
    let funcs: Vec<&FuncDecl> = module
        .decls
        .iter()
        .filter_map(|d| match d {
            Decl::Func(f) => Some(f),
            Decl::Type(_) => None,
        })
        .collect();
    assert_eq!(funcs.len(), 1, "expected exactly one func decl");
    funcs[0]
}

#[test]
fn module_header_and_imports() {
    let module = parse_ok(
        "module t/fib\n\
         import std/io (println)\n\
         export func main() -> () = ()",
    );
    assert_eq!(module.path, "t/fib");
    assert_eq!(module.imports.len(), 1);
    assert_eq!(module.imports[0].module, "std/io");
    assert_eq!(module.imports[0].names[0].0, "println");
}

#[test]
fn equation_form_function() {
    let module = parse_ok(
        "module t/m\n\
         export func fib(n: Int) -> Int = if n < 2 then n else fib(n-1) + fib(n-2)",
    );
    let f = only_func(&module);
    assert_eq!(f.name, "fib");
    assert!(f.exported);
    assert_eq!(f.params.len(), 1);
    assert!(f.effects.is_none());
    assert!(matches!(f.body.kind, ExprKind::If(..)));
}

#[test]
fn block_form_function_with_effects() {
    let module = parse_ok(
        "module t/m\n\
         import std/io (println)\n\
         export func main() -> () ! {IO} { println(\"hi\") }",
    );
    let f = only_func(&module);
    assert_eq!(f.effects.as_deref(), Some(&["IO".to_string()][..]));
    match &f.body.kind {
        ExprKind::Block(stmts) => assert_eq!(stmts.len(), 1),
        other => panic!("expected block body, got {:?}", other),
    }
}

#[test]
fn type_decl_with_variants() {
    let module = parse_ok(
        "module t/opt\n\
         type Option[a] = Some(a) | None\n\
         export func main() -> () = ()",
    );
    match &module.decls[0] {
        Decl::Type(t) => {
            assert_eq!(t.name, "Option");
            assert_eq!(t.params, vec!["a".to_string()]);
            assert_eq!(t.ctors.len(), 2);
            assert_eq!(t.ctors[0].name, "Some");
            assert_eq!(t.ctors[0].args.len(), 1);
            assert_eq!(t.ctors[1].name, "None");
        }
        other => panic!("expected type decl, got {:?}", other),
    }
}

#[test]
fn match_with_guards_and_constructor_patterns() {
    let module = parse_ok(
        "module t/m\n\
         export func f(o: Option[Int], d: Int) -> Int =\n\
           match o { Some(v) if v > 0 => v, Some(v) => d, None => d }",
    );
    let f = only_func(&module);
    match &f.body.kind {
        ExprKind::Match(_, arms) => {
            assert_eq!(arms.len(), 3);
            assert!(arms[0].guard.is_some());
            assert!(arms[1].guard.is_none());
            assert!(matches!(arms[2].pattern.kind, PatKind::Ctor(ref n, _) if n == "None"));
        }
        other => panic!("expected match, got {:?}", other),
    }
}

#[test]
fn list_pattern_with_spread() {
    let module = parse_ok(
        "module t/m\n\
         export func f(xs: List[Int]) -> Int =\n\
           match xs { [x, ...rest] => x, [] => 0 }",
    );
    let f = only_func(&module);
    match &f.body.kind {
        ExprKind::Match(_, arms) => {
            match &arms[0].pattern.kind {
                PatKind::List(items, rest) => {
                    assert_eq!(items.len(), 1);
                    assert!(matches!(&items[0].kind, PatKind::Var(n) if n == "x"));
                    assert_eq!(rest.as_deref(), Some("rest"));
                }
                other => panic!("expected list pattern, got {:?}", other),
            }
            assert!(matches!(&arms[1].pattern.kind, PatKind::List(items, None) if items.is_empty()));
        }
        other => panic!("expected match, got {:?}", other),
    }
}

#[test]
fn row_polymorphic_record_parameter() {
    let module = parse_ok(
        "module t/rec\n\
         export func name[r](p: {name: String | r}) -> String = p.name",
    );
    let f = only_func(&module);
    assert_eq!(f.generics, vec!["r".to_string()]);
    match &f.params[0].ty {
        TypeExpr::Record(fields, tail, _) => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].0, "name");
            assert_eq!(tail.as_deref(), Some("r"));
        }
        other => panic!("expected record type, got {:?}", other),
    }
    assert!(matches!(f.body.kind, ExprKind::RecordAccess(..)));
}

#[test]
fn record_literal_update_and_block_disambiguation() {
    let module = parse_ok(
        "module t/m\n\
         export func f(p: {x: Int}) -> {x: Int} = { p | x: 1 }\n\
         export func g() -> {x: Int} = { x: 1 }\n\
         export func h() -> Int { let a = 1; a + 1 }",
    );
    let funcs: Vec<&FuncDecl> = module
        .decls
        .iter()
        .filter_map(|d| match d {
            Decl::Func(f) => Some(f),
            _ => None,
        })
        .collect();
    assert!(matches!(funcs[0].body.kind, ExprKind::RecordUpdate(..)));
    assert!(matches!(funcs[1].body.kind, ExprKind::Record(..)));
    match &funcs[2].body.kind {
        ExprKind::Block(stmts) => {
            assert_eq!(stmts.len(), 2);
            assert!(matches!(stmts[0], Stmt::Let { .. }));
        }
        other => panic!("expected block, got {:?}", other),
    }
}

#[test]
fn let_in_is_an_expression_inside_blocks() {
    let module = parse_ok(
        "module t/m\n\
         export func f() -> Int { let x = 1 in x + 1 }",
    );
    let f = only_func(&module);
    match &f.body.kind {
        ExprKind::Block(stmts) => {
            assert_eq!(stmts.len(), 1);
            match &stmts[0] {
                Stmt::Expr(e) => assert!(matches!(e.kind, ExprKind::Let { .. })),
                other => panic!("expected expression statement, got {:?}", other),
            }
        }
        other => panic!("expected block, got {:?}", other),
    }
}

#[test]
fn lambda_and_application() {
    let module = parse_ok(
        "module t/m\n\
         export func f() -> Int = (\\x. x + 1)(41)",
    );
    let f = only_func(&module);
    match &f.body.kind {
        ExprKind::Call(callee, args) => {
            assert!(matches!(callee.kind, ExprKind::Lambda(..)));
            assert_eq!(args.len(), 1);
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn precedence_mul_binds_tighter_than_add() {
    let module = parse_ok(
        "module t/m\n\
         export func f() -> Int = 1 + 2 * 3",
    );
    let f = only_func(&module);
    match &f.body.kind {
        ExprKind::Binary(BinOp::Add, _, rhs) => {
            assert!(matches!(rhs.kind, ExprKind::Binary(BinOp::Mul, _, _)));
        }
        other => panic!("expected addition at the top, got {:?}", other),
    }
}

#[test]
fn comparison_binds_looser_than_arithmetic() {
    let module = parse_ok(
        "module t/m\n\
         export func f(n: Int) -> Bool = n - 1 < n + 1",
    );
    let f = only_func(&module);
    assert!(matches!(f.body.kind, ExprKind::Binary(BinOp::Lt, _, _)));
}

#[test]
fn constructor_application_is_not_a_call() {
    let module = parse_ok(
        "module t/m\n\
         type Option[a] = Some(a) | None\n\
         export func f() -> Option[Int] = Some(3)",
    );
    let funcs: Vec<&FuncDecl> = module
        .decls
        .iter()
        .filter_map(|d| match d {
            Decl::Func(f) => Some(f),
            _ => None,
        })
        .collect();
    assert!(matches!(funcs[0].body.kind, ExprKind::Ctor(ref n, ref args) if n == "Some" && args.len() == 1));
}

#[test]
fn parse_error_is_reported_not_panicked() {
    let out = parse_module("module t/m\nexport func f( -> Int = 1");
    assert!(!out.errors.is_empty());
}

#[test]
fn missing_module_header_is_an_error() {
    let out = parse_module("export func f() -> Int = 1");
    assert!(out.module.is_none());
    assert!(!out.errors.is_empty());
}
