use looplens_script::ast::{ExprKind, FunctionBody, Stmt};
use looplens_script::{ScriptError, parse, parse_with_limit};

#[test]
fn test_parses_example_script() {
    let source = r#"console.log('Start');

setTimeout(() => {
  console.log('Macrotask');
}, 0);

console.log('End');"#;
    let program = parse(source).unwrap();
    assert_eq!(program.body.len(), 3);

    let Stmt::Expr(call) = &program.body[1] else {
        panic!("expected expression statement");
    };
    assert_eq!(call.line, 3);
    let ExprKind::Call { args, .. } = &call.kind else {
        panic!("expected call");
    };
    assert_eq!(args.len(), 2);
    let ExprKind::Function(def) = &args[0].kind else {
        panic!("expected arrow function");
    };
    assert!(matches!(def.body, FunctionBody::Block(ref body) if body.len() == 1));
}

#[test]
fn test_arrow_forms() {
    let program = parse("const a = x => x;\nconst b = (x, y) => { return x; };\nconst c = () => 1;").unwrap();
    assert_eq!(program.body.len(), 3);
    for stmt in &program.body {
        let Stmt::Declare { init: Some(init), .. } = stmt else {
            panic!("expected declaration");
        };
        assert!(matches!(init.kind, ExprKind::Function(_)));
    }
}

#[test]
fn test_parenthesized_expression_is_not_an_arrow() {
    let program = parse("const a = (1 + 2) * 3;").unwrap();
    let Stmt::Declare { init: Some(init), .. } = &program.body[0] else {
        panic!("expected declaration");
    };
    assert!(matches!(init.kind, ExprKind::Binary { .. }));
}

#[test]
fn test_semicolons_are_optional() {
    let program = parse("let a = 1\nlet b = 2\nconsole.log(a + b)").unwrap();
    assert_eq!(program.body.len(), 3);
}

#[test]
fn test_unsupported_keywords_are_rejected() {
    let err = parse("const p = new Promise(r => r());").err().unwrap();
    assert_eq!(err, ScriptError::syntax(1, "`new` is not supported"));

    let err = parse("async function f() {}").err().unwrap();
    assert!(err.is_syntax());
}

#[test]
fn test_return_outside_function_is_rejected() {
    let err = parse("console.log(1);\nreturn 2;").err().unwrap();
    assert_eq!(err.line(), Some(2));
}

#[test]
fn test_break_outside_loop_is_rejected() {
    assert!(parse("function f() { break; }").is_err());
    assert!(parse("while (true) { const g = () => { break; }; }").is_err());
    assert!(parse("while (true) { break; }").is_ok());
}

#[test]
fn test_unbalanced_braces_report_error() {
    let err = parse("setTimeout(() => {\n  console.log('x');\n, 0);").err().unwrap();
    assert!(err.is_syntax());
    assert!(err.to_string().starts_with("SyntaxError:"));
}

#[test]
fn test_member_assignment_is_rejected() {
    assert!(parse("console.log = 1;").is_err());
}

#[test]
fn test_nesting_limit_counts_each_level() {
    assert!(parse_with_limit("((1));", 4).is_ok());
    let err = parse_with_limit("(((1)));", 4).err().unwrap();
    assert!(matches!(err, ScriptError::Syntax { line: 1, .. }));
    assert!(err.to_string().contains("nested too deeply"));
}

#[test]
fn test_realistic_nesting_parses() {
    let parens = format!("console.log({}1{});", "(".repeat(20), ")".repeat(20));
    assert!(parse(&parens).is_ok());

    let blocks = format!("{}console.log(1);{}", "{".repeat(20), "}".repeat(20));
    assert!(parse(&blocks).is_ok());

    let sum = vec!["1"; 40].join(" + ");
    assert!(parse(&format!("console.log({sum});")).is_ok());

    let chain = ".then(() => 1)".repeat(15);
    assert!(parse(&format!("Promise.resolve(1){chain};")).is_ok());
}

#[test]
fn test_pathological_nesting_is_a_syntax_error() {
    for source in [
        format!("console.log({}1{});", "(".repeat(3_000), ")".repeat(3_000)),
        format!("{}{}", "{".repeat(3_000), "}".repeat(3_000)),
        format!("console.log({}1);", "!".repeat(3_000)),
        format!("console.log({});", vec!["1"; 3_000].join(" + ")),
        format!("const f = {}1;", "x => ".repeat(3_000)),
    ] {
        let err = parse(&source).err().unwrap();
        assert!(err.to_string().contains("nested too deeply"), "{err}");
    }
}
