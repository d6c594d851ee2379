//! End-to-end tests for the `quillc` binary.
//!
//! Each test writes a JSON syntax tree to a temp dir, invokes the binary,
//! and checks its exit status and output.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{json, Value};

// ── Helpers ─────────────────────────────────────────────────────────

fn quillc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_quillc"))
}

fn write_tree(dir: &Path, tree: &Value) -> PathBuf {
    let path = dir.join("tree.json");
    std::fs::write(&path, tree.to_string()).expect("failed to write tree.json");
    path
}

fn invoke(args: &[&str]) -> Output {
    quillc()
        .args(args)
        .env("QUILL_LOG", "off")
        .output()
        .expect("failed to invoke quillc")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn id(name: &str) -> Value {
    json!({"type": "id", "val": name})
}

fn int(value: u64) -> Value {
    json!({"type": "literal", "val": {"tag": "IntegerLiteral", "contents": value}})
}

fn chain(lhs: Value, rest: &[(&str, Value)]) -> Value {
    let rhs: Vec<Value> = rest
        .iter()
        .map(|(op, operand)| json!({"op": op, "rhsOperand": operand}))
        .collect();
    json!({"lhs": lhs, "rhs": rhs})
}

fn expr_stmt(expr: Value) -> Value {
    json!({"type": "expr", "return": false, "expr": expr})
}

fn func(name: &str, params: &[(&str, &str)], ret: &str, body: Vec<Value>) -> Value {
    let params: Vec<Value> = params
        .iter()
        .map(|(name, ty)| json!({"varName": name, "varType": ty}))
        .collect();
    json!({"funcName": name, "funcParams": params, "funcReturn": ret, "funcBody": body})
}

fn file(functions: Vec<Value>) -> Value {
    json!({ "functions": functions })
}

fn add_tree() -> Value {
    file(vec![func(
        "add",
        &[("a", "i32"), ("b", "i32")],
        "i32",
        vec![expr_stmt(chain(id("a"), &[("+", id("b"))]))],
    )])
}

/// `fact(n) = if n < 2 { 1 } else { n * fact(n - 1) }`
fn fact_tree() -> Value {
    let recurse = json!({
        "type": "call",
        "val": {"callable": "fact", "callParams": [chain(id("n"), &[("-", int(1))])]}
    });
    let branch = json!({
        "type": "if",
        "val": {
            "cond": chain(id("n"), &[("<", int(2))]),
            "then": [expr_stmt(chain(int(1), &[]))],
            "else": [expr_stmt(chain(id("n"), &[("*", recurse)]))],
            "isExpr": true
        }
    });
    file(vec![func(
        "fact",
        &[("n", "u64")],
        "u64",
        vec![expr_stmt(chain(branch, &[]))],
    )])
}

// ── build ───────────────────────────────────────────────────────────

#[test]
fn build_prints_the_module() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let tree = write_tree(dir.path(), &add_tree());
    let output = invoke(&["build", tree.to_str().unwrap(), "--module-name", "demo"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let ir = stdout(&output);
    assert!(ir.starts_with("; ModuleID = 'demo'"), "{ir}");
    assert!(ir.contains("define i32 @add(i32 %a, i32 %b) {"), "{ir}");
    assert!(ir.contains("%add = add i32 %a1, %b1"), "{ir}");
}

#[test]
fn build_writes_the_ir_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let tree = write_tree(dir.path(), &add_tree());
    let ir_path = dir.path().join("out.ll");
    let output = invoke(&[
        "build",
        tree.to_str().unwrap(),
        "--emit-ir",
        ir_path.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).is_empty());
    let ir = std::fs::read_to_string(&ir_path).expect("IR file written");
    assert!(ir.contains("ret i32 %add"), "{ir}");
}

#[test]
fn missing_input_is_reported() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let missing = dir.path().join("nope.json");
    let output = invoke(&["build", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("error: failed to read"), "{}", stderr(&output));
}

// ── check ───────────────────────────────────────────────────────────

#[test]
fn check_reports_unbound_names_with_a_code() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let tree = file(vec![func(
        "f",
        &[],
        "i32",
        vec![expr_stmt(chain(id("y"), &[]))],
    )]);
    let tree = write_tree(dir.path(), &tree);
    let output = invoke(&["check", tree.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("error[Q0002]: cannot find `y` in this scope"), "{err}");
    assert!(err.contains("error: analysis failed with 1 error(s)"), "{err}");
}

#[test]
fn check_renders_against_the_source() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let source = "fn f() -> i32 { y }";
    let source_path = dir.path().join("f.ql");
    std::fs::write(&source_path, source).expect("failed to write source");
    let mut expr = chain(id("y"), &[]);
    expr["span"] = json!([16, 17]);
    let tree = write_tree(
        dir.path(),
        &file(vec![func("f", &[], "i32", vec![expr_stmt(expr)])]),
    );
    let output = invoke(&[
        "check",
        tree.to_str().unwrap(),
        "--source",
        source_path.to_str().unwrap(),
        "--no-color",
    ]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("[Q0002]"), "{err}");
    assert!(err.contains("f.ql"), "{err}");
    assert!(err.contains("not found"), "{err}");
    assert!(!err.contains('\u{1b}'), "{err}");
}

#[test]
fn check_rejects_an_if_value_without_else() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let branch = json!({
        "type": "if",
        "val": {"cond": chain(id("c"), &[]), "then": [expr_stmt(chain(int(1), &[]))]}
    });
    let tree = file(vec![func(
        "f",
        &[("c", "bool")],
        "i32",
        vec![expr_stmt(chain(int(1), &[("+", branch)]))],
    )]);
    let tree = write_tree(dir.path(), &tree);
    let output = invoke(&["check", tree.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr(&output).contains("needs an `else` branch"),
        "{}",
        stderr(&output)
    );
}

#[test]
fn check_accepts_a_valid_tree() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let tree = write_tree(dir.path(), &fact_tree());
    let output = invoke(&["check", tree.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("Checked 1 function(s)"));
}

// ── run ─────────────────────────────────────────────────────────────

#[test]
fn run_executes_a_recursive_function() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let tree = write_tree(dir.path(), &fact_tree());
    let output = invoke(&["run", tree.to_str().unwrap(), "--entry", "fact", "5"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "120");
}

#[test]
fn run_accepts_negative_arguments() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let tree = write_tree(dir.path(), &add_tree());
    let output = invoke(&["run", tree.to_str().unwrap(), "--entry", "add", "-7", "3"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "-4");
}

#[test]
fn run_checks_the_argument_count() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let tree = write_tree(dir.path(), &add_tree());
    let output = invoke(&["run", tree.to_str().unwrap(), "--entry", "add", "1"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr(&output).contains("`add` takes 2 argument(s), got 1"),
        "{}",
        stderr(&output)
    );
}
