//! Lowering analysed trees to LLVM IR and running the result on the JIT.

use inkwell::context::Context;
use inkwell::execution_engine::{ExecutionEngine, JitFunction, UnsafeFunctionPointer};
use inkwell::module::Module;
use inkwell::targets::{InitializationConfig, Target};
use inkwell::OptimizationLevel;
use quill_ast::*;
use quill_codegen::{generate, CodegenError};
use quill_common::Span;
use quill_typeck::check;
use quill_types::{defaults, TypeId};

// ── Helpers ─────────────────────────────────────────────────────────

fn func(name: &str, params: &[(&str, &str)], ret: &str, stmts: Vec<Expr>) -> Function {
    Function {
        name: name.to_string(),
        params: params
            .iter()
            .map(|(name, ty)| Param {
                name: name.to_string(),
                ty: TypeExpr::named(*ty),
                span: Span::default(),
            })
            .collect(),
        return_type: TypeExpr::named(ret),
        body: Block::new(stmts, Span::default()),
        span: Span::default(),
        signature: TypeId::UNSET,
    }
}

/// Analyse then lower; analysis is expected to succeed.
fn compile(context: &Context, functions: Vec<Function>) -> Result<Module<'_>, CodegenError> {
    let (mut types, special) = defaults::standard(context);
    let mut file = File { functions };
    let result = check(&mut file, &mut types, &special);
    assert!(result.is_ok(), "{:?}", result.errors);
    generate(context, &file, &types, &special, "test")
}

fn lower(context: &Context, functions: Vec<Function>) -> Module<'_> {
    match compile(context, functions) {
        Ok(module) => module,
        Err(err) => panic!("lowering failed: {err}"),
    }
}

fn ir(module: &Module<'_>) -> String {
    module.print_to_string().to_string()
}

fn jit<'ctx>(module: &Module<'ctx>) -> ExecutionEngine<'ctx> {
    Target::initialize_native(&InitializationConfig::default()).expect("native target");
    module
        .create_jit_execution_engine(OptimizationLevel::None)
        .expect("JIT engine")
}

fn function<'ctx, F: UnsafeFunctionPointer>(ee: &ExecutionEngine<'ctx>, name: &str) -> JitFunction<'ctx, F> {
    unsafe { ee.get_function::<F>(name) }.unwrap_or_else(|err| panic!("{name}: {err}"))
}

fn let_(name: &str, ty: &str, init: Expr) -> Let {
    Let::new(name, Some(TypeExpr::named(ty)), Some(init), Span::default())
}

fn block(stmts: Vec<Expr>) -> Block {
    Block::new(stmts, Span::default())
}

fn assign(name: &str, value: Expr) -> Expr {
    Expr::binary("=", Expr::ident(name), value)
}

fn ret(value: Expr) -> Expr {
    Expr::Return(Return {
        value: Some(Box::new(value)),
        span: Span::default(),
        ty: TypeId::UNSET,
    })
}

fn if_(cond: Expr, then: Vec<Expr>, els: Option<Vec<Expr>>, form: IfForm) -> Expr {
    Expr::If(If {
        init: None,
        cond: Box::new(cond),
        then_branch: block(then),
        else_branch: els.map(block),
        form,
        span: Span::default(),
        ty: TypeId::UNSET,
    })
}

// ── Functions and operators ─────────────────────────────────────────

#[test]
fn parameters_are_spilled_to_slots() {
    let add = func(
        "add",
        &[("a", "i32"), ("b", "i32")],
        "i32",
        vec![Expr::binary("+", Expr::ident("a"), Expr::ident("b"))],
    );
    let context = Context::create();
    let module = lower(&context, vec![add]);
    let text = ir(&module);
    assert!(text.starts_with("; ModuleID = 'test'"), "{text}");
    assert!(text.contains("define i32 @add(i32 %a, i32 %b) {"), "{text}");
    assert!(text.contains("%a.addr = alloca i32"), "{text}");
    assert!(text.contains("store i32 %a, ptr %a.addr"), "{text}");
    assert!(text.contains("%a1 = load i32, ptr %a.addr"), "{text}");
    assert!(text.contains("%add = add i32 %a1, %b1"), "{text}");
    assert!(text.contains("ret i32 %add"), "{text}");

    let ee = jit(&module);
    let add = function::<unsafe extern "C" fn(i32, i32) -> i32>(&ee, "add");
    assert_eq!(unsafe { add.call(40, 2) }, 42);
}

#[test]
fn mixed_literals_fold_to_a_float_constant() {
    let f = func(
        "f",
        &[],
        "f64",
        vec![Expr::binary("+", Expr::int(1), Expr::float(2.0))],
    );
    let context = Context::create();
    let module = lower(&context, vec![f]);
    let text = ir(&module);
    assert!(text.contains("ret double 3.000000e+00"), "{text}");
    assert!(!text.contains("sitofp") && !text.contains("uitofp"), "{text}");
}

#[test]
fn widening_cast_is_emitted() {
    let f = func(
        "widen",
        &[("a", "u8"), ("b", "i32")],
        "i32",
        vec![Expr::binary("*", Expr::ident("a"), Expr::ident("b"))],
    );
    let context = Context::create();
    let module = lower(&context, vec![f]);
    let text = ir(&module);
    assert!(text.contains("zext i8"), "{text}");
    let ee = jit(&module);
    let widen = function::<unsafe extern "C" fn(u8, i32) -> i32>(&ee, "widen");
    assert_eq!(unsafe { widen.call(200, 3) }, 600);
}

#[test]
fn assignment_stores_back_to_the_slot() {
    let bump = func(
        "bump",
        &[("x", "i32")],
        "i32",
        vec![
            assign("x", Expr::binary("+", Expr::ident("x"), Expr::int(1))),
            Expr::ident("x"),
        ],
    );
    let context = Context::create();
    let module = lower(&context, vec![bump]);
    let text = ir(&module);
    assert!(text.contains("store i32 %add, ptr %x.addr"), "{text}");
    let ee = jit(&module);
    let bump = function::<unsafe extern "C" fn(i32) -> i32>(&ee, "bump");
    assert_eq!(unsafe { bump.call(41) }, 42);
}

#[test]
fn negation_of_a_local() {
    let body = vec![
        if_(
            Expr::binary("<", Expr::ident("x"), Expr::int(0)),
            vec![assign(
                "x",
                Expr::Unary(Unary::new("-", Expr::ident("x"), Span::default())),
            )],
            None,
            IfForm::Statement,
        ),
        Expr::ident("x"),
    ];
    let context = Context::create();
    let module = lower(&context, vec![func("abs", &[("x", "i32")], "i32", body)]);
    let ee = jit(&module);
    let abs = function::<unsafe extern "C" fn(i32) -> i32>(&ee, "abs");
    assert_eq!(unsafe { abs.call(-5) }, 5);
    assert_eq!(unsafe { abs.call(7) }, 7);
}

#[test]
fn calls_resolve_earlier_functions() {
    let double = func(
        "double",
        &[("a", "i32")],
        "i32",
        vec![Expr::binary("+", Expr::ident("a"), Expr::ident("a"))],
    );
    let quad = func(
        "quad",
        &[("a", "i32")],
        "i32",
        vec![Expr::call(
            "double",
            vec![Expr::call("double", vec![Expr::ident("a")])],
        )],
    );
    let context = Context::create();
    let module = lower(&context, vec![double, quad]);
    let text = ir(&module);
    assert!(text.contains("call i32 @double(i32 %a1)"), "{text}");
    let ee = jit(&module);
    let quad = function::<unsafe extern "C" fn(i32) -> i32>(&ee, "quad");
    assert_eq!(unsafe { quad.call(3) }, 12);
}

#[test]
fn locals_without_an_initializer_are_still_allocated() {
    let f = func(
        "f",
        &[],
        "",
        vec![Expr::Let(Let::new(
            "slot",
            Some(TypeExpr::named("u16")),
            None,
            Span::default(),
        ))],
    );
    let context = Context::create();
    let module = lower(&context, vec![f]);
    let text = ir(&module);
    assert!(text.contains("%slot = alloca i16"), "{text}");
    assert!(text.contains("ret void"), "{text}");
}

// ── Control flow ────────────────────────────────────────────────────

#[test]
fn if_expression_merges_through_a_phi() {
    let pick = func(
        "pick",
        &[("c", "bool"), ("x", "i64")],
        "i64",
        vec![if_(
            Expr::ident("c"),
            vec![Expr::ident("x")],
            Some(vec![Expr::int(7)]),
            IfForm::Expression,
        )],
    );
    let context = Context::create();
    let module = lower(&context, vec![pick]);
    let text = ir(&module);
    assert!(
        text.contains("%iftmp = phi i64 [ %x1, %then ], [ 7, %else ]"),
        "{text}"
    );
    let ee = jit(&module);
    let pick = function::<unsafe extern "C" fn(bool, i64) -> i64>(&ee, "pick");
    assert_eq!(unsafe { pick.call(true, 3) }, 3);
    assert_eq!(unsafe { pick.call(false, 3) }, 7);
}

#[test]
fn returning_arm_is_left_out_of_the_phi() {
    let f = func(
        "f",
        &[("c", "bool")],
        "i32",
        vec![if_(
            Expr::ident("c"),
            vec![ret(Expr::int(1))],
            Some(vec![Expr::int(2)]),
            IfForm::Expression,
        )],
    );
    let context = Context::create();
    let module = lower(&context, vec![f]);
    let text = ir(&module);
    assert!(text.contains("%iftmp = phi i32 [ 2, %else ]"), "{text}");
    let ee = jit(&module);
    let f = function::<unsafe extern "C" fn(bool) -> i32>(&ee, "f");
    assert_eq!(unsafe { f.call(true) }, 1);
    assert_eq!(unsafe { f.call(false) }, 2);
}

#[test]
fn returning_arm_of_a_wider_type_still_merges() {
    // fn f(c: bool, x: i64, y: i32) -> i64 { if c { return x } else { y } }
    let f = func(
        "f",
        &[("c", "bool"), ("x", "i64"), ("y", "i32")],
        "i64",
        vec![if_(
            Expr::ident("c"),
            vec![ret(Expr::ident("x"))],
            Some(vec![Expr::ident("y")]),
            IfForm::Expression,
        )],
    );
    let context = Context::create();
    let module = lower(&context, vec![f]);
    let ee = jit(&module);
    let f = function::<unsafe extern "C" fn(bool, i64, i32) -> i64>(&ee, "f");
    assert_eq!(unsafe { f.call(true, 1 << 40, 5) }, 1 << 40);
    assert_eq!(unsafe { f.call(false, 1 << 40, -5) }, -5);
}

#[test]
fn both_arms_returning_leaves_merge_unreachable() {
    let f = func(
        "f",
        &[("c", "bool")],
        "i32",
        vec![
            if_(
                Expr::ident("c"),
                vec![ret(Expr::int(1))],
                Some(vec![ret(Expr::int(2))]),
                IfForm::Statement,
            ),
            Expr::int(0),
        ],
    );
    let context = Context::create();
    let module = lower(&context, vec![f]);
    let text = ir(&module);
    assert!(text.contains("merge:"), "{text}");
    assert!(text.contains("unreachable"), "{text}");
    assert!(!text.contains("phi"), "{text}");
    let ee = jit(&module);
    let f = function::<unsafe extern "C" fn(bool) -> i32>(&ee, "f");
    assert_eq!(unsafe { f.call(false) }, 2);
}

#[test]
fn counting_loop_runs_to_completion() {
    let sum = func(
        "sum",
        &[("n", "u32")],
        "u32",
        vec![
            Expr::Let(let_("s", "u32", Expr::int(0))),
            Expr::Loop(Loop {
                init: Some(Box::new(let_("i", "u32", Expr::int(1)))),
                cond: Some(Box::new(Expr::binary(
                    "<=",
                    Expr::ident("i"),
                    Expr::ident("n"),
                ))),
                post: Some(Box::new(assign(
                    "i",
                    Expr::binary("+", Expr::ident("i"), Expr::int(1)),
                ))),
                body: block(vec![assign(
                    "s",
                    Expr::binary("+", Expr::ident("s"), Expr::ident("i")),
                )]),
                span: Span::default(),
                ty: TypeId::UNSET,
            }),
            Expr::ident("s"),
        ],
    );
    let context = Context::create();
    let module = lower(&context, vec![sum]);
    let text = ir(&module);
    assert!(text.contains("loop:"), "{text}");
    assert!(text.contains("after:"), "{text}");
    let ee = jit(&module);
    let sum = function::<unsafe extern "C" fn(u32) -> u32>(&ee, "sum");
    assert_eq!(unsafe { sum.call(4) }, 10);
    assert_eq!(unsafe { sum.call(0) }, 0);
}

#[test]
fn loop_value_is_the_last_body_value() {
    // fn f(n: i32) -> i32 { let y: i32 = loop (n > 0; n = n - 1) { n }; y }
    let counted = Expr::Loop(Loop {
        init: None,
        cond: Some(Box::new(Expr::binary(
            ">",
            Expr::ident("n"),
            Expr::int(0),
        ))),
        post: Some(Box::new(assign(
            "n",
            Expr::binary("-", Expr::ident("n"), Expr::int(1)),
        ))),
        body: block(vec![Expr::ident("n")]),
        span: Span::default(),
        ty: TypeId::UNSET,
    });
    let f = func(
        "f",
        &[("n", "i32")],
        "i32",
        vec![Expr::Let(let_("y", "i32", counted)), Expr::ident("y")],
    );
    let context = Context::create();
    let module = lower(&context, vec![f]);
    let text = ir(&module);
    assert!(text.contains("%loop.result = alloca i32"), "{text}");
    assert!(text.contains("%loop.value = load i32, ptr %loop.result"), "{text}");
    let ee = jit(&module);
    let f = function::<unsafe extern "C" fn(i32) -> i32>(&ee, "f");
    assert_eq!(unsafe { f.call(3) }, 1);
    // A body that never runs leaves the zero the slot started with.
    assert_eq!(unsafe { f.call(0) }, 0);
}

#[test]
fn string_literals_are_not_lowered() {
    let context = Context::create();
    let (mut types, special) = defaults::standard(&context);
    let mut f = func(
        "f",
        &[],
        "",
        vec![Expr::Literal(Literal::new(
            LiteralValue::Str("hi".into()),
            Span::default(),
        ))],
    );
    f.signature = types.intern_function(&[], TypeId::VOID);
    let file = File { functions: vec![f] };
    let err = generate(&context, &file, &types, &special, "test")
        .expect_err("strings have no lowering");
    assert!(
        matches!(err, CodegenError::Unimplemented("string literals")),
        "{err:?}"
    );
}

#[test]
fn undefaulted_literal_is_an_internal_error() {
    let context = Context::create();
    let (mut types, special) = defaults::standard(&context);
    let mut lit = Literal::new(LiteralValue::Int(3), Span::default());
    lit.assign_type(TypeId::U_LITERAL);
    let mut f = func("f", &[], "", vec![Expr::Literal(lit)]);
    f.signature = types.intern_function(&[], TypeId::VOID);
    let file = File { functions: vec![f] };
    let err = generate(&context, &file, &types, &special, "test")
        .expect_err("literal kind reached codegen");
    assert!(err.is_internal(), "{err:?}");
}

#[test]
fn functions_that_fail_verification_are_removed() {
    // A `u8` body value returned from a function declared `i32` slips past
    // analysis only on a hand-built tree that skips it.
    let context = Context::create();
    let (mut types, special) = defaults::standard(&context);
    let mut lit = Literal::new(LiteralValue::Int(3), Span::default());
    lit.assign_type(TypeId::U8);
    let mut f = func("f", &[], "i32", vec![Expr::Literal(lit)]);
    f.signature = types.intern_function(&[], TypeId::I32);
    let file = File { functions: vec![f] };
    let err = generate(&context, &file, &types, &special, "test")
        .expect_err("return type mismatch");
    assert!(
        matches!(&err, CodegenError::Verification { function, .. } if function == "f"),
        "{err:?}"
    );
}
