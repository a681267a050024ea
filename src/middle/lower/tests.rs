use pretty_assertions::assert_eq;

use crate::frontend::{
    Span,
    ast::{self, BinaryOperatorKind, ExpressionKind, StatementKind},
    intern::Symbol,
};
use crate::middle::{
    ir,
    lower::{LowerCtx, collect_signatures, lower_function, lower_unit},
    tables::{RecursionSets, Signature, SignatureTable, TypeIndex},
};

fn sym(s: &str) -> Symbol {
    Symbol::new(s)
}

fn expr(kind: ExpressionKind) -> ast::Expression {
    ast::Expression::new(kind, Span::DUMMY)
}

fn ident(name: &str) -> ast::Expression {
    expr(ExpressionKind::Identifier(sym(name)))
}

fn num(text: &str) -> ast::Expression {
    expr(ExpressionKind::NumberLit(sym(text)))
}

fn string(text: &str) -> ast::Expression {
    expr(ExpressionKind::StringLit(sym(text)))
}

fn binary(op: BinaryOperatorKind, lhs: ast::Expression, rhs: ast::Expression) -> ast::Expression {
    expr(ExpressionKind::Binary {
        operator: op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

fn call(name: &str, args: Vec<ast::Expression>) -> ast::Expression {
    expr(ExpressionKind::Call(Box::new(ast::CallExpr {
        span: Span::DUMMY,
        name: sym(name),
        args,
    })))
}

fn ternary(
    cond: ast::Expression,
    then_value: ast::Expression,
    else_value: ast::Expression,
) -> ast::Expression {
    expr(ExpressionKind::Conditional(Box::new(ast::ConditionalExpr {
        span: Span::DUMMY,
        condition: cond,
        then_value,
        else_value,
    })))
}

fn stmt(kind: StatementKind) -> ast::Statement {
    ast::Statement {
        span: Span::DUMMY,
        kind,
    }
}

fn var_stmt(name: &str, ty: Option<&str>, init: Option<ast::Expression>) -> ast::Statement {
    stmt(StatementKind::Var(Box::new(ast::VarDecl {
        span: Span::DUMMY,
        name: sym(name),
        ty: ty.map(sym),
        init,
    })))
}

fn assign_stmt(name: &str, value: ast::Expression) -> ast::Statement {
    stmt(StatementKind::Assign(Box::new(ast::AssignStmt {
        span: Span::DUMMY,
        name: sym(name),
        value,
    })))
}

fn return_stmt(results: Vec<ast::Expression>) -> ast::Statement {
    stmt(StatementKind::Return(Box::new(ast::ReturnStmt {
        span: Span::DUMMY,
        results,
    })))
}

fn expr_stmt(e: ast::Expression) -> ast::Statement {
    stmt(StatementKind::Expr(Box::new(e)))
}

fn block(statements: Vec<ast::Statement>) -> ast::Block {
    ast::Block {
        span: Span::DUMMY,
        statements,
    }
}

fn if_stmt(
    cond: ast::Expression,
    then_block: Vec<ast::Statement>,
    else_block: Option<Vec<ast::Statement>>,
) -> ast::Statement {
    stmt(StatementKind::If(Box::new(ast::IfStmt {
        span: Span::DUMMY,
        condition: cond,
        then_block: block(then_block),
        else_block: else_block.map(block),
    })))
}

fn function_decl(
    name: &str,
    params: &[(&str, &str)],
    results: &[&str],
    body: Vec<ast::Statement>,
) -> ast::FunctionDecl {
    ast::FunctionDecl {
        span: Span::DUMMY,
        name: sym(name),
        params: params
            .iter()
            .map(|(name, ty)| ast::Parameter {
                span: Span::DUMMY,
                name: sym(name),
                ty: sym(ty),
            })
            .collect(),
        results: results.iter().map(|ty| sym(ty)).collect(),
        decorators: Vec::new(),
        body: block(body),
    }
}

fn lower_with(
    signatures: &SignatureTable,
    types: &TypeIndex,
    function: &ast::FunctionDecl,
) -> ir::Function {
    let mut ctx = LowerCtx::new(signatures, types);
    lower_function(&mut ctx, function)
}

fn lower_one(function: &ast::FunctionDecl) -> ir::Function {
    lower_with(&SignatureTable::new(), &TypeIndex::new(), function)
}

fn all_instructions(function: &ir::Function) -> Vec<&ir::Instruction> {
    function
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .collect()
}

fn block_named<'a>(function: &'a ir::Function, name: &str) -> &'a ir::Block {
    function
        .blocks
        .iter()
        .find(|b| b.name == sym(name))
        .unwrap_or_else(|| panic!("no block named {name}"))
}

fn count_matching(function: &ir::Function, predicate: impl Fn(&ir::Instruction) -> bool) -> usize {
    all_instructions(function)
        .into_iter()
        .filter(|i| predicate(i))
        .count()
}

fn lit_text(instruction: &ir::Instruction) -> Option<&'static str> {
    match instruction {
        ir::Instruction::Expr(ir::Expr {
            op: ir::ExprOp::Lit(text),
            ..
        }) => Some(text.value()),
        _ => None,
    }
}

fn mentions_ident(block: &ir::Block, name: &str) -> bool {
    block.instructions.iter().any(|i| match i {
        ir::Instruction::Expr(e) => {
            matches!(e.op, ir::ExprOp::Ident)
                && e.result.is_some_and(|r| r.id == sym(name))
        }
        _ => false,
    })
}

#[test]
fn lowering_is_deterministic() {
    let f = function_decl(
        "F",
        &[("a", "bool"), ("b", "bool")],
        &["int"],
        vec![
            var_stmt(
                "x",
                None,
                Some(binary(BinaryOperatorKind::LogicalOr, ident("a"), ident("b"))),
            ),
            if_stmt(
                ident("x"),
                vec![assign_stmt("y", num("1"))],
                Some(vec![assign_stmt("y", num("2"))]),
            ),
            return_stmt(vec![ident("y")]),
        ],
    );

    let first = lower_one(&f);
    let second = lower_one(&f);
    assert_eq!(format!("{first:?}"), format!("{second:?}"));
}

#[test]
fn constant_folding_produces_single_literal() {
    // 1 + 2*3 + 0x10 initializes x with one literal instruction
    let f = function_decl(
        "F",
        &[],
        &[],
        vec![var_stmt(
            "x",
            None,
            Some(binary(
                BinaryOperatorKind::Add,
                binary(
                    BinaryOperatorKind::Add,
                    num("1"),
                    binary(BinaryOperatorKind::Multiply, num("2"), num("3")),
                ),
                num("0x10"),
            )),
        )],
    );

    let lowered = lower_one(&f);
    let entry = block_named(&lowered, "entry");
    assert_eq!(lit_text(&entry.instructions[1]), Some("23"));
    assert_eq!(
        count_matching(&lowered, |i| {
            matches!(i, ir::Instruction::Expr(e) if matches!(e.op, ir::ExprOp::Binary(_)))
        }),
        0
    );
}

#[test]
fn string_concatenation_folds() {
    let f = function_decl(
        "F",
        &[],
        &[],
        vec![var_stmt(
            "s",
            None,
            Some(binary(
                BinaryOperatorKind::Add,
                binary(BinaryOperatorKind::Add, string("a"), string("b")),
                string("c"),
            )),
        )],
    );

    let lowered = lower_one(&f);
    let entry = block_named(&lowered, "entry");
    assert_eq!(lit_text(&entry.instructions[1]), Some("\"abc\""));
}

#[test]
fn logical_or_shape() {
    let f = function_decl(
        "F",
        &[("a", "bool"), ("b", "bool")],
        &[],
        vec![var_stmt(
            "r",
            None,
            Some(binary(BinaryOperatorKind::LogicalOr, ident("a"), ident("b"))),
        )],
    );

    let lowered = lower_one(&f);

    assert_eq!(
        count_matching(&lowered, |i| matches!(i, ir::Instruction::CondBr { .. })),
        1
    );
    assert_eq!(
        count_matching(&lowered, |i| matches!(i, ir::Instruction::Phi { .. })),
        1
    );

    // For ||, the then branch short-circuits to literal true and must not
    // evaluate b; the else branch evaluates b.
    let then_block = block_named(&lowered, "sc_then0");
    assert!(!mentions_ident(then_block, "b"));
    assert!(then_block.instructions.iter().any(|i| lit_text(i) == Some("1")));

    let else_block = block_named(&lowered, "sc_else0");
    assert!(mentions_ident(else_block, "b"));
}

#[test]
fn logical_and_shape() {
    let f = function_decl(
        "F",
        &[("a", "bool"), ("b", "bool")],
        &[],
        vec![var_stmt(
            "r",
            None,
            Some(binary(BinaryOperatorKind::LogicalAnd, ident("a"), ident("b"))),
        )],
    );

    let lowered = lower_one(&f);

    // For &&, the then branch evaluates b and the else branch
    // short-circuits to literal false.
    let then_block = block_named(&lowered, "sc_then0");
    assert!(mentions_ident(then_block, "b"));

    let else_block = block_named(&lowered, "sc_else0");
    assert!(!mentions_ident(else_block, "b"));
    assert!(else_block.instructions.iter().any(|i| lit_text(i) == Some("0")));

    // The phi merges by source block label.
    let join_block = block_named(&lowered, "sc_join0");
    match &join_block.instructions[0] {
        ir::Instruction::Phi { incomings, .. } => {
            assert_eq!(incomings.len(), 2);
            assert_eq!(incomings[0].label, sym("sc_then0"));
            assert_eq!(incomings[1].label, sym("sc_else0"));
        }
        other => panic!("expected phi, got {other:?}"),
    }
}

#[test]
fn if_else_join_holds_the_continuation() {
    // if cond { x = 1 } else { x = 2 }; return x
    let f = function_decl(
        "F",
        &[("cond", "bool")],
        &["int"],
        vec![
            if_stmt(
                ident("cond"),
                vec![assign_stmt("x", num("1"))],
                Some(vec![assign_stmt("x", num("2"))]),
            ),
            return_stmt(vec![ident("x")]),
        ],
    );

    let lowered = lower_one(&f);
    assert!(lowered.blocks.len() >= 4);

    let returns_in = |name: &str| {
        block_named(&lowered, name)
            .instructions
            .iter()
            .filter(|i| matches!(i, ir::Instruction::Return { .. }))
            .count()
    };
    assert_eq!(returns_in("then0"), 0);
    assert_eq!(returns_in("else0"), 0);
    assert_eq!(returns_in("join0"), 1);

    // Both arms fall through to the join.
    for name in ["then0", "else0"] {
        assert!(matches!(
            block_named(&lowered, name).instructions.last(),
            Some(ir::Instruction::Goto { label }) if *label == sym("join0")
        ));
    }
}

#[test]
fn sibling_conditionals_never_reuse_labels() {
    let f = function_decl(
        "F",
        &[("a", "bool"), ("b", "bool")],
        &[],
        vec![
            if_stmt(ident("a"), vec![assign_stmt("x", num("1"))], None),
            if_stmt(ident("b"), vec![assign_stmt("x", num("2"))], None),
        ],
    );

    let lowered = lower_one(&f);
    let names: Vec<&str> = lowered.blocks.iter().map(|b| b.name.value()).collect();
    let unique: std::collections::BTreeSet<&str> = names.iter().copied().collect();
    assert_eq!(names.len(), unique.len(), "block names must be unique: {names:?}");
    assert!(names.contains(&"then0"));
    assert!(names.contains(&"then1"));
}

#[test]
fn ternary_in_return_position_branches() {
    let mut signatures = SignatureTable::new();
    signatures.insert(
        sym("f"),
        Signature {
            params: Vec::new(),
            param_names: Vec::new(),
            results: vec![sym("int")],
        },
    );
    signatures.insert(
        sym("g"),
        Signature {
            params: Vec::new(),
            param_names: Vec::new(),
            results: vec![sym("int")],
        },
    );

    let f = function_decl(
        "F",
        &[("cond", "bool")],
        &["int"],
        vec![return_stmt(vec![ternary(
            ident("cond"),
            call("f", Vec::new()),
            call("g", Vec::new()),
        )])],
    );

    let lowered = lower_with(&signatures, &TypeIndex::new(), &f);

    // Each arm computes its call in its own block; the join phi feeds the
    // return, which stays in the entry stream.
    assert_eq!(
        count_matching(&lowered, |i| matches!(i, ir::Instruction::Phi { .. })),
        1
    );
    let then_block = block_named(&lowered, "then0");
    assert!(then_block.instructions.iter().any(|i| matches!(
        i,
        ir::Instruction::Expr(e) if e.callee() == Some(sym("f"))
    )));
    let else_block = block_named(&lowered, "else0");
    assert!(else_block.instructions.iter().any(|i| matches!(
        i,
        ir::Instruction::Expr(e) if e.callee() == Some(sym("g"))
    )));

    let entry = block_named(&lowered, "entry");
    match entry.instructions.last() {
        Some(ir::Instruction::Return { values }) => {
            assert_eq!(values.len(), 1);
            assert_eq!(values[0].ty, sym("int"));
        }
        other => panic!("expected return, got {other:?}"),
    }
}

#[test]
fn owned_var_from_string_literal_builds_handle() {
    let f = function_decl(
        "F",
        &[],
        &[],
        vec![var_stmt("h", Some("Owned<slice<uint8>>"), Some(string("abc")))],
    );

    let lowered = lower_one(&f);
    let entry = block_named(&lowered, "entry");

    assert_eq!(lit_text(&entry.instructions[0]), Some("\"abc\""));
    assert_eq!(lit_text(&entry.instructions[1]), Some("3"));
    match &entry.instructions[2] {
        ir::Instruction::Expr(e) => {
            assert_eq!(e.callee(), Some(sym("rill_rt_owned_new")));
            assert_eq!(e.args.len(), 2);
        }
        other => panic!("expected owned_new call, got {other:?}"),
    }
    match &entry.instructions[3] {
        ir::Instruction::Var { name, ty, init, .. } => {
            assert_eq!(*name, sym("h"));
            assert_eq!(*ty, sym("Owned<slice<uint8>>"));
            assert_eq!(init.unwrap().ty, sym("Owned"));
        }
        other => panic!("expected var, got {other:?}"),
    }
}

#[test]
fn owned_assignment_projects_pointer_and_length() {
    let f = function_decl(
        "F",
        &[("x", "Owned"), ("y", "Owned")],
        &[],
        vec![assign_stmt("x", ident("y"))],
    );

    let lowered = lower_one(&f);
    let callees: Vec<Symbol> = all_instructions(&lowered)
        .into_iter()
        .filter_map(|i| match i {
            ir::Instruction::Expr(e) => e.callee(),
            _ => None,
        })
        .collect();

    assert_eq!(
        callees,
        vec![
            sym("rill_rt_owned_ptr"),
            sym("rill_rt_owned_len"),
            sym("rill_rt_owned_new"),
        ]
    );
    assert!(matches!(
        all_instructions(&lowered).last(),
        Some(ir::Instruction::Assign { dest, src }) if *dest == sym("x") && src.ty == sym("Owned")
    ));
}

#[test]
fn release_lowers_to_zeroize() {
    let f = function_decl(
        "F",
        &[("h", "Owned")],
        &[],
        vec![expr_stmt(call("release", vec![ident("h")]))],
    );

    let lowered = lower_one(&f);
    assert!(all_instructions(&lowered).iter().any(|i| matches!(
        i,
        ir::Instruction::Expr(e) if e.callee() == Some(sym("rill_rt_zeroize_owned"))
    )));
}

#[test]
fn deferred_release_is_a_single_marked_instruction() {
    let f = function_decl(
        "F",
        &[("h", "Owned")],
        &[],
        vec![
            stmt(StatementKind::Defer(Box::new(call(
                "release",
                vec![ident("h")],
            )))),
            return_stmt(Vec::new()),
        ],
    );

    let lowered = lower_one(&f);
    let entry = block_named(&lowered, "entry");
    match &entry.instructions[0] {
        ir::Instruction::Defer(e) => {
            assert_eq!(e.callee(), Some(sym("rill_rt_zeroize_owned")));
            assert_eq!(e.args[0].id, sym("h"));
        }
        other => panic!("expected defer, got {other:?}"),
    }
    // One marked instruction; no duplication across exits.
    assert_eq!(
        count_matching(&lowered, |i| matches!(i, ir::Instruction::Defer(_))),
        1
    );
}

#[test]
fn multi_result_call_expands_return_slots() {
    let mut signatures = SignatureTable::new();
    signatures.insert(
        sym("pair"),
        Signature {
            params: Vec::new(),
            param_names: Vec::new(),
            results: vec![sym("int"), sym("error")],
        },
    );

    let f = function_decl(
        "F",
        &[],
        &["int", "error"],
        vec![return_stmt(vec![call("pair", Vec::new())])],
    );

    let lowered = lower_with(&signatures, &TypeIndex::new(), &f);
    let entry = block_named(&lowered, "entry");
    match entry.instructions.last() {
        Some(ir::Instruction::Return { values }) => {
            assert_eq!(values.len(), 2);
            assert_eq!(values[0].ty, sym("int"));
            assert_eq!(values[1].ty, sym("error"));
        }
        other => panic!("expected return, got {other:?}"),
    }
}

#[test]
fn unknown_callee_falls_back_to_any_with_synthesized_names() {
    let f = function_decl(
        "F",
        &[],
        &[],
        vec![expr_stmt(call("mystery", vec![num("1"), num("2")]))],
    );

    let lowered = lower_one(&f);
    let call_expr = all_instructions(&lowered)
        .into_iter()
        .find_map(|i| match i {
            ir::Instruction::Expr(e) if e.callee() == Some(sym("mystery")) => Some(e),
            _ => None,
        })
        .expect("call instruction");

    assert_eq!(call_expr.result.unwrap().ty, sym("any"));
    match &call_expr.op {
        ir::ExprOp::Call(target) => {
            assert_eq!(target.param_names.len(), 2);
            assert_eq!(target.param_names[0], sym("p0"));
            assert_eq!(target.param_names[1], sym("p1"));
        }
        other => panic!("expected call op, got {other:?}"),
    }
}

#[test]
fn nested_call_arguments_are_emitted_first() {
    let f = function_decl(
        "F",
        &[("x", "int")],
        &[],
        vec![expr_stmt(call("h", vec![call("g", vec![ident("x")])]))],
    );

    let lowered = lower_one(&f);
    let entry = block_named(&lowered, "entry");

    let g_index = entry
        .instructions
        .iter()
        .position(|i| matches!(i, ir::Instruction::Expr(e) if e.callee() == Some(sym("g"))))
        .expect("g emitted");
    let h_index = entry
        .instructions
        .iter()
        .position(|i| matches!(i, ir::Instruction::Expr(e) if e.callee() == Some(sym("h"))))
        .expect("h emitted");
    assert!(g_index < h_index);

    // The outer call consumes the nested call's temporary.
    let (g_result, h_args) = match (&entry.instructions[g_index], &entry.instructions[h_index]) {
        (ir::Instruction::Expr(g), ir::Instruction::Expr(h)) => {
            (g.result.expect("g result"), h.args.clone())
        }
        _ => unreachable!(),
    };
    assert_eq!(h_args[0].id, g_result.id);
}

#[test]
fn selector_resolves_through_type_index() {
    let mut types = TypeIndex::new();
    types.insert_field(sym("Event"), sym("payload"), sym("Payload"));
    types.insert_field(sym("Payload"), sym("size"), sym("int"));

    let f = function_decl(
        "F",
        &[("e", "Event")],
        &[],
        vec![assign_stmt(
            "n",
            expr(ExpressionKind::Selector(Box::new(ast::SelectorExpr {
                span: Span::DUMMY,
                base: sym("e"),
                path: vec![sym("payload"), sym("size")],
            }))),
        )],
    );

    let lowered = lower_with(&SignatureTable::new(), &types, &f);
    let projection = all_instructions(&lowered)
        .into_iter()
        .find_map(|i| match i {
            ir::Instruction::Expr(e) => match &e.op {
                ir::ExprOp::Field(path) => Some((*path, e.result.unwrap(), e.args[0])),
                _ => None,
            },
            _ => None,
        })
        .expect("field projection");

    assert_eq!(projection.0, sym("payload.size"));
    assert_eq!(projection.1.ty, sym("int"));
    assert_eq!(projection.2.id, sym("e"));
}

#[test]
fn unresolvable_selector_falls_back_to_placeholder_assign() {
    let f = function_decl(
        "F",
        &[],
        &[],
        vec![assign_stmt(
            "n",
            expr(ExpressionKind::Selector(Box::new(ast::SelectorExpr {
                span: Span::DUMMY,
                base: sym("ghost"),
                path: vec![sym("field")],
            }))),
        )],
    );

    // The surrounding lowering must not abort; the assignment falls back to
    // an untyped placeholder.
    let lowered = lower_one(&f);
    assert!(matches!(
        all_instructions(&lowered).last(),
        Some(ir::Instruction::Assign { dest, .. }) if *dest == sym("n")
    ));
}

#[test]
fn self_tail_call_rewrites_to_loop() {
    let unit = ast::SourceUnit {
        span: Span::DUMMY,
        package: sym("main"),
        pragmas: Vec::new(),
        functions: vec![function_decl(
            "F",
            &[],
            &["int"],
            vec![return_stmt(vec![call("F", Vec::new())])],
        )],
        pipelines: Vec::new(),
    };

    let signatures = collect_signatures(&[&unit]);
    let lowered = lower_unit(
        sym("unit0"),
        &unit,
        &signatures,
        &TypeIndex::new(),
        &RecursionSets::new(),
    );

    let body = &lowered.module.functions[0].blocks[0].instructions;
    assert!(body.iter().any(|i| matches!(i, ir::Instruction::Loop { name } if *name == sym("F"))));
    assert!(
        body.iter()
            .any(|i| matches!(i, ir::Instruction::Goto { label } if *label == sym("entry")))
    );
}

#[test]
fn mutual_tail_call_dispatches() {
    let unit = ast::SourceUnit {
        span: Span::DUMMY,
        package: sym("main"),
        pragmas: Vec::new(),
        functions: vec![
            function_decl("A", &[], &["int"], vec![return_stmt(vec![call("B", Vec::new())])]),
            function_decl("B", &[], &["int"], vec![return_stmt(vec![call("A", Vec::new())])]),
        ],
        pipelines: Vec::new(),
    };

    let signatures = collect_signatures(&[&unit]);
    let mut recursion = RecursionSets::new();
    recursion.insert_group(&[sym("A"), sym("B")], 0);

    let lowered = lower_unit(
        sym("unit0"),
        &unit,
        &signatures,
        &TypeIndex::new(),
        &recursion,
    );

    let body = &lowered.module.functions[0].blocks[0].instructions;
    assert!(body.iter().any(|i| matches!(i, ir::Instruction::Loop { name } if *name == sym("A"))));
    assert!(
        body.iter()
            .any(|i| matches!(i, ir::Instruction::Dispatch { label } if *label == sym("B")))
    );
}

#[test]
fn pragmas_become_directives_and_metadata() {
    let pragma = |key: &str, value: &str| ast::Pragma {
        span: Span::DUMMY,
        key: sym(key),
        value: sym(value),
    };

    let unit = ast::SourceUnit {
        span: Span::DUMMY,
        package: sym("main"),
        pragmas: vec![
            pragma("concurrency", "4"),
            pragma("capabilities", "net, fs"),
            pragma("trust", "sandboxed"),
        ],
        functions: Vec::new(),
        pipelines: Vec::new(),
    };

    let lowered = lower_unit(
        sym("unit0"),
        &unit,
        &SignatureTable::new(),
        &TypeIndex::new(),
        &RecursionSets::new(),
    );

    assert_eq!(lowered.module.directives.len(), 3);
    assert_eq!(
        lowered.module.capabilities,
        vec![sym("net"), sym("fs")]
    );
    assert_eq!(lowered.module.trust, Some(sym("sandboxed")));
}
