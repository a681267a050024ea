//! End-to-end middle-end checks over the public API: a unit with functions
//! and a pipeline goes in, a module with blocks, merge plans, and edge
//! metadata comes out.

use pretty_assertions::assert_eq;

use rillc::frontend::{
    Span,
    ast::{self, Attribute, BinaryOperatorKind, ExpressionKind, StatementKind},
    intern::Symbol,
};
use rillc::middle::{
    ir,
    lower::{collect_signatures, lower_unit},
    tables::{RecursionSets, TypeIndex},
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

fn stmt(kind: StatementKind) -> ast::Statement {
    ast::Statement {
        span: Span::DUMMY,
        kind,
    }
}

fn sample_unit() -> ast::SourceUnit {
    // fn clamp(v: int, lo: bool) -> int {
    //     if lo { v = 0 }
    //     return v && 1   -- value-position short circuit
    // }
    let body = vec![
        stmt(StatementKind::If(Box::new(ast::IfStmt {
            span: Span::DUMMY,
            condition: ident("lo"),
            then_block: ast::Block {
                span: Span::DUMMY,
                statements: vec![stmt(StatementKind::Assign(Box::new(ast::AssignStmt {
                    span: Span::DUMMY,
                    name: sym("v"),
                    value: num("0"),
                })))],
            },
            else_block: None,
        }))),
        stmt(StatementKind::Return(Box::new(ast::ReturnStmt {
            span: Span::DUMMY,
            results: vec![expr(ExpressionKind::Binary {
                operator: BinaryOperatorKind::LogicalAnd,
                lhs: Box::new(ident("v")),
                rhs: Box::new(ident("lo")),
            })],
        }))),
    ];

    let function = ast::FunctionDecl {
        span: Span::DUMMY,
        name: sym("clamp"),
        params: vec![
            ast::Parameter {
                span: Span::DUMMY,
                name: sym("v"),
                ty: sym("int"),
            },
            ast::Parameter {
                span: Span::DUMMY,
                name: sym("lo"),
                ty: sym("bool"),
            },
        ],
        results: vec![sym("int")],
        decorators: Vec::new(),
        body: ast::Block {
            span: Span::DUMMY,
            statements: body,
        },
    };

    let pipeline = ast::PipelineDecl {
        span: Span::DUMMY,
        name: sym("Ingest"),
        statements: vec![
            ast::PipelineStmt {
                span: Span::DUMMY,
                kind: ast::PipelineStmtKind::Step(ast::StepStmt {
                    span: Span::DUMMY,
                    name: sym("ingress"),
                    attrs: Vec::new(),
                }),
            },
            ast::PipelineStmt {
                span: Span::DUMMY,
                kind: ast::PipelineStmtKind::Edge(ast::EdgeStmt {
                    span: Span::DUMMY,
                    from: sym("ingress"),
                    to: sym("Collect"),
                }),
            },
            ast::PipelineStmt {
                span: Span::DUMMY,
                kind: ast::PipelineStmtKind::Step(ast::StepStmt {
                    span: Span::DUMMY,
                    name: sym("Collect"),
                    attrs: vec![
                        Attribute::new("merge.Sort", &["ts"]),
                        Attribute::new("merge.Buffer", &["8", "dropNewest"]),
                    ],
                }),
            },
            ast::PipelineStmt {
                span: Span::DUMMY,
                kind: ast::PipelineStmtKind::Edge(ast::EdgeStmt {
                    span: Span::DUMMY,
                    from: sym("Collect"),
                    to: sym("egress"),
                }),
            },
            ast::PipelineStmt {
                span: Span::DUMMY,
                kind: ast::PipelineStmtKind::Step(ast::StepStmt {
                    span: Span::DUMMY,
                    name: sym("egress"),
                    attrs: Vec::new(),
                }),
            },
        ],
    };

    ast::SourceUnit {
        span: Span::DUMMY,
        package: sym("main"),
        pragmas: Vec::new(),
        functions: vec![function],
        pipelines: vec![pipeline],
    }
}

#[test]
fn unit_lowering_end_to_end() {
    let unit = sample_unit();
    let signatures = collect_signatures(&[&unit]);
    let lowered = lower_unit(
        sym("sample"),
        &unit,
        &signatures,
        &TypeIndex::new(),
        &RecursionSets::new(),
    );

    let function = &lowered.module.functions[0];
    assert_eq!(function.blocks[0].name, sym("entry"));

    // The conditional statement and the short-circuit return both
    // contribute blocks; every name is unique.
    let names: Vec<&str> = function.blocks.iter().map(|b| b.name.value()).collect();
    let unique: std::collections::BTreeSet<&str> = names.iter().copied().collect();
    assert_eq!(names.len(), unique.len());
    assert!(names.contains(&"join0"));
    assert!(names.contains(&"sc_join1"));

    // Pipeline normalization ran alongside function lowering.
    let plan = lowered.module.pipelines[0].collects[0]
        .merge
        .as_ref()
        .expect("merge plan");
    assert_eq!(plan.sort[0].field, sym("ts"));
    assert_eq!(plan.buffer.capacity, 8);
    assert_eq!(plan.buffer.policy, Some(ir::BufferPolicy::DropNewest));

    // ingress -> Collect -> egress, fully on path, bounded, best effort.
    assert_eq!(lowered.edges.len(), 2);
    assert!(lowered.edges.iter().all(|e| e.on_path));
    assert!(lowered.edges[0].bounded);
    assert_eq!(lowered.edges[0].delivery, ir::Delivery::BestEffort);
    assert!(!lowered.edges[1].bounded);

    // Lowering the same unit twice is byte-identical.
    let again = lower_unit(
        sym("sample"),
        &unit,
        &signatures,
        &TypeIndex::new(),
        &RecursionSets::new(),
    );
    assert_eq!(
        format!("{:?}", lowered.module),
        format!("{:?}", again.module)
    );
    assert_eq!(
        ir::pretty_print::module_listing(&lowered.module),
        ir::pretty_print::module_listing(&again.module)
    );
}
