use crate::frontend::{Span, intern::Symbol};

/// One parsed compilation unit (file) after semantic checking.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub span: Span,
    pub package: Symbol,
    pub pragmas: Vec<Pragma>,
    pub functions: Vec<FunctionDecl>,
    pub pipelines: Vec<PipelineDecl>,
}

/// File-scope directive data (concurrency, schedule, backpressure,
/// telemetry, capabilities, trust). Carried through to the module
/// untransformed.
#[derive(Debug, Clone)]
pub struct Pragma {
    pub span: Span,
    pub key: Symbol,
    pub value: Symbol,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub span: Span,
    pub name: Symbol,
    pub params: Vec<Parameter>,
    pub results: Vec<Symbol>,
    pub decorators: Vec<Symbol>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub span: Span,
    pub name: Symbol,
    pub ty: Symbol,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub span: Span,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub span: Span,
    pub kind: StatementKind,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Var(Box<VarDecl>),
    Assign(Box<AssignStmt>),
    Return(Box<ReturnStmt>),
    /// `defer <call>` - runs before function exit, latest first
    Defer(Box<Expression>),
    Expr(Box<Expression>),
    If(Box<IfStmt>),
    Gpu(Box<GpuBlockStmt>),
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub span: Span,
    pub name: Symbol,
    pub ty: Option<Symbol>,
    pub init: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct AssignStmt {
    pub span: Span,
    pub name: Symbol,
    pub value: Expression,
}

#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub span: Span,
    pub results: Vec<Expression>,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub span: Span,
    pub condition: Expression,
    pub then_block: Block,
    pub else_block: Option<Block>,
}

/// An embedded accelerator kernel with `key=value` attributes and opaque
/// kernel source. Only its metadata survives lowering.
#[derive(Debug, Clone)]
pub struct GpuBlockStmt {
    pub span: Span,
    pub attrs: Vec<Attribute>,
    pub source: Symbol,
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub span: Span,
    pub kind: ExpressionKind,
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Self { span, kind }
    }
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    Identifier(Symbol),
    /// String literal (unquoted value)
    StringLit(Symbol),
    /// Numeric literal carrying its source text (any radix)
    NumberLit(Symbol),
    /// Duration literal text, e.g. `250ms`, `2s`
    DurationLit(Symbol),
    Binary {
        operator: BinaryOperatorKind,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        operator: UnaryOperatorKind,
        operand: Box<Expression>,
    },
    Call(Box<CallExpr>),
    Selector(Box<SelectorExpr>),
    /// `cond ? a : b`
    Conditional(Box<ConditionalExpr>),
    SliceLit(Box<ContainerLit>),
    SetLit(Box<ContainerLit>),
    MapLit(Box<MapLit>),
}

/// A call to a (possibly qualified) function name. Method-style calls keep
/// the receiver path inside `name` (`r.Read`); the middle-end decides how
/// to synthesize the receiver.
#[derive(Debug, Clone)]
pub struct CallExpr {
    pub span: Span,
    pub name: Symbol,
    pub args: Vec<Expression>,
}

/// `base.a.b` - a field path rooted at an identifier.
#[derive(Debug, Clone)]
pub struct SelectorExpr {
    pub span: Span,
    pub base: Symbol,
    pub path: Vec<Symbol>,
}

#[derive(Debug, Clone)]
pub struct ConditionalExpr {
    pub span: Span,
    pub condition: Expression,
    pub then_value: Expression,
    pub else_value: Expression,
}

/// `slice<T>{...}` / `set<T>{...}`
#[derive(Debug, Clone)]
pub struct ContainerLit {
    pub span: Span,
    pub elem_ty: Symbol,
    pub elems: Vec<Expression>,
}

/// `map<K,V>{...}`
#[derive(Debug, Clone)]
pub struct MapLit {
    pub span: Span,
    pub key_ty: Symbol,
    pub val_ty: Symbol,
    pub entries: Vec<(Expression, Expression)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorKind {
    Add,                  // +
    Subtract,             // -
    Multiply,             // *
    Divide,               // /
    Modulus,              // %
    Equals,               // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
    LogicalAnd,           // &&
    LogicalOr,            // ||
}

impl BinaryOperatorKind {
    pub fn ir_name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "sub",
            Self::Multiply => "mul",
            Self::Divide => "div",
            Self::Modulus => "mod",
            Self::Equals => "eq",
            Self::NotEquals => "ne",
            Self::LessThan => "lt",
            Self::LessThanOrEqualTo => "le",
            Self::GreaterThan => "gt",
            Self::GreaterThanOrEqualTo => "ge",
            Self::LogicalAnd => "and",
            Self::LogicalOr => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperatorKind {
    LogicalNot, // !
    Negate,     // -
}

impl UnaryOperatorKind {
    pub fn ir_name(self) -> &'static str {
        match self {
            Self::LogicalNot => "not",
            Self::Negate => "neg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineDecl {
    pub span: Span,
    pub name: Symbol,
    pub statements: Vec<PipelineStmt>,
}

#[derive(Debug, Clone)]
pub struct PipelineStmt {
    pub span: Span,
    pub kind: PipelineStmtKind,
}

#[derive(Debug, Clone)]
pub enum PipelineStmtKind {
    Step(StepStmt),
    Edge(EdgeStmt),
}

/// One textual occurrence of a step inside a pipeline. Repeated names are
/// distinct occurrences; disambiguation happens in the middle-end.
#[derive(Debug, Clone)]
pub struct StepStmt {
    pub span: Span,
    pub name: Symbol,
    pub attrs: Vec<Attribute>,
}

/// `from -> to`
#[derive(Debug, Clone)]
pub struct EdgeStmt {
    pub span: Span,
    pub from: Symbol,
    pub to: Symbol,
}

/// A step attribute: name plus raw argument text, either positional
/// (`merge.Buffer(8, dropOldest)`) or keyed (`merge.Buffer(capacity=8)`).
#[derive(Debug, Clone)]
pub struct Attribute {
    pub span: Span,
    pub name: Symbol,
    pub args: Vec<AttributeArg>,
}

#[derive(Debug, Clone)]
pub struct AttributeArg {
    pub span: Span,
    pub text: Symbol,
}

impl Attribute {
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            span: Span::DUMMY,
            name: Symbol::new(name),
            args: args
                .iter()
                .map(|a| AttributeArg {
                    span: Span::DUMMY,
                    text: Symbol::new(a),
                })
                .collect(),
        }
    }
}
