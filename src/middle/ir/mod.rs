//! The block-based IR produced by lowering. Abstract tree constructs are
//! flattened into ordered instruction sequences inside named blocks;
//! conditionals become explicit branches reconciled at join points.

use strum::{Display, EnumString};

use crate::frontend::{
    ast::{BinaryOperatorKind, UnaryOperatorKind},
    intern::Symbol,
};

pub mod pretty_print;

/// A typed SSA-ish value. `id` is a symbolic variable name, a generated
/// temporary (`t0`, `t1`, ...), or an immediate marker (`#<int>`, `#null`,
/// `#@<name>`). Types are structural strings (`int`, `Owned<slice<uint8>>`,
/// `map<string,int>`, `any`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value {
    pub id: Symbol,
    pub ty: Symbol,
}

impl Value {
    pub fn new(id: Symbol, ty: Symbol) -> Self {
        Self { id, ty }
    }

    /// A compile-time-known integer, encoded as `#<n>`.
    pub fn immediate(n: i64, ty: &str) -> Self {
        Self {
            id: Symbol::new(&format!("#{n}")),
            ty: Symbol::new(ty),
        }
    }

    pub fn null(ty: &str) -> Self {
        Self {
            id: Symbol::new("#null"),
            ty: Symbol::new(ty),
        }
    }
}

/// Whether a type string denotes an ownership handle (`Owned` or any
/// `Owned<...>` instantiation).
pub fn is_owned_type(ty: Symbol) -> bool {
    let t = ty.value();
    t == "Owned" || t.starts_with("Owned<")
}

pub fn is_slice_type(ty: Symbol) -> bool {
    ty.value().starts_with("slice<")
}

/// The closed instruction set. The backend dispatches exhaustively on this
/// enum; adding a variant is a compile error at every consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Declare a variable, optionally initialized.
    Var {
        name: Symbol,
        ty: Symbol,
        init: Option<Value>,
        result: Value,
    },
    /// Rebind an existing identifier to a new value.
    Assign { dest: Symbol, src: Value },
    /// Return zero or more values.
    Return { values: Vec<Value> },
    /// A call deferred to run before function exit, latest first.
    Defer(Expr),
    Expr(Expr),
    /// Conditional branch to two labeled blocks.
    CondBr {
        cond: Value,
        true_label: Symbol,
        false_label: Symbol,
    },
    Goto { label: Symbol },
    /// Join-point value reconciliation by source-block label.
    Phi {
        result: Value,
        incomings: Vec<PhiIncoming>,
    },
    /// Marks a rewritten tail call: re-enter the named function as a loop.
    Loop { name: Symbol },
    /// Marks a rewritten mutual tail call: continue as the labeled function.
    Dispatch { label: Symbol },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhiIncoming {
    pub value: Value,
    pub label: Symbol,
}

/// An operation instruction. Calls carry the callee's recorded signature
/// shape for downstream diagnostics; multi-result calls populate `results`
/// instead of `result`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub op: ExprOp,
    pub args: Vec<Value>,
    pub result: Option<Value>,
    pub results: Vec<Value>,
}

impl Expr {
    pub fn lit(text: &str, result: Value) -> Self {
        Self {
            op: ExprOp::Lit(Symbol::new(text)),
            args: Vec::new(),
            result: Some(result),
            results: Vec::new(),
        }
    }

    pub fn ident(result: Value) -> Self {
        Self {
            op: ExprOp::Ident,
            args: Vec::new(),
            result: Some(result),
            results: Vec::new(),
        }
    }

    pub fn call(callee: &str, args: Vec<Value>, result: Option<Value>) -> Self {
        Self {
            op: ExprOp::Call(CallTarget::named(callee)),
            args,
            result,
            results: Vec::new(),
        }
    }

    pub fn call_multi(callee: &str, args: Vec<Value>, results: Vec<Value>) -> Self {
        let result_types = results.iter().map(|v| v.ty).collect();
        Self {
            op: ExprOp::Call(CallTarget {
                callee: Symbol::new(callee),
                result_types,
                ..Default::default()
            }),
            args,
            result: None,
            results,
        }
    }

    pub fn callee(&self) -> Option<Symbol> {
        match &self.op {
            ExprOp::Call(target) => Some(target.callee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprOp {
    /// A literal, carrying its canonical text (`23`, `"abc"`).
    Lit(Symbol),
    /// A reference to an already-bound identifier.
    Ident,
    Unary(UnaryOperatorKind),
    Binary(BinaryOperatorKind),
    Call(CallTarget),
    /// Typed field projection along a dotted path.
    Field(Symbol),
    Container(ContainerKind),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallTarget {
    pub callee: Symbol,
    pub param_types: Vec<Symbol>,
    pub param_names: Vec<Symbol>,
    pub result_types: Vec<Symbol>,
}

impl CallTarget {
    pub fn named(callee: &str) -> Self {
        Self {
            callee: Symbol::new(callee),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ContainerKind {
    Slice,
    Set,
    Map,
}

/// A named straight-line sequence of instructions. The first block of every
/// function is `entry`; synthesized control flow uses `then<n>`/`else<n>`/
/// `join<n>` (`sc_*` for short-circuit helpers) off one per-function counter.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: Symbol,
    pub instructions: Vec<Instruction>,
}

impl Block {
    pub fn new(name: Symbol, instructions: Vec<Instruction>) -> Self {
        Self { name, instructions }
    }

    pub fn ends_with_return(&self) -> bool {
        self.instructions
            .last()
            .is_some_and(|i| matches!(i, Instruction::Return { .. }))
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Symbol,
    pub params: Vec<Value>,
    pub results: Vec<Value>,
    pub blocks: Vec<Block>,
    pub decorators: Vec<Symbol>,
}

/// Metadata collected from an accelerator block during lowering. Carried on
/// the module for the backend's kernel registry.
#[derive(Debug, Clone, Default)]
pub struct GpuBlock {
    pub function: Symbol,
    pub family: Symbol,
    pub kernel: Symbol,
    pub n: i64,
    pub grid: [i64; 3],
    pub tpg: [i64; 3],
    pub source: Symbol,
}

/// File-scope directive carried through untransformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub key: Symbol,
    pub value: Symbol,
}

/// One lowered compilation unit.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub package: Symbol,
    pub functions: Vec<Function>,
    pub pipelines: Vec<Pipeline>,
    pub directives: Vec<Directive>,
    pub capabilities: Vec<Symbol>,
    pub trust: Option<Symbol>,
    pub gpu_blocks: Vec<GpuBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Default)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: Symbol,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    pub field: Symbol,
    pub lateness_ms: i64,
}

/// Backpressure policy declared on `merge.Buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum BufferPolicy {
    Block,
    DropOldest,
    DropNewest,
    ShuntNewest,
    ShuntOldest,
}

impl BufferPolicy {
    /// The delivery guarantee an edge inherits from this policy.
    pub fn delivery(self) -> Delivery {
        match self {
            BufferPolicy::Block => Delivery::AtLeastOnce,
            BufferPolicy::DropOldest | BufferPolicy::DropNewest => Delivery::BestEffort,
            BufferPolicy::ShuntNewest => Delivery::ShuntNewest,
            BufferPolicy::ShuntOldest => Delivery::ShuntOldest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Default)]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum Delivery {
    #[default]
    AtLeastOnce,
    BestEffort,
    ShuntNewest,
    ShuntOldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferPlan {
    pub capacity: i64,
    pub policy: Option<BufferPolicy>,
}

/// Canonical, attribute-order-resolved configuration of how a `Collect`
/// step combines upstream events. Scalar fields are last-write-wins in
/// source order; `sort` keys accumulate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergePlan {
    pub sort: Vec<SortKey>,
    pub stable: bool,
    pub key: Symbol,
    pub partition_by: Symbol,
    pub dedup_field: Symbol,
    pub window: i64,
    pub timeout_ms: i64,
    pub watermark: Option<Watermark>,
    pub buffer: BufferPlan,
}

/// One `Collect` occurrence with its normalized plan and the sorted,
/// de-duplicated set of upstream step names feeding this instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectSpec {
    pub step: Symbol,
    /// 1-based occurrence id within the pipeline, in declaration order.
    pub instance: u32,
    pub merge: Option<MergePlan>,
    pub inputs: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub name: Symbol,
    pub collects: Vec<CollectSpec>,
}

/// A pipeline connection with derived buffering and reachability metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub unit: Symbol,
    pub pipeline: Symbol,
    pub from: Symbol,
    pub to: Symbol,
    pub from_instance: u32,
    pub to_instance: u32,
    /// True iff the resolved buffer capacity is declared and non-zero.
    pub bounded: bool,
    pub delivery: Delivery,
    /// Declared event type of the target step, when present.
    pub ty: Symbol,
    /// Capacity 0/1 combined with a drop policy; surfaced for lint hints.
    pub tiny: bool,
    pub on_path: bool,
    pub from_reachable_from_ingress: bool,
    pub to_can_reach_egress: bool,
}
