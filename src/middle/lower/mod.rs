//! Tree-to-IR lowering. One [`LowerCtx`] exists per function and owns every
//! piece of mutable lowering state (temp counter, label counter, tracked
//! identifier types); cross-unit tables are frozen inputs. The statement
//! walk lives in `stmt`, expression lowering in `expr`, short-circuit and
//! conditional value lowering in `cfg`.

use hashbrown::HashMap;
use log::debug;

use crate::frontend::{
    ast,
    intern::Symbol,
};
use crate::middle::{
    diag::Diagnostic,
    ir,
    pipeline,
    tables::{RecursionSets, Signature, SignatureTable, TypeIndex},
};

pub mod cfg;
pub mod expr;
pub mod fold;
pub mod intrinsics;
pub mod stmt;
pub mod tail_call;

#[cfg(test)]
mod tests;

/// Per-function lowering state. Passed by `&mut` through the recursive
/// statement and expression walks; never global.
pub struct LowerCtx<'a> {
    temp: u32,
    label: u32,
    pub(crate) current_fn: Symbol,
    /// Tracked "current" type per identifier. Rebinding updates the entry;
    /// there is no per-version record.
    pub(crate) var_types: HashMap<Symbol, Symbol>,
    pub(crate) signatures: &'a SignatureTable,
    pub(crate) types: &'a TypeIndex,
    pub(crate) gpu_blocks: Vec<ir::GpuBlock>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl<'a> LowerCtx<'a> {
    pub fn new(signatures: &'a SignatureTable, types: &'a TypeIndex) -> Self {
        Self {
            temp: 0,
            label: 0,
            current_fn: Symbol::default(),
            var_types: HashMap::new(),
            signatures,
            types,
            gpu_blocks: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Next `t<n>` temporary, monotonic within the current function.
    pub(crate) fn new_temp(&mut self) -> Symbol {
        let id = Symbol::new(&format!("t{}", self.temp));
        self.temp += 1;
        id
    }

    /// Next block-label counter value. Shared by every synthesized
    /// `then/else/join` triple in the function so names are never reused.
    pub(crate) fn next_label(&mut self) -> u32 {
        let n = self.label;
        self.label += 1;
        n
    }

    pub(crate) fn tracked_type(&self, name: Symbol) -> Option<Symbol> {
        self.var_types.get(&name).copied()
    }

    /// The declared type of the current function's `index`-th result.
    pub(crate) fn declared_result_type(&self, index: usize) -> Option<Symbol> {
        self.signatures
            .get(self.current_fn)
            .and_then(|sig| sig.results.get(index))
            .copied()
    }
}

/// Everything the middle-end produces for one compilation unit.
#[derive(Debug)]
pub struct LoweredUnit {
    pub module: ir::Module,
    pub edges: Vec<ir::Edge>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Collects the parameter/result signature of every function declared in
/// the given units. The driver freezes this table before lowering begins so
/// units can be processed independently.
pub fn collect_signatures(units: &[&ast::SourceUnit]) -> SignatureTable {
    let mut table = SignatureTable::new();

    for unit in units {
        for function in &unit.functions {
            let signature = Signature {
                params: function.params.iter().map(|p| p.ty).collect(),
                param_names: function.params.iter().map(|p| p.name).collect(),
                results: function.results.clone(),
            };
            table.insert(function.name, signature);
        }
    }

    table
}

/// Lowers one compilation unit into a module plus pipeline edge metadata.
pub fn lower_unit(
    unit_name: Symbol,
    unit: &ast::SourceUnit,
    signatures: &SignatureTable,
    types: &TypeIndex,
    recursion: &RecursionSets,
) -> LoweredUnit {
    debug!(
        "lowering unit {} (package {}): {} functions, {} pipelines",
        unit_name,
        unit.package,
        unit.functions.len(),
        unit.pipelines.len()
    );

    let mut module = ir::Module {
        package: unit.package,
        ..Default::default()
    };
    let mut diagnostics = Vec::new();

    for pragma in &unit.pragmas {
        match pragma.key.value() {
            "capabilities" => {
                module.capabilities = pragma
                    .value
                    .value()
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(Symbol::new)
                    .collect();
            }
            "trust" => module.trust = Some(pragma.value),
            _ => {}
        }
        module.directives.push(ir::Directive {
            key: pragma.key,
            value: pragma.value,
        });
    }

    for function in &unit.functions {
        let mut ctx = LowerCtx::new(signatures, types);
        let mut lowered = lower_function(&mut ctx, function);
        tail_call::eliminate_tail_calls(&mut lowered, recursion);

        module.gpu_blocks.append(&mut ctx.gpu_blocks);
        diagnostics.append(&mut ctx.diagnostics);
        module.functions.push(lowered);
    }

    module.pipelines = pipeline::lower_pipelines(unit);
    let edges = pipeline::edges::collect_edges(unit_name, unit);

    LoweredUnit {
        module,
        edges,
        diagnostics,
    }
}

/// Lowers a single function body into its block list. The first block is
/// always `entry`; control flow appends further named blocks after it.
pub fn lower_function(ctx: &mut LowerCtx, function: &ast::FunctionDecl) -> ir::Function {
    ctx.temp = 0;
    ctx.label = 0;
    ctx.var_types.clear();
    ctx.current_fn = function.name;

    let params = function
        .params
        .iter()
        .map(|p| {
            ctx.var_types.insert(p.name, p.ty);
            ir::Value::new(p.name, p.ty)
        })
        .collect();

    let results = function
        .results
        .iter()
        .map(|ty| ir::Value::new(Symbol::default(), *ty))
        .collect();

    let (instructions, extras) = stmt::lower_block_cfg(ctx, &function.body);

    let mut blocks = Vec::with_capacity(1 + extras.len());
    blocks.push(ir::Block::new(Symbol::new("entry"), instructions));
    blocks.extend(extras);

    for gpu in &mut ctx.gpu_blocks {
        if gpu.function.is_empty() {
            gpu.function = function.name;
        }
    }

    ir::Function {
        name: function.name,
        params,
        results,
        blocks,
        decorators: function.decorators.clone(),
    }
}
