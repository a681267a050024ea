//! Edge collection. Repeated step names inside a pipeline are distinct
//! occurrences with 1-based instance ids in declaration order; an edge's
//! endpoints resolve by position, never by name alone, so two `Collect`
//! occurrences can't alias each other's inputs.

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;

use crate::frontend::{ast, intern::Symbol};
use crate::index::{IndexVec, simple_index};
use crate::middle::ir;
use crate::middle::pipeline::to_merge_plan;

simple_index! {
    /// Identifies a step occurrence within one pipeline declaration
    pub struct StepId;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StepOccurrence {
    pub name: Symbol,
    /// Index into the pipeline's statement list.
    pub stmt_index: usize,
    /// 1-based occurrence id among same-named steps, in declaration order.
    pub instance: u32,
}

pub(crate) fn step_occurrences(decl: &ast::PipelineDecl) -> IndexVec<StepId, StepOccurrence> {
    let mut counts: HashMap<Symbol, u32> = HashMap::new();
    let mut occurrences = IndexVec::new();

    for (i, statement) in decl.statements.iter().enumerate() {
        if let ast::PipelineStmtKind::Step(step) = &statement.kind {
            let count = counts.entry(step.name).or_insert(0);
            *count += 1;
            occurrences.push(StepOccurrence {
                name: step.name,
                stmt_index: i,
                instance: *count,
            });
        }
    }

    occurrences
}

/// The nearest occurrence of `name` at-or-before the edge's position, or 0
/// when the name never occurs there.
pub(crate) fn resolve_source_instance(
    occurrences: &IndexVec<StepId, StepOccurrence>,
    name: Symbol,
    edge_index: usize,
) -> u32 {
    occurrences
        .iter()
        .filter(|o| o.name == name && o.stmt_index <= edge_index)
        .map(|o| o.instance)
        .last()
        .unwrap_or(0)
}

/// The nearest occurrence of `name` at-or-after the edge's position, or 0
/// when there is none.
pub(crate) fn resolve_target_instance(
    occurrences: &IndexVec<StepId, StepOccurrence>,
    name: Symbol,
    edge_index: usize,
) -> u32 {
    occurrences
        .iter()
        .find(|o| o.name == name && o.stmt_index >= edge_index)
        .map(|o| o.instance)
        .unwrap_or(0)
}

/// The sorted, de-duplicated upstream names whose edges resolve to the
/// given occurrence.
pub(crate) fn instance_inputs(
    decl: &ast::PipelineDecl,
    occurrences: &IndexVec<StepId, StepOccurrence>,
    target: &StepOccurrence,
) -> Vec<Symbol> {
    let mut inputs = Vec::new();

    for (i, statement) in decl.statements.iter().enumerate() {
        if let ast::PipelineStmtKind::Edge(edge) = &statement.kind {
            if edge.to == target.name
                && resolve_target_instance(occurrences, edge.to, i) == target.instance
            {
                inputs.push(edge.from);
            }
        }
    }

    inputs
        .into_iter()
        .sorted_by_key(|name| name.value())
        .dedup()
        .collect()
}

fn reachable(adjacency: &HashMap<Symbol, Vec<Symbol>>, start: Symbol) -> HashSet<Symbol> {
    let mut seen = HashSet::new();
    let mut stack = vec![start];

    while let Some(node) = stack.pop() {
        if !seen.insert(node) {
            continue;
        }
        if let Some(next) = adjacency.get(&node) {
            for neighbor in next {
                if !seen.contains(neighbor) {
                    stack.push(*neighbor);
                }
            }
        }
    }

    seen
}

/// Returns all edge entries for a unit's pipelines, with instance
/// resolution, buffering derivation, and ingress/egress reachability.
pub fn collect_edges(unit: Symbol, source: &ast::SourceUnit) -> Vec<ir::Edge> {
    let mut out = Vec::new();

    for decl in &source.pipelines {
        let occurrences = step_occurrences(decl);

        let mut forward: HashMap<Symbol, Vec<Symbol>> = HashMap::new();
        let mut backward: HashMap<Symbol, Vec<Symbol>> = HashMap::new();
        for statement in &decl.statements {
            if let ast::PipelineStmtKind::Edge(edge) = &statement.kind {
                forward.entry(edge.from).or_default().push(edge.to);
                backward.entry(edge.to).or_default().push(edge.from);
            }
        }

        let from_ingress = reachable(&forward, Symbol::new("ingress"));
        let to_egress = reachable(&backward, Symbol::new("egress"));

        for (i, statement) in decl.statements.iter().enumerate() {
            let ast::PipelineStmtKind::Edge(edge) = &statement.kind else {
                continue;
            };

            let from_instance = resolve_source_instance(&occurrences, edge.from, i);
            let to_instance = resolve_target_instance(&occurrences, edge.to, i);

            // Buffer semantics come from the resolved target occurrence's
            // attributes, not from any occurrence that happens to share the
            // name.
            let target_step = occurrences
                .iter()
                .find(|o| o.name == edge.to && o.instance == to_instance)
                .and_then(|o| match &decl.statements[o.stmt_index].kind {
                    ast::PipelineStmtKind::Step(step) => Some(step),
                    _ => None,
                });

            let buffer = target_step
                .and_then(to_merge_plan)
                .map(|plan| plan.buffer)
                .unwrap_or_default();

            let bounded = buffer.capacity > 0;
            let delivery = buffer
                .policy
                .map(ir::BufferPolicy::delivery)
                .unwrap_or_default();
            let tiny = buffer.capacity <= 1
                && matches!(
                    buffer.policy,
                    Some(ir::BufferPolicy::DropOldest) | Some(ir::BufferPolicy::DropNewest)
                );

            let ty = target_step
                .and_then(|step| {
                    step.attrs
                        .iter()
                        .find(|a| matches!(a.name.value(), "type" | "Type"))
                })
                .and_then(|a| a.args.first())
                .map(|a| Symbol::new(super::trim_quotes(a.text.value())))
                .unwrap_or_default();

            let from_reachable = from_ingress.contains(&edge.from);
            let to_reachable = to_egress.contains(&edge.to);

            out.push(ir::Edge {
                unit,
                pipeline: decl.name,
                from: edge.from,
                to: edge.to,
                from_instance,
                to_instance,
                bounded,
                delivery,
                ty,
                tiny,
                on_path: from_reachable && to_reachable,
                from_reachable_from_ingress: from_reachable,
                to_can_reach_egress: to_reachable,
            });
        }
    }

    out
}
