//! Pipeline normalization: `Collect` step attribute lists become canonical
//! merge plans, and declared edges get derived boundedness, delivery, and
//! reachability metadata. Stateless per pipeline declaration.

use std::str::FromStr;

use log::debug;

use crate::frontend::{ast, intern::Symbol};
use crate::middle::ir;

pub mod edges;

pub(crate) fn trim_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

pub(crate) fn atoi_safe(s: &str) -> Option<i64> {
    trim_quotes(s.trim()).trim().parse().ok()
}

/// Parses a duration as milliseconds: bare digits, or digits with a
/// trailing `ms`/`s`/`m`/`h` suffix.
pub(crate) fn parse_duration_ms(s: &str) -> Option<i64> {
    let s = trim_quotes(s.trim()).trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }

    let (digits, multiplier) = if let Some(digits) = s.strip_suffix("ms") {
        (digits, 1)
    } else if let Some(digits) = s.strip_suffix('s') {
        (digits, 1000)
    } else if let Some(digits) = s.strip_suffix('m') {
        (digits, 60 * 1000)
    } else if let Some(digits) = s.strip_suffix('h') {
        (digits, 60 * 60 * 1000)
    } else {
        return None;
    };

    digits.trim().parse::<i64>().ok().map(|n| n * multiplier)
}

/// Scans a step's attribute list once, in source order, into one canonical
/// plan. The last occurrence of a scalar attribute wins; `merge.Sort`
/// attributes append. A step with no recognized `merge.*` attribute yields
/// no plan at all, distinct from an explicitly empty one.
pub fn to_merge_plan(step: &ast::StepStmt) -> Option<ir::MergePlan> {
    let mut plan = ir::MergePlan::default();
    let mut saw = false;

    for attr in &step.attrs {
        let arg = |i: usize| attr.args.get(i).map(|a| a.text.value());

        match attr.name.value() {
            "merge.Sort" => {
                if let Some(field) = arg(0) {
                    let order = arg(1)
                        .and_then(|o| ir::SortOrder::from_str(trim_quotes(o.trim())).ok())
                        .unwrap_or_default();
                    plan.sort.push(ir::SortKey {
                        field: Symbol::new(trim_quotes(field)),
                        order,
                    });
                    saw = true;
                }
            }
            "merge.Stable" => {
                plan.stable = true;
                saw = true;
            }
            "merge.Key" => {
                if let Some(field) = arg(0) {
                    plan.key = Symbol::new(trim_quotes(field));
                    saw = true;
                }
            }
            "merge.PartitionBy" => {
                if let Some(field) = arg(0) {
                    plan.partition_by = Symbol::new(trim_quotes(field));
                    saw = true;
                }
            }
            "merge.Dedup" => {
                plan.dedup_field = match arg(0) {
                    Some(field) => Symbol::new(trim_quotes(field)),
                    None => Symbol::default(),
                };
                saw = true;
            }
            "merge.Window" => {
                if let Some(n) = arg(0).and_then(atoi_safe) {
                    if n > 0 {
                        plan.window = n;
                        saw = true;
                    }
                }
            }
            "merge.Timeout" => {
                if let Some(ms) = arg(0).and_then(parse_duration_ms) {
                    if ms > 0 {
                        plan.timeout_ms = ms;
                        saw = true;
                    }
                }
            }
            "merge.Watermark" => {
                if let Some(field) = arg(0) {
                    let lateness_ms = arg(1).and_then(parse_duration_ms).unwrap_or(0);
                    plan.watermark = Some(ir::Watermark {
                        field: Symbol::new(trim_quotes(field)),
                        lateness_ms,
                    });
                    saw = true;
                }
            }
            "merge.Buffer" => {
                // A later Buffer attribute replaces the earlier one
                // wholesale, never merges with it.
                plan.buffer = parse_buffer_args(&attr.args);
                saw = true;
            }
            _ => {}
        }
    }

    saw.then_some(plan)
}

/// `merge.Buffer` accepts positional `(capacity[, policy])` arguments or
/// `key=value` arguments in any order.
fn parse_buffer_args(args: &[ast::AttributeArg]) -> ir::BufferPlan {
    let mut plan = ir::BufferPlan::default();
    let mut position = 0;

    for arg in args {
        let text = arg.text.value().trim();

        if let Some((key, value)) = text.split_once('=') {
            match trim_quotes(key.trim()) {
                "capacity" => {
                    if let Some(n) = atoi_safe(value) {
                        plan.capacity = n;
                    }
                }
                "policy" => {
                    plan.policy = ir::BufferPolicy::from_str(trim_quotes(value.trim())).ok();
                }
                _ => {}
            }
            continue;
        }

        match position {
            0 => {
                if let Some(n) = atoi_safe(text) {
                    plan.capacity = n;
                }
            }
            1 => plan.policy = ir::BufferPolicy::from_str(trim_quotes(text)).ok(),
            _ => {}
        }
        position += 1;
    }

    plan
}

/// Extracts the `Collect` occurrences of every pipeline in the unit, each
/// with its normalized plan and resolved multi-path inputs.
pub fn lower_pipelines(unit: &ast::SourceUnit) -> Vec<ir::Pipeline> {
    let mut out = Vec::new();

    for decl in &unit.pipelines {
        let occurrences = edges::step_occurrences(decl);
        let mut collects = Vec::new();

        for occurrence in occurrences.iter() {
            if occurrence.name.value() != "Collect" {
                continue;
            }
            let ast::PipelineStmtKind::Step(step) = &decl.statements[occurrence.stmt_index].kind
            else {
                continue;
            };

            collects.push(ir::CollectSpec {
                step: occurrence.name,
                instance: occurrence.instance,
                merge: to_merge_plan(step),
                inputs: edges::instance_inputs(decl, &occurrences, occurrence),
            });
        }

        if !collects.is_empty() {
            debug!(
                "pipeline {}: {} collect instance(s) normalized",
                decl.name,
                collects.len()
            );
            out.push(ir::Pipeline {
                name: decl.name,
                collects,
            });
        }
    }

    out
}
