//! Recognition of stdlib calls. Known qualified names map to canonical
//! runtime symbols (or LLVM intrinsics for float math), bypassing generic
//! call lowering. Matching is suffix-based where receivers or import
//! aliases can rename the qualifier.

use crate::frontend::{ast, intern::Symbol};
use crate::middle::{
    ir,
    lower::{LowerCtx, expr::lower_expr},
};

/// Fixed signal numbers for enum-shaped selectors (`signal.SIGINT`).
pub(crate) fn signal_constant(name: Symbol) -> Option<i64> {
    match name.value() {
        "SIGHUP" => Some(1),
        "SIGINT" => Some(2),
        "SIGQUIT" => Some(3),
        "SIGTERM" => Some(15),
        _ => None,
    }
}

/// Deterministic token for a handler expression: FNV-1a over the handler's
/// identifier, masked positive. Non-identifier handlers get token 0.
fn handler_token(e: &ast::Expression) -> i64 {
    let ast::ExpressionKind::Identifier(name) = &e.kind else {
        return 0;
    };

    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.value().bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash & 0x7fff_ffff_ffff_ffff) as i64
}

/// Recognizes stdlib calls and lowers them to their canonical form.
/// Returns `None` when the callee is not part of the recognized catalog.
pub(crate) fn lower_stdlib_call(ctx: &mut LowerCtx, call: &ast::CallExpr) -> Option<ir::Expr> {
    let name = call.name.value();

    if let Some(expr) = lower_stdlib_math(ctx, call) {
        return Some(expr);
    }
    if let Some(expr) = lower_stdlib_time(ctx, call) {
        return Some(expr);
    }
    if let Some(expr) = lower_stdlib_signal(ctx, call) {
        return Some(expr);
    }
    if let Some(expr) = lower_stdlib_gpu(ctx, call) {
        return Some(expr);
    }
    if name.contains('.') {
        if let Some(expr) = lower_bufio_method(ctx, call) {
            return Some(expr);
        }
    }

    None
}

fn lower_args(ctx: &mut LowerCtx, call: &ast::CallExpr) -> Vec<ir::Value> {
    let mut args = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        if let Some(expr) = lower_expr(ctx, arg) {
            args.extend(expr.result);
        }
    }
    args
}

fn single(ctx: &mut LowerCtx, callee: &str, args: Vec<ir::Value>, ty: &str) -> ir::Expr {
    let id = ctx.new_temp();
    let mut expr = ir::Expr::call(callee, args, Some(ir::Value::new(id, Symbol::new(ty))));
    if let ir::ExprOp::Call(target) = &mut expr.op {
        target.result_types = vec![Symbol::new(ty)];
    }
    expr
}

fn lower_stdlib_math(ctx: &mut LowerCtx, call: &ast::CallExpr) -> Option<ir::Expr> {
    let name = call.name.value();
    if !name.starts_with("math.") {
        return None;
    }

    let args = lower_args(ctx, call);

    // Single-result mappings to llvm.* float intrinsics.
    let intrinsic = match name {
        "math.Abs" => Some("llvm.fabs.f64"),
        "math.Max" => Some("llvm.maxnum.f64"),
        "math.Min" => Some("llvm.minnum.f64"),
        "math.Ceil" => Some("llvm.ceil.f64"),
        "math.Floor" => Some("llvm.floor.f64"),
        "math.Trunc" => Some("llvm.trunc.f64"),
        "math.Round" => Some("llvm.round.f64"),
        "math.Exp" => Some("llvm.exp.f64"),
        "math.Exp2" => Some("llvm.exp2.f64"),
        "math.Log" => Some("llvm.log.f64"),
        "math.Log2" => Some("llvm.log2.f64"),
        "math.Log10" => Some("llvm.log10.f64"),
        "math.Sqrt" => Some("llvm.sqrt.f64"),
        "math.Pow" => Some("llvm.pow.f64"),
        "math.Sin" => Some("llvm.sin.f64"),
        "math.Cos" => Some("llvm.cos.f64"),
        "math.Copysign" => Some("llvm.copysign.f64"),
        _ => None,
    };
    if let Some(intrinsic) = intrinsic {
        return Some(single(ctx, intrinsic, args, "float64"));
    }

    // Aggregate-return runtime helpers for multi-result math.
    let multi = match name {
        "math.Sincos" => Some(("rill_rt_math_sincos", ["float64", "float64"])),
        "math.Modf" => Some(("rill_rt_math_modf", ["float64", "float64"])),
        "math.Frexp" => Some(("rill_rt_math_frexp", ["float64", "int64"])),
        _ => None,
    };
    if let Some((callee, types)) = multi {
        let results = types
            .iter()
            .map(|ty| ir::Value::new(ctx.new_temp(), Symbol::new(ty)))
            .collect();
        return Some(ir::Expr::call_multi(callee, args, results));
    }

    match name {
        "math.NaN" => Some(single(ctx, "llvm.nan.f64", args, "float64")),
        "math.Inf" => Some(single(ctx, "rill_rt_math_inf", args, "float64")),
        "math.IsNaN" => Some(single(ctx, "rill_rt_math_isnan", args, "bool")),
        "math.IsInf" => Some(single(ctx, "rill_rt_math_isinf", args, "bool")),
        "math.Signbit" => Some(single(ctx, "rill_rt_math_signbit", args, "bool")),
        _ => None,
    }
}

fn lower_stdlib_time(ctx: &mut LowerCtx, call: &ast::CallExpr) -> Option<ir::Expr> {
    let name = call.name.value();

    if name.ends_with(".Sleep") {
        let args = lower_args(ctx, call);
        return Some(ir::Expr::call("rill_rt_sleep_ms", args, None));
    }
    if name.ends_with(".Now") {
        return Some(single(ctx, "rill_rt_time_now", Vec::new(), "Time"));
    }
    if name.ends_with(".Add") && name.starts_with("time.") {
        let mut args = Vec::new();
        if let Some(arg) = call.args.first() {
            if let Some(expr) = lower_expr(ctx, arg) {
                if let Some(result) = expr.result {
                    args.push(ir::Value::new(result.id, Symbol::new("int64")));
                }
            }
        }
        if let Some(arg) = call.args.get(1) {
            if let Some(expr) = lower_expr(ctx, arg) {
                args.extend(expr.result);
            }
        }
        return Some(single(ctx, "rill_rt_time_add", args, "Time"));
    }
    if name.ends_with(".Delta") {
        let mut args = Vec::new();
        for arg in call.args.iter().take(2) {
            if let Some(expr) = lower_expr(ctx, arg) {
                if let Some(result) = expr.result {
                    args.push(ir::Value::new(result.id, Symbol::new("int64")));
                }
            }
        }
        return Some(single(ctx, "rill_rt_time_delta", args, "int64"));
    }
    if name.ends_with(".UnixNano") {
        let args = unix_args(ctx, call);
        return Some(single(ctx, "rill_rt_time_unix_nano", args, "int64"));
    }
    if name.ends_with(".Unix") {
        let args = unix_args(ctx, call);
        return Some(single(ctx, "rill_rt_time_unix", args, "int64"));
    }

    None
}

/// `time.Unix(t)` takes its operand positionally, `t.Unix()` as a receiver.
fn unix_args(ctx: &mut LowerCtx, call: &ast::CallExpr) -> Vec<ir::Value> {
    if let Some(arg) = call.args.first() {
        if let Some(expr) = lower_expr(ctx, arg) {
            if let Some(result) = expr.result {
                return vec![ir::Value::new(result.id, Symbol::new("int64"))];
            }
        }
        return Vec::new();
    }

    match method_receiver(ctx, call.name, "int64") {
        Some(receiver) => vec![receiver],
        None => Vec::new(),
    }
}

fn lower_stdlib_signal(ctx: &mut LowerCtx, call: &ast::CallExpr) -> Option<ir::Expr> {
    match call.name.value() {
        "signal.Register" => {
            let mut args = Vec::with_capacity(2);
            args.push(signal_number_arg(ctx, call.args.first()));
            let token = call.args.get(1).map(handler_token).unwrap_or(0);
            args.push(ir::Value::immediate(token, "int64"));
            Some(ir::Expr::call("rill_rt_signal_register", args, None))
        }
        "signal.Enable" => {
            let args = vec![signal_number_arg(ctx, call.args.first())];
            Some(ir::Expr::call("rill_rt_os_signal_enable", args, None))
        }
        "signal.Disable" => {
            let args = vec![signal_number_arg(ctx, call.args.first())];
            Some(ir::Expr::call("rill_rt_os_signal_disable", args, None))
        }
        "signal.Install" => {
            let token = call.args.first().map(handler_token).unwrap_or(0);
            let thunk = match call.args.first().map(|a| &a.kind) {
                Some(ast::ExpressionKind::Identifier(name)) if !name.is_empty() => {
                    ir::Value::new(Symbol::new(&format!("#@{name}")), Symbol::new("ptr"))
                }
                _ => ir::Value::null("ptr"),
            };
            let args = vec![ir::Value::immediate(token, "int64"), thunk];
            Some(ir::Expr::call("rill_rt_install_handler_thunk", args, None))
        }
        "signal.Token" => {
            let token = call.args.first().map(handler_token).unwrap_or(0);
            let id = ctx.new_temp();
            Some(ir::Expr::lit(
                &token.to_string(),
                ir::Value::new(id, Symbol::new("int64")),
            ))
        }
        _ => None,
    }
}

/// Lowers a signal-type argument, preferring the immediate OS number when
/// the argument is an enum-shaped selector.
fn signal_number_arg(ctx: &mut LowerCtx, arg: Option<&ast::Expression>) -> ir::Value {
    if let Some(arg) = arg {
        if let ast::ExpressionKind::Selector(selector) = &arg.kind {
            if selector.path.len() == 1 {
                if let Some(number) = signal_constant(selector.path[0]) {
                    return ir::Value::immediate(number, "int64");
                }
            }
        }
        if let Some(expr) = lower_expr(ctx, arg) {
            if let Some(result) = expr.result {
                return ir::Value::new(result.id, Symbol::new("int64"));
            }
        }
    }
    ir::Value::immediate(0, "int64")
}

fn lower_stdlib_gpu(ctx: &mut LowerCtx, call: &ast::CallExpr) -> Option<ir::Expr> {
    let name = call.name.value();

    // Availability probes read bits off the runtime capability mask.
    let mask_bit = match () {
        _ if name.ends_with(".MetalAvailable") => Some(0),
        _ if name.ends_with(".CudaAvailable") => Some(1),
        _ if name.ends_with(".OpenCLAvailable") => Some(2),
        _ => None,
    };
    if let Some(bit) = mask_bit {
        let id = ctx.new_temp();
        return Some(ir::Expr::call(
            "rill_rt_gpu_has",
            vec![ir::Value::immediate(bit, "int64")],
            Some(ir::Value::new(id, Symbol::new("bool"))),
        ));
    }

    let device_list = "slice<Struct{ID:int64,Name:string,Backend:string}>";
    if name.ends_with(".MetalDevices") {
        return Some(single(ctx, "rill_rt_metal_devices", Vec::new(), device_list));
    }
    if name.ends_with(".CudaDevices") {
        return Some(single(ctx, "rill_rt_cuda_devices", Vec::new(), device_list));
    }
    if name.ends_with(".OpenCLDevices") {
        return Some(single(ctx, "rill_rt_opencl_devices", Vec::new(), device_list));
    }
    if name.ends_with(".OpenCLPlatforms") {
        return Some(single(
            ctx,
            "rill_rt_opencl_platforms",
            Vec::new(),
            "slice<Struct{Name:string,Vendor:string}>",
        ));
    }

    if name.ends_with(".BlockingSubmit") {
        // A single nested call argument is submitted directly.
        if call.args.len() == 1 {
            if let ast::ExpressionKind::Call(inner) = &call.args[0].kind {
                if let Some(expr) = lower_stdlib_call(ctx, inner) {
                    return Some(expr);
                }
            }
        }
        let args = lower_args(ctx, call);
        return Some(single(ctx, "rill_rt_gpu_blocking_submit", args, "Error<any>"));
    }

    None
}

/// Synthesizes the receiver of a method-style call (`r.Read`) as its first
/// argument, typed from the tracked variable table.
fn method_receiver(ctx: &mut LowerCtx, name: Symbol, fallback_ty: &str) -> Option<ir::Value> {
    let name = name.value();
    let (receiver, _) = name.rsplit_once('.')?;
    if receiver.is_empty() {
        return None;
    }

    let receiver = Symbol::new(receiver);
    let ty = ctx
        .tracked_type(receiver)
        .unwrap_or(Symbol::new(fallback_ty));
    Some(ir::Value::new(receiver, ty))
}

fn lower_bufio_method(ctx: &mut LowerCtx, call: &ast::CallExpr) -> Option<ir::Expr> {
    let name = call.name.value();
    let (_, method) = name.rsplit_once('.')?;
    let receiver = method_receiver(ctx, call.name, "any")?;

    let mut args = Vec::with_capacity(call.args.len() + 1);
    args.push(receiver);
    args.extend(lower_args(ctx, call));

    let owned_bytes = "Owned<slice<uint8>>";
    match (receiver.ty.value(), method) {
        ("bufio.Reader", "Read") => Some(multi_result(
            ctx,
            "rill_rt_bufio_reader_read",
            args,
            &[owned_bytes, "error"],
        )),
        ("bufio.Reader", "Peek") => Some(multi_result(
            ctx,
            "rill_rt_bufio_reader_peek",
            args,
            &[owned_bytes, "error"],
        )),
        ("bufio.Reader", "UnreadByte") => {
            Some(single(ctx, "rill_rt_bufio_reader_unread_byte", args, "error"))
        }
        ("bufio.Writer", "Write") => Some(multi_result(
            ctx,
            "rill_rt_bufio_writer_write",
            args,
            &["int", "error"],
        )),
        ("bufio.Writer", "Flush") => Some(single(ctx, "rill_rt_bufio_writer_flush", args, "error")),
        ("bufio.Scanner", "Scan") => Some(single(ctx, "rill_rt_bufio_scanner_scan", args, "bool")),
        ("bufio.Scanner", "Text") => Some(single(ctx, "rill_rt_bufio_scanner_text", args, "string")),
        ("bufio.Scanner", "Bytes") => {
            Some(single(ctx, "rill_rt_bufio_scanner_bytes", args, owned_bytes))
        }
        ("bufio.Scanner", "Err") => Some(single(ctx, "rill_rt_bufio_scanner_err", args, "error")),
        _ => None,
    }
}

fn multi_result(
    ctx: &mut LowerCtx,
    callee: &str,
    args: Vec<ir::Value>,
    types: &[&str],
) -> ir::Expr {
    let results = types
        .iter()
        .map(|ty| ir::Value::new(ctx.new_temp(), Symbol::new(ty)))
        .collect();
    ir::Expr::call_multi(callee, args, results)
}
