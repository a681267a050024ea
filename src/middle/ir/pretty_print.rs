use colored::Colorize;
use itertools::Itertools;

use crate::middle::ir;

pub fn pretty_print_function(function: &ir::Function) {
    print!(
        "{} {}{}",
        "fn".magenta(),
        function.name.value().blue(),
        "(".white()
    );

    print!(
        "{}",
        function
            .params
            .iter()
            .map(|p| format!("{}: {}", p.id, p.ty.value()))
            .join(", ")
            .white()
    );

    print!("{}", ")".white());

    if !function.results.is_empty() {
        print!(
            " {} {}",
            "->".white(),
            function
                .results
                .iter()
                .map(|r| r.ty.value())
                .join(", ")
                .yellow()
        );
    }

    println!("{}", " {".white());

    for block in &function.blocks {
        println!("{}", format!("{}:", block.name).bright_red());

        for instruction in &block.instructions {
            println!("    {instruction}");
        }
    }

    println!("{}", "}".white())
}

/// Renders a module as a plain-text listing with the color codes stripped,
/// suitable for debug artifacts and golden tests.
pub fn module_listing(module: &ir::Module) -> String {
    let mut out = String::new();

    for function in &module.functions {
        out.push_str(&format!("fn {}(", function.name));
        out.push_str(
            &function
                .params
                .iter()
                .map(|p| format!("{}: {}", p.id, p.ty))
                .join(", "),
        );
        out.push(')');
        if !function.results.is_empty() {
            out.push_str(" -> ");
            out.push_str(&function.results.iter().map(|r| r.ty.value()).join(", "));
        }
        out.push_str(" {\n");

        for block in &function.blocks {
            out.push_str(&format!("{}:\n", block.name));
            for instruction in &block.instructions {
                out.push_str("    ");
                out.push_str(&strip_ansi_escapes::strip_str(instruction.to_string()));
                out.push('\n');
            }
        }

        out.push_str("}\n");
    }

    out
}

impl core::fmt::Display for ir::Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.id.value().starts_with('#') {
            write!(f, "{}", self.id.value().purple())
        } else {
            write!(f, "{}", self.id.value().yellow())
        }
    }
}

impl core::fmt::Display for ir::Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(result) = &self.result {
            write!(f, "{result} {} ", "=".white())?;
        } else if !self.results.is_empty() {
            write!(
                f,
                "{}{}{} {} ",
                "(".white(),
                self.results.iter().map(|r| r.to_string()).join(", "),
                ")".white(),
                "=".white()
            )?;
        }

        match &self.op {
            ir::ExprOp::Lit(text) => write!(f, "{}{}", "lit:".cyan(), text.value().purple()),
            ir::ExprOp::Ident => write!(f, "{}", "ident".cyan()),
            ir::ExprOp::Unary(op) => {
                write!(f, "{} {}", op.ir_name().cyan(), self.args.iter().join(", "))
            }
            ir::ExprOp::Binary(op) => {
                write!(f, "{} {}", op.ir_name().cyan(), self.args.iter().join(", "))
            }
            ir::ExprOp::Call(target) => write!(
                f,
                "{} {}({})",
                "call".cyan(),
                target.callee.value().blue(),
                self.args.iter().join(", ").white()
            ),
            ir::ExprOp::Field(path) => write!(
                f,
                "{}{} {}",
                "field.".cyan(),
                path.value().blue(),
                self.args.iter().join(", ")
            ),
            ir::ExprOp::Container(kind) => write!(
                f,
                "{}{} {}",
                kind.to_string().cyan(),
                ".lit".cyan(),
                self.args.iter().join(", ")
            ),
        }
    }
}

impl core::fmt::Display for ir::Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ir::Instruction::Var {
                name,
                ty,
                init,
                result: _,
            } => {
                write!(f, "{} {}", "var".magenta(), name.value().yellow())?;
                if !ty.is_empty() {
                    write!(f, "{} {}", ":".white(), ty.value().yellow())?;
                }
                if let Some(init) = init {
                    write!(f, " {} {init}", "=".white())?;
                }
                Ok(())
            }
            ir::Instruction::Assign { dest, src } => {
                write!(f, "{} {} {src}", dest.value().yellow(), "=".white())
            }
            ir::Instruction::Return { values } => {
                if values.is_empty() {
                    write!(f, "{}", "ret".cyan())
                } else {
                    write!(f, "{} {}", "ret".cyan(), values.iter().join(", "))
                }
            }
            ir::Instruction::Defer(expr) => write!(f, "{} {expr}", "defer".magenta()),
            ir::Instruction::Expr(expr) => write!(f, "{expr}"),
            ir::Instruction::CondBr {
                cond,
                true_label,
                false_label,
            } => write!(
                f,
                "{} {cond} {} {}",
                "br".cyan(),
                true_label.value().blue(),
                false_label.value().blue()
            ),
            ir::Instruction::Goto { label } => {
                write!(f, "{} {}", "jmp".cyan(), label.value().blue())
            }
            ir::Instruction::Phi { result, incomings } => {
                write!(f, "{result} {} {}{}", "=".white(), "phi".bright_green(), "(".white())?;
                write!(
                    f,
                    "{}",
                    incomings
                        .iter()
                        .map(|inc| format!("{} -> {}", inc.label.value().blue(), inc.value))
                        .join(", ")
                        .white()
                )?;
                write!(f, "{}", ")".white())
            }
            ir::Instruction::Loop { name } => {
                write!(f, "{} {}", "loop".bright_green(), name.value().blue())
            }
            ir::Instruction::Dispatch { label } => {
                write!(f, "{} {}", "dispatch".bright_green(), label.value().blue())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::frontend::intern::Symbol;
    use crate::middle::ir;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    #[test]
    fn listing_strips_color_codes() {
        let module = ir::Module {
            package: sym("main"),
            functions: vec![ir::Function {
                name: sym("F"),
                params: vec![ir::Value::new(sym("x"), sym("int"))],
                results: vec![ir::Value::new(sym(""), sym("int"))],
                blocks: vec![ir::Block::new(
                    sym("entry"),
                    vec![
                        ir::Instruction::Expr(ir::Expr::lit(
                            "23",
                            ir::Value::new(sym("t0"), sym("int")),
                        )),
                        ir::Instruction::Return {
                            values: vec![ir::Value::new(sym("t0"), sym("int"))],
                        },
                    ],
                )],
                decorators: Vec::new(),
            }],
            ..Default::default()
        };

        let listing = ir::pretty_print::module_listing(&module);
        assert!(!listing.contains('\x1b'));
        assert_eq!(
            listing,
            indoc::indoc! {"
                fn F(x: int) -> int {
                entry:
                    t0 = lit:23
                    ret t0
                }
            "}
        );
    }
}
