//! Compact one-line expression rendering for diagnostics and trace output.

use std::fmt::Write as _;

use crate::expr::{CallAttrs, ExprId, ExprKind, Literal, Pattern};
use crate::module::Module;

/// Render an expression compactly: `let %a = on_device(heavy(%x), scope=(cuda, 0)); light(%a)`.
///
/// Intended for error messages and trace events, not for parsing back.
pub fn expr_to_string(module: &Module, id: ExprId) -> String {
    let mut out = String::new();
    write_expr(module, id, &mut out);
    out
}

fn write_expr(module: &Module, id: ExprId, out: &mut String) {
    match module.arena.kind(id) {
        ExprKind::Var(var) => {
            let _ = write!(out, "%{}", module.var(*var).name);
        }
        ExprKind::Global(global) => {
            let _ = write!(out, "@{}", module.global(*global).name);
        }
        ExprKind::Constant(literal) => match literal {
            Literal::Int(value) => {
                let _ = write!(out, "{value}");
            }
            Literal::Float(bits) => {
                let _ = write!(out, "{}", f64::from_bits(*bits));
            }
            Literal::Tensor { dims } => {
                out.push_str("tensor[");
                for (i, dim) in dims.iter().enumerate() {
                    if i > 0 {
                        out.push('x');
                    }
                    let _ = write!(out, "{dim}");
                }
                out.push(']');
            }
        },
        ExprKind::Op(op) => out.push_str(&module.op_info(*op).name),
        ExprKind::Ctor(ctor) => out.push_str(&module.ctor(*ctor).name),
        ExprKind::Tuple(fields) => {
            out.push('(');
            for (i, &field) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(module, field, out);
            }
            out.push(')');
        }
        ExprKind::Project { tuple, index } => {
            write_expr(module, *tuple, out);
            let _ = write!(out, ".{index}");
        }
        ExprKind::Function(function) => {
            out.push_str("fn");
            if function.attrs.primitive {
                out.push_str("[primitive]");
            }
            out.push('(');
            for (i, &param) in function.params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "%{}", module.var(param).name);
            }
            out.push_str(") { ");
            write_expr(module, function.body, out);
            out.push_str(" }");
        }
        ExprKind::Call(call) => {
            write_expr(module, call.callee, out);
            out.push('(');
            for (i, &arg) in call.args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(module, arg, out);
            }
            match &call.attrs {
                CallAttrs::None => {}
                CallAttrs::OnDevice { scope, is_fixed } => {
                    let _ = write!(out, ", scope={scope}");
                    if *is_fixed {
                        out.push_str(", fixed");
                    }
                }
                CallAttrs::DeviceCopy { src, dst } => {
                    let _ = write!(out, ", src={src}, dst={dst}");
                }
                CallAttrs::AllocStorage { scope } => {
                    let _ = write!(out, ", scope={scope}");
                }
            }
            out.push(')');
        }
        ExprKind::Let(binding) => {
            let _ = write!(out, "let %{} = ", module.var(binding.var).name);
            write_expr(module, binding.value, out);
            out.push_str("; ");
            write_expr(module, binding.body, out);
        }
        ExprKind::If(branch) => {
            out.push_str("if ");
            write_expr(module, branch.cond, out);
            out.push_str(" { ");
            write_expr(module, branch.then_branch, out);
            out.push_str(" } else { ");
            write_expr(module, branch.else_branch, out);
            out.push_str(" }");
        }
        ExprKind::Match(matching) => {
            out.push_str("match ");
            write_expr(module, matching.scrutinee, out);
            out.push_str(" { ");
            for (i, clause) in matching.clauses.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_pattern(module, &clause.pattern, out);
                out.push_str(" => ");
                write_expr(module, clause.body, out);
            }
            out.push_str(" }");
        }
        ExprKind::RefNew(value) => {
            out.push_str("ref ");
            write_expr(module, *value, out);
        }
        ExprKind::RefRead(reference) => {
            out.push('!');
            write_expr(module, *reference, out);
        }
        ExprKind::RefWrite { reference, value } => {
            write_expr(module, *reference, out);
            out.push_str(" := ");
            write_expr(module, *value, out);
        }
    }
}

fn write_pattern(module: &Module, pattern: &Pattern, out: &mut String) {
    match pattern {
        Pattern::Wildcard => out.push('_'),
        Pattern::Var(var) => {
            let _ = write!(out, "%{}", module.var(*var).name);
        }
        Pattern::Ctor { ctor, fields } => {
            out.push_str(&module.ctor(*ctor).name);
            if !fields.is_empty() {
                out.push('(');
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_pattern(module, field, out);
                }
                out.push(')');
            }
        }
        Pattern::Tuple(fields) => {
            out.push('(');
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_pattern(module, field, out);
            }
            out.push(')');
        }
    }
}
