//! Phase 0: annotation normalization.
//!
//! A bottom-up rewrite that tightens `on_device` annotations before
//! constraint collection:
//!
//! ```text
//! let %x = on_device(e, scope=s); body
//!   ==> let %x = on_device(e, scope=s, fixed); body
//!
//! fn(%x) { on_device(e, scope=s) }
//!   ==> fn(%x) { on_device(e, scope=s, fixed) }
//!
//! on_device(t, scope=s).i
//!   ==> on_device(t.i, scope=s)
//! ```
//!
//! The first two close the degree of freedom in a let binding and a function
//! result that would otherwise admit surprising copies, and make the pass
//! idempotent (annotations it inserts are fixed already). The third prefers
//! copying a projection over projecting from a copy of the whole tuple.
//!
//! The rewrite appends to the module's arena and reuses any node it does not
//! change, so untouched expressions keep their identity.

use strata_ir::{ExprId, ExprKind, FunctionNode, LetNode, Module};

/// Normalize every top-level function in place.
#[tracing::instrument(level = "debug", skip_all, fields(functions = module.functions().len()))]
pub(crate) fn normalize(module: &mut Module) {
    let functions = module.functions().to_vec();
    let mut rewritten = Vec::with_capacity(functions.len());
    for (global, function) in functions {
        rewritten.push((global, rewrite(module, function)));
    }
    module.set_functions(rewritten);
}

/// Turn a non-fixed annotation into a fixed one; leave anything else alone.
fn fix_annotation(module: &mut Module, expr: ExprId) -> ExprId {
    if let Some(props) = module.on_device_props(expr) {
        if !props.is_fixed {
            tracing::debug!(scope = %props.scope, "fixing annotation at binding position");
            return module.on_device(props.body, props.scope, true);
        }
    }
    expr
}

fn rewrite(module: &mut Module, expr: ExprId) -> ExprId {
    match module.arena.kind(expr).clone() {
        ExprKind::Var(_)
        | ExprKind::Global(_)
        | ExprKind::Constant(_)
        | ExprKind::Op(_)
        | ExprKind::Ctor(_) => expr,

        ExprKind::Function(function) => {
            // Primitive bodies are compiled per call site; leave them alone.
            if function.attrs.primitive {
                return expr;
            }
            let body = rewrite(module, function.body);
            let body = fix_annotation(module, body);
            if body == function.body {
                return expr;
            }
            let ty = module.arena.ty(expr);
            let span = module.arena.span(expr);
            module.expr(
                ExprKind::Function(Box::new(FunctionNode {
                    params: function.params,
                    body,
                    attrs: function.attrs,
                })),
                ty,
                span,
            )
        }

        ExprKind::Let(_) => rewrite_let_spine(module, expr),

        ExprKind::Project { tuple, index } => {
            let new_tuple = rewrite(module, tuple);
            if let Some(props) = module.on_device_props(new_tuple) {
                if !props.is_fixed {
                    // Move the annotation onto the projection.
                    let ty = module.arena.ty(expr);
                    let span = module.arena.span(expr);
                    let projection = module.expr(
                        ExprKind::Project {
                            tuple: props.body,
                            index,
                        },
                        ty,
                        span,
                    );
                    return module.on_device(projection, props.scope, false);
                }
            }
            if new_tuple == tuple {
                return expr;
            }
            let ty = module.arena.ty(expr);
            let span = module.arena.span(expr);
            module.expr(
                ExprKind::Project {
                    tuple: new_tuple,
                    index,
                },
                ty,
                span,
            )
        }

        ExprKind::Tuple(fields) => {
            let new_fields: Vec<ExprId> =
                fields.iter().map(|&field| rewrite(module, field)).collect();
            if new_fields == fields {
                return expr;
            }
            let ty = module.arena.ty(expr);
            let span = module.arena.span(expr);
            module.expr(ExprKind::Tuple(new_fields), ty, span)
        }

        ExprKind::Call(mut call) => {
            let new_callee = rewrite(module, call.callee);
            let new_args: Vec<ExprId> =
                call.args.iter().map(|&arg| rewrite(module, arg)).collect();
            if new_callee == call.callee && new_args == call.args {
                return expr;
            }
            call.callee = new_callee;
            call.args = new_args;
            let ty = module.arena.ty(expr);
            let span = module.arena.span(expr);
            module.expr(ExprKind::Call(call), ty, span)
        }

        ExprKind::If(mut branch) => {
            let cond = rewrite(module, branch.cond);
            let then_branch = rewrite(module, branch.then_branch);
            let else_branch = rewrite(module, branch.else_branch);
            if cond == branch.cond
                && then_branch == branch.then_branch
                && else_branch == branch.else_branch
            {
                return expr;
            }
            branch.cond = cond;
            branch.then_branch = then_branch;
            branch.else_branch = else_branch;
            let ty = module.arena.ty(expr);
            let span = module.arena.span(expr);
            module.expr(ExprKind::If(branch), ty, span)
        }

        ExprKind::Match(mut matching) => {
            let scrutinee = rewrite(module, matching.scrutinee);
            let mut changed = scrutinee != matching.scrutinee;
            for clause in &mut matching.clauses {
                let body = rewrite(module, clause.body);
                changed |= body != clause.body;
                clause.body = body;
            }
            if !changed {
                return expr;
            }
            matching.scrutinee = scrutinee;
            let ty = module.arena.ty(expr);
            let span = module.arena.span(expr);
            module.expr(ExprKind::Match(matching), ty, span)
        }

        ExprKind::RefNew(value) => {
            let new_value = rewrite(module, value);
            if new_value == value {
                return expr;
            }
            let ty = module.arena.ty(expr);
            let span = module.arena.span(expr);
            module.expr(ExprKind::RefNew(new_value), ty, span)
        }

        ExprKind::RefRead(reference) => {
            let new_reference = rewrite(module, reference);
            if new_reference == reference {
                return expr;
            }
            let ty = module.arena.ty(expr);
            let span = module.arena.span(expr);
            module.expr(ExprKind::RefRead(new_reference), ty, span)
        }

        ExprKind::RefWrite { reference, value } => {
            let new_reference = rewrite(module, reference);
            let new_value = rewrite(module, value);
            if new_reference == reference && new_value == value {
                return expr;
            }
            let ty = module.arena.ty(expr);
            let span = module.arena.span(expr);
            module.expr(
                ExprKind::RefWrite {
                    reference: new_reference,
                    value: new_value,
                },
                ty,
                span,
            )
        }
    }
}

/// Rewrite a chain of lets iteratively; chains can be thousands deep.
fn rewrite_let_spine(module: &mut Module, expr: ExprId) -> ExprId {
    let mut bindings = Vec::new();
    let mut changed = false;
    let mut current = expr;
    loop {
        let binding = match module.arena.kind(current) {
            ExprKind::Let(binding) => binding.as_ref().clone(),
            _ => break,
        };
        let value = rewrite(module, binding.value);
        let value = fix_annotation(module, value);
        changed |= value != binding.value;
        bindings.push((
            binding.var,
            value,
            module.arena.ty(current),
            module.arena.span(current),
        ));
        current = binding.body;
    }
    let mut body = rewrite(module, current);
    changed |= body != current;
    if !changed {
        return expr;
    }
    for (var, value, ty, span) in bindings.into_iter().rev() {
        body = module.expr(
            ExprKind::Let(Box::new(LetNode { var, value, body })),
            ty,
            span,
        );
    }
    body
}
