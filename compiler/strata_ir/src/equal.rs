//! Structural equality across arenas.
//!
//! Rewriting passes rebuild expressions into fresh arenas, so node ids are
//! not comparable between a pass's input and output. These helpers compare by
//! structure instead: same shape, same names, same attributes, regardless of
//! where nodes sit in their arenas.

use crate::expr::{ExprId, ExprKind, Pattern};
use crate::module::Module;

/// Compare two modules structurally: same definitions, in the same order,
/// with structurally equal bodies.
pub fn module_structurally_eq(lhs: &Module, rhs: &Module) -> bool {
    lhs.functions().len() == rhs.functions().len()
        && lhs
            .functions()
            .iter()
            .zip(rhs.functions())
            .all(|(&(lg, lf), &(rg, rf))| {
                lhs.global(lg).name == rhs.global(rg).name
                    && expr_structurally_eq(lhs, lf, rhs, rf)
            })
}

/// Compare two expressions structurally across (possibly different) modules.
///
/// Variables compare by name, so modules built through independent
/// `fresh_var` sequences still compare equal when their binding structure
/// matches. Types are intentionally ignored: two pipeline stages may differ
/// in how much type information they recorded.
pub fn expr_structurally_eq(
    lhs_module: &Module,
    lhs: ExprId,
    rhs_module: &Module,
    rhs: ExprId,
) -> bool {
    match (lhs_module.arena.kind(lhs), rhs_module.arena.kind(rhs)) {
        (ExprKind::Var(a), ExprKind::Var(b)) => {
            lhs_module.var(*a).name == rhs_module.var(*b).name
        }
        (ExprKind::Global(a), ExprKind::Global(b)) => {
            lhs_module.global(*a).name == rhs_module.global(*b).name
        }
        (ExprKind::Constant(a), ExprKind::Constant(b)) => a == b,
        (ExprKind::Op(a), ExprKind::Op(b)) => {
            lhs_module.op_info(*a).name == rhs_module.op_info(*b).name
        }
        (ExprKind::Ctor(a), ExprKind::Ctor(b)) => {
            lhs_module.ctor(*a).name == rhs_module.ctor(*b).name
        }
        (ExprKind::Tuple(a), ExprKind::Tuple(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|(&fa, &fb)| expr_structurally_eq(lhs_module, fa, rhs_module, fb))
        }
        (
            ExprKind::Project { tuple: ta, index: ia },
            ExprKind::Project { tuple: tb, index: ib },
        ) => ia == ib && expr_structurally_eq(lhs_module, *ta, rhs_module, *tb),
        (ExprKind::Function(a), ExprKind::Function(b)) => {
            a.params.len() == b.params.len()
                && a.attrs == b.attrs
                && a.params.iter().zip(&b.params).all(|(&pa, &pb)| {
                    lhs_module.var(pa).name == rhs_module.var(pb).name
                })
                && expr_structurally_eq(lhs_module, a.body, rhs_module, b.body)
        }
        (ExprKind::Call(a), ExprKind::Call(b)) => {
            a.attrs == b.attrs
                && a.args.len() == b.args.len()
                && expr_structurally_eq(lhs_module, a.callee, rhs_module, b.callee)
                && a.args
                    .iter()
                    .zip(&b.args)
                    .all(|(&aa, &ab)| expr_structurally_eq(lhs_module, aa, rhs_module, ab))
        }
        (ExprKind::Let(a), ExprKind::Let(b)) => {
            lhs_module.var(a.var).name == rhs_module.var(b.var).name
                && expr_structurally_eq(lhs_module, a.value, rhs_module, b.value)
                && expr_structurally_eq(lhs_module, a.body, rhs_module, b.body)
        }
        (ExprKind::If(a), ExprKind::If(b)) => {
            expr_structurally_eq(lhs_module, a.cond, rhs_module, b.cond)
                && expr_structurally_eq(lhs_module, a.then_branch, rhs_module, b.then_branch)
                && expr_structurally_eq(lhs_module, a.else_branch, rhs_module, b.else_branch)
        }
        (ExprKind::Match(a), ExprKind::Match(b)) => {
            a.clauses.len() == b.clauses.len()
                && expr_structurally_eq(lhs_module, a.scrutinee, rhs_module, b.scrutinee)
                && a.clauses.iter().zip(&b.clauses).all(|(ca, cb)| {
                    pattern_structurally_eq(lhs_module, &ca.pattern, rhs_module, &cb.pattern)
                        && expr_structurally_eq(lhs_module, ca.body, rhs_module, cb.body)
                })
        }
        (ExprKind::RefNew(a), ExprKind::RefNew(b))
        | (ExprKind::RefRead(a), ExprKind::RefRead(b)) => {
            expr_structurally_eq(lhs_module, *a, rhs_module, *b)
        }
        (
            ExprKind::RefWrite { reference: ra, value: va },
            ExprKind::RefWrite { reference: rb, value: vb },
        ) => {
            expr_structurally_eq(lhs_module, *ra, rhs_module, *rb)
                && expr_structurally_eq(lhs_module, *va, rhs_module, *vb)
        }
        _ => false,
    }
}

fn pattern_structurally_eq(
    lhs_module: &Module,
    lhs: &Pattern,
    rhs_module: &Module,
    rhs: &Pattern,
) -> bool {
    match (lhs, rhs) {
        (Pattern::Wildcard, Pattern::Wildcard) => true,
        (Pattern::Var(a), Pattern::Var(b)) => {
            lhs_module.var(*a).name == rhs_module.var(*b).name
        }
        (
            Pattern::Ctor { ctor: ca, fields: fa },
            Pattern::Ctor { ctor: cb, fields: fb },
        ) => {
            lhs_module.ctor(*ca).name == rhs_module.ctor(*cb).name
                && fa.len() == fb.len()
                && fa
                    .iter()
                    .zip(fb)
                    .all(|(a, b)| pattern_structurally_eq(lhs_module, a, rhs_module, b))
        }
        (Pattern::Tuple(fa), Pattern::Tuple(fb)) => {
            fa.len() == fb.len()
                && fa
                    .iter()
                    .zip(fb)
                    .all(|(a, b)| pattern_structurally_eq(lhs_module, a, rhs_module, b))
        }
        _ => false,
    }
}
