//! Phase 3: reifying the solved domains back into the IR.
//!
//! Rebuilds every function so that a downstream pass can recover the scope
//! of any sub-expression by looking only at the lexically enclosing
//! annotation or function attribute:
//!
//! - original `on_device` calls are dropped (their constraints are consumed);
//! - `device_copy` calls whose endpoints canonicalize equal are dropped,
//!   while genuine copies are regenerated around their rewritten body;
//! - every non-primitive function gains `param_scopes` and `result_scope`
//!   attributes;
//! - at every child boundary, if the child's scope differs from what the
//!   context expects, the child is wrapped as
//!   `device_copy(on_device(child, scope=child_scope, fixed), src, dst)`,
//!   and if the expected scope differs from the lexically enclosing one the
//!   result is (also) wrapped in a fixed `on_device`.
//!
//! Operator and constructor references are scope-polymorphic and are never
//! wrapped. The output is structurally stable under re-planning.

use strata_device::Scope;
use strata_ir::{
    expr_to_string, CallNode, Clause, ExprId, ExprKind, FnAttrs, FunctionNode, LetNode, MatchNode,
    Module, VarId,
};

use crate::domain::DeviceDomains;
use crate::error::PlanError;

/// Reify the solved domains into a new module.
#[tracing::instrument(level = "debug", skip_all)]
pub(crate) fn capture(domains: DeviceDomains<'_>) -> Result<Module, PlanError> {
    let source = domains.module();
    let mut capturer = DeviceCapturer {
        domains,
        out: source.rebuild_shell(),
    };
    for &(global, function) in source.functions() {
        tracing::debug!(name = %source.global(global).name, "capturing scopes");
        let captured = capturer.visit(function)?;
        capturer.out.define(global, captured);
    }
    Ok(capturer.out)
}

struct DeviceCapturer<'m> {
    domains: DeviceDomains<'m>,
    out: Module,
}

impl<'m> DeviceCapturer<'m> {
    /// The scope assigned to an expression, looking through annotations the
    /// same way they will be pinched out of the rewritten tree. For
    /// higher-order expressions this is the (transitive) result scope.
    fn scope_of(&mut self, expr: ExprId) -> Result<Scope, PlanError> {
        let module = self.domains.module();
        let true_expr = match module.on_device_props(expr) {
            Some(props) => props.body,
            None => expr,
        };
        let domain = self.domains.domain_for(true_expr);
        let scope = self.domains.result_scope(domain);
        if scope.is_fully_unconstrained() {
            return Err(PlanError::UnresolvedDefault {
                site: expr_to_string(module, true_expr),
            });
        }
        Ok(scope)
    }

    fn var_scope(&mut self, var: VarId) -> Result<Scope, PlanError> {
        let domain = self.domains.domain_for_var(var);
        let scope = self.domains.result_scope(domain);
        if scope.is_fully_unconstrained() {
            let module = self.domains.module();
            return Err(PlanError::UnresolvedDefault {
                site: format!("%{}", module.var(var).name),
            });
        }
        Ok(scope)
    }

    fn visit(&mut self, expr: ExprId) -> Result<ExprId, PlanError> {
        let module = self.domains.module();

        // Original annotations have served their purpose.
        if let Some(props) = module.on_device_props(expr) {
            return self.visit(props.body);
        }

        // Existing copies: drop no-ops, regenerate the rest through the
        // child-wrapping rule below.
        if let Some(props) = module.device_copy_props(expr) {
            let src = self.domains.config().canonical(&props.src);
            let dst = self.domains.config().canonical(&props.dst);
            if src == dst {
                return self.visit(props.body);
            }
            return self.visit_child_scoped(&dst, &dst, &src, props.body);
        }

        match module.arena.kind(expr) {
            ExprKind::Var(_)
            | ExprKind::Global(_)
            | ExprKind::Constant(_)
            | ExprKind::Op(_)
            | ExprKind::Ctor(_) => Ok(self.copy_node(expr)),

            ExprKind::Function(_) => self.visit_function(expr),

            ExprKind::Call(call) => {
                let call_scope = self.scope_of(expr)?;
                let callee_domain = self.domains.domain_for_callee(expr)?;

                // The callee value lives on the scope of the call's result.
                let callee_scope = self.domains.result_scope(callee_domain);
                let callee = self.visit_child_scoped(
                    &call_scope,
                    &call_scope,
                    &callee_scope,
                    call.callee,
                )?;

                // Arguments live on their parameter's scope; when that
                // differs from the call's scope the wrap keeps the
                // difference lexically visible.
                let mut args = Vec::with_capacity(call.args.len());
                for (index, &arg) in call.args.iter().enumerate() {
                    let param_scope = match self.domains.param_domain(callee_domain, index) {
                        Some(param) => self.domains.result_scope(param),
                        None => self.domains.result_scope(callee_domain),
                    };
                    if param_scope.is_fully_unconstrained() {
                        return Err(PlanError::UnresolvedDefault {
                            site: expr_to_string(module, arg),
                        });
                    }
                    let arg_scope = self.scope_of(arg)?;
                    args.push(self.visit_child_scoped(
                        &call_scope,
                        &param_scope,
                        &arg_scope,
                        arg,
                    )?);
                }

                Ok(self.out.expr(
                    ExprKind::Call(Box::new(CallNode {
                        callee,
                        args,
                        attrs: call.attrs.clone(),
                    })),
                    module.arena.ty(expr),
                    module.arena.span(expr),
                ))
            }

            ExprKind::Let(_) => self.visit_let_spine(expr),

            ExprKind::Tuple(fields) => {
                let mut captured = Vec::with_capacity(fields.len());
                for &field in fields {
                    captured.push(self.visit_child(expr, field)?);
                }
                Ok(self.out.expr(
                    ExprKind::Tuple(captured),
                    module.arena.ty(expr),
                    module.arena.span(expr),
                ))
            }

            ExprKind::Project { tuple, index } => {
                let tuple = self.visit_child(expr, *tuple)?;
                Ok(self.out.expr(
                    ExprKind::Project {
                        tuple,
                        index: *index,
                    },
                    module.arena.ty(expr),
                    module.arena.span(expr),
                ))
            }

            ExprKind::If(branch) => {
                let cond = self.visit_child(expr, branch.cond)?;
                let then_branch = self.visit_child(expr, branch.then_branch)?;
                let else_branch = self.visit_child(expr, branch.else_branch)?;
                Ok(self.out.expr(
                    ExprKind::If(Box::new(strata_ir::IfNode {
                        cond,
                        then_branch,
                        else_branch,
                    })),
                    module.arena.ty(expr),
                    module.arena.span(expr),
                ))
            }

            ExprKind::Match(matching) => {
                let scrutinee = self.visit_child(expr, matching.scrutinee)?;
                let mut clauses = Vec::with_capacity(matching.clauses.len());
                for clause in &matching.clauses {
                    let body = self.visit_child(expr, clause.body)?;
                    clauses.push(Clause {
                        pattern: clause.pattern.clone(),
                        body,
                    });
                }
                Ok(self.out.expr(
                    ExprKind::Match(Box::new(MatchNode { scrutinee, clauses })),
                    module.arena.ty(expr),
                    module.arena.span(expr),
                ))
            }

            ExprKind::RefNew(value) => {
                let value = self.visit_child(expr, *value)?;
                Ok(self.out.expr(
                    ExprKind::RefNew(value),
                    module.arena.ty(expr),
                    module.arena.span(expr),
                ))
            }

            ExprKind::RefRead(reference) => {
                let reference = self.visit_child(expr, *reference)?;
                Ok(self.out.expr(
                    ExprKind::RefRead(reference),
                    module.arena.ty(expr),
                    module.arena.span(expr),
                ))
            }

            ExprKind::RefWrite { reference, value } => {
                let reference = self.visit_child(expr, *reference)?;
                let value = self.visit_child(expr, *value)?;
                Ok(self.out.expr(
                    ExprKind::RefWrite { reference, value },
                    module.arena.ty(expr),
                    module.arena.span(expr),
                ))
            }
        }
    }

    fn visit_function(&mut self, expr: ExprId) -> Result<ExprId, PlanError> {
        let module = self.domains.module();
        let ExprKind::Function(function) = module.arena.kind(expr) else {
            unreachable!("visit_function on a non-function expression")
        };

        // Primitive bodies pass through untouched.
        if function.attrs.primitive {
            return Ok(self.copy_verbatim(expr));
        }

        let function_domain = self.domains.domain_for(expr);
        let result_scope = self.domains.result_scope(function_domain);
        if result_scope.is_fully_unconstrained() {
            return Err(PlanError::UnresolvedDefault {
                site: expr_to_string(module, expr),
            });
        }

        let mut param_scopes = Vec::with_capacity(function.params.len());
        for index in 0..function.params.len() {
            let scope = match self.domains.param_domain(function_domain, index) {
                Some(param) => self.domains.result_scope(param),
                None => result_scope.clone(),
            };
            if scope.is_fully_unconstrained() {
                return Err(PlanError::UnresolvedDefault {
                    site: format!("%{}", module.var(function.params[index]).name),
                });
            }
            param_scopes.push(scope);
        }

        // The body may itself start with an annotation, so be prepared to
        // insert a copy.
        let body_scope = self.scope_of(function.body)?;
        let body =
            self.visit_child_scoped(&result_scope, &result_scope, &body_scope, function.body)?;

        Ok(self.out.expr(
            ExprKind::Function(Box::new(FunctionNode {
                params: function.params.clone(),
                body,
                attrs: FnAttrs {
                    primitive: false,
                    param_scopes: Some(param_scopes),
                    result_scope: Some(result_scope),
                },
            })),
            module.arena.ty(expr),
            module.arena.span(expr),
        ))
    }

    /// Iterate through chained lets that agree on their scope; a scope
    /// transition mid-spine is handled as an ordinary child boundary.
    fn visit_let_spine(&mut self, expr: ExprId) -> Result<ExprId, PlanError> {
        let module = self.domains.module();
        let let_scope = self.scope_of(expr)?;
        let mut bindings = Vec::new();
        let mut current = expr;
        while let ExprKind::Let(binding) = module.arena.kind(current) {
            if self.scope_of(current)? != let_scope {
                break;
            }
            // The bound value may live elsewhere; the wrap spells out the
            // difference so scopes stay lexically recoverable.
            let var_scope = self.var_scope(binding.var)?;
            let value_scope = self.scope_of(binding.value)?;
            let value =
                self.visit_child_scoped(&let_scope, &var_scope, &value_scope, binding.value)?;
            bindings.push((binding.var, value, module.arena.span(current)));
            current = binding.body;
        }
        let body_scope = self.scope_of(current)?;
        let mut body = self.visit_child_scoped(&let_scope, &let_scope, &body_scope, current)?;
        for (var, value, span) in bindings.into_iter().rev() {
            let ty = self.out.arena.ty(body);
            body = self
                .out
                .expr(ExprKind::Let(Box::new(LetNode { var, value, body })), ty, span);
        }
        Ok(body)
    }

    /// Visit a direct child expected on the same scope as its parent.
    fn visit_child(&mut self, parent: ExprId, child: ExprId) -> Result<ExprId, PlanError> {
        let expected = self.scope_of(parent)?;
        let child_scope = self.scope_of(child)?;
        self.visit_child_scoped(&expected, &expected, &child_scope, child)
    }

    /// Reconcile a child's scope with what its context expects and with the
    /// lexically enclosing scope.
    ///
    /// If `child_scope` differs from `expected`, wrap as
    /// `device_copy(on_device(child, scope=child_scope, fixed), src, dst)`.
    /// If `expected` differs from `lexical`, (also) wrap in a fixed
    /// `on_device`. Operator and constructor references are never wrapped.
    fn visit_child_scoped(
        &mut self,
        lexical: &Scope,
        expected: &Scope,
        child_scope: &Scope,
        child: ExprId,
    ) -> Result<ExprId, PlanError> {
        let module = self.domains.module();
        if matches!(
            module.arena.kind(child),
            ExprKind::Op(_) | ExprKind::Ctor(_)
        ) {
            return Ok(self.copy_node(child));
        }
        let mut result = self.visit(child)?;
        if child_scope != expected {
            tracing::debug!(src = %child_scope, dst = %expected, "inserting device copy");
            result = self.out.maybe_on_device(result, child_scope.clone(), true);
            result = self
                .out
                .device_copy(result, child_scope.clone(), expected.clone());
        }
        if expected != lexical {
            result = self.out.maybe_on_device(result, expected.clone(), true);
        }
        Ok(result)
    }

    /// Copy a leaf node into the output arena.
    fn copy_node(&mut self, expr: ExprId) -> ExprId {
        let module = self.domains.module();
        self.out.expr(
            module.arena.kind(expr).clone(),
            module.arena.ty(expr),
            module.arena.span(expr),
        )
    }

    /// Deep-copy a subtree unchanged (used for primitive functions).
    fn copy_verbatim(&mut self, expr: ExprId) -> ExprId {
        let module = self.domains.module();
        let kind = match module.arena.kind(expr) {
            kind @ (ExprKind::Var(_)
            | ExprKind::Global(_)
            | ExprKind::Constant(_)
            | ExprKind::Op(_)
            | ExprKind::Ctor(_)) => kind.clone(),
            ExprKind::Tuple(fields) => ExprKind::Tuple(
                fields
                    .clone()
                    .into_iter()
                    .map(|field| self.copy_verbatim(field))
                    .collect(),
            ),
            ExprKind::Project { tuple, index } => ExprKind::Project {
                tuple: self.copy_verbatim(*tuple),
                index: *index,
            },
            ExprKind::Function(function) => {
                let function = function.as_ref().clone();
                ExprKind::Function(Box::new(FunctionNode {
                    params: function.params,
                    body: self.copy_verbatim(function.body),
                    attrs: function.attrs,
                }))
            }
            ExprKind::Call(call) => {
                let call = call.as_ref().clone();
                ExprKind::Call(Box::new(CallNode {
                    callee: self.copy_verbatim(call.callee),
                    args: call
                        .args
                        .into_iter()
                        .map(|arg| self.copy_verbatim(arg))
                        .collect(),
                    attrs: call.attrs,
                }))
            }
            ExprKind::Let(binding) => {
                let binding = binding.as_ref().clone();
                ExprKind::Let(Box::new(LetNode {
                    var: binding.var,
                    value: self.copy_verbatim(binding.value),
                    body: self.copy_verbatim(binding.body),
                }))
            }
            ExprKind::If(branch) => {
                let branch = branch.as_ref().clone();
                ExprKind::If(Box::new(strata_ir::IfNode {
                    cond: self.copy_verbatim(branch.cond),
                    then_branch: self.copy_verbatim(branch.then_branch),
                    else_branch: self.copy_verbatim(branch.else_branch),
                }))
            }
            ExprKind::Match(matching) => {
                let matching = matching.as_ref().clone();
                ExprKind::Match(Box::new(MatchNode {
                    scrutinee: self.copy_verbatim(matching.scrutinee),
                    clauses: matching
                        .clauses
                        .into_iter()
                        .map(|clause| Clause {
                            pattern: clause.pattern,
                            body: self.copy_verbatim(clause.body),
                        })
                        .collect(),
                }))
            }
            ExprKind::RefNew(value) => ExprKind::RefNew(self.copy_verbatim(*value)),
            ExprKind::RefRead(reference) => ExprKind::RefRead(self.copy_verbatim(*reference)),
            ExprKind::RefWrite { reference, value } => ExprKind::RefWrite {
                reference: self.copy_verbatim(*reference),
                value: self.copy_verbatim(*value),
            },
        };
        self.out
            .expr(kind, module.arena.ty(expr), module.arena.span(expr))
    }
}
