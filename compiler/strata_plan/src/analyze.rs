//! Phase 1: constraint collection.
//!
//! Walks every top-level function and flows scope constraints from
//! `on_device` / `device_copy` calls (and the shape/allocation dialect) to
//! all other sub-expressions by unifying domains:
//!
//! - a call's callee domain must match the domain implied by its arguments
//!   and context;
//! - a function's domain must match its parameters and body (and any
//!   pre-existing scope attributes from an earlier planning run);
//! - a let binds its variable to its value and its own result to its body;
//! - tuples, projections, conditionals, matches and reference cells keep
//!   their operands on the expression's own scope, collapsing higher-order
//!   operands where a function value flows through first-order structure.
//!
//! Constraints can flow through lexically distant sites. In
//!
//! ```text
//! let %f = fn(%x, %y) { add(%x, on_device(%y, scope=d)) };
//! let %g = fn(%h, %z) { %h(%z, %z) };
//! %g(%f, %b)
//! ```
//!
//! the call `%g(%f, %b)` unifies `%f`'s higher-order domain into `%h`, so
//! `%b` is discovered to be on scope `d`.
//!
//! Domains may still be free afterwards; Phase 2 defaults them.

use strata_device::{CompilationConfig, Scope};
use strata_ir::{ExprId, ExprKind, Module};

use crate::domain::DeviceDomains;
use crate::error::PlanError;

/// Collect the system of scope constraints for every sub-expression.
#[tracing::instrument(level = "debug", skip_all, fields(functions = module.functions().len()))]
pub(crate) fn analyze<'m>(
    module: &'m Module,
    config: &'m CompilationConfig,
) -> Result<DeviceDomains<'m>, PlanError> {
    let mut analyzer = DeviceAnalyzer {
        domains: DeviceDomains::new(module, config),
    };
    for &(global, function) in module.functions() {
        tracing::debug!(name = %module.global(global).name, "collecting constraints");
        let global_domain = analyzer.domains.domain_for_global(global);
        let function_domain = analyzer.domains.domain_for(function);
        analyzer
            .domains
            .unify_at(function, global_domain, function_domain)?;
        analyzer.visit(function)?;
    }
    Ok(analyzer.domains)
}

struct DeviceAnalyzer<'m> {
    domains: DeviceDomains<'m>,
}

impl<'m> DeviceAnalyzer<'m> {
    fn visit(&mut self, expr: ExprId) -> Result<(), PlanError> {
        let module = self.domains.module();
        match module.arena.kind(expr) {
            // Operators and constructors are handled at their call sites.
            ExprKind::Op(_) | ExprKind::Ctor(_) => Ok(()),

            // Merely materialize the domain.
            ExprKind::Var(_) | ExprKind::Global(_) | ExprKind::Constant(_) => {
                self.domains.domain_for(expr);
                Ok(())
            }

            ExprKind::Call(call) => {
                self.visit(call.callee)?;
                let callee_domain = self.domains.domain_for_callee(expr)?;

                // The domain implied by the arguments and the call context.
                let mut children = Vec::with_capacity(call.args.len() + 1);
                for &arg in &call.args {
                    children.push(self.domains.domain_for(arg));
                }
                children.push(self.domains.domain_for(expr));
                let implied_domain = self.domains.make_higher_order(children);

                self.domains.unify_at(expr, callee_domain, implied_domain)?;
                tracing::trace!(
                    domain = %self.domains.render(callee_domain),
                    "constrained call site"
                );

                for &arg in &call.args {
                    self.visit(arg)?;
                }
                Ok(())
            }

            ExprKind::Function(function) => {
                // Fused primitive bodies are compiled per call site; pinning
                // their parameters here would wrongly fix them to one scope.
                if function.attrs.primitive {
                    return Ok(());
                }
                let function_domain = self.domains.domain_for(expr);

                // Parameters and body must line up with the function's own
                // higher-order domain.
                let mut children = Vec::with_capacity(function.params.len() + 1);
                for &param in &function.params {
                    children.push(self.domains.domain_for_var(param));
                }
                children.push(self.domains.domain_for(function.body));
                let implied_domain = self.domains.make_higher_order(children);
                self.domains.unify_at(expr, function_domain, implied_domain)?;

                // Respect scope attributes from an earlier planning run.
                if let Some(result_scope) = &function.attrs.result_scope {
                    if !result_scope.is_fully_unconstrained() {
                        let mut children = Vec::with_capacity(function.params.len() + 1);
                        for (index, &param) in function.params.iter().enumerate() {
                            let scope = function
                                .attrs
                                .param_scopes
                                .as_ref()
                                .and_then(|scopes| scopes.get(index))
                                .cloned()
                                .unwrap_or_else(Scope::unconstrained);
                            children
                                .push(self.domains.for_scope(module.var(param).ty, &scope));
                        }
                        children.push(
                            self.domains
                                .for_scope(module.arena.ty(function.body), result_scope),
                        );
                        let attribute_domain = self.domains.make_higher_order(children);
                        self.domains
                            .unify_at(expr, function_domain, attribute_domain)?;
                    }
                }

                self.visit(function.body)
            }

            ExprKind::Let(_) => self.visit_let_spine(expr),

            ExprKind::Tuple(fields) => {
                // Every field lives where the tuple lives; functions stored
                // in tuples collapse to the tuple's scope.
                let tuple_domain = self.domains.domain_for(expr);
                for &field in fields {
                    let field_domain = self.domains.domain_for(field);
                    self.domains.unify_at(expr, tuple_domain, field_domain)?;
                }
                for &field in fields {
                    self.visit(field)?;
                }
                Ok(())
            }

            ExprKind::Project { tuple, .. } => {
                let projection_domain = self.domains.domain_for(expr);
                let tuple_domain = self.domains.domain_for(*tuple);
                self.domains.unify_at(expr, tuple_domain, projection_domain)?;
                self.visit(*tuple)
            }

            ExprKind::If(branch) => {
                let if_domain = self.domains.domain_for(expr);
                let cond_domain = self.domains.domain_for(branch.cond);
                self.domains.unify_at(expr, cond_domain, if_domain)?;
                let then_domain = self.domains.domain_for(branch.then_branch);
                self.domains.unify_at(expr, then_domain, if_domain)?;
                let else_domain = self.domains.domain_for(branch.else_branch);
                self.domains.unify_at(expr, else_domain, if_domain)?;
                self.visit(branch.cond)?;
                self.visit(branch.then_branch)?;
                self.visit(branch.else_branch)
            }

            ExprKind::Match(matching) => {
                let match_domain = self.domains.domain_for(expr);
                let scrutinee_domain = self.domains.domain_for(matching.scrutinee);
                self.domains.unify_at(expr, scrutinee_domain, match_domain)?;
                for clause in &matching.clauses {
                    // Pattern variables bind pieces of the matched value and
                    // live on its scope; no per-field tracking.
                    let mut pattern_vars = Vec::new();
                    clause.pattern.for_each_var(&mut |var| pattern_vars.push(var));
                    for var in pattern_vars {
                        let var_domain = self.domains.domain_for_var(var);
                        self.domains.unify_at(expr, scrutinee_domain, var_domain)?;
                    }
                    let body_domain = self.domains.domain_for(clause.body);
                    self.domains.unify_at(expr, match_domain, body_domain)?;
                    self.visit(clause.body)?;
                }
                self.visit(matching.scrutinee)
            }

            ExprKind::RefNew(value) => {
                let value_domain = self.domains.domain_for(*value);
                let ref_domain = self.domains.domain_for(expr);
                self.domains.unify_at(expr, ref_domain, value_domain)?;
                self.visit(*value)
            }

            ExprKind::RefRead(reference) => {
                let read_domain = self.domains.domain_for(expr);
                let ref_domain = self.domains.domain_for(*reference);
                self.domains.unify_at(expr, ref_domain, read_domain)?;
                self.visit(*reference)
            }

            ExprKind::RefWrite { reference, value } => {
                let value_domain = self.domains.domain_for(*value);
                let ref_domain = self.domains.domain_for(*reference);
                self.domains.unify_at(expr, ref_domain, value_domain)?;
                let write_domain = self.domains.domain_for(expr);
                self.domains.unify_at(expr, write_domain, value_domain)?;
                self.visit(*reference)?;
                self.visit(*value)
            }
        }
    }

    /// Iterate over chained lets; chains can be thousands deep.
    fn visit_let_spine(&mut self, expr: ExprId) -> Result<(), PlanError> {
        let module = self.domains.module();
        let mut current = expr;
        while let ExprKind::Let(binding) = module.arena.kind(current) {
            // The variable holds the value; the let's result is its body's.
            let var_domain = self.domains.domain_for_var(binding.var);
            let value_domain = self.domains.domain_for(binding.value);
            self.domains.unify_at(current, var_domain, value_domain)?;
            let let_domain = self.domains.domain_for(current);
            let body_domain = self.domains.domain_for(binding.body);
            self.domains.unify_at(current, let_domain, body_domain)?;
            self.visit(binding.value)?;
            current = binding.body;
        }
        self.visit(current)
    }
}
