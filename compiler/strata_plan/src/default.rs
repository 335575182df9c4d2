//! Phase 2: defaulting.
//!
//! After constraint collection some domains may still be free. This phase
//! fixes them, walking functions in module order and expressions in
//! traversal order:
//!
//! - an unconstrained function result falls back to the configured default
//!   primitive scope, and unconstrained parameters then follow the result;
//! - the callee domain of every call is defaulted the same way, which covers
//!   primitive call sites whose results were left free;
//! - an unconstrained let-bound variable falls back to the scope of the
//!   enclosing let.
//!
//! After this phase every domain leaf holds a concrete scope; a leaf that
//! cannot be fixed because no default is configured is a fatal
//! [`PlanError::UnresolvedDefault`].

use strata_device::Scope;
use strata_ir::{expr_to_string, ExprId, ExprKind};

use crate::domain::DeviceDomains;
use crate::error::PlanError;

/// Fix every still-free domain.
#[tracing::instrument(level = "debug", skip_all)]
pub(crate) fn default_scopes<'m>(
    domains: DeviceDomains<'m>,
) -> Result<DeviceDomains<'m>, PlanError> {
    let module = domains.module();
    let default = domains.config().default_primitive_scope().clone();
    tracing::debug!(%default, "defaulting unconstrained scopes");
    let mut defaulter = DeviceDefaulter { domains, default };
    for &(global, function) in module.functions() {
        tracing::debug!(name = %module.global(global).name, "defaulting function");
        defaulter.walk(function)?;
    }
    Ok(defaulter.domains)
}

struct DeviceDefaulter<'m> {
    domains: DeviceDomains<'m>,
    /// The configured default, canonicalized (and possibly unconstrained,
    /// in which case any attempt to use it is an error).
    default: Scope,
}

impl<'m> DeviceDefaulter<'m> {
    fn walk(&mut self, expr: ExprId) -> Result<(), PlanError> {
        let module = self.domains.module();
        match module.arena.kind(expr) {
            ExprKind::Function(function) => {
                if function.attrs.primitive {
                    return Ok(());
                }
                let function_domain = self.domains.domain_for(expr);
                if !self.domains.is_fully_constrained(function_domain) {
                    self.require_default(expr)?;
                    tracing::debug!(
                        before = %self.domains.render(function_domain),
                        "defaulting function domain"
                    );
                    let default = self.default.clone();
                    self.domains
                        .set_result_default_then_params(function_domain, &default);
                }
                self.walk(function.body)
            }

            ExprKind::Call(call) => {
                // Identical to the function case for calls to local
                // functions, but also forces the free result scopes of
                // primitive call sites.
                let callee_domain = self.domains.domain_for_callee(expr)?;
                if !self.domains.is_fully_constrained(callee_domain) {
                    self.require_default(expr)?;
                    tracing::debug!(
                        before = %self.domains.render(callee_domain),
                        "defaulting callee domain"
                    );
                    let default = self.default.clone();
                    self.domains
                        .set_result_default_then_params(callee_domain, &default);
                }
                self.walk(call.callee)?;
                for &arg in &call.args {
                    self.walk(arg)?;
                }
                Ok(())
            }

            ExprKind::Let(_) => self.walk_let_spine(expr),

            kind => {
                let mut children = Vec::new();
                kind.for_each_child(|child| children.push(child));
                for child in children {
                    self.walk(child)?;
                }
                Ok(())
            }
        }
    }

    /// Iterate over chained lets; chains can be thousands deep.
    fn walk_let_spine(&mut self, expr: ExprId) -> Result<(), PlanError> {
        let module = self.domains.module();
        let mut current = expr;
        while let ExprKind::Let(binding) = module.arena.kind(current) {
            let let_domain = self.domains.domain_for(current);
            let let_scope = self.domains.result_scope(let_domain);
            if let_scope.is_fully_unconstrained() {
                return Err(PlanError::UnresolvedDefault {
                    site: expr_to_string(module, current),
                });
            }
            // A free let-bound variable follows the overall let.
            let var_domain = self.domains.domain_for_var(binding.var);
            if !self.domains.is_fully_constrained(var_domain) {
                tracing::debug!(
                    var = %module.var(binding.var).name,
                    scope = %let_scope,
                    "defaulting let-bound variable"
                );
                self.domains.set_default(var_domain, &let_scope);
            }
            self.walk(binding.value)?;
            current = binding.body;
        }
        self.walk(current)
    }

    fn require_default(&self, site: ExprId) -> Result<(), PlanError> {
        if self.default.is_fully_unconstrained() {
            return Err(PlanError::UnresolvedDefault {
                site: expr_to_string(self.domains.module(), site),
            });
        }
        Ok(())
    }
}
