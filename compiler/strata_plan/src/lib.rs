//! Device planning for the Strata compiler.
//!
//! Determines a unique [`Scope`](strata_device::Scope) to hold the result of
//! every sub-expression in a module. We say an expression is "on scope S" if
//! the value it evaluates to is stored on S; for primitive calls the scope a
//! result is stored on is also where the primitive executes.
//!
//! The input module is expected to contain some `on_device` annotations
//! and/or `device_copy` calls (see `strata_ir::dialect`):
//! - `device_copy` constrains its argument to the source scope and its
//!   context to the destination scope;
//! - `on_device` constrains its argument, and — when `is_fixed`, or at the
//!   tail of a function, or immediately let-bound — its own result too.
//!
//! # Pipeline
//!
//! ```text
//! module → [0 normalize] → [1 analyze] → [2 default] → [3 capture] → module
//! ```
//!
//! - **Phase 0** (`normalize`): tightens annotations at binding and tail
//!   positions and pushes them through tuple projections.
//! - **Phase 1** (`analyze`): flows constraints from annotations, copies,
//!   shape/allocation operators and pre-existing function attributes to
//!   every sub-expression, by union-find unification over first-order and
//!   higher-order scope domains. Primitives and data constructors are scope
//!   polymorphic (fresh domain per call site); user functions are not.
//! - **Phase 2** (`default`): fixes any still-free domain, falling function
//!   results back to the configured default scope, parameters back to their
//!   function's result, and let-bound variables back to their let.
//! - **Phase 3** (`capture`): reifies the solution — drops consumed
//!   annotations and no-op copies, inserts `device_copy` calls at every
//!   cross-scope boundary, attaches `param_scopes`/`result_scope` attributes
//!   to every non-primitive function, and re-annotates expressions whose
//!   scope differs from their lexical context.
//!
//! The output obeys a purely lexical contract: downstream passes recover the
//! scope of any sub-expression from the nearest enclosing `on_device` or
//! function attribute. Running the pass on its own output reproduces it
//! (up to node identity).
//!
//! Failures are fatal and leave no partial module: conflicting constraints
//! ([`PlanError::UnificationConflict`]), malformed higher-order shapes
//! ([`PlanError::ArityMismatch`]), or a missing default
//! ([`PlanError::UnresolvedDefault`]).

mod analyze;
mod capture;
mod default;
mod domain;
mod error;
mod normalize;

pub use error::PlanError;

use strata_device::CompilationConfig;
use strata_ir::Module;

/// Assign a scope to every sub-expression of `module` and make the
/// assignment explicit in the IR.
#[tracing::instrument(level = "debug", skip_all)]
pub fn plan_devices(
    mut module: Module,
    config: &CompilationConfig,
) -> Result<Module, PlanError> {
    normalize::normalize(&mut module);
    let domains = analyze::analyze(&module, config)?;
    let domains = default::default_scopes(domains)?;
    capture::capture(domains)
}

#[cfg(test)]
mod tests;
