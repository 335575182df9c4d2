//! Device domains: the constraint lattice the planner solves over.
//!
//! Every expression is assigned a *domain*:
//!
//! ```text
//!   D ::= <scope>        -- first-order
//!       | fn(D,...,D):D  -- higher-order
//! ```
//!
//! First-order domains hold a (possibly still unconstrained) [`Scope`].
//! Higher-order domains give functions-as-values a scope for each parameter
//! and for the result, nested to arbitrary depth. The "scope of a function"
//! is defined to be the scope of its (transitive) result, so closures never
//! need a storage location of their own.
//!
//! # Design
//!
//! Domains live in an arena and are referenced by [`DomainId`]. Each entry is
//! a union-find node: `Link` edges point at a representative, and `find`
//! applies path compression, giving O(α(n)) amortized unification. Unifying
//! two first-order domains joins their scopes component-wise; unifying two
//! higher-order domains of equal arity unifies pointwise; unifying mixed
//! orders *collapses* the higher-order side, forcing every leaf to the
//! first-order scope (a function stored in a tuple, ref, or ADT lives
//! entirely wherever that value lives).
//!
//! Every scope entering the lattice is canonicalized against the
//! [`CompilationConfig`] first, so scope equality in here is value equality.

use rustc_hash::FxHashMap;

use strata_device::{CompilationConfig, Scope};
use strata_ir::{
    expr_to_string, CallAttrs, DialectOp, ExprId, ExprKind, GlobalId, Module, TypeId, TypeKind,
    VarId,
};

use crate::error::{DomainConflict, PlanError};

/// Index of a domain in the pass's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct DomainId(u32);

impl DomainId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
enum DomainEntry {
    /// Union-find edge to a representative.
    Link(DomainId),
    FirstOrder(Scope),
    /// Parameter domains followed by the result domain.
    HigherOrder(Vec<DomainId>),
}

/// The expression-to-domain map for one pass invocation.
///
/// Owned mutably by the planner from analysis through capture and discarded
/// at pass exit. Keyed by node identity; all use sites of a variable or
/// global share one domain.
#[derive(Debug)]
pub(crate) struct DeviceDomains<'m> {
    module: &'m Module,
    config: &'m CompilationConfig,
    entries: Vec<DomainEntry>,
    expr_domains: FxHashMap<ExprId, DomainId>,
    var_domains: FxHashMap<VarId, DomainId>,
    global_domains: FxHashMap<GlobalId, DomainId>,
    /// Memoized callee domains, so the fresh polymorphic instance made for a
    /// primitive/constructor call site is the same one on every query.
    callee_domains: FxHashMap<ExprId, DomainId>,
    /// Shared first-order domain pinned to the host scope.
    host_domain: DomainId,
}

impl<'m> DeviceDomains<'m> {
    pub(crate) fn new(module: &'m Module, config: &'m CompilationConfig) -> Self {
        let host_scope = config.canonical(config.host_scope());
        let mut domains = DeviceDomains {
            module,
            config,
            entries: Vec::with_capacity(64),
            expr_domains: FxHashMap::default(),
            var_domains: FxHashMap::default(),
            global_domains: FxHashMap::default(),
            callee_domains: FxHashMap::default(),
            host_domain: DomainId(0),
        };
        domains.host_domain = domains.push(DomainEntry::FirstOrder(host_scope));
        domains
    }

    pub(crate) fn module(&self) -> &'m Module {
        self.module
    }

    pub(crate) fn config(&self) -> &'m CompilationConfig {
        self.config
    }

    fn push(&mut self, entry: DomainEntry) -> DomainId {
        let id = DomainId(u32::try_from(self.entries.len()).expect("domain arena overflow"));
        self.entries.push(entry);
        id
    }

    // ========================================
    // Construction
    // ========================================

    /// A fresh, fully free domain shaped like `ty`.
    pub(crate) fn free_for_type(&mut self, ty: Option<TypeId>) -> DomainId {
        self.shaped(ty, &Scope::unconstrained())
    }

    /// A domain shaped like `ty` whose every leaf holds `scope`
    /// (canonicalized). Used to reflect annotations and function attributes.
    pub(crate) fn for_scope(&mut self, ty: Option<TypeId>, scope: &Scope) -> DomainId {
        let canonical = self.config.canonical(scope);
        self.shaped(ty, &canonical)
    }

    fn shaped(&mut self, ty: Option<TypeId>, leaf: &Scope) -> DomainId {
        let module = self.module;
        if let Some(ty) = ty {
            if let TypeKind::Fn { params, result } = module.types.kind(ty) {
                let mut children = Vec::with_capacity(params.len() + 1);
                for &param in params {
                    children.push(self.shaped(Some(param), leaf));
                }
                children.push(self.shaped(Some(*result), leaf));
                return self.push(DomainEntry::HigherOrder(children));
            }
        }
        self.push(DomainEntry::FirstOrder(leaf.clone()))
    }

    /// A higher-order domain over already-existing children (params then
    /// result).
    pub(crate) fn make_higher_order(&mut self, children: Vec<DomainId>) -> DomainId {
        debug_assert!(!children.is_empty(), "higher-order domain needs a result");
        self.push(DomainEntry::HigherOrder(children))
    }

    // ========================================
    // Union-find
    // ========================================

    /// Canonical representative, with path compression.
    fn find(&mut self, start: DomainId) -> DomainId {
        let mut root = start;
        while let DomainEntry::Link(next) = self.entries[root.index()] {
            root = next;
        }
        let mut current = start;
        while let DomainEntry::Link(next) = self.entries[current.index()] {
            self.entries[current.index()] = DomainEntry::Link(root);
            current = next;
        }
        root
    }

    /// Unify two domains into one equivalence class.
    ///
    /// first+first joins scopes, higher+higher unifies pointwise (equal arity
    /// required), mixed orders collapse the higher-order side onto the
    /// first-order scope. Failures leave the lattice partially merged, which
    /// is fine: every failure is fatal to the pass.
    pub(crate) fn unify(
        &mut self,
        lhs: DomainId,
        rhs: DomainId,
    ) -> Result<DomainId, DomainConflict> {
        let lhs = self.find(lhs);
        let rhs = self.find(rhs);
        if lhs == rhs {
            return Ok(lhs);
        }
        let lhs_entry = self.entries[lhs.index()].clone();
        let rhs_entry = self.entries[rhs.index()].clone();
        match (lhs_entry, rhs_entry) {
            (DomainEntry::Link(_), _) | (_, DomainEntry::Link(_)) => {
                unreachable!("find returned a link")
            }
            (DomainEntry::FirstOrder(lhs_scope), DomainEntry::FirstOrder(rhs_scope)) => {
                let joined = lhs_scope.join(&rhs_scope).ok_or(DomainConflict::Scope {
                    lhs: lhs_scope,
                    rhs: rhs_scope,
                })?;
                self.entries[lhs.index()] = DomainEntry::FirstOrder(joined);
                self.entries[rhs.index()] = DomainEntry::Link(lhs);
                Ok(lhs)
            }
            (DomainEntry::HigherOrder(lhs_children), DomainEntry::HigherOrder(rhs_children)) => {
                if lhs_children.len() != rhs_children.len() {
                    return Err(DomainConflict::Arity {
                        lhs: lhs_children.len() - 1,
                        rhs: rhs_children.len() - 1,
                    });
                }
                self.entries[rhs.index()] = DomainEntry::Link(lhs);
                for (&a, &b) in lhs_children.iter().zip(&rhs_children) {
                    self.unify(a, b)?;
                }
                Ok(lhs)
            }
            (DomainEntry::FirstOrder(_), DomainEntry::HigherOrder(children)) => {
                self.collapse(lhs, rhs, children)
            }
            (DomainEntry::HigherOrder(children), DomainEntry::FirstOrder(_)) => {
                self.collapse(rhs, lhs, children)
            }
        }
    }

    /// Force every leaf of a higher-order class onto a first-order scope.
    fn collapse(
        &mut self,
        first_order: DomainId,
        higher_order: DomainId,
        children: Vec<DomainId>,
    ) -> Result<DomainId, DomainConflict> {
        self.entries[higher_order.index()] = DomainEntry::Link(first_order);
        for child in children {
            self.unify(first_order, child)?;
        }
        Ok(self.find(first_order))
    }

    // ========================================
    // Expression-level API
    // ========================================

    /// The domain for an expression; created lazily, shaped by the
    /// expression's checked type. Variables and globals share one domain
    /// across all their occurrences.
    pub(crate) fn domain_for(&mut self, expr: ExprId) -> DomainId {
        let module = self.module;
        match module.arena.kind(expr) {
            ExprKind::Var(var) => self.domain_for_var(*var),
            ExprKind::Global(global) => self.domain_for_global(*global),
            _ => {
                if let Some(&existing) = self.expr_domains.get(&expr) {
                    return self.find(existing);
                }
                let domain = self.free_for_type(module.arena.ty(expr));
                self.expr_domains.insert(expr, domain);
                domain
            }
        }
    }

    pub(crate) fn domain_for_var(&mut self, var: VarId) -> DomainId {
        if let Some(&existing) = self.var_domains.get(&var) {
            return self.find(existing);
        }
        let ty = self.module.var(var).ty;
        let domain = self.free_for_type(ty);
        self.var_domains.insert(var, domain);
        domain
    }

    pub(crate) fn domain_for_global(&mut self, global: GlobalId) -> DomainId {
        if let Some(&existing) = self.global_domains.get(&global) {
            return self.find(existing);
        }
        let module = self.module;
        let ty = module
            .functions()
            .iter()
            .find(|&&(defined, _)| defined == global)
            .and_then(|&(_, function)| module.arena.ty(function));
        let domain = self.free_for_type(ty);
        self.global_domains.insert(global, domain);
        domain
    }

    /// The higher-order domain of a call's callee.
    ///
    /// Primitive operators and data constructors are scope-polymorphic: each
    /// call site gets its own fresh instance (memoized, so repeated queries
    /// agree). The device dialect gets its documented signatures; every other
    /// callee is monomorphic and shares its regular domain.
    pub(crate) fn domain_for_callee(&mut self, call: ExprId) -> Result<DomainId, PlanError> {
        if let Some(&existing) = self.callee_domains.get(&call) {
            return Ok(self.find(existing));
        }
        let module = self.module;
        let ExprKind::Call(node) = module.arena.kind(call) else {
            unreachable!("domain_for_callee on a non-call expression")
        };
        let domain = match module.arena.kind(node.callee) {
            ExprKind::Op(_) => {
                let dialect = module.callee_dialect(node.callee);
                self.dialect_callee_domain(call, dialect)?
            }
            ExprKind::Ctor(_) => self.fresh_callee_domain(call),
            _ => return Ok(self.domain_for(node.callee)),
        };
        self.callee_domains.insert(call, domain);
        Ok(domain)
    }

    /// A fresh free higher-order domain for a primitive/constructor call:
    /// `fn(?x?, ..., ?x?): ?x?` with a single shared free domain, since a
    /// primitive executes where its result lives and all its operands must
    /// be there with it.
    fn fresh_callee_domain(&mut self, call: ExprId) -> DomainId {
        let module = self.module;
        let ExprKind::Call(node) = module.arena.kind(call) else {
            unreachable!("fresh_callee_domain on a non-call expression")
        };
        let shared = self.free_for_type(module.arena.ty(call));
        let children = vec![shared; node.args.len() + 1];
        self.make_higher_order(children)
    }

    fn dialect_callee_domain(
        &mut self,
        call: ExprId,
        dialect: Option<DialectOp>,
    ) -> Result<DomainId, PlanError> {
        let module = self.module;
        let ExprKind::Call(node) = module.arena.kind(call) else {
            unreachable!("dialect_callee_domain on a non-call expression")
        };
        let domain = match dialect {
            Some(DialectOp::OnDevice) => {
                let Some(props) = module.on_device_props(call) else {
                    return Ok(self.fresh_callee_domain(call));
                };
                // The argument is constrained to the annotation's scope; the
                // result is too once the annotation is fixed.
                let arg = self.for_scope(module.arena.ty(props.body), &props.scope);
                let result = if props.is_fixed {
                    arg
                } else {
                    self.free_for_type(module.arena.ty(call))
                };
                self.make_higher_order(vec![arg, result])
            }
            Some(DialectOp::DeviceCopy) => {
                let Some(props) = module.device_copy_props(call) else {
                    return Ok(self.fresh_callee_domain(call));
                };
                let arg = self.for_scope(module.arena.ty(props.body), &props.src);
                let result = self.for_scope(module.arena.ty(call), &props.dst);
                self.make_higher_order(vec![arg, result])
            }
            Some(DialectOp::ShapeOf) => {
                // The tensor may live anywhere; its shape lives on the host.
                self.expect_arity(call, 1)?;
                let arg = self.free_for_type(module.arena.ty(node.args[0]));
                self.make_higher_order(vec![arg, self.host_domain])
            }
            Some(DialectOp::ReshapeTensor) => {
                // Data anywhere, new shape on the host, result shares the
                // data's storage.
                self.expect_arity(call, 2)?;
                let data = self.free_for_type(module.arena.ty(node.args[0]));
                self.make_higher_order(vec![data, self.host_domain, data])
            }
            Some(DialectOp::ShapeFunc) => {
                self.expect_arity(call, 3)?;
                let func = self.free_for_type(module.arena.ty(node.args[0]));
                let host = self.host_domain;
                self.make_higher_order(vec![func, host, host, host])
            }
            Some(DialectOp::AllocStorage) => {
                // Size and alignment are host metadata; the storage itself
                // lands on the scope named by the attributes.
                self.expect_arity(call, 2)?;
                let result = match &node.attrs {
                    CallAttrs::AllocStorage { scope } => {
                        self.for_scope(module.arena.ty(call), scope)
                    }
                    _ => self.free_for_type(module.arena.ty(call)),
                };
                let host = self.host_domain;
                self.make_higher_order(vec![host, host, result])
            }
            Some(DialectOp::AllocTensor) => {
                self.expect_arity(call, 2)?;
                let storage = self.free_for_type(module.arena.ty(node.args[0]));
                let host = self.host_domain;
                let result = self.free_for_type(module.arena.ty(call));
                self.make_higher_order(vec![storage, host, result])
            }
            None => self.fresh_callee_domain(call),
        };
        Ok(domain)
    }

    fn expect_arity(&self, call: ExprId, expected: usize) -> Result<(), PlanError> {
        let module = self.module;
        let ExprKind::Call(node) = module.arena.kind(call) else {
            unreachable!("expect_arity on a non-call expression")
        };
        if node.args.len() == expected {
            Ok(())
        } else {
            Err(PlanError::ArityMismatch {
                site: expr_to_string(module, call),
                lhs: expected,
                rhs: node.args.len(),
            })
        }
    }

    /// Unify two domains, reporting conflicts at `site`. Covers both the
    /// exact and the collapsing flavour: mixed orders collapse by
    /// construction of [`Self::unify`].
    pub(crate) fn unify_at(
        &mut self,
        site: ExprId,
        lhs: DomainId,
        rhs: DomainId,
    ) -> Result<(), PlanError> {
        self.unify(lhs, rhs)
            .map(drop)
            .map_err(|conflict| conflict.at(expr_to_string(self.module, site)))
    }

    // ========================================
    // Queries
    // ========================================

    /// Follow result edges until first-order and return that scope.
    pub(crate) fn result_scope(&mut self, domain: DomainId) -> Scope {
        let mut current = self.find(domain);
        loop {
            match &self.entries[current.index()] {
                DomainEntry::FirstOrder(scope) => return scope.clone(),
                DomainEntry::HigherOrder(children) => {
                    let result = *children.last().expect("higher-order domain has a result");
                    current = self.find(result);
                }
                DomainEntry::Link(_) => unreachable!("find returned a link"),
            }
        }
    }

    /// The `index`th parameter domain, or `None` if the domain collapsed to
    /// first-order.
    pub(crate) fn param_domain(&mut self, domain: DomainId, index: usize) -> Option<DomainId> {
        let domain = self.find(domain);
        match &self.entries[domain.index()] {
            DomainEntry::HigherOrder(children) if index + 1 < children.len() => {
                Some(children[index])
            }
            _ => None,
        }
    }

    /// True iff no leaf in the subtree is fully unconstrained.
    pub(crate) fn is_fully_constrained(&mut self, domain: DomainId) -> bool {
        let domain = self.find(domain);
        match self.entries[domain.index()].clone() {
            DomainEntry::FirstOrder(scope) => !scope.is_fully_unconstrained(),
            DomainEntry::HigherOrder(children) => children
                .into_iter()
                .all(|child| self.is_fully_constrained(child)),
            DomainEntry::Link(_) => unreachable!("find returned a link"),
        }
    }

    // ========================================
    // Defaulting
    // ========================================

    /// Fix every still-unconstrained leaf in the subtree to `default`.
    /// Partially constrained leaves are left alone; canonicalization
    /// completes them at readout.
    pub(crate) fn set_default(&mut self, domain: DomainId, default: &Scope) {
        let domain = self.find(domain);
        match self.entries[domain.index()].clone() {
            DomainEntry::FirstOrder(scope) => {
                if scope.is_fully_unconstrained() {
                    self.entries[domain.index()] = DomainEntry::FirstOrder(default.clone());
                }
            }
            DomainEntry::HigherOrder(children) => {
                for child in children {
                    self.set_default(child, default);
                }
            }
            DomainEntry::Link(_) => unreachable!("find returned a link"),
        }
    }

    /// Fix the result subtree to `default` first, then fall each parameter
    /// back to the just-determined result scope, recursing into higher-order
    /// parameters the same way.
    pub(crate) fn set_result_default_then_params(&mut self, domain: DomainId, default: &Scope) {
        let domain = self.find(domain);
        match self.entries[domain.index()].clone() {
            DomainEntry::FirstOrder(_) => self.set_default(domain, default),
            DomainEntry::HigherOrder(children) => {
                let result = *children.last().expect("higher-order domain has a result");
                self.set_default(result, default);
                let result_scope = self.result_scope(domain);
                for &param in &children[..children.len() - 1] {
                    self.set_result_default_then_params(param, &result_scope);
                }
            }
            DomainEntry::Link(_) => unreachable!("find returned a link"),
        }
    }

    // ========================================
    // Rendering
    // ========================================

    /// Human-readable form, e.g. `fn((cuda, 0), (cuda, 0)): (cpu, 0)`.
    pub(crate) fn render(&mut self, domain: DomainId) -> String {
        let domain = self.find(domain);
        match self.entries[domain.index()].clone() {
            DomainEntry::FirstOrder(scope) => scope.to_string(),
            DomainEntry::HigherOrder(children) => {
                let mut out = String::from("fn(");
                for (i, &param) in children[..children.len() - 1].iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.render(param));
                }
                out.push_str("): ");
                let result = *children.last().expect("higher-order domain has a result");
                out.push_str(&self.render(result));
                out
            }
            DomainEntry::Link(_) => unreachable!("find returned a link"),
        }
    }
}
