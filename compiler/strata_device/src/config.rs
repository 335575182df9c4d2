//! Caller-supplied compilation configuration.

use crate::scope::{DeviceKind, Scope, Target, TargetId};

/// The configuration the device planner runs against.
///
/// Read-only for the lifetime of a pass invocation and freely shareable
/// between passes. Holds the registered targets, the default scope for
/// otherwise-unconstrained primitive computations, and the host scope that
/// shapes and allocator metadata must live on.
#[derive(Clone, Debug)]
pub struct CompilationConfig {
    targets: Vec<Target>,
    default_primitive_scope: Scope,
    host_scope: Scope,
}

impl CompilationConfig {
    /// Build a configuration from targets and the two distinguished scopes.
    ///
    /// Both scopes are canonicalized against the target list before being
    /// stored, so callers may supply partial scopes (e.g. just a device kind).
    pub fn new(targets: Vec<Target>, default_primitive_scope: Scope, host_scope: Scope) -> Self {
        let mut config = CompilationConfig {
            targets,
            default_primitive_scope: Scope::unconstrained(),
            host_scope: Scope::unconstrained(),
        };
        config.default_primitive_scope = config.canonical(&default_primitive_scope);
        config.host_scope = config.canonical(&host_scope);
        config
    }

    /// A single-target CPU-only configuration, mostly for tests and examples.
    pub fn homogeneous(target: Target) -> Self {
        let kind = target.kind;
        CompilationConfig::new(
            vec![target],
            Scope::for_device(kind),
            Scope::for_device(kind),
        )
    }

    /// The fallback scope for unconstrained primitive computations.
    pub fn default_primitive_scope(&self) -> &Scope {
        &self.default_primitive_scope
    }

    /// The scope holding shapes and allocator metadata.
    pub fn host_scope(&self) -> &Scope {
        &self.host_scope
    }

    /// The registered targets, indexable by [`TargetId`].
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target(&self, id: TargetId) -> &Target {
        &self.targets[id.raw() as usize]
    }

    /// Whether only a single target is present.
    pub fn is_homogeneous(&self) -> bool {
        self.targets.len() <= 1
    }

    /// The first registered target for a device kind, if any.
    pub fn target_for_device(&self, kind: DeviceKind) -> Option<TargetId> {
        self.targets
            .iter()
            .position(|target| target.kind == kind)
            .map(|index| TargetId::from_raw(index as u32))
    }

    /// Promote a partially specified scope to its unique representative.
    ///
    /// - The fully unconstrained scope is its own representative.
    /// - A scope with a target but no device kind takes the target's kind.
    /// - A scope with a device kind defaults the virtual device index to 0 and
    ///   attaches the registered target for that kind, if one exists.
    ///
    /// Canonicalization is applied to every scope entering the planner's
    /// constraint lattice, so scope equality there is plain value equality.
    pub fn canonical(&self, scope: &Scope) -> Scope {
        if scope.is_fully_unconstrained() {
            return scope.clone();
        }
        let mut scope = scope.clone();
        if scope.device.is_none() {
            if let Some(target) = scope.target {
                scope.device = Some(self.target(target).kind);
            }
        }
        if let Some(kind) = scope.device {
            if scope.virtual_id.is_none() {
                scope.virtual_id = Some(0);
            }
            if scope.target.is_none() {
                scope.target = self.target_for_device(kind);
            }
        }
        scope
    }
}
