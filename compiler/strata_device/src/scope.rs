//! Scopes: where a value lives and where the code producing it runs.

use std::fmt;

/// The kind of device a scope refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Vulkan,
    Metal,
}

impl DeviceKind {
    /// Short lowercase name, as used in targets and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Cuda => "cuda",
            DeviceKind::Vulkan => "vulkan",
            DeviceKind::Metal => "metal",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Index of a [`Target`] registered with the compilation configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetId(u32);

impl TargetId {
    pub fn from_raw(raw: u32) -> Self {
        TargetId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// A compilation target: the device kind it generates code for plus a
/// backend-specific name (triple, driver, etc.). Code generation details are
/// out of scope here; the planner only needs target identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub kind: DeviceKind,
    pub name: String,
}

impl Target {
    pub fn new(kind: DeviceKind, name: impl Into<String>) -> Self {
        Target {
            kind,
            name: name.into(),
        }
    }
}

/// A named memory scope within a device, e.g. `"global"` or `"texture"`.
pub type MemoryScope = String;

/// A description of a storage/execution location.
///
/// Every component is optional. The scope with all components unset is the
/// *fully unconstrained* scope: it denotes "anywhere" and unifies with
/// everything. Partially specified scopes arise from user annotations and are
/// completed by [`CompilationConfig::canonical`](crate::CompilationConfig::canonical).
///
/// Equality is component-wise; the planner relies on canonicalized scopes so
/// that value equality coincides with semantic equality.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    /// The kind of device holding the value.
    pub device: Option<DeviceKind>,
    /// Which virtual device of that kind (a build may have several).
    pub virtual_id: Option<u32>,
    /// Memory scope within the device.
    pub memory: Option<MemoryScope>,
    /// The target whose generated code manipulates the value.
    pub target: Option<TargetId>,
}

impl Scope {
    /// The fully unconstrained scope.
    pub fn unconstrained() -> Self {
        Scope::default()
    }

    /// A scope constrained only by device kind.
    pub fn for_device(device: DeviceKind) -> Self {
        Scope {
            device: Some(device),
            ..Scope::default()
        }
    }

    /// A scope naming a specific virtual device of a kind.
    pub fn for_virtual_device(device: DeviceKind, virtual_id: u32) -> Self {
        Scope {
            device: Some(device),
            virtual_id: Some(virtual_id),
            ..Scope::default()
        }
    }

    /// True iff every component is unset.
    pub fn is_fully_unconstrained(&self) -> bool {
        self.device.is_none()
            && self.virtual_id.is_none()
            && self.memory.is_none()
            && self.target.is_none()
    }

    /// Component-wise join: for each component, either side may be unset, but
    /// set components must agree. Returns `None` if any component conflicts.
    ///
    /// The result takes the more specific value per component, so joining is
    /// monotone: constraints only ever tighten.
    pub fn join(&self, other: &Scope) -> Option<Scope> {
        Some(Scope {
            device: join_component(&self.device, &other.device)?,
            virtual_id: join_component(&self.virtual_id, &other.virtual_id)?,
            memory: join_component(&self.memory, &other.memory)?,
            target: join_component(&self.target, &other.target)?,
        })
    }
}

fn join_component<T: Clone + Eq>(lhs: &Option<T>, rhs: &Option<T>) -> Option<Option<T>> {
    match (lhs, rhs) {
        (None, None) => Some(None),
        (Some(v), None) | (None, Some(v)) => Some(Some(v.clone())),
        (Some(a), Some(b)) if a == b => Some(Some(a.clone())),
        _ => None,
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fully_unconstrained() {
            return f.write_str("?");
        }
        write!(f, "(")?;
        match self.device {
            Some(kind) => write!(f, "{kind}")?,
            None => f.write_str("?")?,
        }
        match self.virtual_id {
            Some(id) => write!(f, ", {id}")?,
            None => f.write_str(", ?")?,
        }
        if let Some(memory) = &self.memory {
            write!(f, ", {memory:?}")?;
        }
        if let Some(target) = self.target {
            write!(f, ", target={}", target.raw())?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests;
