//! Interned types.
//!
//! All types in a module live in a [`TypeStore`] and are referenced by
//! [`TypeId`]. Interning gives O(1) type equality within one store; comparing
//! across stores goes through [`TypeStore::structurally_eq`].

use rustc_hash::FxHashMap;

use crate::module::AdtId;

/// Index of a type in a [`TypeStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub fn from_raw(raw: u32) -> Self {
        TypeId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// The shape of a type.
///
/// Tensors are deliberately opaque: the planner never inspects dtypes or
/// shapes, only whether a type is function-shaped (and with what arity).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// A tensor of any dtype and shape.
    Tensor,
    /// The empty tuple / no useful value (result of `RefWrite`).
    Unit,
    /// A function type; `params.len()` is the arity.
    Fn { params: Vec<TypeId>, result: TypeId },
    Tuple(Vec<TypeId>),
    /// A mutable reference cell.
    Ref(TypeId),
    /// A declared algebraic data type.
    Adt(AdtId),
}

/// Deduplicating storage for all types in a module.
#[derive(Clone, Debug, Default)]
pub struct TypeStore {
    kinds: Vec<TypeKind>,
    intern: FxHashMap<TypeKind, TypeId>,
}

impl TypeStore {
    pub fn new() -> Self {
        TypeStore::default()
    }

    fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.intern.get(&kind) {
            return id;
        }
        let id = TypeId(u32::try_from(self.kinds.len()).expect("type store overflow"));
        self.kinds.push(kind.clone());
        self.intern.insert(kind, id);
        id
    }

    pub fn tensor(&mut self) -> TypeId {
        self.intern(TypeKind::Tensor)
    }

    pub fn unit(&mut self) -> TypeId {
        self.intern(TypeKind::Unit)
    }

    pub fn func(&mut self, params: Vec<TypeId>, result: TypeId) -> TypeId {
        self.intern(TypeKind::Fn { params, result })
    }

    pub fn tuple(&mut self, elems: Vec<TypeId>) -> TypeId {
        self.intern(TypeKind::Tuple(elems))
    }

    pub fn reference(&mut self, inner: TypeId) -> TypeId {
        self.intern(TypeKind::Ref(inner))
    }

    pub fn adt(&mut self, adt: AdtId) -> TypeId {
        self.intern(TypeKind::Adt(adt))
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.raw() as usize]
    }

    /// Arity of a function type, `None` for first-order types.
    pub fn fn_arity(&self, id: TypeId) -> Option<usize> {
        match self.kind(id) {
            TypeKind::Fn { params, .. } => Some(params.len()),
            _ => None,
        }
    }

    pub fn is_function(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Fn { .. })
    }

    /// Structural comparison of types across two stores.
    pub fn structurally_eq(&self, lhs: TypeId, other: &TypeStore, rhs: TypeId) -> bool {
        match (self.kind(lhs), other.kind(rhs)) {
            (TypeKind::Tensor, TypeKind::Tensor) | (TypeKind::Unit, TypeKind::Unit) => true,
            (
                TypeKind::Fn { params: pa, result: ra },
                TypeKind::Fn { params: pb, result: rb },
            ) => {
                pa.len() == pb.len()
                    && pa
                        .iter()
                        .zip(pb)
                        .all(|(&a, &b)| self.structurally_eq(a, other, b))
                    && self.structurally_eq(*ra, other, *rb)
            }
            (TypeKind::Tuple(ea), TypeKind::Tuple(eb)) => {
                ea.len() == eb.len()
                    && ea
                        .iter()
                        .zip(eb)
                        .all(|(&a, &b)| self.structurally_eq(a, other, b))
            }
            (TypeKind::Ref(a), TypeKind::Ref(b)) => self.structurally_eq(*a, other, *b),
            (TypeKind::Adt(a), TypeKind::Adt(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests;
