//! The device dialect: operators the planner gives special constraint
//! signatures, plus helpers to build and inspect their calls.
//!
//! `on_device` and `device_copy` calls have no operational meaning of their
//! own. Annotations constrain where their argument lives; copies are the
//! explicit cross-scope data movements the planner inserts (and removes when
//! source and destination coincide). The shape and allocation operators keep
//! their shape operands on the host scope.

use strata_device::Scope;

use crate::expr::{CallAttrs, ExprId, ExprKind};
use crate::module::Module;

/// The closed set of operators with non-default constraint signatures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialectOp {
    OnDevice,
    DeviceCopy,
    ShapeOf,
    ReshapeTensor,
    ShapeFunc,
    AllocStorage,
    AllocTensor,
}

impl DialectOp {
    /// Recognize a dialect operator by its registered name.
    pub fn from_name(name: &str) -> Option<DialectOp> {
        match name {
            "on_device" => Some(DialectOp::OnDevice),
            "device_copy" => Some(DialectOp::DeviceCopy),
            "shape_of" => Some(DialectOp::ShapeOf),
            "reshape_tensor" => Some(DialectOp::ReshapeTensor),
            "shape_func" => Some(DialectOp::ShapeFunc),
            "alloc_storage" => Some(DialectOp::AllocStorage),
            "alloc_tensor" => Some(DialectOp::AllocTensor),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DialectOp::OnDevice => "on_device",
            DialectOp::DeviceCopy => "device_copy",
            DialectOp::ShapeOf => "shape_of",
            DialectOp::ReshapeTensor => "reshape_tensor",
            DialectOp::ShapeFunc => "shape_func",
            DialectOp::AllocStorage => "alloc_storage",
            DialectOp::AllocTensor => "alloc_tensor",
        }
    }
}

/// The decoded attributes of an `on_device` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnDeviceProps {
    pub body: ExprId,
    pub scope: Scope,
    pub is_fixed: bool,
}

/// The decoded attributes of a `device_copy` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCopyProps {
    pub body: ExprId,
    pub src: Scope,
    pub dst: Scope,
}

impl Module {
    /// The dialect operator a call's callee refers to, if any.
    pub fn callee_dialect(&self, callee: ExprId) -> Option<DialectOp> {
        match self.arena.kind(callee) {
            ExprKind::Op(op) => self.op_info(*op).dialect,
            _ => None,
        }
    }

    /// Decode `expr` as an `on_device` call.
    pub fn on_device_props(&self, expr: ExprId) -> Option<OnDeviceProps> {
        let ExprKind::Call(call) = self.arena.kind(expr) else {
            return None;
        };
        if self.callee_dialect(call.callee) != Some(DialectOp::OnDevice) {
            return None;
        }
        let CallAttrs::OnDevice { scope, is_fixed } = &call.attrs else {
            return None;
        };
        let &[body] = call.args.as_slice() else {
            return None;
        };
        Some(OnDeviceProps {
            body,
            scope: scope.clone(),
            is_fixed: *is_fixed,
        })
    }

    /// Decode `expr` as a `device_copy` call.
    pub fn device_copy_props(&self, expr: ExprId) -> Option<DeviceCopyProps> {
        let ExprKind::Call(call) = self.arena.kind(expr) else {
            return None;
        };
        if self.callee_dialect(call.callee) != Some(DialectOp::DeviceCopy) {
            return None;
        }
        let CallAttrs::DeviceCopy { src, dst } = &call.attrs else {
            return None;
        };
        let &[body] = call.args.as_slice() else {
            return None;
        };
        Some(DeviceCopyProps {
            body,
            src: src.clone(),
            dst: dst.clone(),
        })
    }

    /// Build `on_device(body, scope, is_fixed)`. The call takes its type
    /// from `body`.
    pub fn on_device(&mut self, body: ExprId, scope: Scope, is_fixed: bool) -> ExprId {
        let op = self.op(DialectOp::OnDevice.name());
        let callee = self.op_expr(op);
        let ty = self.arena.ty(body);
        self.call_with_attrs(
            callee,
            vec![body],
            CallAttrs::OnDevice { scope, is_fixed },
            ty,
        )
    }

    /// Build `device_copy(body, src, dst)`. The call takes its type from
    /// `body`.
    pub fn device_copy(&mut self, body: ExprId, src: Scope, dst: Scope) -> ExprId {
        let op = self.op(DialectOp::DeviceCopy.name());
        let callee = self.op_expr(op);
        let ty = self.arena.ty(body);
        self.call_with_attrs(callee, vec![body], CallAttrs::DeviceCopy { src, dst }, ty)
    }

    /// Wrap `body` in an annotation unless wrapping would be meaningless:
    /// - a fully unconstrained scope constrains nothing;
    /// - operator and constructor references are scope-polymorphic and are
    ///   never wrapped;
    /// - a fixed annotation at the same scope is not nested inside another.
    pub fn maybe_on_device(&mut self, body: ExprId, scope: Scope, is_fixed: bool) -> ExprId {
        if scope.is_fully_unconstrained() {
            return body;
        }
        if matches!(
            self.arena.kind(body),
            ExprKind::Op(_) | ExprKind::Ctor(_)
        ) {
            return body;
        }
        if let Some(props) = self.on_device_props(body) {
            if props.is_fixed && is_fixed && props.scope == scope {
                return body;
            }
        }
        self.on_device(body, scope, is_fixed)
    }
}

#[cfg(test)]
mod tests;
