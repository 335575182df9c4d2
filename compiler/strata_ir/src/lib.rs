//! Strata IR - the typed, higher-order intermediate representation.
//!
//! This crate contains the data structures the middle-end passes operate on:
//! - [`Span`]s for source locations
//! - Interned types ([`TypeStore`], [`TypeId`])
//! - Arena-allocated expressions ([`ExprArena`], [`ExprId`], [`ExprKind`])
//! - [`Module`]s: global functions plus algebraic data type definitions
//! - The device dialect: `on_device`, `device_copy`, shape and allocation
//!   operators and their attribute schemas
//! - A compact expression printer and cross-arena structural equality
//!
//! # Design Philosophy
//!
//! - **Intern everything**: types are `TypeId(u32)` into a deduplicating
//!   store; variables, globals, operators and constructors are `u32` newtypes
//!   into module-level tables.
//! - **Flatten everything**: no `Box<Expr>` trees — expressions live in a
//!   contiguous arena and refer to each other by `ExprId(u32)`. The id is the
//!   node identity that analysis maps key on.
//! - Expressions are pure; mutation exists only as explicit reference cells
//!   (`RefNew` / `RefRead` / `RefWrite`).

mod dialect;
mod equal;
mod expr;
mod module;
mod print;
mod span;
mod types;

pub use dialect::{DeviceCopyProps, DialectOp, OnDeviceProps};
pub use expr::{
    CallAttrs, CallNode, Clause, ExprArena, ExprId, ExprKind, FnAttrs, FunctionNode, IfNode,
    LetNode, Literal, MatchNode, Pattern,
};
pub use equal::{expr_structurally_eq, module_structurally_eq};
pub use module::{
    AdtDef, AdtId, CtorDef, CtorId, GlobalId, GlobalInfo, Module, OpId, OpInfo, VarId, VarInfo,
};
pub use print::expr_to_string;
pub use span::Span;
pub use types::{TypeId, TypeKind, TypeStore};
