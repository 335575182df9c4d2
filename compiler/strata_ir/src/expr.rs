//! Arena-allocated expressions.
//!
//! Expressions live in a struct-of-arrays [`ExprArena`] and refer to each
//! other by [`ExprId`]. The arena is append-only: rewriting passes push new
//! nodes and leave the originals in place, so an `ExprId` is a stable node
//! identity for the lifetime of the module.

use strata_device::Scope;

use crate::module::{CtorId, GlobalId, OpId, VarId};
use crate::span::Span;
use crate::types::TypeId;

/// Index of an expression in an [`ExprArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

impl ExprId {
    pub fn from_raw(raw: u32) -> Self {
        ExprId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// An opaque constant. The planner never looks inside; only the dimensions
/// participate in equality so constants hash cheaply.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    /// Float stored as bits for `Eq`/`Hash`.
    Float(u64),
    /// A tensor constant; payload elided, dimensions kept.
    Tensor { dims: Vec<u32> },
}

/// Attributes attached to a function abstraction.
///
/// `param_scopes` and `result_scope` are written by the device planner and
/// respected by it on re-runs; `primitive` marks fused bodies that are
/// compiled per call site and must not be descended into.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FnAttrs {
    pub primitive: bool,
    pub param_scopes: Option<Vec<Scope>>,
    pub result_scope: Option<Scope>,
}

/// Attributes attached to a call, for the device dialect operators.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CallAttrs {
    #[default]
    None,
    /// `on_device(expr)`: constrain the argument to `scope`; if `is_fixed`,
    /// constrain the call result too.
    OnDevice { scope: Scope, is_fixed: bool },
    /// `device_copy(expr)`: argument on `src`, result on `dst`.
    DeviceCopy { src: Scope, dst: Scope },
    /// `alloc_storage(size, align)`: result at `scope`.
    AllocStorage { scope: Scope },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionNode {
    pub params: Vec<VarId>,
    pub body: ExprId,
    pub attrs: FnAttrs,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallNode {
    pub callee: ExprId,
    pub args: Vec<ExprId>,
    pub attrs: CallAttrs,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LetNode {
    pub var: VarId,
    pub value: ExprId,
    pub body: ExprId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IfNode {
    pub cond: ExprId,
    pub then_branch: ExprId,
    pub else_branch: ExprId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchNode {
    pub scrutinee: ExprId,
    pub clauses: Vec<Clause>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clause {
    pub pattern: Pattern,
    pub body: ExprId,
}

/// A match pattern. Pattern variables bind fields of the matched value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Wildcard,
    Var(VarId),
    Ctor { ctor: CtorId, fields: Vec<Pattern> },
    Tuple(Vec<Pattern>),
}

impl Pattern {
    /// Visit every variable bound by this pattern.
    pub fn for_each_var(&self, f: &mut impl FnMut(VarId)) {
        match self {
            Pattern::Wildcard => {}
            Pattern::Var(var) => f(*var),
            Pattern::Ctor { fields, .. } | Pattern::Tuple(fields) => {
                for field in fields {
                    field.for_each_var(f);
                }
            }
        }
    }
}

/// The expression variants of the IR.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    /// Reference to a local variable or parameter.
    Var(VarId),
    /// Reference to a top-level function.
    Global(GlobalId),
    Constant(Literal),
    /// Reference to a primitive operator.
    Op(OpId),
    /// Reference to a data constructor.
    Ctor(CtorId),
    Tuple(Vec<ExprId>),
    /// Tuple projection `tuple.index`.
    Project { tuple: ExprId, index: u32 },
    Function(Box<FunctionNode>),
    Call(Box<CallNode>),
    Let(Box<LetNode>),
    If(Box<IfNode>),
    Match(Box<MatchNode>),
    RefNew(ExprId),
    RefRead(ExprId),
    RefWrite { reference: ExprId, value: ExprId },
}

impl ExprKind {
    /// Visit every direct child expression, in evaluation order.
    pub fn for_each_child(&self, mut f: impl FnMut(ExprId)) {
        match self {
            ExprKind::Var(_)
            | ExprKind::Global(_)
            | ExprKind::Constant(_)
            | ExprKind::Op(_)
            | ExprKind::Ctor(_) => {}
            ExprKind::Tuple(fields) => {
                for &field in fields {
                    f(field);
                }
            }
            ExprKind::Project { tuple, .. } => f(*tuple),
            ExprKind::Function(function) => f(function.body),
            ExprKind::Call(call) => {
                f(call.callee);
                for &arg in &call.args {
                    f(arg);
                }
            }
            ExprKind::Let(binding) => {
                f(binding.value);
                f(binding.body);
            }
            ExprKind::If(branch) => {
                f(branch.cond);
                f(branch.then_branch);
                f(branch.else_branch);
            }
            ExprKind::Match(matching) => {
                f(matching.scrutinee);
                for clause in &matching.clauses {
                    f(clause.body);
                }
            }
            ExprKind::RefNew(value) | ExprKind::RefRead(value) => f(*value),
            ExprKind::RefWrite { reference, value } => {
                f(*reference);
                f(*value);
            }
        }
    }
}

/// Contiguous storage for all expressions in a module.
///
/// Struct-of-Arrays layout: kinds, checked types, and spans are parallel
/// arrays indexed by `ExprId`. Most passes only touch the kind array.
#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    kinds: Vec<ExprKind>,
    types: Vec<Option<TypeId>>,
    spans: Vec<Span>,
}

impl ExprArena {
    pub fn new() -> Self {
        ExprArena::default()
    }

    /// Append a node and return its id.
    pub fn push(&mut self, kind: ExprKind, ty: Option<TypeId>, span: Span) -> ExprId {
        let id = ExprId(u32::try_from(self.kinds.len()).expect("expression arena overflow"));
        self.kinds.push(kind);
        self.types.push(ty);
        self.spans.push(span);
        id
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.kinds[id.raw() as usize]
    }

    /// The checked type of a node, if the type checker recorded one.
    pub fn ty(&self, id: ExprId) -> Option<TypeId> {
        self.types[id.raw() as usize]
    }

    pub fn span(&self, id: ExprId) -> Span {
        self.spans[id.raw() as usize]
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
