//! Modules: global functions plus algebraic data type definitions.

use rustc_hash::FxHashMap;

use crate::dialect::DialectOp;
use crate::expr::{
    CallAttrs, CallNode, Clause, ExprArena, ExprId, ExprKind, FnAttrs, FunctionNode, IfNode,
    LetNode, Literal, MatchNode,
};
use crate::span::Span;
use crate::types::{TypeId, TypeKind, TypeStore};

macro_rules! table_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            pub fn from_raw(raw: u32) -> Self {
                $name(raw)
            }

            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

table_id!(
    /// A local variable or parameter. All use sites of one binding share the
    /// same `VarId`, so per-variable analysis state attaches here rather than
    /// to individual occurrences.
    VarId
);
table_id!(
    /// A top-level function name.
    GlobalId
);
table_id!(
    /// A primitive operator.
    OpId
);
table_id!(
    /// An algebraic data type.
    AdtId
);
table_id!(
    /// A data constructor.
    CtorId
);

#[derive(Clone, Debug)]
pub struct VarInfo {
    pub name: String,
    pub ty: Option<TypeId>,
}

#[derive(Clone, Debug)]
pub struct GlobalInfo {
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct OpInfo {
    pub name: String,
    /// Set when the name is one of the recognized device-dialect operators.
    pub dialect: Option<DialectOp>,
}

#[derive(Clone, Debug)]
pub struct AdtDef {
    pub name: String,
    pub ctors: Vec<CtorId>,
}

#[derive(Clone, Debug)]
pub struct CtorDef {
    pub name: String,
    pub adt: AdtId,
    pub fields: Vec<TypeId>,
}

/// A module: an ordered mapping from global names to top-level functions,
/// plus the tables every expression indexes into.
///
/// Functions keep their insertion order, so passes that iterate "in module
/// order" are deterministic.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub types: TypeStore,
    pub arena: ExprArena,
    vars: Vec<VarInfo>,
    globals: Vec<GlobalInfo>,
    ops: Vec<OpInfo>,
    op_names: FxHashMap<String, OpId>,
    adts: Vec<AdtDef>,
    ctors: Vec<CtorDef>,
    functions: Vec<(GlobalId, ExprId)>,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    /// A module sharing this one's tables but with a fresh, empty arena and
    /// no function definitions. Used by rewriting passes that rebuild every
    /// function: `VarId`/`TypeId`/`OpId` etc. stay valid in the result.
    pub fn rebuild_shell(&self) -> Module {
        Module {
            types: self.types.clone(),
            arena: ExprArena::new(),
            vars: self.vars.clone(),
            globals: self.globals.clone(),
            ops: self.ops.clone(),
            op_names: self.op_names.clone(),
            adts: self.adts.clone(),
            ctors: self.ctors.clone(),
            functions: Vec::new(),
        }
    }

    // ========================================
    // Tables
    // ========================================

    pub fn fresh_var(&mut self, name: impl Into<String>, ty: Option<TypeId>) -> VarId {
        let id = VarId::from_raw(self.vars.len() as u32);
        self.vars.push(VarInfo {
            name: name.into(),
            ty,
        });
        id
    }

    pub fn var(&self, id: VarId) -> &VarInfo {
        &self.vars[id.raw() as usize]
    }

    pub fn declare_global(&mut self, name: impl Into<String>) -> GlobalId {
        let id = GlobalId::from_raw(self.globals.len() as u32);
        self.globals.push(GlobalInfo { name: name.into() });
        id
    }

    pub fn global(&self, id: GlobalId) -> &GlobalInfo {
        &self.globals[id.raw() as usize]
    }

    /// Register (or look up) a primitive operator by name. Device-dialect
    /// names are recognized here, once, rather than re-matched at use sites.
    pub fn op(&mut self, name: &str) -> OpId {
        if let Some(&id) = self.op_names.get(name) {
            return id;
        }
        let id = OpId::from_raw(self.ops.len() as u32);
        self.ops.push(OpInfo {
            name: name.to_string(),
            dialect: DialectOp::from_name(name),
        });
        self.op_names.insert(name.to_string(), id);
        id
    }

    pub fn op_info(&self, id: OpId) -> &OpInfo {
        &self.ops[id.raw() as usize]
    }

    pub fn declare_adt(&mut self, name: impl Into<String>) -> AdtId {
        let id = AdtId::from_raw(self.adts.len() as u32);
        self.adts.push(AdtDef {
            name: name.into(),
            ctors: Vec::new(),
        });
        id
    }

    pub fn adt(&self, id: AdtId) -> &AdtDef {
        &self.adts[id.raw() as usize]
    }

    pub fn declare_ctor(
        &mut self,
        adt: AdtId,
        name: impl Into<String>,
        fields: Vec<TypeId>,
    ) -> CtorId {
        let id = CtorId::from_raw(self.ctors.len() as u32);
        self.ctors.push(CtorDef {
            name: name.into(),
            adt,
            fields,
        });
        self.adts[adt.raw() as usize].ctors.push(id);
        id
    }

    pub fn ctor(&self, id: CtorId) -> &CtorDef {
        &self.ctors[id.raw() as usize]
    }

    // ========================================
    // Functions
    // ========================================

    /// Bind `function` (which must be a `Function` node) to `global`.
    pub fn define(&mut self, global: GlobalId, function: ExprId) {
        debug_assert!(matches!(
            self.arena.kind(function),
            ExprKind::Function(_)
        ));
        self.functions.push((global, function));
    }

    /// Top-level definitions in insertion order.
    pub fn functions(&self) -> &[(GlobalId, ExprId)] {
        &self.functions
    }

    /// Replace the definition list, preserving insertion order semantics.
    /// Used by in-place rewriting passes that produce new function roots.
    pub fn set_functions(&mut self, functions: Vec<(GlobalId, ExprId)>) {
        self.functions = functions;
    }

    // ========================================
    // Expression builders
    // ========================================

    pub fn expr(&mut self, kind: ExprKind, ty: Option<TypeId>, span: Span) -> ExprId {
        self.arena.push(kind, ty, span)
    }

    /// A use of `var`, typed from the variable table.
    pub fn var_expr(&mut self, var: VarId) -> ExprId {
        let ty = self.var(var).ty;
        self.expr(ExprKind::Var(var), ty, Span::DUMMY)
    }

    pub fn global_expr(&mut self, global: GlobalId, ty: Option<TypeId>) -> ExprId {
        self.expr(ExprKind::Global(global), ty, Span::DUMMY)
    }

    pub fn constant(&mut self, literal: Literal, ty: Option<TypeId>) -> ExprId {
        self.expr(ExprKind::Constant(literal), ty, Span::DUMMY)
    }

    pub fn op_expr(&mut self, op: OpId) -> ExprId {
        self.expr(ExprKind::Op(op), None, Span::DUMMY)
    }

    pub fn ctor_expr(&mut self, ctor: CtorId) -> ExprId {
        self.expr(ExprKind::Ctor(ctor), None, Span::DUMMY)
    }

    /// A tuple; typed when every field is typed.
    pub fn tuple(&mut self, fields: Vec<ExprId>) -> ExprId {
        let field_tys: Option<Vec<TypeId>> =
            fields.iter().map(|&field| self.arena.ty(field)).collect();
        let ty = field_tys.map(|tys| self.types.tuple(tys));
        self.expr(ExprKind::Tuple(fields), ty, Span::DUMMY)
    }

    /// `tuple.index`, typed from the tuple's type when known.
    pub fn project(&mut self, tuple: ExprId, index: u32) -> ExprId {
        let ty = self.arena.ty(tuple).and_then(|tuple_ty| {
            match self.types.kind(tuple_ty) {
                TypeKind::Tuple(elems) => elems.get(index as usize).copied(),
                _ => None,
            }
        });
        self.expr(ExprKind::Project { tuple, index }, ty, Span::DUMMY)
    }

    pub fn call(&mut self, callee: ExprId, args: Vec<ExprId>, ty: Option<TypeId>) -> ExprId {
        self.call_with_attrs(callee, args, CallAttrs::None, ty)
    }

    pub fn call_with_attrs(
        &mut self,
        callee: ExprId,
        args: Vec<ExprId>,
        attrs: CallAttrs,
        ty: Option<TypeId>,
    ) -> ExprId {
        self.expr(
            ExprKind::Call(Box::new(CallNode {
                callee,
                args,
                attrs,
            })),
            ty,
            Span::DUMMY,
        )
    }

    /// `let var = value; body`, typed from the body.
    pub fn let_(&mut self, var: VarId, value: ExprId, body: ExprId) -> ExprId {
        let ty = self.arena.ty(body);
        self.expr(
            ExprKind::Let(Box::new(LetNode { var, value, body })),
            ty,
            Span::DUMMY,
        )
    }

    pub fn if_(&mut self, cond: ExprId, then_branch: ExprId, else_branch: ExprId) -> ExprId {
        let ty = self.arena.ty(then_branch);
        self.expr(
            ExprKind::If(Box::new(IfNode {
                cond,
                then_branch,
                else_branch,
            })),
            ty,
            Span::DUMMY,
        )
    }

    pub fn match_(&mut self, scrutinee: ExprId, clauses: Vec<Clause>) -> ExprId {
        let ty = clauses
            .first()
            .and_then(|clause| self.arena.ty(clause.body));
        self.expr(
            ExprKind::Match(Box::new(MatchNode { scrutinee, clauses })),
            ty,
            Span::DUMMY,
        )
    }

    /// A function abstraction, typed from its parameter and body types.
    pub fn function(&mut self, params: Vec<VarId>, body: ExprId, attrs: FnAttrs) -> ExprId {
        let param_tys: Option<Vec<TypeId>> =
            params.iter().map(|&param| self.var(param).ty).collect();
        let ty = match (param_tys, self.arena.ty(body)) {
            (Some(params), Some(result)) => Some(self.types.func(params, result)),
            _ => None,
        };
        self.expr(
            ExprKind::Function(Box::new(FunctionNode {
                params,
                body,
                attrs,
            })),
            ty,
            Span::DUMMY,
        )
    }

    pub fn ref_new(&mut self, value: ExprId) -> ExprId {
        let ty = self.arena.ty(value).map(|inner| self.types.reference(inner));
        self.expr(ExprKind::RefNew(value), ty, Span::DUMMY)
    }

    pub fn ref_read(&mut self, reference: ExprId) -> ExprId {
        let ty = self.arena.ty(reference).and_then(|ref_ty| {
            match self.types.kind(ref_ty) {
                TypeKind::Ref(inner) => Some(*inner),
                _ => None,
            }
        });
        self.expr(ExprKind::RefRead(reference), ty, Span::DUMMY)
    }

    pub fn ref_write(&mut self, reference: ExprId, value: ExprId) -> ExprId {
        let ty = Some(self.types.unit());
        self.expr(ExprKind::RefWrite { reference, value }, ty, Span::DUMMY)
    }
}
