//! The analysis walk.
//!
//! Children are analysed before their parent. Every rule returns the
//! node's type, or `UNDETERMINED` after recording exactly one error; a
//! parent that sees `UNDETERMINED` from a child returns it unchanged.

use quill_ast::*;
use quill_common::{ScopeStack, Span};
use quill_types::defaults::{ASSIGN, NEGATE};
use quill_types::{
    resolve_binary, resolve_unary, Constant, Operand, SpecialFunctions, TypeId, TypeRegistry,
};

use crate::error::{Origin, TypeError};

/// What the body of the function being analysed may refer to.
#[derive(Debug, Clone)]
pub(crate) struct FnContext {
    pub name: String,
    pub signature: TypeId,
    pub return_type: TypeId,
}

pub(crate) struct Analyzer<'a, 'ctx> {
    pub(crate) types: &'a mut TypeRegistry<'ctx>,
    pub(crate) special: &'a SpecialFunctions,
    pub(crate) env: ScopeStack<TypeId>,
    pub(crate) errors: Vec<TypeError>,
}

/// Short-circuit on a failed child.
macro_rules! try_ty {
    ($e:expr) => {{
        let ty = $e;
        if ty == TypeId::UNDETERMINED {
            return TypeId::UNDETERMINED;
        }
        ty
    }};
}
pub(crate) use try_ty;

impl<'a, 'ctx> Analyzer<'a, 'ctx> {
    pub(crate) fn new(types: &'a mut TypeRegistry<'ctx>, special: &'a SpecialFunctions) -> Self {
        Analyzer {
            types,
            special,
            env: ScopeStack::new(),
            errors: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, error: TypeError) -> TypeId {
        tracing::warn!(%error, "analysis failed");
        self.errors.push(error);
        TypeId::UNDETERMINED
    }

    // ── Types as written ───────────────────────────────────────────

    fn resolve_type(&mut self, ty: &TypeExpr, span: Span) -> TypeId {
        let id = match ty {
            TypeExpr::Named(name) => self.types.id_of(name),
            TypeExpr::Array(element, length) => {
                let element = try_ty!(self.resolve_type(element, span));
                self.types.intern_array(element, *length)
            }
            TypeExpr::Tuple(members) => {
                let mut ids = Vec::with_capacity(members.len());
                for member in members {
                    ids.push(try_ty!(self.resolve_type(member, span)));
                }
                self.types.intern_anon_struct(&ids)
            }
        };
        if id == TypeId::UNDETERMINED {
            return self.fail(TypeError::UnknownType {
                name: ty.to_string(),
                span,
            });
        }
        id
    }

    // ── Items ──────────────────────────────────────────────────────

    pub(crate) fn function(&mut self, function: &mut Function) -> TypeId {
        tracing::debug!(name = %function.name, "analysing function");
        let mut params = Vec::with_capacity(function.params.len());
        for param in &function.params {
            params.push(try_ty!(self.resolve_type(&param.ty, param.span)));
        }
        let ret = try_ty!(self.resolve_type(&function.return_type, function.span));
        let signature = self.types.intern_function(&params, ret);
        if signature == TypeId::UNDETERMINED {
            return self.fail(TypeError::UnknownType {
                name: function.name.clone(),
                span: function.span,
            });
        }
        if self.env.lookup(&function.name).is_some() {
            return self.fail(TypeError::Redefinition {
                name: function.name.clone(),
                span: function.span,
            });
        }
        self.env.insert_global(function.name.clone(), signature);
        function.signature = signature;

        let ctx = FnContext {
            name: function.name.clone(),
            signature,
            return_type: ret,
        };
        tracing::trace!(
            name = %ctx.name,
            signature = %self.types.display(ctx.signature),
            "bound function"
        );
        self.env.push();
        for (param, ty) in function.params.iter().zip(&params) {
            if self.env.insert(param.name.clone(), *ty).is_some() {
                self.env.pop();
                return self.fail(TypeError::Redefinition {
                    name: param.name.clone(),
                    span: param.span,
                });
            }
        }
        let body = self.block(&mut function.body, &ctx);
        self.env.pop();
        try_ty!(body);

        if ret == TypeId::VOID {
            try_ty!(self.settle_tail(&mut function.body));
            return signature;
        }
        let origin = Origin::Return {
            function: function.name.clone(),
        };
        try_ty!(self.reconcile_block(&mut function.body, ret, origin));
        signature
    }

    // ── Statements and expressions ─────────────────────────────────

    pub(crate) fn block(&mut self, block: &mut Block, ctx: &FnContext) -> TypeId {
        self.env.push();
        let ty = self.block_stmts(block, ctx);
        self.env.pop();
        block.ty = ty;
        ty
    }

    fn block_stmts(&mut self, block: &mut Block, ctx: &FnContext) -> TypeId {
        let mut ty = TypeId::VOID;
        let count = block.stmts.len();
        for (i, stmt) in block.stmts.iter_mut().enumerate() {
            ty = try_ty!(self.expr(stmt, ctx));
            // Values of earlier statements are discarded; give any literal
            // among them its default type so it can still be lowered.
            if i + 1 < count && ty.is_literal() {
                try_ty!(self.settle(stmt, ty));
            }
        }
        ty
    }

    pub(crate) fn expr(&mut self, expr: &mut Expr, ctx: &FnContext) -> TypeId {
        match expr {
            Expr::Return(node) => self.return_stmt(node, ctx),
            Expr::Let(node) => self.let_stmt(node, ctx),
            Expr::Binary(node) => self.binary(node, ctx),
            Expr::Unary(node) => self.unary(node, ctx),
            Expr::Call(node) => self.call(node, ctx),
            Expr::If(node) => self.if_expr(node, ctx),
            Expr::Loop(node) => self.loop_expr(node, ctx),
            Expr::Block(node) => self.block(node, ctx),
            Expr::Ident(node) => {
                let Some(&ty) = self.env.lookup(&node.name) else {
                    return self.fail(TypeError::UnboundName {
                        name: node.name.clone(),
                        span: node.span,
                    });
                };
                node.ty = ty;
                ty
            }
            Expr::Literal(node) => self.literal(node),
            // Already rewritten by an earlier pass.
            Expr::Cast(node) => {
                try_ty!(self.expr(&mut node.expr, ctx));
                node.to
            }
        }
    }

    fn literal(&mut self, node: &mut Literal) -> TypeId {
        if node.ty() != TypeId::UNSET {
            return node.ty();
        }
        let ty = match node.value {
            LiteralValue::Int(_) => TypeId::U_LITERAL,
            LiteralValue::Float(_) => TypeId::FP_LITERAL,
            LiteralValue::Char(_) => TypeId::CHAR,
            LiteralValue::Bool(_) => TypeId::BOOL,
            LiteralValue::Str(_) => {
                return self.fail(TypeError::Unsupported {
                    what: "string literals",
                    span: node.span,
                })
            }
        };
        node.assign_type(ty);
        ty
    }

    fn return_stmt(&mut self, node: &mut Return, ctx: &FnContext) -> TypeId {
        match node.value.as_deref_mut() {
            Some(value) => {
                let found = try_ty!(self.expr(value, ctx));
                let origin = Origin::Return {
                    function: ctx.name.clone(),
                };
                try_ty!(self.reconcile(value, found, ctx.return_type, origin));
            }
            None if ctx.return_type != TypeId::VOID => {
                return self.fail(TypeError::MissingValue {
                    function: ctx.name.clone(),
                    expected: ctx.return_type,
                    span: node.span,
                });
            }
            None => {}
        }
        node.ty = ctx.return_type;
        node.ty
    }

    pub(crate) fn let_stmt(&mut self, node: &mut Let, ctx: &FnContext) -> TypeId {
        let found = match node.init.as_deref_mut() {
            Some(init) => Some(try_ty!(self.expr(init, ctx))),
            None => None,
        };
        let declared = match &node.declared {
            Some(ty) => Some(try_ty!(self.resolve_type(ty, node.span))),
            None => None,
        };
        let var_ty = match (declared, found, node.init.as_deref_mut()) {
            (Some(declared), Some(found), Some(init)) => {
                let origin = Origin::LetBinding {
                    name: node.name.clone(),
                };
                try_ty!(self.reconcile(init, found, declared, origin))
            }
            (None, Some(found), Some(init)) if found.is_literal() => {
                try_ty!(self.settle(init, found))
            }
            (None, Some(found), _) if found != TypeId::VOID => found,
            (Some(declared), None, _) if declared != TypeId::VOID => declared,
            _ => {
                return self.fail(TypeError::UntypedVariable {
                    name: node.name.clone(),
                    span: node.span,
                })
            }
        };
        self.env.insert(node.name.clone(), var_ty);
        node.var_ty = var_ty;
        TypeId::VOID
    }

    fn binary(&mut self, node: &mut Binary, ctx: &FnContext) -> TypeId {
        let left = try_ty!(self.expr(&mut node.lhs, ctx));
        let right = try_ty!(self.expr(&mut node.rhs, ctx));

        if node.op == ASSIGN {
            try_ty!(self.reconcile(&mut node.rhs, right, left, Origin::Assignment));
            node.left_ty = left;
            node.right_ty = left;
            node.ty = left;
            return left;
        }

        let Some(resolution) = resolve_binary(
            self.special,
            &node.op,
            operand(&node.lhs, left),
            operand(&node.rhs, right),
        ) else {
            return self.fail(TypeError::NoOperator {
                op: node.op.clone(),
                left,
                right,
                span: node.span,
            });
        };
        let origin = Origin::Operand {
            op: node.op.clone(),
        };
        try_ty!(self.reconcile(&mut node.lhs, left, resolution.left, origin.clone()));
        try_ty!(self.reconcile(&mut node.rhs, right, resolution.right, origin));
        node.left_ty = resolution.left;
        node.right_ty = resolution.right;
        node.ty = resolution.ret;
        node.ty
    }

    fn unary(&mut self, node: &mut Unary, ctx: &FnContext) -> TypeId {
        let operand = try_ty!(self.expr(&mut node.operand, ctx));
        let Some(resolution) = resolve_unary(self.special, &node.op, operand) else {
            return self.fail(TypeError::NoUnaryOperator {
                op: node.op.clone(),
                operand,
                span: node.span,
            });
        };
        let origin = Origin::Operand {
            op: node.op.clone(),
        };
        try_ty!(self.reconcile(&mut node.operand, operand, resolution.operand, origin));
        node.operand_ty = resolution.operand;
        node.ty = resolution.ret;
        node.ty
    }

    fn call(&mut self, node: &mut Call, ctx: &FnContext) -> TypeId {
        let Some(&callee) = self.env.lookup(&node.callee) else {
            return self.fail(TypeError::UnboundName {
                name: node.callee.clone(),
                span: node.span,
            });
        };
        let Some((params, ret)) = self.types.signature(callee) else {
            return self.fail(TypeError::NotAFunction {
                name: node.callee.clone(),
                span: node.span,
            });
        };
        let params = params.to_vec();
        if params.len() != node.args.len() {
            return self.fail(TypeError::ArityMismatch {
                callee: node.callee.clone(),
                expected: params.len(),
                found: node.args.len(),
                span: node.span,
            });
        }

        let mut found = Vec::with_capacity(params.len());
        for arg in &mut node.args {
            found.push(try_ty!(self.expr(arg, ctx)));
        }
        // Check every argument before rewriting any of them.
        for (index, (&from, &to)) in found.iter().zip(&params).enumerate() {
            if from != to && !self.special.casts().is_declared(from, to) {
                return self.fail(TypeError::Mismatch {
                    expected: to,
                    found: from,
                    origin: Origin::Argument {
                        callee: node.callee.clone(),
                        index,
                    },
                    span: node.args[index].span(),
                });
            }
        }
        for (index, arg) in node.args.iter_mut().enumerate() {
            let origin = Origin::Argument {
                callee: node.callee.clone(),
                index,
            };
            try_ty!(self.reconcile(arg, found[index], params[index], origin));
        }
        node.ty = ret;
        ret
    }

    fn if_expr(&mut self, node: &mut If, ctx: &FnContext) -> TypeId {
        self.env.push();
        let ty = self.if_scoped(node, ctx);
        self.env.pop();
        node.ty = ty;
        ty
    }

    fn if_scoped(&mut self, node: &mut If, ctx: &FnContext) -> TypeId {
        if let Some(init) = node.init.as_deref_mut() {
            try_ty!(self.let_stmt(init, ctx));
        }
        let cond = try_ty!(self.expr(&mut node.cond, ctx));
        try_ty!(self.reconcile(&mut node.cond, cond, TypeId::BOOL, Origin::Condition));

        let then_ty = try_ty!(self.block(&mut node.then_branch, ctx));
        let else_ty = match node.else_branch.as_mut() {
            Some(branch) => try_ty!(self.block(branch, ctx)),
            None => TypeId::VOID,
        };

        if node.form == IfForm::Statement {
            try_ty!(self.settle_tail(&mut node.then_branch));
            if let Some(branch) = node.else_branch.as_mut() {
                try_ty!(self.settle_tail(branch));
            }
            return TypeId::VOID;
        }
        self.merge_arms(node, then_ty, else_ty)
    }

    fn merge_arms(&mut self, node: &mut If, then_ty: TypeId, else_ty: TypeId) -> TypeId {
        // An arm that returns never reaches the merge, so the other arm
        // alone decides the value.
        let else_returns = node.else_branch.as_ref().is_some_and(ends_in_return);
        if ends_in_return(&node.then_branch) {
            return match node.else_branch.as_mut() {
                Some(branch) if !else_returns => self.settle_tail(branch),
                _ => then_ty,
            };
        }
        if else_returns {
            return self.settle_tail(&mut node.then_branch);
        }
        if then_ty.is_literal() && else_ty.is_literal() {
            return self.fail(TypeError::UnmergeableLiterals {
                then_ty,
                else_ty,
                span: node.span,
            });
        }
        if then_ty == else_ty {
            return then_ty;
        }
        match node.else_branch.as_mut() {
            Some(branch) if else_ty.is_literal() => {
                self.reconcile_block(branch, then_ty, Origin::IfArms)
            }
            _ if then_ty.is_literal() => {
                self.reconcile_block(&mut node.then_branch, else_ty, Origin::IfArms)
            }
            _ => self.fail(TypeError::Mismatch {
                expected: then_ty,
                found: else_ty,
                origin: Origin::IfArms,
                span: node.span,
            }),
        }
    }

    fn loop_expr(&mut self, node: &mut Loop, ctx: &FnContext) -> TypeId {
        self.env.push();
        let ty = self.loop_scoped(node, ctx);
        self.env.pop();
        node.ty = ty;
        ty
    }

    fn loop_scoped(&mut self, node: &mut Loop, ctx: &FnContext) -> TypeId {
        if let Some(init) = node.init.as_deref_mut() {
            try_ty!(self.let_stmt(init, ctx));
        }
        if let Some(cond) = node.cond.as_deref_mut() {
            let found = try_ty!(self.expr(cond, ctx));
            try_ty!(self.reconcile(cond, found, TypeId::BOOL, Origin::Condition));
        }
        try_ty!(self.block(&mut node.body, ctx));
        let ty = try_ty!(self.settle_tail(&mut node.body));
        if let Some(post) = node.post.as_deref_mut() {
            let found = try_ty!(self.expr(post, ctx));
            if found.is_literal() {
                try_ty!(self.settle(post, found));
            }
        }
        ty
    }
}

fn ends_in_return(block: &Block) -> bool {
    matches!(block.stmts.last(), Some(Expr::Return(_)))
}

/// The value of a literal leaf, or of a negated integer literal, so
/// resolution can skip types too narrow to hold it.
pub(crate) fn literal_constant(expr: &Expr) -> Option<Constant> {
    match expr {
        Expr::Literal(lit) => match lit.value {
            LiteralValue::Int(magnitude) => Some(Constant::Int {
                magnitude,
                negative: false,
            }),
            LiteralValue::Float(value) => Some(Constant::Float(value)),
            _ => None,
        },
        Expr::Unary(node) if node.op == NEGATE => match literal_constant(&node.operand)? {
            Constant::Int {
                magnitude,
                negative,
            } => Some(Constant::Int {
                magnitude,
                negative: !negative,
            }),
            Constant::Float(value) => Some(Constant::Float(-value)),
        },
        _ => None,
    }
}

fn operand(expr: &Expr, ty: TypeId) -> Operand {
    match literal_constant(expr) {
        Some(constant) if ty.is_literal() => Operand::literal(ty, constant),
        _ => Operand::from(ty),
    }
}
