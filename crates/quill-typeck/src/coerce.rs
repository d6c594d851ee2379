//! Reconciling a value with the type its context requires.
//!
//! A value of the required type is accepted as is. A literal-kinded value
//! has no representation yet, so it is relabelled: the required type is
//! pushed down into its literal leaves and the operators over them. Any
//! other value with a declared cast is wrapped in an [`ImplicitCast`].

use quill_ast::*;
use quill_types::{Constant, TypeId};

use crate::error::{Origin, TypeError};
use crate::infer::{literal_constant, try_ty, Analyzer};

impl Analyzer<'_, '_> {
    /// Make `expr`, currently of type `from`, acceptable where `to` is
    /// required. Returns `to`, or `UNDETERMINED` after recording an error.
    pub(crate) fn reconcile(
        &mut self,
        expr: &mut Expr,
        from: TypeId,
        to: TypeId,
        origin: Origin,
    ) -> TypeId {
        if from == to {
            return to;
        }
        // A block's value is its last statement; rewrite that instead.
        if let Expr::Block(block) = expr {
            if !block.stmts.is_empty() {
                return self.reconcile_block(block, to, origin);
            }
        }
        let declared = self.special.casts().is_declared(from, to);
        if declared && from.is_literal() {
            return self.specialize_literal(expr, to, &origin);
        }
        if declared {
            tracing::trace!(from = %self.types.display(from), to = %self.types.display(to), "implicit cast");
            expr.wrap_in_cast(from, to);
            return to;
        }
        self.fail(TypeError::Mismatch {
            expected: to,
            found: from,
            origin,
            span: expr.span(),
        })
    }

    pub(crate) fn reconcile_block(&mut self, block: &mut Block, to: TypeId, origin: Origin) -> TypeId {
        let from = block.ty;
        if from == to {
            return to;
        }
        let span = block.span;
        let ty = match block.stmts.last_mut() {
            Some(tail) => self.reconcile(tail, from, to, origin),
            None => self.fail(TypeError::Mismatch {
                expected: to,
                found: from,
                origin,
                span,
            }),
        };
        if ty != TypeId::UNDETERMINED {
            block.ty = ty;
        }
        ty
    }

    /// Give a literal-kinded value whose context imposes no type the
    /// configured default for its kind.
    pub(crate) fn settle(&mut self, expr: &mut Expr, kind: TypeId) -> TypeId {
        let to = self.special.literal_default(kind);
        if to == TypeId::UNDETERMINED {
            return self.fail(TypeError::Unsupported {
                what: "literals without a default type",
                span: expr.span(),
            });
        }
        self.specialize_literal(expr, to, &Origin::Default)
    }

    /// [`settle`](Self::settle) applied to the value of a block that is
    /// discarded. Returns the block's resulting type.
    pub(crate) fn settle_tail(&mut self, block: &mut Block) -> TypeId {
        if !block.ty.is_literal() {
            return block.ty;
        }
        let kind = block.ty;
        if let Some(tail) = block.stmts.last_mut() {
            block.ty = try_ty!(self.settle(tail, kind));
        }
        block.ty
    }

    /// Relabel a literal-kinded subtree as `to`.
    pub(crate) fn specialize_literal(&mut self, expr: &mut Expr, to: TypeId, origin: &Origin) -> TypeId {
        // For `-lit` this is the negated value, checked against the
        // negative bound rather than the operand's own.
        let value = literal_constant(expr);
        match expr {
            Expr::Literal(lit) => self.specialize_leaf(lit, to, value, origin),
            Expr::Binary(node) if node.ty.is_literal() => {
                let entry = self
                    .special
                    .binary(&node.op)
                    .and_then(|table| table.get(&(to, to)))
                    .map(|entry| entry.ret);
                let Some(ret) = entry else {
                    return self.fail(TypeError::NoOperator {
                        op: node.op.clone(),
                        left: to,
                        right: to,
                        span: node.span,
                    });
                };
                let operand = Origin::Operand {
                    op: node.op.clone(),
                };
                try_ty!(self.specialize_literal(&mut node.lhs, to, &operand));
                try_ty!(self.specialize_literal(&mut node.rhs, to, &operand));
                node.left_ty = to;
                node.right_ty = to;
                node.ty = ret;
                ret
            }
            Expr::Unary(node) if node.ty.is_literal() => {
                let from = node.operand.ty();
                let casts = self.special.casts();
                let choice = self.special.unary(&node.op).and_then(|table| {
                    table
                        .iter()
                        .find(|(want, entry)| {
                            entry.ret == to
                                && !want.is_literal()
                                && (**want == from || casts.is_declared(from, **want))
                        })
                        .map(|(want, _)| *want)
                });
                let Some(want) = choice else {
                    return self.fail(TypeError::NoUnaryOperator {
                        op: node.op.clone(),
                        operand: to,
                        span: node.span,
                    });
                };
                let operand = Origin::Operand {
                    op: node.op.clone(),
                };
                match (node.operand.as_mut(), value) {
                    (Expr::Literal(lit), Some(value)) => {
                        try_ty!(self.specialize_leaf(lit, want, Some(value), &operand));
                    }
                    (inner, _) => {
                        try_ty!(self.specialize_literal(inner, want, &operand));
                    }
                }
                node.operand_ty = want;
                node.ty = to;
                to
            }
            Expr::Block(block) if block.ty.is_literal() && !block.stmts.is_empty() => {
                if let Some(tail) = block.stmts.last_mut() {
                    block.ty = try_ty!(self.specialize_literal(tail, to, origin));
                }
                block.ty
            }
            other => {
                let found = other.ty();
                let span = other.span();
                self.fail(TypeError::Mismatch {
                    expected: to,
                    found,
                    origin: origin.clone(),
                    span,
                })
            }
        }
    }

    /// Relabel one literal leaf as `to`, rejecting a `value` that `to`
    /// cannot represent.
    fn specialize_leaf(
        &mut self,
        lit: &mut Literal,
        to: TypeId,
        value: Option<Constant>,
        origin: &Origin,
    ) -> TypeId {
        let from = lit.ty();
        if from == to {
            return to;
        }
        if !from.is_literal() || !self.special.casts().is_declared(from, to) {
            return self.fail(TypeError::Mismatch {
                expected: to,
                found: from,
                origin: origin.clone(),
                span: lit.span,
            });
        }
        if let Some(value) = value.filter(|value| !to.can_hold(*value)) {
            return self.fail(TypeError::LiteralOutOfRange {
                value: display_constant(value),
                ty: to,
                span: lit.span,
            });
        }
        lit.assign_type(to);
        to
    }
}

fn display_constant(value: Constant) -> String {
    match value {
        Constant::Int {
            magnitude,
            negative: true,
        } => format!("-{magnitude}"),
        Constant::Int { magnitude, .. } => magnitude.to_string(),
        Constant::Float(value) => value.to_string(),
    }
}
