//! Node definitions.
//!
//! Every child slot owns its subtree, so the analyzer can move a child out,
//! wrap it in an [`ImplicitCast`], and put the wrapper back
//! ([`Expr::wrap_in_cast`]). Type fields start as [`TypeId::UNSET`] and are
//! filled in by the analyzer.

use std::fmt;

use quill_common::Span;
use quill_types::TypeId;

#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub functions: Vec<Function>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeExpr,
    pub body: Block,
    pub span: Span,
    /// Interned function type, set by the analyzer.
    pub signature: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

/// A type as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// A name resolved through the registry's aliases. The empty name
    /// means "no type given" and resolves to `void`.
    Named(String),
    Array(Box<TypeExpr>, u64),
    Tuple(Vec<TypeExpr>),
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named(name.into())
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Named(name) if name.is_empty() => write!(f, "void"),
            TypeExpr::Named(name) => write!(f, "{name}"),
            TypeExpr::Array(elem, len) => write!(f, "[{elem}; {len}]"),
            TypeExpr::Tuple(members) => {
                write!(f, "(")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{member}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A statement sequence. Its value is the value of its last statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Expr>,
    pub span: Span,
    pub ty: TypeId,
}

impl Block {
    pub fn new(stmts: Vec<Expr>, span: Span) -> Self {
        Block {
            stmts,
            span,
            ty: TypeId::UNSET,
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Block::new(Vec::new(), Span::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Return(Return),
    Let(Let),
    Binary(Binary),
    Unary(Unary),
    Call(Call),
    If(If),
    Loop(Loop),
    Block(Block),
    Ident(Ident),
    Literal(Literal),
    Cast(ImplicitCast),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Return {
    pub value: Option<Box<Expr>>,
    pub span: Span,
    pub ty: TypeId,
}

/// `let name [: ty] [= init]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Let {
    pub name: String,
    pub declared: Option<TypeExpr>,
    pub init: Option<Box<Expr>>,
    pub span: Span,
    /// The variable's final type.
    pub var_ty: TypeId,
}

impl Let {
    pub fn new(
        name: impl Into<String>,
        declared: Option<TypeExpr>,
        init: Option<Expr>,
        span: Span,
    ) -> Self {
        Let {
            name: name.into(),
            declared,
            init: init.map(Box::new),
            span,
            var_ty: TypeId::UNSET,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub op: String,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
    pub span: Span,
    /// Operand types the operator was resolved for; the key the code
    /// generator looks the emitter up with.
    pub left_ty: TypeId,
    pub right_ty: TypeId,
    pub ty: TypeId,
}

impl Binary {
    pub fn new(op: impl Into<String>, lhs: Expr, rhs: Expr, span: Span) -> Self {
        Binary {
            op: op.into(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
            left_ty: TypeId::UNSET,
            right_ty: TypeId::UNSET,
            ty: TypeId::UNSET,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unary {
    pub op: String,
    pub operand: Box<Expr>,
    pub span: Span,
    pub operand_ty: TypeId,
    pub ty: TypeId,
}

impl Unary {
    pub fn new(op: impl Into<String>, operand: Expr, span: Span) -> Self {
        Unary {
            op: op.into(),
            operand: Box::new(operand),
            span,
            operand_ty: TypeId::UNSET,
            ty: TypeId::UNSET,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: String,
    pub args: Vec<Expr>,
    pub span: Span,
    pub ty: TypeId,
}

impl Call {
    pub fn new(callee: impl Into<String>, args: Vec<Expr>, span: Span) -> Self {
        Call {
            callee: callee.into(),
            args,
            span,
            ty: TypeId::UNSET,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfForm {
    /// No merged value; the else arm is optional.
    Statement,
    /// Both arms required; their values merge into the if's value.
    Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    /// Binding scoped to the whole `if`, evaluated before the condition.
    pub init: Option<Box<Let>>,
    pub cond: Box<Expr>,
    pub then_branch: Block,
    pub else_branch: Option<Block>,
    pub form: IfForm,
    pub span: Span,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub init: Option<Box<Let>>,
    pub cond: Option<Box<Expr>>,
    /// Evaluated after each pass through the body.
    pub post: Option<Box<Expr>>,
    pub body: Block,
    pub span: Span,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
    pub ty: TypeId,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Ident {
            name: name.into(),
            span,
            ty: TypeId::UNSET,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(u64),
    Float(f64),
    Char(char),
    Str(String),
    Bool(bool),
}

/// A literal leaf.
///
/// Numeric literals carry a literal kind until context or defaulting fixes
/// their type, and that type is then overwritten in place rather than the
/// literal being wrapped in a cast.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: LiteralValue,
    pub span: Span,
    ty: TypeId,
}

impl Literal {
    pub fn new(value: LiteralValue, span: Span) -> Self {
        Literal {
            value,
            span,
            ty: TypeId::UNSET,
        }
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    /// Overwrite the literal's type. Reserved for the analyzer.
    pub fn assign_type(&mut self, ty: TypeId) {
        self.ty = ty;
    }
}

/// A conversion the analyzer inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct ImplicitCast {
    pub from: TypeId,
    pub to: TypeId,
    pub expr: Box<Expr>,
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Return(n) => n.span,
            Expr::Let(n) => n.span,
            Expr::Binary(n) => n.span,
            Expr::Unary(n) => n.span,
            Expr::Call(n) => n.span,
            Expr::If(n) => n.span,
            Expr::Loop(n) => n.span,
            Expr::Block(n) => n.span,
            Expr::Ident(n) => n.span,
            Expr::Literal(n) => n.span,
            Expr::Cast(n) => n.expr.span(),
        }
    }

    /// The type the analyzer assigned. `let` statements are `void`.
    pub fn ty(&self) -> TypeId {
        match self {
            Expr::Return(n) => n.ty,
            Expr::Let(n) if n.var_ty == TypeId::UNSET => TypeId::UNSET,
            Expr::Let(_) => TypeId::VOID,
            Expr::Binary(n) => n.ty,
            Expr::Unary(n) => n.ty,
            Expr::Call(n) => n.ty,
            Expr::If(n) => n.ty,
            Expr::Loop(n) => n.ty,
            Expr::Block(n) => n.ty,
            Expr::Ident(n) => n.ty,
            Expr::Literal(n) => n.ty(),
            Expr::Cast(n) => n.to,
        }
    }

    /// Replace `self` with an implicit cast wrapping the old value.
    pub fn wrap_in_cast(&mut self, from: TypeId, to: TypeId) {
        let inner = std::mem::take(self);
        *self = Expr::Cast(ImplicitCast {
            from,
            to,
            expr: Box::new(inner),
        });
    }

    pub fn int(value: u64) -> Expr {
        Expr::Literal(Literal::new(LiteralValue::Int(value), Span::default()))
    }

    pub fn float(value: f64) -> Expr {
        Expr::Literal(Literal::new(LiteralValue::Float(value), Span::default()))
    }

    pub fn bool(value: bool) -> Expr {
        Expr::Literal(Literal::new(LiteralValue::Bool(value), Span::default()))
    }

    pub fn ident(name: &str) -> Expr {
        Expr::Ident(Ident::new(name, Span::default()))
    }

    pub fn binary(op: &str, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(Binary::new(op, lhs, rhs, Span::default()))
    }

    pub fn call(callee: &str, args: Vec<Expr>) -> Expr {
        Expr::Call(Call::new(callee, args, Span::default()))
    }
}

/// An empty block; only ever observed transiently while a node is being
/// wrapped.
impl Default for Expr {
    fn default() -> Self {
        Expr::Block(Block::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_in_cast_moves_the_child() {
        let mut slot = Expr::ident("x");
        slot.wrap_in_cast(TypeId::I8, TypeId::I32);
        let Expr::Cast(cast) = &slot else {
            panic!("expected a cast, got {slot:?}");
        };
        assert_eq!(cast.from, TypeId::I8);
        assert_eq!(*cast.expr, Expr::ident("x"));
        assert_eq!(slot.ty(), TypeId::I32);
    }

    #[test]
    fn literal_type_starts_unset() {
        let mut lit = Literal::new(LiteralValue::Int(3), Span::default());
        assert_eq!(lit.ty(), TypeId::UNSET);
        lit.assign_type(TypeId::U_LITERAL);
        assert_eq!(lit.ty(), TypeId::U_LITERAL);
    }

    #[test]
    fn type_expr_display() {
        let ty = TypeExpr::Tuple(vec![
            TypeExpr::named("i32"),
            TypeExpr::Array(Box::new(TypeExpr::named("u8")), 4),
        ]);
        assert_eq!(ty.to_string(), "(i32, [u8; 4])");
        assert_eq!(TypeExpr::named("").to_string(), "void");
    }
}
