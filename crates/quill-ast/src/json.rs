//! JSON AST ingestion.
//!
//! The input describes functions whose expressions are flat operator
//! chains: a leading operand followed by `(op, operand)` pairs. Chains are
//! shaped into binary trees using the precedence table of
//! [`SpecialFunctions`], splitting at the loosest operator: the last
//! occurrence for left-associative operators, the first for assignment.

use std::fmt;

use serde::Deserialize;

use quill_common::Span;
use quill_types::defaults::ASSIGN;
use quill_types::{SpecialFunctions, TypeId};

use crate::ast::*;

#[derive(Debug)]
pub enum IngestError {
    Json(serde_json::Error),
    /// An operator with no registered precedence.
    UnknownOperator { op: String, span: Span },
    /// An `if` in value position without an `else`.
    MissingElse { span: Span },
    EmptyChain { span: Span },
}

impl IngestError {
    /// Where in the source the problem is, when the tree recorded it.
    pub fn span(&self) -> Option<Span> {
        match self {
            IngestError::Json(_) => None,
            IngestError::UnknownOperator { span, .. }
            | IngestError::MissingElse { span }
            | IngestError::EmptyChain { span } => Some(*span),
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Json(err) => write!(f, "malformed AST JSON: {err}"),
            IngestError::UnknownOperator { op, .. } => write!(f, "unknown operator `{op}`"),
            IngestError::MissingElse { .. } => {
                write!(f, "`if` used as a value needs an `else` branch")
            }
            IngestError::EmptyChain { .. } => write!(f, "empty expression"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Json(err)
    }
}

// ── Raw JSON shapes ─────────────────────────────────────────────────

type RawSpan = Option<Span>;

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    functions: Vec<RawFunction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFunction {
    func_name: String,
    #[serde(default)]
    func_params: Vec<RawParam>,
    #[serde(default)]
    func_return: Option<RawType>,
    #[serde(default)]
    func_body: Vec<RawStmt>,
    #[serde(default)]
    span: RawSpan,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParam {
    var_name: String,
    var_type: RawType,
    #[serde(default)]
    span: RawSpan,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawType {
    Named(String),
    Array { array: Box<RawType>, length: u64 },
    Tuple { tuple: Vec<RawType> },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum RawStmt {
    Expr {
        #[serde(rename = "return", default)]
        is_return: bool,
        expr: RawExpr,
        #[serde(default)]
        span: RawSpan,
    },
    Let(RawLet),
    Return {
        #[serde(default)]
        span: RawSpan,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLet {
    var_name: String,
    #[serde(default)]
    var_type: Option<RawType>,
    #[serde(default)]
    init: Option<RawExpr>,
    #[serde(default)]
    span: RawSpan,
}

#[derive(Debug, Deserialize)]
struct RawExpr {
    lhs: RawPrimary,
    #[serde(default)]
    rhs: Vec<RawOperand>,
    #[serde(default)]
    span: RawSpan,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperand {
    op: String,
    rhs_operand: RawPrimary,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "val", rename_all = "camelCase")]
enum RawPrimary {
    Id(String),
    Parens(Box<RawExpr>),
    Call(RawCall),
    Literal(RawLiteral),
    If(Box<RawIf>),
    Loop(Box<RawLoop>),
    Block(Vec<RawStmt>),
    Unary(Box<RawUnary>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCall {
    callable: String,
    #[serde(default)]
    call_params: Vec<RawExpr>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "tag", content = "contents")]
enum RawLiteral {
    IntegerLiteral(u64),
    FloatLiteral(f64),
    CharLiteral(char),
    StringLiteral(String),
    BoolLiteral(bool),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIf {
    #[serde(rename = "let", default)]
    init: Option<RawLet>,
    cond: RawExpr,
    then: Vec<RawStmt>,
    #[serde(rename = "else", default)]
    else_branch: Option<Vec<RawStmt>>,
    #[serde(default)]
    is_expr: bool,
}

#[derive(Debug, Deserialize)]
struct RawLoop {
    #[serde(rename = "let", default)]
    init: Option<RawLet>,
    #[serde(default)]
    cond: Option<RawExpr>,
    #[serde(default)]
    post: Option<RawExpr>,
    body: Vec<RawStmt>,
}

#[derive(Debug, Deserialize)]
struct RawUnary {
    op: String,
    operand: RawPrimary,
}

// ── Tree construction ───────────────────────────────────────────────

/// Parse a JSON AST and shape its operator chains with the precedence
/// registered in `special`.
pub fn parse_file(json: &str, special: &SpecialFunctions) -> Result<File, IngestError> {
    let raw: RawFile = serde_json::from_str(json)?;
    let builder = TreeBuilder { special };
    let functions = raw
        .functions
        .into_iter()
        .map(|f| builder.function(f))
        .collect::<Result<_, _>>()?;
    Ok(File { functions })
}

struct TreeBuilder<'a> {
    special: &'a SpecialFunctions,
}

fn span(raw: RawSpan) -> Span {
    raw.unwrap_or_default()
}

impl TreeBuilder<'_> {
    fn function(&self, raw: RawFunction) -> Result<Function, IngestError> {
        let params = raw
            .func_params
            .into_iter()
            .map(|p| Param {
                name: p.var_name,
                ty: type_expr(p.var_type),
                span: span(p.span),
            })
            .collect();
        Ok(Function {
            name: raw.func_name,
            params,
            return_type: raw
                .func_return
                .map_or_else(|| TypeExpr::named(""), type_expr),
            body: self.block(raw.func_body)?,
            span: span(raw.span),
            signature: TypeId::UNSET,
        })
    }

    fn block(&self, stmts: Vec<RawStmt>) -> Result<Block, IngestError> {
        let stmts = stmts
            .into_iter()
            .map(|s| self.stmt(s))
            .collect::<Result<Vec<_>, _>>()?;
        let block_span = match (stmts.first(), stmts.last()) {
            (Some(first), Some(last)) => first.span().cover(last.span()),
            _ => Span::default(),
        };
        Ok(Block::new(stmts, block_span))
    }

    fn stmt(&self, raw: RawStmt) -> Result<Expr, IngestError> {
        match raw {
            RawStmt::Let(raw_let) => Ok(Expr::Let(self.let_stmt(raw_let)?)),
            RawStmt::Return { span: s } => Ok(Expr::Return(Return {
                value: None,
                span: span(s),
                ty: TypeId::UNSET,
            })),
            RawStmt::Expr {
                is_return: true,
                expr,
                span: s,
            } => {
                let value = self.expr(expr)?;
                let stmt_span = if s.is_some() { span(s) } else { value.span() };
                Ok(Expr::Return(Return {
                    value: Some(Box::new(value)),
                    span: stmt_span,
                    ty: TypeId::UNSET,
                }))
            }
            RawStmt::Expr {
                is_return: false,
                expr,
                ..
            } => {
                let RawExpr { lhs, rhs, span: s } = expr;
                match lhs {
                    // A lone `if` statement has no merged value unless asked.
                    RawPrimary::If(raw_if) if rhs.is_empty() && !raw_if.is_expr => {
                        self.if_expr(*raw_if, IfForm::Statement, span(s))
                    }
                    lhs => self.chain(lhs, rhs, span(s)),
                }
            }
        }
    }

    fn let_stmt(&self, raw: RawLet) -> Result<Let, IngestError> {
        let init = raw.init.map(|e| self.expr(e)).transpose()?;
        Ok(Let::new(
            raw.var_name,
            raw.var_type.map(type_expr),
            init,
            span(raw.span),
        ))
    }

    fn expr(&self, raw: RawExpr) -> Result<Expr, IngestError> {
        self.chain(raw.lhs, raw.rhs, span(raw.span))
    }

    fn chain(
        &self,
        lhs: RawPrimary,
        rhs: Vec<RawOperand>,
        chain_span: Span,
    ) -> Result<Expr, IngestError> {
        let mut operands = Vec::with_capacity(rhs.len() + 1);
        let mut ops = Vec::with_capacity(rhs.len());
        operands.push(self.primary(lhs, chain_span)?);
        for operand in rhs {
            ops.push(operand.op);
            operands.push(self.primary(operand.rhs_operand, chain_span)?);
        }
        self.shape(operands, ops, chain_span)
    }

    /// Split at the loosest-binding operator and recurse on both halves.
    fn shape(
        &self,
        mut operands: Vec<Expr>,
        mut ops: Vec<String>,
        chain_span: Span,
    ) -> Result<Expr, IngestError> {
        if ops.is_empty() {
            return operands
                .pop()
                .ok_or(IngestError::EmptyChain { span: chain_span });
        }
        let mut split = 0;
        let mut loosest = u32::MAX;
        for (i, op) in ops.iter().enumerate() {
            let rank = self
                .special
                .precedence(op)
                .ok_or_else(|| IngestError::UnknownOperator {
                    op: op.clone(),
                    span: chain_span,
                })?;
            let right_assoc = op == ASSIGN;
            if rank < loosest || (rank == loosest && !right_assoc) {
                loosest = rank;
                split = i;
            }
        }
        let right_ops = ops.split_off(split + 1);
        let right_operands = operands.split_off(split + 1);
        let op = ops.pop().ok_or(IngestError::EmptyChain { span: chain_span })?;
        let lhs = self.shape(operands, ops, chain_span)?;
        let rhs = self.shape(right_operands, right_ops, chain_span)?;
        let node_span = match lhs.span().cover(rhs.span()) {
            covered if covered.is_known() => covered,
            _ => chain_span,
        };
        Ok(Expr::Binary(Binary::new(op, lhs, rhs, node_span)))
    }

    fn primary(&self, raw: RawPrimary, chain_span: Span) -> Result<Expr, IngestError> {
        Ok(match raw {
            RawPrimary::Id(name) => Expr::Ident(Ident::new(name, chain_span)),
            RawPrimary::Parens(inner) => self.expr(*inner)?,
            RawPrimary::Call(call) => {
                let args = call
                    .call_params
                    .into_iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<_, _>>()?;
                Expr::Call(Call::new(call.callable, args, chain_span))
            }
            RawPrimary::Literal(lit) => {
                let value = match lit {
                    RawLiteral::IntegerLiteral(v) => LiteralValue::Int(v),
                    RawLiteral::FloatLiteral(v) => LiteralValue::Float(v),
                    RawLiteral::CharLiteral(c) => LiteralValue::Char(c),
                    RawLiteral::StringLiteral(s) => LiteralValue::Str(s),
                    RawLiteral::BoolLiteral(b) => LiteralValue::Bool(b),
                };
                Expr::Literal(Literal::new(value, chain_span))
            }
            RawPrimary::If(raw_if) => self.if_expr(*raw_if, IfForm::Expression, chain_span)?,
            RawPrimary::Loop(raw_loop) => {
                let raw_loop = *raw_loop;
                Expr::Loop(Loop {
                    init: raw_loop
                        .init
                        .map(|l| self.let_stmt(l).map(Box::new))
                        .transpose()?,
                    cond: raw_loop
                        .cond
                        .map(|c| self.expr(c).map(Box::new))
                        .transpose()?,
                    post: raw_loop
                        .post
                        .map(|p| self.expr(p).map(Box::new))
                        .transpose()?,
                    body: self.block(raw_loop.body)?,
                    span: chain_span,
                    ty: TypeId::UNSET,
                })
            }
            RawPrimary::Block(stmts) => Expr::Block(self.block(stmts)?),
            RawPrimary::Unary(unary) => {
                let unary = *unary;
                let operand = self.primary(unary.operand, chain_span)?;
                Expr::Unary(Unary::new(unary.op, operand, chain_span))
            }
        })
    }

    fn if_expr(&self, raw: RawIf, form: IfForm, if_span: Span) -> Result<Expr, IngestError> {
        if form == IfForm::Expression && raw.else_branch.is_none() {
            return Err(IngestError::MissingElse { span: if_span });
        }
        Ok(Expr::If(If {
            init: raw
                .init
                .map(|l| self.let_stmt(l).map(Box::new))
                .transpose()?,
            cond: Box::new(self.expr(raw.cond)?),
            then_branch: self.block(raw.then)?,
            else_branch: raw.else_branch.map(|b| self.block(b)).transpose()?,
            form,
            span: if_span,
            ty: TypeId::UNSET,
        }))
    }
}

fn type_expr(raw: RawType) -> TypeExpr {
    match raw {
        RawType::Named(name) => TypeExpr::Named(name),
        RawType::Array { array, length } => TypeExpr::Array(Box::new(type_expr(*array)), length),
        RawType::Tuple { tuple } => TypeExpr::Tuple(tuple.into_iter().map(type_expr).collect()),
    }
}
