//! Indented text rendering of an analyzed tree.
//!
//! One node per line, children indented two spaces, each node followed by
//! its assigned type. Used by `quillc check --dump` and by snapshot tests.

use std::fmt::Write;

use quill_types::{TypeId, TypeRegistry};

use crate::ast::*;

pub fn dump(file: &File, types: &TypeRegistry<'_>) -> String {
    let mut printer = Printer {
        out: String::new(),
        types,
    };
    for function in &file.functions {
        printer.function(function);
    }
    printer.out
}

struct Printer<'a, 'ctx> {
    out: String,
    types: &'a TypeRegistry<'ctx>,
}

impl Printer<'_, '_> {
    fn line(&mut self, depth: usize, text: std::fmt::Arguments<'_>) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
        let _ = self.out.write_fmt(text);
        self.out.push('\n');
    }

    fn ty(&self, id: TypeId) -> String {
        self.types.display(id)
    }

    fn function(&mut self, function: &Function) {
        let params = function
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect::<Vec<_>>()
            .join(", ");
        self.line(
            0,
            format_args!(
                "fn {}({params}) -> {}",
                function.name, function.return_type
            ),
        );
        self.block(&function.body, 1, "block");
    }

    fn block(&mut self, block: &Block, depth: usize, label: &str) {
        let ty = self.ty(block.ty);
        self.line(depth, format_args!("{label}: {ty}"));
        for stmt in &block.stmts {
            self.expr(stmt, depth + 1);
        }
    }

    fn let_stmt(&mut self, node: &Let, depth: usize) {
        let ty = self.ty(node.var_ty);
        self.line(depth, format_args!("let {}: {ty}", node.name));
        if let Some(init) = &node.init {
            self.expr(init, depth + 1);
        }
    }

    fn expr(&mut self, expr: &Expr, depth: usize) {
        match expr {
            Expr::Return(node) => {
                let ty = self.ty(node.ty);
                self.line(depth, format_args!("return: {ty}"));
                if let Some(value) = &node.value {
                    self.expr(value, depth + 1);
                }
            }
            Expr::Let(node) => self.let_stmt(node, depth),
            Expr::Binary(node) => {
                let (l, r, ty) = (self.ty(node.left_ty), self.ty(node.right_ty), self.ty(node.ty));
                self.line(depth, format_args!("binary {} ({l}, {r}): {ty}", node.op));
                self.expr(&node.lhs, depth + 1);
                self.expr(&node.rhs, depth + 1);
            }
            Expr::Unary(node) => {
                let (operand, ty) = (self.ty(node.operand_ty), self.ty(node.ty));
                self.line(depth, format_args!("unary {} ({operand}): {ty}", node.op));
                self.expr(&node.operand, depth + 1);
            }
            Expr::Call(node) => {
                let ty = self.ty(node.ty);
                self.line(depth, format_args!("call {}: {ty}", node.callee));
                for arg in &node.args {
                    self.expr(arg, depth + 1);
                }
            }
            Expr::If(node) => {
                let ty = self.ty(node.ty);
                let kind = match node.form {
                    IfForm::Statement => "if",
                    IfForm::Expression => "if-expr",
                };
                self.line(depth, format_args!("{kind}: {ty}"));
                if let Some(init) = &node.init {
                    self.let_stmt(init, depth + 1);
                }
                self.expr(&node.cond, depth + 1);
                self.block(&node.then_branch, depth + 1, "then");
                if let Some(else_branch) = &node.else_branch {
                    self.block(else_branch, depth + 1, "else");
                }
            }
            Expr::Loop(node) => {
                let ty = self.ty(node.ty);
                self.line(depth, format_args!("loop: {ty}"));
                if let Some(init) = &node.init {
                    self.let_stmt(init, depth + 1);
                }
                if let Some(cond) = &node.cond {
                    self.expr(cond, depth + 1);
                }
                if let Some(post) = &node.post {
                    self.line(depth + 1, format_args!("post"));
                    self.expr(post, depth + 2);
                }
                self.block(&node.body, depth + 1, "body");
            }
            Expr::Block(node) => self.block(node, depth, "block"),
            Expr::Ident(node) => {
                let ty = self.ty(node.ty);
                self.line(depth, format_args!("ident {}: {ty}", node.name));
            }
            Expr::Literal(node) => {
                let ty = self.ty(node.ty());
                let value = match &node.value {
                    LiteralValue::Int(v) => v.to_string(),
                    LiteralValue::Float(v) => format!("{v:?}"),
                    LiteralValue::Char(c) => format!("{c:?}"),
                    LiteralValue::Str(s) => format!("{s:?}"),
                    LiteralValue::Bool(b) => b.to_string(),
                };
                self.line(depth, format_args!("literal {value}: {ty}"));
            }
            Expr::Cast(node) => {
                let (from, to) = (self.ty(node.from), self.ty(node.to));
                self.line(depth, format_args!("cast {from} -> {to}"));
                self.expr(&node.expr, depth + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_common::Span;

    #[test]
    fn unanalyzed_tree_shows_unset() {
        let file = File {
            functions: vec![Function {
                name: "one".to_string(),
                params: vec![],
                return_type: TypeExpr::named("i32"),
                body: Block::new(vec![Expr::int(1)], Span::default()),
                span: Span::default(),
                signature: TypeId::UNSET,
            }],
        };
        let text = dump(&file, &TypeRegistry::new());
        insta::assert_snapshot!(text, @r"
        fn one() -> i32
          block: {unset}
            literal 1: {unset}
        ");
    }
}
