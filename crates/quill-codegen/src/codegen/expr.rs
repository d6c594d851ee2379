//! Expression and statement lowering.
//!
//! Every construct yields `Some` value or, for statements and `void`
//! calls, `None`. Control flow leaves the builder positioned in the block
//! where execution continues.

use inkwell::basic_block::BasicBlock;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicMetadataValueEnum, BasicValue, BasicValueEnum, IntValue};

use quill_ast::*;
use quill_types::defaults::ASSIGN;
use quill_types::TypeId;

use super::{CodeGen, Slot};
use crate::error::CodegenError;

type Lowered<'ctx> = Result<Option<BasicValueEnum<'ctx>>, CodegenError>;

impl<'ctx> CodeGen<'_, 'ctx> {
    pub(crate) fn block(&mut self, block: &Block) -> Lowered<'ctx> {
        self.slots.push();
        let result = self.block_stmts(block);
        self.slots.pop();
        result
    }

    fn block_stmts(&mut self, block: &Block) -> Lowered<'ctx> {
        let mut value = None;
        for stmt in &block.stmts {
            value = self.expr(stmt)?;
        }
        Ok(value)
    }

    pub(crate) fn expr(&mut self, expr: &Expr) -> Lowered<'ctx> {
        match expr {
            Expr::Return(node) => self.return_stmt(node),
            Expr::Let(node) => self.let_stmt(node),
            Expr::Binary(node) => self.binary(node),
            Expr::Unary(node) => self.unary(node),
            Expr::Call(node) => self.call(node),
            Expr::If(node) => {
                self.slots.push();
                let result = self.if_expr(node);
                self.slots.pop();
                result
            }
            Expr::Loop(node) => {
                self.slots.push();
                let result = self.loop_expr(node);
                self.slots.pop();
                result
            }
            Expr::Block(node) => self.block(node),
            Expr::Ident(node) => {
                let slot = self.slot(&node.name)?;
                let value = self.builder.build_load(slot.ty, slot.ptr, &node.name)?;
                self.loads.push((value, slot.ptr));
                Ok(Some(value))
            }
            Expr::Literal(node) => self.literal(node).map(Some),
            Expr::Cast(node) => {
                let value = self.value(&node.expr)?;
                let target = self.basic_type(node.to)?;
                let emit = self.special.casts().get(node.from, node.to).ok_or_else(|| {
                    CodegenError::Internal(format!(
                        "no cast from {} to {}",
                        self.types.display(node.from),
                        self.types.display(node.to)
                    ))
                })?;
                Ok(Some(emit(&self.builder, value, target)?))
            }
        }
    }

    /// Lower an expression that must produce a value.
    fn value(&mut self, expr: &Expr) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        self.expr(expr)?.ok_or_else(|| {
            CodegenError::Internal(format!(
                "expected a value of type {}",
                self.types.display(expr.ty())
            ))
        })
    }

    fn slot(&self, name: &str) -> Result<Slot<'ctx>, CodegenError> {
        self.slots
            .lookup(name)
            .copied()
            .ok_or_else(|| CodegenError::Unresolved {
                name: name.to_string(),
            })
    }

    /// The slot `value` was loaded from, if it is the result of a load.
    fn load_source(&self, value: BasicValueEnum<'ctx>) -> Option<Slot<'ctx>> {
        self.loads
            .iter()
            .rev()
            .find(|(loaded, _)| *loaded == value)
            .map(|(_, ptr)| Slot {
                ptr: *ptr,
                ty: value.get_type(),
            })
    }

    // ── Statements ───────────────────────────────────────────────────

    fn return_stmt(&mut self, node: &Return) -> Lowered<'ctx> {
        match node.value.as_deref() {
            Some(value) => {
                let value = self.value(value)?;
                self.builder.build_return(Some(&value))?;
            }
            None => {
                self.builder.build_return(None)?;
            }
        }
        self.start_dead_block()?;
        Ok(None)
    }

    pub(crate) fn let_stmt(&mut self, node: &Let) -> Lowered<'ctx> {
        let ty = self.basic_type(node.var_ty)?;
        let ptr = self.build_entry_alloca(ty, &node.name)?;
        if let Some(init) = node.init.as_deref() {
            let value = self.value(init)?;
            self.builder.build_store(ptr, value)?;
        }
        // Bound after the initializer, which still sees any outer binding.
        self.slots.insert(node.name.clone(), Slot { ptr, ty });
        Ok(None)
    }

    // ── Operators and calls ──────────────────────────────────────────

    fn binary(&mut self, node: &Binary) -> Lowered<'ctx> {
        if node.op == ASSIGN {
            let target = self.value(&node.lhs)?;
            let slot = self
                .load_source(target)
                .ok_or(CodegenError::NotAddressable)?;
            let value = self.value(&node.rhs)?;
            self.builder.build_store(slot.ptr, value)?;
            return Ok(Some(value));
        }

        let lhs = self.value(&node.lhs)?;
        let rhs = self.value(&node.rhs)?;
        let entry = self
            .special
            .binary(&node.op)
            .and_then(|table| table.get(&(node.left_ty, node.right_ty)));
        let emit = entry.and_then(|entry| entry.emitter.as_ref()).ok_or_else(|| {
            CodegenError::Internal(format!(
                "no emitter for `{}` on ({}, {})",
                node.op,
                self.types.display(node.left_ty),
                self.types.display(node.right_ty)
            ))
        })?;
        Ok(Some(emit(&self.builder, lhs, rhs)?))
    }

    fn unary(&mut self, node: &Unary) -> Lowered<'ctx> {
        let operand = self.value(&node.operand)?;
        let emit = self
            .special
            .unary(&node.op)
            .and_then(|table| table.get(&node.operand_ty))
            .and_then(|entry| entry.emitter.as_ref())
            .ok_or_else(|| {
                CodegenError::Internal(format!(
                    "no emitter for unary `{}` on {}",
                    node.op,
                    self.types.display(node.operand_ty)
                ))
            })?;
        Ok(Some(emit(&self.builder, operand)?))
    }

    fn call(&mut self, node: &Call) -> Lowered<'ctx> {
        let callee =
            self.module
                .get_function(&node.callee)
                .ok_or_else(|| CodegenError::Unresolved {
                    name: node.callee.clone(),
                })?;
        let mut args: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(node.args.len());
        for arg in &node.args {
            args.push(self.value(arg)?.into());
        }
        // LLVM refuses to name a value of type void.
        let name = if callee.get_type().get_return_type().is_some() {
            "call"
        } else {
            ""
        };
        let site = self.builder.build_call(callee, &args, name)?;
        Ok(site.try_as_basic_value().basic())
    }

    fn literal(&mut self, node: &Literal) -> Result<BasicValueEnum<'ctx>, CodegenError> {
        if let LiteralValue::Str(_) = node.value {
            return Err(CodegenError::Unimplemented("string literals"));
        }
        let ty = node.ty();
        if ty.is_literal() || !ty.is_concrete() {
            return Err(CodegenError::Internal(format!(
                "literal left as {}",
                self.types.display(ty)
            )));
        }
        let value = match (&node.value, self.basic_type(ty)?) {
            (LiteralValue::Int(v), BasicTypeEnum::IntType(int)) => int.const_int(*v, false).into(),
            (LiteralValue::Int(v), BasicTypeEnum::FloatType(float)) => {
                float.const_float(*v as f64).into()
            }
            (LiteralValue::Float(v), BasicTypeEnum::FloatType(float)) => {
                float.const_float(*v).into()
            }
            (LiteralValue::Bool(b), BasicTypeEnum::IntType(int)) => {
                int.const_int(u64::from(*b), false).into()
            }
            (LiteralValue::Char(c), BasicTypeEnum::IntType(int)) => {
                int.const_int(u64::from(*c), false).into()
            }
            (value, llvm) => {
                return Err(CodegenError::Internal(format!(
                    "cannot materialize {value:?} as {llvm:?}"
                )))
            }
        };
        Ok(value)
    }

    // ── Control flow ─────────────────────────────────────────────────

    /// Branch to `target` from the current block and return that block,
    /// or `None` when control never gets here: the block is already
    /// terminated, or it is the dead continuation of a `return`.
    fn exit_to(&mut self, target: BasicBlock<'ctx>) -> Result<Option<BasicBlock<'ctx>>, CodegenError> {
        let from = self.insert_block()?;
        if from.get_terminator().is_some() {
            return Ok(None);
        }
        if self.dead_blocks.contains(&from) {
            self.builder.build_unreachable()?;
            return Ok(None);
        }
        self.builder.build_unconditional_branch(target)?;
        Ok(Some(from))
    }

    fn condition(&mut self, cond: &Expr) -> Result<IntValue<'ctx>, CodegenError> {
        match self.value(cond)? {
            BasicValueEnum::IntValue(value) => Ok(value),
            other => Err(CodegenError::Internal(format!(
                "condition lowered to {:?}",
                other.get_type()
            ))),
        }
    }

    fn if_expr(&mut self, node: &If) -> Lowered<'ctx> {
        if let Some(init) = node.init.as_deref() {
            self.let_stmt(init)?;
        }
        let cond = self.condition(&node.cond)?;

        let function = self.current_function()?;
        let then_bb = self.context.append_basic_block(function, "then");
        let else_bb = match node.else_branch {
            Some(_) => Some(self.context.append_basic_block(function, "else")),
            None => None,
        };
        let merge_bb = self.context.append_basic_block(function, "merge");
        self.builder
            .build_conditional_branch(cond, then_bb, else_bb.unwrap_or(merge_bb))?;

        self.builder.position_at_end(then_bb);
        let then_val = self.block(&node.then_branch)?;
        let mut incoming = Vec::with_capacity(2);
        if let Some(exit) = self.exit_to(merge_bb)? {
            incoming.push((then_val, exit));
        }

        if let (Some(branch), Some(else_bb)) = (&node.else_branch, else_bb) {
            self.builder.position_at_end(else_bb);
            let else_val = self.block(branch)?;
            if let Some(exit) = self.exit_to(merge_bb)? {
                incoming.push((else_val, exit));
            }
        }

        self.builder.position_at_end(merge_bb);
        if else_bb.is_some() && incoming.is_empty() {
            // Both arms returned.
            self.dead_blocks.push(merge_bb);
            return Ok(None);
        }
        if node.form == IfForm::Statement || node.ty == TypeId::VOID {
            return Ok(None);
        }

        let mut arms = Vec::with_capacity(incoming.len());
        for (value, block) in incoming {
            let value = value.ok_or_else(|| {
                CodegenError::Internal("an if arm reaching the merge has no value".to_string())
            })?;
            arms.push((value, block));
        }
        let ty = self.basic_type(node.ty)?;
        let phi = self.builder.build_phi(ty, "iftmp")?;
        let refs: Vec<(&dyn BasicValue<'ctx>, BasicBlock<'ctx>)> = arms
            .iter()
            .map(|(value, block)| (value as &dyn BasicValue<'ctx>, *block))
            .collect();
        phi.add_incoming(&refs);
        Ok(Some(phi.as_basic_value()))
    }

    /// A loop's value is the value its body produced on the last pass,
    /// kept in a slot so it survives the back edge. A loop whose body never
    /// runs yields zero.
    fn loop_expr(&mut self, node: &Loop) -> Lowered<'ctx> {
        if let Some(init) = node.init.as_deref() {
            self.let_stmt(init)?;
        }
        let result = if node.ty == TypeId::VOID {
            None
        } else {
            let ty = self.basic_type(node.ty)?;
            let ptr = self.build_entry_alloca(ty, "loop.result")?;
            self.builder.build_store(ptr, zero_value(ty)?)?;
            Some(Slot { ptr, ty })
        };

        let function = self.current_function()?;
        let loop_bb = self.context.append_basic_block(function, "loop");
        let after_bb = self.context.append_basic_block(function, "after");
        self.branch_on_condition(node.cond.as_deref(), loop_bb, after_bb)?;

        self.builder.position_at_end(loop_bb);
        let value = self.block(&node.body)?;
        if self.is_terminated()? {
            // The body ended in a branch of its own.
        } else if self.in_dead_block()? {
            self.builder.build_unreachable()?;
        } else {
            if let (Some(slot), Some(value)) = (result, value) {
                self.builder.build_store(slot.ptr, value)?;
            }
            if let Some(post) = node.post.as_deref() {
                self.expr(post)?;
            }
            self.branch_on_condition(node.cond.as_deref(), loop_bb, after_bb)?;
        }

        self.builder.position_at_end(after_bb);
        match result {
            Some(slot) => Ok(Some(self.builder.build_load(slot.ty, slot.ptr, "loop.value")?)),
            None => Ok(None),
        }
    }

    /// Enter `body` if `cond` holds, otherwise leave to `exit`. Without a
    /// condition the loop is always entered.
    fn branch_on_condition(
        &mut self,
        cond: Option<&Expr>,
        body: BasicBlock<'ctx>,
        exit: BasicBlock<'ctx>,
    ) -> Result<(), CodegenError> {
        match cond {
            Some(cond) => {
                let value = self.condition(cond)?;
                self.builder.build_conditional_branch(value, body, exit)?;
            }
            None => {
                self.builder.build_unconditional_branch(body)?;
            }
        }
        Ok(())
    }
}

fn zero_value(ty: BasicTypeEnum<'_>) -> Result<BasicValueEnum<'_>, CodegenError> {
    match ty {
        BasicTypeEnum::IntType(int) => Ok(int.const_zero().into()),
        BasicTypeEnum::FloatType(float) => Ok(float.const_zero().into()),
        _ => Err(CodegenError::Unimplemented("loop values of aggregate type")),
    }
}
