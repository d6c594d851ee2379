//! LLVM IR generation from analysed trees.
//!
//! ## Architecture
//!
//! - [`CodeGen`]: context, module, builder, tables, and the slot scopes of
//!   the function being lowered
//! - [`expr`]: statements, expressions and control flow

pub mod expr;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{BasicTypeEnum, FunctionType};
use inkwell::values::{BasicValueEnum, FunctionValue, PointerValue};

use quill_ast::{File, Function};
use quill_common::ScopeStack;
use quill_types::{SpecialFunctions, TypeId, TypeRegistry};

use crate::error::CodegenError;

/// Lower every function of an analysed file into a fresh module.
///
/// Stops at the first function that fails; no partial module is returned.
pub fn generate<'ctx>(
    context: &'ctx Context,
    file: &File,
    types: &TypeRegistry<'ctx>,
    special: &SpecialFunctions,
    module_name: &str,
) -> Result<Module<'ctx>, CodegenError> {
    let mut codegen = CodeGen::new(context, module_name, types, special);
    for function in &file.functions {
        if let Err(err) = codegen.compile_function(function) {
            if err.is_internal() {
                tracing::error!(function = %function.name, %err, "code generation failed");
            } else {
                tracing::warn!(function = %function.name, %err, "code generation failed");
            }
            return Err(err);
        }
    }
    Ok(codegen.into_module())
}

// ── CodeGen ──────────────────────────────────────────────────────────

/// A stack slot and the type stored in it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot<'ctx> {
    pub ptr: PointerValue<'ctx>,
    pub ty: BasicTypeEnum<'ctx>,
}

pub struct CodeGen<'a, 'ctx> {
    pub(crate) context: &'ctx Context,
    pub(crate) module: Module<'ctx>,
    pub(crate) builder: Builder<'ctx>,
    pub(crate) types: &'a TypeRegistry<'ctx>,
    pub(crate) special: &'a SpecialFunctions,
    /// Name to stack slot, one frame per lexical scope.
    pub(crate) slots: ScopeStack<Slot<'ctx>>,
    /// Every load of a named slot, so `=` can recover the slot its target
    /// was read from.
    pub(crate) loads: Vec<(BasicValueEnum<'ctx>, PointerValue<'ctx>)>,
    /// Continuation blocks nothing branches to, such as the code after a
    /// `return`.
    pub(crate) dead_blocks: Vec<BasicBlock<'ctx>>,
    current_fn: Option<FunctionValue<'ctx>>,
}

impl<'a, 'ctx> CodeGen<'a, 'ctx> {
    pub fn new(
        context: &'ctx Context,
        module_name: &str,
        types: &'a TypeRegistry<'ctx>,
        special: &'a SpecialFunctions,
    ) -> Self {
        CodeGen {
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            types,
            special,
            slots: ScopeStack::new(),
            loads: Vec::new(),
            dead_blocks: Vec::new(),
            current_fn: None,
        }
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn into_module(self) -> Module<'ctx> {
        self.module
    }

    /// LLVM type of a value of an analysed type.
    pub(crate) fn basic_type(&self, ty: TypeId) -> Result<BasicTypeEnum<'ctx>, CodegenError> {
        self.types.basic_type(ty).ok_or_else(|| {
            CodegenError::Internal(format!("no LLVM type for {}", self.types.display(ty)))
        })
    }

    fn function_type(&self, function: &Function) -> Result<FunctionType<'ctx>, CodegenError> {
        self.types.function_type(function.signature).ok_or_else(|| {
            CodegenError::Internal(format!("`{}` has no analysed signature", function.name))
        })
    }

    pub(crate) fn current_function(&self) -> Result<FunctionValue<'ctx>, CodegenError> {
        self.current_fn
            .ok_or_else(|| CodegenError::Internal("no function is being lowered".to_string()))
    }

    pub(crate) fn insert_block(&self) -> Result<BasicBlock<'ctx>, CodegenError> {
        self.builder
            .get_insert_block()
            .ok_or_else(|| CodegenError::Internal("builder is not positioned".to_string()))
    }

    /// Lower one function, verify it, and keep it only if it verifies.
    pub fn compile_function(&mut self, function: &Function) -> Result<(), CodegenError> {
        tracing::debug!(name = %function.name, "lowering function");
        let fn_type = self.function_type(function)?;
        let ret = self
            .types
            .signature(function.signature)
            .map(|(_, ret)| ret)
            .unwrap_or(TypeId::VOID);
        let fn_val = self.module.add_function(&function.name, fn_type, None);
        for (param, value) in function.params.iter().zip(fn_val.get_param_iter()) {
            value.set_name(&param.name);
        }
        let entry = self.context.append_basic_block(fn_val, "entry");
        self.builder.position_at_end(entry);

        self.current_fn = Some(fn_val);
        self.slots.push();
        let lowered = self.function_body(function, fn_val, ret);
        self.slots.pop();
        self.current_fn = None;
        self.loads.clear();
        self.dead_blocks.clear();

        if let Err(err) = lowered {
            // SAFETY: nothing else refers to the half-built function.
            unsafe { fn_val.delete() };
            return Err(err);
        }
        if !fn_val.verify(false) {
            let detail = self
                .module
                .verify()
                .err()
                .map(|msg| msg.to_string())
                .unwrap_or_default();
            // SAFETY: a function is only called by later functions, which
            // have not been lowered yet.
            unsafe { fn_val.delete() };
            return Err(CodegenError::Verification {
                function: function.name.clone(),
                detail,
            });
        }
        Ok(())
    }

    fn function_body(
        &mut self,
        function: &Function,
        fn_val: FunctionValue<'ctx>,
        ret: TypeId,
    ) -> Result<(), CodegenError> {
        for (param, value) in function.params.iter().zip(fn_val.get_param_iter()) {
            let ty = value.get_type();
            let ptr = self.build_entry_alloca(ty, &format!("{}.addr", param.name))?;
            self.builder.build_store(ptr, value)?;
            self.slots.insert(param.name.clone(), Slot { ptr, ty });
        }

        let value = self.block(&function.body)?;
        if self.is_terminated()? {
            return Ok(());
        }
        if self.in_dead_block()? {
            self.builder.build_unreachable()?;
        } else if ret == TypeId::VOID {
            self.builder.build_return(None)?;
        } else {
            let value = value.ok_or_else(|| {
                CodegenError::Internal(format!("`{}` produced no value", function.name))
            })?;
            self.builder.build_return(Some(&value))?;
        }
        Ok(())
    }

    /// Build an alloca at the top of the entry block, then return to the
    /// current insertion point.
    pub(crate) fn build_entry_alloca(
        &self,
        ty: BasicTypeEnum<'ctx>,
        name: &str,
    ) -> Result<PointerValue<'ctx>, CodegenError> {
        let fn_val = self.current_function()?;
        let entry = fn_val
            .get_first_basic_block()
            .ok_or_else(|| CodegenError::Internal("function has no entry block".to_string()))?;
        let current = self.builder.get_insert_block();
        match entry.get_first_instruction() {
            Some(first) => self.builder.position_before(&first),
            None => self.builder.position_at_end(entry),
        }
        let alloca = self.builder.build_alloca(ty, name)?;
        if let Some(block) = current {
            self.builder.position_at_end(block);
        }
        Ok(alloca)
    }

    pub(crate) fn is_terminated(&self) -> Result<bool, CodegenError> {
        Ok(self.insert_block()?.get_terminator().is_some())
    }

    /// Whether the cursor sits in a block nothing branches to.
    pub(crate) fn in_dead_block(&self) -> Result<bool, CodegenError> {
        let current = self.insert_block()?;
        Ok(self.dead_blocks.contains(&current))
    }

    /// Continue in a fresh block with no predecessors.
    pub(crate) fn start_dead_block(&mut self) -> Result<(), CodegenError> {
        let dead = self
            .context
            .append_basic_block(self.current_function()?, "dead");
        self.builder.position_at_end(dead);
        self.dead_blocks.push(dead);
        Ok(())
    }
}
