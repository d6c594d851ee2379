//! Code generation for Quill.
//!
//! Lowers a tree the analyzer has accepted into LLVM IR through inkwell.
//! Every local lives in a stack slot allocated in the entry block; reads
//! are loads and assignments are stores. Operators and implicit casts are
//! emitted by the callbacks registered in the special-functions table,
//! looked up by the operand types the analyzer recorded on each node.

pub mod codegen;
pub mod error;

pub use codegen::{generate, CodeGen};
pub use error::CodegenError;
