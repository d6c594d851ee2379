//! Types and special functions for the Quill compiler.
//!
//! Type handles are plain integers issued by a [`TypeRegistry`]; structural
//! types are interned so equal shapes share one handle. Operators and casts
//! live in [`SpecialFunctions`], keyed by operand handles, each entry
//! carrying a result type and optionally the callback that emits it through
//! an inkwell builder.
//!
//! # Architecture
//!
//! - [`id`]: `TypeId` and the reserved handles
//! - [`registry`]: interning, aliases, and lowering to LLVM types
//! - [`special`]: cast, unary and binary operator tables, precedence
//! - [`resolve`]: overload candidate search over the binary and unary tables
//! - [`defaults`]: the standard aliases, operators and casts

pub mod defaults;
pub mod id;
pub mod registry;
pub mod resolve;
pub mod special;

pub use id::{Constant, TypeId};
pub use registry::{LlvmLowering, LowerType, LoweredType, Type, TypeRegistry};
pub use resolve::{resolve_binary, resolve_unary, Operand, Resolution, UnaryResolution};
pub use special::{
    binary_emitter, cast_emitter, unary_emitter, BinaryEmitter, BinaryTable, CastEmitter,
    CastTable, OperatorEntry, OperatorTable, SpecialFunctions, UnaryEmitter, UnaryTable,
};
