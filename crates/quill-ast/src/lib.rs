//! The Quill abstract syntax tree.
//!
//! Trees arrive as JSON ([`json::parse_file`]), get their operator chains
//! shaped by the precedence table, are annotated and rewritten in place by
//! the analyzer, and are finally lowered by the code generator.

pub mod ast;
pub mod dump;
pub mod json;

pub use ast::*;
pub use json::{parse_file, IngestError};
