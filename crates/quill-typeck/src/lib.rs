//! Semantic analysis for Quill.
//!
//! A single pass over the tree assigns every node a type, resolves operator
//! overloads against the special-functions table, and rewrites the tree in
//! place: literal leaves are relabelled with the type their context needs,
//! and other values that need converting are wrapped in implicit casts.
//! After a successful pass the code generator can look up every operator
//! and cast callback by the types recorded on the nodes.

pub mod diagnostics;
pub mod error;

mod coerce;
mod infer;

use quill_ast::File;
use quill_types::{SpecialFunctions, TypeId, TypeRegistry};

pub use diagnostics::{render_diagnostic, DiagnosticOptions};
pub use error::{Origin, TypeError};

use infer::Analyzer;

/// The outcome of analysing a file.
#[derive(Debug, Default)]
pub struct TypeckResult {
    pub errors: Vec<TypeError>,
}

impl TypeckResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Analyse `file` in source order, rewriting it in place.
///
/// Analysis stops at the first function that fails. Functions are bound
/// as they are reached, so a call to a function defined further down the
/// file is an unbound name.
pub fn check(
    file: &mut File,
    types: &mut TypeRegistry<'_>,
    special: &SpecialFunctions,
) -> TypeckResult {
    let mut analyzer = Analyzer::new(types, special);
    for function in &mut file.functions {
        if analyzer.function(function) == TypeId::UNDETERMINED {
            tracing::debug!(name = %function.name, "stopping after failed function");
            break;
        }
    }
    TypeckResult {
        errors: analyzer.errors,
    }
}
