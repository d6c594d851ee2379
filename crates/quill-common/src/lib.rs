//! Types shared by every stage of the Quill compiler.

pub mod scope;
pub mod span;

pub use scope::ScopeStack;
pub use span::Span;
