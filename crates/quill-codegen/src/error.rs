use std::fmt;

use inkwell::builder::BuilderError;

/// Why lowering failed.
///
/// `Internal` means the analyzer accepted something the generator cannot
/// lower; it is a compiler defect rather than a problem with the input.
#[derive(Debug)]
pub enum CodegenError {
    /// A variable or callee with no binding.
    Unresolved { name: String },
    /// The left side of `=` does not denote a storage slot.
    NotAddressable,
    Internal(String),
    Unimplemented(&'static str),
    /// LLVM rejected the function; `detail` is the verifier's report.
    Verification { function: String, detail: String },
    Build(BuilderError),
}

impl CodegenError {
    pub fn is_internal(&self) -> bool {
        matches!(self, CodegenError::Internal(_))
    }
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenError::Unresolved { name } => write!(f, "unresolved name `{name}`"),
            CodegenError::NotAddressable => {
                write!(f, "left side of assignment is not a variable")
            }
            CodegenError::Internal(msg) => write!(f, "internal compiler error: {msg}"),
            CodegenError::Unimplemented(what) => write!(f, "{what} are not implemented"),
            CodegenError::Verification { function, detail } if detail.is_empty() => {
                write!(f, "function `{function}` failed verification")
            }
            CodegenError::Verification { function, detail } => {
                write!(f, "function `{function}` failed verification: {}", detail.trim_end())
            }
            CodegenError::Build(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CodegenError {}

impl From<BuilderError> for CodegenError {
    fn from(err: BuilderError) -> Self {
        CodegenError::Build(err)
    }
}
