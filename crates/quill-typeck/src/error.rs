//! Analysis errors.
//!
//! Each error records where it was detected. Mismatches also record the
//! rule that demanded the expected type, so messages can say "argument 2"
//! rather than only "expected i32, found bool".

use std::fmt;

use quill_common::Span;
use quill_types::registry::primitive_name;
use quill_types::{TypeId, TypeRegistry};

/// The rule that required a value to have a particular type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// A function body's value or a `return` operand.
    Return { function: String },
    /// The right side of `=`.
    Assignment,
    /// A call argument (zero-based index).
    Argument { callee: String, index: usize },
    /// An `if` or loop condition.
    Condition,
    /// A `let` initializer against its declared type.
    LetBinding { name: String },
    /// An operand of a resolved operator.
    Operand { op: String },
    /// The two arms of an `if` used as a value.
    IfArms,
    /// A literal given its kind's default type.
    Default,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeError {
    UnboundName {
        name: String,
        span: Span,
    },
    UnknownType {
        name: String,
        span: Span,
    },
    Mismatch {
        expected: TypeId,
        found: TypeId,
        origin: Origin,
        span: Span,
    },
    /// No entry of a binary operator accepts these operands.
    NoOperator {
        op: String,
        left: TypeId,
        right: TypeId,
        span: Span,
    },
    NoUnaryOperator {
        op: String,
        operand: TypeId,
        span: Span,
    },
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    NotAFunction {
        name: String,
        span: Span,
    },
    /// A variable whose type can be neither read nor inferred.
    UntypedVariable {
        name: String,
        span: Span,
    },
    /// A bare `return` in a function with a non-void return type.
    MissingValue {
        function: String,
        expected: TypeId,
        span: Span,
    },
    /// Both arms of an `if` expression are unconstrained literals.
    UnmergeableLiterals {
        then_ty: TypeId,
        else_ty: TypeId,
        span: Span,
    },
    /// A literal whose value the type it was given cannot represent.
    LiteralOutOfRange {
        value: String,
        ty: TypeId,
        span: Span,
    },
    Unsupported {
        what: &'static str,
        span: Span,
    },
    Redefinition {
        name: String,
        span: Span,
    },
}

impl TypeError {
    pub fn span(&self) -> Span {
        match self {
            TypeError::UnboundName { span, .. }
            | TypeError::UnknownType { span, .. }
            | TypeError::Mismatch { span, .. }
            | TypeError::NoOperator { span, .. }
            | TypeError::NoUnaryOperator { span, .. }
            | TypeError::ArityMismatch { span, .. }
            | TypeError::NotAFunction { span, .. }
            | TypeError::UntypedVariable { span, .. }
            | TypeError::MissingValue { span, .. }
            | TypeError::UnmergeableLiterals { span, .. }
            | TypeError::LiteralOutOfRange { span, .. }
            | TypeError::Unsupported { span, .. }
            | TypeError::Redefinition { span, .. } => *span,
        }
    }

    /// The one-line message, with types named through the registry.
    pub fn message(&self, types: &TypeRegistry<'_>) -> String {
        self.render(&|id| types.display(id))
    }

    fn render(&self, name: &dyn Fn(TypeId) -> String) -> String {
        match self {
            TypeError::UnboundName { name: n, .. } => format!("cannot find `{n}` in this scope"),
            TypeError::UnknownType { name: n, .. } => format!("unknown type `{n}`"),
            TypeError::Mismatch {
                expected,
                found,
                origin,
                ..
            } => {
                let base = format!("expected {}, found {}", name(*expected), name(*found));
                match origin {
                    Origin::Return { function } => format!("{base} in the result of `{function}`"),
                    Origin::Assignment => format!("{base} in assignment"),
                    Origin::Argument { callee, index } => {
                        format!("{base} for argument {} of `{callee}`", index + 1)
                    }
                    Origin::Condition => format!("{base} in condition"),
                    Origin::LetBinding { name: n } => format!("{base} in binding of `{n}`"),
                    Origin::Operand { op } => format!("{base} for operand of `{op}`"),
                    Origin::IfArms => format!("if and else arms differ: {base}"),
                    Origin::Default => format!("{base} for a defaulted literal"),
                }
            }
            TypeError::NoOperator {
                op, left, right, ..
            } => format!(
                "no operator `{op}` for {} and {}",
                name(*left),
                name(*right)
            ),
            TypeError::NoUnaryOperator { op, operand, .. } => {
                format!("no unary operator `{op}` for {}", name(*operand))
            }
            TypeError::ArityMismatch {
                callee,
                expected,
                found,
                ..
            } => format!("`{callee}` takes {expected} argument(s), found {found}"),
            TypeError::NotAFunction { name: n, .. } => format!("`{n}` is not a function"),
            TypeError::UntypedVariable { name: n, .. } => {
                format!("cannot determine the type of `{n}`")
            }
            TypeError::MissingValue {
                function, expected, ..
            } => format!(
                "`return` without a value in `{function}`, which returns {}",
                name(*expected)
            ),
            TypeError::UnmergeableLiterals {
                then_ty, else_ty, ..
            } => format!(
                "cannot pick a type for if arms of {} and {}",
                name(*then_ty),
                name(*else_ty)
            ),
            TypeError::LiteralOutOfRange { value, ty, .. } => {
                format!("literal `{value}` does not fit in {}", name(*ty))
            }
            TypeError::Unsupported { what, .. } => format!("{what} are not supported"),
            TypeError::Redefinition { name: n, .. } => format!("`{n}` is defined more than once"),
        }
    }
}

/// Names without a registry: primitives by name, anything else by handle.
fn bare_name(id: TypeId) -> String {
    if let Some(name) = primitive_name(id) {
        return name.to_string();
    }
    match id {
        TypeId::U_LITERAL => "{integer}".to_string(),
        TypeId::I_LITERAL => "{signed integer}".to_string(),
        TypeId::FP_LITERAL => "{float}".to_string(),
        _ => format!("type {id}"),
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&bare_name))
    }
}

impl std::error::Error for TypeError {}
