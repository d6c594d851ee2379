//! Ariadne rendering of analysis errors.

use std::ops::Range;

use ariadne::{Color, Config, IndexType, Label, Report, ReportKind, Source};

use quill_types::TypeRegistry;

use crate::error::{Origin, TypeError};

/// How diagnostics are rendered.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticOptions {
    pub color: bool,
}

impl Default for DiagnosticOptions {
    fn default() -> Self {
        DiagnosticOptions { color: true }
    }
}

// ── Error Codes ────────────────────────────────────────────────────────

/// Stable code shown with every diagnostic, e.g. `Q0002`.
pub fn error_code(err: &TypeError) -> &'static str {
    match err {
        TypeError::Mismatch { .. } => "Q0001",
        TypeError::UnboundName { .. } => "Q0002",
        TypeError::UnknownType { .. } => "Q0003",
        TypeError::NoOperator { .. } => "Q0004",
        TypeError::NoUnaryOperator { .. } => "Q0005",
        TypeError::ArityMismatch { .. } => "Q0006",
        TypeError::NotAFunction { .. } => "Q0007",
        TypeError::UntypedVariable { .. } => "Q0008",
        TypeError::MissingValue { .. } => "Q0009",
        TypeError::UnmergeableLiterals { .. } => "Q0010",
        TypeError::Unsupported { .. } => "Q0011",
        TypeError::Redefinition { .. } => "Q0012",
        TypeError::LiteralOutOfRange { .. } => "Q0013",
    }
}

/// Label text for the primary span.
fn label(err: &TypeError, types: &TypeRegistry<'_>) -> String {
    match err {
        TypeError::Mismatch {
            expected, origin, ..
        } => match origin {
            Origin::Condition => "conditions must be bool".to_string(),
            _ => format!("expected {}", types.display(*expected)),
        },
        TypeError::UnboundName { .. } => "not found".to_string(),
        TypeError::UnknownType { .. } => "unknown type".to_string(),
        TypeError::NoOperator { .. } | TypeError::NoUnaryOperator { .. } => {
            "no matching overload".to_string()
        }
        TypeError::ArityMismatch { expected, .. } => format!("expected {expected} argument(s)"),
        TypeError::NotAFunction { .. } => "called here".to_string(),
        TypeError::UntypedVariable { .. } => "type needed".to_string(),
        TypeError::MissingValue { expected, .. } => {
            format!("needs a value of type {}", types.display(*expected))
        }
        TypeError::UnmergeableLiterals { .. } => "both arms are untyped literals".to_string(),
        TypeError::LiteralOutOfRange { ty, .. } => {
            format!("out of range for {}", types.display(*ty))
        }
        TypeError::Unsupported { .. } => "not supported".to_string(),
        TypeError::Redefinition { .. } => "redefined here".to_string(),
    }
}

fn help(err: &TypeError) -> Option<&'static str> {
    match err {
        TypeError::UntypedVariable { .. } => Some("add a type annotation"),
        TypeError::UnmergeableLiterals { .. } => {
            Some("annotate the binding or give one arm a typed value")
        }
        TypeError::UnboundName { .. } => Some("functions must be defined before they are called"),
        TypeError::LiteralOutOfRange { .. } => Some("use a wider type or a smaller literal"),
        _ => None,
    }
}

// ── Main Rendering Function ────────────────────────────────────────────

/// Render an analysis error against its source text.
pub fn render_diagnostic(
    error: &TypeError,
    types: &TypeRegistry<'_>,
    source: &str,
    filename: &str,
    options: &DiagnosticOptions,
) -> String {
    let config = Config::default()
        .with_color(options.color)
        .with_index_type(IndexType::Byte);
    let span = label_range(error.span().source_range(source.len()), source.len());

    let mut builder = Report::build(ReportKind::Error, (filename, span.clone()))
        .with_code(error_code(error))
        .with_message(error.message(types))
        .with_config(config)
        .with_label(
            Label::new((filename, span))
                .with_message(label(error, types))
                .with_color(Color::Red),
        );
    if let Some(help) = help(error) {
        builder.set_help(help);
    }

    let mut buf = Vec::new();
    if let Err(err) = builder
        .finish()
        .write((filename, Source::from(source)), &mut buf)
    {
        tracing::warn!(%err, "failed to render diagnostic");
        return format!("error[{}]: {}", error_code(error), error.message(types));
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Widen an empty range to one byte when the source allows it.
fn label_range(range: Range<usize>, len: usize) -> Range<usize> {
    if range.is_empty() {
        range.start..(range.start + 1).min(len)
    } else {
        range
    }
}
