//! The compilation stages behind each subcommand.
//!
//! Stage failures are reported to stderr as they happen and come back as a
//! one-line summary `String` for `main` to print before exiting.

use std::path::Path;

use ariadne::{Color, Config, IndexType, Label, Report, ReportKind, Source};
use inkwell::context::Context;
use inkwell::execution_engine::FunctionLookupError;
use inkwell::module::Module;
use inkwell::targets::{InitializationConfig, Target};
use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, FunctionValue};
use inkwell::OptimizationLevel;

use quill_ast::{File, IngestError};
use quill_typeck::diagnostics::{error_code, render_diagnostic, DiagnosticOptions};
use quill_typeck::TypeError;
use quill_types::{SpecialFunctions, TypeId, TypeRegistry};

/// Settings for the lowering stage.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Name recorded in the module header.
    pub module_name: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            module_name: "main".to_string(),
        }
    }
}

/// Source text the AST was produced from, used to render diagnostics.
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

/// A file that passed analysis, together with the tables it was analysed
/// against.
pub struct Analysed<'ctx> {
    pub file: File,
    pub types: TypeRegistry<'ctx>,
    pub special: SpecialFunctions,
}

pub fn read(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("failed to read '{}': {}", path.display(), e))
}

/// Ingest the JSON AST and run semantic analysis over it. Types are
/// lowered into `context` as they are registered.
pub fn analyze<'ctx>(
    context: &'ctx Context,
    ast_json: &str,
    source: Option<&SourceFile>,
    diag_opts: &DiagnosticOptions,
) -> Result<Analysed<'ctx>, String> {
    let (mut types, special) = quill_types::defaults::standard(context);
    let mut file = match quill_ast::parse_file(ast_json, &special) {
        Ok(file) => file,
        Err(err) => {
            report_ingest_error(&err, source, diag_opts);
            return Err("could not read the syntax tree".to_string());
        }
    };
    tracing::debug!(functions = file.functions.len(), "ingested syntax tree");

    let result = quill_typeck::check(&mut file, &mut types, &special);
    if !result.is_ok() {
        report_type_errors(&result.errors, &types, source, diag_opts);
        return Err(format!(
            "analysis failed with {} error(s)",
            result.errors.len()
        ));
    }
    Ok(Analysed {
        file,
        types,
        special,
    })
}

/// Lower an analysed file to a verified module.
pub fn compile<'ctx>(
    context: &'ctx Context,
    analysed: &Analysed<'ctx>,
    options: &CompileOptions,
) -> Result<Module<'ctx>, String> {
    quill_codegen::generate(
        context,
        &analysed.file,
        &analysed.types,
        &analysed.special,
        &options.module_name,
    )
    .map_err(|e| format!("code generation failed: {e}"))
}

// ── Execution ──────────────────────────────────────────────────────────

/// Name of the generated function that calls the entry point with the
/// command-line arguments.
const RUN_WRAPPER: &str = "__quill_run";

/// How the wrapper hands the entry's result back to Rust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Returned {
    Void,
    Bool,
    Char,
    /// Extended to 64 bits, with the sign when `signed`.
    Word { signed: bool },
    /// 128-bit integers are returned as they are.
    Wide { signed: bool },
    /// Floats are returned as `f64`; `single` marks an `f32` result.
    Float { single: bool },
}

impl Returned {
    fn of(ty: TypeId) -> Option<Returned> {
        Some(match ty {
            TypeId::VOID => Returned::Void,
            TypeId::BOOL => Returned::Bool,
            TypeId::CHAR => Returned::Char,
            TypeId::F32 => Returned::Float { single: true },
            TypeId::F64 => Returned::Float { single: false },
            TypeId::U128 | TypeId::I128 => Returned::Wide {
                signed: ty.is_signed_int(),
            },
            _ if ty.is_int() => Returned::Word {
                signed: ty.is_signed_int(),
            },
            _ => return None,
        })
    }
}

/// Call `entry` on the JIT with arguments parsed from the command line
/// and render its result.
pub fn execute<'ctx>(
    context: &'ctx Context,
    analysed: &Analysed<'ctx>,
    module: &Module<'ctx>,
    entry: &str,
    args: &[String],
) -> Result<String, String> {
    let no_function = || format!("no function named `{entry}`");
    let callee = module.get_function(entry).ok_or_else(no_function)?;
    let function = analysed
        .file
        .functions
        .iter()
        .find(|f| f.name == entry)
        .ok_or_else(no_function)?;
    let (params, ret) = analysed
        .types
        .signature(function.signature)
        .ok_or_else(no_function)?;
    if params.len() != args.len() {
        return Err(format!(
            "`{entry}` takes {} argument(s), got {}",
            params.len(),
            args.len()
        ));
    }
    let returned = Returned::of(ret).ok_or_else(|| {
        format!(
            "cannot print a {} from the command line",
            analysed.types.display(ret)
        )
    })?;

    let mut values: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(args.len());
    for ((param, ty), text) in function.params.iter().zip(params).zip(args) {
        let llvm = analysed
            .types
            .basic_type(*ty)
            .ok_or_else(|| format!("{}: cannot pass a {}", param.name, analysed.types.display(*ty)))?;
        let value = parse_argument(text, *ty, llvm).map_err(|e| format!("{}: {e}", param.name))?;
        values.push(value.into());
    }

    build_wrapper(context, module, callee, &values, returned)
        .map_err(|e| format!("failed to build the entry wrapper: {e}"))?;
    Target::initialize_native(&InitializationConfig::default())
        .map_err(|e| format!("failed to initialize native target: {e}"))?;
    let ee = module
        .create_jit_execution_engine(OptimizationLevel::None)
        .map_err(|e| format!("failed to create JIT engine: {e}"))?;

    let missing = |e: FunctionLookupError| format!("failed to find JIT function '{RUN_WRAPPER}': {e}");
    // SAFETY: each signature matches the wrapper built for `returned`.
    unsafe {
        Ok(match returned {
            Returned::Void => {
                ee.get_function::<unsafe extern "C" fn()>(RUN_WRAPPER)
                    .map_err(missing)?
                    .call();
                "()".to_string()
            }
            Returned::Bool | Returned::Char | Returned::Word { .. } => {
                let raw = ee
                    .get_function::<unsafe extern "C" fn() -> i64>(RUN_WRAPPER)
                    .map_err(missing)?
                    .call();
                format_word(raw, returned)
            }
            Returned::Wide { signed } => {
                let raw = ee
                    .get_function::<unsafe extern "C" fn() -> i128>(RUN_WRAPPER)
                    .map_err(missing)?
                    .call();
                if signed {
                    raw.to_string()
                } else {
                    (raw as u128).to_string()
                }
            }
            Returned::Float { single } => {
                let raw = ee
                    .get_function::<unsafe extern "C" fn() -> f64>(RUN_WRAPPER)
                    .map_err(missing)?
                    .call();
                if single {
                    (raw as f32).to_string()
                } else {
                    raw.to_string()
                }
            }
        })
    }
}

/// Add `__quill_run() -> word` to `module`: call `callee` with constant
/// arguments and widen the result as `returned` says.
fn build_wrapper<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
    callee: FunctionValue<'ctx>,
    args: &[BasicMetadataValueEnum<'ctx>],
    returned: Returned,
) -> Result<(), String> {
    let word: Option<BasicTypeEnum<'ctx>> = match returned {
        Returned::Void => None,
        Returned::Bool | Returned::Char | Returned::Word { .. } => {
            Some(context.i64_type().into())
        }
        Returned::Wide { .. } => Some(context.i128_type().into()),
        Returned::Float { .. } => Some(context.f64_type().into()),
    };
    let fn_type = match word {
        Some(ty) => ty.fn_type(&[], false),
        None => context.void_type().fn_type(&[], false),
    };
    let wrapper = module.add_function(RUN_WRAPPER, fn_type, None);
    let builder = context.create_builder();
    builder.position_at_end(context.append_basic_block(wrapper, "entry"));

    let name = if word.is_some() { "result" } else { "" };
    let result = builder
        .build_call(callee, args, name)
        .map_err(|e| e.to_string())?
        .try_as_basic_value()
        .basic();
    let widened: Option<BasicValueEnum<'ctx>> = match (returned, result) {
        (Returned::Void, _) => None,
        (Returned::Word { signed: true }, Some(BasicValueEnum::IntValue(v))) => Some(
            builder
                .build_int_s_extend_or_bit_cast(v, context.i64_type(), "widen")
                .map_err(|e| e.to_string())?
                .into(),
        ),
        (Returned::Bool | Returned::Char | Returned::Word { .. }, Some(BasicValueEnum::IntValue(v))) => Some(
            builder
                .build_int_z_extend_or_bit_cast(v, context.i64_type(), "widen")
                .map_err(|e| e.to_string())?
                .into(),
        ),
        (Returned::Float { single: true }, Some(BasicValueEnum::FloatValue(v))) => Some(
            builder
                .build_float_ext(v, context.f64_type(), "widen")
                .map_err(|e| e.to_string())?
                .into(),
        ),
        (_, Some(value)) => Some(value),
        (_, None) => return Err("the entry function returned no value".to_string()),
    };
    match widened {
        Some(value) => builder.build_return(Some(&value)),
        None => builder.build_return(None),
    }
    .map_err(|e| e.to_string())?;
    if !wrapper.verify(false) {
        return Err(module
            .verify()
            .err()
            .map(|msg| msg.to_string())
            .unwrap_or_else(|| "verification failed".to_string()));
    }
    Ok(())
}

fn format_word(raw: i64, returned: Returned) -> String {
    match returned {
        Returned::Bool => (raw != 0).to_string(),
        Returned::Char => u32::try_from(raw)
            .ok()
            .and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_else(|| format!("\\u{{{raw:x}}}")),
        Returned::Word { signed: false } => (raw as u64).to_string(),
        _ => raw.to_string(),
    }
}

/// Parse one command-line argument as a constant of type `ty`.
fn parse_argument<'ctx>(
    text: &str,
    ty: TypeId,
    llvm: BasicTypeEnum<'ctx>,
) -> Result<BasicValueEnum<'ctx>, String> {
    match llvm {
        BasicTypeEnum::IntType(int) if ty == TypeId::BOOL => match text {
            "true" => Ok(int.const_int(1, false).into()),
            "false" => Ok(int.const_zero().into()),
            _ => Err(format!("expected `true` or `false`, found `{text}`")),
        },
        BasicTypeEnum::IntType(int) if ty == TypeId::CHAR => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(int.const_int(u64::from(c), false).into()),
                _ => Err(format!("expected a single character, found `{text}`")),
            }
        }
        BasicTypeEnum::IntType(int) => {
            let bits = int.get_bit_width();
            let raw = if ty.is_signed_int() {
                let v = text
                    .parse::<i128>()
                    .map_err(|e| format!("invalid integer `{text}`: {e}"))?;
                let fits = bits >= 128 || (v >> (bits - 1) == 0 || v >> (bits - 1) == -1);
                if !fits {
                    return Err(format!("`{text}` does not fit in {bits} bits"));
                }
                v as u128
            } else {
                let v = text
                    .parse::<u128>()
                    .map_err(|e| format!("invalid integer `{text}`: {e}"))?;
                if bits < 128 && v >> bits != 0 {
                    return Err(format!("`{text}` does not fit in {bits} bits"));
                }
                v
            };
            if bits <= 64 {
                return Ok(int.const_int(raw as u64, false).into());
            }
            let words = [raw as u64, (raw >> 64) as u64];
            Ok(int.const_int_arbitrary_precision(&words).into())
        }
        BasicTypeEnum::FloatType(float) => text
            .parse::<f64>()
            .map(|v| float.const_float(v).into())
            .map_err(|e| format!("invalid number `{text}`: {e}")),
        _ => Err("cannot pass a value of this type from the command line".to_string()),
    }
}

// ── Reporting ──────────────────────────────────────────────────────────

fn report_type_errors(
    errors: &[TypeError],
    types: &TypeRegistry<'_>,
    source: Option<&SourceFile>,
    diag_opts: &DiagnosticOptions,
) {
    for error in errors {
        match source {
            Some(src) => {
                let rendered = render_diagnostic(error, types, &src.text, &src.name, diag_opts);
                eprint!("{rendered}");
            }
            None => eprintln!("error[{}]: {}", error_code(error), error.message(types)),
        }
    }
}

fn report_ingest_error(
    error: &IngestError,
    source: Option<&SourceFile>,
    diag_opts: &DiagnosticOptions,
) {
    let (Some(src), Some(span)) = (source, error.span()) else {
        eprintln!("error: {error}");
        return;
    };
    let range = span.source_range(src.text.len());
    let name = src.name.as_str();
    let config = Config::default()
        .with_color(diag_opts.color)
        .with_index_type(IndexType::Byte);
    let report = Report::build(ReportKind::Error, (name, range.clone()))
        .with_message("invalid syntax tree")
        .with_config(config)
        .with_label(
            Label::new((name, range))
                .with_message(error.to_string())
                .with_color(Color::Red),
        )
        .finish();
    if report.eprint((name, Source::from(src.text.as_str()))).is_err() {
        eprintln!("error: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_follow_parameter_types() {
        let context = Context::create();
        let (types, _) = quill_types::defaults::standard(&context);
        let parse = |text: &str, ty: TypeId| {
            let llvm = types.basic_type(ty).expect("primitive type");
            parse_argument(text, ty, llvm)
        };
        fn int<'c>(value: BasicValueEnum<'c>) -> inkwell::values::IntValue<'c> {
            value.into_int_value()
        }

        let minus_three = int(parse("-3", TypeId::I32).unwrap());
        assert_eq!(minus_three.get_sign_extended_constant(), Some(-3));
        let max_byte = int(parse("255", TypeId::U8).unwrap());
        assert_eq!(max_byte.get_zero_extended_constant(), Some(255));
        let yes = int(parse("true", TypeId::BOOL).unwrap());
        assert_eq!(yes.get_zero_extended_constant(), Some(1));

        assert!(parse("256", TypeId::U8).is_err());
        assert!(parse("-129", TypeId::I8).is_err());
        assert!(parse("-1", TypeId::U32).is_err());
        assert!(parse("yes", TypeId::BOOL).is_err());
        assert!(parse("x", TypeId::I32).is_err());
        assert!(parse("1.5", TypeId::F64).is_ok());
    }

    #[test]
    fn results_widen_by_type() {
        assert_eq!(Returned::of(TypeId::I16), Some(Returned::Word { signed: true }));
        assert_eq!(Returned::of(TypeId::U128), Some(Returned::Wide { signed: false }));
        assert_eq!(Returned::of(TypeId::F32), Some(Returned::Float { single: true }));
        assert_eq!(format_word(-1, Returned::Word { signed: false }), u64::MAX.to_string());
        assert_eq!(format_word(1, Returned::Bool), "true");
        assert_eq!(format_word('λ' as i64, Returned::Char), "λ");
    }
}
