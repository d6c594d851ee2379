//! The Quill compiler CLI.
//!
//! Provides the `quillc` command with the following subcommands:
//!
//! - `quillc build <ast.json>` - Analyse and lower a syntax tree, printing LLVM IR
//! - `quillc check <ast.json>` - Run semantic analysis only
//! - `quillc run <ast.json> [args...]` - Compile and execute a function
//!
//! Logging is controlled with the `QUILL_LOG` environment variable
//! (e.g. `QUILL_LOG=quill_typeck=trace`); the default level is `warn`.

mod pipeline;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use inkwell::context::Context;
use tracing_subscriber::EnvFilter;

use pipeline::{CompileOptions, SourceFile};
use quill_typeck::diagnostics::DiagnosticOptions;

#[derive(Parser)]
#[command(name = "quillc", version, about = "The Quill compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse and lower a syntax tree to LLVM IR
    Build {
        /// Path to the JSON syntax tree
        input: PathBuf,

        /// Write the IR to this file instead of stdout
        #[arg(long = "emit-ir")]
        emit_ir: Option<PathBuf>,

        /// Name recorded in the module header
        #[arg(long = "module-name", default_value = "main")]
        module_name: String,

        /// Source file the tree was parsed from, for diagnostics
        #[arg(long)]
        source: Option<PathBuf>,

        /// Disable colorized output
        #[arg(long = "no-color")]
        no_color: bool,
    },
    /// Run semantic analysis and report errors
    Check {
        /// Path to the JSON syntax tree
        input: PathBuf,

        /// Source file the tree was parsed from, for diagnostics
        #[arg(long)]
        source: Option<PathBuf>,

        /// Disable colorized output
        #[arg(long = "no-color")]
        no_color: bool,
    },
    /// Compile a syntax tree and execute one of its functions
    Run {
        /// Path to the JSON syntax tree
        input: PathBuf,

        /// Function to call
        #[arg(long, default_value = "main")]
        entry: String,

        /// Arguments passed to the entry function
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Build {
            input,
            emit_ir,
            module_name,
            source,
            no_color,
        } => {
            let diag_opts = DiagnosticOptions { color: !no_color };
            let options = CompileOptions { module_name };
            build(&input, emit_ir.as_deref(), source.as_deref(), &options, &diag_opts)
        }
        Commands::Check {
            input,
            source,
            no_color,
        } => {
            let diag_opts = DiagnosticOptions { color: !no_color };
            check(&input, source.as_deref(), &diag_opts)
        }
        Commands::Run { input, entry, args } => run(&input, &entry, &args),
    };

    if let Err(e) = outcome {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("QUILL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn load_source(path: Option<&Path>) -> Result<Option<SourceFile>, String> {
    let Some(path) = path else {
        return Ok(None);
    };
    Ok(Some(SourceFile {
        name: path.display().to_string(),
        text: pipeline::read(path)?,
    }))
}

/// Execute the build pipeline: read the tree -> analyse -> lower to LLVM -> print.
fn build(
    input: &Path,
    emit_ir: Option<&Path>,
    source: Option<&Path>,
    options: &CompileOptions,
    diag_opts: &DiagnosticOptions,
) -> Result<(), String> {
    let ast = pipeline::read(input)?;
    let source = load_source(source)?;
    let context = Context::create();
    let analysed = pipeline::analyze(&context, &ast, source.as_ref(), diag_opts)?;
    let module = pipeline::compile(&context, &analysed, options)?;

    let ir = module.print_to_string().to_string();
    match emit_ir {
        Some(path) => {
            std::fs::write(path, ir)
                .map_err(|e| format!("failed to write '{}': {}", path.display(), e))?;
            eprintln!("  IR: {}", path.display());
        }
        None => print!("{ir}"),
    }
    Ok(())
}

fn check(input: &Path, source: Option<&Path>, diag_opts: &DiagnosticOptions) -> Result<(), String> {
    let ast = pipeline::read(input)?;
    let source = load_source(source)?;
    let context = Context::create();
    let analysed = pipeline::analyze(&context, &ast, source.as_ref(), diag_opts)?;
    eprintln!("  Checked {} function(s)", analysed.file.functions.len());
    Ok(())
}

fn run(input: &Path, entry: &str, args: &[String]) -> Result<(), String> {
    let ast = pipeline::read(input)?;
    let context = Context::create();
    let analysed = pipeline::analyze(&context, &ast, None, &DiagnosticOptions { color: false })?;
    let module = pipeline::compile(&context, &analysed, &CompileOptions::default())?;
    let result = pipeline::execute(&context, &analysed, &module, entry, args)?;
    println!("{result}");
    Ok(())
}
