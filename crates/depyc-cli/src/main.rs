//! Command-line front-end for the decompiler (§6).

use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use depyc::{decompile_code, print_module, read_pyc, DecompileError, TraceSink};

/// Decompile a Python `.pyc` file back to source.
#[derive(Parser, Debug)]
#[command(name = "depyc", version, about)]
struct Cli {
    /// Path to the `.pyc` file to decompile.
    input: PathBuf,

    /// Dotted path of a nested code object to decompile instead of the
    /// module top level, e.g. `MyClass.method`.
    #[arg(long)]
    focus: Option<String>,

    /// Emit JSONL loop-guard iteration events to the trace sink.
    #[arg(long)]
    trace_loop_guards: bool,

    /// Emit JSONL per-block simulation trace events to the trace sink.
    #[arg(long)]
    trace_sim_block: bool,

    /// Emit JSONL pattern-selection decision events to the trace sink.
    #[arg(long)]
    trace_decisions: bool,

    /// File to write trace JSONL to; enables tracing if any `--trace-*`
    /// flag above is also set. Defaults to `<input>.trace.jsonl`.
    #[arg(long)]
    trace_sink: Option<PathBuf>,

    /// Print the recovered AST as JSON instead of Python source.
    #[arg(long)]
    dump_json: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let bytes = fs::read(&cli.input).map_err(|source| CliError::Io { path: cli.input.clone(), source })?;
    let module = read_pyc(&bytes)?;
    tracing::info!(path = %cli.input.display(), version = %module.version, "loaded .pyc module");

    let wants_trace = cli.trace_loop_guards || cli.trace_sim_block || cli.trace_decisions;
    let mut sink = if wants_trace {
        let path = cli.trace_sink.clone().unwrap_or_else(|| {
            let mut p = cli.input.clone();
            p.set_extension("trace.jsonl");
            p
        });
        let file = fs::File::create(&path).map_err(|source| CliError::Io { path: path.clone(), source })?;
        TraceSink::to_writer(BufWriter::new(file))
    } else {
        TraceSink::null()
    };

    let (arena, stmts, future_annotations) = decompile_code(&module.code, module.version, &mut sink, cli.focus.as_deref())?;

    if cli.dump_json {
        let json = serde_json::to_string_pretty(&DebugAst { stmt_count: stmts.len(), expr_count: arena.expr_count() })
            .expect("AST summary always serializes");
        println!("{json}");
    } else {
        print!("{}", print_module(&arena, &stmts, future_annotations));
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct DebugAst {
    stmt_count: usize,
    expr_count: usize,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("reading {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Decompile(#[from] DecompileError),
}
