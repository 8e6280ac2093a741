//! Command line front door: parse a `.tir` file, compile it and print the
//! requested dumps.

use bumpalo::Bump;
use clap::Parser;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use sysmips::core::{CompilationSession, CompileResult, CompilerOptions, RegisterBudget};
use sysmips::test_ir::{parse_module, render_dumps, Dump};

#[derive(Parser)]
#[command(name = "sysmips")]
#[command(version)]
#[command(about = "SSA middle-end and MIPS32 backend", long_about = None)]
struct Cli {
    /// Input file in textual IR; `-` reads stdin
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Skip CFG simplification and mem2reg
    #[arg(long)]
    no_opt: bool,

    /// Restrict the allocator to the first N general registers
    #[arg(long, value_name = "N")]
    regs: Option<usize>,

    /// What to print; may be repeated (default: mips)
    #[arg(long, value_enum)]
    emit: Vec<Dump>,

    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Log pass summaries
    #[arg(short, long)]
    verbose: bool,
}

fn read_input(path: &PathBuf) -> CompileResult<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn run(cli: &Cli) -> CompileResult<()> {
    let source = read_input(&cli.input)?;
    let mut module = parse_module(&source)?;

    let mut options = CompilerOptions {
        optimize: !cli.no_opt,
        ..CompilerOptions::default()
    };
    if let Some(n) = cli.regs {
        options.registers = RegisterBudget::first(n);
    }
    let dumps = if cli.emit.is_empty() {
        vec![Dump::Mips]
    } else {
        cli.emit.clone()
    };

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let text = render_dumps(&session, &mut module, options, &dumps)?;

    match &cli.output {
        Some(path) => fs::write(path, text)?,
        None => print!("{}", text),
    }

    log::debug!("{}", session.stats());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::init();
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
