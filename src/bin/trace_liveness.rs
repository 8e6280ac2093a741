//! Prints block liveness of the selected (not yet allocated) machine code.
//!
//! Usage: `trace_liveness [INPUT.tir]`. Without an input a small loop is
//! traced.

use bumpalo::Bump;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::process::ExitCode;
use sysmips::core::{CompilationSession, CompileResult, Compiler, CompilerOptions};
use sysmips::mips::liveness::node_name;
use sysmips::mips::{format_liveness, Liveness, NodeId};
use sysmips::test_ir::parse_module;

const SAMPLE: &str = r#"
func @main() -> int {
entry:
  %a = call @getint()
  jump ^loop
loop:
  %b = phi [^entry, 0], [^loop, %e]
  %c = phi [^entry, %a], [^loop, %f]
  %e = add %b, %c
  %f = sub %c, 1
  %done = le %f, 0
  br %done, ^ret, ^loop
ret:
  ret %e
}
"#;

fn names(set: &BTreeSet<NodeId>) -> String {
    set.iter().map(|&n| node_name(n)).collect::<Vec<_>>().join(" ")
}

fn run(source: &str) -> CompileResult<()> {
    let mut module = parse_module(source)?;
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiler = Compiler::new(&session, CompilerOptions::default());
    compiler.optimize_module(&mut module)?;
    let selected = compiler.select_module(&module)?;

    for mf in &selected.functions {
        let liveness = Liveness::compute(mf, &compiler.options().registers)?;
        println!("Tracing {} ({} blocks)", mf.label(), mf.block_count());
        for b in mf.block_ids() {
            let block = mf.block(b);
            println!("  {}:", block.label);
            println!("    use: {}", names(liveness.live_use(b)));
            println!("    def: {}", names(liveness.def(b)));
        }
        print!("{}", format_liveness(mf, &liveness));
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let source = match env::args().nth(1) {
        Some(path) => match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("error: could not read '{}': {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => SAMPLE.to_string(),
    };

    match run(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
