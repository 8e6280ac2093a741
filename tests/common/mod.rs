//! Shared helpers for the integration tests.

#![allow(dead_code)]

pub mod cfg_gen;
pub mod interp;
pub mod machine_sim;

use bumpalo::Bump;
use sysmips::core::{CompilationSession, CompileResult, Compiler, CompilerOptions, RegisterBudget};
use sysmips::ir::Module;
use sysmips::mips::MachineModule;
use sysmips::test_ir::parse_module;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Optimize and lower `module` with the first `regs` general registers.
/// Labels of the result live in `arena`.
pub fn compile_with<'a>(arena: &'a Bump, module: &mut Module, regs: usize) -> CompileResult<MachineModule<'a>> {
    compile_with_options(
        arena,
        module,
        CompilerOptions {
            registers: RegisterBudget::first(regs),
            ..CompilerOptions::default()
        },
    )
}

pub fn compile_with_options<'a>(
    arena: &'a Bump,
    module: &mut Module,
    options: CompilerOptions,
) -> CompileResult<MachineModule<'a>> {
    let session = CompilationSession::new(arena);
    Compiler::new(&session, options).compile_module(module)
}

/// Parse a `.tir` source, panicking with the parse error on failure.
pub fn parse(source: &str) -> Module {
    match parse_module(source) {
        Ok(module) => module,
        Err(e) => panic!("test source does not parse: {}", e),
    }
}
