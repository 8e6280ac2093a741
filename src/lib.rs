//! sysmips - SSA middle-end and MIPS32 backend for a small C-like language.
//!
//! The crate takes an SSA module, cleans up its control flow, promotes
//! stack slots to registers and lowers the result to MARS-style MIPS
//! assembly.
//!
//! # Primary Usage
//!
//! ```ignore
//! use sysmips::core::{CompilationSession, Compiler, CompilerOptions};
//! use sysmips::test_ir::parse_module;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let mut module = parse_module(source)?;
//! let compiler = Compiler::new(&session, CompilerOptions::default());
//! let asm = compiler.compile_to_assembly(&mut module)?;
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - SSA graph, builder, printer and verifier
//! - [`analysis`] - reverse postorder, dominators, frontiers and loops
//! - [`opt`] - CFG simplification and mem2reg
//! - [`mips`] - instruction selection, register allocation, frame layout and output
//! - [`core`] - shared infrastructure (errors, session, graph adaptor, pipeline)
//! - [`test_ir`] - textual IR reader and FileCheck-style runner

/// Declares a `u32` newtype id addressing one of the IR arenas.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

pub mod analysis;
pub mod core;
pub mod ir;
pub mod mips;
pub mod opt;
pub mod test_ir;

pub use crate::core::{
    CfgAdaptor, CompilationSession, CompileError, CompileResult, Compiler, CompilerOptions,
    RegisterBudget,
};
pub use crate::ir::{Function, FunctionBuilder, Module};
pub use crate::mips::{MachineFunction, MachineModule};
