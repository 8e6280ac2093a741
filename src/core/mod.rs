// This module serves as the central hub for the shared infrastructure of sysmips. It
// exports the error type every pass returns, the compilation session that owns the arena
// for interned names and collects statistics, the CfgAdaptor trait that lets the analyses
// run over IR functions, machine functions and bare test graphs alike, the Analyzer that
// computes reverse postorder and reachability, the register sets and allocatable budget the
// backend colors from, and the Compiler that drives a module through the middle-end and the
// MIPS backend according to CompilerOptions.

//! Core sysmips infrastructure.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based name interning using `bumpalo`
//! - Compilation statistics
//!
//! ## Graph access (`adaptor`, `analyzer`)
//! - `CfgAdaptor`: the read-only CFG view the analyses need
//! - `Analyzer`: reverse postorder and reachability
//!
//! ## Registers (`register_file`)
//! - `RegBitSet` and the allocatable `RegisterBudget`
//!
//! ## Pipeline (`compiler`)
//! - `Compiler` and `CompilerOptions`

pub mod adaptor;
pub mod analyzer;
pub mod compiler;
pub mod error;
pub mod register_file;
pub mod session;
pub mod test_utils;

pub use adaptor::CfgAdaptor;
pub use analyzer::Analyzer;
pub use compiler::{Compiler, CompilerOptions};
pub use error::{CompileError, CompileResult};
pub use register_file::{RegBitSet, RegisterBudget};
pub use session::{CompilationSession, SessionStats};
