//! Textual IR (TIR) reader and FileCheck-style test runner.
//!
//! The format is small enough to write tests by hand and covers every
//! instruction of the IR:
//!
//! ```text
//! ; Comments start with semicolon
//! global @g = 3                 ; scalar
//! global @arr[4] = 1, 2         ; array, zero-filled tail
//! const @k = 7
//! string @s = "hi\n"
//!
//! func @f(%a) -> int {          ; or -> void
//! entry:
//!   %x = alloca [1]
//!   store %x, 0, %a
//!   %v = load %x, 0
//!   %c = lt %v, 10
//!   br %c, ^then, ^join
//! then:
//!   call @putint(%v)
//!   jump ^join
//! join:
//!   %p = phi [^then, 1], [^entry, %v]
//!   print "p=%d\n", %p
//!   ret %p                      ; or `ret`
//! }
//! ```
//!
//! Phi incoming pairs may be listed in any order; they are matched to the
//! predecessor list by block. Values and blocks may be referenced before
//! their definition within a function, and functions anywhere in the file.

pub mod check;
pub mod compiler;
pub mod parser;

pub use check::{CheckDirective, RunDirective, TestRunner, TestSpec};
pub use compiler::{render_dumps, Dump};
pub use parser::parse_module;
