// This module is the SSA intermediate representation of sysmips: values, instructions,
// basic blocks, functions and the module that owns them. Every node lives in a per-function
// arena and is addressed by a small integer id, so the graph has no owning cycles. The def-use
// relation is kept as an index from each value to the list of (instruction, operand slot)
// pairs that read it, and every operand rewrite goes through Function's accessors so that the
// index can never drift from the operand tables. Instruction kinds are a closed enum matched
// exhaustively by every pass. The builder offers the construction API used by the lowering
// collaborator and the textual IR reader, the printer emits an LLVM-style dump, and the
// verifier checks the structural invariants the passes rely on.

//! SSA IR graph.
//!
//! - [`Function`] owns values, instructions and blocks and maintains use-lists.
//! - [`Module`] owns functions, globals, string constants and the builtin registry.
//! - [`FunctionBuilder`] is the construction API.
//! - [`printer`] and [`verify`] serialize and check the graph.

pub mod builder;
pub mod function;
pub mod instruction;
pub mod module;
pub mod printer;
pub mod value;
pub mod verify;

entity_id!(
    /// Value in a function's value arena.
    ValueId
);
entity_id!(
    /// Instruction in a function's instruction arena.
    InstId
);
entity_id!(
    /// Basic block in a function's block arena.
    BlockId
);
entity_id!(
    /// Function in a module.
    FuncId
);
entity_id!(
    /// Global variable in a module.
    GlobalId
);
entity_id!(
    /// String constant in a module.
    StringId
);

pub use builder::FunctionBuilder;
pub use function::{BlockData, Function};
pub use instruction::{BinaryOp, Builtin, Callee, InstData, InstKind, PrintPiece};
pub use module::{GlobalVar, Module, StringConst};
pub use value::{Use, ValueData, ValueKind};
pub use verify::verify_function;
