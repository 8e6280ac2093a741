// This module is the MIPS32 backend of sysmips. Instruction selection walks an optimized IR
// function block by block and produces a MachineFunction over virtual registers, with phis
// lowered to parallel copy groups. Block liveness and iterated register coalescing then map
// virtual registers onto the allocatable budget, spilling through the frame until a round
// colors every node. Frame finalize adds the prologue and epilogue, the exit sequence of
// main and the final stack parameter offsets. The printer writes MARS-style assembly with the
// runtime stubs for the builtin functions appended after the user code.

//! MIPS32 backend.
//!
//! Pipeline per function:
//! [`isel::select_function`] -> [`regalloc::allocate_registers`] ->
//! [`frame::finalize_frame`]. [`printer::print_module`] renders the result.

pub mod frame;
pub mod function;
pub mod instruction;
pub mod isel;
pub mod liveness;
pub mod operand;
mod phi_lowering;
pub mod printer;
pub mod regalloc;
pub mod registers;
pub mod runtime;

pub use frame::finalize_frame;
pub use function::{function_label, DataItem, MBlockId, MInstId, MachineBlock, MachineFunction, MachineModule};
pub use instruction::{Cond, MBinOp, MInst, CALL_CLOBBERS};
pub use isel::{data_section, global_label, select_function, string_label};
pub use liveness::{format_liveness, node_of, Liveness, NodeId};
pub use operand::MachineOperand;
pub use printer::{print_function, print_module};
pub use regalloc::{allocate_registers, Allocation};
pub use registers::{MipsReg, ARG_REGS};
pub use runtime::{builtin_for_label, builtin_label, runtime_stubs, syscall_code};
