//! Frame finalize: saved registers, prologue, epilogue and stack parameter
//! offsets.
//!
//! Frame layout, from high to low addresses:
//!
//! ```text
//! caller's outgoing stack arguments     <- caller sp
//! saved registers (4 bytes each)
//! locals and spill slots               <- sp + 0 .. sp + frame_size
//! ```

use super::function::{MBlockId, MachineFunction};
use super::instruction::{MBinOp, MInst};
use super::operand::MachineOperand;
use super::registers::MipsReg;
use crate::core::{CompileError, CompileResult, RegBitSet};

/// MARS `exit` service.
const EXIT_SYSCALL: i32 = 10;

fn adjust_sp(delta: i32) -> MInst<'static> {
    MInst::Binary {
        op: MBinOp::Addu,
        dst: MachineOperand::SP,
        lhs: MachineOperand::SP,
        rhs: MachineOperand::Immediate(delta),
    }
}

/// Registers the function must preserve: every general register it writes,
/// plus `ra`. `main` never returns and preserves nothing.
pub fn saved_registers(mf: &MachineFunction) -> Vec<MipsReg> {
    if mf.is_main {
        return Vec::new();
    }
    let mut set = RegBitSet::new();
    set.set(MipsReg::Ra);
    for id in mf.placed_insts() {
        for op in mf.inst(id).defs() {
            if let Some(r) = op.reg().filter(|r| r.is_general()) {
                set.set(r);
            }
        }
    }
    set.iter().collect()
}

pub fn finalize_frame(mf: &mut MachineFunction) -> CompileResult<()> {
    if let Some(id) = mf.placed_insts().find(|&id| {
        let inst = mf.inst(id);
        inst.defs().into_iter().chain(inst.uses()).any(|op| op.as_virtual().is_some())
    }) {
        return Err(CompileError::invariant(
            &mf.name,
            format!("frame finalize before allocation: {:?}", mf.inst(id)),
        ));
    }

    let saved = saved_registers(mf);
    let frame = mf.frame_size();
    let saved_bytes = 4 * saved.len() as i32;

    let mut prologue = Vec::new();
    if saved_bytes > 0 {
        prologue.push(adjust_sp(-saved_bytes));
        for (i, &r) in saved.iter().enumerate() {
            prologue.push(MInst::Store {
                src: MachineOperand::PreColored(r),
                base: MachineOperand::SP,
                offset: 4 * i as i32,
            });
        }
    }
    if frame > 0 {
        prologue.push(adjust_sp(-frame));
    }
    let entry = MBlockId(0);
    for (pos, inst) in prologue.into_iter().enumerate() {
        mf.insert_at(entry, pos, inst);
    }

    for b in mf.block_ids().collect::<Vec<_>>() {
        let returns: Vec<usize> = mf
            .insts_of(b)
            .iter()
            .enumerate()
            .filter(|&(_, &id)| matches!(mf.inst(id), MInst::Return { .. }))
            .map(|(pos, _)| pos)
            .collect();
        // Back to front so earlier positions stay valid.
        for &pos in returns.iter().rev() {
            if mf.is_main {
                let id = mf.insts_of(b)[pos];
                *mf.inst_mut(id) = MInst::Move {
                    dst: MachineOperand::V0,
                    src: MachineOperand::Immediate(EXIT_SYSCALL),
                };
                mf.insert_at(b, pos + 1, MInst::Syscall);
                continue;
            }
            let mut epilogue = Vec::new();
            if frame > 0 {
                epilogue.push(adjust_sp(frame));
            }
            for (i, &r) in saved.iter().enumerate() {
                epilogue.push(MInst::Load {
                    dst: MachineOperand::PreColored(r),
                    base: MachineOperand::SP,
                    offset: 4 * i as i32,
                });
            }
            if saved_bytes > 0 {
                epilogue.push(adjust_sp(saved_bytes));
            }
            for (k, inst) in epilogue.into_iter().enumerate() {
                mf.insert_at(b, pos + k, inst);
            }
        }
    }

    let fixup = frame + saved_bytes;
    for id in mf.deferred_param_loads().to_vec() {
        if let MInst::Load { offset, .. } = mf.inst_mut(id) {
            *offset += fixup;
        }
    }
    log::debug!(
        "{}: frame {} bytes, {} saved registers",
        mf.name,
        frame,
        saved.len()
    );
    mf.set_saved_regs(saved);
    Ok(())
}
