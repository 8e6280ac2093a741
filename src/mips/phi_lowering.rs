//! Phi lowering to parallel copies.
//!
//! Each phi gets a fresh register `t`. Every predecessor copies its incoming
//! value into `t` just before its first control transfer, and the phi's
//! block starts by copying every `t` into the phi's own register. No copy
//! ever overwrites a value another copy of the same group still reads, which
//! rules out both the lost-copy and the swap problem without splitting
//! critical edges: the `t` registers are only read at the top of the block
//! that owns them.

use super::instruction::MInst;
use super::isel::Selector;
use crate::core::{CompileError, CompileResult};
use crate::ir::BlockId;

impl Selector<'_, '_> {
    pub(super) fn lower_phis(&mut self) -> CompileResult<()> {
        let func = self.func;
        let mut lowered = 0;
        for &block in func.layout() {
            let phis = func.phis(block);
            if phis.is_empty() {
                continue;
            }
            let preds = func.preds(block);
            let target = self.block_map[&block];

            let mut temps = Vec::with_capacity(phis.len());
            for (i, &phi) in phis.iter().enumerate() {
                let slots = func.operands(phi).len();
                if slots != preds.len() {
                    return Err(CompileError::PhiArity {
                        function: func.name.clone(),
                        block: func.block_name(block).to_string(),
                        slots,
                        preds: preds.len(),
                    });
                }
                let result = func
                    .result(phi)
                    .ok_or_else(|| CompileError::invariant(&func.name, "phi without result"))?;
                let temp = self.mf.new_vreg();
                let dst = self.vreg_for(result);
                self.mf.insert_at(target, i, MInst::Move { dst, src: temp });
                temps.push(temp);
            }

            let mut seen: Vec<BlockId> = Vec::new();
            for (slot, &pred) in preds.iter().enumerate() {
                if let Some(first) = preds.iter().position(|&p| p == pred).filter(|&f| f != slot) {
                    for &phi in &phis {
                        let ops = func.operands(phi);
                        if ops[first] != ops[slot] {
                            return Err(CompileError::invariant(
                                &func.name,
                                format!(
                                    "phi in {} takes two values along the edge from {}",
                                    func.block_name(block),
                                    func.block_name(pred)
                                ),
                            ));
                        }
                    }
                }
                if seen.contains(&pred) {
                    continue;
                }
                seen.push(pred);

                let source = self.block_map[&pred];
                let mut copies = Vec::with_capacity(phis.len());
                for (&phi, &temp) in phis.iter().zip(&temps) {
                    copies.push(self.copy_into(temp, func.operands(phi)[slot])?);
                }
                let pos = self.mf.first_transfer_pos(source);
                for (k, copy) in copies.into_iter().enumerate() {
                    self.mf.insert_at(source, pos + k, copy);
                }
            }
            lowered += phis.len();
        }
        if lowered > 0 {
            log::trace!("{}: lowered {} phis to parallel copies", func.name, lowered);
        }
        Ok(())
    }
}
