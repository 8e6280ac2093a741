//! Machine functions, blocks and modules.
//!
//! Instructions live in a per-function arena and keep their [`MInstId`] for
//! the whole pipeline; blocks hold ordered id lists. Spill code and the
//! prologue are spliced into those lists, so ids recorded during selection
//! (deferred stack-parameter loads) stay valid until frame finalize.

use super::instruction::MInst;
use super::operand::MachineOperand;
use super::registers::MipsReg;
use crate::core::{CfgAdaptor, CompileResult};
use crate::ir::BlockId;
use std::collections::BTreeSet;

entity_id!(
    /// Block in a machine function.
    MBlockId
);
entity_id!(
    /// Instruction in a machine function's arena.
    MInstId
);

#[derive(Debug, Clone)]
pub struct MachineBlock {
    pub label: String,
    /// The IR block this one was selected from.
    pub ir_block: BlockId,
    pub loop_depth: usize,
    insts: Vec<MInstId>,
    preds: Vec<MBlockId>,
}

impl MachineBlock {
    pub fn insts(&self) -> &[MInstId] {
        &self.insts
    }

    pub fn preds(&self) -> &[MBlockId] {
        &self.preds
    }
}

#[derive(Debug, Clone)]
pub struct MachineFunction<'s> {
    pub name: String,
    pub is_main: bool,
    pub returns_value: bool,
    insts: Vec<MInst<'s>>,
    blocks: Vec<MachineBlock>,
    vreg_count: u32,
    spill_temps: BTreeSet<u32>,
    /// Bytes of locals and spill slots, addressed upward from `sp`.
    frame_size: i32,
    deferred_param_loads: Vec<MInstId>,
    saved_regs: Vec<MipsReg>,
}

impl<'s> MachineFunction<'s> {
    pub fn new(name: &str, is_main: bool, returns_value: bool) -> Self {
        Self {
            name: name.to_string(),
            is_main,
            returns_value,
            insts: Vec::new(),
            blocks: Vec::new(),
            vreg_count: 0,
            spill_temps: BTreeSet::new(),
            frame_size: 0,
            deferred_param_loads: Vec::new(),
            saved_regs: Vec::new(),
        }
    }

    /// Assembly label of the function.
    pub fn label(&self) -> String {
        function_label(&self.name)
    }

    pub fn new_vreg(&mut self) -> MachineOperand {
        let n = self.vreg_count;
        self.vreg_count += 1;
        MachineOperand::Virtual(n)
    }

    pub fn vreg_count(&self) -> u32 {
        self.vreg_count
    }

    /// A fresh register for spill code; the allocator never spills it.
    pub fn new_spill_temp(&mut self) -> MachineOperand {
        let op = self.new_vreg();
        self.spill_temps.insert(self.vreg_count - 1);
        op
    }

    pub fn is_spill_temp(&self, vreg: u32) -> bool {
        self.spill_temps.contains(&vreg)
    }

    pub fn spill_temp_count(&self) -> usize {
        self.spill_temps.len()
    }

    // ---------------------------------------------------------------------
    // Blocks
    // ---------------------------------------------------------------------

    pub fn create_block(&mut self, ir_block: BlockId, loop_depth: usize) -> MBlockId {
        let id = MBlockId(self.blocks.len() as u32);
        self.blocks.push(MachineBlock {
            label: format!("{}_b{}", self.label(), id.0),
            ir_block,
            loop_depth,
            insts: Vec::new(),
            preds: Vec::new(),
        });
        id
    }

    pub fn block_ids(&self) -> impl Iterator<Item = MBlockId> {
        (0..self.blocks.len() as u32).map(MBlockId)
    }

    pub fn block(&self, b: MBlockId) -> &MachineBlock {
        &self.blocks[b.index()]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn insts_of(&self, b: MBlockId) -> &[MInstId] {
        &self.blocks[b.index()].insts
    }

    /// Successors in order of the block's branches and final jump.
    pub fn successors_of(&self, b: MBlockId) -> Vec<MBlockId> {
        let mut out = Vec::new();
        for &i in &self.blocks[b.index()].insts {
            if let Some(t) = self.insts[i.index()].target() {
                if !out.contains(&t) {
                    out.push(t);
                }
            }
        }
        out
    }

    /// Recompute predecessor lists from the control transfers.
    pub fn link_blocks(&mut self) {
        for block in &mut self.blocks {
            block.preds.clear();
        }
        for b in self.block_ids().collect::<Vec<_>>() {
            for succ in self.successors_of(b) {
                self.blocks[succ.index()].preds.push(b);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Instructions
    // ---------------------------------------------------------------------

    fn alloc_inst(&mut self, inst: MInst<'s>) -> MInstId {
        let id = MInstId(self.insts.len() as u32);
        self.insts.push(inst);
        id
    }

    pub fn inst(&self, id: MInstId) -> &MInst<'s> {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: MInstId) -> &mut MInst<'s> {
        &mut self.insts[id.index()]
    }

    pub fn push(&mut self, b: MBlockId, inst: MInst<'s>) -> MInstId {
        let id = self.alloc_inst(inst);
        self.blocks[b.index()].insts.push(id);
        id
    }

    pub fn insert_at(&mut self, b: MBlockId, pos: usize, inst: MInst<'s>) -> MInstId {
        let id = self.alloc_inst(inst);
        self.blocks[b.index()].insts.insert(pos, id);
        id
    }

    /// Position of the first branch, jump or return; the block length when
    /// there is none yet.
    pub fn first_transfer_pos(&self, b: MBlockId) -> usize {
        let insts = &self.blocks[b.index()].insts;
        insts
            .iter()
            .position(|&i| self.insts[i.index()].is_control_transfer())
            .unwrap_or(insts.len())
    }

    /// Drop instructions from a block's list; their arena slots stay.
    pub fn retain_insts(&mut self, b: MBlockId, mut keep: impl FnMut(MInstId, &MInst<'s>) -> bool) {
        let insts = &self.insts;
        self.blocks[b.index()]
            .insts
            .retain(|&i| keep(i, &insts[i.index()]));
    }

    /// Replace a block's instruction list wholesale.
    pub fn set_block_insts(&mut self, b: MBlockId, insts: Vec<MInstId>) {
        self.blocks[b.index()].insts = insts;
    }

    /// Allocate a new arena instruction without placing it.
    pub fn create_inst(&mut self, inst: MInst<'s>) -> MInstId {
        self.alloc_inst(inst)
    }

    /// Placed instructions in block order.
    pub fn placed_insts(&self) -> impl Iterator<Item = MInstId> + '_ {
        self.blocks.iter().flat_map(|b| b.insts.iter().copied())
    }

    pub fn placed_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }

    // ---------------------------------------------------------------------
    // Frame
    // ---------------------------------------------------------------------

    /// Reserve `bytes` of frame and return their offset from `sp`.
    pub fn alloc_frame(&mut self, bytes: i32) -> i32 {
        let offset = self.frame_size;
        self.frame_size += bytes;
        offset
    }

    pub fn frame_size(&self) -> i32 {
        self.frame_size
    }

    pub fn defer_param_load(&mut self, id: MInstId) {
        self.deferred_param_loads.push(id);
    }

    pub fn deferred_param_loads(&self) -> &[MInstId] {
        &self.deferred_param_loads
    }

    pub fn saved_regs(&self) -> &[MipsReg] {
        &self.saved_regs
    }

    pub(crate) fn set_saved_regs(&mut self, regs: Vec<MipsReg>) {
        self.saved_regs = regs;
    }
}

impl CfgAdaptor for MachineFunction<'_> {
    type BlockRef = MBlockId;

    fn graph_name(&self) -> &str {
        &self.name
    }

    fn entry_block(&self) -> MBlockId {
        MBlockId(0)
    }

    fn blocks(&self) -> Vec<MBlockId> {
        self.block_ids().collect()
    }

    fn block_index(&self, block: MBlockId) -> usize {
        block.index()
    }

    fn block_capacity(&self) -> usize {
        self.blocks.len()
    }

    fn successors(&self, block: MBlockId) -> CompileResult<Vec<MBlockId>> {
        Ok(self.successors_of(block))
    }

    fn predecessors(&self, block: MBlockId) -> Vec<MBlockId> {
        self.blocks[block.index()].preds.clone()
    }

    fn block_label(&self, block: MBlockId) -> String {
        self.blocks[block.index()].label.clone()
    }
}

/// Assembly label of a module function. `main` keeps its name so the
/// simulator and MARS both start there.
pub fn function_label(name: &str) -> String {
    if name == "main" {
        "main".to_string()
    } else {
        format!("f_{}", name)
    }
}

/// One item of the `.data` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataItem<'s> {
    Words { label: &'s str, values: Vec<i32> },
    Ascii { label: &'s str, bytes: Vec<u8> },
}

impl<'s> DataItem<'s> {
    pub fn label(&self) -> &'s str {
        match self {
            DataItem::Words { label, .. } | DataItem::Ascii { label, .. } => *label,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MachineModule<'s> {
    pub data: Vec<DataItem<'s>>,
    /// `main` first when present.
    pub functions: Vec<MachineFunction<'s>>,
}

impl<'s> MachineModule<'s> {
    pub fn function(&self, name: &str) -> Option<&MachineFunction<'s>> {
        self.functions.iter().find(|f| f.name == name)
    }
}
