//! Functions: value, instruction and block arenas plus the use-list index.
//!
//! All operand mutation goes through [`Function::set_operand`],
//! [`Function::push_operand`], [`Function::remove_operand`],
//! [`Function::replace_all_uses`] and [`Function::remove_inst`]. Each of them
//! updates the per-value use-list in the same step, so `uses(v)` always holds
//! exactly one [`Use`] per operand slot that reads `v`.
//!
//! Predecessor lists are edited explicitly. [`Function::remove_pred_at`] also
//! drops the matching phi slot; [`Function::add_pred`] does not add one, the
//! caller pushes an operand onto every phi of the block.

use super::instruction::{InstData, InstKind};
use super::value::{Use, ValueData, ValueKind};
use super::{BlockId, FuncId, GlobalId, InstId, StringId, ValueId};
use crate::core::{CfgAdaptor, CompileError, CompileResult};
use hashbrown::HashMap;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct BlockData {
    pub name: String,
    pub(crate) insts: Vec<InstId>,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) removed: bool,
}

impl BlockData {
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    pub fn preds(&self) -> &[BlockId] {
        &self.preds
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub returns_value: bool,
    params: Vec<ValueId>,
    values: Vec<ValueData>,
    insts: Vec<InstData>,
    blocks: Vec<BlockData>,
    layout: Vec<BlockId>,
    consts: HashMap<i32, ValueId>,
    global_refs: HashMap<GlobalId, ValueId>,
    string_refs: HashMap<StringId, ValueId>,
    callees: BTreeSet<FuncId>,
}

impl Function {
    pub fn new(name: &str, param_count: usize, returns_value: bool) -> Self {
        let mut func = Self {
            name: name.to_string(),
            returns_value,
            params: Vec::with_capacity(param_count),
            values: Vec::new(),
            insts: Vec::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
            consts: HashMap::new(),
            global_refs: HashMap::new(),
            string_refs: HashMap::new(),
            callees: BTreeSet::new(),
        };
        for i in 0..param_count {
            let v = func.new_value(ValueKind::Param(i as u32));
            func.params.push(v);
        }
        func
    }

    // ---------------------------------------------------------------------
    // Values
    // ---------------------------------------------------------------------

    fn new_value(&mut self, kind: ValueKind) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData::new(kind));
        id
    }

    pub fn params(&self) -> &[ValueId] {
        &self.params
    }

    /// The interned constant for `c`; one shared value per payload.
    pub fn const_value(&mut self, c: i32) -> ValueId {
        if let Some(&v) = self.consts.get(&c) {
            return v;
        }
        let v = self.new_value(ValueKind::Const(c));
        self.consts.insert(c, v);
        v
    }

    pub fn global_value(&mut self, global: GlobalId) -> ValueId {
        if let Some(&v) = self.global_refs.get(&global) {
            return v;
        }
        let v = self.new_value(ValueKind::Global(global));
        self.global_refs.insert(global, v);
        v
    }

    pub fn string_value(&mut self, string: StringId) -> ValueId {
        if let Some(&v) = self.string_refs.get(&string) {
            return v;
        }
        let v = self.new_value(ValueKind::Str(string));
        self.string_refs.insert(string, v);
        v
    }

    pub fn value(&self, v: ValueId) -> &ValueData {
        &self.values[v.index()]
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn set_value_name(&mut self, v: ValueId, name: &str) {
        self.values[v.index()].name = Some(name.to_string());
    }

    pub fn as_const(&self, v: ValueId) -> Option<i32> {
        self.values[v.index()].as_const()
    }

    pub fn uses(&self, v: ValueId) -> &[Use] {
        &self.values[v.index()].uses
    }

    pub fn defining_inst(&self, v: ValueId) -> Option<InstId> {
        match self.values[v.index()].kind {
            ValueKind::Inst(inst) => Some(inst),
            _ => None,
        }
    }

    /// Diagnostic label for a value.
    pub fn value_label(&self, v: ValueId) -> String {
        let data = &self.values[v.index()];
        match (&data.name, data.kind) {
            (_, ValueKind::Const(c)) => c.to_string(),
            (Some(name), _) => format!("%{}", name),
            (None, _) => format!("%v{}", v.0),
        }
    }

    fn add_use(&mut self, v: ValueId, u: Use) {
        self.values[v.index()].uses.push(u);
    }

    fn remove_use(&mut self, v: ValueId, u: Use) {
        let uses = &mut self.values[v.index()].uses;
        match uses.iter().position(|x| *x == u) {
            Some(pos) => {
                uses.swap_remove(pos);
            }
            None => panic!(
                "{}: use-list of {:?} is missing {:?}",
                self.name, v, u
            ),
        }
    }

    // ---------------------------------------------------------------------
    // Instructions and operands
    // ---------------------------------------------------------------------

    /// Create a detached instruction. Its operand uses are registered
    /// immediately; place it with one of the insertion methods.
    pub fn create_inst(&mut self, kind: InstKind, operands: Vec<ValueId>, has_result: bool) -> InstId {
        let id = InstId(self.insts.len() as u32);
        let result = if has_result {
            Some(self.new_value(ValueKind::Inst(id)))
        } else {
            None
        };
        for (slot, &v) in operands.iter().enumerate() {
            self.add_use(v, Use { user: id, slot });
        }
        self.insts.push(InstData {
            kind,
            operands,
            result,
            block: None,
        });
        id
    }

    pub fn inst(&self, inst: InstId) -> &InstData {
        &self.insts[inst.index()]
    }

    pub fn kind(&self, inst: InstId) -> &InstKind {
        &self.insts[inst.index()].kind
    }

    pub fn operands(&self, inst: InstId) -> &[ValueId] {
        &self.insts[inst.index()].operands
    }

    pub fn result(&self, inst: InstId) -> Option<ValueId> {
        self.insts[inst.index()].result
    }

    pub fn inst_block(&self, inst: InstId) -> Option<BlockId> {
        self.insts[inst.index()].block
    }

    /// Redirect one operand slot; the old value loses the use, `v` gains it.
    pub fn set_operand(&mut self, inst: InstId, slot: usize, v: ValueId) {
        let old = self.insts[inst.index()].operands[slot];
        if old == v {
            return;
        }
        let u = Use { user: inst, slot };
        self.remove_use(old, u);
        self.add_use(v, u);
        self.insts[inst.index()].operands[slot] = v;
    }

    pub fn push_operand(&mut self, inst: InstId, v: ValueId) {
        let slot = self.insts[inst.index()].operands.len();
        self.insts[inst.index()].operands.push(v);
        self.add_use(v, Use { user: inst, slot });
    }

    /// Remove one operand slot; later slots shift down by one.
    pub fn remove_operand(&mut self, inst: InstId, slot: usize) {
        let old = self.insts[inst.index()].operands[slot];
        self.remove_use(old, Use { user: inst, slot });
        let len = self.insts[inst.index()].operands.len();
        for later in slot + 1..len {
            let v = self.insts[inst.index()].operands[later];
            let uses = &mut self.values[v.index()].uses;
            if let Some(u) = uses.iter_mut().find(|u| u.user == inst && u.slot == later) {
                u.slot = later - 1;
            }
        }
        self.insts[inst.index()].operands.remove(slot);
    }

    /// Redirect every use of `old` to `new`. Returns the number of uses moved.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) -> usize {
        if old == new {
            return 0;
        }
        let moved = std::mem::take(&mut self.values[old.index()].uses);
        for u in &moved {
            self.insts[u.user.index()].operands[u.slot] = new;
        }
        let count = moved.len();
        self.values[new.index()].uses.extend(moved);
        count
    }

    fn detach_operands(&mut self, inst: InstId) {
        let operands = std::mem::take(&mut self.insts[inst.index()].operands);
        for (slot, v) in operands.into_iter().enumerate() {
            self.remove_use(v, Use { user: inst, slot });
        }
    }

    // ---------------------------------------------------------------------
    // Blocks
    // ---------------------------------------------------------------------

    pub fn create_block(&mut self, name: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            name: name.to_string(),
            insts: Vec::new(),
            preds: Vec::new(),
            removed: false,
        });
        self.layout.push(id);
        id
    }

    pub fn entry(&self) -> BlockId {
        self.layout[0]
    }

    /// Live blocks in layout order.
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    pub fn block(&self, b: BlockId) -> &BlockData {
        &self.blocks[b.index()]
    }

    pub fn block_name(&self, b: BlockId) -> &str {
        &self.blocks[b.index()].name
    }

    pub fn block_arena_len(&self) -> usize {
        self.blocks.len()
    }

    pub fn insts_of(&self, b: BlockId) -> &[InstId] {
        &self.blocks[b.index()].insts
    }

    pub fn preds(&self, b: BlockId) -> &[BlockId] {
        &self.blocks[b.index()].preds
    }

    fn is_terminated(&self, b: BlockId) -> bool {
        self.blocks[b.index()]
            .insts
            .last()
            .is_some_and(|&i| self.insts[i.index()].kind.is_terminator())
    }

    fn phi_prefix_len(&self, b: BlockId) -> usize {
        self.blocks[b.index()]
            .insts
            .iter()
            .take_while(|&&i| self.insts[i.index()].kind.is_phi())
            .count()
    }

    fn position(&self, inst: InstId) -> (BlockId, usize) {
        let block = self.insts[inst.index()]
            .block
            .unwrap_or_else(|| panic!("{}: {:?} is not placed in a block", self.name, inst));
        let pos = self.blocks[block.index()]
            .insts
            .iter()
            .position(|&i| i == inst)
            .unwrap_or_else(|| panic!("{}: {:?} missing from its block", self.name, inst));
        (block, pos)
    }

    fn place(&mut self, block: BlockId, pos: usize, inst: InstId) {
        assert!(
            self.insts[inst.index()].block.is_none(),
            "{}: {:?} is already placed",
            self.name,
            inst
        );
        self.blocks[block.index()].insts.insert(pos, inst);
        self.insts[inst.index()].block = Some(block);
    }

    /// Append to a block. A block takes nothing after its terminator.
    pub fn push_back(&mut self, block: BlockId, inst: InstId) {
        assert!(
            !self.is_terminated(block),
            "{}: block {} already has a terminator",
            self.name,
            self.block_name(block)
        );
        if self.insts[inst.index()].kind.is_phi() {
            assert_eq!(
                self.phi_prefix_len(block),
                self.blocks[block.index()].insts.len(),
                "{}: phi appended after non-phi instructions",
                self.name
            );
        }
        let pos = self.blocks[block.index()].insts.len();
        self.place(block, pos, inst);
    }

    /// Insert at the end of a block's phi prefix.
    pub fn insert_phi(&mut self, block: BlockId, inst: InstId) {
        assert!(self.insts[inst.index()].kind.is_phi());
        let pos = self.phi_prefix_len(block);
        self.place(block, pos, inst);
    }

    pub fn insert_before(&mut self, anchor: InstId, inst: InstId) {
        let (block, pos) = self.position(anchor);
        let kind = &self.insts[inst.index()].kind;
        assert!(!kind.is_terminator(), "{}: terminators are appended, not inserted", self.name);
        if kind.is_phi() {
            assert!(pos <= self.phi_prefix_len(block), "{}: phi inserted after non-phi", self.name);
        } else {
            assert!(
                !self.insts[anchor.index()].kind.is_phi(),
                "{}: non-phi inserted into the phi prefix",
                self.name
            );
        }
        self.place(block, pos, inst);
    }

    pub fn insert_after(&mut self, anchor: InstId, inst: InstId) {
        let (block, pos) = self.position(anchor);
        assert!(
            !self.insts[anchor.index()].kind.is_terminator(),
            "{}: nothing may follow a terminator",
            self.name
        );
        let kind = &self.insts[inst.index()].kind;
        assert!(!kind.is_terminator(), "{}: terminators are appended, not inserted", self.name);
        if kind.is_phi() {
            assert!(self.insts[anchor.index()].kind.is_phi(), "{}: phi inserted after non-phi", self.name);
        } else {
            assert!(
                pos + 1 >= self.phi_prefix_len(block),
                "{}: non-phi inserted into the phi prefix",
                self.name
            );
        }
        self.place(block, pos + 1, inst);
    }

    /// Remove an instruction. Its result must no longer be used.
    pub fn remove_inst(&mut self, inst: InstId) -> CompileResult<()> {
        if let Some(result) = self.insts[inst.index()].result {
            if let Some(u) = self.values[result.index()].uses.first() {
                return Err(CompileError::DanglingUse {
                    function: self.name.clone(),
                    value: self.value_label(result),
                    user: format!("inst {}", u.user.0),
                });
            }
            self.values[result.index()].live = false;
        }
        self.detach_operands(inst);
        if let Some(block) = self.insts[inst.index()].block.take() {
            self.blocks[block.index()].insts.retain(|&i| i != inst);
        }
        Ok(())
    }

    /// Remove whole blocks. Operands of every instruction in the set are
    /// dropped first, so values used only inside the set may go with it;
    /// a value still read from outside is a dangling use.
    pub fn remove_blocks(&mut self, doomed: &[BlockId]) -> CompileResult<()> {
        let doomed_insts: Vec<InstId> = doomed
            .iter()
            .flat_map(|&b| self.blocks[b.index()].insts.clone())
            .collect();
        for &inst in &doomed_insts {
            self.detach_operands(inst);
        }
        for &inst in &doomed_insts {
            self.remove_inst(inst)?;
        }
        for &b in doomed {
            self.blocks[b.index()].removed = true;
            self.blocks[b.index()].preds.clear();
        }
        self.layout.retain(|b| !doomed.contains(b));
        Ok(())
    }

    /// The terminator of `b`, which must be its last instruction.
    pub fn terminator(&self, b: BlockId) -> CompileResult<InstId> {
        match self.blocks[b.index()].insts.last() {
            Some(&inst) if self.insts[inst.index()].kind.is_terminator() => Ok(inst),
            _ => Err(CompileError::MissingTerminator {
                function: self.name.clone(),
                block: self.block_name(b).to_string(),
            }),
        }
    }

    /// Successors from the terminator tag: branch gives (true, false),
    /// jump gives its target, return gives none.
    pub fn successors(&self, b: BlockId) -> CompileResult<Vec<BlockId>> {
        let term = self.terminator(b)?;
        Ok(self.insts[term.index()].kind.targets())
    }

    /// Swap the terminator of `b` for a new one. Predecessor lists of the
    /// old and new targets are left to the caller.
    pub fn replace_terminator(
        &mut self,
        b: BlockId,
        kind: InstKind,
        operands: Vec<ValueId>,
    ) -> CompileResult<InstId> {
        let old = self.terminator(b)?;
        self.remove_inst(old)?;
        let inst = self.create_inst(kind, operands, false);
        self.push_back(b, inst);
        Ok(inst)
    }

    /// Point the first arm of `inst` that targets `from` at `to`.
    pub fn redirect_target(&mut self, inst: InstId, from: BlockId, to: BlockId) -> bool {
        match &mut self.insts[inst.index()].kind {
            InstKind::Jump { target } if *target == from => {
                *target = to;
                true
            }
            InstKind::Branch { then_block, .. } if *then_block == from => {
                *then_block = to;
                true
            }
            InstKind::Branch { else_block, .. } if *else_block == from => {
                *else_block = to;
                true
            }
            _ => false,
        }
    }

    pub fn phis(&self, b: BlockId) -> Vec<InstId> {
        self.blocks[b.index()]
            .insts
            .iter()
            .copied()
            .take_while(|&i| self.insts[i.index()].kind.is_phi())
            .collect()
    }

    pub fn pred_index(&self, b: BlockId, pred: BlockId) -> Option<usize> {
        self.blocks[b.index()].preds.iter().position(|&p| p == pred)
    }

    /// Append a predecessor. Phi slots are the caller's job.
    pub fn add_pred(&mut self, b: BlockId, pred: BlockId) {
        self.blocks[b.index()].preds.push(pred);
    }

    /// Drop predecessor `idx` together with slot `idx` of every phi.
    pub fn remove_pred_at(&mut self, b: BlockId, idx: usize) {
        for phi in self.phis(b) {
            self.remove_operand(phi, idx);
        }
        self.blocks[b.index()].preds.remove(idx);
    }

    // ---------------------------------------------------------------------
    // Call graph bookkeeping
    // ---------------------------------------------------------------------

    pub fn add_callee(&mut self, callee: FuncId) {
        self.callees.insert(callee);
    }

    pub fn callees(&self) -> &BTreeSet<FuncId> {
        &self.callees
    }

    /// Instructions currently placed in blocks, in layout order.
    pub fn placed_insts(&self) -> impl Iterator<Item = InstId> + '_ {
        self.layout
            .iter()
            .flat_map(move |&b| self.blocks[b.index()].insts.iter().copied())
    }

    pub fn inst_arena_len(&self) -> usize {
        self.insts.len()
    }
}

impl CfgAdaptor for Function {
    type BlockRef = BlockId;

    fn graph_name(&self) -> &str {
        &self.name
    }

    fn entry_block(&self) -> BlockId {
        self.entry()
    }

    fn blocks(&self) -> Vec<BlockId> {
        self.layout.clone()
    }

    fn block_index(&self, block: BlockId) -> usize {
        block.index()
    }

    fn block_capacity(&self) -> usize {
        self.blocks.len()
    }

    fn successors(&self, block: BlockId) -> CompileResult<Vec<BlockId>> {
        Function::successors(self, block)
    }

    fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        self.blocks[block.index()].preds.clone()
    }

    fn block_label(&self, block: BlockId) -> String {
        self.block_name(block).to_string()
    }
}
