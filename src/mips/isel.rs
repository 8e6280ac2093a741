//! Instruction selection: IR function to machine function.
//!
//! One linear pass over blocks in layout order. Values map to virtual
//! registers on first reference, so phis and back-edge operands can be named
//! before their definitions are selected. Global and string addresses are
//! loaded once per function at the front of the entry block. Stack slots are
//! addressed directly off `sp` and rematerialized when an address escapes.
//!
//! A compare whose only use is the branch right after it folds into a
//! compare-and-branch. Phis are lowered last, in [`super::phi_lowering`].

use super::function::{function_label, DataItem, MBlockId, MachineFunction};
use super::instruction::{Cond, MBinOp, MInst};
use super::operand::{fits_signed16, MachineOperand};
use super::registers::ARG_REGS;
use super::runtime::builtin_label;
use crate::analysis::LoopInfo;
use crate::core::{CompilationSession, CompileError, CompileResult};
use crate::ir::{
    BinaryOp, BlockId, Callee, Function, InstId, InstKind, Module, PrintPiece, StringId, ValueId,
    ValueKind,
};
use hashbrown::{HashMap, HashSet};

pub fn global_label(name: &str) -> String {
    format!("g_{}", name)
}

pub fn string_label(name: &str) -> String {
    format!("s_{}", name)
}

/// The `.data` items of a module: globals as words, strings as bytes.
pub fn data_section<'s>(session: &CompilationSession<'s>, module: &Module) -> Vec<DataItem<'s>> {
    let mut items: Vec<DataItem<'s>> = module
        .globals()
        .iter()
        .map(|g| DataItem::Words {
            label: session.intern_str(&global_label(&g.name)),
            values: g.initial_words(),
        })
        .collect();
    items.extend(module.strings().iter().map(|s| DataItem::Ascii {
        label: session.intern_str(&string_label(&s.name)),
        bytes: s.bytes(),
    }));
    items
}

pub fn select_function<'s>(
    session: &CompilationSession<'s>,
    module: &Module,
    func: &Function,
    loops: &LoopInfo<BlockId>,
) -> CompileResult<MachineFunction<'s>> {
    let mut selector = Selector::new(session, module, func, loops)?;
    selector.select_blocks()?;
    selector.lower_phis()?;
    let mut mf = selector.mf;
    mf.link_blocks();
    log::debug!(
        "{}: selected {} machine instructions, {} virtual registers",
        func.name,
        mf.placed_count(),
        mf.vreg_count()
    );
    Ok(mf)
}

pub(super) struct Selector<'a, 's> {
    session: &'a CompilationSession<'s>,
    pub(super) module: &'a Module,
    pub(super) func: &'a Function,
    pub(super) mf: MachineFunction<'s>,
    pub(super) values: HashMap<ValueId, MachineOperand>,
    pub(super) frame_slots: HashMap<ValueId, i32>,
    pub(super) addresses: HashMap<&'s str, MachineOperand>,
    pub(super) block_map: HashMap<BlockId, MBlockId>,
    fused: HashSet<InstId>,
    entry: MBlockId,
    entry_front: usize,
    current: MBlockId,
}

impl<'a, 's> Selector<'a, 's> {
    fn new(
        session: &'a CompilationSession<'s>,
        module: &'a Module,
        func: &'a Function,
        loops: &LoopInfo<BlockId>,
    ) -> CompileResult<Self> {
        let mut mf = MachineFunction::new(&func.name, func.name == "main", func.returns_value);
        let mut block_map = HashMap::new();
        for &b in func.layout() {
            block_map.insert(b, mf.create_block(b, loops.loop_depth(b)));
        }
        let entry = block_map[&func.entry()];

        let mut selector = Self {
            session,
            module,
            func,
            mf,
            values: HashMap::new(),
            frame_slots: HashMap::new(),
            addresses: HashMap::new(),
            block_map,
            fused: HashSet::new(),
            entry,
            entry_front: 0,
            current: entry,
        };
        selector.assign_frame_slots()?;
        selector.find_fusable_compares()?;
        selector.bind_params();
        Ok(selector)
    }

    fn assign_frame_slots(&mut self) -> CompileResult<()> {
        let func = self.func;
        for inst in func.placed_insts() {
            if let InstKind::Alloca { words } = *func.kind(inst) {
                let v = self.result(inst)?;
                let offset = self.mf.alloc_frame(4 * words as i32);
                self.frame_slots.insert(v, offset);
            }
        }
        Ok(())
    }

    /// A compare folds into the branch that immediately follows it when the
    /// branch is its only user.
    fn find_fusable_compares(&mut self) -> CompileResult<()> {
        let func = self.func;
        for &b in func.layout() {
            let insts = func.insts_of(b);
            if insts.len() < 2 {
                continue;
            }
            let term = func.terminator(b)?;
            if !matches!(func.kind(term), InstKind::Branch { .. }) {
                continue;
            }
            let cond = func.operands(term)[0];
            let Some(def) = func.defining_inst(cond) else {
                continue;
            };
            let is_compare = matches!(func.kind(def), InstKind::Binary(op) if op.is_compare());
            if is_compare && func.uses(cond).len() == 1 && insts[insts.len() - 2] == def {
                self.fused.insert(def);
            }
        }
        Ok(())
    }

    fn bind_params(&mut self) {
        let func = self.func;
        for (i, &p) in func.params().iter().enumerate() {
            let dst = self.vreg_for(p);
            if i < ARG_REGS.len() {
                self.mf.push(
                    self.entry,
                    MInst::Move {
                        dst,
                        src: MachineOperand::PreColored(ARG_REGS[i]),
                    },
                );
            } else {
                let id = self.mf.push(
                    self.entry,
                    MInst::Load {
                        dst,
                        base: MachineOperand::SP,
                        offset: 4 * (i as i32 - 4),
                    },
                );
                self.mf.defer_param_load(id);
            }
        }
        self.entry_front = self.mf.insts_of(self.entry).len();
    }

    fn select_blocks(&mut self) -> CompileResult<()> {
        let func = self.func;
        for &b in func.layout() {
            self.current = self.block_map[&b];
            for &inst in func.insts_of(b) {
                if self.fused.contains(&inst) {
                    continue;
                }
                self.select_inst(inst)?;
            }
        }
        Ok(())
    }

    fn select_inst(&mut self, inst: InstId) -> CompileResult<()> {
        let func = self.func;
        let ops = func.operands(inst);
        match func.kind(inst) {
            InstKind::Binary(op) => self.select_binary(inst, *op, ops[0], ops[1]),
            InstKind::Branch { then_block, else_block } => {
                let (then_mb, else_mb) = (self.block_map[then_block], self.block_map[else_block]);
                let cond = ops[0];
                match func.defining_inst(cond).filter(|d| self.fused.contains(d)) {
                    Some(cmp) => {
                        let InstKind::Binary(op) = *func.kind(cmp) else {
                            return Err(CompileError::invariant(&func.name, "fused non-compare"));
                        };
                        let cmp_ops = func.operands(cmp);
                        let (cond, lhs, rhs) = self.compare_operands(op, cmp_ops[0], cmp_ops[1])?;
                        self.emit(MInst::Branch { cond, lhs, rhs, target: then_mb });
                    }
                    None => {
                        let lhs = self.reg(cond)?;
                        self.emit(MInst::Branch {
                            cond: Cond::Ne,
                            lhs,
                            rhs: MachineOperand::ZERO,
                            target: then_mb,
                        });
                    }
                }
                self.emit(MInst::Jump { target: else_mb });
                Ok(())
            }
            InstKind::Jump { target } => {
                let target = self.block_map[target];
                self.emit(MInst::Jump { target });
                Ok(())
            }
            InstKind::Return => {
                if let Some(&v) = ops.first() {
                    let src = self.operand(v)?;
                    self.emit(MInst::Move { dst: MachineOperand::V0, src });
                }
                self.emit(MInst::Return { uses_v0: !ops.is_empty() });
                Ok(())
            }
            InstKind::Gep { multiplier } => self.select_gep(inst, ops[0], ops[1], *multiplier),
            InstKind::Load => {
                let (base, offset) = self.address(ops[0], ops[1])?;
                let dst = self.def(inst)?;
                self.emit(MInst::Load { dst, base, offset });
                Ok(())
            }
            InstKind::Store => {
                let (base, offset) = self.address(ops[0], ops[1])?;
                let src = self.reg(ops[2])?;
                self.emit(MInst::Store { src, base, offset });
                Ok(())
            }
            InstKind::Call { callee } => {
                let label = match callee {
                    Callee::Func(id) => function_label(&self.module.function(*id).name),
                    Callee::Builtin(b) => builtin_label(*b),
                };
                let label = self.session.intern_str(&label);
                self.select_call(label, ops)?;
                if let Some(result) = func.result(inst) {
                    let dst = self.vreg_for(result);
                    self.emit(MInst::Move { dst, src: MachineOperand::V0 });
                }
                Ok(())
            }
            InstKind::Print { pieces } => self.select_print(pieces, ops),
            InstKind::Alloca { .. } | InstKind::Phi => Ok(()),
        }
    }

    fn select_binary(&mut self, inst: InstId, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> CompileResult<()> {
        let dst = self.def(inst)?;
        if op.is_compare() {
            let (cond, l, r) = self.compare_operands(op, lhs, rhs)?;
            self.emit(MInst::Compare { cond, dst, lhs: l, rhs: r });
            return Ok(());
        }
        let mop = MBinOp::from_ir(op)
            .ok_or_else(|| CompileError::invariant(&self.func.name, format!("no machine op for {:?}", op)))?;
        let (lhs, rhs) = if self.is_const(lhs) && !self.is_const(rhs) && op.is_commutative() {
            (rhs, lhs)
        } else {
            (lhs, rhs)
        };

        // x - c becomes x + (-c) so the subtraction folds into addiu.
        if let (MBinOp::Subu, Some(c)) = (mop, self.func.as_const(rhs)) {
            if let Some(neg) = c.checked_neg().filter(|n| fits_signed16(*n)) {
                let l = self.reg(lhs)?;
                self.emit(MInst::Binary {
                    op: MBinOp::Addu,
                    dst,
                    lhs: l,
                    rhs: MachineOperand::Immediate(neg),
                });
                return Ok(());
            }
        }

        let l = self.reg(lhs)?;
        let r = match self.func.as_const(rhs) {
            Some(c) if mop.accepts_immediate(c) => MachineOperand::Immediate(c),
            _ => self.reg(rhs)?,
        };
        self.emit(MInst::Binary { op: mop, dst, lhs: l, rhs: r });
        Ok(())
    }

    /// Register left, register or 16-bit immediate right. A constant on the
    /// left moves right by mirroring the condition.
    fn compare_operands(
        &mut self,
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    ) -> CompileResult<(Cond, MachineOperand, MachineOperand)> {
        let (op, lhs, rhs) = match op.swapped() {
            Some(mirrored) if self.is_const(lhs) && !self.is_const(rhs) => (mirrored, rhs, lhs),
            _ => (op, lhs, rhs),
        };
        let cond = Cond::from_ir(op)
            .ok_or_else(|| CompileError::invariant(&self.func.name, format!("{:?} is not a compare", op)))?;
        let l = self.reg(lhs)?;
        let r = match self.func.as_const(rhs) {
            Some(c) if fits_signed16(c) => MachineOperand::Immediate(c),
            _ => self.reg(rhs)?,
        };
        Ok((cond, l, r))
    }

    fn select_gep(&mut self, inst: InstId, base: ValueId, index: ValueId, multiplier: i32) -> CompileResult<()> {
        let dst = self.def(inst)?;
        let scale = multiplier.wrapping_mul(4);
        if let Some(c) = self.func.as_const(index) {
            let delta = c.wrapping_mul(scale);
            let (base_reg, offset) = match self.frame_slots.get(&base) {
                Some(&slot) => (MachineOperand::SP, slot.wrapping_add(delta)),
                None => (self.reg(base)?, delta),
            };
            self.emit_add_imm(dst, base_reg, offset);
            return Ok(());
        }
        let idx = self.reg(index)?;
        let scaled = self.mf.new_vreg();
        if scale > 0 && (scale as u32).is_power_of_two() {
            self.emit(MInst::Binary {
                op: MBinOp::Sll,
                dst: scaled,
                lhs: idx,
                rhs: MachineOperand::Immediate(scale.trailing_zeros() as i32),
            });
        } else {
            let factor = self.mf.new_vreg();
            self.emit(MInst::Move { dst: factor, src: MachineOperand::Immediate(scale) });
            self.emit(MInst::Binary { op: MBinOp::Mul, dst: scaled, lhs: idx, rhs: factor });
        }
        let base_reg = self.reg(base)?;
        self.emit(MInst::Binary { op: MBinOp::Addu, dst, lhs: base_reg, rhs: scaled });
        Ok(())
    }

    fn select_call(&mut self, label: &'s str, args: &[ValueId]) -> CompileResult<()> {
        let stack_args = args.len().saturating_sub(ARG_REGS.len());
        let below = -4 * stack_args as i32;
        for (i, &arg) in args.iter().enumerate().skip(ARG_REGS.len()) {
            let src = self.reg(arg)?;
            self.emit(MInst::Store {
                src,
                base: MachineOperand::SP,
                offset: below + 4 * (i as i32 - 4),
            });
        }
        for (i, &arg) in args.iter().take(ARG_REGS.len()).enumerate() {
            let src = self.operand(arg)?;
            self.emit(MInst::Move {
                dst: MachineOperand::PreColored(ARG_REGS[i]),
                src,
            });
        }
        self.emit(MInst::Call {
            callee: label,
            arg_regs: args.len().min(ARG_REGS.len()),
            stack_args,
        });
        Ok(())
    }

    fn select_print(&mut self, pieces: &[PrintPiece], args: &[ValueId]) -> CompileResult<()> {
        let mut args = args.iter();
        for piece in pieces {
            let (src, builtin) = match piece {
                PrintPiece::Str(id) => (self.string_address(*id), crate::ir::Builtin::PutStr),
                PrintPiece::Arg => {
                    let &v = args.next().ok_or_else(|| {
                        CompileError::invariant(&self.func.name, "print has fewer arguments than placeholders")
                    })?;
                    (self.operand(v)?, crate::ir::Builtin::PutInt)
                }
            };
            self.emit(MInst::Move {
                dst: MachineOperand::PreColored(ARG_REGS[0]),
                src,
            });
            self.emit(MInst::Call {
                callee: self.session.intern_str(&builtin_label(builtin)),
                arg_regs: 1,
                stack_args: 0,
            });
        }
        Ok(())
    }

    /// `(base register, byte offset)` of element `index` of `base`.
    fn address(&mut self, base: ValueId, index: ValueId) -> CompileResult<(MachineOperand, i32)> {
        let (base_reg, offset) = match self.frame_slots.get(&base) {
            Some(&slot) => (MachineOperand::SP, slot),
            None => (self.reg(base)?, 0),
        };
        match self.func.as_const(index) {
            Some(c) => Ok(self.fold_offset(base_reg, offset.wrapping_add(c.wrapping_mul(4)))),
            None => {
                let idx = self.reg(index)?;
                let scaled = self.mf.new_vreg();
                self.emit(MInst::Binary {
                    op: MBinOp::Sll,
                    dst: scaled,
                    lhs: idx,
                    rhs: MachineOperand::Immediate(2),
                });
                let addr = self.mf.new_vreg();
                self.emit(MInst::Binary { op: MBinOp::Addu, dst: addr, lhs: scaled, rhs: base_reg });
                Ok(self.fold_offset(addr, offset))
            }
        }
    }

    fn fold_offset(&mut self, base: MachineOperand, offset: i32) -> (MachineOperand, i32) {
        if fits_signed16(offset) {
            return (base, offset);
        }
        let addr = self.mf.new_vreg();
        self.emit_add_imm(addr, base, offset);
        (addr, 0)
    }

    fn emit_add_imm(&mut self, dst: MachineOperand, src: MachineOperand, c: i32) {
        if fits_signed16(c) {
            self.emit(MInst::Binary { op: MBinOp::Addu, dst, lhs: src, rhs: MachineOperand::Immediate(c) });
        } else {
            let t = self.mf.new_vreg();
            self.emit(MInst::Move { dst: t, src: MachineOperand::Immediate(c) });
            self.emit(MInst::Binary { op: MBinOp::Addu, dst, lhs: src, rhs: t });
        }
    }

    // ---------------------------------------------------------------------
    // Value to operand mapping
    // ---------------------------------------------------------------------

    fn emit(&mut self, inst: MInst<'s>) {
        self.mf.push(self.current, inst);
    }

    fn is_const(&self, v: ValueId) -> bool {
        self.func.as_const(v).is_some()
    }

    fn result(&self, inst: InstId) -> CompileResult<ValueId> {
        self.func
            .result(inst)
            .ok_or_else(|| CompileError::invariant(&self.func.name, format!("inst {} has no result", inst.0)))
    }

    fn def(&mut self, inst: InstId) -> CompileResult<MachineOperand> {
        let v = self.result(inst)?;
        Ok(self.vreg_for(v))
    }

    pub(super) fn vreg_for(&mut self, v: ValueId) -> MachineOperand {
        if let Some(&op) = self.values.get(&v) {
            return op;
        }
        let op = self.mf.new_vreg();
        self.values.insert(v, op);
        op
    }

    fn cached_address(&mut self, label: String) -> MachineOperand {
        let label = self.session.intern_str(&label);
        if let Some(&op) = self.addresses.get(label) {
            return op;
        }
        let dst = self.mf.new_vreg();
        self.mf
            .insert_at(self.entry, self.entry_front, MInst::LoadAddr { dst, symbol: label });
        self.entry_front += 1;
        self.addresses.insert(label, dst);
        dst
    }

    fn string_address(&mut self, id: StringId) -> MachineOperand {
        let label = string_label(&self.module.string(id).name);
        self.cached_address(label)
    }

    /// Register, immediate or cached address for `v`. Stack slot addresses
    /// are recomputed at the point of use.
    pub(super) fn operand(&mut self, v: ValueId) -> CompileResult<MachineOperand> {
        if let Some(&slot) = self.frame_slots.get(&v) {
            let dst = self.mf.new_vreg();
            self.emit_add_imm(dst, MachineOperand::SP, slot);
            return Ok(dst);
        }
        Ok(match self.func.value(v).kind {
            ValueKind::Const(c) => MachineOperand::Immediate(c),
            ValueKind::Global(g) => {
                let label = global_label(&self.module.global(g).name);
                self.cached_address(label)
            }
            ValueKind::Str(s) => self.string_address(s),
            ValueKind::Param(_) | ValueKind::Inst(_) => self.vreg_for(v),
        })
    }

    /// Like [`Self::operand`], but immediates are loaded into a register;
    /// zero reads `$zero`.
    fn reg(&mut self, v: ValueId) -> CompileResult<MachineOperand> {
        match self.operand(v)? {
            MachineOperand::Immediate(0) => Ok(MachineOperand::ZERO),
            MachineOperand::Immediate(c) => {
                let dst = self.mf.new_vreg();
                self.emit(MInst::Move { dst, src: MachineOperand::Immediate(c) });
                Ok(dst)
            }
            op => Ok(op),
        }
    }

    /// A copy of `v` into `dst`, for placement outside the current block.
    pub(super) fn copy_into(&mut self, dst: MachineOperand, v: ValueId) -> CompileResult<MInst<'s>> {
        if let Some(&slot) = self.frame_slots.get(&v) {
            return Ok(MInst::Binary {
                op: MBinOp::Addu,
                dst,
                lhs: MachineOperand::SP,
                rhs: MachineOperand::Immediate(slot),
            });
        }
        let src = match self.func.value(v).kind {
            ValueKind::Const(c) => MachineOperand::Immediate(c),
            ValueKind::Global(g) => {
                let label = global_label(&self.module.global(g).name);
                self.cached_address(label)
            }
            ValueKind::Str(s) => self.string_address(s),
            ValueKind::Param(_) | ValueKind::Inst(_) => self.vreg_for(v),
        };
        Ok(MInst::Move { dst, src })
    }
}
