//! Construction API used by the lowering collaborator and the textual IR reader.
//!
//! The builder keeps predecessor lists in step with the terminators it
//! emits: `jump` and `branch` append the current block to each target's
//! predecessor list, so phis created afterwards line up with edge order.

use super::function::Function;
use super::instruction::{BinaryOp, Builtin, Callee, InstKind, PrintPiece};
use super::module::Module;
use super::{BlockId, FuncId, InstId, ValueId};

pub struct FunctionBuilder<'m> {
    module: &'m mut Module,
    func: FuncId,
    current: Option<BlockId>,
}

impl<'m> FunctionBuilder<'m> {
    /// Register a new function and start building it.
    pub fn new(module: &'m mut Module, name: &str, param_count: usize, returns_value: bool) -> Self {
        let func = module.add_function(Function::new(name, param_count, returns_value));
        Self {
            module,
            func,
            current: None,
        }
    }

    /// Continue building a function that is already registered.
    pub fn resume(module: &'m mut Module, func: FuncId) -> Self {
        Self {
            module,
            func,
            current: None,
        }
    }

    pub fn func_id(&self) -> FuncId {
        self.func
    }

    pub fn func(&self) -> &Function {
        self.module.function(self.func)
    }

    pub fn func_mut(&mut self) -> &mut Function {
        self.module.function_mut(self.func)
    }

    pub fn module(&mut self) -> &mut Module {
        &mut *self.module
    }

    pub fn param(&self, idx: usize) -> ValueId {
        self.func().params()[idx]
    }

    pub fn create_block(&mut self, name: &str) -> BlockId {
        self.func_mut().create_block(name)
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current
    }

    pub fn const_int(&mut self, c: i32) -> ValueId {
        self.func_mut().const_value(c)
    }

    pub fn global(&mut self, name: &str) -> Option<ValueId> {
        let g = self.module.global_by_name(name)?;
        Some(self.func_mut().global_value(g))
    }

    fn emit(&mut self, kind: InstKind, operands: Vec<ValueId>, has_result: bool) -> InstId {
        let block = self
            .current
            .unwrap_or_else(|| panic!("builder has no current block"));
        let func = self.func_mut();
        let inst = func.create_inst(kind, operands, has_result);
        func.push_back(block, inst);
        inst
    }

    fn emit_value(&mut self, kind: InstKind, operands: Vec<ValueId>) -> ValueId {
        let inst = self.emit(kind, operands, true);
        self.func()
            .result(inst)
            .unwrap_or_else(|| panic!("value-producing instruction without result"))
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.emit_value(InstKind::Binary(op), vec![lhs, rhs])
    }

    pub fn alloca(&mut self, words: u32) -> ValueId {
        self.emit_value(InstKind::Alloca { words }, vec![])
    }

    pub fn load(&mut self, base: ValueId, index: ValueId) -> ValueId {
        self.emit_value(InstKind::Load, vec![base, index])
    }

    pub fn store(&mut self, base: ValueId, index: ValueId, data: ValueId) -> InstId {
        self.emit(InstKind::Store, vec![base, index, data], false)
    }

    pub fn gep(&mut self, base: ValueId, index: ValueId, multiplier: i32) -> ValueId {
        self.emit_value(InstKind::Gep { multiplier }, vec![base, index])
    }

    pub fn call(&mut self, callee: FuncId, args: Vec<ValueId>) -> Option<ValueId> {
        let returns = self.module.function(callee).returns_value;
        self.func_mut().add_callee(callee);
        let inst = self.emit(InstKind::Call { callee: Callee::Func(callee) }, args, returns);
        self.func().result(inst)
    }

    pub fn call_builtin(&mut self, builtin: Builtin, args: Vec<ValueId>) -> Option<ValueId> {
        let inst = self.emit(
            InstKind::Call { callee: Callee::Builtin(builtin) },
            args,
            builtin.returns_value(),
        );
        self.func().result(inst)
    }

    /// Lower a `printf`: the format is split on `%d`, literal chunks become
    /// string constants and each `%d` binds the next argument.
    pub fn print(&mut self, format_literal: &str, args: Vec<ValueId>) -> InstId {
        let inner = format_literal
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(format_literal);
        let mut pieces = Vec::new();
        let chunks: Vec<&str> = inner.split("%d").collect();
        for (i, chunk) in chunks.iter().enumerate() {
            if !chunk.is_empty() {
                let id = self.module.add_string(&format!("\"{}\"", chunk));
                pieces.push(PrintPiece::Str(id));
            }
            if i + 1 < chunks.len() {
                pieces.push(PrintPiece::Arg);
            }
        }
        self.emit(InstKind::Print { pieces }, args, false)
    }

    pub fn jump(&mut self, target: BlockId) -> InstId {
        let from = self.current.unwrap_or_else(|| panic!("builder has no current block"));
        let inst = self.emit(InstKind::Jump { target }, vec![], false);
        self.func_mut().add_pred(target, from);
        inst
    }

    pub fn branch(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId) -> InstId {
        let from = self.current.unwrap_or_else(|| panic!("builder has no current block"));
        let inst = self.emit(InstKind::Branch { then_block, else_block }, vec![cond], false);
        self.func_mut().add_pred(then_block, from);
        self.func_mut().add_pred(else_block, from);
        inst
    }

    pub fn ret(&mut self, value: Option<ValueId>) -> InstId {
        self.emit(InstKind::Return, value.into_iter().collect(), false)
    }

    /// Create a phi in `block` with one slot per current predecessor.
    /// `incoming` maps predecessors to values; every predecessor must be
    /// covered. A predecessor that appears twice takes the same value twice.
    pub fn phi(&mut self, block: BlockId, incoming: &[(BlockId, ValueId)]) -> Option<ValueId> {
        let preds = self.func().preds(block).to_vec();
        let mut operands = Vec::with_capacity(preds.len());
        for pred in preds {
            let (_, v) = incoming.iter().find(|(b, _)| *b == pred)?;
            operands.push(*v);
        }
        let func = self.func_mut();
        let inst = func.create_inst(InstKind::Phi, operands, true);
        func.insert_phi(block, inst);
        func.result(inst)
    }

    /// Create a phi with no slots yet; operands are pushed as edges appear.
    pub fn empty_phi(&mut self, block: BlockId) -> (InstId, ValueId) {
        let func = self.func_mut();
        let inst = func.create_inst(InstKind::Phi, vec![], true);
        func.insert_phi(block, inst);
        let v = func.result(inst).unwrap_or_else(|| unreachable!());
        (inst, v)
    }
}
