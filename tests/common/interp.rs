//! Reference interpreter for IR modules.
//!
//! Executes the SSA graph directly: phis read the slot of the edge taken,
//! memory is a flat word map, and the builtins read from a fixed input
//! queue and append to an output string. Every pass is checked by running
//! the program before and after and comparing what it printed.

use std::collections::{HashMap, VecDeque};
use sysmips::ir::{BlockId, Builtin, Callee, FuncId, InstKind, Module, PrintPiece, StringId, ValueId, ValueKind};

const GLOBAL_BASE: i32 = 0x1000;
const STRING_BASE: i32 = 0x8_0000;
const STACK_BASE: i32 = 0x10_0000;

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub output: String,
    /// `None` when main has no return value.
    pub result: Option<i32>,
    /// The step budget ran out before main returned.
    pub exhausted: bool,
}

pub struct Interpreter<'m> {
    module: &'m Module,
    memory: HashMap<i32, i32>,
    globals: Vec<i32>,
    strings: HashMap<i32, StringId>,
    stack_top: i32,
    input: VecDeque<i32>,
    output: String,
    steps: usize,
    step_limit: usize,
}

enum Stop {
    Exhausted,
    Fault(String),
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module, input: &[i32]) -> Self {
        let mut memory = HashMap::new();
        let mut globals = Vec::new();
        let mut addr = GLOBAL_BASE;
        for g in module.globals() {
            globals.push(addr);
            for w in g.initial_words() {
                memory.insert(addr, w);
                addr += 4;
            }
        }
        let strings = (0..module.strings().len())
            .map(|i| (STRING_BASE + 4 * i as i32, StringId(i as u32)))
            .collect();
        Self {
            module,
            memory,
            globals,
            strings,
            stack_top: STACK_BASE,
            input: input.iter().copied().collect(),
            output: String::new(),
            steps: 0,
            step_limit: 100_000,
        }
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Run `name` with `args`.
    pub fn run(mut self, name: &str, args: &[i32]) -> Result<Run, String> {
        let id = self
            .module
            .function_by_name(name)
            .ok_or_else(|| format!("no function {}", name))?;
        match self.call(id, args) {
            Ok(result) => Ok(Run {
                output: self.output,
                result,
                exhausted: false,
            }),
            Err(Stop::Exhausted) => Ok(Run {
                output: self.output,
                result: None,
                exhausted: true,
            }),
            Err(Stop::Fault(msg)) => Err(msg),
        }
    }

    fn builtin(&mut self, builtin: Builtin, args: &[i32]) -> Result<Option<i32>, Stop> {
        match builtin {
            Builtin::GetInt => return Ok(Some(self.input.pop_front().unwrap_or(0))),
            Builtin::PutInt => self.output.push_str(&args[0].to_string()),
            Builtin::PutCh => self.output.push(args[0] as u8 as char),
            Builtin::PutStr => {
                let id = self
                    .strings
                    .get(&args[0])
                    .copied()
                    .ok_or_else(|| Stop::Fault(format!("putstr of non-string {}", args[0])))?;
                self.put_string(id);
            }
        }
        Ok(None)
    }

    fn put_string(&mut self, id: StringId) {
        let module = self.module;
        for b in module.string(id).bytes() {
            self.output.push(b as char);
        }
    }

    fn call(&mut self, id: FuncId, args: &[i32]) -> Result<Option<i32>, Stop> {
        let module = self.module;
        let func = module.function(id);
        let frame_base = self.stack_top;
        let mut env: HashMap<ValueId, i32> = HashMap::new();

        let value = |env: &HashMap<ValueId, i32>, this: &Self, v: ValueId| -> Result<i32, Stop> {
            match func.value(v).kind {
                ValueKind::Const(c) => Ok(c),
                ValueKind::Param(i) => Ok(args[i as usize]),
                ValueKind::Global(g) => Ok(this.globals[g.index()]),
                ValueKind::Str(s) => Ok(STRING_BASE + 4 * s.0 as i32),
                ValueKind::Inst(_) => env
                    .get(&v)
                    .copied()
                    .ok_or_else(|| Stop::Fault(format!("{}: {} read before definition", func.name, func.value_label(v)))),
            }
        };

        let mut block = func.entry();
        let mut prev: Option<BlockId> = None;
        loop {
            if let Some(p) = prev {
                let slot = func
                    .pred_index(block, p)
                    .ok_or_else(|| Stop::Fault(format!("{}: edge into non-successor", func.name)))?;
                let incoming: Vec<(ValueId, i32)> = func
                    .phis(block)
                    .into_iter()
                    .map(|phi| {
                        let v = value(&env, self, func.operands(phi)[slot])?;
                        Ok((func.result(phi).unwrap_or_else(|| unreachable!()), v))
                    })
                    .collect::<Result<_, Stop>>()?;
                env.extend(incoming);
            }

            let mut next = None;
            for &inst in func.insts_of(block) {
                self.steps += 1;
                if self.steps > self.step_limit {
                    return Err(Stop::Exhausted);
                }
                let ops: Vec<ValueId> = func.operands(inst).to_vec();
                let result = func.result(inst);
                match func.kind(inst) {
                    InstKind::Phi => {}
                    InstKind::Binary(op) => {
                        let l = value(&env, self, ops[0])?;
                        let r = value(&env, self, ops[1])?;
                        let v = op
                            .eval(l, r)
                            .ok_or_else(|| Stop::Fault(format!("{}: division by zero", func.name)))?;
                        env.insert(result.unwrap_or_else(|| unreachable!()), v);
                    }
                    InstKind::Alloca { words } => {
                        let addr = self.stack_top;
                        for i in 0..*words as i32 {
                            self.memory.remove(&(addr + 4 * i));
                        }
                        self.stack_top += 4 * *words as i32;
                        env.insert(result.unwrap_or_else(|| unreachable!()), addr);
                    }
                    InstKind::Load => {
                        let addr = value(&env, self, ops[0])? + 4 * value(&env, self, ops[1])?;
                        let v = self.memory.get(&addr).copied().unwrap_or(0);
                        env.insert(result.unwrap_or_else(|| unreachable!()), v);
                    }
                    InstKind::Store => {
                        let addr = value(&env, self, ops[0])? + 4 * value(&env, self, ops[1])?;
                        let v = value(&env, self, ops[2])?;
                        self.memory.insert(addr, v);
                    }
                    InstKind::Gep { multiplier } => {
                        let base = value(&env, self, ops[0])?;
                        let idx = value(&env, self, ops[1])?;
                        let v = base.wrapping_add(idx.wrapping_mul(*multiplier).wrapping_mul(4));
                        env.insert(result.unwrap_or_else(|| unreachable!()), v);
                    }
                    InstKind::Call { callee } => {
                        let mut vals = Vec::with_capacity(ops.len());
                        for &o in &ops {
                            vals.push(value(&env, self, o)?);
                        }
                        let ret = match callee {
                            Callee::Func(f) => self.call(*f, &vals)?,
                            Callee::Builtin(b) => self.builtin(*b, &vals)?,
                        };
                        if let (Some(r), Some(v)) = (result, ret) {
                            env.insert(r, v);
                        }
                    }
                    InstKind::Print { pieces } => {
                        let mut args = ops.iter();
                        for piece in pieces {
                            match piece {
                                PrintPiece::Str(id) => self.put_string(*id),
                                PrintPiece::Arg => {
                                    let &v = args
                                        .next()
                                        .ok_or_else(|| Stop::Fault("print is short of arguments".to_string()))?;
                                    let n = value(&env, self, v)?;
                                    self.output.push_str(&n.to_string());
                                }
                            }
                        }
                    }
                    InstKind::Jump { target } => next = Some(*target),
                    InstKind::Branch { then_block, else_block } => {
                        let c = value(&env, self, ops[0])?;
                        next = Some(if c != 0 { *then_block } else { *else_block });
                    }
                    InstKind::Return => {
                        let ret = match ops.first() {
                            Some(&v) => Some(value(&env, self, v)?),
                            None => None,
                        };
                        self.stack_top = frame_base;
                        return Ok(ret);
                    }
                }
            }
            let Some(target) = next else {
                return Err(Stop::Fault(format!("{}: fell off block {}", func.name, func.block_name(block))));
            };
            prev = Some(block);
            block = target;
        }
    }
}

/// Run `main` with no arguments.
pub fn run_main(module: &Module, input: &[i32]) -> Result<Run, String> {
    Interpreter::new(module, input).run("main", &[])
}
