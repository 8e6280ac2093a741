//! Simulator for allocated and finalized machine code.
//!
//! Runs a [`MachineModule`] the way MARS would run the printed assembly:
//! a 32-entry register file, byte-addressed little-endian memory, `.data`
//! laid out from `0x10010000` and the stack growing down from `0x7fffeffc`.
//! Runtime stubs are executed as the syscalls they wrap.
//!
//! The simulator also checks the calling convention. `sp` and every general
//! register must survive a call, `ra` must hold the return address when a
//! function returns, and the argument registers are poisoned after a call so
//! code that relies on them shows up as wrong output.

use std::collections::{HashMap, VecDeque};
use sysmips::mips::{
    builtin_for_label, function_label, syscall_code, DataItem, MBlockId, MInst, MachineModule, MachineOperand,
    MipsReg,
};

const DATA_BASE: u32 = 0x1001_0000;
const STACK_TOP: u32 = 0x7fff_effc;
const POISON: i32 = 0x0bad_0000;

pub struct Machine<'m> {
    module: &'m MachineModule<'m>,
    regs: [i32; 32],
    memory: HashMap<u32, u8>,
    labels: HashMap<String, u32>,
    functions: HashMap<String, usize>,
    input: VecDeque<i32>,
    output: String,
    steps: usize,
    step_limit: usize,
    next_token: i32,
}

enum Flow {
    Returned,
    Exited,
}

fn reg_index(r: MipsReg) -> usize {
    r.index()
}

impl<'m> Machine<'m> {
    pub fn new(module: &'m MachineModule<'m>, input: &[i32]) -> Self {
        let mut memory = HashMap::new();
        let mut labels = HashMap::new();
        let mut addr = DATA_BASE;
        for item in &module.data {
            labels.insert(item.label().to_string(), addr);
            match item {
                DataItem::Words { values, .. } => {
                    for &w in values {
                        for (i, b) in w.to_le_bytes().into_iter().enumerate() {
                            memory.insert(addr + i as u32, b);
                        }
                        addr += 4;
                    }
                }
                DataItem::Ascii { bytes, .. } => {
                    for &b in bytes {
                        memory.insert(addr, b);
                        addr += 1;
                    }
                    memory.insert(addr, 0);
                    addr = (addr + 1 + 3) & !3;
                }
            }
        }
        let functions = module
            .functions
            .iter()
            .enumerate()
            .map(|(i, f)| (function_label(&f.name), i))
            .collect();

        let mut regs = [0; 32];
        for (i, r) in regs.iter_mut().enumerate() {
            *r = POISON + i as i32;
        }
        regs[reg_index(MipsReg::Zero)] = 0;
        regs[reg_index(MipsReg::Sp)] = STACK_TOP as i32;

        Self {
            module,
            regs,
            memory,
            labels,
            functions,
            input: input.iter().copied().collect(),
            output: String::new(),
            steps: 0,
            step_limit: 1_000_000,
            next_token: 0x0040_0000,
        }
    }

    /// Run `main` until it exits. Returns what the program printed.
    pub fn run(mut self) -> Result<String, String> {
        let main = *self
            .functions
            .get("main")
            .ok_or_else(|| "module has no main".to_string())?;
        match self.run_function(main)? {
            Flow::Exited => Ok(self.output),
            Flow::Returned => Err("main returned instead of exiting".to_string()),
        }
    }

    fn read(&self, op: MachineOperand) -> Result<i32, String> {
        match op {
            MachineOperand::PreColored(r) | MachineOperand::Allocated(r) => Ok(self.regs[reg_index(r)]),
            MachineOperand::Immediate(c) => Ok(c),
            MachineOperand::Virtual(n) => Err(format!("read of virtual register %v{}", n)),
        }
    }

    fn write(&mut self, op: MachineOperand, v: i32) -> Result<(), String> {
        match op {
            MachineOperand::PreColored(MipsReg::Zero) | MachineOperand::Allocated(MipsReg::Zero) => Ok(()),
            MachineOperand::PreColored(r) | MachineOperand::Allocated(r) => {
                self.regs[reg_index(r)] = v;
                Ok(())
            }
            other => Err(format!("write to {}", other)),
        }
    }

    fn load_word(&self, addr: i32) -> Result<i32, String> {
        let addr = addr as u32;
        if addr % 4 != 0 {
            return Err(format!("unaligned load at {:#x}", addr));
        }
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.memory.get(&(addr + i as u32)).copied().unwrap_or(0);
        }
        Ok(i32::from_le_bytes(bytes))
    }

    fn store_word(&mut self, addr: i32, v: i32) -> Result<(), String> {
        let addr = addr as u32;
        if addr % 4 != 0 {
            return Err(format!("unaligned store at {:#x}", addr));
        }
        for (i, b) in v.to_le_bytes().into_iter().enumerate() {
            self.memory.insert(addr + i as u32, b);
        }
        Ok(())
    }

    fn syscall(&mut self) -> Result<Option<Flow>, String> {
        let a0 = self.regs[reg_index(MipsReg::A0)];
        match self.regs[reg_index(MipsReg::V0)] {
            1 => self.output.push_str(&a0.to_string()),
            4 => {
                let mut addr = a0 as u32;
                while let Some(&b) = self.memory.get(&addr).filter(|&&b| b != 0) {
                    self.output.push(b as char);
                    addr += 1;
                }
            }
            5 => self.regs[reg_index(MipsReg::V0)] = self.input.pop_front().unwrap_or(0),
            10 => return Ok(Some(Flow::Exited)),
            11 => self.output.push(a0 as u8 as char),
            code => return Err(format!("unknown syscall {}", code)),
        }
        Ok(None)
    }

    fn call(&mut self, callee: &str, stack_args: usize) -> Result<Option<Flow>, String> {
        self.next_token += 8;
        if let Some(builtin) = builtin_for_label(callee) {
            self.regs[reg_index(MipsReg::Ra)] = self.next_token;
            self.regs[reg_index(MipsReg::V0)] = syscall_code(builtin);
            return self.syscall();
        }
        let idx = *self
            .functions
            .get(callee)
            .ok_or_else(|| format!("call to unknown label {}", callee))?;

        let saved: Vec<(MipsReg, i32)> = MipsReg::ALL
            .iter()
            .filter(|r| r.is_general())
            .map(|&r| (r, self.regs[reg_index(r)]))
            .collect();
        let sp = self.regs[reg_index(MipsReg::Sp)];

        self.regs[reg_index(MipsReg::Sp)] = sp - 4 * stack_args as i32;
        self.regs[reg_index(MipsReg::Ra)] = self.next_token;
        if let Flow::Exited = self.run_function(idx)? {
            return Ok(Some(Flow::Exited));
        }
        self.regs[reg_index(MipsReg::Sp)] += 4 * stack_args as i32;

        if self.regs[reg_index(MipsReg::Sp)] != sp {
            return Err(format!("{} did not restore $sp", callee));
        }
        for (r, v) in saved {
            if self.regs[reg_index(r)] != v {
                return Err(format!("{} clobbered {}", callee, r));
            }
        }
        for r in [MipsReg::A0, MipsReg::A1, MipsReg::A2, MipsReg::A3] {
            self.regs[reg_index(r)] = POISON;
        }
        Ok(None)
    }

    fn run_function(&mut self, idx: usize) -> Result<Flow, String> {
        let module = self.module;
        let mf = &module.functions[idx];
        let order: Vec<MBlockId> = mf.block_ids().collect();
        let entry_ra = self.regs[reg_index(MipsReg::Ra)];
        let entry_sp = self.regs[reg_index(MipsReg::Sp)];

        let mut block = order[0];
        let mut pos = 0;
        loop {
            let insts = mf.insts_of(block);
            if pos >= insts.len() {
                let at = order.iter().position(|&b| b == block).unwrap_or(order.len());
                block = *order
                    .get(at + 1)
                    .ok_or_else(|| format!("{}: fell off the last block", mf.name))?;
                pos = 0;
                continue;
            }
            self.steps += 1;
            if self.steps > self.step_limit {
                return Err("step limit exceeded".to_string());
            }
            let inst = mf.inst(insts[pos]);
            pos += 1;
            match inst {
                MInst::Binary { op, dst, lhs, rhs } => {
                    let v = op
                        .eval(self.read(*lhs)?, self.read(*rhs)?)
                        .ok_or_else(|| format!("{}: division by zero", mf.name))?;
                    self.write(*dst, v)?;
                }
                MInst::Compare { cond, dst, lhs, rhs } => {
                    let v = cond.holds(self.read(*lhs)?, self.read(*rhs)?) as i32;
                    self.write(*dst, v)?;
                }
                MInst::Move { dst, src } => {
                    let v = self.read(*src)?;
                    self.write(*dst, v)?;
                }
                MInst::LoadAddr { dst, symbol } => {
                    let addr = *self
                        .labels
                        .get(*symbol)
                        .ok_or_else(|| format!("unknown data label {}", symbol))?;
                    self.write(*dst, addr as i32)?;
                }
                MInst::Load { dst, base, offset } => {
                    let v = self.load_word(self.read(*base)?.wrapping_add(*offset))?;
                    self.write(*dst, v)?;
                }
                MInst::Store { src, base, offset } => {
                    let v = self.read(*src)?;
                    let addr = self.read(*base)?.wrapping_add(*offset);
                    self.store_word(addr, v)?;
                }
                MInst::Branch { cond, lhs, rhs, target } => {
                    if cond.holds(self.read(*lhs)?, self.read(*rhs)?) {
                        block = *target;
                        pos = 0;
                    }
                }
                MInst::Jump { target } => {
                    block = *target;
                    pos = 0;
                }
                MInst::Call { callee, stack_args, .. } => {
                    if let Some(Flow::Exited) = self.call(callee, *stack_args)? {
                        return Ok(Flow::Exited);
                    }
                }
                MInst::Return { .. } => {
                    if self.regs[reg_index(MipsReg::Ra)] != entry_ra {
                        return Err(format!("{}: $ra not restored", mf.name));
                    }
                    if self.regs[reg_index(MipsReg::Sp)] != entry_sp {
                        return Err(format!("{}: $sp not restored", mf.name));
                    }
                    return Ok(Flow::Returned);
                }
                MInst::Syscall => {
                    if let Some(flow) = self.syscall()? {
                        return Ok(flow);
                    }
                }
            }
        }
    }
}

/// Run an allocated module's `main`.
pub fn run_machine(module: &MachineModule, input: &[i32]) -> Result<String, String> {
    Machine::new(module, input).run()
}
