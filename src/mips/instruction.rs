//! Machine instructions.
//!
//! Every kind reports its defined and used operands so liveness, the
//! allocator and the spiller never need to know the kind itself. Operand
//! rewrites go through [`MInst::map_operands`], which visits each register
//! field exactly once.

use super::function::MBlockId;
use super::operand::MachineOperand;
use super::registers::{MipsReg, ARG_REGS};
use crate::ir::BinaryOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MBinOp {
    Addu,
    Subu,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Sll,
}

impl MBinOp {
    pub fn from_ir(op: BinaryOp) -> Option<MBinOp> {
        Some(match op {
            BinaryOp::Add => MBinOp::Addu,
            BinaryOp::Sub => MBinOp::Subu,
            BinaryOp::Mul => MBinOp::Mul,
            BinaryOp::Div => MBinOp::Div,
            BinaryOp::Mod => MBinOp::Rem,
            BinaryOp::And => MBinOp::And,
            BinaryOp::Or => MBinOp::Or,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            MBinOp::Addu => "addu",
            MBinOp::Subu => "subu",
            MBinOp::Mul => "mul",
            MBinOp::Div => "div",
            MBinOp::Rem => "rem",
            MBinOp::And => "and",
            MBinOp::Or => "or",
            MBinOp::Sll => "sll",
        }
    }

    /// Mnemonic when the right operand is an immediate.
    pub fn imm_mnemonic(self) -> &'static str {
        match self {
            MBinOp::Addu => "addiu",
            MBinOp::And => "andi",
            MBinOp::Or => "ori",
            other => other.mnemonic(),
        }
    }

    /// Whether an immediate `c` may be encoded as the right operand.
    pub fn accepts_immediate(self, c: i32) -> bool {
        use super::operand::{fits_signed16, fits_unsigned16};
        match self {
            MBinOp::Addu | MBinOp::Subu => fits_signed16(c),
            MBinOp::And | MBinOp::Or => fits_unsigned16(c),
            MBinOp::Sll => (0..32).contains(&c),
            MBinOp::Mul | MBinOp::Div | MBinOp::Rem => false,
        }
    }

    /// 32-bit MIPS semantics; `None` on division by zero.
    pub fn eval(self, lhs: i32, rhs: i32) -> Option<i32> {
        Some(match self {
            MBinOp::Addu => lhs.wrapping_add(rhs),
            MBinOp::Subu => lhs.wrapping_sub(rhs),
            MBinOp::Mul => lhs.wrapping_mul(rhs),
            MBinOp::Div => lhs.checked_div(rhs).or_else(|| (rhs == -1).then_some(lhs))?,
            MBinOp::Rem => lhs.checked_rem(rhs).or_else(|| (rhs == -1).then_some(0))?,
            MBinOp::And => lhs & rhs,
            MBinOp::Or => lhs | rhs,
            MBinOp::Sll => lhs.wrapping_shl(rhs as u32),
        })
    }
}

/// Condition of a set-on-condition or compare-and-branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Cond {
    pub fn from_ir(op: BinaryOp) -> Option<Cond> {
        Some(match op {
            BinaryOp::Lt => Cond::Lt,
            BinaryOp::Le => Cond::Le,
            BinaryOp::Gt => Cond::Gt,
            BinaryOp::Ge => Cond::Ge,
            BinaryOp::Eq => Cond::Eq,
            BinaryOp::Ne => Cond::Ne,
            _ => return None,
        })
    }

    pub fn set_mnemonic(self, immediate: bool) -> &'static str {
        match (self, immediate) {
            (Cond::Lt, false) => "slt",
            (Cond::Lt, true) => "slti",
            (Cond::Le, _) => "sle",
            (Cond::Gt, _) => "sgt",
            (Cond::Ge, _) => "sge",
            (Cond::Eq, _) => "seq",
            (Cond::Ne, _) => "sne",
        }
    }

    pub fn branch_mnemonic(self) -> &'static str {
        match self {
            Cond::Lt => "blt",
            Cond::Le => "ble",
            Cond::Gt => "bgt",
            Cond::Ge => "bge",
            Cond::Eq => "beq",
            Cond::Ne => "bne",
        }
    }

    pub fn holds(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Cond::Lt => lhs < rhs,
            Cond::Le => lhs <= rhs,
            Cond::Gt => lhs > rhs,
            Cond::Ge => lhs >= rhs,
            Cond::Eq => lhs == rhs,
            Cond::Ne => lhs != rhs,
        }
    }
}

/// Labels are interned in the compilation session, so instructions copy
/// them by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MInst<'s> {
    Binary {
        op: MBinOp,
        dst: MachineOperand,
        lhs: MachineOperand,
        rhs: MachineOperand,
    },
    /// Set `dst` to 1 when the condition holds, else 0.
    Compare {
        cond: Cond,
        dst: MachineOperand,
        lhs: MachineOperand,
        rhs: MachineOperand,
    },
    /// Register copy, or `li` when `src` is an immediate.
    Move { dst: MachineOperand, src: MachineOperand },
    LoadAddr { dst: MachineOperand, symbol: &'s str },
    Load {
        dst: MachineOperand,
        base: MachineOperand,
        offset: i32,
    },
    Store {
        src: MachineOperand,
        base: MachineOperand,
        offset: i32,
    },
    Branch {
        cond: Cond,
        lhs: MachineOperand,
        rhs: MachineOperand,
        target: MBlockId,
    },
    Jump { target: MBlockId },
    /// `jal`; `sp` is lowered by `4 * stack_args` around the call.
    Call {
        callee: &'s str,
        arg_regs: usize,
        stack_args: usize,
    },
    Return { uses_v0: bool },
    Syscall,
}

/// Registers a call may overwrite.
pub const CALL_CLOBBERS: [MipsReg; 6] = [
    MipsReg::A0,
    MipsReg::A1,
    MipsReg::A2,
    MipsReg::A3,
    MipsReg::V0,
    MipsReg::Ra,
];

impl MInst<'_> {
    pub fn defs(&self) -> Vec<MachineOperand> {
        match self {
            MInst::Binary { dst, .. }
            | MInst::Compare { dst, .. }
            | MInst::Move { dst, .. }
            | MInst::LoadAddr { dst, .. }
            | MInst::Load { dst, .. } => vec![*dst],
            MInst::Call { .. } => CALL_CLOBBERS.iter().map(|&r| MachineOperand::PreColored(r)).collect(),
            MInst::Syscall => vec![MachineOperand::V0],
            MInst::Store { .. } | MInst::Branch { .. } | MInst::Jump { .. } | MInst::Return { .. } => {
                Vec::new()
            }
        }
    }

    /// Register operands read; immediates are left out.
    pub fn uses(&self) -> Vec<MachineOperand> {
        let ops = match self {
            MInst::Binary { lhs, rhs, .. }
            | MInst::Compare { lhs, rhs, .. }
            | MInst::Branch { lhs, rhs, .. } => vec![*lhs, *rhs],
            MInst::Move { src, .. } => vec![*src],
            MInst::Load { base, .. } => vec![*base],
            MInst::Store { src, base, .. } => vec![*src, *base],
            MInst::Call { arg_regs, .. } => ARG_REGS[..(*arg_regs).min(4)]
                .iter()
                .map(|&r| MachineOperand::PreColored(r))
                .collect(),
            MInst::Return { uses_v0 } => {
                let mut ops = vec![MachineOperand::RA];
                if *uses_v0 {
                    ops.push(MachineOperand::V0);
                }
                ops
            }
            MInst::Syscall => vec![MachineOperand::V0, MachineOperand::PreColored(MipsReg::A0)],
            MInst::LoadAddr { .. } | MInst::Jump { .. } => Vec::new(),
        };
        ops.into_iter().filter(|op| op.is_register()).collect()
    }

    /// Rewrite every register operand field, defs and uses alike.
    pub fn map_operands(&mut self, mut f: impl FnMut(MachineOperand) -> MachineOperand) {
        let mut apply = |op: &mut MachineOperand| {
            if op.is_register() {
                *op = f(*op);
            }
        };
        match self {
            MInst::Binary { dst, lhs, rhs, .. } | MInst::Compare { dst, lhs, rhs, .. } => {
                apply(dst);
                apply(lhs);
                apply(rhs);
            }
            MInst::Move { dst, src } => {
                apply(dst);
                apply(src);
            }
            MInst::LoadAddr { dst, .. } => apply(dst),
            MInst::Load { dst, base, .. } => {
                apply(dst);
                apply(base);
            }
            MInst::Store { src, base, .. } => {
                apply(src);
                apply(base);
            }
            MInst::Branch { lhs, rhs, .. } => {
                apply(lhs);
                apply(rhs);
            }
            MInst::Jump { .. } | MInst::Call { .. } | MInst::Return { .. } | MInst::Syscall => {}
        }
    }

    /// `(dst, src)` of a register-to-register copy.
    pub fn as_move(&self) -> Option<(MachineOperand, MachineOperand)> {
        match self {
            MInst::Move { dst, src } if src.is_register() => Some((*dst, *src)),
            _ => None,
        }
    }

    pub fn is_control_transfer(&self) -> bool {
        matches!(self, MInst::Branch { .. } | MInst::Jump { .. } | MInst::Return { .. })
    }

    pub fn target(&self) -> Option<MBlockId> {
        match self {
            MInst::Branch { target, .. } | MInst::Jump { target } => Some(*target),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defs_and_uses() {
        let add = MInst::Binary {
            op: MBinOp::Addu,
            dst: MachineOperand::Virtual(2),
            lhs: MachineOperand::Virtual(0),
            rhs: MachineOperand::Immediate(4),
        };
        assert_eq!(add.defs(), vec![MachineOperand::Virtual(2)]);
        assert_eq!(add.uses(), vec![MachineOperand::Virtual(0)]);

        let call = MInst::Call {
            callee: "f",
            arg_regs: 2,
            stack_args: 0,
        };
        assert_eq!(call.uses().len(), 2);
        assert!(call.defs().contains(&MachineOperand::V0));
        assert!(call.defs().contains(&MachineOperand::RA));
    }

    #[test]
    fn test_map_operands_hits_every_field() {
        let mut store = MInst::Store {
            src: MachineOperand::Virtual(1),
            base: MachineOperand::Virtual(1),
            offset: 8,
        };
        store.map_operands(|op| match op {
            MachineOperand::Virtual(1) => MachineOperand::Virtual(9),
            other => other,
        });
        assert_eq!(store.uses(), vec![MachineOperand::Virtual(9), MachineOperand::Virtual(9)]);
    }

    #[test]
    fn test_division_semantics() {
        assert_eq!(MBinOp::Div.eval(7, 0), None);
        assert_eq!(MBinOp::Div.eval(i32::MIN, -1), Some(i32::MIN));
        assert_eq!(MBinOp::Rem.eval(-7, 2), Some(-1));
        assert!(Cond::Ge.holds(3, 3));
    }
}
