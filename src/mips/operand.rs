//! Machine operands.

use super::registers::MipsReg;
use std::fmt;

/// A machine operand in one of four disjoint states. A `Virtual` operand
/// becomes `Allocated` once colored; nothing moves the other way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MachineOperand {
    /// Pinned to a physical register by the calling convention or ISA.
    PreColored(MipsReg),
    /// Physical register chosen by the allocator.
    Allocated(MipsReg),
    /// Not yet colored.
    Virtual(u32),
    Immediate(i32),
}

impl MachineOperand {
    pub const ZERO: MachineOperand = MachineOperand::PreColored(MipsReg::Zero);
    pub const SP: MachineOperand = MachineOperand::PreColored(MipsReg::Sp);
    pub const V0: MachineOperand = MachineOperand::PreColored(MipsReg::V0);
    pub const RA: MachineOperand = MachineOperand::PreColored(MipsReg::Ra);

    pub fn reg(self) -> Option<MipsReg> {
        match self {
            MachineOperand::PreColored(r) | MachineOperand::Allocated(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_virtual(self) -> Option<u32> {
        match self {
            MachineOperand::Virtual(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_immediate(self) -> Option<i32> {
        match self {
            MachineOperand::Immediate(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_register(self) -> bool {
        !matches!(self, MachineOperand::Immediate(_))
    }
}

impl fmt::Display for MachineOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineOperand::PreColored(r) | MachineOperand::Allocated(r) => write!(f, "{}", r),
            MachineOperand::Virtual(n) => write!(f, "%v{}", n),
            MachineOperand::Immediate(c) => write!(f, "{}", c),
        }
    }
}

/// Fits a sign-extended 16-bit immediate field.
pub fn fits_signed16(c: i32) -> bool {
    (i16::MIN as i32..=i16::MAX as i32).contains(&c)
}

/// Fits a zero-extended 16-bit immediate field.
pub fn fits_unsigned16(c: i32) -> bool {
    (0..=u16::MAX as i32).contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_display_and_ranges() {
        assert_eq!(MachineOperand::Virtual(3).to_string(), "%v3");
        assert_eq!(MachineOperand::Allocated(MipsReg::T1).to_string(), "$t1");
        assert_eq!(MachineOperand::SP.reg(), Some(MipsReg::Sp));
        assert!(fits_signed16(-32768));
        assert!(!fits_signed16(32768));
        assert!(fits_unsigned16(65535));
        assert!(!fits_unsigned16(-1));
    }
}
