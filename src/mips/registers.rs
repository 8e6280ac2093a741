//! MIPS32 register file.
//!
//! Registers are numbered the way the hardware numbers them, so ordering a
//! set of registers by number also gives the "lowest-numbered color first"
//! order the allocator relies on.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MipsReg {
    Zero = 0,
    At,
    V0,
    V1,
    A0,
    A1,
    A2,
    A3,
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    T8,
    T9,
    K0,
    K1,
    Gp,
    Sp,
    Fp,
    Ra,
}

const NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp",
    "fp", "ra",
];

/// Argument registers in calling-convention order.
pub const ARG_REGS: [MipsReg; 4] = [MipsReg::A0, MipsReg::A1, MipsReg::A2, MipsReg::A3];

impl MipsReg {
    pub const ALL: [MipsReg; 32] = [
        MipsReg::Zero,
        MipsReg::At,
        MipsReg::V0,
        MipsReg::V1,
        MipsReg::A0,
        MipsReg::A1,
        MipsReg::A2,
        MipsReg::A3,
        MipsReg::T0,
        MipsReg::T1,
        MipsReg::T2,
        MipsReg::T3,
        MipsReg::T4,
        MipsReg::T5,
        MipsReg::T6,
        MipsReg::T7,
        MipsReg::S0,
        MipsReg::S1,
        MipsReg::S2,
        MipsReg::S3,
        MipsReg::S4,
        MipsReg::S5,
        MipsReg::S6,
        MipsReg::S7,
        MipsReg::T8,
        MipsReg::T9,
        MipsReg::K0,
        MipsReg::K1,
        MipsReg::Gp,
        MipsReg::Sp,
        MipsReg::Fp,
        MipsReg::Ra,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<MipsReg> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        NAMES[self.index()]
    }

    pub fn from_name(name: &str) -> Option<MipsReg> {
        NAMES
            .iter()
            .position(|n| *n == name)
            .and_then(MipsReg::from_index)
    }

    /// The general registers handed to the allocator by default.
    pub fn is_general(self) -> bool {
        (MipsReg::T0..=MipsReg::T9).contains(&self)
    }

    /// Registers that never take part in coloring or liveness.
    pub fn is_fixed(self) -> bool {
        matches!(self, MipsReg::Zero | MipsReg::Sp)
    }
}

impl fmt::Display for MipsReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.name())
    }
}
