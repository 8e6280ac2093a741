//! Register sets and the allocatable register budget.
//!
//! `RegBitSet` tracks a set of MIPS registers in one 32-bit mask; it backs
//! the saved-register set computed by frame finalize and the allocatable set
//! the coloring pass draws from. `RegisterBudget` is the configuration knob
//! that decides `k`, the number of colors.

use crate::mips::MipsReg;

/// Bit set for efficiently tracking register sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegBitSet {
    mask: u32,
}

impl RegBitSet {
    /// Create empty register set.
    pub fn new() -> Self {
        Self { mask: 0 }
    }

    pub fn from_regs(regs: &[MipsReg]) -> Self {
        let mut set = Self::new();
        for &reg in regs {
            set.set(reg);
        }
        set
    }

    /// Check if register is set.
    pub fn contains(&self, reg: MipsReg) -> bool {
        self.mask & (1u32 << reg.index()) != 0
    }

    /// Set a register.
    pub fn set(&mut self, reg: MipsReg) {
        self.mask |= 1u32 << reg.index();
    }

    /// Clear a register.
    pub fn clear(&mut self, reg: MipsReg) {
        self.mask &= !(1u32 << reg.index());
    }

    /// Set union with another set.
    pub fn union(&mut self, other: &RegBitSet) {
        self.mask |= other.mask;
    }

    /// Lowest-numbered register in this set that is not in `exclude`.
    pub fn find_first(&self, exclude: &RegBitSet) -> Option<MipsReg> {
        let available = self.mask & !exclude.mask;
        if available == 0 {
            return None;
        }
        MipsReg::from_index(available.trailing_zeros() as usize)
    }

    pub fn count(&self) -> u32 {
        self.mask.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Registers in ascending hardware order.
    pub fn iter(&self) -> impl Iterator<Item = MipsReg> + '_ {
        MipsReg::ALL.iter().copied().filter(|r| self.contains(*r))
    }
}

/// The set of registers the allocator may hand out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBudget {
    allocatable: RegBitSet,
}

impl RegisterBudget {
    /// The general registers `t0..t7`, `s0..s7`, `t8`, `t9`.
    pub fn general() -> Self {
        let regs: Vec<MipsReg> = MipsReg::ALL.iter().copied().filter(|r| r.is_general()).collect();
        Self {
            allocatable: RegBitSet::from_regs(&regs),
        }
    }

    /// The first `n` general registers; used to stress the spiller.
    pub fn first(n: usize) -> Self {
        let regs: Vec<MipsReg> = MipsReg::ALL
            .iter()
            .copied()
            .filter(|r| r.is_general())
            .take(n.max(1))
            .collect();
        Self {
            allocatable: RegBitSet::from_regs(&regs),
        }
    }

    /// Number of colors.
    pub fn k(&self) -> usize {
        self.allocatable.count() as usize
    }

    pub fn allocatable(&self) -> &RegBitSet {
        &self.allocatable
    }

    pub fn contains(&self, reg: MipsReg) -> bool {
        self.allocatable.contains(reg)
    }
}

impl Default for RegisterBudget {
    fn default() -> Self {
        Self::general()
    }
}
