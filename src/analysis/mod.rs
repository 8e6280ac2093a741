//! Control-flow analyses.
//!
//! Reverse postorder lives in [`crate::core::Analyzer`]; this module builds
//! on it:
//! - [`dominance`]: dominator sets, immediate dominators, the dominator
//!   tree with depths, and dominance frontiers.
//! - [`loops`]: the natural loop forest.
//! - [`dump`]: text listings of the above.
//!
//! Everything is generic over [`crate::core::CfgAdaptor`], and every walk
//! uses an explicit stack.

pub mod dominance;
pub mod dump;
pub mod loops;

pub use dominance::DominatorTree;
pub use dump::{format_dominance, format_frontiers, format_loops, format_rpo};
pub use loops::{Loop, LoopId, LoopInfo};

/// Dense bit set over small integer positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSet {
    words: Vec<u64>,
    len: usize,
}

impl BlockSet {
    pub fn empty(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn full(len: usize) -> Self {
        let mut set = Self::empty(len);
        for i in 0..len {
            set.insert(i);
        }
        set
    }

    pub fn insert(&mut self, i: usize) {
        self.words[i / 64] |= 1u64 << (i % 64);
    }

    pub fn contains(&self, i: usize) -> bool {
        i < self.len && self.words[i / 64] & (1u64 << (i % 64)) != 0
    }

    pub fn intersect_with(&mut self, other: &BlockSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= *b;
        }
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.contains(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_set_ops() {
        let mut a = BlockSet::full(70);
        let mut b = BlockSet::empty(70);
        b.insert(3);
        b.insert(69);
        a.intersect_with(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![3, 69]);
        assert!(!a.contains(70));
        assert_eq!(a.count(), 2);
    }
}
