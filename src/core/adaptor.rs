// This module defines the CfgAdaptor trait, the bridge between the control-flow analyses
// and whatever graph they run over. The analyses in crate::analysis (reverse postorder,
// dominators, dominance frontiers, natural loops) and the machine liveness pass only need a
// handful of queries: the entry block, the blocks in layout order, successor and predecessor
// edges, and a dense index per block so per-block facts can live in plain vectors. The IR
// Function implements the trait directly, as does MachineFunction, and the randomized tests
// implement it for bare adjacency lists. Successor queries are fallible because an IR block
// without a terminator has no defined successors; that is reported, never papered over.

//! CfgAdaptor responsibilities.
//!
//! The adaptor exposes a control-flow graph to the analyses without tying
//! them to one representation. It assumes:
//! - Each graph has a single entry block.
//! - Every block has at most two successors, derived from its terminator.
//! - Predecessor lists may contain the same block twice when both arms of a
//!   branch reach the same target.

use super::error::CompileResult;
use std::fmt::Debug;
use std::hash::Hash;

/// Read-only view of a control-flow graph.
pub trait CfgAdaptor {
    type BlockRef: Copy + Eq + Ord + Hash + Debug;

    /// Name of the graph, used in diagnostics.
    fn graph_name(&self) -> &str;

    /// The unique entry block.
    fn entry_block(&self) -> Self::BlockRef;

    /// Live blocks in layout order, entry first.
    fn blocks(&self) -> Vec<Self::BlockRef>;

    /// Dense index of a block, smaller than [`CfgAdaptor::block_capacity`].
    fn block_index(&self, block: Self::BlockRef) -> usize;

    /// Upper bound on block indices, including removed blocks.
    fn block_capacity(&self) -> usize;

    /// Successors in terminator order (true target first).
    fn successors(&self, block: Self::BlockRef) -> CompileResult<Vec<Self::BlockRef>>;

    /// Predecessors in the order phi slots are laid out.
    fn predecessors(&self, block: Self::BlockRef) -> Vec<Self::BlockRef>;

    /// Printable block label for dumps.
    fn block_label(&self, block: Self::BlockRef) -> String {
        format!("{:?}", block)
    }
}
