// This module implements the Analyzer component that computes the block order every later
// pass iterates in. It performs a depth-first traversal from the entry block over successor
// edges, visiting each block once, and records the reverse of the resulting postorder. The
// traversal uses an explicit stack of (block, processed) pairs instead of recursion so that
// deeply nested control flow cannot exhaust the call stack. Blocks that never appear in the
// order are unreachable from entry; the analyzer exposes that as a query, which CFG
// simplification uses to prune dead blocks and dominance uses to restrict itself to live
// code. The analyzer works on anything implementing CfgAdaptor: IR functions, machine
// functions and the bare graphs used by the randomized tests.

use super::adaptor::CfgAdaptor;
use super::error::CompileResult;

/// Computes reverse postorder and reachability for one graph.
#[derive(Debug, Clone)]
pub struct Analyzer<B> {
    order: Vec<B>,
    /// Position in `order` by dense block index.
    position: Vec<Option<usize>>,
}

impl<B: Copy + Eq> Analyzer<B> {
    /// Build the block order for `graph`.
    pub fn analyze<G>(graph: &G) -> CompileResult<Self>
    where
        G: CfgAdaptor<BlockRef = B>,
    {
        let entry = graph.entry_block();
        let mut visited = vec![false; graph.block_capacity()];
        let mut post = Vec::new();
        let mut stack = vec![(entry, false)];
        while let Some((block, processed)) = stack.pop() {
            if processed {
                post.push(block);
                continue;
            }
            let idx = graph.block_index(block);
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            stack.push((block, true));
            // The last successor is explored first, which puts the first
            // successor earlier in the reversed order.
            for succ in graph.successors(block)? {
                if !visited[graph.block_index(succ)] {
                    stack.push((succ, false));
                }
            }
        }
        post.reverse();

        let mut position = vec![None; graph.block_capacity()];
        for (pos, &b) in post.iter().enumerate() {
            position[graph.block_index(b)] = Some(pos);
        }
        Ok(Self {
            order: post,
            position,
        })
    }

    /// Sequence of reachable blocks in reverse post order.
    pub fn order(&self) -> &[B] {
        &self.order
    }

    /// RPO position of a block by its dense index.
    pub fn position_of_index(&self, index: usize) -> Option<usize> {
        self.position.get(index).copied().flatten()
    }

    pub fn is_reachable_index(&self, index: usize) -> bool {
        self.position_of_index(index).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, Module};

    #[test]
    fn test_rpo_diamond_and_unreachable() {
        let mut m = Module::new();
        let mut b = FunctionBuilder::new(&mut m, "f", 1, false);
        let entry = b.create_block("entry");
        let left = b.create_block("left");
        let right = b.create_block("right");
        let join = b.create_block("join");
        let dead = b.create_block("dead");
        b.switch_to(entry);
        let p = b.param(0);
        b.branch(p, left, right);
        b.switch_to(left);
        b.jump(join);
        b.switch_to(right);
        b.jump(join);
        b.switch_to(join);
        b.ret(None);
        b.switch_to(dead);
        b.jump(join);

        let f = b.func();
        let analyzer = Analyzer::analyze(f).unwrap();
        assert_eq!(analyzer.order(), &[entry, left, right, join]);
        assert!(!analyzer.is_reachable_index(dead.index()));
        assert_eq!(analyzer.position_of_index(join.index()), Some(3));
    }
}
