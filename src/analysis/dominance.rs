//! Dominators and dominance frontiers.
//!
//! `domBy` sets are computed by iterative dataflow over reverse postorder:
//! the entry is dominated only by itself, every other block starts at "all
//! blocks" and is intersected with `domBy(pred) ∪ {self}` until nothing
//! shrinks. Unreachable blocks take no part and have no dominance facts.

use super::BlockSet;
use crate::core::{Analyzer, CfgAdaptor, CompileError, CompileResult};
use hashbrown::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct DominatorTree<B> {
    /// Reachable blocks in reverse postorder; position 0 is the entry.
    order: Vec<B>,
    position: HashMap<B, usize>,
    dom_by: Vec<BlockSet>,
    idom: Vec<Option<usize>>,
    children: Vec<Vec<B>>,
    depth: Vec<usize>,
    frontier: Vec<Vec<B>>,
    rounds: usize,
}

impl<B: Copy + Eq + Hash> DominatorTree<B> {
    pub fn compute<G>(graph: &G) -> CompileResult<Self>
    where
        G: CfgAdaptor<BlockRef = B>,
    {
        let analyzer = Analyzer::analyze(graph)?;
        let order = analyzer.order().to_vec();
        let n = order.len();
        let position: HashMap<B, usize> = order.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let preds: Vec<Vec<usize>> = order
            .iter()
            .map(|&b| {
                graph
                    .predecessors(b)
                    .into_iter()
                    .filter_map(|p| position.get(&p).copied())
                    .collect()
            })
            .collect();

        let mut dom_by: Vec<BlockSet> = (0..n)
            .map(|i| {
                if i == 0 {
                    let mut s = BlockSet::empty(n);
                    s.insert(0);
                    s
                } else {
                    BlockSet::full(n)
                }
            })
            .collect();

        // Over RPO the sets settle within loop-connectedness + 2 rounds,
        // which never exceeds n + 2.
        let limit = n + 3;
        let mut rounds = 0;
        loop {
            rounds += 1;
            if rounds > limit {
                return Err(CompileError::NonConvergence {
                    function: graph.graph_name().to_string(),
                    analysis: "dominators",
                    rounds,
                });
            }
            let mut changed = false;
            for i in 1..n {
                let mut next = BlockSet::full(n);
                for &p in &preds[i] {
                    next.intersect_with(&dom_by[p]);
                }
                next.insert(i);
                if next != dom_by[i] {
                    dom_by[i] = next;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // idom(b): the member d of domBy(b) \ {b} that dominates no other
        // member of domBy(b) \ {b, d}.
        let mut idom = vec![None; n];
        for b in 1..n {
            let strict: Vec<usize> = dom_by[b].iter().filter(|&d| d != b).collect();
            let found = strict
                .iter()
                .copied()
                .find(|&d| strict.iter().all(|&x| x == d || !dom_by[x].contains(d)));
            match found {
                Some(d) => idom[b] = Some(d),
                None => {
                    return Err(CompileError::invariant(
                        graph.graph_name(),
                        format!("no immediate dominator for {}", graph.block_label(order[b])),
                    ))
                }
            }
        }

        let mut children = vec![Vec::new(); n];
        for b in 1..n {
            if let Some(d) = idom[b] {
                children[d].push(order[b]);
            }
        }

        let mut depth = vec![0; n];
        if n > 0 {
            let mut stack = vec![(0usize, 0usize)];
            while let Some((node, d)) = stack.pop() {
                depth[node] = d;
                for child in &children[node] {
                    stack.push((position[child], d + 1));
                }
            }
        }

        let mut tree = Self {
            order,
            position,
            dom_by,
            idom,
            children,
            depth,
            frontier: vec![Vec::new(); n],
            rounds,
        };
        tree.compute_frontiers(graph)?;
        log::trace!(
            "{}: dominators settled after {} rounds over {} blocks",
            graph.graph_name(),
            rounds,
            n
        );
        Ok(tree)
    }

    /// For every edge (from -> to), walk x up from `from` while x does not
    /// strictly dominate `to`, adding `to` to DF(x).
    fn compute_frontiers<G>(&mut self, graph: &G) -> CompileResult<()>
    where
        G: CfgAdaptor<BlockRef = B>,
    {
        for from in 0..self.order.len() {
            for to_block in graph.successors(self.order[from])? {
                let Some(&to) = self.position.get(&to_block) else {
                    continue;
                };
                let mut x = Some(from);
                while let Some(cur) = x {
                    if self.strictly_dominates_pos(cur, to) {
                        break;
                    }
                    if !self.frontier[cur].contains(&to_block) {
                        self.frontier[cur].push(to_block);
                    }
                    x = self.idom[cur];
                }
            }
        }
        Ok(())
    }

    fn strictly_dominates_pos(&self, a: usize, b: usize) -> bool {
        a != b && self.dom_by[b].contains(a)
    }

    fn pos(&self, b: B) -> Option<usize> {
        self.position.get(&b).copied()
    }

    /// Reachable blocks in reverse postorder.
    pub fn order(&self) -> &[B] {
        &self.order
    }

    pub fn root(&self) -> Option<B> {
        self.order.first().copied()
    }

    pub fn is_reachable(&self, b: B) -> bool {
        self.position.contains_key(&b)
    }

    /// Does `a` dominate `b`? False when either is unreachable.
    pub fn dominates(&self, a: B, b: B) -> bool {
        match (self.pos(a), self.pos(b)) {
            (Some(a), Some(b)) => self.dom_by[b].contains(a),
            _ => false,
        }
    }

    pub fn strictly_dominates(&self, a: B, b: B) -> bool {
        a != b && self.dominates(a, b)
    }

    /// The blocks dominating `b`, including `b`, in reverse postorder.
    pub fn dom_by(&self, b: B) -> Vec<B> {
        match self.pos(b) {
            Some(p) => self.dom_by[p].iter().map(|i| self.order[i]).collect(),
            None => Vec::new(),
        }
    }

    pub fn idom(&self, b: B) -> Option<B> {
        self.pos(b).and_then(|p| self.idom[p]).map(|i| self.order[i])
    }

    pub fn children(&self, b: B) -> &[B] {
        match self.pos(b) {
            Some(p) => &self.children[p],
            None => &[],
        }
    }

    /// Depth in the dominator tree; the entry has depth 0.
    pub fn depth(&self, b: B) -> Option<usize> {
        self.pos(b).map(|p| self.depth[p])
    }

    /// Dominance frontier of `b`.
    pub fn frontier(&self, b: B) -> &[B] {
        match self.pos(b) {
            Some(p) => &self.frontier[p],
            None => &[],
        }
    }

    /// Dominator-tree nodes in post-order (children before parents).
    pub fn post_order(&self) -> Vec<B> {
        let mut out = Vec::with_capacity(self.order.len());
        let Some(root) = self.root() else {
            return out;
        };
        let mut stack = vec![(root, false)];
        while let Some((b, expanded)) = stack.pop() {
            if expanded {
                out.push(b);
                continue;
            }
            stack.push((b, true));
            for &c in self.children(b).iter().rev() {
                stack.push((c, false));
            }
        }
        out
    }

    /// Number of dataflow rounds the last computation took.
    pub fn rounds(&self) -> usize {
        self.rounds
    }
}
