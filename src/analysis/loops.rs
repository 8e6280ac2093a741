//! Natural loop forest.
//!
//! Headers are visited in dominator-tree post-order, so inner loops are
//! found before the loops that contain them. A loop body grows backward
//! from its back-edge sources; reaching a block that already belongs to a
//! loop promotes that loop's outermost ancestor to a child of the new one.
//! A second pass over the CFG in post-order fills in block lists, child
//! lists and the top-level list.

use super::dominance::DominatorTree;
use crate::core::{CfgAdaptor, CompileResult};
use hashbrown::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoopId(pub u32);

#[derive(Debug, Clone)]
pub struct Loop<B> {
    pub header: B,
    /// Header first, then the rest of the body including nested loops.
    pub blocks: Vec<B>,
    pub parent: Option<LoopId>,
    pub children: Vec<LoopId>,
}

#[derive(Debug, Clone)]
pub struct LoopInfo<B> {
    loops: Vec<Loop<B>>,
    /// Innermost loop of each block.
    block_loop: HashMap<B, LoopId>,
    top_level: Vec<LoopId>,
}

impl<B: Copy + Eq + Hash> LoopInfo<B> {
    pub fn compute<G>(graph: &G, dom: &DominatorTree<B>) -> CompileResult<Self>
    where
        G: CfgAdaptor<BlockRef = B>,
    {
        let mut info = Self {
            loops: Vec::new(),
            block_loop: HashMap::new(),
            top_level: Vec::new(),
        };

        for header in dom.post_order() {
            let back_edges: Vec<B> = graph
                .predecessors(header)
                .into_iter()
                .filter(|&p| dom.is_reachable(p) && dom.dominates(header, p))
                .collect();
            if back_edges.is_empty() {
                continue;
            }
            let id = LoopId(info.loops.len() as u32);
            info.loops.push(Loop {
                header,
                blocks: vec![header],
                parent: None,
                children: Vec::new(),
            });
            info.discover(graph, dom, id, back_edges);
        }

        info.populate(graph, dom)?;
        log::trace!("{}: {} natural loops", graph.graph_name(), info.loops.len());
        Ok(info)
    }

    fn discover<G>(&mut self, graph: &G, dom: &DominatorTree<B>, id: LoopId, back_edges: Vec<B>)
    where
        G: CfgAdaptor<BlockRef = B>,
    {
        let header = self.loops[id.0 as usize].header;
        let mut worklist = back_edges;
        while let Some(block) = worklist.pop() {
            match self.block_loop.get(&block).copied() {
                None => {
                    self.block_loop.insert(block, id);
                    if block != header {
                        worklist.extend(
                            graph
                                .predecessors(block)
                                .into_iter()
                                .filter(|&p| dom.is_reachable(p)),
                        );
                    }
                }
                Some(inner) => {
                    let outer = self.outermost(inner);
                    if outer == id {
                        continue;
                    }
                    self.loops[outer.0 as usize].parent = Some(id);
                    let sub_header = self.loops[outer.0 as usize].header;
                    for p in graph.predecessors(sub_header) {
                        if !dom.is_reachable(p) {
                            continue;
                        }
                        if self.block_loop.get(&p).copied() != Some(outer) {
                            worklist.push(p);
                        }
                    }
                }
            }
        }
    }

    fn outermost(&self, mut id: LoopId) -> LoopId {
        while let Some(parent) = self.loops[id.0 as usize].parent {
            id = parent;
        }
        id
    }

    fn populate<G>(&mut self, graph: &G, dom: &DominatorTree<B>) -> CompileResult<()>
    where
        G: CfgAdaptor<BlockRef = B>,
    {
        let Some(entry) = dom.root() else {
            return Ok(());
        };
        // CFG post-order, explicit stack.
        let mut visited: hashbrown::HashSet<B> = hashbrown::HashSet::new();
        let mut post = Vec::new();
        let mut stack = vec![(entry, false)];
        while let Some((block, processed)) = stack.pop() {
            if processed {
                post.push(block);
                continue;
            }
            if !visited.insert(block) {
                continue;
            }
            stack.push((block, true));
            for succ in graph.successors(block)? {
                if !visited.contains(&succ) {
                    stack.push((succ, false));
                }
            }
        }

        for block in post {
            let mut current = self.block_loop.get(&block).copied();
            if let Some(id) = current {
                let (header, parent) = {
                    let lp = &self.loops[id.0 as usize];
                    (lp.header, lp.parent)
                };
                if header == block {
                    match parent {
                        Some(parent) => self.loops[parent.0 as usize].children.push(id),
                        None => self.top_level.push(id),
                    }
                    let lp = &mut self.loops[id.0 as usize];
                    lp.blocks[1..].reverse();
                    lp.children.reverse();
                    current = lp.parent;
                }
            }
            while let Some(id) = current {
                self.loops[id.0 as usize].blocks.push(block);
                current = self.loops[id.0 as usize].parent;
            }
        }
        self.top_level.reverse();
        Ok(())
    }

    pub fn loops(&self) -> &[Loop<B>] {
        &self.loops
    }

    pub fn get(&self, id: LoopId) -> &Loop<B> {
        &self.loops[id.0 as usize]
    }

    pub fn top_level(&self) -> &[LoopId] {
        &self.top_level
    }

    /// Innermost loop containing `block`.
    pub fn loop_for(&self, block: B) -> Option<LoopId> {
        self.block_loop.get(&block).copied()
    }

    /// Nesting level of a loop; top-level loops have depth 1.
    pub fn depth(&self, id: LoopId) -> usize {
        let mut depth = 1;
        let mut cur = self.loops[id.0 as usize].parent;
        while let Some(p) = cur {
            depth += 1;
            cur = self.loops[p.0 as usize].parent;
        }
        depth
    }

    /// Loop depth of a block; 0 outside every loop.
    pub fn loop_depth(&self, block: B) -> usize {
        self.loop_for(block).map_or(0, |id| self.depth(id))
    }

    pub fn is_header(&self, block: B) -> bool {
        self.loop_for(block)
            .is_some_and(|id| self.loops[id.0 as usize].header == block)
    }
}
