//! Random control-flow graphs and random programs for the property tests.
//!
//! [`AdjGraph`] is a bare adjacency list that implements [`CfgAdaptor`], so
//! the analyses can be checked against brute-force answers on graphs with
//! any shape. [`Shape`] describes a whole `main` function: blocks that
//! either do observable work or only jump, exits picked at random, and phis
//! whose incoming values often share one constant across predecessors.

use proptest::prelude::*;
use std::collections::BTreeSet;
use sysmips::core::{CfgAdaptor, CompileResult};
use sysmips::ir::{BinaryOp, BlockId, Builtin, FunctionBuilder, InstId, Module, ValueId};

#[derive(Debug, Clone)]
pub struct AdjGraph {
    pub succs: Vec<Vec<usize>>,
    pub preds: Vec<Vec<usize>>,
}

impl AdjGraph {
    pub fn new(succs: Vec<Vec<usize>>) -> Self {
        let mut preds = vec![Vec::new(); succs.len()];
        for (from, targets) in succs.iter().enumerate() {
            for &to in targets {
                preds[to].push(from);
            }
        }
        Self { succs, preds }
    }

    pub fn len(&self) -> usize {
        self.succs.len()
    }

    /// Blocks reachable from the entry without passing through `removed`.
    pub fn reachable_without(&self, removed: Option<usize>) -> Vec<bool> {
        let mut seen = vec![false; self.len()];
        if removed == Some(0) {
            return seen;
        }
        let mut stack = vec![0];
        seen[0] = true;
        while let Some(b) = stack.pop() {
            for &s in &self.succs[b] {
                if !seen[s] && Some(s) != removed {
                    seen[s] = true;
                    stack.push(s);
                }
            }
        }
        seen
    }

    /// `a` dominates `b` iff `b` cannot be reached once `a` is removed.
    pub fn brute_dominators(&self) -> Vec<BTreeSet<usize>> {
        let reachable = self.reachable_without(None);
        let mut dom = vec![BTreeSet::new(); self.len()];
        for a in 0..self.len() {
            if !reachable[a] {
                continue;
            }
            let without = self.reachable_without(Some(a));
            for b in 0..self.len() {
                if reachable[b] && (a == b || !without[b]) {
                    dom[b].insert(a);
                }
            }
        }
        dom
    }

    /// `DF(a)` holds `b` when `a` dominates a predecessor of `b` but does
    /// not strictly dominate `b`.
    pub fn brute_frontiers(&self) -> Vec<BTreeSet<usize>> {
        let reachable = self.reachable_without(None);
        let dom = self.brute_dominators();
        let mut df = vec![BTreeSet::new(); self.len()];
        for b in 0..self.len() {
            if !reachable[b] {
                continue;
            }
            for &p in &self.preds[b] {
                if !reachable[p] {
                    continue;
                }
                for &a in &dom[p] {
                    if a == b || !dom[b].contains(&a) {
                        df[a].insert(b);
                    }
                }
            }
        }
        df
    }
}

impl CfgAdaptor for AdjGraph {
    type BlockRef = usize;

    fn graph_name(&self) -> &str {
        "adj"
    }

    fn entry_block(&self) -> usize {
        0
    }

    fn blocks(&self) -> Vec<usize> {
        (0..self.len()).collect()
    }

    fn block_index(&self, block: usize) -> usize {
        block
    }

    fn block_capacity(&self) -> usize {
        self.len()
    }

    fn successors(&self, block: usize) -> CompileResult<Vec<usize>> {
        Ok(self.succs[block].clone())
    }

    fn predecessors(&self, block: usize) -> Vec<usize> {
        self.preds[block].clone()
    }
}

/// Graphs of 1..=`max` blocks, at most two successors each. Edges may
/// point anywhere except back at the entry.
pub fn arb_graph(max: usize) -> impl Strategy<Value = AdjGraph> {
    (1..=max).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::vec(0usize..64, 0..=2), n).prop_map(move |raw| {
            let succs = raw
                .into_iter()
                .map(|targets| {
                    if n == 1 {
                        Vec::new()
                    } else {
                        targets.into_iter().map(|t| 1 + t % (n - 1)).collect()
                    }
                })
                .collect();
            AdjGraph::new(succs)
        })
    })
}

#[derive(Debug, Clone, Copy)]
pub enum Exit {
    Ret,
    Jump(usize),
    Branch(usize, usize),
}

#[derive(Debug, Clone)]
pub struct BlockShape {
    /// Bumps the global counter and prints; otherwise the block only exits.
    pub work: bool,
    pub exit: Exit,
    /// Picks the phi's incoming values.
    pub seed: u8,
}

#[derive(Debug, Clone)]
pub struct Shape {
    pub blocks: Vec<BlockShape>,
}

pub fn arb_shape(max_blocks: usize) -> impl Strategy<Value = Shape> {
    (1..=max_blocks).prop_flat_map(|n| {
        prop::collection::vec((any::<bool>(), 0u8..4, 0usize..64, 0usize..64, any::<u8>()), n).prop_map(
            move |raw| {
                let target = |x: usize| 1 + x % (n - 1);
                let blocks = raw
                    .into_iter()
                    .map(|(work, kind, a, b, seed)| {
                        let exit = match kind {
                            _ if n == 1 => Exit::Ret,
                            0 => Exit::Ret,
                            1 => Exit::Jump(target(a)),
                            _ => Exit::Branch(target(a), target(b)),
                        };
                        BlockShape { work, exit, seed }
                    })
                    .collect();
                Shape { blocks }
            },
        )
    })
}

/// Build `int main()` from a shape. The entry reads one input; branch
/// conditions depend on it and on the counter so both arms get taken.
pub fn build_shape(shape: &Shape) -> Module {
    let mut module = Module::new();
    module.add_global("counter", 1, vec![0], false);
    let mut b = FunctionBuilder::new(&mut module, "main", 0, true);
    let n = shape.blocks.len();
    let blocks: Vec<BlockId> = (0..n).map(|i| b.create_block(&format!("b{}", i))).collect();
    let counter = b.global("counter").expect("counter global");
    let zero = b.const_int(0);
    let one = b.const_int(1);
    let three = b.const_int(3);

    let phis: Vec<Option<(InstId, ValueId)>> = (0..n)
        .map(|i| (i > 0 && shape.blocks[i].work).then(|| b.empty_phi(blocks[i])))
        .collect();

    let mut produced: Vec<Option<ValueId>> = vec![None; n];
    let mut input = zero;
    let mut odd = zero;
    for (i, block) in shape.blocks.iter().enumerate() {
        b.switch_to(blocks[i]);
        if i == 0 {
            input = b.call_builtin(Builtin::GetInt, vec![]).expect("getint result");
            odd = b.binary(BinaryOp::And, input, one);
        }
        if block.work {
            let c = b.load(counter, zero);
            let bumped = b.binary(BinaryOp::Add, c, one);
            b.store(counter, zero, bumped);
            let shown = match phis[i] {
                Some((_, phi)) => b.binary(BinaryOp::Add, bumped, phi),
                None => bumped,
            };
            b.print(&format!("\"b{}=%d\\n\"", i), vec![shown]);
            produced[i] = Some(shown);
        }
        match block.exit {
            Exit::Ret => {
                let v = match produced[i] {
                    Some(v) => v,
                    None => b.const_int(i as i32),
                };
                b.ret(Some(v));
            }
            Exit::Jump(t) => {
                b.jump(blocks[t]);
            }
            Exit::Branch(t, e) => {
                let cond = match produced[i] {
                    Some(v) => {
                        let mixed = b.binary(BinaryOp::Add, v, input);
                        let r = b.binary(BinaryOp::Mod, mixed, three);
                        b.binary(BinaryOp::Lt, r, one)
                    }
                    None => odd,
                };
                b.branch(cond, blocks[t], blocks[e]);
            }
        }
    }

    for (i, phi) in phis.iter().enumerate() {
        let Some((inst, _)) = *phi else { continue };
        let preds = b.func().preds(blocks[i]).to_vec();
        for p in preds {
            let pi = p.index();
            let pick = shape.blocks[i].seed as usize + pi;
            let v = match produced[pi] {
                Some(v) if pick % 3 == 0 => v,
                _ => b.const_int((pick % 2) as i32),
            };
            b.func_mut().push_operand(inst, v);
        }
    }
    drop(b);
    module
}
