// This module implements register allocation by iterated register coalescing (George and
// Appel). Each round recomputes block liveness, builds the interference graph by walking
// every block backwards from its live-out set, and then runs the classic worklist machine:
// simplify low-degree nodes, coalesce moves under the Briggs or George test, freeze moves
// that block simplification, and pick optimistic spill candidates by degree over
// 2^(loop-weighted reference count). Colors are handed out lowest register number first.
// When coloring leaves nodes uncolored, every reference to them is rewritten through short
// lived spill temporaries with a load before and a store after each local span, the frame
// grows by one word per spilled node, and the round starts over. Spill temporaries are never
// spilled themselves: if one cannot be colored, its costliest colored neighbour goes to the
// stack instead. Every round with spills therefore retires at least one original register,
// which bounds the number of rounds.

//! Iterated register coalescing.
//!
//! Nodes are [`NodeId`]s as defined by [`super::liveness`]. Physical registers
//! are precolored nodes with unbounded degree and no adjacency list.

use super::function::{MInstId, MachineFunction};
use super::instruction::MInst;
use super::liveness::{is_precolored_node, node_name, node_of, Liveness, NodeId, VIRTUAL_BASE};
use super::operand::MachineOperand;
use super::registers::MipsReg;
use crate::core::{CompileError, CompileResult, RegBitSet, RegisterBudget};
use hashbrown::HashSet;
use std::collections::{BTreeMap, BTreeSet};

const INFINITE_DEGREE: usize = 1 << 30;

/// Longest run of instructions one spill temporary may cover.
const SPAN_LIMIT: usize = 30;

/// Result of a successful allocation.
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    /// Liveness, build and color rounds, including the final one.
    pub rounds: usize,
    /// Nodes sent to the stack across all rounds.
    pub spilled: usize,
    /// Moves deleted because both sides received the same register.
    pub coalesced_moves: usize,
    /// Final register of every virtual register the last round saw.
    pub assignment: BTreeMap<u32, MipsReg>,
    /// Interference edges of the last round.
    pub interference: Vec<(NodeId, NodeId)>,
}

/// Allocate registers for `mf` from `budget`, rewriting it in place.
pub fn allocate_registers(
    mf: &mut MachineFunction,
    budget: &RegisterBudget,
    max_rounds: Option<usize>,
) -> CompileResult<Allocation> {
    if budget.k() == 0 {
        return Err(CompileError::RegisterAllocation {
            function: mf.name.clone(),
            reason: "empty register budget".to_string(),
        });
    }
    let originals = (0..mf.vreg_count()).filter(|&v| !mf.is_spill_temp(v)).count();
    let limit = max_rounds.unwrap_or(originals + 2);
    let mut spilled_total = 0;

    for round in 1..=limit {
        let liveness = Liveness::compute(mf, budget)?;
        let mut graph = Graph::build(mf, budget, &liveness);
        graph.make_worklist();
        graph.run();
        let spilled = graph.assign_colors(mf)?;

        if spilled.is_empty() {
            let assignment = graph.final_assignment(mf)?;
            let coalesced_moves = apply_assignment(mf, &assignment)?;
            log::debug!(
                "{}: allocated in {} rounds, {} spilled, {} moves coalesced",
                mf.name,
                round,
                spilled_total,
                coalesced_moves
            );
            return Ok(Allocation {
                rounds: round,
                spilled: spilled_total,
                coalesced_moves,
                assignment,
                interference: graph.edges,
            });
        }

        log::debug!(
            "{}: round {} spills {}",
            mf.name,
            round,
            spilled.iter().map(|&n| node_name(n)).collect::<Vec<_>>().join(" ")
        );
        for &node in &spilled {
            spill_vreg(mf, (node - VIRTUAL_BASE) as u32);
        }
        spilled_total += spilled.len();
    }
    Err(CompileError::NonConvergence {
        function: mf.name.clone(),
        analysis: "register allocation",
        rounds: limit,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveState {
    Worklist,
    Active,
    Coalesced,
    Constrained,
    Frozen,
}

/// Interference graph and worklists of one round.
struct Graph<'b> {
    budget: &'b RegisterBudget,
    k: usize,
    adj_set: HashSet<(NodeId, NodeId)>,
    adj_list: Vec<BTreeSet<NodeId>>,
    edges: Vec<(NodeId, NodeId)>,
    degree: Vec<usize>,
    alias: Vec<NodeId>,
    coalesced: Vec<bool>,
    on_stack: Vec<bool>,
    spill_temp: Vec<bool>,
    loop_cnt: Vec<u32>,
    colors: Vec<Option<MipsReg>>,

    moves: Vec<(NodeId, NodeId)>,
    move_state: Vec<MoveState>,
    move_list: Vec<BTreeSet<usize>>,
    worklist_moves: BTreeSet<usize>,

    simplify_worklist: BTreeSet<NodeId>,
    freeze_worklist: BTreeSet<NodeId>,
    spill_worklist: BTreeSet<NodeId>,
    select_stack: Vec<NodeId>,
}

impl<'b> Graph<'b> {
    fn build(mf: &MachineFunction, budget: &'b RegisterBudget, liveness: &Liveness) -> Self {
        let nodes = VIRTUAL_BASE + mf.vreg_count() as usize;
        let mut degree = vec![0; nodes];
        for d in degree.iter_mut().take(VIRTUAL_BASE) {
            *d = INFINITE_DEGREE;
        }
        let mut spill_temp = vec![false; nodes];
        for v in 0..mf.vreg_count() {
            spill_temp[VIRTUAL_BASE + v as usize] = mf.is_spill_temp(v);
        }
        let mut graph = Graph {
            budget,
            k: budget.k(),
            adj_set: HashSet::new(),
            adj_list: vec![BTreeSet::new(); nodes],
            edges: Vec::new(),
            degree,
            alias: (0..nodes).collect(),
            coalesced: vec![false; nodes],
            on_stack: vec![false; nodes],
            spill_temp,
            loop_cnt: vec![0; nodes],
            colors: vec![None; nodes],
            moves: Vec::new(),
            move_state: Vec::new(),
            move_list: vec![BTreeSet::new(); nodes],
            worklist_moves: BTreeSet::new(),
            simplify_worklist: BTreeSet::new(),
            freeze_worklist: BTreeSet::new(),
            spill_worklist: BTreeSet::new(),
            select_stack: Vec::new(),
        };

        let blocks: Vec<_> = mf.block_ids().collect();
        for &b in blocks.iter().rev() {
            let depth = mf.block(b).loop_depth as u32;
            let mut live = liveness.live_out(b).clone();
            for &id in mf.insts_of(b).iter().rev() {
                let inst = mf.inst(id);
                if let Some((dst, src)) = inst.as_move() {
                    if let (Some(d), Some(s)) = (node_of(dst, budget), node_of(src, budget)) {
                        live.remove(&s);
                        let m = graph.moves.len();
                        graph.moves.push((d, s));
                        graph.move_state.push(MoveState::Worklist);
                        graph.move_list[d].insert(m);
                        graph.move_list[s].insert(m);
                        graph.worklist_moves.insert(m);
                    }
                }
                let defs: Vec<NodeId> = inst.defs().into_iter().filter_map(|op| node_of(op, budget)).collect();
                let uses: Vec<NodeId> = inst.uses().into_iter().filter_map(|op| node_of(op, budget)).collect();
                live.extend(defs.iter().copied());
                for &d in &defs {
                    let others: Vec<NodeId> = live.iter().copied().collect();
                    for l in others {
                        graph.add_edge(l, d);
                    }
                }
                for &d in &defs {
                    live.remove(&d);
                    graph.loop_cnt[d] += depth;
                }
                for &u in &uses {
                    live.insert(u);
                    graph.loop_cnt[u] += depth;
                }
            }
        }
        log::trace!(
            "{}: interference graph with {} edges and {} moves",
            mf.name,
            graph.edges.len(),
            graph.moves.len()
        );
        graph
    }

    fn add_edge(&mut self, u: NodeId, v: NodeId) {
        if u == v || self.adj_set.contains(&(u, v)) {
            return;
        }
        self.adj_set.insert((u, v));
        self.adj_set.insert((v, u));
        self.edges.push((u.min(v), u.max(v)));
        if !is_precolored_node(u) {
            self.adj_list[u].insert(v);
            self.degree[u] += 1;
        }
        if !is_precolored_node(v) {
            self.adj_list[v].insert(u);
            self.degree[v] += 1;
        }
    }

    fn adjacent(&self, n: NodeId) -> Vec<NodeId> {
        self.adj_list[n]
            .iter()
            .copied()
            .filter(|&m| !self.on_stack[m] && !self.coalesced[m])
            .collect()
    }

    fn node_moves(&self, n: NodeId) -> Vec<usize> {
        self.move_list[n]
            .iter()
            .copied()
            .filter(|&m| matches!(self.move_state[m], MoveState::Active | MoveState::Worklist))
            .collect()
    }

    fn move_related(&self, n: NodeId) -> bool {
        !self.node_moves(n).is_empty()
    }

    fn make_worklist(&mut self) {
        for n in VIRTUAL_BASE..self.degree.len() {
            if self.degree[n] >= self.k {
                self.spill_worklist.insert(n);
            } else if self.move_related(n) {
                self.freeze_worklist.insert(n);
            } else {
                self.simplify_worklist.insert(n);
            }
        }
    }

    fn run(&mut self) {
        loop {
            if let Some(n) = self.simplify_worklist.pop_first() {
                self.simplify(n);
            } else if let Some(m) = self.worklist_moves.pop_first() {
                self.coalesce(m);
            } else if let Some(n) = self.freeze_worklist.pop_first() {
                self.freeze(n);
            } else if !self.spill_worklist.is_empty() {
                self.select_spill();
            } else {
                break;
            }
        }
    }

    fn simplify(&mut self, n: NodeId) {
        log::trace!("simplify {}", node_name(n));
        self.select_stack.push(n);
        self.on_stack[n] = true;
        for m in self.adjacent(n) {
            self.decrement_degree(m);
        }
    }

    fn decrement_degree(&mut self, m: NodeId) {
        if is_precolored_node(m) {
            return;
        }
        let d = self.degree[m];
        self.degree[m] = d.saturating_sub(1);
        if d == self.k {
            let mut nodes = self.adjacent(m);
            nodes.push(m);
            self.enable_moves(&nodes);
            self.spill_worklist.remove(&m);
            if self.move_related(m) {
                self.freeze_worklist.insert(m);
            } else {
                self.simplify_worklist.insert(m);
            }
        }
    }

    fn enable_moves(&mut self, nodes: &[NodeId]) {
        for &n in nodes {
            for m in self.node_moves(n) {
                if self.move_state[m] == MoveState::Active {
                    self.move_state[m] = MoveState::Worklist;
                    self.worklist_moves.insert(m);
                }
            }
        }
    }

    fn get_alias(&self, mut n: NodeId) -> NodeId {
        while self.coalesced[n] {
            n = self.alias[n];
        }
        n
    }

    fn add_work_list(&mut self, u: NodeId) {
        if !is_precolored_node(u) && !self.move_related(u) && self.degree[u] < self.k {
            self.freeze_worklist.remove(&u);
            self.simplify_worklist.insert(u);
        }
    }

    /// George: `t` is harmless to `r` after merging.
    fn ok(&self, t: NodeId, r: NodeId) -> bool {
        self.degree[t] < self.k || is_precolored_node(t) || self.adj_set.contains(&(t, r))
    }

    /// Briggs: fewer than `k` significant-degree neighbours.
    fn conservative(&self, nodes: &BTreeSet<NodeId>) -> bool {
        nodes.iter().filter(|&&n| self.degree[n] >= self.k).count() < self.k
    }

    fn coalesce(&mut self, m: usize) {
        let (dst, src) = self.moves[m];
        let x = self.get_alias(dst);
        let y = self.get_alias(src);
        let (u, v) = if is_precolored_node(y) { (y, x) } else { (x, y) };

        if u == v {
            self.move_state[m] = MoveState::Coalesced;
            self.add_work_list(u);
        } else if is_precolored_node(v) || self.adj_set.contains(&(u, v)) {
            self.move_state[m] = MoveState::Constrained;
            self.add_work_list(u);
            self.add_work_list(v);
        } else if (is_precolored_node(u) && self.adjacent(v).iter().all(|&t| self.ok(t, u)))
            || (!is_precolored_node(u) && {
                let mut union: BTreeSet<NodeId> = self.adjacent(u).into_iter().collect();
                union.extend(self.adjacent(v));
                self.conservative(&union)
            })
        {
            log::trace!("coalesce {} into {}", node_name(v), node_name(u));
            self.move_state[m] = MoveState::Coalesced;
            self.combine(u, v);
            self.add_work_list(u);
        } else {
            self.move_state[m] = MoveState::Active;
        }
    }

    fn combine(&mut self, u: NodeId, v: NodeId) {
        if !self.freeze_worklist.remove(&v) {
            self.spill_worklist.remove(&v);
        }
        self.coalesced[v] = true;
        self.alias[v] = u;
        let moved: Vec<usize> = self.move_list[v].iter().copied().collect();
        self.move_list[u].extend(moved);
        self.enable_moves(&[v]);
        for t in self.adjacent(v) {
            self.add_edge(t, u);
            self.decrement_degree(t);
        }
        if self.degree[u] >= self.k && self.freeze_worklist.remove(&u) {
            self.spill_worklist.insert(u);
        }
    }

    fn freeze(&mut self, u: NodeId) {
        log::trace!("freeze {}", node_name(u));
        self.simplify_worklist.insert(u);
        self.freeze_moves(u);
    }

    fn freeze_moves(&mut self, u: NodeId) {
        for m in self.node_moves(u) {
            let (x, y) = self.moves[m];
            let v = if self.get_alias(y) == self.get_alias(u) {
                self.get_alias(x)
            } else {
                self.get_alias(y)
            };
            self.worklist_moves.remove(&m);
            self.move_state[m] = MoveState::Frozen;
            if !is_precolored_node(v)
                && !self.move_related(v)
                && self.degree[v] < self.k
                && self.freeze_worklist.remove(&v)
            {
                self.simplify_worklist.insert(v);
            }
        }
    }

    /// Spill weight: high degree, little use inside loops.
    fn metric(&self, n: NodeId) -> f64 {
        self.degree[n] as f64 / 2f64.powi(self.loop_cnt[n].min(1000) as i32)
    }

    fn select_spill(&mut self) {
        let pick = |temps: bool| {
            let mut best: Option<(NodeId, f64)> = None;
            for &n in &self.spill_worklist {
                if self.spill_temp[n] != temps {
                    continue;
                }
                let w = self.metric(n);
                if best.map_or(true, |(_, bw)| w > bw) {
                    best = Some((n, w));
                }
            }
            best.map(|(n, _)| n)
        };
        let Some(m) = pick(false).or_else(|| pick(true)) else {
            return;
        };
        log::trace!("spill candidate {}", node_name(m));
        self.spill_worklist.remove(&m);
        self.simplify_worklist.insert(m);
        self.freeze_moves(m);
    }

    /// Color the select stack. Returns the nodes that must go to the stack.
    fn assign_colors(&mut self, mf: &MachineFunction) -> CompileResult<BTreeSet<NodeId>> {
        let mut spilled = BTreeSet::new();
        while let Some(n) = self.select_stack.pop() {
            self.on_stack[n] = false;
            let mut used = RegBitSet::new();
            for &w in &self.adj_list[n] {
                let a = self.get_alias(w);
                if is_precolored_node(a) {
                    if let Some(r) = MipsReg::from_index(a) {
                        used.set(r);
                    }
                } else if let Some(r) = self.colors[a] {
                    used.set(r);
                }
            }
            match self.budget.allocatable().find_first(&used) {
                Some(r) => self.colors[n] = Some(r),
                None if self.spill_temp[n] => {
                    let victim = self.costliest_colored_neighbour(n).ok_or_else(|| {
                        CompileError::RegisterAllocation {
                            function: mf.name.clone(),
                            reason: format!(
                                "spill temporary {} cannot be colored with {} registers",
                                node_name(n),
                                self.k
                            ),
                        }
                    })?;
                    spilled.insert(victim);
                }
                None => {
                    spilled.insert(n);
                }
            }
        }
        Ok(spilled)
    }

    fn costliest_colored_neighbour(&self, n: NodeId) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for &w in &self.adj_list[n] {
            let a = self.get_alias(w);
            if is_precolored_node(a) || self.spill_temp[a] || self.colors[a].is_none() {
                continue;
            }
            let m = self.metric(a);
            if best.map_or(true, |(_, bm)| m > bm) {
                best = Some((a, m));
            }
        }
        best.map(|(a, _)| a)
    }

    /// Colors of every virtual node, coalesced nodes taking their alias's.
    fn final_assignment(&self, mf: &MachineFunction) -> CompileResult<BTreeMap<u32, MipsReg>> {
        let mut assignment = BTreeMap::new();
        for n in VIRTUAL_BASE..self.degree.len() {
            let a = self.get_alias(n);
            let reg = if is_precolored_node(a) {
                MipsReg::from_index(a)
            } else {
                self.colors[a]
            };
            let reg = reg.ok_or_else(|| {
                CompileError::invariant(&mf.name, format!("{} left without a color", node_name(n)))
            })?;
            assignment.insert((n - VIRTUAL_BASE) as u32, reg);
        }
        Ok(assignment)
    }
}

/// Rewrite virtual operands to their registers and drop moves that became
/// no-ops. Returns the number of moves dropped.
fn apply_assignment(mf: &mut MachineFunction, assignment: &BTreeMap<u32, MipsReg>) -> CompileResult<usize> {
    let placed: Vec<MInstId> = mf.placed_insts().collect();
    for &id in &placed {
        mf.inst_mut(id).map_operands(|op| match op {
            MachineOperand::Virtual(n) => assignment
                .get(&n)
                .map_or(op, |&r| MachineOperand::Allocated(r)),
            other => other,
        });
        let inst = mf.inst(id);
        if let Some(op) = inst.defs().into_iter().chain(inst.uses()).find(|op| op.as_virtual().is_some()) {
            return Err(CompileError::invariant(&mf.name, format!("{} has no register", op)));
        }
    }

    let mut removed = 0;
    for b in mf.block_ids().collect::<Vec<_>>() {
        mf.retain_insts(b, |_, inst| {
            let identity = inst
                .as_move()
                .is_some_and(|(dst, src)| dst.reg().is_some() && dst.reg() == src.reg());
            if identity {
                removed += 1;
            }
            !identity
        });
    }
    Ok(removed)
}

struct Span {
    temp: MachineOperand,
    start: usize,
    needs_load: bool,
    last_def: Option<usize>,
    len: usize,
}

impl Span {
    fn close(self, mf: &mut MachineFunction, out: &mut Vec<MInstId>, offset: i32) {
        if let Some(pos) = self.last_def {
            let store = mf.create_inst(MInst::Store {
                src: self.temp,
                base: MachineOperand::SP,
                offset,
            });
            out.insert(pos + 1, store);
        }
        if self.needs_load {
            let load = mf.create_inst(MInst::Load {
                dst: self.temp,
                base: MachineOperand::SP,
                offset,
            });
            out.insert(self.start, load);
        }
    }
}

/// Give `vreg` a frame slot and route every reference through spill
/// temporaries, one per run of consecutive referencing instructions.
pub fn spill_vreg(mf: &mut MachineFunction, vreg: u32) {
    let target = MachineOperand::Virtual(vreg);
    let offset = mf.alloc_frame(4);
    for b in mf.block_ids().collect::<Vec<_>>() {
        let old = mf.insts_of(b).to_vec();
        let mut rewritten = Vec::with_capacity(old.len() + 2);
        let mut span: Option<Span> = None;
        for id in old {
            let (reads, writes) = {
                let inst = mf.inst(id);
                (inst.uses().contains(&target), inst.defs().contains(&target))
            };
            if !reads && !writes {
                if let Some(done) = span.take() {
                    done.close(mf, &mut rewritten, offset);
                }
                rewritten.push(id);
                continue;
            }
            if span.as_ref().is_some_and(|s| s.len >= SPAN_LIMIT) {
                if let Some(done) = span.take() {
                    done.close(mf, &mut rewritten, offset);
                }
            }
            let current = span.get_or_insert_with(|| Span {
                temp: mf.new_spill_temp(),
                start: rewritten.len(),
                needs_load: false,
                last_def: None,
                len: 0,
            });
            if reads && current.last_def.is_none() {
                current.needs_load = true;
            }
            let temp = current.temp;
            mf.inst_mut(id).map_operands(|op| if op == target { temp } else { op });
            rewritten.push(id);
            if writes {
                current.last_def = Some(rewritten.len() - 1);
            }
            current.len += 1;
        }
        if let Some(done) = span.take() {
            done.close(mf, &mut rewritten, offset);
        }
        mf.set_block_insts(b, rewritten);
    }
}
