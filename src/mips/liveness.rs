//! Block-level liveness over machine code.
//!
//! Liveness runs over allocation nodes rather than raw operands: a virtual
//! register `%vN` is node `32 + N`, and a physical register takes part only
//! if it belongs to the allocatable budget. Argument registers, `v0`, `ra`,
//! `zero` and `sp` never hold an allocatable value, so they are left out.

use super::function::{MBlockId, MachineFunction};
use super::operand::MachineOperand;
use super::registers::MipsReg;
use crate::core::{Analyzer, CompileError, CompileResult, RegisterBudget};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Dense allocation node id.
pub type NodeId = usize;

/// Node ids below this are physical registers.
pub const VIRTUAL_BASE: NodeId = 32;

/// The allocation node of an operand, if it takes part in allocation.
pub fn node_of(op: MachineOperand, budget: &RegisterBudget) -> Option<NodeId> {
    match op {
        MachineOperand::Virtual(n) => Some(VIRTUAL_BASE + n as usize),
        MachineOperand::PreColored(r) | MachineOperand::Allocated(r) if budget.contains(r) => {
            Some(r.index())
        }
        _ => None,
    }
}

pub fn is_precolored_node(node: NodeId) -> bool {
    node < VIRTUAL_BASE
}

/// Printable name of a node.
pub fn node_name(node: NodeId) -> String {
    match MipsReg::from_index(node) {
        Some(r) if is_precolored_node(node) => r.to_string(),
        _ => format!("%v{}", node - VIRTUAL_BASE),
    }
}

#[derive(Debug, Clone)]
pub struct Liveness {
    live_use: Vec<BTreeSet<NodeId>>,
    def: Vec<BTreeSet<NodeId>>,
    live_in: Vec<BTreeSet<NodeId>>,
    live_out: Vec<BTreeSet<NodeId>>,
    rounds: usize,
}

impl Liveness {
    pub fn compute(mf: &MachineFunction, budget: &RegisterBudget) -> CompileResult<Self> {
        let n = mf.block_count();
        let mut live_use = vec![BTreeSet::new(); n];
        let mut def = vec![BTreeSet::new(); n];
        for b in mf.block_ids() {
            let (u, d) = (&mut live_use[b.index()], &mut def[b.index()]);
            for &id in mf.insts_of(b) {
                let inst = mf.inst(id);
                for op in inst.uses() {
                    if let Some(node) = node_of(op, budget) {
                        if !d.contains(&node) {
                            u.insert(node);
                        }
                    }
                }
                for op in inst.defs() {
                    if let Some(node) = node_of(op, budget) {
                        d.insert(node);
                    }
                }
            }
        }

        // Post order converges fastest for a backward problem; unreachable
        // blocks still get sets so their code can be allocated.
        let analyzer = Analyzer::analyze(mf)?;
        let mut order: Vec<MBlockId> = analyzer.order().iter().rev().copied().collect();
        order.extend(mf.block_ids().filter(|b| !analyzer.is_reachable_index(b.index())));

        let mut live_in = live_use.clone();
        let mut live_out = vec![BTreeSet::new(); n];
        let limit = n + 3;
        let mut rounds = 0;
        loop {
            rounds += 1;
            if rounds > limit {
                return Err(CompileError::NonConvergence {
                    function: mf.name.clone(),
                    analysis: "liveness",
                    rounds: limit,
                });
            }
            let mut changed = false;
            for &b in &order {
                let i = b.index();
                let mut out = BTreeSet::new();
                for succ in mf.successors_of(b) {
                    out.extend(live_in[succ.index()].iter().copied());
                }
                let mut inn = live_use[i].clone();
                inn.extend(out.iter().filter(|node| !def[i].contains(node)).copied());
                if out != live_out[i] || inn != live_in[i] {
                    changed = true;
                    live_out[i] = out;
                    live_in[i] = inn;
                }
            }
            if !changed {
                break;
            }
        }
        log::trace!("{}: liveness converged in {} rounds", mf.name, rounds);
        Ok(Self {
            live_use,
            def,
            live_in,
            live_out,
            rounds,
        })
    }

    pub fn live_in(&self, b: MBlockId) -> &BTreeSet<NodeId> {
        &self.live_in[b.index()]
    }

    pub fn live_out(&self, b: MBlockId) -> &BTreeSet<NodeId> {
        &self.live_out[b.index()]
    }

    pub fn live_use(&self, b: MBlockId) -> &BTreeSet<NodeId> {
        &self.live_use[b.index()]
    }

    pub fn def(&self, b: MBlockId) -> &BTreeSet<NodeId> {
        &self.def[b.index()]
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }
}

fn write_set(out: &mut String, title: &str, set: &BTreeSet<NodeId>) {
    let names: Vec<String> = set.iter().map(|&n| node_name(n)).collect();
    let _ = writeln!(out, "  {}: {}", title, names.join(" "));
}

/// Per-block `livein`/`liveout` listing.
pub fn format_liveness(mf: &MachineFunction, liveness: &Liveness) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; liveness of {} ({} rounds)", mf.label(), liveness.rounds());
    for b in mf.block_ids() {
        let _ = writeln!(out, "{}:", mf.block(b).label);
        write_set(&mut out, "livein", liveness.live_in(b));
        write_set(&mut out, "liveout", liveness.live_out(b));
    }
    out
}
