//! Promotion of single-word stack slots to SSA values.
//!
//! A slot qualifies when it is a one-word `alloca` and every use is the base
//! operand of a load or store at constant index 0. Phis go on the iterated
//! dominance frontier of the blocks that store to the slot; a renaming walk
//! from entry then carries the current value of every slot along the CFG,
//! rewriting loads to that value and dropping the stores. A slot read before
//! any store reads 0. Phis that end up feeding nothing but other dead phis
//! are deleted afterward.

use super::simplify_cfg::simplify_cfg;
use crate::analysis::DominatorTree;
use crate::core::{CompileError, CompileResult};
use crate::ir::{BlockId, Function, InstId, InstKind, ValueId};
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mem2RegStats {
    pub cfg_rewrites: usize,
    pub promoted: usize,
    pub phis_inserted: usize,
    pub phis_removed: usize,
}

pub fn mem2reg(func: &mut Function) -> CompileResult<Mem2RegStats> {
    let mut stats = Mem2RegStats {
        cfg_rewrites: simplify_cfg(func)?,
        ..Default::default()
    };

    let slots = promotable_slots(func);
    if slots.is_empty() {
        return Ok(stats);
    }
    let slot_index: HashMap<ValueId, usize> =
        slots.iter().enumerate().map(|(i, &(_, v))| (v, i)).collect();

    let dom = DominatorTree::compute(&*func)?;
    let phi_slot = place_phis(func, &dom, &slots, &slot_index)?;
    stats.phis_inserted = phi_slot.len();

    rename(func, &slot_index, &phi_slot)?;

    for &(alloca, _) in &slots {
        func.remove_inst(alloca)?;
    }
    stats.promoted = slots.len();
    stats.phis_removed = remove_dead_phis(func, &phi_slot)?;

    log::debug!(
        "{}: promoted {} slots, {} phis inserted, {} dead phis removed",
        func.name,
        stats.promoted,
        stats.phis_inserted,
        stats.phis_removed
    );
    Ok(stats)
}

/// `(alloca, address)` for every promotable slot, in layout order.
fn promotable_slots(func: &Function) -> Vec<(InstId, ValueId)> {
    func.placed_insts()
        .filter(|&inst| matches!(func.kind(inst), InstKind::Alloca { words: 1 }))
        .filter_map(|inst| func.result(inst).map(|v| (inst, v)))
        .filter(|&(_, addr)| {
            func.uses(addr).iter().all(|u| {
                let is_access = matches!(func.kind(u.user), InstKind::Load | InstKind::Store);
                is_access
                    && u.slot == 0
                    && func.inst_block(u.user).is_some()
                    && func.as_const(func.operands(u.user)[1]) == Some(0)
            })
        })
        .collect()
}

fn place_phis(
    func: &mut Function,
    dom: &DominatorTree<BlockId>,
    slots: &[(InstId, ValueId)],
    slot_index: &HashMap<ValueId, usize>,
) -> CompileResult<HashMap<InstId, usize>> {
    let mut def_blocks: Vec<Vec<BlockId>> = vec![Vec::new(); slots.len()];
    for inst in func.placed_insts() {
        if !matches!(func.kind(inst), InstKind::Store) {
            continue;
        }
        if let Some(&s) = slot_index.get(&func.operands(inst)[0]) {
            let Some(block) = func.inst_block(inst) else {
                continue;
            };
            if !def_blocks[s].contains(&block) {
                def_blocks[s].push(block);
            }
        }
    }

    let zero = func.const_value(0);
    let mut phi_slot = HashMap::new();
    for (s, defs) in def_blocks.into_iter().enumerate() {
        let mut has_phi: HashSet<BlockId> = HashSet::new();
        let mut queued: HashSet<BlockId> = defs.iter().copied().collect();
        let mut worklist = defs;
        while let Some(x) = worklist.pop() {
            for &y in dom.frontier(x) {
                if !has_phi.insert(y) {
                    continue;
                }
                let arity = func.preds(y).len();
                let phi = func.create_inst(InstKind::Phi, vec![zero; arity], true);
                func.insert_phi(y, phi);
                phi_slot.insert(phi, s);
                log::trace!("{}: phi for slot {} in {}", func.name, s, func.block_name(y));
                if queued.insert(y) {
                    worklist.push(y);
                }
            }
        }
    }
    Ok(phi_slot)
}

fn rename(
    func: &mut Function,
    slot_index: &HashMap<ValueId, usize>,
    phi_slot: &HashMap<InstId, usize>,
) -> CompileResult<()> {
    let zero = func.const_value(0);
    let mut visited = vec![false; func.block_arena_len()];
    let mut worklist: Vec<(BlockId, Vec<ValueId>)> = vec![(func.entry(), vec![zero; slot_index.len()])];

    while let Some((block, mut current)) = worklist.pop() {
        if visited[block.index()] {
            continue;
        }
        visited[block.index()] = true;

        for inst in func.insts_of(block).to_vec() {
            match func.kind(inst) {
                InstKind::Phi => {
                    if let Some(&s) = phi_slot.get(&inst) {
                        current[s] = result_of(func, inst)?;
                    }
                }
                InstKind::Load => {
                    if let Some(&s) = slot_index.get(&func.operands(inst)[0]) {
                        let loaded = result_of(func, inst)?;
                        func.replace_all_uses(loaded, current[s]);
                        func.remove_inst(inst)?;
                    }
                }
                InstKind::Store => {
                    let ops = func.operands(inst);
                    if let Some(&s) = slot_index.get(&ops[0]) {
                        current[s] = ops[2];
                        func.remove_inst(inst)?;
                    }
                }
                _ => {}
            }
        }

        for succ in func.successors(block)? {
            let edge_slots: Vec<usize> = func
                .preds(succ)
                .iter()
                .enumerate()
                .filter(|&(_, &p)| p == block)
                .map(|(i, _)| i)
                .collect();
            for phi in func.phis(succ) {
                let Some(&s) = phi_slot.get(&phi) else {
                    continue;
                };
                for &i in &edge_slots {
                    func.set_operand(phi, i, current[s]);
                }
            }
            if !visited[succ.index()] {
                worklist.push((succ, current.clone()));
            }
        }
    }
    Ok(())
}

/// Delete inserted phis that no non-phi instruction depends on, even
/// through chains or cycles of other phis.
fn remove_dead_phis(func: &mut Function, phi_slot: &HashMap<InstId, usize>) -> CompileResult<usize> {
    let mut inserted: Vec<InstId> = phi_slot.keys().copied().collect();
    inserted.sort();
    let def_of: HashMap<ValueId, InstId> = inserted
        .iter()
        .filter_map(|&phi| func.result(phi).map(|v| (v, phi)))
        .collect();

    let mut live: HashSet<InstId> = HashSet::new();
    let mut worklist = Vec::new();
    for &phi in &inserted {
        let v = result_of(func, phi)?;
        let used_outside = func
            .uses(v)
            .iter()
            .any(|u| !phi_slot.contains_key(&u.user));
        if used_outside && live.insert(phi) {
            worklist.push(phi);
        }
    }
    while let Some(phi) = worklist.pop() {
        for &op in func.operands(phi) {
            if let Some(&src) = def_of.get(&op) {
                if live.insert(src) {
                    worklist.push(src);
                }
            }
        }
    }

    let dead: Vec<InstId> = inserted.into_iter().filter(|p| !live.contains(p)).collect();
    let zero = func.const_value(0);
    for &phi in &dead {
        for slot in 0..func.operands(phi).len() {
            func.set_operand(phi, slot, zero);
        }
    }
    for &phi in &dead {
        func.remove_inst(phi)?;
    }
    Ok(dead.len())
}

fn result_of(func: &Function, inst: InstId) -> CompileResult<ValueId> {
    func.result(inst)
        .ok_or_else(|| CompileError::invariant(&func.name, format!("inst {} has no result", inst.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{verify_function, BinaryOp, FunctionBuilder, Module};

    #[test]
    fn test_straight_line_promotion() {
        let mut m = Module::new();
        let mut b = FunctionBuilder::new(&mut m, "f", 1, true);
        let entry = b.create_block("entry");
        b.switch_to(entry);
        let x = b.alloca(1);
        let zero = b.const_int(0);
        let p = b.param(0);
        b.store(x, zero, p);
        let v = b.load(x, zero);
        let one = b.const_int(1);
        let sum = b.binary(BinaryOp::Add, v, one);
        b.ret(Some(sum));

        let f = b.func_mut();
        let stats = mem2reg(f).unwrap();
        assert_eq!(stats.promoted, 1);
        assert_eq!(stats.phis_inserted, 0);
        assert_eq!(f.insts_of(entry).len(), 2);
        let add = f.defining_inst(sum).unwrap();
        assert_eq!(f.operands(add)[0], p);
        verify_function(f).unwrap();
    }

    #[test]
    fn test_escaping_slot_stays() {
        let mut m = Module::new();
        let mut b = FunctionBuilder::new(&mut m, "f", 0, true);
        let entry = b.create_block("entry");
        b.switch_to(entry);
        let x = b.alloca(1);
        let y = b.alloca(1);
        let zero = b.const_int(0);
        // x's address is stored as data, so only y qualifies.
        b.store(y, zero, x);
        let one = b.const_int(1);
        b.store(x, one, one);
        let v = b.load(y, zero);
        b.ret(Some(v));

        let f = b.func_mut();
        let stats = mem2reg(f).unwrap();
        assert_eq!(stats.promoted, 1);
        verify_function(f).unwrap();
        let term = f.terminator(entry).unwrap();
        assert_eq!(f.operands(term)[0], x);
    }

    #[test]
    fn test_read_before_write_is_zero() {
        let mut m = Module::new();
        let mut b = FunctionBuilder::new(&mut m, "f", 0, true);
        let entry = b.create_block("entry");
        b.switch_to(entry);
        let x = b.alloca(1);
        let zero = b.const_int(0);
        let v = b.load(x, zero);
        b.ret(Some(v));

        let f = b.func_mut();
        mem2reg(f).unwrap();
        let term = f.terminator(entry).unwrap();
        assert_eq!(f.as_const(f.operands(term)[0]), Some(0));
    }
}
