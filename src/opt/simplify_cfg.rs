//! CFG simplification.
//!
//! One cycle runs five rewrites in order:
//! 1. constant-condition branches become jumps;
//! 2. branches with identical arms become jumps;
//! 3. blocks holding nothing but a jump are spliced out;
//! 4. blocks unreachable from entry are pruned;
//! 5. phis in single-predecessor blocks are replaced by their one input.
//!
//! Cycles repeat until one performs no rewrite, so running the pass on its
//! own output reports zero.

use crate::core::{Analyzer, CompileError, CompileResult};
use crate::ir::{BlockId, Function, InstKind};

/// Run to a fixpoint and return the number of rewrites performed.
pub fn simplify_cfg(func: &mut Function) -> CompileResult<usize> {
    let mut total = 0;
    let mut cycles = 0;
    loop {
        cycles += 1;
        let rewrites = fold_branches(func)?
            + elide_empty_blocks(func)?
            + prune_unreachable(func)?
            + remove_single_pred_phis(func)?;
        total += rewrites;
        if rewrites == 0 {
            break;
        }
    }
    log::debug!(
        "{}: CFG simplification made {} rewrites in {} cycles",
        func.name,
        total,
        cycles
    );
    Ok(total)
}

/// Steps 1 and 2: constant conditions and identical targets.
pub fn fold_branches(func: &mut Function) -> CompileResult<usize> {
    let mut count = 0;
    for block in func.layout().to_vec() {
        let term = func.terminator(block)?;
        let InstKind::Branch { then_block, else_block } = *func.kind(term) else {
            continue;
        };
        let cond = func.operands(term)[0];
        let (taken, discarded) = match func.as_const(cond) {
            Some(c) if c != 0 => (then_block, else_block),
            Some(_) => (else_block, then_block),
            None if then_block == else_block => (then_block, else_block),
            None => continue,
        };
        log::trace!(
            "{}: folding branch in {} to jump {}",
            func.name,
            func.block_name(block),
            func.block_name(taken)
        );
        func.replace_terminator(block, InstKind::Jump { target: taken }, vec![])?;
        let idx = func.pred_index(discarded, block).ok_or_else(|| {
            CompileError::invariant(
                &func.name,
                format!(
                    "{} is not listed as predecessor of {}",
                    func.block_name(block),
                    func.block_name(discarded)
                ),
            )
        })?;
        func.remove_pred_at(discarded, idx);
        count += 1;
    }
    Ok(count)
}

/// Step 3: splice out blocks whose only instruction is a jump.
///
/// Skipped when the successor has phis and some predecessor already
/// branches to the successor on its other arm: the two edges would then
/// arrive from the same block and the phi could no longer tell apart the
/// values the branch distinguishes.
pub fn elide_empty_blocks(func: &mut Function) -> CompileResult<usize> {
    let mut count = 0;
    let entry = func.entry();
    for block in func.layout().to_vec() {
        if block == entry || func.block(block).is_removed() {
            continue;
        }
        let insts = func.insts_of(block);
        if insts.len() != 1 {
            continue;
        }
        let InstKind::Jump { target } = *func.kind(insts[0]) else {
            continue;
        };
        let preds = func.preds(block).to_vec();
        if target == block || preds.is_empty() {
            continue;
        }
        let phis = func.phis(target);
        if !phis.is_empty() && shares_branch_with(func, &preds, target)? {
            log::trace!(
                "{}: keeping {}, a predecessor already branches to {}",
                func.name,
                func.block_name(block),
                func.block_name(target)
            );
            continue;
        }

        let idx = func.pred_index(target, block).ok_or_else(|| {
            CompileError::invariant(
                &func.name,
                format!("{} missing from preds of its jump target", func.block_name(block)),
            )
        })?;
        let carried: Vec<_> = phis.iter().map(|&phi| func.operands(phi)[idx]).collect();
        func.remove_pred_at(target, idx);

        for &pred in &preds {
            let term = func.terminator(pred)?;
            if !func.redirect_target(term, block, target) {
                return Err(CompileError::invariant(
                    &func.name,
                    format!(
                        "{} lists {} as predecessor without an edge",
                        func.block_name(block),
                        func.block_name(pred)
                    ),
                ));
            }
            func.add_pred(target, pred);
            for (&phi, &v) in phis.iter().zip(&carried) {
                func.push_operand(phi, v);
            }
        }
        log::trace!(
            "{}: elided empty block {} into {}",
            func.name,
            func.block_name(block),
            func.block_name(target)
        );
        func.remove_blocks(&[block])?;
        count += 1;
    }
    Ok(count)
}

fn shares_branch_with(func: &Function, preds: &[BlockId], target: BlockId) -> CompileResult<bool> {
    for &pred in preds {
        let term = func.terminator(pred)?;
        if let InstKind::Branch { then_block, else_block } = *func.kind(term) {
            if then_block == target || else_block == target {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Step 4: drop blocks unreachable from entry, first removing their
/// incoming slots from reachable successors.
pub fn prune_unreachable(func: &mut Function) -> CompileResult<usize> {
    let analyzer = Analyzer::analyze(&*func)?;
    let dead: Vec<BlockId> = func
        .layout()
        .iter()
        .copied()
        .filter(|b| !analyzer.is_reachable_index(b.index()))
        .collect();
    if dead.is_empty() {
        return Ok(0);
    }
    for &block in &dead {
        for succ in func.successors(block)? {
            if !analyzer.is_reachable_index(succ.index()) {
                continue;
            }
            if let Some(idx) = func.pred_index(succ, block) {
                func.remove_pred_at(succ, idx);
            }
        }
    }
    log::trace!("{}: pruning {} unreachable blocks", func.name, dead.len());
    func.remove_blocks(&dead)?;
    Ok(dead.len())
}

/// Step 5: a phi with a single predecessor is its one incoming value.
pub fn remove_single_pred_phis(func: &mut Function) -> CompileResult<usize> {
    let mut count = 0;
    for block in func.layout().to_vec() {
        if func.preds(block).len() != 1 {
            continue;
        }
        for phi in func.phis(block) {
            let ops = func.operands(phi);
            if ops.len() != 1 {
                return Err(CompileError::PhiArity {
                    function: func.name.clone(),
                    block: func.block_name(block).to_string(),
                    slots: ops.len(),
                    preds: 1,
                });
            }
            let incoming = ops[0];
            let result = func
                .result(phi)
                .ok_or_else(|| CompileError::invariant(&func.name, "phi without result"))?;
            if incoming == result {
                return Err(CompileError::invariant(
                    &func.name,
                    format!("phi in {} only feeds itself", func.block_name(block)),
                ));
            }
            func.replace_all_uses(result, incoming);
            func.remove_inst(phi)?;
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{verify_function, FunctionBuilder, Module};

    #[test]
    fn test_identical_arms_fold() {
        let mut m = Module::new();
        let mut b = FunctionBuilder::new(&mut m, "f", 1, false);
        let entry = b.create_block("entry");
        let next = b.create_block("next");
        b.switch_to(entry);
        let p = b.param(0);
        b.branch(p, next, next);
        b.switch_to(next);
        b.ret(None);

        let f = b.func_mut();
        assert_eq!(fold_branches(f).unwrap(), 1);
        assert_eq!(f.preds(next), &[entry]);
        assert!(matches!(f.kind(f.terminator(entry).unwrap()), InstKind::Jump { .. }));
        verify_function(f).unwrap();
    }

    #[test]
    fn test_guard_keeps_block_feeding_phi() {
        // entry branches to mid and join; mid only jumps to join.
        let mut m = Module::new();
        let mut b = FunctionBuilder::new(&mut m, "f", 1, true);
        let entry = b.create_block("entry");
        let mid = b.create_block("mid");
        let join = b.create_block("join");
        b.switch_to(entry);
        let p = b.param(0);
        b.branch(p, mid, join);
        b.switch_to(mid);
        b.jump(join);
        b.switch_to(join);
        let one = b.const_int(1);
        let two = b.const_int(2);
        let v = b.phi(join, &[(mid, one), (entry, two)]).unwrap();
        b.ret(Some(v));

        let f = b.func_mut();
        assert_eq!(simplify_cfg(f).unwrap(), 0);
        assert_eq!(f.layout().len(), 3);
        verify_function(f).unwrap();
    }

    #[test]
    fn test_elision_duplicates_phi_slots() {
        // a and b both jump to empty e, which jumps to join with a phi.
        let mut m = Module::new();
        let mut bld = FunctionBuilder::new(&mut m, "f", 1, true);
        let entry = bld.create_block("entry");
        let a = bld.create_block("a");
        let b = bld.create_block("b");
        let e = bld.create_block("e");
        let join = bld.create_block("join");
        let p = bld.param(0);
        bld.switch_to(entry);
        bld.branch(p, a, join);
        bld.switch_to(a);
        bld.branch(p, b, e);
        bld.switch_to(b);
        bld.jump(e);
        bld.switch_to(e);
        bld.jump(join);
        bld.switch_to(join);
        let seven = bld.const_int(7);
        let v = bld.phi(join, &[(entry, p), (e, seven)]).unwrap();
        bld.ret(Some(v));

        let f = bld.func_mut();
        simplify_cfg(f).unwrap();
        verify_function(f).unwrap();
        assert!(f.block(e).is_removed());
        let phi = f.phis(join)[0];
        assert_eq!(f.operands(phi).len(), f.preds(join).len());
        assert_eq!(simplify_cfg(f).unwrap(), 0);
    }
}
