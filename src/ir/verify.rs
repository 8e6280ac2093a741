//! Structural verifier for IR functions.
//!
//! Checked here rather than in the editing primitives, because several
//! passes go through transiently inconsistent states (a predecessor added
//! before the matching phi slots) and only promise consistency at pass
//! boundaries.

use super::function::Function;
use super::instruction::InstKind;
use super::value::Use;
use super::BlockId;
use crate::core::{CompileError, CompileResult};
use std::collections::BTreeMap;

pub fn verify_function(func: &Function) -> CompileResult<()> {
    let layout = func.layout();
    if layout.is_empty() {
        return Err(CompileError::invariant(&func.name, "function has no blocks"));
    }
    if !func.preds(func.entry()).is_empty() {
        return Err(CompileError::invariant(
            &func.name,
            format!("entry block {} has predecessors", func.block_name(func.entry())),
        ));
    }

    // Expected predecessor multiset per block, from terminators.
    let mut edges: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();

    for &block in layout {
        let insts = func.insts_of(block);
        func.terminator(block)?;
        let mut seen_non_phi = false;
        for (pos, &inst) in insts.iter().enumerate() {
            let kind = func.kind(inst);
            if kind.is_terminator() && pos + 1 != insts.len() {
                return Err(CompileError::MissingTerminator {
                    function: func.name.clone(),
                    block: func.block_name(block).to_string(),
                });
            }
            if kind.is_phi() {
                if seen_non_phi {
                    return Err(CompileError::invariant(
                        &func.name,
                        format!("phi after non-phi in block {}", func.block_name(block)),
                    ));
                }
                let slots = func.operands(inst).len();
                let preds = func.preds(block).len();
                if slots != preds {
                    return Err(CompileError::PhiArity {
                        function: func.name.clone(),
                        block: func.block_name(block).to_string(),
                        slots,
                        preds,
                    });
                }
            } else {
                seen_non_phi = true;
            }
            if func.inst_block(inst) != Some(block) {
                return Err(CompileError::invariant(
                    &func.name,
                    format!("inst {} has a stale block back-reference", inst.0),
                ));
            }
            for (slot, &v) in func.operands(inst).iter().enumerate() {
                let data = func.value(v);
                if !data.is_live() {
                    return Err(CompileError::DanglingUse {
                        function: func.name.clone(),
                        value: func.value_label(v),
                        user: format!("inst {}", inst.0),
                    });
                }
                let hits = data
                    .uses()
                    .iter()
                    .filter(|u| **u == Use { user: inst, slot })
                    .count();
                if hits != 1 {
                    return Err(CompileError::invariant(
                        &func.name,
                        format!(
                            "use-list of {} lists inst {} slot {} {} times",
                            func.value_label(v),
                            inst.0,
                            slot,
                            hits
                        ),
                    ));
                }
            }
            if let Some(r) = func.result(inst) {
                for u in func.value(r).uses() {
                    if func.inst_block(u.user).is_none() {
                        return Err(CompileError::DanglingUse {
                            function: func.name.clone(),
                            value: func.value_label(r),
                            user: format!("detached inst {}", u.user.0),
                        });
                    }
                }
            }
        }
        if let InstKind::Branch { .. } | InstKind::Jump { .. } = func.kind(func.terminator(block)?) {
            for succ in func.successors(block)? {
                if func.block(succ).is_removed() {
                    return Err(CompileError::invariant(
                        &func.name,
                        format!("block {} targets a removed block", func.block_name(block)),
                    ));
                }
                edges.entry(succ).or_default().push(block);
            }
        }
    }

    for &block in layout {
        let mut expected = edges.remove(&block).unwrap_or_default();
        let mut actual = func.preds(block).to_vec();
        expected.sort();
        actual.sort();
        if expected != actual {
            return Err(CompileError::invariant(
                &func.name,
                format!(
                    "predecessors of {} are {:?} but edges say {:?}",
                    func.block_name(block),
                    actual,
                    expected
                ),
            ));
        }
    }

    Ok(())
}
