//! Text dumps of the analysis results, for the CLI and the filetests.

use super::dominance::DominatorTree;
use super::loops::LoopInfo;
use crate::core::{Analyzer, CfgAdaptor, CompileResult};
use std::fmt::Write;
use std::hash::Hash;

fn labels<G: CfgAdaptor>(graph: &G, blocks: &[G::BlockRef]) -> String {
    let names: Vec<String> = blocks.iter().map(|&b| graph.block_label(b)).collect();
    format!("[{}]", names.join(", "))
}

pub fn format_rpo<G: CfgAdaptor>(graph: &G) -> CompileResult<String> {
    let analyzer = Analyzer::analyze(graph)?;
    let mut out = String::new();
    let _ = writeln!(out, "RPO for func {}", graph.graph_name());
    for (idx, &b) in analyzer.order().iter().enumerate() {
        let _ = writeln!(out, "{}: {}", idx, graph.block_label(b));
    }
    out.push_str("End RPO\n");
    Ok(out)
}

/// `idom`, tree depth and the full dominator set of every reachable block.
pub fn format_dominance<G>(graph: &G, dom: &DominatorTree<G::BlockRef>) -> String
where
    G: CfgAdaptor,
    G::BlockRef: Hash,
{
    let mut out = String::new();
    let _ = writeln!(out, "Dominators for func {}", graph.graph_name());
    for b in graph.blocks() {
        if !dom.is_reachable(b) {
            let _ = writeln!(out, "{}: unreachable", graph.block_label(b));
            continue;
        }
        let idom = dom.idom(b).map_or_else(|| "-".to_string(), |d| graph.block_label(d));
        let _ = writeln!(
            out,
            "{}: idom={} depth={} dom_by={}",
            graph.block_label(b),
            idom,
            dom.depth(b).unwrap_or(0),
            labels(graph, &dom.dom_by(b))
        );
    }
    out.push_str("End Dominators\n");
    out
}

pub fn format_frontiers<G>(graph: &G, dom: &DominatorTree<G::BlockRef>) -> String
where
    G: CfgAdaptor,
    G::BlockRef: Hash,
{
    let mut out = String::new();
    let _ = writeln!(out, "Frontiers for func {}", graph.graph_name());
    for b in graph.blocks().into_iter().filter(|&b| dom.is_reachable(b)) {
        let _ = writeln!(out, "{}: {}", graph.block_label(b), labels(graph, dom.frontier(b)));
    }
    out.push_str("End Frontiers\n");
    out
}

pub fn format_loops<G>(graph: &G, loops: &LoopInfo<G::BlockRef>) -> String
where
    G: CfgAdaptor,
    G::BlockRef: Hash,
{
    let mut out = String::new();
    let _ = writeln!(out, "Loops for func {}", graph.graph_name());
    for (i, l) in loops.loops().iter().enumerate() {
        let parent = l.parent.map_or_else(|| "-".to_string(), |p| p.0.to_string());
        let id = super::LoopId(i as u32);
        let _ = writeln!(
            out,
            "loop {}: header={} depth={} parent={} blocks={}",
            i,
            graph.block_label(l.header),
            loops.depth(id),
            parent,
            labels(graph, &l.blocks)
        );
    }
    out.push_str("End Loops\n");
    out
}
