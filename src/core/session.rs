// This module provides the compilation session for sysmips. CompilationSession owns a
// reference to a bumpalo arena and hands out interned symbol names with the arena's
// lifetime. Instruction selection interns every call target, address-load symbol and data
// label through it, so machine instructions and the data section refer to one copy of each
// label for the whole module. It also accumulates SessionStats across every function compiled in the
// session: CFG rewrites performed by simplification, phis inserted and slots promoted by
// mem2reg, allocation rounds, spilled nodes and coalesced moves. Statistics live in a
// RefCell so passes can record them through a shared reference. Nothing here is global:
// two sessions in one process never observe each other, which keeps tests independent.

//! Arena-based compilation session management.
//!
//! All interned names are tied to the session lifetime. Passes receive
//! `&CompilationSession` and record statistics as they go.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for interned names.
    arena: &'arena Bump,

    /// Session statistics for debugging and tests.
    stats: RefCell<SessionStats>,

    /// String interning for labels and symbol names.
    interned_strings: RefCell<HashMap<String, &'arena str>>,

    /// Current function being compiled.
    current_function: RefCell<Option<String>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            current_function: RefCell::new(None),
        }
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Set current function being compiled.
    pub fn set_current_function(&self, name: &str) {
        *self.current_function.borrow_mut() = Some(name.to_string());
    }

    /// Name of the function currently in the pipeline, if any.
    pub fn current_function(&self) -> Option<String> {
        self.current_function.borrow().clone()
    }

    /// Clear per-function state once a function leaves the pipeline.
    pub fn clear_function_state(&self) {
        *self.current_function.borrow_mut() = None;
    }

    /// Record that a function was compiled down to `machine_insts` instructions.
    pub fn record_function_compiled(&self, name: &str, machine_insts: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_compiled += 1;
        stats.machine_instructions += machine_insts;

        if stats.largest_function_size < machine_insts {
            stats.largest_function_size = machine_insts;
            stats.largest_function_name = name.to_string();
        }
    }

    pub fn record_cfg_rewrites(&self, count: usize) {
        self.stats.borrow_mut().cfg_rewrites += count;
    }

    pub fn record_slots_promoted(&self, count: usize) {
        self.stats.borrow_mut().slots_promoted += count;
    }

    pub fn record_phis_inserted(&self, count: usize) {
        self.stats.borrow_mut().phis_inserted += count;
    }

    /// Record one liveness/build/color round of the allocator.
    pub fn record_alloc_round(&self) {
        self.stats.borrow_mut().alloc_rounds += 1;
    }

    pub fn record_spills(&self, count: usize) {
        self.stats.borrow_mut().spilled_nodes += count;
    }

    pub fn record_coalesced_moves(&self, count: usize) {
        self.stats.borrow_mut().coalesced_moves += count;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of functions compiled.
    pub functions_compiled: usize,

    /// Machine instructions emitted after allocation.
    pub machine_instructions: usize,

    /// Largest function compiled, in machine instructions.
    pub largest_function_size: usize,

    /// Name of largest function.
    pub largest_function_name: String,

    /// Branch folds, block elisions, pruned blocks and removed phis.
    pub cfg_rewrites: usize,

    /// Stack slots promoted to SSA values.
    pub slots_promoted: usize,

    /// Phis placed by mem2reg (before dead phi removal).
    pub phis_inserted: usize,

    /// Allocation rounds across all functions.
    pub alloc_rounds: usize,

    /// Nodes that received a stack slot.
    pub spilled_nodes: usize,

    /// Moves removed by coalescing.
    pub coalesced_moves: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Statistics:")?;
        writeln!(f, "  Functions compiled: {}", self.functions_compiled)?;
        writeln!(f, "  Machine instructions: {}", self.machine_instructions)?;
        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} instructions)",
                self.largest_function_name, self.largest_function_size
            )?;
        }
        writeln!(f, "  CFG rewrites: {}", self.cfg_rewrites)?;
        writeln!(f, "  Slots promoted: {}", self.slots_promoted)?;
        writeln!(f, "  Phis inserted: {}", self.phis_inserted)?;
        writeln!(f, "  Allocation rounds: {}", self.alloc_rounds)?;
        writeln!(f, "  Spilled nodes: {}", self.spilled_nodes)?;
        write!(f, "  Coalesced moves: {}", self.coalesced_moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_interning() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let a = session.intern_str("main_b0");
        let b = session.intern_str("main_b0");
        assert!(std::ptr::eq(a, b));
        assert_ne!(session.intern_str("main_b1"), a);
    }

    #[test]
    fn test_stats_accumulate() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_function_compiled("f", 10);
        session.record_function_compiled("main", 25);
        session.record_spills(2);
        session.record_alloc_round();
        session.record_alloc_round();

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 2);
        assert_eq!(stats.machine_instructions, 35);
        assert_eq!(stats.largest_function_name, "main");
        assert_eq!(stats.spilled_nodes, 2);
        assert_eq!(stats.alloc_rounds, 2);
    }
}
