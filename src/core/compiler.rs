// This module defines the pipeline driver of sysmips. Compiler holds the options of one
// compilation run and a reference to the CompilationSession that collects statistics. The
// middle-end runs per function: mem2reg (which simplifies the CFG first so unreachable code
// cannot hold stale slot accesses) followed by one more simplification round to fold what
// promotion exposed, with the verifier run between passes when requested. The backend then
// runs per function in a fixed order: dominators and loop info, instruction selection with
// phi lowering, iterated register coalescing until a round needs no spills, and frame
// finalize. main is compiled first so the printed program starts at its entry point. Every
// stage reports through the log facade and fails the whole run on the first error.

//! Compiler pipeline driver.
//!
//! ```text
//! for each function {
//!     verify -> mem2reg -> simplify_cfg -> verify      (optimize)
//!     dominators -> loops -> select -> allocate -> finalize
//! }
//! ```

use super::error::CompileResult;
use super::register_file::RegisterBudget;
use super::session::CompilationSession;
use crate::analysis::{DominatorTree, LoopInfo};
use crate::ir::{verify_function, FuncId, Function, Module};
use crate::mips::{
    allocate_registers, data_section, finalize_frame, print_module, select_function, MachineFunction,
    MachineModule,
};
use crate::opt::{mem2reg, simplify_cfg};

/// Knobs of one compilation run.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Run CFG simplification and mem2reg.
    pub optimize: bool,
    /// Verify the IR before and after every middle-end pass.
    pub verify: bool,
    /// Registers the allocator may hand out.
    pub registers: RegisterBudget,
    /// Cap on allocation rounds per function; derived from the virtual
    /// register count when unset.
    pub max_alloc_rounds: Option<usize>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            verify: true,
            registers: RegisterBudget::general(),
            max_alloc_rounds: None,
        }
    }
}

pub struct Compiler<'s, 'arena> {
    session: &'s CompilationSession<'arena>,
    options: CompilerOptions,
}

impl<'s, 'arena> Compiler<'s, 'arena> {
    pub fn new(session: &'s CompilationSession<'arena>, options: CompilerOptions) -> Self {
        Self { session, options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn session(&self) -> &'s CompilationSession<'arena> {
        self.session
    }

    fn verify(&self, func: &Function) -> CompileResult<()> {
        if self.options.verify {
            verify_function(func)?;
        }
        Ok(())
    }

    /// Function ids with `main` first.
    fn function_order(module: &Module) -> Vec<FuncId> {
        let mut ids: Vec<FuncId> = module.function_ids().collect();
        ids.sort_by_key(|&id| module.function(id).name != "main");
        ids
    }

    /// Run the middle-end over one function.
    pub fn optimize_function(&self, func: &mut Function) -> CompileResult<()> {
        self.verify(func)?;
        if !self.options.optimize {
            return Ok(());
        }
        let stats = mem2reg(func)?;
        self.verify(func)?;
        let rewrites = simplify_cfg(func)?;
        self.verify(func)?;

        self.session.record_cfg_rewrites(stats.cfg_rewrites + rewrites);
        self.session.record_slots_promoted(stats.promoted);
        self.session.record_phis_inserted(stats.phis_inserted);
        log::debug!(
            "{}: promoted {} slots, {} phis placed ({} dead), {} CFG rewrites",
            func.name,
            stats.promoted,
            stats.phis_inserted,
            stats.phis_removed,
            stats.cfg_rewrites + rewrites
        );
        Ok(())
    }

    pub fn optimize_module(&self, module: &mut Module) -> CompileResult<()> {
        if module.function_by_name("main").is_none() {
            log::warn!("module has no main function");
        }
        for id in module.function_ids().collect::<Vec<_>>() {
            let func = module.function_mut(id);
            self.session.set_current_function(&func.name);
            self.optimize_function(func)?;
        }
        self.session.clear_function_state();
        Ok(())
    }

    /// Instruction selection only; the result still uses virtual registers.
    pub fn select(&self, module: &Module, id: FuncId) -> CompileResult<MachineFunction<'arena>> {
        let func = module.function(id);
        let dom = DominatorTree::compute(func)?;
        let loops = LoopInfo::compute(func, &dom)?;
        select_function(self.session, module, func, &loops)
    }

    /// Selected but unallocated code for every function, `main` first.
    pub fn select_module(&self, module: &Module) -> CompileResult<MachineModule<'arena>> {
        let mut functions = Vec::new();
        for id in Self::function_order(module) {
            functions.push(self.select(module, id)?);
        }
        Ok(MachineModule {
            data: data_section(self.session, module),
            functions,
        })
    }

    /// Backend for one function of an already optimized module.
    pub fn compile_function(&self, module: &Module, id: FuncId) -> CompileResult<MachineFunction<'arena>> {
        let name = module.function(id).name.clone();
        self.session.set_current_function(&name);
        let mut mf = self.select(module, id)?;

        let alloc = allocate_registers(&mut mf, &self.options.registers, self.options.max_alloc_rounds)?;
        for _ in 0..alloc.rounds {
            self.session.record_alloc_round();
        }
        self.session.record_spills(alloc.spilled);
        self.session.record_coalesced_moves(alloc.coalesced_moves);

        finalize_frame(&mut mf)?;
        self.session.record_function_compiled(&name, mf.placed_count());
        self.session.clear_function_state();
        Ok(mf)
    }

    /// Optimize (when enabled) and compile every function.
    pub fn compile_module(&self, module: &mut Module) -> CompileResult<MachineModule<'arena>> {
        self.optimize_module(module)?;
        self.lower_module(module)
    }

    /// Backend for every function of an already optimized module.
    pub fn lower_module(&self, module: &Module) -> CompileResult<MachineModule<'arena>> {
        let mut functions = Vec::new();
        for id in Self::function_order(module) {
            functions.push(self.compile_function(module, id)?);
        }
        log::debug!("compiled {} functions", functions.len());
        Ok(MachineModule {
            data: data_section(self.session, module),
            functions,
        })
    }

    /// Full pipeline down to assembly text.
    pub fn compile_to_assembly(&self, module: &mut Module) -> CompileResult<String> {
        let machine = self.compile_module(module)?;
        Ok(print_module(&machine))
    }
}
