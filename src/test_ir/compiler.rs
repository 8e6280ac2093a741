//! Runs a parsed module through the pipeline and renders the requested dumps.
//!
//! The command line tool and the filetest runner both go through
//! [`render_dumps`], so a `.tir` test sees exactly what `sysmips --emit`
//! prints.

use crate::analysis::{format_dominance, format_frontiers, format_loops, format_rpo, DominatorTree, LoopInfo};
use crate::core::{CompilationSession, CompileResult, Compiler, CompilerOptions};
use crate::ir::{printer, Module};
use crate::mips::{self, format_liveness, Liveness};

/// One printable stage of the pipeline, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum Dump {
    /// IR as parsed.
    Ir,
    /// IR after the middle-end.
    IrOpt,
    Rpo,
    Dom,
    Df,
    Loops,
    /// Block liveness of the selected code, before allocation.
    Liveness,
    /// Final assembly.
    Mips,
}

impl Dump {
    /// The filetest flag selecting this dump.
    pub fn from_flag(flag: &str) -> Option<Dump> {
        Some(match flag {
            "--print-ir" => Dump::Ir,
            "--print-ir-opt" => Dump::IrOpt,
            "--print-rpo" => Dump::Rpo,
            "--print-dom" => Dump::Dom,
            "--print-df" => Dump::Df,
            "--print-loops" => Dump::Loops,
            "--print-liveness" => Dump::Liveness,
            "--print-mips" => Dump::Mips,
            _ => return None,
        })
    }
}

/// Run the pipeline over `module` and concatenate the requested dumps.
///
/// Dumps come out in pipeline order whatever order they were requested in.
/// The module is left in its optimized state.
pub fn render_dumps(
    session: &CompilationSession<'_>,
    module: &mut Module,
    options: CompilerOptions,
    dumps: &[Dump],
) -> CompileResult<String> {
    let mut wanted = dumps.to_vec();
    wanted.sort();
    wanted.dedup();

    let compiler = Compiler::new(session, options);
    let mut out = String::new();

    if wanted.contains(&Dump::Ir) {
        out.push_str(&printer::print_module(module));
    }
    compiler.optimize_module(module)?;

    for dump in wanted {
        match dump {
            Dump::Ir => {}
            Dump::IrOpt => out.push_str(&printer::print_module(module)),
            Dump::Rpo => {
                for f in &module.functions {
                    out.push_str(&format_rpo(f)?);
                }
            }
            Dump::Dom | Dump::Df | Dump::Loops => {
                for f in &module.functions {
                    let dom = DominatorTree::compute(f)?;
                    match dump {
                        Dump::Dom => out.push_str(&format_dominance(f, &dom)),
                        Dump::Df => out.push_str(&format_frontiers(f, &dom)),
                        _ => {
                            let loops = LoopInfo::compute(f, &dom)?;
                            out.push_str(&format_loops(f, &loops));
                        }
                    }
                }
            }
            Dump::Liveness => {
                let selected = compiler.select_module(module)?;
                for mf in &selected.functions {
                    let liveness = Liveness::compute(mf, &compiler.options().registers)?;
                    out.push_str(&format_liveness(mf, &liveness));
                }
            }
            Dump::Mips => {
                let machine = compiler.lower_module(module)?;
                out.push_str(&mips::print_module(&machine));
            }
        }
    }
    Ok(out)
}
