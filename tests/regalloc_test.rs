// This test suite looks at register allocation from the outside. For every function of a set
// of programs it selects machine code, runs iterated register coalescing under several budgets
// and then checks the result against the interference graph of the final round: two nodes
// joined by an edge must never end up in the same register. It also checks that the
// spill-and-retry loop terminates under heavy pressure and a small budget, that the number of
// rounds stays within the bound the allocator promises, and that the printed assembly has the
// layout MARS expects (data first, main before the other functions, runtime stubs last).

//! Register allocation results on selected machine code.

mod common;

use bumpalo::Bump;
use common::{compile_with, init_logging, parse};
use sysmips::core::{CompilationSession, Compiler, CompilerOptions, RegisterBudget};
use sysmips::ir::Module;
use sysmips::mips::liveness::VIRTUAL_BASE;
use sysmips::mips::{allocate_registers, print_module, Allocation, MipsReg, NodeId};

const PROGRAM: &str = r#"
global @table[4] = 7, 8, 9, 10

func @dot(%a, %b, %c, %d, %e) -> int {
entry:
  %x = mul %a, %b
  %y = mul %c, %d
  %z = add %x, %y
  %w = add %z, %e
  ret %w
}

func @main() -> int {
entry:
  %n = call @getint()
  jump ^loop
loop:
  %i = phi [^entry, 0], [^body, %i2]
  %a = phi [^entry, 1], [^body, %b]
  %b = phi [^entry, 2], [^body, %a]
  %acc = phi [^entry, 0], [^body, %acc2]
  %c = lt %i, %n
  br %c, ^body, ^done
body:
  %t = load @table, %i
  %d = call @dot(%a, %b, %t, %i, %acc)
  %acc2 = add %acc, %d
  %i2 = add %i, 1
  jump ^loop
done:
  print "%d %d %d\n", %acc, %a, %b
  ret 0
}
"#;

fn color(alloc: &Allocation, node: NodeId) -> Option<MipsReg> {
    if node < VIRTUAL_BASE {
        MipsReg::from_index(node)
    } else {
        alloc.assignment.get(&((node - VIRTUAL_BASE) as u32)).copied()
    }
}

/// Select and allocate every function; returns the allocations.
fn allocate_all(module: &mut Module, budget: &RegisterBudget) -> Vec<(String, Allocation)> {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiler = Compiler::new(&session, CompilerOptions::default());
    compiler.optimize_module(module).unwrap();
    module
        .function_ids()
        .map(|id| {
            let mut mf = compiler.select(module, id).unwrap();
            let alloc = allocate_registers(&mut mf, budget, None).unwrap();
            (mf.name.clone(), alloc)
        })
        .collect()
}

#[test]
fn no_interfering_nodes_share_a_register() {
    init_logging();
    for regs in [18, 8, 5, 4] {
        let mut module = parse(PROGRAM);
        let budget = RegisterBudget::first(regs);
        for (name, alloc) in allocate_all(&mut module, &budget) {
            for &(x, y) in &alloc.interference {
                if let (Some(cx), Some(cy)) = (color(&alloc, x), color(&alloc, y)) {
                    assert_ne!(cx, cy, "{}: regs={} nodes {} and {} share {}", name, regs, x, y, cx);
                }
            }
            for reg in alloc.assignment.values() {
                assert!(budget.contains(*reg), "{}: {} is outside the budget", name, reg);
            }
        }
    }
}

#[test]
fn full_budget_needs_no_spills() {
    init_logging();
    let mut module = parse(PROGRAM);
    for (name, alloc) in allocate_all(&mut module, &RegisterBudget::general()) {
        assert_eq!(alloc.spilled, 0, "{}", name);
        assert_eq!(alloc.rounds, 1, "{}", name);
    }
}

#[test]
fn small_budget_spills_and_terminates() {
    init_logging();
    let mut module = parse(PROGRAM);
    let allocations = allocate_all(&mut module, &RegisterBudget::first(4));
    let main = allocations.iter().find(|(n, _)| n == "main").map(|(_, a)| a).unwrap();
    assert!(main.spilled > 0);
    assert!(main.rounds > 1);
}

#[test]
fn compiled_program_runs_under_every_budget() {
    init_logging();
    let reference = parse(PROGRAM);
    let expected = common::interp::run_main(&reference, &[4]).unwrap().output;
    // dot returns 2 + t*i + acc each round: acc runs 2, 14, 48, 128.
    assert_eq!(expected, "128 1 2\n");
    for regs in [18, 6, 5, 4] {
        let mut module = parse(PROGRAM);
        let arena = Bump::new();
        let machine = compile_with(&arena, &mut module, regs).unwrap();
        let out = common::machine_sim::run_machine(&machine, &[4]).unwrap();
        assert_eq!(out, expected, "regs={}", regs);
    }
}

#[test]
fn assembly_layout() {
    init_logging();
    let mut module = parse(PROGRAM);
    let arena = Bump::new();
    let machine = compile_with(&arena, &mut module, 18).unwrap();
    let text = print_module(&machine);

    let data = text.find(".data").unwrap();
    let code = text.find(".text").unwrap();
    let main = text.find("\nmain:").unwrap();
    let dot = text.find("\nf_dot:").unwrap();
    let stub = text.find("\nrt_getint:").unwrap();
    assert!(data < code && code < main && main < dot && dot < stub);
    assert!(text.contains("g_table: .word 7, 8, 9, 10"));
    assert!(text.contains("jal f_dot"));
    // Five arguments: one goes on the stack around the call.
    assert!(text.contains("addiu $sp, $sp, -4\n  jal f_dot\n  addiu $sp, $sp, 4"));
    assert!(text.contains("li $v0, 10\n  syscall"));
}
