// This test suite covers SSA construction end to end on small hand-written programs in the
// shape a front end emits them: every local lives in a one-word stack slot and is read and
// written through loads and stores. After mem2reg the loop accumulator must be carried by a
// single header phi with no memory traffic left, the constant-condition `if` must collapse to
// its taken arm, slots that escape or hold arrays must stay in memory, and a second run must
// find nothing more to promote. Each scenario is also executed by the reference interpreter
// before and after the pass to make sure the program still prints and returns the same thing.

//! mem2reg scenarios.

mod common;

use common::interp::run_main;
use common::{init_logging, parse};
use sysmips::ir::{verify_function, Function, InstKind, Module};
use sysmips::opt::{mem2reg, simplify_cfg};

fn main_mut(module: &mut Module) -> &mut Function {
    let id = module.function_by_name("main").unwrap();
    module.function_mut(id)
}

fn count(func: &Function, pred: impl Fn(&InstKind) -> bool) -> usize {
    func.layout()
        .iter()
        .flat_map(|&b| func.insts_of(b).iter())
        .filter(|&&i| pred(func.kind(i)))
        .count()
}

fn memory_ops(func: &Function) -> usize {
    count(func, |k| matches!(k, InstKind::Load | InstKind::Store | InstKind::Alloca { .. }))
}

const WHILE_SUM: &str = r#"
func @main() -> int {
entry:
  %n = alloca [1]
  %sum = alloca [1]
  %in = call @getint()
  store %n, 0, %in
  store %sum, 0, 0
  jump ^cond
cond:
  %nv = load %n, 0
  %go = gt %nv, 0
  br %go, ^body, ^done
body:
  %s = load %sum, 0
  %nv2 = load %n, 0
  %s2 = add %s, %nv2
  store %sum, 0, %s2
  %dec = sub %nv2, 1
  store %n, 0, %dec
  jump ^cond
done:
  %r = load %sum, 0
  print "sum=%d\n", %r
  ret %r
}
"#;

#[test]
fn while_loop_accumulator_becomes_header_phis() {
    init_logging();
    let reference = parse(WHILE_SUM);
    let mut module = parse(WHILE_SUM);
    let func = main_mut(&mut module);
    let stats = mem2reg(func).unwrap();
    verify_function(func).unwrap();

    assert_eq!(stats.promoted, 2);
    assert_eq!(memory_ops(func), 0);
    // One phi per slot, both at the loop header.
    let header = func
        .layout()
        .iter()
        .copied()
        .find(|&b| func.block_name(b) == "cond")
        .unwrap();
    assert_eq!(func.phis(header).len(), 2);
    assert_eq!(count(func, |k| k.is_phi()), 2);

    for input in [0, 1, 5] {
        assert_eq!(run_main(&module, &[input]).unwrap(), run_main(&reference, &[input]).unwrap());
    }
    assert_eq!(run_main(&module, &[4]).unwrap().output, "sum=10\n");
}

/// `int x = 0; while (x < limit) x = x + 3;` with only `x` in memory.
const WHILE_ONE_SCALAR: &str = r#"
func @main() -> int {
entry:
  %x = alloca [1]
  %limit = call @getint()
  store %x, 0, 0
  jump ^cond
cond:
  %v = load %x, 0
  %go = lt %v, %limit
  br %go, ^body, ^done
body:
  %w = load %x, 0
  %w2 = add %w, 3
  store %x, 0, %w2
  jump ^cond
done:
  %r = load %x, 0
  print "x=%d\n", %r
  ret %r
}
"#;

#[test]
fn single_scalar_loop_gets_one_header_phi() {
    init_logging();
    let reference = parse(WHILE_ONE_SCALAR);
    let mut module = parse(WHILE_ONE_SCALAR);
    let func = main_mut(&mut module);
    let stats = mem2reg(func).unwrap();
    verify_function(func).unwrap();

    assert_eq!(stats.promoted, 1);
    assert_eq!(memory_ops(func), 0);
    let header = func
        .layout()
        .iter()
        .copied()
        .find(|&b| func.block_name(b) == "cond")
        .unwrap();
    assert_eq!(func.phis(header).len(), 1);
    assert_eq!(count(func, |k| k.is_phi()), 1);

    for input in [0, 1, 10] {
        assert_eq!(run_main(&module, &[input]).unwrap(), run_main(&reference, &[input]).unwrap());
    }
    assert_eq!(run_main(&module, &[10]).unwrap().output, "x=12\n");
}

#[test]
fn constant_if_folds_to_then_arm() {
    init_logging();
    let mut module = parse(
        r#"
func @main() -> int {
entry:
  %x = alloca [1]
  br 1, ^then, ^else
then:
  store %x, 0, 1
  jump ^join
else:
  store %x, 0, 2
  jump ^join
join:
  %v = load %x, 0
  ret %v
}
"#,
    );
    let func = main_mut(&mut module);
    mem2reg(func).unwrap();
    simplify_cfg(func).unwrap();
    verify_function(func).unwrap();

    assert!(func.layout().iter().all(|&b| func.block_name(b) != "else"));
    assert_eq!(count(func, |k| k.is_phi()), 0);
    assert_eq!(memory_ops(func), 0);
    let ret = func.terminator(func.layout()[func.layout().len() - 1]).unwrap();
    assert_eq!(func.as_const(func.operands(ret)[0]), Some(1));
    assert_eq!(run_main(&module, &[]).unwrap().result, Some(1));
}

#[test]
fn read_before_store_yields_zero() {
    init_logging();
    let mut module = parse(
        r#"
func @main() -> int {
entry:
  %x = alloca [1]
  %c = call @getint()
  br %c, ^set, ^join
set:
  store %x, 0, 9
  jump ^join
join:
  %v = load %x, 0
  ret %v
}
"#,
    );
    let func = main_mut(&mut module);
    assert_eq!(mem2reg(func).unwrap().promoted, 1);
    verify_function(func).unwrap();
    assert_eq!(run_main(&module, &[0]).unwrap().result, Some(0));
    assert_eq!(run_main(&module, &[1]).unwrap().result, Some(9));
}

#[test]
fn escaping_and_array_slots_stay_in_memory() {
    init_logging();
    let mut module = parse(
        r#"
func @sink(%p) -> void {
entry:
  store %p, 0, 4
  ret
}

func @main() -> int {
entry:
  %arr = alloca [3]
  %esc = alloca [1]
  %idx = alloca [1]
  %plain = alloca [1]
  store %arr, 2, 5
  call @sink(%esc)
  %k = sub 1, 1
  store %idx, %k, 6
  store %plain, 0, 7
  %a = load %arr, 2
  %e = load %esc, 0
  %d = load %idx, 0
  %p = load %plain, 0
  %s = add %a, %e
  %t = add %s, %p
  %u = add %t, %d
  ret %u
}
"#,
    );
    let reference = module.clone();
    let func = main_mut(&mut module);
    let stats = mem2reg(func).unwrap();
    verify_function(func).unwrap();
    assert_eq!(stats.promoted, 1);
    assert_eq!(count(func, |k| matches!(k, InstKind::Alloca { .. })), 3);
    assert_eq!(run_main(&module, &[]).unwrap(), run_main(&reference, &[]).unwrap());
    assert_eq!(run_main(&module, &[]).unwrap().result, Some(22));
}

#[test]
fn second_run_promotes_nothing() {
    init_logging();
    let mut module = parse(WHILE_SUM);
    let func = main_mut(&mut module);
    assert!(mem2reg(func).unwrap().promoted > 0);
    let again = mem2reg(func).unwrap();
    assert_eq!(again.promoted, 0);
    assert_eq!(again.phis_inserted, 0);
    verify_function(func).unwrap();
}

#[test]
fn nested_loops_keep_semantics() {
    init_logging();
    let source = r#"
global @total = 0

func @main() -> int {
entry:
  %i = alloca [1]
  %j = alloca [1]
  %acc = alloca [1]
  store %i, 0, 0
  store %acc, 0, 0
  jump ^outer
outer:
  %iv = load %i, 0
  %oc = lt %iv, 4
  br %oc, ^outer_body, ^exit
outer_body:
  store %j, 0, 0
  jump ^inner
inner:
  %jv = load %j, 0
  %ic = lt %jv, %iv
  br %ic, ^inner_body, ^latch
inner_body:
  %a = load %acc, 0
  %m = mul %iv, %jv
  %a2 = add %a, %m
  store %acc, 0, %a2
  %j2 = add %jv, 1
  store %j, 0, %j2
  jump ^inner
latch:
  %i2 = add %iv, 1
  store %i, 0, %i2
  %g = load @total, 0
  %g2 = add %g, 1
  store @total, 0, %g2
  jump ^outer
exit:
  %r = load %acc, 0
  %g3 = load @total, 0
  print "acc=%d total=%d\n", %r, %g3
  ret %r
}
"#;
    let reference = parse(source);
    let mut module = parse(source);
    let func = main_mut(&mut module);
    assert_eq!(mem2reg(func).unwrap().promoted, 3);
    verify_function(func).unwrap();
    // Loads and stores of the global remain.
    assert_eq!(count(func, |k| matches!(k, InstKind::Alloca { .. })), 0);
    let after = run_main(&module, &[]).unwrap();
    assert_eq!(after, run_main(&reference, &[]).unwrap());
    assert_eq!(after.output, "acc=11 total=4\n");
}
