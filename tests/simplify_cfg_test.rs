// This test suite checks CFG simplification by running random programs before and after the
// pass and comparing what they print. The programs come from the shape generator in
// common::cfg_gen: a mix of blocks that bump a global counter and print it, and blocks that
// do nothing but jump, wired together with random jumps, branches and returns. Join blocks
// carry phis whose incoming values are frequently the same interned constant on several
// edges, which is exactly the situation where eliding an empty block would merge two edges
// the phi needs to tell apart. Programs that loop forever are cut off by the interpreter's
// step budget; in that case the simplified program must print a prefix-compatible stream.
// Every result must also verify, and a second run over the simplified function must find
// nothing left to do.

//! CFG simplification preserves behavior and reaches a fixpoint.

mod common;

use common::cfg_gen::{arb_shape, build_shape};
use common::interp::{run_main, Interpreter};
use common::{init_logging, parse};
use proptest::prelude::*;
use sysmips::ir::{verify_function, Module};
use sysmips::opt::simplify_cfg;

fn simplify_all(module: &mut Module) -> usize {
    let mut total = 0;
    for id in module.function_ids().collect::<Vec<_>>() {
        total += simplify_cfg(module.function_mut(id)).unwrap();
    }
    total
}

fn main_of(module: &Module) -> &sysmips::ir::Function {
    module.function(module.function_by_name("main").unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn simplification_preserves_output(shape in arb_shape(10), input in -5i32..5) {
        let original = build_shape(&shape);
        verify_function(main_of(&original)).unwrap();

        let mut simplified = original.clone();
        simplify_all(&mut simplified);
        verify_function(main_of(&simplified)).unwrap();

        let before = Interpreter::new(&original, &[input]).with_step_limit(2_000).run("main", &[]).unwrap();
        let after = Interpreter::new(&simplified, &[input]).with_step_limit(2_000).run("main", &[]).unwrap();

        if before.exhausted || after.exhausted {
            // The budget counts instructions, and simplification removes
            // some, so either side may have printed further.
            let (short, long) = if before.output.len() <= after.output.len() {
                (&before.output, &after.output)
            } else {
                (&after.output, &before.output)
            };
            prop_assert!(long.starts_with(short.as_str()), "{:?} vs {:?}", before.output, after.output);
        } else {
            prop_assert_eq!(&before, &after);
        }
    }

    #[test]
    fn second_run_is_a_no_op(shape in arb_shape(10)) {
        let mut module = build_shape(&shape);
        simplify_all(&mut module);
        prop_assert_eq!(simplify_all(&mut module), 0);
    }

    #[test]
    fn entry_keeps_no_predecessors(shape in arb_shape(10)) {
        let mut module = build_shape(&shape);
        simplify_all(&mut module);
        let func = main_of(&module);
        prop_assert!(func.preds(func.entry()).is_empty());
    }
}

#[test]
fn shared_constant_edges_keep_their_block() {
    init_logging();
    // `mid` is empty, but `head` already branches to `join`; eliding
    // `mid` would give `join` two edges from `head` with different values.
    let source = r#"
func @main() -> int {
entry:
  %x = call @getint()
  jump ^head
head:
  %c = lt %x, 5
  br %c, ^mid, ^join
mid:
  jump ^join
join:
  %p = phi [^head, 1], [^mid, 2]
  ret %p
}
"#;
    let mut module = parse(source);
    let reference = parse(source);
    simplify_all(&mut module);
    let func = main_of(&module);
    verify_function(func).unwrap();
    assert!(func.layout().iter().any(|&b| func.block_name(b) == "mid"));
    for input in [0, 9] {
        assert_eq!(
            run_main(&module, &[input]).unwrap(),
            run_main(&reference, &[input]).unwrap()
        );
    }
}

#[test]
fn straight_line_chain_collapses() {
    init_logging();
    let mut module = parse(
        r#"
func @main() -> int {
entry:
  jump ^a
a:
  jump ^b
b:
  jump ^c
c:
  br 1, ^d, ^dead
dead:
  ret 7
d:
  ret 3
}
"#,
    );
    simplify_all(&mut module);
    let func = main_of(&module);
    verify_function(func).unwrap();
    let names: Vec<&str> = func.layout().iter().map(|&b| func.block_name(b)).collect();
    assert!(!names.contains(&"dead"));
    assert!(!names.contains(&"a"));
    assert!(!names.contains(&"b"));
    assert_eq!(run_main(&module, &[]).unwrap().result, Some(3));
}
