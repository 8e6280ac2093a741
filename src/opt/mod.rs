//! Middle-end transformations on the SSA IR.
//!
//! Both passes report how much they changed, and both reach a fixpoint on
//! their own output: a second run reports zero.

pub mod mem2reg;
pub mod simplify_cfg;

pub use mem2reg::{mem2reg, Mem2RegStats};
pub use simplify_cfg::simplify_cfg;
