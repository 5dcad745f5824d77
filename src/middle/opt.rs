//! The optimization pipeline: local dataflow passes over basic blocks,
//! iterated to a fixpoint.
//!
//! Every pass mutates the [Function] in place and reports whether it changed
//! anything.  Passes stay sound under the assumption that block boundaries
//! are barriers: no value knowledge crosses a terminator.

pub mod algebra;
pub mod const_fold;
pub mod const_prop;
pub mod copy_prop;
pub mod dce;
pub mod fuse;

pub use algebra::algebra_simplify;
pub use const_fold::const_fold;
pub use const_prop::const_propagate;
pub use copy_prop::copy_propagate;
pub use dce::{dead_store_elim, drop_unreachable};
pub use fuse::fuse_straightline;

use log::debug;

use crate::middle::ir::Function;

/// Cap on outer pipeline iterations; each iteration only does sensible
/// work, so the fixpoint normally arrives well before this.
const MAX_ITERS: usize = 8;

/// Run the pipeline for the given optimization level (0 disables it).
///
/// O1 is the base set; O2 adds copy propagation, O3 adds algebraic
/// simplification, each followed by its cleanup passes.  Order within an
/// iteration matters: folding observes propagation results and fusion
/// observes unreachable-block removal.
pub fn optimize_function(f: &mut Function, opt_level: u8) {
    if opt_level == 0 {
        return;
    }

    for iter in 0..MAX_ITERS {
        let mut changed = false;

        changed |= run("constprop", const_propagate, f);
        changed |= run("constfold", const_fold, f);
        changed |= run("drop_unreachable", drop_unreachable, f);
        changed |= run("fuse_straightline", fuse_straightline, f);
        changed |= run("dse", dead_store_elim, f);

        if opt_level >= 2 {
            changed |= run("copyprop", copy_propagate, f);
            changed |= run("constfold", const_fold, f);
            changed |= run("dse", dead_store_elim, f);
            changed |= run("fuse_straightline", fuse_straightline, f);
        }

        if opt_level >= 3 {
            changed |= run("algebra", algebra_simplify, f);
            changed |= run("constfold", const_fold, f);
            changed |= run("dse", dead_store_elim, f);
            changed |= run("fuse_straightline", fuse_straightline, f);
        }

        if !changed {
            debug!("pipeline fixpoint after {} iteration(s)", iter + 1);
            break;
        }
    }
}

fn run(name: &str, pass: fn(&mut Function) -> bool, f: &mut Function) -> bool {
    let changed = pass(f);
    debug!("{name}: changed={changed}");
    changed
}
