//! Straight-line block fusion.
//!
//! Fuses `B -> S` when B ends with `jmp S` and S has exactly one
//! predecessor (B): S's instructions are spliced into B and S is deleted.
//! The CFG is rebuilt after every structural change.

use crate::common::*;
use crate::middle::build::build_cfg;
use crate::middle::ir::*;

pub fn fuse_straightline(f: &mut Function) -> bool {
    let mut changed = false;
    // make sure succ/pred are up-to-date
    build_cfg(f);

    loop {
        let candidate = find_fusable(f);
        let Some((bi, si)) = candidate else {
            break;
        };

        let spliced = f.blocks.remove(si);
        let bi = if si < bi { bi - 1 } else { bi };
        let b = &mut f.blocks[bi];
        // drop the jmp, then splice S's body (skipping any stray label
        // pseudo-instruction)
        b.instrs.pop();
        b.instrs
            .extend(spliced.instrs.into_iter().filter(|i| !matches!(i, Instr::Label { .. })));

        build_cfg(f);
        changed = true;
    }
    changed
}

/// Find `(B index, S index)` for the first fusable jmp edge, if any.
fn find_fusable(f: &Function) -> Option<(usize, usize)> {
    for (bi, b) in f.blocks.iter().enumerate() {
        let Some(Instr::Jmp { target }) = b.instrs.last() else {
            continue;
        };
        if *target == b.label {
            // self-loop
            continue;
        }
        let preds: Set<Id> = f
            .pred
            .get(target)
            .into_iter()
            .flatten()
            .copied()
            .collect();
        if preds != Set::from([b.label]) {
            continue;
        }
        if let Some(si) = f.blocks.iter().position(|s| s.label == *target) {
            return Some((bi, si));
        }
    }
    None
}
