//! Dead-code elimination: unreachable-block removal and dead-store
//! elimination via backward liveness.

use std::collections::VecDeque;

use crate::common::*;
use crate::middle::build::build_cfg;
use crate::middle::ir::*;

/// Remove blocks not reachable from the entry.  Run after const-fold so
/// `br const` -> `jmp` exposes unreachable arms.
pub fn drop_unreachable(f: &mut Function) -> bool {
    let Some(start) = f.entry() else {
        return false;
    };
    // terminators may have been rewritten since the last rebuild
    build_cfg(f);
    let mut seen: Set<Id> = Set::new();
    let mut queue = VecDeque::from([start]);
    while let Some(u) = queue.pop_front() {
        if !seen.insert(u) {
            continue;
        }
        if let Some(outs) = f.succ.get(&u) {
            queue.extend(outs.iter().copied());
        }
    }

    let before = f.blocks.len();
    f.blocks.retain(|b| seen.contains(&b.label));
    build_cfg(f);
    f.blocks.len() != before
}

/// Bound on the liveness dataflow iteration.
const MAX_ITERS: usize = 16;

/// Dead-store elimination.
///
/// Phase A solves the classic backward dataflow
/// `out[b] = U in[s]`, `in[b] = USE[b] | (out[b] - DEF[b])` to a fixpoint.
/// Phase B sweeps each block backward from `out[b]`, deleting side-effect-
/// free definitions of dead variables.  Terminators always survive.
pub fn dead_store_elim(f: &mut Function) -> bool {
    // ---- Phase A: per-block USE/DEF, then the dataflow ----
    let mut use_: Map<Id, Set<Id>> = Map::new();
    let mut def: Map<Id, Set<Id>> = Map::new();
    for b in &f.blocks {
        let (mut u, mut d) = (Set::new(), Set::new());
        for ins in &b.instrs {
            // a use of a var not yet defined in this block is upward-exposed
            for v in ins.uses() {
                if !d.contains(&v) {
                    u.insert(v);
                }
            }
            if let Some(dv) = ins.def() {
                d.insert(dv);
            }
        }
        use_.insert(b.label, u);
        def.insert(b.label, d);
    }

    let mut live_in: Map<Id, Set<Id>> = f.blocks.iter().map(|b| (b.label, Set::new())).collect();
    let mut live_out: Map<Id, Set<Id>> = live_in.clone();

    let mut changed = true;
    let mut iters = 0;
    while changed && iters < MAX_ITERS {
        changed = false;
        iters += 1;
        for b in &f.blocks {
            let mut new_out: Set<Id> = Set::new();
            for s in f.succ.get(&b.label).into_iter().flatten() {
                if let Some(in_s) = live_in.get(s) {
                    new_out.extend(in_s.iter().copied());
                }
            }
            let mut new_in = use_[&b.label].clone();
            new_in.extend(new_out.difference(&def[&b.label]).copied());

            if new_out != live_out[&b.label] {
                live_out.insert(b.label, new_out);
                changed = true;
            }
            if new_in != live_in[&b.label] {
                live_in.insert(b.label, new_in);
                changed = true;
            }
        }
    }

    // ---- Phase B: backward sweep per block, seeded from live_out ----
    let mut any_removed = false;
    for b in &mut f.blocks {
        let mut live = live_out[&b.label].clone();
        let mut kept: Vec<Instr> = Vec::with_capacity(b.instrs.len());
        for ins in b.instrs.iter().rev() {
            let dv = ins.def();
            if let Some(dv) = dv {
                if !ins.has_side_effect() && !live.contains(&dv) {
                    // dead definition: drop it, and do not let its uses
                    // keep anything else alive
                    any_removed = true;
                    continue;
                }
                live.remove(&dv);
            }
            live.extend(ins.uses());
            kept.push(*ins);
        }
        kept.reverse();
        b.instrs = kept;
    }
    any_removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::opt::const_fold;
    use crate::middle::opt::tests::build;

    #[test]
    fn drops_blocks_cut_off_by_folded_branches() {
        // ifFalse 0 goto L1 folds to jmp L1; the fallthrough block dies
        let mut f = build(&["ifFalse 0 goto L1", "x = 1", "L1:", "return 2"]);
        assert!(const_fold(&mut f));
        assert!(drop_unreachable(&mut f));
        let labels: Vec<Id> = f.blocks.iter().map(|b| b.label).collect();
        assert_eq!(labels, vec![id("_entry"), id("L1")]);
    }

    #[test]
    fn keeps_loops_reachable() {
        let mut f = build(&[
            "L0:",
            "t0 = x < 10",
            "ifFalse t0 goto L1",
            "goto L0",
            "L1:",
            "return x",
        ]);
        assert!(!drop_unreachable(&mut f));
    }

    #[test]
    fn removes_dead_stores() {
        // t0 is defined and never used
        let mut f = build(&["t0 = x + 1", "y = 2", "return y"]);
        assert!(dead_store_elim(&mut f));
        assert_eq!(
            f.blocks[0].instrs,
            vec![
                Instr::Mov { dst: id("y"), a: Value::Const(2) },
                Instr::Ret { a: Some(Value::Var(id("y"))) },
            ]
        );
    }

    #[test]
    fn keeps_stores_live_across_blocks() {
        // x is written in the entry and read in L1
        let mut f = build(&["x = 5", "goto L1", "L1:", "return x"]);
        assert!(!dead_store_elim(&mut f));
        assert_eq!(f.blocks[0].instrs[0], Instr::Mov { dst: id("x"), a: Value::Const(5) });
    }

    #[test]
    fn dead_chain_collapses_in_one_sweep() {
        // neither t0 nor t1 reach the return; the backward sweep kills both
        let mut f = build(&["t0 = x + 1", "t1 = t0 + 1", "return x"]);
        assert!(dead_store_elim(&mut f));
        assert_eq!(f.blocks[0].instrs, vec![Instr::Ret { a: Some(Value::Var(id("x"))) }]);
    }

    #[test]
    fn is_idempotent() {
        let mut f = build(&["t0 = x + 1", "return x"]);
        dead_store_elim(&mut f);
        assert!(!dead_store_elim(&mut f));
    }
}
