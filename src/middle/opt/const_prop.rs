//! Local constant propagation.
//!
//! Per block, tracks which variables currently hold a known constant and
//! substitutes them into operands.  Folding the resulting constant
//! expressions is left to [const_fold](crate::middle::opt::const_fold).

use crate::common::*;
use crate::middle::ir::*;

fn subst(v: Value, env: &Map<Id, i64>) -> Value {
    match v {
        Value::Var(n) => env.get(&n).map_or(v, |c| Value::Const(*c)),
        Value::Const(_) => v,
    }
}

pub fn const_propagate(f: &mut Function) -> bool {
    let mut changed = false;

    for blk in &mut f.blocks {
        let mut env: Map<Id, i64> = Map::new();

        for ins in blk.instrs.iter_mut() {
            match ins {
                Instr::Mov { dst, a } => {
                    let new = subst(*a, &env);
                    if new != *a {
                        *a = new;
                        changed = true;
                    }
                    // track the binding only if the (rewritten) source is
                    // a constant
                    match new {
                        Value::Const(c) => {
                            env.insert(*dst, c);
                        }
                        Value::Var(_) => {
                            env.remove(dst);
                        }
                    }
                }
                Instr::Binop { dst, a, b, .. } => {
                    let (na, nb) = (subst(*a, &env), subst(*b, &env));
                    if na != *a || nb != *b {
                        *a = na;
                        *b = nb;
                        changed = true;
                    }
                    // def kills the binding unless folded later
                    env.remove(dst);
                }
                Instr::Unop { dst, a, .. } => {
                    let na = subst(*a, &env);
                    if na != *a {
                        *a = na;
                        changed = true;
                    }
                    env.remove(dst);
                }
                Instr::Br { a, .. } => {
                    let na = subst(*a, &env);
                    if na != *a {
                        *a = na;
                        changed = true;
                    }
                }
                Instr::Ret { a } => {
                    if let Some(v) = a {
                        let nv = subst(*v, &env);
                        if nv != *v {
                            *a = Some(nv);
                            changed = true;
                        }
                    }
                    env.clear();
                }
                Instr::Jmp { .. } => {
                    // terminator barrier
                    env.clear();
                }
                Instr::Label { .. } => {}
            }
        }
    }
    changed
}
