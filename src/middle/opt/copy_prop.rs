//! Local copy propagation.
//!
//! Tracks `y = x` aliases per block and substitutes uses by following alias
//! chains.  Chains are path-compressed; cycles and runaway chains are cut by
//! a dynamic step cap.  Redefining a variable kills its own mapping and any
//! mapping that points at it.

use crate::common::*;
use crate::middle::ir::*;

/// A block environment larger than this means aliases are leaking.
const MAX_ENV: usize = 5000;

/// Follow the alias chain from `name` to its root, compressing the path on
/// the way back.  Stops on self-aliases and cycles.
fn root(name: Id, env: &mut Map<Id, Id>) -> Id {
    let max_steps = 32.max(env.len() + 1);
    let mut seen: Vec<Id> = vec![];
    let mut cur = name;
    let mut steps = 0;

    while let Some(&next) = env.get(&cur) {
        if next == cur || seen.contains(&cur) {
            break;
        }
        seen.push(cur);
        cur = next;
        steps += 1;
        if steps > max_steps {
            break;
        }
    }
    for s in seen {
        env.insert(s, cur);
    }
    cur
}

fn subst(v: Value, env: &mut Map<Id, Id>) -> Value {
    match v {
        Value::Var(n) => Value::Var(root(n, env)),
        Value::Const(_) => v,
    }
}

/// Kill `dst`'s mapping and every mapping pointing to `dst`.
fn kill(env: &mut Map<Id, Id>, dst: Id) {
    env.remove(&dst);
    env.retain(|_, v| *v != dst);
}

pub fn copy_propagate(f: &mut Function) -> bool {
    let mut changed = false;

    for blk in &mut f.blocks {
        let mut env: Map<Id, Id> = Map::new();

        for ins in blk.instrs.iter_mut() {
            if env.len() > MAX_ENV {
                panic!("copyprop: env too large ({}); alias leak", env.len());
            }

            match ins {
                Instr::Mov { dst, a } => {
                    let src = subst(*a, &mut env);
                    if src != *a {
                        *a = src;
                        changed = true;
                    }
                    kill(&mut env, *dst);
                    // record an alias only for var -> var, and never to self
                    if let Value::Var(s) = src {
                        if s != *dst {
                            if env.get(&s).copied() == Some(*dst) {
                                // break a 2-cycle
                                env.remove(&s);
                            }
                            env.insert(*dst, s);
                        }
                    }
                }
                Instr::Binop { dst, a, b, .. } => {
                    let (na, nb) = (subst(*a, &mut env), subst(*b, &mut env));
                    if na != *a || nb != *b {
                        *a = na;
                        *b = nb;
                        changed = true;
                    }
                    kill(&mut env, *dst);
                }
                Instr::Unop { dst, a, .. } => {
                    let na = subst(*a, &mut env);
                    if na != *a {
                        *a = na;
                        changed = true;
                    }
                    kill(&mut env, *dst);
                }
                Instr::Br { a, .. } => {
                    let na = subst(*a, &mut env);
                    if na != *a {
                        *a = na;
                        changed = true;
                    }
                    env.clear();
                }
                Instr::Ret { a } => {
                    if let Some(v) = a {
                        let nv = subst(*v, &mut env);
                        if nv != *v {
                            *a = Some(nv);
                            changed = true;
                        }
                    }
                    env.clear();
                }
                Instr::Jmp { .. } => {
                    env.clear();
                }
                Instr::Label { .. } => {}
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::ast::BinOp;
    use crate::middle::opt::tests::build;

    #[test]
    fn follows_alias_chains() {
        // a = x; b = a; t0 = b + 1  ==>  t0 = x + 1
        let mut f = build(&["a = x", "b = a", "t0 = b + 1", "return t0"]);
        assert!(copy_propagate(&mut f));
        assert_eq!(
            f.blocks[0].instrs[2],
            Instr::Binop {
                dst: id("t0"),
                op: BinOp::Add,
                a: Value::Var(id("x")),
                b: Value::Const(1),
            }
        );
    }

    #[test]
    fn redefinition_kills_reverse_links() {
        // b aliases a, then a is redefined: the return must keep reading b
        let mut f = build(&["b = a", "a = 7", "return b"]);
        copy_propagate(&mut f);
        assert_eq!(
            f.blocks[0].instrs.last(),
            Some(&Instr::Ret { a: Some(Value::Var(id("b"))) })
        );
    }

    #[test]
    fn never_aliases_constants() {
        let mut f = build(&["a = 5", "b = a", "return b"]);
        copy_propagate(&mut f);
        // b = a is an alias (a itself is a var); the return reads a
        assert_eq!(
            f.blocks[0].instrs.last(),
            Some(&Instr::Ret { a: Some(Value::Var(id("a"))) })
        );
    }

    #[test]
    fn swap_pattern_stays_correct() {
        // tmp = a; a = b; b = tmp
        let mut f = build(&["tmp = a", "a = b", "b = tmp", "return a"]);
        copy_propagate(&mut f);
        // `b = tmp` must keep reading the old a through tmp: redefining a
        // killed the tmp -> a alias, so no substitution happens there
        assert_eq!(f.blocks[0].instrs[0], Instr::Mov { dst: id("tmp"), a: Value::Var(id("a")) });
        assert_eq!(f.blocks[0].instrs[2], Instr::Mov { dst: id("b"), a: Value::Var(id("tmp")) });
        // return a reads the redefined a, so it must not be substituted
        assert_eq!(
            f.blocks[0].instrs.last(),
            Some(&Instr::Ret { a: Some(Value::Var(id("a"))) })
        );
    }

    #[test]
    fn is_idempotent() {
        let mut f = build(&["a = x", "b = a", "t0 = b + 1", "return t0"]);
        copy_propagate(&mut f);
        assert!(!copy_propagate(&mut f));
    }
}
