//! Constant folding.
//!
//! Rewrites `binop`/`unop` over constants to plain moves and branches on a
//! constant condition to unconditional jumps.  Division or modulo by a
//! literal zero is never folded; the instruction survives into emitted code.

use crate::front::ast::{BinOp, UnOp};
use crate::middle::ir::*;

/// Evaluate a binary op over two's-complement 64-bit integers.  Comparisons
/// and logical ops yield 0/1 (short-circuit was already lowered away by the
/// TAC emitter).  `None` means "do not fold".
fn eval_bin(op: BinOp, a: i64, b: i64) -> Option<i64> {
    use BinOp::*;
    Some(match op {
        Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Mul => a.wrapping_mul(b),
        Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        Rem => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        Eq => (a == b) as i64,
        Ne => (a != b) as i64,
        Lt => (a < b) as i64,
        Le => (a <= b) as i64,
        Gt => (a > b) as i64,
        Ge => (a >= b) as i64,
        And => (a != 0 && b != 0) as i64,
        Or => (a != 0 || b != 0) as i64,
    })
}

fn eval_un(op: UnOp, a: i64) -> i64 {
    match op {
        UnOp::Plus => a,
        UnOp::Neg => a.wrapping_neg(),
        UnOp::Not => (a == 0) as i64,
    }
}

pub fn const_fold(f: &mut Function) -> bool {
    let mut changed = false;

    for blk in &mut f.blocks {
        for ins in blk.instrs.iter_mut() {
            match *ins {
                Instr::Binop { dst, op, a: Value::Const(x), b: Value::Const(y) } => {
                    if let Some(v) = eval_bin(op, x, y) {
                        *ins = Instr::Mov { dst, a: Value::Const(v) };
                        changed = true;
                    }
                }
                Instr::Unop { dst, op, a: Value::Const(x) } => {
                    *ins = Instr::Mov { dst, a: Value::Const(eval_un(op, x)) };
                    changed = true;
                }
                Instr::Br { a: Value::Const(c), tlabel, flabel } => {
                    let target = if c != 0 { tlabel } else { Some(flabel) };
                    // an unresolvable taken-side fallthrough stays a branch
                    if let Some(target) = target {
                        *ins = Instr::Jmp { target };
                        changed = true;
                    }
                }
                _ => {}
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;
    use crate::middle::opt::tests::build;

    #[test]
    fn folds_binops_and_unops() {
        let mut f = build(&["t0 = 2 + 3", "t1 = - t0", "t2 = ! 0", "return t2"]);
        assert!(const_fold(&mut f));
        assert_eq!(f.blocks[0].instrs[0], Instr::Mov { dst: id("t0"), a: Value::Const(5) });
        // t1's operand is not constant yet; only the unop over a literal folds
        assert!(matches!(f.blocks[0].instrs[1], Instr::Unop { .. }));
        assert_eq!(f.blocks[0].instrs[2], Instr::Mov { dst: id("t2"), a: Value::Const(1) });
    }

    #[test]
    fn folds_comparisons_to_zero_or_one() {
        let mut f = build(&["t0 = 2 < 3", "t1 = 3 == 4", "return t0"]);
        const_fold(&mut f);
        assert_eq!(f.blocks[0].instrs[0], Instr::Mov { dst: id("t0"), a: Value::Const(1) });
        assert_eq!(f.blocks[0].instrs[1], Instr::Mov { dst: id("t1"), a: Value::Const(0) });
    }

    #[test]
    fn never_folds_division_by_zero() {
        let mut f = build(&["t0 = 1 / 0", "t1 = 1 % 0", "return t0"]);
        assert!(!const_fold(&mut f));
        assert!(matches!(f.blocks[0].instrs[0], Instr::Binop { op: BinOp::Div, .. }));
        assert!(matches!(f.blocks[0].instrs[1], Instr::Binop { op: BinOp::Rem, .. }));
    }

    #[test]
    fn constant_branch_becomes_jump() {
        // ifFalse 0 goto L1 takes the false edge
        let mut f = build(&["ifFalse 0 goto L1", "return 1", "L1:", "return 2"]);
        assert!(const_fold(&mut f));
        assert_eq!(f.blocks[0].instrs.last(), Some(&Instr::Jmp { target: id("L1") }));
    }

    #[test]
    fn is_idempotent() {
        let mut f = build(&["t0 = 2 * 21", "return t0"]);
        assert!(const_fold(&mut f));
        assert!(!const_fold(&mut f));
    }
}
