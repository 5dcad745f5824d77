//! Algebraic simplification.
//!
//! Peephole rewrites on `binop`s with a constant in the canonical (right)
//! position: `x + 0`, `x - 0`, `x * 1`, `x / 1` become plain moves and
//! `x * 0` becomes `mov dst, 0`.  Nothing fancier; strength reduction is
//! out of scope.

use crate::front::ast::BinOp;
use crate::middle::ir::*;

pub fn algebra_simplify(f: &mut Function) -> bool {
    let mut changed = false;

    for blk in &mut f.blocks {
        for ins in blk.instrs.iter_mut() {
            let Instr::Binop { dst, op, a, b } = *ins else {
                continue;
            };
            let rewrite = match (op, b) {
                (BinOp::Add, Value::Const(0)) => Some(a),
                (BinOp::Sub, Value::Const(0)) => Some(a),
                (BinOp::Mul, Value::Const(1)) => Some(a),
                (BinOp::Mul, Value::Const(0)) => Some(Value::Const(0)),
                (BinOp::Div, Value::Const(1)) => Some(a),
                _ => None,
            };
            if let Some(a) = rewrite {
                *ins = Instr::Mov { dst, a };
                changed = true;
            }
        }
    }
    changed
}
