//! Lowers block-structured IR to pseudo-x86 with virtual registers.
//!
//! Temporaries get virtual registers `R1, R2, ...` on first use; named
//! locals become symbolic memory cells or frame references depending on the
//! frame mode.  Comparisons booleanize through generated `Lcmp<i>_true` /
//! `Lcmp<i>_end` labels; division goes through `RAX`; branches use the
//! next block's label to fall through where possible.
//!
//! The names `R1`..`R5` double as scratch registers by convention; the
//! register allocator treats them like any other virtual register.

use derive_more::Display;

use crate::common::*;
use crate::front::ast::{BinOp, UnOp};
use crate::middle::ir::{is_temp_name, Function, Instr, Value};

use crate::back::frame::FrameLayout;
use crate::back::x86::{Cond, Inst, Operand, Program};

/// Errors surfaced by the back end.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum CodegenError {
    #[display("unsupported operation in the back end: {_0}")]
    UnsupportedOp(BinOp),
    #[display("invalid IR: {_0}")]
    InvalidIr(String),
}

impl std::error::Error for CodegenError {}

/// Virtual-register state for one function.
#[derive(Debug)]
pub struct VRegs {
    /// next virtual register index to hand out
    next_id: u32,
    /// temp name (`t3`) -> virtual register name (`R2`)
    by_temp: Map<Id, Id>,
    /// counter for fresh comparison label pairs
    cmp_seq: u32,
}

impl VRegs {
    pub fn new() -> Self {
        VRegs { next_id: 1, by_temp: Map::new(), cmp_seq: 0 }
    }

    /// The virtual register for a temp, allocated on first use.
    pub fn reg_of(&mut self, temp: Id) -> Id {
        if let Some(r) = self.by_temp.get(&temp) {
            return *r;
        }
        let r = self.fresh();
        self.by_temp.insert(temp, r);
        r
    }

    /// A brand-new virtual register.
    pub fn fresh(&mut self) -> Id {
        let r = id(&format!("R{}", self.next_id));
        self.next_id += 1;
        r
    }

    /// A fresh `(Lcmp<i>_true, Lcmp<i>_end)` label pair.
    pub fn fresh_cmp_labels(&mut self) -> (Id, Id) {
        self.cmp_seq += 1;
        let i = self.cmp_seq;
        (id(&format!("Lcmp{i}_true")), id(&format!("Lcmp{i}_end")))
    }
}

fn cond_of(op: BinOp) -> Option<Cond> {
    Some(match op {
        BinOp::Eq => Cond::E,
        BinOp::Ne => Cond::Ne,
        BinOp::Lt => Cond::L,
        BinOp::Le => Cond::Le,
        BinOp::Gt => Cond::G,
        BinOp::Ge => Cond::Ge,
        _ => return None,
    })
}

struct Lowerer<'a> {
    vregs: VRegs,
    frame: Option<&'a FrameLayout>,
    out: Program,
}

impl<'a> Lowerer<'a> {
    fn new(frame: Option<&'a FrameLayout>) -> Self {
        Lowerer { vregs: VRegs::new(), frame, out: vec![] }
    }

    /// Map an IR value to an operand: constants to immediates, temps to
    /// virtual registers, named locals to memory.
    fn opnd(&mut self, v: Value) -> Result<Operand, CodegenError> {
        match v {
            Value::Const(n) => Ok(Operand::Imm(n)),
            Value::Var(n) if is_temp_name(&n) => Ok(Operand::Reg(self.vregs.reg_of(n))),
            Value::Var(n) => match self.frame {
                Some(layout) => layout
                    .off_by_name
                    .get(&n)
                    .map(|off| Operand::FrameRef(*off))
                    .ok_or_else(|| CodegenError::InvalidIr(format!("no frame slot for {n}"))),
                None => Ok(Operand::Mem(n)),
            },
        }
    }

    fn dst_opnd(&mut self, dst: Id) -> Result<Operand, CodegenError> {
        self.opnd(Value::Var(dst))
    }

    /// Make sure `v` is in a register, moving it into the named scratch
    /// virtual register if it is not.
    fn ensure_in(&mut self, scratch: &str, v: Value) -> Result<Operand, CodegenError> {
        let s = self.opnd(v)?;
        if matches!(s, Operand::Reg(_)) {
            return Ok(s);
        }
        let acc = Operand::reg(scratch);
        self.out.push(Inst::Mov { dst: acc, src: s });
        Ok(acc)
    }

    fn emit_mov(&mut self, dst: Id, a: Value) -> Result<(), CodegenError> {
        let dst_op = self.dst_opnd(dst)?;
        let src_op = self.opnd(a)?;
        if dst_op.is_mem() && src_op.is_mem() {
            // memory-to-memory is not a thing: go through a scratch
            let scratch = Operand::Reg(self.vregs.fresh());
            self.out.push(Inst::Mov { dst: scratch, src: src_op });
            self.out.push(Inst::Mov { dst: dst_op, src: scratch });
        } else {
            self.out.push(Inst::Mov { dst: dst_op, src: src_op });
        }
        Ok(())
    }

    fn emit_binop(&mut self, dst: Id, op: BinOp, a: Value, b: Value) -> Result<(), CodegenError> {
        // comparisons booleanize to 0/1
        if let Some(cc) = cond_of(op) {
            let dst_op = self.dst_opnd(dst)?;
            let (ltrue, lend) = self.vregs.fresh_cmp_labels();
            self.out.push(Inst::Mov { dst: dst_op, src: Operand::Imm(0) });
            let left = self.ensure_in("R3", a)?;
            let b_op = self.opnd(b)?;
            self.out.push(Inst::Cmp { a: left, b: b_op });
            self.out.push(Inst::Jcc { cc, target: ltrue });
            self.out.push(Inst::Jmp { target: lend });
            self.out.push(Inst::LabelDef { label: ltrue });
            self.out.push(Inst::Mov { dst: dst_op, src: Operand::Imm(1) });
            self.out.push(Inst::LabelDef { label: lend });
            return Ok(());
        }

        // signed division: dividend through RAX, divisor in a register
        if op == BinOp::Div {
            let dst_op = self.dst_opnd(dst)?;
            let a_op = self.opnd(a)?;
            self.out.push(Inst::Mov { dst: Operand::reg("RAX"), src: a_op });
            let divisor = self.ensure_in("R2", b)?;
            self.out.push(Inst::Idiv { src: divisor });
            if dst_op != Operand::reg("RAX") {
                self.out.push(Inst::Mov { dst: dst_op, src: Operand::reg("RAX") });
            }
            return Ok(());
        }

        if !matches!(op, BinOp::Add | BinOp::Sub | BinOp::Mul) {
            return Err(CodegenError::UnsupportedOp(op));
        }

        // two-operand arithmetic: dst := dst op src.  A temp destination is
        // its own accumulator; a memory destination goes through R1.
        let a_op = self.opnd(a)?;
        let (acc, store_back) = if is_temp_name(&dst) {
            let acc = Operand::Reg(self.vregs.reg_of(dst));
            if a_op != acc {
                self.out.push(Inst::Mov { dst: acc, src: a_op });
            }
            (acc, None)
        } else {
            let acc = Operand::reg("R1");
            self.out.push(Inst::Mov { dst: acc, src: a_op });
            (acc, Some(self.dst_opnd(dst)?))
        };

        let src = self.opnd(b)?;
        self.out.push(match op {
            BinOp::Add => Inst::Add { dst: acc, src },
            BinOp::Sub => Inst::Sub { dst: acc, src },
            BinOp::Mul => Inst::IMul { dst: acc, src },
            _ => unreachable!(),
        });

        if let Some(dst_op) = store_back {
            self.out.push(Inst::Mov { dst: dst_op, src: acc });
        }
        Ok(())
    }

    fn emit_unop(&mut self, dst: Id, op: UnOp, a: Value) -> Result<(), CodegenError> {
        match op {
            UnOp::Plus => self.emit_mov(dst, a),
            UnOp::Neg => {
                // dst = 0 - a in the accumulator
                let (acc, store_back) = if is_temp_name(&dst) {
                    (Operand::Reg(self.vregs.reg_of(dst)), None)
                } else {
                    (Operand::reg("R1"), Some(self.dst_opnd(dst)?))
                };
                self.out.push(Inst::Mov { dst: acc, src: Operand::Imm(0) });
                let a_op = self.opnd(a)?;
                self.out.push(Inst::Sub { dst: acc, src: a_op });
                if let Some(dst_op) = store_back {
                    self.out.push(Inst::Mov { dst: dst_op, src: acc });
                }
                Ok(())
            }
            UnOp::Not => {
                // dst = 1 when a == 0, else 0
                let dst_op = self.dst_opnd(dst)?;
                let (ltrue, lend) = self.vregs.fresh_cmp_labels();
                self.out.push(Inst::Mov { dst: dst_op, src: Operand::Imm(0) });
                let left = self.ensure_in("R4", a)?;
                self.out.push(Inst::Cmp { a: left, b: Operand::Imm(0) });
                self.out.push(Inst::Jcc { cc: Cond::E, target: ltrue });
                self.out.push(Inst::Jmp { target: lend });
                self.out.push(Inst::LabelDef { label: ltrue });
                self.out.push(Inst::Mov { dst: dst_op, src: Operand::Imm(1) });
                self.out.push(Inst::LabelDef { label: lend });
                Ok(())
            }
        }
    }

    /// Compare the condition with 0 and branch, falling through without an
    /// extra jump when the next block is one of the targets.
    fn emit_br(
        &mut self,
        a: Value,
        tlabel: Option<Id>,
        flabel: Id,
        next: Option<Id>,
    ) -> Result<(), CodegenError> {
        let left = self.ensure_in("R5", a)?;
        self.out.push(Inst::Cmp { a: left, b: Operand::Imm(0) });
        match tlabel {
            // the taken side falls off the end of the function
            None => self.out.push(Inst::Jcc { cc: Cond::E, target: flabel }),
            Some(t) if next == Some(flabel) => {
                self.out.push(Inst::Jcc { cc: Cond::Ne, target: t });
            }
            Some(t) if next == Some(t) => {
                // invert, fall through to the true side
                self.out.push(Inst::Jcc { cc: Cond::E, target: flabel });
            }
            Some(t) => {
                self.out.push(Inst::Jcc { cc: Cond::Ne, target: t });
                self.out.push(Inst::Jmp { target: flabel });
            }
        }
        Ok(())
    }

    fn emit_instr(&mut self, ins: &Instr, next: Option<Id>) -> Result<(), CodegenError> {
        match *ins {
            Instr::Label { label } => {
                self.out.push(Inst::LabelDef { label });
                Ok(())
            }
            Instr::Mov { dst, a } => self.emit_mov(dst, a),
            Instr::Binop { dst, op, a, b } => self.emit_binop(dst, op, a, b),
            Instr::Unop { dst, op, a } => self.emit_unop(dst, op, a),
            Instr::Br { a, tlabel, flabel } => self.emit_br(a, tlabel, flabel, next),
            Instr::Jmp { target } => {
                self.out.push(Inst::Jmp { target });
                Ok(())
            }
            Instr::Ret { a } => {
                if let Some(v) = a {
                    let src = self.opnd(v)?;
                    self.out.push(Inst::Mov { dst: Operand::reg("RAX"), src });
                }
                self.out.push(Inst::Ret { val: None });
                Ok(())
            }
        }
    }
}

/// Lower a function to a pseudo-x86 program with virtual registers.  A
/// function with no explicit return gets a single `ret` appended.
pub fn lower_function(
    f: &Function,
    frame: Option<&FrameLayout>,
) -> Result<Program, CodegenError> {
    let mut lw = Lowerer::new(frame);

    for (i, blk) in f.blocks.iter().enumerate() {
        lw.out.push(Inst::LabelDef { label: blk.label });
        let next = f.blocks.get(i + 1).map(|b| b.label);
        for ins in &blk.instrs {
            lw.emit_instr(ins, next)?;
        }
    }

    if !lw.out.iter().any(|i| matches!(i, Inst::Ret { .. })) {
        lw.out.push(Inst::Ret { val: None });
    }
    Ok(lw.out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::adapter::tac_to_linear_ir;
    use crate::middle::build::linear_to_blocks;

    fn lower(src: &[&str]) -> Program {
        let lines: Vec<String> = src.iter().map(|s| s.to_string()).collect();
        let (ir, _) = tac_to_linear_ir(&lines);
        let f = linear_to_blocks(id("main"), ir);
        lower_function(&f, None).unwrap()
    }

    fn reg(name: &str) -> Operand {
        Operand::reg(name)
    }

    #[test]
    fn comparison_booleanizes_through_labels() {
        // t1 = t0 < 3: 0/1 lands in t1's register via cmp + jl
        let p = lower(&["t1 = t0 < 3", "return t1"]);
        assert_eq!(
            &p[1..8],
            &[
                Inst::Mov { dst: reg("R1"), src: Operand::Imm(0) },
                Inst::Cmp { a: reg("R2"), b: Operand::Imm(3) },
                Inst::Jcc { cc: Cond::L, target: id("Lcmp1_true") },
                Inst::Jmp { target: id("Lcmp1_end") },
                Inst::LabelDef { label: id("Lcmp1_true") },
                Inst::Mov { dst: reg("R1"), src: Operand::Imm(1) },
                Inst::LabelDef { label: id("Lcmp1_end") },
            ]
        );
    }

    #[test]
    fn division_goes_through_rax() {
        let p = lower(&["t0 = a / b", "return t0"]);
        assert_eq!(
            &p[1..6],
            &[
                Inst::Mov { dst: reg("RAX"), src: Operand::Mem(id("a")) },
                Inst::Mov { dst: reg("R2"), src: Operand::Mem(id("b")) },
                Inst::Idiv { src: reg("R2") },
                Inst::Mov { dst: reg("R1"), src: reg("RAX") },
                Inst::Mov { dst: reg("RAX"), src: reg("R1") },
            ]
        );
    }

    #[test]
    fn modulo_is_rejected() {
        let lines = vec!["t0 = a % b".to_string(), "return t0".to_string()];
        let (ir, _) = tac_to_linear_ir(&lines);
        let f = linear_to_blocks(id("main"), ir);
        assert_eq!(
            lower_function(&f, None),
            Err(CodegenError::UnsupportedOp(BinOp::Rem))
        );
    }

    #[test]
    fn memory_binop_uses_the_accumulator() {
        // x = y + 1 with a memory destination: R1 carries the value
        let p = lower(&["x = y + 1", "return x"]);
        assert_eq!(
            &p[1..4],
            &[
                Inst::Mov { dst: reg("R1"), src: Operand::Mem(id("y")) },
                Inst::Add { dst: reg("R1"), src: Operand::Imm(1) },
                Inst::Mov { dst: Operand::Mem(id("x")), src: reg("R1") },
            ]
        );
    }

    #[test]
    fn memory_to_memory_move_goes_through_scratch() {
        let p = lower(&["x = y", "return x"]);
        assert_eq!(
            &p[1..3],
            &[
                Inst::Mov { dst: reg("R1"), src: Operand::Mem(id("y")) },
                Inst::Mov { dst: Operand::Mem(id("x")), src: reg("R1") },
            ]
        );
    }

    #[test]
    fn branch_inverts_when_the_true_side_is_next() {
        // ifFalse-shaped branches put the taken side right after the block
        let p = lower(&["ifFalse c goto L1", "x = 1", "L1:", "return 0"]);
        let cmp_at = p
            .iter()
            .position(|i| matches!(i, Inst::Cmp { .. }))
            .unwrap();
        assert_eq!(p[cmp_at - 1], Inst::Mov { dst: reg("R5"), src: Operand::Mem(id("c")) });
        assert_eq!(p[cmp_at + 1], Inst::Jcc { cc: Cond::E, target: id("L1") });
        // the true side falls through: no jmp, just the next block's label
        assert!(matches!(p[cmp_at + 2], Inst::LabelDef { .. }));
    }

    fn branch_function(tlabel: &str, flabel: &str, order: &[&str]) -> Function {
        use crate::middle::build::build_cfg;
        use crate::middle::ir::Block;
        let mut blocks = vec![Block {
            label: id("_entry"),
            instrs: vec![Instr::Br {
                a: Value::Var(id("c")),
                tlabel: Some(id(tlabel)),
                flabel: id(flabel),
            }],
        }];
        for lab in order {
            blocks.push(Block {
                label: id(lab),
                instrs: vec![Instr::Ret { a: Some(Value::Const(0)) }],
            });
        }
        let mut f = Function::new(id("main"), blocks);
        build_cfg(&mut f);
        f
    }

    #[test]
    fn branch_falls_through_to_the_false_side() {
        // false side is the next block: jne to the true side, no jmp
        let f = branch_function("LT", "LF", &["LF", "LT"]);
        let p = lower_function(&f, None).unwrap();
        let cmp_at = p
            .iter()
            .position(|i| matches!(i, Inst::Cmp { .. }))
            .unwrap();
        assert_eq!(p[cmp_at + 1], Inst::Jcc { cc: Cond::Ne, target: id("LT") });
        assert!(matches!(p[cmp_at + 2], Inst::LabelDef { .. }));
    }

    #[test]
    fn branch_to_two_far_targets_needs_a_jmp() {
        // neither side is the next block: jne + jmp
        let f = branch_function("LT", "LF", &["Lmid", "LF", "LT"]);
        let p = lower_function(&f, None).unwrap();
        let cmp_at = p
            .iter()
            .position(|i| matches!(i, Inst::Cmp { .. }))
            .unwrap();
        assert_eq!(p[cmp_at + 1], Inst::Jcc { cc: Cond::Ne, target: id("LT") });
        assert_eq!(p[cmp_at + 2], Inst::Jmp { target: id("LF") });
    }

    #[test]
    fn missing_return_is_appended() {
        let p = lower(&["x = 1"]);
        assert_eq!(p.last(), Some(&Inst::Ret { val: None }));
        assert_eq!(p.iter().filter(|i| matches!(i, Inst::Ret { .. })).count(), 1);
    }

    #[test]
    fn logical_ops_are_rejected() {
        let lines = vec!["t0 = a && b".to_string(), "return t0".to_string()];
        let (ir, _) = tac_to_linear_ir(&lines);
        let f = linear_to_blocks(id("main"), ir);
        assert_eq!(
            lower_function(&f, None),
            Err(CodegenError::UnsupportedOp(BinOp::And))
        );
    }
}
