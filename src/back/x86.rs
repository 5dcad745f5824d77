//! The pseudo-x86 IR: a minimal, signed-only instruction set with virtual
//! registers for temporaries, plus the Intel-style line printer.

use std::fmt;

use derive_more::Display;

use crate::common::*;

/// An instruction operand.
///
/// A `Reg` whose name starts with an uppercase `R` (`R1`, `R2`, ...,
/// `RAX`, `RDX`) is a virtual register owned by the lowering layer; any
/// other name is a physical register and spelled lowercase (`rax`, `rbp`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Operand {
    Imm(i64),
    Reg(Id),
    /// A symbolic memory cell, printed as `[name]`.  Used for named locals
    /// in symbolic mode and for `spill_*` cells before frame remapping.
    Mem(Id),
    /// An rbp-relative stack slot; negative offsets address locals and
    /// spill slots.
    FrameRef(i32),
}

impl Operand {
    pub fn reg(name: &str) -> Operand {
        Operand::Reg(id(name))
    }

    pub fn is_mem(&self) -> bool {
        matches!(self, Operand::Mem(_) | Operand::FrameRef(_))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Imm(v) => write!(f, "{v}"),
            Operand::Reg(r) => write!(f, "{}", r.to_lowercase()),
            Operand::Mem(name) => write!(f, "[{name}]"),
            Operand::FrameRef(off) if *off < 0 => write!(f, "[rbp-{}]", -off),
            Operand::FrameRef(0) => write!(f, "[rbp]"),
            Operand::FrameRef(off) => write!(f, "[rbp+{off}]"),
        }
    }
}

/// Condition codes for conditional jumps.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, PartialOrd, Ord)]
pub enum Cond {
    #[display("je")]
    E,
    #[display("jne")]
    Ne,
    #[display("jl")]
    L,
    #[display("jle")]
    Le,
    #[display("jg")]
    G,
    #[display("jge")]
    Ge,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Inst {
    LabelDef { label: Id },
    Mov { dst: Operand, src: Operand },
    Add { dst: Operand, src: Operand },
    Sub { dst: Operand, src: Operand },
    IMul { dst: Operand, src: Operand },
    Cmp { a: Operand, b: Operand },
    /// Signed division: reads RAX/RDX and the divisor, writes RAX/RDX.
    Idiv { src: Operand },
    Jcc { cc: Cond, target: Id },
    Jmp { target: Id },
    Ret { val: Option<Operand> },
    Push { reg: Operand },
    Pop { reg: Operand },
}

pub type Program = Vec<Inst>;

/// Print one line per instruction: labels flush left with a trailing `:`,
/// instructions indented by two spaces, mnemonics lowercase.
pub fn print_program(p: &Program) -> Vec<String> {
    p.iter()
        .map(|ins| match ins {
            Inst::LabelDef { label } => format!("{label}:"),
            Inst::Mov { dst, src } => format!("  mov {dst}, {src}"),
            Inst::Add { dst, src } => format!("  add {dst}, {src}"),
            Inst::Sub { dst, src } => format!("  sub {dst}, {src}"),
            Inst::IMul { dst, src } => format!("  imul {dst}, {src}"),
            Inst::Cmp { a, b } => format!("  cmp {a}, {b}"),
            Inst::Idiv { src } => format!("  idiv {src}"),
            Inst::Jcc { cc, target } => format!("  {cc} {target}"),
            Inst::Jmp { target } => format!("  jmp {target}"),
            Inst::Ret { .. } => "  ret".to_string(),
            Inst::Push { reg } => format!("  push {reg}"),
            Inst::Pop { reg } => format!("  pop {reg}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_rendering() {
        assert_eq!(Operand::Imm(-3).to_string(), "-3");
        assert_eq!(Operand::reg("RAX").to_string(), "rax");
        assert_eq!(Operand::reg("rcx").to_string(), "rcx");
        assert_eq!(Operand::Mem(id("x")).to_string(), "[x]");
        assert_eq!(Operand::FrameRef(-8).to_string(), "[rbp-8]");
        assert_eq!(Operand::FrameRef(0).to_string(), "[rbp]");
    }

    #[test]
    fn prints_intel_style_lines() {
        let p = vec![
            Inst::LabelDef { label: id("_entry") },
            Inst::Mov { dst: Operand::reg("rax"), src: Operand::Imm(5) },
            Inst::Cmp { a: Operand::reg("rcx"), b: Operand::Imm(0) },
            Inst::Jcc { cc: Cond::Ne, target: id("L1") },
            Inst::Ret { val: None },
        ];
        assert_eq!(
            print_program(&p),
            vec!["_entry:", "  mov rax, 5", "  cmp rcx, 0", "  jne L1", "  ret"]
        );
    }
}
