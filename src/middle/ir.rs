//! The TAC-level IR: values, instructions, basic blocks, and functions.

use std::fmt;

use crate::common::*;
use crate::front::ast::{BinOp, UnOp};

/// An operand: a constant or a variable reference.
///
/// Variables whose name is `t` followed by digits are compiler temporaries;
/// every other name is a named local with a stack slot in the final code.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Value {
    Const(i64),
    Var(Id),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(v) => write!(f, "{v}"),
            Value::Var(n) => write!(f, "{n}"),
        }
    }
}

/// Is this variable name a compiler temporary (`t0`, `t1`, ...)?
pub fn is_temp_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('t') && {
        let rest = chars.as_str();
        !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
    }
}

/// A single IR instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Instr {
    /// Pseudo-instruction marking a block start in linear IR.  Consumed by
    /// the block builder; never appears inside a built block.
    Label { label: Id },
    Mov {
        dst: Id,
        a: Value,
    },
    Binop {
        dst: Id,
        op: BinOp,
        a: Value,
        b: Value,
    },
    Unop {
        dst: Id,
        op: UnOp,
        a: Value,
    },
    /// Take `tlabel` if `a != 0`, otherwise `flabel`.  A `tlabel` of `None`
    /// means the branch falls off the end of the function when taken.
    Br {
        a: Value,
        tlabel: Option<Id>,
        flabel: Id,
    },
    Jmp {
        target: Id,
    },
    Ret {
        a: Option<Value>,
    },
}

impl Instr {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Instr::Br { .. } | Instr::Jmp { .. } | Instr::Ret { .. })
    }

    pub fn has_side_effect(&self) -> bool {
        // memory stores and calls go here once they exist
        false
    }

    /// Variable names read by this instruction (no constants, no dst).
    pub fn uses(&self) -> Set<Id> {
        let mut s = Set::new();
        let mut add = |v: &Value| {
            if let Value::Var(n) = v {
                s.insert(*n);
            }
        };
        match self {
            Instr::Mov { a, .. } | Instr::Unop { a, .. } | Instr::Br { a, .. } => add(a),
            Instr::Binop { a, b, .. } => {
                add(a);
                add(b);
            }
            Instr::Ret { a: Some(a) } => add(a),
            Instr::Ret { a: None } | Instr::Jmp { .. } | Instr::Label { .. } => {}
        }
        s
    }

    /// The variable defined by this instruction, if any.
    pub fn def(&self) -> Option<Id> {
        match self {
            Instr::Mov { dst, .. } | Instr::Binop { dst, .. } | Instr::Unop { dst, .. } => {
                Some(*dst)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Label { label } => write!(f, "{label}:"),
            Instr::Mov { dst, a } => write!(f, "{dst} = {a}"),
            Instr::Binop { dst, op, a, b } => write!(f, "{dst} = {a} {op} {b}"),
            Instr::Unop { dst, op, a } => write!(f, "{dst} = {op} {a}"),
            Instr::Br { a, tlabel, flabel } => match tlabel {
                Some(t) => write!(f, "br {a} ? {t} : {flabel}"),
                None => write!(f, "br {a} ? - : {flabel}"),
            },
            Instr::Jmp { target } => write!(f, "jmp {target}"),
            Instr::Ret { a: Some(a) } => write!(f, "return {a}"),
            Instr::Ret { a: None } => write!(f, "return"),
        }
    }
}

/// A basic block: a label and the instructions it runs.  The label lives
/// here, not as a pseudo-instruction inside `instrs`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    pub label: Id,
    pub instrs: Vec<Instr>,
}

impl Block {
    pub fn new(label: Id) -> Self {
        Block { label, instrs: vec![] }
    }
}

/// A function in block form, with its control-flow graph as label-to-label
/// maps.  Blocks own their instructions; `succ`/`pred` are derived from the
/// terminators and rebuilt after any structural change.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Function {
    pub name: Id,
    pub blocks: Vec<Block>,
    pub succ: Map<Id, Vec<Id>>,
    pub pred: Map<Id, Vec<Id>>,
}

impl Function {
    pub fn new(name: Id, blocks: Vec<Block>) -> Self {
        Function { name, blocks, succ: Map::new(), pred: Map::new() }
    }

    /// The entry label (the first block, conventionally `_entry`).
    pub fn entry(&self) -> Option<Id> {
        self.blocks.first().map(|b| b.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;

    #[test]
    fn temp_names() {
        assert!(is_temp_name("t0"));
        assert!(is_temp_name("t123"));
        assert!(!is_temp_name("t"));
        assert!(!is_temp_name("total"));
        assert!(!is_temp_name("x"));
        assert!(!is_temp_name("t1x"));
    }

    #[test]
    fn uses_and_def() {
        let ins = Instr::Binop {
            dst: id("t0"),
            op: BinOp::Add,
            a: Value::Var(id("x")),
            b: Value::Const(1),
        };
        assert_eq!(ins.uses(), Set::from([id("x")]));
        assert_eq!(ins.def(), Some(id("t0")));
        assert!(!ins.is_terminator());

        let ret = Instr::Ret { a: Some(Value::Var(id("t0"))) };
        assert_eq!(ret.uses(), Set::from([id("t0")]));
        assert_eq!(ret.def(), None);
        assert!(ret.is_terminator());
    }

    #[test]
    fn display_forms() {
        let ins = Instr::Binop {
            dst: id("t1"),
            op: BinOp::Le,
            a: Value::Var(id("i")),
            b: Value::Const(10),
        };
        assert_eq!(ins.to_string(), "t1 = i <= 10");
        assert_eq!(Instr::Ret { a: None }.to_string(), "return");
    }
}
