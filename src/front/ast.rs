//! The abstract syntax tree.

use derive_more::Display;

use crate::common::Id;

/// A (line, column) source position, 1-based.
pub type Pos = (u32, u32);

#[derive(Debug)]
pub struct Program {
    pub functions: Vec<Function>,
}

#[derive(Debug)]
pub struct Function {
    pub name: Id,
    pub body: Block,
    pub begins: Pos,
    pub ends: Pos,
}

#[derive(Debug)]
pub struct Block {
    pub items: Vec<Item>,
}

/// One item in a block: a declaration, a statement, or a nested block.
#[derive(Debug)]
pub enum Item {
    Decl { names: Vec<Id>, poss: Vec<Pos> },
    Stmt(Stmt),
    Block(Block),
}

#[derive(Debug)]
pub enum Stmt {
    Expr(Expr),
    Return(Option<Expr>),
    If {
        guard: Expr,
        tt: Block,
        ff: Option<Block>,
    },
    While {
        guard: Expr,
        body: Block,
    },
}

#[derive(Debug)]
pub enum Expr {
    Int(i64),
    Var(Id),
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Assignment is an expression; its value is the assigned variable.
    Assign {
        name: Id,
        value: Box<Expr>,
    },
}

/// Binary operators.  The middle-end IR reuses this type for its `binop`
/// instruction, so the `Display` strings are exactly the TAC spellings.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum BinOp {
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("%")]
    Rem,
    #[display("==")]
    Eq,
    #[display("!=")]
    Ne,
    #[display("<")]
    Lt,
    #[display("<=")]
    Le,
    #[display(">")]
    Gt,
    #[display(">=")]
    Ge,
    #[display("&&")]
    And,
    #[display("||")]
    Or,
}

impl std::str::FromStr for BinOp {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        use BinOp::*;
        Ok(match s {
            "+" => Add,
            "-" => Sub,
            "*" => Mul,
            "/" => Div,
            "%" => Rem,
            "==" => Eq,
            "!=" => Ne,
            "<" => Lt,
            "<=" => Le,
            ">" => Gt,
            ">=" => Ge,
            "&&" => And,
            "||" => Or,
            _ => return Err(()),
        })
    }
}

/// Unary operators, shared with the IR like [BinOp].
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum UnOp {
    #[display("+")]
    Plus,
    #[display("-")]
    Neg,
    #[display("!")]
    Not,
}

impl std::str::FromStr for UnOp {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        Ok(match s {
            "+" => UnOp::Plus,
            "-" => UnOp::Neg,
            "!" => UnOp::Not,
            _ => return Err(()),
        })
    }
}

/// Render the AST as an indented tree, one node per line.
pub fn pretty(program: &Program) -> String {
    let mut out = String::from("Program");
    for f in &program.functions {
        out.push_str(&format!(
            "\n  Function name={} begins={:?} ends={:?}",
            f.name, f.begins, f.ends
        ));
        pretty_block(&f.body, 2, &mut out);
    }
    out
}

fn pretty_block(block: &Block, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    if block.items.is_empty() {
        out.push_str(&format!("\n{pad}Block (empty)"));
        return;
    }
    out.push_str(&format!("\n{pad}Block"));
    for item in &block.items {
        match item {
            Item::Decl { names, .. } => {
                let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
                out.push_str(&format!("\n{pad}  Decl int {}", names.join(", ")));
            }
            Item::Stmt(s) => pretty_stmt(s, indent + 1, out),
            Item::Block(b) => pretty_block(b, indent + 1, out),
        }
    }
}

fn pretty_stmt(stmt: &Stmt, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match stmt {
        Stmt::Expr(e) => {
            out.push_str(&format!("\n{pad}ExprStmt"));
            pretty_expr(e, indent + 1, out);
        }
        Stmt::Return(e) => {
            out.push_str(&format!("\n{pad}Return"));
            if let Some(e) = e {
                pretty_expr(e, indent + 1, out);
            }
        }
        Stmt::If { guard, tt, ff } => {
            out.push_str(&format!("\n{pad}If"));
            pretty_expr(guard, indent + 1, out);
            pretty_block(tt, indent + 1, out);
            if let Some(ff) = ff {
                out.push_str(&format!("\n{pad}Else"));
                pretty_block(ff, indent + 1, out);
            }
        }
        Stmt::While { guard, body } => {
            out.push_str(&format!("\n{pad}While"));
            pretty_expr(guard, indent + 1, out);
            pretty_block(body, indent + 1, out);
        }
    }
}

fn pretty_expr(expr: &Expr, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match expr {
        Expr::Int(v) => out.push_str(&format!("\n{pad}Int {v}")),
        Expr::Var(n) => out.push_str(&format!("\n{pad}Var {n}")),
        Expr::Unary { op, expr } => {
            out.push_str(&format!("\n{pad}Unary {op}"));
            pretty_expr(expr, indent + 1, out);
        }
        Expr::Binary { op, lhs, rhs } => {
            out.push_str(&format!("\n{pad}Binary {op}"));
            pretty_expr(lhs, indent + 1, out);
            pretty_expr(rhs, indent + 1, out);
        }
        Expr::Assign { name, value } => {
            out.push_str(&format!("\n{pad}Assign {name}"));
            pretty_expr(value, indent + 1, out);
        }
    }
}
