//! Semantic analysis: nested lexical scopes, declare-before-use, and
//! redeclaration checks.  Everything is an `int`, so there is no type
//! checking beyond names resolving.

use derive_more::Display;

use crate::common::*;
use crate::front::ast::*;

#[derive(Display)]
#[display("semantic error: {msg}")]
pub struct SemanticError {
    pub msg: String,
}

impl SemanticError {
    fn new(msg: impl Into<String>) -> Self {
        SemanticError { msg: msg.into() }
    }
}

impl std::fmt::Debug for SemanticError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for SemanticError {}

/// A stack of nested scopes, innermost last.
struct Scopes(Vec<Set<Id>>);

impl Scopes {
    fn declare(&mut self, name: Id) -> Result<(), SemanticError> {
        let top = self.0.last_mut().unwrap();
        if !top.insert(name) {
            return Err(SemanticError::new(format!(
                "redeclaration of '{name}' in the same scope"
            )));
        }
        Ok(())
    }

    fn lookup(&self, name: Id) -> bool {
        self.0.iter().rev().any(|s| s.contains(&name))
    }
}

/// Check every function of the program; each gets its own scope stack.
pub fn analyze(program: &Program) -> Result<(), SemanticError> {
    for f in &program.functions {
        let mut scopes = Scopes(vec![]);
        analyze_block(&f.body, &mut scopes)?;
    }
    Ok(())
}

fn analyze_block(block: &Block, scopes: &mut Scopes) -> Result<(), SemanticError> {
    scopes.0.push(Set::new());
    for item in &block.items {
        match item {
            Item::Decl { names, .. } => {
                for name in names {
                    scopes.declare(*name)?;
                }
            }
            Item::Block(b) => analyze_block(b, scopes)?,
            Item::Stmt(s) => analyze_stmt(s, scopes)?,
        }
    }
    scopes.0.pop();
    Ok(())
}

fn analyze_stmt(stmt: &Stmt, scopes: &mut Scopes) -> Result<(), SemanticError> {
    match stmt {
        Stmt::Expr(e) => analyze_expr(e, scopes),
        Stmt::Return(e) => e.as_ref().map_or(Ok(()), |e| analyze_expr(e, scopes)),
        Stmt::If { guard, tt, ff } => {
            analyze_expr(guard, scopes)?;
            analyze_block(tt, scopes)?;
            ff.as_ref().map_or(Ok(()), |b| analyze_block(b, scopes))
        }
        Stmt::While { guard, body } => {
            analyze_expr(guard, scopes)?;
            analyze_block(body, scopes)
        }
    }
}

fn analyze_expr(expr: &Expr, scopes: &mut Scopes) -> Result<(), SemanticError> {
    match expr {
        Expr::Int(_) => Ok(()),
        Expr::Var(name) => {
            if !scopes.lookup(*name) {
                return Err(SemanticError::new(format!("use of undeclared '{name}'")));
            }
            Ok(())
        }
        Expr::Unary { expr, .. } => analyze_expr(expr, scopes),
        Expr::Binary { lhs, rhs, .. } => {
            analyze_expr(lhs, scopes)?;
            analyze_expr(rhs, scopes)
        }
        Expr::Assign { name, value } => {
            if !scopes.lookup(*name) {
                return Err(SemanticError::new(format!(
                    "assignment to undeclared '{name}'"
                )));
            }
            analyze_expr(value, scopes)
        }
    }
}
