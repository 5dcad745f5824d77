//! The parser: recursive descent over the token stream with a
//! precedence-climbing expression chain.

use derive_more::Display;

use crate::common::id;
use crate::front::ast::*;
use crate::front::lex::{Token, TokenKind};

#[derive(Display)]
#[display("parse error at {line}:{col}: {msg}")]
pub struct ParseError {
    pub msg: String,
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for ParseError {}

pub fn parse(tokens: &[Token<'_>]) -> Result<Program, ParseError> {
    Parser { tokens, i: 0 }.program()
}

struct Parser<'a, 'src> {
    tokens: &'a [Token<'src>],
    i: usize,
}

impl<'a, 'src> Parser<'a, 'src> {
    fn current(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.i)
    }

    fn at_end(&self) -> bool {
        self.i >= self.tokens.len()
    }

    /// Position for an error at the current token (or just past the end).
    fn here(&self) -> Pos {
        self.current()
            .or_else(|| self.tokens.last())
            .map(|t| t.pos())
            .unwrap_or((1, 1))
    }

    fn error<T>(&self, msg: impl Into<String>) -> Result<T, ParseError> {
        let (line, col) = self.here();
        Err(ParseError { msg: msg.into(), line, col })
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().is_some_and(|t| t.kind == kind)
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.i += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind, msg: &str) -> Result<Token<'src>, ParseError> {
        if !self.check(kind) {
            let got = match self.current() {
                Some(t) => format!("{} {:?}", t.kind, t.text),
                None => "end of file".to_string(),
            };
            return self.error(format!("{msg}: expected {kind}, got {got}"));
        }
        let token = self.tokens[self.i];
        self.i += 1;
        Ok(token)
    }

    /// Is the token after the current one a plain `=`?  Distinguishes
    /// assignments from expressions starting with an identifier.
    fn peek_is_assign(&self) -> bool {
        self.tokens
            .get(self.i + 1)
            .is_some_and(|t| t.kind == TokenKind::Assign)
    }

    // Program -> Function+
    fn program(&mut self) -> Result<Program, ParseError> {
        if self.at_end() {
            return self.error("expected a function, found end of file");
        }
        let mut functions = vec![];
        while !self.at_end() {
            functions.push(self.function()?);
        }
        Ok(Program { functions })
    }

    // Function -> "int" id "(" ")" Block
    fn function(&mut self) -> Result<Function, ParseError> {
        let start = self.expect(TokenKind::KwInt, "function must start with 'int'")?;
        let name = self.expect(TokenKind::Ident, "expected function name")?;
        self.expect(TokenKind::LParen, "expected '(' after function name")?;
        self.expect(TokenKind::RParen, "expected ')' after '('")?;
        let body = self.block()?;
        let end = self.tokens[self.i - 1];
        Ok(Function {
            name: id(name.text),
            body,
            begins: start.pos(),
            ends: end.pos(),
        })
    }

    // Block -> "{" Item* "}"
    fn block(&mut self) -> Result<Block, ParseError> {
        self.expect(TokenKind::LBrace, "expected '{' to start block")?;
        let mut items = vec![];
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            if self.check(TokenKind::KwInt) {
                items.push(self.declaration()?);
            } else if self.check(TokenKind::LBrace) {
                items.push(Item::Block(self.block()?));
            } else {
                items.push(Item::Stmt(self.statement()?));
            }
        }
        self.expect(TokenKind::RBrace, "expected '}' to end block")?;
        Ok(Block { items })
    }

    // Declaration -> "int" id { "," id } ";"
    fn declaration(&mut self) -> Result<Item, ParseError> {
        self.expect(TokenKind::KwInt, "declaration must start with 'int'")?;
        let first = self.expect(TokenKind::Ident, "expected a variable name")?;
        let mut names = vec![id(first.text)];
        let mut poss = vec![first.pos()];
        while self.matches(TokenKind::Comma) {
            let ident = self.expect(TokenKind::Ident, "expected variable name after ','")?;
            names.push(id(ident.text));
            poss.push(ident.pos());
        }
        self.expect(TokenKind::Semi, "expected ';' after declaration")?;
        Ok(Item::Decl { names, poss })
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if self.matches(TokenKind::KwReturn) {
            if self.matches(TokenKind::Semi) {
                return Ok(Stmt::Return(None));
            }
            let expr = self.expression()?;
            self.expect(TokenKind::Semi, "expected ';' after return")?;
            return Ok(Stmt::Return(Some(expr)));
        }
        if self.matches(TokenKind::KwIf) {
            return self.if_tail();
        }
        if self.matches(TokenKind::KwWhile) {
            self.expect(TokenKind::LParen, "expected '(' after 'while'")?;
            let guard = self.expression()?;
            self.expect(TokenKind::RParen, "expected ')' after condition")?;
            let body = self.block()?;
            return Ok(Stmt::While { guard, body });
        }
        let expr = self.expression()?;
        self.expect(TokenKind::Semi, "expected ';' after expression")?;
        Ok(Stmt::Expr(expr))
    }

    // the "if" keyword is already consumed
    fn if_tail(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::LParen, "expected '(' after 'if'")?;
        let guard = self.expression()?;
        self.expect(TokenKind::RParen, "expected ')' after condition")?;
        let tt = self.block()?;
        let ff = if self.matches(TokenKind::KwElse) {
            Some(self.block()?)
        } else {
            None
        };
        Ok(Stmt::If { guard, tt, ff })
    }

    // Assignment -> id "=" Assignment | LogicalOr   (right-associative)
    fn expression(&mut self) -> Result<Expr, ParseError> {
        if self.check(TokenKind::Ident) && self.peek_is_assign() {
            let name = self.expect(TokenKind::Ident, "expected a variable name")?;
            self.expect(TokenKind::Assign, "expected '=' in assignment")?;
            let value = self.expression()?;
            return Ok(Expr::Assign { name: id(name.text), value: Box::new(value) });
        }
        self.logical_or()
    }

    fn binary_chain(
        &mut self,
        ops: &[(TokenKind, BinOp)],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut node = next(self)?;
        'outer: loop {
            for (kind, op) in ops {
                if self.matches(*kind) {
                    let rhs = next(self)?;
                    node = Expr::Binary { op: *op, lhs: Box::new(node), rhs: Box::new(rhs) };
                    continue 'outer;
                }
            }
            return Ok(node);
        }
    }

    // LogicalOr -> LogicalAnd { "||" LogicalAnd }
    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        self.binary_chain(&[(TokenKind::OrOr, BinOp::Or)], Self::logical_and)
    }

    // LogicalAnd -> Equality { "&&" Equality }
    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        self.binary_chain(&[(TokenKind::AndAnd, BinOp::And)], Self::equality)
    }

    // Equality -> Relational { ("==" | "!=") Relational }
    fn equality(&mut self) -> Result<Expr, ParseError> {
        self.binary_chain(
            &[(TokenKind::EqEq, BinOp::Eq), (TokenKind::NotEq, BinOp::Ne)],
            Self::relational,
        )
    }

    // Relational -> Additive { ("<" | "<=" | ">" | ">=") Additive }
    fn relational(&mut self) -> Result<Expr, ParseError> {
        self.binary_chain(
            &[
                (TokenKind::Lt, BinOp::Lt),
                (TokenKind::Le, BinOp::Le),
                (TokenKind::Gt, BinOp::Gt),
                (TokenKind::Ge, BinOp::Ge),
            ],
            Self::additive,
        )
    }

    // Additive -> Multiplicative { ("+" | "-") Multiplicative }
    fn additive(&mut self) -> Result<Expr, ParseError> {
        self.binary_chain(
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
            Self::multiplicative,
        )
    }

    // Multiplicative -> Unary { ("*" | "/" | "%") Unary }
    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.binary_chain(
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::Percent, BinOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        for (kind, op) in [
            (TokenKind::Not, UnOp::Not),
            (TokenKind::Minus, UnOp::Neg),
            (TokenKind::Plus, UnOp::Plus),
        ] {
            if self.matches(kind) {
                let expr = self.unary()?;
                return Ok(Expr::Unary { op, expr: Box::new(expr) });
            }
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        if self.matches(TokenKind::LParen) {
            let expr = self.expression()?;
            self.expect(TokenKind::RParen, "expected ')'")?;
            return Ok(expr);
        }
        if self.check(TokenKind::Num) {
            let token = self.expect(TokenKind::Num, "expected a number")?;
            return match token.text.parse::<i64>() {
                Ok(v) => Ok(Expr::Int(v)),
                Err(_) => self.error(format!("integer literal {:?} out of range", token.text)),
            };
        }
        if self.check(TokenKind::Ident) {
            let token = self.expect(TokenKind::Ident, "expected a name")?;
            return Ok(Expr::Var(id(token.text)));
        }
        match self.current() {
            Some(t) => self.error(format!("expected expression, got {} {:?}", t.kind, t.text)),
            None => self.error("expected expression, got end of file"),
        }
    }
}
