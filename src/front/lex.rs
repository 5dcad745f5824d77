//! The lexer.

use derive_more::Display;
use regex::Regex;

use crate::front::ast::Pos;

/// Tokens in the program.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[display("{line}:{col}  {kind}  '{text}'")]
pub struct Token<'src> {
    /// What token class this token belongs to.
    pub kind: TokenKind,
    /// What part of the input this token carries.
    pub text: &'src str,
    pub line: u32,
    pub col: u32,
}

impl Token<'_> {
    pub fn pos(&self) -> Pos {
        (self.line, self.col)
    }
}

/// Token classes.  Multi-character operators come before their prefixes in
/// the matcher table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum TokenKind {
    #[display("int")]
    KwInt,
    #[display("return")]
    KwReturn,
    #[display("if")]
    KwIf,
    #[display("else")]
    KwElse,
    #[display("while")]
    KwWhile,
    #[display("id")]
    Ident,
    #[display("num")]
    Num,
    #[display("||")]
    OrOr,
    #[display("&&")]
    AndAnd,
    #[display("==")]
    EqEq,
    #[display("!=")]
    NotEq,
    #[display("<=")]
    Le,
    #[display(">=")]
    Ge,
    #[display("<")]
    Lt,
    #[display(">")]
    Gt,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("%")]
    Percent,
    #[display("!")]
    Not,
    #[display("=")]
    Assign,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display(";")]
    Semi,
    #[display(",")]
    Comma,
}

#[derive(Display)]
#[display("lexical error: unexpected character {_2:?} at {_0}:{_1}")]
pub struct LexError(pub u32, pub u32, pub char);

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for LexError {}

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    line: u32,
    col: u32,
    whitespace: Regex,
    matchers: Vec<(Regex, TokenKind)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        use TokenKind::*;
        let t = |pat: &str, kind: TokenKind| (Regex::new(pat).unwrap(), kind);
        Lexer {
            input,
            pos: 0,
            line: 1,
            col: 1,
            // spaces, line comments, and block comments are all skipped
            whitespace: Regex::new(
                r"\A(?:[ \t\r\n]|//[^\n]*|/\*[^*]*\*+(?:[^/*][^*]*\*+)*/)*",
            )
            .unwrap(),
            matchers: vec![
                t(r"\Aint\b", KwInt),
                t(r"\Areturn\b", KwReturn),
                t(r"\Aif\b", KwIf),
                t(r"\Aelse\b", KwElse),
                t(r"\Awhile\b", KwWhile),
                t(r"\A[A-Za-z_]\w*", Ident),
                t(r"\A\d+", Num),
                t(r"\A\|\|", OrOr),
                t(r"\A&&", AndAnd),
                t(r"\A==", EqEq),
                t(r"\A!=", NotEq),
                t(r"\A<=", Le),
                t(r"\A>=", Ge),
                t(r"\A<", Lt),
                t(r"\A>", Gt),
                t(r"\A\+", Plus),
                t(r"\A-", Minus),
                t(r"\A\*", Star),
                t(r"\A/", Slash),
                t(r"\A%", Percent),
                t(r"\A!", Not),
                t(r"\A=", Assign),
                t(r"\A\(", LParen),
                t(r"\A\)", RParen),
                t(r"\A\{", LBrace),
                t(r"\A\}", RBrace),
                t(r"\A;", Semi),
                t(r"\A,", Comma),
            ],
        }
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    /// Move past `len` consumed bytes, keeping line/column current.
    fn advance(&mut self, len: usize) {
        for ch in self.input[self.pos..self.pos + len].chars() {
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        self.pos += len;
    }

    // Skip comments and whitespace
    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            self.advance(m.end());
        }
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, LexError> {
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }

        let rest = &self.input[self.pos..];
        for (re, kind) in &self.matchers {
            if let Some(m) = re.find(rest) {
                let token = Token {
                    kind: *kind,
                    text: m.as_str(),
                    line: self.line,
                    col: self.col,
                };
                self.advance(m.end());
                return Ok(Some(token));
            }
        }

        let ch = rest.chars().next().unwrap_or('\0');
        Err(LexError(self.line, self.col, ch))
    }
}

/// Lex the whole input into a token vector.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, LexError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = vec![];
    while let Some(token) = lexer.next()? {
        tokens.push(token);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_a_small_function() {
        assert_eq!(
            kinds("int main() { return 0; }"),
            vec![KwInt, Ident, LParen, RParen, LBrace, KwReturn, Num, Semi, RBrace]
        );
    }

    #[test]
    fn keywords_do_not_swallow_identifiers() {
        assert_eq!(kinds("inty interest returning"), vec![Ident, Ident, Ident]);
    }

    #[test]
    fn multichar_operators_win_over_prefixes() {
        assert_eq!(
            kinds("a <= b == c && d != e"),
            vec![Ident, Le, Ident, EqEq, Ident, AndAnd, Ident, NotEq, Ident]
        );
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        assert_eq!(
            kinds("x // line comment\n/* block\ncomment */ = 1"),
            vec![Ident, Assign, Num]
        );
    }

    #[test]
    fn positions_are_one_based_lines_and_columns() {
        let tokens = tokenize("int a;\n  a = 3;").unwrap();
        assert_eq!((tokens[0].line, tokens[0].col), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].col), (1, 5));
        // after the newline: 'a' sits at column 3 of line 2
        assert_eq!((tokens[3].line, tokens[3].col), (2, 3));
    }

    #[test]
    fn rejects_unexpected_characters() {
        let err = tokenize("x = @;").unwrap_err();
        assert_eq!((err.0, err.1, err.2), (1, 5, '@'));
    }
}
