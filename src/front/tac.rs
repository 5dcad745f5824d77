//! The TAC emitter: walks the AST and produces three-address code text,
//! one line per instruction.
//!
//! Control flow lowers through `ifFalse`/`goto`; `&&` and `||` lower to
//! short-circuit jumps over booleanized (`!= 0`) operands, so no logical
//! operator survives into the emitted stream.  Per-function `# function`
//! and `# decl` comment headers are kept for the later stages to re-emit.

use crate::front::ast::*;

pub struct TacEmitter {
    code: Vec<String>,
    temp_counter: u32,
    label_counter: u32,
}

impl TacEmitter {
    pub fn new() -> Self {
        TacEmitter { code: vec![], temp_counter: 0, label_counter: 0 }
    }

    fn new_temp(&mut self) -> String {
        let t = format!("t{}", self.temp_counter);
        self.temp_counter += 1;
        t
    }

    fn new_label(&mut self) -> String {
        let l = format!("L{}", self.label_counter);
        self.label_counter += 1;
        l
    }

    fn emit(&mut self, line: impl Into<String>) {
        self.code.push(line.into());
    }

    fn label(&mut self, lab: &str) {
        self.emit(format!("{lab}:"));
    }

    /// Booleanize a value to 0/1.
    fn as_bool(&mut self, v: &str) -> String {
        let t = self.new_temp();
        self.emit(format!("{t} = {v} != 0"));
        t
    }

    pub fn generate(mut self, program: &Program) -> Vec<String> {
        for f in &program.functions {
            self.emit(format!("# function {} (int)", f.name));
            self.gen_block(&f.body);
            // blank line between functions
            self.emit("");
        }
        self.code
    }

    fn gen_block(&mut self, block: &Block) {
        for item in &block.items {
            match item {
                Item::Decl { names, .. } => {
                    // no storage layout at this stage; record the names
                    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
                    self.emit(format!("# decl int {}", names.join(", ")));
                }
                Item::Stmt(s) => self.gen_stmt(s),
                Item::Block(b) => self.gen_block(b),
            }
        }
    }

    fn gen_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Return(Some(e)) => {
                let v = self.gen_expr(e);
                self.emit(format!("return {v}"));
            }
            Stmt::Return(None) => self.emit("return"),
            Stmt::Expr(e) => {
                // value discarded
                let _ = self.gen_expr(e);
            }
            Stmt::If { guard, tt, ff } => self.gen_if(guard, tt, ff.as_ref()),
            Stmt::While { guard, body } => self.gen_while(guard, body),
        }
    }

    fn gen_if(&mut self, guard: &Expr, tt: &Block, ff: Option<&Block>) {
        let cond = self.gen_expr(guard);
        match ff {
            None => {
                let l_end = self.new_label();
                self.emit(format!("ifFalse {cond} goto {l_end}"));
                self.gen_block(tt);
                self.label(&l_end);
            }
            Some(ff) => {
                let l_else = self.new_label();
                let l_end = self.new_label();
                self.emit(format!("ifFalse {cond} goto {l_else}"));
                self.gen_block(tt);
                self.emit(format!("goto {l_end}"));
                self.label(&l_else);
                self.gen_block(ff);
                self.label(&l_end);
            }
        }
    }

    fn gen_while(&mut self, guard: &Expr, body: &Block) {
        let l_start = self.new_label();
        let l_end = self.new_label();
        self.label(&l_start);
        let cond = self.gen_expr(guard);
        self.emit(format!("ifFalse {cond} goto {l_end}"));
        self.gen_block(body);
        self.emit(format!("goto {l_start}"));
        self.label(&l_end);
    }

    /// `lhs && rhs` as 0/1 with short-circuit: skip the right side when the
    /// left is already false.
    fn gen_logical_and(&mut self, lhs: &Expr, rhs: &Expr) -> String {
        let l = self.gen_expr(lhs);
        let l = self.as_bool(&l);
        let result = self.new_temp();
        self.emit(format!("{result} = {l}"));
        let l_end = self.new_label();
        self.emit(format!("ifFalse {result} goto {l_end}"));
        let r = self.gen_expr(rhs);
        let r = self.as_bool(&r);
        self.emit(format!("{result} = {r}"));
        self.label(&l_end);
        result
    }

    /// `lhs || rhs` as 0/1 with short-circuit: skip the right side when the
    /// left is already true.
    fn gen_logical_or(&mut self, lhs: &Expr, rhs: &Expr) -> String {
        let l = self.gen_expr(lhs);
        let l = self.as_bool(&l);
        let flipped = self.new_temp();
        self.emit(format!("{flipped} = ! {l}"));
        let result = self.new_temp();
        self.emit(format!("{result} = {l}"));
        let l_end = self.new_label();
        self.emit(format!("ifFalse {flipped} goto {l_end}"));
        let r = self.gen_expr(rhs);
        let r = self.as_bool(&r);
        self.emit(format!("{result} = {r}"));
        self.label(&l_end);
        result
    }

    fn gen_expr(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Int(v) => v.to_string(),
            Expr::Var(name) => name.to_string(),
            Expr::Unary { op: UnOp::Plus, expr } => self.gen_expr(expr),
            Expr::Unary { op, expr } => {
                let v = self.gen_expr(expr);
                let t = self.new_temp();
                self.emit(format!("{t} = {op} {v}"));
                t
            }
            Expr::Binary { op: BinOp::And, lhs, rhs } => self.gen_logical_and(lhs, rhs),
            Expr::Binary { op: BinOp::Or, lhs, rhs } => self.gen_logical_or(lhs, rhs),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.gen_expr(lhs);
                let r = self.gen_expr(rhs);
                let t = self.new_temp();
                self.emit(format!("{t} = {l} {op} {r}"));
                t
            }
            Expr::Assign { name, value } => {
                let rhs = self.gen_expr(value);
                self.emit(format!("{name} = {rhs}"));
                // the expression's value is the assigned variable
                name.to_string()
            }
        }
    }
}

impl Default for TacEmitter {
    fn default() -> Self {
        TacEmitter::new()
    }
}

/// Emit TAC lines for a whole program.
pub fn emit_tac(program: &Program) -> Vec<String> {
    TacEmitter::new().generate(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::lex::tokenize;
    use crate::front::parse::parse;

    fn tac(src: &str) -> Vec<String> {
        emit_tac(&parse(&tokenize(src).unwrap()).unwrap())
    }

    #[test]
    fn straight_line_code() {
        let lines = tac("int main() { int a; a = 1 + 2; return a; }");
        assert_eq!(
            lines,
            vec![
                "# function main (int)",
                "# decl int a",
                "t0 = 1 + 2",
                "a = t0",
                "return a",
                "",
            ]
        );
    }

    #[test]
    fn if_else_shape() {
        let lines = tac("int main() { int a; a = 1; if (a) { a = 2; } else { a = 3; } return a; }");
        assert_eq!(
            lines,
            vec![
                "# function main (int)",
                "# decl int a",
                "a = 1",
                "ifFalse a goto L0",
                "a = 2",
                "goto L1",
                "L0:",
                "a = 3",
                "L1:",
                "return a",
                "",
            ]
        );
    }

    #[test]
    fn while_shape() {
        let lines = tac("int main() { int i; i = 0; while (i < 3) { i = i + 1; } return i; }");
        assert_eq!(
            lines,
            vec![
                "# function main (int)",
                "# decl int i",
                "i = 0",
                "L0:",
                "t0 = i < 3",
                "ifFalse t0 goto L1",
                "t1 = i + 1",
                "i = t1",
                "goto L0",
                "L1:",
                "return i",
                "",
            ]
        );
    }

    #[test]
    fn short_circuit_and() {
        let lines = tac("int main() { int a, b; a = 1; b = 2; return a && b; }");
        assert_eq!(
            lines,
            vec![
                "# function main (int)",
                "# decl int a, b",
                "a = 1",
                "b = 2",
                "t0 = a != 0",
                "t1 = t0",
                "ifFalse t1 goto L0",
                "t2 = b != 0",
                "t1 = t2",
                "L0:",
                "return t1",
                "",
            ]
        );
    }

    #[test]
    fn short_circuit_or_skips_when_left_is_true() {
        let lines = tac("int main() { int a, b; a = 1; b = 2; return a || b; }");
        // the guard temp is the negation of the left side
        assert!(lines.contains(&"t1 = ! t0".to_string()));
        assert!(lines.contains(&"ifFalse t1 goto L0".to_string()));
    }

    #[test]
    fn no_logical_operator_survives() {
        let lines = tac("int main() { int a, b; a = 1; b = 0; return a && b || a; }");
        assert!(lines.iter().all(|l| !l.contains("&&") && !l.contains("||")));
    }

    #[test]
    fn unary_plus_is_a_no_op() {
        let lines = tac("int main() { int a; a = +3; return -a; }");
        assert!(lines.contains(&"a = 3".to_string()));
        assert!(lines.contains(&"t0 = - a".to_string()));
    }
}
