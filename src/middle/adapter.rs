//! The TAC adapter: parses three-address code text into linear IR and
//! renders block-structured IR back to TAC text.
//!
//! The parser is forgiving: lines it does not recognize are skipped with a
//! diagnostic on the log channel.  Header comments (lines starting with `#`)
//! are kept so the driver can re-emit them at the top of its output.

use log::warn;
use regex::Regex;

use crate::common::*;
use crate::middle::ir::*;

/// Placeholder branch target meaning "the textually next block".  Resolved
/// by the block builder.
pub fn fallthru() -> Id {
    id("__FALLTHRU__")
}

struct TacPatterns {
    label: Regex,
    iffalse: Regex,
    goto_: Regex,
    ret: Regex,
    ret_bare: Regex,
    assign_bin: Regex,
    assign_un: Regex,
    assign: Regex,
    comment: Regex,
}

impl TacPatterns {
    fn new() -> Self {
        TacPatterns {
            // a standalone label line like "L0:" or "loop_start:"
            label: Regex::new(r"^\s*(?P<lab>[A-Za-z_]\w*):\s*$").unwrap(),
            // "ifFalse <cond> goto <L>" where <cond> is a var or literal
            iffalse: Regex::new(
                r"^\s*ifFalse\s+(?P<cond>[A-Za-z_]\w*|-?\d+)\s+goto\s+(?P<L>[A-Za-z_]\w*)\s*$",
            )
            .unwrap(),
            goto_: Regex::new(r"^\s*goto\s+(?P<L>[A-Za-z_]\w*)\s*$").unwrap(),
            ret: Regex::new(r"^\s*return\s+(?P<v>[A-Za-z_]\w*|-?\d+)\s*$").unwrap(),
            ret_bare: Regex::new(r"^\s*return\s*$").unwrap(),
            // "dst = a <op> b" with <op> in the binop set
            assign_bin: Regex::new(
                r"^\s*(?P<dst>[A-Za-z_]\w*)\s*=\s*(?P<a>[A-Za-z_]\w*|-?\d+)\s*(?P<op>\+|-|\*|/|%|==|!=|<=|<|>=|>|&&|\|\|)\s*(?P<b>[A-Za-z_]\w*|-?\d+)\s*$",
            )
            .unwrap(),
            // "dst = <op> a" with <op> in {+, -, !}
            assign_un: Regex::new(
                r"^\s*(?P<dst>[A-Za-z_]\w*)\s*=\s*(?P<op>\+|-|!)\s*(?P<a>[A-Za-z_]\w*|-?\d+)\s*$",
            )
            .unwrap(),
            // "dst = src", covering var-to-var and const-to-var moves
            assign: Regex::new(r"^\s*(?P<dst>[A-Za-z_]\w*)\s*=\s*(?P<src>[A-Za-z_]\w*|-?\d+)\s*$")
                .unwrap(),
            comment: Regex::new(r"^\s*#").unwrap(),
        }
    }
}

/// Turn a matched token into a [Value]: integers become constants, anything
/// else is a variable reference.
fn val(tok: &str) -> Value {
    match tok.parse::<i64>() {
        Ok(n) => Value::Const(n),
        Err(_) => Value::Var(id(tok)),
    }
}

/// Parse TAC lines into linear IR plus the header comments to preserve.
///
/// `ifFalse cond goto L` becomes `br cond ? FALLTHRU : L`; the block builder
/// resolves the placeholder to the next block's label.
pub fn tac_to_linear_ir(lines: &[String]) -> (Vec<Instr>, Vec<String>) {
    let pats = TacPatterns::new();
    let mut header_comments: Vec<String> = vec![];
    let mut ir: Vec<Instr> = vec![];

    for (lineno, ln) in lines.iter().enumerate() {
        if ln.trim().is_empty() {
            continue;
        }
        if pats.comment.is_match(ln) {
            header_comments.push(ln.clone());
            continue;
        }
        if let Some(m) = pats.label.captures(ln) {
            ir.push(Instr::Label { label: id(&m["lab"]) });
            continue;
        }
        if let Some(m) = pats.iffalse.captures(ln) {
            ir.push(Instr::Br {
                a: val(&m["cond"]),
                tlabel: Some(fallthru()),
                flabel: id(&m["L"]),
            });
            continue;
        }
        if let Some(m) = pats.goto_.captures(ln) {
            ir.push(Instr::Jmp { target: id(&m["L"]) });
            continue;
        }
        if let Some(m) = pats.ret.captures(ln) {
            ir.push(Instr::Ret { a: Some(val(&m["v"])) });
            continue;
        }
        if pats.ret_bare.is_match(ln) {
            ir.push(Instr::Ret { a: None });
            continue;
        }
        if let Some(m) = pats.assign_bin.captures(ln) {
            ir.push(Instr::Binop {
                dst: id(&m["dst"]),
                op: m["op"].parse().unwrap(),
                a: val(&m["a"]),
                b: val(&m["b"]),
            });
            continue;
        }
        if let Some(m) = pats.assign_un.captures(ln) {
            ir.push(Instr::Unop {
                dst: id(&m["dst"]),
                op: m["op"].parse().unwrap(),
                a: val(&m["a"]),
            });
            continue;
        }
        if let Some(m) = pats.assign.captures(ln) {
            ir.push(Instr::Mov { dst: id(&m["dst"]), a: val(&m["src"]) });
            continue;
        }
        warn!("unrecognized TAC line {}: {ln:?}", lineno + 1);
    }

    (ir, header_comments)
}

/// Render block-structured IR back to TAC text.  One label per block; the
/// result re-parses to an equivalent IR (modulo fallthrough placeholders).
pub fn ir_to_tac(f: &Function, header_comments: &[String]) -> Vec<String> {
    let mut out: Vec<String> = header_comments.to_vec();

    for b in &f.blocks {
        out.push(format!("{}:", b.label));
        for ins in &b.instrs {
            match ins {
                // block labels were emitted above
                Instr::Label { .. } => {}
                Instr::Mov { dst, a } => out.push(format!("{dst} = {a}")),
                Instr::Binop { dst, op, a, b } => out.push(format!("{dst} = {a} {op} {b}")),
                Instr::Unop { dst, op, a } => out.push(format!("{dst} = {op} {a}")),
                Instr::Br { a, flabel, .. } => out.push(format!("ifFalse {a} goto {flabel}")),
                Instr::Jmp { target } => out.push(format!("goto {target}")),
                Instr::Ret { a: Some(a) } => out.push(format!("return {a}")),
                Instr::Ret { a: None } => out.push("return".to_string()),
            }
        }
    }
    out
}

/// Split a TAC stream into per-function groups on `# function <name>`
/// headers.  A stream with no such header becomes a single function named
/// `main`.  Each group keeps its own comment lines.
pub fn split_functions(lines: &[String]) -> Vec<(Id, Vec<String>)> {
    let header = Regex::new(r"^\s*#\s*function\s+(?P<name>[A-Za-z_]\w*)").unwrap();
    let mut groups: Vec<(Id, Vec<String>)> = vec![];

    for ln in lines {
        if let Some(m) = header.captures(ln) {
            groups.push((id(&m["name"]), vec![ln.clone()]));
            continue;
        }
        match groups.last_mut() {
            Some((_, g)) => g.push(ln.clone()),
            None => {
                if ln.trim().is_empty() {
                    continue;
                }
                groups.push((id("main"), vec![ln.clone()]));
            }
        }
    }
    groups
}
