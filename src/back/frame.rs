//! Frame layout and final assembly: stack slots for named locals,
//! prologue/epilogue insertion, spill-slot remapping, and the return-path
//! peepholes.

use crate::common::*;
use crate::middle::ir::{is_temp_name, Function, Instr, Value};

use crate::back::lower::{lower_function, CodegenError};
use crate::back::ra::allocate_registers;
use crate::back::x86::{print_program, Inst, Operand, Program};

/// How named locals are addressed in the emitted code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameMode {
    /// `[name]` cells; no stack frame.
    Symbolic,
    /// rbp-relative slots with a real prologue/epilogue.
    Stack,
}

#[derive(Clone, Copy, Debug)]
pub struct EmitOptions {
    pub ra: bool,
    pub frame_mode: FrameMode,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions { ra: true, frame_mode: FrameMode::Stack }
    }
}

/// Stack slots for the named locals of one function.
#[derive(Clone, Debug)]
pub struct FrameLayout {
    /// e.g. `a -> -8`, `b -> -16`
    pub off_by_name: Map<Id, i32>,
    /// positive, rounded up to a multiple of 16
    pub size: i32,
}

/// Named (non-temp) variables referenced by an instruction, destination
/// first, in operand order.
fn named_vars(ins: &Instr) -> Vec<Id> {
    fn add(names: &mut Vec<Id>, v: &Value) {
        if let Value::Var(n) = v {
            names.push(*n);
        }
    }

    let mut names: Vec<Id> = vec![];
    match ins {
        Instr::Mov { dst, a } => {
            names.push(*dst);
            add(&mut names, a);
        }
        Instr::Binop { dst, a, b, .. } => {
            names.push(*dst);
            add(&mut names, a);
            add(&mut names, b);
        }
        Instr::Unop { dst, a, .. } => {
            names.push(*dst);
            add(&mut names, a);
        }
        Instr::Br { a, .. } => add(&mut names, a),
        Instr::Ret { a: Some(a) } => add(&mut names, a),
        Instr::Ret { a: None } | Instr::Jmp { .. } | Instr::Label { .. } => {}
    }
    names.retain(|n| !is_temp_name(n));
    names
}

/// Assign every named local an 8-byte slot at -8, -16, ... in first-seen
/// order; the frame size is the deepest slot rounded up to 16 bytes.
pub fn build_frame_layout(f: &Function) -> FrameLayout {
    let mut off_by_name: Map<Id, i32> = Map::new();
    let mut off = 0i32;
    for blk in &f.blocks {
        for ins in &blk.instrs {
            for name in named_vars(ins) {
                off_by_name.entry(name).or_insert_with(|| {
                    off -= 8;
                    off
                });
            }
        }
    }
    FrameLayout { off_by_name, size: (-off + 15) & !15 }
}

fn replace_operands(ins: Inst, f: &mut impl FnMut(Operand) -> Operand) -> Inst {
    match ins {
        Inst::Mov { dst, src } => Inst::Mov { dst: f(dst), src: f(src) },
        Inst::Add { dst, src } => Inst::Add { dst: f(dst), src: f(src) },
        Inst::Sub { dst, src } => Inst::Sub { dst: f(dst), src: f(src) },
        Inst::IMul { dst, src } => Inst::IMul { dst: f(dst), src: f(src) },
        Inst::Cmp { a, b } => Inst::Cmp { a: f(a), b: f(b) },
        Inst::Idiv { src } => Inst::Idiv { src: f(src) },
        Inst::Push { reg } => Inst::Push { reg: f(reg) },
        Inst::Pop { reg } => Inst::Pop { reg: f(reg) },
        Inst::Jcc { .. } | Inst::Jmp { .. } | Inst::LabelDef { .. } | Inst::Ret { .. } => ins,
    }
}

/// Turn every symbolic `spill_*` cell into a frame slot below the locals,
/// assigning offsets on first sight.
fn remap_spills_to_frame(p: Program, layout: &FrameLayout) -> Program {
    let mut next_off = -(layout.size + 8);
    let mut slots: Map<Id, i32> = Map::new();

    p.into_iter()
        .map(|ins| {
            replace_operands(ins, &mut |op| match op {
                Operand::Mem(name) if name.starts_with("spill_") => {
                    let off = *slots.entry(name).or_insert_with(|| {
                        let o = next_off;
                        next_off -= 8;
                        o
                    });
                    Operand::FrameRef(off)
                }
                _ => op,
            })
        })
        .collect()
}

/// Wrap the program in `push rbp; mov rbp, rsp; sub rsp, size` and rewrite
/// every `ret` into the matching epilogue.  The `sub`/`add` pair is omitted
/// for an empty frame.
fn add_prologue_epilogue(p: Program, size: i32) -> Program {
    let rbp = Operand::reg("rbp");
    let rsp = Operand::reg("rsp");

    let mut out: Program = vec![Inst::Push { reg: rbp }, Inst::Mov { dst: rbp, src: rsp }];
    if size > 0 {
        out.push(Inst::Sub { dst: rsp, src: Operand::Imm(size as i64) });
    }
    for ins in p {
        if let Inst::Ret { val } = ins {
            if size > 0 {
                out.push(Inst::Add { dst: rsp, src: Operand::Imm(size as i64) });
            }
            out.push(Inst::Pop { reg: rbp });
            out.push(Inst::Ret { val });
        } else {
            out.push(ins);
        }
    }
    out
}

fn reg_name(op: &Operand) -> Option<String> {
    match op {
        Operand::Reg(r) => Some(r.to_lowercase()),
        _ => None,
    }
}

/// Stack-epilogue instructions are transparent between a tail shuffle and
/// its `ret`.
fn is_epilogue_inst(ins: &Inst) -> bool {
    match ins {
        Inst::Pop { .. } => true,
        Inst::Add { dst, .. } => reg_name(dst).as_deref() == Some("rsp"),
        _ => false,
    }
}

/// Clean up redundant RAX shuffles on the return path:
/// `mov Rt, rax; mov rax, Rt; (epilogue)?; ret` loses both moves, and a
/// bare `mov rax, rax` is dropped anywhere.
fn peephole_ret_rax(p: Program) -> Program {
    let mut out: Program = vec![];
    let mut i = 0;
    let n = p.len();

    while i < n {
        if let Inst::Mov { dst, src } = p[i] {
            if reg_name(&dst).as_deref() == Some("rax")
                && reg_name(&src).as_deref() == Some("rax")
            {
                i += 1;
                continue;
            }
        }

        if i + 1 < n {
            if let (Inst::Mov { dst: d1, src: s1 }, Inst::Mov { dst: d2, src: s2 }) =
                (p[i], p[i + 1])
            {
                let shuffles = reg_name(&s1).as_deref() == Some("rax")
                    && reg_name(&d2).as_deref() == Some("rax")
                    && reg_name(&d1).is_some()
                    && reg_name(&d1) == reg_name(&s2);
                if shuffles {
                    // look past the epilogue for the ret
                    let mut j = i + 2;
                    while j < n && is_epilogue_inst(&p[j]) {
                        j += 1;
                    }
                    if j < n && matches!(p[j], Inst::Ret { .. }) {
                        // keep the epilogue and the ret, drop the two movs
                        out.extend_from_slice(&p[i + 2..=j]);
                        i = j + 1;
                        continue;
                    }
                    // no ret downstream: leave the moves alone
                }
            }
        }

        out.push(p[i]);
        i += 1;
    }
    out
}

/// Cosmetic: collapse two identical adjacent `mov` lines in the printed
/// form.
fn dedupe_adjacent_movs(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = vec![];
    for ln in lines {
        if out.last() == Some(&ln) && ln.trim_start().starts_with("mov") {
            continue;
        }
        out.push(ln);
    }
    out
}

/// Emit one function: lower, allocate registers, lay out the frame, run the
/// peepholes, and print.  The first line is the `function <name>` header.
pub fn emit_function(f: &Function, opts: &EmitOptions) -> Result<Vec<String>, CodegenError> {
    let frame = match opts.frame_mode {
        FrameMode::Stack => Some(build_frame_layout(f)),
        FrameMode::Symbolic => None,
    };

    let mut prog = lower_function(f, frame.as_ref())?;
    if opts.ra {
        prog = allocate_registers(&prog);
    }
    if let Some(layout) = &frame {
        if opts.ra {
            prog = remap_spills_to_frame(prog, layout);
        }
        prog = add_prologue_epilogue(prog, layout.size);
    }
    prog = peephole_ret_rax(prog);

    let mut lines = vec![format!("function {}", f.name)];
    lines.extend(dedupe_adjacent_movs(print_program(&prog)));
    Ok(lines)
}
