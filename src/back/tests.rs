//! End-to-end emission tests: TAC text through the optimizer, lowering,
//! register allocation, and frame layout to printed assembly.

use crate::back::frame::{emit_function, EmitOptions, FrameMode};
use crate::back::lower::lower_function;
use crate::back::ra::{allocate_registers, is_vreg};
use crate::back::x86::{Inst, Operand};
use crate::common::id;
use crate::middle::adapter::tac_to_linear_ir;
use crate::middle::build::linear_to_blocks;
use crate::middle::ir::Function;
use crate::middle::opt::optimize_function;

fn compile(src: &[&str], opt_level: u8) -> Function {
    let lines: Vec<String> = src.iter().map(|s| s.to_string()).collect();
    let (ir, _) = tac_to_linear_ir(&lines);
    let mut f = linear_to_blocks(id("main"), ir);
    optimize_function(&mut f, opt_level);
    f
}

fn emit(src: &[&str], opt_level: u8, opts: EmitOptions) -> Vec<String> {
    emit_function(&compile(src, opt_level), &opts).unwrap()
}

#[test]
fn constant_expression_returns_through_rax() {
    // t0 = 2 + 3; return t0  ==>  mov rax, 5 / ret
    let lines = emit(
        &["t0 = 2 + 3", "return t0"],
        1,
        EmitOptions { ra: true, frame_mode: FrameMode::Symbolic },
    );
    assert_eq!(lines, vec!["function main", "_entry:", "  mov rax, 5", "  ret"]);
}

#[test]
fn copy_chain_collapses_to_a_frame_load() {
    // a = x; b = a; return b at O2: only the return of x remains
    let lines = emit(&["a = x", "b = a", "return b"], 2, EmitOptions::default());
    assert_eq!(
        lines,
        vec![
            "function main",
            "  push rbp",
            "  mov rbp, rsp",
            "  sub rsp, 16",
            "_entry:",
            "  mov rax, [rbp-8]",
            "  add rsp, 16",
            "  pop rbp",
            "  ret",
        ]
    );
}

#[test]
fn division_pipeline_lands_in_rax() {
    let lines = emit(&["t0 = a / b", "return t0"], 0, EmitOptions::default());
    assert_eq!(
        lines,
        vec![
            "function main",
            "  push rbp",
            "  mov rbp, rsp",
            "  sub rsp, 16",
            "_entry:",
            "  mov rax, [rbp-8]",
            "  mov rcx, [rbp-16]",
            "  idiv rcx",
            "  add rsp, 16",
            "  pop rbp",
            "  ret",
        ]
    );
}

#[test]
fn empty_input_is_prologue_epilogue_ret() {
    let f = Function::new(id("main"), vec![]);
    let lines = emit_function(&f, &EmitOptions::default()).unwrap();
    assert_eq!(
        lines,
        vec!["function main", "  push rbp", "  mov rbp, rsp", "  pop rbp", "  ret"]
    );
}

#[test]
fn division_by_zero_constant_survives_to_the_output() {
    // never folded; the idiv against 0 is emitted as written
    let lines = emit(&["t0 = 1 / 0", "return t0"], 3, EmitOptions::default());
    assert!(lines.iter().any(|l| l.contains("idiv")));
}

#[test]
fn no_virtual_registers_or_spill_cells_remain() {
    // enough simultaneously-live temps to force spilling (unoptimized)
    let mut src: Vec<String> = (0..10).map(|i| format!("t{i} = x + {i}")).collect();
    for i in 1..10 {
        src.push(format!("t0 = t0 + t{i}"));
    }
    src.push("return t0".to_string());
    let src: Vec<&str> = src.iter().map(|s| s.as_str()).collect();

    let f = compile(&src, 0);
    let layout = crate::back::frame::build_frame_layout(&f);
    let prog = allocate_registers(&lower_function(&f, Some(&layout)).unwrap());

    let mut ops: Vec<Operand> = vec![];
    for ins in &prog {
        match ins {
            Inst::Mov { dst, src }
            | Inst::Add { dst, src }
            | Inst::Sub { dst, src }
            | Inst::IMul { dst, src } => ops.extend([*dst, *src]),
            Inst::Cmp { a, b } => ops.extend([*a, *b]),
            Inst::Idiv { src } => ops.push(*src),
            Inst::Ret { val: Some(v) } => ops.push(*v),
            _ => {}
        }
    }
    for op in ops {
        if let Operand::Reg(r) = op {
            assert!(!is_vreg(&r), "virtual register {r} leaked");
        }
    }

    // after the frame remap, no symbolic spill cell remains either
    let lines = emit(&src, 0, EmitOptions::default());
    assert!(lines.iter().all(|l| !l.contains("spill_")));
}

#[test]
fn printed_ret_count_matches_ir_ret_count() {
    let lines = emit(
        &["ifFalse c goto L1", "return 1", "L1:", "return 2"],
        0,
        EmitOptions::default(),
    );
    let rets = lines.iter().filter(|l| l.trim() == "ret").count();
    assert_eq!(rets, 2);
}

#[test]
fn loop_compiles_at_every_level() {
    let src = [
        "# function main (int)",
        "# decl int i, acc",
        "i = 0",
        "acc = 0",
        "L0:",
        "t0 = i < 10",
        "ifFalse t0 goto L1",
        "acc = acc + i",
        "i = i + 1",
        "goto L0",
        "L1:",
        "return acc",
    ];
    for level in 0..=3 {
        let lines = emit(&src, level, EmitOptions::default());
        assert_eq!(lines[0], "function main");
        assert!(lines.iter().any(|l| l.trim() == "ret"), "O{level}: no ret");
        assert!(
            lines.iter().all(|l| !l.contains("spill_")),
            "O{level}: spill cell leaked"
        );
        // the loop back-edge survives every optimization level
        assert!(
            lines.iter().any(|l| l.trim().starts_with("jmp") || l.trim().starts_with("j")),
            "O{level}: no jumps left"
        );
    }
}
