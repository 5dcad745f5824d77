//! Builds basic blocks and the control-flow graph from linear IR.

use crate::common::*;
use crate::middle::adapter::fallthru;
use crate::middle::ir::*;

/// Carve linear IR into basic blocks and compute the CFG.
///
/// - Every non-empty block ends in exactly one terminator (`br`/`jmp`/`ret`);
///   implicit fallthroughs become explicit `jmp`s.
/// - The fallthrough placeholder in `br` is resolved to the next block's
///   label (or `None` when the branch is in the final block).
/// - An unterminated final block is closed with a default `return`.
/// - A synthetic `_entry` block is created unless the stream opens with a
///   label; instructions after a terminator with no label open a
///   `_Basic-Block<n>` block.
pub fn linear_to_blocks(func_name: Id, linear: Vec<Instr>) -> Function {
    let mut blocks = vec![Block::new(id("_entry"))];
    // whether the last block still accepts instructions
    let mut open = true;
    let mut anon = 0usize;

    for ins in linear {
        if let Instr::Label { label } = ins {
            // a label before any instruction names the entry block itself
            if blocks.len() == 1 && blocks[0].label == id("_entry") && blocks[0].instrs.is_empty()
            {
                blocks[0].label = label;
                continue;
            }
            if open {
                let cur = blocks.last_mut().unwrap();
                if !cur.instrs.last().is_some_and(Instr::is_terminator) {
                    // fallthrough to this label
                    cur.instrs.push(Instr::Jmp { target: label });
                }
            }
            blocks.push(Block::new(label));
            open = true;
            continue;
        }

        if !open {
            blocks.push(Block::new(id(&format!("_Basic-Block{anon}"))));
            anon += 1;
            open = true;
        }

        let terminates = ins.is_terminator();
        blocks.last_mut().unwrap().instrs.push(ins);
        if terminates {
            open = false;
        }
    }

    if open {
        let cur = blocks.last_mut().unwrap();
        if !cur.instrs.last().is_some_and(Instr::is_terminator) {
            cur.instrs.push(Instr::Ret { a: None });
        }
    }

    // Resolve the fallthrough placeholder to the physical next block label.
    for i in 0..blocks.len() {
        let next = blocks.get(i + 1).map(|b| b.label);
        if let Some(Instr::Br { tlabel, .. }) = blocks[i].instrs.last_mut() {
            if *tlabel == Some(fallthru()) {
                *tlabel = next;
            }
        }
    }

    let mut f = Function::new(func_name, blocks);
    build_cfg(&mut f);
    f
}

/// Populate `succ`/`pred` from the block terminators.  The terminator
/// invariant must hold or the CFG comes out wrong.
pub fn build_cfg(f: &mut Function) {
    let mut succ: Map<Id, Vec<Id>> = Map::new();
    let mut pred: Map<Id, Vec<Id>> = Map::new();

    for b in &f.blocks {
        pred.entry(b.label).or_default();
        let outs = succ.entry(b.label).or_default();
        match b.instrs.last() {
            Some(Instr::Br { tlabel, flabel, .. }) => {
                if let Some(t) = tlabel {
                    outs.push(*t);
                }
                outs.push(*flabel);
            }
            Some(Instr::Jmp { target }) => outs.push(*target),
            _ => {}
        }
    }
    for (u, outs) in &succ {
        for v in outs {
            pred.entry(*v).or_default().push(*u);
        }
    }
    f.succ = succ;
    f.pred = pred;
}
