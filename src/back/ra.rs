//! The register allocator: liveness over the instruction CFG, an
//! interference graph, a simplified Chaitin-style simplify/select, and
//! spill rewriting through a reserved scratch register.
//!
//! Virtual registers are exactly the `Reg` operands whose name starts with
//! `R`; that includes `RAX`/`RDX`, which are precolored to their physical
//! counterparts so division constraints hold.

use log::debug;

use crate::common::*;
use crate::back::x86::{Inst, Operand, Program};

/// Physical registers usable as colors.  Callees are free to clobber them.
pub const CALLER_SAVED: [&str; 9] =
    ["rax", "rcx", "rdx", "rsi", "rdi", "r8", "r9", "r10", "r11"];

/// Reserved for spill reload/store; never handed out as a color.
pub const SPILL_SCRATCH: &str = "r10";

pub fn is_vreg(name: &Id) -> bool {
    name.starts_with('R')
}

fn vreg_of(op: &Operand) -> Option<Id> {
    match op {
        Operand::Reg(r) if is_vreg(r) => Some(*r),
        _ => None,
    }
}

/// Virtual registers read and written by one instruction.
fn reads_writes(ins: &Inst) -> (Set<Id>, Set<Id>) {
    let mut r = Set::new();
    let mut w = Set::new();
    match ins {
        Inst::Mov { dst, src } => {
            r.extend(vreg_of(src));
            w.extend(vreg_of(dst));
        }
        Inst::Add { dst, src } | Inst::Sub { dst, src } | Inst::IMul { dst, src } => {
            // two-operand semantics: dst is both read and written
            r.extend(vreg_of(dst));
            r.extend(vreg_of(src));
            w.extend(vreg_of(dst));
        }
        Inst::Cmp { a, b } => {
            r.extend(vreg_of(a));
            r.extend(vreg_of(b));
        }
        Inst::Idiv { src } => {
            r.insert(id("RAX"));
            r.insert(id("RDX"));
            r.extend(vreg_of(src));
            w.insert(id("RAX"));
            w.insert(id("RDX"));
        }
        Inst::Ret { val } => {
            if let Some(v) = val {
                r.extend(vreg_of(v));
            }
        }
        // push/pop only touch physical registers in this back end
        Inst::Jcc { .. } | Inst::Jmp { .. } | Inst::LabelDef { .. } | Inst::Push { .. }
        | Inst::Pop { .. } => {}
    }
    (r, w)
}

/// Successor indices for each instruction.
fn successors(p: &Program) -> Vec<Vec<usize>> {
    let labels: Map<Id, usize> = p
        .iter()
        .enumerate()
        .filter_map(|(i, ins)| match ins {
            Inst::LabelDef { label } => Some((*label, i)),
            _ => None,
        })
        .collect();
    let target_index = |t: &Id| -> usize {
        *labels
            .get(t)
            .unwrap_or_else(|| panic!("allocator: jump to unknown label {t}"))
    };

    p.iter()
        .enumerate()
        .map(|(i, ins)| {
            let next = if i + 1 < p.len() { Some(i + 1) } else { None };
            match ins {
                Inst::Ret { .. } => vec![],
                Inst::Jmp { target } => vec![target_index(target)],
                Inst::Jcc { target, .. } => {
                    let mut s: Vec<usize> = next.into_iter().collect();
                    s.push(target_index(target));
                    s
                }
                _ => next.into_iter().collect(),
            }
        })
        .collect()
}

struct Liveness {
    ins: Vec<Set<Id>>,
    outs: Vec<Set<Id>>,
    reads: Vec<Set<Id>>,
    writes: Vec<Set<Id>>,
}

/// Backward dataflow to a fixpoint:
/// `out[i] = U in[s]`, `in[i] = r[i] | (out[i] - w[i])`.
fn liveness(p: &Program) -> Liveness {
    let succ = successors(p);
    let (reads, writes): (Vec<_>, Vec<_>) = p.iter().map(reads_writes).unzip();
    let mut ins: Vec<Set<Id>> = vec![Set::new(); p.len()];
    let mut outs: Vec<Set<Id>> = vec![Set::new(); p.len()];

    let mut changed = true;
    while changed {
        changed = false;
        for i in (0..p.len()).rev() {
            let mut new_out: Set<Id> = Set::new();
            for &j in &succ[i] {
                new_out.extend(ins[j].iter().copied());
            }
            let mut new_in = reads[i].clone();
            new_in.extend(new_out.difference(&writes[i]).copied());

            if new_out != outs[i] || new_in != ins[i] {
                outs[i] = new_out;
                ins[i] = new_in;
                changed = true;
            }
        }
    }
    Liveness { ins, outs, reads, writes }
}

type Graph = Map<Id, Set<Id>>;

fn build_igraph(p: &Program, live: &Liveness) -> Graph {
    let mut g: Graph = Map::new();

    fn edge(g: &mut Graph, a: Id, b: Id) {
        if a == b {
            return;
        }
        g.entry(a).or_default().insert(b);
        g.entry(b).or_default().insert(a);
    }

    for (i, ins) in p.iter().enumerate() {
        // every touched register becomes a node, even an isolated one
        for v in live.reads[i].union(&live.writes[i]) {
            g.entry(*v).or_default();
        }

        // writes against live-out: classic interference
        for x in &live.writes[i] {
            for y in &live.outs[i] {
                edge(&mut g, *x, *y);
            }
        }

        // idiv pins RAX/RDX against everything live around it
        if matches!(ins, Inst::Idiv { .. }) {
            let around: Set<Id> =
                live.ins[i].union(&live.outs[i]).copied().collect();
            for fixed in [id("RAX"), id("RDX")] {
                g.entry(fixed).or_default();
                for y in &around {
                    edge(&mut g, fixed, *y);
                }
            }
            edge(&mut g, id("RAX"), id("RDX"));
        }
    }
    g
}

/// Simplify/select over the caller-saved pool (minus the spill scratch).
///
/// Simplify repeatedly pushes a non-precolored node of degree < k, falling
/// back to a highest-degree node as a spill candidate.  Select pops the
/// stack and picks a free color, preferring non-`rax`/`rdx` to keep idiv
/// flexible; nodes with no free color are spilled.
fn greedy_color(g: &Graph, precolored: &Map<Id, Id>) -> (Map<Id, Id>, Set<Id>) {
    let pool: Vec<Id> = CALLER_SAVED
        .iter()
        .filter(|r| **r != SPILL_SCRATCH)
        .map(|r| id(r))
        .collect();

    let mut work: Set<Id> = g.keys().chain(precolored.keys()).copied().collect();
    let degree = |v: &Id| g.get(v).map_or(0, |n| n.len());

    let mut stack: Vec<Id> = vec![];
    while !work.is_empty() {
        let pick = work
            .iter()
            .find(|v| !precolored.contains_key(*v) && degree(*v) < pool.len())
            .copied()
            .or_else(|| {
                // no low-degree node left: nominate a spill candidate
                work.iter()
                    .filter(|v| !precolored.contains_key(*v))
                    .max_by_key(|v| degree(*v))
                    .copied()
            });
        let Some(pick) = pick else {
            break; // only precolored nodes remain
        };
        stack.push(pick);
        work.remove(&pick);
    }

    let mut colors = precolored.clone();
    let mut spills: Set<Id> = Set::new();
    while let Some(v) = stack.pop() {
        let used: Set<Id> = g
            .get(&v)
            .into_iter()
            .flatten()
            .filter_map(|n| colors.get(n).copied())
            .collect();
        let try_first = pool.iter().filter(|r| **r != id("rax") && **r != id("rdx"));
        let try_then = pool.iter().filter(|r| **r == id("rax") || **r == id("rdx"));
        match try_first.chain(try_then).find(|r| !used.contains(*r)) {
            Some(color) => {
                colors.insert(v, *color);
            }
            None => {
                spills.insert(v);
            }
        }
    }
    (colors, spills)
}

fn spill_mem(v: &Id) -> Operand {
    Operand::Mem(id(&format!("spill_{v}")))
}

fn scratch() -> Operand {
    Operand::reg(SPILL_SCRATCH)
}

/// Rewrite the program with colors applied and spilled virtual registers
/// materialized through the scratch register.
fn rewrite_with_spills(p: &Program, colors: &Map<Id, Id>, spills: &Set<Id>) -> Program {
    let spilled = |op: &Operand| vreg_of(op).is_some_and(|v| spills.contains(&v));
    let phys = |op: Operand| -> Operand {
        match vreg_of(&op).and_then(|v| colors.get(&v)) {
            Some(color) => Operand::Reg(*color),
            None => op,
        }
    };

    let mut out: Program = vec![];
    for ins in p {
        match *ins {
            Inst::Ret { val } => {
                match val {
                    Some(v) if spilled(&v) => {
                        let name = vreg_of(&v).unwrap();
                        out.push(Inst::Mov { dst: scratch(), src: spill_mem(&name) });
                        out.push(Inst::Ret { val: Some(scratch()) });
                    }
                    _ => out.push(Inst::Ret { val: val.map(phys) }),
                }
            }
            Inst::Idiv { src } => {
                // the divisor must stay in a register
                if spilled(&src) {
                    let name = vreg_of(&src).unwrap();
                    out.push(Inst::Mov { dst: scratch(), src: spill_mem(&name) });
                    out.push(Inst::Idiv { src: scratch() });
                } else {
                    out.push(Inst::Idiv { src: phys(src) });
                }
            }
            Inst::Cmp { a, b } => {
                // left operand in a register, right may stay in memory
                let ap = if spilled(&a) {
                    let name = vreg_of(&a).unwrap();
                    out.push(Inst::Mov { dst: scratch(), src: spill_mem(&name) });
                    scratch()
                } else {
                    phys(a)
                };
                let bp = if spilled(&b) {
                    spill_mem(&vreg_of(&b).unwrap())
                } else {
                    phys(b)
                };
                out.push(Inst::Cmp { a: ap, b: bp });
            }
            Inst::Mov { dst, src } => {
                if spilled(&dst) {
                    let dmem = spill_mem(&vreg_of(&dst).unwrap());
                    if spilled(&src) {
                        out.push(Inst::Mov {
                            dst: scratch(),
                            src: spill_mem(&vreg_of(&src).unwrap()),
                        });
                        out.push(Inst::Mov { dst: dmem, src: scratch() });
                    } else {
                        out.push(Inst::Mov { dst: dmem, src: phys(src) });
                    }
                } else if spilled(&src) {
                    out.push(Inst::Mov {
                        dst: scratch(),
                        src: spill_mem(&vreg_of(&src).unwrap()),
                    });
                    out.push(Inst::Mov { dst: phys(dst), src: scratch() });
                } else {
                    out.push(Inst::Mov { dst: phys(dst), src: phys(src) });
                }
            }
            Inst::Add { dst, src } | Inst::Sub { dst, src } | Inst::IMul { dst, src } => {
                let rebuild = |d: Operand, s: Operand| match ins {
                    Inst::Add { .. } => Inst::Add { dst: d, src: s },
                    Inst::Sub { .. } => Inst::Sub { dst: d, src: s },
                    _ => Inst::IMul { dst: d, src: s },
                };
                // a spilled source may stay a memory operand
                let s_op = if spilled(&src) {
                    spill_mem(&vreg_of(&src).unwrap())
                } else {
                    phys(src)
                };
                if spilled(&dst) {
                    // load, operate, store back
                    let dmem = spill_mem(&vreg_of(&dst).unwrap());
                    out.push(Inst::Mov { dst: scratch(), src: dmem });
                    out.push(rebuild(scratch(), s_op));
                    out.push(Inst::Mov { dst: dmem, src: scratch() });
                } else {
                    out.push(rebuild(phys(dst), s_op));
                }
            }
            Inst::Jcc { .. } | Inst::Jmp { .. } | Inst::LabelDef { .. } | Inst::Push { .. }
            | Inst::Pop { .. } => out.push(*ins),
        }
    }
    out
}

/// Allocate physical registers for a whole program.
pub fn allocate_registers(p: &Program) -> Program {
    let live = liveness(p);
    let g = build_igraph(p, &live);
    let precolored: Map<Id, Id> = [(id("RAX"), id("rax")), (id("RDX"), id("rdx"))].into();
    let (colors, spills) = greedy_color(&g, &precolored);
    debug!(
        "allocator: {} nodes, {} colored, {} spilled",
        g.len(),
        colors.len(),
        spills.len()
    );
    rewrite_with_spills(p, &colors, &spills)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::x86::Cond;

    fn reg(name: &str) -> Operand {
        Operand::reg(name)
    }

    fn vregs_left(p: &Program) -> Vec<Id> {
        let mut found = vec![];
        let mut check = |op: &Operand| {
            if let Some(v) = vreg_of(op) {
                found.push(v);
            }
        };
        for ins in p {
            match ins {
                Inst::Mov { dst, src }
                | Inst::Add { dst, src }
                | Inst::Sub { dst, src }
                | Inst::IMul { dst, src } => {
                    check(dst);
                    check(src);
                }
                Inst::Cmp { a, b } => {
                    check(a);
                    check(b);
                }
                Inst::Idiv { src } => check(src),
                Inst::Ret { val: Some(v) } => check(v),
                _ => {}
            }
        }
        found
    }

    #[test]
    fn interfering_vregs_get_distinct_registers() {
        // R1 and R2 are live at the same time
        let p = vec![
            Inst::Mov { dst: reg("R1"), src: Operand::Imm(1) },
            Inst::Mov { dst: reg("R2"), src: Operand::Imm(2) },
            Inst::Add { dst: reg("R1"), src: reg("R2") },
            Inst::Mov { dst: reg("RAX"), src: reg("R1") },
            Inst::Ret { val: None },
        ];
        let out = allocate_registers(&p);
        assert!(vregs_left(&out).is_empty());
        let (r1, r2) = match (&out[0], &out[1]) {
            (Inst::Mov { dst: Operand::Reg(a), .. }, Inst::Mov { dst: Operand::Reg(b), .. }) => {
                (*a, *b)
            }
            other => panic!("unexpected shape: {other:?}"),
        };
        assert_ne!(r1, r2);
    }

    #[test]
    fn precoloring_pins_rax_and_rdx() {
        let p = vec![
            Inst::Mov { dst: reg("RAX"), src: Operand::Imm(10) },
            Inst::Mov { dst: reg("R1"), src: Operand::Imm(2) },
            Inst::Idiv { src: reg("R1") },
            Inst::Ret { val: None },
        ];
        let out = allocate_registers(&p);
        assert_eq!(out[0], Inst::Mov { dst: reg("rax"), src: Operand::Imm(10) });
        // the divisor must not land on rax or rdx: it is live across idiv
        match &out[1] {
            Inst::Mov { dst: Operand::Reg(r), .. } => {
                assert_ne!(*r, id("rax"));
                assert_ne!(*r, id("rdx"));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn liveness_stops_at_ret() {
        let p = vec![
            Inst::Mov { dst: reg("R1"), src: Operand::Imm(1) },
            Inst::Ret { val: None },
            Inst::LabelDef { label: id("dead") },
            Inst::Mov { dst: reg("R2"), src: Operand::Imm(2) },
            Inst::Ret { val: None },
        ];
        let live = liveness(&p);
        assert!(live.outs[1].is_empty());
        assert!(live.ins[2].is_empty());
    }

    #[test]
    fn jcc_has_two_successors() {
        let p = vec![
            Inst::Cmp { a: reg("R1"), b: Operand::Imm(0) },
            Inst::Jcc { cc: Cond::Ne, target: id("L1") },
            Inst::Ret { val: None },
            Inst::LabelDef { label: id("L1") },
            Inst::Ret { val: None },
        ];
        assert_eq!(successors(&p)[1], vec![2, 3]);
    }

    #[test]
    fn spills_when_pressure_exceeds_the_pool() {
        // 9 vregs all live at once against an 8-color pool
        let n = 9;
        let mut p: Program = (1..=n)
            .map(|i| Inst::Mov { dst: reg(&format!("R{i}")), src: Operand::Imm(i as i64) })
            .collect();
        // one big sum keeps everything live until its last use
        for i in 2..=n {
            p.push(Inst::Add { dst: reg("R1"), src: reg(&format!("R{i}")) });
        }
        p.push(Inst::Mov { dst: reg("RAX"), src: reg("R1") });
        p.push(Inst::Ret { val: None });

        let out = allocate_registers(&p);
        assert!(vregs_left(&out).is_empty());
        // something was spilled, and every spill reference is symbolic
        let spill_refs = out
            .iter()
            .filter(|i| matches!(i,
                Inst::Mov { dst: Operand::Mem(m), .. } if m.starts_with("spill_")))
            .count();
        assert!(spill_refs > 0);
        // spilled values reload through the reserved scratch
        assert!(out.iter().any(|i| matches!(i,
            Inst::Mov { dst: Operand::Reg(r), src: Operand::Mem(m) }
                if *r == id(SPILL_SCRATCH) && m.starts_with("spill_"))));
    }

    #[test]
    fn passthrough_instructions_survive_unchanged() {
        let p = vec![
            Inst::Push { reg: reg("rbp") },
            Inst::LabelDef { label: id("_entry") },
            Inst::Jmp { target: id("_entry") },
        ];
        assert_eq!(allocate_registers(&p), p);
    }
}
