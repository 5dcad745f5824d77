//! Dumps block-structured IR for the driver's `--dump-blocks`/`--dump-cfg`
//! flags.

use crate::middle::ir::{Function, Instr};

pub fn dump_blocks(f: &Function, show_cfg: bool) -> String {
    let mut lines = vec![format!("# function {} (IR blocks)", f.name)];
    for b in &f.blocks {
        lines.push(format!("{}:", b.label));
        for ins in &b.instrs {
            if let Instr::Label { .. } = ins {
                // block labels are printed above
                continue;
            }
            lines.push(format!("  {ins}"));
        }
        if show_cfg {
            let succs: Vec<String> = f
                .succ
                .get(&b.label)
                .map(|v| v.iter().map(|l| l.to_string()).collect())
                .unwrap_or_default();
            lines.push(format!("  ;; succ: [{}]", succs.join(", ")));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;
    use crate::middle::adapter::tac_to_linear_ir;
    use crate::middle::build::linear_to_blocks;

    #[test]
    fn dumps_blocks_with_cfg_edges() {
        let lines: Vec<String> = ["t0 = 1", "ifFalse t0 goto L1", "return 2", "L1:", "return 3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (ir, _) = tac_to_linear_ir(&lines);
        let f = linear_to_blocks(id("main"), ir);
        let dump = dump_blocks(&f, true);
        assert!(dump.starts_with("# function main (IR blocks)"));
        assert!(dump.contains("_entry:"));
        assert!(dump.contains("  t0 = 1"));
        assert!(dump.contains(";; succ: ["));
    }
}
