//! Symbol-table printers: one aligned table of functions and one of
//! variables with their scope levels and declaration sites.

use crate::common::*;
use crate::front::ast::*;

/// One row of the function table: name, type, begin/end positions, and the
/// function's top-level variables.
pub struct FuncRow {
    pub name: Id,
    pub typ: &'static str,
    pub begins: String,
    pub ends: String,
    pub vars: String,
    pub var_types: String,
}

/// One row of the variable table.
pub struct VarRow {
    pub func: Id,
    pub name: Id,
    pub typ: &'static str,
    pub scope: usize,
    pub decl_at: String,
}

pub fn build_function_rows(program: &Program) -> Vec<FuncRow> {
    program
        .functions
        .iter()
        .map(|f| {
            let mut names: Vec<String> = vec![];
            for item in &f.body.items {
                if let Item::Decl { names: ns, .. } = item {
                    names.extend(ns.iter().map(|n| n.to_string()));
                }
            }
            let types = vec!["int"; names.len()].join(", ");
            FuncRow {
                name: f.name,
                typ: "int",
                begins: format!("({},{})", f.begins.0, f.begins.1),
                ends: format!("({},{})", f.ends.0, f.ends.1),
                vars: if names.is_empty() { "N/A".to_string() } else { names.join(", ") },
                var_types: if types.is_empty() { "N/A".to_string() } else { types },
            }
        })
        .collect()
}

pub fn build_variable_rows(program: &Program) -> Vec<VarRow> {
    let mut rows = vec![];
    for f in &program.functions {
        collect_vars(f.name, &f.body, 0, &mut rows);
    }
    rows
}

fn collect_vars(func: Id, block: &Block, scope: usize, out: &mut Vec<VarRow>) {
    for item in &block.items {
        match item {
            Item::Decl { names, poss } => {
                for (name, pos) in names.iter().zip(poss) {
                    out.push(VarRow {
                        func,
                        name: *name,
                        typ: "int",
                        scope,
                        decl_at: format!("({},{})", pos.0, pos.1),
                    });
                }
            }
            Item::Block(b) => collect_vars(func, b, scope + 1, out),
            Item::Stmt(s) => collect_vars_in_stmt(func, s, scope, out),
        }
    }
}

fn collect_vars_in_stmt(func: Id, stmt: &Stmt, scope: usize, out: &mut Vec<VarRow>) {
    match stmt {
        Stmt::If { tt, ff, .. } => {
            collect_vars(func, tt, scope + 1, out);
            if let Some(ff) = ff {
                collect_vars(func, ff, scope + 1, out);
            }
        }
        Stmt::While { body, .. } => collect_vars(func, body, scope + 1, out),
        Stmt::Expr(_) | Stmt::Return(_) => {}
    }
}

pub fn format_func_table(title: &str, rows: &[FuncRow]) -> String {
    let headers = [
        "nameOfFunctions",
        "typeOfFunctions",
        "function_begins",
        "function_ends",
        "nameOfVariables",
        "typeOfVariables",
    ];
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.name.to_string(),
                r.typ.to_string(),
                r.begins.clone(),
                r.ends.clone(),
                r.vars.clone(),
                r.var_types.clone(),
            ]
        })
        .collect();
    format_table(title, &headers, &cells)
}

pub fn format_var_table(title: &str, rows: &[VarRow]) -> String {
    let headers = ["function", "name", "type", "scopeLevel", "declared_at"];
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.func.to_string(),
                r.name.to_string(),
                r.typ.to_string(),
                r.scope.to_string(),
                r.decl_at.clone(),
            ]
        })
        .collect();
    format_table(title, &headers, &cells)
}

fn format_table(title: &str, headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let fmt_row = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let rule: String = widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>()
        .join("  ");

    let mut lines = vec![title.to_string(), fmt_row(&header_cells), rule];
    lines.extend(rows.iter().map(|r| fmt_row(r)));
    lines.join("\n")
}
