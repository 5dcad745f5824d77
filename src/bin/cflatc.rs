//! The compiler driver: takes a source file and either dumps an
//! intermediate stage (tokens, AST, symbol tables, TAC, IR blocks) or emits
//! the final pseudo-assembly.
//!
//! Run with `--help` for more info.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cflat::back::frame::{emit_function, EmitOptions};
use cflat::back::lower::CodegenError;
use cflat::front::ast;
use cflat::front::lex::{tokenize, LexError};
use cflat::front::parse::{parse, ParseError};
use cflat::front::sem::{analyze, SemanticError};
use cflat::front::symtab;
use cflat::front::tac::emit_tac;
use cflat::middle::adapter::{split_functions, tac_to_linear_ir};
use cflat::middle::build::linear_to_blocks;
use cflat::middle::opt::optimize_function;
use cflat::middle::pretty::dump_blocks;

#[derive(Debug, Parser)]
#[command(version, about = "A compiler for a small C-like language", long_about = None)]
struct Args {
    /// the input file
    file: PathBuf,
    /// emit the token stream and stop
    #[arg(short = 'l', long = "lex")]
    lex: bool,
    /// emit the AST and stop
    #[arg(short = 'p', long = "parse")]
    parse: bool,
    /// emit the symbol tables and stop
    #[arg(long)]
    symtab: bool,
    /// run the semantic checks and stop
    #[arg(short = 's', long = "sem")]
    sem: bool,
    /// emit three-address code and stop
    #[arg(long)]
    tac: bool,
    /// optimization level, 0 to 3
    #[arg(short = 'O', value_name = "LEVEL", default_value_t = 0,
          value_parser = clap::value_parser!(u8).range(0..=3))]
    opt_level: u8,
    /// dump IR blocks before optimization
    #[arg(long)]
    dump_blocks: bool,
    /// dump IR blocks after optimization
    #[arg(long)]
    dump_blocks_after: bool,
    /// include successor lists in IR dumps (implies --dump-blocks-after)
    #[arg(long)]
    dump_cfg: bool,
}

#[derive(Debug)]
enum Error {
    Io(std::io::Error, PathBuf),
    Lex(LexError),
    Parse(ParseError),
    Semantic(SemanticError),
    Codegen(CodegenError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, path) => write!(f, "reading {} failed: {err}", path.display()),
            Error::Lex(err) => write!(f, "{err}"),
            Error::Parse(err) => write!(f, "{err}"),
            Error::Semantic(err) => write!(f, "{err}"),
            Error::Codegen(err) => write!(f, "{err}"),
        }
    }
}

impl From<LexError> for Error {
    fn from(err: LexError) -> Error {
        Error::Lex(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<SemanticError> for Error {
    fn from(err: SemanticError) -> Error {
        Error::Semantic(err)
    }
}

impl From<CodegenError> for Error {
    fn from(err: CodegenError) -> Error {
        Error::Codegen(err)
    }
}

fn run(args: &Args) -> Result<(), Error> {
    let input = std::fs::read_to_string(&args.file)
        .map_err(|e| Error::Io(e, args.file.clone()))?;

    let tokens = tokenize(&input)?;
    if args.lex {
        for token in &tokens {
            println!("{token}");
        }
        return Ok(());
    }

    let program = parse(&tokens)?;
    if args.parse {
        println!("{}", ast::pretty(&program));
        return Ok(());
    }
    if args.symtab {
        let file = args.file.display().to_string();
        let funcs = symtab::build_function_rows(&program);
        println!("{}", symtab::format_func_table(&file, &funcs));
        println!();
        let vars = symtab::build_variable_rows(&program);
        println!("{}", symtab::format_var_table(&file, &vars));
        return Ok(());
    }

    analyze(&program)?;
    if args.sem {
        return Ok(());
    }

    let dump_only = args.dump_blocks || args.dump_blocks_after || args.dump_cfg;

    let tac_lines = emit_tac(&program);
    if args.tac {
        for line in &tac_lines {
            println!("{line}");
        }
        // --tac on its own stops here; with dump flags the core runs too
        if !dump_only {
            return Ok(());
        }
    }
    for (name, lines) in split_functions(&tac_lines) {
        let (linear, headers) = tac_to_linear_ir(&lines);
        let mut f = linear_to_blocks(name, linear);

        if args.dump_blocks {
            println!("{}", dump_blocks(&f, args.dump_cfg));
        }
        optimize_function(&mut f, args.opt_level);
        if args.dump_blocks_after || args.dump_cfg {
            println!("{}", dump_blocks(&f, args.dump_cfg));
        }
        if dump_only {
            continue;
        }

        for header in &headers {
            println!("{header}");
        }
        for line in emit_function(&f, &EmitOptions::default())? {
            println!("{line}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
