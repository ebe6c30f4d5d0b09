//! The command-line front end (spec.md §6 "External Interfaces"): run a
//! file, an inline expression or statement string, or drop into a REPL; two
//! debug flags dump the pipeline's intermediate artifacts instead of
//! running them. Grounded in the teacher's own `cli/mod.rs` (clap derive,
//! `anyhow::Result` at the boundary) and `cli/commands/parse.rs` (NO_COLOR
//! check, ANSI error formatting).

use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use crate::object::value::{Value, VModule};
use crate::runtime::{self, Runtime};
use crate::vm;
use crate::vm::error::Error;
use crate::vm::thread::Thread;

#[derive(Parser)]
#[command(name = "vesper")]
#[command(about = "A dynamically typed scripting language", version)]
pub struct Cli {
    /// Script file to run. Omit (with no -e/-c either) to start the REPL.
    file: Option<PathBuf>,

    /// Evaluate a single expression and print its repr.
    #[arg(short = 'e', long = "expr", value_name = "EXPR")]
    expr: Option<String>,

    /// Run a string of source as a program (no implicit printing).
    #[arg(short = 'c', long = "code", value_name = "CODE")]
    code: Option<String>,

    /// Print the parsed AST instead of running the program.
    #[arg(long)]
    dump_ast: bool,

    /// Print the compiled bytecode instead of running the program.
    #[arg(long)]
    dump_bc: bool,

    /// Disable ANSI colors in error output.
    #[arg(long, default_value_t = false)]
    no_color: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let (filename, source): (String, String) = if let Some(expr) = &cli.expr {
        ("<expr>".to_string(), format!("ret {expr};"))
    } else if let Some(code) = &cli.code {
        ("<code>".to_string(), code.clone())
    } else if let Some(path) = &cli.file {
        let source = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        (path.to_string_lossy().to_string(), source)
    } else {
        return repl();
    };

    if cli.dump_ast {
        return dump_ast(&filename, &source, cli.no_color);
    }
    if cli.dump_bc {
        return dump_bc(&filename, &source, cli.no_color);
    }

    match runtime::run_source(&filename, &source) {
        Ok(_) => Ok(()),
        Err(e) => {
            print_error(&filename, &source, &e, cli.no_color);
            std::process::exit(1);
        }
    }
}

fn dump_ast(filename: &str, source: &str, no_color: bool) -> Result<()> {
    match crate::parser::parse(source) {
        Ok(node) => {
            let payload = serde_json::json!({ "file": filename, "ast": format!("{node:#?}") });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Err(e) => {
            print_parse_error(filename, source, &e, no_color);
            std::process::exit(1);
        }
    }
}

fn dump_bc(filename: &str, source: &str, no_color: bool) -> Result<()> {
    let node = match crate::parser::parse(source) {
        Ok(n) => n,
        Err(e) => {
            print_parse_error(filename, source, &e, no_color);
            std::process::exit(1);
        }
    };
    match crate::compiler::compile_program(&node, filename, source) {
        Ok(code) => {
            let consts: Vec<String> = code.consts.iter().map(|v| format!("{v:?}")).collect();
            let instructions: Vec<String> = code.code.iter().map(|op| format!("{op:?}")).collect();
            let payload = serde_json::json!({
                "file": filename,
                "name": code.name.as_ref(),
                "max_stack": code.max_stack,
                "consts": consts,
                "code": instructions,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn print_parse_error(filename: &str, source: &str, e: &crate::parser::ParseError, no_color: bool) {
    eprintln!("{}", color_error(&e.render(filename, source), no_color));
}

fn print_error(filename: &str, source: &str, e: &Error, no_color: bool) {
    let rendered = match e {
        Error::Parse(p) => p.render(filename, source),
        Error::Compile(c) => format!("error: {c}\n  --> {filename}"),
        Error::Uncaught(exc) => format!("Uncaught {exc}"),
    };
    eprintln!("{}", color_error(&rendered, no_color));
}

fn color_error(message: &str, no_color_flag: bool) -> String {
    let no_color_env = std::env::var("NO_COLOR").is_ok();
    if no_color_flag || no_color_env {
        message.to_string()
    } else {
        format!("\x1b[1;31m{message}\x1b[0m")
    }
}

/// A REPL session reuses one module namespace across lines, the way a
/// script's top-level frame would, rather than starting fresh each time
/// (spec.md §6 "REPL").
fn repl() -> Result<()> {
    let runtime = Rc::new(Runtime::new());
    let module = Arc::new(RefCell::new(VModule {
        name: Rc::from("<stdin>"),
        attrs: Default::default(),
    }));
    let stdin = io::stdin();
    let mut line_no = 0u32;
    print!(">>> ");
    io::stdout().flush().ok();
    for line in stdin.lock().lines() {
        let line = line?;
        line_no += 1;
        if line.trim().is_empty() {
            print!(">>> ");
            io::stdout().flush().ok();
            continue;
        }
        let filename = format!("<stdin:{line_no}>");
        match run_repl_line(&runtime, &module, &filename, &line) {
            Ok(Value::None) => {}
            Ok(v) => {
                let mut thread = Thread::new(Rc::clone(&runtime));
                if let Ok(s) = runtime::stringify(&mut thread, &v, true) {
                    println!("{s}");
                }
            }
            Err(e) => print_error(&filename, &line, &e, false),
        }
        print!(">>> ");
        io::stdout().flush().ok();
    }
    println!();
    Ok(())
}

fn run_repl_line(
    runtime: &Rc<Runtime>,
    module: &Arc<RefCell<VModule>>,
    filename: &str,
    line: &str,
) -> Result<Value, Error> {
    let source = format!("ret {line};");
    let program = crate::parser::parse(&source).or_else(|_| crate::parser::parse(line))?;
    let code = crate::compiler::compile_program(&program, filename, line)?;
    let mut thread = Thread::new(Rc::clone(runtime));
    vm::run_module(&mut thread, Rc::new(code), Arc::clone(module)).map_err(Error::Uncaught)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_error_respects_no_color_flag() {
        assert_eq!(color_error("boom", true), "boom");
    }
}
