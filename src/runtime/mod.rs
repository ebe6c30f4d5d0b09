//! Everything a running program shares process-wide (spec.md §3 "Runtime"):
//! the builtins module every frame falls back to, and the interpreter lock
//! threads cooperate through. One `Runtime` is built per process and handed
//! to every `Thread` as an `Rc`.

pub mod builtins;
pub mod gil;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::object::exception::Exception;
use crate::object::types::Slot;
use crate::object::value::{Value, VModule};
use crate::runtime::gil::Gil;
use crate::vm;
use crate::vm::error::Error;
use crate::vm::thread::Thread;

pub struct Runtime {
    pub builtins: RefCell<VModule>,
    pub gil: Gil,
}

impl Runtime {
    pub fn new() -> Self {
        Runtime {
            builtins: RefCell::new(builtins::install()),
            gil: Gil::new(),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new()
    }
}

/// The informal (`repr = false`) or unambiguous (`repr = true`) string form
/// of a value (spec.md §4.1 "ToStr"/"ToRepr"). Built-in kinds are formatted
/// directly; a `Value::Object` dispatches through its type's `ToRepr`/`ToStr`
/// slot, falling back to `<TypeName object>` if neither is defined.
pub fn stringify(thread: &mut Thread, v: &Value, repr: bool) -> Result<String, Exception> {
    Ok(match v {
        Value::None => "none".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Complex(re, im) => format!("({re}{}{im}j)", if *im < 0.0 { "" } else { "+" }),
        Value::Str(s) => {
            if repr {
                format!("'{}'", s.as_str().replace('\\', "\\\\").replace('\'', "\\'"))
            } else {
                s.as_str().to_string()
            }
        }
        Value::Bytes(b) => format!("{:?}", b.borrow().as_slice()),
        Value::List(l) => {
            let mut parts = Vec::with_capacity(l.borrow().len());
            for item in l.borrow().iter() {
                parts.push(stringify(thread, item, true)?);
            }
            format!("[{}]", parts.join(", "))
        }
        Value::Tuple(t) => {
            let mut parts = Vec::with_capacity(t.len());
            for item in t.iter() {
                parts.push(stringify(thread, item, true)?);
            }
            if t.len() == 1 {
                format!("({},)", parts[0])
            } else {
                format!("({})", parts.join(", "))
            }
        }
        Value::Dict(d) => {
            let mut parts = Vec::with_capacity(d.borrow().len());
            for (k, v) in d.borrow().entries.iter() {
                parts.push(format!("{}: {}", stringify(thread, k, true)?, stringify(thread, v, true)?));
            }
            format!("{{{}}}", parts.join(", "))
        }
        Value::Set(s) => {
            let mut parts = Vec::with_capacity(s.borrow().len());
            for item in s.borrow().iter() {
                parts.push(stringify(thread, item, true)?);
            }
            format!("{{{}}}", parts.join(", "))
        }
        Value::Slice(s) => format!(
            "slice({}, {}, {})",
            opt_str(thread, &s.start)?,
            opt_str(thread, &s.stop)?,
            opt_str(thread, &s.step)?
        ),
        Value::Range(r) => format!("range({}, {}, {})", r.start, r.stop, r.step),
        Value::Regex(r) => format!("regex({:?})", r.as_str()),
        Value::Function(f) => format!("<func {}>", f.code.name),
        Value::BoundMethod(_, f) => format!("<bound method {}>", f.code.name),
        Value::NativeFunction(f) => format!("<native func {}>", f.name),
        Value::Exception(e) => format!("{}: {}", e.kind.name(), e.message),
        Value::Code(c) => format!("<code {}>", c.name),
        Value::Module(m) => format!("<module {}>", m.borrow().name),
        Value::Type(t) => format!("<type {}>", t.name),
        Value::Object(o) => {
            let slot = if repr { Slot::ToRepr } else { Slot::ToStr };
            if o.ty.has_unary(slot) {
                let r = o.ty.dispatch_unary(thread, slot, v)?;
                match r {
                    Value::Str(s) => s.as_str().to_string(),
                    other => stringify(thread, &other, repr)?,
                }
            } else if !repr && o.ty.has_unary(Slot::ToRepr) {
                stringify(thread, v, true)?
            } else {
                format!("<{} object>", o.ty.name)
            }
        }
        Value::Iter(_) => "<iterator>".to_string(),
        Value::Thread(_) => "<Thread>".to_string(),
        Value::ThreadMethod(..) => "<bound method>".to_string(),
    })
}

fn opt_str(thread: &mut Thread, v: &Option<Box<Value>>) -> Result<String, Exception> {
    match v {
        Some(v) => stringify(thread, v, true),
        None => Ok("none".to_string()),
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if f == f.trunc() && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Parses, compiles and runs a complete program, starting a fresh module
/// namespace. Used by the CLI's file/`-e`/`-c` modes and by integration
/// tests; the REPL instead keeps one `Thread`/module alive across lines (see
/// `cli::repl`).
pub fn run_source(filename: &str, source: &str) -> Result<Value, Error> {
    let program = crate::parser::parse(source)?;
    let code = crate::compiler::compile_program(&program, filename, source)?;
    let runtime = Rc::new(Runtime::new());
    let module = Arc::new(RefCell::new(VModule {
        name: Rc::from(filename),
        attrs: Default::default(),
    }));
    let mut thread = Thread::new(runtime);
    vm::run_module(&mut thread, Rc::new(code), module).map_err(Error::Uncaught)
}

/// Like `run_source`, but reads `path` first. Returns `anyhow::Error` at
/// this boundary rather than `vm::error::Error`: the latter wraps
/// `object::Exception`, which holds `Rc`s and so (by design, see
/// `runtime::gil`) is not `Send`, while `anyhow::Error` requires its source
/// to be; the CLI only needs the rendered message here, not the structured
/// variant.
pub fn run_file(path: &std::path::Path) -> anyhow::Result<Value> {
    let source = std::fs::read_to_string(path)?;
    let filename = path.to_string_lossy().to_string();
    run_source(&filename, &source).map_err(|e| anyhow::anyhow!(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stringify_formats_containers() {
        let runtime = Rc::new(Runtime::new());
        let mut thread = Thread::new(runtime);
        let list = Value::list(vec![Value::int(1), Value::str("x")]);
        let s = stringify(&mut thread, &list, false).unwrap();
        assert_eq!(s, "[1, 'x']");
    }

    #[test]
    fn run_source_evaluates_a_program() {
        let v = run_source("<test>", "ret 2 + 2;").unwrap();
        assert_eq!(v, Value::int(4));
    }
}
