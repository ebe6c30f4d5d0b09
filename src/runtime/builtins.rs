//! The single external-collaborator module this crate ships (spec.md §1):
//! `print`, `str`, `repr`, `len`, `type`, a constructible `TypeObject` per
//! `ExceptionKind` so script code can `throw Exception('bad')` or `catch
//! ValueError as e`, and the `Thread` type backing spec.md §5's "Thread
//! lifecycle" (create/`start`/`join`). Deliberately thin — see
//! SPEC_FULL.md §1.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::object::exception::{Exception, ExceptionKind};
use crate::object::types::{Slot, TypeObject};
use crate::object::value::{NativeFn, ThreadStatus, VThread, Value, VModule, VNativeFunction, VStr};
use crate::vm::thread::Thread;

fn native(name: &'static str, signature: &'static str, docstring: Option<&'static str>, func: NativeFn) -> Value {
    Value::NativeFunction(Rc::new(VNativeFunction {
        name: Rc::from(name),
        signature: Rc::from(signature),
        docstring: docstring.map(Rc::from),
        func,
    }))
}

/// Builds the `TypeObject` for one exception kind, wired with a native
/// `Construct` slot (spec.md §4.1 "Construct") so `KindName(msg)` produces a
/// `Value::Exception` directly, without going through the generic
/// attribute-dictionary user-object path `vm::call_type` uses for script
/// `type` definitions.
fn exception_type(kind: ExceptionKind, base: Option<Rc<TypeObject>>) -> Rc<TypeObject> {
    let mut ty = TypeObject::new(kind.name(), base);
    ty.slots.set_call(Slot::Construct, construct_exception);
    // `CallSlot` is a bare `fn` pointer (no closures, spec.md §9 DESIGN
    // NOTES "no trait-object slots"), so which kind a given type constructs
    // can't be captured directly; stash it on the type's own attrs instead.
    ty.attrs.borrow_mut().insert(Rc::from("__kind__"), Value::str(kind.name()));
    Rc::new(ty)
}

fn construct_exception(_th: &mut Thread, ty: &Value, args: &[Value]) -> Result<Value, Exception> {
    let Value::Type(ty) = ty else {
        return Err(Exception::new(ExceptionKind::InternalError, "Construct called on a non-type"));
    };
    let kind_name = match ty.attrs.borrow().get("__kind__") {
        Some(Value::Str(s)) => s.as_str().to_string(),
        _ => ty.name.to_string(),
    };
    let kind = ExceptionKind::from_name(&kind_name).unwrap_or(ExceptionKind::Exception);
    let message = match args.first() {
        Some(Value::Str(s)) => s.as_str().to_string(),
        Some(other) => other.type_name().to_string(),
        None => String::new(),
    };
    Ok(Value::Exception(Rc::new(Exception::new(kind, message))))
}

/// All fourteen kinds in `object::exception::ExceptionKind`, wired into the
/// same base chain the kind hierarchy itself describes (`ExceptionKind::base`),
/// so `catch Exception as e` still matches any thrown built-in kind.
fn install_exception_types(attrs: &mut HashMap<Rc<str>, Value>) {
    let mut built: HashMap<ExceptionKind, Rc<TypeObject>> = HashMap::new();
    let order = [
        ExceptionKind::Exception,
        ExceptionKind::NameError,
        ExceptionKind::TypeError,
        ExceptionKind::ValueError,
        ExceptionKind::SyntaxError,
        ExceptionKind::ArithmeticError,
        ExceptionKind::OverflowError,
        ExceptionKind::ZeroDivisionError,
        ExceptionKind::KeyError,
        ExceptionKind::IndexError,
        ExceptionKind::OSError,
        ExceptionKind::PlatformUnsupportedError,
        ExceptionKind::AssertError,
        ExceptionKind::InternalError,
    ];
    for kind in order {
        let base = kind.base().map(|b| Rc::clone(built.get(&b).expect("bases installed before subkinds")));
        let ty = exception_type(kind, base);
        built.insert(kind, Rc::clone(&ty));
        attrs.insert(Rc::from(kind.name()), Value::Type(ty));
    }
}

/// Builds the `Thread` type (spec.md §3 "Thread", §5 "Thread lifecycle"):
/// `Thread(callable, *args)` binds a callable and its arguments; `start`/
/// `join` are fetched as `Value::ThreadMethod`s off the resulting handle
/// (`vm::mod::get_attr`), not ordinary type-attribute methods, since a bare
/// `fn` slot can't carry the specific handle it was fetched from.
fn thread_type() -> Rc<TypeObject> {
    let mut ty = TypeObject::new(Rc::from("Thread"), None);
    ty.slots.set_call(Slot::Construct, construct_thread);
    Rc::new(ty)
}

fn construct_thread(_th: &mut Thread, _ty: &Value, args: &[Value]) -> Result<Value, Exception> {
    let callable = args
        .first()
        .cloned()
        .ok_or_else(|| Exception::new(ExceptionKind::TypeError, "Thread() requires a callable argument"))?;
    let bound_args = args.get(1..).map(<[Value]>::to_vec).unwrap_or_default();
    Ok(Value::Thread(Rc::new(VThread {
        status: RefCell::new(ThreadStatus::Pending { callable, args: bound_args }),
    })))
}

fn fn_print(th: &mut Thread, args: &[Value]) -> Result<Value, Exception> {
    let mut parts = Vec::with_capacity(args.len());
    for a in args {
        parts.push(super::stringify(th, a, false)?);
    }
    println!("{}", parts.join(" "));
    Ok(Value::None)
}

fn fn_str(th: &mut Thread, args: &[Value]) -> Result<Value, Exception> {
    let v = args.first().unwrap_or(&Value::None);
    Ok(Value::Str(VStr::new(super::stringify(th, v, false)?)))
}

fn fn_repr(th: &mut Thread, args: &[Value]) -> Result<Value, Exception> {
    let v = args.first().unwrap_or(&Value::None);
    Ok(Value::Str(VStr::new(super::stringify(th, v, true)?)))
}

fn fn_len(_th: &mut Thread, args: &[Value]) -> Result<Value, Exception> {
    let v = args.first().ok_or_else(|| Exception::new(ExceptionKind::TypeError, "len() takes 1 argument"))?;
    let n = match v {
        Value::Str(s) => s.char_len,
        Value::Bytes(b) => b.borrow().len(),
        Value::List(l) => l.borrow().len(),
        Value::Tuple(t) => t.len(),
        Value::Dict(d) => d.borrow().len(),
        Value::Set(s) => s.borrow().len(),
        other => {
            return Err(Exception::new(
                ExceptionKind::TypeError,
                format!("object of type '{}' has no len()", other.type_name()),
            ))
        }
    };
    Ok(Value::int(n as i64))
}

fn fn_type(_th: &mut Thread, args: &[Value]) -> Result<Value, Exception> {
    let v = args.first().unwrap_or(&Value::None);
    match v {
        Value::Object(o) => Ok(Value::Type(Rc::clone(&o.ty))),
        other => Ok(Value::str(other.type_name())),
    }
}

/// Builds the `builtins` module value: every name visible without an
/// explicit `import`, resolved by `vm::thread::Thread::load_name` as the
/// fallback after locals and module globals (spec.md §4.5 "load").
pub fn install() -> VModule {
    let mut attrs = HashMap::new();
    attrs.insert(Rc::from("print"), native("print", "print(*args)", Some("Writes its arguments, space-separated, to stdout."), fn_print));
    attrs.insert(Rc::from("str"), native("str", "str(value)", Some("The informal string form of a value."), fn_str));
    attrs.insert(Rc::from("repr"), native("repr", "repr(value)", Some("The unambiguous string form of a value."), fn_repr));
    attrs.insert(Rc::from("len"), native("len", "len(value)", Some("The element count of a container."), fn_len));
    attrs.insert(Rc::from("type"), native("type", "type(value)", Some("The dynamic type of a value."), fn_type));
    attrs.insert(Rc::from("Thread"), Value::Type(thread_type()));
    install_exception_types(&mut attrs);
    VModule { name: Rc::from("builtins"), attrs }
}
