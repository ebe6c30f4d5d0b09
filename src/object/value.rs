//! `Value`: the single polymorphic handle every runtime value is passed
//! around as. Built-in kinds are a tagged enum (spec.md §9 DESIGN NOTES,
//! "Polymorphic dispatch" — collapse common operators into one switch);
//! user-defined instances fall back to `Object`, carrying a `TypeObject`
//! vtable. Reference counting is Rust's own `Rc`; values shared across a
//! thread boundary (module globals, functions) use `Arc` instead, per
//! SPEC_FULL.md §3.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use crate::compiler::code::CodeObject;
use crate::object::bigint::BigInt;
use crate::object::exception::Exception;
use crate::object::types::TypeObject;

pub type VList = Rc<RefCell<Vec<Value>>>;
pub type VTuple = Rc<Vec<Value>>;
pub type VSet = Rc<RefCell<Vec<Value>>>;

#[derive(Debug, Clone)]
pub struct VStr {
    pub data: Arc<str>,
    pub char_len: usize,
    hash: u64,
}

impl VStr {
    pub fn new(data: impl Into<Arc<str>>) -> Rc<Self> {
        let data = data.into();
        let char_len = data.chars().count();
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        data.as_bytes().hash(&mut hasher);
        Rc::new(VStr {
            data,
            char_len,
            hash: hasher.finish(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }
}

#[derive(Debug, Clone)]
pub struct VSlice {
    pub start: Option<Box<Value>>,
    pub stop: Option<Box<Value>>,
    pub step: Option<Box<Value>>,
}

#[derive(Debug, Clone)]
pub struct VRange {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

/// Runtime state of an in-flight `for` loop (spec.md §4.5 "Iteration").
/// Pushed onto the operand stack by `GetIter`, advanced in place by
/// `ForNext`; built-in container kinds are iterated directly rather than
/// through the type-slot dispatch (spec.md §9 "Polymorphic dispatch").
#[derive(Debug)]
pub enum IterState {
    List(VList, usize),
    Tuple(VTuple, usize),
    Str(Rc<VStr>, usize),
    Range { cur: i64, stop: i64, step: i64 },
    DictKeys(Rc<RefCell<VDict>>, usize),
    Set(VSet, usize),
}

pub type VIter = Rc<RefCell<IterState>>;

#[derive(Debug)]
pub struct VDict {
    pub entries: Vec<(Value, Value)>,
}

impl VDict {
    pub fn new() -> Self {
        VDict { entries: Vec::new() }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: Value, value: Value) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A script-defined function: its compiled body plus bound defaults and the
/// defining module's globals, so closures over module state resolve names.
/// Parameter names, arity and docstring all live on `code` itself; this
/// struct only adds what varies per closure instance.
#[derive(Debug)]
pub struct VFunction {
    pub code: Rc<CodeObject>,
    pub defaults: Vec<Value>,
    pub module: Arc<RefCell<VModule>>,
}

pub type NativeFn = fn(&mut crate::vm::thread::Thread, &[Value]) -> Result<Value, Exception>;

/// A C-implemented callable. `signature` is the display/diagnostic string
/// from spec.md §6 (e.g. `"print(*args)"`); native functions in this crate
/// take their arguments as a plain slice and validate arity/types inline
/// rather than through a parsed DSL — see DESIGN.md's Open Question note.
pub struct VNativeFunction {
    pub name: Rc<str>,
    pub signature: Rc<str>,
    pub docstring: Option<Rc<str>>,
    pub func: NativeFn,
}

impl fmt::Debug for VNativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNativeFunction").field("name", &self.name).finish()
    }
}

#[derive(Debug)]
pub struct VModule {
    pub name: Rc<str>,
    pub attrs: HashMap<Rc<str>, Value>,
}

/// A user-defined type instance: an attribute dictionary plus the type that
/// describes it. Types without an attribute offset (spec.md §3) never
/// produce one of these.
#[derive(Debug)]
pub struct VObject {
    pub ty: Rc<TypeObject>,
    pub attrs: RefCell<HashMap<Rc<str>, Value>>,
}

/// Which lifecycle operation a `Thread` method value performs once called
/// (spec.md §5 "Thread lifecycle"). Dunder/method dispatch in this crate is
/// bare `fn` pointers with no closures (spec.md §9 DESIGN NOTES), so the
/// receiver can't be captured inside one; `get_attr` instead hands back this
/// marker paired with the receiver, the same way `BoundMethod` pairs a
/// receiver with a script function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadMethod {
    Start,
    Join,
}

/// A `Thread`'s lifecycle state (spec.md §5 "Thread lifecycle").
#[derive(Debug)]
pub enum ThreadStatus {
    /// Constructed but not yet `start`ed: holds the bound callable and its
    /// arguments.
    Pending { callable: Value, args: Vec<Value> },
    /// `start` has been called and the worker callable is executing.
    Running,
    /// The worker callable returned or raised. A raised exception is logged
    /// at the point `start` observes it (spec.md §5 "Exceptions raised in a
    /// worker terminate that worker and are logged") rather than replayed
    /// through `join`.
    Finished(Result<Value, Exception>),
}

/// A language-level thread handle (spec.md §3 "Thread", §5 "Thread
/// lifecycle": create / `start` / `join`). Every runtime `Value` in this
/// crate is `Rc`/non-atomically refcounted (see `runtime::gil`), so handing
/// a live value graph across a real `std::thread::spawn` boundary would be
/// unsound; `start` instead runs the bound callable cooperatively, to
/// completion, on the calling OS thread, and `join` observes the outcome
/// `start` already recorded. This resolves the Open Question spec.md §9
/// leaves to the implementer; see DESIGN.md.
#[derive(Debug)]
pub struct VThread {
    pub status: RefCell<ThreadStatus>,
}

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Complex(f64, f64),
    Str(Rc<VStr>),
    Bytes(Rc<RefCell<Vec<u8>>>),
    List(VList),
    Tuple(VTuple),
    Dict(Rc<RefCell<VDict>>),
    Set(VSet),
    Slice(Rc<VSlice>),
    Range(Rc<VRange>),
    Regex(Rc<regex::Regex>),
    Function(Rc<VFunction>),
    /// A function fetched off a type (rather than an instance's own attribute
    /// dictionary) with its receiver already pinned, so `obj.method(args)`
    /// calls `method(obj, args)` without the caller re-passing `obj`.
    BoundMethod(Box<Value>, Rc<VFunction>),
    NativeFunction(Rc<VNativeFunction>),
    Exception(Rc<Exception>),
    Code(Rc<CodeObject>),
    Module(Arc<RefCell<VModule>>),
    Type(Rc<TypeObject>),
    Object(Rc<VObject>),
    Iter(VIter),
    Thread(Rc<VThread>),
    /// `thread_value.start`/`.join` fetched off a `Thread` handle, paired
    /// with the receiver (see `ThreadMethod`'s doc comment).
    ThreadMethod(Rc<VThread>, ThreadMethod),
}

impl Value {
    pub fn str(s: impl Into<Arc<str>>) -> Value {
        Value::Str(VStr::new(s))
    }

    pub fn int(v: i64) -> Value {
        Value::Int(BigInt::from_i64(v))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Complex(..) => "complex",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Slice(_) => "slice",
            Value::Range(_) => "range",
            Value::Regex(_) => "regex",
            Value::Function(_) => "func",
            Value::BoundMethod(..) => "func",
            Value::NativeFunction(_) => "func",
            Value::Exception(_) => "Exception",
            Value::Code(_) => "code",
            Value::Module(_) => "module",
            Value::Type(_) => "type",
            Value::Object(obj) => {
                // Leak-free static-ish: types are process-lifetime in practice.
                Box::leak(obj.ty.name.to_string().into_boxed_str())
            }
            Value::Iter(_) => "iterator",
            Value::Thread(_) => "Thread",
            Value::ThreadMethod(..) => "func",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => !i.is_zero(),
            Value::Float(f) => *f != 0.0,
            Value::Complex(re, im) => *re != 0.0 || *im != 0.0,
            Value::Str(s) => !s.data.is_empty(),
            Value::Bytes(b) => !b.borrow().is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) => d.borrow().len() != 0,
            Value::Set(s) => !s.borrow().is_empty(),
            _ => true,
        }
    }

    /// Structural equality for the built-in hashable kinds. User-defined
    /// types dispatch through the VM's equality slot instead; this impl
    /// backs `Dict`/`Set` membership for built-ins only (see DESIGN.md).
    pub fn is_hashable(&self) -> bool {
        matches!(
            self,
            Value::None
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::Str(_)
                | Value::Tuple(_)
        ) && match self {
            Value::Tuple(t) => t.iter().all(Value::is_hashable),
            _ => true,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a.cmp_to(b) == std::cmp::Ordering::Equal,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Complex(a1, a2), Value::Complex(b1, b2)) => a1 == b1 && a2 == b2,
            (Value::Str(a), Value::Str(b)) => a.data == b.data,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Type(a), Value::Type(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::None => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.to_string().hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash.hash(state),
            Value::Tuple(t) => {
                for v in t.iter() {
                    v.hash(state);
                }
            }
            _ => 0u8.hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_common_cases() {
        assert!(!Value::int(0).truthy());
        assert!(Value::int(1).truthy());
        assert!(!Value::str("").truthy());
        assert!(Value::str("x").truthy());
        assert!(!Value::list(vec![]).truthy());
    }

    #[test]
    fn tuples_of_hashables_are_hashable() {
        let t = Value::tuple(vec![Value::int(1), Value::str("a")]);
        assert!(t.is_hashable());
        let t2 = Value::tuple(vec![Value::list(vec![])]);
        assert!(!t2.is_hashable());
    }

    #[test]
    fn int_equality_crosses_small_big_boundary() {
        let small = Value::Int(BigInt::from_i64(5));
        let big = Value::Int(BigInt::from_str_radix("5", 10).unwrap());
        assert_eq!(small, big);
    }
}
