//! A single call's execution context (spec.md §3 "Frame"): the code object
//! being run, the program counter, a reference to the locals, and enough to
//! reconstruct a traceback. Frames live on `Thread::frames`; the operand
//! stack itself is thread-wide, not per-frame (spec.md §3 "Thread").

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::compiler::code::CodeObject;
use crate::object::types::TypeObject;
use crate::object::value::{Value, VModule};

/// A `try` handler installed by `PushTryBlock`, popped by `PopTryBlock` or by
/// exception propagation (spec.md §4.5 "Exception propagation").
#[derive(Debug, Clone, Copy)]
pub struct TryHandler {
    pub target: u32,
    pub stack_depth: usize,
}

/// What this frame's return value becomes. Most frames are ordinary calls
/// whose result is pushed to the caller; a class body instead contributes
/// its completed locals to a freshly built `TypeObject` (see
/// `vm::mod`'s handling of `MakeType`).
#[derive(Debug)]
pub enum FrameKind {
    /// The module top-level frame. When it returns, the program is done.
    Module,
    Call,
    ClassBody {
        base: Option<Rc<TypeObject>>,
        name: Rc<str>,
    },
}

/// Where names in this frame resolve. The module frame's locals *are* its
/// globals; a function/class-body frame has a private dict and falls back
/// to the defining module's globals (spec.md §4.5 "load").
#[derive(Debug)]
pub enum Scope {
    Module(Arc<RefCell<VModule>>),
    Local {
        locals: RefCell<HashMap<Rc<str>, Value>>,
        module: Arc<RefCell<VModule>>,
    },
}

impl Scope {
    pub fn module(&self) -> Arc<RefCell<VModule>> {
        match self {
            Scope::Module(m) => Arc::clone(m),
            Scope::Local { module, .. } => Arc::clone(module),
        }
    }

    /// Resolves a name against locals (if any), then the module globals.
    /// The caller is responsible for the final builtins fallback.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self {
            Scope::Module(m) => m.borrow().attrs.get(name).cloned(),
            Scope::Local { locals, module } => {
                if let Some(v) = locals.borrow().get(name) {
                    return Some(v.clone());
                }
                module.borrow().attrs.get(name).cloned()
            }
        }
    }

    /// Binds into the innermost scope: locals for a function/class body,
    /// the module's own globals at the top level.
    pub fn set(&self, name: Rc<str>, value: Value) {
        match self {
            Scope::Module(m) => {
                m.borrow_mut().attrs.insert(name, value);
            }
            Scope::Local { locals, .. } => {
                locals.borrow_mut().insert(name, value);
            }
        }
    }
}

#[derive(Debug)]
pub struct Frame {
    pub code: Rc<CodeObject>,
    pub pc: u32,
    pub scope: Scope,
    /// Operand stack depth when this frame was pushed; a `Ret` leaves
    /// exactly one value above this, which the caller then receives.
    pub stack_base: usize,
    pub try_handlers: Vec<TryHandler>,
    pub kind: FrameKind,
}

impl Frame {
    pub fn new_module(code: Rc<CodeObject>, module: Arc<RefCell<VModule>>, stack_base: usize) -> Self {
        Frame {
            code,
            pc: 0,
            scope: Scope::Module(module),
            stack_base,
            try_handlers: Vec::new(),
            kind: FrameKind::Module,
        }
    }

    pub fn new_call(
        code: Rc<CodeObject>,
        locals: HashMap<Rc<str>, Value>,
        module: Arc<RefCell<VModule>>,
        stack_base: usize,
    ) -> Self {
        Frame {
            code,
            pc: 0,
            scope: Scope::Local {
                locals: RefCell::new(locals),
                module,
            },
            stack_base,
            try_handlers: Vec::new(),
            kind: FrameKind::Call,
        }
    }

    pub fn new_class_body(
        code: Rc<CodeObject>,
        module: Arc<RefCell<VModule>>,
        stack_base: usize,
        base: Option<Rc<TypeObject>>,
        name: Rc<str>,
    ) -> Self {
        Frame {
            code,
            pc: 0,
            scope: Scope::Local {
                locals: RefCell::new(HashMap::new()),
                module,
            },
            stack_base,
            try_handlers: Vec::new(),
            kind: FrameKind::ClassBody { base, name },
        }
    }

    /// A snapshot of this frame's locals, for harvesting a class body into a
    /// `TypeObject`'s attribute map.
    pub fn take_locals(&self) -> HashMap<Rc<str>, Value> {
        match &self.scope {
            Scope::Local { locals, .. } => locals.borrow().clone(),
            Scope::Module(m) => m.borrow().attrs.clone(),
        }
    }
}
