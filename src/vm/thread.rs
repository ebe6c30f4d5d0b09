//! A thread of execution: one operand stack shared by every active frame,
//! plus the exception slot and the bookkeeping the VM loop needs to yield
//! the GIL periodically (spec.md §3 "Thread", §5 "Concurrency").

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::object::exception::{Exception, ExceptionKind, ExceptionSlot};
use crate::object::value::{Value, VModule};
use crate::runtime::Runtime;
use crate::vm::frame::Frame;

/// How many opcodes a thread executes before checking whether it should
/// yield the GIL to another thread (spec.md §5 "Scheduling").
pub const GIL_CHECK_INTERVAL: u32 = 100;

/// Recursion guard: a script calling itself this many frames deep raises
/// rather than overflowing the native Rust stack the VM loop itself runs on.
pub const MAX_CALL_DEPTH: usize = 2000;

pub struct Thread {
    pub stack: Vec<Value>,
    pub frames: Vec<Frame>,
    pub exc: ExceptionSlot,
    pub runtime: Rc<Runtime>,
    pub ops_since_yield: u32,
}

impl Thread {
    pub fn new(runtime: Rc<Runtime>) -> Self {
        Thread {
            stack: Vec::new(),
            frames: Vec::new(),
            exc: ExceptionSlot::new(),
            runtime,
            ops_since_yield: 0,
        }
    }

    pub fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    pub fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    pub fn peek(&self) -> &Value {
        self.stack.last().expect("operand stack underflow")
    }

    pub fn popn(&mut self, n: usize) -> Vec<Value> {
        let at = self.stack.len() - n;
        self.stack.split_off(at)
    }

    pub fn current_module(&self) -> Arc<RefCell<VModule>> {
        self.frames.last().expect("no active frame").scope.module()
    }

    /// Resolution order for a bare name (spec.md §4.5 "load"): locals, then
    /// the defining module's globals, then the shared builtins module.
    pub fn load_name(&self, name: &str) -> Option<Value> {
        let frame = self.frames.last().expect("no active frame");
        if let Some(v) = frame.scope.get(name) {
            return Some(v);
        }
        self.runtime.builtins.borrow().attrs.get(name).cloned()
    }

    pub fn raise(&mut self, exc: Exception) {
        self.exc.raise(exc);
    }

    pub fn type_error(&self, message: impl Into<String>) -> Exception {
        Exception::new(ExceptionKind::TypeError, message)
    }

    pub fn name_error(&self, name: &str) -> Exception {
        Exception::new(ExceptionKind::NameError, format!("name '{name}' is not defined"))
    }
}
