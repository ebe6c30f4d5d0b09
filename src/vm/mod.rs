//! The stack-based virtual machine (spec.md §4.5): a switch-dispatched loop
//! over a `Vec<Opcode>` instruction stream, operating on one operand stack
//! shared by every frame on the thread (spec.md §3 "Thread").

pub mod call;
pub mod error;
pub mod frame;
pub mod ops;
pub mod thread;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::compiler::code::CodeObject;
use crate::compiler::opcode::Opcode;
use crate::object::bigint::BigInt;
use crate::object::exception::{Exception, ExceptionKind};
use crate::object::types::{Slot, TypeObject};
use crate::object::value::{
    IterState, ThreadMethod, ThreadStatus, Value, VDict, VFunction, VModule, VObject, VRange, VSlice, VStr, VThread,
};
use crate::vm::frame::{Frame, FrameKind, TryHandler};
use crate::vm::thread::{Thread, GIL_CHECK_INTERVAL, MAX_CALL_DEPTH};

/// Runs the module-level `CodeObject` to completion and returns whatever its
/// implicit trailing `ret` produced (always `none` unless an explicit `ret`
/// fires early, e.g. from a REPL line compiled as a bare expression).
pub fn run_module(thread: &mut Thread, code: Rc<CodeObject>, module: Arc<RefCell<VModule>>) -> Result<Value, Exception> {
    let base = thread.frames.len();
    thread.frames.push(Frame::new_module(code, module, thread.stack.len()));
    run(thread, base)
}

/// Calls a script or native function value with already-evaluated
/// arguments, driving the VM loop until it returns. Used by native code that
/// needs to invoke back into the language (e.g. none yet, but the iterator
/// protocol's `init` convention in `call_type` below relies on exactly this).
pub fn call_value(thread: &mut Thread, callee: Value, args: Vec<Value>) -> Result<Value, Exception> {
    let base = thread.frames.len();
    dispatch_call(thread, callee, args)?;
    if thread.frames.len() > base {
        // A script function was pushed; let it (and anything it calls) run
        // to completion before returning its result.
        run(thread, base)
    } else {
        // A native call already pushed its single result value directly.
        Ok(thread.pop())
    }
}

/// The dispatch loop: executes frames until the thread's frame stack is back
/// down to `base` frames, then returns the value left on the operand stack.
fn run(thread: &mut Thread, base: usize) -> Result<Value, Exception> {
    loop {
        if thread.frames.len() <= base {
            return Ok(thread.stack.pop().unwrap_or(Value::None));
        }
        let op = {
            let frame = thread.frames.last().expect("checked above");
            frame.code.code[frame.pc as usize]
        };
        thread.frames.last_mut().unwrap().pc += 1;

        thread.ops_since_yield += 1;
        if thread.ops_since_yield >= GIL_CHECK_INTERVAL {
            thread.runtime.gil.yield_point();
            thread.ops_since_yield = 0;
        }

        if let Err(exc) = execute(thread, op) {
            thread.exc.raise(exc);
        }

        if thread.exc.is_pending() {
            if !propagate(thread, base) {
                return Err(thread.exc.take().expect("is_pending implies Some"));
            }
        }
    }
}

/// Unwinds frames down to the innermost active `try` handler (spec.md §4.5
/// "Exception propagation"). Returns `false` once the exception has escaped
/// every frame down to (and including) `base`, meaning the caller of `run`
/// must surface it.
fn propagate(thread: &mut Thread, base: usize) -> bool {
    while thread.frames.len() > base {
        let frame = thread.frames.last_mut().expect("loop guard");
        if let Some(TryHandler { target, stack_depth }) = frame.try_handlers.pop() {
            thread.stack.truncate(stack_depth);
            frame.pc = target;
            return true;
        }
        thread.frames.pop();
        // A popped frame's locals (and anything the stack held above its
        // base) go with it; only the exception itself survives.
        let new_top = thread.frames.last().map(|f| f.stack_base).unwrap_or(base_stack_floor(thread, base));
        thread.stack.truncate(new_top.min(thread.stack.len()));
    }
    false
}

fn base_stack_floor(_thread: &Thread, _base: usize) -> usize {
    0
}

fn execute(thread: &mut Thread, op: Opcode) -> Result<(), Exception> {
    match op {
        Opcode::Nop => {}
        Opcode::PushConst(idx) => {
            let v = current_code(thread).consts[idx as usize].clone();
            thread.push(v);
        }
        Opcode::Pop => {
            thread.pop();
        }
        Opcode::Dup => {
            let v = thread.peek().clone();
            thread.push(v);
        }
        Opcode::Swap => {
            let len = thread.stack.len();
            thread.stack.swap(len - 1, len - 2);
        }
        Opcode::DupTopN(n) => {
            let n = n as usize;
            let len = thread.stack.len();
            for i in 0..n {
                thread.push(thread.stack[len - n + i].clone());
            }
        }
        Opcode::LoadName(idx) => {
            let name = const_str(thread, idx);
            match thread.load_name(&name) {
                Some(v) => thread.push(v),
                None => return Err(thread.name_error(&name)),
            }
        }
        Opcode::StoreName(idx) => {
            let name = const_str(thread, idx);
            let v = thread.peek().clone();
            thread.frames.last().unwrap().scope.set(Rc::from(name.as_str()), v);
        }
        Opcode::GetAttr(idx) => {
            let name = const_str(thread, idx);
            let target = thread.pop();
            let v = get_attr(thread, &target, &name)?;
            thread.push(v);
        }
        Opcode::SetAttr(idx) => {
            let name = const_str(thread, idx);
            let value = thread.pop();
            let target = thread.pop();
            set_attr(thread, &target, &name, value.clone())?;
            thread.push(value);
        }
        Opcode::DelAttr(idx) => {
            let name = const_str(thread, idx);
            let target = thread.pop();
            del_attr(&target, &name)?;
        }
        Opcode::GetItem(n) => {
            let idxs = thread.popn(n as usize);
            let target = thread.pop();
            let key = combine_keys(idxs);
            let v = get_item(thread, &target, &key)?;
            thread.push(v);
        }
        Opcode::SetItem(n) => {
            let value = thread.pop();
            let idxs = thread.popn(n as usize);
            let target = thread.pop();
            let key = combine_keys(idxs);
            set_item(thread, &target, &key, value.clone())?;
            thread.push(value);
        }
        Opcode::BuildSlice => {
            let step = thread.pop();
            let stop = thread.pop();
            let start = thread.pop();
            thread.push(Value::Slice(Rc::new(VSlice {
                start: none_to_option(start),
                stop: none_to_option(stop),
                step: none_to_option(step),
            })));
        }
        Opcode::BuildList(n) => {
            let items = thread.popn(n as usize);
            thread.push(Value::list(items));
        }
        Opcode::BuildTuple(n) => {
            let items = thread.popn(n as usize);
            thread.push(Value::tuple(items));
        }
        Opcode::BuildSet(n) => {
            let items = thread.popn(n as usize);
            let mut set = Vec::with_capacity(items.len());
            for v in items {
                if !set.contains(&v) {
                    set.push(v);
                }
            }
            thread.push(Value::Set(Rc::new(RefCell::new(set))));
        }
        Opcode::BuildDict(n) => {
            let flat = thread.popn(2 * n as usize);
            let mut dict = VDict::new();
            for pair in flat.chunks(2) {
                dict.set(pair[0].clone(), pair[1].clone());
            }
            thread.push(Value::Dict(Rc::new(RefCell::new(dict))));
        }
        Opcode::UnpackSequence(n) => {
            let seq = thread.pop();
            let items = sequence_items(&seq)?;
            if items.len() != n as usize {
                return Err(Exception::new(
                    ExceptionKind::ValueError,
                    format!("expected {n} values to unpack, got {}", items.len()),
                ));
            }
            for v in items {
                thread.push(v);
            }
        }
        Opcode::MakeFunction(code_idx) => {
            let code = current_code(thread).consts[code_idx as usize].clone();
            let Value::Code(code) = code else { unreachable!("MakeFunction operand is always a Code constant") };
            let n_defaults = code.params.iter().filter(|p| p.has_default).count();
            let defaults = thread.popn(n_defaults);
            thread.push(Value::Function(Rc::new(VFunction {
                code,
                defaults,
                module: thread.current_module(),
            })));
        }
        Opcode::MakeType(code_idx) => {
            let code = current_code(thread).consts[code_idx as usize].clone();
            let Value::Code(code) = code else { unreachable!("MakeType operand is always a Code constant") };
            let base_val = thread.pop();
            let base = match base_val {
                Value::None => None,
                Value::Type(t) => Some(t),
                other => {
                    return Err(Exception::new(
                        ExceptionKind::TypeError,
                        format!("type base must be a type or none, got {}", other.type_name()),
                    ))
                }
            };
            let name = Rc::clone(&code.name);
            let module = thread.current_module();
            let stack_base = thread.stack.len();
            thread.frames.push(Frame::new_class_body(code, module, stack_base, base, name));
        }
        Opcode::MakeEnum(n) => {
            let names = thread.popn(n as usize);
            let mut ty = TypeObject::new("<enum>", None);
            for nv in &names {
                if let Value::Str(s) = nv {
                    ty.attrs.borrow_mut().insert(Rc::from(s.as_str()), nv.clone());
                }
            }
            thread.push(Value::Type(Rc::new(ty)));
        }
        Opcode::Call(n) => {
            let mut vals = thread.popn(n as usize);
            let callee = vals.remove(0);
            dispatch_call(thread, callee, vals)?;
        }
        Opcode::BinOp(k) => {
            let b = thread.pop();
            let a = thread.pop();
            let v = ops::binary(thread, k, &a, &b)?;
            thread.push(v);
        }
        Opcode::UnOp(k) => {
            let a = thread.pop();
            let v = ops::unary(thread, k, &a)?;
            thread.push(v);
        }
        Opcode::Jump(target) => {
            thread.frames.last_mut().unwrap().pc = target;
        }
        Opcode::JumpIfTrue(target) => {
            if thread.pop().truthy() {
                thread.frames.last_mut().unwrap().pc = target;
            }
        }
        Opcode::JumpIfFalse(target) => {
            if !thread.pop().truthy() {
                thread.frames.last_mut().unwrap().pc = target;
            }
        }
        Opcode::JumpIfTruePeek(target) => {
            if thread.peek().truthy() {
                thread.frames.last_mut().unwrap().pc = target;
            }
        }
        Opcode::JumpIfFalsePeek(target) => {
            if !thread.peek().truthy() {
                thread.frames.last_mut().unwrap().pc = target;
            }
        }
        Opcode::JumpIfNotNonePeek(target) => {
            if !matches!(thread.peek(), Value::None) {
                thread.frames.last_mut().unwrap().pc = target;
            }
        }
        Opcode::GetIter => {
            let v = thread.pop();
            let iter = make_iter(&v)?;
            thread.push(Value::Iter(Rc::new(RefCell::new(iter))));
        }
        Opcode::ForNext(target) => {
            let iter_val = thread.peek().clone();
            let Value::Iter(state) = iter_val else { unreachable!("GetIter always pushes Value::Iter") };
            match iter_next(&state) {
                Some(v) => thread.push(v),
                None => {
                    thread.pop();
                    thread.frames.last_mut().unwrap().pc = target;
                }
            }
        }
        Opcode::Ret => {
            let frame = thread.frames.pop().expect("ret with no active frame");
            if let FrameKind::ClassBody { base, name } = &frame.kind {
                thread.stack.pop();
                let attrs = frame.take_locals();
                let mut ty = TypeObject::new(Rc::clone(name), base.clone());
                ty.has_attr_dict = true;
                *ty.attrs.borrow_mut() = attrs;
                thread.push(Value::Type(Rc::new(ty)));
            }
        }
        Opcode::Throw => {
            let v = thread.pop();
            match v {
                Value::Exception(e) => return Err((*e).clone()),
                other => {
                    return Err(Exception::new(
                        ExceptionKind::TypeError,
                        format!("can only throw an exception, got {}", other.type_name()),
                    ))
                }
            }
        }
        Opcode::Assert => {
            let msg = thread.pop();
            let cond = thread.pop();
            if !cond.truthy() {
                let text = match msg {
                    Value::None => "assertion failed".to_string(),
                    Value::Str(s) => s.as_str().to_string(),
                    other => format!("{}", other.type_name()),
                };
                return Err(Exception::new(ExceptionKind::AssertError, text));
            }
        }
        Opcode::PushTryBlock(target) => {
            let depth = thread.stack.len();
            thread.frames.last_mut().unwrap().try_handlers.push(TryHandler { target, stack_depth: depth });
        }
        Opcode::PopTryBlock => {
            thread.frames.last_mut().unwrap().try_handlers.pop();
        }
        Opcode::MatchExc { kind_const, else_target } => {
            let names = match &current_code(thread).consts[kind_const as usize] {
                Value::Str(s) => vec![s.as_str().to_string()],
                Value::Tuple(t) => t
                    .iter()
                    .filter_map(|v| if let Value::Str(s) = v { Some(s.as_str().to_string()) } else { None })
                    .collect(),
                _ => Vec::new(),
            };
            let pending_kind = thread.exc.peek().map(|e| e.kind);
            let matched = pending_kind.is_some_and(|k| names.iter().any(|n| ExceptionKind::from_name(n).is_some_and(|target_kind| k.is_a(target_kind))));
            if !matched {
                thread.frames.last_mut().unwrap().pc = else_target;
            }
        }
        Opcode::MatchAny => {}
        Opcode::BindExc(idx) => {
            let name = const_str(thread, idx);
            let exc = thread.exc.take().expect("BindExc only reached with a pending exception");
            thread.frames.last().unwrap().scope.set(Rc::from(name.as_str()), Value::Exception(Rc::new(exc)));
        }
        Opcode::ClearExc => {
            thread.exc.take();
        }
        Opcode::Import(idx) => {
            let path = const_str(thread, idx);
            let v = import_module(thread, &path)?;
            thread.push(v);
        }
        Opcode::FinallyEnd => {
            if thread.exc.is_pending() {
                return Err(thread.exc.take().expect("is_pending implies Some"));
            }
        }
    }
    Ok(())
}

fn current_code(thread: &Thread) -> Rc<CodeObject> {
    Rc::clone(&thread.frames.last().expect("no active frame").code)
}

fn const_str(thread: &Thread, idx: u32) -> String {
    match &current_code(thread).consts[idx as usize] {
        Value::Str(s) => s.as_str().to_string(),
        other => unreachable!("name-table operand must be a Str constant, got {other:?}"),
    }
}

fn none_to_option(v: Value) -> Option<Box<Value>> {
    match v {
        Value::None => None,
        other => Some(Box::new(other)),
    }
}

fn combine_keys(mut idxs: Vec<Value>) -> Value {
    if idxs.len() == 1 {
        idxs.pop().unwrap()
    } else {
        Value::tuple(idxs)
    }
}

fn sequence_items(v: &Value) -> Result<Vec<Value>, Exception> {
    match v {
        Value::List(l) => Ok(l.borrow().clone()),
        Value::Tuple(t) => Ok((**t).clone()),
        other => Err(Exception::new(
            ExceptionKind::ValueError,
            format!("cannot unpack a {}", other.type_name()),
        )),
    }
}

// ---- attribute protocol ---------------------------------------------------

fn get_attr(thread: &mut Thread, target: &Value, name: &str) -> Result<Value, Exception> {
    match target {
        Value::Object(o) => {
            if let Some(v) = o.attrs.borrow().get(name) {
                return Ok(v.clone());
            }
            if let Some(v) = find_type_attr(&o.ty, name) {
                return Ok(match v {
                    Value::Function(f) => Value::BoundMethod(Box::new(target.clone()), f),
                    other => other,
                });
            }
            if o.ty.has_binary(Slot::GetAttr) {
                return o.ty.dispatch_binary(thread, Slot::GetAttr, target, &Value::str(name), "str");
            }
            Err(attribute_error(target, name))
        }
        Value::Module(m) => m.borrow().attrs.get(name).cloned().ok_or_else(|| attribute_error(target, name)),
        Value::Type(t) => find_type_attr(t, name).ok_or_else(|| attribute_error(target, name)),
        Value::Exception(e) => match name {
            "message" => Ok(Value::str(e.message.clone())),
            "kind" => Ok(Value::str(e.kind.name())),
            "cause" => Ok(e.cause.as_ref().map(|c| Value::Exception(Rc::clone(c))).unwrap_or(Value::None)),
            _ => Err(attribute_error(target, name)),
        },
        Value::Thread(handle) => match name {
            "start" => Ok(Value::ThreadMethod(Rc::clone(handle), ThreadMethod::Start)),
            "join" => Ok(Value::ThreadMethod(Rc::clone(handle), ThreadMethod::Join)),
            _ => Err(attribute_error(target, name)),
        },
        _ => Err(attribute_error(target, name)),
    }
}

fn find_type_attr(ty: &Rc<TypeObject>, name: &str) -> Option<Value> {
    let mut cur = Some(Rc::clone(ty));
    while let Some(t) = cur {
        if let Some(v) = t.attrs.borrow().get(name) {
            return Some(v.clone());
        }
        cur = t.base.clone();
    }
    None
}

fn attribute_error(target: &Value, name: &str) -> Exception {
    Exception::new(
        ExceptionKind::KeyError,
        format!("'{}' object has no attribute '{name}'", target.type_name()),
    )
}

fn set_attr(thread: &mut Thread, target: &Value, name: &str, value: Value) -> Result<(), Exception> {
    match target {
        Value::Object(o) => {
            if o.ty.has_call(Slot::SetAttr) {
                o.ty.dispatch_call(thread, Slot::SetAttr, target, &[Value::str(name), value])?;
            } else {
                o.attrs.borrow_mut().insert(Rc::from(name), value);
            }
            Ok(())
        }
        Value::Module(m) => {
            m.borrow_mut().attrs.insert(Rc::from(name), value);
            Ok(())
        }
        Value::Type(t) => {
            t.attrs.borrow_mut().insert(Rc::from(name), value);
            Ok(())
        }
        _ => Err(attribute_error(target, name)),
    }
}

fn del_attr(target: &Value, name: &str) -> Result<(), Exception> {
    match target {
        Value::Object(o) => {
            o.attrs.borrow_mut().remove(name);
            Ok(())
        }
        Value::Module(m) => {
            m.borrow_mut().attrs.remove(name);
            Ok(())
        }
        _ => Err(attribute_error(target, name)),
    }
}

// ---- item / slicing protocol ----------------------------------------------

fn normalize_index(i: &BigInt, len: usize) -> Result<usize, Exception> {
    let raw = i.to_i64().ok_or_else(|| Exception::new(ExceptionKind::IndexError, "index out of range"))?;
    let idx = if raw < 0 { raw + len as i64 } else { raw };
    if idx < 0 || idx >= len as i64 {
        return Err(Exception::new(ExceptionKind::IndexError, format!("index {raw} out of range")));
    }
    Ok(idx as usize)
}

fn value_to_i64(v: &Value) -> Result<i64, Exception> {
    match v {
        Value::Int(i) => i.to_i64().ok_or_else(|| Exception::new(ExceptionKind::ValueError, "slice index too large")),
        other => Err(Exception::new(ExceptionKind::TypeError, format!("slice indices must be int, got {}", other.type_name()))),
    }
}

/// Python-style slice resolution: out-of-range bounds clamp rather than
/// error, matching kscript's own `nx_slice` behavior
/// (`original_source/src/types/str.c`).
fn slice_indices(slice: &VSlice, len: usize) -> Result<(i64, i64, i64), Exception> {
    let step = match &slice.step {
        Some(v) => value_to_i64(v)?,
        None => 1,
    };
    if step == 0 {
        return Err(Exception::new(ExceptionKind::ValueError, "slice step cannot be zero"));
    }
    let len_i = len as i64;
    // Forward slices clamp into [0, len]; reverse slices clamp into [-1, len - 1]
    // so an explicit negative `stop` can still mean "run off the front".
    let clamp = |raw: i64, low: i64, high: i64| -> i64 {
        let v = if raw < 0 { raw + len_i } else { raw };
        v.clamp(low, high)
    };
    let (default_start, default_stop) = if step > 0 { (0, len_i) } else { (len_i - 1, -1) };
    let (lo, hi) = if step > 0 { (0, len_i) } else { (-1, len_i - 1) };
    let start = match &slice.start {
        Some(v) => clamp(value_to_i64(v)?, lo, hi),
        None => default_start,
    };
    let stop = match &slice.stop {
        Some(v) => clamp(value_to_i64(v)?, lo, hi),
        None => default_stop,
    };
    Ok((start, stop, step))
}

fn slice_collect(items: &[Value], slice: &VSlice) -> Result<Vec<Value>, Exception> {
    let (start, stop, step) = slice_indices(slice, items.len())?;
    let mut out = Vec::new();
    if step > 0 {
        let mut i = start;
        while i < stop {
            if i >= 0 && (i as usize) < items.len() {
                out.push(items[i as usize].clone());
            }
            i += step;
        }
    } else {
        let mut i = start;
        while i > stop {
            if i >= 0 && (i as usize) < items.len() {
                out.push(items[i as usize].clone());
            }
            i += step;
        }
    }
    Ok(out)
}

fn get_item(thread: &mut Thread, target: &Value, key: &Value) -> Result<Value, Exception> {
    match target {
        Value::List(l) => {
            let items = l.borrow();
            match key {
                Value::Int(i) => Ok(items[normalize_index(i, items.len())?].clone()),
                Value::Slice(s) => Ok(Value::list(slice_collect(&items, s)?)),
                _ => Err(index_type_error(key)),
            }
        }
        Value::Tuple(t) => match key {
            Value::Int(i) => Ok(t[normalize_index(i, t.len())?].clone()),
            Value::Slice(s) => Ok(Value::tuple(slice_collect(t, s)?)),
            _ => Err(index_type_error(key)),
        },
        Value::Str(s) => match key {
            Value::Int(i) => {
                let chars: Vec<char> = s.as_str().chars().collect();
                let idx = normalize_index(i, chars.len())?;
                Ok(Value::Str(VStr::new(chars[idx].to_string())))
            }
            Value::Slice(sl) => {
                let chars: Vec<char> = s.as_str().chars().collect();
                let items: Vec<Value> = chars.iter().map(|c| Value::Str(VStr::new(c.to_string()))).collect();
                let picked = slice_collect(&items, sl)?;
                let mut out = String::new();
                for v in picked {
                    if let Value::Str(s) = v {
                        out.push_str(s.as_str());
                    }
                }
                Ok(Value::Str(VStr::new(out)))
            }
            _ => Err(index_type_error(key)),
        },
        Value::Dict(d) => d.borrow().get(key).cloned().ok_or_else(|| {
            Exception::new(ExceptionKind::KeyError, format!("key not found: {}", key.type_name()))
        }),
        Value::Range(r) => match key {
            Value::Int(i) => {
                let len = range_len(r);
                let idx = normalize_index(i, len)? as i64;
                Ok(Value::int(r.start + idx * r.step))
            }
            _ => Err(index_type_error(key)),
        },
        Value::Object(o) => o.ty.dispatch_binary(thread, Slot::GetItem, target, key, key.type_name()),
        _ => Err(Exception::new(ExceptionKind::TypeError, format!("'{}' is not subscriptable", target.type_name()))),
    }
}

fn index_type_error(key: &Value) -> Exception {
    Exception::new(ExceptionKind::TypeError, format!("indices must be int or slice, got {}", key.type_name()))
}

fn range_len(r: &VRange) -> usize {
    if r.step == 0 {
        return 0;
    }
    let span = r.stop - r.start;
    if (r.step > 0 && span <= 0) || (r.step < 0 && span >= 0) {
        0
    } else {
        ((span.abs() + r.step.abs() - 1) / r.step.abs()) as usize
    }
}

fn set_item(thread: &mut Thread, target: &Value, key: &Value, value: Value) -> Result<(), Exception> {
    match target {
        Value::List(l) => match key {
            Value::Int(i) => {
                let mut items = l.borrow_mut();
                let idx = normalize_index(i, items.len())?;
                items[idx] = value;
                Ok(())
            }
            _ => Err(index_type_error(key)),
        },
        Value::Dict(d) => {
            d.borrow_mut().set(key.clone(), value);
            Ok(())
        }
        Value::Object(o) => {
            o.ty.dispatch_call(thread, Slot::SetItem, target, &[key.clone(), value])?;
            Ok(())
        }
        _ => Err(Exception::new(ExceptionKind::TypeError, format!("'{}' does not support item assignment", target.type_name()))),
    }
}

// ---- iterator protocol (spec.md §4.5 "GetIter"/"ForNext") -----------------

fn make_iter(v: &Value) -> Result<IterState, Exception> {
    match v {
        Value::List(l) => Ok(IterState::List(Rc::clone(l), 0)),
        Value::Tuple(t) => Ok(IterState::Tuple(Rc::clone(t), 0)),
        Value::Str(s) => Ok(IterState::Str(Rc::clone(s), 0)),
        Value::Range(r) => Ok(IterState::Range { cur: r.start, stop: r.stop, step: r.step }),
        Value::Dict(d) => Ok(IterState::DictKeys(Rc::clone(d), 0)),
        Value::Set(s) => Ok(IterState::Set(Rc::clone(s), 0)),
        other => Err(Exception::new(ExceptionKind::TypeError, format!("'{}' is not iterable", other.type_name()))),
    }
}

fn iter_next(state: &Rc<RefCell<IterState>>) -> Option<Value> {
    let mut s = state.borrow_mut();
    match &mut *s {
        IterState::List(l, i) => {
            let items = l.borrow();
            if *i < items.len() {
                let v = items[*i].clone();
                *i += 1;
                Some(v)
            } else {
                None
            }
        }
        IterState::Tuple(t, i) => {
            if *i < t.len() {
                let v = t[*i].clone();
                *i += 1;
                Some(v)
            } else {
                None
            }
        }
        IterState::Str(text, i) => {
            let c = text.as_str().chars().nth(*i)?;
            *i += 1;
            Some(Value::Str(VStr::new(c.to_string())))
        }
        IterState::Range { cur, stop, step } => {
            if (*step > 0 && *cur < *stop) || (*step < 0 && *cur > *stop) {
                let v = *cur;
                *cur += *step;
                Some(Value::int(v))
            } else {
                None
            }
        }
        IterState::DictKeys(d, i) => {
            let dict = d.borrow();
            if *i < dict.entries.len() {
                let v = dict.entries[*i].0.clone();
                *i += 1;
                Some(v)
            } else {
                None
            }
        }
        IterState::Set(set, i) => {
            let items = set.borrow();
            if *i < items.len() {
                let v = items[*i].clone();
                *i += 1;
                Some(v)
            } else {
                None
            }
        }
    }
}

// ---- calls & construction --------------------------------------------------

fn dispatch_call(thread: &mut Thread, callee: Value, args: Vec<Value>) -> Result<(), Exception> {
    match callee {
        Value::NativeFunction(nf) => {
            let v = (nf.func)(thread, &args)?;
            thread.push(v);
            Ok(())
        }
        Value::Function(f) => {
            if thread.frames.len() >= MAX_CALL_DEPTH {
                return Err(Exception::new(ExceptionKind::InternalError, "maximum recursion depth exceeded"));
            }
            let locals = call::bind_args(&f, &args)?;
            let stack_base = thread.stack.len();
            thread.frames.push(Frame::new_call(Rc::clone(&f.code), locals, Arc::clone(&f.module), stack_base));
            Ok(())
        }
        Value::BoundMethod(receiver, f) => {
            if thread.frames.len() >= MAX_CALL_DEPTH {
                return Err(Exception::new(ExceptionKind::InternalError, "maximum recursion depth exceeded"));
            }
            let mut full_args = Vec::with_capacity(args.len() + 1);
            full_args.push(*receiver);
            full_args.extend(args);
            let locals = call::bind_args(&f, &full_args)?;
            let stack_base = thread.stack.len();
            thread.frames.push(Frame::new_call(Rc::clone(&f.code), locals, Arc::clone(&f.module), stack_base));
            Ok(())
        }
        Value::Type(ty) => {
            let v = call_type(thread, &ty, &args)?;
            thread.push(v);
            Ok(())
        }
        Value::Object(o) if o.ty.has_call(Slot::Call) => {
            let v = o.ty.dispatch_call(thread, Slot::Call, &Value::Object(Rc::clone(&o)), &args)?;
            thread.push(v);
            Ok(())
        }
        Value::ThreadMethod(handle, ThreadMethod::Start) => {
            let v = thread_start(thread, &handle)?;
            thread.push(v);
            Ok(())
        }
        Value::ThreadMethod(handle, ThreadMethod::Join) => {
            let v = thread_join(&handle)?;
            thread.push(v);
            Ok(())
        }
        other => Err(Exception::new(ExceptionKind::TypeError, format!("'{}' object is not callable", other.type_name()))),
    }
}

/// Constructs an instance of `ty`. A type with a native `Construct` slot
/// (every built-in exception kind, see `runtime::builtins`) is asked to
/// build the value directly; a script `type` definition instead gets the
/// generic user-object path: allocate an attribute dictionary and, if the
/// type (or a base) defines an `init` method, call it as `init(self, *args)`
/// and discard its result (spec.md's Open Question on C-callable argument
/// parsing / user constructor naming, resolved in DESIGN.md).
fn call_type(thread: &mut Thread, ty: &Rc<TypeObject>, args: &[Value]) -> Result<Value, Exception> {
    if ty.has_call(Slot::Construct) {
        return ty.dispatch_call(thread, Slot::Construct, &Value::Type(Rc::clone(ty)), args);
    }
    let obj = Rc::new(VObject {
        ty: Rc::clone(ty),
        attrs: RefCell::new(std::collections::HashMap::new()),
    });
    let instance = Value::Object(Rc::clone(&obj));
    if let Some(init) = find_type_attr(ty, "init") {
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(instance.clone());
        call_args.extend_from_slice(args);
        call_value(thread, init, call_args)?;
    }
    Ok(instance)
}

/// `thread.start()` (spec.md §5 "Thread lifecycle"): runs the bound
/// callable to completion on the calling OS thread (see `VThread`'s doc
/// comment for why this crate cannot spawn a real one) and records the
/// outcome. A raised exception is logged here, not propagated to the
/// caller of `start` or `join` — "exceptions raised in a worker terminate
/// that worker and are logged".
fn thread_start(thread: &mut Thread, handle: &Rc<VThread>) -> Result<Value, Exception> {
    let (callable, call_args) = match &mut *handle.status.borrow_mut() {
        ThreadStatus::Pending { callable, args } => {
            let callable = std::mem::replace(callable, Value::None);
            let args = std::mem::take(args);
            (callable, args)
        }
        ThreadStatus::Running | ThreadStatus::Finished(_) => {
            return Err(Exception::new(ExceptionKind::ValueError, "thread already started"));
        }
    };
    *handle.status.borrow_mut() = ThreadStatus::Running;
    let result = call_value(thread, callable, call_args);
    if let Err(exc) = &result {
        log::error!("thread worker raised: {}: {}", exc.kind.name(), exc.message);
    }
    *handle.status.borrow_mut() = ThreadStatus::Finished(result);
    Ok(Value::None)
}

/// `thread.join()`: blocks (cooperatively — see `thread_start`) until the
/// worker has run, returning its result, or `none` if it raised.
fn thread_join(handle: &Rc<VThread>) -> Result<Value, Exception> {
    match &*handle.status.borrow() {
        ThreadStatus::Finished(Ok(v)) => Ok(v.clone()),
        ThreadStatus::Finished(Err(_)) => Ok(Value::None),
        ThreadStatus::Pending { .. } | ThreadStatus::Running => {
            Err(Exception::new(ExceptionKind::ValueError, "join() called before the thread was started"))
        }
    }
}

fn import_module(thread: &Thread, path: &str) -> Result<Value, Exception> {
    if path == "builtins" {
        return Ok(Value::Module(Arc::new(RefCell::new(VModule {
            name: Rc::from("builtins"),
            attrs: thread.runtime.builtins.borrow().attrs.clone(),
        }))));
    }
    Err(Exception::new(ExceptionKind::OSError, format!("no module named '{path}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    fn run_src(src: &str) -> Value {
        let program = crate::parser::parse(src).expect("parse");
        let code = crate::compiler::compile_program(&program, "<test>", src).expect("compile");
        let runtime = Rc::new(Runtime::new());
        let module = Arc::new(RefCell::new(VModule { name: Rc::from("<test>"), attrs: Default::default() }));
        let mut thread = Thread::new(runtime);
        run_module(&mut thread, Rc::new(code), module).expect("run")
    }

    #[test]
    fn arithmetic_end_to_end() {
        assert_eq!(run_src("ret 1 + 2 * 3;"), Value::int(7));
    }

    #[test]
    fn assignment_and_reuse() {
        assert_eq!(run_src("x = 10; ret x * x;"), Value::int(100));
    }

    #[test]
    fn for_loop_builds_string() {
        let v = run_src("s = ''; for i in [1, 2, 3] { s = s + str(i); } ret s;");
        assert_eq!(v, Value::str("123"));
    }

    #[test]
    fn try_catch_recovers() {
        let v = run_src("try { throw Exception('bad'); } catch e { ret 'got'; }");
        assert_eq!(v, Value::str("got"));
    }

    #[test]
    fn recursive_fibonacci() {
        let src = "func fib(n) { if n < 2 { ret n; } ret fib(n - 1) + fib(n - 2); } ret fib(10);";
        assert_eq!(run_src(src), Value::int(55));
    }

    #[test]
    fn chained_comparison() {
        assert_eq!(run_src("ret 1 < 2 < 3;"), Value::Bool(true));
        assert_eq!(run_src("ret 1 < 2 < 1;"), Value::Bool(false));
    }

    #[test]
    fn empty_program_returns_none() {
        assert_eq!(run_src(""), Value::None);
    }

    #[test]
    fn finally_runs_then_reraises_unmatched_exception() {
        let program = crate::parser::parse("try { throw ValueError('x'); } catch TypeError as e { } finally { y = 1; }").expect("parse");
        let code = crate::compiler::compile_program(&program, "<test>", "").expect("compile");
        let runtime = Rc::new(Runtime::new());
        let module = Arc::new(RefCell::new(VModule { name: Rc::from("<test>"), attrs: Default::default() }));
        let mut thread = Thread::new(runtime);
        let err = run_module(&mut thread, Rc::new(code), module).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::ValueError);
    }
}
