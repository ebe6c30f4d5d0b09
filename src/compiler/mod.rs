//! The AST-to-bytecode compiler (spec.md §4.4): one depth-first walk per
//! code object, emitting onto a flat instruction vector while tracking
//! operand-stack depth so every statement lands back where it started.
//!
//! The walk is a single recursive `compile_node`, not separate
//! statement/expression passes: the AST already distinguishes the two
//! shapes (an `ExprStmt` wrapper marks a bare expression used as a
//! statement), so one function handles both, popping where the grammar
//! calls for a statement and leaving a value where it calls for an
//! expression. Every expression-shaped node leaves exactly one value on the
//! stack; every statement-shaped node leaves the stack exactly as it found
//! it — the two invariants this module must never break.

pub mod code;
pub mod error;
pub mod opcode;

use std::rc::Rc;

use crate::ast::{CatchClause, Constant, Node, OpKind, Param};
use crate::compiler::code::{CodeObject, CodeParam, ConstPool, MetaEntry, ParamKind};
use crate::compiler::error::CompileError;
use crate::compiler::opcode::Opcode;
use crate::lexer::token::Span;
use crate::object::bigint::BigInt;
use crate::object::value::Value;

const PLACEHOLDER: u32 = u32::MAX;

struct LoopCtx {
    /// Where `cont` jumps: the condition re-check for `while`, the
    /// `ForNext` instruction for `for`.
    continue_target: u32,
    /// Positions of `Jump` instructions emitted for `break`, patched once
    /// the loop's end (past any `else` clause) is known.
    break_jumps: Vec<usize>,
    /// How many `open_trys` existed when the loop was entered; `break`/
    /// `cont` only unwind handlers opened after that point.
    trys_at_entry: usize,
    /// `for` loops keep their `Value::Iter` live on the operand stack
    /// between `GetIter` and the exhaustion branch of `ForNext`, which
    /// normally pops it; a `break` skips that pop, so it must drop the
    /// iterator itself before jumping out (`while` loops own nothing on
    /// the stack between iterations).
    owns_iterator: bool,
}

/// A `try` block currently being compiled into, tracked so `break`/`cont`/
/// `ret` reached from inside it can pop the handler and replay the
/// `finally` body before actually leaving.
struct OpenTry {
    finally: Option<Node>,
}

struct Compiler {
    filename: Rc<str>,
    source: Rc<str>,
    consts: ConstPool,
    code: Vec<Opcode>,
    meta: Vec<MetaEntry>,
    depth: i64,
    max_stack: usize,
    loops: Vec<LoopCtx>,
    open_trys: Vec<OpenTry>,
    none_idx: Option<u32>,
    temp_counter: u32,
}

impl Compiler {
    fn new(filename: Rc<str>, source: Rc<str>) -> Self {
        Compiler {
            filename,
            source,
            consts: ConstPool::new(),
            code: Vec::new(),
            meta: Vec::new(),
            depth: 0,
            max_stack: 0,
            loops: Vec::new(),
            open_trys: Vec::new(),
            none_idx: None,
            temp_counter: 0,
        }
    }

    fn here(&self) -> u32 {
        self.code.len() as u32
    }

    /// Appends `op`, recording `span` and applying `delta` to the tracked
    /// stack depth. `delta` is the instruction's own net effect, not a
    /// running total.
    fn emit(&mut self, op: Opcode, span: Span, delta: i64) -> usize {
        let pos = self.code.len();
        self.code.push(op);
        self.meta.push(MetaEntry { offset: pos as u32, span });
        self.depth += delta;
        if self.depth > 0 {
            self.max_stack = self.max_stack.max(self.depth as usize);
        }
        pos
    }

    fn patch(&mut self, pos: usize, target: u32) {
        self.code[pos] = match self.code[pos] {
            Opcode::Jump(_) => Opcode::Jump(target),
            Opcode::JumpIfTrue(_) => Opcode::JumpIfTrue(target),
            Opcode::JumpIfFalse(_) => Opcode::JumpIfFalse(target),
            Opcode::JumpIfTruePeek(_) => Opcode::JumpIfTruePeek(target),
            Opcode::JumpIfFalsePeek(_) => Opcode::JumpIfFalsePeek(target),
            Opcode::JumpIfNotNonePeek(_) => Opcode::JumpIfNotNonePeek(target),
            Opcode::ForNext(_) => Opcode::ForNext(target),
            Opcode::PushTryBlock(_) => Opcode::PushTryBlock(target),
            Opcode::MatchExc { kind_const, .. } => Opcode::MatchExc { kind_const, else_target: target },
            other => panic!("patch() called on non-jump opcode {other:?}"),
        };
    }

    fn none_const(&mut self) -> u32 {
        if let Some(i) = self.none_idx {
            return i;
        }
        let i = self.consts.intern(Value::None);
        self.none_idx = Some(i);
        i
    }

    fn fresh_temp(&mut self) -> Rc<str> {
        let n = self.temp_counter;
        self.temp_counter += 1;
        Rc::from(format!("$t{n}"))
    }

    fn push_none(&mut self, span: Span) {
        let idx = self.none_const();
        self.emit(Opcode::PushConst(idx), span, 1);
    }

    fn intern_str(&mut self, s: &str) -> u32 {
        self.consts.intern(Value::str(s.to_string()))
    }

    // ---- expressions (leave exactly one value) -------------------------

    fn compile_expr(&mut self, node: &Node) -> Result<(), CompileError> {
        self.compile_node(node)
    }

    fn compile_opt_expr(&mut self, node: &Option<Box<Node>>, span: Span) -> Result<(), CompileError> {
        match node {
            Some(n) => self.compile_expr(n),
            None => {
                self.push_none(span);
                Ok(())
            }
        }
    }

    fn literal_value(&mut self, c: &Constant, span: Span) -> Result<Value, CompileError> {
        Ok(match c {
            Constant::None => Value::None,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int { text, radix } => {
                let digits: String = text.chars().filter(|c| *c != '_').collect();
                let v = BigInt::from_str_radix(&digits, *radix).ok_or_else(|| CompileError::InvalidLiteral {
                    span,
                    message: format!("malformed integer literal: {text}"),
                })?;
                Value::Int(v)
            }
            Constant::Float { text, imaginary } => {
                let digits: String = text.chars().filter(|c| *c != '_').collect();
                let f: f64 = digits.parse().map_err(|_| CompileError::InvalidLiteral {
                    span,
                    message: format!("malformed float literal: {text}"),
                })?;
                if *imaginary {
                    Value::Complex(0.0, f)
                } else {
                    Value::Float(f)
                }
            }
            Constant::Str(s) => Value::str(s.to_string()),
            Constant::Regex(pattern) => {
                let re = regex::Regex::new(pattern)
                    .map_err(|e| CompileError::InvalidRegex { span, message: e.to_string() })?;
                Value::Regex(Rc::new(re))
            }
        })
    }

    fn compile_node(&mut self, node: &Node) -> Result<(), CompileError> {
        match node {
            Node::Constant(c, span) => {
                let v = self.literal_value(c, *span)?;
                let idx = self.consts.intern(v);
                self.emit(Opcode::PushConst(idx), *span, 1);
            }
            Node::Name(name, span) => {
                let idx = self.intern_str(name);
                self.emit(Opcode::LoadName(idx), *span, 1);
            }
            Node::Attribute { target, name, span } => {
                self.compile_expr(target)?;
                let idx = self.intern_str(name);
                self.emit(Opcode::GetAttr(idx), *span, 0);
            }
            Node::Element { target, indices, span } => {
                self.compile_expr(target)?;
                for ix in indices {
                    self.compile_expr(ix)?;
                }
                self.emit(Opcode::GetItem(indices.len() as u32), *span, -(indices.len() as i64));
            }
            Node::Call { callee, args, span } => {
                self.compile_expr(callee)?;
                for a in args {
                    self.compile_expr(a)?;
                }
                let n = (args.len() + 1) as u32;
                self.emit(Opcode::Call(n), *span, -(n as i64) + 1);
            }
            Node::Slice { start, stop, step, span } => {
                self.compile_opt_expr(start, *span)?;
                self.compile_opt_expr(stop, *span)?;
                self.compile_opt_expr(step, *span)?;
                self.emit(Opcode::BuildSlice, *span, -2);
            }
            Node::List(items, span) => self.compile_sequence_build(items, *span, Opcode::BuildList(items.len() as u32))?,
            Node::Tuple(items, span) => self.compile_sequence_build(items, *span, Opcode::BuildTuple(items.len() as u32))?,
            Node::SetLit(items, span) => self.compile_sequence_build(items, *span, Opcode::BuildSet(items.len() as u32))?,
            Node::DictLit(pairs, span) => {
                for (k, v) in pairs {
                    self.compile_expr(k)?;
                    self.compile_expr(v)?;
                }
                let n = pairs.len() as u32;
                self.emit(Opcode::BuildDict(n), *span, -(2 * n as i64) + 1);
            }
            Node::BinaryOp { op, left, right, span } => self.compile_binary_op(*op, left, right, *span)?,
            Node::UnaryOp { op, operand, span } => {
                self.compile_expr(operand)?;
                self.emit(Opcode::UnOp(*op), *span, 0);
            }
            Node::RichCompare { ops, operands, span } => self.compile_rich_compare(ops, operands, *span)?,
            Node::Conditional { cond, then_branch, else_branch, span } => {
                self.compile_expr(cond)?;
                let to_else = self.emit(Opcode::JumpIfFalse(PLACEHOLDER), *span, -1);
                self.compile_expr(then_branch)?;
                let to_end = self.emit(Opcode::Jump(PLACEHOLDER), *span, 0);
                let else_start = self.here();
                self.patch(to_else, else_start);
                self.compile_expr(else_branch)?;
                let end = self.here();
                self.patch(to_end, end);
            }
            Node::Assign { target, op, value, span } => self.compile_assign(target, *op, value, *span)?,

            Node::ExprStmt(inner, span) => {
                self.compile_expr(inner)?;
                self.emit(Opcode::Pop, *span, -1);
            }
            Node::Block(stmts, _) => {
                for s in stmts {
                    self.compile_node(s)?;
                }
            }
            Node::If { cond, then_branch, else_branch, span } => {
                self.compile_expr(cond)?;
                let to_else = self.emit(Opcode::JumpIfFalse(PLACEHOLDER), *span, -1);
                self.compile_node(then_branch)?;
                match else_branch {
                    Some(else_node) => {
                        let to_end = self.emit(Opcode::Jump(PLACEHOLDER), *span, 0);
                        let else_start = self.here();
                        self.patch(to_else, else_start);
                        self.compile_node(else_node)?;
                        let end = self.here();
                        self.patch(to_end, end);
                    }
                    None => {
                        let end = self.here();
                        self.patch(to_else, end);
                    }
                }
            }
            Node::While { cond, body, else_branch, span } => self.compile_while(cond, body, else_branch, *span)?,
            Node::For { target, iter, body, else_branch, span } => {
                self.compile_for(target, iter, body, else_branch, *span)?
            }
            Node::Try { body, catches, finally, span } => self.compile_try(body, catches, finally, *span)?,

            Node::Ret(value, span) => {
                match value {
                    Some(v) => self.compile_expr(v)?,
                    None => self.push_none(*span),
                }
                self.unwind_trys(0, *span);
                self.emit(Opcode::Ret, *span, -1);
            }
            Node::Throw(value, span) => {
                self.compile_expr(value)?;
                self.emit(Opcode::Throw, *span, -1);
            }
            Node::Assert(cond, msg, span) => {
                self.compile_expr(cond)?;
                self.compile_opt_expr(msg, *span)?;
                self.emit(Opcode::Assert, *span, -2);
            }
            Node::Break(span) => {
                if self.loops.is_empty() {
                    return Err(CompileError::BreakOutsideLoop { span: *span });
                }
                let trys_at_entry = self.loops.last().unwrap().trys_at_entry;
                let owns_iterator = self.loops.last().unwrap().owns_iterator;
                self.unwind_trys(trys_at_entry, *span);
                if owns_iterator {
                    self.emit(Opcode::Pop, *span, -1);
                }
                let pos = self.emit(Opcode::Jump(PLACEHOLDER), *span, 0);
                self.loops.last_mut().unwrap().break_jumps.push(pos);
            }
            Node::Cont(span) => {
                if self.loops.is_empty() {
                    return Err(CompileError::ContOutsideLoop { span: *span });
                }
                let ctx_trys = self.loops.last().unwrap().trys_at_entry;
                let target = self.loops.last().unwrap().continue_target;
                self.unwind_trys(ctx_trys, *span);
                self.emit(Opcode::Jump(target), *span, 0);
            }
            Node::Import(path, alias, span) => {
                let path_idx = self.intern_str(path);
                self.emit(Opcode::Import(path_idx), *span, 1);
                let bound = (*alias).clone().unwrap_or_else(|| {
                    let last = path.rsplit('.').next().unwrap_or(path.as_ref());
                    Rc::from(last)
                });
                let name_idx = self.intern_str(&bound);
                self.emit(Opcode::StoreName(name_idx), *span, 0);
                self.emit(Opcode::Pop, *span, -1);
            }
            Node::FuncDef { name, params, body, docstring, span } => {
                self.compile_funcdef(name, params, body, docstring.as_deref(), *span)?;
            }
            Node::TypeDef { name, base, body, span } => {
                self.compile_typedef(name, base, body, *span)?;
            }
            Node::EnumDef { name, variants, span } => {
                for v in variants {
                    let idx = self.intern_str(v);
                    self.emit(Opcode::PushConst(idx), *span, 1);
                }
                let n = variants.len() as u32;
                self.emit(Opcode::MakeEnum(n), *span, -(n as i64) + 1);
                let name_idx = self.intern_str(name);
                self.emit(Opcode::StoreName(name_idx), *span, 0);
                self.emit(Opcode::Pop, *span, -1);
            }
            Node::Program(stmts, _) => {
                for s in stmts {
                    self.compile_node(s)?;
                }
            }
        }
        Ok(())
    }

    fn compile_sequence_build(&mut self, items: &[Node], span: Span, op: Opcode) -> Result<(), CompileError> {
        for it in items {
            self.compile_expr(it)?;
        }
        let n = items.len() as i64;
        self.emit(op, span, -n + 1);
        Ok(())
    }

    fn compile_binary_op(&mut self, op: OpKind, left: &Node, right: &Node, span: Span) -> Result<(), CompileError> {
        match op {
            OpKind::AndAnd => self.compile_short_circuit(left, right, span, Opcode::JumpIfFalsePeek(PLACEHOLDER)),
            OpKind::OrOr => self.compile_short_circuit(left, right, span, Opcode::JumpIfTruePeek(PLACEHOLDER)),
            OpKind::QuesQues => self.compile_short_circuit(left, right, span, Opcode::JumpIfNotNonePeek(PLACEHOLDER)),
            _ => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(Opcode::BinOp(op), span, -1);
                Ok(())
            }
        }
    }

    fn compile_short_circuit(&mut self, left: &Node, right: &Node, span: Span, branch: Opcode) -> Result<(), CompileError> {
        self.compile_expr(left)?;
        let pos = self.emit(branch, span, 0);
        // Falls through here only on the "keep evaluating" path: pop the
        // probe value, then the right operand takes its place.
        self.emit(Opcode::Pop, span, -1);
        self.compile_expr(right)?;
        let end = self.here();
        self.patch(pos, end);
        Ok(())
    }

    /// `a OP1 b OP2 c ...`: each comparison is evaluated once, short-circuit
    /// on the first falsy result, stashing operands in synthetic locals
    /// (names unreachable from source syntax) so no operand but the first
    /// and last is evaluated twice.
    fn compile_rich_compare(&mut self, ops: &[OpKind], operands: &[Node], span: Span) -> Result<(), CompileError> {
        let mut prev = self.fresh_temp();
        self.compile_expr(&operands[0])?;
        {
            let idx = self.intern_str(&prev);
            self.emit(Opcode::StoreName(idx), span, 0);
        }
        self.emit(Opcode::Pop, span, -1);

        let mut end_jumps = Vec::new();
        for (i, op) in ops.iter().enumerate() {
            self.compile_expr(&operands[i + 1])?;
            let is_last = i == ops.len() - 1;
            let cur = if is_last {
                None
            } else {
                let t = self.fresh_temp();
                let idx = self.intern_str(&t);
                self.emit(Opcode::StoreName(idx), span, 0);
                Some(t)
            };
            let prev_idx = self.intern_str(&prev);
            self.emit(Opcode::LoadName(prev_idx), span, 1);
            self.emit(Opcode::Swap, span, 0);
            self.emit(Opcode::BinOp(*op), span, -1);
            if !is_last {
                let pos = self.emit(Opcode::JumpIfFalsePeek(PLACEHOLDER), span, 0);
                self.emit(Opcode::Pop, span, -1);
                end_jumps.push(pos);
                prev = cur.unwrap();
            }
        }
        let end = self.here();
        for pos in end_jumps {
            self.patch(pos, end);
        }
        Ok(())
    }

    fn compile_while(
        &mut self,
        cond: &Node,
        body: &Node,
        else_branch: &Option<Box<Node>>,
        span: Span,
    ) -> Result<(), CompileError> {
        let loop_top = self.here();
        self.loops.push(LoopCtx {
            continue_target: loop_top,
            break_jumps: Vec::new(),
            trys_at_entry: self.open_trys.len(),
            owns_iterator: false,
        });
        self.compile_expr(cond)?;
        let to_normal_exit = self.emit(Opcode::JumpIfFalse(PLACEHOLDER), span, -1);
        self.compile_node(body)?;
        self.emit(Opcode::Jump(loop_top), span, 0);
        let normal_exit = self.here();
        self.patch(to_normal_exit, normal_exit);
        if let Some(e) = else_branch {
            self.compile_node(e)?;
        }
        let end = self.here();
        let ctx = self.loops.pop().unwrap();
        for pos in ctx.break_jumps {
            self.patch(pos, end);
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        target: &Rc<str>,
        iter: &Node,
        body: &Node,
        else_branch: &Option<Box<Node>>,
        span: Span,
    ) -> Result<(), CompileError> {
        self.compile_expr(iter)?;
        self.emit(Opcode::GetIter, span, 0);
        let for_next_pos_placeholder = self.here();
        self.loops.push(LoopCtx {
            continue_target: for_next_pos_placeholder,
            break_jumps: Vec::new(),
            trys_at_entry: self.open_trys.len(),
            owns_iterator: true,
        });
        let for_next = self.emit(Opcode::ForNext(PLACEHOLDER), span, 1);
        let target_idx = self.intern_str(target);
        self.emit(Opcode::StoreName(target_idx), span, 0);
        self.emit(Opcode::Pop, span, -1);
        self.compile_node(body)?;
        self.emit(Opcode::Jump(for_next as u32), span, 0);
        let exhausted = self.here();
        self.patch(for_next, exhausted);
        if let Some(e) = else_branch {
            self.compile_node(e)?;
        }
        let end = self.here();
        let ctx = self.loops.pop().unwrap();
        for pos in ctx.break_jumps {
            self.patch(pos, end);
        }
        Ok(())
    }

    /// Pops (and re-runs the `finally` body of) every open `try` from the
    /// innermost down to, but not including, index `from`. Used by
    /// `break`/`cont` (bounded to the loop's own entry depth) and `ret`
    /// (unbounded — `from == 0`).
    fn unwind_trys(&mut self, from: usize, span: Span) {
        let mut i = self.open_trys.len();
        while i > from {
            i -= 1;
            self.emit(Opcode::PopTryBlock, span, 0);
            if let Some(finally) = self.open_trys[i].finally.clone() {
                // compile_node never fails on a body already accepted once;
                // a second pass over an already-validated finally block
                // cannot introduce a new assignment-target or loop error.
                let _ = self.compile_node(&finally);
            }
        }
    }

    fn compile_try(
        &mut self,
        body: &Node,
        catches: &[CatchClause],
        finally: &Option<Box<Node>>,
        span: Span,
    ) -> Result<(), CompileError> {
        let try_start = self.emit(Opcode::PushTryBlock(PLACEHOLDER), span, 0);
        self.open_trys.push(OpenTry { finally: finally.as_deref().cloned() });
        self.compile_node(body)?;
        self.open_trys.pop();
        self.emit(Opcode::PopTryBlock, span, 0);
        let skip_catches = self.emit(Opcode::Jump(PLACEHOLDER), span, 0);

        let catch_region = self.here();
        self.patch(try_start, catch_region);

        let mut to_finally = Vec::new();
        let mut prev_mismatch: Option<usize> = None;
        for clause in catches {
            if let Some(pos) = prev_mismatch.take() {
                let here = self.here();
                self.patch(pos, here);
            }
            match clause.exc_types.first() {
                None => {
                    self.emit(Opcode::MatchAny, span, 0);
                }
                Some(ty_node) => {
                    let names = catch_type_names(ty_node)?;
                    let kind_value = if names.len() == 1 {
                        Value::str(names.into_iter().next().unwrap())
                    } else {
                        Value::tuple(names.into_iter().map(|n| Value::str(n)).collect())
                    };
                    let kind_const = self.consts.intern(kind_value);
                    let pos = self.emit(Opcode::MatchExc { kind_const, else_target: PLACEHOLDER }, span, 0);
                    prev_mismatch = Some(pos);
                }
            }
            match &clause.binding {
                Some(name) => {
                    let idx = self.intern_str(name);
                    self.emit(Opcode::BindExc(idx), span, 0);
                }
                None => {
                    self.emit(Opcode::ClearExc, span, 0);
                }
            }
            self.compile_node(&clause.body)?;
            let jp = self.emit(Opcode::Jump(PLACEHOLDER), span, 0);
            to_finally.push(jp);
        }
        // An unmatched last clause (or no clauses at all, for a bare
        // `try { } finally { }`) falls straight into `finally` with the
        // exception still pending; it propagates once `finally` finishes.
        if let Some(pos) = prev_mismatch {
            let here = self.here();
            self.patch(pos, here);
        }

        let finally_start = self.here();
        self.patch(skip_catches, finally_start);
        for pos in to_finally {
            self.patch(pos, finally_start);
        }
        if let Some(f) = finally {
            self.compile_node(f)?;
        }
        self.emit(Opcode::FinallyEnd, span, 0);
        Ok(())
    }

    fn compile_assign(&mut self, target: &Node, op: Option<OpKind>, value: &Node, span: Span) -> Result<(), CompileError> {
        match target {
            Node::Name(name, _) => {
                let idx = self.intern_str(name);
                if let Some(binop) = op {
                    self.emit(Opcode::LoadName(idx), span, 1);
                    self.compile_expr(value)?;
                    self.emit(Opcode::BinOp(binop), span, -1);
                } else {
                    self.compile_expr(value)?;
                }
                self.emit(Opcode::StoreName(idx), span, 0);
            }
            Node::Attribute { target: obj, name, .. } => {
                self.compile_expr(obj)?;
                let idx = self.intern_str(name);
                if let Some(binop) = op {
                    self.emit(Opcode::Dup, span, 1);
                    self.emit(Opcode::GetAttr(idx), span, 0);
                    self.compile_expr(value)?;
                    self.emit(Opcode::BinOp(binop), span, -1);
                } else {
                    self.compile_expr(value)?;
                }
                self.emit(Opcode::SetAttr(idx), span, -1);
            }
            Node::Element { target: obj, indices, .. } => {
                self.compile_expr(obj)?;
                for ix in indices {
                    self.compile_expr(ix)?;
                }
                let n = indices.len() as u32;
                if let Some(binop) = op {
                    self.emit(Opcode::DupTopN(n + 1), span, (n + 1) as i64);
                    self.emit(Opcode::GetItem(n), span, -(n as i64));
                    self.compile_expr(value)?;
                    self.emit(Opcode::BinOp(binop), span, -1);
                } else {
                    self.compile_expr(value)?;
                }
                self.emit(Opcode::SetItem(n), span, -(n as i64 + 1));
            }
            Node::Tuple(items, tspan) => {
                if op.is_some() {
                    return Err(CompileError::InvalidAssignmentTarget { span });
                }
                for it in items {
                    if !matches!(it, Node::Name(..)) {
                        return Err(CompileError::InvalidAssignmentTarget { span: it.span() });
                    }
                }
                self.compile_expr(value)?;
                self.emit(Opcode::Dup, *tspan, 1);
                let n = items.len() as u32;
                self.emit(Opcode::UnpackSequence(n), *tspan, n as i64 - 1);
                for it in items.iter().rev() {
                    if let Node::Name(name, _) = it {
                        let idx = self.intern_str(name);
                        self.emit(Opcode::StoreName(idx), *tspan, 0);
                        self.emit(Opcode::Pop, *tspan, -1);
                    }
                }
            }
            _ => return Err(CompileError::InvalidAssignmentTarget { span }),
        }
        Ok(())
    }

    fn compile_funcdef(
        &mut self,
        name: &Rc<str>,
        params: &[Param],
        body: &Node,
        docstring: Option<&str>,
        span: Span,
    ) -> Result<(), CompileError> {
        let sub = compile_code_object(name, params, body, docstring, Rc::clone(&self.filename), Rc::clone(&self.source))?;
        let code_idx = self.consts.intern(Value::Code(Rc::new(sub)));
        let mut n_defaults = 0i64;
        for p in params {
            if let Some(default) = &p.default {
                self.compile_expr(default)?;
                n_defaults += 1;
            }
        }
        self.emit(Opcode::MakeFunction(code_idx), span, -n_defaults + 1);
        let name_idx = self.intern_str(name);
        self.emit(Opcode::StoreName(name_idx), span, 0);
        self.emit(Opcode::Pop, span, -1);
        Ok(())
    }

    fn compile_typedef(&mut self, name: &Rc<str>, base: &Option<Box<Node>>, body: &Node, span: Span) -> Result<(), CompileError> {
        match base {
            Some(b) => self.compile_expr(b)?,
            None => self.push_none(span),
        }
        let sub = compile_code_object(name, &[], body, None, Rc::clone(&self.filename), Rc::clone(&self.source))?;
        let code_idx = self.consts.intern(Value::Code(Rc::new(sub)));
        self.emit(Opcode::MakeType(code_idx), span, 0);
        let name_idx = self.intern_str(name);
        self.emit(Opcode::StoreName(name_idx), span, 0);
        self.emit(Opcode::Pop, span, -1);
        Ok(())
    }
}

/// A `catch` clause's type position is either a bare name (`catch
/// ValueError as e`) or a parenthesized tuple of names (`catch (TypeError,
/// ValueError) as e`); anything else is rejected at compile time.
fn catch_type_names(node: &Node) -> Result<Vec<String>, CompileError> {
    match node {
        Node::Name(n, _) => Ok(vec![n.to_string()]),
        Node::Tuple(items, _) => items
            .iter()
            .map(|it| match it {
                Node::Name(n, _) => Ok(n.to_string()),
                other => Err(CompileError::InvalidCatchType { span: other.span() }),
            })
            .collect(),
        other => Err(CompileError::InvalidCatchType { span: other.span() }),
    }
}

/// Compiles a function or class body (or the top-level program, with no
/// params) into its own independent `CodeObject`. A trailing `push none;
/// ret` is appended unconditionally (spec.md §4.4): any earlier explicit
/// `ret` already transferred control away, so the tail is only ever
/// reached by falling off the end.
fn compile_code_object(
    name: &str,
    params: &[Param],
    body: &Node,
    docstring: Option<&str>,
    filename: Rc<str>,
    source: Rc<str>,
) -> Result<CodeObject, CompileError> {
    let mut c = Compiler::new(filename, source);
    c.compile_node(body)?;
    let end_span = body.span();
    c.push_none(end_span);
    c.emit(Opcode::Ret, end_span, -1);

    let code_params = params
        .iter()
        .map(|p| CodeParam {
            name: Rc::clone(&p.name),
            kind: if p.variadic { ParamKind::Variadic } else { ParamKind::Positional },
            has_default: p.default.is_some(),
        })
        .collect();

    Ok(CodeObject {
        name: Rc::from(name),
        filename: c.filename,
        source: c.source,
        consts: c.consts.into_values(),
        code: c.code,
        meta: c.meta,
        params: code_params,
        num_locals: 0,
        local_names: Vec::new(),
        docstring: docstring.map(Rc::from),
        max_stack: c.max_stack,
    })
}

/// Compiles a whole program (a module's top-level statements) into its
/// `CodeObject`. Executed by the VM with a frame whose locals dictionary
/// *is* the module's globals (spec.md §3 "Frame"), so assignments at this
/// level land directly in the module namespace rather than a private
/// locals dict.
pub fn compile_program(program: &Node, filename: &str, source: &str) -> Result<CodeObject, CompileError> {
    compile_code_object("<module>", &[], program, None, Rc::from(filename), Rc::from(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn compile_src(src: &str) -> CodeObject {
        let program = parse(src).expect("parse");
        compile_program(&program, "<test>", src).expect("compile")
    }

    #[test]
    fn arithmetic_expression_statement_balances_stack() {
        let code = compile_src("1 + 2 * 3;");
        assert!(code.code.iter().any(|op| matches!(op, Opcode::BinOp(OpKind::Mul))));
        assert!(code.code.iter().any(|op| matches!(op, Opcode::BinOp(OpKind::Add))));
        assert!(matches!(code.code.last(), Some(Opcode::Ret)));
    }

    #[test]
    fn name_assignment_compiles_to_store_name() {
        let code = compile_src("x = 10; ret x * x;");
        assert!(code.code.iter().any(|op| matches!(op, Opcode::StoreName(_))));
        assert!(code.code.iter().any(|op| matches!(op, Opcode::LoadName(_))));
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let program = parse("break;").expect("parse");
        let err = compile_program(&program, "<test>", "break;").unwrap_err();
        assert!(matches!(err, CompileError::BreakOutsideLoop { .. }));
    }

    #[test]
    fn cont_outside_loop_is_rejected() {
        let program = parse("cont;").expect("parse");
        let err = compile_program(&program, "<test>", "cont;").unwrap_err();
        assert!(matches!(err, CompileError::ContOutsideLoop { .. }));
    }

    #[test]
    fn invalid_assignment_target_is_rejected() {
        let program = parse("1 + 1 = 2;").expect("parse");
        let err = compile_program(&program, "<test>", "1 + 1 = 2;").unwrap_err();
        assert!(matches!(err, CompileError::InvalidAssignmentTarget { .. }));
    }

    #[test]
    fn while_loop_emits_backward_jump() {
        let code = compile_src("while x < 10 { x = x + 1; }");
        let has_backward_jump = code.code.iter().enumerate().any(|(i, op)| match op {
            Opcode::Jump(target) => (*target as usize) < i,
            _ => false,
        });
        assert!(has_backward_jump);
    }

    #[test]
    fn for_loop_uses_iterator_protocol() {
        let code = compile_src("for x in xs { }");
        assert!(code.code.iter().any(|op| matches!(op, Opcode::GetIter)));
        assert!(code.code.iter().any(|op| matches!(op, Opcode::ForNext(_))));
    }

    #[test]
    fn try_catch_emits_handler_opcodes() {
        let code = compile_src("try { throw 1; } catch ValueError as e { }");
        assert!(code.code.iter().any(|op| matches!(op, Opcode::PushTryBlock(_))));
        assert!(code.code.iter().any(|op| matches!(op, Opcode::MatchExc { .. })));
        assert!(code.code.iter().any(|op| matches!(op, Opcode::BindExc(_))));
    }

    #[test]
    fn rich_compare_uses_synthetic_temporaries_and_short_circuits() {
        let code = compile_src("ret 1 < 2 < 3;");
        let temp_stores = code
            .consts
            .iter()
            .filter(|v| matches!(v, Value::Str(s) if s.as_str().starts_with("$t")))
            .count();
        assert!(temp_stores >= 2);
        assert!(code.code.iter().any(|op| matches!(op, Opcode::JumpIfFalsePeek(_))));
    }

    #[test]
    fn func_def_appends_trailing_return() {
        let code = compile_src("func f(a) { ret a; }");
        let code_const = code.consts.iter().find_map(|v| match v {
            Value::Code(c) => Some(c.clone()),
            _ => None,
        });
        let inner = code_const.expect("nested code object");
        assert!(matches!(inner.code.last(), Some(Opcode::Ret)));
    }

    #[test]
    fn empty_program_returns_none() {
        let code = compile_src("");
        assert_eq!(code.code.len(), 2);
        assert!(matches!(code.code[0], Opcode::PushConst(_)));
        assert!(matches!(code.code[1], Opcode::Ret));
    }
}
