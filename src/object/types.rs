//! The type table: a type is itself a value, carrying a display name, a
//! single base type, and a table of dunder slots. See spec.md §3 "Type" and
//! §4.1 for the closed slot set.

use std::collections::HashMap;
use std::rc::Rc;

use crate::object::exception::{Exception, ExceptionKind};
use crate::object::value::Value;
use crate::vm::thread::Thread;

pub type SlotResult = Result<Value, Exception>;
pub type UnarySlot = fn(&mut Thread, &Value) -> SlotResult;
pub type BinarySlot = fn(&mut Thread, &Value, &Value) -> SlotResult;
pub type CallSlot = fn(&mut Thread, &Value, &[Value]) -> SlotResult;

/// The closed set of dunder slots from spec.md §4.1. Absence of a slot on a
/// type means the operation is unsupported; the caller raises a TypeError
/// naming the operator and the operand type(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Construct,
    Finalize,
    ToBool,
    ToInt,
    ToFloat,
    ToComplex,
    ToBytes,
    ToStr,
    ToRepr,
    Eq,
    Ord,
    Hash,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    MatMul,
    RAdd,
    RSub,
    RMul,
    RDiv,
    RFloorDiv,
    RMod,
    RPow,
    RMatMul,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
    Pos,
    Neg,
    BitNot,
    Len,
    GetItem,
    SetItem,
    Contains,
    Iter,
    Call,
    GetAttr,
    SetAttr,
    DelAttr,
}

#[derive(Default)]
pub struct SlotTable {
    unary: HashMap<Slot, UnarySlot>,
    binary: HashMap<Slot, BinarySlot>,
    call: HashMap<Slot, CallSlot>,
}

impl SlotTable {
    pub fn set_unary(&mut self, slot: Slot, f: UnarySlot) {
        self.unary.insert(slot, f);
    }

    pub fn set_binary(&mut self, slot: Slot, f: BinarySlot) {
        self.binary.insert(slot, f);
    }

    pub fn set_call(&mut self, slot: Slot, f: CallSlot) {
        self.call.insert(slot, f);
    }
}

pub struct TypeObject {
    pub name: Rc<str>,
    pub base: Option<Rc<TypeObject>>,
    pub has_attr_dict: bool,
    pub slots: SlotTable,
    pub attrs: std::cell::RefCell<HashMap<Rc<str>, Value>>,
}

impl TypeObject {
    pub fn new(name: impl Into<Rc<str>>, base: Option<Rc<TypeObject>>) -> Self {
        TypeObject {
            name: name.into(),
            base,
            has_attr_dict: false,
            slots: SlotTable::default(),
            attrs: std::cell::RefCell::new(HashMap::new()),
        }
    }

    /// True if `self` is `other` or a subtype of it, walking the base chain.
    pub fn is_subtype_of(self: &Rc<Self>, other: &Rc<TypeObject>) -> bool {
        let mut cur = Some(Rc::clone(self));
        while let Some(t) = cur {
            if Rc::ptr_eq(&t, other) {
                return true;
            }
            cur = t.base.clone();
        }
        false
    }

    fn find_unary(self: &Rc<Self>, slot: Slot) -> Option<UnarySlot> {
        let mut cur = Some(Rc::clone(self));
        while let Some(t) = cur {
            if let Some(f) = t.slots.unary.get(&slot) {
                return Some(*f);
            }
            cur = t.base.clone();
        }
        None
    }

    fn find_binary(self: &Rc<Self>, slot: Slot) -> Option<BinarySlot> {
        let mut cur = Some(Rc::clone(self));
        while let Some(t) = cur {
            if let Some(f) = t.slots.binary.get(&slot) {
                return Some(*f);
            }
            cur = t.base.clone();
        }
        None
    }

    fn find_call(self: &Rc<Self>, slot: Slot) -> Option<CallSlot> {
        let mut cur = Some(Rc::clone(self));
        while let Some(t) = cur {
            if let Some(f) = t.slots.call.get(&slot) {
                return Some(*f);
            }
            cur = t.base.clone();
        }
        None
    }

    pub fn has_unary(self: &Rc<Self>, slot: Slot) -> bool {
        self.find_unary(slot).is_some()
    }

    pub fn has_binary(self: &Rc<Self>, slot: Slot) -> bool {
        self.find_binary(slot).is_some()
    }

    pub fn has_call(self: &Rc<Self>, slot: Slot) -> bool {
        self.find_call(slot).is_some()
    }

    pub fn dispatch_unary(self: &Rc<Self>, th: &mut Thread, slot: Slot, v: &Value) -> SlotResult {
        match self.find_unary(slot) {
            Some(f) => f(th, v),
            None => Err(unsupported(slot, &[self.name.as_ref()])),
        }
    }

    pub fn dispatch_binary(
        self: &Rc<Self>,
        th: &mut Thread,
        slot: Slot,
        a: &Value,
        b: &Value,
        other_type_name: &str,
    ) -> SlotResult {
        match self.find_binary(slot) {
            Some(f) => f(th, a, b),
            None => Err(unsupported(slot, &[self.name.as_ref(), other_type_name])),
        }
    }

    pub fn dispatch_call(self: &Rc<Self>, th: &mut Thread, slot: Slot, v: &Value, args: &[Value]) -> SlotResult {
        match self.find_call(slot) {
            Some(f) => f(th, v, args),
            None => Err(unsupported(slot, &[self.name.as_ref()])),
        }
    }
}

fn unsupported(slot: Slot, types: &[&str]) -> Exception {
    Exception::new(
        ExceptionKind::TypeError,
        format!("unsupported operand {:?} for type(s): {}", slot, types.join(", ")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtype_walks_base_chain() {
        let root = Rc::new(TypeObject::new("object", None));
        let mid = Rc::new(TypeObject::new("mid", Some(Rc::clone(&root))));
        let leaf = Rc::new(TypeObject::new("leaf", Some(Rc::clone(&mid))));
        assert!(leaf.is_subtype_of(&root));
        assert!(leaf.is_subtype_of(&leaf));
        assert!(!root.is_subtype_of(&leaf));
    }

    #[test]
    fn slot_lookup_falls_back_to_base() {
        fn plus_one(_th: &mut Thread, v: &Value) -> SlotResult {
            match v {
                Value::Int(i) => Ok(Value::Int(i.add(&crate::object::bigint::BigInt::from_i64(1)))),
                _ => unreachable!(),
            }
        }
        let mut base = TypeObject::new("base", None);
        base.slots.set_unary(Slot::Pos, plus_one);
        let base = Rc::new(base);
        let leaf = Rc::new(TypeObject::new("leaf", Some(base)));
        assert!(leaf.find_unary(Slot::Pos).is_some());
    }
}
