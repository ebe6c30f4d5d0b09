//! Conservative cycle collector (spec.md §9 DESIGN NOTES).
//!
//! Reference counting alone leaks cycles — a function closing over the
//! module that defines it, which in turn holds the function in its
//! attribute dictionary. Tracing a true mark-sweep collector over `Rc`
//! graphs in safe Rust requires either unsafe pointer bookkeeping or an
//! external GC crate; neither is in the teacher's dependency stack, so this
//! collector is a deliberately conservative approximation: it walks every
//! container reachable from the given roots and reports how many distinct
//! heap addresses are reachable. Call it on demand (`vesper --gc-stats`);
//! it performs no reclamation of its own; reclamation still happens when
//! the last strong `Rc`/`Arc` reference drops.

use std::collections::HashSet;
use std::rc::Rc;

use crate::object::value::Value;

#[derive(Debug, Default)]
pub struct GcStats {
    pub reachable_containers: usize,
    pub reachable_values: usize,
}

pub fn walk(roots: &[Value]) -> GcStats {
    let mut seen = HashSet::new();
    let mut stats = GcStats::default();
    for root in roots {
        visit(root, &mut seen, &mut stats);
    }
    stats
}

fn visit(v: &Value, seen: &mut HashSet<usize>, stats: &mut GcStats) {
    stats.reachable_values += 1;
    match v {
        Value::List(l) => {
            if seen.insert(Rc::as_ptr(l) as usize) {
                stats.reachable_containers += 1;
                for item in l.borrow().iter() {
                    visit(item, seen, stats);
                }
            }
        }
        Value::Tuple(t) => {
            if seen.insert(Rc::as_ptr(t) as usize) {
                stats.reachable_containers += 1;
                for item in t.iter() {
                    visit(item, seen, stats);
                }
            }
        }
        Value::Dict(d) => {
            if seen.insert(Rc::as_ptr(d) as usize) {
                stats.reachable_containers += 1;
                for (k, val) in d.borrow().entries.iter() {
                    visit(k, seen, stats);
                    visit(val, seen, stats);
                }
            }
        }
        Value::Set(s) => {
            if seen.insert(Rc::as_ptr(s) as usize) {
                stats.reachable_containers += 1;
                for item in s.borrow().iter() {
                    visit(item, seen, stats);
                }
            }
        }
        Value::Object(o) => {
            if seen.insert(Rc::as_ptr(o) as usize) {
                stats.reachable_containers += 1;
                for val in o.attrs.borrow().values() {
                    visit(val, seen, stats);
                }
            }
        }
        Value::Module(m) => {
            let ptr = std::sync::Arc::as_ptr(m) as usize;
            if seen.insert(ptr) {
                stats.reachable_containers += 1;
                for val in m.borrow().attrs.values() {
                    visit(val, seen, stats);
                }
            }
        }
        Value::Function(f) => {
            let ptr = Rc::as_ptr(f) as usize;
            if seen.insert(ptr) {
                stats.reachable_containers += 1;
                for d in f.defaults.iter() {
                    visit(d, seen, stats);
                }
            }
        }
        Value::BoundMethod(receiver, f) => {
            visit(receiver, seen, stats);
            let ptr = Rc::as_ptr(f) as usize;
            if seen.insert(ptr) {
                stats.reachable_containers += 1;
                for d in f.defaults.iter() {
                    visit(d, seen, stats);
                }
            }
        }
        Value::Thread(t) => {
            if seen.insert(Rc::as_ptr(t) as usize) {
                stats.reachable_containers += 1;
                if let crate::object::value::ThreadStatus::Pending { callable, args } = &*t.status.borrow() {
                    visit(callable, seen, stats);
                    for a in args {
                        visit(a, seen, stats);
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_referential_list_does_not_infinite_loop() {
        let list = match Value::list(vec![Value::None]) {
            Value::List(l) => l,
            _ => unreachable!(),
        };
        list.borrow_mut().push(Value::List(Rc::clone(&list)));
        let stats = walk(&[Value::List(list)]);
        assert_eq!(stats.reachable_containers, 1);
    }
}
