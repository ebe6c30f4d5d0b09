//! The process-wide interpreter lock (spec.md §5 "Scheduling model"): only
//! one thread executes VM instructions at a time, released and reacquired at
//! opcode boundaries on a periodic basis rather than every single step.
//!
//! This crate represents every runtime `Value` with `Rc`/non-atomic
//! `RefCell` interiors (spec.md §3 supplement, `object::value`), so handing a
//! live `Value` graph across an actual `std::thread::spawn` boundary is
//! unsound in safe Rust regardless of how the lock is modeled. `vm::thread`'s
//! `thread` builtin therefore runs worker callables cooperatively on the
//! owning OS thread (documented in DESIGN.md) rather than truly concurrently;
//! `Gil` still exists as the named synchronization point spec.md §5
//! describes; a future multi-threaded backend would swap `Value`'s interior
//! mutability for `Arc`/`Mutex` and use this lock for real.
use std::sync::Mutex;

pub struct Gil {
    lock: Mutex<()>,
}

impl Gil {
    pub fn new() -> Self {
        Gil { lock: Mutex::new(()) }
    }

    /// Released and immediately reacquired: the suspension point spec.md §5
    /// calls out as occurring "at opcode boundaries on a periodic basis".
    pub fn yield_point(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
    }
}

impl Default for Gil {
    fn default() -> Self {
        Gil::new()
    }
}
