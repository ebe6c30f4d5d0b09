//! Object & Type System (spec.md §4.1): the uniform value representation,
//! the type table and dunder-slot dispatch, and the exception channel.

pub mod bigint;
pub mod exception;
pub mod gc;
pub mod types;
pub mod value;

pub use bigint::BigInt;
pub use exception::{Exception, ExceptionKind, ExceptionSlot};
pub use types::{Slot, TypeObject};
pub use value::Value;
