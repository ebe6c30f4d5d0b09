//! The exception channel: a closed hierarchy of kinds plus the per-thread
//! exception slot. Protocol operations never return errors as sentinels
//! mixed with values — see spec.md §4.1 "Exception channel".

use std::fmt;
use std::rc::Rc;

use crate::lexer::token::Span;

/// Kinds form a single-rooted hierarchy; `matches` walks from `self` to the
/// root so a `catch` clause naming a base kind accepts any subkind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Exception,
    NameError,
    TypeError,
    ValueError,
    SyntaxError,
    ArithmeticError,
    OverflowError,
    ZeroDivisionError,
    KeyError,
    IndexError,
    OSError,
    PlatformUnsupportedError,
    AssertError,
    InternalError,
    OutOfIterError,
}

impl ExceptionKind {
    /// The immediate base kind, or `None` for the root.
    pub fn base(self) -> Option<ExceptionKind> {
        use ExceptionKind::*;
        match self {
            Exception => None,
            NameError | TypeError | ValueError | ArithmeticError | KeyError | OSError
            | PlatformUnsupportedError | AssertError | InternalError | OutOfIterError => {
                Some(Exception)
            }
            SyntaxError => Some(ValueError),
            OverflowError | ZeroDivisionError => Some(ArithmeticError),
            IndexError => Some(KeyError),
        }
    }

    pub fn is_a(self, other: ExceptionKind) -> bool {
        let mut cur = Some(self);
        while let Some(k) = cur {
            if k == other {
                return true;
            }
            cur = k.base();
        }
        false
    }

    /// Inverse of `name`, used to resolve a `catch` clause's type name (a
    /// bare identifier at the source level, baked into the constant pool as
    /// a string by the compiler) back to a kind at dispatch time.
    pub fn from_name(name: &str) -> Option<ExceptionKind> {
        use ExceptionKind::*;
        Some(match name {
            "Exception" => Exception,
            "NameError" => NameError,
            "TypeError" => TypeError,
            "ValueError" => ValueError,
            "SyntaxError" => SyntaxError,
            "ArithmeticError" => ArithmeticError,
            "OverflowError" => OverflowError,
            "ZeroDivisionError" => ZeroDivisionError,
            "KeyError" => KeyError,
            "IndexError" => IndexError,
            "OSError" => OSError,
            "PlatformUnsupportedError" => PlatformUnsupportedError,
            "AssertError" => AssertError,
            "InternalError" => InternalError,
            "OutOfIterError" => OutOfIterError,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use ExceptionKind::*;
        match self {
            Exception => "Exception",
            NameError => "NameError",
            TypeError => "TypeError",
            ValueError => "ValueError",
            SyntaxError => "SyntaxError",
            ArithmeticError => "ArithmeticError",
            OverflowError => "OverflowError",
            ZeroDivisionError => "ZeroDivisionError",
            KeyError => "KeyError",
            IndexError => "IndexError",
            OSError => "OSError",
            PlatformUnsupportedError => "PlatformUnsupportedError",
            AssertError => "AssertError",
            InternalError => "InternalError",
            OutOfIterError => "OutOfIterError",
        }
    }
}

/// A raised exception. `cause` chains a previously pending exception that was
/// displaced by raising this one inside its handling.
#[derive(Debug, Clone)]
pub struct Exception {
    pub kind: ExceptionKind,
    pub message: String,
    pub span: Option<Span>,
    pub cause: Option<Rc<Exception>>,
    pub traceback: Vec<TraceEntry>,
}

#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub filename: Rc<str>,
    pub line: u32,
    pub frame_name: Option<Rc<str>>,
}

impl Exception {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Exception {
            kind,
            message: message.into(),
            span: None,
            cause: None,
            traceback: Vec::new(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// The signal used by `for`-opcodes and the explicit iterator protocol:
    /// raised silently, never surfaced in a traceback.
    pub fn out_of_iter() -> Self {
        Exception::new(ExceptionKind::OutOfIterError, "")
    }

    pub fn is_out_of_iter(&self) -> bool {
        self.kind == ExceptionKind::OutOfIterError
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

/// The thread-local exception slot: at most one in-flight exception.
#[derive(Debug, Default)]
pub struct ExceptionSlot {
    current: Option<Exception>,
}

impl ExceptionSlot {
    pub fn new() -> Self {
        ExceptionSlot { current: None }
    }

    pub fn is_pending(&self) -> bool {
        self.current.is_some()
    }

    pub fn take(&mut self) -> Option<Exception> {
        self.current.take()
    }

    pub fn peek(&self) -> Option<&Exception> {
        self.current.as_ref()
    }

    /// Raising while an exception is already pending chains the old one as
    /// the cause of the new one, per spec.md §4.1.
    pub fn raise(&mut self, mut exc: Exception) {
        if let Some(prev) = self.current.take() {
            if exc.cause.is_none() && !prev.is_out_of_iter() {
                exc.cause = Some(Rc::new(prev));
            }
        }
        self.current = Some(exc);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subkind_matches_base() {
        assert!(ExceptionKind::ZeroDivisionError.is_a(ExceptionKind::ArithmeticError));
        assert!(ExceptionKind::ZeroDivisionError.is_a(ExceptionKind::Exception));
        assert!(!ExceptionKind::TypeError.is_a(ExceptionKind::ArithmeticError));
    }

    #[test]
    fn raising_while_pending_chains_cause() {
        let mut slot = ExceptionSlot::new();
        slot.raise(Exception::new(ExceptionKind::ValueError, "first"));
        slot.raise(Exception::new(ExceptionKind::TypeError, "second"));
        let exc = slot.take().unwrap();
        assert_eq!(exc.message, "second");
        assert_eq!(exc.cause.unwrap().message, "first");
    }
}
