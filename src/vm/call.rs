//! Argument binding for a script call (spec.md §4.5 "Call convention"):
//! positional arguments fill parameters left to right, a trailing variadic
//! parameter collects whatever is left into a `list`, and any parameter the
//! call didn't supply falls back to its compiled default.

use std::collections::HashMap;
use std::rc::Rc;

use crate::compiler::code::{CodeParam, ParamKind};
use crate::object::exception::{Exception, ExceptionKind};
use crate::object::value::{Value, VFunction};

/// Binds `args` against `func`'s parameter list, producing the locals
/// dictionary for the callee's frame. Defaults were captured at
/// `MakeFunction` time in declaration order, one slot per defaulted
/// parameter (spec.md §4.5's `MakeFunction` note).
pub fn bind_args(func: &VFunction, args: &[Value]) -> Result<HashMap<Rc<str>, Value>, Exception> {
    let params = &func.code.params;
    let variadic = params.last().is_some_and(|p| p.kind == ParamKind::Variadic);
    let required = params.iter().filter(|p| !p.has_default && p.kind == ParamKind::Positional).count();

    if args.len() < required && !variadic {
        return Err(arity_error(&func.code.name, params, args.len()));
    }
    if !variadic && args.len() > params.len() {
        return Err(arity_error(&func.code.name, params, args.len()));
    }
    if variadic && args.len() < required {
        return Err(arity_error(&func.code.name, params, args.len()));
    }

    let mut locals = HashMap::with_capacity(params.len());
    let mut default_iter = func.defaults.iter();
    let positional_count = if variadic { params.len() - 1 } else { params.len() };

    let mut ai = 0usize;
    for (i, p) in params.iter().enumerate() {
        if i == positional_count && variadic {
            let rest: Vec<Value> = args[ai..].to_vec();
            locals.insert(Rc::clone(&p.name), Value::list(rest));
            ai = args.len();
            continue;
        }
        let v = if ai < args.len() {
            let v = args[ai].clone();
            ai += 1;
            if p.has_default {
                let _ = default_iter.next();
            }
            v
        } else if p.has_default {
            default_iter.next().cloned().expect("compiled default count matches has_default flags")
        } else {
            return Err(arity_error(&func.code.name, params, args.len()));
        };
        locals.insert(Rc::clone(&p.name), v);
    }
    Ok(locals)
}

fn arity_error(name: &str, params: &[CodeParam], got: usize) -> Exception {
    Exception::new(
        ExceptionKind::TypeError,
        format!("{name}() takes {} argument(s), got {got}", params.len()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::code::{CodeObject, ParamKind};
    use std::cell::RefCell;
    use std::sync::Arc;

    fn make_func(params: Vec<CodeParam>, defaults: Vec<Value>) -> VFunction {
        let code = CodeObject {
            name: Rc::from("f"),
            filename: Rc::from("<test>"),
            source: Rc::from(""),
            consts: Vec::new(),
            code: Vec::new(),
            meta: Vec::new(),
            params,
            num_locals: 0,
            local_names: Vec::new(),
            docstring: None,
            max_stack: 0,
        };
        VFunction {
            code: Rc::new(code),
            defaults,
            module: Arc::new(RefCell::new(crate::object::value::VModule {
                name: Rc::from("<test>"),
                attrs: HashMap::new(),
            })),
        }
    }

    fn param(name: &str, kind: ParamKind, has_default: bool) -> CodeParam {
        CodeParam { name: Rc::from(name), kind, has_default }
    }

    #[test]
    fn positional_args_bind_in_order() {
        let f = make_func(vec![param("a", ParamKind::Positional, false), param("b", ParamKind::Positional, false)], vec![]);
        let locals = bind_args(&f, &[Value::int(1), Value::int(2)]).unwrap();
        assert_eq!(locals["a"], Value::int(1));
        assert_eq!(locals["b"], Value::int(2));
    }

    #[test]
    fn missing_default_falls_back() {
        let f = make_func(vec![param("a", ParamKind::Positional, false), param("b", ParamKind::Positional, true)], vec![Value::int(9)]);
        let locals = bind_args(&f, &[Value::int(1)]).unwrap();
        assert_eq!(locals["b"], Value::int(9));
    }

    #[test]
    fn variadic_collects_remainder() {
        let f = make_func(vec![param("a", ParamKind::Positional, false), param("rest", ParamKind::Variadic, false)], vec![]);
        let locals = bind_args(&f, &[Value::int(1), Value::int(2), Value::int(3)]).unwrap();
        match &locals["rest"] {
            Value::List(l) => assert_eq!(l.borrow().len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn too_few_args_is_type_error() {
        let f = make_func(vec![param("a", ParamKind::Positional, false)], vec![]);
        let err = bind_args(&f, &[]).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::TypeError);
    }
}
