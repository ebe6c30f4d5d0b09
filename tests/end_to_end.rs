//! End-to-end pipeline tests: source text in, a `Value` or an uncaught
//! exception out, exercising the lexer/parser/compiler/VM together rather
//! than any single stage in isolation.

use vesper::object::exception::ExceptionKind;
use vesper::object::value::Value;
use vesper::runtime::run_source;
use vesper::vm::error::Error;

#[test]
fn arithmetic_precedence() {
    let v = run_source("<test>", "ret 1 + 2 * 3;").unwrap();
    assert_eq!(v, Value::int(7));
}

#[test]
fn name_binding_and_reuse() {
    let v = run_source("<test>", "x = 10; ret x * x;").unwrap();
    assert_eq!(v, Value::int(100));
}

#[test]
fn for_loop_accumulates_a_string() {
    let v = run_source("<test>", "s = ''; for i in [1, 2, 3] { s = s + str(i); } ret s;").unwrap();
    assert_eq!(v, Value::str("123"));
}

#[test]
fn try_catch_recovers_from_a_thrown_exception() {
    let v = run_source("<test>", "try { throw Exception('bad'); } catch e { ret 'got'; }").unwrap();
    assert_eq!(v, Value::str("got"));
}

#[test]
fn recursive_function_call() {
    let src = "func fib(n) { if n < 2 { ret n; } ret fib(n - 1) + fib(n - 2); } ret fib(10);";
    let v = run_source("<test>", src).unwrap();
    assert_eq!(v, Value::int(55));
}

#[test]
fn chained_comparisons() {
    assert_eq!(run_source("<test>", "ret 1 < 2 < 3;").unwrap(), Value::Bool(true));
    assert_eq!(run_source("<test>", "ret 1 < 2 < 1;").unwrap(), Value::Bool(false));
}

#[test]
fn empty_program_returns_none() {
    assert_eq!(run_source("<test>", "").unwrap(), Value::None);
}

#[test]
fn uncaught_exception_surfaces_through_run_source() {
    let err = run_source("<test>", "throw ValueError('boom');").unwrap_err();
    match err {
        Error::Uncaught(exc) => assert_eq!(exc.kind, ExceptionKind::ValueError),
        other => panic!("expected Error::Uncaught, got {other:?}"),
    }
}

#[test]
fn division_by_zero_is_a_catchable_exception() {
    let v = run_source(
        "<test>",
        "try { ret 1 / 0; } catch ZeroDivisionError { ret -1; }",
    )
    .unwrap();
    assert_eq!(v, Value::int(-1));
}

#[test]
fn user_defined_type_constructs_and_dispatches_methods() {
    let src = "\
        type Point {\n\
            func init(self, x, y) { self.x = x; self.y = y; }\n\
            func sum(self) { ret self.x + self.y; }\n\
        }\n\
        p = Point(3, 4);\n\
        ret p.sum();\n\
    ";
    let v = run_source("<test>", src).unwrap();
    assert_eq!(v, Value::int(7));
}

#[test]
fn integer_literal_promotes_past_machine_word_boundary() {
    let v = run_source("<test>", "ret 9223372036854775807 + 1;").unwrap();
    assert_eq!(v.type_name(), "int");
    assert_ne!(v, Value::int(i64::MIN));
}

#[test]
fn break_in_nested_for_loops_leaves_the_outer_iterator_intact() {
    // A `break` out of the inner loop must not disturb the outer loop's
    // iterator sitting underneath it on the operand stack: the outer loop
    // should still run to completion over all of its own elements.
    let src = "\
        s = '';\n\
        for i in [1, 2] {\n\
            for j in [1, 2, 3] {\n\
                if j == 2 { break; }\n\
                s = s + str(i) + str(j);\n\
            }\n\
        }\n\
        ret s;\n\
    ";
    let v = run_source("<test>", src).unwrap();
    assert_eq!(v, Value::str("1121"));
}

#[test]
fn thread_start_and_join_round_trip_a_result() {
    let src = "\
        func worker(n) { ret n * 2; }\n\
        t = Thread(worker, 21);\n\
        t.start();\n\
        ret t.join();\n\
    ";
    let v = run_source("<test>", src).unwrap();
    assert_eq!(v, Value::int(42));
}

#[test]
fn thread_join_after_a_raising_worker_returns_none() {
    let src = "\
        func worker() { throw ValueError('boom'); }\n\
        t = Thread(worker);\n\
        t.start();\n\
        ret t.join();\n\
    ";
    let v = run_source("<test>", src).unwrap();
    assert_eq!(v, Value::None);
}
