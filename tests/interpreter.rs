use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use piquant::{
    diagnostics::EvalError,
    environment::{EnvRef, Environment},
    output::CapturedOutput,
    repl::{inspect, Repl},
    runtime::{EvalResult, Evaluator},
    value::{CallNode, Node, Primitive},
    Interpreter, Options, OutputSink,
};
use pretty_assertions::assert_eq;

fn interpreter() -> (Interpreter, CapturedOutput) {
    let (output, captured) = OutputSink::capture();
    let interpreter = Interpreter::with_options(Options {
        load_prelude: true,
        output,
    });
    (interpreter, captured)
}

fn eval(source: &str) -> Node {
    let (interpreter, _) = interpreter();
    interpreter
        .eval_source(source, "test")
        .expect("evaluation should succeed")
        .expect("source should produce a value")
}

fn eval_error(source: &str) -> EvalError {
    let (interpreter, _) = interpreter();
    match interpreter.eval_source(source, "test") {
        Ok(value) => panic!("expected error, received value {value:?}"),
        Err(err) => err,
    }
}

fn render(source: &str) -> String {
    eval(source).to_string()
}

#[test]
fn returns_value_of_last_form() {
    assert_eq!(render("1 2 (+ 1 2)"), "3");
}

#[test]
fn empty_input_yields_no_value_and_no_error() {
    let (interpreter, _) = interpreter();
    let result = interpreter.eval_source("  ; only a comment\n", "test");
    assert!(matches!(result, Ok(None)));
}

#[test]
fn closure_adds_captured_binding() {
    let (interpreter, _) = interpreter();
    interpreter.eval_source("(def x 5)", "test").unwrap();
    interpreter
        .eval_source("(def f (lambda (y) (+ x y)))", "test")
        .unwrap();
    let value = interpreter.eval_source("(f 10)", "test").unwrap().unwrap();
    assert_eq!(value.to_string(), "15");
}

#[test]
fn function_scope_is_lexical_not_dynamic() {
    let value = render(
        r#"
        (def x 1)
        (def f (lambda () x))
        (def g (lambda (x) (f)))
        (g 100)
        "#,
    );
    assert_eq!(value, "1");
}

#[test]
fn call_scope_parent_is_the_defining_environment() {
    let (interpreter, _) = interpreter();
    let value = interpreter
        .eval_source(
            r#"
            (def f (lambda () (current-environment)))
            (def g (lambda () (f)))
            (g)
            "#,
            "test",
        )
        .unwrap()
        .unwrap();
    let Node::Env(scope) = &value else {
        panic!("expected an environment, found {value:?}");
    };
    assert_eq!(scope.name(), "f");
    let parent = scope.env.parent().expect("call scope has a parent");
    assert!(Arc::ptr_eq(parent, interpreter.env()));
}

#[test]
fn closures_see_later_mutation_of_captured_environment() {
    let value = render(
        r#"
        (def x 1)
        (def f (lambda () x))
        (def x 2)
        (f)
        "#,
    );
    assert_eq!(value, "2");
}

#[test]
fn child_definitions_shadow_without_touching_ancestor() {
    let top = Environment::new("top-level");
    top.define("s", Node::int(1));
    let middle = Environment::with_parent("middle", Arc::clone(&top));
    let inner = Environment::with_parent("inner", Arc::clone(&middle));

    assert_eq!(inner.lookup("s").unwrap().to_string(), "1");
    inner.define("s", Node::int(2));
    assert_eq!(inner.lookup("s").unwrap().to_string(), "2");
    assert_eq!(middle.lookup("s").unwrap().to_string(), "1");
    assert_eq!(top.lookup("s").unwrap().to_string(), "1");
    assert!(inner.lookup("missing").is_none());
}

#[test]
fn update_rebinds_nearest_existing_binding() {
    let value = render(
        r#"
        (def counter 0)
        (def bump (lambda () (update! counter (+ counter 1))))
        (bump)
        (bump)
        counter
        "#,
    );
    assert_eq!(value, "2");
}

#[test]
fn update_of_unbound_symbol_fails() {
    let err = eval_error("(update! ghost 1)");
    assert!(err.message.contains("cannot update unbound symbol `ghost`"));
}

#[test]
fn unbound_symbol_names_symbol_and_scope() {
    let err = eval_error("nope");
    assert_eq!(
        err.to_string(),
        "test:1: unbound symbol `nope` in environment `top-level`"
    );

    let err = eval_error("(def f (lambda () missing))\n(f)");
    assert_eq!(
        err.message,
        "unbound symbol `missing` in environment `f`"
    );
}

static COUNTED_CALLS: AtomicUsize = AtomicUsize::new(0);

fn counted(_ev: &Evaluator, _env: &EnvRef, _call: &CallNode, _args: &[Node]) -> EvalResult {
    COUNTED_CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(Node::nil())
}

#[test]
fn primitive_arity_is_checked_before_invocation() {
    let (interpreter, _) = interpreter();
    let primitive = Primitive::new("counted", 1, Some(2), counted);
    interpreter
        .env()
        .define("counted", Node::Primitive(Arc::new(primitive)));

    let too_few = interpreter.eval_source("(counted)", "test").unwrap_err();
    assert!(too_few
        .message
        .contains("primitive `counted` expected between 1 and 2 arguments but received 0"));
    let too_many = interpreter.eval_source("(counted 1 2 3)", "test").unwrap_err();
    assert!(too_many.message.contains("received 3"));
    assert_eq!(COUNTED_CALLS.load(Ordering::SeqCst), 0);

    interpreter.eval_source("(counted 1)", "test").unwrap();
    assert_eq!(COUNTED_CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn function_arity_mismatch_is_an_error() {
    let err = eval_error("(def f (lambda (a) a))\n(f 1 2)");
    assert_eq!(
        err.to_string(),
        "test:2: function `f` expected 1 arguments but received 2"
    );
}

#[test]
fn calling_a_non_procedure_is_an_error() {
    let err = eval_error("(5 1)");
    assert!(err.message.contains("`5` is not callable"));
    let err = eval_error("()");
    assert!(err.message.contains("empty call form"));
}

#[test]
fn macro_receives_unevaluated_arguments() {
    let value = render(
        r#"
        (def capture (macro (form) (list 'quote form)))
        (capture (no-such-function 1 2))
        "#,
    );
    assert_eq!(value, "(no-such-function 1 2)");
}

#[test]
fn macro_expansion_runs_in_the_call_site_environment() {
    let value = render(
        r#"
        (def y 1)
        (def the-y (macro () 'y))
        (def h (lambda (y) (the-y)))
        (h 50)
        "#,
    );
    assert_eq!(value, "50");
}

#[test]
fn prelude_macros_expand() {
    assert_eq!(render("(defn square (x) (* x x)) (square 7)"), "49");
    assert_eq!(render("(defn square (x) (* x x)) square"), "#function<square>");
    assert_eq!(render("(when (< 1 2) 'yes)"), "yes");
    assert_eq!(render("(unless (< 1 2) 'yes)"), "nil");
    assert_eq!(
        render("(defmacro twice (e) (list 'do e e)) (def n 0) (twice (update! n (+ n 1))) n"),
        "2"
    );
}

#[test]
fn live_objects_render_their_textual_forms() {
    assert_eq!(render("(current-environment)"), "#environment<top-level>");
    assert_eq!(render("+"), "#primitive<+>");
    assert_eq!(render("(lambda (x) x)"), "#function<anonymous>");
    assert_eq!(render("(def id (lambda (x) x))"), "#function<id>");
    assert_eq!(render("(macro (x) x)"), "#macro<anonymous>");
    assert_eq!(render("(def m (macro (x) x)) m"), "#macro<m>");
    assert_eq!(render("(chan)"), "#chan<0>");
    assert_eq!(render("(chan) (chan)"), "#chan<1>");
}

#[test]
fn live_objects_are_never_comparable() {
    let value = eval("(list (current-environment) + (lambda () 1) (macro () 1) (chan))");
    let Node::Call(live) = &value else {
        panic!("expected a list, found {value:?}");
    };
    for left in live.items.iter() {
        for right in live.items.iter() {
            assert!(
                left.equals(right).is_err(),
                "{left} and {right} must not compare"
            );
        }
        assert!(left.equals(&Node::int(1)).is_err());
        assert!(Node::int(1).equals(left).is_err());
    }

    let err = eval_error("(= + +)");
    assert_eq!(
        err.message,
        "Cannot compare the values of primitive procedures: #primitive<+> and #primitive<+>"
    );
    let err = eval_error("(= (current-environment) (current-environment))");
    assert!(err
        .message
        .starts_with("Cannot compare the values of environments: #environment<top-level>"));
}

#[test]
fn literals_and_syntax_compare_structurally() {
    assert_eq!(render("(= 1 1.0)"), "true");
    assert_eq!(render("(= \"a\" \"a\")"), "true");
    assert_eq!(render("(= 'sym 'sym)"), "true");
    assert_eq!(render("(= '(1 (2 x)) (list 1 (list 2 'x)))"), "true");
    assert_eq!(render("(= 1 \"1\")"), "false");
    assert_eq!(render("(= nil false)"), "false");
}

#[test]
fn arithmetic_promotes_and_checks() {
    assert_eq!(render("(+ 1 2.5)"), "3.5");
    assert_eq!(render("(- 5)"), "-5");
    assert_eq!(render("(- 10 3 2)"), "5");
    assert_eq!(render("(*)"), "1");
    assert_eq!(render("(/ 7 2)"), "3");
    assert_eq!(render("(/ 7.0 2)"), "3.5");
    assert_eq!(render("(mod -7 3)"), "2");
    assert_eq!(render("(< 1 2)"), "true");
    assert_eq!(render("(>= 2 2.5)"), "false");
    assert!(eval_error("(/ 1 0)").message.contains("division by zero"));
    assert!(eval_error("(+ 9223372036854775807 1)")
        .message
        .contains("integer overflow"));
    assert!(eval_error("(+ 1 \"two\")")
        .message
        .contains("`+` expected a number but found string"));
}

#[test]
fn conditionals_use_nil_and_false_as_falsy() {
    assert_eq!(render("(if nil 1 2)"), "2");
    assert_eq!(render("(if false 1 2)"), "2");
    assert_eq!(render("(if 0 1 2)"), "1");
    assert_eq!(render("(if '() 1 2)"), "1");
    assert_eq!(render("(if false 1)"), "nil");
    assert_eq!(render("(not nil)"), "true");
}

#[test]
fn let_binds_sequentially_in_a_child_scope() {
    assert_eq!(render("(let ((a 2) (b (+ a 1))) (* a b))"), "6");
    assert!(eval_error("(let ((a 1)) a) a").message.contains("unbound symbol `a`"));
}

#[test]
fn eval_accepts_a_first_class_environment() {
    assert_eq!(render("(eval '(+ 1 2))"), "3");
    let value = render(
        r#"
        (def capture-scope (lambda (v) (current-environment)))
        (def scope (capture-scope 42))
        (eval 'v scope)
        "#,
    );
    assert_eq!(value, "42");
    assert!(eval_error("(eval 'x 5)")
        .message
        .contains("`eval` expected an environment"));
}

#[test]
fn list_primitives_treat_call_forms_as_data() {
    assert_eq!(render("(cons 1 '(2 3))"), "(1 2 3)");
    assert_eq!(render("(first '(a b))"), "a");
    assert_eq!(render("(first '())"), "nil");
    assert_eq!(render("(rest '(a b c))"), "(b c)");
    assert_eq!(render("(empty? (rest '(a)))"), "true");
    assert_eq!(render("(type-of 'a)"), "\"symbol\"");
    assert_eq!(render("(type-of (chan))"), "\"chan\"");
}

#[test]
fn print_writes_to_the_output_sink() {
    let (interpreter, captured) = interpreter();
    interpreter
        .eval_source("(print \"a\" 1) (println \" b\" '(c \"d\"))", "test")
        .unwrap();
    assert_eq!(captured.contents(), "a 1 b (c \"d\")\n");
}

#[test]
fn parse_errors_do_not_block_remaining_forms() {
    let (interpreter, captured) = interpreter();
    let value = interpreter
        .eval_source("(+ 1 2) )bad( (+ 3 4)", "test")
        .unwrap()
        .unwrap();
    assert_eq!(value.to_string(), "7");
    assert_eq!(
        captured.contents(),
        "Parsing error (test: 1): unexpected `)`\n"
    );
}

#[test]
fn code_glued_to_a_stray_paren_never_runs() {
    let (interpreter, captured) = interpreter();
    let result = interpreter.eval_source(")(if false (println \"never\"))", "test");
    assert!(matches!(result, Ok(None)));
    assert_eq!(
        captured.contents(),
        "Parsing error (test: 1): unexpected `)`\n"
    );
}

#[test]
fn evaluation_stops_at_first_error() {
    let (interpreter, _) = interpreter();
    let err = interpreter
        .eval_source("(def a 1) (missing) (def a 2)", "test")
        .unwrap_err();
    assert!(err.message.contains("unbound symbol `missing`"));
    let value = interpreter.eval_source("a", "test").unwrap().unwrap();
    assert_eq!(value.to_string(), "1");
}

#[test]
fn eval_print_renders_results_and_errors() {
    let (interpreter, captured) = interpreter();
    interpreter.eval_print("(+ 1 2)", "REPL", true);
    interpreter.eval_print("(def quiet 1)", "REPL", false);
    interpreter.eval_print("(if false 1)", "REPL", true);
    interpreter.eval_print("", "REPL", true);
    interpreter.eval_print("(car 1)", "REPL", true);
    assert_eq!(
        captured.contents(),
        "3\nREPL:1: unbound symbol `car` in environment `top-level`\n"
    );
}

#[test]
fn inspect_describes_environments_only() {
    let value = eval("(def answer 42) (current-environment)");
    let text = inspect(&value);
    assert!(text.starts_with("Environment\n  Name='top-level'\n  Env=top-level{"));
    assert!(text.contains("answer"));
    assert_eq!(inspect(&Node::int(5)), "Don't know how to inspect: 5");
}

#[test]
fn repl_inspect_writes_to_the_output_sink() {
    let (interpreter, captured) = interpreter();
    let repl = Repl::new(interpreter);
    repl.inspect_source("(def answer 42) (current-environment)");
    repl.inspect_source("5");
    repl.inspect_source("(missing)");
    let text = captured.contents();
    assert!(text.starts_with("Environment\n  Name='top-level'\n  Env=top-level{"));
    assert!(text.contains(" answer}\n"));
    assert!(text.ends_with(
        "Don't know how to inspect: 5\nREPL:1: unbound symbol `missing` in environment `top-level`\n"
    ));
}

#[test]
fn environment_display_lists_symbols_in_definition_order() {
    let parent = Environment::new("outer");
    let scope = Environment::with_parent("inner", parent);
    scope.define("b", Node::int(1));
    scope.define("a", Node::int(2));
    scope.define("b", Node::int(3));
    assert_eq!(scope.symbols(), vec!["b".to_string(), "a".to_string()]);
    assert_eq!(scope.to_string(), "inner{b a} -> outer");
}

fn explode(_ev: &Evaluator, _env: &EnvRef, _call: &CallNode, _args: &[Node]) -> EvalResult {
    panic!("evaluator invariant violated: boom")
}

#[test]
fn host_failures_are_logged_then_resumed() {
    let (interpreter, captured) = interpreter();
    let primitive = Primitive::new("explode", 0, Some(0), explode);
    interpreter
        .env()
        .define("explode", Node::Primitive(Arc::new(primitive)));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        interpreter.eval_source("(explode)", "test")
    }));
    assert!(outcome.is_err());
    assert_eq!(
        captured.contents(),
        "Host environment error: evaluator invariant violated: boom\n"
    );
}
