//! End-to-end scenarios driving the public `Vm` surface exactly as the
//! CLI would: source text in, stdout text and diagnostics out. These
//! don't reach into the compiler/VM internals the way the crate's own
//! unit tests do — they exist to pin down the observable behavior a
//! Lox program author would see.

use loxvm::diagnostics::RecordingSink;
use loxvm::vm::{InterpretResult, Vm};

fn run(source: &str) -> (InterpretResult, String, Vec<String>) {
    let mut vm = Vm::new();
    let mut stdout = Vec::new();
    let mut sink = RecordingSink::new();
    let result = vm.interpret(source, &mut stdout, &mut sink);
    (result, String::from_utf8(stdout).expect("program output is valid UTF-8"), sink.messages().into_iter().map(str::to_string).collect())
}

#[test]
fn arithmetic_respects_precedence_and_parentheses() {
    let (result, output, _) = run("print (1 + 2) * 3 - 4 / 2;");
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "7\n");
}

#[test]
fn string_concatenation_produces_one_interned_value() {
    let (result, output, _) = run(r#"print "hello, " + "world";"#);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "hello, world\n");
}

#[test]
fn recursive_fibonacci_of_ten_is_fifty_five() {
    let source = r#"
        fun fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        print fib(10);
    "#;
    let (result, output, _) = run(source);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "55\n");
}

#[test]
fn for_loop_prints_zero_one_two() {
    let (result, output, _) = run("for (var i = 0; i < 3; i = i + 1) print i;");
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "0\n1\n2\n");
}

#[test]
fn reading_an_undefined_variable_is_a_runtime_error() {
    let (result, output, messages) = run("print nope;");
    assert_eq!(result, InterpretResult::RuntimeError);
    assert_eq!(output, "");
    assert!(messages.iter().any(|m| m.contains("Undefined variable 'nope'")));
}

#[test]
fn self_referential_local_initializer_is_a_compile_error() {
    let (result, _, messages) = run("{ var a = \"outer\"; { var a = a; } }");
    assert_eq!(result, InterpretResult::CompileError);
    assert!(messages.iter().any(|m| m.contains("Cannot read local variable")));
}

#[test]
fn calling_a_function_with_the_wrong_arity_is_a_runtime_error() {
    let (result, _, messages) = run("fun add(a, b) { return a + b; } print add(1);");
    assert_eq!(result, InterpretResult::RuntimeError);
    assert!(messages.iter().any(|m| m.contains("Expected 2 arguments but got 1")));
}

#[test]
fn logical_operators_short_circuit() {
    // the right-hand side would error if it were evaluated, since `nil`
    // has no `+`; it must never run.
    let (result, output, _) = run(r#"print false and (1 + "x"); print true or (1 + "x");"#);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output, "false\ntrue\n");
}

#[test]
fn globals_persist_across_successive_interpret_calls_like_a_repl_session() {
    let mut vm = Vm::new();
    let mut sink = RecordingSink::new();

    let mut first = Vec::new();
    assert_eq!(vm.interpret("var counter = 0;", &mut first, &mut sink), InterpretResult::Ok);

    let mut second = Vec::new();
    assert_eq!(
        vm.interpret("counter = counter + 1; print counter;", &mut second, &mut sink),
        InterpretResult::Ok
    );
    assert_eq!(String::from_utf8(second).unwrap(), "1\n");
}
