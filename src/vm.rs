//! The dispatch loop: a stack-based bytecode interpreter that walks a
//! call-frame stack executing one [`OpCode`] at a time. The Rust
//! rendition of the teacher's `vm.rs` (`examples/yosefbeder-qatam/src/vm.rs`)
//! and of `examples/original_source/vm.h`'s `VM`/`CallFrame` structs,
//! generalized to this language's smaller opcode set and restricted to
//! slot-local closures (no upvalues).

use crate::chunk::OpCode;
use crate::compiler;
use crate::diagnostics::{Diagnostic, DiagnosticSink, Phase};
use crate::table::Table;
use crate::value::{Interner, LoxFunction, LoxString, Value};
use std::io::Write;
use std::rc::Rc;

const STACK_MAX: usize = 16_384;
const FRAMES_MAX: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

struct CallFrame {
    function: Rc<LoxFunction>,
    ip: usize,
    /// Index into the value stack where this frame's slot 0 (the
    /// callee itself) lives; locals and parameters follow it.
    slots_base: usize,
}

/// One interpreter. Globals and the string interner persist for the
/// life of the `Vm`, so a REPL can share one instance across lines —
/// the crate never spins up a fresh VM per statement, mirroring the
/// teacher's own persistent-interpreter REPL loop.
pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table<Value>,
    strings: Interner,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Vm { stack: Vec::with_capacity(256), frames: Vec::new(), globals: Table::new(), strings: Interner::new() }
    }

    /// Compiles and runs `source`, writing `print`ed output to `stdout`
    /// and diagnostics to `sink`. The stacks are reset before compiling
    /// so a REPL line that half-executed and errored doesn't corrupt
    /// the next one.
    pub fn interpret(
        &mut self,
        source: &str,
        stdout: &mut dyn Write,
        sink: &mut dyn DiagnosticSink,
    ) -> InterpretResult {
        self.stack.clear();
        self.frames.clear();

        let Some(function) = compiler::compile(source, &mut self.strings, sink) else {
            return InterpretResult::CompileError;
        };

        #[cfg(feature = "debug-bytecode")]
        {
            let name = function.name.as_ref().map(|n| n.to_string()).unwrap_or_else(|| "script".to_string());
            crate::debug::disassemble_chunk(&function.chunk, &name);
        }

        let function = Rc::new(function);
        self.stack.push(Value::Function(Rc::clone(&function)));
        self.frames.push(CallFrame { function, ip: 0, slots_base: 0 });

        self.run(stdout, sink)
    }

    fn run(&mut self, stdout: &mut dyn Write, sink: &mut dyn DiagnosticSink) -> InterpretResult {
        loop {
            #[cfg(feature = "debug-execution")]
            self.trace_execution();

            let op = OpCode::from_byte(self.read_byte());
            match op {
                OpCode::Constant => {
                    let value = self.read_constant().clone();
                    self.stack.push(value);
                }
                OpCode::Nil => self.stack.push(Value::Nil),
                OpCode::True => self.stack.push(Value::Bool(true)),
                OpCode::False => self.stack.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.stack.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slots_base;
                    self.stack.push(self.stack[base + slot].clone());
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slots_base;
                    self.stack[base + slot] = self.peek(0).clone();
                }
                OpCode::GetGlobal => {
                    let name = self.read_string_constant();
                    let value = self.globals.get(&name).cloned();
                    match value {
                        Some(value) => self.stack.push(value),
                        None => return self.runtime_error(sink, &format!("Undefined variable '{name}'.")),
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string_constant();
                    let value = self.peek(0).clone();
                    self.globals.insert(name, value);
                    self.stack.pop();
                }
                OpCode::SetGlobal => {
                    let name = self.read_string_constant();
                    let value = self.peek(0).clone();
                    if self.globals.insert(Rc::clone(&name), value) {
                        // insert() reports "newly inserted"; a SET to an
                        // undefined global must not silently define it.
                        self.globals.delete(&name);
                        return self.runtime_error(sink, &format!("Undefined variable '{name}'."));
                    }
                }
                OpCode::Equal => {
                    let b = self.stack.pop().expect("EQUAL operand");
                    let a = self.stack.pop().expect("EQUAL operand");
                    self.stack.push(Value::Bool(a == b));
                }
                OpCode::Greater => {
                    if let Err(result) = self.binary_number_comparison(sink, |a, b| a > b) {
                        return result;
                    }
                }
                OpCode::Less => {
                    if let Err(result) = self.binary_number_comparison(sink, |a, b| a < b) {
                        return result;
                    }
                }
                OpCode::Add => {
                    if let Err(result) = self.add(sink) {
                        return result;
                    }
                }
                OpCode::Subtract => {
                    if let Err(result) = self.binary_number_op(sink, |a, b| a - b) {
                        return result;
                    }
                }
                OpCode::Multiply => {
                    if let Err(result) = self.binary_number_op(sink, |a, b| a * b) {
                        return result;
                    }
                }
                OpCode::Divide => {
                    if let Err(result) = self.binary_number_op(sink, |a, b| a / b) {
                        return result;
                    }
                }
                OpCode::Not => {
                    let value = self.stack.pop().expect("NOT operand");
                    self.stack.push(Value::Bool(value.is_falsy()));
                }
                OpCode::Negate => {
                    if let Value::Number(n) = self.peek(0) {
                        let n = *n;
                        self.stack.pop();
                        self.stack.push(Value::Number(-n));
                    } else {
                        return self.runtime_error(sink, "Operand must be a number.");
                    }
                }
                OpCode::Print => {
                    let value = self.stack.pop().expect("PRINT operand");
                    let _ = writeln!(stdout, "{value}");
                }
                OpCode::Jump => {
                    let offset = self.read_short();
                    self.frame_mut().ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short();
                    if self.peek(0).is_falsy() {
                        self.frame_mut().ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short();
                    self.frame_mut().ip -= offset as usize;
                }
                OpCode::Call => {
                    let arg_count = self.read_byte();
                    if let Err(result) = self.call_value(arg_count, sink) {
                        return result;
                    }
                }
                OpCode::Return => {
                    let result = self.stack.pop().expect("RETURN operand");
                    let frame = self.frames.pop().expect("RETURN always has a frame to pop");
                    if self.frames.is_empty() {
                        return InterpretResult::Ok;
                    }
                    self.stack.truncate(frame.slots_base);
                    self.stack.push(result);
                }
            }
        }
    }

    fn call_value(&mut self, arg_count: u8, sink: &mut dyn DiagnosticSink) -> Result<(), InterpretResult> {
        let callee = self.peek(arg_count as usize).clone();
        match callee {
            Value::Function(function) => self.call(function, arg_count, sink),
            other => Err(self.runtime_error(sink, &format!("Can only call functions, not {}.", other.type_name()))),
        }
    }

    fn call(&mut self, function: Rc<LoxFunction>, arg_count: u8, sink: &mut dyn DiagnosticSink) -> Result<(), InterpretResult> {
        if arg_count != function.arity {
            return Err(self.runtime_error(
                sink,
                &format!("Expected {} arguments but got {}.", function.arity, arg_count),
            ));
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(self.runtime_error(sink, "Stack overflow."));
        }
        let slots_base = self.stack.len() - arg_count as usize - 1;
        self.frames.push(CallFrame { function, ip: 0, slots_base });
        Ok(())
    }

    fn add(&mut self, sink: &mut dyn DiagnosticSink) -> Result<(), InterpretResult> {
        let b = self.peek(0).clone();
        let a = self.peek(1).clone();
        match (a, b) {
            (Value::Number(a), Value::Number(b)) => {
                self.stack.pop();
                self.stack.pop();
                self.stack.push(Value::Number(a + b));
            }
            (Value::String(a), Value::String(b)) => {
                self.stack.pop();
                self.stack.pop();
                let concatenated = format!("{a}{b}");
                let interned = self.strings.intern(&concatenated);
                self.stack.push(Value::String(interned));
            }
            _ => return Err(self.runtime_error(sink, "Operands must be two numbers or two strings.")),
        }
        Ok(())
    }

    fn binary_number_op(
        &mut self,
        sink: &mut dyn DiagnosticSink,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<(), InterpretResult> {
        let operands = match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => Some((*a, *b)),
            _ => None,
        };
        match operands {
            Some((a, b)) => {
                self.stack.pop();
                self.stack.pop();
                self.stack.push(Value::Number(op(a, b)));
                Ok(())
            }
            None => Err(self.runtime_error(sink, "Operands must be numbers.")),
        }
    }

    fn binary_number_comparison(
        &mut self,
        sink: &mut dyn DiagnosticSink,
        op: impl Fn(f64, f64) -> bool,
    ) -> Result<(), InterpretResult> {
        let operands = match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => Some((*a, *b)),
            _ => None,
        };
        match operands {
            Some((a, b)) => {
                self.stack.pop();
                self.stack.pop();
                self.stack.push(Value::Bool(op(a, b)));
                Ok(())
            }
            None => Err(self.runtime_error(sink, "Operands must be numbers.")),
        }
    }

    // ---- frame/stack plumbing ----

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("run() never executes without an active frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("run() never executes without an active frame")
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frame_mut();
        let byte = frame.function.chunk.code()[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let frame = self.frame_mut();
        let short = frame.function.chunk.read_short(frame.ip);
        frame.ip += 2;
        short
    }

    fn read_constant(&mut self) -> &Value {
        let index = self.read_byte();
        self.frame().function.chunk.constant_at(index)
    }

    fn read_string_constant(&mut self) -> Rc<LoxString> {
        match self.read_constant() {
            Value::String(s) => Rc::clone(s),
            _ => unreachable!("the compiler only ever emits string constants for name operands"),
        }
    }

    /// Current line, from the chunk's per-byte line table at the
    /// instruction just executed (`ip - 1`, per spec.md §4.3).
    fn current_line(&self) -> u32 {
        let frame = self.frame();
        frame.function.chunk.line_at(frame.ip - 1)
    }

    fn runtime_error(&mut self, sink: &mut dyn DiagnosticSink, message: &str) -> InterpretResult {
        let line = self.current_line();
        sink.report(Diagnostic { phase: Phase::Runtime, line, message: message.to_string() });

        for frame in self.frames.iter().rev() {
            let name = match &frame.function.name {
                Some(name) => name.to_string(),
                None => "script".to_string(),
            };
            let trace_line = frame.function.chunk.line_at(frame.ip.saturating_sub(1));
            sink.report(Diagnostic { phase: Phase::Runtime, line: trace_line, message: format!("in {name}") });
        }

        self.stack.clear();
        self.frames.clear();
        InterpretResult::RuntimeError
    }

    #[cfg(feature = "debug-execution")]
    fn trace_execution(&self) {
        eprint!("          ");
        for value in &self.stack {
            eprint!("[ {value} ]");
        }
        eprintln!();
        let frame = self.frame();
        crate::debug::disassemble_instruction(&frame.function.chunk, frame.ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;

    fn run(source: &str) -> (InterpretResult, String, Vec<String>) {
        let mut vm = Vm::new();
        let mut stdout = Vec::new();
        let mut sink = RecordingSink::new();
        let result = vm.interpret(source, &mut stdout, &mut sink);
        (result, String::from_utf8(stdout).unwrap(), sink.diagnostics.into_iter().map(|d| d.message).collect())
    }

    #[test]
    fn prints_arithmetic_result() {
        let (result, output, _) = run("print 1 + 2 * 3;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(output, "7\n");
    }

    #[test]
    fn concatenates_interned_strings() {
        let (result, output, _) = run(r#"print "foo" + "bar";"#);
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(output, "foobar\n");
    }

    #[test]
    fn recursive_function_call() {
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
    fn for_loop_prints_each_iteration() {
        let source = "for (var i = 0; i < 3; i = i + 1) { print i; }";
        let (result, output, _) = run(source);
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(output, "0\n1\n2\n");
    }

    #[test]
    fn closes_over_nothing_but_reads_and_writes_globals_across_statements() {
        let (result, output, _) = run("var a = 1; { var a = 2; print a; } print a;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(output, "2\n1\n");
    }

    #[test]
    fn undefined_global_read_is_a_runtime_error() {
        let (result, _, messages) = run("print missing;");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(messages.iter().any(|m| m.contains("Undefined variable 'missing'")));
    }

    #[test]
    fn assigning_to_an_undefined_global_is_a_runtime_error() {
        let (result, _, messages) = run("missing = 1;");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(messages.iter().any(|m| m.contains("Undefined variable 'missing'")));
    }

    #[test]
    fn arity_mismatch_is_a_runtime_error() {
        let (result, _, messages) = run("fun f(a, b) { return a + b; } f(1);");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(messages.iter().any(|m| m.contains("Expected 2 arguments but got 1")));
    }

    #[test]
    fn adding_a_number_to_a_string_is_a_runtime_error() {
        let (result, _, messages) = run(r#"print 1 + "a";"#);
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(messages.iter().any(|m| m.contains("two numbers or two strings")));
    }

    #[test]
    fn division_by_zero_yields_infinity_not_an_error() {
        let (result, output, _) = run("print 1 / 0;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(output, "inf\n");
    }

    #[test]
    fn deep_recursion_without_a_base_case_is_a_stack_overflow_runtime_error() {
        let source = "fun f() { return f() + 1; } print f();";
        let (result, _, messages) = run(source);
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(messages.iter().any(|m| m.contains("Stack overflow.")));
    }
}
