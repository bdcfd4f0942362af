//! Single-pass compiler: a Pratt/precedence-climbing parser that emits
//! bytecode directly into a [`Chunk`] as it parses — there is no
//! intermediate AST. Nested function bodies get their own
//! [`FunctionState`], pushed onto `Compiler::functions` for the
//! duration of the body and popped once it closes, which is the
//! idiomatic-Rust reading of the teacher's enclosing-compiler chain
//! (`examples/yosefbeder-qatam/src/compiler.rs`'s `CompilerState`) and
//! of spec.md §9's "global mutable parser/compiler state → passed
//! context" redesign note: there is exactly one `Compiler` value, owns
//! its whole nested-function stack, and nothing lives in a global.

use crate::chunk::{Chunk, OpCode};
use crate::diagnostics::{Diagnostic, DiagnosticSink, Phase};
use crate::scanner::Scanner;
use crate::token::{Token, TokenKind};
use crate::value::{Interner, LoxFunction, Value};
use std::rc::Rc;

const MAX_LOCALS: usize = u8::MAX as usize + 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // () .
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

/// The fixed, closed set of prefix parse actions. A data table of
/// these tags (see `rule_for`) stands in for the function-pointer
/// `ParseRule` table clox uses, per spec.md §9's redesign note.
#[derive(Clone, Copy)]
enum Prefix {
    Grouping,
    Unary,
    Number,
    StringLiteral,
    Literal,
    Variable,
}

#[derive(Clone, Copy)]
enum Infix {
    Binary,
    And,
    Or,
    Call,
}

struct ParseRule {
    prefix: Option<Prefix>,
    infix: Option<Infix>,
    precedence: Precedence,
}

const fn rule(prefix: Option<Prefix>, infix: Option<Infix>, precedence: Precedence) -> ParseRule {
    ParseRule { prefix, infix, precedence }
}

fn rule_for(kind: TokenKind) -> ParseRule {
    use Precedence::*;
    use TokenKind::*;
    match kind {
        LeftParen => rule(Some(Prefix::Grouping), Some(Infix::Call), Call),
        Minus => rule(Some(Prefix::Unary), Some(Infix::Binary), Term),
        Plus => rule(None, Some(Infix::Binary), Term),
        Slash => rule(None, Some(Infix::Binary), Factor),
        Star => rule(None, Some(Infix::Binary), Factor),
        Bang => rule(Some(Prefix::Unary), None, None),
        BangEqual => rule(None, Some(Infix::Binary), Equality),
        EqualEqual => rule(None, Some(Infix::Binary), Equality),
        Greater => rule(None, Some(Infix::Binary), Comparison),
        GreaterEqual => rule(None, Some(Infix::Binary), Comparison),
        Less => rule(None, Some(Infix::Binary), Comparison),
        LessEqual => rule(None, Some(Infix::Binary), Comparison),
        Identifier => rule(Some(Prefix::Variable), None, None),
        String => rule(Some(Prefix::StringLiteral), None, None),
        Number => rule(Some(Prefix::Number), None, None),
        And => rule(None, Some(Infix::And), Precedence::And),
        False => rule(Some(Prefix::Literal), None, None),
        Nil => rule(Some(Prefix::Literal), None, None),
        Or => rule(None, Some(Infix::Or), Precedence::Or),
        True => rule(Some(Prefix::Literal), None, None),
        _ => rule(None, None, None),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Script,
    Function,
}

struct Local<'src> {
    name: &'src str,
    // -1 while its initializer is compiling; the declaring block's
    // depth once the initializer finishes ("marked initialized").
    depth: i32,
}

struct FunctionState<'src> {
    kind: FunctionKind,
    function: LoxFunction,
    locals: Vec<Local<'src>>,
    scope_depth: i32,
}

impl<'src> FunctionState<'src> {
    fn new(kind: FunctionKind, function: LoxFunction) -> Self {
        // Slot 0 is reserved for the VM's use (the callee itself at
        // call time); it has no name a user program could reference.
        FunctionState { kind, function, locals: vec![Local { name: "", depth: 0 }], scope_depth: 0 }
    }
}

pub struct Compiler<'src, 'ctx> {
    scanner: Scanner<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    interner: &'ctx mut Interner,
    sink: &'ctx mut dyn DiagnosticSink,
    functions: Vec<FunctionState<'src>>,
}

/// Compiles `source` into the top-level script [`LoxFunction`], or
/// returns `None` if any compile error was reported. Diagnostics are
/// pushed to `sink` as they're found; compilation continues past the
/// first error (see `synchronize`) so more can surface in one pass.
pub fn compile(
    source: &str,
    interner: &mut Interner,
    sink: &mut dyn DiagnosticSink,
) -> Option<LoxFunction> {
    let mut compiler = Compiler {
        scanner: Scanner::new(source),
        previous: Token::new(TokenKind::Eof, "", 0),
        current: Token::new(TokenKind::Eof, "", 0),
        had_error: false,
        panic_mode: false,
        interner,
        sink,
        functions: vec![FunctionState::new(FunctionKind::Script, LoxFunction::new(None))],
    };

    compiler.advance();
    while !compiler.match_token(TokenKind::Eof) {
        compiler.declaration();
    }
    let function = compiler.finish_function();

    if compiler.had_error {
        None
    } else {
        Some(function)
    }
}

impl<'src, 'ctx> Compiler<'src, 'ctx> {
    // ---- token stream plumbing ----

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(self.current.lexeme);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    // ---- diagnostics ----

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;

        let location = match token.kind {
            TokenKind::Eof => " at end".to_string(),
            TokenKind::Error => String::new(),
            _ => format!(" at '{}'", token.lexeme),
        };
        self.sink.report(Diagnostic {
            phase: Phase::Compile,
            line: token.line,
            message: format!("Error{location}: {message}"),
        });
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    // ---- bytecode emission ----

    fn current_function(&self) -> &FunctionState<'src> {
        self.functions.last().expect("compiler always has a current function")
    }

    fn current_function_mut(&mut self) -> &mut FunctionState<'src> {
        self.functions.last_mut().expect("compiler always has a current function")
    }

    fn current_chunk_mut(&mut self) -> &mut Chunk {
        &mut self.current_function_mut().function.chunk
    }

    fn emit_op(&mut self, op: OpCode) {
        let line = self.previous.line;
        self.current_chunk_mut().write_op(op, line);
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk_mut().write_byte(byte, line);
    }

    fn emit_op_byte(&mut self, op: OpCode, byte: u8) {
        self.emit_op(op);
        self.emit_byte(byte);
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Nil);
        self.emit_op(OpCode::Return);
    }

    fn emit_constant(&mut self, value: Value) {
        match self.current_chunk_mut().add_constant(value) {
            Ok(index) => self.emit_op_byte(OpCode::Constant, index),
            Err(message) => self.error(&message),
        }
    }

    /// Returns the offset of the jump instruction's placeholder operand.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        let line = self.previous.line;
        self.current_chunk_mut().write_placeholder(line)
    }

    fn patch_jump(&mut self, offset: usize) {
        if let Err(message) = self.current_chunk_mut().patch_jump(offset) {
            self.error(&message);
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        let line = self.previous.line;
        if let Err(message) = self.current_chunk_mut().emit_loop(loop_start, line) {
            self.error(&message);
        }
    }

    fn identifier_constant(&mut self, token: Token<'src>) -> u8 {
        let name = self.interner.intern(token.lexeme);
        match self.current_chunk_mut().add_constant(Value::String(name)) {
            Ok(index) => index,
            Err(message) => {
                self.error(&message);
                0
            }
        }
    }

    fn finish_function(&mut self) -> LoxFunction {
        self.emit_return();
        self.functions.pop().expect("finish_function pops a pushed FunctionState").function
    }

    // ---- scope & locals ----

    fn begin_scope(&mut self) {
        self.current_function_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.current_function_mut().scope_depth -= 1;
        let depth = self.current_function().scope_depth;

        loop {
            let should_pop = matches!(self.current_function().locals.last(), Some(local) if local.depth > depth);
            if !should_pop {
                break;
            }
            self.current_function_mut().locals.pop();
            self.emit_op(OpCode::Pop);
        }
    }

    fn declare_variable(&mut self) {
        let name = self.previous.lexeme;
        let scope_depth = self.current_function().scope_depth;
        if scope_depth == 0 {
            return; // globals are late-bound; nothing to track here
        }

        let mut redeclared = false;
        for local in self.current_function().locals.iter().rev() {
            if local.depth != -1 && local.depth < scope_depth {
                break;
            }
            if local.name == name {
                redeclared = true;
                break;
            }
        }

        if redeclared {
            self.error("Variable with this name already declared in this scope.");
            return;
        }

        self.add_local(name);
    }

    fn add_local(&mut self, name: &'src str) {
        let state = self.current_function_mut();
        if state.locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function (max 256).");
            return;
        }
        self.current_function_mut().locals.push(Local { name, depth: -1 });
    }

    fn resolve_local(&mut self, name: &str) -> Option<u8> {
        let mut found: Option<(usize, bool)> = None;
        for (index, local) in self.current_function().locals.iter().enumerate().rev() {
            if local.name == name {
                found = Some((index, local.depth == -1));
                break;
            }
        }

        match found {
            Some((index, true)) => {
                self.error("Cannot read local variable in its own initializer.");
                Some(index as u8)
            }
            Some((index, false)) => Some(index as u8),
            None => None,
        }
    }

    fn mark_initialized(&mut self) {
        let state = self.current_function_mut();
        if state.scope_depth == 0 {
            return;
        }
        let depth = state.scope_depth;
        state.locals.last_mut().expect("a local was just declared").depth = depth;
    }

    fn parse_variable(&mut self, error_message: &str) -> u8 {
        self.consume(TokenKind::Identifier, error_message);
        self.declare_variable();
        if self.current_function().scope_depth > 0 {
            return 0; // locals aren't looked up by constant index
        }
        self.identifier_constant(self.previous)
    }

    fn define_variable(&mut self, global: u8) {
        if self.current_function().scope_depth > 0 {
            self.mark_initialized();
            return; // the initializer's value is already the local's slot
        }
        self.emit_op_byte(OpCode::DefineGlobal, global);
    }

    // ---- expressions (Pratt / precedence climbing) ----

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = rule_for(self.previous.kind).prefix else {
            self.error("Expect expression.");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        self.apply_prefix(prefix, can_assign);

        while precedence <= rule_for(self.current.kind).precedence {
            self.advance();
            let infix = rule_for(self.previous.kind)
                .infix
                .expect("precedence table only admits tokens with an infix rule here");
            self.apply_infix(infix, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn apply_prefix(&mut self, prefix: Prefix, can_assign: bool) {
        match prefix {
            Prefix::Grouping => self.grouping(),
            Prefix::Unary => self.unary(),
            Prefix::Number => self.number(),
            Prefix::StringLiteral => self.string_literal(),
            Prefix::Literal => self.literal(),
            Prefix::Variable => self.variable(can_assign),
        }
    }

    fn apply_infix(&mut self, infix: Infix, can_assign: bool) {
        match infix {
            Infix::Binary => self.binary(),
            Infix::And => self.and(),
            Infix::Or => self.or(),
            Infix::Call => {
                let _ = can_assign;
                self.call();
            }
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self) {
        let value: f64 = self
            .previous
            .lexeme
            .parse()
            .expect("the scanner only produces valid decimal-digit lexemes for Number tokens");
        self.emit_constant(Value::Number(value));
    }

    fn string_literal(&mut self) {
        // strip the surrounding quotes the scanner kept in the lexeme
        let text = &self.previous.lexeme[1..self.previous.lexeme.len() - 1];
        let string = self.interner.intern(text);
        self.emit_constant(Value::String(string));
    }

    fn literal(&mut self) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => unreachable!("literal() only dispatched for false/nil/true"),
        }
    }

    fn unary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!("unary() only dispatched for !/-"),
        }
    }

    fn binary(&mut self) {
        let operator = self.previous.kind;
        let rule = rule_for(operator);
        self.parse_precedence(rule.precedence.next());

        match operator {
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => unreachable!("binary() only dispatched for the six arithmetic/comparison ops"),
        }
    }

    fn and(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self) {
        let arg_count = self.argument_list();
        self.emit_op_byte(OpCode::Call, arg_count);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u16 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count.min(255) as u8
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous, can_assign);
    }

    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(name.lexeme) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else {
            let index = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, index)
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op_byte(set_op, arg);
        } else {
            self.emit_op_byte(get_op, arg);
        }
    }

    // ---- statements ----

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function_body(FunctionKind::Function);
        self.define_variable(global);
    }

    fn function_body(&mut self, kind: FunctionKind) {
        let name = self.interner.intern(self.previous.lexeme);
        self.functions.push(FunctionState::new(kind, LoxFunction::new(Some(name))));

        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                if self.current_function().function.arity == 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.current_function_mut().function.arity += 1;
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let function = self.finish_function();
        self.emit_constant(Value::Function(Rc::new(function)));
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");

        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_function().function.chunk.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        if self.match_token(TokenKind::Semicolon) {
            // no initializer
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_function().function.chunk.len();
        let mut exit_jump = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.check(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_function().function.chunk.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        } else {
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }

        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.current_function().kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }

        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;

    fn compile_ok(source: &str) -> LoxFunction {
        let mut interner = Interner::new();
        let mut sink = RecordingSink::new();
        compile(source, &mut interner, &mut sink).unwrap_or_else(|| {
            panic!("expected {source:?} to compile, got {:?}", sink.messages())
        })
    }

    fn compile_err(source: &str) -> Vec<String> {
        let mut interner = Interner::new();
        let mut sink = RecordingSink::new();
        assert!(compile(source, &mut interner, &mut sink).is_none());
        sink.diagnostics.into_iter().map(|d| d.message).collect()
    }

    #[test]
    fn compiles_arithmetic_expression_statement() {
        let function = compile_ok("1 + 2 * 3;");
        // CONSTANT 1, CONSTANT 2, CONSTANT 3, MULTIPLY, ADD, POP, NIL, RETURN
        assert_eq!(function.chunk.code()[0], OpCode::Constant as u8);
    }

    #[test]
    fn every_byte_has_a_line_number() {
        let function = compile_ok("var a = 1;\nvar b = 2;\nprint a + b;");
        for i in 0..function.chunk.len() {
            let _ = function.chunk.line_at(i);
        }
    }

    #[test]
    fn self_referential_local_initializer_is_an_error() {
        let messages = compile_err("{ var a = a; }");
        assert!(messages.iter().any(|m| m.contains("Cannot read local variable")));
    }

    #[test]
    fn return_at_top_level_is_an_error() {
        let messages = compile_err("return 1;");
        assert!(messages.iter().any(|m| m.contains("top-level code")));
    }

    #[test]
    fn redeclaring_a_local_in_the_same_scope_is_an_error() {
        let messages = compile_err("{ var a = 1; var a = 2; }");
        assert!(messages.iter().any(|m| m.contains("already declared in this scope")));
    }

    #[test]
    fn invalid_assignment_target_is_an_error() {
        let messages = compile_err("1 + 2 = 3;");
        assert!(messages.iter().any(|m| m.contains("Invalid assignment target")));
    }

    #[test]
    fn too_many_constants_is_an_error() {
        let mut source = String::new();
        for i in 0..257 {
            source.push_str(&format!("var v{i} = {i};\n"));
        }
        let messages = compile_err(&source);
        assert!(messages.iter().any(|m| m.contains("Too many constants")));
    }

    #[test]
    fn functions_compile_and_nest_scopes_independently() {
        compile_ok("fun add(a, b) { return a + b; } print add(1, 2);");
    }

    #[test]
    fn panic_mode_recovers_at_next_statement_boundary() {
        // Two independent errors in one source; both should be reported
        // because synchronize() resumes compilation at `;`.
        let messages = compile_err("print );\nprint +;\n");
        assert!(messages.len() >= 2);
    }
}
