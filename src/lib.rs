//! Library surface for `loxvm`: a single-pass bytecode compiler and a
//! stack-based virtual machine for the Lox scripting language. `main.rs`
//! is a thin CLI shell over this; integration tests in `tests/` drive
//! the same `Vm`/`compiler::compile` entry points.

pub mod chunk;
pub mod compiler;
pub mod diagnostics;
pub mod scanner;
pub mod table;
pub mod token;
pub mod value;
pub mod vm;

#[cfg(any(feature = "debug-bytecode", feature = "debug-execution"))]
pub mod debug;
