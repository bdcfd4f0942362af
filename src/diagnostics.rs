//! Diagnostic reporting, the Rust rendition of the teacher's
//! `Reporter`/`Report`/`Phase` trio
//! (`examples/yosefbeder-qatam/src/reporter.rs`). Pulling this out of
//! the compiler and VM lets both emit the same message shape and lets
//! tests assert on diagnostics without capturing process stderr.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Compile,
    Runtime,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub phase: Phase,
    pub line: u32,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] {}", self.line, self.message)
    }
}

/// Where compile- and runtime-time diagnostics go. The CLI wires up
/// [`StderrSink`]; tests use [`RecordingSink`].
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        eprintln!("{diagnostic}");
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink { diagnostics: Vec::new() }
    }

    pub fn messages(&self) -> Vec<&str> {
        self.diagnostics.iter().map(|d| d.message.as_str()).collect()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
