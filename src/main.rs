use loxvm::diagnostics::StderrSink;
use loxvm::vm::{InterpretResult, Vm};
use std::{env, fs, io, process};

fn main() {
    let mut args = env::args().skip(1);
    let path = args.next();

    if args.next().is_some() {
        eprintln!("Usage: loxvm [path]");
        process::exit(exitcode::USAGE);
    }

    match path {
        None => repl(),
        Some(path) => run_file(&path),
    }
}

fn repl() {
    let mut editor = rustyline::Editor::<()>::new();
    let mut vm = Vm::new();
    let mut sink = StderrSink;
    let stdout = io::stdout();

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                editor.add_history_entry(&line);
                let mut handle = stdout.lock();
                vm.interpret(&line, &mut handle, &mut sink);
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(err) => {
                eprintln!("Readline error: {err}");
                break;
            }
        }
    }
}

fn run_file(path: &str) {
    let source = fs::read_to_string(path).unwrap_or_else(|err| {
        eprintln!("Could not read file '{path}': {err}");
        process::exit(exitcode::IOERR);
    });

    let mut vm = Vm::new();
    let mut sink = StderrSink;
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match vm.interpret(&source, &mut handle, &mut sink) {
        InterpretResult::Ok => process::exit(exitcode::OK),
        InterpretResult::CompileError => process::exit(exitcode::DATAERR),
        InterpretResult::RuntimeError => process::exit(exitcode::SOFTWARE),
    }
}
