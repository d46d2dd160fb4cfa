//! Nexus: a small dynamically-typed scripting language.
//!
//! This is the library root that exports all modules.
//!
//! # Execution Modes
//!
//! Nexus supports two execution modes over the same AST:
//! - **Tree-walk interpreter**: direct AST evaluation, lexically scoped
//! - **Bytecode VM**: compilation to a flat instruction stream executed on
//!   a stack machine with dynamic (call-frame) name resolution

pub mod ast;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod vm;

pub use error::NexusError;

use interpreter::value::Value;

/// Execution mode for running Nexus programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Tree-walking interpreter (default)
    #[default]
    TreeWalk,
    /// Bytecode virtual machine
    Bytecode,
}

/// Run a Nexus program from source code using the default execution mode.
pub fn run(source: &str) -> Result<Option<Value>, NexusError> {
    run_with_options(source, ExecutionMode::default(), false)
}

/// Run a Nexus program on the bytecode VM.
pub fn run_bytecode(source: &str) -> Result<Option<Value>, NexusError> {
    run_with_options(source, ExecutionMode::Bytecode, false)
}

/// Parse, compile and execute on the VM, returning the final value.
pub fn compile_and_run(source: &str) -> Result<Option<Value>, NexusError> {
    run_bytecode(source)
}

/// Run a Nexus program with full control over execution options.
pub fn run_with_options(
    source: &str,
    mode: ExecutionMode,
    disassemble: bool,
) -> Result<Option<Value>, NexusError> {
    let program = parse(source)?;

    match mode {
        ExecutionMode::TreeWalk => {
            let mut interpreter = interpreter::Interpreter::new();
            Ok(interpreter.interpret(&program)?)
        }
        ExecutionMode::Bytecode => {
            let compiled = vm::Compiler::compile(&program)?;

            if disassemble {
                println!("{}", vm::disassemble(&compiled));
                println!("---");
            }

            let mut machine = vm::Vm::new();
            Ok(machine.run(&compiled)?)
        }
    }
}

/// Parse source code into an AST without executing.
pub fn parse(source: &str) -> Result<ast::Program, NexusError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Compile source code to bytecode without executing.
pub fn compile(source: &str) -> Result<vm::Program, NexusError> {
    let program = parse(source)?;
    Ok(vm::Compiler::compile(&program)?)
}

/// Disassemble compiled bytecode to a string.
pub fn disassemble(program: &vm::Program) -> String {
    vm::disassemble(program)
}
