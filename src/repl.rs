//! A plain line-oriented REPL.
//!
//! Each submitted line is parsed and executed on its own; the tree-walk
//! session keeps one interpreter alive so bindings persist between lines.
//! Errors are reported and the prompt continues accepting input.

use std::io::{self, BufRead, Write};

use colored::Colorize;

use nexus_lang::interpreter::Interpreter;
use nexus_lang::{ExecutionMode, NexusError};

pub struct Repl {
    interpreter: Interpreter,
    mode: ExecutionMode,
}

impl Repl {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            interpreter: Interpreter::new(),
            mode,
        }
    }

    pub fn run(&mut self) {
        println!("Nexus {} - REPL", env!("CARGO_PKG_VERSION"));
        println!("Type .help for available commands.\n");

        let stdin = io::stdin();
        loop {
            print!("{} ", self.prompt());
            let _ = io::stdout().flush();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(_) => break,
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match line {
                ".exit" | ".quit" => break,
                ".help" => {
                    println!(".help        Show this help");
                    println!(".mode        Toggle between tree-walk and VM execution");
                    println!(".exit        Leave the REPL");
                    continue;
                }
                ".mode" => {
                    self.mode = match self.mode {
                        ExecutionMode::TreeWalk => ExecutionMode::Bytecode,
                        ExecutionMode::Bytecode => ExecutionMode::TreeWalk,
                    };
                    println!("mode: {:?}", self.mode);
                    continue;
                }
                _ => {}
            }

            if let Err(err) = self.eval_line(line) {
                eprintln!("{} {}", "error:".red().bold(), err);
            }
        }
    }

    fn eval_line(&mut self, line: &str) -> Result<(), NexusError> {
        // Statements need their terminator; let bare expressions slide.
        let source = if line.ends_with(';') || line.ends_with('}') || line.ends_with("end") {
            line.to_string()
        } else {
            format!("{};", line)
        };

        let value = match self.mode {
            ExecutionMode::TreeWalk => {
                let program = nexus_lang::parse(&source)?;
                self.interpreter.interpret(&program)?
            }
            // VM lines run in a fresh machine: compiled programs have no
            // session state to carry over.
            ExecutionMode::Bytecode => nexus_lang::run_bytecode(&source)?,
        };

        if let Some(value) = value {
            println!("{}", value);
        }
        Ok(())
    }

    fn prompt(&self) -> String {
        match self.mode {
            ExecutionMode::TreeWalk => "nexus>".green().to_string(),
            ExecutionMode::Bytecode => "nexus(vm)>".cyan().to_string(),
        }
    }
}
