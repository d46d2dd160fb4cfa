//! Nexus CLI: execute files or run the REPL.

use std::env;
use std::fs;
use std::process;

use colored::Colorize;

use nexus_lang::{ExecutionMode, NexusError};

mod repl;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Run a script file
    Run { file: String },
    /// Evaluate a string
    Eval { code: String },
    /// Start the REPL
    Repl,
}

/// CLI options parsed from arguments.
struct Options {
    command: Command,
    mode: ExecutionMode,
    disassemble: bool,
}

fn print_usage() {
    eprintln!("Nexus {} - Nexus Interpreter", VERSION);
    eprintln!();
    eprintln!("Usage: nexus [options] [script.nx]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --vm            Execute on the bytecode VM (default: tree-walk)");
    eprintln!("  --disasm        Print the compiled instruction listing (implies --vm)");
    eprintln!("  -e <code>       Evaluate code and print the result");
    eprintln!("  --help, -h      Show this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  nexus                         Start interactive REPL");
    eprintln!("  nexus script.nx               Run a script file");
    eprintln!("  nexus --vm script.nx          Run a script on the bytecode VM");
    eprintln!("  nexus --disasm script.nx      Show bytecode, then run it");
    eprintln!("  nexus -e 'displayl 1 + 1;'    Evaluate code directly");
}

fn parse_args() -> Options {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut options = Options {
        command: Command::Repl,
        mode: ExecutionMode::TreeWalk,
        disassemble: false,
    };

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "--vm" => {
                options.mode = ExecutionMode::Bytecode;
            }
            "--disasm" => {
                options.mode = ExecutionMode::Bytecode;
                options.disassemble = true;
            }
            "-e" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("-e requires a code argument");
                    print_usage();
                    process::exit(64);
                }
                options.command = Command::Eval {
                    code: args[i].clone(),
                };
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown option: {}", arg);
                print_usage();
                process::exit(64);
            }
            _ => {
                options.command = Command::Run { file: arg.clone() };
            }
        }
        i += 1;
    }

    options
}

fn report_error(err: &NexusError) {
    eprintln!("{} {}", "error:".red().bold(), err);
}

fn main() {
    let options = parse_args();

    match options.command {
        Command::Run { file } => {
            let source = match fs::read_to_string(&file) {
                Ok(source) => source,
                Err(err) => {
                    eprintln!(
                        "{} failed to read '{}': {}",
                        "error:".red().bold(),
                        file,
                        err
                    );
                    process::exit(66);
                }
            };
            if let Err(err) = nexus_lang::run_with_options(&source, options.mode, options.disassemble)
            {
                report_error(&err);
                process::exit(70);
            }
        }
        Command::Eval { code } => {
            match nexus_lang::run_with_options(&code, options.mode, options.disassemble) {
                Ok(Some(value)) => println!("{}", value),
                Ok(None) => {}
                Err(err) => {
                    report_error(&err);
                    process::exit(70);
                }
            }
        }
        Command::Repl => {
            repl::Repl::new(options.mode).run();
        }
    }
}
