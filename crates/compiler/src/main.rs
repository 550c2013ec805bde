//! Opal Compiler CLI
//!
//! Command-line interface for running, checking, and inspecting .opal
//! programs.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use opal_vm::VM;
use opalc::token::TokenType;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "opalc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Opal compiler - run and inspect .opal programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and execute an .opal program
    Run {
        /// Input .opal source file
        input: PathBuf,
    },

    /// Parse and analyze without executing; reports the first error
    Check {
        /// Input .opal source file
        input: PathBuf,
    },

    /// Compile and dump every frame template's instruction listing
    Ir {
        /// Input .opal source file
        input: PathBuf,
    },

    /// Dump the token stream of a source file
    Tokens {
        /// Input .opal source file
        input: PathBuf,
    },

    /// Parse a source file and write it back in canonical form
    Print {
        /// Input .opal source file
        input: PathBuf,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    // Stage-level debug and per-instruction trace events, gated by OPAL_LOG
    // (e.g. OPAL_LOG=opal_vm=trace).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("OPAL_LOG").unwrap_or_else(|_| EnvFilter::new("off")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { input } => run_program(&input),
        Commands::Check { input } => run_check(&input),
        Commands::Ir { input } => run_ir(&input),
        Commands::Tokens { input } => run_tokens(&input),
        Commands::Print { input } => run_print(&input),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }
}

fn read_source(input: &Path) -> String {
    match fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: failed to read '{}': {}", input.display(), e);
            process::exit(1);
        }
    }
}

fn compile_or_exit(input: &Path) -> Vec<opal_vm::VMFrameTemplate> {
    let source = read_source(input);
    match opalc::compile_source(&source) {
        Ok(templates) => templates,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn run_program(input: &Path) {
    let templates = compile_or_exit(input);
    let mut vm = VM::new();
    for template in templates {
        vm.add_frame_template(template);
    }
    if let Err(e) = vm.run() {
        eprintln!("runtime error: {}", e);
        process::exit(1);
    }
}

fn run_check(input: &Path) {
    let source = read_source(input);
    if let Err(e) = opalc::check_source(&source) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run_ir(input: &Path) {
    let templates = compile_or_exit(input);
    let mut vm = VM::new();
    for template in templates {
        vm.add_frame_template(template);
    }
    print!("{}", vm);
}

fn run_print(input: &Path) {
    let source = read_source(input);
    match opalc::parser::parse_source(&source) {
        Ok(program) => print!("{}", opalc::print_program(&program)),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn run_tokens(input: &Path) {
    let source = read_source(input);
    let mut lexer = opalc::Lexer::new(&source);
    loop {
        match lexer.next_token() {
            Ok(token) => {
                let done = token.token_type == TokenType::Eos;
                println!("{}", token);
                if done {
                    break;
                }
            }
            Err(e) => {
                eprintln!("error: lexer error: {}", e);
                process::exit(1);
            }
        }
    }
}
