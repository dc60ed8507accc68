//! `opo` - command-line host for the Opo language (spec.md §6).
//!
//! `opo <file>` compiles the file and runs its `main`. With no argument it
//! enters a line-based REPL: each line is wrapped in a synthetic `main`,
//! and bare expressions are given a trailing print so results are visible
//! without typing `!!` yourself.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser as ClapParser;
use opo_compiler::{compile, CompileError, CompilerConfig};
use opo_runtime::RuntimeError;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const EXIT_COMPILE_ERROR: u8 = 65;
const EXIT_RUNTIME_ERROR: u8 = 1;
const EXIT_FILE_ERROR: u8 = 74;
const EXIT_USAGE_ERROR: u8 = 64;

#[derive(ClapParser)]
#[command(name = "opo")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile and run Opo programs, or start a REPL with no file", long_about = None)]
struct Args {
    /// Opo source file to compile and run. Omit to start the REPL.
    file: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprint!("{e}");
            return ExitCode::from(EXIT_USAGE_ERROR);
        }
    };

    match args.file {
        Some(path) => run_file(&path),
        None => run_repl(),
    }
}

fn stdlib_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("lib")))
        .unwrap_or_else(|| PathBuf::from("lib"))
}

fn run_file(path: &Path) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Cannot open {}: {e}", path.display());
            return ExitCode::from(EXIT_FILE_ERROR);
        }
    };

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let config = CompilerConfig::new(base_dir, stdlib_dir());
    let source_name = path.display().to_string();

    let chunk = match compile(&source, &source_name, &config) {
        Ok(chunk) => chunk,
        Err(e) => return report_compile_error(&e),
    };

    let argv: Vec<String> = std::env::args().skip(2).collect();
    match opo_runtime::run(chunk, argv) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_runtime_error(&e),
    }
}

fn report_compile_error(e: &CompileError) -> ExitCode {
    eprintln!("{e}");
    ExitCode::from(EXIT_COMPILE_ERROR)
}

fn report_runtime_error(e: &RuntimeError) -> ExitCode {
    eprintln!("{e}");
    ExitCode::from(EXIT_RUNTIME_ERROR)
}

/// Wraps one REPL line in a synthetic `main`. A bare expression (no trailing
/// `;` and no `!!` of its own) gets a trailing print so the line's value is
/// visible; a statement is left exactly as written.
fn wrap_repl_line(line: &str) -> String {
    let trimmed = line.trim();
    let body = if trimmed.ends_with(';') || trimmed.ends_with("!!") || trimmed.ends_with(']') {
        trimmed.to_string()
    } else {
        format!("({trimmed})!!")
    };
    format!("<> -> void: main [ {body} ]")
}

fn run_repl() -> ExitCode {
    let mut editor = match DefaultEditor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Failed to start line editor: {e}");
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    let history_path = dirs::data_dir().map(|d| d.join("opo").join("history.txt"));
    if let Some(path) = &history_path {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = editor.load_history(path);
    }

    let config = CompilerConfig::new(".", stdlib_dir());

    loop {
        match editor.readline("opo> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                let wrapped = wrap_repl_line(&line);
                match compile(&wrapped, "<repl>", &config) {
                    Ok(chunk) => {
                        if let Err(e) = opo_runtime::run(chunk, Vec::new()) {
                            eprintln!("{e}");
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Readline error: {e}");
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        let _ = editor.save_history(path);
    }

    ExitCode::SUCCESS
}
