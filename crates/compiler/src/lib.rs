//! Single-pass lexer + compiler for the Opo language (spec.md §4.1-§4.3).
//!
//! `opoc::compile` is the crate's one entry point: source text in, a
//! `Chunk` of bytecode out, or a `CompileError` describing the first
//! failure encountered (spec.md §7 panic-mode policy — compilation does
//! not attempt to recover past a top-level item once a statement inside it
//! has failed to parse).

pub mod compiler;
pub mod config;
pub mod error;
pub mod lexer;
pub mod resolver;

pub use compiler::Compiler;
pub use config::CompilerConfig;
pub use error::CompileError;

/// Compile one Opo program, resolving any `=> alias : imp` imports it
/// contains relative to `config.base_dir` / `config.stdlib_dir`.
pub fn compile(source: &str, source_name: &str, config: &CompilerConfig) -> Result<opo_core::Chunk, CompileError> {
    let compiler = Compiler::new(config.clone());
    compiler.compile(source, source_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_entry_point_round_trips_a_minimal_program() {
        let chunk = compile("<> -> void: main [ 1!! ]", "<test>", &CompilerConfig::default())
            .expect("minimal program should compile");
        assert!(chunk.code.contains(&(opo_core::OpCode::Halt as u8)));
    }

    #[test]
    fn compile_entry_point_reports_missing_main() {
        let err = compile("<> -> void: notmain [ ]", "<test>", &CompilerConfig::default());
        assert!(err.is_err());
    }
}
