//! Compiler configuration (spec.md §6 module resolution + ambient limits).

use std::path::PathBuf;

/// Where to resolve imports from, and the resource limits a single
/// compilation is bounded by. Limits default to the capped sizes in
/// spec.md §3; they exist here, not as hardcoded constants, only so a host
/// embedding the compiler can lower them for a sandboxed script.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Directory the main source file lives in; relative imports resolve
    /// against this.
    pub base_dir: PathBuf,
    /// Directory `std/...` imports resolve against (typically `<exe-dir>/lib`).
    pub stdlib_dir: PathBuf,
    pub max_locals: usize,
    pub max_functions: usize,
    pub max_structs: usize,
    pub max_enums: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            base_dir: PathBuf::from("."),
            stdlib_dir: PathBuf::from("lib"),
            max_locals: opo_core::limits::MAX_LOCALS,
            max_functions: opo_core::limits::MAX_FUNCTIONS,
            max_structs: opo_core::limits::MAX_STRUCTS,
            max_enums: opo_core::limits::MAX_ENUMS,
        }
    }
}

impl CompilerConfig {
    pub fn new(base_dir: impl Into<PathBuf>, stdlib_dir: impl Into<PathBuf>) -> Self {
        CompilerConfig {
            base_dir: base_dir.into(),
            stdlib_dir: stdlib_dir.into(),
            ..Default::default()
        }
    }
}
