//! Fixed capacities shared by the compiler and the VM.
//!
//! These mirror the capped tables of spec.md §3 and the fixed-size arrays of
//! the original C interpreter; they are compile-time constants, not
//! user-configurable, matching the original's `#define`s.

/// Max locals per function (compiler-time table cap).
pub const MAX_LOCALS: usize = 256;
/// Max top-level functions.
pub const MAX_FUNCTIONS: usize = 256;
/// Max struct definitions.
pub const MAX_STRUCTS: usize = 64;
/// Max enum definitions.
pub const MAX_ENUMS: usize = 64;
/// Max fields in a single struct, or variants in a single enum.
pub const MAX_STRUCT_FIELDS: usize = 16;
/// Max parameters in a function signature.
pub const MAX_FUNC_PARAMS: usize = 16;
/// Max parameters in a native signature.
pub const MAX_NATIVE_PARAMS: usize = 8;

/// Max simultaneously active call frames per VM instance.
pub const FRAMES_MAX: usize = 64;
/// Local variable slots reserved per call frame.
pub const LOCALS_PER_FRAME: usize = 256;
/// Max depth of the runtime operand stack.
pub const STACK_MAX: usize = 4096;

/// The enum id reserved for the built-in `Option` enum (`none` = 0, `some` = 1).
pub const OPTION_ENUM_ID: u8 = 0;
