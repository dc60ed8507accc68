//! Shared data model for the Opo language: the packed/boxed `Type`
//! descriptor, runtime `Value`s, the bytecode instruction set, and the
//! `Chunk` the compiler emits into and the VM reads from.
//!
//! This crate has no knowledge of parsing, compiling, or execution; it is
//! the vocabulary `opo_compiler` and `opo_runtime` both speak.

pub mod chunk;
pub mod limits;
pub mod natives;
pub mod opcode;
pub mod type_desc;
pub mod value;

pub use chunk::Chunk;
pub use natives::NativeSig;
pub use opcode::OpCode;
pub use type_desc::{is_assignable, Kind, TypeDesc};
pub use value::{
    ChannelState, ChannelValue, EnumValue, MapKey, MapValue, NativeValue, StructValue, Value,
};
