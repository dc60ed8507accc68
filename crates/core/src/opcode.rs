//! The bytecode instruction set, per spec.md §4.4.
//!
//! All multi-byte jump targets and constants are little-endian. Jump targets
//! are absolute byte offsets into `Chunk::code`.

/// One byte per opcode, operands inline in the code stream.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Halt = 0,
    PushInt,
    PushFlt,
    PushStr,
    PushBool,
    PushFunc,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Eq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    Not,
    Print,
    Store,
    Load,
    LoadG,
    Pop,
    Jump,
    JumpIfF,
    IsTruthy,
    Call,
    Invoke,
    Go,
    Ret,
    Typeof,
    Index,
    SetIndex,
    GetMember,
    SetMember,
    Array,
    Map,
    Struct,
    EnumVariant,
    CheckVariant,
    CheckType,
    AsType,
    GetEnumPayload,
    ExtractEnumPayload,
    Try,
    EndTry,
    Throw,
    Chan,
    Send,
    Recv,
}

impl OpCode {
    pub fn from_byte(b: u8) -> Option<OpCode> {
        use OpCode::*;
        const TABLE: &[OpCode] = &[
            Halt,
            PushInt,
            PushFlt,
            PushStr,
            PushBool,
            PushFunc,
            Add,
            Sub,
            Mul,
            Div,
            Mod,
            Neg,
            Eq,
            Lt,
            Gt,
            Lte,
            Gte,
            And,
            Or,
            Not,
            Print,
            Store,
            Load,
            LoadG,
            Pop,
            Jump,
            JumpIfF,
            IsTruthy,
            Call,
            Invoke,
            Go,
            Ret,
            Typeof,
            Index,
            SetIndex,
            GetMember,
            SetMember,
            Array,
            Map,
            Struct,
            EnumVariant,
            CheckVariant,
            CheckType,
            AsType,
            GetEnumPayload,
            ExtractEnumPayload,
            Try,
            EndTry,
            Throw,
            Chan,
            Send,
            Recv,
        ];
        TABLE.get(b as usize).copied()
    }
}

/// The first six string-table entries are reserved for the `typeof` names,
/// in this fixed order, per spec.md §3.
pub const RESERVED_TYPEOF_STRINGS: [&str; 6] = ["none", "int", "flt", "bol", "str", "void"];
