//! The language's type descriptor.
//!
//! spec.md §3 describes the wire format as a packed 32-bit value
//! `(kind:8, sub:8, key:8, reserved:8)`. Per the REDESIGN FLAG in spec.md §9,
//! the in-memory representation used by the compiler and the VM is instead a
//! tagged sum type with boxed children, which removes the 8-bit-per-component
//! nesting limit; `to_packed`/`from_packed` are the single conversion point
//! used only where bytecode actually stores a type operand (`ARRAY`, `MAP`,
//! `ENUM_VARIANT`, `CHAN`, `PUSH_FUNC`, `AS_TYPE`, `CHECK_TYPE`).

use std::fmt;

use crate::limits::OPTION_ENUM_ID;

/// Raw, packable discriminant. Order matches the `ValueType` enum in the
/// original `common.h` so that `kind as u8` stays stable across versions.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Int = 0,
    Flt = 1,
    Bool = 2,
    Str = 3,
    Void = 4,
    Func = 5,
    FuncInt = 6,
    FuncFlt = 7,
    FuncBool = 8,
    FuncStr = 9,
    FuncVoid = 10,
    Obj = 11,
    Imp = 12,
    Map = 13,
    Err = 14,
    Enum = 15,
    Chan = 16,
    Any = 17,
}

impl Kind {
    fn from_u8(b: u8) -> Kind {
        match b {
            0 => Kind::Int,
            1 => Kind::Flt,
            2 => Kind::Bool,
            3 => Kind::Str,
            4 => Kind::Void,
            5 => Kind::Func,
            6 => Kind::FuncInt,
            7 => Kind::FuncFlt,
            8 => Kind::FuncBool,
            9 => Kind::FuncStr,
            10 => Kind::FuncVoid,
            11 => Kind::Obj,
            12 => Kind::Imp,
            13 => Kind::Map,
            14 => Kind::Err,
            15 => Kind::Enum,
            16 => Kind::Chan,
            _ => Kind::Any,
        }
    }
}

/// A value's shape: primitive, parameterised array/map/enum/channel, or
/// function. Compared structurally for type-checking; converted to the
/// packed 32-bit wire form only at the bytecode boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Int,
    Flt,
    Bool,
    Str,
    Void,
    Any,
    Err,
    /// Array-of-T (`[]T`). Called `obj` in the wire format.
    Array(Box<TypeDesc>),
    /// Map-of-K-to-V (`{K:V}`).
    Map(Box<TypeDesc>, Box<TypeDesc>),
    /// Channel-of-T (`chan<T>`).
    Chan(Box<TypeDesc>),
    /// A function value. `Some(ret)` narrows to a specific return type the
    /// way `func-returning-T` does in the wire format; `None` is the bare
    /// `func` kind, which `is_assignable` treats as compatible with any
    /// function type in either direction.
    Func(Option<Box<TypeDesc>>),
    /// An enum by id. `id == 0` is the built-in `Option`, whose payload type
    /// is carried in the second field (`none` has no payload, so the inner
    /// type tracks the `some(T)` variant).
    Enum(u8, Option<Box<TypeDesc>>),
    /// The pseudo-type of an import alias. Never a runtime value type; used
    /// only during name resolution.
    Imp,
}

impl TypeDesc {
    pub fn option_of(inner: TypeDesc) -> TypeDesc {
        TypeDesc::Enum(OPTION_ENUM_ID, Some(Box::new(inner)))
    }

    pub fn is_option(&self) -> bool {
        matches!(self, TypeDesc::Enum(id, _) if *id == OPTION_ENUM_ID)
    }

    /// The payload type of `some(T)` if this is an Option type.
    pub fn option_inner(&self) -> Option<&TypeDesc> {
        match self {
            TypeDesc::Enum(id, Some(inner)) if *id == OPTION_ENUM_ID => Some(inner),
            _ => None,
        }
    }

    fn kind(&self) -> Kind {
        match self {
            TypeDesc::Int => Kind::Int,
            TypeDesc::Flt => Kind::Flt,
            TypeDesc::Bool => Kind::Bool,
            TypeDesc::Str => Kind::Str,
            TypeDesc::Void => Kind::Void,
            TypeDesc::Any => Kind::Any,
            TypeDesc::Err => Kind::Err,
            TypeDesc::Array(_) => Kind::Obj,
            TypeDesc::Map(_, _) => Kind::Map,
            TypeDesc::Chan(_) => Kind::Chan,
            TypeDesc::Enum(_, _) => Kind::Enum,
            TypeDesc::Imp => Kind::Imp,
            TypeDesc::Func(ret) => match ret.as_deref() {
                None => Kind::Func,
                Some(TypeDesc::Int) => Kind::FuncInt,
                Some(TypeDesc::Flt) => Kind::FuncFlt,
                Some(TypeDesc::Bool) => Kind::FuncBool,
                Some(TypeDesc::Str) => Kind::FuncStr,
                Some(TypeDesc::Void) => Kind::FuncVoid,
                Some(_) => Kind::Func,
            },
        }
    }

    /// Pack into the wire format `(kind:8, sub:8, key:8, reserved:8)`.
    ///
    /// Nested types beyond one level are truncated to their own top-level
    /// kind byte, matching the original 8-bit-per-component format; the
    /// truncation only affects bytecode operands used for runtime tagging,
    /// never the compiler's own type-checking (which always works on the
    /// fully boxed `TypeDesc`).
    pub fn to_packed(&self) -> u32 {
        let kind = self.kind() as u32;
        let (sub, key) = match self {
            TypeDesc::Array(elem) => (elem.kind() as u32, 0),
            TypeDesc::Map(k, v) => (v.kind() as u32, k.kind() as u32),
            TypeDesc::Chan(elem) => (elem.kind() as u32, 0),
            TypeDesc::Enum(id, inner) => {
                let key = inner.as_deref().map(|t| t.kind() as u32).unwrap_or(0);
                (*id as u32, key)
            }
            _ => (0, 0),
        };
        kind | (sub << 8) | (key << 16)
    }

    /// Reconstruct a (shallow) `TypeDesc` from a packed wire value.
    ///
    /// For `obj`/`map`/`chan`, the nested type is reconstructed only one
    /// level deep (as a bare primitive/kind), since that is all the packed
    /// form carries. This is sufficient for every runtime use of a decoded
    /// type (print formatting, `typeof`, narrowing `AS_TYPE`): the VM never
    /// needs to recover a *compile-time* nested type from bytecode, only a
    /// coarse runtime tag.
    pub fn from_packed(bits: u32) -> TypeDesc {
        let kind = Kind::from_u8((bits & 0xFF) as u8);
        let sub = ((bits >> 8) & 0xFF) as u8;
        let key = ((bits >> 16) & 0xFF) as u8;
        match kind {
            Kind::Int => TypeDesc::Int,
            Kind::Flt => TypeDesc::Flt,
            Kind::Bool => TypeDesc::Bool,
            Kind::Str => TypeDesc::Str,
            Kind::Void => TypeDesc::Void,
            Kind::Any => TypeDesc::Any,
            Kind::Err => TypeDesc::Err,
            Kind::Imp => TypeDesc::Imp,
            Kind::Func => TypeDesc::Func(None),
            Kind::FuncInt => TypeDesc::Func(Some(Box::new(TypeDesc::Int))),
            Kind::FuncFlt => TypeDesc::Func(Some(Box::new(TypeDesc::Flt))),
            Kind::FuncBool => TypeDesc::Func(Some(Box::new(TypeDesc::Bool))),
            Kind::FuncStr => TypeDesc::Func(Some(Box::new(TypeDesc::Str))),
            Kind::FuncVoid => TypeDesc::Func(Some(Box::new(TypeDesc::Void))),
            Kind::Obj => TypeDesc::Array(Box::new(Kind::from_u8(sub).to_bare())),
            Kind::Map => TypeDesc::Map(
                Box::new(Kind::from_u8(key).to_bare()),
                Box::new(Kind::from_u8(sub).to_bare()),
            ),
            Kind::Chan => TypeDesc::Chan(Box::new(Kind::from_u8(sub).to_bare())),
            Kind::Enum => {
                if sub == OPTION_ENUM_ID {
                    TypeDesc::Enum(sub, Some(Box::new(Kind::from_u8(key).to_bare())))
                } else {
                    TypeDesc::Enum(sub, None)
                }
            }
        }
    }

    /// Full-text `typeof` rendering per spec.md §4.5.
    pub fn type_name(&self) -> String {
        match self {
            TypeDesc::Int => "int".to_string(),
            TypeDesc::Flt => "flt".to_string(),
            TypeDesc::Bool => "bol".to_string(),
            TypeDesc::Str => "str".to_string(),
            TypeDesc::Void => "void".to_string(),
            TypeDesc::Any => "any".to_string(),
            TypeDesc::Err => "err".to_string(),
            TypeDesc::Imp => "imp".to_string(),
            TypeDesc::Func(_) => "fun".to_string(),
            TypeDesc::Array(elem) => format!("[]{}", elem.type_name()),
            TypeDesc::Map(k, v) => format!("{{{}:{}}}", k.type_name(), v.type_name()),
            TypeDesc::Chan(elem) => format!("chan<{}>", elem.type_name()),
            TypeDesc::Enum(id, inner) if *id == OPTION_ENUM_ID => match inner {
                Some(t) => format!("{}?", t.type_name()),
                None => "any?".to_string(),
            },
            TypeDesc::Enum(_, _) => "enum".to_string(),
        }
    }
}

impl Kind {
    /// A bare `TypeDesc` carrying just this kind, used when reconstructing
    /// a one-level-deep nested type from the packed wire format.
    fn to_bare(self) -> TypeDesc {
        match self {
            Kind::Int => TypeDesc::Int,
            Kind::Flt => TypeDesc::Flt,
            Kind::Bool => TypeDesc::Bool,
            Kind::Str => TypeDesc::Str,
            Kind::Void => TypeDesc::Void,
            Kind::Any => TypeDesc::Any,
            Kind::Err => TypeDesc::Err,
            Kind::Imp => TypeDesc::Imp,
            Kind::Func => TypeDesc::Func(None),
            Kind::FuncInt => TypeDesc::Func(Some(Box::new(TypeDesc::Int))),
            Kind::FuncFlt => TypeDesc::Func(Some(Box::new(TypeDesc::Flt))),
            Kind::FuncBool => TypeDesc::Func(Some(Box::new(TypeDesc::Bool))),
            Kind::FuncStr => TypeDesc::Func(Some(Box::new(TypeDesc::Str))),
            Kind::FuncVoid => TypeDesc::Func(Some(Box::new(TypeDesc::Void))),
            // Best-effort: without further operands there is no nested type
            // information left to recover, so default to `any`.
            Kind::Obj | Kind::Map | Kind::Chan | Kind::Enum => TypeDesc::Any,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// `is_assignable(expected, actual)` per spec.md §4.2.
pub fn is_assignable(expected: &TypeDesc, actual: &TypeDesc) -> bool {
    if matches!(expected, TypeDesc::Any) {
        return true;
    }
    if expected == actual {
        return true;
    }
    let expected_is_func = matches!(expected, TypeDesc::Func(_));
    let actual_is_func = matches!(actual, TypeDesc::Func(_));
    if expected_is_func && actual_is_func {
        return true;
    }
    match (expected, actual) {
        (TypeDesc::Array(_), TypeDesc::Str) => true,
        (TypeDesc::Array(_), TypeDesc::Map(_, _)) => true,
        (TypeDesc::Array(_), TypeDesc::Array(_)) => true,
        (TypeDesc::Map(ek, ev), TypeDesc::Map(ak, av)) => {
            (matches!(**ek, TypeDesc::Any) || matches!(**ak, TypeDesc::Any) || ek == ak)
                && (matches!(**ev, TypeDesc::Any) || matches!(**av, TypeDesc::Any) || ev == av)
        }
        (TypeDesc::Enum(eid, einner), TypeDesc::Enum(aid, ainner)) if eid == aid => {
            if *eid == OPTION_ENUM_ID {
                match (einner, ainner) {
                    (Some(e), Some(a)) => {
                        matches!(**e, TypeDesc::Any) || matches!(**a, TypeDesc::Any) || e == a
                    }
                    _ => true,
                }
            } else {
                true
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_absorbs_everything() {
        assert!(is_assignable(&TypeDesc::Any, &TypeDesc::Int));
        assert!(is_assignable(&TypeDesc::Any, &TypeDesc::option_of(TypeDesc::Str)));
    }

    #[test]
    fn is_assignable_is_reflexive() {
        let cases = [
            TypeDesc::Int,
            TypeDesc::Str,
            TypeDesc::Array(Box::new(TypeDesc::Int)),
            TypeDesc::option_of(TypeDesc::Bool),
            TypeDesc::Chan(Box::new(TypeDesc::Flt)),
        ];
        for t in cases {
            assert!(is_assignable(&t, &t));
        }
    }

    #[test]
    fn bare_func_compatible_either_direction() {
        let bare = TypeDesc::Func(None);
        let typed = TypeDesc::Func(Some(Box::new(TypeDesc::Int)));
        assert!(is_assignable(&bare, &typed));
        assert!(is_assignable(&typed, &bare));
    }

    #[test]
    fn option_inner_any_matches() {
        let a = TypeDesc::option_of(TypeDesc::Any);
        let b = TypeDesc::option_of(TypeDesc::Int);
        assert!(is_assignable(&a, &b));
        assert!(is_assignable(&b, &a));
    }

    #[test]
    fn packed_round_trips_one_level() {
        let t = TypeDesc::Array(Box::new(TypeDesc::Int));
        let packed = t.to_packed();
        assert_eq!(TypeDesc::from_packed(packed), t);

        let t = TypeDesc::Map(Box::new(TypeDesc::Str), Box::new(TypeDesc::Bool));
        assert_eq!(TypeDesc::from_packed(t.to_packed()), t);

        let t = TypeDesc::option_of(TypeDesc::Int);
        assert_eq!(TypeDesc::from_packed(t.to_packed()), t);
    }

    #[test]
    fn type_name_matches_format() {
        assert_eq!(TypeDesc::Array(Box::new(TypeDesc::Int)).type_name(), "[]int");
        assert_eq!(
            TypeDesc::Map(Box::new(TypeDesc::Str), Box::new(TypeDesc::Int)).type_name(),
            "{str:int}"
        );
        assert_eq!(TypeDesc::Chan(Box::new(TypeDesc::Int)).type_name(), "chan<int>");
        assert_eq!(TypeDesc::option_of(TypeDesc::Int).type_name(), "int?");
    }
}
