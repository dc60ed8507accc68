//! The fixed native-function table, per spec.md §6.
//!
//! Both the compiler (for call-site type checking) and the VM (for
//! dispatch) index into this same table, so it lives here rather than in
//! either crate alone — the one place both sides agree on name, index,
//! arity, and signature.

use crate::type_desc::TypeDesc;

/// A native's compile-time signature. `variadic` marks `ffiCall`, whose
/// trailing arguments are untyped and checked only for a minimum arity.
#[derive(Debug, Clone)]
pub struct NativeSig {
    pub name: &'static str,
    pub index: u8,
    pub param_types: &'static [TypeDesc],
    pub return_type: TypeDesc,
    pub variadic: bool,
}

macro_rules! sig {
    ($name:literal, $index:literal, [$($p:expr),*], $ret:expr) => {
        NativeSig {
            name: $name,
            index: $index,
            param_types: &[$($p),*],
            return_type: $ret,
            variadic: false,
        }
    };
}

/// Ordered to match spec.md §6's table exactly; index 29 (`ffiCall`) is the
/// only variadic entry.
pub fn table() -> Vec<NativeSig> {
    use TypeDesc::*;
    vec![
        sig!("len", 0, [Any], Int),
        sig!("append", 1, [Any, Any], Any),
        sig!("str", 2, [Any], Str),
        sig!("readFile", 3, [Str], Str),
        sig!("writeFile", 4, [Str, Str], Bool),
        sig!("args", 5, [], Array(Box::new(Str))),
        sig!("int", 6, [Any], Int),
        sig!("print", 7, [Any], Void),
        sig!("println", 8, [Any], Void),
        sig!("readLine", 9, [], Str),
        sig!("exit", 10, [Int], Void),
        sig!("clock", 11, [], Flt),
        sig!("system", 12, [Str], Int),
        sig!("keys", 13, [Any], Array(Box::new(Any))),
        sig!("delete", 14, [Any, Any], Void),
        sig!("ascii", 15, [Str], Int),
        sig!("char", 16, [Int], Str),
        sig!("has", 17, [Any, Any], Bool),
        sig!("error", 18, [Any], Err),
        sig!("time", 19, [], Int),
        sig!("sqrt", 20, [Any], Flt),
        sig!("sin", 21, [Any], Flt),
        sig!("cos", 22, [Any], Flt),
        sig!("tan", 23, [Any], Flt),
        sig!("log", 24, [Any], Flt),
        sig!("flt", 25, [Any], Flt),
        sig!("rand", 26, [Flt, Flt], Flt),
        sig!("seed", 27, [Int], Void),
        sig!("ffiLoad", 28, [Str], Int),
        NativeSig {
            name: "ffiCall",
            index: 29,
            param_types: &[Int, Str, Str, Str],
            return_type: Any,
            variadic: true,
        },
        sig!("close", 30, [Any], Void),
        sig!("json_stringify", 31, [Any], Str),
        sig!("json_parse", 32, [Str], Any),
        sig!("httpGet", 33, [Str], Str),
        sig!("regexMatch", 34, [Str, Str], Bool),
        sig!("fileExists", 35, [Str], Bool),
        sig!("removeFile", 36, [Str], Bool),
        sig!("listDir", 37, [Str], Array(Box::new(Str))),
    ]
}

pub fn by_name(name: &str) -> Option<NativeSig> {
    table().into_iter().find(|s| s.name == name)
}

pub fn by_index(index: u8) -> Option<NativeSig> {
    table().into_iter().find(|s| s.index == index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_match_position() {
        for (i, sig) in table().iter().enumerate() {
            assert_eq!(sig.index as usize, i, "native {} out of order", sig.name);
        }
    }

    #[test]
    fn names_are_unique() {
        let t = table();
        for (i, a) in t.iter().enumerate() {
            for b in &t[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }
}
