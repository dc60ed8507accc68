//! The recursive value formatter shared by `PRINT` and the `str` native
//! (spec.md §4.6).

use opo_core::Value;

pub fn format_value(v: &Value) -> String {
    match v {
        Value::Int(n) => n.to_string(),
        Value::Flt(n) => format_flt(*n),
        Value::Bool(b) => if *b { "tru" } else { "fls" }.to_string(),
        Value::Void => "void".to_string(),
        // Neither a first-class function value nor a struct instance has a
        // dedicated case in the original formatter; both fall through to
        // its generic object fallback (spec.md §9 Open Questions notes this
        // `<obj>` catch-all is never unified with `typeof`'s own naming).
        Value::Func(_, _) | Value::Struct(_) | Value::Native(_) => "<obj>".to_string(),
        Value::Str(s) => s.to_string(),
        Value::Array(arr, _) => {
            let items = arr.lock().unwrap();
            let parts: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Map(m, _) => {
            let entries = &m.lock().unwrap().entries;
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{} => {}", format_value(&k.to_value()), format_value(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Enum(e, _) if e.enum_id == opo_core::limits::OPTION_ENUM_ID => {
            if e.variant_index == 0 {
                "none".to_string()
            } else {
                format!("some({})", format_value(e.payload.as_ref().expect("some carries a payload")))
            }
        }
        Value::Enum(e, _) => match &e.payload {
            // The literal text "enum.variant" (not the real variant name) is
            // the original interpreter's actual, if surprising, behavior.
            Some(inner) => format!("enum.variant({})", format_value(inner)),
            None => "enum.variant".to_string(),
        },
        Value::Chan(c, _) => format!("<chan:{:p}>", std::sync::Arc::as_ptr(c)),
        Value::Err(inner) => format!("Error: {}", format_value(inner)),
    }
}

/// Mimics printf's `%g`: the shortest decimal representation, never
/// trailing in a redundant `.0` the way `{:?}` would.
fn format_flt(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let mut s = format!("{n}");
    if !s.contains('.') && !s.contains('e') {
        s.push_str(".0");
    }
    s
}
