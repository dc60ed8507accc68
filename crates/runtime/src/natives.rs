//! Dispatch for the 38 native functions (spec.md §6), indexed exactly as
//! `opo_core::natives::table()` orders them.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use opo_core::{MapKey, TypeDesc, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::format::format_value;
use crate::{ffi, json};

/// Everything a native needs beyond its arguments: the program's `args()`
/// vector and somewhere to read/write the process's standard streams.
pub struct NativeContext<'a> {
    pub argv: &'a [String],
}

fn rng() -> &'static Mutex<StdRng> {
    static RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();
    RNG.get_or_init(|| Mutex::new(StdRng::from_entropy()))
}

pub fn call(index: u8, args: Vec<Value>, ctx: &NativeContext) -> Result<Value, String> {
    match index {
        0 => len(&args[0]),
        1 => append(&args[0], args[1].clone()),
        2 => Ok(Value::Str(Arc::from(format_value(&args[0]).as_str()))),
        3 => read_file(&args[0]),
        4 => write_file(&args[0], &args[1]),
        5 => Ok(string_array(ctx.argv.iter().cloned())),
        6 => to_int(&args[0]),
        7 => {
            print!("{}", format_value(&args[0]));
            std::io::stdout().flush().ok();
            Ok(Value::Void)
        }
        8 => {
            println!("{}", format_value(&args[0]));
            Ok(Value::Void)
        }
        9 => read_line(),
        10 => {
            let code = as_int(&args[0])?;
            std::process::exit(code as i32);
        }
        11 => Ok(Value::Flt(clock_seconds())),
        12 => system(&args[0]),
        13 => keys(&args[0]),
        14 => delete(&args[0], &args[1]),
        15 => ascii(&args[0]),
        16 => char_of(&args[0]),
        17 => has(&args[0], &args[1]),
        18 => Ok(Value::Err(Arc::new(args[0].clone()))),
        19 => Ok(Value::Int(unix_time())),
        20 => math1(&args[0], f64::sqrt),
        21 => math1(&args[0], f64::sin),
        22 => math1(&args[0], f64::cos),
        23 => math1(&args[0], f64::tan),
        24 => math1(&args[0], f64::ln),
        25 => to_flt(&args[0]),
        26 => rand_range(&args[0], &args[1]),
        27 => {
            let seed = as_int(&args[0])?;
            *rng().lock().unwrap() = StdRng::seed_from_u64(seed as u64);
            Ok(Value::Void)
        }
        28 => ffi::load(&as_str(&args[0])?).map(Value::Int),
        29 => ffi_call(&args),
        30 => close_chan(&args[0]),
        31 => Ok(Value::Str(Arc::from(json::stringify(&args[0]).as_str()))),
        32 => json::parse(&as_str(&args[0])?),
        33 => http_get(&as_str(&args[0])?),
        34 => regex_match(&args[0], &args[1]),
        35 => Ok(Value::Bool(std::path::Path::new(&as_str(&args[0])?).exists())),
        36 => remove_file(&args[0]),
        37 => list_dir(&args[0]),
        other => Err(format!("Unknown native index: {other}")),
    }
}

fn string_array(items: impl Iterator<Item = String>) -> Value {
    let values: Vec<Value> = items.map(|s| Value::Str(Arc::from(s.as_str()))).collect();
    Value::Array(Arc::new(Mutex::new(values)), TypeDesc::Str)
}

fn as_str(v: &Value) -> Result<String, String> {
    match v {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(format!("Expected a string, found {}", other.type_desc().type_name())),
    }
}

fn as_int(v: &Value) -> Result<i64, String> {
    match v {
        Value::Int(n) => Ok(*n),
        other => Err(format!("Expected an int, found {}", other.type_desc().type_name())),
    }
}

fn as_num(v: &Value) -> Result<f64, String> {
    match v {
        Value::Int(n) => Ok(*n as f64),
        Value::Flt(n) => Ok(*n),
        other => Err(format!("Expected a number, found {}", other.type_desc().type_name())),
    }
}

fn len(v: &Value) -> Result<Value, String> {
    match v {
        Value::Str(s) => Ok(Value::Int(s.len() as i64)),
        Value::Array(a, _) => Ok(Value::Int(a.lock().unwrap().len() as i64)),
        Value::Map(m, _) => Ok(Value::Int(m.lock().unwrap().entries.len() as i64)),
        other => Err(format!("len() has no meaning for {}", other.type_desc().type_name())),
    }
}

fn append(v: &Value, item: Value) -> Result<Value, String> {
    match v {
        Value::Array(a, ty) => {
            a.lock().unwrap().push(item);
            Ok(Value::Array(a.clone(), ty.clone()))
        }
        other => Err(format!("append() requires an array, found {}", other.type_desc().type_name())),
    }
}

fn read_file(v: &Value) -> Result<Value, String> {
    let path = as_str(v)?;
    std::fs::read_to_string(&path)
        .map(|s| Value::Str(Arc::from(s.as_str())))
        .map_err(|e| format!("Failed to read {path}: {e}"))
}

fn write_file(path: &Value, contents: &Value) -> Result<Value, String> {
    let path = as_str(path)?;
    let contents = as_str(contents)?;
    Ok(Value::Bool(std::fs::write(&path, contents).is_ok()))
}

fn to_int(v: &Value) -> Result<Value, String> {
    match v {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Flt(n) => Ok(Value::Int(*n as i64)),
        Value::Bool(b) => Ok(Value::Int(if *b { 1 } else { 0 })),
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| format!("Cannot convert '{s}' to int")),
        other => Err(format!("Cannot convert {} to int", other.type_desc().type_name())),
    }
}

fn to_flt(v: &Value) -> Result<Value, String> {
    match v {
        Value::Flt(n) => Ok(Value::Flt(*n)),
        Value::Int(n) => Ok(Value::Flt(*n as f64)),
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Flt).map_err(|_| format!("Cannot convert '{s}' to flt")),
        other => Err(format!("Cannot convert {} to flt", other.type_desc().type_name())),
    }
}

fn read_line() -> Result<Value, String> {
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) => Ok(Value::Str(Arc::from(""))),
        Ok(_) => {
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            Ok(Value::Str(Arc::from(line.as_str())))
        }
        Err(e) => Err(format!("Failed to read stdin: {e}")),
    }
}

fn clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn unix_time() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

fn system(v: &Value) -> Result<Value, String> {
    let cmd = as_str(v)?;
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(&cmd)
        .status()
        .map_err(|e| format!("Failed to spawn shell: {e}"))?;
    Ok(Value::Int(status.code().unwrap_or(-1) as i64))
}

fn keys(v: &Value) -> Result<Value, String> {
    match v {
        Value::Map(m, _) => {
            let values: Vec<Value> = m.lock().unwrap().entries.keys().map(MapKey::to_value).collect();
            Ok(Value::Array(Arc::new(Mutex::new(values)), TypeDesc::Any))
        }
        other => Err(format!("keys() requires a map, found {}", other.type_desc().type_name())),
    }
}

fn delete(v: &Value, key: &Value) -> Result<Value, String> {
    match v {
        Value::Map(m, _) => {
            if let Some(k) = MapKey::from_value(key) {
                m.lock().unwrap().entries.remove(&k);
            }
            Ok(Value::Void)
        }
        other => Err(format!("delete() requires a map, found {}", other.type_desc().type_name())),
    }
}

fn ascii(v: &Value) -> Result<Value, String> {
    let s = as_str(v)?;
    s.bytes().next().map(|b| Value::Int(b as i64)).ok_or_else(|| "ascii() requires a non-empty string".to_string())
}

fn char_of(v: &Value) -> Result<Value, String> {
    let n = as_int(v)?;
    let byte = u8::try_from(n).map_err(|_| format!("char() value out of byte range: {n}"))?;
    Ok(Value::Str(Arc::from((byte as char).to_string().as_str())))
}

fn has(v: &Value, key: &Value) -> Result<Value, String> {
    match v {
        Value::Map(m, _) => {
            let found = MapKey::from_value(key).is_some_and(|k| m.lock().unwrap().entries.contains_key(&k));
            Ok(Value::Bool(found))
        }
        Value::Array(a, _) => {
            let items = a.lock().unwrap();
            Ok(Value::Bool(items.iter().any(|item| values_equal(item, key))))
        }
        other => Err(format!("has() requires a map or array, found {}", other.type_desc().type_name())),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Flt(x), Value::Flt(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Void, Value::Void) => true,
        _ => false,
    }
}

fn math1(v: &Value, f: fn(f64) -> f64) -> Result<Value, String> {
    Ok(Value::Flt(f(as_num(v)?)))
}

fn rand_range(lo: &Value, hi: &Value) -> Result<Value, String> {
    let lo = as_num(lo)?;
    let hi = as_num(hi)?;
    Ok(Value::Flt(rng().lock().unwrap().gen_range(lo..hi)))
}

fn ffi_call(args: &[Value]) -> Result<Value, String> {
    let handle = as_int(&args[0])?;
    let name = as_str(&args[1])?;
    let argsig = as_str(&args[2])?;
    let retsig = as_str(&args[3])?;
    ffi::call(handle, &name, &argsig, &retsig, &args[4..])
}

fn close_chan(v: &Value) -> Result<Value, String> {
    match v {
        Value::Chan(c, _) => {
            crate::channel::close(c);
            Ok(Value::Void)
        }
        other => Err(format!("close() requires a channel, found {}", other.type_desc().type_name())),
    }
}

fn http_get(url: &str) -> Result<Value, String> {
    let agent = ureq::AgentBuilder::new()
        .timeout(std::time::Duration::from_secs(30))
        .build();
    match agent.get(url).call() {
        Ok(response) => response.into_string().map(|s| Value::Str(Arc::from(s.as_str()))).map_err(|e| format!("Failed to read response body: {e}")),
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(format!("HTTP error {code}: {body}"))
        }
        Err(ureq::Error::Transport(e)) => Err(format!("Connection error: {e}")),
    }
}

fn regex_match(text: &Value, pattern: &Value) -> Result<Value, String> {
    let text = as_str(text)?;
    let pattern = as_str(pattern)?;
    let re = regex::Regex::new(&pattern).map_err(|e| format!("Invalid regex: {e}"))?;
    Ok(Value::Bool(re.is_match(&text)))
}

fn remove_file(v: &Value) -> Result<Value, String> {
    let path = as_str(v)?;
    Ok(Value::Bool(std::fs::remove_file(path).is_ok()))
}

fn list_dir(v: &Value) -> Result<Value, String> {
    let path = as_str(v)?;
    let entries = std::fs::read_dir(&path).map_err(|e| format!("Failed to list {path}: {e}"))?;
    let names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    Ok(string_array(names.into_iter()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NativeContext<'static> {
        NativeContext { argv: &[] }
    }

    #[test]
    fn len_counts_string_bytes() {
        let v = Value::Str(Arc::from("hi"));
        assert!(matches!(len(&v), Ok(Value::Int(2))));
    }

    #[test]
    fn append_grows_the_array_in_place() {
        let arr = Value::Array(Arc::new(Mutex::new(vec![Value::Int(1)])), TypeDesc::Int);
        let result = call(1, vec![arr.clone(), Value::Int(2)], &ctx()).unwrap();
        if let Value::Array(a, _) = result {
            assert_eq!(a.lock().unwrap().len(), 2);
        } else {
            panic!("expected array");
        }
    }

    #[test]
    fn str_native_formats_like_print() {
        let result = call(2, vec![Value::Int(7)], &ctx()).unwrap();
        assert!(matches!(result, Value::Str(s) if &*s == "7"));
    }

    #[test]
    fn error_wraps_without_double_wrapping() {
        let result = call(18, vec![Value::Str(Arc::from("boom"))], &ctx()).unwrap();
        assert!(matches!(result, Value::Err(_)));
    }

    #[test]
    fn has_finds_array_member() {
        let arr = Value::Array(Arc::new(Mutex::new(vec![Value::Int(1), Value::Int(2)])), TypeDesc::Int);
        assert!(matches!(call(17, vec![arr, Value::Int(2)], &ctx()), Ok(Value::Bool(true))));
    }

    #[test]
    fn rand_respects_seed_determinism() {
        call(27, vec![Value::Int(42)], &ctx()).unwrap();
        let a = call(26, vec![Value::Flt(0.0), Value::Flt(1.0)], &ctx()).unwrap();
        call(27, vec![Value::Int(42)], &ctx()).unwrap();
        let b = call(26, vec![Value::Flt(0.0), Value::Flt(1.0)], &ctx()).unwrap();
        match (a, b) {
            (Value::Flt(x), Value::Flt(y)) => assert_eq!(x, y),
            _ => panic!("expected flt"),
        }
    }
}
