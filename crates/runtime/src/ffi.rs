//! `ffiLoad` / `ffiCall` natives (indices 28/29).
//!
//! There is no `libffi`-style crate in the workspace, so this does not
//! support arbitrary C signatures. It covers a fixed, bounded set of shapes
//! — up to four `int`/`flt` arguments, a scalar or void return — which is
//! what `argsig`/`retsig` are restricted to. Anything outside that set is a
//! runtime error rather than a silent truncation.

use std::ffi::{c_void, CString};
use std::os::raw::{c_double, c_long};
use std::sync::{Mutex, OnceLock};

use libc::{dlclose, dlopen, dlsym, RTLD_NOW};
use opo_core::Value;

// SAFETY: dlopen handles are plain opaque pointers the dynamic linker keeps
// alive for the process lifetime; passing them between threads (each
// spawned `go` task gets its own VM, but the library table is process-wide)
// is the documented, supported use of dlsym/dlopen.
struct SendPtr(*mut c_void);
unsafe impl Send for SendPtr {}

/// Process-wide table of opened library handles; `ffiLoad` returns an index
/// into this, which is what the language surfaces as the library "handle".
fn handles() -> &'static Mutex<Vec<SendPtr>> {
    static HANDLES: OnceLock<Mutex<Vec<SendPtr>>> = OnceLock::new();
    HANDLES.get_or_init(|| Mutex::new(Vec::new()))
}

pub fn load(path: &str) -> Result<i64, String> {
    let c_path = CString::new(path).map_err(|_| "library path contains a NUL byte".to_string())?;
    let handle = unsafe { dlopen(c_path.as_ptr(), RTLD_NOW) };
    if handle.is_null() {
        return Err(format!("Failed to load library: {path}"));
    }
    let mut table = handles().lock().unwrap();
    table.push(SendPtr(handle));
    Ok((table.len() - 1) as i64)
}

#[derive(Clone, Copy)]
enum Arg {
    Int(i64),
    Flt(f64),
}

pub fn call(handle: i64, name: &str, argsig: &str, retsig: &str, args: &[Value]) -> Result<Value, String> {
    let table = handles().lock().unwrap();
    let raw = table
        .get(handle as usize)
        .ok_or_else(|| format!("Invalid FFI handle: {handle}"))?
        .0;
    drop(table);

    let c_name = CString::new(name).map_err(|_| "symbol name contains a NUL byte".to_string())?;
    let sym = unsafe { dlsym(raw, c_name.as_ptr()) };
    if sym.is_null() {
        return Err(format!("Symbol not found: {name}"));
    }

    if argsig.len() != args.len() {
        return Err(format!(
            "FFI argument count mismatch: signature wants {}, got {}",
            argsig.len(),
            args.len()
        ));
    }
    if argsig.len() > 4 {
        return Err("FFI calls support at most 4 arguments".to_string());
    }

    let mut packed = Vec::with_capacity(args.len());
    for (sig_ch, v) in argsig.chars().zip(args.iter()) {
        packed.push(match (sig_ch, v) {
            ('i', Value::Int(n)) => Arg::Int(*n),
            ('f', Value::Flt(n)) => Arg::Flt(*n),
            ('i', Value::Flt(n)) => Arg::Int(*n as i64),
            ('f', Value::Int(n)) => Arg::Flt(*n as f64),
            (c, _) => return Err(format!("Unsupported FFI argument signature char: {c}")),
        });
    }

    match retsig {
        "i" => Ok(Value::Int(unsafe { call_int(sym, &packed) }?)),
        "f" => Ok(Value::Flt(unsafe { call_flt(sym, &packed) }?)),
        "v" => {
            unsafe { call_void(sym, &packed)? };
            Ok(Value::Void)
        }
        other => Err(format!("Unsupported FFI return signature: {other}")),
    }
}

macro_rules! dispatch {
    ($sym:expr, $packed:expr, $ret:ty) => {{
        let ints: Vec<c_long> = $packed
            .iter()
            .map(|a| match a {
                Arg::Int(n) => *n as c_long,
                Arg::Flt(n) => *n as c_long,
            })
            .collect();
        let flts: Vec<c_double> = $packed
            .iter()
            .map(|a| match a {
                Arg::Int(n) => *n as c_double,
                Arg::Flt(n) => *n,
            })
            .collect();
        let all_int = $packed.iter().all(|a| matches!(a, Arg::Int(_)));
        let all_flt = $packed.iter().all(|a| matches!(a, Arg::Flt(_)));
        if !all_int && !all_flt && !$packed.is_empty() {
            return Err("FFI calls with mixed int/flt arguments are not supported".to_string());
        }
        match ($packed.len(), all_flt && !$packed.is_empty()) {
            (0, _) => {
                let f: extern "C" fn() -> $ret = std::mem::transmute($sym);
                f()
            }
            (1, false) => {
                let f: extern "C" fn(c_long) -> $ret = std::mem::transmute($sym);
                f(ints[0])
            }
            (1, true) => {
                let f: extern "C" fn(c_double) -> $ret = std::mem::transmute($sym);
                f(flts[0])
            }
            (2, false) => {
                let f: extern "C" fn(c_long, c_long) -> $ret = std::mem::transmute($sym);
                f(ints[0], ints[1])
            }
            (2, true) => {
                let f: extern "C" fn(c_double, c_double) -> $ret = std::mem::transmute($sym);
                f(flts[0], flts[1])
            }
            (3, false) => {
                let f: extern "C" fn(c_long, c_long, c_long) -> $ret = std::mem::transmute($sym);
                f(ints[0], ints[1], ints[2])
            }
            (3, true) => {
                let f: extern "C" fn(c_double, c_double, c_double) -> $ret = std::mem::transmute($sym);
                f(flts[0], flts[1], flts[2])
            }
            (4, false) => {
                let f: extern "C" fn(c_long, c_long, c_long, c_long) -> $ret = std::mem::transmute($sym);
                f(ints[0], ints[1], ints[2], ints[3])
            }
            (4, true) => {
                let f: extern "C" fn(c_double, c_double, c_double, c_double) -> $ret = std::mem::transmute($sym);
                f(flts[0], flts[1], flts[2], flts[3])
            }
            _ => return Err("Unsupported FFI arity/signature combination".to_string()),
        }
    }};
}

unsafe fn call_int(sym: *mut c_void, packed: &[Arg]) -> Result<i64, String> {
    Ok(dispatch!(sym, packed, c_long) as i64)
}

unsafe fn call_flt(sym: *mut c_void, packed: &[Arg]) -> Result<f64, String> {
    Ok(dispatch!(sym, packed, c_double) as f64)
}

unsafe fn call_void(sym: *mut c_void, packed: &[Arg]) -> Result<(), String> {
    let _: () = dispatch!(sym, packed, ());
    Ok(())
}

/// Exposed only so `ffiLoad`'s handles can eventually be torn down; the
/// language gives no explicit `ffiUnload`, so this runs at process exit if
/// a host ever wires it up.
#[allow(dead_code)]
fn unload_all() {
    let mut table = handles().lock().unwrap();
    for h in table.drain(..) {
        unsafe {
            dlclose(h.0);
        }
    }
}
