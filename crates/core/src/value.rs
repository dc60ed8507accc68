//! The runtime value model (spec.md §3).
//!
//! Every heap-backed value is `Arc`-backed with `Mutex`-guarded interiors
//! where mutation is possible. This is a stronger guarantee than the
//! original C's plain `int ref_count` (every heap object's refcount is
//! atomic, not just ones crossing a channel) and is the natural
//! idiomatic-Rust rendering of "reference-counted heap objects" — see the
//! Open Question resolution in DESIGN.md. Dropping the last `Arc` to a heap
//! object recursively drops everything it contains, which is exactly the
//! "refcount reaching zero triggers recursive release" rule in spec.md §3;
//! there is no manual `retain`/`release` bookkeeping to get wrong.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Condvar, Mutex};

use crate::type_desc::TypeDesc;

/// A struct instance: field names are fixed at construction time, values are
/// mutable (`=> p.x <value>` mutates in place).
#[derive(Debug)]
pub struct StructValue {
    pub name: String,
    pub fields: Vec<String>,
    pub values: Mutex<Vec<Value>>,
}

/// A native function handle, wrapped on the heap the way `ObjNative` is in
/// the original, so it participates in the same refcounting path as other
/// callables stored in locals/arrays/struct fields.
#[derive(Debug)]
pub struct NativeValue {
    pub index: u8,
    pub name: String,
}

/// An enum instance: the variant is fixed at construction; payload (if any)
/// never mutates afterwards, so no interior mutability is needed.
#[derive(Debug)]
pub struct EnumValue {
    pub enum_id: u8,
    pub variant_index: u8,
    pub variant_name: String,
    pub payload: Option<Value>,
}

/// A bounded channel: ring buffer behind a mutex plus the two condition
/// variables spec.md §5 calls for (one for senders, one for receivers).
/// The blocking `send`/`recv` operations live in `opo_runtime::channel`,
/// which is where the execution semantics belong; this struct is just the
/// shared data.
pub struct ChannelValue {
    pub capacity: usize,
    pub state: Mutex<ChannelState>,
    pub send_cond: Condvar,
    pub recv_cond: Condvar,
}

pub struct ChannelState {
    pub buffer: std::collections::VecDeque<Value>,
    pub closed: bool,
}

impl fmt::Debug for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chan(capacity={})", self.capacity)
    }
}

/// Hashable subset of `Value` usable as a map key (spec.md's map entries key
/// on int/str/bool-shaped values in practice; float keys are excluded the
/// way the teacher's `MapKey` excludes them, for the same NaN-equality
/// reason).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapKey {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            MapKey::Int(n) => n.hash(state),
            MapKey::Str(s) => s.hash(state),
            MapKey::Bool(b) => b.hash(state),
        }
    }
}

impl MapKey {
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Int(n) => Some(MapKey::Int(*n)),
            Value::Str(s) => Some(MapKey::Str(s.to_string())),
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Int(n) => Value::Int(*n),
            MapKey::Str(s) => Value::Str(Arc::from(s.as_str())),
            MapKey::Bool(b) => Value::Bool(*b),
        }
    }
}

/// A map instance. `HashMap` replaces the original's open-addressed linear
/// probing table: the language makes no iteration-order guarantee (spec.md
/// §4.6), so the collision strategy is a pure implementation detail with no
/// observable difference, and `HashMap` is the idiomatic choice here.
#[derive(Debug, Default)]
pub struct MapValue {
    pub entries: HashMap<MapKey, Value>,
}

/// A tagged runtime value. `Type` is carried alongside where the VM needs to
/// know a value's declared shape without inspecting the heap payload (e.g.
/// an empty array still knows its element type).
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Flt(f64),
    Bool(bool),
    Void,
    /// A function's entry address. Not heap-allocated: functions live
    /// inline in the code stream and are never constructed at runtime, so
    /// the value is just an address tagged with its `TypeDesc::Func`.
    Func(i64, TypeDesc),
    Str(Arc<str>),
    Array(Arc<Mutex<Vec<Value>>>, TypeDesc),
    Struct(Arc<StructValue>),
    Native(Arc<NativeValue>),
    Map(Arc<Mutex<MapValue>>, TypeDesc),
    Enum(Arc<EnumValue>, TypeDesc),
    Chan(Arc<ChannelValue>, TypeDesc),
    /// A thrown/caught error, wrapping whatever value was thrown.
    Err(Arc<Value>),
}

impl Value {
    pub fn type_desc(&self) -> TypeDesc {
        match self {
            Value::Int(_) => TypeDesc::Int,
            Value::Flt(_) => TypeDesc::Flt,
            Value::Bool(_) => TypeDesc::Bool,
            Value::Void => TypeDesc::Void,
            Value::Func(_, t) => t.clone(),
            Value::Str(_) => TypeDesc::Str,
            Value::Array(_, t) => t.clone(),
            Value::Struct(_) => TypeDesc::Array(Box::new(TypeDesc::Any)),
            Value::Native(_) => TypeDesc::Func(None),
            Value::Map(_, t) => t.clone(),
            Value::Enum(_, t) => t.clone(),
            Value::Chan(_, t) => t.clone(),
            Value::Err(_) => TypeDesc::Err,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Void => false,
            Value::Enum(e, _) => e.variant_index != 0 || e.payload.is_some(),
            _ => true,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Flt(n) => write!(f, "Flt({n})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Void => write!(f, "Void"),
            Value::Func(addr, _) => write!(f, "Func({addr})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Array(_, t) => write!(f, "Array({t})"),
            Value::Struct(s) => write!(f, "Struct({})", s.name),
            Value::Native(n) => write!(f, "Native({})", n.name),
            Value::Map(_, t) => write!(f, "Map({t})"),
            Value::Enum(e, _) => write!(f, "Enum({})", e.variant_name),
            Value::Chan(_, t) => write!(f, "Chan({t})"),
            Value::Err(inner) => write!(f, "Err({inner:?})"),
        }
    }
}
