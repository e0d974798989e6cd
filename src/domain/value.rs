//! Leaf values stored in preference nodes.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;

/// In-memory function producing a value from a binding's argument list.
///
/// Callables are never persisted; they compare by identity.
#[derive(Clone)]
pub struct Callable(Arc<dyn Fn(&[String]) -> PrefValue + Send + Sync>);

impl Callable {
    pub fn new(f: impl Fn(&[String]) -> PrefValue + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, args: &[String]) -> PrefValue {
        (self.0)(args)
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callable(..)")
    }
}

/// A preference value.
///
/// Lists are homogeneous (all booleans, all numbers or all strings) and flat;
/// nested maps are represented as child nodes, never as values.
#[derive(Debug, Clone, PartialEq)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<PrefValue>),
    Callable(Callable),
}

/// Coarse kind of a scalar, used for the homogeneity rule on lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Number,
    Text,
}

impl PrefValue {
    pub fn text(s: impl Into<String>) -> Self {
        PrefValue::Text(s.into())
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            PrefValue::Bool(_) => Some(ScalarKind::Bool),
            PrefValue::Int(_) | PrefValue::Float(_) => Some(ScalarKind::Number),
            PrefValue::Text(_) => Some(ScalarKind::Text),
            PrefValue::List(_) | PrefValue::Callable(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PrefValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Checks the list rules. Returns a reason on violation.
    pub fn validate(&self) -> Result<(), String> {
        let PrefValue::List(items) = self else {
            return Ok(());
        };
        let mut kind = None;
        for (idx, item) in items.iter().enumerate() {
            let Some(item_kind) = item.scalar_kind() else {
                return Err(format!("list element {idx} is not a scalar: {item}"));
            };
            match kind {
                None => kind = Some(item_kind),
                Some(k) if k != item_kind => {
                    return Err(format!(
                        "list mixes {:?} and {:?} elements at index {idx}",
                        k, item_kind
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Scalar rendered as plain text, as a converter would parse it.
    pub fn to_plain_string(&self) -> String {
        match self {
            PrefValue::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// The value in its native Rust form, for direct assignment without conversion.
    ///
    /// `Bool` → `bool`, `Int` → `i64`, `Float` → `f64`, `Text` → `String`,
    /// `List` → `Vec<PrefValue>`. Callables have no native form.
    pub fn to_native(&self) -> Option<Box<dyn Any + Send>> {
        match self {
            PrefValue::Bool(b) => Some(Box::new(*b)),
            PrefValue::Int(i) => Some(Box::new(*i)),
            PrefValue::Float(f) => Some(Box::new(*f)),
            PrefValue::Text(s) => Some(Box::new(s.clone())),
            PrefValue::List(items) => Some(Box::new(items.clone())),
            PrefValue::Callable(_) => None,
        }
    }

    /// Maps a native Rust value back to a preference value.
    ///
    /// Covers the primitive types, `String`, `&'static str`, `char`, vectors of
    /// those and `PrefValue` itself. Anything else yields `None`.
    pub fn from_native(value: &(dyn Any + Send)) -> Option<PrefValue> {
        macro_rules! try_int {
            ($($t:ty),*) => {
                $(
                    if let Some(v) = value.downcast_ref::<$t>() {
                        return i64::try_from(*v).ok().map(PrefValue::Int);
                    }
                )*
            };
        }
        macro_rules! try_list {
            ($($t:ty => $wrap:expr),*) => {
                $(
                    if let Some(v) = value.downcast_ref::<Vec<$t>>() {
                        return Some(PrefValue::List(v.iter().map($wrap).collect()));
                    }
                )*
            };
        }

        if let Some(v) = value.downcast_ref::<PrefValue>() {
            return Some(v.clone());
        }
        if let Some(v) = value.downcast_ref::<bool>() {
            return Some(PrefValue::Bool(*v));
        }
        try_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
        if let Some(v) = value.downcast_ref::<f64>() {
            return Some(PrefValue::Float(*v));
        }
        if let Some(v) = value.downcast_ref::<f32>() {
            return Some(PrefValue::Float(f64::from(*v)));
        }
        if let Some(v) = value.downcast_ref::<String>() {
            return Some(PrefValue::Text(v.clone()));
        }
        if let Some(v) = value.downcast_ref::<&'static str>() {
            return Some(PrefValue::Text((*v).to_string()));
        }
        if let Some(v) = value.downcast_ref::<char>() {
            return Some(PrefValue::Text(v.to_string()));
        }
        try_list!(
            String => |s: &String| PrefValue::Text(s.clone()),
            bool => |b: &bool| PrefValue::Bool(*b),
            i64 => |i: &i64| PrefValue::Int(*i),
            i32 => |i: &i32| PrefValue::Int(i64::from(*i)),
            f64 => |f: &f64| PrefValue::Float(*f),
            PrefValue => |v: &PrefValue| v.clone()
        );
        None
    }
}

impl fmt::Display for PrefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefValue::Bool(b) => write!(f, "{b}"),
            PrefValue::Int(i) => write!(f, "{i}"),
            PrefValue::Float(x) => write!(f, "{x}"),
            PrefValue::Text(s) => write!(f, "{s:?}"),
            PrefValue::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            PrefValue::Callable(_) => f.write_str("<callable>"),
        }
    }
}

impl From<bool> for PrefValue {
    fn from(v: bool) -> Self {
        PrefValue::Bool(v)
    }
}

impl From<i64> for PrefValue {
    fn from(v: i64) -> Self {
        PrefValue::Int(v)
    }
}

impl From<i32> for PrefValue {
    fn from(v: i32) -> Self {
        PrefValue::Int(i64::from(v))
    }
}

impl From<f64> for PrefValue {
    fn from(v: f64) -> Self {
        PrefValue::Float(v)
    }
}

impl From<&str> for PrefValue {
    fn from(v: &str) -> Self {
        PrefValue::Text(v.to_string())
    }
}

impl From<String> for PrefValue {
    fn from(v: String) -> Self {
        PrefValue::Text(v)
    }
}

impl From<Callable> for PrefValue {
    fn from(v: Callable) -> Self {
        PrefValue::Callable(v)
    }
}

impl<T: Into<PrefValue>> From<Vec<T>> for PrefValue {
    fn from(v: Vec<T>) -> Self {
        PrefValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Exact-variant extraction used by `Node::get_as` (no conversion).
pub trait FromPrefValue: Sized {
    fn from_pref(value: &PrefValue) -> Option<Self>;
}

impl FromPrefValue for bool {
    fn from_pref(value: &PrefValue) -> Option<Self> {
        match value {
            PrefValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromPrefValue for i64 {
    fn from_pref(value: &PrefValue) -> Option<Self> {
        match value {
            PrefValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromPrefValue for f64 {
    fn from_pref(value: &PrefValue) -> Option<Self> {
        match value {
            PrefValue::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl FromPrefValue for String {
    fn from_pref(value: &PrefValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromPrefValue for Vec<PrefValue> {
    fn from_pref(value: &PrefValue) -> Option<Self> {
        match value {
            PrefValue::List(items) => Some(items.clone()),
            _ => None,
        }
    }
}

impl FromPrefValue for PrefValue {
    fn from_pref(value: &PrefValue) -> Option<Self> {
        Some(value.clone())
    }
}
