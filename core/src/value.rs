//! Wire-level values and the outbound half of the codec.
//!
//! Every value sent to or received from the server is either text, raw
//! bytes, or NULL. Native scalars convert into a [`Value`] through `From`;
//! the inbound direction lives in [`crate::codec`].

use serde::{Deserialize, Serialize};

/// A single bound parameter or received column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    /// Text-affinity data, sent in the text format.
    Text(String),
    /// Binary-affinity data (bytea, geometric types), sent in the binary format.
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Text(s) => Some(s.as_bytes()),
            Value::Bytes(b) => Some(b),
            Value::Null => None,
        }
    }
}

/// Loggable rendering: text is shown quoted, bytes in bytea hex form.
impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Bytes(bytes) => write!(f, "'\\x{}'", hex::encode(bytes)),
        }
    }
}

/// A geometric point, exchanged in PostgreSQL's `(x,y)` text form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", format_float(self.x), format_float(self.y))
    }
}

/// Format a float the way the server's text input accepts it.
pub(crate) fn format_float(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        ryu::Buffer::new().format_finite(n).to_string()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Text(if b { "t" } else { "f" }.to_string())
    }
}

macro_rules! int_value {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Text(itoa::Buffer::new().format(n).to_string())
                }
            }
        )*
    };
}

int_value!(i16, i32, i64, u32);

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Text(format_float(f64::from(n)))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Text(format_float(n))
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Point> for Value {
    fn from(p: Point) -> Self {
        Value::Text(p.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(feature = "uuid")]
impl From<uuid::Uuid> for Value {
    fn from(u: uuid::Uuid) -> Self {
        Value::Text(u.to_string())
    }
}

#[cfg(feature = "chrono")]
impl From<chrono::NaiveDate> for Value {
    fn from(d: chrono::NaiveDate) -> Self {
        Value::Text(d.format("%Y-%m-%d").to_string())
    }
}

#[cfg(feature = "chrono")]
impl From<chrono::NaiveDateTime> for Value {
    fn from(ts: chrono::NaiveDateTime) -> Self {
        Value::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }
}

#[cfg(feature = "chrono")]
impl From<chrono::DateTime<chrono::Utc>> for Value {
    fn from(ts: chrono::DateTime<chrono::Utc>) -> Self {
        Value::Text(ts.format("%Y-%m-%d %H:%M:%S%.f+00").to_string())
    }
}
