//! Inbound conversion from received [`Value`]s into native types.

use crate::error::DecodeError;
use crate::value::{Point, Value};

/// Decode a received value into a native type.
///
/// NULL decodes to `None` for `Option<T>` and is an error for every other
/// target.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, DecodeError>;
}

/// Encode a native value. Equivalent to `Value::from`.
pub fn encode<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Decode a value into `T`.
pub fn decode<T: FromValue>(value: Value) -> Result<T, DecodeError> {
    T::from_value(value)
}

/// Decode bytea hex output (`\\x0102...`). `None` when not in hex form.
pub fn decode_bytea(raw: &[u8]) -> Option<Vec<u8>> {
    let digits = raw.strip_prefix(b"\\x")?;
    hex::decode(digits).ok()
}

fn text<T>(value: Value) -> Result<String, DecodeError> {
    match value {
        Value::Null => Err(DecodeError::UnexpectedNull(std::any::type_name::<T>())),
        Value::Text(s) => Ok(s),
        Value::Bytes(b) => String::from_utf8(b).map_err(|_| DecodeError::InvalidUtf8),
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        text::<Self>(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        let s = text::<Self>(value)?;
        match s.as_str() {
            "t" | "true" | "1" | "TRUE" => Ok(true),
            "f" | "false" | "0" | "FALSE" => Ok(false),
            _ => Err(DecodeError::invalid::<Self>(s)),
        }
    }
}

macro_rules! parse_value {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: Value) -> Result<Self, DecodeError> {
                    let s = text::<Self>(value)?;
                    s.trim().parse().map_err(|_| DecodeError::invalid::<Self>(s))
                }
            }
        )*
    };
}

parse_value!(i16, i32, i64, u32, f32, f64);

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Null => Err(DecodeError::UnexpectedNull("bytea")),
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
        }
    }
}

impl FromValue for Point {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        let s = text::<Self>(value)?;
        parse_point(&s)
    }
}

/// Parse `(x,y)`; both coordinates must be finite.
fn parse_point(s: &str) -> Result<Point, DecodeError> {
    let inner = s
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| DecodeError::invalid::<Point>(s))?;
    let (x, y) = inner
        .split_once(',')
        .ok_or_else(|| DecodeError::invalid::<Point>(s))?;
    let x: f64 = x.trim().parse().map_err(|_| DecodeError::invalid::<Point>(s))?;
    let y: f64 = y.trim().parse().map_err(|_| DecodeError::invalid::<Point>(s))?;
    if !x.is_finite() || !y.is_finite() {
        return Err(DecodeError::NonFinite(s.to_string()));
    }
    Ok(Point { x, y })
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(feature = "uuid")]
impl FromValue for uuid::Uuid {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        let s = text::<Self>(value)?;
        uuid::Uuid::parse_str(&s).map_err(|_| DecodeError::invalid::<Self>(s))
    }
}

#[cfg(feature = "chrono")]
impl FromValue for chrono::NaiveDate {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        let s = text::<Self>(value)?;
        chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| DecodeError::invalid::<Self>(s))
    }
}

#[cfg(feature = "chrono")]
impl FromValue for chrono::NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        let s = text::<Self>(value)?;
        chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
            .map_err(|_| DecodeError::invalid::<Self>(s))
    }
}

#[cfg(feature = "chrono")]
impl FromValue for chrono::DateTime<chrono::Utc> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        let s = text::<Self>(value)?;
        // timestamptz text output carries a short offset such as "+00" or "+05:30"
        chrono::DateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f%#z")
            .map(|ts| ts.with_timezone(&chrono::Utc))
            .map_err(|_| DecodeError::invalid::<Self>(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_null_decodes_to_none() {
        assert_eq!(decode::<Option<i32>>(Value::Null), Ok(None));
        assert_eq!(decode::<Option<String>>(Value::from("x")), Ok(Some("x".to_string())));
    }

    #[test]
    fn test_null_into_non_optional_fails() {
        assert!(matches!(
            decode::<i64>(Value::Null),
            Err(DecodeError::UnexpectedNull(_))
        ));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(decode::<i32>(Value::from("42")), Ok(42));
        assert_eq!(decode::<f64>(Value::from("2.5")), Ok(2.5));
        assert!(decode::<f64>(Value::from("Infinity")).is_ok_and(|n| n.is_infinite()));
        assert!(matches!(
            decode::<i16>(Value::from("99999")),
            Err(DecodeError::Invalid { .. })
        ));
    }

    #[test]
    fn test_bool_variants() {
        assert_eq!(decode::<bool>(Value::from("t")), Ok(true));
        assert_eq!(decode::<bool>(Value::from("false")), Ok(false));
        assert!(decode::<bool>(Value::from("maybe")).is_err());
    }

    #[test]
    fn test_point_parsing() {
        assert_eq!(
            decode::<Point>(Value::Bytes(b"(1.5,-2)".to_vec())),
            Ok(Point::new(1.5, -2.0))
        );
        assert_eq!(decode::<Point>(Value::from(" ( 3 , 4 ) ")), Ok(Point::new(3.0, 4.0)));
        assert!(matches!(
            decode::<Point>(Value::from("(NaN,1)")),
            Err(DecodeError::NonFinite(_))
        ));
        assert!(matches!(
            decode::<Point>(Value::from("1,2")),
            Err(DecodeError::Invalid { .. })
        ));
    }

    #[test]
    fn test_bytea_hex() {
        assert_eq!(decode_bytea(b"\\x00ff"), Some(vec![0, 255]));
        assert_eq!(decode_bytea(b"\\xzz"), None);
        assert_eq!(decode_bytea(b"plain"), None);
    }

    #[test]
    fn test_bytes_and_utf8() {
        assert_eq!(decode::<Vec<u8>>(Value::Bytes(vec![1, 2])), Ok(vec![1, 2]));
        assert_eq!(
            decode::<String>(Value::Bytes(vec![0xff, 0xfe])),
            Err(DecodeError::InvalidUtf8)
        );
    }
}
