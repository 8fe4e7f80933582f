//! Conversions between Rust types and [`Value`]

use super::{Callable, ErrorValue, Object, Value};
use crate::error::{BridgeError, BridgeResult};

/// Convert a Rust value into a bridge value
pub trait IntoValue {
    fn into_value(self) -> Value;
}

/// Extract a Rust value from a bridge value
pub trait FromValue: Sized {
    /// Type name reported when extraction fails
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

/// Extract argument `index` for `context`, reporting arity and type failures
pub fn arg<T: FromValue>(args: &[Value], index: usize, context: &str) -> BridgeResult<T> {
    extract(args, index, context, "argument")
}

/// Extract result `index` of a call made through `context`
pub fn result<T: FromValue>(results: &[Value], index: usize, context: &str) -> BridgeResult<T> {
    extract(results, index, context, "result")
}

fn extract<T: FromValue>(
    values: &[Value],
    index: usize,
    context: &str,
    what: &str,
) -> BridgeResult<T> {
    let value = values.get(index).ok_or_else(|| BridgeError::ArgCount {
        context: format!("{} ({}s)", context, what),
        expected: index + 1,
        got: values.len(),
    })?;
    T::from_value(value).ok_or_else(|| {
        BridgeError::mismatch(
            format!("{} {} {}", context, what, index),
            T::EXPECTED,
            value.type_name(),
        )
    })
}

// =============================================================================
// IntoValue
// =============================================================================

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for u16 {
    fn into_value(self) -> Value {
        Value::Int(i64::from(self))
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Str(self.to_string())
    }
}

impl IntoValue for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Bytes(self)
    }
}

impl IntoValue for &[u8] {
    fn into_value(self) -> Value {
        Value::Bytes(self.to_vec())
    }
}

impl IntoValue for Vec<String> {
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(Value::Str).collect())
    }
}

impl IntoValue for ErrorValue {
    fn into_value(self) -> Value {
        Value::Error(self)
    }
}

impl IntoValue for Object {
    fn into_value(self) -> Value {
        Value::Object(self)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        self.map_or(Value::Nil, IntoValue::into_value)
    }
}

// =============================================================================
// FromValue
// =============================================================================

impl FromValue for Value {
    const EXPECTED: &'static str = "any";

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "bool";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "int";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "float";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// A nil slice reads as empty
impl FromValue for Vec<u8> {
    const EXPECTED: &'static str = "[]byte";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(b.clone()),
            Value::Nil => Some(Vec::new()),
            _ => None,
        }
    }
}

impl FromValue for Vec<String> {
    const EXPECTED: &'static str = "[]string";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) => items.iter().map(String::from_value).collect(),
            Value::Nil => Some(Vec::new()),
            _ => None,
        }
    }
}

impl FromValue for ErrorValue {
    const EXPECTED: &'static str = "error";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Error(e) => Some(e.clone()),
            _ => None,
        }
    }
}

impl FromValue for Callable {
    const EXPECTED: &'static str = "func";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Func(f) => Some(f.clone()),
            _ => None,
        }
    }
}

impl FromValue for Object {
    const EXPECTED: &'static str = "object";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_object().cloned()
    }
}

/// Nil reads as `None`; anything else must convert to `T`
impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Nil => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_extraction() {
        let args = vec![Value::Str("alice".into()), Value::Bool(true)];
        assert_eq!(arg::<String>(&args, 0, "Login").unwrap(), "alice");
        assert!(arg::<bool>(&args, 1, "Login").unwrap());

        match arg::<i64>(&args, 0, "Login") {
            Err(BridgeError::TypeMismatch {
                context,
                expected,
                found,
            }) => {
                assert_eq!(context, "Login argument 0");
                assert_eq!(expected, "int");
                assert_eq!(found, "string");
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }

        assert!(matches!(
            arg::<bool>(&args, 2, "Login"),
            Err(BridgeError::ArgCount {
                expected: 3,
                got: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_nil_handling() {
        assert_eq!(Vec::<u8>::from_value(&Value::Nil), Some(Vec::new()));
        assert_eq!(Option::<String>::from_value(&Value::Nil), Some(None));
        assert_eq!(
            Option::<String>::from_value(&Value::Str("x".into())),
            Some(Some("x".to_string()))
        );
        assert_eq!(Option::<String>::from_value(&Value::Int(1)), None);
        assert!(String::from_value(&Value::Nil).is_none());
    }

    #[test]
    fn test_string_lists() {
        let v = vec!["PLAIN".to_string(), "CRAM-MD5".to_string()].into_value();
        assert_eq!(
            Vec::<String>::from_value(&v),
            Some(vec!["PLAIN".to_string(), "CRAM-MD5".to_string()])
        );
        let mixed = Value::List(vec![Value::Str("a".into()), Value::Int(2)]);
        assert_eq!(Vec::<String>::from_value(&mixed), None);
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(None::<Vec<u8>>.into_value(), Value::Nil);
        assert_eq!(Some(b"hi".to_vec()).into_value(), Value::Bytes(b"hi".to_vec()));
    }
}
