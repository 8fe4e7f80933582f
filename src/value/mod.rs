//! Interpreter Values
//!
//! The dynamic value model the interpreter and compiled code exchange across
//! the bridge. Scalars are copied, compiled-world objects travel as
//! type-erased [`Object`]s, and errors raised by compiled code travel as
//! [`ErrorValue`]s so the interpreter sees them unchanged.
//!
//! # Example
//!
//! ```
//! use neurlang_bridge::value::{FromValue, IntoValue, Value};
//!
//! let v = "mail.example.com".into_value();
//! assert_eq!(v.type_name(), "string");
//! assert_eq!(String::from_value(&v).as_deref(), Some("mail.example.com"));
//! ```

mod convert;

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};

pub use convert::{arg, result, FromValue, IntoValue};

/// A callable usable from either side of the bridge.
///
/// Compiled functions and interpreter closures share this shape: positional
/// arguments in, the full result tuple out. Errors belonging to the called
/// code are returned inside the tuple as [`Value::Error`]; the outer
/// `Result` is reserved for bridge failures.
pub type Callable = Arc<dyn Fn(&[Value]) -> BridgeResult<Vec<Value>> + Send + Sync>;

/// Wrap a closure as a [`Callable`]
pub fn callable<F>(f: F) -> Callable
where
    F: Fn(&[Value]) -> BridgeResult<Vec<Value>> + Send + Sync + 'static,
{
    Arc::new(f)
}

// =============================================================================
// Error Values
// =============================================================================

/// An error value as seen by interpreted code.
///
/// When built from a compiled error the original is kept, so callers on
/// either side can downcast back to the concrete error type.
#[derive(Clone)]
pub struct ErrorValue {
    message: String,
    source: Option<Arc<dyn Error + Send + Sync>>,
}

impl ErrorValue {
    /// Create an error carrying only a message (interpreter-raised errors)
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Capture a compiled error, keeping the original value
    pub fn from_error<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether both values carry the same compiled error instance.
    ///
    /// Message-only errors have no instance and never match.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.source, &other.source) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Recover the compiled error this value was built from
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.source.as_deref()?.downcast_ref::<E>()
    }
}

impl fmt::Debug for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorValue")
            .field("message", &self.message)
            .field("compiled", &self.source.is_some())
            .finish()
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ErrorValue {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Errors compare by message; use [`ErrorValue::ptr_eq`] to tell apart
/// distinct compiled errors with the same text.
impl PartialEq for ErrorValue {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
    }
}

// =============================================================================
// Objects
// =============================================================================

/// A compiled-world value held by reference (struct pointers, interface
/// values, connections).
///
/// `type_name` is the qualified name the value was registered under, e.g.
/// `net/smtp.Client`; it is what signatures check and what method lookup
/// resolves against.
#[derive(Clone)]
pub struct Object {
    type_name: Arc<str>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Object {
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<Arc<str>>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            inner: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.inner).downcast_ref::<T>()
    }

    /// Identity comparison (same underlying allocation)
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object<{}>", self.type_name)
    }
}

// =============================================================================
// Value
// =============================================================================

/// A value crossing the bridge
#[derive(Clone)]
pub enum Value {
    /// Absent value (nil pointer, nil slice, nil error, nil interface)
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Error returned by called code
    Error(ErrorValue),
    /// First-class function (compiled function or interpreter closure)
    Func(Callable),
    /// Compiled-world object held by reference
    Object(Object),
}

impl Value {
    /// Build an object value
    pub fn object<T: Any + Send + Sync>(type_name: impl Into<Arc<str>>, value: T) -> Self {
        Value::Object(Object::new(type_name, value))
    }

    /// Build an error value from a compiled error
    pub fn error<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Value::Error(ErrorValue::from_error(err))
    }

    /// Build a function value from a closure
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> BridgeResult<Vec<Value>> + Send + Sync + 'static,
    {
        Value::Func(callable(f))
    }

    /// `(T, error)` result tuple: `[value, nil]` or `[nil, err]`
    pub fn pair<T: IntoValue, E: Error + Send + Sync + 'static>(res: Result<T, E>) -> Vec<Value> {
        match res {
            Ok(v) => vec![v.into_value(), Value::Nil],
            Err(e) => vec![Value::Nil, Value::error(e)],
        }
    }

    /// Lone `error` result: nil on success
    pub fn status<E: Error + Send + Sync + 'static>(res: Result<(), E>) -> Value {
        match res {
            Ok(()) => Value::Nil,
            Err(e) => Value::error(e),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Name of this value's dynamic type, used in diagnostics and type checks
    pub fn type_name(&self) -> &str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "[]byte",
            Value::List(_) => "list",
            Value::Error(_) => "error",
            Value::Func(_) => "func",
            Value::Object(obj) => obj.type_name(),
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Borrow the concrete payload of an object value.
    ///
    /// Fails with a type mismatch naming `expected` when the value is not an
    /// object or holds a different concrete type.
    pub fn downcast_object<T: Any>(&self, expected: &str) -> BridgeResult<&T> {
        self.as_object()
            .and_then(|obj| obj.downcast_ref::<T>())
            .ok_or_else(|| BridgeError::mismatch("object access", expected, self.type_name()))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Bytes(b) => write!(f, "Bytes({:?})", String::from_utf8_lossy(b)),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Error(e) => write!(f, "Error({:?})", e.message()),
            Value::Func(func) => write!(f, "Func({:p})", Arc::as_ptr(func)),
            Value::Object(obj) => write!(f, "{:?}", obj),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Refused(u16);

    impl fmt::Display for Refused {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "refused with {}", self.0)
        }
    }

    impl Error for Refused {}

    #[test]
    fn test_error_value_keeps_compiled_error() {
        let err = ErrorValue::from_error(Refused(554));
        assert_eq!(err.message(), "refused with 554");
        assert_eq!(err.downcast_ref::<Refused>().map(|r| r.0), Some(554));
        assert!(err.source().is_some());

        let plain = ErrorValue::new("refused with 554");
        assert!(plain.downcast_ref::<Refused>().is_none());
        assert_eq!(err, plain);
    }

    #[test]
    fn test_pair_and_status() {
        let ok: Result<i64, Refused> = Ok(7);
        assert_eq!(Value::pair(ok), vec![Value::Int(7), Value::Nil]);

        let failed: Result<i64, Refused> = Err(Refused(421));
        let out = Value::pair(failed);
        assert!(out[0].is_nil());
        assert_eq!(out[1].type_name(), "error");

        assert!(Value::status::<Refused>(Ok(())).is_nil());
    }

    #[test]
    fn test_object_identity_and_downcast() {
        let a = Value::object("test.Counter", 41u32);
        let b = a.clone();
        let c = Value::object("test.Counter", 41u32);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.type_name(), "test.Counter");
        assert_eq!(*a.downcast_object::<u32>("test.Counter").unwrap(), 41);

        let err = a.downcast_object::<String>("test.Name").unwrap_err();
        assert!(matches!(err, BridgeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_func_values_compare_by_identity() {
        let f = Value::func(|args| Ok(args.to_vec()));
        let g = f.clone();
        assert_eq!(f, g);
        assert_ne!(f, Value::func(|args| Ok(args.to_vec())));
    }
}
