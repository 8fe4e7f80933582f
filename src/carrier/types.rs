//! Carrier Type System
//!
//! Symbol kinds, type references, function signatures and type descriptors
//! used to check how a carried value is used.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::value::{callable, Callable, Value};
use crate::wrapper::InterfaceDescriptor;

/// The kind of entity a carrier holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    /// Exported function
    Function,
    /// Exported constant
    Constant,
    /// Exported variable (shared mutable cell)
    Variable,
    /// Type definition
    Type,
    /// Constructor for an interface wrapper
    InterfaceWrapper,
}

impl SymbolKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Constant => "constant",
            SymbolKind::Variable => "variable",
            SymbolKind::Type => "type",
            SymbolKind::InterfaceWrapper => "interface-wrapper",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Type References
// =============================================================================

/// Static type of a parameter, result, field or variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// Accepts every value
    Any,
    Bool,
    Int,
    Float,
    String,
    /// Byte slice (nil-able)
    Bytes,
    /// Error value (nil-able)
    Error,
    /// Function value (nil-able)
    Func,
    /// Homogeneous list (nil-able)
    List(Box<TypeRef>),
    /// Registered object type by qualified name (nil-able)
    Named(Cow<'static, str>),
}

impl TypeRef {
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn list(elem: TypeRef) -> Self {
        TypeRef::List(Box::new(elem))
    }

    /// Whether `nil` is a valid value of this type
    pub fn is_nillable(&self) -> bool {
        matches!(
            self,
            TypeRef::Any
                | TypeRef::Bytes
                | TypeRef::Error
                | TypeRef::Func
                | TypeRef::List(_)
                | TypeRef::Named(_)
        )
    }

    /// Check whether a value may be passed where this type is expected
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeRef::Any, _) => true,
            (ty, Value::Nil) => ty.is_nillable(),
            (TypeRef::Bool, Value::Bool(_))
            | (TypeRef::Int, Value::Int(_))
            | (TypeRef::Float, Value::Float(_))
            | (TypeRef::String, Value::Str(_))
            | (TypeRef::Bytes, Value::Bytes(_))
            | (TypeRef::Error, Value::Error(_))
            | (TypeRef::Func, Value::Func(_)) => true,
            (TypeRef::List(elem), Value::List(items)) => items.iter().all(|v| elem.accepts(v)),
            (TypeRef::Named(name), Value::Object(obj)) => obj.type_name() == name.as_ref(),
            _ => false,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Any => write!(f, "any"),
            TypeRef::Bool => write!(f, "bool"),
            TypeRef::Int => write!(f, "int"),
            TypeRef::Float => write!(f, "float"),
            TypeRef::String => write!(f, "string"),
            TypeRef::Bytes => write!(f, "[]byte"),
            TypeRef::Error => write!(f, "error"),
            TypeRef::Func => write!(f, "func"),
            TypeRef::List(elem) => write!(f, "[]{}", elem),
            TypeRef::Named(name) => write!(f, "{}", name),
        }
    }
}

// =============================================================================
// Function Signatures
// =============================================================================

/// Parameter and result types of a function or method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncSignature {
    /// Parameter types
    pub params: Vec<TypeRef>,
    /// Result types
    pub results: Vec<TypeRef>,
    /// Last parameter repeats zero or more times
    pub variadic: bool,
}

impl FuncSignature {
    pub fn new(params: Vec<TypeRef>, results: Vec<TypeRef>) -> Self {
        Self {
            params,
            results,
            variadic: false,
        }
    }

    pub fn variadic(params: Vec<TypeRef>, results: Vec<TypeRef>) -> Self {
        Self {
            params,
            results,
            variadic: true,
        }
    }

    /// Validate argument count and argument types
    pub fn validate_args(&self, context: &str, args: &[Value]) -> BridgeResult<()> {
        let arity_ok = if self.variadic {
            args.len() + 1 >= self.params.len()
        } else {
            args.len() == self.params.len()
        };
        if !arity_ok {
            return Err(BridgeError::ArgCount {
                context: context.to_string(),
                expected: self.params.len(),
                got: args.len(),
            });
        }

        for (i, value) in args.iter().enumerate() {
            // Arity check guarantees a last parameter exists for extra variadic args
            let Some(ty) = self.params.get(i).or_else(|| self.params.last()) else {
                break;
            };
            if !ty.accepts(value) {
                return Err(BridgeError::mismatch(
                    format!("{} argument {}", context, i),
                    ty.to_string(),
                    value.type_name(),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for FuncSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if self.variadic && i + 1 == self.params.len() {
                write!(f, "...")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")?;
        match self.results.as_slice() {
            [] => Ok(()),
            [single] => write!(f, " {}", single),
            many => {
                write!(f, " (")?;
                for (i, result) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", result)?;
                }
                write!(f, ")")
            }
        }
    }
}

// =============================================================================
// Type Descriptors
// =============================================================================

/// Shape of a registered type
#[derive(Debug, Clone)]
pub enum TypeKind {
    Struct,
    Interface(Arc<InterfaceDescriptor>),
}

/// A method reachable through a type descriptor.
///
/// The callable receives the receiver as its first argument; `signature`
/// describes the remaining arguments.
#[derive(Clone)]
pub struct Method {
    pub signature: FuncSignature,
    func: Callable,
}

/// A readable field of a struct type
#[derive(Clone)]
pub struct Field {
    pub ty: TypeRef,
    get: Callable,
}

/// Runtime description of a compiled type: its name, shape, method set,
/// readable fields and optional constructor.
///
/// This is what the interpreter consults instead of reflecting over the
/// compiled type.
#[derive(Clone)]
pub struct TypeDescriptor {
    name: String,
    kind: TypeKind,
    methods: BTreeMap<String, Method>,
    fields: BTreeMap<String, Field>,
    constructor: Option<Method>,
}

impl TypeDescriptor {
    /// Describe a struct type
    pub fn structure(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Struct,
            methods: BTreeMap::new(),
            fields: BTreeMap::new(),
            constructor: None,
        }
    }

    /// Describe an interface type; its name is the interface's qualified name
    pub fn interface(descriptor: Arc<InterfaceDescriptor>) -> Self {
        Self {
            name: descriptor.name().to_string(),
            kind: TypeKind::Interface(descriptor),
            methods: BTreeMap::new(),
            fields: BTreeMap::new(),
            constructor: None,
        }
    }

    /// Add a method; `f` receives the receiver followed by the arguments
    pub fn with_method<F>(mut self, name: &str, signature: FuncSignature, f: F) -> Self
    where
        F: Fn(&[Value]) -> BridgeResult<Vec<Value>> + Send + Sync + 'static,
    {
        self.methods.insert(
            name.to_string(),
            Method {
                signature,
                func: callable(f),
            },
        );
        self
    }

    /// Add a readable field; `get` receives the receiver and returns the field value
    pub fn with_field<F>(mut self, name: &str, ty: TypeRef, get: F) -> Self
    where
        F: Fn(&Value) -> BridgeResult<Value> + Send + Sync + 'static,
    {
        self.fields.insert(
            name.to_string(),
            Field {
                ty,
                get: callable(move |args| Ok(vec![get(&args[0])?])),
            },
        );
        self
    }

    /// Set the constructor used by interpreted code to build values of this type
    pub fn with_constructor<F>(mut self, signature: FuncSignature, f: F) -> Self
    where
        F: Fn(&[Value]) -> BridgeResult<Value> + Send + Sync + 'static,
    {
        self.constructor = Some(Method {
            signature,
            func: callable(move |args| Ok(vec![f(args)?])),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unqualified name (`Client` for `net/smtp.Client`)
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn interface_descriptor(&self) -> Option<&Arc<InterfaceDescriptor>> {
        match &self.kind {
            TypeKind::Interface(descriptor) => Some(descriptor),
            TypeKind::Struct => None,
        }
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn method(&self, name: &str) -> BridgeResult<&Method> {
        self.methods
            .get(name)
            .ok_or_else(|| BridgeError::UnknownMethod {
                interface: self.name.clone(),
                method: name.to_string(),
            })
    }

    /// Call a method on `receiver`
    pub fn call_method(
        &self,
        receiver: &Value,
        name: &str,
        args: &[Value],
    ) -> BridgeResult<Vec<Value>> {
        self.check_receiver(receiver)?;
        let method = self.method(name)?;
        method
            .signature
            .validate_args(&format!("{}.{}", self.name, name), args)?;

        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(receiver.clone());
        full.extend_from_slice(args);
        (method.func)(&full)
    }

    /// Read a field of `receiver`
    pub fn get_field(&self, receiver: &Value, name: &str) -> BridgeResult<Value> {
        self.check_receiver(receiver)?;
        let field = self
            .fields
            .get(name)
            .ok_or_else(|| BridgeError::not_found(self.name.as_str(), name))?;
        let mut out = (field.get)(std::slice::from_ref(receiver))?;
        Ok(out.pop().unwrap_or(Value::Nil))
    }

    /// Build a new value of this type
    pub fn construct(&self, args: &[Value]) -> BridgeResult<Value> {
        let ctor = self.constructor.as_ref().ok_or_else(|| {
            BridgeError::mismatch(self.name.as_str(), "constructible type", "no constructor")
        })?;
        ctor.signature.validate_args(&self.name, args)?;
        let mut out = (ctor.func)(args)?;
        Ok(out.pop().unwrap_or(Value::Nil))
    }

    /// Stable one-line description of the type's shape
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self
            .fields
            .iter()
            .map(|(name, field)| format!("{} {}", name, field.ty))
            .collect();
        parts.extend(
            self.methods
                .iter()
                .map(|(name, method)| format!("{}{}", name, method.signature)),
        );
        let shape = match self.kind {
            TypeKind::Struct => "struct",
            TypeKind::Interface(_) => "interface",
        };
        if parts.is_empty() {
            format!("{} {{}}", shape)
        } else {
            format!("{} {{ {} }}", shape, parts.join("; "))
        }
    }

    fn check_receiver(&self, receiver: &Value) -> BridgeResult<()> {
        match receiver {
            Value::Object(obj) if obj.type_name() == self.name => Ok(()),
            other => Err(BridgeError::mismatch(
                format!("{} receiver", self.name),
                self.name.as_str(),
                other.type_name(),
            )),
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("constructor", &self.constructor.is_some())
            .finish()
    }
}

/// Last segment of a qualified name (`Auth` for `net/smtp.Auth`)
pub fn short_name(qualified: &str) -> &str {
    let tail = qualified.rsplit('/').next().unwrap_or(qualified);
    tail.rsplit_once('.').map_or(tail, |(_, name)| name)
}
