//! Value Carriers
//!
//! A [`ValueCarrier`] holds exactly one compiled-world entity (function,
//! constant, variable, type or interface-wrapper constructor) behind a
//! uniform handle the interpreter can look up by name.
//!
//! # Architecture
//!
//! ```text
//! Interpreted program
//!       │
//!       ▼
//! registry.lookup("net/smtp", "Dial")
//!       │
//!       ▼
//! ValueCarrier { kind: Function, signature, callable }
//!       │  capability check + argument validation
//!       ▼
//! Compiled function
//! ```
//!
//! Carriers are immutable once created. Cloning shares the same payload, so
//! identity survives every lookup. Using a carrier as the wrong kind (calling
//! a constant, reading a type as a value) fails with
//! [`BridgeError::TypeMismatch`].

mod types;

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{BridgeError, BridgeResult};
use crate::value::{callable, Callable, IntoValue, Value};
use crate::wrapper::WrapperConstructor;

pub use types::{
    short_name, Field, FuncSignature, Method, SymbolKind, TypeDescriptor, TypeKind, TypeRef,
};

enum Payload {
    Function {
        signature: FuncSignature,
        func: Callable,
    },
    Constant(Value),
    Variable {
        ty: TypeRef,
        cell: RwLock<Value>,
    },
    Type(Arc<TypeDescriptor>),
    Wrapper(WrapperConstructor),
}

struct Inner {
    name: String,
    payload: Payload,
}

/// Type-erased handle to one compiled-world entity
#[derive(Clone)]
pub struct ValueCarrier {
    inner: Arc<Inner>,
}

impl ValueCarrier {
    fn from_payload(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                payload,
            }),
        }
    }

    /// Carry a function
    pub fn function<F>(name: impl Into<String>, signature: FuncSignature, f: F) -> Self
    where
        F: Fn(&[Value]) -> BridgeResult<Vec<Value>> + Send + Sync + 'static,
    {
        Self::from_callable(name, signature, callable(f))
    }

    /// Carry an existing callable
    pub fn from_callable(name: impl Into<String>, signature: FuncSignature, func: Callable) -> Self {
        Self::from_payload(name, Payload::Function { signature, func })
    }

    /// Carry a constant
    pub fn constant(name: impl Into<String>, value: impl IntoValue) -> Self {
        Self::from_payload(name, Payload::Constant(value.into_value()))
    }

    /// Carry an exported variable with its declared type
    pub fn variable(name: impl Into<String>, ty: TypeRef, initial: impl IntoValue) -> Self {
        Self::from_payload(
            name,
            Payload::Variable {
                ty,
                cell: RwLock::new(initial.into_value()),
            },
        )
    }

    /// Carry a type definition
    pub fn type_def(descriptor: TypeDescriptor) -> Self {
        Self::from_payload(
            descriptor.name().to_string(),
            Payload::Type(Arc::new(descriptor)),
        )
    }

    /// Carry an interface-wrapper constructor
    pub fn wrapper(constructor: WrapperConstructor) -> Self {
        Self::from_payload(
            constructor.type_name().to_string(),
            Payload::Wrapper(constructor),
        )
    }

    /// Qualified name of the carried entity (diagnostics only)
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> SymbolKind {
        match &self.inner.payload {
            Payload::Function { .. } => SymbolKind::Function,
            Payload::Constant(_) => SymbolKind::Constant,
            Payload::Variable { .. } => SymbolKind::Variable,
            Payload::Type(_) => SymbolKind::Type,
            Payload::Wrapper(_) => SymbolKind::InterfaceWrapper,
        }
    }

    /// Function signature, if this carrier holds a function
    pub fn signature(&self) -> Option<&FuncSignature> {
        match &self.inner.payload {
            Payload::Function { signature, .. } => Some(signature),
            _ => None,
        }
    }

    /// Invoke a carried function after validating the arguments
    pub fn call(&self, args: &[Value]) -> BridgeResult<Vec<Value>> {
        let Payload::Function { signature, func } = &self.inner.payload else {
            return Err(self.wrong_kind("function"));
        };
        signature.validate_args(&self.inner.name, args)?;
        tracing::trace!(function = %self.inner.name, args = args.len(), "call");
        func(args)
    }

    /// Expose a carried function as a first-class callable.
    ///
    /// The returned callable validates its arguments like [`call`](Self::call).
    pub fn callable(&self) -> BridgeResult<Callable> {
        if self.kind() != SymbolKind::Function {
            return Err(self.wrong_kind("function"));
        }
        let carrier = self.clone();
        Ok(callable(move |args| carrier.call(args)))
    }

    /// Read a constant or the current value of a variable
    pub fn value(&self) -> BridgeResult<Value> {
        match &self.inner.payload {
            Payload::Constant(value) => Ok(value.clone()),
            Payload::Variable { cell, .. } => Ok(cell.read().clone()),
            _ => Err(self.wrong_kind("constant or variable")),
        }
    }

    /// Assign a variable; the value must match the declared type
    pub fn store(&self, value: Value) -> BridgeResult<()> {
        let Payload::Variable { ty, cell } = &self.inner.payload else {
            return Err(self.wrong_kind("variable"));
        };
        if !ty.accepts(&value) {
            return Err(BridgeError::mismatch(
                format!("assignment to {}", self.inner.name),
                ty.to_string(),
                value.type_name(),
            ));
        }
        *cell.write() = value;
        Ok(())
    }

    pub fn type_descriptor(&self) -> BridgeResult<Arc<TypeDescriptor>> {
        match &self.inner.payload {
            Payload::Type(descriptor) => Ok(Arc::clone(descriptor)),
            _ => Err(self.wrong_kind("type")),
        }
    }

    pub fn wrapper_constructor(&self) -> BridgeResult<&WrapperConstructor> {
        match &self.inner.payload {
            Payload::Wrapper(constructor) => Ok(constructor),
            _ => Err(self.wrong_kind("interface-wrapper")),
        }
    }

    /// Whether both handles carry the same entity
    pub fn ptr_eq(&self, other: &ValueCarrier) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stable description of the carried entity (used for fingerprints and listings)
    pub fn describe(&self) -> String {
        match &self.inner.payload {
            Payload::Function { signature, .. } => signature.to_string(),
            Payload::Constant(value) => format!("const {}", value.type_name()),
            Payload::Variable { ty, .. } => format!("var {}", ty),
            Payload::Type(descriptor) => descriptor.describe(),
            Payload::Wrapper(constructor) => format!(
                "wrapper {} for {}",
                constructor.type_name(),
                constructor.descriptor().name()
            ),
        }
    }

    fn wrong_kind(&self, expected: &str) -> BridgeError {
        BridgeError::mismatch(self.inner.name.as_str(), expected, self.kind().as_str())
    }
}

impl fmt::Debug for ValueCarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCarrier")
            .field("name", &self.inner.name)
            .field("kind", &self.kind())
            .field("shape", &self.describe())
            .finish()
    }
}
