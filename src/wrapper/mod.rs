//! Interface Wrappers
//!
//! Lets interpreted code hand compiled code a value that satisfies a
//! compiled interface. One generic [`InterfaceWrapper`] holds a callable slot
//! per interface method and forwards every invocation to it; a per-interface
//! adapter (registered with the unit, see [`WrapperConstructor`]) makes that
//! wrapper implement the compiled trait.
//!
//! ```text
//! interpreted closures ──► InterfaceWrapper { slots[Next], slots[Start] }
//!                                 │ adapter
//!                                 ▼
//!                       impl mail::Auth for _net_smtp_Auth
//!                                 │
//!                                 ▼
//!                      compiled code calls auth.next(..)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::carrier::{short_name, FuncSignature};
use crate::error::{BridgeError, BridgeResult};
use crate::value::{Callable, Value};

// =============================================================================
// Interface Descriptor
// =============================================================================

/// One method an interface requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub signature: FuncSignature,
}

/// The method set of a compiled interface, ordered by method name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    name: String,
    methods: Vec<MethodSignature>,
}

impl InterfaceDescriptor {
    /// Start a descriptor for the interface with the given qualified name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Add (or replace) a required method
    pub fn method(mut self, name: &str, signature: FuncSignature) -> Self {
        let entry = MethodSignature {
            name: name.to_string(),
            signature,
        };
        match self.index_of(name) {
            Some(i) => self.methods[i] = entry,
            None => {
                self.methods.push(entry);
                self.methods.sort_by(|a, b| a.name.cmp(&b.name));
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    pub fn methods(&self) -> &[MethodSignature] {
        &self.methods
    }

    pub fn index_of(&self, method: &str) -> Option<usize> {
        self.methods
            .binary_search_by(|m| m.name.as_str().cmp(method))
            .ok()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

// =============================================================================
// Interface Wrapper
// =============================================================================

/// Adapter instance forwarding each interface method to an interpreter callable.
///
/// Slots are filled at construction and never change afterwards, so a
/// wrapper can be shared across threads without locking.
#[derive(Clone)]
pub struct InterfaceWrapper {
    descriptor: Arc<InterfaceDescriptor>,
    slots: Vec<Option<Callable>>,
}

impl InterfaceWrapper {
    /// Build a wrapper from method closures keyed by method name.
    ///
    /// Names outside the interface are rejected. Methods without a closure
    /// leave an empty slot; invoking one fails with
    /// [`BridgeError::UnimplementedMethod`].
    pub fn new(
        descriptor: Arc<InterfaceDescriptor>,
        methods: impl IntoIterator<Item = (String, Callable)>,
    ) -> BridgeResult<Self> {
        let mut slots: Vec<Option<Callable>> = vec![None; descriptor.len()];
        for (name, func) in methods {
            let index = descriptor
                .index_of(&name)
                .ok_or_else(|| BridgeError::UnknownMethod {
                    interface: descriptor.name().to_string(),
                    method: name.clone(),
                })?;
            slots[index] = Some(func);
        }
        Ok(Self { descriptor, slots })
    }

    pub fn descriptor(&self) -> &Arc<InterfaceDescriptor> {
        &self.descriptor
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Methods that have no closure
    pub fn missing_methods(&self) -> Vec<&str> {
        self.descriptor
            .methods()
            .iter()
            .zip(&self.slots)
            .filter(|(_, slot)| slot.is_none())
            .map(|(m, _)| m.name.as_str())
            .collect()
    }

    /// Forward a method call to its closure.
    ///
    /// Arguments are passed through unchanged and the closure's results,
    /// error values included, are returned unchanged.
    pub fn invoke(&self, method: &str, args: &[Value]) -> BridgeResult<Vec<Value>> {
        let index = self
            .descriptor
            .index_of(method)
            .ok_or_else(|| BridgeError::UnknownMethod {
                interface: self.descriptor.name().to_string(),
                method: method.to_string(),
            })?;
        match &self.slots[index] {
            Some(func) => {
                tracing::trace!(interface = %self.descriptor.name(), method, "dispatch");
                func(args)
            }
            None => Err(BridgeError::UnimplementedMethod {
                interface: self.descriptor.name().to_string(),
                method: method.to_string(),
            }),
        }
    }
}

impl fmt::Debug for InterfaceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceWrapper")
            .field("interface", &self.descriptor.name())
            .field("missing", &self.missing_methods())
            .finish()
    }
}

// =============================================================================
// Wrapper Constructor
// =============================================================================

/// Turns a generic wrapper into a value satisfying one compiled interface
pub type WrapperAdapter = Arc<dyn Fn(InterfaceWrapper) -> Value + Send + Sync>;

/// Registered constructor for one interface's wrapper type
#[derive(Clone)]
pub struct WrapperConstructor {
    descriptor: Arc<InterfaceDescriptor>,
    type_name: String,
    adapt: WrapperAdapter,
}

impl WrapperConstructor {
    /// Create the constructor for `descriptor`, an interface of unit `unit_id`
    pub fn new<F>(unit_id: &str, descriptor: Arc<InterfaceDescriptor>, adapt: F) -> Self
    where
        F: Fn(InterfaceWrapper) -> Value + Send + Sync + 'static,
    {
        let type_name = wrapper_type_name(unit_id, descriptor.short_name());
        Self {
            descriptor,
            type_name,
            adapt: Arc::new(adapt),
        }
    }

    pub fn descriptor(&self) -> &Arc<InterfaceDescriptor> {
        &self.descriptor
    }

    /// Derived wrapper type name, e.g. `_net_smtp_Auth`
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Build an interface value; missing methods fail only when invoked
    pub fn construct(&self, methods: HashMap<String, Callable>) -> BridgeResult<Value> {
        let wrapper = InterfaceWrapper::new(Arc::clone(&self.descriptor), methods)?;
        if !wrapper.is_complete() {
            tracing::warn!(
                wrapper = %self.type_name,
                missing = ?wrapper.missing_methods(),
                "interface wrapper constructed with unimplemented methods"
            );
        }
        Ok((self.adapt)(wrapper))
    }

    /// Build an interface value, rejecting partial implementations up front
    pub fn construct_complete(&self, methods: HashMap<String, Callable>) -> BridgeResult<Value> {
        let wrapper = InterfaceWrapper::new(Arc::clone(&self.descriptor), methods)?;
        if let Some(method) = wrapper.missing_methods().first() {
            return Err(BridgeError::UnimplementedMethod {
                interface: self.descriptor.name().to_string(),
                method: method.to_string(),
            });
        }
        Ok((self.adapt)(wrapper))
    }
}

impl fmt::Debug for WrapperConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperConstructor")
            .field("type_name", &self.type_name)
            .field("interface", &self.descriptor.name())
            .finish()
    }
}

/// Symbol name a unit registers an interface's wrapper under (`_Auth`)
pub fn wrapper_symbol(interface: &str) -> String {
    format!("_{}", interface)
}

/// Wrapper type name derived from unit and interface (`_net_smtp_Auth`)
pub fn wrapper_type_name(unit_id: &str, interface: &str) -> String {
    let unit: String = unit_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("_{}_{}", unit, interface)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::TypeRef;
    use crate::value::{callable, ErrorValue};

    fn auth_descriptor() -> Arc<InterfaceDescriptor> {
        Arc::new(
            InterfaceDescriptor::new("net/smtp.Auth")
                .method(
                    "Start",
                    FuncSignature::new(
                        vec![TypeRef::named("net/smtp.ServerInfo")],
                        vec![TypeRef::String, TypeRef::Bytes, TypeRef::Error],
                    ),
                )
                .method(
                    "Next",
                    FuncSignature::new(
                        vec![TypeRef::Bytes, TypeRef::Bool],
                        vec![TypeRef::Bytes, TypeRef::Error],
                    ),
                ),
        )
    }

    #[test]
    fn test_descriptor_orders_methods() {
        let desc = auth_descriptor();
        let names: Vec<_> = desc.methods().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Next", "Start"]);
        assert_eq!(desc.index_of("Start"), Some(1));
        assert_eq!(desc.index_of("Close"), None);
        assert_eq!(desc.short_name(), "Auth");
    }

    #[test]
    fn test_invoke_forwards_unchanged() {
        let expired = ErrorValue::from_error(std::io::Error::new(
            std::io::ErrorKind::Other,
            "unexpected challenge",
        ));
        let returned = expired.clone();
        let next = callable(move |args| {
            let more = matches!(args.get(1), Some(Value::Bool(true)));
            if more {
                Ok(vec![Value::Nil, Value::Error(returned.clone())])
            } else {
                Ok(vec![args[0].clone(), Value::Nil])
            }
        });
        let wrapper =
            InterfaceWrapper::new(auth_descriptor(), vec![("Next".to_string(), next.clone())])
                .unwrap();

        let args = [Value::Bytes(b"x".to_vec()), Value::Bool(false)];
        assert_eq!(wrapper.invoke("Next", &args).unwrap(), next(&args[..]).unwrap());

        let args = [Value::Bytes(b"x".to_vec()), Value::Bool(true)];
        let out = wrapper.invoke("Next", &args).unwrap();
        assert_eq!(out, next(&args[..]).unwrap());
        match &out[1] {
            Value::Error(err) => {
                assert!(err.ptr_eq(&expired));
                assert!(err.downcast_ref::<std::io::Error>().is_some());
            }
            other => panic!("expected error value, got {:?}", other),
        }

        // Same text, different compiled error
        let lookalike = ErrorValue::from_error(std::io::Error::new(
            std::io::ErrorKind::Other,
            "unexpected challenge",
        ));
        assert_eq!(lookalike, expired);
        assert!(!lookalike.ptr_eq(&expired));
    }

    #[test]
    fn test_unpopulated_slot() {
        let wrapper = InterfaceWrapper::new(
            auth_descriptor(),
            vec![("Next".to_string(), callable(|_| Ok(vec![Value::Nil, Value::Nil])))],
        )
        .unwrap();

        assert!(!wrapper.is_complete());
        assert_eq!(wrapper.missing_methods(), vec!["Start"]);
        assert_eq!(
            wrapper.invoke("Start", &[Value::Nil]).unwrap_err(),
            BridgeError::UnimplementedMethod {
                interface: "net/smtp.Auth".to_string(),
                method: "Start".to_string(),
            }
        );
        assert!(matches!(
            wrapper.invoke("Close", &[]),
            Err(BridgeError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_unknown_closure_rejected() {
        let err = InterfaceWrapper::new(
            auth_descriptor(),
            vec![("Login".to_string(), callable(|_| Ok(vec![])))],
        )
        .unwrap_err();
        assert_eq!(
            err,
            BridgeError::UnknownMethod {
                interface: "net/smtp.Auth".to_string(),
                method: "Login".to_string(),
            }
        );
    }

    #[test]
    fn test_constructor_strictness() {
        let ctor = WrapperConstructor::new("net/smtp", auth_descriptor(), |w| {
            Value::object("net/smtp.Auth", w)
        });
        assert_eq!(ctor.type_name(), "_net_smtp_Auth");

        let mut methods = HashMap::new();
        methods.insert(
            "Next".to_string(),
            callable(|_| Ok(vec![Value::Nil, Value::Nil])),
        );

        let value = ctor.construct(methods.clone()).unwrap();
        let wrapper = value
            .downcast_object::<InterfaceWrapper>("net/smtp.Auth")
            .unwrap();
        assert_eq!(wrapper.missing_methods(), vec!["Start"]);

        assert!(matches!(
            ctor.construct_complete(methods),
            Err(BridgeError::UnimplementedMethod { .. })
        ));
    }

    #[test]
    fn test_derived_names() {
        assert_eq!(wrapper_symbol("Auth"), "_Auth");
        assert_eq!(wrapper_type_name("net/smtp", "Auth"), "_net_smtp_Auth");
        assert_eq!(
            wrapper_type_name("golang.org/x/net/proxy", "Dialer"),
            "_golang_org_x_net_proxy_Dialer"
        );
    }
}
