//! Runtime Facade
//!
//! What an interpreter runtime holds: a shared [`SymbolRegistry`] plus the
//! configuration, with operations keyed by qualified names such as
//! `net/smtp.Dial`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::carrier::{TypeDescriptor, ValueCarrier};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::SymbolRegistry;
use crate::stdlib;
use crate::value::{Callable, Value};
use crate::wrapper::wrapper_symbol;

/// Interpreter-facing access to registered library units
#[derive(Debug, Clone)]
pub struct Bridge {
    registry: Arc<SymbolRegistry>,
    config: BridgeConfig,
}

impl Bridge {
    pub fn new(registry: Arc<SymbolRegistry>, config: BridgeConfig) -> Self {
        Self { registry, config }
    }

    /// Fresh registry holding every shipped unit the configuration enables
    pub fn with_stdlib(config: BridgeConfig) -> BridgeResult<Self> {
        let registry = SymbolRegistry::new();
        stdlib::register_all(&registry, &config)?;
        Ok(Self::new(Arc::new(registry), config))
    }

    pub fn registry(&self) -> &Arc<SymbolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Look up a symbol by qualified name (`net/smtp.Dial`)
    pub fn resolve(&self, qualified: &str) -> BridgeResult<ValueCarrier> {
        let (unit, symbol) = split_qualified(qualified)?;
        self.registry.lookup(unit, symbol)
    }

    /// Call a registered function
    pub fn call(&self, qualified: &str, args: &[Value]) -> BridgeResult<Vec<Value>> {
        self.resolve(qualified)?.call(args)
    }

    /// Type descriptor for an object value's registered type
    pub fn type_of(&self, value: &Value) -> BridgeResult<Arc<TypeDescriptor>> {
        let obj = value
            .as_object()
            .ok_or_else(|| BridgeError::mismatch("method receiver", "object", value.type_name()))?;
        self.resolve(obj.type_name())?.type_descriptor()
    }

    /// Call a method on an object value
    pub fn call_method(
        &self,
        receiver: &Value,
        method: &str,
        args: &[Value],
    ) -> BridgeResult<Vec<Value>> {
        self.type_of(receiver)?.call_method(receiver, method, args)
    }

    /// Read a field of an object value
    pub fn field(&self, receiver: &Value, name: &str) -> BridgeResult<Value> {
        self.type_of(receiver)?.get_field(receiver, name)
    }

    /// Build a value of a registered type (`net/smtp.ServerInfo`)
    pub fn construct(&self, qualified_type: &str, args: &[Value]) -> BridgeResult<Value> {
        self.resolve(qualified_type)?
            .type_descriptor()?
            .construct(args)
    }

    /// Implement a compiled interface with interpreter closures.
    ///
    /// With `wrappers.require_complete` set, every interface method needs a
    /// closure; otherwise missing ones fail when invoked.
    pub fn implement(
        &self,
        unit: &str,
        interface: &str,
        methods: HashMap<String, Callable>,
    ) -> BridgeResult<Value> {
        let carrier = self.registry.lookup(unit, &wrapper_symbol(interface))?;
        let constructor = carrier.wrapper_constructor()?;
        if self.config.wrappers.require_complete {
            constructor.construct_complete(methods)
        } else {
            constructor.construct(methods)
        }
    }
}

/// Split `net/smtp.Dial` into (`net/smtp`, `Dial`).
///
/// The separator is the last `.` after the last `/`, so dotted path segments
/// (`gopkg.in/yaml.v2.Node`) stay in the unit part.
pub fn split_qualified(qualified: &str) -> BridgeResult<(&str, &str)> {
    let invalid = || BridgeError::InvalidName(qualified.to_string());
    let tail_start = qualified.rfind('/').map_or(0, |i| i + 1);
    let dot = qualified[tail_start..]
        .rfind('.')
        .map(|i| tail_start + i)
        .ok_or_else(invalid)?;
    let (unit, symbol) = (&qualified[..dot], &qualified[dot + 1..]);
    if unit.is_empty() || symbol.is_empty() {
        return Err(invalid());
    }
    Ok((unit, symbol))
}
