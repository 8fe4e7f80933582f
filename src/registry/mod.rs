//! Symbol Registry
//!
//! Maps `(unit, symbol)` to [`ValueCarrier`]s. A library unit is one
//! package's closed set of exported symbols; it is built completely with a
//! [`UnitBuilder`] and then published in one step, so lookups never observe a
//! half-registered unit.
//!
//! # Lifecycle
//!
//! ```text
//! startup:  UnitBuilder ─► LibraryUnit ─► registry.register(unit)   (rare, write)
//! running:  registry.lookup("net/smtp", "Dial")                      (hot, read)
//! ```
//!
//! The table is append-only: units are added, never replaced or mutated.
//! Registering an identifier twice fails with
//! [`BridgeError::DuplicateUnit`] and leaves the first unit in place.
//! Published units are immutable `Arc`s, so a lookup holds the table's read
//! lock only long enough to clone one carrier handle.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::carrier::{FuncSignature, SymbolKind, TypeDescriptor, TypeRef, ValueCarrier};
use crate::error::{BridgeError, BridgeResult};
use crate::value::{IntoValue, Value};
use crate::wrapper::{wrapper_symbol, InterfaceWrapper, WrapperConstructor};

// =============================================================================
// Library Unit
// =============================================================================

/// The exported symbols of one library, registered together
#[derive(Debug)]
pub struct LibraryUnit {
    id: String,
    version: Option<String>,
    symbols: BTreeMap<String, ValueCarrier>,
}

impl LibraryUnit {
    pub fn builder(id: impl Into<String>) -> UnitBuilder {
        UnitBuilder::new(id)
    }

    /// Unit identifier, e.g. `net/smtp`
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Library API version this unit was generated against
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn get(&self, symbol: &str) -> Option<&ValueCarrier> {
        self.symbols.get(symbol)
    }

    /// Symbols in name order
    pub fn symbols(&self) -> impl Iterator<Item = (&str, &ValueCarrier)> {
        self.symbols.iter().map(|(name, c)| (name.as_str(), c))
    }

    /// Symbol names of one kind, in name order
    pub fn names_of_kind(&self, kind: SymbolKind) -> Vec<&str> {
        self.symbols()
            .filter(|(_, c)| c.kind() == kind)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// SHA-256 (hex) over the unit's symbol table.
    ///
    /// Covers every symbol's name, kind and shape, so regenerating a unit
    /// against a changed library surface changes the fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update(b"\n");
        for (name, carrier) in &self.symbols {
            hasher.update(format!("{}\t{}\t{}\n", name, carrier.kind(), carrier.describe()));
        }
        hex::encode(hasher.finalize())
    }
}

// =============================================================================
// Unit Builder
// =============================================================================

/// Collects a unit's symbols before publication.
///
/// Builder calls never fail individually; the first problem (a duplicate
/// name, an interface registered from a struct descriptor) is reported by
/// [`build`](Self::build).
#[derive(Debug)]
pub struct UnitBuilder {
    id: String,
    version: Option<String>,
    symbols: BTreeMap<String, ValueCarrier>,
    error: Option<BridgeError>,
}

impl UnitBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: None,
            symbols: BTreeMap::new(),
            error: None,
        }
    }

    /// Record the library API version the unit was generated against
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Add a prepared carrier under `name`
    pub fn symbol(mut self, name: &str, carrier: ValueCarrier) -> Self {
        if self.symbols.contains_key(name) {
            self.error.get_or_insert_with(|| BridgeError::DuplicateSymbol {
                unit: self.id.clone(),
                symbol: name.to_string(),
            });
        } else {
            self.symbols.insert(name.to_string(), carrier);
        }
        self
    }

    pub fn function<F>(self, name: &str, signature: FuncSignature, f: F) -> Self
    where
        F: Fn(&[Value]) -> BridgeResult<Vec<Value>> + Send + Sync + 'static,
    {
        let carrier = ValueCarrier::function(self.qualify(name), signature, f);
        self.symbol(name, carrier)
    }

    pub fn constant(self, name: &str, value: impl IntoValue) -> Self {
        let carrier = ValueCarrier::constant(self.qualify(name), value);
        self.symbol(name, carrier)
    }

    pub fn variable(self, name: &str, ty: TypeRef, initial: impl IntoValue) -> Self {
        let carrier = ValueCarrier::variable(self.qualify(name), ty, initial);
        self.symbol(name, carrier)
    }

    /// Add a type under its unqualified name
    pub fn type_def(self, descriptor: TypeDescriptor) -> Self {
        let name = descriptor.short_name().to_string();
        self.symbol(&name, ValueCarrier::type_def(descriptor))
    }

    /// Add an interface type and its wrapper constructor (`Auth` and `_Auth`).
    ///
    /// `adapt` turns a generic wrapper into a value satisfying the compiled
    /// interface.
    pub fn interface<F>(mut self, descriptor: TypeDescriptor, adapt: F) -> Self
    where
        F: Fn(InterfaceWrapper) -> Value + Send + Sync + 'static,
    {
        let Some(iface) = descriptor.interface_descriptor().cloned() else {
            self.error.get_or_insert_with(|| {
                BridgeError::mismatch(
                    format!("interface registration in {}", self.id),
                    "interface type",
                    descriptor.name(),
                )
            });
            return self;
        };
        let symbol = wrapper_symbol(iface.short_name());
        let constructor = WrapperConstructor::new(&self.id, iface, adapt);
        self.type_def(descriptor)
            .symbol(&symbol, ValueCarrier::wrapper(constructor))
    }

    /// Finish the unit
    pub fn build(self) -> BridgeResult<LibraryUnit> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(LibraryUnit {
            id: self.id,
            version: self.version,
            symbols: self.symbols,
        })
    }

    fn qualify(&self, name: &str) -> String {
        format!("{}.{}", self.id, name)
    }
}

// =============================================================================
// Symbol Registry
// =============================================================================

/// Process-wide table of library units.
///
/// Pass one instance to each interpreter runtime; see
/// [`stdlib::default_registry`](crate::stdlib::default_registry) for the
/// lazily-built default.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    units: RwLock<HashMap<String, Arc<LibraryUnit>>>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a fully built unit.
    ///
    /// Fails with [`BridgeError::DuplicateUnit`] if the identifier is taken;
    /// the existing unit is left untouched.
    pub fn register(&self, unit: LibraryUnit) -> BridgeResult<Arc<LibraryUnit>> {
        let mut units = self.units.write();
        match units.entry(unit.id.clone()) {
            Entry::Occupied(_) => Err(BridgeError::DuplicateUnit { unit: unit.id }),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    unit = %unit.id,
                    symbols = unit.len(),
                    version = unit.version().unwrap_or("-"),
                    "registered library unit"
                );
                Ok(Arc::clone(slot.insert(Arc::new(unit))))
            }
        }
    }

    /// Build and publish a unit from prepared `(name, carrier)` entries
    pub fn register_entries(
        &self,
        unit_id: &str,
        entries: impl IntoIterator<Item = (String, ValueCarrier)>,
    ) -> BridgeResult<Arc<LibraryUnit>> {
        let unit = entries
            .into_iter()
            .fold(UnitBuilder::new(unit_id), |b, (name, carrier)| {
                b.symbol(&name, carrier)
            })
            .build()?;
        self.register(unit)
    }

    /// Resolve a symbol, failing with [`BridgeError::SymbolNotFound`]
    pub fn lookup(&self, unit: &str, symbol: &str) -> BridgeResult<ValueCarrier> {
        tracing::trace!(unit, symbol, "lookup");
        self.get(unit, symbol)
            .ok_or_else(|| BridgeError::not_found(unit, symbol))
    }

    /// Resolve a symbol, `None` when the unit or symbol is absent
    pub fn get(&self, unit: &str, symbol: &str) -> Option<ValueCarrier> {
        self.units.read().get(unit)?.get(symbol).cloned()
    }

    pub fn unit(&self, id: &str) -> Option<Arc<LibraryUnit>> {
        self.units.read().get(id).cloned()
    }

    pub fn contains_unit(&self, id: &str) -> bool {
        self.units.read().contains_key(id)
    }

    /// Registered unit identifiers, sorted
    pub fn unit_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.units.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::arg;
    use crate::wrapper::InterfaceDescriptor;

    fn math_unit() -> LibraryUnit {
        LibraryUnit::builder("math")
            .version("1.0")
            .function(
                "Abs",
                FuncSignature::new(vec![TypeRef::Int], vec![TypeRef::Int]),
                |args| Ok(vec![Value::Int(arg::<i64>(args, 0, "Abs")?.abs())]),
            )
            .constant("MaxInt8", 127i64)
            .variable("Precision", TypeRef::Int, 6i64)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_and_kinds() {
        let unit = math_unit();
        assert_eq!(unit.id(), "math");
        assert_eq!(unit.version(), Some("1.0"));
        assert_eq!(unit.len(), 3);
        assert_eq!(unit.get("Abs").unwrap().kind(), SymbolKind::Function);
        assert_eq!(unit.get("Abs").unwrap().name(), "math.Abs");
        assert_eq!(unit.names_of_kind(SymbolKind::Constant), vec!["MaxInt8"]);
    }

    #[test]
    fn test_duplicate_symbol() {
        let err = LibraryUnit::builder("math")
            .constant("Pi", std::f64::consts::PI)
            .constant("Pi", 3.0f64)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::DuplicateSymbol {
                unit: "math".to_string(),
                symbol: "Pi".to_string(),
            }
        );
    }

    #[test]
    fn test_interface_registers_type_and_wrapper() {
        let iface = Arc::new(InterfaceDescriptor::new("io.Closer").method(
            "Close",
            FuncSignature::new(vec![], vec![TypeRef::Error]),
        ));
        let unit = LibraryUnit::builder("io")
            .interface(TypeDescriptor::interface(iface), |w| {
                Value::object("io.Closer", w)
            })
            .build()
            .unwrap();

        assert_eq!(unit.get("Closer").unwrap().kind(), SymbolKind::Type);
        let wrapper = unit.get("_Closer").unwrap();
        assert_eq!(wrapper.kind(), SymbolKind::InterfaceWrapper);
        assert_eq!(wrapper.wrapper_constructor().unwrap().type_name(), "_io_Closer");
    }

    #[test]
    fn test_interface_requires_interface_descriptor() {
        let err = LibraryUnit::builder("io")
            .interface(TypeDescriptor::structure("io.File"), |w| {
                Value::object("io.File", w)
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, BridgeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = SymbolRegistry::new();
        registry.register(math_unit()).unwrap();

        let abs = registry.lookup("math", "Abs").unwrap();
        assert_eq!(abs.call(&[Value::Int(-4)]).unwrap(), vec![Value::Int(4)]);
        assert_eq!(
            registry.lookup("math", "MaxInt8").unwrap().value().unwrap(),
            Value::Int(127)
        );
        assert!(registry.contains_unit("math"));
        assert_eq!(registry.unit_ids(), vec!["math".to_string()]);
    }

    #[test]
    fn test_duplicate_unit_keeps_first() {
        let registry = SymbolRegistry::new();
        let first = registry.register(math_unit()).unwrap();
        let before = registry.lookup("math", "Abs").unwrap();

        let err = registry
            .register(LibraryUnit::builder("math").build().unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::DuplicateUnit {
                unit: "math".to_string()
            }
        );

        let after = registry.lookup("math", "Abs").unwrap();
        assert!(before.ptr_eq(&after));
        assert_eq!(registry.unit("math").unwrap().len(), first.len());
    }

    #[test]
    fn test_not_found() {
        let registry = SymbolRegistry::new();
        registry.register(math_unit()).unwrap();

        assert_eq!(
            registry.lookup("math", "Sqrt").unwrap_err(),
            BridgeError::SymbolNotFound {
                unit: "math".to_string(),
                symbol: "Sqrt".to_string(),
            }
        );
        assert!(matches!(
            registry.lookup("strings", "Abs"),
            Err(BridgeError::SymbolNotFound { .. })
        ));
        assert!(registry.get("strings", "Abs").is_none());
    }

    #[test]
    fn test_register_entries() {
        let registry = SymbolRegistry::new();
        let entries = vec![
            ("E".to_string(), ValueCarrier::constant("math.E", std::f64::consts::E)),
            ("Pi".to_string(), ValueCarrier::constant("math.Pi", std::f64::consts::PI)),
        ];
        let unit = registry.register_entries("math", entries).unwrap();
        assert_eq!(unit.len(), 2);
        assert_eq!(
            registry.lookup("math", "Pi").unwrap().value().unwrap(),
            Value::Float(std::f64::consts::PI)
        );
    }

    #[test]
    fn test_fingerprint_tracks_surface() {
        let a = math_unit().fingerprint();
        assert_eq!(a, math_unit().fingerprint());
        assert_eq!(a.len(), 64);

        let changed = LibraryUnit::builder("math")
            .version("1.0")
            .function(
                "Abs",
                FuncSignature::new(vec![TypeRef::Float], vec![TypeRef::Float]),
                |args| Ok(args.to_vec()),
            )
            .constant("MaxInt8", 127i64)
            .variable("Precision", TypeRef::Int, 6i64)
            .build()
            .unwrap();
        assert_ne!(a, changed.fingerprint());
    }
}
