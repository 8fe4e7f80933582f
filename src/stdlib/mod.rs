//! Library Units
//!
//! Per-unit registration tables. Each entry names a unit, the library API
//! version its bindings were generated against, and a builder producing the
//! [`LibraryUnit`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use neurlang_bridge::stdlib;
//!
//! let registry = stdlib::default_registry()?;
//! let dial = registry.lookup("net/smtp", "Dial")?;
//! ```

pub mod net_smtp;

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::mail;
use crate::registry::{LibraryUnit, SymbolRegistry};

/// One registrable library unit
#[derive(Debug, Clone, Copy)]
pub struct UnitEntry {
    /// Unit identifier
    pub id: &'static str,
    /// Library API version the bindings were generated against
    pub generated_for: &'static str,
    /// API version of the library linked into this build
    pub library_version: &'static str,
    /// Builds the unit's symbol table
    pub build: fn() -> BridgeResult<LibraryUnit>,
}

impl UnitEntry {
    pub fn is_stale(&self) -> bool {
        self.generated_for != self.library_version
    }
}

/// All units shipped with the bridge
pub const UNITS: &[UnitEntry] = &[UnitEntry {
    id: net_smtp::UNIT_ID,
    generated_for: net_smtp::GENERATED_FOR,
    library_version: mail::API_VERSION,
    build: net_smtp::unit,
}];

/// Look up a shipped unit entry by identifier
pub fn entry(id: &str) -> Option<&'static UnitEntry> {
    UNITS.iter().find(|e| e.id == id)
}

/// Register every shipped unit the configuration enables.
///
/// Stops at the first failure; units registered before it stay registered.
pub fn register_all(
    registry: &SymbolRegistry,
    config: &BridgeConfig,
) -> BridgeResult<Vec<Arc<LibraryUnit>>> {
    let mut registered = Vec::with_capacity(UNITS.len());
    for entry in UNITS {
        if !config.unit_enabled(entry.id) {
            tracing::warn!(unit = entry.id, "library unit disabled by configuration");
            continue;
        }
        registered.push(register_entry(
            registry,
            entry,
            config.registry.check_versions,
        )?);
    }
    Ok(registered)
}

/// Build and register one unit, refusing stale bindings when `check_versions` is set
pub fn register_entry(
    registry: &SymbolRegistry,
    entry: &UnitEntry,
    check_versions: bool,
) -> BridgeResult<Arc<LibraryUnit>> {
    if entry.is_stale() {
        if check_versions {
            return Err(BridgeError::StaleUnit {
                unit: entry.id.to_string(),
                generated_for: entry.generated_for.to_string(),
                library: entry.library_version.to_string(),
            });
        }
        tracing::warn!(
            unit = entry.id,
            generated_for = entry.generated_for,
            library = entry.library_version,
            "registering library unit generated for a different API version"
        );
    }
    registry.register((entry.build)()?)
}

static DEFAULT_REGISTRY: OnceCell<Arc<SymbolRegistry>> = OnceCell::new();

/// Process-wide registry holding every shipped unit, built on first use.
///
/// Concurrent first callers block until the one performing registration
/// finishes, so nobody observes a partly filled registry.
pub fn default_registry() -> BridgeResult<Arc<SymbolRegistry>> {
    DEFAULT_REGISTRY
        .get_or_try_init(|| {
            let registry = SymbolRegistry::new();
            register_all(&registry, &BridgeConfig::default())?;
            Ok(Arc::new(registry))
        })
        .map(Arc::clone)
}
