//! Neurlang Bridge - compiled libraries for an embedded interpreter
//!
//! Lets interpreted programs use compiled library code: look up functions,
//! constants, variables and types by `(unit, symbol)`, call them with dynamic
//! values, and hand compiled code interpreter closures that satisfy compiled
//! interfaces.
//!
//! # Pieces
//!
//! - **Value Carrier** ([`ValueCarrier`]): one type-erased, identity-preserving
//!   handle per exported entity
//! - **Symbol Registry** ([`SymbolRegistry`]): append-only table of library
//!   units, safe to read from many interpreter threads
//! - **Interface Wrapper** ([`InterfaceWrapper`]): forwards compiled interface
//!   calls to interpreter closures
//! - **Library units** ([`stdlib`]): generated bindings, starting with `net/smtp`
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use neurlang_bridge::{callable, Bridge, BridgeConfig, SymbolKind, Value};
//!
//! let bridge = Bridge::with_stdlib(BridgeConfig::default()).unwrap();
//! let dial = bridge.resolve("net/smtp.Dial").unwrap();
//! assert_eq!(dial.kind(), SymbolKind::Function);
//!
//! // Implement net/smtp.Auth with an interpreter closure
//! let next = callable(|args| Ok(vec![args[0].clone(), Value::Nil]));
//! let methods = HashMap::from([("Next".to_string(), next)]);
//! let auth = bridge.implement("net/smtp", "Auth", methods).unwrap();
//!
//! let args = [Value::Bytes(b"hi".to_vec()), Value::Bool(true)];
//! let out = bridge.call_method(&auth, "Next", &args).unwrap();
//! assert_eq!(out, vec![Value::Bytes(b"hi".to_vec()), Value::Nil]);
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Interpreter    │  lookup("net/smtp", "Dial"), implement("_Auth", ...)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ SymbolRegistry  │  unit -> symbol -> ValueCarrier
//! └────────┬────────┘
//!          │
//!     ┌────┴──────────┐
//!     ▼               ▼
//! ┌──────────┐  ┌──────────────────┐
//! │ Carriers │  │ InterfaceWrapper │  closures -> compiled trait
//! └────┬─────┘  └────────┬─────────┘
//!      │                 │
//!      ▼                 ▼
//! ┌─────────────────────────┐
//! │   Compiled library      │  mail (SMTP client)
//! └─────────────────────────┘
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod carrier;
pub mod config;
pub mod error;
pub mod mail;
pub mod registry;
pub mod stdlib;
pub mod value;
pub mod wrapper;

// Re-export commonly used types
pub use bridge::{split_qualified, Bridge};
pub use carrier::{FuncSignature, SymbolKind, TypeDescriptor, TypeKind, TypeRef, ValueCarrier};
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult};
pub use registry::{LibraryUnit, SymbolRegistry, UnitBuilder};
pub use value::{arg, callable, Callable, ErrorValue, FromValue, IntoValue, Object, Value};
pub use wrapper::{InterfaceDescriptor, InterfaceWrapper, WrapperConstructor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
