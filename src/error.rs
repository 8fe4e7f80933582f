//! Bridge Errors
//!
//! Every failure the bridge itself can produce. Errors raised by wrapped
//! library code are not listed here: they travel back to the interpreter as
//! [`Value::Error`](crate::value::Value::Error) results.

use thiserror::Error;

/// Error type for registry, carrier and wrapper operations.
///
/// All variants are recoverable. The interpreter decides whether a failure
/// aborts the interpreted program or is reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A library unit with this identifier is already registered
    #[error("library unit {unit:?} is already registered")]
    DuplicateUnit { unit: String },

    /// The same symbol name was added twice while building a unit
    #[error("symbol {symbol:?} defined twice in library unit {unit:?}")]
    DuplicateSymbol { unit: String, symbol: String },

    /// Unknown unit, or unknown symbol inside a known unit
    #[error("symbol not found: {unit}.{symbol}")]
    SymbolNotFound { unit: String, symbol: String },

    /// A carrier or value was used as the wrong kind or type
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    /// Wrong number of arguments for a function or method
    #[error("{context}: expected {expected} arguments, got {got}")]
    ArgCount {
        context: String,
        expected: usize,
        got: usize,
    },

    /// Dispatch through an interface wrapper slot that was never populated
    #[error("interface method {interface}.{method} is not implemented")]
    UnimplementedMethod { interface: String, method: String },

    /// A method name that is not part of the interface
    #[error("{interface} has no method {method:?}")]
    UnknownMethod { interface: String, method: String },

    /// A unit generated for a different version of its library
    #[error("library unit {unit:?} was generated for API {generated_for}, library is at {library}")]
    StaleUnit {
        unit: String,
        generated_for: String,
        library: String,
    },

    /// A method called on an object whose previous call, on the same
    /// thread, has not returned yet
    #[error("{object} is busy: {method} called while another of its methods is running")]
    ObjectBusy { object: String, method: String },

    /// A qualified name that cannot be split into unit and symbol
    #[error("invalid qualified name: {0:?}")]
    InvalidName(String),
}

impl BridgeError {
    pub(crate) fn mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        BridgeError::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn not_found(unit: impl Into<String>, symbol: impl Into<String>) -> Self {
        BridgeError::SymbolNotFound {
            unit: unit.into(),
            symbol: symbol.into(),
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
