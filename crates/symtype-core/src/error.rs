//! # Error Types
//!
//! Error handling for type-information queries and the synthetic registry.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use std::fmt;

use thiserror::Error;

use crate::provider::NativeError;
use crate::types::{SymTag, TypeKey};

/// Which part of a [`TypeKey`] was missing from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyComponent
{
    /// No data at all for the process.
    Process,
    /// The process is known but the module is not.
    Module,
    /// The module is known but the id is not.
    Id,
}

impl fmt::Display for KeyComponent
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Self::Process => "process",
            Self::Module => "module",
            Self::Id => "type id",
        };
        f.write_str(label)
    }
}

/// Main error type for type-information operations
///
/// ## Error Categories
///
/// 1. **Caller errors**: ArgumentInvalid
/// 2. **Lookup errors**: KeyNotFound
/// 3. **Data integrity errors**: WrongKind, Incomplete, DecodeInconsistency
/// 4. **Store errors**: TransportFailure (carries the native error code)
/// 5. **Resource errors**: ResourceExhausted, WorkerUnavailable
/// 6. **I/O errors**: Io, Json (fixture loading)
///
/// Only `TransportFailure` is worth retrying, and only by a layer that can
/// reload symbols first.
#[derive(Error, Debug)]
pub enum SymtypeError
{
    /// Malformed caller input: empty field list, out-of-range explicit id,
    /// unsupported integer width.
    #[error("Invalid argument: {0}")]
    ArgumentInvalid(String),

    /// A component of the key is not present.
    ///
    /// From [`peek_exists`](crate::synthetic::SyntheticTypeRegistry::peek_exists)
    /// this is just `false`; from a "get info" call it is fatal.
    #[error("No {component} entry for {key}")]
    KeyNotFound
    {
        /// The key that was looked up.
        key: TypeKey,
        /// First component that was missing.
        component: KeyComponent,
    },

    /// The store's symbol tag disagrees with the kind the caller asked for.
    #[error("{key} is a {actual} record, expected {expected}")]
    WrongKind
    {
        /// The key that was queried.
        key: TypeKey,
        /// Tag the caller asked for.
        expected: SymTag,
        /// Tag the store reported.
        actual: SymTag,
    },

    /// The store did not supply every field the kind requires.
    #[error("Incomplete {kind} record for {key}: required fields {required:#x}, store supplied {valid:#x}")]
    Incomplete
    {
        /// The key that was queried.
        key: TypeKey,
        /// Kind being decoded.
        kind: SymTag,
        /// Required validity mask.
        required: u64,
        /// Validity mask the store returned.
        valid: u64,
    },

    /// The symbol store call itself failed.
    #[error("Symbol store call failed: {context}{}", native_suffix(.code.as_ref()))]
    TransportFailure
    {
        /// Native error code, when the store supplied one.
        code: Option<NativeError>,
        /// What we were doing.
        context: String,
    },

    /// Narrowing or decoding would discard information.
    #[error("Inconsistent value: {0}")]
    DecodeInconsistency(String),

    /// A finite resource (the synthetic id range) ran out.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The symbol worker is gone or the call would deadlock it.
    #[error("Symbol worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// I/O error (fixture files, worker thread spawn)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed store fixture.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn native_suffix(code: Option<&NativeError>) -> String
{
    code.map(|code| format!(" ({code})")).unwrap_or_default()
}

impl SymtypeError
{
    /// Build a transport failure from a native error.
    pub(crate) fn transport(code: NativeError, context: impl Into<String>) -> Self
    {
        Self::TransportFailure {
            code: Some(code),
            context: context.into(),
        }
    }

    /// Whether this is a `KeyNotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool
    {
        matches!(self, Self::KeyNotFound { .. })
    }

    /// Native error code carried by a transport failure.
    #[must_use]
    pub fn native_code(&self) -> Option<NativeError>
    {
        match self {
            Self::TransportFailure { code, .. } => *code,
            _ => None,
        }
    }

    /// Whether a higher layer may retry after reloading symbols.
    #[must_use]
    pub fn is_retryable(&self) -> bool
    {
        matches!(self, Self::TransportFailure { .. })
    }
}

/// Convenience type alias for `Result<T, SymtypeError>`
///
/// ```rust
/// use symtype_core::error::SymtypeResult;
/// fn foo() -> SymtypeResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type SymtypeResult<T> = std::result::Result<T, SymtypeError>;
