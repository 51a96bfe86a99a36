//! # Symbol Store Providers
//!
//! The native symbol-info surface the query engine talks to.
//!
//! A provider answers two kinds of calls, mirroring `SymGetTypeInfo` and
//! `SymGetTypeInfoEx`:
//!
//! - [`SymbolInfoProvider::get_field`]: one field of one symbol, written into a
//!   [`FieldSlot`](crate::request::FieldSlot)
//! - [`SymbolInfoProvider::get_fields_batch`]: a structured
//!   [`TypeInfoRequest`] covering many fields of many symbols in one round trip
//!
//! Providers are not required to be thread-safe. The engine only ever calls
//! them from inside a [`StoreExecutor`](crate::executor::StoreExecutor) job.

pub mod memory;

use std::fmt;

use serde::Serialize;

use crate::request::{FieldSlot, TypeInfoRequest};
use crate::types::{ModuleBase, ProcessHandle, TypeId};

pub use memory::{MemoryStore, StoreFixture, StoreStats, StoreSymbol};

/// Platform error code reported by a failed store call.
///
/// Values follow the Win32 `GetLastError` numbering DbgHelp uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NativeError(u32);

impl NativeError
{
    /// `ERROR_SUCCESS`: a failed enumeration that simply ran out of items.
    pub const SUCCESS: Self = Self(0);
    /// `ERROR_INVALID_HANDLE`: unknown process handle.
    pub const INVALID_HANDLE: Self = Self(6);
    /// `ERROR_NOT_SUPPORTED`: the symbol has no such property.
    pub const NOT_SUPPORTED: Self = Self(50);
    /// `ERROR_INVALID_PARAMETER`
    pub const INVALID_PARAMETER: Self = Self(87);
    /// `ERROR_INSUFFICIENT_BUFFER`
    pub const INSUFFICIENT_BUFFER: Self = Self(122);
    /// `ERROR_MOD_NOT_FOUND`: no symbols loaded for the module.
    pub const MOD_NOT_FOUND: Self = Self(126);
    /// `ERROR_NOT_FOUND`: unknown type id.
    pub const NOT_FOUND: Self = Self(1168);

    /// Wrap a raw code.
    #[must_use]
    pub const fn new(code: u32) -> Self
    {
        Self(code)
    }

    /// Raw code.
    #[must_use]
    pub const fn code(self) -> u32
    {
        self.0
    }

    /// A failure carrying `ERROR_SUCCESS` marks the end of an enumeration.
    #[must_use]
    pub const fn is_enumeration_end(self) -> bool
    {
        self.0 == 0
    }

    fn label(self) -> Option<&'static str>
    {
        match self {
            Self::SUCCESS => Some("ERROR_SUCCESS"),
            Self::INVALID_HANDLE => Some("ERROR_INVALID_HANDLE"),
            Self::NOT_SUPPORTED => Some("ERROR_NOT_SUPPORTED"),
            Self::INVALID_PARAMETER => Some("ERROR_INVALID_PARAMETER"),
            Self::INSUFFICIENT_BUFFER => Some("ERROR_INSUFFICIENT_BUFFER"),
            Self::MOD_NOT_FOUND => Some("ERROR_MOD_NOT_FOUND"),
            Self::NOT_FOUND => Some("ERROR_NOT_FOUND"),
            _ => None,
        }
    }
}

impl fmt::Display for NativeError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.label() {
            Some(label) => write!(f, "native error {} {label}", self.0),
            None => write!(f, "native error {}", self.0),
        }
    }
}

impl std::error::Error for NativeError {}

/// Result of a batched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome
{
    /// Symbols that matched the request target (may exceed capacity).
    pub entries_matched: usize,
    /// Entries actually written to the buffer.
    pub entries_filled: usize,
    /// Bits valid in every filled entry.
    pub valid: u64,
}

/// Native symbol-info surface.
pub trait SymbolInfoProvider
{
    /// Fetch a single field of `id` into `slot`.
    ///
    /// ## Errors
    ///
    /// The native error code when the store cannot supply the field.
    fn get_field(
        &mut self,
        process: ProcessHandle,
        module: ModuleBase,
        id: TypeId,
        slot: &mut FieldSlot,
    ) -> Result<(), NativeError>;

    /// Fill a structured request.
    ///
    /// ## Errors
    ///
    /// The native error code when the call as a whole fails. Missing fields on
    /// individual entries are not errors; they are absent from the entry mask.
    fn get_fields_batch(
        &mut self,
        process: ProcessHandle,
        module: ModuleBase,
        request: &mut TypeInfoRequest,
    ) -> Result<BatchOutcome, NativeError>;
}
