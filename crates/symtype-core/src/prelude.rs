//! Common module for library exports

pub use crate::error::{KeyComponent, SymtypeError, SymtypeResult};
pub use crate::executor::{InlineExecutor, StoreExecutor, WorkerExecutor};
pub use crate::numeric::{canonicalize, extend_to_width, reconcile_signedness, IntWidth, MachineInt, RawInteger};
pub use crate::provider::{MemoryStore, NativeError, StoreSymbol, SymbolInfoProvider};
pub use crate::query::TypeQueryEngine;
pub use crate::request::{FieldValue, TypeInfoField};
pub use crate::session::{EngineConfig, IdentityResolver, ProcessResolver, Session};
pub use crate::synthetic::{SyntheticRecord, SyntheticTypeRegistry};
pub use crate::types::*;
