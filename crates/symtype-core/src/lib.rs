//! # symtype-core
//!
//! Type information for a debugger front-end, answered from a live-target
//! symbol store.
//!
//! This crate provides:
//! - A synthetic type registry that fabricates pointer-to-X and array-of-X
//!   types the store does not contain
//! - A batched query engine that decodes store answers into typed records
//! - Numeric reconciliation for enumerand and constant values
//! - A single-worker executor that serializes every store call
//! - An in-memory store for tests and offline use
//!
//! ## Id space
//!
//! | Range | Owner |
//! |---|---|
//! | `< 0x8000_0000` | native store |
//! | `0x8000_0000 ..= 0xBFFF_FFFF` | synthetic registry |
//! | `0xC000_0000 ..= 0xFFFF_FFFE` | debugger-generated, supplied by callers |
//!
//! Synthetic ids answer every query a native id of the same kind would, so
//! callers never need to know which kind they are holding.

pub mod error;
pub mod executor;
pub mod numeric;
pub mod prelude;
pub mod provider;
pub mod query;
pub mod request;
pub mod session;
pub mod synthetic;
pub mod types;

pub use error::{SymtypeError, SymtypeResult};
pub use query::TypeQueryEngine;
pub use session::{EngineConfig, Session};
pub use synthetic::SyntheticTypeRegistry;
pub use types::{ModuleBase, ModuleKey, ProcessHandle, TypeId, TypeKey};
