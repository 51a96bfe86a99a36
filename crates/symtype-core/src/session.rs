//! # Debugging Session
//!
//! Owns the synthetic registry and the query engine for one debugging
//! session. Nothing in this crate is global: two sessions never share ids,
//! records or a store worker.
//!
//! ## Example
//!
//! ```rust
//! use symtype_core::provider::MemoryStore;
//! use symtype_core::{EngineConfig, Session};
//!
//! let session = Session::with_worker(MemoryStore::new(), EngineConfig::default())?;
//! assert_eq!(session.registry().stats().pointers, 0);
//! session.shutdown();
//! # Ok::<(), symtype_core::SymtypeError>(())
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{SymtypeError, SymtypeResult};
use crate::executor::{StoreExecutor, WorkerExecutor};
use crate::provider::SymbolInfoProvider;
use crate::query::TypeQueryEngine;
use crate::synthetic::SyntheticTypeRegistry;
use crate::types::{ModuleBase, ProcessHandle, TypeId, TypeKey};

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig
{
    /// Size of synthetic pointers, in bytes.
    pub pointer_size: u64,
    /// Name of the store worker thread.
    pub worker_name: String,
}

impl Default for EngineConfig
{
    fn default() -> Self
    {
        Self {
            pointer_size: 8,
            worker_name: "symtype-dbghelp".to_string(),
        }
    }
}

impl EngineConfig
{
    /// Defaults overridden by `SYMTYPE_POINTER_SIZE` and `SYMTYPE_WORKER_NAME`.
    ///
    /// ## Errors
    ///
    /// `ArgumentInvalid` if `SYMTYPE_POINTER_SIZE` is not 4 or 8.
    pub fn from_env() -> SymtypeResult<Self>
    {
        let mut config = Self::default();
        if let Ok(size) = std::env::var("SYMTYPE_POINTER_SIZE") {
            config.pointer_size = match size.trim() {
                "4" => 4,
                "8" => 8,
                other => {
                    return Err(SymtypeError::ArgumentInvalid(format!(
                        "SYMTYPE_POINTER_SIZE must be 4 or 8, got {other:?}"
                    )))
                }
            };
        }
        if let Ok(name) = std::env::var("SYMTYPE_WORKER_NAME") {
            if !name.is_empty() {
                config.worker_name = name;
            }
        }
        Ok(config)
    }
}

/// Maps a debugger session handle to the native process handle used as the
/// outer key.
pub trait ProcessResolver: Send + Sync
{
    /// ## Errors
    ///
    /// `ArgumentInvalid` if the session is unknown.
    fn resolve(&self, session: u64) -> SymtypeResult<ProcessHandle>;
}

/// Session handles are process handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl ProcessResolver for IdentityResolver
{
    fn resolve(&self, session: u64) -> SymtypeResult<ProcessHandle>
    {
        Ok(ProcessHandle::new(session))
    }
}

impl ProcessResolver for HashMap<u64, ProcessHandle>
{
    fn resolve(&self, session: u64) -> SymtypeResult<ProcessHandle>
    {
        self.get(&session)
            .copied()
            .ok_or_else(|| SymtypeError::ArgumentInvalid(format!("no process for debugging session {session:#x}")))
    }
}

/// Registry, engine and resolver for one debugging session.
pub struct Session<X>
{
    registry: Arc<SyntheticTypeRegistry>,
    engine: TypeQueryEngine<X>,
    resolver: Box<dyn ProcessResolver>,
}

impl<P> Session<WorkerExecutor<P>>
where
    P: SymbolInfoProvider + Send + 'static,
{
    /// Start a store worker that owns `provider` and build a session on it.
    ///
    /// ## Errors
    ///
    /// `Io` if the worker thread cannot be started.
    pub fn with_worker(provider: P, config: EngineConfig) -> SymtypeResult<Self>
    {
        let executor = WorkerExecutor::spawn(config.worker_name.clone(), provider)?;
        Ok(Self::new(executor, config))
    }
}

impl<X: StoreExecutor> Session<X>
{
    /// Session over an existing executor, with an empty registry.
    #[must_use]
    pub fn new(executor: X, config: EngineConfig) -> Self
    {
        let registry = Arc::new(SyntheticTypeRegistry::new());
        let engine = TypeQueryEngine::new(executor, Arc::clone(&registry), config);
        info!("symbol session started");
        Self {
            registry,
            engine,
            resolver: Box::new(IdentityResolver),
        }
    }

    /// Replace the process resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl ProcessResolver + 'static) -> Self
    {
        self.resolver = Box::new(resolver);
        self
    }

    #[must_use]
    pub fn engine(&self) -> &TypeQueryEngine<X>
    {
        &self.engine
    }

    #[must_use]
    pub fn registry(&self) -> &SyntheticTypeRegistry
    {
        &self.registry
    }

    /// Build a key from a debugger session handle.
    ///
    /// ## Errors
    ///
    /// Whatever the resolver reports for an unknown session.
    pub fn key(&self, session: u64, module: ModuleBase, id: TypeId) -> SymtypeResult<TypeKey>
    {
        let process = self.resolver.resolve(session)?;
        Ok(TypeKey::new(process, module, id))
    }

    /// Pointer to `key`'s type, reusing an earlier one if it exists.
    ///
    /// ## Errors
    ///
    /// `ResourceExhausted` once the synthetic range is used up.
    pub fn pointer_to(&self, key: TypeKey) -> SymtypeResult<TypeKey>
    {
        let id = self.registry.get_or_register_pointer(
            key.module_key(),
            key.id,
            self.engine.config().pointer_size,
            false,
        )?;
        Ok(key.sibling(id))
    }

    /// Array of `count` elements of `key`'s type.
    ///
    /// The element size comes from the store (or the registry), so arrays of
    /// synthetic pointers work too.
    ///
    /// ## Errors
    ///
    /// - `ArgumentInvalid` if the element type has no size or the array size
    ///   overflows
    /// - anything [`TypeQueryEngine::type_size`] returns
    pub fn array_of(&self, key: TypeKey, count: u32) -> SymtypeResult<TypeKey>
    {
        let element_size = self.engine.type_size(key)?;
        let size_bytes = element_size.checked_mul(u64::from(count)).ok_or_else(|| {
            SymtypeError::ArgumentInvalid(format!("{count} elements of {element_size} bytes overflow"))
        })?;
        let id = self
            .registry
            .register_array_type(key.module_key(), key.id, count, size_bytes)?;
        Ok(key.sibling(id))
    }

    /// A module was unloaded or reloaded somewhere.
    ///
    /// The notification does not say which process it came from, so the
    /// module's synthetic types are dropped from every process.
    pub fn module_unloaded(&self, module: ModuleBase) -> usize
    {
        self.registry.invalidate_module(module)
    }

    /// A debugged process went away.
    pub fn process_exited(&self, process: ProcessHandle) -> usize
    {
        self.registry.invalidate_process(process)
    }

    /// Drop every synthetic type and stop the store executor.
    ///
    /// Returns the number of synthetic records dropped.
    pub fn shutdown(self) -> usize
    {
        let dropped = self.registry.invalidate_module(ModuleBase::ALL);
        drop(self.engine);
        debug!(dropped, "symbol session shut down");
        dropped
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::executor::InlineExecutor;
    use crate::provider::{MemoryStore, StoreSymbol};
    use crate::request::{FieldValue, TypeInfoField};
    use crate::types::{ModuleKey, SymTag};

    const PROCESS: ProcessHandle = ProcessHandle::new(3);
    const MODULE: ModuleBase = ModuleBase::new(0x40_0000);

    fn session() -> Session<InlineExecutor<MemoryStore>>
    {
        let mut store = MemoryStore::new();
        store.insert(
            PROCESS,
            MODULE,
            StoreSymbol::new(1, SymTag::BaseType)
                .with(TypeInfoField::BaseType, FieldValue::U32(6))
                .with(TypeInfoField::Length, FieldValue::U64(4)),
        );
        Session::new(InlineExecutor::new(store), EngineConfig::default())
    }

    #[test]
    fn test_pointer_to_is_deduplicated()
    {
        let session = session();
        let int = ModuleKey::new(PROCESS, MODULE).with_type(TypeId::new(1));
        let a = session.pointer_to(int).unwrap();
        let b = session.pointer_to(int).unwrap();
        assert_eq!(a, b);
        assert_eq!(session.engine().pointee(a).unwrap(), TypeId::new(1));
        assert_eq!(session.engine().type_size(a).unwrap(), 8);
    }

    #[test]
    fn test_array_of_uses_element_size()
    {
        let session = session();
        let int = ModuleKey::new(PROCESS, MODULE).with_type(TypeId::new(1));
        let array = session.array_of(int, 10).unwrap();
        assert_eq!(session.engine().type_size(array).unwrap(), 40);

        let pointer = session.pointer_to(int).unwrap();
        let pointers = session.array_of(pointer, 3).unwrap();
        assert_eq!(session.engine().query_array(pointers).unwrap().length, 24);
    }

    #[test]
    fn test_resolver()
    {
        let session = session().with_resolver(HashMap::from([(77_u64, PROCESS)]));
        let key = session.key(77, MODULE, TypeId::new(1)).unwrap();
        assert_eq!(key.process, PROCESS);
        assert!(session.key(78, MODULE, TypeId::new(1)).is_err());
    }

    #[test]
    fn test_shutdown_drops_synthetic_types()
    {
        let session = session();
        let int = ModuleKey::new(PROCESS, MODULE).with_type(TypeId::new(1));
        session.pointer_to(int).unwrap();
        session.array_of(int, 2).unwrap();
        assert_eq!(session.shutdown(), 2);
    }

    #[test]
    fn test_config_defaults()
    {
        let config = EngineConfig::default();
        assert_eq!(config.pointer_size, 8);
        assert_eq!(config.worker_name, "symtype-dbghelp");
    }
}
