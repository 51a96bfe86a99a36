//! # Synthetic Type Registry
//!
//! Fabricated pointer and array types that the symbol store does not contain.
//!
//! A debugger needs `T*` to evaluate `&expr` and `T[n]` to view memory as an
//! array, even when the module's symbols never mention those types. The
//! registry mints ids for them from the synthetic range so the query engine
//! can answer for them exactly as it answers for native ids.
//!
//! ## Invariants
//!
//! - Records are complete when inserted and never change.
//! - A pointer record and its reverse (pointee → pointer) entry are inserted
//!   and removed together, under one lock.
//! - Minted ids only grow. Invalidation never hands an id out again.
//!
//! ## Invalidation
//!
//! Module unload notifications do not say which process they came from, so
//! [`SyntheticTypeRegistry::invalidate_module`] drops the module from every
//! tracked process.

mod record;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

pub use record::{ArrayRecord, PointerRecord, SyntheticRecord};

use crate::error::{KeyComponent, SymtypeError, SymtypeResult};
use crate::types::{ModuleBase, ModuleKey, ProcessHandle, TypeId, TypeKey, SYNTHETIC_BASE, SYNTHETIC_MAX};

type PerModule<K, V> = HashMap<ProcessHandle, HashMap<ModuleBase, HashMap<K, V>>>;

/// Reverse-index key. Pointers and references to one pointee are distinct
/// types and each gets its own entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PointerTarget
{
    pointee: TypeId,
    is_reference: bool,
}

#[derive(Debug, Default)]
struct RegistryMaps
{
    /// id → record
    records: PerModule<TypeId, SyntheticRecord>,
    /// pointee → pointer id
    pointers: PerModule<PointerTarget, TypeId>,
}

impl RegistryMaps
{
    fn contains(&self, module: ModuleKey, id: TypeId) -> bool
    {
        self.records
            .get(&module.process)
            .and_then(|modules| modules.get(&module.module))
            .is_some_and(|records| records.contains_key(&id))
    }

    fn pointer_for(&self, module: ModuleKey, target: PointerTarget) -> Option<TypeId>
    {
        self.pointers
            .get(&module.process)
            .and_then(|modules| modules.get(&module.module))
            .and_then(|pointers| pointers.get(&target))
            .copied()
    }

    /// Caller has checked that neither `id` nor the record's target is taken.
    fn insert_pointer(&mut self, module: ModuleKey, id: TypeId, record: PointerRecord)
    {
        let target = PointerTarget {
            pointee: record.pointee,
            is_reference: record.is_reference,
        };
        self.records
            .entry(module.process)
            .or_default()
            .entry(module.module)
            .or_default()
            .insert(id, SyntheticRecord::Pointer(record));
        self.pointers
            .entry(module.process)
            .or_default()
            .entry(module.module)
            .or_default()
            .insert(target, id);
    }
}

/// Snapshot of registry occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats
{
    /// Processes with at least one module entry.
    pub processes: usize,
    /// (process, module) pairs with an entry.
    pub modules: usize,
    /// Pointer records.
    pub pointers: usize,
    /// Array records.
    pub arrays: usize,
    /// Reverse-index entries. Always equal to `pointers`.
    pub reverse_entries: usize,
}

/// Keyed storage of synthetic type records.
///
/// Explicitly constructed and owned by a debugging session; share it with
/// `Arc`. Counter increments are lock-free, map access goes through an
/// `RwLock`.
#[derive(Debug)]
pub struct SyntheticTypeRegistry
{
    last_id: AtomicU32,
    maps: RwLock<RegistryMaps>,
}

impl Default for SyntheticTypeRegistry
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl SyntheticTypeRegistry
{
    /// Empty registry. The first minted id is `SYNTHETIC_BASE + 1`.
    #[must_use]
    pub fn new() -> Self
    {
        Self::starting_after(SYNTHETIC_BASE)
    }

    fn starting_after(last_id: u32) -> Self
    {
        Self {
            last_id: AtomicU32::new(last_id),
            maps: RwLock::new(RegistryMaps::default()),
        }
    }

    // Records are immutable once inserted, so a panic while a guard was held
    // cannot have left a half-written entry behind.
    fn read(&self) -> RwLockReadGuard<'_, RegistryMaps>
    {
        self.maps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryMaps>
    {
        self.maps.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn mint(&self) -> SymtypeResult<TypeId>
    {
        self.last_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                (last < SYNTHETIC_MAX).then_some(last + 1)
            })
            .map(|last| TypeId::new(last + 1))
            .map_err(|last| {
                SymtypeError::ResourceExhausted(format!("synthetic type ids exhausted at {:#x}", last))
            })
    }

    /// Register a pointer (or reference) to `pointee`.
    ///
    /// With `explicit_id`, the caller supplies a debugger-generated id instead
    /// of minting one. A pointee that already has a pointer of the same kind
    /// gets the existing id back; nothing is minted or replaced.
    ///
    /// ## Errors
    ///
    /// - `ArgumentInvalid`: `size_bytes` is zero, `explicit_id` is outside the
    ///   debugger-generated range or already names another record, or the
    ///   pointee already has a pointer under a different id
    /// - `ResourceExhausted`: the synthetic range is used up
    pub fn register_pointer_type(
        &self,
        module: ModuleKey,
        pointee: TypeId,
        size_bytes: u64,
        is_reference: bool,
        explicit_id: Option<TypeId>,
    ) -> SymtypeResult<TypeId>
    {
        if size_bytes == 0 {
            return Err(SymtypeError::ArgumentInvalid("pointer size cannot be zero".to_string()));
        }
        if let Some(id) = explicit_id {
            if !id.is_debugger_generated() {
                return Err(SymtypeError::ArgumentInvalid(format!(
                    "{id} is not in the debugger-generated range"
                )));
            }
        }

        let target = PointerTarget { pointee, is_reference };
        let mut maps = self.write();
        if let Some(existing) = maps.pointer_for(module, target) {
            return match explicit_id {
                Some(id) if id != existing => Err(SymtypeError::ArgumentInvalid(format!(
                    "{pointee} in {module} already has synthetic {} {existing}",
                    if is_reference { "reference" } else { "pointer" }
                ))),
                _ => Ok(existing),
            };
        }

        let id = match explicit_id {
            Some(id) if maps.contains(module, id) => {
                return Err(SymtypeError::ArgumentInvalid(format!(
                    "{id} is already registered in {module}"
                )))
            }
            Some(id) => id,
            None => self.mint()?,
        };
        maps.insert_pointer(
            module,
            id,
            PointerRecord {
                pointee,
                size_bytes,
                is_reference,
            },
        );
        debug!(%module, %pointee, is_reference, pointer = %id, "registered synthetic pointer");
        Ok(id)
    }

    /// Return the pointer to `pointee`, registering one if none exists.
    ///
    /// Lookup and insert happen under one write lock, so racing callers get
    /// the same id.
    ///
    /// ## Errors
    ///
    /// As [`SyntheticTypeRegistry::register_pointer_type`].
    pub fn get_or_register_pointer(
        &self,
        module: ModuleKey,
        pointee: TypeId,
        size_bytes: u64,
        is_reference: bool,
    ) -> SymtypeResult<TypeId>
    {
        self.register_pointer_type(module, pointee, size_bytes, is_reference, None)
    }

    /// Register an array of `count` elements of type `element`.
    ///
    /// Arrays are not deduplicated.
    ///
    /// ## Errors
    ///
    /// `ResourceExhausted` if the synthetic range is used up.
    pub fn register_array_type(
        &self,
        module: ModuleKey,
        element: TypeId,
        count: u32,
        size_bytes: u64,
    ) -> SymtypeResult<TypeId>
    {
        let id = self.mint()?;
        let record = SyntheticRecord::Array(ArrayRecord {
            element,
            count,
            size_bytes,
        });
        self.write()
            .records
            .entry(module.process)
            .or_default()
            .entry(module.module)
            .or_default()
            .insert(id, record);
        debug!(%module, %element, count, array = %id, "registered synthetic array");
        Ok(id)
    }

    /// Pointer previously registered for `pointee`, if any.
    ///
    /// References are not pointers; see
    /// [`SyntheticTypeRegistry::lookup_reference_by_pointee`].
    #[must_use]
    pub fn lookup_pointer_by_pointee(&self, module: ModuleKey, pointee: TypeId) -> Option<TypeId>
    {
        self.read().pointer_for(
            module,
            PointerTarget {
                pointee,
                is_reference: false,
            },
        )
    }

    /// Reference previously registered for `pointee`, if any.
    #[must_use]
    pub fn lookup_reference_by_pointee(&self, module: ModuleKey, pointee: TypeId) -> Option<TypeId>
    {
        self.read().pointer_for(
            module,
            PointerTarget {
                pointee,
                is_reference: true,
            },
        )
    }

    /// Whether a record exists for `key`.
    #[must_use]
    pub fn peek_exists(&self, key: TypeKey) -> bool
    {
        self.get(key).is_ok()
    }

    /// Record for `key`.
    ///
    /// ## Errors
    ///
    /// `KeyNotFound` naming the first missing component.
    pub fn get(&self, key: TypeKey) -> SymtypeResult<SyntheticRecord>
    {
        let maps = self.read();
        let missing = |component| SymtypeError::KeyNotFound { key, component };
        let modules = maps.records.get(&key.process).ok_or_else(|| missing(KeyComponent::Process))?;
        let records = modules.get(&key.module).ok_or_else(|| missing(KeyComponent::Module))?;
        records.get(&key.id).copied().ok_or_else(|| missing(KeyComponent::Id))
    }

    /// Drop all synthetic data for `module` in every process.
    ///
    /// [`ModuleBase::ALL`] empties the registry. Returns the number of records
    /// removed.
    pub fn invalidate_module(&self, module: ModuleBase) -> usize
    {
        let mut maps = self.write();
        let maps = &mut *maps;

        let removed = if module.is_all() {
            let count: usize = maps.records.values().flat_map(HashMap::values).map(HashMap::len).sum();
            maps.records.clear();
            maps.pointers.clear();
            count
        } else {
            let mut count = 0;
            for modules in maps.records.values_mut() {
                count += modules.remove(&module).map_or(0, |records| records.len());
            }
            for modules in maps.pointers.values_mut() {
                modules.remove(&module);
            }
            maps.records.retain(|_, modules| !modules.is_empty());
            maps.pointers.retain(|_, modules| !modules.is_empty());
            count
        };

        if removed > 0 {
            warn!(%module, removed, "invalidated synthetic types for all processes");
        }
        removed
    }

    /// Drop all synthetic data for one process.
    ///
    /// Returns the number of records removed.
    pub fn invalidate_process(&self, process: ProcessHandle) -> usize
    {
        let mut maps = self.write();
        maps.pointers.remove(&process);
        let removed = maps
            .records
            .remove(&process)
            .map_or(0, |modules| modules.values().map(HashMap::len).sum::<usize>());
        debug!(%process, removed, "dropped synthetic types for process");
        removed
    }

    /// Current occupancy.
    #[must_use]
    pub fn stats(&self) -> RegistryStats
    {
        let maps = self.read();
        let mut stats = RegistryStats {
            processes: maps.records.len(),
            ..RegistryStats::default()
        };
        for record in maps.records.values().flat_map(HashMap::values).flat_map(HashMap::values) {
            match record {
                SyntheticRecord::Pointer(_) => stats.pointers += 1,
                SyntheticRecord::Array(_) => stats.arrays += 1,
            }
        }
        stats.modules = maps.records.values().map(HashMap::len).sum();
        stats.reverse_entries = maps.pointers.values().flat_map(HashMap::values).map(HashMap::len).sum();
        stats
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::DEBUGGER_GENERATED_BASE;

    fn module(process: u64, base: u64) -> ModuleKey
    {
        ModuleKey::new(ProcessHandle::new(process), ModuleBase::new(base))
    }

    #[test]
    fn test_first_id_is_strictly_inside_range()
    {
        let registry = SyntheticTypeRegistry::new();
        let id = registry
            .register_pointer_type(module(1, 0x1000), TypeId::new(5), 8, false, None)
            .unwrap();
        assert_eq!(id.raw(), SYNTHETIC_BASE + 1);
        assert!(id.is_synthetic());
    }

    #[test]
    fn test_ids_are_monotonic_across_invalidation()
    {
        let registry = SyntheticTypeRegistry::new();
        let first = registry
            .register_array_type(module(1, 0x1000), TypeId::new(5), 4, 16)
            .unwrap();
        registry.invalidate_module(ModuleBase::ALL);
        let second = registry
            .register_array_type(module(1, 0x1000), TypeId::new(5), 4, 16)
            .unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_exhaustion_is_reported()
    {
        let registry = SyntheticTypeRegistry::starting_after(SYNTHETIC_MAX - 1);
        let last = registry
            .register_array_type(module(1, 0x1000), TypeId::new(5), 1, 4)
            .unwrap();
        assert_eq!(last.raw(), SYNTHETIC_MAX);
        let err = registry
            .register_array_type(module(1, 0x1000), TypeId::new(5), 1, 4)
            .unwrap_err();
        assert!(matches!(err, SymtypeError::ResourceExhausted(_)));
    }

    #[test]
    fn test_explicit_id_must_be_debugger_generated()
    {
        let registry = SyntheticTypeRegistry::new();
        let err = registry
            .register_pointer_type(module(1, 0x1000), TypeId::new(5), 8, false, Some(TypeId::new(42)))
            .unwrap_err();
        assert!(matches!(err, SymtypeError::ArgumentInvalid(_)));

        let explicit = TypeId::new(DEBUGGER_GENERATED_BASE + 3);
        let id = registry
            .register_pointer_type(module(1, 0x1000), TypeId::new(5), 8, true, Some(explicit))
            .unwrap();
        assert_eq!(id, explicit);
        assert_eq!(registry.lookup_reference_by_pointee(module(1, 0x1000), TypeId::new(5)), Some(explicit));
        assert_eq!(registry.lookup_pointer_by_pointee(module(1, 0x1000), TypeId::new(5)), None);
    }

    #[test]
    fn test_get_reports_missing_component()
    {
        let registry = SyntheticTypeRegistry::new();
        let id = registry
            .register_pointer_type(module(1, 0x1000), TypeId::new(5), 8, false, None)
            .unwrap();

        let component = |key: TypeKey| match registry.get(key) {
            Err(SymtypeError::KeyNotFound { component, .. }) => Some(component),
            _ => None,
        };
        assert_eq!(component(module(2, 0x1000).with_type(id)), Some(KeyComponent::Process));
        assert_eq!(component(module(1, 0x2000).with_type(id)), Some(KeyComponent::Module));
        assert_eq!(
            component(module(1, 0x1000).with_type(TypeId::new(SYNTHETIC_MAX))),
            Some(KeyComponent::Id)
        );
        assert!(registry.peek_exists(module(1, 0x1000).with_type(id)));
    }

    #[test]
    fn test_get_or_register_deduplicates()
    {
        let registry = SyntheticTypeRegistry::new();
        let a = registry
            .get_or_register_pointer(module(1, 0x1000), TypeId::new(5), 8, false)
            .unwrap();
        let b = registry
            .get_or_register_pointer(module(1, 0x1000), TypeId::new(5), 8, false)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.stats().pointers, 1);
    }

    #[test]
    fn test_invalidate_process_leaves_others()
    {
        let registry = SyntheticTypeRegistry::new();
        registry
            .register_pointer_type(module(1, 0x1000), TypeId::new(5), 8, false, None)
            .unwrap();
        let kept = registry
            .register_pointer_type(module(2, 0x1000), TypeId::new(5), 8, false, None)
            .unwrap();
        assert_eq!(registry.invalidate_process(ProcessHandle::new(1)), 1);
        assert_eq!(registry.lookup_pointer_by_pointee(module(1, 0x1000), TypeId::new(5)), None);
        assert_eq!(registry.lookup_pointer_by_pointee(module(2, 0x1000), TypeId::new(5)), Some(kept));
    }

    #[test]
    fn test_stats()
    {
        let registry = SyntheticTypeRegistry::new();
        registry
            .register_pointer_type(module(1, 0x1000), TypeId::new(5), 8, false, None)
            .unwrap();
        registry
            .register_array_type(module(1, 0x2000), TypeId::new(5), 2, 8)
            .unwrap();
        registry
            .register_array_type(module(3, 0x2000), TypeId::new(5), 2, 8)
            .unwrap();
        assert_eq!(
            registry.stats(),
            RegistryStats {
                processes: 2,
                modules: 3,
                pointers: 1,
                arrays: 2,
                reverse_entries: 1,
            }
        );
    }
}
