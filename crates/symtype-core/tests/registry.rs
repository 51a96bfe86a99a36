//! Tests for the synthetic type registry

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use symtype_core::synthetic::{SyntheticRecord, SyntheticTypeRegistry};
use symtype_core::error::SymtypeError;
use symtype_core::types::{
    ModuleBase, ModuleKey, ProcessHandle, TypeId, DEBUGGER_GENERATED_BASE, SYNTHETIC_BASE, SYNTHETIC_MAX,
};

fn module(process: u64, base: u64) -> ModuleKey
{
    ModuleKey::new(ProcessHandle::new(process), ModuleBase::new(base))
}

#[test]
fn test_register_then_lookup()
{
    let registry = SyntheticTypeRegistry::new();
    let m = module(1, 0x1000);
    let id = registry.register_pointer_type(m, TypeId::new(40), 8, false, None).unwrap();

    assert_eq!(registry.lookup_pointer_by_pointee(m, TypeId::new(40)), Some(id));
    assert_eq!(registry.lookup_pointer_by_pointee(module(1, 0x2000), TypeId::new(40)), None);
    match registry.get(m.with_type(id)).unwrap() {
        SyntheticRecord::Pointer(pointer) => {
            assert_eq!(pointer.pointee, TypeId::new(40));
            assert_eq!(pointer.size_bytes, 8);
            assert!(!pointer.is_reference);
        }
        other => panic!("expected a pointer record, got {other:?}"),
    }
}

#[test]
fn test_arrays_are_not_deduplicated()
{
    let registry = SyntheticTypeRegistry::new();
    let m = module(1, 0x1000);
    let a = registry.register_array_type(m, TypeId::new(7), 4, 16).unwrap();
    let b = registry.register_array_type(m, TypeId::new(7), 4, 16).unwrap();
    assert_ne!(a, b);
    assert_eq!(registry.lookup_pointer_by_pointee(m, TypeId::new(7)), None);
}

#[test]
fn test_duplicate_pointee_reuses_pointer()
{
    let registry = SyntheticTypeRegistry::new();
    let m = module(1, 0x1000);
    let first = registry.register_pointer_type(m, TypeId::new(5), 8, false, None).unwrap();
    let again = registry.register_pointer_type(m, TypeId::new(5), 8, false, None).unwrap();
    assert_eq!(first, again);

    let stats = registry.stats();
    assert_eq!(stats.pointers, 1);
    assert_eq!(stats.reverse_entries, 1);
}

#[test]
fn test_pointer_and_reference_are_separate_types()
{
    let registry = SyntheticTypeRegistry::new();
    let m = module(1, 0x1000);
    let pointer = registry.register_pointer_type(m, TypeId::new(5), 8, false, None).unwrap();
    let reference = registry.register_pointer_type(m, TypeId::new(5), 8, true, None).unwrap();
    assert_ne!(pointer, reference);

    assert_eq!(registry.lookup_pointer_by_pointee(m, TypeId::new(5)), Some(pointer));
    assert_eq!(registry.lookup_reference_by_pointee(m, TypeId::new(5)), Some(reference));
    assert_eq!(
        registry.get_or_register_pointer(m, TypeId::new(5), 8, false).unwrap(),
        pointer
    );
    match registry.get(m.with_type(pointer)).unwrap() {
        SyntheticRecord::Pointer(record) => assert!(!record.is_reference),
        other => panic!("expected a pointer record, got {other:?}"),
    }

    let stats = registry.stats();
    assert_eq!(stats.pointers, 2);
    assert_eq!(stats.reverse_entries, 2);
}

#[test]
fn test_reused_explicit_id_is_rejected()
{
    let registry = SyntheticTypeRegistry::new();
    let m = module(1, 0x1000);
    let explicit = TypeId::new(DEBUGGER_GENERATED_BASE + 1);
    registry
        .register_pointer_type(m, TypeId::new(5), 8, false, Some(explicit))
        .unwrap();

    let err = registry
        .register_pointer_type(m, TypeId::new(6), 8, false, Some(explicit))
        .unwrap_err();
    assert!(matches!(err, SymtypeError::ArgumentInvalid(_)));

    // The first registration is untouched.
    assert_eq!(registry.lookup_pointer_by_pointee(m, TypeId::new(5)), Some(explicit));
    assert_eq!(registry.lookup_pointer_by_pointee(m, TypeId::new(6)), None);
    match registry.get(m.with_type(explicit)).unwrap() {
        SyntheticRecord::Pointer(record) => assert_eq!(record.pointee, TypeId::new(5)),
        other => panic!("expected a pointer record, got {other:?}"),
    }

    // Same pointee and id again is a no-op; a second id for it is not.
    assert_eq!(
        registry
            .register_pointer_type(m, TypeId::new(5), 8, false, Some(explicit))
            .unwrap(),
        explicit
    );
    let err = registry
        .register_pointer_type(m, TypeId::new(5), 8, false, Some(TypeId::new(DEBUGGER_GENERATED_BASE + 2)))
        .unwrap_err();
    assert!(matches!(err, SymtypeError::ArgumentInvalid(_)));

    let stats = registry.stats();
    assert_eq!(stats.pointers, 1);
    assert_eq!(stats.reverse_entries, 1);
}

#[test]
fn test_invalidate_module_hits_every_process()
{
    let registry = SyntheticTypeRegistry::new();
    let shared = 0x1000;
    let p1 = registry
        .register_pointer_type(module(1, shared), TypeId::new(5), 8, false, None)
        .unwrap();
    let p2 = registry
        .register_pointer_type(module(2, shared), TypeId::new(5), 8, false, None)
        .unwrap();
    let other = registry
        .register_pointer_type(module(1, 0x9000), TypeId::new(5), 8, false, None)
        .unwrap();
    registry
        .register_array_type(module(2, shared), TypeId::new(5), 3, 12)
        .unwrap();

    assert_eq!(registry.invalidate_module(ModuleBase::new(shared)), 3);

    assert!(!registry.peek_exists(module(1, shared).with_type(p1)));
    assert!(!registry.peek_exists(module(2, shared).with_type(p2)));
    assert_eq!(registry.lookup_pointer_by_pointee(module(1, shared), TypeId::new(5)), None);
    assert_eq!(registry.lookup_pointer_by_pointee(module(2, shared), TypeId::new(5)), None);

    assert!(registry.peek_exists(module(1, 0x9000).with_type(other)));
    assert_eq!(registry.lookup_pointer_by_pointee(module(1, 0x9000), TypeId::new(5)), Some(other));
}

#[test]
fn test_invalidate_all_empties_registry()
{
    let registry = SyntheticTypeRegistry::new();
    for process in 1..=3 {
        registry
            .register_pointer_type(module(process, 0x1000), TypeId::new(5), 8, false, None)
            .unwrap();
        registry
            .register_array_type(module(process, 0x2000), TypeId::new(5), 1, 4)
            .unwrap();
    }
    assert_eq!(registry.invalidate_module(ModuleBase::ALL), 6);
    assert_eq!(registry.stats(), Default::default());
    assert_eq!(registry.invalidate_module(ModuleBase::ALL), 0);
}

#[test]
fn test_concurrent_get_or_register_mints_one_id()
{
    let registry = Arc::new(SyntheticTypeRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                registry
                    .get_or_register_pointer(module(1, 0x1000), TypeId::new(77), 8, false)
                    .unwrap()
            })
        })
        .collect();
    let ids: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(registry.stats().pointers, 1);
}

proptest! {
    #[test]
    fn test_pointer_ids_unique_and_in_range(pointees in prop::collection::hash_set(0_u32..SYNTHETIC_BASE, 1..40))
    {
        let registry = SyntheticTypeRegistry::new();
        let m = module(9, 0x4000);
        let mut seen = HashSet::new();
        for pointee in &pointees {
            let id = registry.register_pointer_type(m, TypeId::new(*pointee), 8, false, None).unwrap();
            prop_assert!(id.raw() > SYNTHETIC_BASE && id.raw() <= SYNTHETIC_MAX);
            prop_assert!(seen.insert(id));
            prop_assert_eq!(registry.lookup_pointer_by_pointee(m, TypeId::new(*pointee)), Some(id));
        }
        let stats = registry.stats();
        prop_assert_eq!(stats.pointers, pointees.len());
        prop_assert_eq!(stats.reverse_entries, stats.pointers);
    }
}
