//! # Type Query Engine
//!
//! Turns "what is type X" questions into structured store requests and decodes
//! the answers into typed records.
//!
//! ## How a query runs
//!
//! 1. Classify the id. Synthetic ids (and debugger-generated ids the registry
//!    knows about) are answered from the
//!    [`SyntheticTypeRegistry`](crate::synthetic::SyntheticTypeRegistry) with no
//!    store round trip.
//! 2. Otherwise build a [`TypeInfoRequest`] from the kind's static layout and
//!    send it to the provider as one job on the [`StoreExecutor`].
//! 3. Validate the entry: the tag bit must be set, the tag must match, and
//!    the kind's required mask must be covered.
//! 4. Decode. Optional fields outside the validity mask become `None`.
//!
//! Every request buffer is owned by its [`TypeInfoRequest`] and travels into
//! the worker job and back, so it is released on every path.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use symtype_core::executor::InlineExecutor;
//! use symtype_core::provider::{MemoryStore, StoreSymbol};
//! use symtype_core::query::TypeQueryEngine;
//! use symtype_core::request::{FieldValue, TypeInfoField};
//! use symtype_core::synthetic::SyntheticTypeRegistry;
//! use symtype_core::types::{ModuleBase, ModuleKey, ProcessHandle, SymTag, TypeId, UdtInfo};
//! use symtype_core::EngineConfig;
//!
//! let module = ModuleKey::new(ProcessHandle::new(1), ModuleBase::new(0x1000));
//! let mut store = MemoryStore::new();
//! store.insert(
//!     module.process,
//!     module.module,
//!     StoreSymbol::new(2, SymTag::Udt)
//!         .named("Point")
//!         .with(TypeInfoField::UdtKind, FieldValue::U32(0))
//!         .with(TypeInfoField::Length, FieldValue::U64(8)),
//! );
//!
//! let engine = TypeQueryEngine::new(
//!     InlineExecutor::new(store),
//!     Arc::new(SyntheticTypeRegistry::new()),
//!     EngineConfig::default(),
//! );
//! let udt: UdtInfo = engine.query_as(module.with_type(TypeId::new(2)))?;
//! assert_eq!(udt.name, "Point");
//! # Ok::<(), symtype_core::SymtypeError>(())
//! ```

mod decode;
pub mod layout;

use std::sync::Arc;

use tracing::{debug, trace};

use self::decode::{decode_entry, project_synthetic};
pub use self::layout::KindLayout;
use crate::error::{KeyComponent, SymtypeError, SymtypeResult};
use crate::executor::StoreExecutor;
use crate::numeric::{canonicalize, extend_to_width, IntWidth};
use crate::provider::{BatchOutcome, NativeError, SymbolInfoProvider};
use crate::request::{FieldSlot, TypeInfoField, TypeInfoRequest};
use crate::session::EngineConfig;
use crate::synthetic::{SyntheticRecord, SyntheticTypeRegistry};
use crate::types::{
    ArrayTypeInfo, DataInfo, EnumInfo, EnumerandValue, FunctionArgument, FunctionTypeInfo, ModuleKey,
    PointerTypeInfo, QueryResult, RawQueryResult, SymTag, TypeId, TypeIdClass, TypeKey, TypedRecord, UdtInfo,
    UdtMember, ValidityMask,
};

/// Typedef chains longer than this are treated as cycles.
const MAX_TYPEDEF_DEPTH: usize = 64;

const ENUMERAND_FIELDS: [TypeInfoField; 3] = [TypeInfoField::SymTag, TypeInfoField::SymName, TypeInfoField::Value];
const ARGUMENT_FIELDS: [TypeInfoField; 2] = [TypeInfoField::SymTag, TypeInfoField::Type];

/// Batched type-information engine.
///
/// Owns the store executor. Shares the synthetic registry with the session
/// that created it.
pub struct TypeQueryEngine<X>
{
    executor: X,
    registry: Arc<SyntheticTypeRegistry>,
    config: EngineConfig,
}

impl<X: StoreExecutor> TypeQueryEngine<X>
{
    #[must_use]
    pub fn new(executor: X, registry: Arc<SyntheticTypeRegistry>, config: EngineConfig) -> Self
    {
        Self {
            executor,
            registry,
            config,
        }
    }

    /// The executor store calls go through.
    #[must_use]
    pub fn executor(&self) -> &X
    {
        &self.executor
    }

    /// The registry synthetic ids are answered from.
    #[must_use]
    pub fn registry(&self) -> &Arc<SyntheticTypeRegistry>
    {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig
    {
        &self.config
    }

    /// Registry record for `key`, if the id belongs to the registry.
    ///
    /// Synthetic ids must be in the registry. Debugger-generated ids may be,
    /// and fall through to the store when they are not.
    fn synthetic_record(&self, key: TypeKey) -> SymtypeResult<Option<SyntheticRecord>>
    {
        match key.id.class() {
            TypeIdClass::Synthetic => self.registry.get(key).map(Some),
            TypeIdClass::DebuggerGenerated => match self.registry.get(key) {
                Ok(record) => Ok(Some(record)),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(err),
            },
            TypeIdClass::Native => Ok(None),
            TypeIdClass::Invalid => Err(SymtypeError::ArgumentInvalid(format!("{} is not a valid type id", key.id))),
        }
    }

    /// Send a batched request to the store and take it back.
    fn run_batch(
        &self,
        module: ModuleKey,
        mut request: TypeInfoRequest,
        context: &str,
    ) -> SymtypeResult<(TypeInfoRequest, BatchOutcome)>
    {
        debug!(
            %module,
            fields = request.fields().len(),
            capacity = request.capacity(),
            bytes = request.buffer_len(),
            "{context}"
        );
        let (request, result) = self.executor.run(move |provider| {
            let result = SymbolInfoProvider::get_fields_batch(provider, module.process, module.module, &mut request);
            (request, result)
        })?;
        let outcome = result.map_err(|code| SymtypeError::transport(code, format!("{context} in {module}")))?;
        Ok((request, outcome))
    }

    /// Fetch one field of one symbol.
    fn run_field(&self, key: TypeKey, mut slot: FieldSlot) -> SymtypeResult<(FieldSlot, Result<(), NativeError>)>
    {
        trace!(%key, field = %slot.field(), "single-field request");
        self.executor.run(move |provider| {
            let result = SymbolInfoProvider::get_field(provider, key.process, key.module, key.id, &mut slot);
            (slot, result)
        })
    }

    fn fetch_u32(&self, key: TypeKey, field: TypeInfoField) -> SymtypeResult<u32>
    {
        let (slot, result) = self.run_field(key, FieldSlot::new(field)?)?;
        result.map_err(|code| SymtypeError::transport(code, format!("fetching {field} of {key}")))?;
        slot.read_u32()
            .ok_or_else(|| SymtypeError::DecodeInconsistency(format!("store left the {field} slot of {key} empty")))
    }

    /// Query `key` as a record of `kind`.
    ///
    /// ## Errors
    ///
    /// - `ArgumentInvalid`: `kind` has no decoder, or the id is invalid
    /// - `KeyNotFound`: the store (or registry) does not know the id
    /// - `WrongKind`: the id is a different kind of record
    /// - `Incomplete`: required fields were not supplied
    /// - `TransportFailure`: the store call failed
    pub fn query(&self, key: TypeKey, kind: SymTag) -> SymtypeResult<QueryResult>
    {
        let layout = KindLayout::for_tag(kind)
            .ok_or_else(|| SymtypeError::ArgumentInvalid(format!("no decoder for {kind} records")))?;

        if let Some(record) = self.synthetic_record(key)? {
            let (info, valid) = project_synthetic(layout, record, key)?;
            trace!(%key, %kind, "answered from synthetic registry");
            return Ok(QueryResult {
                info,
                valid: ValidityMask::new(valid),
            });
        }

        let request = TypeInfoRequest::for_ids(layout.fields, &[key.id])?;
        let (request, _) = self.run_batch(key.module_key(), request, "type query")?;

        let entry = request.entry(0).ok_or(SymtypeError::KeyNotFound {
            key,
            component: KeyComponent::Id,
        })?;
        let valid = entry.valid();
        let Some(actual) = entry.tag() else {
            return Err(SymtypeError::KeyNotFound {
                key,
                component: KeyComponent::Id,
            });
        };
        if actual != kind {
            return Err(SymtypeError::WrongKind {
                key,
                expected: kind,
                actual,
            });
        }
        if valid & layout.required != layout.required {
            return Err(SymtypeError::Incomplete {
                key,
                kind,
                required: layout.required,
                valid,
            });
        }

        let info = decode_entry(layout, entry, key)?;
        Ok(QueryResult {
            info,
            valid: ValidityMask::new(valid),
        })
    }

    /// Query `key` as record type `T`.
    ///
    /// ## Errors
    ///
    /// As [`TypeQueryEngine::query`].
    pub fn query_as<T: TypedRecord>(&self, key: TypeKey) -> SymtypeResult<T>
    {
        let result = self.query(key, T::TAG)?;
        let tag = result.info.tag();
        T::from_result(result.info).ok_or(SymtypeError::WrongKind {
            key,
            expected: T::TAG,
            actual: tag,
        })
    }

    /// ## Errors
    ///
    /// As [`TypeQueryEngine::query`].
    pub fn query_udt(&self, key: TypeKey) -> SymtypeResult<UdtInfo>
    {
        self.query_as(key)
    }

    /// ## Errors
    ///
    /// As [`TypeQueryEngine::query`].
    pub fn query_enum(&self, key: TypeKey) -> SymtypeResult<EnumInfo>
    {
        self.query_as(key)
    }

    /// ## Errors
    ///
    /// As [`TypeQueryEngine::query`].
    pub fn query_pointer(&self, key: TypeKey) -> SymtypeResult<PointerTypeInfo>
    {
        self.query_as(key)
    }

    /// ## Errors
    ///
    /// As [`TypeQueryEngine::query`].
    pub fn query_array(&self, key: TypeKey) -> SymtypeResult<ArrayTypeInfo>
    {
        self.query_as(key)
    }

    /// ## Errors
    ///
    /// As [`TypeQueryEngine::query`].
    pub fn query_function_type(&self, key: TypeKey) -> SymtypeResult<FunctionTypeInfo>
    {
        self.query_as(key)
    }

    /// ## Errors
    ///
    /// As [`TypeQueryEngine::query`].
    pub fn query_data(&self, key: TypeKey) -> SymtypeResult<DataInfo>
    {
        self.query_as(key)
    }

    /// Symbol tag of any id.
    ///
    /// ## Errors
    ///
    /// `KeyNotFound` for unknown synthetic ids, `TransportFailure` when the store
    /// cannot answer.
    pub fn symbol_tag(&self, key: TypeKey) -> SymtypeResult<SymTag>
    {
        if let Some(record) = self.synthetic_record(key)? {
            return Ok(record.tag());
        }
        self.fetch_u32(key, TypeInfoField::SymTag).map(SymTag::from_raw)
    }

    /// Ordered child ids of `key`.
    ///
    /// With `known_count` (from an earlier UDT or enum query) the count round
    /// trip is skipped.
    ///
    /// ## Errors
    ///
    /// `TransportFailure` if the store call fails or returns a different number
    /// of children than it reported.
    pub fn query_children(&self, key: TypeKey, known_count: Option<u32>) -> SymtypeResult<Vec<TypeId>>
    {
        if self.synthetic_record(key)?.is_some() {
            return Ok(Vec::new());
        }

        let count = match known_count {
            Some(count) => count,
            None => self.fetch_u32(key, TypeInfoField::ChildrenCount)?,
        };
        if count == 0 {
            return Ok(Vec::new());
        }

        let (slot, result) = self.run_field(key, FieldSlot::children(count)?)?;
        match result {
            Ok(()) => {}
            Err(code) if code.is_enumeration_end() => {
                debug!(%key, count, "store reported no children");
                return Ok(Vec::new());
            }
            Err(code) => {
                return Err(SymtypeError::transport(code, format!("enumerating children of {key}")));
            }
        }

        let children = slot.read_children()?;
        if children.len() != count as usize {
            return Err(SymtypeError::TransportFailure {
                code: None,
                context: format!(
                    "could not fetch all children of {key}: got {} of {count}",
                    children.len()
                ),
            });
        }
        Ok(children)
    }

    /// Arguments of a function type, in declaration order.
    ///
    /// One batched request fetches every argument.
    ///
    /// ## Errors
    ///
    /// - As [`TypeQueryEngine::query`] for the function type itself
    /// - `TransportFailure` if the store returns a different number of
    ///   arguments than the function type declares
    /// - `KeyNotFound` for an argument entry the store left empty
    /// - `WrongKind`/`Incomplete` for a malformed argument entry
    pub fn function_arguments(&self, key: TypeKey) -> SymtypeResult<Vec<FunctionArgument>>
    {
        let function = self.query_function_type(key)?;
        let count = function.children_count;
        if count == 0 {
            return Ok(Vec::new());
        }

        let request = TypeInfoRequest::for_children(
            &ARGUMENT_FIELDS,
            key.id,
            Some(SymTag::FunctionArgType),
            count as usize,
        )?;
        let (request, outcome) = self.run_batch(key.module_key(), request, "function arguments")?;
        ensure_all_filled(key, "arguments", outcome.entries_filled, count as usize)?;

        let full = request.full_mask();
        request
            .entries()
            .map(|entry| {
                let arg_key = key.sibling(entry.id());
                match entry.tag() {
                    Some(SymTag::FunctionArgType) => {}
                    Some(tag) => {
                        return Err(SymtypeError::WrongKind {
                            key: arg_key,
                            expected: SymTag::FunctionArgType,
                            actual: tag,
                        })
                    }
                    None => {
                        return Err(SymtypeError::KeyNotFound {
                            key: arg_key,
                            component: KeyComponent::Id,
                        })
                    }
                }
                match entry.type_id(TypeInfoField::Type) {
                    Some(type_id) if entry.valid() & full == full => Ok(FunctionArgument {
                        arg_id: entry.id(),
                        type_id,
                    }),
                    _ => Err(SymtypeError::Incomplete {
                        key: arg_key,
                        kind: SymTag::FunctionArgType,
                        required: full,
                        valid: entry.valid(),
                    }),
                }
            })
            .collect()
    }

    /// Enumerands of an enum type, in store order.
    ///
    /// Values are extended (or narrowed) to `declared_size` bytes and returned
    /// as canonical unsigned bit patterns.
    ///
    /// ## Errors
    ///
    /// - `ArgumentInvalid` if `declared_size` is not 1, 2, 4 or 8
    /// - `DecodeInconsistency` if a value does not fit the declared size
    /// - `TransportFailure` if the value batch comes back short
    /// - as [`TypeQueryEngine::query_children`]
    pub fn enumerands(
        &self,
        key: TypeKey,
        declared_size: u64,
        known_count: Option<u32>,
    ) -> SymtypeResult<Vec<EnumerandValue>>
    {
        let width = IntWidth::from_bytes(declared_size)?;
        let children = self.query_children(key, known_count)?;
        if children.is_empty() {
            return Ok(Vec::new());
        }

        let request = TypeInfoRequest::for_ids(&ENUMERAND_FIELDS, &children)?;
        let (request, outcome) = self.run_batch(key.module_key(), request, "enumerand values")?;
        ensure_all_filled(key, "enumerands", outcome.entries_filled, children.len())?;

        let full = request.full_mask();
        request
            .entries()
            .map(|entry| {
                let child = key.sibling(entry.id());
                if entry.valid() & full != full {
                    return Err(SymtypeError::Incomplete {
                        key: child,
                        kind: SymTag::Data,
                        required: full,
                        valid: entry.valid(),
                    });
                }
                let tag = entry.tag().unwrap_or(SymTag::Null);
                if tag != SymTag::Data {
                    return Err(SymtypeError::WrongKind {
                        key: child,
                        expected: SymTag::Data,
                        actual: tag,
                    });
                }

                let (Some(name), Some(raw)) = (entry.name()?, entry.value()?) else {
                    return Err(SymtypeError::DecodeInconsistency(format!(
                        "enumerand {child} has an unreadable name or value"
                    )));
                };
                let value = canonicalize(extend_to_width(raw, width)?, width);
                trace!(%child, name, raw = %raw, value, "enumerand");
                Ok(EnumerandValue {
                    name: name.to_string(),
                    value,
                })
            })
            .collect()
    }

    /// Data members of a UDT, in declaration order.
    ///
    /// Children that are not data (methods, base classes, nested types,
    /// vtables) are skipped.
    ///
    /// ## Errors
    ///
    /// As [`TypeQueryEngine::query`] for the UDT and for each member, plus
    /// `TransportFailure` if the member batch comes back short.
    pub fn udt_members(&self, key: TypeKey) -> SymtypeResult<Vec<UdtMember>>
    {
        let udt = self.query_udt(key)?;
        let children = self.query_children(key, Some(udt.children_count))?;
        if children.is_empty() {
            return Ok(Vec::new());
        }

        let layout = KindLayout::for_tag(SymTag::Data)
            .ok_or_else(|| SymtypeError::ArgumentInvalid("no decoder for Data records".to_string()))?;
        let request = TypeInfoRequest::for_ids(layout.fields, &children)?;
        let (request, outcome) = self.run_batch(key.module_key(), request, "udt members")?;
        ensure_all_filled(key, "members", outcome.entries_filled, children.len())?;

        let mut members = Vec::new();
        for entry in request.entries() {
            let member = key.sibling(entry.id());
            match entry.tag() {
                Some(SymTag::Data) => {}
                Some(_) => continue,
                None => {
                    return Err(SymtypeError::KeyNotFound {
                        key: member,
                        component: KeyComponent::Id,
                    })
                }
            }
            if entry.valid() & layout.required != layout.required {
                return Err(SymtypeError::Incomplete {
                    key: member,
                    kind: SymTag::Data,
                    required: layout.required,
                    valid: entry.valid(),
                });
            }
            if let RawQueryResult::Data(info) = decode_entry(layout, entry, member)? {
                members.push(UdtMember { id: entry.id(), info });
            }
        }
        debug!(%key, members = members.len(), children = children.len(), "decoded udt members");
        Ok(members)
    }

    /// Size in bytes of a value of type `key`.
    ///
    /// Typedefs are followed; data symbols report the size of their type.
    ///
    /// ## Errors
    ///
    /// `ArgumentInvalid` for kinds that have no size (functions, vtable
    /// shapes, ...) and typedef cycles, plus anything
    /// [`TypeQueryEngine::query`] returns.
    pub fn type_size(&self, key: TypeKey) -> SymtypeResult<u64>
    {
        let mut current = key;
        for _ in 0..MAX_TYPEDEF_DEPTH {
            if let Some(record) = self.synthetic_record(current)? {
                return Ok(record.size_bytes());
            }
            let tag = self.symbol_tag(current)?;
            let next = match self.query(current, tag)?.info {
                RawQueryResult::BaseType(info) => return Ok(info.length),
                RawQueryResult::PointerType(info) => return Ok(info.length),
                RawQueryResult::ArrayType(info) => return Ok(info.length),
                RawQueryResult::Udt(info) => return Ok(info.length),
                RawQueryResult::Enum(info) => return Ok(info.length),
                RawQueryResult::Typedef(info) => info.target,
                RawQueryResult::Data(info) => info.type_id,
                other => {
                    return Err(SymtypeError::ArgumentInvalid(format!(
                        "{current} is a {} record, which has no size",
                        other.tag()
                    )))
                }
            };
            current = current.sibling(next);
        }
        Err(SymtypeError::ArgumentInvalid(format!(
            "typedef chain from {key} is longer than {MAX_TYPEDEF_DEPTH} links"
        )))
    }

    /// Type a pointer (native or synthetic) points to.
    ///
    /// ## Errors
    ///
    /// As [`TypeQueryEngine::query`] with kind `PointerType`.
    pub fn pointee(&self, key: TypeKey) -> SymtypeResult<TypeId>
    {
        self.query_pointer(key).map(|pointer| pointer.pointee)
    }
}

impl<X> std::fmt::Debug for TypeQueryEngine<X>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("TypeQueryEngine")
            .field("registry", &self.registry.stats())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Batched child fetches must return one entry per requested child.
fn ensure_all_filled(key: TypeKey, what: &str, filled: usize, expected: usize) -> SymtypeResult<()>
{
    if filled == expected {
        return Ok(());
    }
    Err(SymtypeError::TransportFailure {
        code: None,
        context: format!("could not fetch all {what} of {key}: got {filled} of {expected}"),
    })
}
