//! In-memory symbol store.
//!
//! `MemoryStore` answers provider calls from a table of symbols, honouring the
//! same binary request layout, tag filters and error codes a live store uses.
//! The CLI loads it from a JSON fixture; tests build it in code.
//!
//! ## Fixture format
//!
//! ```json
//! {
//!   "processes": [{
//!     "handle": 1,
//!     "modules": [{
//!       "base": 4096,
//!       "symbols": [
//!         { "id": 1, "tag": "base_type",
//!           "fields": { "base_type": { "u32": 7 }, "length": { "u64": 4 } } },
//!         { "id": 2, "tag": "udt", "children": [3],
//!           "fields": { "sym_name": { "name": "Point" }, "udt_kind": { "u32": 0 },
//!                       "length": { "u64": 4 } } }
//!       ]
//!     }]
//!   }]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{BatchOutcome, NativeError, SymbolInfoProvider};
use crate::error::SymtypeResult;
use crate::request::{EntryWriter, FieldSlot, FieldValue, RequestTarget, TypeInfoField, TypeInfoRequest};
use crate::types::{ModuleBase, ProcessHandle, SymTag, TypeId};

/// One symbol record: a tag, a property bag, and ordered children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSymbol
{
    pub id: TypeId,
    pub tag: SymTag,
    #[serde(default)]
    pub fields: BTreeMap<TypeInfoField, FieldValue>,
    #[serde(default)]
    pub children: Vec<TypeId>,
}

impl StoreSymbol
{
    /// Symbol with only a tag.
    #[must_use]
    pub fn new(id: u32, tag: SymTag) -> Self
    {
        Self {
            id: TypeId::new(id),
            tag,
            fields: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Add a property.
    #[must_use]
    pub fn with(mut self, field: TypeInfoField, value: FieldValue) -> Self
    {
        self.fields.insert(field, value);
        self
    }

    /// Add a name.
    #[must_use]
    pub fn named(self, name: &str) -> Self
    {
        self.with(TypeInfoField::SymName, FieldValue::Name(name.to_string()))
    }

    /// Set the ordered child list.
    #[must_use]
    pub fn with_children(mut self, children: &[u32]) -> Self
    {
        self.children = children.iter().copied().map(TypeId::new).collect();
        self
    }

    /// Value the store reports for `field`, if any.
    ///
    /// The tag always comes from [`StoreSymbol::tag`]. The children count
    /// falls back to the length of the child list.
    #[must_use]
    pub fn field_value(&self, field: TypeInfoField) -> Option<FieldValue>
    {
        match field {
            TypeInfoField::SymTag => Some(FieldValue::tag(self.tag)),
            TypeInfoField::ChildrenCount => self.fields.get(&field).cloned().or_else(|| {
                u32::try_from(self.children.len()).ok().map(FieldValue::U32)
            }),
            TypeInfoField::FindChildren => None,
            _ => self.fields.get(&field).cloned(),
        }
    }
}

/// Symbols of one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleFixture
{
    pub base: ModuleBase,
    #[serde(default)]
    pub symbols: Vec<StoreSymbol>,
}

/// Modules of one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessFixture
{
    pub handle: ProcessHandle,
    #[serde(default)]
    pub modules: Vec<ModuleFixture>,
}

/// Serialized form of a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreFixture
{
    #[serde(default)]
    pub processes: Vec<ProcessFixture>,
}

/// Call counters, for checking round-trip counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats
{
    /// `get_field` calls.
    pub field_calls: usize,
    /// `get_fields_batch` calls.
    pub batch_calls: usize,
}

type SymbolTable = HashMap<TypeId, StoreSymbol>;

/// In-memory [`SymbolInfoProvider`].
#[derive(Debug, Default)]
pub struct MemoryStore
{
    processes: HashMap<ProcessHandle, HashMap<ModuleBase, SymbolTable>>,
    stats: StoreStats,
    fail_next: Option<NativeError>,
    batch_limit: Option<usize>,
}

impl MemoryStore
{
    /// Empty store with no processes.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Build from a deserialized fixture.
    #[must_use]
    pub fn from_fixture(fixture: StoreFixture) -> Self
    {
        let mut store = Self::new();
        for process in fixture.processes {
            for module in process.modules {
                store.add_module(process.handle, module.base);
                for symbol in module.symbols {
                    store.insert(process.handle, module.base, symbol);
                }
            }
        }
        store
    }

    /// Parse a JSON fixture.
    ///
    /// ## Errors
    ///
    /// `Json` if the text is not a valid fixture.
    pub fn from_json(text: &str) -> SymtypeResult<Self>
    {
        let fixture: StoreFixture = serde_json::from_str(text)?;
        Ok(Self::from_fixture(fixture))
    }

    /// Read and parse a JSON fixture file.
    ///
    /// ## Errors
    ///
    /// `Io` if the file cannot be read, `Json` if it is malformed.
    pub fn from_path(path: &Path) -> SymtypeResult<Self>
    {
        let text = std::fs::read_to_string(path)?;
        let store = Self::from_json(&text)?;
        debug!(path = %path.display(), processes = store.processes.len(), "loaded symbol fixture");
        Ok(store)
    }

    /// Register a module with no symbols yet.
    pub fn add_module(&mut self, process: ProcessHandle, module: ModuleBase) -> &mut Self
    {
        self.processes.entry(process).or_default().entry(module).or_default();
        self
    }

    /// Add or replace a symbol.
    pub fn insert(&mut self, process: ProcessHandle, module: ModuleBase, symbol: StoreSymbol) -> &mut Self
    {
        self.processes
            .entry(process)
            .or_default()
            .entry(module)
            .or_default()
            .insert(symbol.id, symbol);
        self
    }

    /// Drop a module's symbols, as an unload would.
    pub fn remove_module(&mut self, process: ProcessHandle, module: ModuleBase) -> bool
    {
        self.processes
            .get_mut(&process)
            .is_some_and(|modules| modules.remove(&module).is_some())
    }

    /// Make the next call (of either kind) fail with `error`.
    pub fn fail_next_call(&mut self, error: NativeError)
    {
        self.fail_next = Some(error);
    }

    /// Make every batch call stop after writing `limit` entries; `None` lifts
    /// the limit.
    pub fn set_batch_limit(&mut self, limit: Option<usize>)
    {
        self.batch_limit = limit;
    }

    /// Call counters since construction or the last reset.
    #[must_use]
    pub fn stats(&self) -> StoreStats
    {
        self.stats
    }

    /// Zero the call counters.
    pub fn reset_stats(&mut self)
    {
        self.stats = StoreStats::default();
    }

    fn symbols(&self, process: ProcessHandle, module: ModuleBase) -> Result<&SymbolTable, NativeError>
    {
        self.processes
            .get(&process)
            .ok_or(NativeError::INVALID_HANDLE)?
            .get(&module)
            .ok_or(NativeError::MOD_NOT_FOUND)
    }
}

fn fill_entry(entry: &mut EntryWriter<'_>, fields: &[TypeInfoField], symbol: &StoreSymbol) -> Result<(), NativeError>
{
    for field in fields {
        if let Some(value) = symbol.field_value(*field) {
            entry.put(*field, &value)?;
        }
    }
    Ok(())
}

impl SymbolInfoProvider for MemoryStore
{
    fn get_field(
        &mut self,
        process: ProcessHandle,
        module: ModuleBase,
        id: TypeId,
        slot: &mut FieldSlot,
    ) -> Result<(), NativeError>
    {
        self.stats.field_calls += 1;
        if let Some(error) = self.fail_next.take() {
            return Err(error);
        }

        let symbol = self.symbols(process, module)?.get(&id).ok_or(NativeError::NOT_FOUND)?;
        trace!(id = id.raw(), field = %slot.field(), "get_field");

        if slot.field() == TypeInfoField::FindChildren {
            if symbol.children.is_empty() {
                // DbgHelp fails an empty enumeration without setting an error
                return Err(NativeError::SUCCESS);
            }
            slot.write_children(&symbol.children)?;
            return Ok(());
        }

        let value = symbol.field_value(slot.field()).ok_or(NativeError::NOT_SUPPORTED)?;
        slot.write(&value)
    }

    fn get_fields_batch(
        &mut self,
        process: ProcessHandle,
        module: ModuleBase,
        request: &mut TypeInfoRequest,
    ) -> Result<BatchOutcome, NativeError>
    {
        self.stats.batch_calls += 1;
        if let Some(error) = self.fail_next.take() {
            return Err(error);
        }

        let limit = self.batch_limit.unwrap_or(usize::MAX);
        let symbols = self.symbols(process, module)?;
        let fields = request.fields().to_vec();
        trace!(fields = fields.len(), capacity = request.capacity(), "get_fields_batch");

        match request.target().clone() {
            RequestTarget::Ids(ids) => {
                for id in ids.into_iter().take(limit) {
                    let Some(mut entry) = request.push_entry(id) else {
                        break;
                    };
                    if let Some(symbol) = symbols.get(&id) {
                        fill_entry(&mut entry, &fields, symbol)?;
                    }
                }
            }
            RequestTarget::ChildrenOf { parent, tag_filter } => {
                let parent = symbols.get(&parent).ok_or(NativeError::NOT_FOUND)?;
                for child_id in &parent.children {
                    if request.entries_filled() >= limit {
                        break;
                    }
                    let Some(child) = symbols.get(child_id) else {
                        continue;
                    };
                    if tag_filter.is_some_and(|tag| tag != child.tag) {
                        continue;
                    }
                    if let Some(mut entry) = request.push_entry(*child_id) {
                        fill_entry(&mut entry, &fields, child)?;
                    }
                }
            }
        }

        Ok(request.outcome())
    }
}
