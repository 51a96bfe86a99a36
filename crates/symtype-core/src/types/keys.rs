//! Lookup keys: process handles, module bases, and type ids.

use std::fmt;

use serde::{Deserialize, Serialize};

/// First id of the synthetic range. Ids minted by the registry are strictly
/// greater than this value.
pub const SYNTHETIC_BASE: u32 = 0x8000_0000;

/// Last id of the synthetic range (inclusive).
pub const SYNTHETIC_MAX: u32 = 0xBFFF_FFFF;

/// First id of the range reserved for debugger-generated types.
///
/// Callers may hand these ids to
/// [`SyntheticTypeRegistry::register_pointer_type`](crate::synthetic::SyntheticTypeRegistry::register_pointer_type)
/// explicitly; they are answered by the native store like any other id.
pub const DEBUGGER_GENERATED_BASE: u32 = 0xC000_0000;

/// Last id of the debugger-generated range (inclusive).
pub const DEBUGGER_GENERATED_MAX: u32 = 0xFFFF_FFFE;

/// Native process handle used as the outermost key.
///
/// The value is opaque to this crate. It is whatever the process resolver hands
/// back for a debugging session (a `HANDLE` on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessHandle(u64);

impl ProcessHandle
{
    /// Wrap a raw handle value.
    #[must_use]
    pub const fn new(raw: u64) -> Self
    {
        Self(raw)
    }

    /// Raw handle value.
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl From<u64> for ProcessHandle
{
    fn from(raw: u64) -> Self
    {
        Self(raw)
    }
}

impl fmt::Display for ProcessHandle
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "process {:#x}", self.0)
    }
}

/// Load address of a module image.
///
/// [`ModuleBase::ALL`] is a sentinel understood by invalidation: it names every
/// module of every process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleBase(u64);

impl ModuleBase
{
    /// Sentinel meaning "all modules".
    pub const ALL: Self = ModuleBase(u64::MAX);

    /// Wrap a load address.
    #[must_use]
    pub const fn new(address: u64) -> Self
    {
        Self(address)
    }

    /// The load address.
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }

    /// Whether this is the [`ModuleBase::ALL`] sentinel.
    #[must_use]
    pub const fn is_all(self) -> bool
    {
        self.0 == u64::MAX
    }
}

impl From<u64> for ModuleBase
{
    fn from(address: u64) -> Self
    {
        Self(address)
    }
}

impl fmt::Display for ModuleBase
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.is_all() {
            write!(f, "module <all>")
        } else {
            write!(f, "module 0x{:016x}", self.0)
        }
    }
}

/// Which partition of the id space a [`TypeId`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeIdClass
{
    /// Assigned by the symbol store.
    Native,
    /// Minted by the synthetic type registry.
    Synthetic,
    /// Reserved for debugger-generated types supplied by callers.
    DebuggerGenerated,
    /// `u32::MAX`, never a valid id.
    Invalid,
}

/// Opaque type identifier, meaningful only relative to a process and module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(u32);

impl TypeId
{
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u32) -> Self
    {
        Self(raw)
    }

    /// Raw id value.
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }

    /// Classify the id against the partition table.
    #[must_use]
    pub const fn class(self) -> TypeIdClass
    {
        if self.0 < SYNTHETIC_BASE {
            TypeIdClass::Native
        } else if self.0 <= SYNTHETIC_MAX {
            TypeIdClass::Synthetic
        } else if self.0 >= DEBUGGER_GENERATED_BASE && self.0 <= DEBUGGER_GENERATED_MAX {
            TypeIdClass::DebuggerGenerated
        } else {
            TypeIdClass::Invalid
        }
    }

    /// Whether the id lies in the synthetic range.
    #[must_use]
    pub const fn is_synthetic(self) -> bool
    {
        matches!(self.class(), TypeIdClass::Synthetic)
    }

    /// Whether the id lies in the debugger-generated range.
    #[must_use]
    pub const fn is_debugger_generated(self) -> bool
    {
        matches!(self.class(), TypeIdClass::DebuggerGenerated)
    }
}

impl From<u32> for TypeId
{
    fn from(raw: u32) -> Self
    {
        Self(raw)
    }
}

impl From<TypeId> for u32
{
    fn from(id: TypeId) -> Self
    {
        id.0
    }
}

impl fmt::Display for TypeId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "type {:#x}", self.0)
    }
}

/// (process, module) pair: everything in a [`TypeKey`] except the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleKey
{
    /// Process the module is loaded in.
    pub process: ProcessHandle,
    /// Load address of the module.
    pub module: ModuleBase,
}

impl ModuleKey
{
    /// Build a module key.
    #[must_use]
    pub const fn new(process: ProcessHandle, module: ModuleBase) -> Self
    {
        Self { process, module }
    }

    /// Complete the key with a type id.
    #[must_use]
    pub const fn with_type(self, id: TypeId) -> TypeKey
    {
        TypeKey {
            process: self.process,
            module: self.module,
            id,
        }
    }
}

impl fmt::Display for ModuleKey
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} / {}", self.process, self.module)
    }
}

/// Universal lookup key for a type record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeKey
{
    /// Owning process.
    pub process: ProcessHandle,
    /// Module the id is scoped to.
    pub module: ModuleBase,
    /// Type id within the module.
    pub id: TypeId,
}

impl TypeKey
{
    /// Build a key from raw parts.
    #[must_use]
    pub const fn new(process: ProcessHandle, module: ModuleBase, id: TypeId) -> Self
    {
        Self { process, module, id }
    }

    /// The (process, module) part of the key.
    #[must_use]
    pub const fn module_key(self) -> ModuleKey
    {
        ModuleKey::new(self.process, self.module)
    }

    /// Same process and module, different id.
    #[must_use]
    pub const fn sibling(self, id: TypeId) -> Self
    {
        Self { id, ..self }
    }
}

impl fmt::Display for TypeKey
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} / {} / {}", self.process, self.module, self.id)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_type_id_partition()
    {
        assert_eq!(TypeId::new(0).class(), TypeIdClass::Native);
        assert_eq!(TypeId::new(SYNTHETIC_BASE - 1).class(), TypeIdClass::Native);
        assert_eq!(TypeId::new(SYNTHETIC_BASE).class(), TypeIdClass::Synthetic);
        assert_eq!(TypeId::new(SYNTHETIC_MAX).class(), TypeIdClass::Synthetic);
        assert_eq!(TypeId::new(DEBUGGER_GENERATED_BASE).class(), TypeIdClass::DebuggerGenerated);
        assert_eq!(TypeId::new(DEBUGGER_GENERATED_MAX).class(), TypeIdClass::DebuggerGenerated);
        assert_eq!(TypeId::new(u32::MAX).class(), TypeIdClass::Invalid);
    }

    #[test]
    fn test_module_base_all_sentinel()
    {
        assert!(ModuleBase::ALL.is_all());
        assert!(!ModuleBase::new(0x1000).is_all());
        assert_eq!(ModuleBase::ALL.to_string(), "module <all>");
    }

    #[test]
    fn test_type_key_parts()
    {
        let module = ModuleKey::new(ProcessHandle::new(4), ModuleBase::new(0x7ff0_0000));
        let key = module.with_type(TypeId::new(12));
        assert_eq!(key.module_key(), module);
        assert_eq!(key.sibling(TypeId::new(13)).id, TypeId::new(13));
        assert_eq!(key.sibling(TypeId::new(13)).module, key.module);
    }
}
