//! Synthetic type records.

use serde::Serialize;

use crate::types::{SymTag, TypeId};

/// Pointer-to-X (or reference-to-X) fabricated by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PointerRecord
{
    /// Type pointed to.
    pub pointee: TypeId,
    /// Size of the pointer itself.
    pub size_bytes: u64,
    /// `T&` rather than `T*`.
    pub is_reference: bool,
}

/// Array-of-X fabricated by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ArrayRecord
{
    /// Element type.
    pub element: TypeId,
    /// Number of elements.
    pub count: u32,
    /// Total size of the array.
    pub size_bytes: u64,
}

/// A complete, immutable synthetic type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyntheticRecord
{
    Pointer(PointerRecord),
    Array(ArrayRecord),
}

impl SyntheticRecord
{
    /// Tag the record answers to.
    #[must_use]
    pub const fn tag(&self) -> SymTag
    {
        match self {
            Self::Pointer(_) => SymTag::PointerType,
            Self::Array(_) => SymTag::ArrayType,
        }
    }

    /// Size of a value of this type.
    #[must_use]
    pub const fn size_bytes(&self) -> u64
    {
        match self {
            Self::Pointer(pointer) => pointer.size_bytes,
            Self::Array(array) => array.size_bytes,
        }
    }

    /// The type this record is built on (pointee or element).
    #[must_use]
    pub const fn target(&self) -> TypeId
    {
        match self {
            Self::Pointer(pointer) => pointer.pointee,
            Self::Array(array) => array.element,
        }
    }
}
