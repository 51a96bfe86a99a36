//! Decoded type records.
//!
//! One struct per symbol kind the query engine understands. Required fields
//! are plain values; optional fields are `Option` and are `None` whenever the
//! store left them out of the validity mask.

use std::fmt;

use serde::Serialize;

use super::{BasicType, CallingConvention, DataKind, SymTag, TypeId, UdtKind};
use crate::numeric::RawInteger;

/// Primitive type (`int`, `char`, `float`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseTypeInfo
{
    pub base_type: BasicType,
    pub length: u64,
}

/// `T*` or `T&`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointerTypeInfo
{
    pub pointee: TypeId,
    pub length: u64,
    pub is_reference: Option<bool>,
}

/// `T[n]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrayTypeInfo
{
    pub element: TypeId,
    pub index_type: Option<TypeId>,
    pub count: u32,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypedefInfo
{
    pub target: TypeId,
    pub name: String,
}

/// struct, class, union or interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UdtInfo
{
    pub udt_kind: UdtKind,
    pub length: u64,
    pub children_count: u32,
    /// Enclosing class of a nested type.
    pub class_parent: Option<TypeId>,
    pub vtable_shape: Option<TypeId>,
    pub name: String,
}

/// Variable, parameter, member or named constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataInfo
{
    pub data_kind: DataKind,
    pub type_id: TypeId,
    pub name: String,
    /// Byte offset inside the enclosing UDT (members) or frame (locals).
    pub offset: Option<u32>,
    /// Address of static and global data.
    pub address: Option<u64>,
    /// First bit of a bitfield member.
    pub bit_position: Option<u32>,
    /// Bit count of a bitfield member.
    pub length: Option<u64>,
    pub class_parent: Option<TypeId>,
    /// Value of a constant, as reported by the store.
    pub value: Option<RawInteger>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionTypeInfo
{
    pub return_type: TypeId,
    /// Number of arguments.
    pub children_count: u32,
    pub calling_convention: CallingConvention,
    pub class_parent: Option<TypeId>,
    pub this_adjust: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionArgTypeInfo
{
    pub type_id: TypeId,
}

/// Base class entry of a UDT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseClassInfo
{
    pub type_id: TypeId,
    /// Offset of the base subobject. Always present for non-virtual bases.
    pub offset: Option<u32>,
    pub is_virtual: bool,
    pub virtual_base_pointer_offset: Option<i32>,
    pub virtual_base_disp_index: Option<u32>,
}

/// Function symbol. Pure virtual functions have no address or length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInfo
{
    pub type_id: TypeId,
    pub name: String,
    pub address: Option<u64>,
    pub length: Option<u64>,
    pub class_parent: Option<TypeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VTableInfo
{
    pub type_id: TypeId,
    pub class_parent: Option<TypeId>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VTableShapeInfo
{
    /// Number of slots.
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumInfo
{
    /// Backing integer type.
    pub underlying: TypeId,
    pub length: u64,
    pub children_count: u32,
    pub name: String,
    pub nested: Option<bool>,
}

/// One decoded record, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawQueryResult
{
    BaseType(BaseTypeInfo),
    PointerType(PointerTypeInfo),
    ArrayType(ArrayTypeInfo),
    Typedef(TypedefInfo),
    Udt(UdtInfo),
    Data(DataInfo),
    FunctionType(FunctionTypeInfo),
    FunctionArgType(FunctionArgTypeInfo),
    BaseClass(BaseClassInfo),
    Function(FunctionInfo),
    VTable(VTableInfo),
    VTableShape(VTableShapeInfo),
    Enum(EnumInfo),
}

impl RawQueryResult
{
    /// Symbol tag of the record.
    #[must_use]
    pub const fn tag(&self) -> SymTag
    {
        match self {
            Self::BaseType(_) => SymTag::BaseType,
            Self::PointerType(_) => SymTag::PointerType,
            Self::ArrayType(_) => SymTag::ArrayType,
            Self::Typedef(_) => SymTag::Typedef,
            Self::Udt(_) => SymTag::Udt,
            Self::Data(_) => SymTag::Data,
            Self::FunctionType(_) => SymTag::FunctionType,
            Self::FunctionArgType(_) => SymTag::FunctionArgType,
            Self::BaseClass(_) => SymTag::BaseClass,
            Self::Function(_) => SymTag::Function,
            Self::VTable(_) => SymTag::Vtable,
            Self::VTableShape(_) => SymTag::VtableShape,
            Self::Enum(_) => SymTag::Enum,
        }
    }
}

/// Validity mask of a query result. Bit `n` covers field `n` of the kind's
/// field list; bit 0 is the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct ValidityMask(u64);

impl ValidityMask
{
    #[must_use]
    pub const fn new(bits: u64) -> Self
    {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u64
    {
        self.0
    }

    /// Whether every bit of `mask` is set.
    #[must_use]
    pub const fn contains(self, mask: u64) -> bool
    {
        self.0 & mask == mask
    }

    /// Whether field `index` is valid.
    #[must_use]
    pub const fn is_set(self, index: u32) -> bool
    {
        index < 64 && self.0 & (1_u64 << index) != 0
    }
}

impl fmt::Display for ValidityMask
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#x}", self.0)
    }
}

/// A decoded record and the validity mask it was decoded under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult
{
    pub info: RawQueryResult,
    pub valid: ValidityMask,
}

/// One enumerand: its name and canonical unsigned bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumerandValue
{
    pub name: String,
    pub value: u64,
}

/// One argument of a function type, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FunctionArgument
{
    /// Id of the `FunctionArgType` symbol.
    pub arg_id: TypeId,
    /// Type of the argument.
    pub type_id: TypeId,
}

/// A data member of a UDT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UdtMember
{
    pub id: TypeId,
    #[serde(flatten)]
    pub info: DataInfo,
}

/// Record types that can be requested by type.
///
/// Lets callers write `engine.query_as::<UdtInfo>(key)` instead of matching on
/// [`RawQueryResult`].
pub trait TypedRecord: Sized
{
    /// Tag the store must report.
    const TAG: SymTag;

    /// Unwrap the matching variant.
    fn from_result(result: RawQueryResult) -> Option<Self>;
}

macro_rules! typed_record {
    ($($record:ident => $variant:ident, $tag:ident;)+) => {
        $(
            impl TypedRecord for $record
            {
                const TAG: SymTag = SymTag::$tag;

                fn from_result(result: RawQueryResult) -> Option<Self>
                {
                    match result {
                        RawQueryResult::$variant(info) => Some(info),
                        _ => None,
                    }
                }
            }
        )+
    };
}

typed_record! {
    BaseTypeInfo => BaseType, BaseType;
    PointerTypeInfo => PointerType, PointerType;
    ArrayTypeInfo => ArrayType, ArrayType;
    TypedefInfo => Typedef, Typedef;
    UdtInfo => Udt, Udt;
    DataInfo => Data, Data;
    FunctionTypeInfo => FunctionType, FunctionType;
    FunctionArgTypeInfo => FunctionArgType, FunctionArgType;
    BaseClassInfo => BaseClass, BaseClass;
    FunctionInfo => Function, Function;
    VTableInfo => VTable, Vtable;
    VTableShapeInfo => VTableShape, VtableShape;
    EnumInfo => Enum, Enum;
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_validity_mask()
    {
        let mask = ValidityMask::new(0x4f);
        assert!(mask.contains(0x0f));
        assert!(!mask.contains(0x1f));
        assert!(mask.is_set(6));
        assert!(!mask.is_set(64));
        assert_eq!(mask.to_string(), "0x4f");
    }

    #[test]
    fn test_typed_record_unwraps_matching_variant()
    {
        let result = RawQueryResult::VTableShape(VTableShapeInfo { count: 3 });
        assert_eq!(result.tag(), SymTag::VtableShape);
        assert_eq!(VTableShapeInfo::from_result(result.clone()), Some(VTableShapeInfo { count: 3 }));
        assert_eq!(UdtInfo::from_result(result), None);
    }
}
