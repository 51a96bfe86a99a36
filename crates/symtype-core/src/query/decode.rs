//! Decoding validated entries into typed records.

use tracing::trace;

use super::layout::KindLayout;
use crate::error::{SymtypeError, SymtypeResult};
use crate::request::{EntryReader, TypeInfoField};
use crate::synthetic::SyntheticRecord;
use crate::types::{
    ArrayTypeInfo, BaseClassInfo, BaseTypeInfo, BasicType, CallingConvention, DataInfo, DataKind, EnumInfo,
    FunctionArgTypeInfo, FunctionInfo, FunctionTypeInfo, PointerTypeInfo, RawQueryResult, SymTag, TypeKey,
    TypedefInfo, UdtInfo, UdtKind, VTableInfo, VTableShapeInfo,
};

/// Reads fields of one entry. Required fields have already been checked
/// against the mask, so a missing one means the slot itself was malformed.
struct Fields<'a>
{
    entry: EntryReader<'a>,
    layout: &'static KindLayout,
    key: TypeKey,
}

impl Fields<'_>
{
    fn missing(&self, field: TypeInfoField) -> SymtypeError
    {
        SymtypeError::DecodeInconsistency(format!("{} slot of {} could not be read", field, self.key))
    }

    fn u32(&self, field: TypeInfoField) -> SymtypeResult<u32>
    {
        self.entry.u32(field).ok_or_else(|| self.missing(field))
    }

    fn u64(&self, field: TypeInfoField) -> SymtypeResult<u64>
    {
        self.entry.u64(field).ok_or_else(|| self.missing(field))
    }

    fn id(&self, field: TypeInfoField) -> SymtypeResult<crate::types::TypeId>
    {
        self.entry.type_id(field).ok_or_else(|| self.missing(field))
    }

    fn flag(&self, field: TypeInfoField) -> SymtypeResult<bool>
    {
        self.entry.flag(field).ok_or_else(|| self.missing(field))
    }

    fn name(&self) -> SymtypeResult<String>
    {
        self.entry
            .name()?
            .map(str::to_string)
            .ok_or_else(|| self.missing(TypeInfoField::SymName))
    }

    /// Fail with `Incomplete` unless `field` is valid.
    fn require(&self, field: TypeInfoField) -> SymtypeResult<()>
    {
        let bit = self.layout.bit(field);
        let valid = self.entry.valid();
        if valid & bit == 0 {
            return Err(SymtypeError::Incomplete {
                key: self.key,
                kind: self.layout.tag,
                required: self.layout.required | bit,
                valid,
            });
        }
        Ok(())
    }
}

/// Decode an entry whose tag and required mask have already been checked.
pub(crate) fn decode_entry(
    layout: &'static KindLayout,
    entry: EntryReader<'_>,
    key: TypeKey,
) -> SymtypeResult<RawQueryResult>
{
    use TypeInfoField as F;

    let f = Fields { entry, layout, key };
    let info = match layout.tag {
        SymTag::BaseType => RawQueryResult::BaseType(BaseTypeInfo {
            base_type: BasicType::from_raw(f.u32(F::BaseType)?),
            length: f.u64(F::Length)?,
        }),
        SymTag::PointerType => RawQueryResult::PointerType(PointerTypeInfo {
            pointee: f.id(F::Type)?,
            length: f.u64(F::Length)?,
            is_reference: entry.flag(F::IsReference),
        }),
        SymTag::ArrayType => RawQueryResult::ArrayType(ArrayTypeInfo {
            element: f.id(F::Type)?,
            index_type: entry.type_id(F::ArrayIndexTypeId),
            count: f.u32(F::Count)?,
            length: f.u64(F::Length)?,
        }),
        SymTag::Typedef => RawQueryResult::Typedef(TypedefInfo {
            target: f.id(F::Type)?,
            name: f.name()?,
        }),
        SymTag::Udt => RawQueryResult::Udt(UdtInfo {
            udt_kind: UdtKind::try_from(f.u32(F::UdtKind)?)?,
            length: f.u64(F::Length)?,
            children_count: f.u32(F::ChildrenCount)?,
            class_parent: entry.type_id(F::ClassParentId),
            vtable_shape: entry.type_id(F::VirtualTableShapeId),
            name: f.name()?,
        }),
        SymTag::Data => {
            let data_kind = DataKind::try_from(f.u32(F::DataKind)?)?;
            match data_kind {
                DataKind::Member => f.require(F::Offset)?,
                DataKind::Constant => f.require(F::Value)?,
                kind if kind.has_static_address() => f.require(F::Address)?,
                _ => {}
            }
            RawQueryResult::Data(DataInfo {
                data_kind,
                type_id: f.id(F::Type)?,
                name: f.name()?,
                offset: entry.u32(F::Offset),
                address: entry.u64(F::Address),
                bit_position: entry.u32(F::BitPosition),
                length: entry.u64(F::Length),
                class_parent: entry.type_id(F::ClassParentId),
                value: match entry.value() {
                    Ok(value) => value,
                    // Floating-point and string constants have no integer form.
                    Err(err) => {
                        trace!(%key, %err, "constant value is not an integer");
                        None
                    }
                },
            })
        }
        SymTag::FunctionType => RawQueryResult::FunctionType(FunctionTypeInfo {
            return_type: f.id(F::Type)?,
            children_count: f.u32(F::ChildrenCount)?,
            calling_convention: CallingConvention::from_raw(f.u32(F::CallingConvention)?),
            class_parent: entry.type_id(F::ClassParentId),
            this_adjust: entry.i32(F::ThisAdjust),
        }),
        SymTag::FunctionArgType => RawQueryResult::FunctionArgType(FunctionArgTypeInfo {
            type_id: f.id(F::Type)?,
        }),
        SymTag::BaseClass => {
            let is_virtual = f.flag(F::VirtualBaseClass)?;
            if !is_virtual {
                f.require(F::Offset)?;
            }
            RawQueryResult::BaseClass(BaseClassInfo {
                type_id: f.id(F::Type)?,
                offset: entry.u32(F::Offset),
                is_virtual,
                virtual_base_pointer_offset: entry.i32(F::VirtualBasePointerOffset),
                virtual_base_disp_index: entry.u32(F::VirtualBaseDispIndex),
            })
        }
        SymTag::Function => RawQueryResult::Function(FunctionInfo {
            type_id: f.id(F::Type)?,
            name: f.name()?,
            address: entry.u64(F::Address),
            length: entry.u64(F::Length),
            class_parent: entry.type_id(F::ClassParentId),
        }),
        SymTag::Vtable => RawQueryResult::VTable(VTableInfo {
            type_id: f.id(F::Type)?,
            class_parent: entry.type_id(F::ClassParentId),
            offset: entry.u32(F::Offset),
        }),
        SymTag::VtableShape => RawQueryResult::VTableShape(VTableShapeInfo { count: f.u32(F::Count)? }),
        SymTag::Enum => RawQueryResult::Enum(EnumInfo {
            underlying: f.id(F::Type)?,
            length: f.u64(F::Length)?,
            children_count: f.u32(F::ChildrenCount)?,
            name: f.name()?,
            nested: entry.flag(F::Nested),
        }),
        other => {
            return Err(SymtypeError::ArgumentInvalid(format!("no decoder for {other} records")));
        }
    };

    trace!(%key, kind = %layout.tag, valid = entry.valid(), "decoded entry");
    Ok(info)
}

/// Project a synthetic record into the shape of `kind`.
///
/// Returns the record and the mask of fields it populates.
///
/// ## Errors
///
/// `WrongKind` when the record is not of the requested kind.
pub(crate) fn project_synthetic(
    layout: &'static KindLayout,
    record: SyntheticRecord,
    key: TypeKey,
) -> SymtypeResult<(RawQueryResult, u64)>
{
    if record.tag() != layout.tag {
        return Err(SymtypeError::WrongKind {
            key,
            expected: layout.tag,
            actual: record.tag(),
        });
    }

    let projected = match record {
        SyntheticRecord::Pointer(pointer) => (
            RawQueryResult::PointerType(PointerTypeInfo {
                pointee: pointer.pointee,
                length: pointer.size_bytes,
                is_reference: Some(pointer.is_reference),
            }),
            layout.full_mask(),
        ),
        // Synthetic arrays carry no index type.
        SyntheticRecord::Array(array) => (
            RawQueryResult::ArrayType(ArrayTypeInfo {
                element: array.element,
                index_type: None,
                count: array.count,
                length: array.size_bytes,
            }),
            layout.full_mask() & !layout.bit(TypeInfoField::ArrayIndexTypeId),
        ),
    };
    Ok(projected)
}
