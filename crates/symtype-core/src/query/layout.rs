//! Static per-kind request layouts.
//!
//! Each kind has an ordered field list (bit `n` of the validity mask is field
//! `n`) and the mask of fields a record cannot be decoded without. Field 0 is
//! always the symbol tag.

use crate::request::TypeInfoField::{
    self, Address, ArrayIndexTypeId, BaseType, BitPosition, CallingConvention, ChildrenCount, ClassParentId,
    Count, DataKind, IsReference, Length, Nested, Offset, SymName, SymTag as Tag, ThisAdjust, Type, UdtKind,
    Value, VirtualBaseClass, VirtualBaseDispIndex, VirtualBasePointerOffset, VirtualTableShapeId,
};
use crate::types::SymTag;

/// Field list and required mask for one kind.
#[derive(Debug)]
pub struct KindLayout
{
    pub tag: SymTag,
    pub fields: &'static [TypeInfoField],
    pub required: u64,
}

impl KindLayout
{
    /// Layout for `tag`, if the engine decodes that kind.
    #[must_use]
    pub fn for_tag(tag: SymTag) -> Option<&'static KindLayout>
    {
        LAYOUTS.iter().find(|layout| layout.tag == tag)
    }

    /// Mask with a bit for every field in the layout.
    #[must_use]
    pub const fn full_mask(&self) -> u64
    {
        (1_u64 << self.fields.len()) - 1
    }

    /// Validity bit of `field`.
    ///
    /// Returns 0 for fields outside the layout so callers can OR it into a
    /// mask unconditionally.
    #[must_use]
    pub fn bit(&self, field: TypeInfoField) -> u64
    {
        self.fields
            .iter()
            .position(|f| *f == field)
            .map_or(0, |index| 1_u64 << index)
    }
}

pub(crate) static LAYOUTS: [KindLayout; 13] = [
    KindLayout {
        tag: SymTag::BaseType,
        fields: &[Tag, BaseType, Length],
        required: 0x7,
    },
    KindLayout {
        tag: SymTag::PointerType,
        fields: &[Tag, Type, Length, IsReference],
        required: 0x7,
    },
    KindLayout {
        tag: SymTag::ArrayType,
        fields: &[Tag, Type, ArrayIndexTypeId, Count, Length],
        required: 0x1b,
    },
    KindLayout {
        tag: SymTag::Typedef,
        fields: &[Tag, Type, SymName],
        required: 0x7,
    },
    KindLayout {
        tag: SymTag::Udt,
        fields: &[Tag, UdtKind, Length, ChildrenCount, ClassParentId, VirtualTableShapeId, SymName],
        required: 0x4f,
    },
    KindLayout {
        tag: SymTag::Data,
        fields: &[
            Tag,
            DataKind,
            Type,
            SymName,
            Offset,
            Address,
            BitPosition,
            Length,
            ClassParentId,
            Value,
        ],
        required: 0xf,
    },
    KindLayout {
        tag: SymTag::FunctionType,
        fields: &[Tag, Type, ChildrenCount, CallingConvention, ClassParentId, ThisAdjust],
        required: 0xf,
    },
    KindLayout {
        tag: SymTag::FunctionArgType,
        fields: &[Tag, Type],
        required: 0x3,
    },
    KindLayout {
        tag: SymTag::BaseClass,
        fields: &[
            Tag,
            Type,
            Offset,
            VirtualBaseClass,
            VirtualBasePointerOffset,
            VirtualBaseDispIndex,
        ],
        required: 0xb,
    },
    KindLayout {
        tag: SymTag::Function,
        fields: &[Tag, Type, SymName, Address, Length, ClassParentId],
        required: 0x7,
    },
    KindLayout {
        tag: SymTag::Vtable,
        fields: &[Tag, Type, ClassParentId, Offset],
        required: 0x3,
    },
    KindLayout {
        tag: SymTag::VtableShape,
        fields: &[Tag, Count],
        required: 0x3,
    },
    KindLayout {
        tag: SymTag::Enum,
        fields: &[Tag, Type, Length, ChildrenCount, SymName, Nested],
        required: 0x1f,
    },
];

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_required_masks_fit_field_lists()
    {
        for layout in &LAYOUTS {
            assert_eq!(layout.fields[0], TypeInfoField::SymTag, "{}", layout.tag);
            assert_eq!(layout.required & 1, 1, "{}", layout.tag);
            assert_eq!(layout.required & !layout.full_mask(), 0, "{}", layout.tag);
        }
    }

    #[test]
    fn test_udt_layout()
    {
        let layout = KindLayout::for_tag(SymTag::Udt).unwrap();
        assert_eq!(layout.required, 0x4f);
        assert_eq!(layout.bit(TypeInfoField::SymName), 1 << 6);
        assert_eq!(layout.bit(TypeInfoField::Value), 0);
    }

    #[test]
    fn test_unsupported_kind_has_no_layout()
    {
        assert!(KindLayout::for_tag(SymTag::Compiland).is_none());
        assert!(KindLayout::for_tag(SymTag::Other(900)).is_none());
    }
}
