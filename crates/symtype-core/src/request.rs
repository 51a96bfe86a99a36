//! # Structured Type-Info Requests
//!
//! Binary layout shared by the query engine and symbol-store providers.
//!
//! A batched request is shaped like DbgHelp's `IMAGEHLP_GET_TYPE_INFO_PARAMS`:
//! an ordered list of fields, each with a byte size and an offset inside a
//! fixed-stride entry, plus one validity mask per entry. Bit `n` of an entry's
//! mask says the provider wrote field `n`. Bit 0 is always the symbol tag.
//!
//! Slot encodings (little-endian):
//!
//! | Field class | Size | Encoding |
//! |---|---|---|
//! | ids, kinds, counts, flags | 4 | `u32` (`BOOL` for flags, two's complement for signed) |
//! | `Length`, `Address` | 8 | `u64` |
//! | `SymName` | 8 | 1-based handle into the request's string table, 0 = null |
//! | `Value` | 16 | `VARIANT`: `vt: u16` at 0, payload at 8 |
//!
//! `FindChildren` never appears in a batched entry. It has its own
//! variable-size slot, see [`FieldSlot::children`].

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{SymtypeError, SymtypeResult};
use crate::numeric::{MachineInt, RawInteger};
use crate::provider::{BatchOutcome, NativeError};
use crate::types::{SymTag, TypeId};

/// Longest field list a single request may carry (one validity bit each).
pub const MAX_FIELDS: usize = 64;

/// Size of the `FindChildren` header: requested count, then actual count.
pub const CHILDREN_HEADER_SIZE: usize = 8;

/// Largest children count a slot or children request is sized for. Store
/// counts above this are treated as corrupt.
pub const MAX_CHILDREN: u32 = 1 << 20;

fn check_children_count(count: u64) -> SymtypeResult<()>
{
    if count > u64::from(MAX_CHILDREN) {
        return Err(SymtypeError::DecodeInconsistency(format!(
            "children count {count} exceeds the limit of {MAX_CHILDREN}"
        )));
    }
    Ok(())
}

/// A property that can be requested from the symbol store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeInfoField
{
    SymTag,
    SymName,
    Length,
    /// The "type of" this symbol (pointee, element, return, member type).
    Type,
    BaseType,
    ArrayIndexTypeId,
    FindChildren,
    DataKind,
    Offset,
    Value,
    Count,
    ChildrenCount,
    BitPosition,
    VirtualBaseClass,
    VirtualTableShapeId,
    VirtualBasePointerOffset,
    ClassParentId,
    Nested,
    Address,
    ThisAdjust,
    UdtKind,
    CallingConvention,
    IsReference,
    VirtualBaseDispIndex,
}

impl TypeInfoField
{
    /// Bytes the field occupies in an entry.
    #[must_use]
    pub const fn slot_size(self) -> usize
    {
        match self {
            Self::Length | Self::Address | Self::SymName => 8,
            Self::Value => 16,
            Self::FindChildren => CHILDREN_HEADER_SIZE,
            _ => 4,
        }
    }

    const fn alignment(self) -> usize
    {
        match self.slot_size() {
            4 => 4,
            _ => 8,
        }
    }
}

impl fmt::Display for TypeInfoField
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Debug::fmt(self, f)
    }
}

/// A value a provider writes into a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue
{
    U32(u32),
    I32(i32),
    U64(u64),
    Bool(bool),
    Name(String),
    /// Raw `VARIANT` contents.
    Variant
    {
        vt: u16,
        bits: u64,
    },
}

impl FieldValue
{
    /// `VARIANT` holding a machine integer with its natural `VARTYPE`.
    #[must_use]
    pub fn constant<T: MachineInt>(value: T) -> Self
    {
        let raw = RawInteger::from_int(value);
        Self::Variant {
            vt: raw.variant_type(),
            bits: raw.bits(),
        }
    }

    /// Type id value.
    #[must_use]
    pub const fn id(id: TypeId) -> Self
    {
        Self::U32(id.raw())
    }

    /// Symbol tag value.
    #[must_use]
    pub const fn tag(tag: SymTag) -> Self
    {
        Self::U32(tag.raw())
    }
}

/// Encode `value` into `out` according to `field`'s slot encoding.
fn encode(field: TypeInfoField, value: &FieldValue, out: &mut [u8], strings: &mut Vec<String>) -> Result<(), NativeError>
{
    match (field.slot_size(), value) {
        (4, FieldValue::U32(v)) => out[..4].copy_from_slice(&v.to_le_bytes()),
        (4, FieldValue::I32(v)) => out[..4].copy_from_slice(&v.to_le_bytes()),
        (4, FieldValue::Bool(v)) => out[..4].copy_from_slice(&u32::from(*v).to_le_bytes()),
        (8, FieldValue::U64(v)) if field != TypeInfoField::SymName => out[..8].copy_from_slice(&v.to_le_bytes()),
        (8, FieldValue::U32(v)) if field != TypeInfoField::SymName => {
            out[..8].copy_from_slice(&u64::from(*v).to_le_bytes());
        }
        (8, FieldValue::Name(name)) if field == TypeInfoField::SymName => {
            strings.push(name.clone());
            let handle = strings.len() as u64;
            out[..8].copy_from_slice(&handle.to_le_bytes());
        }
        (16, FieldValue::Variant { vt, bits }) => {
            out[..16].fill(0);
            out[..2].copy_from_slice(&vt.to_le_bytes());
            out[8..16].copy_from_slice(&bits.to_le_bytes());
        }
        _ => return Err(NativeError::INVALID_PARAMETER),
    }
    Ok(())
}

fn read_u32(bytes: &[u8]) -> u32
{
    let mut raw = [0_u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

fn read_u64(bytes: &[u8]) -> u64
{
    let mut raw = [0_u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(raw)
}

fn lookup_name(strings: &[String], handle: u64) -> SymtypeResult<Option<&str>>
{
    if handle == 0 {
        return Ok(None);
    }
    usize::try_from(handle - 1)
        .ok()
        .and_then(|index| strings.get(index))
        .map(|name| Some(name.as_str()))
        .ok_or_else(|| SymtypeError::DecodeInconsistency(format!("string handle {handle} is out of range")))
}

fn decode_variant(bytes: &[u8]) -> SymtypeResult<RawInteger>
{
    let vartype = u16::from_le_bytes([bytes[0], bytes[1]]);
    RawInteger::from_variant(vartype, read_u64(&bytes[8..16]))
}

/// What a batched request enumerates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget
{
    /// One entry per listed id, in order. Unknown ids produce an entry with
    /// an empty validity mask.
    Ids(Vec<TypeId>),
    /// One entry per child of `parent` (optionally only children with a given
    /// tag), in store order.
    ChildrenOf
    {
        parent: TypeId,
        tag_filter: Option<SymTag>,
    },
}

/// A batched, multi-field, multi-entry request and its output buffer.
///
/// The buffer is sized exactly for `capacity` entries when the request is
/// built and released when the request is dropped.
#[derive(Debug)]
pub struct TypeInfoRequest
{
    target: RequestTarget,
    fields: SmallVec<[TypeInfoField; 12]>,
    offsets: SmallVec<[usize; 12]>,
    stride: usize,
    capacity: usize,
    buffer: Vec<u8>,
    entry_ids: Vec<TypeId>,
    entry_valid: Vec<u64>,
    strings: Vec<String>,
    entries_matched: usize,
}

impl TypeInfoRequest
{
    /// Request `fields` for each of `ids`.
    ///
    /// ## Errors
    ///
    /// `ArgumentInvalid` if `fields` or `ids` is empty, `fields` is longer than
    /// [`MAX_FIELDS`] or contains `FindChildren`.
    pub fn for_ids(fields: &[TypeInfoField], ids: &[TypeId]) -> SymtypeResult<Self>
    {
        if ids.is_empty() {
            return Err(SymtypeError::ArgumentInvalid("request names no type ids".to_string()));
        }
        Self::build(RequestTarget::Ids(ids.to_vec()), fields, ids.len())
    }

    /// Request `fields` for each child of `parent`, with room for `count`
    /// entries.
    ///
    /// ## Errors
    ///
    /// As [`TypeInfoRequest::for_ids`], plus `ArgumentInvalid` for a zero count
    /// and `DecodeInconsistency` for a count above [`MAX_CHILDREN`].
    pub fn for_children(
        fields: &[TypeInfoField],
        parent: TypeId,
        tag_filter: Option<SymTag>,
        count: usize,
    ) -> SymtypeResult<Self>
    {
        if count == 0 {
            return Err(SymtypeError::ArgumentInvalid("children request sized for zero entries".to_string()));
        }
        check_children_count(count as u64)?;
        Self::build(RequestTarget::ChildrenOf { parent, tag_filter }, fields, count)
    }

    fn build(target: RequestTarget, fields: &[TypeInfoField], capacity: usize) -> SymtypeResult<Self>
    {
        if fields.is_empty() {
            return Err(SymtypeError::ArgumentInvalid("request has an empty field mask".to_string()));
        }
        if fields.len() > MAX_FIELDS {
            return Err(SymtypeError::ArgumentInvalid(format!(
                "request has {} fields, at most {MAX_FIELDS} fit a validity mask",
                fields.len()
            )));
        }
        if fields.contains(&TypeInfoField::FindChildren) {
            return Err(SymtypeError::ArgumentInvalid(
                "FindChildren cannot be part of a batched entry".to_string(),
            ));
        }

        let mut offsets = SmallVec::new();
        let mut cursor = 0_usize;
        for field in fields {
            cursor = cursor.next_multiple_of(field.alignment());
            offsets.push(cursor);
            cursor += field.slot_size();
        }
        let stride = cursor.next_multiple_of(8);

        let size = stride.checked_mul(capacity).ok_or_else(|| {
            SymtypeError::ArgumentInvalid(format!("{capacity} entries of {stride} bytes overflow the buffer size"))
        })?;

        Ok(Self {
            target,
            fields: SmallVec::from_slice(fields),
            offsets,
            stride,
            capacity,
            buffer: vec![0; size],
            entry_ids: Vec::with_capacity(capacity),
            entry_valid: Vec::with_capacity(capacity),
            strings: Vec::new(),
            entries_matched: 0,
        })
    }

    /// What the request enumerates.
    #[must_use]
    pub fn target(&self) -> &RequestTarget
    {
        &self.target
    }

    /// Requested fields, in validity-bit order.
    #[must_use]
    pub fn fields(&self) -> &[TypeInfoField]
    {
        &self.fields
    }

    /// Byte offset of each field inside an entry.
    #[must_use]
    pub fn offsets(&self) -> &[usize]
    {
        &self.offsets
    }

    /// Bytes per entry.
    #[must_use]
    pub fn stride(&self) -> usize
    {
        self.stride
    }

    /// Entries the buffer has room for.
    #[must_use]
    pub fn capacity(&self) -> usize
    {
        self.capacity
    }

    /// Size of the output buffer in bytes.
    #[must_use]
    pub fn buffer_len(&self) -> usize
    {
        self.buffer.len()
    }

    /// Validity bit for `field`, if it was requested.
    #[must_use]
    pub fn bit_of(&self, field: TypeInfoField) -> Option<u64>
    {
        self.fields.iter().position(|f| *f == field).map(|index| 1_u64 << index)
    }

    /// Mask with a bit for every requested field.
    #[must_use]
    pub fn full_mask(&self) -> u64
    {
        match self.fields.len() {
            MAX_FIELDS => u64::MAX,
            len => (1_u64 << len) - 1,
        }
    }

    /// Start the next entry for symbol `id`.
    ///
    /// Every call counts as a match; `None` means the buffer is full and the
    /// entry was not stored.
    pub fn push_entry(&mut self, id: TypeId) -> Option<EntryWriter<'_>>
    {
        self.entries_matched += 1;
        let index = self.entry_ids.len();
        if index >= self.capacity {
            return None;
        }
        self.entry_ids.push(id);
        self.entry_valid.push(0);

        let start = index * self.stride;
        Some(EntryWriter {
            fields: &self.fields,
            offsets: &self.offsets,
            slot: &mut self.buffer[start..start + self.stride],
            strings: &mut self.strings,
            valid: &mut self.entry_valid[index],
        })
    }

    /// Summary of what the provider filled in.
    #[must_use]
    pub fn outcome(&self) -> BatchOutcome
    {
        let valid = if self.entry_valid.is_empty() {
            0
        } else {
            self.entry_valid.iter().fold(u64::MAX, |acc, mask| acc & mask)
        };
        BatchOutcome {
            entries_matched: self.entries_matched,
            entries_filled: self.entry_ids.len(),
            valid,
        }
    }

    /// Entries the provider stored.
    #[must_use]
    pub fn entries_filled(&self) -> usize
    {
        self.entry_ids.len()
    }

    /// Reader for entry `index`.
    #[must_use]
    pub fn entry(&self, index: usize) -> Option<EntryReader<'_>>
    {
        (index < self.entry_ids.len()).then_some(EntryReader { request: self, index })
    }

    /// Readers for every stored entry, in store order.
    pub fn entries(&self) -> impl Iterator<Item = EntryReader<'_>>
    {
        (0..self.entry_ids.len()).map(move |index| EntryReader { request: self, index })
    }
}

/// Provider-side handle for writing one entry.
pub struct EntryWriter<'a>
{
    fields: &'a [TypeInfoField],
    offsets: &'a [usize],
    slot: &'a mut [u8],
    strings: &'a mut Vec<String>,
    valid: &'a mut u64,
}

impl EntryWriter<'_>
{
    /// Write `value` for `field` and mark it valid.
    ///
    /// Fields that were not requested are ignored, so a provider can offer
    /// everything it knows.
    ///
    /// ## Errors
    ///
    /// `ERROR_INVALID_PARAMETER` when the value does not fit the field's slot.
    pub fn put(&mut self, field: TypeInfoField, value: &FieldValue) -> Result<(), NativeError>
    {
        let Some(index) = self.fields.iter().position(|f| *f == field) else {
            return Ok(());
        };
        let offset = self.offsets[index];
        encode(field, value, &mut self.slot[offset..offset + field.slot_size()], self.strings)?;
        *self.valid |= 1_u64 << index;
        Ok(())
    }
}

/// Engine-side view of one stored entry.
///
/// Every accessor returns `None` for a field outside the entry's validity
/// mask, whatever bytes happen to be in the buffer.
#[derive(Clone, Copy)]
pub struct EntryReader<'a>
{
    request: &'a TypeInfoRequest,
    index: usize,
}

impl<'a> EntryReader<'a>
{
    /// Symbol the entry describes.
    #[must_use]
    pub fn id(&self) -> TypeId
    {
        self.request.entry_ids[self.index]
    }

    /// Validity mask of the entry.
    #[must_use]
    pub fn valid(&self) -> u64
    {
        self.request.entry_valid[self.index]
    }

    fn slot(&self, field: TypeInfoField) -> Option<&'a [u8]>
    {
        let request = self.request;
        let index = request.fields.iter().position(|f| *f == field)?;
        if request.entry_valid[self.index] & (1_u64 << index) == 0 {
            return None;
        }
        let start = self.index * request.stride + request.offsets[index];
        Some(&request.buffer[start..start + field.slot_size()])
    }

    /// 4-byte unsigned field.
    #[must_use]
    pub fn u32(&self, field: TypeInfoField) -> Option<u32>
    {
        self.slot(field).filter(|bytes| bytes.len() == 4).map(read_u32)
    }

    /// 4-byte signed field.
    #[must_use]
    pub fn i32(&self, field: TypeInfoField) -> Option<i32>
    {
        self.slot(field)
            .filter(|bytes| bytes.len() == 4)
            .map(|bytes| i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// 8-byte field.
    #[must_use]
    pub fn u64(&self, field: TypeInfoField) -> Option<u64>
    {
        self.slot(field)
            .filter(|_| field != TypeInfoField::SymName)
            .filter(|bytes| bytes.len() == 8)
            .map(read_u64)
    }

    /// `BOOL` field.
    #[must_use]
    pub fn flag(&self, field: TypeInfoField) -> Option<bool>
    {
        self.u32(field).map(|value| value != 0)
    }

    /// Type id field.
    #[must_use]
    pub fn type_id(&self, field: TypeInfoField) -> Option<TypeId>
    {
        self.u32(field).map(TypeId::new)
    }

    /// Symbol tag (bit 0).
    #[must_use]
    pub fn tag(&self) -> Option<SymTag>
    {
        self.u32(TypeInfoField::SymTag).map(SymTag::from_raw)
    }

    /// Name field.
    ///
    /// ## Errors
    ///
    /// `DecodeInconsistency` if the handle does not point into the string table.
    pub fn name(&self) -> SymtypeResult<Option<&'a str>>
    {
        match self.slot(TypeInfoField::SymName) {
            Some(bytes) => lookup_name(&self.request.strings, read_u64(bytes)),
            None => Ok(None),
        }
    }

    /// `VARIANT` value field.
    ///
    /// ## Errors
    ///
    /// `DecodeInconsistency` for non-integer variants.
    pub fn value(&self) -> SymtypeResult<Option<RawInteger>>
    {
        self.slot(TypeInfoField::Value).map(decode_variant).transpose()
    }
}

/// Output slot for a single-field `get_field` call.
///
/// For `FindChildren` the slot is `8 + 4 * count` bytes: word 0 is the
/// requested count (input), word 1 the actual count (output), then the ids.
#[derive(Debug)]
pub struct FieldSlot
{
    field: TypeInfoField,
    bytes: Vec<u8>,
    strings: Vec<String>,
    filled: bool,
}

impl FieldSlot
{
    /// Slot for one scalar field.
    ///
    /// ## Errors
    ///
    /// `ArgumentInvalid` for `FindChildren`; use [`FieldSlot::children`].
    pub fn new(field: TypeInfoField) -> SymtypeResult<Self>
    {
        if field == TypeInfoField::FindChildren {
            return Err(SymtypeError::ArgumentInvalid(
                "FindChildren needs a sized slot".to_string(),
            ));
        }
        Ok(Self {
            field,
            bytes: vec![0; field.slot_size()],
            strings: Vec::new(),
            filled: false,
        })
    }

    /// `FindChildren` slot sized for exactly `count` ids.
    ///
    /// ## Errors
    ///
    /// `DecodeInconsistency` if `count` exceeds [`MAX_CHILDREN`].
    pub fn children(count: u32) -> SymtypeResult<Self>
    {
        check_children_count(u64::from(count))?;
        let mut bytes = vec![0; CHILDREN_HEADER_SIZE + 4 * count as usize];
        bytes[..4].copy_from_slice(&count.to_le_bytes());
        Ok(Self {
            field: TypeInfoField::FindChildren,
            bytes,
            strings: Vec::new(),
            filled: false,
        })
    }

    /// Field the slot was built for.
    #[must_use]
    pub fn field(&self) -> TypeInfoField
    {
        self.field
    }

    /// Size of the slot in bytes.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.bytes.len()
    }

    /// Whether the slot has no room at all.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.bytes.is_empty()
    }

    /// Whether a provider wrote the slot.
    #[must_use]
    pub fn is_filled(&self) -> bool
    {
        self.filled
    }

    /// Provider side: write a scalar value.
    ///
    /// ## Errors
    ///
    /// `ERROR_INVALID_PARAMETER` when the value does not fit the slot.
    pub fn write(&mut self, value: &FieldValue) -> Result<(), NativeError>
    {
        if self.field == TypeInfoField::FindChildren {
            return Err(NativeError::INVALID_PARAMETER);
        }
        encode(self.field, value, &mut self.bytes, &mut self.strings)?;
        self.filled = true;
        Ok(())
    }

    /// Provider side: how many children the caller made room for.
    #[must_use]
    pub fn requested_children(&self) -> u32
    {
        if self.field == TypeInfoField::FindChildren {
            read_u32(&self.bytes[..4])
        } else {
            0
        }
    }

    /// Provider side: store up to the requested number of child ids and
    /// record how many were written.
    ///
    /// ## Errors
    ///
    /// `ERROR_INVALID_PARAMETER` when the slot is not a `FindChildren` slot.
    pub fn write_children(&mut self, ids: &[TypeId]) -> Result<u32, NativeError>
    {
        if self.field != TypeInfoField::FindChildren {
            return Err(NativeError::INVALID_PARAMETER);
        }
        let room = (self.bytes.len() - CHILDREN_HEADER_SIZE) / 4;
        let written = ids.len().min(room);
        for (index, id) in ids.iter().take(written).enumerate() {
            let start = CHILDREN_HEADER_SIZE + index * 4;
            self.bytes[start..start + 4].copy_from_slice(&id.raw().to_le_bytes());
        }
        let written = u32::try_from(written).map_err(|_| NativeError::INSUFFICIENT_BUFFER)?;
        self.bytes[4..8].copy_from_slice(&written.to_le_bytes());
        self.filled = true;
        Ok(written)
    }

    /// 4-byte value, if written.
    #[must_use]
    pub fn read_u32(&self) -> Option<u32>
    {
        (self.filled && self.bytes.len() == 4).then(|| read_u32(&self.bytes))
    }

    /// 8-byte value, if written.
    #[must_use]
    pub fn read_u64(&self) -> Option<u64>
    {
        (self.filled && self.bytes.len() == 8 && self.field != TypeInfoField::SymName).then(|| read_u64(&self.bytes))
    }

    /// Name, if written.
    ///
    /// ## Errors
    ///
    /// `DecodeInconsistency` for a dangling string handle.
    pub fn read_name(&self) -> SymtypeResult<Option<&str>>
    {
        if !self.filled || self.field != TypeInfoField::SymName {
            return Ok(None);
        }
        lookup_name(&self.strings, read_u64(&self.bytes))
    }

    /// `VARIANT` value, if written.
    ///
    /// ## Errors
    ///
    /// `DecodeInconsistency` for non-integer variants.
    pub fn read_value(&self) -> SymtypeResult<Option<RawInteger>>
    {
        if !self.filled || self.field != TypeInfoField::Value {
            return Ok(None);
        }
        decode_variant(&self.bytes).map(Some)
    }

    /// Child ids written by the provider, in store order.
    ///
    /// ## Errors
    ///
    /// `DecodeInconsistency` if the provider claims more children than the
    /// slot has room for.
    pub fn read_children(&self) -> SymtypeResult<Vec<TypeId>>
    {
        if self.field != TypeInfoField::FindChildren {
            return Err(SymtypeError::ArgumentInvalid("not a FindChildren slot".to_string()));
        }
        let requested = read_u32(&self.bytes[..4]);
        let actual = read_u32(&self.bytes[4..8]);
        if actual > requested {
            return Err(SymtypeError::DecodeInconsistency(format!(
                "store reported {actual} children in a slot sized for {requested}"
            )));
        }
        Ok(self.bytes[CHILDREN_HEADER_SIZE..]
            .chunks_exact(4)
            .take(actual as usize)
            .map(|chunk| TypeId::new(read_u32(chunk)))
            .collect())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    const UDT_FIELDS: [TypeInfoField; 4] = [
        TypeInfoField::SymTag,
        TypeInfoField::Length,
        TypeInfoField::ChildrenCount,
        TypeInfoField::SymName,
    ];

    #[test]
    fn test_layout_aligns_eight_byte_slots()
    {
        let request = TypeInfoRequest::for_ids(&UDT_FIELDS, &[TypeId::new(1)]).unwrap();
        // tag at 0, length aligned up to 8, count at 16, name aligned up to 24
        assert_eq!(request.offsets(), &[0, 8, 16, 24]);
        assert_eq!(request.stride(), 32);
        assert_eq!(request.buffer_len(), 32);
    }

    #[test]
    fn test_buffer_sized_for_capacity()
    {
        let request = TypeInfoRequest::for_children(
            &[TypeInfoField::SymTag, TypeInfoField::Type],
            TypeId::new(7),
            Some(SymTag::FunctionArgType),
            3,
        )
        .unwrap();
        assert_eq!(request.stride(), 8);
        assert_eq!(request.buffer_len(), 24);
    }

    #[test]
    fn test_empty_field_mask_rejected()
    {
        let err = TypeInfoRequest::for_ids(&[], &[TypeId::new(1)]).unwrap_err();
        assert!(matches!(err, SymtypeError::ArgumentInvalid(_)));
        let err = TypeInfoRequest::for_ids(&[TypeInfoField::FindChildren], &[TypeId::new(1)]).unwrap_err();
        assert!(matches!(err, SymtypeError::ArgumentInvalid(_)));
    }

    #[test]
    fn test_entry_writer_sets_validity_bits()
    {
        let mut request = TypeInfoRequest::for_ids(&UDT_FIELDS, &[TypeId::new(5)]).unwrap();
        {
            let mut entry = request.push_entry(TypeId::new(5)).unwrap();
            entry.put(TypeInfoField::SymTag, &FieldValue::tag(SymTag::Udt)).unwrap();
            entry.put(TypeInfoField::SymName, &FieldValue::Name("Widget".into())).unwrap();
            // not requested: ignored
            entry.put(TypeInfoField::UdtKind, &FieldValue::U32(1)).unwrap();
        }
        let reader = request.entry(0).unwrap();
        assert_eq!(reader.valid(), 0b1001);
        assert_eq!(reader.tag(), Some(SymTag::Udt));
        assert_eq!(reader.name().unwrap(), Some("Widget"));
        assert_eq!(reader.u64(TypeInfoField::Length), None);
        assert_eq!(request.outcome().entries_filled, 1);
    }

    #[test]
    fn test_invalid_bits_are_never_read()
    {
        let mut request = TypeInfoRequest::for_ids(&UDT_FIELDS, &[TypeId::new(5)]).unwrap();
        {
            let mut entry = request.push_entry(TypeId::new(5)).unwrap();
            entry.put(TypeInfoField::SymTag, &FieldValue::tag(SymTag::Udt)).unwrap();
        }
        // zero bytes in the buffer still read as absent
        assert_eq!(request.entry(0).unwrap().u32(TypeInfoField::ChildrenCount), None);
    }

    #[test]
    fn test_wrong_value_shape_rejected()
    {
        let mut request = TypeInfoRequest::for_ids(&UDT_FIELDS, &[TypeId::new(5)]).unwrap();
        let mut entry = request.push_entry(TypeId::new(5)).unwrap();
        assert_eq!(
            entry.put(TypeInfoField::SymTag, &FieldValue::U64(1)),
            Err(NativeError::INVALID_PARAMETER)
        );
        assert_eq!(
            entry.put(TypeInfoField::SymName, &FieldValue::U64(1)),
            Err(NativeError::INVALID_PARAMETER)
        );
    }

    #[test]
    fn test_push_entry_stops_at_capacity()
    {
        let mut request =
            TypeInfoRequest::for_children(&[TypeInfoField::SymTag], TypeId::new(1), None, 1).unwrap();
        assert!(request.push_entry(TypeId::new(2)).is_some());
        assert!(request.push_entry(TypeId::new(3)).is_none());
        let outcome = request.outcome();
        assert_eq!(outcome.entries_matched, 2);
        assert_eq!(outcome.entries_filled, 1);
    }

    #[test]
    fn test_variant_slot_layout()
    {
        let mut request =
            TypeInfoRequest::for_ids(&[TypeInfoField::SymTag, TypeInfoField::Value], &[TypeId::new(9)]).unwrap();
        assert_eq!(request.offsets(), &[0, 8]);
        assert_eq!(request.stride(), 24);
        {
            let mut entry = request.push_entry(TypeId::new(9)).unwrap();
            entry.put(TypeInfoField::Value, &FieldValue::constant(-1_i16)).unwrap();
        }
        let value = request.entry(0).unwrap().value().unwrap().unwrap();
        assert_eq!(value.bits(), 0xFFFF);
        assert!(value.is_signed());
    }

    #[test]
    fn test_children_slot_header()
    {
        let mut slot = FieldSlot::children(2).unwrap();
        assert_eq!(slot.len(), 16);
        assert_eq!(slot.requested_children(), 2);
        let written = slot
            .write_children(&[TypeId::new(10), TypeId::new(11), TypeId::new(12)])
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(slot.read_children().unwrap(), vec![TypeId::new(10), TypeId::new(11)]);
    }

    #[test]
    fn test_children_slot_rejects_huge_count()
    {
        assert!(FieldSlot::children(MAX_CHILDREN).is_ok());
        let err = FieldSlot::children(u32::MAX).unwrap_err();
        assert!(matches!(err, SymtypeError::DecodeInconsistency(_)));

        let err = TypeInfoRequest::for_children(
            &[TypeInfoField::SymTag],
            TypeId::new(1),
            None,
            MAX_CHILDREN as usize + 1,
        )
        .unwrap_err();
        assert!(matches!(err, SymtypeError::DecodeInconsistency(_)));
    }

    #[test]
    fn test_scalar_slot_round_trip()
    {
        let mut slot = FieldSlot::new(TypeInfoField::ChildrenCount).unwrap();
        assert_eq!(slot.read_u32(), None);
        slot.write(&FieldValue::U32(3)).unwrap();
        assert_eq!(slot.read_u32(), Some(3));
        assert!(FieldSlot::new(TypeInfoField::FindChildren).is_err());
    }
}
