//! # Numeric Reconciliation
//!
//! Integer width and signedness reconciliation for raw store values.
//!
//! The symbol store may report an enumerand with a narrower, differently-signed
//! machine type than the enum's declared backing type. A `uint32_t`-backed
//! enum can hand back `-1` as a signed 16-bit `VT_I2`, and the sign bit has to
//! be extended to reproduce the intended `0xFFFFFFFF`. Everything here is pure
//! and total except for the narrowing case in [`extend_to_width`].
//!
//! ## Example
//!
//! ```rust
//! use symtype_core::numeric::{canonicalize, extend_to_width, IntWidth, RawInteger};
//!
//! let raw = RawInteger::from_int(-1024_i16);
//! let wide = extend_to_width(raw, IntWidth::W4)?;
//! assert_eq!(canonicalize(wide, IntWidth::W4), 0xFFFF_FC00);
//! # Ok::<(), symtype_core::SymtypeError>(())
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SymtypeError, SymtypeResult};

/// Byte width of a machine integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IntWidth
{
    /// 8-bit
    W1,
    /// 16-bit
    W2,
    /// 32-bit
    W4,
    /// 64-bit
    W8,
}

impl IntWidth
{
    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> u32
    {
        match self {
            Self::W1 => 1,
            Self::W2 => 2,
            Self::W4 => 4,
            Self::W8 => 8,
        }
    }

    /// Width in bits.
    #[must_use]
    pub const fn bits(self) -> u32
    {
        self.bytes() * 8
    }

    /// Mask covering every bit of this width.
    #[must_use]
    pub const fn mask(self) -> u64
    {
        match self {
            Self::W8 => u64::MAX,
            _ => (1_u64 << self.bits()) - 1,
        }
    }

    /// Mask of the sign bit at this width.
    #[must_use]
    pub const fn sign_bit(self) -> u64
    {
        1_u64 << (self.bits() - 1)
    }

    /// Width for a declared byte size.
    ///
    /// ## Errors
    ///
    /// `ArgumentInvalid` for anything other than 1, 2, 4 or 8.
    pub fn from_bytes(bytes: u64) -> SymtypeResult<Self>
    {
        match bytes {
            1 => Ok(Self::W1),
            2 => Ok(Self::W2),
            4 => Ok(Self::W4),
            8 => Ok(Self::W8),
            other => Err(SymtypeError::ArgumentInvalid(format!(
                "{other} is not an integer width (expected 1, 2, 4 or 8 bytes)"
            ))),
        }
    }
}

impl fmt::Display for IntWidth
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}-byte", self.bytes())
    }
}

/// Machine integer types that can feed a [`RawInteger`].
pub trait MachineInt: Copy
{
    /// Width of the type.
    const WIDTH: IntWidth;
    /// Whether the type is signed.
    const SIGNED: bool;

    /// Two's complement bit pattern, zero-extended to 64 bits.
    fn to_bits(self) -> u64;
}

macro_rules! machine_int {
    ($($ty:ty => $unsigned:ty, $width:ident, $signed:literal;)+) => {
        $(
            impl MachineInt for $ty
            {
                const WIDTH: IntWidth = IntWidth::$width;
                const SIGNED: bool = $signed;

                #[allow(clippy::cast_sign_loss, clippy::unnecessary_cast)]
                fn to_bits(self) -> u64
                {
                    u64::from(self as $unsigned)
                }
            }
        )+
    };
}

machine_int! {
    i8 => u8, W1, true;
    u8 => u8, W1, false;
    i16 => u16, W2, true;
    u16 => u16, W2, false;
    i32 => u32, W4, true;
    u32 => u32, W4, false;
    i64 => u64, W8, true;
    u64 => u64, W8, false;
}

/// An integer bit pattern together with the width and signedness it was
/// reported at.
///
/// Bits above `width` are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RawInteger
{
    bits: u64,
    width: IntWidth,
    signed: bool,
}

/// `VARTYPE` codes understood by [`RawInteger::from_variant`].
pub mod vt
{
    pub const I2: u16 = 2;
    pub const I4: u16 = 3;
    pub const BOOL: u16 = 11;
    pub const I1: u16 = 16;
    pub const UI1: u16 = 17;
    pub const UI2: u16 = 18;
    pub const UI4: u16 = 19;
    pub const I8: u16 = 20;
    pub const UI8: u16 = 21;
    pub const INT: u16 = 22;
    pub const UINT: u16 = 23;
}

impl RawInteger
{
    /// Build from a bit pattern. Bits above `width` are discarded.
    #[must_use]
    pub const fn new(bits: u64, width: IntWidth, signed: bool) -> Self
    {
        Self {
            bits: bits & width.mask(),
            width,
            signed,
        }
    }

    /// Build from any machine integer, keeping its width and signedness.
    #[must_use]
    pub fn from_int<T: MachineInt>(value: T) -> Self
    {
        Self::new(value.to_bits(), T::WIDTH, T::SIGNED)
    }

    /// Decode the payload of a `VARIANT` value slot.
    ///
    /// Only the low `width` bytes of the payload are meaningful; the rest of
    /// the union is whatever the store left there and is ignored.
    ///
    /// ## Errors
    ///
    /// `DecodeInconsistency` for non-integer `VARTYPE`s (floats, strings, ...).
    pub fn from_variant(vartype: u16, payload: u64) -> SymtypeResult<Self>
    {
        let (width, signed) = match vartype {
            vt::I1 => (IntWidth::W1, true),
            vt::UI1 => (IntWidth::W1, false),
            vt::I2 | vt::BOOL => (IntWidth::W2, true),
            vt::UI2 => (IntWidth::W2, false),
            vt::I4 | vt::INT => (IntWidth::W4, true),
            vt::UI4 | vt::UINT => (IntWidth::W4, false),
            vt::I8 => (IntWidth::W8, true),
            vt::UI8 => (IntWidth::W8, false),
            other => {
                return Err(SymtypeError::DecodeInconsistency(format!(
                    "VARIANT type {other} does not hold an integer"
                )))
            }
        };
        Ok(Self::new(payload, width, signed))
    }

    /// The `VARTYPE` that represents this width and signedness.
    #[must_use]
    pub const fn variant_type(self) -> u16
    {
        match (self.width, self.signed) {
            (IntWidth::W1, true) => vt::I1,
            (IntWidth::W1, false) => vt::UI1,
            (IntWidth::W2, true) => vt::I2,
            (IntWidth::W2, false) => vt::UI2,
            (IntWidth::W4, true) => vt::I4,
            (IntWidth::W4, false) => vt::UI4,
            (IntWidth::W8, true) => vt::I8,
            (IntWidth::W8, false) => vt::UI8,
        }
    }

    /// Bit pattern (zero above `width`).
    #[must_use]
    pub const fn bits(self) -> u64
    {
        self.bits
    }

    /// Reported width.
    #[must_use]
    pub const fn width(self) -> IntWidth
    {
        self.width
    }

    /// Reported signedness.
    #[must_use]
    pub const fn is_signed(self) -> bool
    {
        self.signed
    }

    /// Whether the value is negative when read with its own signedness.
    #[must_use]
    pub const fn is_negative(self) -> bool
    {
        self.signed && self.bits & self.width.sign_bit() != 0
    }

    /// Numeric value as `i128`, honouring signedness.
    #[must_use]
    pub fn to_i128(self) -> i128
    {
        if self.is_negative() {
            i128::from(self.bits | !self.width.mask()) - (1_i128 << 64)
        } else {
            i128::from(self.bits)
        }
    }
}

impl fmt::Display for RawInteger
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let sign = if self.signed { "i" } else { "u" };
        write!(f, "{:#x} ({sign}{})", self.bits, self.width.bits())
    }
}

/// Bring `value` to `target` width.
///
/// Widening sign-extends signed values and zero-extends unsigned ones.
/// Narrowing is allowed only when the discarded bits carry no information:
/// all zero for unsigned and non-negative values, all ones for negative
/// signed values. The kept bit pattern is returned as is, so a signed `0x00F0`
/// narrows to `0xF0`. Equal widths return the value unchanged.
///
/// ## Errors
///
/// `DecodeInconsistency` if narrowing would lose bits.
pub fn extend_to_width(value: RawInteger, target: IntWidth) -> SymtypeResult<RawInteger>
{
    let source = value.width;
    if source == target {
        return Ok(value);
    }

    if source < target {
        let bits = if value.is_negative() {
            value.bits | (target.mask() & !source.mask())
        } else {
            value.bits
        };
        return Ok(RawInteger::new(bits, target, value.signed));
    }

    let kept = value.bits & target.mask();
    let discarded = value.bits & !target.mask();
    let expected = if value.is_negative() {
        source.mask() & !target.mask()
    } else {
        0
    };

    if discarded != expected {
        return Err(SymtypeError::DecodeInconsistency(format!(
            "narrowing {value} to {target} would discard significant bits {discarded:#x}"
        )));
    }
    Ok(RawInteger::new(kept, target, value.signed))
}

/// Canonical unsigned form of a value at its declared width.
///
/// The bit pattern is reinterpreted as unsigned with no further sign handling,
/// so run values through [`extend_to_width`] first.
#[must_use]
pub const fn canonicalize(value: RawInteger, declared: IntWidth) -> u64
{
    value.bits & declared.mask()
}

/// Reinterpret the same bit pattern as signed or unsigned.
#[must_use]
pub const fn reconcile_signedness(value: RawInteger, want_signed: bool) -> RawInteger
{
    RawInteger {
        bits: value.bits,
        width: value.width,
        signed: want_signed,
    }
}

#[cfg(test)]
mod tests
{
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_sign_extend_two_to_four_bytes()
    {
        let raw = RawInteger::new(0xFC00, IntWidth::W2, true);
        let wide = extend_to_width(raw, IntWidth::W4).unwrap();
        assert_eq!(wide.bits(), 0xFFFF_FC00);
        assert_eq!(wide.width(), IntWidth::W4);
    }

    #[test]
    fn test_zero_extend_unsigned()
    {
        let raw = RawInteger::new(0xFC00, IntWidth::W2, false);
        let wide = extend_to_width(raw, IntWidth::W4).unwrap();
        assert_eq!(wide.bits(), 0x0000_FC00);
    }

    #[test]
    fn test_narrowing_without_information_loss()
    {
        let raw = RawInteger::new(0x00F0, IntWidth::W2, false);
        let narrow = extend_to_width(raw, IntWidth::W1).unwrap();
        assert_eq!(narrow.bits(), 0xF0);
        assert_eq!(narrow.width(), IntWidth::W1);
    }

    #[test]
    fn test_narrowing_with_information_loss()
    {
        let raw = RawInteger::new(0x01F0, IntWidth::W2, false);
        let err = extend_to_width(raw, IntWidth::W1).unwrap_err();
        assert!(matches!(err, SymtypeError::DecodeInconsistency(_)));
    }

    #[test]
    fn test_signed_narrowing_checks_source_sign()
    {
        // -16 as i16: discarded byte is all ones
        let raw = RawInteger::from_int(-16_i16);
        assert_eq!(extend_to_width(raw, IntWidth::W1).unwrap().bits(), 0xF0);

        // +240 as i16: discarded byte is zero, bit pattern kept
        let raw = RawInteger::new(0x00F0, IntWidth::W2, true);
        assert_eq!(extend_to_width(raw, IntWidth::W1).unwrap().bits(), 0xF0);

        // a 1-byte enum value of 200 reported as a signed 2-byte constant
        let narrow = extend_to_width(RawInteger::from_int(200_i16), IntWidth::W1).unwrap();
        assert_eq!(canonicalize(narrow, IntWidth::W1), 200);

        // significant bits in the discarded byte
        let raw = RawInteger::new(0x01F0, IntWidth::W2, true);
        assert!(matches!(
            extend_to_width(raw, IntWidth::W1),
            Err(SymtypeError::DecodeInconsistency(_))
        ));
        let raw = RawInteger::new(0xFE10, IntWidth::W2, true);
        assert!(extend_to_width(raw, IntWidth::W1).is_err());
    }

    #[test]
    fn test_equal_width_is_identity()
    {
        let raw = RawInteger::from_int(-1_i32);
        assert_eq!(extend_to_width(raw, IntWidth::W4).unwrap(), raw);
    }

    #[test]
    fn test_canonicalize_masks_to_declared_width()
    {
        let raw = RawInteger::from_int(-1_i32);
        assert_eq!(canonicalize(raw, IntWidth::W4), 0xFFFF_FFFF);
        assert_eq!(canonicalize(raw, IntWidth::W2), 0xFFFF);
    }

    #[test]
    fn test_reconcile_signedness_keeps_bits()
    {
        let raw = RawInteger::from_int(0xFFFF_u16);
        let signed = reconcile_signedness(raw, true);
        assert_eq!(signed.bits(), 0xFFFF);
        assert!(signed.is_negative());
        assert_eq!(signed.to_i128(), -1);
        assert_eq!(reconcile_signedness(signed, false).to_i128(), 0xFFFF);
    }

    #[test]
    fn test_variant_decode()
    {
        let raw = RawInteger::from_variant(vt::I2, 0xDEAD_BEEF_0000_FFFF).unwrap();
        assert_eq!(raw.bits(), 0xFFFF);
        assert!(raw.is_signed());
        assert_eq!(raw.width(), IntWidth::W2);

        let raw = RawInteger::from_variant(vt::UINT, 7).unwrap();
        assert_eq!(raw.width(), IntWidth::W4);
        assert!(!raw.is_signed());
    }

    #[test]
    fn test_variant_rejects_non_integer()
    {
        // VT_R8
        assert!(matches!(
            RawInteger::from_variant(5, 0),
            Err(SymtypeError::DecodeInconsistency(_))
        ));
    }

    #[test]
    fn test_width_from_bytes()
    {
        assert_eq!(IntWidth::from_bytes(4).unwrap(), IntWidth::W4);
        assert!(matches!(IntWidth::from_bytes(3), Err(SymtypeError::ArgumentInvalid(_))));
    }

    /// Widening then narrowing back is lossless, and widening preserves the
    /// numeric value, for one source type.
    fn check_round_trip<T: MachineInt>(value: T, target: IntWidth) -> Result<(), TestCaseError>
    {
        let raw = RawInteger::from_int(value);
        let wide = extend_to_width(raw, target).unwrap();
        prop_assert_eq!(wide.to_i128(), raw.to_i128());
        let back = extend_to_width(wide, T::WIDTH).unwrap();
        prop_assert_eq!(back, raw);
        Ok(())
    }

    fn widths_at_least(min: IntWidth) -> impl Strategy<Value = IntWidth>
    {
        prop::sample::select(vec![IntWidth::W1, IntWidth::W2, IntWidth::W4, IntWidth::W8])
            .prop_filter("target must not be narrower than source", move |w| *w >= min)
    }

    proptest! {
        #[test]
        fn prop_round_trip_i8(v in any::<i8>(), target in widths_at_least(IntWidth::W1)) { check_round_trip(v, target)?; }

        #[test]
        fn prop_round_trip_u8(v in any::<u8>(), target in widths_at_least(IntWidth::W1)) { check_round_trip(v, target)?; }

        #[test]
        fn prop_round_trip_i16(v in any::<i16>(), target in widths_at_least(IntWidth::W2)) { check_round_trip(v, target)?; }

        #[test]
        fn prop_round_trip_u16(v in any::<u16>(), target in widths_at_least(IntWidth::W2)) { check_round_trip(v, target)?; }

        #[test]
        fn prop_round_trip_i32(v in any::<i32>(), target in widths_at_least(IntWidth::W4)) { check_round_trip(v, target)?; }

        #[test]
        fn prop_round_trip_u32(v in any::<u32>(), target in widths_at_least(IntWidth::W4)) { check_round_trip(v, target)?; }

        #[test]
        fn prop_round_trip_i64(v in any::<i64>(), target in widths_at_least(IntWidth::W8)) { check_round_trip(v, target)?; }

        #[test]
        fn prop_round_trip_u64(v in any::<u64>(), target in widths_at_least(IntWidth::W8)) { check_round_trip(v, target)?; }

        /// Narrowing succeeds exactly when the discarded half is a sign or
        /// zero extension of the source, and keeps the low bit pattern.
        #[test]
        fn prop_narrowing_matches_range(v in any::<i64>(), signed in any::<bool>())
        {
            let unsigned = v as u64;
            let raw = if signed { RawInteger::from_int(v) } else { RawInteger::from_int(unsigned) };
            let high = unsigned >> 32;
            let fits = high == 0 || (signed && high == 0xFFFF_FFFF);
            let narrowed = extend_to_width(raw, IntWidth::W4);
            prop_assert_eq!(narrowed.is_ok(), fits);
            if let Ok(narrow) = narrowed {
                prop_assert_eq!(canonicalize(narrow, IntWidth::W4), unsigned & 0xFFFF_FFFF);
            }
        }
    }
}
