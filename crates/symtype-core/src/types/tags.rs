//! Symbol tags and the small enumerations the symbol store reports as raw
//! `u32` values.
//!
//! Numbering follows the DIA SDK (`SymTagEnum`, `UdtKind`, `DataKind`,
//! `BasicType`, `CV_call_e`), which is what DbgHelp hands back for
//! `TI_GET_SYMTAG` and friends.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SymtypeError, SymtypeResult};

/// Declare an enum backed by raw store values.
///
/// `open` enums keep unknown values in a fallback variant because the store may
/// report values newer than this table. `closed` enums reject unknown values.
macro_rules! raw_enum {
    (
        open $(#[$meta:meta])*
        pub enum $name:ident
        {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name
        {
            $( $(#[$vmeta])* $variant, )+
            /// A raw value with no name in this table.
            Other(u32),
        }

        impl $name
        {
            /// Decode a raw store value.
            #[must_use]
            pub const fn from_raw(raw: u32) -> Self
            {
                match raw {
                    $( $value => Self::$variant, )+
                    other => Self::Other(other),
                }
            }

            /// Raw store value.
            #[must_use]
            pub const fn raw(self) -> u32
            {
                match self {
                    $( Self::$variant => $value, )+
                    Self::Other(raw) => raw,
                }
            }

            /// Variant name used in messages.
            #[must_use]
            pub const fn name(self) -> &'static str
            {
                match self {
                    $( Self::$variant => stringify!($variant), )+
                    Self::Other(_) => "other",
                }
            }
        }

        impl fmt::Display for $name
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
            {
                match self {
                    Self::Other(raw) => write!(f, "{}({raw})", stringify!($name)),
                    _ => f.write_str(self.name()),
                }
            }
        }
    };
    (
        closed $(#[$meta:meta])*
        pub enum $name:ident
        {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name
        {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name
        {
            /// Raw store value.
            #[must_use]
            pub const fn raw(self) -> u32
            {
                match self {
                    $( Self::$variant => $value, )+
                }
            }
        }

        impl TryFrom<u32> for $name
        {
            type Error = SymtypeError;

            fn try_from(raw: u32) -> SymtypeResult<Self>
            {
                match raw {
                    $( $value => Ok(Self::$variant), )+
                    other => Err(SymtypeError::DecodeInconsistency(format!(
                        "{} value {other} is out of range",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl fmt::Display for $name
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
            {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

raw_enum! {
    open
    /// Kind of a symbol record (`SymTagEnum`).
    pub enum SymTag
    {
        Null = 0,
        Exe = 1,
        Compiland = 2,
        CompilandDetails = 3,
        CompilandEnv = 4,
        Function = 5,
        Block = 6,
        Data = 7,
        Annotation = 8,
        Label = 9,
        PublicSymbol = 10,
        /// struct / class / union / interface
        Udt = 11,
        Enum = 12,
        FunctionType = 13,
        PointerType = 14,
        ArrayType = 15,
        BaseType = 16,
        Typedef = 17,
        BaseClass = 18,
        Friend = 19,
        FunctionArgType = 20,
        FuncDebugStart = 21,
        FuncDebugEnd = 22,
        UsingNamespace = 23,
        VtableShape = 24,
        Vtable = 25,
        Custom = 26,
        Thunk = 27,
        CustomType = 28,
        ManagedType = 29,
        Dimension = 30,
    }
}

raw_enum! {
    open
    /// Primitive type classification (`BasicType`).
    pub enum BasicType
    {
        NoType = 0,
        Void = 1,
        Char = 2,
        WChar = 3,
        Int = 6,
        UInt = 7,
        Float = 8,
        Bcd = 9,
        Bool = 10,
        Long = 13,
        ULong = 14,
        Currency = 25,
        Date = 26,
        Variant = 27,
        Complex = 28,
        Bit = 29,
        Bstr = 30,
        Hresult = 31,
        Char16 = 32,
        Char32 = 33,
        Char8 = 34,
    }
}

raw_enum! {
    open
    /// Calling convention of a function type (`CV_call_e`).
    pub enum CallingConvention
    {
        NearC = 0,
        FarC = 1,
        NearPascal = 2,
        FarPascal = 3,
        NearFast = 4,
        FarFast = 5,
        NearStd = 7,
        FarStd = 8,
        NearSys = 9,
        FarSys = 10,
        ThisCall = 11,
        MipsCall = 12,
        Generic = 13,
        ArmCall = 17,
        ClrCall = 22,
        Inline = 23,
        NearVector = 24,
        Swift = 25,
    }
}

raw_enum! {
    closed
    /// Flavor of a user-defined type.
    pub enum UdtKind
    {
        Struct = 0,
        Class = 1,
        Union = 2,
        Interface = 3,
    }
}

raw_enum! {
    closed
    /// Storage class of a data symbol.
    pub enum DataKind
    {
        Unknown = 0,
        Local = 1,
        StaticLocal = 2,
        Param = 3,
        ObjectPtr = 4,
        FileStatic = 5,
        Global = 6,
        Member = 7,
        StaticMember = 8,
        Constant = 9,
    }
}

impl BasicType
{
    /// Whether values of this base type carry a sign.
    #[must_use]
    pub const fn is_signed(self) -> bool
    {
        matches!(self, Self::Int | Self::Long | Self::Char | Self::Float | Self::Currency)
    }
}

impl DataKind
{
    /// Data kinds that live at a fixed address rather than an offset.
    #[must_use]
    pub const fn has_static_address(self) -> bool
    {
        matches!(self, Self::StaticLocal | Self::FileStatic | Self::Global | Self::StaticMember)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_sym_tag_round_trip_known()
    {
        assert_eq!(SymTag::from_raw(11), SymTag::Udt);
        assert_eq!(SymTag::Udt.raw(), 11);
        assert_eq!(SymTag::from_raw(25), SymTag::Vtable);
        assert_eq!(SymTag::from_raw(24), SymTag::VtableShape);
    }

    #[test]
    fn test_sym_tag_unknown_value_preserved()
    {
        let tag = SymTag::from_raw(400);
        assert_eq!(tag, SymTag::Other(400));
        assert_eq!(tag.raw(), 400);
        assert_eq!(tag.to_string(), "SymTag(400)");
    }

    #[test]
    fn test_closed_enum_rejects_unknown()
    {
        assert_eq!(UdtKind::try_from(2).unwrap(), UdtKind::Union);
        assert!(matches!(UdtKind::try_from(9), Err(SymtypeError::DecodeInconsistency(_))));
        assert_eq!(DataKind::try_from(9).unwrap(), DataKind::Constant);
    }

    #[test]
    fn test_data_kind_static_address()
    {
        assert!(DataKind::Global.has_static_address());
        assert!(!DataKind::Member.has_static_address());
    }
}
