//! # Types
//!
//! Keys, tags and decoded records shared by the registry, the query engine and
//! symbol-store providers.

pub mod keys;
pub mod records;
pub mod tags;

pub use keys::{
    ModuleBase, ModuleKey, ProcessHandle, TypeId, TypeIdClass, TypeKey, DEBUGGER_GENERATED_BASE,
    DEBUGGER_GENERATED_MAX, SYNTHETIC_BASE, SYNTHETIC_MAX,
};
pub use records::{
    ArrayTypeInfo, BaseClassInfo, BaseTypeInfo, DataInfo, EnumInfo, EnumerandValue, FunctionArgTypeInfo,
    FunctionArgument, FunctionInfo, FunctionTypeInfo, PointerTypeInfo, QueryResult, RawQueryResult, TypedRecord,
    TypedefInfo, UdtInfo, UdtMember, VTableInfo, VTableShapeInfo, ValidityMask,
};
pub use tags::{BasicType, CallingConvention, DataKind, SymTag, UdtKind};
