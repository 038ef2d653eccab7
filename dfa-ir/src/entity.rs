//! Entities: the monomorphized routines, fields, intrinsics and types of a program.

use std::fmt;

/// An opaque handle for one entity.  Ids are assigned by whoever builds the IR and are stable
/// for the lifetime of a [`crate::Program`], so ordering by id is deterministic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(pub u32);

impl Entity {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Has a code block (possibly empty).  Types are routines too: a type's constructor.
    Routine,
    Field,
    Intrinsic,
    Abstract,
    TypeParameter,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Routine => "routine",
            EntityKind::Field => "field",
            EntityKind::Intrinsic => "intrinsic",
            EntityKind::Abstract => "abstract",
            EntityKind::TypeParameter => "typeparam",
        })
    }
}

/// Built-in types whose values the value lattice tracks precisely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpecialEntity {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl SpecialEntity {
    pub const NUMERIC: [SpecialEntity; 10] = [
        SpecialEntity::I8,
        SpecialEntity::I16,
        SpecialEntity::I32,
        SpecialEntity::I64,
        SpecialEntity::U8,
        SpecialEntity::U16,
        SpecialEntity::U32,
        SpecialEntity::U64,
        SpecialEntity::F32,
        SpecialEntity::F64,
    ];

    pub fn is_numeric(&self) -> bool {
        !matches!(self, SpecialEntity::Bool)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SpecialEntity::F32 | SpecialEntity::F64)
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            SpecialEntity::I8 | SpecialEntity::I16 | SpecialEntity::I32 | SpecialEntity::I64
        ) || self.is_float()
    }

    /// Width in bytes of the constant data encoding this type.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            SpecialEntity::Bool | SpecialEntity::I8 | SpecialEntity::U8 => 1,
            SpecialEntity::I16 | SpecialEntity::U16 => 2,
            SpecialEntity::I32 | SpecialEntity::U32 | SpecialEntity::F32 => 4,
            SpecialEntity::I64 | SpecialEntity::U64 | SpecialEntity::F64 => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialEntity::Bool => "bool",
            SpecialEntity::I8 => "i8",
            SpecialEntity::I16 => "i16",
            SpecialEntity::I32 => "i32",
            SpecialEntity::I64 => "i64",
            SpecialEntity::U8 => "u8",
            SpecialEntity::U16 => "u16",
            SpecialEntity::U32 => "u32",
            SpecialEntity::U64 => "u64",
            SpecialEntity::F32 => "f32",
            SpecialEntity::F64 => "f64",
        }
    }

    pub fn from_name(name: &str) -> Option<SpecialEntity> {
        std::iter::once(SpecialEntity::Bool)
            .chain(SpecialEntity::NUMERIC)
            .find(|s| s.as_str() == name)
    }
}
