//! Type system representation.
//!
//! This module defines the semantic type system used during analysis,
//! distinct from the syntactic specifier constructs used in parsing.
//! Types are stored in an arena owned by the `TypeRegistry` and passed
//! around as `TypeRef` handles.

use std::num::NonZeroU32;

use bitflags::bitflags;
use serde::Serialize;

use crate::intern::StringId;
use crate::source_manager::SourceSpan;

/// Opaque reference to a canonical type.
/// Internally index + 1 (NonZeroU32 for niche optimization).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TypeRef(NonZeroU32);

impl TypeRef {
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        TypeRef(NonZeroU32::new(index as u32 + 1).expect("type arena overflow"))
    }

    #[inline]
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeRef({})", self.0.get())
    }
}

bitflags! {
    /// Type qualifiers
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Default)]
    pub struct TypeQualifiers: u8 {
        const CONST = 1 << 0;
        const VOLATILE = 1 << 1;
        const RESTRICT = 1 << 2;
    }
}

impl std::fmt::Display for TypeQualifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (flag, name) in [
            (TypeQualifiers::CONST, "const"),
            (TypeQualifiers::VOLATILE, "volatile"),
            (TypeQualifiers::RESTRICT, "restrict"),
        ] {
            if self.contains(flag) {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A type reference together with its qualifiers.
///
/// Qualifiers live outside the canonical type so that `const int` and
/// `int` share one arena entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QualType {
    pub ty: TypeRef,
    pub qualifiers: TypeQualifiers,
}

impl QualType {
    #[inline]
    pub fn new(ty: TypeRef, qualifiers: TypeQualifiers) -> Self {
        Self { ty, qualifiers }
    }

    #[inline]
    pub fn unqualified(ty: TypeRef) -> Self {
        Self {
            ty,
            qualifiers: TypeQualifiers::empty(),
        }
    }

    #[inline]
    pub fn is_const(&self) -> bool {
        self.qualifiers.contains(TypeQualifiers::CONST)
    }

    #[inline]
    pub fn with_qualifiers(self, qualifiers: TypeQualifiers) -> Self {
        Self {
            ty: self.ty,
            qualifiers: self.qualifiers | qualifiers,
        }
    }
}

/// Array size classification.
///
/// The `[*]` form is only legal on parameter arrays inside prototypes;
/// the check happens in the declarator parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArraySizeType {
    Fixed(u64),
    Incomplete,
    Star,
}

/// The kind of type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Void,
    Bool,
    Char {
        is_signed: bool,
    },
    Short {
        is_signed: bool,
    },
    Int {
        is_signed: bool,
    },
    Long {
        is_signed: bool,
        is_long_long: bool,
    },
    Float,
    Double {
        is_long_double: bool,
    },
    Pointer {
        pointee: QualType,
    },
    Array {
        element_type: QualType,
        size: ArraySizeType,
        /// `static` inside the brackets, parameter arrays only
        is_static: bool,
        /// Qualifiers inside the brackets, parameter arrays only.
        /// They apply to the decayed pointer.
        bracket_qualifiers: TypeQualifiers,
    },
    Function {
        return_type: QualType,
        parameters: Vec<FunctionParameter>,
        is_variadic: bool,
        /// False for old-style `()` declarations without a parameter list
        is_prototype: bool,
    },
    Record {
        // Represents both struct and union
        tag: Option<StringId>,
        members: Vec<StructMember>,
        is_complete: bool,
        is_union: bool,
    },
    Enum {
        tag: Option<StringId>,
        base_type: TypeRef, // Underlying integer type
        enumerators: Vec<EnumConstant>,
        is_complete: bool,
    },
    /// For error recovery; compatible with nothing, layout of int.
    Error,
}

impl TypeKind {
    /// Integer types, including _Bool and enums
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeKind::Bool
                | TypeKind::Char { .. }
                | TypeKind::Short { .. }
                | TypeKind::Int { .. }
                | TypeKind::Long { .. }
                | TypeKind::Enum { .. }
        )
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, TypeKind::Float | TypeKind::Double { .. })
    }

    pub fn is_arithmetic(&self) -> bool {
        self.is_integer() || self.is_floating()
    }

    /// Arithmetic types and pointers
    pub fn is_scalar(&self) -> bool {
        self.is_arithmetic() || matches!(self, TypeKind::Pointer { .. })
    }

    pub fn is_record(&self) -> bool {
        matches!(self, TypeKind::Record { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self, TypeKind::Function { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeKind::Array { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeKind::Pointer { .. })
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeKind::Void)
    }

    /// Signedness of an integer type. Pointers and floats return false.
    pub fn is_signed(&self) -> bool {
        match self {
            TypeKind::Char { is_signed } | TypeKind::Short { is_signed } | TypeKind::Int { is_signed } => *is_signed,
            TypeKind::Long { is_signed, .. } => *is_signed,
            TypeKind::Enum { .. } => true,
            _ => false,
        }
    }

    /// Conversion rank for the usual arithmetic conversions.
    /// Higher rank wins; unsignedness breaks ties at equal size.
    pub fn integer_rank(&self) -> u32 {
        match self {
            TypeKind::Bool => 1,
            TypeKind::Char { .. } => 2,
            TypeKind::Short { .. } => 3,
            TypeKind::Int { .. } | TypeKind::Enum { .. } => 4,
            TypeKind::Long { is_long_long: false, .. } => 5,
            TypeKind::Long { is_long_long: true, .. } => 6,
            _ => 0,
        }
    }
}

/// Function parameter information.
///
/// Names are kept for rendering and old-style definitions, but two
/// function types that differ only in parameter names are the same type.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParameter {
    pub param_type: QualType,
    pub name: Option<StringId>,
}

/// Struct/union member information
#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: Option<StringId>,
    pub member_type: QualType,
    pub bit_field_size: Option<u32>,
    pub span: SourceSpan, // for diagnostics
}

/// Enum constant information
#[derive(Debug, Clone, PartialEq)]
pub struct EnumConstant {
    pub name: StringId,
    pub value: i64, // Resolved value
    pub span: SourceSpan,
}

/// Computed size and alignment, cached per arena entry.
#[derive(Debug, Clone)]
pub struct TypeLayout {
    pub size: u64,
    pub alignment: u32,
    pub kind: LayoutKind,
}

#[derive(Debug, Clone)]
pub enum LayoutKind {
    Scalar,
    Array,
    Record { fields: Vec<FieldLayout> },
}

/// Placement of one record member, parallel to the member list.
#[derive(Debug, Clone, Copy)]
pub struct FieldLayout {
    /// Byte offset of the member, or of its storage unit for bit-fields
    pub offset: u64,
    /// Bit placement within the storage unit, bit-fields only
    pub bit: Option<BitPlacement>,
}

#[derive(Debug, Clone, Copy)]
pub struct BitPlacement {
    pub bit_offset: u32,
    pub width: u32,
}

/// Arena entry: a canonical type plus its lazily computed layout.
#[derive(Debug, Clone)]
pub struct Type {
    pub kind: TypeKind,
    pub layout: Option<TypeLayout>,
}

impl Type {
    /// Can only be called by TypeRegistry
    pub(crate) fn new(kind: TypeKind) -> Self {
        Type { kind, layout: None }
    }
}
