//! Semantic analysis module.
//!
//! This module provides the semantic layer of the compiler:
//! - Symbol table and scope management
//! - The type registry (composition, equivalence, layout)
//! - Declaration merging and validation rules
//!
//! The parser drives these pieces as it goes; there is no separate
//! whole-tree checking pass apart from the end-of-unit validations in
//! `validate`.

pub mod symbol_table;
pub mod type_registry;
pub mod types;
pub mod validate;

#[cfg(test)]
pub mod tests_symbol_table;
#[cfg(test)]
pub mod tests_types;

// Re-export key types for public API
pub use symbol_table::{DefinitionState, Namespace, ScopeId, ScopeKind, SymbolEntry, SymbolEntryRef, SymbolKind, SymbolTable};
pub use type_registry::TypeRegistry;
pub use types::{
    ArraySizeType, EnumConstant, FunctionParameter, QualType, StructMember, Type, TypeKind, TypeLayout, TypeQualifiers,
    TypeRef,
};
