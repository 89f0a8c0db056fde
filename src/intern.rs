//! Global string interning.
//!
//! Identifiers, keywords, and string literals are interned once and
//! referred to by [`StringId`] everywhere else. Comparing two names is
//! then a pointer-sized comparison, and the id is `Copy`.

use symbol_table::GlobalSymbol;

/// An interned string. Cheap to copy and compare.
pub type StringId = GlobalSymbol;

/// Interns a string, returning its [`StringId`].
///
/// Interning the same text twice returns the same id.
pub fn intern(s: &str) -> StringId {
    GlobalSymbol::new(s)
}

/// The id of the empty string.
pub fn empty_id() -> StringId {
    intern("")
}
