//! Symbol table management and scope handling.
//!
//! This module provides the core data structures and operations for managing
//! symbols and scopes during semantic analysis. It maintains a hierarchical
//! scope structure with three namespaces per scope and provides efficient
//! symbol lookup and storage. The C declaration rules themselves (merging,
//! linkage checks) live in `semantic::validate`; this module supplies the
//! mechanics they are built from.

use hashbrown::HashMap;
use std::num::NonZeroU32;

use log::debug;

use crate::ast::{NodeRef, StorageClass};
use crate::intern::StringId;
use crate::source_manager::SourceSpan;

use super::types::QualType;

/// Opaque reference to a symbol entry. Index + 1 into the entry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolEntryRef(NonZeroU32);

impl SymbolEntryRef {
    #[inline]
    fn from_index(index: usize) -> Self {
        SymbolEntryRef(NonZeroU32::new(index as u32 + 1).expect("symbol arena overflow"))
    }

    #[inline]
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Represents the definition state of a symbol entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionState {
    Tentative,    // int x;
    Defined,      // int x = ...;
    DeclaredOnly, // extern int x;
}

/// Represents a resolved symbol entry from the symbol table.
/// Symbol entries are stored in an arena with SymbolEntryRef references.
#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub name: StringId,
    pub kind: SymbolKind,
    pub type_info: QualType,
    pub storage_class: Option<StorageClass>,
    pub scope_id: ScopeId, // Scope where the symbol was declared
    pub def_span: SourceSpan,
    pub def_state: DefinitionState,
    pub is_referenced: bool,
}

impl SymbolEntry {
    /// Internal linkage (file-scope static)?
    pub fn is_static(&self) -> bool {
        self.storage_class == Some(StorageClass::Static)
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Function { .. })
    }

    pub fn is_typedef(&self) -> bool {
        matches!(self.kind, SymbolKind::Typedef)
    }
}

/// Defines the kind of symbol.
#[derive(Debug, Clone)]
pub enum SymbolKind {
    Variable {
        is_global: bool,
        initializer: Option<NodeRef>,
    },
    Function {
        is_inline: bool,
    },
    /// The aliased type is `type_info`
    Typedef,
    EnumConstant {
        value: i64,
    },
    Label {
        is_defined: bool,
        is_used: bool,
    },
    /// Struct, union, or enum tag; `type_info.ty` is the registry entry
    Tag,
}

/// Scope ID for efficient scope references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(NonZeroU32);

impl ScopeId {
    pub const GLOBAL: Self = Self(NonZeroU32::new(1).unwrap());

    pub fn get(self) -> u32 {
        self.0.get()
    }

    fn from_index(index: usize) -> Self {
        ScopeId(NonZeroU32::new(index as u32 + 1).expect("scope arena overflow"))
    }
}

/// Symbol namespaces in C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Ordinary, // Variables, functions, typedefs, enum constants
    Tag,      // Struct, union, and enum tags
    Label,    // Goto labels, always on the function scope
}

/// What a scope is for.
///
/// `Param` and `Local` are distinct so that an old-style parameter
/// redeclaration between `)` and `{` (handled inside the Param scope)
/// can be told apart from a body-level declaration that collides with
/// a parameter (a Local declaration shadowing into Param, an error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    /// Function parameter scope, opened at `(`
    Param,
    /// The function body's outermost block
    Local,
    /// Any nested block
    Block,
}

/// Scope information
#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    pub symbols: HashMap<StringId, SymbolEntryRef>, // Ordinary identifiers
    pub tags: HashMap<StringId, SymbolEntryRef>,    // Struct/union/enum tags
    pub labels: HashMap<StringId, SymbolEntryRef>,  // Goto labels
    pub level: u32,
}

/// Symbol table using flattened storage
#[derive(Debug)]
pub struct SymbolTable {
    pub entries: Vec<SymbolEntry>,
    pub scopes: Vec<Scope>,
    current_scope_id: ScopeId,
    /// The Param scope of the function being parsed, if any
    function_scope_id: Option<ScopeId>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            entries: Vec::new(),
            scopes: vec![Scope {
                parent: None,
                kind: ScopeKind::Global,
                symbols: HashMap::new(),
                tags: HashMap::new(),
                labels: HashMap::new(),
                level: 1,
            }],
            current_scope_id: ScopeId::GLOBAL,
            function_scope_id: None,
        }
    }

    pub fn push_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let parent = self.current_scope_id;
        let level = self.get_scope(parent).level + 1;
        let new_scope_id = ScopeId::from_index(self.scopes.len());
        self.scopes.push(Scope {
            parent: Some(parent),
            kind,
            symbols: HashMap::new(),
            tags: HashMap::new(),
            labels: HashMap::new(),
            level,
        });
        self.current_scope_id = new_scope_id;
        if kind == ScopeKind::Param {
            self.function_scope_id = Some(new_scope_id);
        }
        debug!("SymbolTable: pushed {:?} scope {} (level {})", kind, new_scope_id.get(), level);
        new_scope_id
    }

    pub fn pop_scope(&mut self) -> Option<ScopeId> {
        let scope = self.get_scope(self.current_scope_id);
        let parent = scope.parent?;
        if scope.kind == ScopeKind::Param {
            self.function_scope_id = None;
        }
        debug!(
            "SymbolTable: popped scope {}, back to {}",
            self.current_scope_id.get(),
            parent.get()
        );
        self.current_scope_id = parent;
        Some(parent)
    }

    pub fn current_scope(&self) -> ScopeId {
        self.current_scope_id
    }

    pub fn current_scope_kind(&self) -> ScopeKind {
        self.get_scope(self.current_scope_id).kind
    }

    pub fn at_global_scope(&self) -> bool {
        self.current_scope_id == ScopeId::GLOBAL
    }

    /// The Param scope of the function currently being parsed.
    pub fn function_scope(&self) -> Option<ScopeId> {
        self.function_scope_id
    }

    pub fn get_scope(&self, scope_id: ScopeId) -> &Scope {
        &self.scopes[scope_id.get() as usize - 1]
    }

    pub fn get_scope_mut(&mut self, scope_id: ScopeId) -> &mut Scope {
        &mut self.scopes[scope_id.get() as usize - 1]
    }

    /// Insert an entry into the current scope under `ns`.
    /// No conflict checking; callers run the declaration rules first.
    pub fn install(&mut self, name: StringId, mut entry: SymbolEntry, ns: Namespace) -> SymbolEntryRef {
        entry.scope_id = self.current_scope_id;
        let entry_ref = self.push_symbol_entry(entry);
        let scope = self.get_scope_mut(self.current_scope_id);
        match ns {
            Namespace::Ordinary => scope.symbols.insert(name, entry_ref),
            Namespace::Tag => scope.tags.insert(name, entry_ref),
            Namespace::Label => scope.labels.insert(name, entry_ref),
        };
        entry_ref
    }

    /// Walk from the current scope outward through `ns`.
    pub fn lookup_from_ns(&self, name: StringId, start_scope: ScopeId, ns: Namespace) -> Option<(SymbolEntryRef, ScopeId)> {
        let mut scope_id = start_scope;
        loop {
            let scope = self.get_scope(scope_id);
            let maybe_entry = match ns {
                Namespace::Ordinary => scope.symbols.get(&name),
                Namespace::Tag => scope.tags.get(&name),
                Namespace::Label => scope.labels.get(&name),
            };
            if let Some(&entry_ref) = maybe_entry {
                return Some((entry_ref, scope_id));
            }
            scope_id = scope.parent?;
        }
    }

    pub fn lookup(&self, name: StringId) -> Option<(SymbolEntryRef, ScopeId)> {
        self.lookup_from_ns(name, self.current_scope_id, Namespace::Ordinary)
    }

    pub fn lookup_tag(&self, name: StringId) -> Option<(SymbolEntryRef, ScopeId)> {
        self.lookup_from_ns(name, self.current_scope_id, Namespace::Tag)
    }

    pub fn lookup_in_scope_ns(&self, name: StringId, scope_id: ScopeId, ns: Namespace) -> Option<SymbolEntryRef> {
        let scope = self.get_scope(scope_id);
        match ns {
            Namespace::Ordinary => scope.symbols.get(&name).copied(),
            Namespace::Tag => scope.tags.get(&name).copied(),
            Namespace::Label => scope.labels.get(&name).copied(),
        }
    }

    /// Find an existing symbol that shares a declaration space with a
    /// new declaration of `name` in the current scope.
    ///
    /// The function body's outermost block and the parameter scope form
    /// one declaration space: `int f(int x) { int x; }` is a
    /// redefinition, not a shadow.
    pub fn conflicting_in_declaration_space(&self, name: StringId) -> Option<SymbolEntryRef> {
        if let Some(entry) = self.lookup_in_scope_ns(name, self.current_scope_id, Namespace::Ordinary) {
            return Some(entry);
        }
        let scope = self.get_scope(self.current_scope_id);
        if scope.kind == ScopeKind::Local {
            if let Some(parent) = scope.parent {
                if self.get_scope(parent).kind == ScopeKind::Param {
                    return self.lookup_in_scope_ns(name, parent, Namespace::Ordinary);
                }
            }
        }
        None
    }

    fn push_symbol_entry(&mut self, entry: SymbolEntry) -> SymbolEntryRef {
        let entry_ref = SymbolEntryRef::from_index(self.entries.len());
        self.entries.push(entry);
        entry_ref
    }

    pub fn entry(&self, r: SymbolEntryRef) -> &SymbolEntry {
        &self.entries[r.index()]
    }

    pub fn entry_mut(&mut self, r: SymbolEntryRef) -> &mut SymbolEntry {
        &mut self.entries[r.index()]
    }

    pub fn mark_referenced(&mut self, r: SymbolEntryRef) {
        self.entries[r.index()].is_referenced = true;
    }

    // === Labels ===
    //
    // Labels have function scope regardless of block depth, so they
    // always live on the enclosing Param scope's label map.

    /// Labels carry no meaningful type. Registry index 0 is always Void.
    fn label_placeholder_type() -> QualType {
        QualType::unqualified(crate::semantic::types::TypeRef::from_index(0))
    }

    /// Record a label definition. Returns the previous entry if the
    /// label was already defined.
    pub fn define_label(&mut self, name: StringId, span: SourceSpan) -> Result<SymbolEntryRef, SymbolEntryRef> {
        let scope_id = self.function_scope_id.expect("label outside of function");
        if let Some(existing_ref) = self.lookup_in_scope_ns(name, scope_id, Namespace::Label) {
            let existing = self.entry_mut(existing_ref);
            if let SymbolKind::Label { is_defined, .. } = &mut existing.kind {
                if *is_defined {
                    return Err(existing_ref);
                }
                *is_defined = true;
                existing.def_span = span;
                return Ok(existing_ref);
            }
        }
        let entry = SymbolEntry {
            name,
            kind: SymbolKind::Label {
                is_defined: true,
                is_used: false,
            },
            type_info: Self::label_placeholder_type(),
            storage_class: None,
            scope_id,
            def_span: span,
            def_state: DefinitionState::Defined,
            is_referenced: false,
        };
        Ok(self.install_in_scope(name, entry, scope_id, Namespace::Label))
    }

    /// Record a `goto` use of a label, creating a forward entry if needed.
    pub fn use_label(&mut self, name: StringId, span: SourceSpan) -> SymbolEntryRef {
        let scope_id = self.function_scope_id.expect("goto outside of function");
        if let Some(existing_ref) = self.lookup_in_scope_ns(name, scope_id, Namespace::Label) {
            if let SymbolKind::Label { is_used, .. } = &mut self.entry_mut(existing_ref).kind {
                *is_used = true;
            }
            return existing_ref;
        }
        let entry = SymbolEntry {
            name,
            kind: SymbolKind::Label {
                is_defined: false,
                is_used: true,
            },
            type_info: Self::label_placeholder_type(),
            storage_class: None,
            scope_id,
            def_span: span,
            def_state: DefinitionState::DeclaredOnly,
            is_referenced: false,
        };
        self.install_in_scope(name, entry, scope_id, Namespace::Label)
    }

    /// Labels used by a `goto` but never defined in the function.
    pub fn undefined_labels(&self) -> Vec<SymbolEntryRef> {
        let Some(scope_id) = self.function_scope_id else {
            return Vec::new();
        };
        let mut result: Vec<SymbolEntryRef> = self
            .get_scope(scope_id)
            .labels
            .values()
            .copied()
            .filter(|&r| {
                matches!(
                    self.entry(r).kind,
                    SymbolKind::Label {
                        is_defined: false,
                        is_used: true
                    }
                )
            })
            .collect();
        result.sort_by_key(|r| r.index());
        result
    }

    fn install_in_scope(
        &mut self,
        name: StringId,
        mut entry: SymbolEntry,
        scope_id: ScopeId,
        ns: Namespace,
    ) -> SymbolEntryRef {
        entry.scope_id = scope_id;
        let entry_ref = self.push_symbol_entry(entry);
        let scope = self.get_scope_mut(scope_id);
        match ns {
            Namespace::Ordinary => scope.symbols.insert(name, entry_ref),
            Namespace::Tag => scope.tags.insert(name, entry_ref),
            Namespace::Label => scope.labels.insert(name, entry_ref),
        };
        entry_ref
    }

    /// File-scope symbols in declaration order, for the unused pass
    /// and data emission.
    pub fn global_symbols(&self) -> impl Iterator<Item = (SymbolEntryRef, &SymbolEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (SymbolEntryRef::from_index(i), e))
            .filter(|(_, e)| e.scope_id == ScopeId::GLOBAL)
    }
}
