//! Type Registry
//!
//! Arena + canonicalization layer for semantic types.
//! All TypeRef creation and mutation goes through this registry.

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;

use crate::intern::StringId;

use super::types::{
    ArraySizeType, BitPlacement, EnumConstant, FieldLayout, FunctionParameter, LayoutKind, QualType, StructMember,
    Type, TypeKind, TypeLayout, TypeQualifiers, TypeRef,
};

/// Cache key for canonical function types. Parameter names are excluded:
/// they never distinguish function types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FnSigKey {
    return_type: QualType,
    params: Vec<QualType>,
    is_variadic: bool,
    is_prototype: bool,
}

/// Cache key for canonical array types.
type ArrayKey = (QualType, ArraySizeType, bool, TypeQualifiers);

/// Central arena & factory for semantic types.
///
/// Invariants:
/// - All TypeRef come from this registry
/// - Types are never removed
/// - Derived types are canonicalized; records and enums have identity
pub struct TypeRegistry {
    types: Vec<Type>,

    // --- Canonicalization caches ---
    pointer_cache: HashMap<QualType, TypeRef>,
    array_cache: HashMap<ArrayKey, TypeRef>,
    function_cache: HashMap<FnSigKey, TypeRef>,

    // Guard against layout recursion through malformed records
    layout_in_progress: HashSet<TypeRef>,

    // --- Common builtin types ---
    pub type_void: TypeRef,
    pub type_bool: TypeRef,
    pub type_char: TypeRef,
    pub type_char_unsigned: TypeRef,
    pub type_short: TypeRef,
    pub type_short_unsigned: TypeRef,
    pub type_int: TypeRef,
    pub type_int_unsigned: TypeRef,
    pub type_long: TypeRef,
    pub type_long_unsigned: TypeRef,
    pub type_long_long: TypeRef,
    pub type_long_long_unsigned: TypeRef,
    pub type_float: TypeRef,
    pub type_double: TypeRef,
    pub type_long_double: TypeRef,
    pub type_error: TypeRef,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut types = Vec::with_capacity(32);
        let mut alloc = |kind: TypeKind| {
            types.push(Type::new(kind));
            TypeRef::from_index(types.len() - 1)
        };

        let type_void = alloc(TypeKind::Void);
        let type_bool = alloc(TypeKind::Bool);
        let type_char = alloc(TypeKind::Char { is_signed: true });
        let type_char_unsigned = alloc(TypeKind::Char { is_signed: false });
        let type_short = alloc(TypeKind::Short { is_signed: true });
        let type_short_unsigned = alloc(TypeKind::Short { is_signed: false });
        let type_int = alloc(TypeKind::Int { is_signed: true });
        let type_int_unsigned = alloc(TypeKind::Int { is_signed: false });
        let type_long = alloc(TypeKind::Long {
            is_signed: true,
            is_long_long: false,
        });
        let type_long_unsigned = alloc(TypeKind::Long {
            is_signed: false,
            is_long_long: false,
        });
        let type_long_long = alloc(TypeKind::Long {
            is_signed: true,
            is_long_long: true,
        });
        let type_long_long_unsigned = alloc(TypeKind::Long {
            is_signed: false,
            is_long_long: true,
        });
        let type_float = alloc(TypeKind::Float);
        let type_double = alloc(TypeKind::Double { is_long_double: false });
        let type_long_double = alloc(TypeKind::Double { is_long_double: true });
        let type_error = alloc(TypeKind::Error);

        TypeRegistry {
            types,
            pointer_cache: HashMap::new(),
            array_cache: HashMap::new(),
            function_cache: HashMap::new(),
            layout_in_progress: HashSet::new(),
            type_void,
            type_bool,
            type_char,
            type_char_unsigned,
            type_short,
            type_short_unsigned,
            type_int,
            type_int_unsigned,
            type_long,
            type_long_unsigned,
            type_long_long,
            type_long_long_unsigned,
            type_float,
            type_double,
            type_long_double,
            type_error,
        }
    }

    fn alloc(&mut self, kind: TypeKind) -> TypeRef {
        self.types.push(Type::new(kind));
        TypeRef::from_index(self.types.len() - 1)
    }

    #[inline]
    pub fn get(&self, r: TypeRef) -> &Type {
        &self.types[r.index()]
    }

    #[inline]
    pub fn kind(&self, r: TypeRef) -> &TypeKind {
        &self.types[r.index()].kind
    }

    fn get_mut(&mut self, r: TypeRef) -> &mut Type {
        &mut self.types[r.index()]
    }

    /// The error type as a QualType, for recovery paths.
    pub fn error_type(&self) -> QualType {
        QualType::unqualified(self.type_error)
    }

    // === Composition ===

    /// Pointer to `pointee`, canonicalized.
    pub fn pointer_to(&mut self, pointee: QualType) -> TypeRef {
        if let Some(&r) = self.pointer_cache.get(&pointee) {
            return r;
        }
        let r = self.alloc(TypeKind::Pointer { pointee });
        self.pointer_cache.insert(pointee, r);
        r
    }

    /// Array of `element_type`, canonicalized.
    pub fn array_of(&mut self, element_type: QualType, size: ArraySizeType) -> TypeRef {
        self.param_array_of(element_type, size, false, TypeQualifiers::empty())
    }

    /// Array carrying parameter-declarator extras (`static`, bracket
    /// qualifiers). Outside parameter lists both stay empty.
    pub fn param_array_of(
        &mut self,
        element_type: QualType,
        size: ArraySizeType,
        is_static: bool,
        bracket_qualifiers: TypeQualifiers,
    ) -> TypeRef {
        let key = (element_type, size, is_static, bracket_qualifiers);
        if let Some(&r) = self.array_cache.get(&key) {
            return r;
        }
        let r = self.alloc(TypeKind::Array {
            element_type,
            size,
            is_static,
            bracket_qualifiers,
        });
        self.array_cache.insert(key, r);
        r
    }

    /// Function type, canonicalized on everything except parameter names.
    pub fn function_type(
        &mut self,
        return_type: QualType,
        parameters: Vec<FunctionParameter>,
        is_variadic: bool,
        is_prototype: bool,
    ) -> TypeRef {
        let key = FnSigKey {
            return_type,
            params: parameters.iter().map(|p| p.param_type).collect(),
            is_variadic,
            is_prototype,
        };
        if let Some(&r) = self.function_cache.get(&key) {
            return r;
        }
        let r = self.alloc(TypeKind::Function {
            return_type,
            parameters,
            is_variadic,
            is_prototype,
        });
        self.function_cache.insert(key, r);
        r
    }

    // === Two-phase record / enum construction ===

    /// First phase: an incomplete record with identity.
    /// Two calls produce two distinct types even for the same tag.
    pub fn declare_record(&mut self, tag: Option<StringId>, is_union: bool) -> TypeRef {
        self.alloc(TypeKind::Record {
            tag,
            members: Vec::new(),
            is_complete: false,
            is_union,
        })
    }

    /// Second phase: install the member list and mark complete.
    pub fn complete_record(&mut self, record: TypeRef, new_members: Vec<StructMember>) {
        let entry = self.get_mut(record);
        entry.layout = None;
        match &mut entry.kind {
            TypeKind::Record {
                members, is_complete, ..
            } => {
                *members = new_members;
                *is_complete = true;
            }
            _ => panic!("ICE: complete_record on non-record {record}"),
        }
    }

    pub fn declare_enum(&mut self, tag: Option<StringId>) -> TypeRef {
        let base_type = self.type_int;
        self.alloc(TypeKind::Enum {
            tag,
            base_type,
            enumerators: Vec::new(),
            is_complete: false,
        })
    }

    pub fn complete_enum(&mut self, enum_ty: TypeRef, new_enumerators: Vec<EnumConstant>) {
        let entry = self.get_mut(enum_ty);
        match &mut entry.kind {
            TypeKind::Enum {
                enumerators,
                is_complete,
                ..
            } => {
                *enumerators = new_enumerators;
                *is_complete = true;
            }
            _ => panic!("ICE: complete_enum on non-enum {enum_ty}"),
        }
    }

    // === Queries ===

    /// A type is complete if its size is known.
    pub fn is_complete(&self, r: TypeRef) -> bool {
        match self.kind(r) {
            TypeKind::Void => false,
            TypeKind::Record { is_complete, .. } | TypeKind::Enum { is_complete, .. } => *is_complete,
            TypeKind::Array {
                size, element_type, ..
            } => matches!(size, ArraySizeType::Fixed(_)) && self.is_complete(element_type.ty),
            TypeKind::Function { .. } => false,
            _ => true,
        }
    }

    pub fn pointee_of(&self, r: TypeRef) -> Option<QualType> {
        match self.kind(r) {
            TypeKind::Pointer { pointee } => Some(*pointee),
            _ => None,
        }
    }

    pub fn element_of(&self, r: TypeRef) -> Option<QualType> {
        match self.kind(r) {
            TypeKind::Array { element_type, .. } => Some(*element_type),
            _ => None,
        }
    }

    pub fn return_type_of(&self, r: TypeRef) -> Option<QualType> {
        match self.kind(r) {
            TypeKind::Function { return_type, .. } => Some(*return_type),
            _ => None,
        }
    }

    // === Layout ===

    /// Size and alignment, computing and caching on first use.
    /// None for incomplete types, functions, and void.
    pub fn ensure_layout(&mut self, r: TypeRef) -> Option<(u64, u32)> {
        if let Some(layout) = &self.get(r).layout {
            return Some((layout.size, layout.alignment));
        }
        if self.layout_in_progress.contains(&r) {
            return None;
        }
        self.layout_in_progress.insert(r);
        let layout = self.compute_layout(r);
        self.layout_in_progress.remove(&r);

        let layout = layout?;
        let result = (layout.size, layout.alignment);
        self.get_mut(r).layout = Some(layout);
        Some(result)
    }

    pub fn size_of(&mut self, r: TypeRef) -> Option<u64> {
        self.ensure_layout(r).map(|(size, _)| size)
    }

    pub fn align_of(&mut self, r: TypeRef) -> Option<u32> {
        self.ensure_layout(r).map(|(_, align)| align)
    }

    /// Placement of the record member at `index` in the member list.
    pub fn field_layout(&mut self, record: TypeRef, index: usize) -> Option<FieldLayout> {
        self.ensure_layout(record)?;
        match &self.get(record).layout.as_ref()?.kind {
            LayoutKind::Record { fields } => fields.get(index).copied(),
            _ => None,
        }
    }

    fn compute_layout(&mut self, r: TypeRef) -> Option<TypeLayout> {
        let scalar = |size: u64, alignment: u32| {
            Some(TypeLayout {
                size,
                alignment,
                kind: LayoutKind::Scalar,
            })
        };
        match self.kind(r).clone() {
            TypeKind::Void | TypeKind::Function { .. } => None,
            TypeKind::Bool | TypeKind::Char { .. } => scalar(1, 1),
            TypeKind::Short { .. } => scalar(2, 2),
            TypeKind::Int { .. } | TypeKind::Float => scalar(4, 4),
            TypeKind::Long { .. } | TypeKind::Double { .. } | TypeKind::Pointer { .. } => scalar(8, 8),
            TypeKind::Enum { is_complete, .. } => {
                if is_complete {
                    scalar(4, 4)
                } else {
                    None
                }
            }
            // Treated as int so error recovery can keep going
            TypeKind::Error => scalar(4, 4),
            TypeKind::Array {
                element_type, size, ..
            } => {
                let count = match size {
                    ArraySizeType::Fixed(n) => n,
                    ArraySizeType::Incomplete | ArraySizeType::Star => return None,
                };
                let (elem_size, alignment) = self.ensure_layout(element_type.ty)?;
                Some(TypeLayout {
                    size: elem_size.checked_mul(count)?,
                    alignment,
                    kind: LayoutKind::Array,
                })
            }
            TypeKind::Record {
                members,
                is_complete,
                is_union,
                ..
            } => {
                if !is_complete {
                    return None;
                }
                self.compute_record_layout(&members, is_union)
            }
        }
    }

    /// Struct and union layout, including bit-field packing.
    ///
    /// Consecutive bit-fields share a storage unit while their declared
    /// type size matches and bits remain; a zero-width bit-field closes
    /// the current unit.
    fn compute_record_layout(&mut self, members: &[StructMember], is_union: bool) -> Option<TypeLayout> {
        struct OpenUnit {
            start: u64,
            size: u64,
            bit_pos: u32,
        }

        let mut fields = Vec::with_capacity(members.len());
        let mut offset: u64 = 0;
        let mut max_align: u32 = 1;
        let mut max_size: u64 = 0;
        let mut unit: Option<OpenUnit> = None;

        for (index, member) in members.iter().enumerate() {
            let is_last = index == members.len() - 1;
            let member_ty = member.member_type.ty;

            // Flexible array member: contributes alignment but no size
            let flexible_elem = match self.kind(member_ty) {
                TypeKind::Array {
                    size: ArraySizeType::Incomplete,
                    element_type,
                    ..
                } => Some(element_type.ty),
                _ => None,
            };
            if let Some(elem) = flexible_elem {
                if !is_last || is_union {
                    return None;
                }
                let (_, align) = self.ensure_layout(elem)?;
                unit = None;
                let start = align_up(offset, align as u64);
                fields.push(FieldLayout {
                    offset: start,
                    bit: None,
                });
                offset = start;
                max_align = max_align.max(align);
                continue;
            }

            let (size, align) = self.ensure_layout(member_ty)?;
            max_align = max_align.max(align);

            match member.bit_field_size {
                None => {
                    unit = None;
                    let start = if is_union { 0 } else { align_up(offset, align as u64) };
                    fields.push(FieldLayout { offset: start, bit: None });
                    offset = start + size;
                    max_size = max_size.max(size);
                }
                Some(0) => {
                    // Zero width: force the next bit-field into a new unit
                    unit = None;
                    fields.push(FieldLayout {
                        offset: if is_union { 0 } else { offset },
                        bit: Some(BitPlacement { bit_offset: 0, width: 0 }),
                    });
                }
                Some(width) => {
                    let total_bits = (size * 8) as u32;
                    let placed = match &mut unit {
                        Some(open) if !is_union && open.size == size && open.bit_pos + width <= total_bits => {
                            let placement = BitPlacement {
                                bit_offset: open.bit_pos,
                                width,
                            };
                            open.bit_pos += width;
                            Some((open.start, placement))
                        }
                        _ => None,
                    };
                    let (start, placement) = match placed {
                        Some(p) => p,
                        None => {
                            let start = if is_union { 0 } else { align_up(offset, align as u64) };
                            unit = Some(OpenUnit {
                                start,
                                size,
                                bit_pos: width,
                            });
                            if !is_union {
                                offset = start + size;
                            }
                            (start, BitPlacement { bit_offset: 0, width })
                        }
                    };
                    fields.push(FieldLayout {
                        offset: start,
                        bit: Some(placement),
                    });
                    max_size = max_size.max(size);
                }
            }
        }

        let raw_size = if is_union { max_size } else { offset };
        Some(TypeLayout {
            size: align_up(raw_size, max_align as u64),
            alignment: max_align,
            kind: LayoutKind::Record { fields },
        })
    }

    // === Equivalence ===

    /// Structural type equivalence.
    ///
    /// Qualifiers participate at every level. Records and enums compare
    /// by identity. Function types follow the old-style/prototype matrix.
    pub fn is_compatible(&self, a: QualType, b: QualType) -> bool {
        if a.qualifiers != b.qualifiers {
            return false;
        }
        self.refs_compatible(a.ty, b.ty)
    }

    fn refs_compatible(&self, a: TypeRef, b: TypeRef) -> bool {
        if a == b {
            return true;
        }
        let (ka, kb) = (self.kind(a), self.kind(b));
        // Error type pairs with anything so one bad declaration
        // does not cascade
        if matches!(ka, TypeKind::Error) || matches!(kb, TypeKind::Error) {
            return true;
        }
        match (ka, kb) {
            (TypeKind::Pointer { pointee: pa }, TypeKind::Pointer { pointee: pb }) => self.is_compatible(*pa, *pb),
            (
                TypeKind::Array {
                    element_type: ea,
                    size: sa,
                    ..
                },
                TypeKind::Array {
                    element_type: eb,
                    size: sb,
                    ..
                },
            ) => {
                if !self.is_compatible(*ea, *eb) {
                    return false;
                }
                match (sa, sb) {
                    (ArraySizeType::Fixed(na), ArraySizeType::Fixed(nb)) => na == nb,
                    _ => true,
                }
            }
            (TypeKind::Function { .. }, TypeKind::Function { .. }) => self.functions_compatible(a, b),
            // Scalars are singletons (a == b would have hit), records and
            // enums have identity
            _ => false,
        }
    }

    fn functions_compatible(&self, a: TypeRef, b: TypeRef) -> bool {
        let TypeKind::Function {
            return_type: ra,
            parameters: pa,
            is_variadic: va,
            is_prototype: prota,
        } = self.kind(a)
        else {
            return false;
        };
        let TypeKind::Function {
            return_type: rb,
            parameters: pb,
            is_variadic: vb,
            is_prototype: protb,
        } = self.kind(b)
        else {
            return false;
        };

        if !self.is_compatible(*ra, *rb) {
            return false;
        }

        match (prota, protb) {
            (true, true) => {
                va == vb
                    && pa.len() == pb.len()
                    && pa
                        .iter()
                        .zip(pb.iter())
                        .all(|(x, y)| self.is_compatible(x.param_type, y.param_type))
            }
            (false, false) => true,
            // One old-style, one prototype
            (true, false) | (false, true) => {
                let (proto_params, proto_variadic, old_params) =
                    if *prota { (pa, *va, pb) } else { (pb, *vb, pa) };
                if proto_variadic {
                    return false;
                }
                // Every prototype parameter must survive the default
                // argument promotions unchanged
                for p in proto_params {
                    if !self.survives_default_promotion(p.param_type) {
                        return false;
                    }
                }
                if old_params.is_empty() {
                    return true;
                }
                // Old-style definition with parameters: compare promoted
                old_params.len() == proto_params.len()
                    && old_params.iter().zip(proto_params.iter()).all(|(o, p)| {
                        let promoted = self.default_argument_promote_const(o.param_type);
                        self.is_compatible(promoted, p.param_type)
                    })
            }
        }
    }

    fn survives_default_promotion(&self, qt: QualType) -> bool {
        match self.kind(qt.ty) {
            TypeKind::Bool | TypeKind::Char { .. } | TypeKind::Short { .. } | TypeKind::Float => false,
            _ => true,
        }
    }

    /// Composite of two compatible types: the more complete one wins.
    pub fn composite(&self, old: QualType, new: QualType) -> QualType {
        match (self.kind(old.ty), self.kind(new.ty)) {
            (TypeKind::Array { size: sa, .. }, TypeKind::Array { size: sb, .. }) => {
                match (sa, sb) {
                    (ArraySizeType::Fixed(_), _) => old,
                    (_, ArraySizeType::Fixed(_)) => new,
                    _ => old,
                }
            }
            (TypeKind::Function { is_prototype: pa, .. }, TypeKind::Function { is_prototype: pb, .. }) => {
                if *pa || !*pb { old } else { new }
            }
            _ => old,
        }
    }

    // === Conversions ===

    /// Integer promotion: types narrower than int go to int.
    /// Produces an unqualified rvalue type.
    pub fn integer_promote(&self, qt: QualType) -> QualType {
        match self.kind(qt.ty) {
            TypeKind::Bool | TypeKind::Char { .. } | TypeKind::Short { .. } | TypeKind::Enum { .. } => {
                QualType::unqualified(self.type_int)
            }
            _ => QualType::unqualified(qt.ty),
        }
    }

    /// Default argument promotions: integer promotion plus float to double.
    pub fn default_argument_promote(&self, qt: QualType) -> QualType {
        self.default_argument_promote_const(qt)
    }

    fn default_argument_promote_const(&self, qt: QualType) -> QualType {
        match self.kind(qt.ty) {
            TypeKind::Float => QualType::unqualified(self.type_double),
            _ => self.integer_promote(qt),
        }
    }

    /// The usual arithmetic conversions for a binary operator's operands.
    /// Both operands must already be arithmetic.
    pub fn usual_arithmetic_conversion(&self, a: QualType, b: QualType) -> QualType {
        let (ka, kb) = (self.kind(a.ty), self.kind(b.ty));

        let long_double = |k: &TypeKind| matches!(k, TypeKind::Double { is_long_double: true });
        if long_double(ka) || long_double(kb) {
            return QualType::unqualified(self.type_long_double);
        }
        if matches!(ka, TypeKind::Double { .. }) || matches!(kb, TypeKind::Double { .. }) {
            return QualType::unqualified(self.type_double);
        }
        if matches!(ka, TypeKind::Float) || matches!(kb, TypeKind::Float) {
            return QualType::unqualified(self.type_float);
        }

        let a = self.integer_promote(a);
        let b = self.integer_promote(b);
        if a.ty == b.ty {
            return a;
        }

        let (ka, kb) = (self.kind(a.ty), self.kind(b.ty));
        let (ra, rb) = (ka.integer_rank(), kb.integer_rank());

        // Pick the higher ranked side; on a rank tie the unsigned one
        let (hi, hi_kind, lo_kind) = if ra > rb || (ra == rb && !ka.is_signed()) {
            (a, ka, kb)
        } else {
            (b, kb, ka)
        };

        if hi_kind.is_signed() == lo_kind.is_signed() || !hi_kind.is_signed() {
            return hi;
        }

        // Signed higher rank: wins only if strictly wider than the
        // unsigned side, otherwise its unsigned counterpart is used
        if self.scalar_size(hi_kind) > self.scalar_size(lo_kind) {
            hi
        } else {
            QualType::unqualified(self.unsigned_counterpart(hi.ty))
        }
    }

    fn scalar_size(&self, kind: &TypeKind) -> u64 {
        match kind {
            TypeKind::Bool | TypeKind::Char { .. } => 1,
            TypeKind::Short { .. } => 2,
            TypeKind::Int { .. } | TypeKind::Enum { .. } | TypeKind::Error => 4,
            TypeKind::Long { .. } => 8,
            _ => 0,
        }
    }

    fn unsigned_counterpart(&self, r: TypeRef) -> TypeRef {
        match self.kind(r) {
            TypeKind::Int { .. } => self.type_int_unsigned,
            TypeKind::Long { is_long_long: false, .. } => self.type_long_unsigned,
            TypeKind::Long { is_long_long: true, .. } => self.type_long_long_unsigned,
            _ => r,
        }
    }

    /// Array-to-pointer and function-to-pointer decay.
    ///
    /// A parameter array's bracket qualifiers become qualifiers of the
    /// decayed pointer itself.
    pub fn decay(&mut self, qt: QualType) -> QualType {
        match self.kind(qt.ty).clone() {
            TypeKind::Array {
                element_type,
                bracket_qualifiers,
                ..
            } => {
                let ptr = self.pointer_to(element_type);
                QualType::new(ptr, bracket_qualifiers)
            }
            TypeKind::Function { .. } => {
                let ptr = self.pointer_to(QualType::unqualified(qt.ty));
                QualType::unqualified(ptr)
            }
            _ => qt,
        }
    }

    pub fn strip_all(&self, qt: QualType) -> QualType {
        QualType::unqualified(qt.ty)
    }

    pub fn merge_qualifiers(&self, base: QualType, add: TypeQualifiers) -> QualType {
        QualType::new(base.ty, base.qualifiers | add)
    }

    // === Rendering ===

    /// Render a type as C source, inside-out.
    ///
    /// A pointer to a function taking a string and an int comes out as
    /// `int (*) (char *, int)`.
    pub fn display(&self, qt: QualType) -> String {
        self.render(qt, String::new())
    }

    /// Render `qt` as a C declaration with `name` in declarator position,
    /// e.g. `int (*f) (int, long)`.
    pub fn display_declaration(&self, qt: QualType, name: &str) -> String {
        self.render(qt, name.to_string())
    }

    fn render(&self, qt: QualType, declarator: String) -> String {
        match self.kind(qt.ty) {
            TypeKind::Pointer { pointee } => {
                let mut d = String::from("*");
                if !qt.qualifiers.is_empty() {
                    d.push_str(&qt.qualifiers.to_string());
                }
                d.push_str(&declarator);
                let pointee_kind = self.kind(pointee.ty);
                if pointee_kind.is_array() || pointee_kind.is_function() {
                    d = format!("({})", d);
                }
                self.render(*pointee, d)
            }
            TypeKind::Array { size, element_type, .. } => {
                let suffix = match size {
                    ArraySizeType::Fixed(n) => format!("[{}]", n),
                    ArraySizeType::Incomplete => "[]".to_string(),
                    ArraySizeType::Star => "[*]".to_string(),
                };
                self.render(*element_type, format!("{}{}", declarator, suffix))
            }
            TypeKind::Function {
                return_type,
                parameters,
                is_variadic,
                is_prototype,
            } => {
                let params = if !is_prototype {
                    String::new()
                } else if parameters.is_empty() {
                    "void".to_string()
                } else {
                    let mut s = parameters.iter().map(|p| self.display(p.param_type)).join(", ");
                    if *is_variadic {
                        s.push_str(", ...");
                    }
                    s
                };
                let suffix = if declarator.is_empty() {
                    format!("({})", params)
                } else {
                    format!("{} ({})", declarator, params)
                };
                self.render(*return_type, suffix)
            }
            base => {
                let name = match base {
                    TypeKind::Void => "void".to_string(),
                    TypeKind::Bool => "_Bool".to_string(),
                    TypeKind::Char { is_signed: true } => "char".to_string(),
                    TypeKind::Char { is_signed: false } => "unsigned char".to_string(),
                    TypeKind::Short { is_signed: true } => "short".to_string(),
                    TypeKind::Short { is_signed: false } => "unsigned short".to_string(),
                    TypeKind::Int { is_signed: true } => "int".to_string(),
                    TypeKind::Int { is_signed: false } => "unsigned int".to_string(),
                    TypeKind::Long {
                        is_signed,
                        is_long_long,
                    } => match (is_signed, is_long_long) {
                        (true, false) => "long".to_string(),
                        (false, false) => "unsigned long".to_string(),
                        (true, true) => "long long".to_string(),
                        (false, true) => "unsigned long long".to_string(),
                    },
                    TypeKind::Float => "float".to_string(),
                    TypeKind::Double { is_long_double: false } => "double".to_string(),
                    TypeKind::Double { is_long_double: true } => "long double".to_string(),
                    TypeKind::Record { tag, is_union, .. } => {
                        let kw = if *is_union { "union" } else { "struct" };
                        match tag {
                            Some(t) => format!("{} {}", kw, t),
                            None => format!("{} <anonymous>", kw),
                        }
                    }
                    TypeKind::Enum { tag, .. } => match tag {
                        Some(t) => format!("enum {}", t),
                        None => "enum <anonymous>".to_string(),
                    },
                    TypeKind::Error => "<error>".to_string(),
                    _ => unreachable!("derived types handled above"),
                };
                let base_str = if qt.qualifiers.is_empty() {
                    name
                } else {
                    format!("{} {}", qt.qualifiers, name)
                };
                if declarator.is_empty() {
                    base_str
                } else {
                    format!("{} {}", base_str, declarator)
                }
            }
        }
    }
}

#[inline]
fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}
