use super::types::*;
use super::TypeRegistry;
use crate::intern::intern;
use crate::source_manager::SourceSpan;

fn member(name: &str, member_type: QualType) -> StructMember {
    StructMember {
        name: Some(intern(name)),
        member_type,
        bit_field_size: None,
        span: SourceSpan::default(),
    }
}

fn bit_member(name: Option<&str>, member_type: QualType, width: u32) -> StructMember {
    StructMember {
        name: name.map(intern),
        member_type,
        bit_field_size: Some(width),
        span: SourceSpan::default(),
    }
}

fn param(ty: QualType) -> FunctionParameter {
    FunctionParameter {
        param_type: ty,
        name: None,
    }
}

#[test]
fn derived_types_are_canonical() {
    let mut reg = TypeRegistry::new();
    let int = QualType::unqualified(reg.type_int);

    let p1 = reg.pointer_to(int);
    let p2 = reg.pointer_to(int);
    assert_eq!(p1, p2);

    // const int * and int * are different pointer types
    let const_int = int.with_qualifiers(TypeQualifiers::CONST);
    assert_ne!(reg.pointer_to(const_int), p1);

    let a1 = reg.array_of(int, ArraySizeType::Fixed(10));
    let a2 = reg.array_of(int, ArraySizeType::Fixed(10));
    assert_eq!(a1, a2);
    assert_ne!(reg.array_of(int, ArraySizeType::Fixed(11)), a1);

    // Parameter names do not split function types
    let f1 = reg.function_type(
        int,
        vec![FunctionParameter {
            param_type: int,
            name: Some(intern("x")),
        }],
        false,
        true,
    );
    let f2 = reg.function_type(
        int,
        vec![FunctionParameter {
            param_type: int,
            name: Some(intern("y")),
        }],
        false,
        true,
    );
    assert_eq!(f1, f2);
}

#[test]
fn records_have_identity() {
    let mut reg = TypeRegistry::new();
    let tag = Some(intern("point"));
    let r1 = reg.declare_record(tag, false);
    let r2 = reg.declare_record(tag, false);
    assert_ne!(r1, r2);
    assert!(!reg.is_compatible(QualType::unqualified(r1), QualType::unqualified(r2)));
}

#[test]
fn display_renders_c_declarators() {
    let mut reg = TypeRegistry::new();
    let int = QualType::unqualified(reg.type_int);
    let ch = QualType::unqualified(reg.type_char);

    let char_ptr = QualType::unqualified(reg.pointer_to(ch));
    assert_eq!(reg.display(char_ptr), "char *");

    let const_char = ch.with_qualifiers(TypeQualifiers::CONST);
    let const_char_ptr = QualType::unqualified(reg.pointer_to(const_char));
    assert_eq!(reg.display(const_char_ptr), "const char *");

    // int (*) (char *, int)
    let func = reg.function_type(int, vec![param(char_ptr), param(int)], false, true);
    let func_ptr = QualType::unqualified(reg.pointer_to(QualType::unqualified(func)));
    assert_eq!(reg.display(func_ptr), "int (*) (char *, int)");

    // int (*)[10] vs int *[10]
    let arr = QualType::unqualified(reg.array_of(int, ArraySizeType::Fixed(10)));
    let ptr_to_arr = QualType::unqualified(reg.pointer_to(arr));
    assert_eq!(reg.display(ptr_to_arr), "int (*)[10]");

    let int_ptr = QualType::unqualified(reg.pointer_to(int));
    let arr_of_ptr = QualType::unqualified(reg.array_of(int_ptr, ArraySizeType::Fixed(10)));
    assert_eq!(reg.display(arr_of_ptr), "int *[10]");

    // Parameterless prototype renders as (void), variadic appends ...
    let void = QualType::unqualified(reg.type_void);
    let noargs = reg.function_type(void, vec![], false, true);
    assert_eq!(reg.display(QualType::unqualified(noargs)), "void (void)");
    let variadic = reg.function_type(int, vec![param(char_ptr)], true, true);
    assert_eq!(reg.display(QualType::unqualified(variadic)), "int (char *, ...)");

    let incomplete = QualType::unqualified(reg.array_of(ch, ArraySizeType::Incomplete));
    assert_eq!(reg.display(incomplete), "char []");
}

#[test]
fn scalar_compatibility_is_exact() {
    let mut reg = TypeRegistry::new();
    let int = QualType::unqualified(reg.type_int);
    let uint = QualType::unqualified(reg.type_int_unsigned);
    let long = QualType::unqualified(reg.type_long);

    assert!(reg.is_compatible(int, int));
    assert!(!reg.is_compatible(int, uint));
    assert!(!reg.is_compatible(int, long));

    // Qualifier mismatch breaks compatibility at any level
    let const_int = int.with_qualifiers(TypeQualifiers::CONST);
    assert!(!reg.is_compatible(int, const_int));
    let p1 = QualType::unqualified(reg.pointer_to(int));
    let p2 = QualType::unqualified(reg.pointer_to(const_int));
    assert!(!reg.is_compatible(p1, p2));

    // The error type pairs with anything
    let err = reg.error_type();
    assert!(reg.is_compatible(err, long));
    assert!(reg.is_compatible(p1, err));
}

#[test]
fn array_compatibility_permits_unknown_size() {
    let mut reg = TypeRegistry::new();
    let int = QualType::unqualified(reg.type_int);
    let fixed10 = QualType::unqualified(reg.array_of(int, ArraySizeType::Fixed(10)));
    let fixed12 = QualType::unqualified(reg.array_of(int, ArraySizeType::Fixed(12)));
    let open = QualType::unqualified(reg.array_of(int, ArraySizeType::Incomplete));

    assert!(reg.is_compatible(fixed10, open));
    assert!(!reg.is_compatible(fixed10, fixed12));

    // Composite keeps the known size
    assert_eq!(reg.composite(open, fixed10), fixed10);
    assert_eq!(reg.composite(fixed10, open), fixed10);
}

#[test]
fn function_compatibility_matrix() {
    let mut reg = TypeRegistry::new();
    let int = QualType::unqualified(reg.type_int);
    let ch = QualType::unqualified(reg.type_char);
    let double = QualType::unqualified(reg.type_double);

    let proto_int = reg.function_type(int, vec![param(int)], false, true);
    let proto_char = reg.function_type(int, vec![param(ch)], false, true);
    let proto_variadic = reg.function_type(int, vec![param(int)], true, true);
    let old_empty = reg.function_type(int, vec![], false, false);
    let old_int = reg.function_type(
        int,
        vec![FunctionParameter {
            param_type: int,
            name: Some(intern("a")),
        }],
        false,
        false,
    );

    let q = QualType::unqualified;

    // Prototype vs prototype: exact
    assert!(reg.is_compatible(q(proto_int), q(proto_int)));
    assert!(!reg.is_compatible(q(proto_int), q(proto_char)));
    assert!(!reg.is_compatible(q(proto_int), q(proto_variadic)));

    // Old-style vs old-style: return types only
    let old_double = reg.function_type(int, vec![param(double)], false, false);
    assert!(reg.is_compatible(q(old_empty), q(old_double)));

    // Old-style declaration with a prototype definition:
    // int promotes to itself, so int f(); int f(int a) {...} agree
    assert!(reg.is_compatible(q(old_empty), q(proto_int)));
    assert!(reg.is_compatible(q(old_int), q(proto_int)));

    // char does not survive the default argument promotions
    assert!(!reg.is_compatible(q(old_empty), q(proto_char)));

    // A variadic prototype never matches an old-style declaration
    assert!(!reg.is_compatible(q(old_empty), q(proto_variadic)));

    // Composite prefers the prototype
    assert_eq!(reg.composite(q(old_empty), q(proto_int)), q(proto_int));
    assert_eq!(reg.composite(q(proto_int), q(old_empty)), q(proto_int));
}

#[test]
fn integer_promotions() {
    let reg = TypeRegistry::new();
    let q = QualType::unqualified;

    assert_eq!(reg.integer_promote(q(reg.type_char)), q(reg.type_int));
    assert_eq!(reg.integer_promote(q(reg.type_short_unsigned)), q(reg.type_int));
    assert_eq!(reg.integer_promote(q(reg.type_bool)), q(reg.type_int));
    assert_eq!(reg.integer_promote(q(reg.type_int_unsigned)), q(reg.type_int_unsigned));
    assert_eq!(reg.integer_promote(q(reg.type_long)), q(reg.type_long));

    // Promotion drops qualifiers
    let const_int = q(reg.type_int).with_qualifiers(TypeQualifiers::CONST);
    assert_eq!(reg.integer_promote(const_int), q(reg.type_int));

    assert_eq!(reg.default_argument_promote(q(reg.type_float)), q(reg.type_double));
    assert_eq!(reg.default_argument_promote(q(reg.type_char)), q(reg.type_int));
}

#[test]
fn usual_arithmetic_conversions() {
    let reg = TypeRegistry::new();
    let q = QualType::unqualified;
    let uac = |a, b| reg.usual_arithmetic_conversion(q(a), q(b));

    // Floating point dominates
    assert_eq!(uac(reg.type_int, reg.type_double), q(reg.type_double));
    assert_eq!(uac(reg.type_float, reg.type_long), q(reg.type_float));
    assert_eq!(uac(reg.type_long_double, reg.type_double), q(reg.type_long_double));

    // Sub-int operands promote first
    assert_eq!(uac(reg.type_char, reg.type_char), q(reg.type_int));
    assert_eq!(uac(reg.type_short, reg.type_int_unsigned), q(reg.type_int_unsigned));

    // Same rank, mixed signedness: unsigned wins
    assert_eq!(uac(reg.type_int, reg.type_int_unsigned), q(reg.type_int_unsigned));
    assert_eq!(uac(reg.type_long, reg.type_long_unsigned), q(reg.type_long_unsigned));

    // Strictly wider signed type absorbs the unsigned operand
    assert_eq!(uac(reg.type_int_unsigned, reg.type_long), q(reg.type_long));

    // Signed rank above unsigned but same width: unsigned counterpart
    assert_eq!(
        uac(reg.type_long_long, reg.type_long_unsigned),
        q(reg.type_long_long_unsigned)
    );
}

#[test]
fn scalar_and_array_layout() {
    let mut reg = TypeRegistry::new();
    assert_eq!(reg.size_of(reg.type_char), Some(1));
    assert_eq!(reg.size_of(reg.type_short), Some(2));
    assert_eq!(reg.size_of(reg.type_int), Some(4));
    assert_eq!(reg.size_of(reg.type_long), Some(8));
    assert_eq!(reg.size_of(reg.type_float), Some(4));
    assert_eq!(reg.size_of(reg.type_double), Some(8));
    assert_eq!(reg.size_of(reg.type_void), None);

    let int = QualType::unqualified(reg.type_int);
    let ptr = reg.pointer_to(int);
    assert_eq!(reg.size_of(ptr), Some(8));
    assert_eq!(reg.align_of(ptr), Some(8));

    let arr = reg.array_of(int, ArraySizeType::Fixed(10));
    assert_eq!(reg.size_of(arr), Some(40));
    assert_eq!(reg.align_of(arr), Some(4));

    let open = reg.array_of(int, ArraySizeType::Incomplete);
    assert_eq!(reg.size_of(open), None);
}

#[test]
fn struct_layout_pads_members_and_tail() {
    let mut reg = TypeRegistry::new();
    let ch = QualType::unqualified(reg.type_char);
    let int = QualType::unqualified(reg.type_int);

    // struct { char c; int n; char d; } -> c@0, n@4, d@8, size 12
    let rec = reg.declare_record(Some(intern("s")), false);
    reg.complete_record(rec, vec![member("c", ch), member("n", int), member("d", ch)]);
    assert_eq!(reg.size_of(rec), Some(12));
    assert_eq!(reg.align_of(rec), Some(4));
    assert_eq!(reg.field_layout(rec, 0).unwrap().offset, 0);
    assert_eq!(reg.field_layout(rec, 1).unwrap().offset, 4);
    assert_eq!(reg.field_layout(rec, 2).unwrap().offset, 8);
}

#[test]
fn union_layout_overlays_members() {
    let mut reg = TypeRegistry::new();
    let ch = QualType::unqualified(reg.type_char);
    let long = QualType::unqualified(reg.type_long);

    let u = reg.declare_record(Some(intern("u")), true);
    reg.complete_record(u, vec![member("c", ch), member("l", long)]);
    assert_eq!(reg.size_of(u), Some(8));
    assert_eq!(reg.align_of(u), Some(8));
    assert_eq!(reg.field_layout(u, 0).unwrap().offset, 0);
    assert_eq!(reg.field_layout(u, 1).unwrap().offset, 0);
}

#[test]
fn bit_fields_share_storage_units() {
    let mut reg = TypeRegistry::new();
    let uint = QualType::unqualified(reg.type_int_unsigned);

    // struct { unsigned a:3; unsigned b:5; unsigned c:7; } -> one int unit
    let rec = reg.declare_record(None, false);
    reg.complete_record(
        rec,
        vec![
            bit_member(Some("a"), uint, 3),
            bit_member(Some("b"), uint, 5),
            bit_member(Some("c"), uint, 7),
        ],
    );
    assert_eq!(reg.size_of(rec), Some(4));
    let b = reg.field_layout(rec, 1).unwrap();
    assert_eq!(b.offset, 0);
    assert_eq!(b.bit.unwrap().bit_offset, 3);
    let c = reg.field_layout(rec, 2).unwrap();
    assert_eq!(c.bit.unwrap().bit_offset, 8);
}

#[test]
fn bit_fields_overflow_into_new_unit() {
    let mut reg = TypeRegistry::new();
    let int = QualType::unqualified(reg.type_int);

    // struct { int a:30; int b:4; } -> b does not fit, size 8
    let rec = reg.declare_record(None, false);
    reg.complete_record(rec, vec![bit_member(Some("a"), int, 30), bit_member(Some("b"), int, 4)]);
    assert_eq!(reg.size_of(rec), Some(8));
    let b = reg.field_layout(rec, 1).unwrap();
    assert_eq!(b.offset, 4);
    assert_eq!(b.bit.unwrap().bit_offset, 0);
}

#[test]
fn bit_fields_of_different_declared_size_split_units() {
    let mut reg = TypeRegistry::new();
    let ch = QualType::unqualified(reg.type_char);
    let short = QualType::unqualified(reg.type_short);

    // struct { char a:1; short b:1; } -> char unit at 0, short unit at 2
    let rec = reg.declare_record(None, false);
    reg.complete_record(rec, vec![bit_member(Some("a"), ch, 1), bit_member(Some("b"), short, 1)]);
    assert_eq!(reg.size_of(rec), Some(4));
    assert_eq!(reg.field_layout(rec, 0).unwrap().offset, 0);
    assert_eq!(reg.field_layout(rec, 1).unwrap().offset, 2);
}

#[test]
fn zero_width_bit_field_closes_the_unit() {
    let mut reg = TypeRegistry::new();
    let ch = QualType::unqualified(reg.type_char);

    // struct { char a:4; char :0; char b:4; } -> b starts a fresh byte
    let rec = reg.declare_record(None, false);
    reg.complete_record(
        rec,
        vec![
            bit_member(Some("a"), ch, 4),
            bit_member(None, ch, 0),
            bit_member(Some("b"), ch, 4),
        ],
    );
    assert_eq!(reg.size_of(rec), Some(2));
    let b = reg.field_layout(rec, 2).unwrap();
    assert_eq!(b.offset, 1);
    assert_eq!(b.bit.unwrap().bit_offset, 0);
}

#[test]
fn flexible_array_member_adds_no_size() {
    let mut reg = TypeRegistry::new();
    let int = QualType::unqualified(reg.type_int);
    let ch = QualType::unqualified(reg.type_char);

    let flexible = QualType::unqualified(reg.array_of(ch, ArraySizeType::Incomplete));
    let rec = reg.declare_record(Some(intern("buf")), false);
    reg.complete_record(rec, vec![member("len", int), member("data", flexible)]);
    assert_eq!(reg.size_of(rec), Some(4));
    assert_eq!(reg.field_layout(rec, 1).unwrap().offset, 4);
}

#[test]
fn incomplete_types_have_no_layout() {
    let mut reg = TypeRegistry::new();
    let rec = reg.declare_record(Some(intern("node")), false);
    assert!(!reg.is_complete(rec));
    assert_eq!(reg.size_of(rec), None);

    // Completing a record makes sizeof well defined
    let int = QualType::unqualified(reg.type_int);
    reg.complete_record(rec, vec![member("v", int)]);
    assert!(reg.is_complete(rec));
    assert_eq!(reg.size_of(rec), Some(4));

    let e = reg.declare_enum(Some(intern("color")));
    assert_eq!(reg.size_of(e), None);
    reg.complete_enum(
        e,
        vec![EnumConstant {
            name: intern("red"),
            value: 0,
            span: SourceSpan::default(),
        }],
    );
    assert_eq!(reg.size_of(e), Some(4));
}

#[test]
fn self_referential_record_through_pointer_has_layout() {
    let mut reg = TypeRegistry::new();
    let rec = reg.declare_record(Some(intern("node")), false);
    let self_ptr = QualType::unqualified(reg.pointer_to(QualType::unqualified(rec)));
    let int = QualType::unqualified(reg.type_int);
    reg.complete_record(rec, vec![member("value", int), member("next", self_ptr)]);
    assert_eq!(reg.size_of(rec), Some(16));
    assert_eq!(reg.field_layout(rec, 1).unwrap().offset, 8);
}

#[test]
fn decay_produces_pointers() {
    let mut reg = TypeRegistry::new();
    let int = QualType::unqualified(reg.type_int);

    let arr = QualType::unqualified(reg.array_of(int, ArraySizeType::Fixed(4)));
    let decayed = reg.decay(arr);
    assert_eq!(reg.pointee_of(decayed.ty), Some(int));

    let func = reg.function_type(int, vec![], false, true);
    let fdecayed = reg.decay(QualType::unqualified(func));
    assert_eq!(reg.pointee_of(fdecayed.ty).map(|p| p.ty), Some(func));

    // Bracket qualifiers become qualifiers of the decayed pointer:
    // f(int a[const]) takes an int *const
    let qual_arr = QualType::unqualified(reg.param_array_of(int, ArraySizeType::Incomplete, false, TypeQualifiers::CONST));
    let qdecayed = reg.decay(qual_arr);
    assert!(qdecayed.is_const());
    assert_eq!(reg.pointee_of(qdecayed.ty), Some(int));
}
