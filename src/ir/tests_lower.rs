use crate::ast::Ast;
use crate::context::CompilationContext;
use crate::lexer::Lexer;
use crate::parser::Parser;

use super::lower::lower_unit;
use super::{BinOp, FloatPoolEntry, Instr, IrFunction, IrUnit, OpWidth, PoolId, SlotId, SlotInfo};

fn lower(input: &str) -> IrUnit {
    let mut ctx = CompilationContext::new();
    let source_id = ctx.sources.add_buffer(input.as_bytes().to_vec(), "test_input");
    let tokens = Lexer::new(ctx.sources.get_buffer(source_id), source_id).tokenize(&mut ctx.diagnostics);
    let mut ast = Ast::new();
    let unit = Parser::new(&mut ctx, &mut ast, &tokens).parse_translation_unit();
    assert!(
        !ctx.diagnostics.has_errors(),
        "unexpected errors for {:?}: {:?}",
        input,
        ctx.diagnostics.diagnostics()
    );
    lower_unit(&mut ctx, &ast, &unit)
}

fn function<'a>(unit: &'a IrUnit, name: &str) -> &'a IrFunction {
    unit.functions
        .iter()
        .find(|f| f.name.as_str() == name)
        .unwrap_or_else(|| panic!("function '{}' was not lowered", name))
}

fn assert_tac(unit: &IrUnit, name: &str, expected: &[&str]) {
    let rendered = function(unit, name).to_string();
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines, expected, "wrong code for '{}'", name);
}

fn first_instr(unit: &IrUnit, name: &str) -> String {
    function(unit, name).instrs[0].to_string()
}

fn only_call(unit: &IrUnit, name: &str) -> (u32, u64, bool) {
    function(unit, name)
        .instrs
        .iter()
        .find_map(|instr| match instr {
            Instr::Call {
                arg_count,
                stack_bytes,
                variadic,
                ..
            } => Some((*arg_count, *stack_bytes, *variadic)),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no call in '{}'", name))
}

// === Straight-line code ===

#[test]
fn sum_of_parameters() {
    let unit = lower("int add(int a, int b) { return a + b; }");
    let add = function(&unit, "add");
    assert!(add.is_global);
    assert_eq!(add.params.len(), 2);
    assert_tac(
        &unit,
        "add",
        &["add:", "  t0 = a addi b", "  returni t0", ".L0:"],
    );
}

#[test]
fn main_returns_zero_when_control_falls_off() {
    let unit = lower("int main(void) { }");
    assert_tac(&unit, "main", &["main:", "  returni $0", ".L0:"]);
}

#[test]
fn division_and_multiply_follow_signedness() {
    let unit = lower(
        r#"
        int sdiv(int a, int b) { return a / b; }
        unsigned udiv(unsigned a, unsigned b) { return a / b; }
        int smod(int a, int b) { return a % b; }
        unsigned umul(unsigned a, unsigned b) { return a * b; }
    "#,
    );
    assert_eq!(first_instr(&unit, "sdiv"), "t0 = a idivi b");
    assert_eq!(first_instr(&unit, "udiv"), "t0 = a divi b");
    assert_eq!(first_instr(&unit, "smod"), "t0 = a mod b");
    assert_eq!(first_instr(&unit, "umul"), "t0 = a muli b");
}

#[test]
fn unary_operators_pick_their_class() {
    let unit = lower(
        r#"
        int neg(int x) { return -x; }
        int flip(int x) { return ~x; }
        double negf(double x) { return -x; }
    "#,
    );
    assert_eq!(first_instr(&unit, "neg"), "t0 = minusi x");
    assert_eq!(first_instr(&unit, "flip"), "t0 = not x");
    assert_eq!(first_instr(&unit, "negf"), "t0 = minusf x");
}

#[test]
fn enum_constants_lower_as_immediates() {
    let unit = lower("enum color { RED, GREEN, BLUE }; int green(void) { return GREEN; }");
    assert_tac(&unit, "green", &["green:", "  returni $1", ".L0:"]);
}

#[test]
fn comma_evaluates_left_for_effects_only() {
    let unit = lower("int second(int a, int b) { return (a = b, a); }");
    assert_tac(
        &unit,
        "second",
        &["second:", "  a = b", "  returni a", ".L0:"],
    );
}

// === Control flow ===

#[test]
fn while_loop_tests_at_the_top() {
    let unit = lower("void count(int n) { while (n) n = n - 1; }");
    assert_tac(
        &unit,
        "count",
        &[
            "count:",
            ".L1:",
            "  iffalsei n goto .L2",
            "  t0 = n subi $1",
            "  n = t0",
            "  goto .L1",
            ".L2:",
            ".L0:",
        ],
    );
}

#[test]
fn do_while_tests_at_the_bottom() {
    let unit = lower("void drain(int n) { do n = n - 1; while (n); }");
    assert_tac(
        &unit,
        "drain",
        &[
            "drain:",
            ".L1:",
            "  t0 = n subi $1",
            "  n = t0",
            ".L2:",
            "  ifi n goto .L1",
            ".L3:",
            ".L0:",
        ],
    );
}

#[test]
fn comparison_fuses_into_the_branch() {
    let unit = lower("int max(int a, int b) { if (a < b) return b; return a; }");
    assert_tac(
        &unit,
        "max",
        &[
            "max:",
            "  iffalsei a < b goto .L1",
            "  returni b",
            ".L1:",
            "  returni a",
            ".L0:",
        ],
    );
}

#[test]
fn constant_true_condition_drops_the_test() {
    let unit = lower("void wait(int n) { while (1) { if (n) break; } }");
    assert_tac(
        &unit,
        "wait",
        &[
            "wait:",
            ".L1:",
            "  iffalsei n goto .L3",
            "  goto .L2",
            ".L3:",
            "  goto .L1",
            ".L2:",
            ".L0:",
        ],
    );
}

#[test]
fn for_loop_stores_through_a_scaled_subscript() {
    let unit = lower(
        r#"
        void fill(int *p, int n) {
            int i;
            for (i = 0; i < n; i = i + 1)
                p[i] = i;
        }
    "#,
    );
    assert_tac(
        &unit,
        "fill",
        &[
            "fill:",
            "  i = $0",
            ".L1:",
            "  iffalsei i < n goto .L3",
            "  t0 = (si4=>si8) i",
            "  t1 = t0 imuli $4",
            "  p[t1] = i",
            ".L2:",
            "  t2 = i addi $1",
            "  i = t2",
            "  goto .L1",
            ".L3:",
            ".L0:",
        ],
    );
}

#[test]
fn continue_jumps_to_the_step_label() {
    let unit = lower(
        r#"
        void skip(int n) {
            int i;
            for (i = 0; i < n; i = i + 1) {
                if (i == 2)
                    continue;
            }
        }
    "#,
    );
    assert_tac(
        &unit,
        "skip",
        &[
            "skip:",
            "  i = $0",
            ".L1:",
            "  iffalsei i < n goto .L3",
            "  iffalsei i == $2 goto .L4",
            "  goto .L2",
            ".L4:",
            ".L2:",
            "  t0 = i addi $1",
            "  i = t0",
            "  goto .L1",
            ".L3:",
            ".L0:",
        ],
    );
}

#[test]
fn goto_shares_labels_with_the_definition() {
    let unit = lower(
        r#"
        int spin(void) {
            int i;
            i = 0;
        top:
            i = i + 1;
            if (i < 3) goto top;
            return i;
        }
    "#,
    );
    assert_tac(
        &unit,
        "spin",
        &[
            "spin:",
            "  i = $0",
            ".L1:",
            "  t0 = i addi $1",
            "  i = t0",
            "  iffalsei i < $3 goto .L2",
            "  goto .L1",
            ".L2:",
            "  returni i",
            ".L0:",
        ],
    );
}

#[test]
fn labels_number_one_stream_across_functions() {
    let unit = lower(
        r#"
        int pos(int x) { if (x > 0) return 1; return 0; }
        int nonzero(int x) { if (x) return 1; return 0; }
    "#,
    );
    assert_tac(
        &unit,
        "pos",
        &[
            "pos:",
            "  iffalsei x > $0 goto .L1",
            "  returni $1",
            ".L1:",
            "  returni $0",
            ".L0:",
        ],
    );
    assert_tac(
        &unit,
        "nonzero",
        &[
            "nonzero:",
            "  iffalsei x goto .L3",
            "  returni $1",
            ".L3:",
            "  returni $0",
            ".L2:",
        ],
    );
}

// === Boolean values ===

#[test]
fn relational_value_materializes_zero_or_one() {
    let unit = lower("int lt(int a, int b) { return a < b; }");
    assert_tac(
        &unit,
        "lt",
        &[
            "lt:",
            "  t0 = $1",
            "  ifi a < b goto .L1",
            "  t0 = $0",
            ".L1:",
            "  returni t0",
            ".L0:",
        ],
    );
}

#[test]
fn logical_operators_short_circuit() {
    let unit = lower(
        r#"
        int both(int a, int b) { return a && b; }
        int either(int a, int b) { return a || b; }
    "#,
    );
    assert_tac(
        &unit,
        "both",
        &[
            "both:",
            "  t0 = $1",
            "  iffalsei a goto .L2",
            "  ifi b goto .L1",
            ".L2:",
            "  t0 = $0",
            ".L1:",
            "  returni t0",
            ".L0:",
        ],
    );
    assert_tac(
        &unit,
        "either",
        &[
            "either:",
            "  t0 = $1",
            "  ifi a goto .L4",
            "  ifi b goto .L4",
            "  t0 = $0",
            ".L4:",
            "  returni t0",
            ".L3:",
        ],
    );
}

#[test]
fn logical_not_flips_the_branch_sense() {
    let unit = lower("int no(int x) { return !x; }");
    assert_tac(
        &unit,
        "no",
        &[
            "no:",
            "  t0 = $1",
            "  iffalsei x goto .L1",
            "  t0 = $0",
            ".L1:",
            "  returni t0",
            ".L0:",
        ],
    );
}

#[test]
fn bool_conversion_normalizes_to_zero_or_one() {
    let unit = lower("_Bool truthy(int x) { return x; }");
    assert_tac(
        &unit,
        "truthy",
        &[
            "truthy:",
            "  t0 = $1",
            "  ifi x goto .L1",
            "  t0 = $0",
            ".L1:",
            "  returni t0",
            ".L0:",
        ],
    );
}

#[test]
fn conditional_expression_joins_in_one_temporary() {
    let unit = lower("int pick(int c, int x, int y) { return c ? x : y; }");
    assert_tac(
        &unit,
        "pick",
        &[
            "pick:",
            "  iffalsei c goto .L1",
            "  t0 = x",
            "  goto .L2",
            ".L1:",
            "  t0 = y",
            ".L2:",
            "  returni t0",
            ".L0:",
        ],
    );
}

// === Pointers and places ===

#[test]
fn subscript_scales_the_index_by_element_size() {
    let unit = lower("int get(int *p, int i) { return p[i]; }");
    assert_tac(
        &unit,
        "get",
        &[
            "get:",
            "  t0 = (si4=>si8) i",
            "  t1 = t0 imuli $4",
            "  returni p[t1]",
            ".L0:",
        ],
    );
}

#[test]
fn pointer_offset_folds_constant_indices() {
    let unit = lower("int *third(int *p) { return p + 2; }");
    assert_tac(
        &unit,
        "third",
        &["third:", "  t0 = p addi $8", "  returni t0", ".L0:"],
    );
}

#[test]
fn pointer_difference_divides_by_element_size() {
    let unit = lower("long gap(int *a, int *b) { return a - b; }");
    assert_tac(
        &unit,
        "gap",
        &[
            "gap:",
            "  t0 = a subi b",
            "  t1 = t0 idivi $4",
            "  returni t1",
            ".L0:",
        ],
    );
}

#[test]
fn address_of_and_indirection() {
    let unit = lower("int through(int x) { int *p; p = &x; return *p; }");
    assert_tac(
        &unit,
        "through",
        &["through:", "  p = &x", "  returni *p", ".L0:"],
    );
}

#[test]
fn post_increment_returns_the_old_value() {
    let unit = lower("int bump_get(int *p) { return (*p)++; }");
    assert_tac(
        &unit,
        "bump_get",
        &[
            "bump_get:",
            "  t0 = *p",
            "  t1 = *p addi $1",
            "  *p = t1",
            "  returni t0",
            ".L0:",
        ],
    );
}

#[test]
fn pre_decrement_returns_the_new_value() {
    let unit = lower("int drop_get(int x) { return --x; }");
    assert_tac(
        &unit,
        "drop_get",
        &[
            "drop_get:",
            "  t0 = x subi $1",
            "  x = t0",
            "  returni t0",
            ".L0:",
        ],
    );
}

// === Conversions ===

#[test]
fn conversions_carry_source_and_target_widths() {
    let unit = lower(
        r#"
        long widen(int x) { return x; }
        unsigned char narrow(unsigned long v) { return v; }
        double promote(int x) { return x; }
    "#,
    );
    assert_eq!(first_instr(&unit, "widen"), "t0 = (si4=>si8) x");
    assert_eq!(first_instr(&unit, "narrow"), "t0 = (ui8=>ui1) v");
    assert_tac(
        &unit,
        "promote",
        &["promote:", "  t0 = (si4=>f8) x", "  returnf t0", ".L2:"],
    );
}

#[test]
fn compound_assignment_widens_through_the_operation_type() {
    let unit = lower("void bump(char *c) { *c += 1; }");
    assert_tac(
        &unit,
        "bump",
        &[
            "bump:",
            "  t0 = (si1=>si4) *c",
            "  t1 = t0 addi $1",
            "  t2 = (si4=>si1) t1",
            "  *c = t2",
            ".L0:",
        ],
    );
}

// === Literal pools ===

#[test]
fn float_literals_pool_by_bit_pattern() {
    let unit = lower("double mix(float f) { return f + 1.5; }");
    assert_tac(
        &unit,
        "mix",
        &[
            "mix:",
            "  t0 = (f4=>f8) f",
            "  t1 = t0 addf .LC0",
            "  returnf t1",
            ".L0:",
        ],
    );
    assert_eq!(
        unit.floats,
        vec![(
            PoolId(0),
            FloatPoolEntry {
                bits: 1.5f64.to_bits(),
                is_single: false,
            }
        )]
    );
}

#[test]
fn single_precision_literals_pool_as_four_bytes() {
    let unit = lower("float quarter(void) { return 0.25f; }");
    assert_tac(&unit, "quarter", &["quarter:", "  returnf .LC0", ".L0:"]);
    assert_eq!(
        unit.floats,
        vec![(
            PoolId(0),
            FloatPoolEntry {
                bits: 0.25f32.to_bits() as u64,
                is_single: true,
            }
        )]
    );
}

#[test]
fn identical_string_literals_pool_once() {
    let unit = lower(
        r#"
        const char *first_name(void) { return "kolak"; }
        const char *second_name(void) { return "kolak"; }
    "#,
    );
    assert_tac(&unit, "first_name", &["first_name:", "  returni .LC0", ".L0:"]);
    assert_tac(&unit, "second_name", &["second_name:", "  returni .LC0", ".L1:"]);
    assert_eq!(unit.strings.len(), 1);
    assert_eq!(unit.strings[0].1.as_str(), "kolak");
}

#[test]
fn strings_and_floats_share_one_label_counter() {
    let unit = lower(
        r#"
        double tagged(void) {
            const char *s;
            s = "tag";
            return 2.5;
        }
    "#,
    );
    assert_tac(
        &unit,
        "tagged",
        &["tagged:", "  s = .LC0", "  returnf .LC1", ".L0:"],
    );
    assert_eq!(unit.strings[0].0, PoolId(0));
    assert_eq!(unit.floats[0].0, PoolId(1));
}

// === Calls ===

#[test]
fn arguments_stage_immediately_before_the_call() {
    let unit = lower(
        r#"
        int compute(int a, int b);
        int wrap(int x) { return compute(x, 3); }
    "#,
    );
    assert_tac(
        &unit,
        "wrap",
        &[
            "wrap:",
            "  t0 = x",
            "  param t0",
            "  param $3",
            "  t1 = call compute, 2",
            "  returni t1",
            ".L0:",
        ],
    );
    assert_eq!(only_call(&unit, "wrap"), (2, 0, false));
}

#[test]
fn variadic_calls_report_their_shape() {
    let unit = lower(
        r#"
        int printf(const char *fmt, ...);
        int hello(void) { return printf("hi %d", 5); }
    "#,
    );
    assert_tac(
        &unit,
        "hello",
        &[
            "hello:",
            "  param .LC0",
            "  param $5",
            "  t0 = call printf, 2",
            "  returni t0",
            ".L0:",
        ],
    );
    assert_eq!(only_call(&unit, "hello"), (2, 0, true));
    assert_eq!(unit.strings[0].1.as_str(), "hi %d");
}

#[test]
fn aggregate_arguments_pass_by_address() {
    let unit = lower(
        r#"
        struct pair { long a; long b; };
        long total(struct pair p);
        long use_pair(struct pair p) { return total(p); }
    "#,
    );
    assert_tac(
        &unit,
        "use_pair",
        &[
            "use_pair:",
            "  param &p",
            "  t0 = call total, 1",
            "  returni t0",
            ".L0:",
        ],
    );
    assert_eq!(only_call(&unit, "use_pair"), (1, 16, false));
    assert_eq!(function(&unit, "use_pair").max_outgoing, 16);
}

#[test]
fn aggregate_call_results_land_in_a_slot() {
    let unit = lower(
        r#"
        struct pair { long a; long b; };
        struct pair make(void);
        long first(void) {
            struct pair p;
            p = make();
            return p.a;
        }
    "#,
    );
    assert_tac(
        &unit,
        "first",
        &[
            "first:",
            "  param &s0",
            "  call make, 1",
            "  t0 = &p",
            "  t1 = &s0",
            "  t2 = *t1",
            "  *t0 = t2",
            "  t3 = t1[$8]",
            "  t0[$8] = t3",
            "  returni p",
            ".L0:",
        ],
    );
    assert_eq!(function(&unit, "first").slots, vec![SlotInfo { size: 16, align: 8 }]);
}

#[test]
fn returning_an_aggregate_copies_through_the_saved_pointer() {
    let unit = lower(
        r#"
        struct pair { long a; long b; };
        struct pair dup(struct pair p) { return p; }
    "#,
    );
    assert_tac(
        &unit,
        "dup",
        &[
            "dup:",
            "  t0 = s0",
            "  t1 = &p",
            "  t2 = *t1",
            "  *t0 = t2",
            "  t3 = t1[$8]",
            "  t0[$8] = t3",
            "  returni s0",
            ".L0:",
        ],
    );
    assert_eq!(function(&unit, "dup").sret_slot, Some(SlotId(0)));
}

// === Aggregates and bit-fields ===

#[test]
fn struct_assignment_copies_in_chunks() {
    let unit = lower(
        r#"
        struct pair { long a; long b; };
        void copy(struct pair *d, struct pair *s) { *d = *s; }
    "#,
    );
    assert_tac(
        &unit,
        "copy",
        &[
            "copy:",
            "  t0 = *s",
            "  *d = t0",
            "  t1 = s[$8]",
            "  d[$8] = t1",
            ".L0:",
        ],
    );
}

#[test]
fn odd_sized_copies_step_down_chunk_widths() {
    let unit = lower(
        r#"
        struct odd { char b[11]; };
        void blit(struct odd *d, struct odd *s) { *d = *s; }
    "#,
    );
    let widths: Vec<OpWidth> = function(&unit, "blit")
        .instrs
        .iter()
        .filter_map(|instr| match instr {
            Instr::Assign { width, .. } => Some(*width),
            _ => None,
        })
        .collect();
    assert_eq!(
        widths,
        [OpWidth::Q, OpWidth::Q, OpWidth::W, OpWidth::W, OpWidth::B, OpWidth::B]
    );
}

#[test]
fn bit_field_load_shifts_and_extends() {
    let unit = lower(
        r#"
        struct flags { unsigned a : 3; unsigned b : 5; };
        unsigned read_b(struct flags f) { return f.b; }
    "#,
    );
    assert_tac(
        &unit,
        "read_b",
        &[
            "read_b:",
            "  t0 = f",
            "  t1 = t0 lshift $24",
            "  t2 = t1 rshift $27",
            "  returni t2",
            ".L0:",
        ],
    );
}

#[test]
fn signed_bit_fields_extend_with_the_sign() {
    let unit = lower(
        r#"
        struct pixel { int v : 8; int w : 8; };
        int read_w(struct pixel q) { return q.w; }
    "#,
    );
    let signed_shift = function(&unit, "read_w")
        .instrs
        .iter()
        .find_map(|instr| match instr {
            Instr::Bin {
                op: BinOp::RShift,
                is_signed,
                ..
            } => Some(*is_signed),
            _ => None,
        })
        .expect("no right shift in read_w");
    assert!(signed_shift);
}

#[test]
fn bit_field_store_masks_and_merges() {
    let unit = lower(
        r#"
        struct flags { unsigned a : 3; unsigned b : 5; };
        void write_b(struct flags *f, unsigned v) { f->b = v; }
    "#,
    );
    assert_tac(
        &unit,
        "write_b",
        &[
            "write_b:",
            "  t0 = *f",
            "  t1 = t0 and $-249",
            "  t2 = v and $31",
            "  t3 = t2 lshift $3",
            "  t4 = t1 or t3",
            "  *f = t4",
            ".L0:",
        ],
    );
}
