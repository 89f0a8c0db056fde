//! AT&T-syntax x86-64 assembly emission.
//!
//! The emitter walks the lowered unit one instruction at a time and
//! produces textual assembly, leaning on the allocator's guarantees:
//! every pool register is dead at every call site, a result may share
//! its left operand's register but never its right operand's, and
//! anything live across a call is already homed on the stack. `%rax`,
//! `%rcx`, and `%rdx` (plus `%xmm0`/`%xmm1`) stay out of the pools and
//! serve as fixed scratch for address materialization, division,
//! shift counts, and spilled staging.
//!
//! Output is gathered in four buffers, one per section, and joined at
//! the end: `.text` for code, `.rodata` for the literal pools,
//! `.data` for initialized definitions, and common directives for
//! tentative ones. Global initializers are evaluated here rather than
//! lowered; the declarator parser has already confirmed each one is an
//! arithmetic constant or an address constant, so evaluation cannot
//! fail once the unit is error free.
//!
//! Branch labels come from lowering as `.L<n>`; sequences the emitter
//! expands itself (unsigned-to-float conversion, unordered-compare
//! skips) draw from a separate `.LE<n>` counter so the two never
//! collide. String and float literals share the `.LC<n>` pool counter
//! started during lowering, extended here for strings that only occur
//! in global initializers.

use std::fmt::Write;
use std::mem;

use hashbrown::HashMap;

use crate::ast::{Ast, BinaryOp, NodeKind, NodeRef, TranslationUnit, UnaryOp};
use crate::context::CompilationContext;
use crate::intern::StringId;
use crate::ir::{
    ArgClass, BinOp, ConvOp, FloatPoolEntry, Instr, IrFunction, IrUnit, LabelId, OpClass, OpWidth,
    Operand, PoolId, RelOp, SlotId, UnOp, Value,
};
use crate::lexer;
use crate::regalloc::{Allocation, FLOAT_ARGS, INT_ARGS, Location, Reg, allocate_function, round_up};
use crate::semantic::{
    ArraySizeType, DefinitionState, QualType, ScopeId, StructMember, SymbolEntryRef, SymbolKind,
    TypeKind, TypeRef,
};

#[cfg(test)]
mod tests_emit;

/// Append one line of assembly to a section buffer. Writing to a
/// `String` cannot fail, so the `fmt` plumbing is discarded.
macro_rules! asm {
    ($buf:expr, $($arg:tt)*) => {{
        let _ = writeln!($buf, $($arg)*);
    }};
}

/// Scratch registers for resolving an instruction's first operand.
const LHS_SCRATCH: [Reg; 2] = [Reg::Rax, Reg::Rcx];
/// Scratch registers for the second operand. Disjoint from `%rax` so a
/// value staged there survives the second resolution.
const RHS_SCRATCH: [Reg; 2] = [Reg::Rcx, Reg::Rdx];

pub fn emit_unit(
    ctx: &mut CompilationContext,
    ast: &Ast,
    unit: &TranslationUnit,
    ir: &IrUnit,
) -> String {
    let mut emitter = Emitter::new(ctx, ast, unit, ir);
    for function in &ir.functions {
        emitter.emit_function(function);
    }
    emitter.emit_globals();
    emitter.emit_pools(ir);
    emitter.finish()
}

/// A fully evaluated static initializer leaf.
enum DataValue {
    Int(i64),
    Float { bits: u64, is_single: bool },
    /// A static object's address plus a byte offset. An empty label is
    /// an absolute address, from an integer cast to a pointer.
    Addr { label: String, offset: i64 },
}

enum PoolData {
    Str(StringId),
    Float(FloatPoolEntry),
}

struct Emitter<'a> {
    ctx: &'a mut CompilationContext,
    ast: &'a Ast,
    unit: &'a TranslationUnit,
    text: String,
    rodata: String,
    data: String,
    bss: String,
    /// Next `.LE<n>` label for emitter-expanded sequences.
    next_scratch: u32,
    /// Next `.LC<n>` id, continuing past the lowering pools.
    next_pool: u32,
    /// Strings pooled while serializing global initializers.
    extra_strings: Vec<(PoolId, StringId)>,
    /// Spelling to pool id, seeded from the lowering pool so a literal
    /// used both in code and in an initializer gets one entry.
    string_ids: HashMap<StringId, PoolId>,
    /// Assembly-local labels for block-scope statics.
    static_labels: HashMap<SymbolEntryRef, String>,
    /// Present while a function body is being emitted.
    allocation: Option<Allocation>,
    /// Arguments staged by `Param` instructions for the next `Call`.
    pending: Vec<(ArgClass, OpWidth, Operand)>,
}

impl<'a> Emitter<'a> {
    fn new(
        ctx: &'a mut CompilationContext,
        ast: &'a Ast,
        unit: &'a TranslationUnit,
        ir: &IrUnit,
    ) -> Emitter<'a> {
        let string_ids = ir.strings.iter().map(|&(id, spelling)| (spelling, id)).collect();
        let mut static_labels = HashMap::new();
        for &sym in &unit.static_locals {
            let name = ctx.symbols.entry(sym).name;
            static_labels.insert(sym, format!(".L{}.{}", name, sym.index()));
        }
        Emitter {
            ctx,
            ast,
            unit,
            text: String::new(),
            rodata: String::new(),
            data: String::new(),
            bss: String::new(),
            next_scratch: 0,
            next_pool: (ir.strings.len() + ir.floats.len()) as u32,
            extra_strings: Vec::new(),
            string_ids,
            static_labels,
            allocation: None,
            pending: Vec::new(),
        }
    }

    fn finish(self) -> String {
        let mut out = self.text;
        out.push_str(&self.rodata);
        out.push_str(&self.data);
        out.push_str(&self.bss);
        asm!(out, "\t.ident\t\"kolak {}\"", env!("CARGO_PKG_VERSION"));
        out
    }

    fn allocation(&self) -> &Allocation {
        self.allocation.as_ref().expect("emitting outside a function")
    }

    fn location(&self, temp: crate::ir::TempId) -> Location {
        self.allocation().location(temp)
    }

    fn slot_offset(&self, slot: SlotId) -> i64 {
        self.allocation().frame.slot_offsets[slot.0 as usize]
    }

    fn scratch_label(&mut self) -> u32 {
        let id = self.next_scratch;
        self.next_scratch += 1;
        id
    }

    // === Functions ===

    fn emit_function(&mut self, function: &IrFunction) {
        self.allocation = Some(allocate_function(self.ctx, function));

        if self.text.is_empty() {
            asm!(self.text, "\t.text");
        }
        if function.is_global {
            asm!(self.text, "\t.globl\t{}", function.name);
        }
        asm!(self.text, "{}:", function.name);
        asm!(self.text, "\tpushq\t%rbp");
        asm!(self.text, "\tmovq\t%rsp, %rbp");
        let frame_size = self.allocation().frame.frame_size;
        if frame_size > 0 {
            asm!(self.text, "\tsubq\t${}, %rsp", frame_size);
        }
        let reg_params = self.allocation().frame.reg_params.clone();
        for (register, width, home) in reg_params {
            if register.is_float() {
                asm!(self.text, "\t{}\t{}, {}(%rbp)", fmov(width), register.name(width), home);
            } else {
                asm!(
                    self.text,
                    "\tmov{}\t{}, {}(%rbp)",
                    width.suffix(),
                    register.name(width),
                    home
                );
            }
        }

        for index in 0..function.instrs.len() {
            let next_label = match function.instrs.get(index + 1) {
                Some(Instr::Label(label)) => Some(*label),
                _ => None,
            };
            match &function.instrs[index] {
                Instr::Bin {
                    op,
                    width,
                    is_signed,
                    result,
                    lhs,
                    rhs,
                } => self.emit_bin(*op, *width, *is_signed, result, lhs, rhs),
                Instr::Un {
                    op,
                    width,
                    result,
                    value,
                } => self.emit_un(*op, *width, result, value),
                Instr::Assign {
                    class,
                    width,
                    target,
                    value,
                } => self.emit_assign(*class, *width, target, value),
                Instr::Conv {
                    op,
                    from_width,
                    to_width,
                    result,
                    value,
                } => self.emit_conv(*op, *from_width, *to_width, result, value),
                Instr::Param { class, width, value } => {
                    self.pending.push((*class, *width, *value));
                }
                Instr::Call {
                    result,
                    class,
                    width,
                    target,
                    arg_count,
                    stack_bytes,
                    variadic,
                } => self.emit_call(result.as_ref(), *class, *width, target, *arg_count, *stack_bytes, *variadic),
                Instr::If {
                    class,
                    when_false,
                    width,
                    is_signed,
                    lhs,
                    test,
                    target,
                } => match class {
                    OpClass::Int => self.emit_if_int(*when_false, *width, *is_signed, lhs, test.as_ref(), *target),
                    OpClass::Float => self.emit_if_float(*when_false, *width, lhs, test.as_ref(), *target),
                },
                Instr::Return { class, width, value } => {
                    if let Some(value) = value {
                        match class {
                            OpClass::Int => {
                                let src = self.resolve(value, *width, LHS_SCRATCH);
                                self.mov_int(&src, Reg::Rax.name(*width), *width);
                            }
                            OpClass::Float => {
                                let src = self.resolve(value, *width, LHS_SCRATCH);
                                self.mov_float(&src, "%xmm0", *width);
                            }
                        }
                    }
                    if next_label != Some(function.return_label) {
                        asm!(self.text, "\tjmp\t{}", function.return_label);
                    }
                }
                Instr::Label(label) => {
                    asm!(self.text, "{}:", label);
                }
                Instr::Goto(label) => {
                    if next_label != Some(*label) {
                        asm!(self.text, "\tjmp\t{}", label);
                    }
                }
            }
        }

        asm!(self.text, "\tleave");
        asm!(self.text, "\tret");
        self.allocation = None;
    }

    // === Arithmetic ===

    fn emit_bin(
        &mut self,
        op: BinOp,
        width: OpWidth,
        is_signed: bool,
        result: &Operand,
        lhs: &Operand,
        rhs: &Operand,
    ) {
        match op {
            BinOp::AddF | BinOp::SubF | BinOp::MulF | BinOp::DivF => {
                self.emit_bin_float(op, width, result, lhs, rhs)
            }
            BinOp::DivI | BinOp::IdivI | BinOp::Mod => {
                self.emit_division(op, width, is_signed, result, lhs, rhs)
            }
            BinOp::LShift | BinOp::RShift => self.emit_shift(op, width, is_signed, result, lhs, rhs),
            _ => {
                let mnemonic = match op {
                    BinOp::AddI => "add",
                    BinOp::SubI => "sub",
                    // Two-operand imul computes the same low bits for
                    // both signednesses.
                    BinOp::MulI | BinOp::ImulI => "imul",
                    BinOp::And => "and",
                    BinOp::Or => "or",
                    BinOp::Xor => "xor",
                    _ => unreachable!("handled above"),
                };
                let (dst, home) = self.int_result(result);
                let dst = dst.name(width);
                let src = self.resolve(lhs, width, LHS_SCRATCH);
                self.mov_int(&src, dst, width);
                let src = self.resolve(rhs, width, RHS_SCRATCH);
                asm!(self.text, "\t{}{}\t{}, {}", mnemonic, width.suffix(), src, dst);
                self.flush_int(dst, home, width);
            }
        }
    }

    fn emit_bin_float(&mut self, op: BinOp, width: OpWidth, result: &Operand, lhs: &Operand, rhs: &Operand) {
        let mnemonic = match op {
            BinOp::AddF => "add",
            BinOp::SubF => "sub",
            BinOp::MulF => "mul",
            BinOp::DivF => "div",
            _ => unreachable!("not a float opcode"),
        };
        let (dst, home) = self.float_result(result);
        let dst = dst.name(width);
        let src = self.resolve(lhs, width, LHS_SCRATCH);
        self.mov_float(&src, dst, width);
        let src = self.resolve(rhs, width, RHS_SCRATCH);
        asm!(self.text, "\t{}s{}\t{}, {}", mnemonic, float_suffix(width), src, dst);
        self.flush_float(dst, home, width);
    }

    /// Hardware division pins the dividend to `%rdx:%rax`; the divisor
    /// goes through `%rcx` so neither half is disturbed.
    fn emit_division(
        &mut self,
        op: BinOp,
        width: OpWidth,
        is_signed: bool,
        result: &Operand,
        lhs: &Operand,
        rhs: &Operand,
    ) {
        let signed = match op {
            BinOp::IdivI => true,
            BinOp::DivI => false,
            BinOp::Mod => is_signed,
            _ => unreachable!("not a division opcode"),
        };
        let src = self.resolve(lhs, width, LHS_SCRATCH);
        self.mov_int(&src, Reg::Rax.name(width), width);
        let src = self.resolve(rhs, width, RHS_SCRATCH);
        self.mov_int(&src, Reg::Rcx.name(width), width);
        if signed {
            match width {
                OpWidth::Q => asm!(self.text, "\tcqto"),
                _ => asm!(self.text, "\tcltd"),
            }
        } else {
            asm!(self.text, "\txorl\t%edx, %edx");
        }
        let divide = if signed { "idiv" } else { "div" };
        asm!(self.text, "\t{}{}\t{}", divide, width.suffix(), Reg::Rcx.name(width));
        let from = match op {
            BinOp::Mod => Reg::Rdx,
            _ => Reg::Rax,
        };
        match self.result_location(result) {
            Location::Reg(register) => self.mov_int(from.name(width), register.name(width), width),
            Location::Spill(home) => {
                asm!(self.text, "\tmov{}\t{}, {}(%rbp)", width.suffix(), from.name(width), home);
            }
        }
    }

    fn emit_shift(
        &mut self,
        op: BinOp,
        width: OpWidth,
        is_signed: bool,
        result: &Operand,
        lhs: &Operand,
        rhs: &Operand,
    ) {
        let mnemonic = match op {
            BinOp::LShift => "sal",
            BinOp::RShift if is_signed => "sar",
            BinOp::RShift => "shr",
            _ => unreachable!("not a shift opcode"),
        };
        // The pools never hand out %rcx, so the destination cannot
        // collide with the count register.
        let (dst, home) = self.int_result(result);
        let dst = dst.name(width);
        let src = self.resolve(lhs, width, LHS_SCRATCH);
        self.mov_int(&src, dst, width);
        let count = self.resolve(rhs, width, RHS_SCRATCH);
        if is_imm(&count) {
            asm!(self.text, "\t{}{}\t{}, {}", mnemonic, width.suffix(), count, dst);
        } else {
            self.mov_int(&count, Reg::Rcx.name(width), width);
            asm!(self.text, "\t{}{}\t%cl, {}", mnemonic, width.suffix(), dst);
        }
        self.flush_int(dst, home, width);
    }

    fn emit_un(&mut self, op: UnOp, width: OpWidth, result: &Operand, value: &Operand) {
        match op {
            UnOp::Not | UnOp::MinusI => {
                let mnemonic = if matches!(op, UnOp::Not) { "not" } else { "neg" };
                let (dst, home) = self.int_result(result);
                let dst = dst.name(width);
                let src = self.resolve(value, width, LHS_SCRATCH);
                self.mov_int(&src, dst, width);
                asm!(self.text, "\t{}{}\t{}", mnemonic, width.suffix(), dst);
                self.flush_int(dst, home, width);
            }
            UnOp::MinusF => {
                // Negate as zero minus the value. The result may share
                // the operand's register, so park the operand first.
                let (dst, home) = self.float_result(result);
                let dst = dst.name(width);
                let mut src = self.resolve(value, width, LHS_SCRATCH);
                if src == dst {
                    self.mov_float(&src, "%xmm1", width);
                    src = "%xmm1".to_string();
                }
                let zero = match width {
                    OpWidth::L => "xorps",
                    _ => "xorpd",
                };
                asm!(self.text, "\t{}\t{}, {}", zero, dst, dst);
                asm!(self.text, "\tsubs{}\t{}, {}", float_suffix(width), src, dst);
                self.flush_float(dst, home, width);
            }
        }
    }

    // === Moves ===

    fn emit_assign(&mut self, class: OpClass, width: OpWidth, target: &Operand, value: &Operand) {
        let mut src = self.resolve(value, width, LHS_SCRATCH);
        if !matches!(value, Operand::Direct(_)) {
            // Secure indirect sources before resolving the target,
            // which reuses the same scratch registers.
            src = self.stage(&src, class, width);
        }
        let dst = self.resolve(target, width, RHS_SCRATCH);
        if src == dst {
            return;
        }
        if is_mem(&src) && is_mem(&dst) {
            src = self.stage(&src, class, width);
        }
        match class {
            OpClass::Int => self.mov_int(&src, &dst, width),
            OpClass::Float => self.mov_float(&src, &dst, width),
        }
    }

    /// Copy a value into the fixed staging register of its class and
    /// return that register's name.
    fn stage(&mut self, src: &str, class: OpClass, width: OpWidth) -> String {
        match class {
            OpClass::Int => {
                let reg = Reg::Rax.name(width);
                self.mov_int(src, reg, width);
                reg.to_string()
            }
            OpClass::Float => {
                self.mov_float(src, "%xmm0", width);
                "%xmm0".to_string()
            }
        }
    }

    fn mov_int(&mut self, src: &str, dst: &str, width: OpWidth) {
        if src != dst {
            asm!(self.text, "\tmov{}\t{}, {}", width.suffix(), src, dst);
        }
    }

    fn mov_float(&mut self, src: &str, dst: &str, width: OpWidth) {
        if src == dst {
            return;
        }
        if src.starts_with('%') && dst.starts_with('%') {
            asm!(self.text, "\tmovaps\t{}, {}", src, dst);
        } else {
            asm!(self.text, "\t{}\t{}, {}", fmov(width), src, dst);
        }
    }

    // === Conversions ===

    fn emit_conv(
        &mut self,
        op: ConvOp,
        from_width: OpWidth,
        to_width: OpWidth,
        result: &Operand,
        value: &Operand,
    ) {
        match op {
            ConvOp::SiSi | ConvOp::SiUi | ConvOp::UiSi | ConvOp::UiUi => {
                let signed_source = matches!(op, ConvOp::SiSi | ConvOp::SiUi);
                self.emit_conv_int(signed_source, from_width, to_width, result, value);
            }
            ConvOp::FF => {
                let (dst, home) = self.float_result(result);
                let dst = dst.name(to_width);
                let src = self.resolve(value, from_width, LHS_SCRATCH);
                if from_width == to_width {
                    self.mov_float(&src, dst, to_width);
                } else if to_width == OpWidth::Q {
                    asm!(self.text, "\tcvtss2sd\t{}, {}", src, dst);
                } else {
                    asm!(self.text, "\tcvtsd2ss\t{}, {}", src, dst);
                }
                self.flush_float(dst, home, to_width);
            }
            ConvOp::SiF | ConvOp::UiF => self.emit_int_to_float(op, from_width, to_width, result, value),
            ConvOp::FSi | ConvOp::FUi => self.emit_float_to_int(op, from_width, to_width, result, value),
        }
    }

    fn emit_conv_int(
        &mut self,
        signed_source: bool,
        from_width: OpWidth,
        to_width: OpWidth,
        result: &Operand,
        value: &Operand,
    ) {
        let (dst, home) = self.int_result(result);
        if to_width <= from_width {
            // Narrowing and same-width conversions read the low bytes.
            let src = self.resolve(value, to_width, LHS_SCRATCH);
            self.mov_int(&src, dst.name(to_width), to_width);
            self.flush_int(dst.name(to_width), home, to_width);
            return;
        }
        let src = self.resolve(value, from_width, LHS_SCRATCH);
        match widen_mnemonic(signed_source, from_width, to_width) {
            Some(mnemonic) => {
                asm!(self.text, "\t{}\t{}, {}", mnemonic, src, dst.name(to_width));
            }
            None => {
                // Unsigned 32 to 64: a plain 32-bit move zeroes the
                // upper half.
                self.mov_int(&src, dst.name(OpWidth::L), OpWidth::L);
            }
        }
        self.flush_int(dst.name(to_width), home, to_width);
    }

    fn emit_int_to_float(
        &mut self,
        op: ConvOp,
        from_width: OpWidth,
        to_width: OpWidth,
        result: &Operand,
        value: &Operand,
    ) {
        let (dst, home) = self.float_result(result);
        let dst = dst.name(to_width);
        let cvt = format!("cvtsi2s{}", float_suffix(to_width));
        let signed = matches!(op, ConvOp::SiF);

        if op == ConvOp::UiF && from_width == OpWidth::Q {
            self.emit_u64_to_float(to_width, dst, value);
            self.flush_float(dst, home, to_width);
            return;
        }

        let mut src = self.resolve(value, from_width, LHS_SCRATCH);
        let gpr_width;
        match from_width {
            OpWidth::B | OpWidth::W => {
                // Widen to 32 bits first; the converter takes no
                // narrower source.
                let mnemonic = widen_mnemonic(signed, from_width, OpWidth::L)
                    .expect("byte and word sources always widen");
                asm!(self.text, "\t{}\t{}, %eax", mnemonic, src);
                src = "%eax".to_string();
                gpr_width = OpWidth::L;
            }
            OpWidth::L if !signed => {
                // Zero-extend through a 32-bit move, then convert from
                // 64 bits where every u32 is in range.
                self.mov_int(&src, "%eax", OpWidth::L);
                src = "%rax".to_string();
                gpr_width = OpWidth::Q;
            }
            width => {
                if is_imm(&src) {
                    self.mov_int(&src, Reg::Rax.name(width), width);
                    src = Reg::Rax.name(width).to_string();
                }
                gpr_width = width;
            }
        }
        asm!(self.text, "\t{}{}\t{}, {}", cvt, gpr_width.suffix(), src, dst);
        self.flush_float(dst, home, to_width);
    }

    /// A u64 above `i64::MAX` converts by halving with the low bit
    /// folded in, converting signed, and doubling.
    fn emit_u64_to_float(&mut self, to_width: OpWidth, dst: &str, value: &Operand) {
        let src = self.resolve(value, OpWidth::Q, LHS_SCRATCH);
        self.mov_int(&src, "%rax", OpWidth::Q);
        let cvt = format!("cvtsi2s{}q", float_suffix(to_width));
        let half = self.scratch_label();
        let done = self.scratch_label();
        asm!(self.text, "\ttestq\t%rax, %rax");
        asm!(self.text, "\tjs\t.LE{}", half);
        asm!(self.text, "\t{}\t%rax, {}", cvt, dst);
        asm!(self.text, "\tjmp\t.LE{}", done);
        asm!(self.text, ".LE{}:", half);
        asm!(self.text, "\tmovq\t%rax, %rdx");
        asm!(self.text, "\tshrq\t%rdx");
        asm!(self.text, "\tandl\t$1, %eax");
        asm!(self.text, "\torq\t%rax, %rdx");
        asm!(self.text, "\t{}\t%rdx, {}", cvt, dst);
        asm!(self.text, "\tadds{}\t{}, {}", float_suffix(to_width), dst, dst);
        asm!(self.text, ".LE{}:", done);
    }

    fn emit_float_to_int(
        &mut self,
        op: ConvOp,
        from_width: OpWidth,
        to_width: OpWidth,
        result: &Operand,
        value: &Operand,
    ) {
        let (dst, home) = self.int_result(result);
        let src = self.resolve(value, from_width, LHS_SCRATCH);
        // Unsigned 32-bit targets truncate through a 64-bit convert so
        // values past `i32::MAX` survive; unsigned 64-bit targets use
        // the signed convert and cover everything below 2^63.
        let gpr_width = match (op, to_width) {
            (_, OpWidth::Q) => OpWidth::Q,
            (ConvOp::FUi, OpWidth::L) => OpWidth::Q,
            _ => OpWidth::L,
        };
        asm!(
            self.text,
            "\tcvtts{}2si\t{}, {}",
            float_suffix(from_width),
            src,
            dst.name(gpr_width)
        );
        self.flush_int(dst.name(to_width), home, to_width);
    }

    // === Calls ===

    fn emit_call(
        &mut self,
        result: Option<&Operand>,
        class: OpClass,
        width: OpWidth,
        target: &Operand,
        arg_count: u32,
        stack_bytes: u64,
        variadic: bool,
    ) {
        let args = mem::take(&mut self.pending);
        debug_assert_eq!(args.len(), arg_count as usize);

        let mut reg_loads = Vec::new();
        let mut stack_stores = Vec::new();
        let mut int_used = 0;
        let mut float_used = 0;
        let mut stack_off = 0u64;
        for (arg_class, arg_width, operand) in args {
            match arg_class {
                ArgClass::Aggregate { size } => {
                    stack_stores.push((stack_off, arg_class, arg_width, operand));
                    stack_off += round_up(size, 8);
                }
                ArgClass::Float if float_used < FLOAT_ARGS.len() => {
                    reg_loads.push((FLOAT_ARGS[float_used], arg_width, operand));
                    float_used += 1;
                }
                ArgClass::Int if int_used < INT_ARGS.len() => {
                    reg_loads.push((INT_ARGS[int_used], arg_width, operand));
                    int_used += 1;
                }
                _ => {
                    stack_stores.push((stack_off, arg_class, arg_width, operand));
                    stack_off += 8;
                }
            }
        }
        debug_assert_eq!(stack_off, stack_bytes);

        // Stack arguments first, while %rax and %rcx are still free.
        for (offset, arg_class, arg_width, operand) in stack_stores {
            match arg_class {
                ArgClass::Aggregate { size } => self.copy_aggregate_out(offset, size, &operand),
                ArgClass::Float => {
                    let src = self.resolve(&operand, arg_width, LHS_SCRATCH);
                    self.mov_float(&src, "%xmm0", arg_width);
                    asm!(self.text, "\t{}\t%xmm0, {}", fmov(arg_width), rsp_ref(offset));
                }
                ArgClass::Int => {
                    let mut src = self.resolve(&operand, arg_width, LHS_SCRATCH);
                    if is_mem(&src) {
                        src = self.stage(&src, OpClass::Int, arg_width);
                    }
                    self.mov_int(&src, &rsp_ref(offset), arg_width);
                }
            }
        }

        // Register arguments. Staged operands never carry an
        // indirection, so loading one cannot disturb an argument
        // register already filled.
        for (register, arg_width, operand) in reg_loads {
            match operand {
                Operand::Address(value) => {
                    let home = self.value_home(value);
                    asm!(self.text, "\tleaq\t{}, {}", home, register.name(OpWidth::Q));
                }
                Operand::Direct(Value::StrConst(pool)) => {
                    asm!(self.text, "\tleaq\t{}(%rip), {}", pool, register.name(OpWidth::Q));
                }
                Operand::Direct(Value::IntConst(v))
                    if arg_width == OpWidth::Q && i32::try_from(v).is_err() =>
                {
                    asm!(self.text, "\tmovabsq\t${}, {}", v, register.name(OpWidth::Q));
                }
                _ => {
                    let src = self.resolve(&operand, arg_width, LHS_SCRATCH);
                    if register.is_float() {
                        self.mov_float(&src, register.name(arg_width), arg_width);
                    } else {
                        self.mov_int(&src, register.name(arg_width), arg_width);
                    }
                }
            }
        }

        if variadic {
            asm!(self.text, "\tmovl\t${}, %eax", float_used.min(FLOAT_ARGS.len()));
        }

        match *target {
            Operand::Direct(Value::Sym { sym, name }) if self.ctx.symbols.entry(sym).is_function() => {
                asm!(self.text, "\tcall\t{}", name);
            }
            _ => {
                // A function pointer value, possibly held in a
                // variable. %r10 is free at a call site.
                let src = self.resolve(target, OpWidth::Q, LHS_SCRATCH);
                self.mov_int(&src, "%r10", OpWidth::Q);
                asm!(self.text, "\tcall\t*%r10");
            }
        }

        if let Some(result) = result {
            match self.result_location(result) {
                Location::Reg(register) => match class {
                    OpClass::Int => self.mov_int(Reg::Rax.name(width), register.name(width), width),
                    OpClass::Float => self.mov_float("%xmm0", register.name(width), width),
                },
                Location::Spill(home) => match class {
                    OpClass::Int => {
                        asm!(self.text, "\tmov{}\t{}, {}(%rbp)", width.suffix(), Reg::Rax.name(width), home);
                    }
                    OpClass::Float => {
                        asm!(self.text, "\t{}\t%xmm0, {}(%rbp)", fmov(width), home);
                    }
                },
            }
        }
    }

    /// Copy an aggregate argument into the outgoing staging area. The
    /// operand holds the aggregate's address.
    fn copy_aggregate_out(&mut self, offset: u64, size: u64, operand: &Operand) {
        let src = self.resolve(operand, OpWidth::Q, LHS_SCRATCH);
        self.mov_int(&src, "%rax", OpWidth::Q);
        let mut copied = 0u64;
        while copied < size {
            let width = copy_width(size - copied);
            let chunk = Reg::Rcx.name(width);
            asm!(self.text, "\tmov{}\t{}, {}", width.suffix(), mem_at("%rax", copied as i64), chunk);
            asm!(self.text, "\tmov{}\t{}, {}", width.suffix(), chunk, rsp_ref(offset + copied));
            copied += width.bytes();
        }
    }

    // === Branches ===

    fn emit_if_int(
        &mut self,
        when_false: bool,
        width: OpWidth,
        is_signed: bool,
        lhs: &Operand,
        test: Option<&(RelOp, Operand)>,
        target: LabelId,
    ) {
        let mut lhs_s = self.resolve(lhs, width, LHS_SCRATCH);
        if !matches!(lhs, Operand::Direct(_)) || is_imm(&lhs_s) {
            // Park the left side in %rax before the right side reuses
            // the scratch registers; compares also reject immediate
            // left operands.
            self.mov_int(&lhs_s, Reg::Rax.name(width), width);
            lhs_s = Reg::Rax.name(width).to_string();
        }
        match test {
            Some(&(relop, ref rhs)) => {
                let rhs_s = self.resolve(rhs, width, RHS_SCRATCH);
                if is_mem(&lhs_s) && is_mem(&rhs_s) {
                    self.mov_int(&lhs_s, Reg::Rax.name(width), width);
                    lhs_s = Reg::Rax.name(width).to_string();
                }
                asm!(self.text, "\tcmp{}\t{}, {}", width.suffix(), rhs_s, lhs_s);
                let relop = if when_false { relop.negated() } else { relop };
                asm!(self.text, "\t{}\t{}", int_jump(relop, is_signed), target);
            }
            None => {
                asm!(self.text, "\tcmp{}\t$0, {}", width.suffix(), lhs_s);
                let jump = if when_false { "je" } else { "jne" };
                asm!(self.text, "\t{}\t{}", jump, target);
            }
        }
    }

    /// Unordered compares raise the parity flag, so equality tests
    /// route around it explicitly and the ordered relations pick the
    /// below/above family that treats NaN correctly.
    fn emit_if_float(
        &mut self,
        when_false: bool,
        width: OpWidth,
        lhs: &Operand,
        test: Option<&(RelOp, Operand)>,
        target: LabelId,
    ) {
        let ucomi = format!("ucomis{}", float_suffix(width));
        let mut lhs_s = self.resolve(lhs, width, LHS_SCRATCH);
        if !lhs_s.starts_with('%') {
            self.mov_float(&lhs_s, "%xmm0", width);
            lhs_s = "%xmm0".to_string();
        }
        let Some(&(relop, ref rhs)) = test else {
            // Truth test against positive zero; NaN counts as true.
            asm!(self.text, "\txorps\t%xmm1, %xmm1");
            asm!(self.text, "\t{}\t%xmm1, {}", ucomi, lhs_s);
            if when_false {
                let skip = self.scratch_label();
                asm!(self.text, "\tjp\t.LE{}", skip);
                asm!(self.text, "\tje\t{}", target);
                asm!(self.text, ".LE{}:", skip);
            } else {
                asm!(self.text, "\tjp\t{}", target);
                asm!(self.text, "\tjne\t{}", target);
            }
            return;
        };
        let mut rhs_s = self.resolve(rhs, width, RHS_SCRATCH);

        if matches!(relop, RelOp::Equal | RelOp::NotEqual) {
            asm!(self.text, "\t{}\t{}, {}", ucomi, rhs_s, lhs_s);
            let branch_on_equal = matches!(relop, RelOp::Equal) != when_false;
            if branch_on_equal {
                let skip = self.scratch_label();
                asm!(self.text, "\tjp\t.LE{}", skip);
                asm!(self.text, "\tje\t{}", target);
                asm!(self.text, ".LE{}:", skip);
            } else {
                asm!(self.text, "\tjp\t{}", target);
                asm!(self.text, "\tjne\t{}", target);
            }
            return;
        }

        // Orderings compile to the unsigned-style jumps, swapping the
        // compare so that less-than forms test as above.
        let (swap, jump) = match (relop, when_false) {
            (RelOp::Less, false) => (true, "ja"),
            (RelOp::LessEqual, false) => (true, "jae"),
            (RelOp::Greater, false) => (false, "ja"),
            (RelOp::GreaterEqual, false) => (false, "jae"),
            (RelOp::Less, true) => (true, "jbe"),
            (RelOp::LessEqual, true) => (true, "jb"),
            (RelOp::Greater, true) => (false, "jbe"),
            (RelOp::GreaterEqual, true) => (false, "jb"),
            _ => unreachable!("equality handled above"),
        };
        if swap {
            if !rhs_s.starts_with('%') {
                self.mov_float(&rhs_s, "%xmm1", width);
                rhs_s = "%xmm1".to_string();
            }
            asm!(self.text, "\t{}\t{}, {}", ucomi, lhs_s, rhs_s);
        } else {
            asm!(self.text, "\t{}\t{}, {}", ucomi, rhs_s, lhs_s);
        }
        asm!(self.text, "\t{}\t{}", jump, target);
    }

    // === Operand resolution ===

    /// Render an operand as an addressable assembly string, emitting
    /// whatever loads the addressing needs into the given scratch
    /// registers. The string stays valid until the next resolution
    /// that reuses those registers.
    fn resolve(&mut self, operand: &Operand, width: OpWidth, scratch: [Reg; 2]) -> String {
        match *operand {
            Operand::Direct(value) => self.resolve_value(value, width, scratch[0]),
            Operand::Indirect(value) => {
                let base = self.value_in_gpr(value, scratch[0]);
                format!("({})", base.name(OpWidth::Q))
            }
            Operand::Subscript(base, index) => {
                let base = self.value_in_gpr(base, scratch[0]);
                if let Value::IntConst(displacement) = index {
                    mem_at(base.name(OpWidth::Q), displacement)
                } else {
                    let index = self.value_in_gpr(index, scratch[1]);
                    format!("({},{})", base.name(OpWidth::Q), index.name(OpWidth::Q))
                }
            }
            Operand::Address(value) => {
                let home = self.value_home(value);
                asm!(self.text, "\tleaq\t{}, {}", home, scratch[0].name(OpWidth::Q));
                scratch[0].name(width).to_string()
            }
        }
    }

    fn resolve_value(&mut self, value: Value, width: OpWidth, scratch: Reg) -> String {
        match value {
            Value::Sym { sym, name } => self.sym_home(sym, name),
            Value::Temp(temp) => match self.location(temp) {
                Location::Reg(register) => register.name(width).to_string(),
                Location::Spill(home) => format!("{}(%rbp)", home),
            },
            Value::Slot(slot) => format!("{}(%rbp)", self.slot_offset(slot)),
            Value::IntConst(v) => {
                if width == OpWidth::Q && i32::try_from(v).is_err() {
                    asm!(self.text, "\tmovabsq\t${}, {}", v, scratch.name(OpWidth::Q));
                    scratch.name(OpWidth::Q).to_string()
                } else {
                    format!("${}", v)
                }
            }
            Value::FloatConst(pool) => format!("{}(%rip)", pool),
            Value::StrConst(pool) => {
                asm!(self.text, "\tleaq\t{}(%rip), {}", pool, scratch.name(OpWidth::Q));
                scratch.name(OpWidth::Q).to_string()
            }
        }
    }

    /// Load an address or integer value into a 64-bit register,
    /// reusing the value's own register when it has one.
    fn value_in_gpr(&mut self, value: Value, scratch: Reg) -> Reg {
        match value {
            Value::Temp(temp) => match self.location(temp) {
                Location::Reg(register) => register,
                Location::Spill(home) => {
                    asm!(self.text, "\tmovq\t{}(%rbp), {}", home, scratch.name(OpWidth::Q));
                    scratch
                }
            },
            Value::Sym { sym, name } => {
                let home = self.sym_home(sym, name);
                asm!(self.text, "\tmovq\t{}, {}", home, scratch.name(OpWidth::Q));
                scratch
            }
            Value::Slot(slot) => {
                asm!(self.text, "\tmovq\t{}(%rbp), {}", self.slot_offset(slot), scratch.name(OpWidth::Q));
                scratch
            }
            Value::IntConst(v) => {
                if i32::try_from(v).is_err() {
                    asm!(self.text, "\tmovabsq\t${}, {}", v, scratch.name(OpWidth::Q));
                } else {
                    asm!(self.text, "\tmovq\t${}, {}", v, scratch.name(OpWidth::Q));
                }
                scratch
            }
            Value::StrConst(pool) => {
                asm!(self.text, "\tleaq\t{}(%rip), {}", pool, scratch.name(OpWidth::Q));
                scratch
            }
            Value::FloatConst(_) => unreachable!("float constant as an address"),
        }
    }

    /// The memory home an address expression refers to.
    fn value_home(&mut self, value: Value) -> String {
        match value {
            Value::Sym { sym, name } => self.sym_home(sym, name),
            Value::Slot(slot) => format!("{}(%rbp)", self.slot_offset(slot)),
            Value::StrConst(pool) => format!("{}(%rip)", pool),
            _ => unreachable!("address of a value without a home"),
        }
    }

    fn sym_home(&self, sym: SymbolEntryRef, name: StringId) -> String {
        if let Some(&offset) = self.allocation().frame.homes.get(&sym) {
            return format!("{}(%rbp)", offset);
        }
        if let Some(label) = self.static_labels.get(&sym) {
            return format!("{}(%rip)", label);
        }
        format!("{}(%rip)", name)
    }

    fn result_location(&self, result: &Operand) -> Location {
        let Operand::Direct(Value::Temp(temp)) = *result else {
            unreachable!("instruction results are temporaries");
        };
        self.location(temp)
    }

    /// The working register for an integer result: its own register,
    /// or %rax with a flush to the frame slot afterwards.
    fn int_result(&mut self, result: &Operand) -> (Reg, Option<i64>) {
        match self.result_location(result) {
            Location::Reg(register) => (register, None),
            Location::Spill(home) => (Reg::Rax, Some(home)),
        }
    }

    fn float_result(&mut self, result: &Operand) -> (Reg, Option<i64>) {
        match self.result_location(result) {
            Location::Reg(register) => (register, None),
            Location::Spill(home) => (Reg::Xmm(0), Some(home)),
        }
    }

    fn flush_int(&mut self, reg: &str, home: Option<i64>, width: OpWidth) {
        if let Some(home) = home {
            asm!(self.text, "\tmov{}\t{}, {}(%rbp)", width.suffix(), reg, home);
        }
    }

    fn flush_float(&mut self, reg: &str, home: Option<i64>, width: OpWidth) {
        if let Some(home) = home {
            asm!(self.text, "\t{}\t{}, {}(%rbp)", fmov(width), reg, home);
        }
    }

    // === Data sections ===

    fn emit_globals(&mut self) {
        for index in 0..self.ctx.symbols.entries.len() {
            let entry = self.ctx.symbols.entries[index].clone();
            if entry.scope_id != ScopeId::GLOBAL {
                continue;
            }
            let SymbolKind::Variable {
                is_global: true,
                initializer,
            } = entry.kind
            else {
                continue;
            };
            let internal = entry.is_static();
            self.emit_variable(entry.name.to_string(), entry.type_info, entry.def_state, initializer, internal);
        }
        let statics = self.unit.static_locals.clone();
        for sym in statics {
            let entry = self.ctx.symbols.entry(sym).clone();
            let SymbolKind::Variable { initializer, .. } = entry.kind else {
                continue;
            };
            let label = self.static_labels[&sym].clone();
            self.emit_variable(label, entry.type_info, entry.def_state, initializer, true);
        }
    }

    fn emit_variable(
        &mut self,
        label: String,
        ty: QualType,
        def_state: DefinitionState,
        initializer: Option<NodeRef>,
        internal: bool,
    ) {
        let (size, align) = self.ctx.types.ensure_layout(ty.ty).unwrap_or((0, 1));
        match (def_state, initializer) {
            (DefinitionState::DeclaredOnly, _) => {}
            (DefinitionState::Defined, Some(init)) => {
                if self.data.is_empty() {
                    asm!(self.data, "\t.data");
                }
                if !internal {
                    asm!(self.data, "\t.globl\t{}", label);
                }
                if align > 1 {
                    asm!(self.data, "\t.align\t{}", align);
                }
                asm!(self.data, "{}:", label);
                self.emit_data(ty, Some(init));
            }
            _ => {
                // Tentative definitions and zero-initialized statics
                // land in common storage.
                if internal {
                    asm!(self.bss, "\t.local\t{}", label);
                }
                asm!(self.bss, "\t.comm\t{},{},{}", label, size, align);
            }
        }
    }

    /// Serialize one object of `ty` from an initializer node, padding
    /// with `.zero` wherever the initializer runs out.
    fn emit_data(&mut self, ty: QualType, init: Option<NodeRef>) {
        let Some(init) = init else {
            let size = self.ctx.types.size_of(ty.ty).unwrap_or(0);
            if size > 0 {
                asm!(self.data, "\t.zero\t{}", size);
            }
            return;
        };
        let kind = self.ctx.types.kind(ty.ty).clone();
        match kind {
            TypeKind::Record { members, is_union, .. } => {
                let items: Vec<NodeRef> = match self.ast.get_kind(init) {
                    NodeKind::InitList(items) => items.to_vec(),
                    _ => unreachable!("record initializer is a brace list"),
                };
                self.emit_record_data(ty.ty, &members, is_union, &items);
            }
            TypeKind::Array { element_type, size, .. } => {
                let length = match size {
                    ArraySizeType::Fixed(n) => n,
                    _ => 0,
                };
                self.emit_array_data(element_type, length, init);
            }
            _ => self.emit_scalar_data(ty, init),
        }
    }

    fn emit_record_data(&mut self, ty: TypeRef, members: &[StructMember], is_union: bool, items: &[NodeRef]) {
        let total = self.ctx.types.size_of(ty).unwrap_or(0);
        if is_union {
            let mut written = 0;
            if let Some(member) = members.first() {
                let member_ty = member.member_type;
                match member.bit_field_size {
                    Some(_) => {
                        let place = self
                            .ctx
                            .types
                            .field_layout(ty, 0)
                            .and_then(|layout| layout.bit);
                        let unit_size = self.ctx.types.size_of(member_ty.ty).unwrap_or(0);
                        let value = items.first().map(|&item| self.const_int(item)).unwrap_or(0);
                        let bits = match place {
                            Some(place) => pack_bits(0, value, place.bit_offset, place.width),
                            None => 0,
                        };
                        self.emit_int_directive(unit_size, bits as i64);
                        written = unit_size;
                    }
                    None => {
                        self.emit_data(member_ty, items.first().copied());
                        written = self.ctx.types.size_of(member_ty.ty).unwrap_or(0);
                    }
                }
            }
            if total > written {
                asm!(self.data, "\t.zero\t{}", total - written);
            }
            return;
        }

        let mut position = 0u64;
        let mut item_index = 0usize;
        // Accumulates one bit-field storage unit: offset, size, bits.
        let mut unit: Option<(u64, u64, u64)> = None;
        for (index, member) in members.iter().enumerate() {
            let Some(layout) = self.ctx.types.field_layout(ty, index) else {
                continue;
            };
            match (member.bit_field_size, layout.bit) {
                (Some(0), _) => {
                    self.flush_bits(&mut unit, &mut position);
                }
                (Some(_), Some(place)) => {
                    if member.name.is_none() {
                        // Unnamed bit-fields take no initializer and
                        // leave their bits zero.
                        continue;
                    }
                    let unit_size = self.ctx.types.size_of(member.member_type.ty).unwrap_or(0);
                    match unit {
                        Some((offset, _, _)) if offset == layout.offset => {}
                        _ => {
                            self.flush_bits(&mut unit, &mut position);
                            if layout.offset > position {
                                asm!(self.data, "\t.zero\t{}", layout.offset - position);
                                position = layout.offset;
                            }
                            unit = Some((layout.offset, unit_size, 0));
                        }
                    }
                    let value = items.get(item_index).map(|&item| self.const_int(item)).unwrap_or(0);
                    item_index += 1;
                    if let Some((_, _, bits)) = &mut unit {
                        *bits = pack_bits(*bits, value, place.bit_offset, place.width);
                    }
                }
                _ => {
                    self.flush_bits(&mut unit, &mut position);
                    if layout.offset > position {
                        asm!(self.data, "\t.zero\t{}", layout.offset - position);
                    }
                    let item = items.get(item_index).copied();
                    item_index += 1;
                    self.emit_data(member.member_type, item);
                    position = layout.offset + self.ctx.types.size_of(member.member_type.ty).unwrap_or(0);
                }
            }
        }
        self.flush_bits(&mut unit, &mut position);
        if total > position {
            asm!(self.data, "\t.zero\t{}", total - position);
        }
    }

    fn flush_bits(&mut self, unit: &mut Option<(u64, u64, u64)>, position: &mut u64) {
        if let Some((offset, size, bits)) = unit.take() {
            if offset > *position {
                asm!(self.data, "\t.zero\t{}", offset - *position);
            }
            self.emit_int_directive(size, bits as i64);
            *position = offset + size;
        }
    }

    fn emit_array_data(&mut self, element: QualType, length: u64, init: NodeRef) {
        let stride = self.ctx.types.size_of(element.ty).unwrap_or(0);
        match self.ast.get_kind(init).clone() {
            NodeKind::ConstString(spelling) => {
                let bytes = lexer::decode_string_spelling(spelling.as_str());
                let take = (bytes.len() as u64).min(length) as usize;
                let escaped = escape_bytes(&bytes[..take]);
                if (take as u64) < length {
                    asm!(self.data, "\t.asciz\t\"{}\"", escaped);
                    let rest = length - take as u64 - 1;
                    if rest > 0 {
                        asm!(self.data, "\t.zero\t{}", rest);
                    }
                } else {
                    // The terminator is dropped when the array is
                    // exactly full.
                    asm!(self.data, "\t.ascii\t\"{}\"", escaped);
                }
            }
            NodeKind::InitList(items) => {
                let used = (items.len() as u64).min(length);
                for index in 0..used as usize {
                    self.emit_data(element, Some(items[index]));
                }
                if length > used && stride > 0 {
                    asm!(self.data, "\t.zero\t{}", (length - used) * stride);
                }
            }
            _ => unreachable!("array initializer is a brace list or string"),
        }
    }

    fn emit_scalar_data(&mut self, ty: QualType, init: NodeRef) {
        // A scalar may be wrapped in a single layer of braces.
        let mut init = init;
        while let NodeKind::InitList(items) = self.ast.get_kind(init) {
            match items.first() {
                Some(&first) => init = first,
                None => {
                    let size = self.ctx.types.size_of(ty.ty).unwrap_or(0);
                    asm!(self.data, "\t.zero\t{}", size);
                    return;
                }
            }
        }
        let size = self.ctx.types.size_of(ty.ty).unwrap_or(0);
        let kind = self.ctx.types.kind(ty.ty).clone();
        let value = self.const_value(init);
        if kind.is_floating() {
            let float = match value {
                DataValue::Float { bits, is_single } => {
                    if is_single {
                        f32::from_bits(bits as u32) as f64
                    } else {
                        f64::from_bits(bits)
                    }
                }
                DataValue::Int(v) => v as f64,
                DataValue::Addr { .. } => unreachable!("address in a floating initializer"),
            };
            if matches!(kind, TypeKind::Float) {
                asm!(self.data, "\t.long\t{}", (float as f32).to_bits());
            } else {
                asm!(self.data, "\t.quad\t{}", float.to_bits());
            }
            return;
        }
        match value {
            DataValue::Int(v) => self.emit_int_directive(size, v),
            DataValue::Float { bits, is_single } => {
                let float = if is_single {
                    f32::from_bits(bits as u32) as f64
                } else {
                    f64::from_bits(bits)
                };
                self.emit_int_directive(size, float as i64);
            }
            DataValue::Addr { label, offset } => {
                // A pointer cast down to int still names a relocation; a
                // 32-bit one is representable in the small code model.
                let directive = if size == 4 { ".long" } else { ".quad" };
                if label.is_empty() {
                    asm!(self.data, "\t{}\t{}", directive, offset);
                } else if offset > 0 {
                    asm!(self.data, "\t{}\t{}+{}", directive, label, offset);
                } else if offset < 0 {
                    asm!(self.data, "\t{}\t{}{}", directive, label, offset);
                } else {
                    asm!(self.data, "\t{}\t{}", directive, label);
                }
            }
        }
    }

    fn emit_int_directive(&mut self, size: u64, value: i64) {
        let (directive, truncated) = match size {
            1 => (".byte", value as i8 as i64),
            2 => (".short", value as i16 as i64),
            4 => (".long", value as i32 as i64),
            _ => (".quad", value),
        };
        asm!(self.data, "\t{}\t{}", directive, truncated);
    }

    // === Static initializer evaluation ===

    fn const_int(&mut self, node: NodeRef) -> i64 {
        match self.const_value(node) {
            DataValue::Int(v) => v,
            _ => unreachable!("integer constant expected"),
        }
    }

    /// Evaluate an initializer expression the declarator parser has
    /// already vetted as an arithmetic or address constant.
    fn const_value(&mut self, node: NodeRef) -> DataValue {
        match self.ast.get_kind(node).clone() {
            NodeKind::ConstInt(v) => DataValue::Int(v),
            NodeKind::ConstFloat(v) => {
                let is_single = matches!(self.ctx.types.kind(self.ast.get_type(node).ty), TypeKind::Float);
                let bits = if is_single {
                    (v as f32).to_bits() as u64
                } else {
                    v.to_bits()
                };
                DataValue::Float { bits, is_single }
            }
            NodeKind::ConstString(spelling) => {
                let pool = self.pool_string(spelling);
                DataValue::Addr {
                    label: pool.to_string(),
                    offset: 0,
                }
            }
            NodeKind::Conv(inner) => {
                let value = self.const_value(inner);
                let kind = self.ctx.types.kind(self.ast.get_type(node).ty).clone();
                self.convert_const(value, &kind)
            }
            NodeKind::Decay(inner) | NodeKind::Unary(UnaryOp::AddrOf, inner) => {
                let (label, offset) = self.const_address(inner);
                DataValue::Addr { label, offset }
            }
            NodeKind::Unary(UnaryOp::Plus, inner) => self.const_value(inner),
            NodeKind::Unary(UnaryOp::Minus, inner) => match self.const_value(inner) {
                DataValue::Int(v) => DataValue::Int(v.wrapping_neg()),
                DataValue::Float { bits, is_single } => DataValue::Float {
                    bits: bits ^ if is_single { 1 << 31 } else { 1 << 63 },
                    is_single,
                },
                addr => addr,
            },
            NodeKind::Unary(UnaryOp::BitNot, inner) => match self.const_value(inner) {
                DataValue::Int(v) => DataValue::Int(!v),
                other => other,
            },
            NodeKind::Binary(op @ (BinaryOp::Add | BinaryOp::Sub), lhs, rhs) => {
                let lhs_value = self.const_value(lhs);
                let rhs_value = self.const_value(rhs);
                let subtract = matches!(op, BinaryOp::Sub);
                match (lhs_value, rhs_value) {
                    (DataValue::Int(a), DataValue::Int(b)) => {
                        DataValue::Int(if subtract { a.wrapping_sub(b) } else { a.wrapping_add(b) })
                    }
                    (DataValue::Addr { label, offset }, DataValue::Int(b)) => {
                        // Pointer arithmetic moves by whole elements.
                        let stride = self.address_stride(self.ast.get_type(node).ty);
                        let delta = b.wrapping_mul(stride);
                        DataValue::Addr {
                            label,
                            offset: if subtract { offset - delta } else { offset + delta },
                        }
                    }
                    (DataValue::Addr { offset: a, .. }, DataValue::Addr { offset: b, .. }) => {
                        let stride = self.address_stride(self.ast.get_type(lhs).ty);
                        DataValue::Int((a - b) / stride)
                    }
                    _ => unreachable!("unsupported constant operands"),
                }
            }
            NodeKind::Ident(sym) => {
                let entry = self.ctx.symbols.entry(sym);
                match entry.kind {
                    SymbolKind::EnumConstant { value } => DataValue::Int(value),
                    SymbolKind::Function { .. } => DataValue::Addr {
                        label: entry.name.to_string(),
                        offset: 0,
                    },
                    _ => unreachable!("non-constant initializer survived validation"),
                }
            }
            _ => unreachable!("non-constant initializer survived validation"),
        }
    }

    fn convert_const(&mut self, value: DataValue, target: &TypeKind) -> DataValue {
        match (value, target) {
            (DataValue::Int(v), kind) if kind.is_integer() => {
                DataValue::Int(truncate_to_kind(v, kind))
            }
            (DataValue::Int(v), TypeKind::Float) => DataValue::Float {
                bits: ((v as f64) as f32).to_bits() as u64,
                is_single: true,
            },
            (DataValue::Int(v), TypeKind::Double { .. }) => DataValue::Float {
                bits: (v as f64).to_bits(),
                is_single: false,
            },
            (DataValue::Float { bits, is_single }, kind) if kind.is_integer() => {
                let float = if is_single {
                    f32::from_bits(bits as u32) as f64
                } else {
                    f64::from_bits(bits)
                };
                DataValue::Int(truncate_to_kind(float as i64, kind))
            }
            (DataValue::Float { bits, is_single }, TypeKind::Float) => {
                let float = if is_single {
                    return DataValue::Float { bits, is_single };
                } else {
                    f64::from_bits(bits)
                };
                DataValue::Float {
                    bits: (float as f32).to_bits() as u64,
                    is_single: true,
                }
            }
            (DataValue::Float { bits, is_single }, TypeKind::Double { .. }) => {
                let float = if is_single {
                    f32::from_bits(bits as u32) as f64
                } else {
                    return DataValue::Float { bits, is_single };
                };
                DataValue::Float {
                    bits: float.to_bits(),
                    is_single: false,
                }
            }
            (value, _) => value,
        }
    }

    /// The label and byte offset of a static-storage lvalue.
    fn const_address(&mut self, node: NodeRef) -> (String, i64) {
        match self.ast.get_kind(node).clone() {
            NodeKind::Ident(sym) => (self.symbol_label(sym), 0),
            NodeKind::ConstString(spelling) => (self.pool_string(spelling).to_string(), 0),
            NodeKind::Member(base, index) => {
                let record = self.ast.get_type(base).ty;
                let offset = self
                    .ctx
                    .types
                    .field_layout(record, index as usize)
                    .map(|layout| layout.offset)
                    .unwrap_or(0);
                let (label, base_offset) = self.const_address(base);
                (label, base_offset + offset as i64)
            }
            NodeKind::Index(base, index) => {
                let stride = self.ctx.types.size_of(self.ast.get_type(node).ty).unwrap_or(0);
                let index = self.const_int(index);
                let (label, offset) = match self.const_value(base) {
                    DataValue::Addr { label, offset } => (label, offset),
                    DataValue::Int(v) => (String::new(), v),
                    _ => unreachable!("array base is an address"),
                };
                (label, offset + index * stride as i64)
            }
            NodeKind::Unary(UnaryOp::Deref, inner) => match self.const_value(inner) {
                DataValue::Addr { label, offset } => (label, offset),
                DataValue::Int(v) => (String::new(), v),
                _ => unreachable!("dereference of a non-address constant"),
            },
            NodeKind::Conv(inner) | NodeKind::Decay(inner) => self.const_address(inner),
            _ => unreachable!("non-static lvalue survived validation"),
        }
    }

    /// Bytes per element for address arithmetic: the pointee size when
    /// `ty` is a pointer, one byte otherwise.
    fn address_stride(&mut self, ty: TypeRef) -> i64 {
        match self.ctx.types.kind(ty).clone() {
            TypeKind::Pointer { pointee } => self.ctx.types.size_of(pointee.ty).unwrap_or(1).max(1) as i64,
            _ => 1,
        }
    }

    fn symbol_label(&self, sym: SymbolEntryRef) -> String {
        if let Some(label) = self.static_labels.get(&sym) {
            return label.clone();
        }
        self.ctx.symbols.entry(sym).name.to_string()
    }

    fn pool_string(&mut self, spelling: StringId) -> PoolId {
        if let Some(&id) = self.string_ids.get(&spelling) {
            return id;
        }
        let id = PoolId(self.next_pool);
        self.next_pool += 1;
        self.string_ids.insert(spelling, id);
        self.extra_strings.push((id, spelling));
        id
    }

    // === Literal pools ===

    fn emit_pools(&mut self, ir: &IrUnit) {
        let mut entries: Vec<(u32, PoolData)> = Vec::new();
        for &(id, spelling) in ir.strings.iter().chain(&self.extra_strings) {
            entries.push((id.0, PoolData::Str(spelling)));
        }
        for &(id, float) in &ir.floats {
            entries.push((id.0, PoolData::Float(float)));
        }
        if entries.is_empty() {
            return;
        }
        entries.sort_by_key(|&(id, _)| id);

        asm!(self.rodata, "\t.section\t.rodata");
        for (id, data) in entries {
            match data {
                PoolData::Str(spelling) => {
                    let bytes = lexer::decode_string_spelling(spelling.as_str());
                    asm!(self.rodata, "{}:", PoolId(id));
                    asm!(self.rodata, "\t.asciz\t\"{}\"", escape_bytes(&bytes));
                }
                PoolData::Float(entry) => {
                    if entry.is_single {
                        asm!(self.rodata, "\t.align\t4");
                        asm!(self.rodata, "{}:", PoolId(id));
                        asm!(self.rodata, "\t.long\t{}", entry.bits as u32);
                    } else {
                        asm!(self.rodata, "\t.align\t8");
                        asm!(self.rodata, "{}:", PoolId(id));
                        asm!(self.rodata, "\t.quad\t{}", entry.bits);
                    }
                }
            }
        }
    }
}

// === Helpers ===

fn is_imm(operand: &str) -> bool {
    operand.starts_with('$')
}

fn is_mem(operand: &str) -> bool {
    !operand.starts_with('$') && !operand.starts_with('%')
}

fn fmov(width: OpWidth) -> &'static str {
    match width {
        OpWidth::L => "movss",
        _ => "movsd",
    }
}

fn float_suffix(width: OpWidth) -> &'static str {
    match width {
        OpWidth::L => "s",
        _ => "d",
    }
}

fn mem_at(base: &str, offset: i64) -> String {
    if offset == 0 {
        format!("({})", base)
    } else {
        format!("{}({})", offset, base)
    }
}

fn rsp_ref(offset: u64) -> String {
    if offset == 0 {
        "(%rsp)".to_string()
    } else {
        format!("{}(%rsp)", offset)
    }
}

fn int_jump(relop: RelOp, is_signed: bool) -> &'static str {
    match (relop, is_signed) {
        (RelOp::Equal, _) => "je",
        (RelOp::NotEqual, _) => "jne",
        (RelOp::Less, true) => "jl",
        (RelOp::LessEqual, true) => "jle",
        (RelOp::Greater, true) => "jg",
        (RelOp::GreaterEqual, true) => "jge",
        (RelOp::Less, false) => "jb",
        (RelOp::LessEqual, false) => "jbe",
        (RelOp::Greater, false) => "ja",
        (RelOp::GreaterEqual, false) => "jae",
    }
}

/// Widening move mnemonic, or `None` where a plain 32-bit move zero
/// extends for free.
fn widen_mnemonic(signed_source: bool, from: OpWidth, to: OpWidth) -> Option<&'static str> {
    Some(match (signed_source, from, to) {
        (true, OpWidth::B, OpWidth::W) => "movsbw",
        (true, OpWidth::B, OpWidth::L) => "movsbl",
        (true, OpWidth::B, OpWidth::Q) => "movsbq",
        (true, OpWidth::W, OpWidth::L) => "movswl",
        (true, OpWidth::W, OpWidth::Q) => "movswq",
        (true, OpWidth::L, OpWidth::Q) => "movslq",
        (false, OpWidth::B, OpWidth::W) => "movzbw",
        (false, OpWidth::B, OpWidth::L) => "movzbl",
        (false, OpWidth::B, OpWidth::Q) => "movzbq",
        (false, OpWidth::W, OpWidth::L) => "movzwl",
        (false, OpWidth::W, OpWidth::Q) => "movzwq",
        (false, OpWidth::L, OpWidth::Q) => return None,
        _ => return None,
    })
}

/// The widest chunk that fits the remaining byte count.
fn copy_width(remaining: u64) -> OpWidth {
    if remaining >= 8 {
        OpWidth::Q
    } else if remaining >= 4 {
        OpWidth::L
    } else if remaining >= 2 {
        OpWidth::W
    } else {
        OpWidth::B
    }
}

fn pack_bits(unit: u64, value: i64, bit_offset: u32, width: u32) -> u64 {
    let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
    unit | ((value as u64 & mask) << bit_offset)
}

fn truncate_to_kind(value: i64, kind: &TypeKind) -> i64 {
    match kind {
        TypeKind::Bool => i64::from(value != 0),
        TypeKind::Char { is_signed: true } => value as i8 as i64,
        TypeKind::Char { is_signed: false } => value as u8 as i64,
        TypeKind::Short { is_signed: true } => value as i16 as i64,
        TypeKind::Short { is_signed: false } => value as u16 as i64,
        TypeKind::Int { is_signed: true } | TypeKind::Enum { .. } => value as i32 as i64,
        TypeKind::Int { is_signed: false } => value as u32 as i64,
        _ => value,
    }
}

/// Escape string bytes for an `.ascii`/`.asciz` directive. Anything
/// outside printable ASCII becomes a three-digit octal escape.
fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\{:03o}", byte);
            }
        }
    }
    out
}

