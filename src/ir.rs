//! Three-address intermediate representation.
//!
//! Lowering flattens each function body into a linear instruction list.
//! Instructions are typed by operation class: integer and float
//! arithmetic use separate opcodes, and every implicit conversion the
//! language performs becomes an explicit `Conv` instruction carrying
//! its signedness pair and source/destination widths. The emitter picks
//! mnemonics from `(opcode, width)` alone and never consults the type
//! system.
//!
//! Operands name either a declared symbol (always memory resident), a
//! compiler temporary, a lowering-allocated stack slot, or a constant.
//! The `Indirect`, `Subscript`, and `Address` forms describe memory
//! access through a held address; they carry values, not nested
//! operands, so one instruction performs at most one indirection.

use std::fmt;

use crate::intern::StringId;
use crate::semantic::SymbolEntryRef;
use crate::source_manager::SourceSpan;

pub mod lower;

#[cfg(test)]
mod tests_lower;

/// Branch target, rendered as `.L<n>`. Unique across the whole unit so
/// functions can share one assembly file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".L{}", self.0)
    }
}

/// Compiler temporary, rendered as `t<n>`. Numbered per function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(pub u32);

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Frame scratch area allocated during lowering, rendered as `s<n>`.
/// Used for aggregate call results and the saved aggregate-return
/// pointer; plain scalars never live here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Read-only literal pool entry, rendered as `.LC<n>`. String and float
/// constants share one counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(pub u32);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".LC{}", self.0)
    }
}

/// Operation width. Decides the mnemonic suffix and the register name
/// used at emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpWidth {
    B,
    W,
    L,
    Q,
}

impl OpWidth {
    pub fn from_size(size: u64) -> OpWidth {
        match size {
            1 => OpWidth::B,
            2 => OpWidth::W,
            4 => OpWidth::L,
            _ => OpWidth::Q,
        }
    }

    pub fn bytes(self) -> u64 {
        match self {
            OpWidth::B => 1,
            OpWidth::W => 2,
            OpWidth::L => 4,
            OpWidth::Q => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    pub fn suffix(self) -> &'static str {
        match self {
            OpWidth::B => "b",
            OpWidth::W => "w",
            OpWidth::L => "l",
            OpWidth::Q => "q",
        }
    }
}

/// Which ALU family an instruction routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Int,
    Float,
}

/// Argument classification for the calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgClass {
    Int,
    Float,
    /// Struct or union passed by value; always staged on the stack,
    /// rounded up to eight bytes.
    Aggregate { size: u64 },
}

/// A value the IR can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// Declared symbol. Carries its name so the IR prints and emits
    /// without consulting the symbol table.
    Sym { sym: SymbolEntryRef, name: StringId },
    Temp(TempId),
    Slot(SlotId),
    IntConst(i64),
    FloatConst(PoolId),
    StrConst(PoolId),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Sym { name, .. } => write!(f, "{}", name),
            Value::Temp(t) => write!(f, "{}", t),
            Value::Slot(s) => write!(f, "{}", s),
            Value::IntConst(v) => write!(f, "${}", v),
            Value::FloatConst(p) => write!(f, "{}", p),
            Value::StrConst(p) => write!(f, "{}", p),
        }
    }
}

/// How an instruction touches a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// The value itself: register, home slot, or immediate.
    Direct(Value),
    /// Memory at the address held by the value: `*p`.
    Indirect(Value),
    /// Memory at base plus byte offset: `p[i]`. The index is already
    /// scaled by the element size.
    Subscript(Value, Value),
    /// The address of the value's home: `&x`.
    Address(Value),
}

impl Operand {
    /// The contained values, for liveness scanning.
    pub fn parts(&self) -> (Value, Option<Value>) {
        match *self {
            Operand::Direct(v) | Operand::Indirect(v) | Operand::Address(v) => (v, None),
            Operand::Subscript(base, index) => (base, Some(index)),
        }
    }

    /// True when the operand denotes a memory location rather than a
    /// value.
    pub fn is_memory(&self) -> bool {
        match self {
            Operand::Direct(Value::Sym { .. }) | Operand::Direct(Value::Slot(_)) => true,
            Operand::Indirect(_) | Operand::Subscript(..) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Direct(v) => write!(f, "{}", v),
            Operand::Indirect(v) => write!(f, "*{}", v),
            Operand::Subscript(base, index) => write!(f, "{}[{}]", base, index),
            Operand::Address(v) => write!(f, "&{}", v),
        }
    }
}

/// Comparison operators carried by branch instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl RelOp {
    /// The operator testing the opposite outcome.
    pub fn negated(self) -> RelOp {
        match self {
            RelOp::Equal => RelOp::NotEqual,
            RelOp::NotEqual => RelOp::Equal,
            RelOp::Less => RelOp::GreaterEqual,
            RelOp::LessEqual => RelOp::Greater,
            RelOp::Greater => RelOp::LessEqual,
            RelOp::GreaterEqual => RelOp::Less,
        }
    }

    /// The operator with its operands exchanged: `a < b` is `b > a`.
    pub fn swapped(self) -> RelOp {
        match self {
            RelOp::Equal => RelOp::Equal,
            RelOp::NotEqual => RelOp::NotEqual,
            RelOp::Less => RelOp::Greater,
            RelOp::LessEqual => RelOp::GreaterEqual,
            RelOp::Greater => RelOp::Less,
            RelOp::GreaterEqual => RelOp::LessEqual,
        }
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelOp::Equal => "==",
            RelOp::NotEqual => "!=",
            RelOp::Less => "<",
            RelOp::LessEqual => "<=",
            RelOp::Greater => ">",
            RelOp::GreaterEqual => ">=",
        };
        f.write_str(s)
    }
}

/// Binary opcodes, split by ALU class. `MulI`/`DivI` are the unsigned
/// forms, `ImulI`/`IdivI` the signed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    AddI,
    AddF,
    SubI,
    SubF,
    MulI,
    ImulI,
    MulF,
    DivI,
    IdivI,
    DivF,
    Mod,
    And,
    Or,
    Xor,
    LShift,
    RShift,
}

impl BinOp {
    pub fn class(self) -> OpClass {
        match self {
            BinOp::AddF | BinOp::SubF | BinOp::MulF | BinOp::DivF => OpClass::Float,
            _ => OpClass::Int,
        }
    }

    fn token(self) -> &'static str {
        match self {
            BinOp::AddI => "addi",
            BinOp::AddF => "addf",
            BinOp::SubI => "subi",
            BinOp::SubF => "subf",
            BinOp::MulI => "muli",
            BinOp::ImulI => "imuli",
            BinOp::MulF => "mulf",
            BinOp::DivI => "divi",
            BinOp::IdivI => "idivi",
            BinOp::DivF => "divf",
            BinOp::Mod => "mod",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::LShift => "lshift",
            BinOp::RShift => "rshift",
        }
    }
}

/// Unary opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    MinusI,
    MinusF,
}

impl UnOp {
    pub fn class(self) -> OpClass {
        match self {
            UnOp::MinusF => OpClass::Float,
            _ => OpClass::Int,
        }
    }

    fn token(self) -> &'static str {
        match self {
            UnOp::Not => "not",
            UnOp::MinusI => "minusi",
            UnOp::MinusF => "minusf",
        }
    }
}

/// Conversion opcodes, named source-to-destination. `Si` is signed
/// integer, `Ui` unsigned integer (pointers convert as `Ui`), `F`
/// floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvOp {
    SiSi,
    SiUi,
    UiSi,
    UiUi,
    SiF,
    UiF,
    FSi,
    FUi,
    FF,
}

impl ConvOp {
    fn tags(self) -> (&'static str, &'static str) {
        match self {
            ConvOp::SiSi => ("si", "si"),
            ConvOp::SiUi => ("si", "ui"),
            ConvOp::UiSi => ("ui", "si"),
            ConvOp::UiUi => ("ui", "ui"),
            ConvOp::SiF => ("si", "f"),
            ConvOp::UiF => ("ui", "f"),
            ConvOp::FSi => ("f", "si"),
            ConvOp::FUi => ("f", "ui"),
            ConvOp::FF => ("f", "f"),
        }
    }

    /// True when the source is a floating value.
    pub fn from_float(self) -> bool {
        matches!(self, ConvOp::FSi | ConvOp::FUi | ConvOp::FF)
    }

    /// True when the destination is a floating value.
    pub fn to_float(self) -> bool {
        matches!(self, ConvOp::SiF | ConvOp::UiF | ConvOp::FF)
    }
}

/// One three-address instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// `result = lhs op rhs`. `is_signed` matters only for `RShift` and
    /// `Mod`; multiply and divide encode signedness in the opcode.
    Bin {
        op: BinOp,
        width: OpWidth,
        is_signed: bool,
        result: Operand,
        lhs: Operand,
        rhs: Operand,
    },
    /// `result = op value`
    Un {
        op: UnOp,
        width: OpWidth,
        result: Operand,
        value: Operand,
    },
    /// `target = value`, a plain move or store.
    Assign {
        class: OpClass,
        width: OpWidth,
        target: Operand,
        value: Operand,
    },
    /// `result = (from => to) value`
    Conv {
        op: ConvOp,
        from_width: OpWidth,
        to_width: OpWidth,
        result: Operand,
        value: Operand,
    },
    /// Stage one call argument. Always immediately followed by further
    /// `Param`s or the owning `Call`.
    Param {
        class: ArgClass,
        width: OpWidth,
        value: Operand,
    },
    /// Call `target` with the `arg_count` preceding `Param`s.
    /// `stack_bytes` is this site's outgoing staging requirement.
    /// `variadic` calls report the float register count in `%al`.
    Call {
        result: Option<Operand>,
        class: OpClass,
        width: OpWidth,
        target: Operand,
        arg_count: u32,
        stack_bytes: u64,
        variadic: bool,
    },
    /// Conditional branch. Without a test this compares `lhs` against
    /// zero; `when_false` branches on the failed comparison.
    If {
        class: OpClass,
        when_false: bool,
        width: OpWidth,
        is_signed: bool,
        lhs: Operand,
        test: Option<(RelOp, Operand)>,
        target: LabelId,
    },
    /// Set the return value and jump to the function's return label.
    Return {
        class: OpClass,
        width: OpWidth,
        value: Option<Operand>,
    },
    Label(LabelId),
    Goto(LabelId),
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Bin {
                op, result, lhs, rhs, ..
            } => write!(f, "{} = {} {} {}", result, lhs, op.token(), rhs),
            Instr::Un { op, result, value, .. } => write!(f, "{} = {} {}", result, op.token(), value),
            Instr::Assign { target, value, .. } => write!(f, "{} = {}", target, value),
            Instr::Conv {
                op,
                from_width,
                to_width,
                result,
                value,
            } => {
                let (from, to) = op.tags();
                write!(
                    f,
                    "{} = ({}{}=>{}{}) {}",
                    result,
                    from,
                    from_width.bytes(),
                    to,
                    to_width.bytes(),
                    value
                )
            }
            Instr::Param { value, .. } => write!(f, "param {}", value),
            Instr::Call {
                result, target, arg_count, ..
            } => match result {
                Some(result) => write!(f, "{} = call {}, {}", result, target, arg_count),
                None => write!(f, "call {}, {}", target, arg_count),
            },
            Instr::If {
                class,
                when_false,
                lhs,
                test,
                target,
                ..
            } => {
                let name = match (when_false, class) {
                    (false, OpClass::Int) => "ifi",
                    (false, OpClass::Float) => "iff",
                    (true, OpClass::Int) => "iffalsei",
                    (true, OpClass::Float) => "iffalsef",
                };
                match test {
                    Some((relop, rhs)) => write!(f, "{} {} {} {} goto {}", name, lhs, relop, rhs, target),
                    None => write!(f, "{} {} goto {}", name, lhs, target),
                }
            }
            Instr::Return { class, value, .. } => match value {
                Some(value) => match class {
                    OpClass::Int => write!(f, "returni {}", value),
                    OpClass::Float => write!(f, "returnf {}", value),
                },
                None => f.write_str("return"),
            },
            Instr::Label(label) => write!(f, "{}:", label),
            Instr::Goto(label) => write!(f, "goto {}", label),
        }
    }
}

/// Scratch area in the frame, sized and aligned during lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub size: u64,
    pub align: u32,
}

/// One lowered function.
#[derive(Debug)]
pub struct IrFunction {
    pub symbol: SymbolEntryRef,
    pub name: StringId,
    /// External linkage, controls `.globl`.
    pub is_global: bool,
    pub params: Vec<SymbolEntryRef>,
    pub locals: Vec<SymbolEntryRef>,
    pub instrs: Vec<Instr>,
    /// The synthetic label every `Return` jumps to; the epilogue is
    /// emitted once, after it.
    pub return_label: LabelId,
    /// Where the incoming aggregate-return pointer is saved, for
    /// functions returning a struct or union by hidden pointer.
    pub sret_slot: Option<SlotId>,
    pub temp_count: u32,
    pub slots: Vec<SlotInfo>,
    /// Largest outgoing-call staging requirement over all call sites.
    pub max_outgoing: u64,
    pub span: SourceSpan,
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for instr in &self.instrs {
            match instr {
                Instr::Label(_) => writeln!(f, "{}", instr)?,
                _ => writeln!(f, "  {}", instr)?,
            }
        }
        Ok(())
    }
}

/// Read-only float constant, stored as raw bits so `0.0` and `-0.0`
/// stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatPoolEntry {
    pub bits: u64,
    pub is_single: bool,
}

/// The lowered unit: functions plus the literal pools they share.
/// Strings and floats draw labels from one `.LC` counter, so each entry
/// records its own id.
#[derive(Debug, Default)]
pub struct IrUnit {
    pub functions: Vec<IrFunction>,
    /// String spellings, escapes unprocessed.
    pub strings: Vec<(PoolId, StringId)>,
    pub floats: Vec<(PoolId, FloatPoolEntry)>,
}

impl fmt::Display for IrUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, function) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}
