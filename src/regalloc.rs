//! Register and stack-slot assignment over the lowered IR.
//!
//! Allocation runs per function in two stages. A liveness pass walks
//! the instruction list once forward to index call sites and once
//! backward to record each temporary's final read; staging an argument
//! counts as a read at the owning `Call`, not at the `Param` itself.
//! The allocator then replays the instructions in order and hands each
//! freshly written temporary either a register from its class pool or
//! a frame slot. Temporaries are expression-scoped and never live
//! across a backward jump, so the straight-line interval from first
//! write to last read is exact.
//!
//! A temporary that is live into or across any call is homed on the
//! stack from the start. Every pool register is therefore dead at
//! every call site, and the emitter is free to clobber argument
//! registers while it stages a call. Within one instruction the left
//! source is released before the result is placed and the right
//! source after it, so a result may reuse its left operand's register
//! but never its right operand's.

use hashbrown::HashMap;

use crate::context::CompilationContext;
use crate::ir::{Instr, IrFunction, OpClass, OpWidth, Operand, TempId, Value};
use crate::semantic::SymbolEntryRef;

#[cfg(test)]
mod tests_alloc;

/// An x86-64 register. `name` yields the AT&T spelling for a given
/// operand width; XMM registers have a single spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Rax,
    Rcx,
    Rdx,
    Rbx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Xmm(u8),
}

const XMM_NAMES: [&str; 16] = [
    "%xmm0", "%xmm1", "%xmm2", "%xmm3", "%xmm4", "%xmm5", "%xmm6", "%xmm7", "%xmm8", "%xmm9",
    "%xmm10", "%xmm11", "%xmm12", "%xmm13", "%xmm14", "%xmm15",
];

impl Reg {
    pub fn name(self, width: OpWidth) -> &'static str {
        let names: [&'static str; 4] = match self {
            Reg::Rax => ["%al", "%ax", "%eax", "%rax"],
            Reg::Rcx => ["%cl", "%cx", "%ecx", "%rcx"],
            Reg::Rdx => ["%dl", "%dx", "%edx", "%rdx"],
            Reg::Rbx => ["%bl", "%bx", "%ebx", "%rbx"],
            Reg::Rsi => ["%sil", "%si", "%esi", "%rsi"],
            Reg::Rdi => ["%dil", "%di", "%edi", "%rdi"],
            Reg::Rbp => ["%bpl", "%bp", "%ebp", "%rbp"],
            Reg::Rsp => ["%spl", "%sp", "%esp", "%rsp"],
            Reg::R8 => ["%r8b", "%r8w", "%r8d", "%r8"],
            Reg::R9 => ["%r9b", "%r9w", "%r9d", "%r9"],
            Reg::R10 => ["%r10b", "%r10w", "%r10d", "%r10"],
            Reg::R11 => ["%r11b", "%r11w", "%r11d", "%r11"],
            Reg::R12 => ["%r12b", "%r12w", "%r12d", "%r12"],
            Reg::R13 => ["%r13b", "%r13w", "%r13d", "%r13"],
            Reg::R14 => ["%r14b", "%r14w", "%r14d", "%r14"],
            Reg::R15 => ["%r15b", "%r15w", "%r15d", "%r15"],
            Reg::Xmm(n) => return XMM_NAMES[n as usize],
        };
        names[width as usize]
    }

    pub fn is_float(self) -> bool {
        matches!(self, Reg::Xmm(_))
    }
}

/// Integer argument registers in ABI order.
pub const INT_ARGS: [Reg; 6] = [Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

/// Floating argument registers in ABI order.
pub const FLOAT_ARGS: [Reg; 8] = [
    Reg::Xmm(0),
    Reg::Xmm(1),
    Reg::Xmm(2),
    Reg::Xmm(3),
    Reg::Xmm(4),
    Reg::Xmm(5),
    Reg::Xmm(6),
    Reg::Xmm(7),
];

// Registers handed to temporaries. %rax, %rcx and %rdx stay out of the
// pools for the emitter's fixed-register patterns (division, shifts,
// address arithmetic), and the callee-saved registers are never
// touched, so the prologue saves nothing. Argument registers can be
// pooled because no temporary holds a register across a call.
const INT_POOL: [Reg; 6] = [Reg::Rsi, Reg::Rdi, Reg::R8, Reg::R9, Reg::R10, Reg::R11];
const FLOAT_POOL: [Reg; 14] = [
    Reg::Xmm(2),
    Reg::Xmm(3),
    Reg::Xmm(4),
    Reg::Xmm(5),
    Reg::Xmm(6),
    Reg::Xmm(7),
    Reg::Xmm(8),
    Reg::Xmm(9),
    Reg::Xmm(10),
    Reg::Xmm(11),
    Reg::Xmm(12),
    Reg::Xmm(13),
    Reg::Xmm(14),
    Reg::Xmm(15),
];

/// Where a temporary lives for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Reg(Reg),
    /// %rbp-relative frame offset.
    Spill(i64),
}

/// Stack frame shape for one function.
///
/// Offsets are relative to %rbp: locals, spilled parameters, lowering
/// slots, and temporary homes are negative; stack-passed parameters
/// sit at 16 and up in the caller's frame. `frame_size` is the `subq`
/// amount, always a multiple of 16 so calls stay aligned, and covers
/// the outgoing argument staging area which the emitter addresses from
/// 0(%rsp).
#[derive(Debug)]
pub struct FrameLayout {
    pub frame_size: u64,
    pub homes: HashMap<SymbolEntryRef, i64>,
    pub slot_offsets: Vec<i64>,
    /// Incoming register parameters paired with the frame home the
    /// prologue stores each one to. The hidden aggregate-return
    /// pointer, when present, is the first entry.
    pub reg_params: Vec<(Reg, OpWidth, i64)>,
}

/// Allocation result for one function.
#[derive(Debug)]
pub struct Allocation {
    locations: Vec<Location>,
    pub frame: FrameLayout,
}

impl Allocation {
    pub fn location(&self, temp: TempId) -> Location {
        self.locations[temp.0 as usize]
    }
}

pub fn allocate_function(ctx: &mut CompilationContext, function: &IrFunction) -> Allocation {
    let liveness = Liveness::analyze(function);
    let (mut frame, depth) = lay_out_frame(ctx, function);
    let mut allocator = Allocator::new(&liveness, function, depth);
    allocator.run(function);
    frame.frame_size = round_up(allocator.depth + function.max_outgoing, 16);
    let locations = allocator
        .locations
        .into_iter()
        .map(|slot| slot.expect("every temporary has a defining write"))
        .collect();
    Allocation { locations, frame }
}

pub(crate) fn round_up(value: u64, align: u64) -> u64 {
    (value + align - 1) / align * align
}

// === Liveness ===

pub(crate) struct Liveness {
    /// Index of each temporary's final read, by temporary.
    last_use: Vec<Option<u32>>,
    /// Number of `Call` instructions at indices `0..=i`, by index.
    calls_through: Vec<u32>,
}

impl Liveness {
    pub(crate) fn analyze(function: &IrFunction) -> Liveness {
        let mut calls_through = vec![0u32; function.instrs.len()];
        let mut seen = 0;
        for (index, instr) in function.instrs.iter().enumerate() {
            if matches!(instr, Instr::Call { .. }) {
                seen += 1;
            }
            calls_through[index] = seen;
        }

        let mut last_use = vec![None; function.temp_count as usize];
        let mut pending_call = None;
        for (index, instr) in function.instrs.iter().enumerate().rev() {
            let index = index as u32;
            if matches!(instr, Instr::Call { .. }) {
                pending_call = Some(index);
            }
            let use_at = match instr {
                Instr::Param { .. } => pending_call.unwrap_or(index),
                _ => index,
            };
            each_source(instr, |value| {
                if let Value::Temp(temp) = value {
                    let slot = &mut last_use[temp.0 as usize];
                    if slot.is_none_or(|known| known < use_at) {
                        *slot = Some(use_at);
                    }
                }
            });
        }

        Liveness {
            last_use,
            calls_through,
        }
    }

    pub(crate) fn last_use_of(&self, temp: TempId) -> Option<u32> {
        self.last_use[temp.0 as usize]
    }

    /// True when a call executes after `def` and no later than `last`.
    pub(crate) fn call_between(&self, def: u32, last: u32) -> bool {
        self.calls_through[last as usize] > self.calls_through[def as usize]
    }
}

/// Visit every value an instruction reads. The written place of an
/// `Assign` counts only through its address parts; a stored-to memory
/// operand reads its base and index, a stored-to temporary reads
/// nothing.
fn each_source(instr: &Instr, mut f: impl FnMut(Value)) {
    let mut operand = |op: &Operand| {
        let (base, index) = op.parts();
        f(base);
        if let Some(index) = index {
            f(index);
        }
    };
    match instr {
        Instr::Bin { lhs, rhs, .. } => {
            operand(lhs);
            operand(rhs);
        }
        Instr::Un { value, .. } | Instr::Conv { value, .. } | Instr::Param { value, .. } => {
            operand(value);
        }
        Instr::Assign { target, value, .. } => {
            operand(value);
            if !matches!(target, Operand::Direct(Value::Temp(_))) {
                operand(target);
            }
        }
        Instr::Call { target, .. } => operand(target),
        Instr::If { lhs, test, .. } => {
            operand(lhs);
            if let Some((_, rhs)) = test {
                operand(rhs);
            }
        }
        Instr::Return {
            value: Some(value), ..
        } => operand(value),
        Instr::Return { value: None, .. } | Instr::Label(_) | Instr::Goto(_) => {}
    }
}

/// The temporary an instruction writes, with its class, if any.
fn def_of(instr: &Instr) -> Option<(TempId, OpClass)> {
    let (result, class) = match instr {
        Instr::Bin { op, result, .. } => (result, op.class()),
        Instr::Un { op, result, .. } => (result, op.class()),
        Instr::Conv { op, result, .. } => {
            let class = if op.to_float() {
                OpClass::Float
            } else {
                OpClass::Int
            };
            (result, class)
        }
        Instr::Assign { class, target, .. } => (target, *class),
        Instr::Call {
            result: Some(result),
            class,
            ..
        } => (result, *class),
        _ => return None,
    };
    match result {
        Operand::Direct(Value::Temp(temp)) => Some((*temp, class)),
        _ => None,
    }
}

// === Allocation ===

struct Allocator<'a> {
    liveness: &'a Liveness,
    /// Temporaries grouped by the instruction index where they die.
    expiry: Vec<Vec<TempId>>,
    locations: Vec<Option<Location>>,
    int_pool: [Option<TempId>; INT_POOL.len()],
    float_pool: [Option<TempId>; FLOAT_POOL.len()],
    /// Bytes claimed below %rbp so far.
    depth: u64,
}

impl<'a> Allocator<'a> {
    fn new(liveness: &'a Liveness, function: &IrFunction, depth: u64) -> Allocator<'a> {
        let mut expiry = vec![Vec::new(); function.instrs.len()];
        for (temp, slot) in liveness.last_use.iter().enumerate() {
            if let Some(last) = slot {
                expiry[*last as usize].push(TempId(temp as u32));
            }
        }
        Allocator {
            liveness,
            expiry,
            locations: vec![None; function.temp_count as usize],
            int_pool: [None; INT_POOL.len()],
            float_pool: [None; FLOAT_POOL.len()],
            depth,
        }
    }

    fn run(&mut self, function: &IrFunction) {
        for (index, instr) in function.instrs.iter().enumerate() {
            let index = index as u32;
            // Sources the emitter consumes before it writes the result
            // may hand their register straight to that result.
            match instr {
                Instr::Bin { lhs, .. } => self.release_dying(lhs, index),
                Instr::Un { value, .. }
                | Instr::Conv { value, .. }
                | Instr::Assign { value, .. } => self.release_dying(value, index),
                _ => {}
            }
            let def = def_of(instr);
            if let Some((temp, class)) = def {
                self.define(temp, class, index);
            }
            for temp in std::mem::take(&mut self.expiry[index as usize]) {
                self.free(temp);
            }
            // A result nothing ever reads occupies its register for
            // this instruction only.
            if let Some((temp, _)) = def {
                if self.liveness.last_use_of(temp).is_none() {
                    self.free(temp);
                }
            }
        }
    }

    fn define(&mut self, temp: TempId, class: OpClass, index: u32) {
        if self.locations[temp.0 as usize].is_some() {
            // A second write along another control path keeps the home
            // picked at the first.
            return;
        }
        let location = self.assign(temp, class, index);
        self.locations[temp.0 as usize] = Some(location);
    }

    /// Pick a home for a freshly written temporary. Anything live into
    /// or across a call goes straight to the stack; everything else
    /// takes the first free register of its class, evicting the
    /// occupant with the most distant next use when the pool is full.
    fn assign(&mut self, temp: TempId, class: OpClass, index: u32) -> Location {
        if let Some(last) = self.liveness.last_use_of(temp) {
            if self.liveness.call_between(index, last) {
                return Location::Spill(self.new_spill());
            }
        }

        let liveness = self.liveness;
        let (pool, names) = self.pool_of(class);
        if let Some(free) = pool.iter().position(Option::is_none) {
            pool[free] = Some(temp);
            return Location::Reg(names[free]);
        }

        let mut victim_slot = 0;
        let mut victim_last = 0;
        for (slot, occupant) in pool.iter().enumerate() {
            if let Some(occupant) = *occupant {
                let last = liveness.last_use_of(occupant).unwrap_or(0);
                if last >= victim_last {
                    victim_slot = slot;
                    victim_last = last;
                }
            }
        }
        let victim = pool[victim_slot].take().expect("evicting from a full pool");
        pool[victim_slot] = Some(temp);
        let register = names[victim_slot];

        // The victim moves to the stack retroactively: its location is
        // final only once the whole function has been walked, so every
        // reference to it, earlier ones included, reads the slot.
        let home = self.new_spill();
        self.locations[victim.0 as usize] = Some(Location::Spill(home));
        Location::Reg(register)
    }

    fn release_dying(&mut self, operand: &Operand, index: u32) {
        let (base, extra) = operand.parts();
        for value in [Some(base), extra].into_iter().flatten() {
            if let Value::Temp(temp) = value {
                if self.liveness.last_use_of(temp) == Some(index) {
                    self.free(temp);
                }
            }
        }
    }

    fn free(&mut self, temp: TempId) {
        let Some(Location::Reg(register)) = self.locations[temp.0 as usize] else {
            return;
        };
        let (pool, names) = self.pool_of(if register.is_float() {
            OpClass::Float
        } else {
            OpClass::Int
        });
        if let Some(slot) = names.iter().position(|&name| name == register) {
            // Only the current occupant may be cleared; the register
            // can already belong to a later temporary.
            if pool[slot] == Some(temp) {
                pool[slot] = None;
            }
        }
    }

    fn pool_of(&mut self, class: OpClass) -> (&mut [Option<TempId>], &'static [Reg]) {
        match class {
            OpClass::Int => (&mut self.int_pool, &INT_POOL),
            OpClass::Float => (&mut self.float_pool, &FLOAT_POOL),
        }
    }

    fn new_spill(&mut self) -> i64 {
        self.depth = round_up(self.depth, 8) + 8;
        -(self.depth as i64)
    }
}

// === Frame layout ===

/// Claim frame space for locals, spilled register parameters, and
/// lowering slots, in that order. Returns the layout with the bytes
/// claimed so far; the allocator extends the depth with temporary
/// homes before the final frame size is rounded.
fn lay_out_frame(ctx: &mut CompilationContext, function: &IrFunction) -> (FrameLayout, u64) {
    let mut homes = HashMap::new();
    let mut depth = 0u64;

    for &local in &function.locals {
        let ty = ctx.symbols.entry(local).type_info.ty;
        let (size, align) = ctx.types.ensure_layout(ty).unwrap_or((0, 1));
        depth = round_up(depth, align as u64) + size;
        homes.insert(local, -(depth as i64));
    }

    // Incoming parameters, walked in the same order the caller stages
    // them. Register arrivals spill below %rbp; stack arrivals and all
    // aggregates keep their caller-frame offsets above it.
    let mut reg_params = Vec::new();
    let mut int_used = usize::from(function.sret_slot.is_some());
    let mut float_used = 0;
    let mut stack_off = 0u64;
    for &param in &function.params {
        let ty = ctx.symbols.entry(param).type_info.ty;
        let kind = ctx.types.kind(ty).clone();
        let (size, align) = ctx.types.ensure_layout(ty).unwrap_or((8, 8));
        if kind.is_record() {
            homes.insert(param, (16 + stack_off) as i64);
            stack_off += round_up(size, 8);
            continue;
        }
        let takes_reg = if kind.is_floating() {
            float_used < FLOAT_ARGS.len()
        } else {
            int_used < INT_ARGS.len()
        };
        if takes_reg {
            let register = if kind.is_floating() {
                float_used += 1;
                FLOAT_ARGS[float_used - 1]
            } else {
                int_used += 1;
                INT_ARGS[int_used - 1]
            };
            depth = round_up(depth, align as u64) + size;
            homes.insert(param, -(depth as i64));
            reg_params.push((register, OpWidth::from_size(size), -(depth as i64)));
        } else {
            homes.insert(param, (16 + stack_off) as i64);
            stack_off += 8;
        }
    }

    let mut slot_offsets = Vec::with_capacity(function.slots.len());
    for info in &function.slots {
        depth = round_up(depth, info.align as u64) + info.size;
        slot_offsets.push(-(depth as i64));
    }
    if let Some(sret) = function.sret_slot {
        reg_params.insert(0, (Reg::Rdi, OpWidth::Q, slot_offsets[sret.0 as usize]));
    }

    let frame = FrameLayout {
        frame_size: 0,
        homes,
        slot_offsets,
        reg_params,
    };
    (frame, depth)
}
