//! AST to three-address lowering.
//!
//! One pass over each function body produces the instruction list. The
//! parser already made every conversion explicit and resolved every
//! name, so lowering is mostly shape translation: control flow becomes
//! labels and conditional jumps, logical operators and comparisons
//! become branch sequences that materialize 0 or 1, and member or
//! subscript accesses become address arithmetic over temporaries.
//!
//! Calls follow a fixed protocol: arguments are evaluated fully, left
//! to right, into temporaries, then staged with `Param` instructions
//! that immediately precede their `Call`. Aggregates are passed and
//! returned through memory; a function returning a struct or union
//! receives a hidden pointer as its first integer argument and the
//! caller provides a scratch slot for it.

use hashbrown::HashMap;
use indexmap::IndexMap;

use crate::ast::{Ast, BinaryOp, FunctionDef, NodeKind, NodeRef, TranslationUnit, UnaryOp};
use crate::context::CompilationContext;
use crate::intern::StringId;
use crate::ir::{
    ArgClass, BinOp, ConvOp, FloatPoolEntry, Instr, IrFunction, IrUnit, LabelId, OpClass, OpWidth, Operand, PoolId,
    RelOp, SlotId, SlotInfo, TempId, UnOp, Value,
};
use crate::semantic::types::BitPlacement;
use crate::semantic::{QualType, SymbolEntryRef, SymbolKind, TypeKind};

/// Lower every function in the unit. Must only run on an error-free
/// parse; error recovery nodes never reach this pass.
pub fn lower_unit(ctx: &mut CompilationContext, ast: &Ast, unit: &TranslationUnit) -> IrUnit {
    let mut lowerer = Lowerer::new(ctx, ast);
    let mut functions = Vec::with_capacity(unit.functions.len());
    for def in &unit.functions {
        functions.push(lowerer.lower_function(def));
    }
    IrUnit {
        functions,
        strings: lowerer.string_pool.into_iter().map(|(spelling, id)| (id, spelling)).collect(),
        floats: lowerer.float_pool.into_values().collect(),
    }
}

/// A memory location plus the bit-field placement when the location is
/// a bit-field's storage unit.
struct Place {
    op: Operand,
    bit: Option<BitField>,
}

impl Place {
    fn plain(op: Operand) -> Place {
        Place { op, bit: None }
    }
}

struct BitField {
    placement: BitPlacement,
    /// Width of the storage unit, from the declared member type.
    unit: OpWidth,
    is_signed: bool,
}

impl BitField {
    /// Shift-register width: bit operations run at four bytes minimum
    /// so int-sized fields never overflow their register.
    fn reg_width(&self) -> OpWidth {
        self.unit.max(OpWidth::L)
    }

    fn mask(&self) -> u64 {
        if self.placement.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.placement.width) - 1
        }
    }
}

struct Lowerer<'a> {
    ctx: &'a mut CompilationContext,
    ast: &'a Ast,

    // Unit-wide state. Labels number one stream so every function in
    // the assembly file gets distinct local labels, and literal pool
    // entries are deduplicated across functions in first-use order.
    label_count: u32,
    pool_count: u32,
    string_pool: IndexMap<StringId, PoolId>,
    float_pool: IndexMap<(u64, bool), (PoolId, FloatPoolEntry)>,

    // Per-function state, reset by `lower_function`.
    instrs: Vec<Instr>,
    temp_count: u32,
    slots: Vec<SlotInfo>,
    user_labels: HashMap<SymbolEntryRef, LabelId>,
    break_targets: Vec<LabelId>,
    continue_targets: Vec<LabelId>,
    return_label: LabelId,
    return_type: QualType,
    sret_slot: Option<SlotId>,
    max_outgoing: u64,
}

impl<'a> Lowerer<'a> {
    fn new(ctx: &'a mut CompilationContext, ast: &'a Ast) -> Self {
        let void = QualType::unqualified(ctx.types.type_void);
        Lowerer {
            ctx,
            ast,
            label_count: 0,
            pool_count: 0,
            string_pool: IndexMap::new(),
            float_pool: IndexMap::new(),
            instrs: Vec::new(),
            temp_count: 0,
            slots: Vec::new(),
            user_labels: HashMap::new(),
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            return_label: LabelId(0),
            return_type: void,
            sret_slot: None,
            max_outgoing: 0,
        }
    }

    // === Id and pool management ===

    fn emit(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    fn new_temp(&mut self) -> TempId {
        let id = TempId(self.temp_count);
        self.temp_count += 1;
        id
    }

    fn temp_operand(&mut self) -> Operand {
        Operand::Direct(Value::Temp(self.new_temp()))
    }

    fn new_label(&mut self) -> LabelId {
        let id = LabelId(self.label_count);
        self.label_count += 1;
        id
    }

    fn new_slot(&mut self, size: u64, align: u32) -> SlotId {
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(SlotInfo { size, align });
        id
    }

    fn pool_string(&mut self, spelling: StringId) -> PoolId {
        if let Some(&id) = self.string_pool.get(&spelling) {
            return id;
        }
        let id = PoolId(self.pool_count);
        self.pool_count += 1;
        self.string_pool.insert(spelling, id);
        id
    }

    fn pool_float(&mut self, value: f64, is_single: bool) -> PoolId {
        let bits = if is_single {
            (value as f32).to_bits() as u64
        } else {
            value.to_bits()
        };
        if let Some(&(id, _)) = self.float_pool.get(&(bits, is_single)) {
            return id;
        }
        let id = PoolId(self.pool_count);
        self.pool_count += 1;
        self.float_pool.insert((bits, is_single), (id, FloatPoolEntry { bits, is_single }));
        id
    }

    fn label_for(&mut self, sym: SymbolEntryRef) -> LabelId {
        if let Some(&label) = self.user_labels.get(&sym) {
            return label;
        }
        let label = self.new_label();
        self.user_labels.insert(sym, label);
        label
    }

    // === Type queries ===

    fn sym_value(&self, sym: SymbolEntryRef) -> Value {
        Value::Sym {
            sym,
            name: self.ctx.symbols.entry(sym).name,
        }
    }

    /// Operation class, width, and signedness of a scalar type.
    fn meta(&mut self, qt: QualType) -> (OpClass, OpWidth, bool) {
        let kind = self.ctx.types.kind(qt.ty).clone();
        if kind.is_floating() {
            let width = if matches!(kind, TypeKind::Float) {
                OpWidth::L
            } else {
                OpWidth::Q
            };
            return (OpClass::Float, width, true);
        }
        if kind.is_pointer() || kind.is_function() {
            return (OpClass::Int, OpWidth::Q, false);
        }
        let size = self.ctx.types.size_of(qt.ty).unwrap_or(8);
        (OpClass::Int, OpWidth::from_size(size), kind.is_signed())
    }

    fn size_align(&mut self, qt: QualType) -> (u64, u32) {
        self.ctx.types.ensure_layout(qt.ty).unwrap_or((0, 1))
    }

    fn is_record(&self, qt: QualType) -> bool {
        self.ctx.types.kind(qt.ty).is_record()
    }

    // === Function lowering ===

    fn lower_function(&mut self, def: &FunctionDef) -> IrFunction {
        self.instrs = Vec::new();
        self.temp_count = 0;
        self.slots = Vec::new();
        self.user_labels.clear();
        self.break_targets.clear();
        self.continue_targets.clear();
        self.max_outgoing = 0;
        self.sret_slot = None;
        self.return_label = self.new_label();

        let entry = self.ctx.symbols.entry(def.symbol).clone();
        self.return_type = self
            .ctx
            .types
            .return_type_of(entry.type_info.ty)
            .unwrap_or_else(|| self.ctx.types.error_type());

        if self.is_record(self.return_type) {
            let slot = self.new_slot(8, 8);
            self.sret_slot = Some(slot);
        }

        self.lower_stmt(def.body);

        // main returns 0 when control falls off the end
        if entry.name.as_str() == "main" {
            self.emit(Instr::Return {
                class: OpClass::Int,
                width: OpWidth::L,
                value: Some(Operand::Direct(Value::IntConst(0))),
            });
        }
        self.emit(Instr::Label(self.return_label));

        IrFunction {
            symbol: def.symbol,
            name: entry.name,
            is_global: !entry.is_static(),
            params: def.parameters.clone(),
            locals: def.locals.clone(),
            instrs: std::mem::take(&mut self.instrs),
            return_label: self.return_label,
            sret_slot: self.sret_slot,
            temp_count: self.temp_count,
            slots: std::mem::take(&mut self.slots),
            max_outgoing: self.max_outgoing,
            span: def.span,
        }
    }

    // === Statements ===

    fn lower_stmt(&mut self, node: NodeRef) {
        let ast = self.ast;
        match ast.get_kind(node) {
            NodeKind::Compound(_, statements) => {
                for &statement in statements {
                    self.lower_stmt(statement);
                }
            }
            &NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.lower_if(condition, then_branch, else_branch),
            &NodeKind::While { condition, body } => self.lower_while(condition, body),
            &NodeKind::DoWhile { body, condition } => self.lower_do_while(body, condition),
            &NodeKind::For {
                init,
                condition,
                increment,
                body,
                ..
            } => self.lower_for(init, condition, increment, body),
            &NodeKind::Return(value) => self.lower_return(value),
            NodeKind::Break => {
                let target = *self.break_targets.last().unwrap_or(&self.return_label);
                self.emit(Instr::Goto(target));
            }
            NodeKind::Continue => {
                let target = *self.continue_targets.last().unwrap_or(&self.return_label);
                self.emit(Instr::Goto(target));
            }
            &NodeKind::Goto(sym) => {
                let target = self.label_for(sym);
                self.emit(Instr::Goto(target));
            }
            &NodeKind::Labeled(sym, statement) => {
                let label = self.label_for(sym);
                self.emit(Instr::Label(label));
                self.lower_stmt(statement);
            }
            &NodeKind::ExpressionStatement(expr) => self.lower_expr_discard(expr),
            NodeKind::Empty | NodeKind::Error => {}
            // Declarations expand to assignment expressions in block
            // statement lists, so an expression here is an initializer
            _ => self.lower_expr_discard(node),
        }
    }

    fn lower_if(&mut self, condition: NodeRef, then_branch: NodeRef, else_branch: Option<NodeRef>) {
        match else_branch {
            None => {
                let end = self.new_label();
                self.branch(condition, end, false);
                self.lower_stmt(then_branch);
                self.emit(Instr::Label(end));
            }
            Some(else_branch) => {
                let other = self.new_label();
                let end = self.new_label();
                self.branch(condition, other, false);
                self.lower_stmt(then_branch);
                self.emit(Instr::Goto(end));
                self.emit(Instr::Label(other));
                self.lower_stmt(else_branch);
                self.emit(Instr::Label(end));
            }
        }
    }

    fn lower_while(&mut self, condition: NodeRef, body: NodeRef) {
        let head = self.new_label();
        let end = self.new_label();
        self.emit(Instr::Label(head));
        self.branch(condition, end, false);
        self.break_targets.push(end);
        self.continue_targets.push(head);
        self.lower_stmt(body);
        self.break_targets.pop();
        self.continue_targets.pop();
        self.emit(Instr::Goto(head));
        self.emit(Instr::Label(end));
    }

    fn lower_do_while(&mut self, body: NodeRef, condition: NodeRef) {
        let head = self.new_label();
        let test = self.new_label();
        let end = self.new_label();
        self.emit(Instr::Label(head));
        self.break_targets.push(end);
        self.continue_targets.push(test);
        self.lower_stmt(body);
        self.break_targets.pop();
        self.continue_targets.pop();
        self.emit(Instr::Label(test));
        self.branch(condition, head, true);
        self.emit(Instr::Label(end));
    }

    fn lower_for(&mut self, init: Option<NodeRef>, condition: Option<NodeRef>, increment: Option<NodeRef>, body: NodeRef) {
        if let Some(init) = init {
            self.lower_stmt(init);
        }
        let head = self.new_label();
        let step = self.new_label();
        let end = self.new_label();
        self.emit(Instr::Label(head));
        if let Some(condition) = condition {
            self.branch(condition, end, false);
        }
        self.break_targets.push(end);
        self.continue_targets.push(step);
        self.lower_stmt(body);
        self.break_targets.pop();
        self.continue_targets.pop();
        self.emit(Instr::Label(step));
        if let Some(increment) = increment {
            self.lower_expr_discard(increment);
        }
        self.emit(Instr::Goto(head));
        self.emit(Instr::Label(end));
    }

    fn lower_return(&mut self, value: Option<NodeRef>) {
        match value {
            None => self.emit(Instr::Return {
                class: OpClass::Int,
                width: OpWidth::L,
                value: None,
            }),
            Some(value) if self.is_record(self.return_type) => {
                // Copy through the saved hidden pointer, then hand the
                // pointer back in the return register
                let src = self.lower_expr(value);
                let sret = self.sret_slot.unwrap_or_else(|| self.new_slot(8, 8));
                let pointer = self.temp_operand();
                self.emit(Instr::Assign {
                    class: OpClass::Int,
                    width: OpWidth::Q,
                    target: pointer,
                    value: Operand::Direct(Value::Slot(sret)),
                });
                let (size, _) = self.size_align(self.return_type);
                let (pointer_value, _) = pointer.parts();
                self.copy_aggregate(Operand::Indirect(pointer_value), src, size);
                self.emit(Instr::Return {
                    class: OpClass::Int,
                    width: OpWidth::Q,
                    value: Some(Operand::Direct(Value::Slot(sret))),
                });
            }
            Some(value) => {
                let operand = self.lower_expr(value);
                let (class, width, _) = self.meta(self.return_type);
                self.emit(Instr::Return {
                    class,
                    width,
                    value: Some(operand),
                });
            }
        }
    }

    // === Conditions ===

    /// Emit a jump to `target` taken when the condition's truth value
    /// equals `jump_when`. Logical operators decompose into chained
    /// branches, and comparisons fuse into the jump instruction.
    fn branch(&mut self, condition: NodeRef, target: LabelId, jump_when: bool) {
        let ast = self.ast;
        match ast.get_kind(condition) {
            &NodeKind::ConstInt(value) => {
                if (value != 0) == jump_when {
                    self.emit(Instr::Goto(target));
                }
            }
            &NodeKind::Binary(BinaryOp::LogicAnd, lhs, rhs) => {
                if jump_when {
                    let skip = self.new_label();
                    self.branch(lhs, skip, false);
                    self.branch(rhs, target, true);
                    self.emit(Instr::Label(skip));
                } else {
                    self.branch(lhs, target, false);
                    self.branch(rhs, target, false);
                }
            }
            &NodeKind::Binary(BinaryOp::LogicOr, lhs, rhs) => {
                if jump_when {
                    self.branch(lhs, target, true);
                    self.branch(rhs, target, true);
                } else {
                    let skip = self.new_label();
                    self.branch(lhs, skip, true);
                    self.branch(rhs, target, false);
                    self.emit(Instr::Label(skip));
                }
            }
            &NodeKind::Unary(UnaryOp::LogicNot, operand) => self.branch(operand, target, !jump_when),
            &NodeKind::Binary(op, lhs, rhs) if op.is_relational() => {
                let (class, width, is_signed) = self.meta(ast.get_type(lhs));
                let lhs_op = self.lower_expr(lhs);
                let rhs_op = self.lower_expr(rhs);
                self.emit(Instr::If {
                    class,
                    when_false: !jump_when,
                    width,
                    is_signed,
                    lhs: lhs_op,
                    test: Some((relop_of(op), rhs_op)),
                    target,
                });
            }
            &NodeKind::Binary(BinaryOp::Comma, lhs, rhs) => {
                self.lower_expr_discard(lhs);
                self.branch(rhs, target, jump_when);
            }
            _ => {
                let (class, width, is_signed) = self.meta(ast.get_type(condition));
                let operand = self.lower_expr(condition);
                self.emit(Instr::If {
                    class,
                    when_false: !jump_when,
                    width,
                    is_signed,
                    lhs: operand,
                    test: None,
                    target,
                });
            }
        }
    }

    /// Materialize a condition as 0 or 1.
    fn bool_value(&mut self, condition: NodeRef) -> Operand {
        let result = self.temp_operand();
        let end = self.new_label();
        self.emit(Instr::Assign {
            class: OpClass::Int,
            width: OpWidth::L,
            target: result,
            value: Operand::Direct(Value::IntConst(1)),
        });
        self.branch(condition, end, true);
        self.emit(Instr::Assign {
            class: OpClass::Int,
            width: OpWidth::L,
            target: result,
            value: Operand::Direct(Value::IntConst(0)),
        });
        self.emit(Instr::Label(end));
        result
    }

    /// Collapse an already-lowered scalar to 0 or 1, optionally negated.
    fn normalize_bool(&mut self, operand: Operand, class: OpClass, width: OpWidth, negate: bool) -> Operand {
        if let Operand::Direct(Value::IntConst(value)) = operand {
            return Operand::Direct(Value::IntConst(((value != 0) != negate) as i64));
        }
        let result = self.temp_operand();
        let end = self.new_label();
        let (when_true, when_false) = if negate { (0, 1) } else { (1, 0) };
        self.emit(Instr::Assign {
            class: OpClass::Int,
            width: OpWidth::L,
            target: result,
            value: Operand::Direct(Value::IntConst(when_true)),
        });
        self.emit(Instr::If {
            class,
            when_false: false,
            width,
            is_signed: false,
            lhs: operand,
            test: None,
            target: end,
        });
        self.emit(Instr::Assign {
            class: OpClass::Int,
            width: OpWidth::L,
            target: result,
            value: Operand::Direct(Value::IntConst(when_false)),
        });
        self.emit(Instr::Label(end));
        result
    }

    // === Expressions ===

    fn lower_expr(&mut self, node: NodeRef) -> Operand {
        let ast = self.ast;
        match ast.get_kind(node) {
            &NodeKind::ConstInt(value) => Operand::Direct(Value::IntConst(value)),
            &NodeKind::ConstFloat(value) => {
                let (_, width, _) = self.meta(ast.get_type(node));
                let pool = self.pool_float(value, width == OpWidth::L);
                Operand::Direct(Value::FloatConst(pool))
            }
            &NodeKind::ConstString(spelling) => {
                let pool = self.pool_string(spelling);
                Operand::Direct(Value::StrConst(pool))
            }
            &NodeKind::Ident(sym) => match self.ctx.symbols.entry(sym).kind {
                SymbolKind::EnumConstant { value } => Operand::Direct(Value::IntConst(value)),
                SymbolKind::Function { .. } => Operand::Address(self.sym_value(sym)),
                _ => Operand::Direct(self.sym_value(sym)),
            },
            &NodeKind::Unary(op, operand) => self.lower_unary(node, op, operand),
            &NodeKind::Binary(op, lhs, rhs) => self.lower_binary(node, op, lhs, rhs),
            &NodeKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => self.lower_conditional(node, condition, then_expr, else_expr, true),
            &NodeKind::Assign(lhs, rhs) => self.lower_assign(lhs, rhs, true),
            &NodeKind::CompoundAssign { op, lhs, rhs, op_type } => self.lower_compound_assign(op, lhs, rhs, op_type, true),
            &NodeKind::PreIncrement(operand) => self.lower_step(operand, true, false, true),
            &NodeKind::PreDecrement(operand) => self.lower_step(operand, false, false, true),
            &NodeKind::PostIncrement(operand) => self.lower_step(operand, true, true, true),
            &NodeKind::PostDecrement(operand) => self.lower_step(operand, false, true, true),
            NodeKind::Call(callee, arguments) => {
                let callee = *callee;
                let arguments = arguments.clone();
                self.lower_call(callee, &arguments, true)
            }
            NodeKind::Member(..) | NodeKind::Index(..) => {
                let place = self.lower_place(node);
                self.load_place(&place)
            }
            &NodeKind::Conv(operand) => {
                let from = ast.get_type(operand);
                let to = ast.get_type(node);
                let lowered = self.lower_expr(operand);
                self.conv_value(lowered, from, to)
            }
            &NodeKind::Decay(operand) => self.lower_decay(operand),
            NodeKind::InitList(_) => unreachable!("initializer list outside static data"),
            NodeKind::Error => unreachable!("error node survived validation"),
            _ => unreachable!("statement node in expression position"),
        }
    }

    /// Lower for side effects only. Avoids dead result temporaries for
    /// the common statement expressions.
    fn lower_expr_discard(&mut self, node: NodeRef) {
        let ast = self.ast;
        match ast.get_kind(node) {
            &NodeKind::Assign(lhs, rhs) => {
                self.lower_assign(lhs, rhs, false);
            }
            &NodeKind::CompoundAssign { op, lhs, rhs, op_type } => {
                self.lower_compound_assign(op, lhs, rhs, op_type, false);
            }
            &NodeKind::PreIncrement(operand) => {
                self.lower_step(operand, true, false, false);
            }
            &NodeKind::PreDecrement(operand) => {
                self.lower_step(operand, false, false, false);
            }
            &NodeKind::PostIncrement(operand) => {
                self.lower_step(operand, true, true, false);
            }
            &NodeKind::PostDecrement(operand) => {
                self.lower_step(operand, false, true, false);
            }
            NodeKind::Call(callee, arguments) => {
                let callee = *callee;
                let arguments = arguments.clone();
                self.lower_call(callee, &arguments, false);
            }
            &NodeKind::Binary(BinaryOp::Comma, lhs, rhs) => {
                self.lower_expr_discard(lhs);
                self.lower_expr_discard(rhs);
            }
            &NodeKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                self.lower_conditional(node, condition, then_expr, else_expr, false);
            }
            &NodeKind::Conv(operand) => {
                // Casts to void discard; other discarded casts still
                // evaluate their operand
                self.lower_expr_discard(operand);
            }
            NodeKind::ConstInt(_) | NodeKind::ConstFloat(_) | NodeKind::ConstString(_) | NodeKind::Ident(_) => {}
            _ => {
                self.lower_expr(node);
            }
        }
    }

    fn lower_unary(&mut self, node: NodeRef, op: UnaryOp, operand: NodeRef) -> Operand {
        match op {
            UnaryOp::Plus => self.lower_expr(operand),
            UnaryOp::Minus => {
                let (class, width, _) = self.meta(self.ast.get_type(node));
                let value = self.lower_expr(operand);
                let result = self.temp_operand();
                let un = if class == OpClass::Float { UnOp::MinusF } else { UnOp::MinusI };
                self.emit(Instr::Un {
                    op: un,
                    width,
                    result,
                    value,
                });
                result
            }
            UnaryOp::BitNot => {
                let (_, width, _) = self.meta(self.ast.get_type(node));
                let value = self.lower_expr(operand);
                let result = self.temp_operand();
                self.emit(Instr::Un {
                    op: UnOp::Not,
                    width,
                    result,
                    value,
                });
                result
            }
            // The branch machinery flips the sense for the negation
            UnaryOp::LogicNot => self.bool_value(node),
            UnaryOp::Deref => {
                let place = self.lower_place(node);
                self.load_place(&place)
            }
            UnaryOp::AddrOf => {
                if let &NodeKind::Ident(sym) = self.ast.get_kind(operand) {
                    if self.ctx.symbols.entry(sym).is_function() {
                        return Operand::Address(self.sym_value(sym));
                    }
                }
                self.lower_address(operand)
            }
        }
    }

    fn lower_binary(&mut self, node: NodeRef, op: BinaryOp, lhs: NodeRef, rhs: NodeRef) -> Operand {
        if op.is_relational() || matches!(op, BinaryOp::LogicAnd | BinaryOp::LogicOr) {
            return self.bool_value(node);
        }
        if matches!(op, BinaryOp::Comma) {
            self.lower_expr_discard(lhs);
            return self.lower_expr(rhs);
        }

        let lhs_qt = self.ast.get_type(lhs);
        let rhs_qt = self.ast.get_type(rhs);
        let lhs_is_pointer = self.ctx.types.kind(lhs_qt.ty).is_pointer();
        let rhs_is_pointer = self.ctx.types.kind(rhs_qt.ty).is_pointer();

        // Pointer difference scales the byte distance down
        if op == BinaryOp::Sub && lhs_is_pointer && rhs_is_pointer {
            let element = self
                .ctx
                .types
                .pointee_of(lhs_qt.ty)
                .unwrap_or_else(|| self.ctx.types.error_type());
            let (size, _) = self.size_align(element);
            let lhs_op = self.lower_expr(lhs);
            let rhs_op = self.lower_expr(rhs);
            let difference = self.temp_operand();
            self.emit(Instr::Bin {
                op: BinOp::SubI,
                width: OpWidth::Q,
                is_signed: true,
                result: difference,
                lhs: lhs_op,
                rhs: rhs_op,
            });
            if size <= 1 {
                return difference;
            }
            let result = self.temp_operand();
            self.emit(Instr::Bin {
                op: BinOp::IdivI,
                width: OpWidth::Q,
                is_signed: true,
                result,
                lhs: difference,
                rhs: Operand::Direct(Value::IntConst(size as i64)),
            });
            return result;
        }

        // Pointer plus or minus an integer scales the offset up
        if matches!(op, BinaryOp::Add | BinaryOp::Sub) && lhs_is_pointer {
            let element = self
                .ctx
                .types
                .pointee_of(lhs_qt.ty)
                .unwrap_or_else(|| self.ctx.types.error_type());
            let (size, _) = self.size_align(element);
            let lhs_op = self.lower_expr(lhs);
            let rhs_op = self.lower_expr(rhs);
            let offset = self.scale_value(rhs_op, size);
            let result = self.temp_operand();
            let bin = if op == BinaryOp::Add { BinOp::AddI } else { BinOp::SubI };
            self.emit(Instr::Bin {
                op: bin,
                width: OpWidth::Q,
                is_signed: false,
                result,
                lhs: lhs_op,
                rhs: Operand::Direct(offset),
            });
            return result;
        }

        let (class, width, is_signed) = self.meta(self.ast.get_type(node));
        let lhs_op = self.lower_expr(lhs);
        let rhs_op = self.lower_expr(rhs);
        let result = self.temp_operand();
        self.emit(Instr::Bin {
            op: select_binop(op, class, is_signed),
            width,
            is_signed,
            result,
            lhs: lhs_op,
            rhs: rhs_op,
        });
        result
    }

    fn lower_conditional(
        &mut self,
        node: NodeRef,
        condition: NodeRef,
        then_expr: NodeRef,
        else_expr: NodeRef,
        want_value: bool,
    ) -> Operand {
        let qt = self.ast.get_type(node);
        let kind = self.ctx.types.kind(qt.ty).clone();
        let other = self.new_label();
        let end = self.new_label();

        if !want_value || kind.is_void() {
            self.branch(condition, other, false);
            self.lower_expr_discard(then_expr);
            self.emit(Instr::Goto(end));
            self.emit(Instr::Label(other));
            self.lower_expr_discard(else_expr);
            self.emit(Instr::Label(end));
            return Operand::Direct(Value::IntConst(0));
        }

        if kind.is_record() {
            let (size, align) = self.size_align(qt);
            let slot = self.new_slot(size, align);
            let target = Operand::Direct(Value::Slot(slot));
            self.branch(condition, other, false);
            let then_op = self.lower_expr(then_expr);
            self.copy_aggregate(target, then_op, size);
            self.emit(Instr::Goto(end));
            self.emit(Instr::Label(other));
            let else_op = self.lower_expr(else_expr);
            self.copy_aggregate(target, else_op, size);
            self.emit(Instr::Label(end));
            return target;
        }

        let (class, width, _) = self.meta(qt);
        let result = self.temp_operand();
        self.branch(condition, other, false);
        let then_op = self.lower_expr(then_expr);
        self.emit(Instr::Assign {
            class,
            width,
            target: result,
            value: then_op,
        });
        self.emit(Instr::Goto(end));
        self.emit(Instr::Label(other));
        let else_op = self.lower_expr(else_expr);
        self.emit(Instr::Assign {
            class,
            width,
            target: result,
            value: else_op,
        });
        self.emit(Instr::Label(end));
        result
    }

    fn lower_assign(&mut self, lhs: NodeRef, rhs: NodeRef, want_value: bool) -> Operand {
        let lhs_qt = self.ast.get_type(lhs);
        if self.is_record(lhs_qt) {
            let source = self.lower_expr(rhs);
            let place = self.lower_place(lhs);
            let (size, _) = self.size_align(lhs_qt);
            self.copy_aggregate(place.op, source, size);
            return place.op;
        }
        let value = self.lower_expr(rhs);
        let place = self.lower_place(lhs);
        self.store_place(place, lhs_qt, value, want_value)
            .unwrap_or(value)
    }

    fn lower_compound_assign(
        &mut self,
        op: BinaryOp,
        lhs: NodeRef,
        rhs: NodeRef,
        op_type: QualType,
        want_value: bool,
    ) -> Operand {
        let lhs_qt = self.ast.get_type(lhs);
        let place = self.lower_place(lhs);
        let rhs_op = self.lower_expr(rhs);
        let current = self.load_place(&place);

        if self.ctx.types.kind(op_type.ty).is_pointer() {
            let element = self
                .ctx
                .types
                .pointee_of(op_type.ty)
                .unwrap_or_else(|| self.ctx.types.error_type());
            let (size, _) = self.size_align(element);
            let offset = self.scale_value(rhs_op, size);
            let result = self.temp_operand();
            let bin = if op == BinaryOp::Add { BinOp::AddI } else { BinOp::SubI };
            self.emit(Instr::Bin {
                op: bin,
                width: OpWidth::Q,
                is_signed: false,
                result,
                lhs: current,
                rhs: Operand::Direct(offset),
            });
            return self.store_place(place, lhs_qt, result, want_value).unwrap_or(result);
        }

        let (class, width, is_signed) = self.meta(op_type);
        let widened = self.conv_value(current, lhs_qt, op_type);
        let result = self.temp_operand();
        self.emit(Instr::Bin {
            op: select_binop(op, class, is_signed),
            width,
            is_signed,
            result,
            lhs: widened,
            rhs: rhs_op,
        });
        let narrowed = self.conv_value(result, op_type, lhs_qt);
        self.store_place(place, lhs_qt, narrowed, want_value).unwrap_or(narrowed)
    }

    /// Increment and decrement, both fixities.
    fn lower_step(&mut self, operand: NodeRef, is_increment: bool, is_post: bool, want_value: bool) -> Operand {
        let qt = self.ast.get_type(operand);
        let kind = self.ctx.types.kind(qt.ty).clone();
        let place = self.lower_place(operand);
        let (class, width, _) = self.meta(qt);
        let current = self.load_place(&place);

        let old = if is_post && want_value {
            match current {
                Operand::Direct(Value::Temp(_)) => current,
                _ => {
                    let copy = self.temp_operand();
                    self.emit(Instr::Assign {
                        class,
                        width,
                        target: copy,
                        value: current,
                    });
                    copy
                }
            }
        } else {
            current
        };

        let new = if matches!(kind, TypeKind::Bool) {
            // ++ pins a _Bool at 1; -- toggles it
            if is_increment {
                Operand::Direct(Value::IntConst(1))
            } else {
                self.normalize_bool(current, class, width, true)
            }
        } else {
            let step = match &kind {
                TypeKind::Pointer { pointee } => {
                    let pointee = *pointee;
                    let (size, _) = self.size_align(pointee);
                    Operand::Direct(Value::IntConst(size as i64))
                }
                _ if class == OpClass::Float => {
                    let pool = self.pool_float(1.0, width == OpWidth::L);
                    Operand::Direct(Value::FloatConst(pool))
                }
                _ => Operand::Direct(Value::IntConst(1)),
            };
            let result = self.temp_operand();
            let bin = match (class, is_increment) {
                (OpClass::Float, true) => BinOp::AddF,
                (OpClass::Float, false) => BinOp::SubF,
                (OpClass::Int, true) => BinOp::AddI,
                (OpClass::Int, false) => BinOp::SubI,
            };
            self.emit(Instr::Bin {
                op: bin,
                width,
                is_signed: false,
                result,
                lhs: current,
                rhs: step,
            });
            result
        };

        let stored = self.store_place(place, qt, new, want_value && !is_post);
        if !want_value {
            new
        } else if is_post {
            old
        } else {
            stored.unwrap_or(new)
        }
    }

    fn lower_decay(&mut self, operand: NodeRef) -> Operand {
        if let &NodeKind::Ident(sym) = self.ast.get_kind(operand) {
            if self.ctx.symbols.entry(sym).is_function() {
                return Operand::Address(self.sym_value(sym));
            }
        }
        self.lower_address(operand)
    }

    // === Calls ===

    fn lower_call(&mut self, callee: NodeRef, arguments: &[NodeRef], want_value: bool) -> Operand {
        let callee_qt = self.ast.get_type(callee);
        let function_qt = self
            .ctx
            .types
            .pointee_of(callee_qt.ty)
            .unwrap_or_else(|| self.ctx.types.error_type());
        let TypeKind::Function {
            return_type,
            is_variadic,
            is_prototype,
            ..
        } = self.ctx.types.kind(function_qt.ty).clone()
        else {
            unreachable!("call through a non-function type");
        };
        // Unprototyped callees get the variadic treatment so the float
        // count register is always defined for them
        let variadic = is_variadic || !is_prototype;

        let target = match self.direct_callee(callee) {
            Some(value) => Operand::Direct(value),
            None => {
                let lowered = self.lower_expr(callee);
                let value = self.as_value(lowered, OpClass::Int, OpWidth::Q);
                Operand::Direct(value)
            }
        };

        // Evaluate every argument before any Param is staged, so nested
        // calls finish their own Param/Call runs first
        let mut staged: Vec<(ArgClass, OpWidth, Operand)> = Vec::with_capacity(arguments.len() + 1);
        for &argument in arguments {
            let qt = self.ast.get_type(argument);
            if self.is_record(qt) {
                let (size, _) = self.size_align(qt);
                let location = self.lower_expr(argument);
                let address = self.addr_operand(location);
                let address = self.snapshot(address, OpClass::Int, OpWidth::Q);
                staged.push((ArgClass::Aggregate { size }, OpWidth::Q, address));
            } else {
                let (class, width, _) = self.meta(qt);
                let lowered = self.lower_expr(argument);
                let lowered = self.snapshot(lowered, class, width);
                let arg_class = match class {
                    OpClass::Float => ArgClass::Float,
                    OpClass::Int => ArgClass::Int,
                };
                staged.push((arg_class, width, lowered));
            }
        }

        let return_kind = self.ctx.types.kind(return_type.ty).clone();
        let mut result_slot = None;
        if return_kind.is_record() {
            let (size, align) = self.size_align(return_type);
            let slot = self.new_slot(size, align);
            result_slot = Some(slot);
            staged.insert(0, (ArgClass::Int, OpWidth::Q, Operand::Address(Value::Slot(slot))));
        }

        let mut int_args = 0;
        let mut float_args = 0;
        let mut stack_bytes = 0u64;
        for (class, _, _) in &staged {
            match class {
                ArgClass::Int => {
                    if int_args < 6 {
                        int_args += 1;
                    } else {
                        stack_bytes += 8;
                    }
                }
                ArgClass::Float => {
                    if float_args < 8 {
                        float_args += 1;
                    } else {
                        stack_bytes += 8;
                    }
                }
                ArgClass::Aggregate { size } => {
                    stack_bytes += round_up(*size, 8);
                }
            }
        }
        self.max_outgoing = self.max_outgoing.max(stack_bytes);

        let arg_count = staged.len() as u32;
        for (class, width, value) in staged {
            self.emit(Instr::Param { class, width, value });
        }

        let (result, result_class, result_width) = if return_kind.is_void() || return_kind.is_record() || !want_value {
            (None, OpClass::Int, OpWidth::Q)
        } else {
            let (class, width, _) = self.meta(return_type);
            (Some(self.temp_operand()), class, width)
        };
        self.emit(Instr::Call {
            result,
            class: result_class,
            width: result_width,
            target,
            arg_count,
            stack_bytes,
            variadic,
        });

        match (result, result_slot) {
            (Some(result), _) => result,
            (None, Some(slot)) => Operand::Direct(Value::Slot(slot)),
            (None, None) => Operand::Direct(Value::IntConst(0)),
        }
    }

    /// A call straight to a named function, bypassing pointer
    /// materialization.
    fn direct_callee(&self, callee: NodeRef) -> Option<Value> {
        if let &NodeKind::Decay(inner) = self.ast.get_kind(callee) {
            if let &NodeKind::Ident(sym) = self.ast.get_kind(inner) {
                if self.ctx.symbols.entry(sym).is_function() {
                    return Some(self.sym_value(sym));
                }
            }
        }
        None
    }

    /// Copy mutable-state operands into temporaries so later argument
    /// evaluation cannot disturb them before the call stages.
    fn snapshot(&mut self, operand: Operand, class: OpClass, width: OpWidth) -> Operand {
        match operand {
            Operand::Direct(Value::Sym { .. })
            | Operand::Direct(Value::Slot(_))
            | Operand::Indirect(_)
            | Operand::Subscript(..) => {
                let copy = self.temp_operand();
                self.emit(Instr::Assign {
                    class,
                    width,
                    target: copy,
                    value: operand,
                });
                copy
            }
            _ => operand,
        }
    }

    // === Places, loads, and stores ===

    fn lower_place(&mut self, node: NodeRef) -> Place {
        let ast = self.ast;
        match ast.get_kind(node) {
            &NodeKind::Ident(sym) => Place::plain(Operand::Direct(self.sym_value(sym))),
            &NodeKind::Unary(UnaryOp::Deref, pointer) => {
                let lowered = self.lower_expr(pointer);
                let value = self.as_value(lowered, OpClass::Int, OpWidth::Q);
                Place::plain(Operand::Indirect(value))
            }
            &NodeKind::Index(base, index) => {
                let element = ast.get_type(node);
                let (size, _) = self.size_align(element);
                let base_op = self.lower_expr(base);
                let base_value = self.as_value(base_op, OpClass::Int, OpWidth::Q);
                let index_op = self.lower_expr(index);
                let index_value = self.scale_value(index_op, size);
                Place::plain(Operand::Subscript(base_value, index_value))
            }
            &NodeKind::Member(object, member) => self.lower_member(object, member),
            &NodeKind::ConstString(spelling) => {
                let pool = self.pool_string(spelling);
                Place::plain(Operand::Indirect(Value::StrConst(pool)))
            }
            _ => Place::plain(self.lower_expr(node)),
        }
    }

    fn lower_member(&mut self, object: NodeRef, member: u32) -> Place {
        let object_qt = self.ast.get_type(object);
        let TypeKind::Record { members, .. } = self.ctx.types.kind(object_qt.ty).clone() else {
            unreachable!("member access on a non-record");
        };
        let member_info = &members[member as usize];
        let member_qt = member_info.member_type;

        let layout = self.ctx.types.field_layout(object_qt.ty, member as usize);
        let (offset, placement) = match layout {
            Some(layout) => (layout.offset, layout.bit),
            None => (0, None),
        };

        let bit = placement.map(|placement| {
            let unit_size = self.ctx.types.size_of(member_qt.ty).unwrap_or(4);
            BitField {
                placement,
                unit: OpWidth::from_size(unit_size),
                is_signed: self.ctx.types.kind(member_qt.ty).is_signed(),
            }
        });

        let base = self.lower_place(object);
        let op = if offset == 0 {
            base.op
        } else {
            let address = self.place_addr(base.op);
            Operand::Subscript(address, Value::IntConst(offset as i64))
        };
        Place { op, bit }
    }

    fn load_place(&mut self, place: &Place) -> Operand {
        match place.bit {
            Some(ref bit) => self.load_bit_field(place.op, bit),
            None => place.op,
        }
    }

    fn store_place(&mut self, place: Place, qt: QualType, value: Operand, want_value: bool) -> Option<Operand> {
        match place.bit {
            Some(bit) => self.store_bit_field(place.op, &bit, value, want_value),
            None => {
                let (class, width, _) = self.meta(qt);
                self.emit(Instr::Assign {
                    class,
                    width,
                    target: place.op,
                    value,
                });
                want_value.then_some(value)
            }
        }
    }

    /// The address of a memory operand, as a value. May cost an
    /// instruction.
    fn place_addr(&mut self, op: Operand) -> Value {
        match op {
            Operand::Direct(value @ (Value::Sym { .. } | Value::Slot(_))) => {
                let result = self.temp_operand();
                self.emit(Instr::Assign {
                    class: OpClass::Int,
                    width: OpWidth::Q,
                    target: result,
                    value: Operand::Address(value),
                });
                let (result_value, _) = result.parts();
                result_value
            }
            Operand::Indirect(value) => value,
            Operand::Subscript(base, index) => {
                let result = self.temp_operand();
                self.emit(Instr::Bin {
                    op: BinOp::AddI,
                    width: OpWidth::Q,
                    is_signed: false,
                    result,
                    lhs: Operand::Direct(base),
                    rhs: Operand::Direct(index),
                });
                let (result_value, _) = result.parts();
                result_value
            }
            _ => unreachable!("address of a non-memory operand"),
        }
    }

    /// The address of a memory operand, as an operand. Free when the
    /// address is already held somewhere.
    fn addr_operand(&mut self, op: Operand) -> Operand {
        match op {
            Operand::Direct(value @ (Value::Sym { .. } | Value::Slot(_))) => Operand::Address(value),
            Operand::Indirect(value) => Operand::Direct(value),
            Operand::Subscript(..) => Operand::Direct(self.place_addr(op)),
            _ => unreachable!("address of a non-memory operand"),
        }
    }

    fn lower_address(&mut self, node: NodeRef) -> Operand {
        let place = self.lower_place(node);
        self.addr_operand(place.op)
    }

    // === Conversions ===

    fn conv_value(&mut self, operand: Operand, from: QualType, to: QualType) -> Operand {
        let to_kind = self.ctx.types.kind(to.ty).clone();
        let from_kind = self.ctx.types.kind(from.ty).clone();

        if to_kind.is_void() || to_kind.is_record() || from_kind.is_record() {
            return operand;
        }
        if matches!(to_kind, TypeKind::Bool) {
            if matches!(from_kind, TypeKind::Bool) {
                return operand;
            }
            let (class, width, _) = self.meta(from);
            return self.normalize_bool(operand, class, width, false);
        }

        let (from_class, from_width, from_signed) = self.meta(from);
        let (to_class, to_width, to_signed) = self.meta(to);

        // Integer constants convert in place rather than emitting a
        // conversion over an immediate
        if let Operand::Direct(Value::IntConst(value)) = operand {
            match to_class {
                OpClass::Int => {
                    return Operand::Direct(Value::IntConst(truncate_int(value, to_width, to_signed)));
                }
                OpClass::Float => {
                    let float = if from_signed { value as f64 } else { value as u64 as f64 };
                    let pool = self.pool_float(float, to_width == OpWidth::L);
                    return Operand::Direct(Value::FloatConst(pool));
                }
            }
        }

        let op = match (from_class, to_class) {
            (OpClass::Int, OpClass::Int) => {
                if from_width == to_width {
                    return operand;
                }
                match (from_signed, to_signed) {
                    (true, true) => ConvOp::SiSi,
                    (true, false) => ConvOp::SiUi,
                    (false, true) => ConvOp::UiSi,
                    (false, false) => ConvOp::UiUi,
                }
            }
            (OpClass::Int, OpClass::Float) => {
                if from_signed {
                    ConvOp::SiF
                } else {
                    ConvOp::UiF
                }
            }
            (OpClass::Float, OpClass::Int) => {
                if to_signed {
                    ConvOp::FSi
                } else {
                    ConvOp::FUi
                }
            }
            (OpClass::Float, OpClass::Float) => {
                if from_width == to_width {
                    return operand;
                }
                ConvOp::FF
            }
        };

        let result = self.temp_operand();
        self.emit(Instr::Conv {
            op,
            from_width,
            to_width,
            result,
            value: operand,
        });
        result
    }

    // === Aggregates and bit-fields ===

    /// Scale an index or offset by an element size, folding constants.
    fn scale_value(&mut self, operand: Operand, size: u64) -> Value {
        if let Operand::Direct(Value::IntConst(value)) = operand {
            return Value::IntConst(value.wrapping_mul(size as i64));
        }
        let value = self.as_value(operand, OpClass::Int, OpWidth::Q);
        if size == 1 {
            return value;
        }
        let result = self.temp_operand();
        self.emit(Instr::Bin {
            op: BinOp::ImulI,
            width: OpWidth::Q,
            is_signed: true,
            result,
            lhs: Operand::Direct(value),
            rhs: Operand::Direct(Value::IntConst(size as i64)),
        });
        let (result_value, _) = result.parts();
        result_value
    }

    fn as_value(&mut self, operand: Operand, class: OpClass, width: OpWidth) -> Value {
        match operand {
            Operand::Direct(value) => value,
            _ => {
                let result = self.temp_operand();
                self.emit(Instr::Assign {
                    class,
                    width,
                    target: result,
                    value: operand,
                });
                let (result_value, _) = result.parts();
                result_value
            }
        }
    }

    fn mem_at(&self, base: Value, offset: u64) -> Operand {
        if offset == 0 {
            Operand::Indirect(base)
        } else {
            Operand::Subscript(base, Value::IntConst(offset as i64))
        }
    }

    /// Copy `size` bytes between memory operands in descending power of
    /// two chunks.
    fn copy_aggregate(&mut self, target: Operand, source: Operand, size: u64) {
        let target_addr = self.place_addr(target);
        let source_addr = self.place_addr(source);
        let mut offset = 0;
        while offset < size {
            let width = chunk_width(size - offset);
            let hop = self.temp_operand();
            let from = self.mem_at(source_addr, offset);
            self.emit(Instr::Assign {
                class: OpClass::Int,
                width,
                target: hop,
                value: from,
            });
            let to = self.mem_at(target_addr, offset);
            self.emit(Instr::Assign {
                class: OpClass::Int,
                width,
                target: to,
                value: hop,
            });
            offset += width.bytes();
        }
    }

    /// Extract a bit-field: widen the storage unit, shift the field to
    /// the top, then shift back down with the field's signedness.
    fn load_bit_field(&mut self, unit_op: Operand, bit: &BitField) -> Operand {
        let reg_width = bit.reg_width();
        let bits = reg_width.bits();
        let loaded = if bit.unit == reg_width {
            let result = self.temp_operand();
            self.emit(Instr::Assign {
                class: OpClass::Int,
                width: reg_width,
                target: result,
                value: unit_op,
            });
            result
        } else {
            let result = self.temp_operand();
            self.emit(Instr::Conv {
                op: ConvOp::UiUi,
                from_width: bit.unit,
                to_width: reg_width,
                result,
                value: unit_op,
            });
            result
        };

        let up = bits - bit.placement.bit_offset - bit.placement.width;
        let down = bits - bit.placement.width;
        let mut value = loaded;
        if up > 0 {
            let shifted = self.temp_operand();
            self.emit(Instr::Bin {
                op: BinOp::LShift,
                width: reg_width,
                is_signed: false,
                result: shifted,
                lhs: value,
                rhs: Operand::Direct(Value::IntConst(up as i64)),
            });
            value = shifted;
        }
        if down > 0 {
            let shifted = self.temp_operand();
            self.emit(Instr::Bin {
                op: BinOp::RShift,
                width: reg_width,
                is_signed: bit.is_signed,
                result: shifted,
                lhs: value,
                rhs: Operand::Direct(Value::IntConst(down as i64)),
            });
            value = shifted;
        }
        value
    }

    /// Store into a bit-field: mask the kept bits of the storage unit,
    /// position the new field, merge, and write the unit back.
    fn store_bit_field(&mut self, unit_op: Operand, bit: &BitField, value: Operand, want_value: bool) -> Option<Operand> {
        let reg_width = bit.reg_width();
        let bits = reg_width.bits();
        let offset = bit.placement.bit_offset;
        let mask = bit.mask();

        let unit = self.temp_operand();
        if bit.unit == reg_width {
            self.emit(Instr::Assign {
                class: OpClass::Int,
                width: reg_width,
                target: unit,
                value: unit_op,
            });
        } else {
            self.emit(Instr::Conv {
                op: ConvOp::UiUi,
                from_width: bit.unit,
                to_width: reg_width,
                result: unit,
                value: unit_op,
            });
        }

        let kept = self.temp_operand();
        self.emit(Instr::Bin {
            op: BinOp::And,
            width: reg_width,
            is_signed: false,
            result: kept,
            lhs: unit,
            rhs: Operand::Direct(Value::IntConst(imm_for(!(mask << offset), reg_width))),
        });

        let masked = self.temp_operand();
        self.emit(Instr::Bin {
            op: BinOp::And,
            width: reg_width,
            is_signed: false,
            result: masked,
            lhs: value,
            rhs: Operand::Direct(Value::IntConst(imm_for(mask, reg_width))),
        });

        let mut field = masked;
        if offset > 0 {
            let positioned = self.temp_operand();
            self.emit(Instr::Bin {
                op: BinOp::LShift,
                width: reg_width,
                is_signed: false,
                result: positioned,
                lhs: masked,
                rhs: Operand::Direct(Value::IntConst(offset as i64)),
            });
            field = positioned;
        }

        let merged = self.temp_operand();
        self.emit(Instr::Bin {
            op: BinOp::Or,
            width: reg_width,
            is_signed: false,
            result: merged,
            lhs: kept,
            rhs: field,
        });
        self.emit(Instr::Assign {
            class: OpClass::Int,
            width: bit.unit,
            target: unit_op,
            value: merged,
        });

        if !want_value {
            return None;
        }
        // The expression value is the field as stored: masked, and
        // sign-extended for signed fields
        let down = bits - bit.placement.width;
        if down == 0 || !bit.is_signed {
            return Some(masked);
        }
        let up_shifted = self.temp_operand();
        self.emit(Instr::Bin {
            op: BinOp::LShift,
            width: reg_width,
            is_signed: false,
            result: up_shifted,
            lhs: masked,
            rhs: Operand::Direct(Value::IntConst(down as i64)),
        });
        let extended = self.temp_operand();
        self.emit(Instr::Bin {
            op: BinOp::RShift,
            width: reg_width,
            is_signed: true,
            result: extended,
            lhs: up_shifted,
            rhs: Operand::Direct(Value::IntConst(down as i64)),
        });
        Some(extended)
    }
}

fn relop_of(op: BinaryOp) -> RelOp {
    match op {
        BinaryOp::Equal => RelOp::Equal,
        BinaryOp::NotEqual => RelOp::NotEqual,
        BinaryOp::Less => RelOp::Less,
        BinaryOp::LessEqual => RelOp::LessEqual,
        BinaryOp::Greater => RelOp::Greater,
        BinaryOp::GreaterEqual => RelOp::GreaterEqual,
        _ => unreachable!("not a relational operator"),
    }
}

fn select_binop(op: BinaryOp, class: OpClass, is_signed: bool) -> BinOp {
    match (op, class) {
        (BinaryOp::Add, OpClass::Float) => BinOp::AddF,
        (BinaryOp::Add, OpClass::Int) => BinOp::AddI,
        (BinaryOp::Sub, OpClass::Float) => BinOp::SubF,
        (BinaryOp::Sub, OpClass::Int) => BinOp::SubI,
        (BinaryOp::Mul, OpClass::Float) => BinOp::MulF,
        (BinaryOp::Mul, OpClass::Int) => {
            if is_signed {
                BinOp::ImulI
            } else {
                BinOp::MulI
            }
        }
        (BinaryOp::Div, OpClass::Float) => BinOp::DivF,
        (BinaryOp::Div, OpClass::Int) => {
            if is_signed {
                BinOp::IdivI
            } else {
                BinOp::DivI
            }
        }
        (BinaryOp::Mod, _) => BinOp::Mod,
        (BinaryOp::BitAnd, _) => BinOp::And,
        (BinaryOp::BitOr, _) => BinOp::Or,
        (BinaryOp::BitXor, _) => BinOp::Xor,
        (BinaryOp::LShift, _) => BinOp::LShift,
        (BinaryOp::RShift, _) => BinOp::RShift,
        _ => unreachable!("not an arithmetic operator"),
    }
}

fn truncate_int(value: i64, width: OpWidth, is_signed: bool) -> i64 {
    match (width, is_signed) {
        (OpWidth::B, true) => value as i8 as i64,
        (OpWidth::B, false) => value as u8 as i64,
        (OpWidth::W, true) => value as i16 as i64,
        (OpWidth::W, false) => value as u16 as i64,
        (OpWidth::L, true) => value as i32 as i64,
        (OpWidth::L, false) => value as u32 as i64,
        (OpWidth::Q, _) => value,
    }
}

/// Render a mask as the immediate the target width actually uses:
/// 32-bit operations take their immediate sign-extended.
fn imm_for(mask: u64, width: OpWidth) -> i64 {
    match width {
        OpWidth::Q => mask as i64,
        _ => mask as u32 as i32 as i64,
    }
}

fn chunk_width(remaining: u64) -> OpWidth {
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

fn round_up(value: u64, align: u64) -> u64 {
    (value + align - 1) / align * align
}
