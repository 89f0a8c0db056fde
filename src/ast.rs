//! Abstract syntax tree for the compiler.
//!
//! Nodes are stored in a flattened arena with index-based `NodeRef`
//! references. The parser types expressions as it builds them, so every
//! expression node carries a resolved `QualType` and an lvalue flag in
//! side tables parallel to the node list. Conversions are explicit:
//! `Conv` and `Decay` nodes are inserted where the language implies
//! them, which keeps the lowering pass free of type rules.
//!
//! Declarations do not appear in the tree. A completed declarator
//! installs a symbol; a local initializer becomes an `Assign` in the
//! enclosing block; function definitions are collected into a
//! `TranslationUnit` with their body `NodeRef`.

use std::num::NonZeroU32;

use thin_vec::ThinVec;

use crate::intern::StringId;
use crate::semantic::{QualType, ScopeId, SymbolEntryRef};
use crate::source_manager::SourceSpan;

/// Node reference type for referencing child nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(NonZeroU32);

impl NodeRef {
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn index(self) -> usize {
        (self.get() - 1) as usize
    }
}

/// The flattened AST storage.
///
/// `types` and `lvalues` run parallel to `kinds`; statement nodes keep
/// placeholder entries so the vectors stay index-aligned.
#[derive(Default)]
pub struct Ast {
    pub kinds: Vec<NodeKind>,
    pub spans: Vec<SourceSpan>,
    types: Vec<QualType>,
    lvalues: Vec<bool>,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    /// Add a typed node to the AST and return its reference
    pub(crate) fn push_node(&mut self, kind: NodeKind, span: SourceSpan, ty: QualType, is_lvalue: bool) -> NodeRef {
        let index = self.kinds.len() as u32 + 1; // Start from 1 for NonZeroU32
        self.kinds.push(kind);
        self.spans.push(span);
        self.types.push(ty);
        self.lvalues.push(is_lvalue);
        NodeRef::new(index).expect("NodeRef overflow")
    }

    pub fn get_kind(&self, node_ref: NodeRef) -> &NodeKind {
        &self.kinds[node_ref.index()]
    }

    pub fn get_span(&self, node_ref: NodeRef) -> SourceSpan {
        self.spans[node_ref.index()]
    }

    pub fn get_type(&self, node_ref: NodeRef) -> QualType {
        self.types[node_ref.index()]
    }

    pub fn is_lvalue(&self, node_ref: NodeRef) -> bool {
        self.lvalues[node_ref.index()]
    }

    /// Retype a node in place. Used when an array bound completes after
    /// its initializer is parsed.
    pub(crate) fn set_type(&mut self, node_ref: NodeRef, ty: QualType) {
        self.types[node_ref.index()] = ty;
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// The core enum defining all AST node types.
/// Variants use NodeRef for child references, enabling flattened storage.
#[derive(Debug, Clone)]
pub enum NodeKind {
    // --- Constants ---
    /// Integer constant. The value is stored as the raw bits in an i64;
    /// the node type decides signedness and width.
    ConstInt(i64),
    ConstFloat(f64),
    /// String literal, spelled exactly as written (escapes unprocessed)
    ConstString(StringId),

    // --- Expressions ---
    /// Identifier resolved to its symbol during parsing
    Ident(SymbolEntryRef),
    Unary(UnaryOp, NodeRef),
    Binary(BinaryOp, NodeRef, NodeRef),
    Conditional {
        condition: NodeRef,
        then_expr: NodeRef,
        else_expr: NodeRef,
    },

    Assign(NodeRef, NodeRef),
    /// `lhs op= rhs`. The arithmetic happens in `op_type` (the usual
    /// arithmetic conversion of both sides), then converts back to the
    /// type of `lhs`.
    CompoundAssign {
        op: BinaryOp,
        lhs: NodeRef,
        rhs: NodeRef,
        op_type: QualType,
    },
    PreIncrement(NodeRef),
    PreDecrement(NodeRef),
    PostIncrement(NodeRef),
    PostDecrement(NodeRef),

    Call(NodeRef, Vec<NodeRef>),
    /// Member access by member-list index; `->` is normalized to a
    /// dereference of the object followed by `.`
    Member(NodeRef, u32),
    /// Array subscript after decay: base is always a pointer value
    Index(NodeRef, NodeRef),

    /// Implicit or explicit conversion to the node's own type
    Conv(NodeRef),
    /// Array-to-pointer or function-to-pointer value adjustment
    Decay(NodeRef),

    // --- Initializers ---
    InitList(ThinVec<NodeRef>),

    // --- Statements ---
    Compound(ScopeId, Vec<NodeRef>),
    If {
        condition: NodeRef,
        then_branch: NodeRef,
        else_branch: Option<NodeRef>,
    },
    While {
        condition: NodeRef,
        body: NodeRef,
    },
    DoWhile {
        body: NodeRef,
        condition: NodeRef,
    },
    For {
        scope_id: ScopeId,
        init: Option<NodeRef>,
        condition: Option<NodeRef>,
        increment: Option<NodeRef>,
        body: NodeRef,
    },
    Return(Option<NodeRef>),
    Break,
    Continue,
    Goto(SymbolEntryRef),
    Labeled(SymbolEntryRef, NodeRef),
    ExpressionStatement(NodeRef),
    Empty,

    /// Placeholder produced by error recovery
    Error,
}

impl NodeKind {
    pub fn is_constant(&self) -> bool {
        matches!(self, NodeKind::ConstInt(_) | NodeKind::ConstFloat(_))
    }
}

/// Unary operators. Increment and decrement are separate node kinds
/// because they read and write their operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Deref,
    AddrOf,
    BitNot,
    LogicNot,
}

/// Binary operators, pure value operators only. Assignment forms are
/// `Assign` and `CompoundAssign` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LogicAnd,
    LogicOr,
    Comma,
}

impl BinaryOp {
    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
        )
    }
}

/// Storage classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Typedef,
    Extern,
    Static,
    Auto,
    Register,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Typedef => "typedef",
            StorageClass::Extern => "extern",
            StorageClass::Static => "static",
            StorageClass::Auto => "auto",
            StorageClass::Register => "register",
        }
    }
}

/// One function definition, collected in source order.
///
/// The symbol holds the function type; the scope is the parameter scope
/// that stayed open for the body.
#[derive(Debug)]
pub struct FunctionDef {
    pub symbol: SymbolEntryRef,
    pub scope_id: ScopeId,
    pub parameters: Vec<SymbolEntryRef>,
    /// Block-scope automatic variables in declaration order, for frame
    /// layout. Parameters are not included.
    pub locals: Vec<SymbolEntryRef>,
    pub body: NodeRef,
    pub span: SourceSpan,
}

/// The parsed unit: function definitions in source order. File-scope
/// data lives in the symbol table, which preserves declaration order.
#[derive(Default)]
pub struct TranslationUnit {
    pub functions: Vec<FunctionDef>,
    /// Block-scope `static` variables. They live in inner scopes, so the
    /// data emitter cannot find them by walking file scope.
    pub static_locals: Vec<SymbolEntryRef>,
}
