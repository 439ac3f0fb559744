// This module defines the behavior IR every pass traverses: a closed tagged union of
// node kinds (literals, references, operators, slices, casts, assignments, control
// flow) matched exhaustively by the compiler, so an unhandled kind is a compile error
// rather than a silently skipped node. Expression nodes carry an inferred-type slot
// filled in by the type inference pass and read by later passes (the DAG builder uses
// it to size memory accesses). The frontend builds these trees from the description
// language; this crate only ever rewrites annotations, never the tree shape. Compound
// nodes keep their statements in source order, which later passes rely on to tell
// input-output operands apart from separate reads and writes.

//! Behavior tree nodes and operator vocabulary.

use crate::model::IntType;

/// Binary operators of the behavior language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    /// Logical shift right.
    Shr,
    /// Arithmetic shift right.
    Sar,
    LogicAnd,
    LogicOr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    /// Operators following the arithmetic/bitwise/shift promotion table.
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOp::Add
                | BinOp::Sub
                | BinOp::Mul
                | BinOp::Div
                | BinOp::Rem
                | BinOp::And
                | BinOp::Or
                | BinOp::Xor
                | BinOp::Shl
                | BinOp::Shr
                | BinOp::Sar
        )
    }

    /// Comparison and logical operators always yield an unsigned 1-bit result.
    pub fn is_boolean(self) -> bool {
        !self.is_arithmetic()
    }
}

/// Unary operators of the behavior language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    Inv,
    /// Logical not.
    Not,
}

/// A behavior tree node. `ty` is filled by type inference for expression
/// kinds and stays `None` for statements and unresolved expressions.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub ty: Option<IntType>,
}

/// The closed node-kind taxonomy of the behavior IR.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Literal {
        value: i128,
        ty: IntType,
    },
    /// A bare name: operand field, scalar, constant or state space.
    NamedRef {
        name: String,
    },
    /// An index into a state space, e.g. a register file or main memory.
    IndexedRef {
        base: String,
        index: Box<Node>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Unary {
        op: UnOp,
        operand: Box<Node>,
    },
    /// Bit slice `expr[hi:lo]`.
    Slice {
        expr: Box<Node>,
        hi: Box<Node>,
        lo: Box<Node>,
    },
    Concat {
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    /// Explicit cast to a signedness and optionally a width.
    TypeConv {
        signed: bool,
        width: Option<u32>,
        expr: Box<Node>,
    },
    Assignment {
        target: Box<Node>,
        expr: Box<Node>,
    },
    /// `if`/`else if`/`else` chain; `bodies` may carry one more entry than
    /// `conds` for a trailing `else`.
    Conditional {
        conds: Vec<Node>,
        bodies: Vec<Node>,
    },
    Loop {
        cond: Box<Node>,
        body: Vec<Node>,
    },
    Ternary {
        cond: Box<Node>,
        then_expr: Box<Node>,
        else_expr: Box<Node>,
    },
    Call {
        callee: String,
        args: Vec<Node>,
    },
    Block {
        stmts: Vec<Node>,
    },
    Return {
        expr: Option<Box<Node>>,
    },
    Break,
}

impl Default for Node {
    fn default() -> Self {
        Node::block(vec![])
    }
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Node { kind, ty: None }
    }

    /// Literal with the smallest type able to hold the value.
    pub fn literal(value: i128) -> Self {
        Node::typed_literal(value, IntType::minimal_for(value))
    }

    pub fn typed_literal(value: i128, ty: IntType) -> Self {
        Node::new(NodeKind::Literal { value, ty })
    }

    pub fn named(name: impl Into<String>) -> Self {
        Node::new(NodeKind::NamedRef { name: name.into() })
    }

    pub fn indexed(base: impl Into<String>, index: Node) -> Self {
        Node::new(NodeKind::IndexedRef { base: base.into(), index: Box::new(index) })
    }

    pub fn binary(op: BinOp, lhs: Node, rhs: Node) -> Self {
        Node::new(NodeKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    pub fn unary(op: UnOp, operand: Node) -> Self {
        Node::new(NodeKind::Unary { op, operand: Box::new(operand) })
    }

    pub fn slice(expr: Node, hi: Node, lo: Node) -> Self {
        Node::new(NodeKind::Slice { expr: Box::new(expr), hi: Box::new(hi), lo: Box::new(lo) })
    }

    pub fn concat(lhs: Node, rhs: Node) -> Self {
        Node::new(NodeKind::Concat { lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    pub fn cast(signed: bool, width: Option<u32>, expr: Node) -> Self {
        Node::new(NodeKind::TypeConv { signed, width, expr: Box::new(expr) })
    }

    pub fn assign(target: Node, expr: Node) -> Self {
        Node::new(NodeKind::Assignment { target: Box::new(target), expr: Box::new(expr) })
    }

    pub fn conditional(conds: Vec<Node>, bodies: Vec<Node>) -> Self {
        Node::new(NodeKind::Conditional { conds, bodies })
    }

    pub fn loop_(cond: Node, body: Vec<Node>) -> Self {
        Node::new(NodeKind::Loop { cond: Box::new(cond), body })
    }

    pub fn ternary(cond: Node, then_expr: Node, else_expr: Node) -> Self {
        Node::new(NodeKind::Ternary {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    pub fn call(callee: impl Into<String>, args: Vec<Node>) -> Self {
        Node::new(NodeKind::Call { callee: callee.into(), args })
    }

    pub fn block(stmts: Vec<Node>) -> Self {
        Node::new(NodeKind::Block { stmts })
    }

    pub fn ret(expr: Option<Node>) -> Self {
        Node::new(NodeKind::Return { expr: expr.map(Box::new) })
    }

    pub fn brk() -> Self {
        Node::new(NodeKind::Break)
    }

    /// Kind name for diagnostics and `UnsupportedNodeKind` errors.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Literal { .. } => "Literal",
            NodeKind::NamedRef { .. } => "NamedRef",
            NodeKind::IndexedRef { .. } => "IndexedRef",
            NodeKind::Binary { .. } => "Binary",
            NodeKind::Unary { .. } => "Unary",
            NodeKind::Slice { .. } => "Slice",
            NodeKind::Concat { .. } => "Concat",
            NodeKind::TypeConv { .. } => "TypeConv",
            NodeKind::Assignment { .. } => "Assignment",
            NodeKind::Conditional { .. } => "Conditional",
            NodeKind::Loop { .. } => "Loop",
            NodeKind::Ternary { .. } => "Ternary",
            NodeKind::Call { .. } => "Call",
            NodeKind::Block { .. } => "Block",
            NodeKind::Return { .. } => "Return",
            NodeKind::Break => "Break",
        }
    }

    /// The literal value if this node is a literal.
    pub fn as_literal(&self) -> Option<i128> {
        match &self.kind {
            NodeKind::Literal { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// The referenced name if this node is a bare reference.
    pub fn as_named(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::NamedRef { name } => Some(name),
            _ => None,
        }
    }
}
