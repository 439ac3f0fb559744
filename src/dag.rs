// This module defines the canonical selection-pattern DAG the builder pass produces:
// operand and immediate leaves, a condition-code leaf for canonical branches, named
// operations, and assignments. Leaves carry a pattern type (register class name,
// simmN/uimmN for immediates, pc for the program counter) so downstream rule
// generation can match on them directly, and the Display implementations render the
// `dest <- (op ty:$a, ty:$b)` form the pattern backends consume. The canonical
// operator vocabulary mirrors what instruction selection understands: integer
// arithmetic and shifts, signedness-resolved comparisons, memory operations with truncating and
// extending variants, addressing-mode wrappers and pre/post-increment forms.

//! Canonical selection-pattern DAG.

use crate::model::{Operand, OperandKind};
use std::fmt;

/// Pattern type tag carried by operand leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagType(pub String);

impl DagType {
    pub fn unknown() -> Self {
        DagType("?".into())
    }

    pub fn pc() -> Self {
        DagType("pc".into())
    }

    /// Derive the pattern type of a classified operand: the register class
    /// name for registers, `simmN`/`uimmN` for immediates.
    pub fn of_operand(op: &Operand) -> Self {
        match &op.kind {
            OperandKind::Register { class, .. } => DagType(class.to_string()),
            OperandKind::Immediate => match op.ty {
                Some(ty) => DagType(format!(
                    "{}imm{}",
                    if ty.signed { 's' } else { 'u' },
                    ty.width
                )),
                None => DagType::unknown(),
            },
            OperandKind::Unclassified => DagType::unknown(),
        }
    }

    pub fn is_register_class(&self) -> bool {
        !self.is_immediate() && self.0 != "pc" && self.0 != "?"
    }

    pub fn is_immediate(&self) -> bool {
        self.0.contains("imm")
    }
}

impl fmt::Display for DagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node of the canonical pattern DAG.
#[derive(Debug, Clone, PartialEq)]
pub enum DagNode {
    /// Operand leaf: a named, typed pattern input or output.
    Operand { name: String, ty: DagType },
    /// Immediate literal leaf.
    Imm(i128),
    /// Comparison kind of a canonical conditional branch (`SETLT`, ...).
    CondCode(String),
    /// Operation with a canonical name.
    Op { name: String, operands: Vec<DagNode> },
    /// Assignment of an expression to a target leaf.
    Assign { target: Box<DagNode>, expr: Box<DagNode> },
}

impl DagNode {
    pub fn operand(name: impl Into<String>, ty: DagType) -> Self {
        DagNode::Operand { name: name.into(), ty }
    }

    pub fn op(name: impl Into<String>, operands: Vec<DagNode>) -> Self {
        DagNode::Op { name: name.into(), operands }
    }

    pub fn assign(target: DagNode, expr: DagNode) -> Self {
        DagNode::Assign { target: Box::new(target), expr: Box::new(expr) }
    }

    /// Name of the operand leaf, if this is one.
    pub fn leaf_name(&self) -> Option<&str> {
        match self {
            DagNode::Operand { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn op_name(&self) -> Option<&str> {
        match self {
            DagNode::Op { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether any operand leaf with the given name survives in this DAG.
    pub fn references_leaf(&self, target: &str) -> bool {
        match self {
            DagNode::Operand { name, .. } => name == target,
            DagNode::Imm(_) | DagNode::CondCode(_) => false,
            DagNode::Op { operands, .. } => operands.iter().any(|n| n.references_leaf(target)),
            DagNode::Assign { target: t, expr } => {
                t.references_leaf(target) || expr.references_leaf(target)
            }
        }
    }
}

impl fmt::Display for DagNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DagNode::Operand { name, ty } => write!(f, "{ty}:${name}"),
            DagNode::Imm(value) => write!(f, "{value}"),
            DagNode::CondCode(name) => f.write_str(name),
            DagNode::Op { name, operands } => {
                write!(f, "({name} ")?;
                for (i, op) in operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{op}")?;
                }
                f.write_str(")")
            }
            DagNode::Assign { target, expr } => write!(f, "{target} <- {expr}"),
        }
    }
}

/// One canonical pattern: a destination name and the DAG computing it.
///
/// The destination is an operand name for register writes, the base operand
/// for memory patterns with write-back, and a synthetic `patN` label for
/// patterns without a register destination (plain stores, branches).
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub dest: String,
    pub node: DagNode,
}

impl Pattern {
    pub fn new(dest: impl Into<String>, node: DagNode) -> Self {
        Pattern { dest: dest.into(), node }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.dest, self.node)
    }
}
