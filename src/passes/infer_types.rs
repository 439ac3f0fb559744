// This module implements the type inference pass: a bottom-up walk over each
// instruction's behavior tree computing the (width, signedness) pair of every
// expression node. Binary arithmetic follows the fixed promotion table keyed by
// operator and operand signedness (additions grow by one bit, multiplications sum
// widths, shifts keep the left operand's type); comparisons and logical connectives
// always yield an unsigned 1-bit result; explicit casts win over propagation. The
// failure policy is deliberately soft: an unresolved operand type propagates as
// unresolved instead of failing the instruction, and a slice with a non-literal
// bound records a diagnostic and leaves the node untyped. Downstream passes must
// tolerate untyped sub-expressions.

//! Bottom-up integer type inference over behavior trees.

use crate::behav::{BinOp, Node, NodeKind, UnOp};
use crate::error::AnalysisResult;
use crate::model::{Instruction, IntType, RefKind, SetInfo, resolve_name};
use crate::passes::{Outcome, Pass};

/// Result type of binary promotion: follows the arithmetic type rules of the
/// description language.
fn promote(op: BinOp, lhs: IntType, rhs: IntType) -> IntType {
    let (w1, s1) = (lhs.width, lhs.signed);
    let (w2, s2) = (rhs.width, rhs.signed);
    match op {
        BinOp::Add => match (s1, s2) {
            (false, false) => IntType::unsigned(w1.max(w2) + 1),
            (true, true) => IntType::signed(w1.max(w2) + 1),
            (true, false) => IntType::signed(w1.max(w2 + 1) + 1),
            (false, true) => IntType::signed((w1 + 1).max(w2) + 1),
        },
        BinOp::Sub => match (s1, s2) {
            (false, false) | (true, true) => IntType::signed((w1 + 1).max(w2 + 1)),
            (true, false) => IntType::signed(w1.max(w2 + 1) + 1),
            (false, true) => IntType::signed((w1 + 1).max(w2) + 1),
        },
        BinOp::Mul => IntType { width: w1 + w2, signed: s1 || s2 },
        BinOp::Div => IntType {
            width: if s2 { w1 + 1 } else { w1 },
            signed: s1 || s2,
        },
        BinOp::Rem => match (s1, s2) {
            (false, false) => IntType::unsigned(w1.min(w2)),
            (true, true) => IntType::signed(w1.min(w2)),
            (true, false) => IntType::signed(w1.min(w2 + 1)),
            (false, true) => IntType::unsigned(w1.min(w2.saturating_sub(1).max(1))),
        },
        BinOp::And | BinOp::Or | BinOp::Xor => IntType { width: w1.max(w2), signed: s1 || s2 },
        BinOp::Shl | BinOp::Shr | BinOp::Sar => lhs,
        // Comparisons and logical connectives.
        _ => IntType::boolean(),
    }
}

struct Ctx<'a> {
    info: &'a SetInfo,
    instr: &'a Instruction,
    diagnostics: Vec<String>,
}

impl<'a> Ctx<'a> {
    fn unresolved(&mut self, what: impl Into<String>) {
        self.diagnostics.push(what.into());
    }

    fn named_ty(&mut self, name: &str) -> Option<IntType> {
        match resolve_name(self.info, self.instr, name) {
            Ok(RefKind::Field) => self.instr.operand(name).and_then(|op| op.ty),
            Ok(RefKind::Scalar) => self.instr.scalars.get(name).copied(),
            Ok(RefKind::Constant) => {
                self.info.constants.get(name).map(|v| IntType::minimal_for(*v))
            }
            Ok(RefKind::Space) => {
                // A bare space reference is only meaningful for the PC.
                self.info.space(name).filter(|s| s.is_pc()).map(|s| IntType::unsigned(s.width))
            }
            Ok(RefKind::Register) => {
                self.info.registers.get(name).map(|r| IntType::unsigned(r.width))
            }
            Err(_) => {
                self.unresolved(format!("unknown reference {name}"));
                None
            }
        }
    }

    fn infer(&mut self, node: &mut Node) -> AnalysisResult<()> {
        let ty = match &mut node.kind {
            NodeKind::Literal { ty, .. } => Some(*ty),
            NodeKind::NamedRef { name } => {
                let name = name.clone();
                self.named_ty(&name)
            }
            NodeKind::IndexedRef { base, index } => {
                let base_ty = self.info.space(base).map(|s| IntType::unsigned(s.width));
                self.infer(index)?;
                base_ty
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.infer(lhs)?;
                self.infer(rhs)?;
                if op.is_boolean() {
                    Some(IntType::boolean())
                } else {
                    match (lhs.ty, rhs.ty) {
                        (Some(lt), Some(rt)) => Some(promote(op, lt, rt)),
                        _ => {
                            self.unresolved(format!("{op:?} operand type unresolved"));
                            None
                        }
                    }
                }
            }
            NodeKind::Unary { op, operand } => {
                let op = *op;
                self.infer(operand)?;
                match (op, operand.ty) {
                    (UnOp::Not, _) => Some(IntType::boolean()),
                    (UnOp::Neg, Some(t)) => Some(IntType::signed(t.width + 1)),
                    (UnOp::Inv, Some(t)) => Some(IntType::signed(t.width)),
                    (_, None) => None,
                }
            }
            NodeKind::Slice { expr, hi, lo } => {
                self.infer(expr)?;
                self.infer(hi)?;
                self.infer(lo)?;
                match (expr.ty, hi.as_literal(), lo.as_literal()) {
                    (Some(t), Some(h), Some(l)) => {
                        let width = (h - l).unsigned_abs() as u32 + 1;
                        Some(IntType { width, signed: t.signed })
                    }
                    (Some(_), _, _) => {
                        // Non-static bounds are a documented limitation: record
                        // a diagnostic instead of failing the instruction.
                        self.unresolved("non-static slice bound".to_string());
                        None
                    }
                    (None, _, _) => None,
                }
            }
            NodeKind::Concat { lhs, rhs } => {
                self.infer(lhs)?;
                self.infer(rhs)?;
                None
            }
            NodeKind::TypeConv { signed, width, expr } => {
                let (signed, width) = (*signed, *width);
                self.infer(expr)?;
                expr.ty.map(|t| IntType { signed, width: width.unwrap_or(t.width) })
            }
            NodeKind::Assignment { target, expr } => {
                self.infer(target)?;
                self.infer(expr)?;
                None
            }
            NodeKind::Conditional { conds, bodies } => {
                for cond in conds.iter_mut() {
                    self.infer(cond)?;
                }
                for body in bodies.iter_mut() {
                    self.infer(body)?;
                }
                None
            }
            NodeKind::Loop { cond, body } => {
                self.infer(cond)?;
                for stmt in body.iter_mut() {
                    self.infer(stmt)?;
                }
                None
            }
            NodeKind::Ternary { cond, then_expr, else_expr } => {
                self.infer(cond)?;
                self.infer(then_expr)?;
                self.infer(else_expr)?;
                match (then_expr.ty, else_expr.ty) {
                    (Some(t), Some(e)) => Some(IntType::signed(t.width.max(e.width))),
                    _ => None,
                }
            }
            NodeKind::Call { args, .. } => {
                for arg in args.iter_mut() {
                    self.infer(arg)?;
                }
                None
            }
            NodeKind::Block { stmts } => {
                for stmt in stmts.iter_mut() {
                    self.infer(stmt)?;
                }
                None
            }
            NodeKind::Return { expr } => {
                if let Some(expr) = expr {
                    self.infer(expr)?;
                }
                None
            }
            NodeKind::Break => None,
        };
        node.ty = ty;
        Ok(())
    }
}

/// The type inference pass.
pub struct InferTypes;

impl Pass for InferTypes {
    fn name(&self) -> &'static str {
        "infer_types"
    }

    fn run(&self, info: &SetInfo, instr: &mut Instruction) -> AnalysisResult<Outcome> {
        let mut behavior = std::mem::take(&mut instr.behavior);
        let mut cx = Ctx { info, instr, diagnostics: Vec::new() };
        let result = cx.infer(&mut behavior);
        for diag in &cx.diagnostics {
            log::warn!("{}: cannot infer type: {diag}", instr.name);
        }
        instr.behavior = behavior;
        result?;
        Ok(Outcome::Done)
    }
}
