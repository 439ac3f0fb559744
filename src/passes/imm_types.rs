// This module classifies the remaining operands as immediates and pins their types.
// Any operand still unclassified after register detection and referenced by name as
// a value is an immediate; its type starts at the encoded field type. The walk
// descends into index expressions too, because address offsets live there. An explicit cast
// applied directly to an immediate reference refines that type once: a sign cast may
// upgrade an unsigned immediate to signed, after which the type is locked and any
// cast disagreeing in signedness or width is a conflict that fails the instruction.
// Width-changing casts on immediates are always conflicts, because the encoded field
// width is the one source of truth for how many bits the assembler may emit.

//! Immediate operand classification and type pinning.

use crate::behav::{Node, NodeKind};
use crate::error::{AnalysisError, AnalysisResult};
use crate::model::{Instruction, IntType, OperandKind, SetInfo};
use crate::passes::{Outcome, Pass};

fn mark_immediate(instr: &mut Instruction, name: &str) {
    if let Some(op) = instr.operand_mut(name) {
        if op.kind == OperandKind::Unclassified {
            op.kind = OperandKind::Immediate;
        }
    }
}

fn apply_cast(
    instr: &mut Instruction,
    name: &str,
    signed: bool,
    width: Option<u32>,
) -> AnalysisResult<()> {
    mark_immediate(instr, name);
    let Some(op) = instr.operand_mut(name) else {
        return Ok(());
    };
    if !op.is_immediate() {
        return Ok(());
    }
    let Some(current) = op.ty else {
        return Ok(());
    };
    let desired = IntType { width: width.unwrap_or(current.width), signed };
    if desired.width != current.width {
        return Err(AnalysisError::ConflictingImmediateType {
            operand: name.to_string(),
            first: current,
            second: desired,
        });
    }
    if desired.signed == current.signed {
        op.explicit_ty = true;
    } else if desired.signed && !op.explicit_ty {
        // One-time sign upgrade; encoded fields default to unsigned.
        op.ty = Some(desired);
        op.explicit_ty = true;
    } else {
        return Err(AnalysisError::ConflictingImmediateType {
            operand: name.to_string(),
            first: current,
            second: desired,
        });
    }
    Ok(())
}

fn walk(instr: &mut Instruction, node: &Node) -> AnalysisResult<()> {
    match &node.kind {
        NodeKind::Literal { .. } | NodeKind::Break => {}
        NodeKind::NamedRef { name } => {
            let name = name.clone();
            mark_immediate(instr, &name);
        }
        // Register bases of an index were classified by the preceding pass;
        // whatever else appears inside (an address offset) is a value use.
        NodeKind::IndexedRef { index, .. } => walk(instr, index)?,
        NodeKind::TypeConv { signed, width, expr } => {
            if let NodeKind::NamedRef { name } = &expr.kind {
                let name = name.clone();
                apply_cast(instr, &name, *signed, *width)?;
            } else {
                walk(instr, expr)?;
            }
        }
        NodeKind::Binary { lhs, rhs, .. } => {
            walk(instr, lhs)?;
            walk(instr, rhs)?;
        }
        NodeKind::Unary { operand, .. } => walk(instr, operand)?,
        NodeKind::Slice { expr, hi, lo } => {
            walk(instr, expr)?;
            walk(instr, hi)?;
            walk(instr, lo)?;
        }
        NodeKind::Concat { lhs, rhs } => {
            walk(instr, lhs)?;
            walk(instr, rhs)?;
        }
        NodeKind::Assignment { target, expr } => {
            walk(instr, target)?;
            walk(instr, expr)?;
        }
        NodeKind::Conditional { conds, bodies } => {
            for cond in conds {
                walk(instr, cond)?;
            }
            for body in bodies {
                walk(instr, body)?;
            }
        }
        NodeKind::Loop { cond, body } => {
            walk(instr, cond)?;
            for stmt in body {
                walk(instr, stmt)?;
            }
        }
        NodeKind::Ternary { cond, then_expr, else_expr } => {
            walk(instr, cond)?;
            walk(instr, then_expr)?;
            walk(instr, else_expr)?;
        }
        NodeKind::Call { args, .. } => {
            for arg in args {
                walk(instr, arg)?;
            }
        }
        NodeKind::Block { stmts } => {
            for stmt in stmts {
                walk(instr, stmt)?;
            }
        }
        NodeKind::Return { expr } => {
            if let Some(expr) = expr {
                walk(instr, expr)?;
            }
        }
    }
    Ok(())
}

/// The immediate classification pass.
pub struct DetectImmTypes;

impl Pass for DetectImmTypes {
    fn name(&self) -> &'static str {
        "detect_imm_types"
    }

    fn run(&self, _info: &SetInfo, instr: &mut Instruction) -> AnalysisResult<Outcome> {
        let behavior = std::mem::take(&mut instr.behavior);
        let result = walk(instr, &behavior);
        instr.behavior = behavior;
        result?;
        Ok(Outcome::Done)
    }
}
