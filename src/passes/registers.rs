// This module classifies operands as register operands. Every index expression into
// a register-file state space is inspected: a bare operand name selects the file at
// element offset zero, an operand plus a literal selects it at that literal offset,
// and the (file, offset) pair maps to a register class. For the general-purpose file
// a nonzero offset of eight selects the restricted class used by compressed
// encodings; the floating-point and control/status files map to their own classes;
// any other register file becomes a custom class named after the file. An operand
// indexing two different files, or one file at two different offsets, is a
// classification conflict and fails the instruction. Set preparation turns
// single-element register files into named register declarations so that bare
// references to them resolve.

//! Register operand classification.

use crate::behav::{BinOp, Node, NodeKind};
use crate::error::{AnalysisError, AnalysisResult};
use crate::model::{
    Instruction, InstructionSet, IntType, OperandKind, Register, RegisterClass, SetInfo, StateSpace,
};
use crate::passes::{Outcome, Pass};

/// Map a register file plus element offset to a register class.
fn class_for(space: &StateSpace, offset: i128) -> AnalysisResult<RegisterClass> {
    let class = match (space.name.as_str(), offset) {
        ("X", 0) => RegisterClass::Gpr,
        ("X", 8) => RegisterClass::GprC,
        ("F", 0) => RegisterClass::Fpr,
        ("CSR", 0) => RegisterClass::Csr,
        (_, 0) => RegisterClass::Custom(space.name.clone()),
        _ => {
            return Err(AnalysisError::UnknownRegisterOffset {
                file: space.name.clone(),
                offset,
            })
        }
    };
    Ok(class)
}

/// Decompose a register-file index into `(operand name, element offset)`.
///
/// Accepted shapes are a bare operand reference and an operand plus a literal
/// in either order. Anything else (a fixed register like `X[0]`, a computed
/// index) selects no operand and is left alone.
fn index_operand(index: &Node) -> Option<(&str, i128)> {
    match &index.kind {
        NodeKind::NamedRef { name } => Some((name, 0)),
        NodeKind::Binary { op: BinOp::Add, lhs, rhs } => match (&lhs.kind, &rhs.kind) {
            (NodeKind::NamedRef { name }, NodeKind::Literal { value, .. }) => Some((name, *value)),
            (NodeKind::Literal { value, .. }, NodeKind::NamedRef { name }) => Some((name, *value)),
            _ => None,
        },
        _ => None,
    }
}

struct Ctx<'a> {
    info: &'a SetInfo,
}

impl Ctx<'_> {
    fn classify(
        &self,
        instr: &mut Instruction,
        name: &str,
        file: &str,
        offset: i128,
    ) -> AnalysisResult<()> {
        let Some(space) = self.info.space(file) else {
            return Ok(());
        };
        let Some(op) = instr.operand_mut(name) else {
            // A scalar or constant index is legal and classifies nothing.
            return Ok(());
        };
        let class = class_for(space, offset)?;
        let kind = OperandKind::Register { class, file: file.to_string(), offset };
        match &op.kind {
            OperandKind::Unclassified => {
                op.kind = kind;
                op.ty = Some(IntType::unsigned(space.width));
            }
            existing if *existing == kind => {}
            OperandKind::Register { file: other_file, offset: other_offset, .. } => {
                return Err(AnalysisError::ConflictingRegisterType {
                    operand: name.to_string(),
                    reason: format!(
                        "indexes {other_file} at offset {other_offset} and {file} at offset {offset}"
                    ),
                });
            }
            OperandKind::Immediate => {
                return Err(AnalysisError::ConflictingRegisterType {
                    operand: name.to_string(),
                    reason: "already classified as an immediate".into(),
                });
            }
        }
        Ok(())
    }

    fn walk(&self, instr: &mut Instruction, node: &Node) -> AnalysisResult<()> {
        match &node.kind {
            NodeKind::Literal { .. } | NodeKind::NamedRef { .. } | NodeKind::Break => {}
            NodeKind::IndexedRef { base, index } => {
                let is_reg_file = self
                    .info
                    .space(base)
                    .is_some_and(|s| s.kind == crate::model::SpaceKind::RegisterFile);
                if is_reg_file {
                    if let Some((name, offset)) = index_operand(index) {
                        let name = name.to_string();
                        self.classify(instr, &name, base, offset)?;
                        return Ok(());
                    }
                }
                self.walk(instr, index)?;
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                self.walk(instr, lhs)?;
                self.walk(instr, rhs)?;
            }
            NodeKind::Unary { operand, .. } => self.walk(instr, operand)?,
            NodeKind::Slice { expr, hi, lo } => {
                self.walk(instr, expr)?;
                self.walk(instr, hi)?;
                self.walk(instr, lo)?;
            }
            NodeKind::Concat { lhs, rhs } => {
                self.walk(instr, lhs)?;
                self.walk(instr, rhs)?;
            }
            NodeKind::TypeConv { expr, .. } => self.walk(instr, expr)?,
            NodeKind::Assignment { target, expr } => {
                self.walk(instr, target)?;
                self.walk(instr, expr)?;
            }
            NodeKind::Conditional { conds, bodies } => {
                for cond in conds {
                    self.walk(instr, cond)?;
                }
                for body in bodies {
                    self.walk(instr, body)?;
                }
            }
            NodeKind::Loop { cond, body } => {
                self.walk(instr, cond)?;
                for stmt in body {
                    self.walk(instr, stmt)?;
                }
            }
            NodeKind::Ternary { cond, then_expr, else_expr } => {
                self.walk(instr, cond)?;
                self.walk(instr, then_expr)?;
                self.walk(instr, else_expr)?;
            }
            NodeKind::Call { args, .. } => {
                for arg in args {
                    self.walk(instr, arg)?;
                }
            }
            NodeKind::Block { stmts } => {
                for stmt in stmts {
                    self.walk(instr, stmt)?;
                }
            }
            NodeKind::Return { expr } => {
                if let Some(expr) = expr {
                    self.walk(instr, expr)?;
                }
            }
        }
        Ok(())
    }
}

/// The register operand classification pass.
pub struct DetectRegisters;

impl Pass for DetectRegisters {
    fn name(&self) -> &'static str {
        "detect_registers"
    }

    /// Turn single-element register files into named register declarations.
    fn prepare(&self, set: &mut InstructionSet) -> AnalysisResult<()> {
        let singles: Vec<Register> = set
            .info
            .spaces
            .values()
            .filter(|s| s.kind == crate::model::SpaceKind::RegisterFile && s.count == Some(1))
            .map(|s| Register {
                name: s.name.clone(),
                class: RegisterClass::Custom(s.name.clone()),
                width: s.width,
            })
            .collect();
        for reg in singles {
            if !set.info.is_register(&reg.name) {
                log::debug!("declaring register {} ({} bits)", reg.name, reg.width);
                set.info.registers.insert(reg.name.clone(), reg);
            }
        }
        Ok(())
    }

    fn run(&self, info: &SetInfo, instr: &mut Instruction) -> AnalysisResult<Outcome> {
        let behavior = std::mem::take(&mut instr.behavior);
        let result = Ctx { info }.walk(instr, &behavior);
        instr.behavior = behavior;
        result?;
        Ok(Outcome::Done)
    }
}
