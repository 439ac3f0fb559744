// This module reconciles the assembly syntax with the analyzed operands. The
// per-instruction sweep parses the `$name` placeholders, requires them to cover the
// declared operands exactly and records the input and output operand lists in
// assembly order, which is the order an assembler matcher and a pattern emitter both
// consume. Finalization pairs every compressed instruction with its uncompressed
// counterpart and emits a literal equivalence line. A compressed form usually has one
// operand fewer because a read-modify-write register is spelled once; that unique
// in/out register operand is duplicated on the uncompressed side, right after its
// first occurrence. Counterpart failures are discovered after the sweep, so they
// demote the instruction in the pass metrics instead of failing it up front.

//! Assembly syntax reconciliation and compressed-form equivalences.

use crate::error::{AnalysisError, AnalysisResult};
use crate::metrics::PassMetrics;
use crate::model::{Attr, Instruction, InstructionSet, Role, SetInfo};
use crate::passes::{Outcome, Pass};

/// Extract `$name` placeholders in order of appearance.
fn placeholders(syntax: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = syntax;
    while let Some(pos) = rest.find('$') {
        rest = &rest[pos + 1..];
        let end = rest
            .find(|c: char| !c.is_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        if end > 0 {
            names.push(rest[..end].to_string());
        }
        rest = &rest[end..];
    }
    names
}

/// Build the equivalence line pairing a compressed instruction with its
/// uncompressed counterpart.
fn equivalence(comp: &Instruction, uncomp: &Instruction) -> AnalysisResult<String> {
    let comp_ops = placeholders(&comp.asm_syntax);
    let uncomp_count = uncomp.operands.len();
    let uncomp_ops = if comp_ops.len() == uncomp_count {
        comp_ops.clone()
    } else if comp_ops.len() + 1 == uncomp_count {
        // The omitted operand is the read-modify-write register, spelled twice
        // on the uncompressed side.
        let mut rmw = comp
            .operands
            .iter()
            .filter(|op| op.role == Role::InOut && op.is_register());
        let (Some(op), None) = (rmw.next(), rmw.next()) else {
            return Err(AnalysisError::unsupported_pattern(format!(
                "{}: no unique in/out register to expand",
                comp.name
            )));
        };
        let Some(pos) = comp_ops.iter().position(|n| *n == op.name) else {
            return Err(AnalysisError::unsupported_pattern(format!(
                "{}: operand {} missing from assembly syntax",
                comp.name, op.name
            )));
        };
        let mut ops = comp_ops.clone();
        ops.insert(pos + 1, op.name.clone());
        ops
    } else {
        return Err(AnalysisError::OperandCountMismatch {
            instruction: comp.name.clone(),
            placeholders: comp_ops.len(),
            declared: uncomp_count,
        });
    };

    let join = |ops: &[String]| {
        ops.iter()
            .map(|n| format!("${n}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    Ok(format!(
        "{} {} <-> {} {}",
        uncomp.name,
        join(&uncomp_ops),
        comp.name,
        join(&comp_ops)
    ))
}

/// The assembly reconciliation pass.
pub struct ReconcileAsm;

impl Pass for ReconcileAsm {
    fn name(&self) -> &'static str {
        "reconcile_asm"
    }

    fn run(&self, _info: &SetInfo, instr: &mut Instruction) -> AnalysisResult<Outcome> {
        let names = placeholders(&instr.asm_syntax);
        if names.len() != instr.operands.len() {
            return Err(AnalysisError::OperandCountMismatch {
                instruction: instr.name.clone(),
                placeholders: names.len(),
                declared: instr.operands.len(),
            });
        }
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for name in &names {
            let Some(op) = instr.operand(name) else {
                return Err(AnalysisError::UnknownReference { name: name.clone() });
            };
            if op.role.is_output() {
                outputs.push(name.clone());
            }
            // Unassigned operands default to inputs so the assembler still
            // accepts them.
            if op.role.is_input() || op.role == Role::Unassigned {
                inputs.push(name.clone());
            }
        }
        instr.attrs.set(Attr::Inputs(inputs));
        instr.attrs.set(Attr::Outputs(outputs));
        Ok(Outcome::Done)
    }

    fn finalize(&self, set: &mut InstructionSet, metrics: &mut PassMetrics) {
        let mut results: Vec<(String, Result<String, AnalysisError>)> = Vec::new();
        for instr in &set.instructions {
            let Some(counterpart) = &instr.compressed_of else { continue };
            let result = match set.instruction(counterpart) {
                Some(uncomp) => equivalence(instr, uncomp),
                None => Err(AnalysisError::MissingCounterpart { name: counterpart.clone() }),
            };
            results.push((instr.name.clone(), result));
        }
        for (name, result) in results {
            match result {
                Ok(line) => {
                    log::debug!("{name}: equivalence {line}");
                    if let Some(instr) = set.instruction_mut(&name) {
                        instr.attrs.set(Attr::Equivalence(line));
                    }
                }
                Err(err) => {
                    log::warn!("equivalence for {name} failed: {err}");
                    metrics.demote(&name);
                }
            }
        }
    }
}
