// This module implements operand role detection. The walk threads a read/write mode
// flag through each instruction's behavior: assignment targets are visited in write
// mode, their expressions in read mode, condition and loop guards in read mode. Every
// bare name seen under a mode lands in the pass-local read or write set; afterwards
// an operand read and written is InOut, read-only In, write-only Out. Architectural
// registers referenced without being declared operands (a fixed status register, for
// example) become implicit use/def attributes on the instruction instead of operands.
// The program counter and behavior-local scalars are excluded; a name that resolves
// to nothing is a per-instruction failure, because it means the frontend handed us a
// dangling reference.

//! Operand role (in/out/inout) detection.

use crate::behav::{Node, NodeKind};
use crate::error::AnalysisResult;
use crate::model::{
    Attr, Instruction, RefKind, Role, SetInfo, resolve_name,
};
use crate::passes::{Outcome, Pass};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Neutral,
    Read,
    Write,
}

#[derive(Default)]
struct Ctx {
    reads: BTreeSet<String>,
    writes: BTreeSet<String>,
}

impl Ctx {
    fn record(&mut self, name: &str, mode: Mode) {
        match mode {
            Mode::Read => {
                self.reads.insert(name.to_string());
            }
            Mode::Write => {
                self.writes.insert(name.to_string());
            }
            Mode::Neutral => {}
        }
    }

    fn walk(&mut self, node: &Node, mode: Mode) {
        match &node.kind {
            NodeKind::Literal { .. } | NodeKind::Break => {}
            NodeKind::NamedRef { name } => self.record(name, mode),
            // The index inherits the surrounding mode: the index of a written
            // register selects the destination register.
            NodeKind::IndexedRef { index, .. } => self.walk(index, mode),
            NodeKind::Binary { lhs, rhs, .. } => {
                self.walk(lhs, mode);
                self.walk(rhs, mode);
            }
            NodeKind::Unary { operand, .. } => self.walk(operand, mode),
            NodeKind::Slice { expr, hi, lo } => {
                self.walk(expr, mode);
                self.walk(hi, mode);
                self.walk(lo, mode);
            }
            NodeKind::Concat { lhs, rhs } => {
                self.walk(lhs, mode);
                self.walk(rhs, mode);
            }
            NodeKind::TypeConv { expr, .. } => self.walk(expr, mode),
            NodeKind::Assignment { target, expr } => {
                self.walk(target, Mode::Write);
                self.walk(expr, Mode::Read);
            }
            NodeKind::Conditional { conds, bodies } => {
                for cond in conds {
                    self.walk(cond, Mode::Read);
                }
                for body in bodies {
                    self.walk(body, Mode::Neutral);
                }
            }
            NodeKind::Loop { cond, body } => {
                self.walk(cond, Mode::Read);
                for stmt in body {
                    self.walk(stmt, Mode::Neutral);
                }
            }
            NodeKind::Ternary { cond, then_expr, else_expr } => {
                self.walk(cond, Mode::Read);
                self.walk(then_expr, Mode::Read);
                self.walk(else_expr, Mode::Read);
            }
            NodeKind::Call { args, .. } => {
                for arg in args {
                    self.walk(arg, mode);
                }
            }
            NodeKind::Block { stmts } => {
                for stmt in stmts {
                    self.walk(stmt, Mode::Neutral);
                }
            }
            NodeKind::Return { expr } => {
                if let Some(expr) = expr {
                    self.walk(expr, Mode::Read);
                }
            }
        }
    }
}

/// The operand role detection pass.
pub struct DetectRoles;

impl Pass for DetectRoles {
    fn name(&self) -> &'static str {
        "detect_roles"
    }

    fn run(&self, info: &SetInfo, instr: &mut Instruction) -> AnalysisResult<Outcome> {
        let mut cx = Ctx::default();
        cx.walk(&instr.behavior, Mode::Neutral);

        for op in &mut instr.operands {
            let read = cx.reads.contains(&op.name);
            let written = cx.writes.contains(&op.name);
            op.role = match (read, written) {
                (true, true) => Role::InOut,
                (true, false) => Role::In,
                (false, true) => Role::Out,
                (false, false) => Role::Unassigned,
            };
        }

        // Architectural state touched without a matching operand turns into
        // implicit uses/defs; the PC and locals are tracked elsewhere.
        let mut uses = Vec::new();
        for name in &cx.reads {
            match resolve_name(info, instr, name)? {
                RefKind::Register => uses.push(name.clone()),
                RefKind::Space | RefKind::Field | RefKind::Scalar | RefKind::Constant => {}
            }
        }
        let mut defs = Vec::new();
        for name in &cx.writes {
            match resolve_name(info, instr, name)? {
                RefKind::Register => defs.push(name.clone()),
                RefKind::Space | RefKind::Field | RefKind::Scalar | RefKind::Constant => {}
            }
        }
        if !uses.is_empty() {
            instr.attrs.set(Attr::ImplicitUses(uses));
        }
        if !defs.is_empty() {
            instr.attrs.set(Attr::ImplicitDefs(defs));
        }
        Ok(Outcome::Done)
    }
}
