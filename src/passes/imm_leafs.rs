// This module finds immediate operands that can be folded into standalone pattern
// leaves. The walk abstracts every expression to a small bitset: does the subtree
// contain register values, immediate operands, literal constants? An operator node
// whose subtree combines immediates with constants and nothing else is a foldable
// computation (a scaled or offset immediate); its immediate operands are recorded as
// leaves and the subtree collapses, so an enclosing operation that also reads
// registers does not retrigger on it. Immediates used bare, next to a register, stay
// ordinary operands.

//! Immediate leaf detection.

use crate::behav::{Node, NodeKind};
use crate::error::AnalysisResult;
use crate::model::{Attr, Instruction, SetInfo};
use crate::passes::{Outcome, Pass};
use std::collections::BTreeSet;
use std::ops::BitOr;

/// What kinds of values a subtree may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LeafState(u8);

impl LeafState {
    const NONE: LeafState = LeafState(0);
    const REG: LeafState = LeafState(1);
    const IMM: LeafState = LeafState(2);
    const CONST: LeafState = LeafState(4);

    fn foldable(self) -> bool {
        self == LeafState::IMM | LeafState::CONST
    }
}

impl BitOr for LeafState {
    type Output = LeafState;

    fn bitor(self, rhs: LeafState) -> LeafState {
        LeafState(self.0 | rhs.0)
    }
}

#[derive(Default)]
struct Ctx {
    leafs: BTreeSet<String>,
}

impl Ctx {
    /// Abstract a value expression. Returns the subtree state plus the
    /// immediate operand names feeding it; a foldable operator moves those
    /// names into the leaf set and collapses.
    fn eval(&mut self, instr: &Instruction, node: &Node) -> (LeafState, Vec<String>) {
        match &node.kind {
            NodeKind::Literal { .. } => (LeafState::CONST, Vec::new()),
            NodeKind::NamedRef { name } => match instr.operand(name) {
                Some(op) if op.is_immediate() => (LeafState::IMM, vec![name.clone()]),
                Some(_) => (LeafState::REG, Vec::new()),
                None => (LeafState::REG, Vec::new()),
            },
            // Register and memory reads produce runtime values.
            NodeKind::IndexedRef { .. } => (LeafState::REG, Vec::new()),
            NodeKind::Binary { lhs, rhs, .. } => {
                let (ls, mut ln) = self.eval(instr, lhs);
                let (rs, rn) = self.eval(instr, rhs);
                ln.extend(rn);
                self.combine(ls | rs, ln)
            }
            NodeKind::Unary { operand, .. } => {
                let (s, n) = self.eval(instr, operand);
                self.combine(s, n)
            }
            NodeKind::Slice { expr, hi, lo } => {
                let (es, mut en) = self.eval(instr, expr);
                let (hs, hn) = self.eval(instr, hi);
                let (los, lon) = self.eval(instr, lo);
                en.extend(hn);
                en.extend(lon);
                self.combine(es | hs | los, en)
            }
            NodeKind::Concat { lhs, rhs } => {
                let (ls, mut ln) = self.eval(instr, lhs);
                let (rs, rn) = self.eval(instr, rhs);
                ln.extend(rn);
                self.combine(ls | rs, ln)
            }
            NodeKind::TypeConv { expr, .. } => self.eval(instr, expr),
            NodeKind::Ternary { cond, then_expr, else_expr } => {
                self.eval(instr, cond);
                self.eval(instr, then_expr);
                self.eval(instr, else_expr);
                (LeafState::NONE, Vec::new())
            }
            NodeKind::Call { args, .. } => {
                for arg in args {
                    self.eval(instr, arg);
                }
                (LeafState::NONE, Vec::new())
            }
            _ => (LeafState::NONE, Vec::new()),
        }
    }

    fn combine(&mut self, state: LeafState, names: Vec<String>) -> (LeafState, Vec<String>) {
        if state.foldable() {
            self.leafs.extend(names);
            (LeafState::NONE, Vec::new())
        } else {
            (state, names)
        }
    }

    fn walk(&mut self, instr: &Instruction, node: &Node) {
        match &node.kind {
            NodeKind::Assignment { target, expr } => {
                if let NodeKind::IndexedRef { index, .. } = &target.kind {
                    self.eval(instr, index);
                }
                self.eval(instr, expr);
            }
            NodeKind::Conditional { conds, bodies } => {
                for cond in conds {
                    self.eval(instr, cond);
                }
                for body in bodies {
                    self.walk(instr, body);
                }
            }
            NodeKind::Loop { cond, body } => {
                self.eval(instr, cond);
                for stmt in body {
                    self.walk(instr, stmt);
                }
            }
            NodeKind::Block { stmts } => {
                for stmt in stmts {
                    self.walk(instr, stmt);
                }
            }
            NodeKind::Return { expr } => {
                if let Some(expr) = expr {
                    self.eval(instr, expr);
                }
            }
            _ => {}
        }
    }
}

/// The immediate leaf detection pass.
pub struct DetectImmLeafs;

impl Pass for DetectImmLeafs {
    fn name(&self) -> &'static str {
        "detect_imm_leafs"
    }

    fn run(&self, _info: &SetInfo, instr: &mut Instruction) -> AnalysisResult<Outcome> {
        let mut cx = Ctx::default();
        cx.walk(instr, &instr.behavior);
        if cx.leafs.is_empty() {
            return Ok(Outcome::Skipped);
        }
        log::debug!("{}: immediate leaves {:?}", instr.name, cx.leafs);
        instr.attrs.set(Attr::ImmLeafs(cx.leafs.into_iter().collect()));
        Ok(Outcome::Done)
    }
}
