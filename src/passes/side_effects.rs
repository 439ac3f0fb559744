// This module detects memory side effects. Any main-memory access in an assignment
// target marks the instruction as possibly storing, any main-memory access anywhere
// in a read position marks it as possibly loading. The flags are advisory upper
// bounds for the scheduler: an access behind a condition still sets them.

//! Memory side effect detection.

use crate::behav::{Node, NodeKind};
use crate::error::AnalysisResult;
use crate::model::{Attr, Instruction, SetInfo};
use crate::passes::{Outcome, Pass};

#[derive(Default)]
struct Ctx {
    loads: bool,
    stores: bool,
}

impl Ctx {
    fn scan(&mut self, info: &SetInfo, node: &Node, writing: bool) {
        match &node.kind {
            NodeKind::Literal { .. } | NodeKind::NamedRef { .. } | NodeKind::Break => {}
            NodeKind::IndexedRef { base, index } => {
                if info.space(base).is_some_and(|s| s.is_main_mem()) {
                    if writing {
                        self.stores = true;
                    } else {
                        self.loads = true;
                    }
                }
                // The address computation is always a read.
                self.scan(info, index, false);
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                self.scan(info, lhs, writing);
                self.scan(info, rhs, writing);
            }
            NodeKind::Unary { operand, .. } => self.scan(info, operand, writing),
            NodeKind::Slice { expr, hi, lo } => {
                self.scan(info, expr, writing);
                self.scan(info, hi, false);
                self.scan(info, lo, false);
            }
            NodeKind::Concat { lhs, rhs } => {
                self.scan(info, lhs, writing);
                self.scan(info, rhs, writing);
            }
            NodeKind::TypeConv { expr, .. } => self.scan(info, expr, writing),
            NodeKind::Assignment { target, expr } => {
                self.scan(info, target, true);
                self.scan(info, expr, false);
            }
            NodeKind::Conditional { conds, bodies } => {
                for cond in conds {
                    self.scan(info, cond, false);
                }
                for body in bodies {
                    self.scan(info, body, false);
                }
            }
            NodeKind::Loop { cond, body } => {
                self.scan(info, cond, false);
                for stmt in body {
                    self.scan(info, stmt, false);
                }
            }
            NodeKind::Ternary { cond, then_expr, else_expr } => {
                self.scan(info, cond, false);
                self.scan(info, then_expr, false);
                self.scan(info, else_expr, false);
            }
            NodeKind::Call { args, .. } => {
                for arg in args {
                    self.scan(info, arg, false);
                }
            }
            NodeKind::Block { stmts } => {
                for stmt in stmts {
                    self.scan(info, stmt, false);
                }
            }
            NodeKind::Return { expr } => {
                if let Some(expr) = expr {
                    self.scan(info, expr, false);
                }
            }
        }
    }
}

/// The memory side effect detection pass.
pub struct DetectSideEffects;

impl Pass for DetectSideEffects {
    fn name(&self) -> &'static str {
        "detect_side_effects"
    }

    fn run(&self, info: &SetInfo, instr: &mut Instruction) -> AnalysisResult<Outcome> {
        let mut cx = Ctx::default();
        cx.scan(info, &instr.behavior, false);
        if cx.loads {
            instr.attrs.set(Attr::MayLoad);
        }
        if cx.stores {
            instr.attrs.set(Attr::MayStore);
        }
        if !cx.loads && !cx.stores {
            return Ok(Outcome::Skipped);
        }
        Ok(Outcome::Done)
    }
}
