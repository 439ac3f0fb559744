// This module lowers analyzed behavior trees into canonical selection patterns. Each
// top-level register write becomes one pattern keyed by its destination operand; main
// memory writes become store patterns with the access width baked into the operation
// name; register-plus-register and register-plus-immediate address computations are
// promoted to addressing-mode wrappers with the register leaf ordered first; a
// conditional whose single guarded statement advances the program counter by an
// offset is canonicalized into a quaternary compare-and-branch node and the raw PC
// assignment disappears. A post-processing sweep pairs memory accesses with a
// separate write-back of their base register and fuses both into pre/post-increment
// operations. Anything the canonical vocabulary cannot express fails the instruction,
// and the pipeline records it; behavior with no lowerable statement is skipped.

//! Canonical pattern DAG construction.

use crate::behav::{BinOp, Node, NodeKind, UnOp};
use crate::dag::{DagNode, DagType, Pattern};
use crate::error::{AnalysisError, AnalysisResult};
use crate::model::{Attr, Instruction, SetInfo, SpaceKind};
use crate::passes::{Outcome, Pass};

const PASS: &str = "build_dags";

/// Canonical name of an arithmetic operator. Signedness-dependent operators
/// pick their variant from the result type.
fn arith_name(op: BinOp, signed: bool) -> AnalysisResult<&'static str> {
    let name = match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
        BinOp::Shl => "shl",
        BinOp::Shr => "srl",
        BinOp::Sar => "sra",
        BinOp::Rem if signed => "srem",
        BinOp::Rem => "urem",
        BinOp::Div => {
            return Err(AnalysisError::unsupported_pattern(
                "division has no canonical selection node",
            ))
        }
        _ => {
            return Err(AnalysisError::unsupported_pattern(format!(
                "operator {op:?} has no canonical selection node"
            )))
        }
    };
    Ok(name)
}

/// Condition code of a comparison, picking the unsigned variant from the
/// compared type.
fn cond_code(op: BinOp, signed: bool) -> AnalysisResult<&'static str> {
    let code = match (op, signed) {
        (BinOp::Eq, _) => "SETEQ",
        (BinOp::Ne, _) => "SETNE",
        (BinOp::Lt, true) => "SETLT",
        (BinOp::Lt, false) => "SETULT",
        (BinOp::Gt, true) => "SETGT",
        (BinOp::Gt, false) => "SETUGT",
        (BinOp::Le, true) => "SETLE",
        (BinOp::Le, false) => "SETULE",
        (BinOp::Ge, true) => "SETGE",
        (BinOp::Ge, false) => "SETUGE",
        _ => {
            return Err(AnalysisError::unsupported_pattern(format!(
                "operator {op:?} is not a comparison"
            )))
        }
    };
    Ok(code)
}

struct Ctx<'a> {
    info: &'a SetInfo,
    instr: &'a Instruction,
    xlen: u32,
}

impl Ctx<'_> {
    fn operand_leaf(&self, name: &str) -> AnalysisResult<DagNode> {
        if let Some(op) = self.instr.operand(name) {
            return Ok(DagNode::operand(name, DagType::of_operand(op)));
        }
        if let Some(value) = self.info.constants.get(name) {
            return Ok(DagNode::Imm(*value));
        }
        if let Some(space) = self.info.space(name) {
            if space.is_pc() {
                return Ok(DagNode::operand(name, DagType::pc()));
            }
        }
        if let Some(reg) = self.info.registers.get(name) {
            return Ok(DagNode::operand(name, DagType(reg.class.to_string())));
        }
        Err(AnalysisError::unsupported_pattern(format!(
            "reference {name} has no pattern leaf"
        )))
    }

    /// Lower a value expression to a DAG.
    fn build_expr(&self, node: &Node) -> AnalysisResult<DagNode> {
        match &node.kind {
            NodeKind::Literal { value, .. } => Ok(DagNode::Imm(*value)),
            NodeKind::NamedRef { name } => self.operand_leaf(name),
            NodeKind::IndexedRef { base, index } => match self.info.space(base).map(|s| s.kind) {
                Some(SpaceKind::RegisterFile) => self.register_leaf(index),
                Some(SpaceKind::MainMemory) => {
                    let addr = self.build_addr(index)?;
                    Ok(DagNode::op("load", vec![addr]))
                }
                _ => Err(AnalysisError::unsupported_pattern(format!(
                    "indexed access into {base}"
                ))),
            },
            NodeKind::Binary { op, lhs, rhs } => {
                let l = self.build_expr(lhs)?;
                let r = self.build_expr(rhs)?;
                if op.is_boolean() {
                    // Comparisons lower to their kind as the op name; only the
                    // quaternary branch node carries a condition-code leaf.
                    let signed = lhs.ty.map(|t| t.signed).unwrap_or(true);
                    let code = cond_code(*op, signed)?;
                    Ok(DagNode::op(code.to_ascii_lowercase(), vec![l, r]))
                } else {
                    let signed = node.ty.map(|t| t.signed).unwrap_or(true);
                    Ok(DagNode::op(arith_name(*op, signed)?, vec![l, r]))
                }
            }
            NodeKind::Unary { op, operand } => {
                let e = self.build_expr(operand)?;
                let name = match op {
                    UnOp::Neg => "neg",
                    UnOp::Inv | UnOp::Not => "not",
                };
                Ok(DagNode::op(name, vec![e]))
            }
            NodeKind::Slice { expr, hi, lo } => {
                // A slice spanning the whole value is the identity.
                if let (Some(h), Some(0)) = (hi.as_literal(), lo.as_literal()) {
                    if expr.ty.is_some_and(|t| t.width == h as u32 + 1) {
                        return self.build_expr(expr);
                    }
                }
                Err(AnalysisError::unsupported_pattern("partial bit slice"))
            }
            NodeKind::TypeConv { signed, width, expr } => {
                let inner = self.build_expr(expr)?;
                match (&inner, width) {
                    // Casting a memory read picks the extending load variant.
                    (DagNode::Op { name, operands }, Some(w)) if name == "load" => {
                        if *w >= self.xlen {
                            return Ok(inner);
                        }
                        let variant = if *signed { "sextload" } else { "zextload" };
                        Ok(DagNode::op(format!("{variant}i{w}"), operands.clone()))
                    }
                    (_, Some(w)) if *w < self.xlen => {
                        Ok(DagNode::op(format!("i{w}"), vec![inner]))
                    }
                    _ => Ok(inner),
                }
            }
            NodeKind::Ternary { .. } | NodeKind::Concat { .. } | NodeKind::Call { .. } => {
                Err(AnalysisError::unsupported_pattern(format!(
                    "{} in a pattern expression",
                    node.kind_name()
                )))
            }
            _ => Err(AnalysisError::UnsupportedNodeKind { pass: PASS, kind: node.kind_name() }),
        }
    }

    /// Lower a register-file index to an operand leaf.
    fn register_leaf(&self, index: &Node) -> AnalysisResult<DagNode> {
        match &index.kind {
            NodeKind::NamedRef { name } => self.operand_leaf(name),
            // Offset indices select a sub-class; the leaf is still the operand.
            NodeKind::Binary { op: BinOp::Add, lhs, rhs } => {
                match (lhs.as_named(), rhs.as_named()) {
                    (Some(name), None) | (None, Some(name)) => self.operand_leaf(name),
                    _ => Err(AnalysisError::unsupported_pattern("computed register index")),
                }
            }
            _ => Err(AnalysisError::unsupported_pattern("computed register index")),
        }
    }

    /// Lower an address computation, promoting reg+reg and reg+imm sums to
    /// addressing-mode wrappers with the register leaf first.
    fn build_addr(&self, index: &Node) -> AnalysisResult<DagNode> {
        let dag = self.build_expr(index)?;
        let DagNode::Op { name, operands } = &dag else {
            return Ok(dag);
        };
        if name != "add" || operands.len() != 2 {
            return Ok(dag);
        }
        let (a, b) = (&operands[0], &operands[1]);
        let mode = |n: &DagNode| match n {
            DagNode::Operand { ty, .. } if ty.is_register_class() => Some("reg"),
            DagNode::Operand { ty, .. } if ty.is_immediate() => Some("imm"),
            DagNode::Imm(_) => Some("imm"),
            _ => None,
        };
        match (mode(a), mode(b)) {
            (Some("reg"), Some("reg")) => {
                Ok(DagNode::op("AddrRegReg", vec![a.clone(), b.clone()]))
            }
            (Some("reg"), Some("imm")) => {
                Ok(DagNode::op("AddrRegImm", vec![a.clone(), b.clone()]))
            }
            (Some("imm"), Some("reg")) => {
                // Canonical operand order is register first.
                Ok(DagNode::op("AddrRegImm", vec![b.clone(), a.clone()]))
            }
            _ => Err(AnalysisError::unsupported_pattern("address computation too complex")),
        }
    }

    /// Lower one top-level statement, appending to `entries`.
    fn build_stmt(&self, stmt: &Node, entries: &mut Vec<Pattern>) -> AnalysisResult<()> {
        match &stmt.kind {
            NodeKind::Assignment { target, expr } => self.build_assign(target, expr, entries),
            NodeKind::Conditional { conds, bodies } => {
                if let Some(pattern) = self.build_branch(conds, bodies)? {
                    entries.push(Pattern::new(format!("pat{}", entries.len()), pattern));
                } else {
                    log::debug!("{}: conditional is not a canonical branch", self.instr.name);
                }
                Ok(())
            }
            NodeKind::Block { stmts } => {
                for s in stmts {
                    self.build_stmt(s, entries)?;
                }
                Ok(())
            }
            _ => {
                log::debug!(
                    "{}: {} statement not lowered",
                    self.instr.name,
                    stmt.kind_name()
                );
                Ok(())
            }
        }
    }

    fn build_assign(
        &self,
        target: &Node,
        expr: &Node,
        entries: &mut Vec<Pattern>,
    ) -> AnalysisResult<()> {
        match &target.kind {
            NodeKind::IndexedRef { base, index } => {
                match self.info.space(base).map(|s| s.kind) {
                    Some(SpaceKind::RegisterFile) => {
                        let leaf = self.register_leaf(index)?;
                        let Some(dest) = leaf.leaf_name() else {
                            return Err(AnalysisError::unsupported_pattern(
                                "register write without an operand destination",
                            ));
                        };
                        let dag = self.build_expr(expr)?;
                        entries.push(Pattern::new(dest, dag));
                        Ok(())
                    }
                    Some(SpaceKind::MainMemory) => {
                        let addr = self.build_addr(index)?;
                        let width = match &expr.kind {
                            NodeKind::TypeConv { width: Some(w), .. } => *w,
                            _ => expr.ty.map(|t| t.width).unwrap_or(self.xlen),
                        };
                        let mut value = self.build_expr(expr)?;
                        let name = if width >= self.xlen {
                            "store".to_string()
                        } else {
                            // The store op carries the truncation; drop the
                            // matching width marker from the value.
                            if let DagNode::Op { name, operands } = &value {
                                if *name == format!("i{width}") && operands.len() == 1 {
                                    value = operands[0].clone();
                                }
                            }
                            format!("truncstorei{width}")
                        };
                        let node = DagNode::op(name, vec![value, addr]);
                        entries.push(Pattern::new(format!("pat{}", entries.len()), node));
                        Ok(())
                    }
                    _ => Err(AnalysisError::unsupported_pattern(format!(
                        "write into {base}"
                    ))),
                }
            }
            NodeKind::NamedRef { name } => {
                if self.info.space(name).is_some_and(|s| s.is_pc()) {
                    // Unconditional control transfer.
                    let dag = self.build_expr(expr)?;
                    let node = DagNode::op("br", vec![dag]);
                    entries.push(Pattern::new(format!("pat{}", entries.len()), node));
                    return Ok(());
                }
                if self.info.is_register(name) {
                    let dag = self.build_expr(expr)?;
                    entries.push(Pattern::new(name.clone(), dag));
                    return Ok(());
                }
                Err(AnalysisError::unsupported_pattern(format!(
                    "assignment to {name}"
                )))
            }
            _ => Err(AnalysisError::unsupported_pattern(format!(
                "assignment target {}",
                target.kind_name()
            ))),
        }
    }

    /// Canonicalize `if (a <cmp> b) PC = PC + offset` into a compare-and-branch
    /// node. Returns `None` for conditionals of any other shape.
    fn build_branch(&self, conds: &[Node], bodies: &[Node]) -> AnalysisResult<Option<DagNode>> {
        let [cond] = conds else { return Ok(None) };
        let [body] = bodies else { return Ok(None) };
        let NodeKind::Binary { op, lhs, rhs } = &cond.kind else {
            return Ok(None);
        };
        if !op.is_boolean() || matches!(op, BinOp::LogicAnd | BinOp::LogicOr) {
            return Ok(None);
        }
        let stmt = match &body.kind {
            NodeKind::Block { stmts } => match stmts.as_slice() {
                [single] => single,
                _ => return Ok(None),
            },
            _ => body,
        };
        let NodeKind::Assignment { target, expr } = &stmt.kind else {
            return Ok(None);
        };
        let is_pc = |n: &Node| {
            n.as_named()
                .and_then(|name| self.info.space(name))
                .is_some_and(|s| s.is_pc())
        };
        if !is_pc(target) {
            return Ok(None);
        }
        // Peel a full-width slice or cast around the new PC value.
        let mut value = &**expr;
        loop {
            match &value.kind {
                NodeKind::TypeConv { expr, .. } => value = expr,
                NodeKind::Slice { expr, hi, lo } => {
                    let full = matches!((hi.as_literal(), lo.as_literal()), (Some(h), Some(0))
                        if expr.ty.is_some_and(|t| t.width == h as u32 + 1));
                    if !full {
                        return Ok(None);
                    }
                    value = expr;
                }
                _ => break,
            }
        }
        let NodeKind::Binary { op: BinOp::Add, lhs: a, rhs: b } = &value.kind else {
            return Ok(None);
        };
        let offset = if is_pc(a) {
            b
        } else if is_pc(b) {
            a
        } else {
            return Ok(None);
        };
        let signed = lhs.ty.map(|t| t.signed).unwrap_or(true);
        let code = cond_code(*op, signed)?;
        let l = self.build_expr(lhs)?;
        let r = self.build_expr(rhs)?;
        let off = self.build_expr(offset)?;
        Ok(Some(DagNode::op(
            "br_cc",
            vec![DagNode::CondCode(code.into()), l, r, off],
        )))
    }
}

/// Fuse a memory access with a separate write-back of its base register into a
/// pre/post-increment operation. The prefix follows statement order: a base
/// updated before the access pre-increments, a base updated afterwards
/// post-increments; an address that already folds the write-back offset in is
/// the pre-incremented address regardless of where the update sits.
fn rewrite_increments(entries: &mut Vec<Pattern>) {
    let update = entries.iter().enumerate().find_map(|(i, p)| {
        let DagNode::Op { name, operands } = &p.node else { return None };
        if (name != "add" && name != "sub") || operands.len() != 2 {
            return None;
        }
        let base = operands[0].leaf_name()?;
        if base != p.dest {
            return None;
        }
        Some((i, name == "sub", base.to_string(), operands[0].clone(), operands[1].clone()))
    });
    let Some((upd_idx, decrement, base, base_leaf, raw_offset)) = update else { return };
    // A decrementing write-back carries its offset negated.
    let offset = if decrement {
        match &raw_offset {
            DagNode::Imm(v) => DagNode::Imm(-v),
            other => DagNode::op("neg", vec![other.clone()]),
        }
    } else {
        raw_offset.clone()
    };

    enum Fuse {
        Store { mem_idx: usize, node: DagNode },
        Load { mem_idx: usize, dest: String, node: DagNode },
    }

    let mut fuse = None;
    for (mem_idx, pattern) in entries.iter().enumerate() {
        if mem_idx == upd_idx {
            continue;
        }
        let DagNode::Op { name, operands } = &pattern.node else { continue };
        let update_first = upd_idx < mem_idx;
        if name == "store" || name.starts_with("truncstore") {
            let [value, addr] = operands.as_slice() else { continue };
            let Some(prefix) = increment_kind(addr, &base, &raw_offset, update_first) else {
                continue;
            };
            let stem = match name.strip_prefix("truncstore") {
                Some(rest) => format!("truncst{rest}"),
                None => "st".to_string(),
            };
            let node = DagNode::op(
                format!("{prefix}{stem}"),
                vec![value.clone(), base_leaf.clone(), offset.clone()],
            );
            fuse = Some(Fuse::Store { mem_idx, node });
            break;
        }
        if name.contains("load") {
            let [addr] = operands.as_slice() else { continue };
            let Some(prefix) = increment_kind(addr, &base, &raw_offset, update_first) else {
                continue;
            };
            let node = DagNode::op(
                format!("{prefix}{name}"),
                vec![base_leaf.clone(), offset.clone()],
            );
            fuse = Some(Fuse::Load { mem_idx, dest: pattern.dest.clone(), node });
            break;
        }
    }
    match fuse {
        Some(Fuse::Store { mem_idx, node }) => {
            // The write-back entry becomes the fused store, keyed by the base.
            entries[upd_idx] = Pattern::new(base, node);
            entries.remove(mem_idx);
        }
        Some(Fuse::Load { mem_idx, dest, node }) => {
            entries[mem_idx] = Pattern::new(dest, node);
            entries.remove(upd_idx);
        }
        None => {}
    }
}

/// Pre-increment accesses see the updated address, post-increment the old one.
/// A bare-base address takes its meaning from statement order; an address that
/// folds the offset in is already the updated one.
fn increment_kind(
    addr: &DagNode,
    base: &str,
    offset: &DagNode,
    update_first: bool,
) -> Option<&'static str> {
    match addr {
        DagNode::Operand { name, .. } if name == base => {
            Some(if update_first { "pre_" } else { "post_" })
        }
        DagNode::Op { name, operands }
            if name == "AddrRegImm"
                && operands.len() == 2
                && operands[0].leaf_name() == Some(base)
                && operands[1] == *offset =>
        {
            Some("pre_")
        }
        _ => None,
    }
}

fn collect_complex(node: &DagNode, out: &mut Vec<String>) {
    if let DagNode::Op { name, operands } = node {
        if name.starts_with("Addr") && !out.contains(name) {
            out.push(name.clone());
        }
        for op in operands {
            collect_complex(op, out);
        }
    }
    if let DagNode::Assign { target, expr } = node {
        collect_complex(target, out);
        collect_complex(expr, out);
    }
}

/// The pattern DAG construction pass.
pub struct BuildDags;

impl Pass for BuildDags {
    fn name(&self) -> &'static str {
        PASS
    }

    fn run(&self, info: &SetInfo, instr: &mut Instruction) -> AnalysisResult<Outcome> {
        let cx = Ctx { info, instr, xlen: info.xlen() };
        let mut entries = Vec::new();
        cx.build_stmt(&instr.behavior, &mut entries)?;
        if entries.is_empty() {
            return Ok(Outcome::Skipped);
        }
        rewrite_increments(&mut entries);

        let mut complex = Vec::new();
        for p in &entries {
            collect_complex(&p.node, &mut complex);
        }
        complex.sort();

        let uses_pc = info
            .pc()
            .is_some_and(|pc| entries.iter().any(|p| p.node.references_leaf(&pc.name)));
        let is_branch = entries
            .iter()
            .any(|p| p.node.op_name().is_some_and(|n| n.starts_with("br")));

        for p in &entries {
            log::debug!("{}: pattern {p}", instr.name);
        }
        instr.attrs.set(Attr::Patterns(entries));
        if !complex.is_empty() {
            instr.attrs.set(Attr::ComplexPatterns(complex));
        }
        if uses_pc {
            instr.attrs.set(Attr::UsesPc);
        }
        if is_branch {
            instr.attrs.set(Attr::IsBranch);
        }
        Ok(Outcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        EncodingSegment, Instruction, IntType, OperandKind, RegisterClass, SetInfo, StateSpace,
    };

    fn info() -> SetInfo {
        let mut info = SetInfo::default();
        info.add_space(StateSpace::register_file("X", 32, 32));
        info.add_space(StateSpace::main_memory("MEM", 8));
        info.add_space(StateSpace::program_counter("PC", 32));
        info
    }

    fn gpr(instr: &mut Instruction, name: &str) {
        let op = instr.operand_mut(name).unwrap();
        op.kind = OperandKind::Register {
            class: RegisterClass::Gpr,
            file: "X".into(),
            offset: 0,
        };
        op.ty = Some(IntType::unsigned(32));
    }

    fn imm(instr: &mut Instruction, name: &str, ty: IntType) {
        let op = instr.operand_mut(name).unwrap();
        op.kind = OperandKind::Immediate;
        op.ty = Some(ty);
    }

    fn build(behavior: Node, setup: impl FnOnce(&mut Instruction)) -> Instruction {
        let mut i = Instruction::new(
            "T",
            "t",
            "",
            vec![
                EncodingSegment::field("imm", 12),
                EncodingSegment::field("rs2", 5),
                EncodingSegment::field("rs1", 5),
                EncodingSegment::field("rd", 5),
            ],
            behavior,
        );
        setup(&mut i);
        BuildDags.run(&info(), &mut i).unwrap();
        i
    }

    #[test]
    fn register_add_pattern() {
        let behavior = Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::binary(
                BinOp::Add,
                Node::indexed("X", Node::named("rs1")),
                Node::indexed("X", Node::named("rs2")),
            ),
        )]);
        let i = build(behavior, |i| {
            gpr(i, "rd");
            gpr(i, "rs1");
            gpr(i, "rs2");
        });
        let pats = i.attrs.patterns();
        assert_eq!(pats.len(), 1);
        assert_eq!(pats[0].to_string(), "rd <- (add GPR:$rs1, GPR:$rs2)");
        assert!(!i.attrs.is_branch());
        assert!(!i.attrs.uses_pc());
    }

    #[test]
    fn load_with_reg_imm_address() {
        // X[rd] = (signed<8>) MEM[X[rs1] + imm]
        let mut addr = Node::binary(
            BinOp::Add,
            Node::indexed("X", Node::named("rs1")),
            Node::named("imm"),
        );
        addr.ty = Some(IntType::unsigned(32));
        let behavior = Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::cast(true, Some(8), Node::indexed("MEM", addr)),
        )]);
        let i = build(behavior, |i| {
            gpr(i, "rd");
            gpr(i, "rs1");
            imm(i, "imm", IntType::signed(12));
        });
        let pats = i.attrs.patterns();
        assert_eq!(
            pats[0].to_string(),
            "rd <- (sextloadi8 (AddrRegImm GPR:$rs1, simm12:$imm))"
        );
        assert_eq!(i.attrs.complex_patterns(), ["AddrRegImm".to_string()]);
    }

    #[test]
    fn reg_reg_address_keeps_operand_order() {
        let addr = Node::binary(
            BinOp::Add,
            Node::indexed("X", Node::named("rs1")),
            Node::indexed("X", Node::named("rs2")),
        );
        let behavior = Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::indexed("MEM", addr),
        )]);
        let i = build(behavior, |i| {
            gpr(i, "rd");
            gpr(i, "rs1");
            gpr(i, "rs2");
        });
        assert_eq!(
            i.attrs.patterns()[0].to_string(),
            "rd <- (load (AddrRegReg GPR:$rs1, GPR:$rs2))"
        );
        assert_eq!(i.attrs.complex_patterns(), ["AddrRegReg".to_string()]);
    }

    #[test]
    fn literal_offset_swaps_to_register_first() {
        let addr = Node::binary(
            BinOp::Add,
            Node::literal(12),
            Node::indexed("X", Node::named("rs1")),
        );
        let behavior = Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::indexed("MEM", addr),
        )]);
        let i = build(behavior, |i| {
            gpr(i, "rd");
            gpr(i, "rs1");
        });
        assert_eq!(
            i.attrs.patterns()[0].to_string(),
            "rd <- (load (AddrRegImm GPR:$rs1, 12))"
        );
    }

    #[test]
    fn address_register_is_ordered_first() {
        // imm + X[rs1] swaps to register-first order.
        let addr = Node::binary(
            BinOp::Add,
            Node::named("imm"),
            Node::indexed("X", Node::named("rs1")),
        );
        let behavior = Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::indexed("MEM", addr),
        )]);
        let i = build(behavior, |i| {
            gpr(i, "rd");
            gpr(i, "rs1");
            imm(i, "imm", IntType::signed(12));
        });
        assert_eq!(
            i.attrs.patterns()[0].to_string(),
            "rd <- (load (AddrRegImm GPR:$rs1, simm12:$imm))"
        );
    }

    #[test]
    fn truncating_store() {
        // MEM[X[rs1]] = (unsigned<8>) X[rs2]
        let behavior = Node::block(vec![Node::assign(
            Node::indexed("MEM", Node::indexed("X", Node::named("rs1"))),
            Node::cast(false, Some(8), Node::indexed("X", Node::named("rs2"))),
        )]);
        let i = build(behavior, |i| {
            gpr(i, "rs1");
            gpr(i, "rs2");
        });
        assert_eq!(
            i.attrs.patterns()[0].to_string(),
            "pat0 <- (truncstorei8 GPR:$rs2, GPR:$rs1)"
        );
        assert!(!i.attrs.is_branch());
    }

    #[test]
    fn conditional_branch_is_canonicalized() {
        // if (X[rs1] != X[rs2]) PC = PC + imm
        let mut lhs = Node::indexed("X", Node::named("rs1"));
        lhs.ty = Some(IntType::unsigned(32));
        let behavior = Node::block(vec![Node::conditional(
            vec![Node::binary(BinOp::Ne, lhs, Node::indexed("X", Node::named("rs2")))],
            vec![Node::block(vec![Node::assign(
                Node::named("PC"),
                Node::binary(BinOp::Add, Node::named("PC"), Node::named("imm")),
            )])],
        )]);
        let i = build(behavior, |i| {
            gpr(i, "rs1");
            gpr(i, "rs2");
            imm(i, "imm", IntType::signed(12));
        });
        let pats = i.attrs.patterns();
        assert_eq!(pats.len(), 1);
        assert_eq!(
            pats[0].to_string(),
            "pat0 <- (br_cc SETNE, GPR:$rs1, GPR:$rs2, simm12:$imm)"
        );
        assert!(i.attrs.is_branch());
        // The raw PC assignment is gone from the patterns.
        assert!(!pats[0].node.references_leaf("PC"));
    }

    #[test]
    fn post_increment_store_is_fused() {
        // MEM[X[rs1]] = (unsigned<8>) X[rs2]; X[rs1] = X[rs1] + imm
        let behavior = Node::block(vec![
            Node::assign(
                Node::indexed("MEM", Node::indexed("X", Node::named("rs1"))),
                Node::cast(false, Some(8), Node::indexed("X", Node::named("rs2"))),
            ),
            Node::assign(
                Node::indexed("X", Node::named("rs1")),
                Node::binary(
                    BinOp::Add,
                    Node::indexed("X", Node::named("rs1")),
                    Node::named("imm"),
                ),
            ),
        ]);
        let i = build(behavior, |i| {
            gpr(i, "rs1");
            gpr(i, "rs2");
            imm(i, "imm", IntType::signed(12));
        });
        let pats = i.attrs.patterns();
        assert_eq!(pats.len(), 1);
        assert_eq!(
            pats[0].to_string(),
            "rs1 <- (post_truncsti8 GPR:$rs2, GPR:$rs1, simm12:$imm)"
        );
    }

    #[test]
    fn pre_increment_load_is_fused() {
        // X[rd] = MEM[X[rs1] + imm]; X[rs1] = X[rs1] + imm
        let behavior = Node::block(vec![
            Node::assign(
                Node::indexed("X", Node::named("rd")),
                Node::indexed(
                    "MEM",
                    Node::binary(
                        BinOp::Add,
                        Node::indexed("X", Node::named("rs1")),
                        Node::named("imm"),
                    ),
                ),
            ),
            Node::assign(
                Node::indexed("X", Node::named("rs1")),
                Node::binary(
                    BinOp::Add,
                    Node::indexed("X", Node::named("rs1")),
                    Node::named("imm"),
                ),
            ),
        ]);
        let i = build(behavior, |i| {
            gpr(i, "rd");
            gpr(i, "rs1");
            imm(i, "imm", IntType::signed(12));
        });
        let pats = i.attrs.patterns();
        assert_eq!(pats.len(), 1);
        assert_eq!(pats[0].dest, "rd");
        assert_eq!(
            pats[0].to_string(),
            "rd <- (pre_load GPR:$rs1, simm12:$imm)"
        );
    }

    #[test]
    fn update_before_store_is_pre_increment() {
        // X[rs1] = X[rs1] + imm; MEM[X[rs1]] = (unsigned<8>) X[rs2]: the base
        // moves first, so the access sees the updated address.
        let behavior = Node::block(vec![
            Node::assign(
                Node::indexed("X", Node::named("rs1")),
                Node::binary(
                    BinOp::Add,
                    Node::indexed("X", Node::named("rs1")),
                    Node::named("imm"),
                ),
            ),
            Node::assign(
                Node::indexed("MEM", Node::indexed("X", Node::named("rs1"))),
                Node::cast(false, Some(8), Node::indexed("X", Node::named("rs2"))),
            ),
        ]);
        let i = build(behavior, |i| {
            gpr(i, "rs1");
            gpr(i, "rs2");
            imm(i, "imm", IntType::signed(12));
        });
        let pats = i.attrs.patterns();
        assert_eq!(pats.len(), 1);
        assert_eq!(
            pats[0].to_string(),
            "rs1 <- (pre_truncsti8 GPR:$rs2, GPR:$rs1, simm12:$imm)"
        );
    }

    #[test]
    fn decrementing_writeback_negates_the_offset() {
        // MEM[X[rs1]] = (unsigned<8>) X[rs2]; X[rs1] = X[rs1] - 4
        let behavior = Node::block(vec![
            Node::assign(
                Node::indexed("MEM", Node::indexed("X", Node::named("rs1"))),
                Node::cast(false, Some(8), Node::indexed("X", Node::named("rs2"))),
            ),
            Node::assign(
                Node::indexed("X", Node::named("rs1")),
                Node::binary(
                    BinOp::Sub,
                    Node::indexed("X", Node::named("rs1")),
                    Node::literal(4),
                ),
            ),
        ]);
        let i = build(behavior, |i| {
            gpr(i, "rs1");
            gpr(i, "rs2");
        });
        let pats = i.attrs.patterns();
        assert_eq!(pats.len(), 1);
        assert_eq!(
            pats[0].to_string(),
            "rs1 <- (post_truncsti8 GPR:$rs2, GPR:$rs1, -4)"
        );
    }

    #[test]
    fn comparison_lowers_to_its_kind() {
        // X[rd] = X[rs1] < X[rs2] on unsigned registers.
        let mut lhs = Node::indexed("X", Node::named("rs1"));
        lhs.ty = Some(IntType::unsigned(32));
        let behavior = Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::binary(BinOp::Lt, lhs, Node::indexed("X", Node::named("rs2"))),
        )]);
        let i = build(behavior, |i| {
            gpr(i, "rd");
            gpr(i, "rs1");
            gpr(i, "rs2");
        });
        assert_eq!(
            i.attrs.patterns()[0].to_string(),
            "rd <- (setult GPR:$rs1, GPR:$rs2)"
        );
    }

    #[test]
    fn pc_read_sets_uses_pc_under_any_name() {
        let mut info = SetInfo::default();
        info.add_space(StateSpace::register_file("X", 32, 32));
        info.add_space(StateSpace::program_counter("IP", 32));
        // X[rd] = IP + imm
        let behavior = Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::binary(BinOp::Add, Node::named("IP"), Node::named("imm")),
        )]);
        let mut i = Instruction::new(
            "T",
            "t",
            "",
            vec![EncodingSegment::field("imm", 12), EncodingSegment::field("rd", 5)],
            behavior,
        );
        gpr(&mut i, "rd");
        imm(&mut i, "imm", IntType::signed(12));
        BuildDags.run(&info, &mut i).unwrap();
        assert!(i.attrs.uses_pc());
        assert_eq!(
            i.attrs.patterns()[0].to_string(),
            "rd <- (add pc:$IP, simm12:$imm)"
        );
        assert!(!i.attrs.is_branch());
    }

    #[test]
    fn division_is_rejected() {
        let behavior = Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::binary(
                BinOp::Div,
                Node::indexed("X", Node::named("rs1")),
                Node::indexed("X", Node::named("rs2")),
            ),
        )]);
        let mut i = Instruction::new(
            "T",
            "t",
            "",
            vec![
                EncodingSegment::field("rs2", 5),
                EncodingSegment::field("rs1", 5),
                EncodingSegment::field("rd", 5),
            ],
            behavior,
        );
        gpr(&mut i, "rd");
        gpr(&mut i, "rs1");
        gpr(&mut i, "rs2");
        let err = BuildDags.run(&info(), &mut i).unwrap_err();
        assert!(matches!(err, AnalysisError::PatternNotSupported { .. }));
    }

    #[test]
    fn empty_behavior_is_skipped() {
        let mut i = Instruction::new("T", "t", "", vec![], Node::block(vec![]));
        assert_eq!(BuildDags.run(&info(), &mut i).unwrap(), Outcome::Skipped);
    }
}
