//! End-to-end pipeline tests over a small RISC-V-flavored instruction set.

use patgen::behav::{BinOp, Node};
use patgen::model::{
    EncodingSegment, Instruction, InstructionSet, IntType, RegisterClass, Role, SetInfo,
    StateSpace,
};
use patgen::passes::{Pipeline, Policy};

fn rv32_info() -> SetInfo {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut info = SetInfo::default();
    info.add_space(StateSpace::register_file("X", 32, 32));
    info.add_space(StateSpace::main_memory("MEM", 8));
    info.add_space(StateSpace::program_counter("PC", 32));
    info
}

fn reg(name: &str) -> Node {
    Node::indexed("X", Node::named(name))
}

/// ADD: X[rd] = X[rs1] + X[rs2]
fn add_instr() -> Instruction {
    Instruction::new(
        "ADD",
        "add",
        "$rd, $rs1, $rs2",
        vec![
            EncodingSegment::fixed(0, 7),
            EncodingSegment::field("rs2", 5),
            EncodingSegment::field("rs1", 5),
            EncodingSegment::fixed(0, 3),
            EncodingSegment::field("rd", 5),
            EncodingSegment::fixed(0b0110011, 7),
        ],
        Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::binary(BinOp::Add, reg("rs1"), reg("rs2")),
        )]),
    )
}

/// LB: X[rd] = (signed<8>) MEM[X[rs1] + (signed) imm]
fn lb_instr() -> Instruction {
    Instruction::new(
        "LB",
        "lb",
        "$rd, $imm($rs1)",
        vec![
            EncodingSegment::field("imm", 12),
            EncodingSegment::field("rs1", 5),
            EncodingSegment::fixed(0, 3),
            EncodingSegment::field("rd", 5),
            EncodingSegment::fixed(0b0000011, 7),
        ],
        Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::cast(
                true,
                Some(8),
                Node::indexed(
                    "MEM",
                    Node::binary(BinOp::Add, reg("rs1"), Node::cast(true, None, Node::named("imm"))),
                ),
            ),
        )]),
    )
}

/// SB: MEM[X[rs1] + (signed) imm] = (unsigned<8>) X[rs2]
fn sb_instr() -> Instruction {
    Instruction::new(
        "SB",
        "sb",
        "$rs2, $imm($rs1)",
        vec![
            EncodingSegment::field("imm", 7),
            EncodingSegment::field("rs2", 5),
            EncodingSegment::field("rs1", 5),
            EncodingSegment::fixed(0, 3),
            EncodingSegment::field("imm", 5),
            EncodingSegment::fixed(0b0100011, 7),
        ],
        Node::block(vec![Node::assign(
            Node::indexed(
                "MEM",
                Node::binary(BinOp::Add, reg("rs1"), Node::cast(true, None, Node::named("imm"))),
            ),
            Node::cast(false, Some(8), reg("rs2")),
        )]),
    )
}

/// BNE: if (X[rs1] != X[rs2]) PC = PC + (signed) imm
fn bne_instr() -> Instruction {
    Instruction::new(
        "BNE",
        "bne",
        "$rs1, $rs2, $imm",
        vec![
            EncodingSegment::field("imm", 7),
            EncodingSegment::field("rs2", 5),
            EncodingSegment::field("rs1", 5),
            EncodingSegment::fixed(0b001, 3),
            EncodingSegment::field("imm", 5),
            EncodingSegment::fixed(0b1100011, 7),
        ],
        Node::block(vec![Node::conditional(
            vec![Node::binary(BinOp::Ne, reg("rs1"), reg("rs2"))],
            vec![Node::block(vec![Node::assign(
                Node::named("PC"),
                Node::binary(
                    BinOp::Add,
                    Node::named("PC"),
                    Node::cast(true, None, Node::named("imm")),
                ),
            )])],
        )]),
    )
}

fn set_of(instrs: Vec<Instruction>) -> InstructionSet {
    let mut set = InstructionSet::new("RV32Test", rv32_info());
    for i in instrs {
        set.push(i);
    }
    set
}

#[test]
fn register_arithmetic_end_to_end() {
    let mut set = set_of(vec![add_instr()]);
    let report = Pipeline::standard().run(&mut set).unwrap();
    assert!(report.is_clean());

    let add = set.instruction("ADD").unwrap();
    assert_eq!(add.operand("rd").unwrap().role, Role::Out);
    assert_eq!(add.operand("rs1").unwrap().role, Role::In);
    assert_eq!(add.operand("rs2").unwrap().role, Role::In);
    assert_eq!(add.operand("rd").unwrap().register_class(), Some(&RegisterClass::Gpr));
    assert!(!add.attrs.may_load());
    assert!(!add.attrs.may_store());
    assert!(!add.attrs.is_branch());

    // Unsigned 32-bit addition widens by one bit.
    match &add.behavior.kind {
        patgen::behav::NodeKind::Block { stmts } => match &stmts[0].kind {
            patgen::behav::NodeKind::Assignment { expr, .. } => {
                assert_eq!(expr.ty, Some(IntType::unsigned(33)));
            }
            other => panic!("unexpected node {other:?}"),
        },
        other => panic!("unexpected node {other:?}"),
    }

    let pats = add.attrs.patterns();
    assert_eq!(pats.len(), 1);
    assert_eq!(pats[0].to_string(), "rd <- (add GPR:$rs1, GPR:$rs2)");
    assert_eq!(add.attrs.outputs(), ["rd".to_string()]);
    assert_eq!(add.attrs.inputs(), ["rs1".to_string(), "rs2".to_string()]);
}

#[test]
fn load_end_to_end() {
    let mut set = set_of(vec![lb_instr()]);
    let report = Pipeline::standard().run(&mut set).unwrap();
    assert!(report.is_clean());

    let lb = set.instruction("LB").unwrap();
    assert!(lb.attrs.may_load());
    assert!(!lb.attrs.may_store());
    // The sign cast in the behavior upgraded the encoded immediate.
    assert_eq!(lb.operand("imm").unwrap().ty, Some(IntType::signed(12)));
    assert_eq!(
        lb.attrs.patterns()[0].to_string(),
        "rd <- (sextloadi8 (AddrRegImm GPR:$rs1, simm12:$imm))"
    );
    assert_eq!(lb.attrs.complex_patterns(), ["AddrRegImm".to_string()]);
}

#[test]
fn store_end_to_end() {
    let mut set = set_of(vec![sb_instr()]);
    let report = Pipeline::standard().run(&mut set).unwrap();
    assert!(report.is_clean());

    let sb = set.instruction("SB").unwrap();
    assert!(sb.attrs.may_store());
    assert!(!sb.attrs.may_load());
    // Scattered immediate fields merge into one 12-bit operand.
    assert_eq!(sb.operand("imm").unwrap().ty, Some(IntType::signed(12)));
    assert_eq!(
        sb.attrs.patterns()[0].to_string(),
        "pat0 <- (truncstorei8 GPR:$rs2, (AddrRegImm GPR:$rs1, simm12:$imm))"
    );
    assert!(sb.attrs.outputs().is_empty());
}

#[test]
fn branch_end_to_end() {
    let mut set = set_of(vec![bne_instr()]);
    let report = Pipeline::standard().run(&mut set).unwrap();
    assert!(report.is_clean());

    let bne = set.instruction("BNE").unwrap();
    assert!(bne.attrs.is_branch());
    let pats = bne.attrs.patterns();
    assert_eq!(pats.len(), 1);
    assert_eq!(
        pats[0].to_string(),
        "pat0 <- (br_cc SETNE, GPR:$rs1, GPR:$rs2, simm12:$imm)"
    );
    // The canonical branch absorbs the PC update entirely.
    assert!(!pats[0].node.references_leaf("PC"));
    assert!(!bne.attrs.uses_pc());
}

#[test]
fn scaled_immediate_becomes_a_leaf() {
    // X[rd] = X[rs1] + (imm << 1)
    let instr = Instruction::new(
        "ADDSH",
        "addsh",
        "$rd, $rs1, $imm",
        vec![
            EncodingSegment::field("imm", 12),
            EncodingSegment::field("rs1", 5),
            EncodingSegment::field("rd", 5),
        ],
        Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::binary(
                BinOp::Add,
                reg("rs1"),
                Node::binary(BinOp::Shl, Node::named("imm"), Node::literal(1)),
            ),
        )]),
    );
    let mut set = set_of(vec![instr]);
    Pipeline::standard().run(&mut set).unwrap();
    assert_eq!(
        set.instruction("ADDSH").unwrap().attrs.imm_leafs(),
        ["imm".to_string()]
    );
}

#[test]
fn compressed_equivalence_end_to_end() {
    // C.ADD: X[rd] = X[rd] + X[rs2], compressed form of ADD.
    let cadd = Instruction::new(
        "C.ADD",
        "c.add",
        "$rd, $rs2",
        vec![
            EncodingSegment::fixed(0b100, 3),
            EncodingSegment::fixed(1, 1),
            EncodingSegment::field("rd", 5),
            EncodingSegment::field("rs2", 5),
            EncodingSegment::fixed(0b10, 2),
        ],
        Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::binary(BinOp::Add, reg("rd"), reg("rs2")),
        )]),
    )
    .with_compressed_of("ADD");

    let mut set = set_of(vec![add_instr(), cadd]);
    let report = Pipeline::standard().run(&mut set).unwrap();
    assert!(report.is_clean());

    let cadd = set.instruction("C.ADD").unwrap();
    assert_eq!(cadd.operand("rd").unwrap().role, Role::InOut);
    assert_eq!(
        cadd.attrs.equivalence(),
        Some("ADD $rd, $rd, $rs2 <-> C.ADD $rd, $rs2")
    );
    // The uncompressed counterpart carries no equivalence itself.
    assert!(set.instruction("ADD").unwrap().attrs.equivalence().is_none());
}

#[test]
fn pipeline_is_idempotent() {
    let mut set = set_of(vec![add_instr(), lb_instr(), sb_instr(), bne_instr()]);
    let pipeline = Pipeline::standard();
    pipeline.run(&mut set).unwrap();
    let first: Vec<Vec<String>> = set
        .instructions
        .iter()
        .map(|i| i.attrs.patterns().iter().map(|p| p.to_string()).collect())
        .collect();

    let report = pipeline.run(&mut set).unwrap();
    assert!(report.is_clean());
    let second: Vec<Vec<String>> = set
        .instructions
        .iter()
        .map(|i| i.attrs.patterns().iter().map(|p| p.to_string()).collect())
        .collect();
    assert_eq!(first, second);
}

#[test]
fn failing_instruction_does_not_poison_the_set() {
    // DIV has no canonical selection node and fails the DAG builder.
    let div = Instruction::new(
        "DIV",
        "div",
        "$rd, $rs1, $rs2",
        vec![
            EncodingSegment::field("rs2", 5),
            EncodingSegment::field("rs1", 5),
            EncodingSegment::field("rd", 5),
        ],
        Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::binary(BinOp::Div, reg("rs1"), reg("rs2")),
        )]),
    );
    let mut set = set_of(vec![add_instr(), div]);
    let report = Pipeline::standard().run(&mut set).unwrap();
    assert!(!report.is_clean());
    assert_eq!(
        report.pass("build_dags").unwrap().failed_instructions,
        ["DIV".to_string()]
    );
    // The sibling instruction still got its pattern.
    assert_eq!(set.instruction("ADD").unwrap().attrs.patterns().len(), 1);
    assert!(set.instruction("DIV").unwrap().attrs.patterns().is_empty());
}

#[test]
fn strict_policy_aborts_on_failure() {
    let div = Instruction::new(
        "DIV",
        "div",
        "$rd, $rs1, $rs2",
        vec![
            EncodingSegment::field("rs2", 5),
            EncodingSegment::field("rs1", 5),
            EncodingSegment::field("rd", 5),
        ],
        Node::block(vec![Node::assign(
            Node::indexed("X", Node::named("rd")),
            Node::binary(BinOp::Div, reg("rs1"), reg("rs2")),
        )]),
    );
    let mut set = set_of(vec![div]);
    let err = Pipeline::standard()
        .with_policy(Policy::Strict)
        .run(&mut set)
        .unwrap_err();
    assert_eq!(err.pass, "build_dags");
    assert_eq!(err.failed, 1);
}

#[test]
fn worker_pool_produces_the_same_results() {
    let mut seq = set_of(vec![add_instr(), lb_instr(), sb_instr(), bne_instr()]);
    let mut par = set_of(vec![add_instr(), lb_instr(), sb_instr(), bne_instr()]);
    Pipeline::standard().run(&mut seq).unwrap();
    Pipeline::standard().with_workers(4).run(&mut par).unwrap();
    for (a, b) in seq.instructions.iter().zip(&par.instructions) {
        let pa: Vec<String> = a.attrs.patterns().iter().map(|p| p.to_string()).collect();
        let pb: Vec<String> = b.attrs.patterns().iter().map(|p| p.to_string()).collect();
        assert_eq!(pa, pb, "{}", a.name);
    }
}
