// This module defines the instruction model that the whole analysis pipeline operates
// on: InstructionSet (name, resolution environment, owned instructions), Instruction
// (mnemonic, assembly syntax, encoding, behavior tree, operands, attributes), Operand
// (kind, resolved type, role, register class) and the architectural state description
// (register files, main memory, program counter). Attributes are a tagged-variant map:
// the key is an enum and the payload type is statically known per key, so attribute
// reads never need runtime type checks. Instructions and operands are created once,
// by the frontend or by register-class detection, and only mutated in place by later
// passes; nothing is deleted during the pipeline. The model enforces the encoding
// invariant at construction time: every named bit-field segment maps to exactly one
// operand, with multi-segment fields merged by summing their widths.

//! Instruction set model shared by all analysis passes.

use crate::behav::Node;
use crate::dag::Pattern;
use crate::error::{AnalysisError, AnalysisResult};
use hashbrown::HashMap;
use std::fmt;

/// An integer type: bit width plus signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntType {
    pub width: u32,
    pub signed: bool,
}

impl IntType {
    pub fn unsigned(width: u32) -> Self {
        IntType { width, signed: false }
    }

    pub fn signed(width: u32) -> Self {
        IntType { width, signed: true }
    }

    /// The 1-bit unsigned type produced by comparisons and logical operators.
    pub fn boolean() -> Self {
        IntType::unsigned(1)
    }

    /// Smallest type able to hold `value` (signed types for negative values).
    pub fn minimal_for(value: i128) -> Self {
        if value < 0 {
            let bits = 128 - value.wrapping_neg().leading_zeros() + 1;
            IntType::signed(bits.max(1))
        } else {
            let bits = 128 - value.leading_zeros();
            IntType::unsigned(bits.max(1))
        }
    }
}

impl fmt::Display for IntType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.signed { 's' } else { 'u' }, self.width)
    }
}

/// What a piece of architectural state is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    RegisterFile,
    MainMemory,
    ProgramCounter,
}

/// A named piece of architectural state an instruction may reference.
///
/// Register files carry an element count; main memory and the program counter
/// do not. `width` is the element width in bits.
#[derive(Debug, Clone)]
pub struct StateSpace {
    pub name: String,
    pub kind: SpaceKind,
    pub width: u32,
    pub count: Option<u64>,
}

impl StateSpace {
    pub fn register_file(name: impl Into<String>, width: u32, count: u64) -> Self {
        StateSpace { name: name.into(), kind: SpaceKind::RegisterFile, width, count: Some(count) }
    }

    pub fn main_memory(name: impl Into<String>, width: u32) -> Self {
        StateSpace { name: name.into(), kind: SpaceKind::MainMemory, width, count: None }
    }

    pub fn program_counter(name: impl Into<String>, width: u32) -> Self {
        StateSpace { name: name.into(), kind: SpaceKind::ProgramCounter, width, count: None }
    }

    pub fn is_main_mem(&self) -> bool {
        self.kind == SpaceKind::MainMemory
    }

    pub fn is_pc(&self) -> bool {
        self.kind == SpaceKind::ProgramCounter
    }
}

/// Register class an operand may belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterClass {
    /// General-purpose registers.
    Gpr,
    /// Restricted general-purpose subset selected by a nonzero element offset.
    GprC,
    /// Floating-point registers.
    Fpr,
    /// Control/status registers.
    Csr,
    /// A custom register file, identified by its backing space name.
    Custom(String),
}

impl fmt::Display for RegisterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterClass::Gpr => write!(f, "GPR"),
            RegisterClass::GprC => write!(f, "GPRC"),
            RegisterClass::Fpr => write!(f, "FPR"),
            RegisterClass::Csr => write!(f, "CSR"),
            RegisterClass::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// A register declaration detected from a state space.
#[derive(Debug, Clone)]
pub struct Register {
    pub name: String,
    pub class: RegisterClass,
    pub width: u32,
}

/// Resolution environment of an instruction set: state spaces, named
/// constants and detected register declarations.
#[derive(Debug, Default, Clone)]
pub struct SetInfo {
    pub spaces: HashMap<String, StateSpace>,
    pub constants: HashMap<String, i128>,
    pub registers: HashMap<String, Register>,
}

impl SetInfo {
    pub fn space(&self, name: &str) -> Option<&StateSpace> {
        self.spaces.get(name)
    }

    pub fn add_space(&mut self, space: StateSpace) {
        self.spaces.insert(space.name.clone(), space);
    }

    pub fn is_register(&self, name: &str) -> bool {
        self.registers.contains_key(name)
    }

    /// The program counter space, if the set declares one. The space carries
    /// whatever name the description chose for it.
    pub fn pc(&self) -> Option<&StateSpace> {
        self.spaces.values().find(|s| s.is_pc())
    }

    /// Base integer width of the set, taken from the program counter.
    ///
    /// Used by the DAG builder to distinguish full-width from truncating and
    /// extending memory accesses.
    pub fn xlen(&self) -> u32 {
        self.pc().map(|s| s.width).unwrap_or(32)
    }
}

/// One segment of an instruction encoding, most significant first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingSegment {
    /// Fixed opcode/funct bits.
    Fixed { bits: u64, width: u32 },
    /// A named operand bit field.
    Field { name: String, width: u32, signed: bool },
}

impl EncodingSegment {
    pub fn fixed(bits: u64, width: u32) -> Self {
        EncodingSegment::Fixed { bits, width }
    }

    pub fn field(name: impl Into<String>, width: u32) -> Self {
        EncodingSegment::Field { name: name.into(), width, signed: false }
    }

    pub fn signed_field(name: impl Into<String>, width: u32) -> Self {
        EncodingSegment::Field { name: name.into(), width, signed: true }
    }
}

/// Data-flow direction of an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unassigned,
    In,
    Out,
    InOut,
}

impl Role {
    pub fn is_input(self) -> bool {
        matches!(self, Role::In | Role::InOut)
    }

    pub fn is_output(self) -> bool {
        matches!(self, Role::Out | Role::InOut)
    }
}

/// Classification of an operand. Kinds are mutually exclusive: an operand is
/// never simultaneously a register and an immediate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandKind {
    Unclassified,
    Immediate,
    Register {
        class: RegisterClass,
        /// Backing register file name.
        file: String,
        /// Element offset into the file; nonzero offsets select a sub-class.
        offset: i128,
    },
}

/// A named, encoded sub-field of an instruction.
#[derive(Debug, Clone)]
pub struct Operand {
    pub name: String,
    pub kind: OperandKind,
    /// Resolved type. Starts at the encoded field type, updated by register
    /// and immediate detection.
    pub ty: Option<IntType>,
    /// Set once an explicit cast fixed the type; later conflicting casts fail.
    pub explicit_ty: bool,
    pub role: Role,
}

impl Operand {
    fn from_field(name: String, width: u32, signed: bool) -> Self {
        Operand {
            name,
            kind: OperandKind::Unclassified,
            ty: Some(IntType { width, signed }),
            explicit_ty: false,
            role: Role::Unassigned,
        }
    }

    pub fn is_immediate(&self) -> bool {
        self.kind == OperandKind::Immediate
    }

    pub fn is_register(&self) -> bool {
        matches!(self.kind, OperandKind::Register { .. })
    }

    pub fn register_class(&self) -> Option<&RegisterClass> {
        match &self.kind {
            OperandKind::Register { class, .. } => Some(class),
            _ => None,
        }
    }
}

/// Attribute keys. Every key has exactly one payload shape, see [`Attr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKey {
    MayLoad,
    MayStore,
    UsesPc,
    IsBranch,
    ImplicitUses,
    ImplicitDefs,
    ImmLeafs,
    Patterns,
    ComplexPatterns,
    Inputs,
    Outputs,
    Equivalence,
}

/// Tagged attribute payloads attached to an instruction by the passes.
#[derive(Debug, Clone, PartialEq)]
pub enum Attr {
    MayLoad,
    MayStore,
    UsesPc,
    IsBranch,
    /// Architectural registers read without being declared operands.
    ImplicitUses(Vec<String>),
    /// Architectural registers written without being declared operands.
    ImplicitDefs(Vec<String>),
    /// Immediate operands usable as standalone pattern leaves.
    ImmLeafs(Vec<String>),
    /// Canonical selection patterns produced by the DAG builder.
    Patterns(Vec<Pattern>),
    /// Addressing-mode pattern names required by the patterns.
    ComplexPatterns(Vec<String>),
    /// Operand names in assembly order carrying an input role.
    Inputs(Vec<String>),
    /// Operand names in assembly order carrying an output role.
    Outputs(Vec<String>),
    /// Literal equivalence pattern pairing a compressed instruction with its
    /// uncompressed counterpart.
    Equivalence(String),
}

impl Attr {
    pub fn key(&self) -> AttrKey {
        match self {
            Attr::MayLoad => AttrKey::MayLoad,
            Attr::MayStore => AttrKey::MayStore,
            Attr::UsesPc => AttrKey::UsesPc,
            Attr::IsBranch => AttrKey::IsBranch,
            Attr::ImplicitUses(_) => AttrKey::ImplicitUses,
            Attr::ImplicitDefs(_) => AttrKey::ImplicitDefs,
            Attr::ImmLeafs(_) => AttrKey::ImmLeafs,
            Attr::Patterns(_) => AttrKey::Patterns,
            Attr::ComplexPatterns(_) => AttrKey::ComplexPatterns,
            Attr::Inputs(_) => AttrKey::Inputs,
            Attr::Outputs(_) => AttrKey::Outputs,
            Attr::Equivalence(_) => AttrKey::Equivalence,
        }
    }
}

/// Attribute map keyed by [`AttrKey`]. Setting a key twice replaces the
/// previous payload, which keeps repeated pass runs idempotent.
#[derive(Debug, Default, Clone)]
pub struct AttrMap {
    entries: HashMap<AttrKey, Attr>,
}

impl AttrMap {
    pub fn set(&mut self, attr: Attr) {
        self.entries.insert(attr.key(), attr);
    }

    pub fn contains(&self, key: AttrKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn get(&self, key: AttrKey) -> Option<&Attr> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn may_load(&self) -> bool {
        self.contains(AttrKey::MayLoad)
    }

    pub fn may_store(&self) -> bool {
        self.contains(AttrKey::MayStore)
    }

    pub fn uses_pc(&self) -> bool {
        self.contains(AttrKey::UsesPc)
    }

    pub fn is_branch(&self) -> bool {
        self.contains(AttrKey::IsBranch)
    }

    pub fn implicit_uses(&self) -> &[String] {
        match self.get(AttrKey::ImplicitUses) {
            Some(Attr::ImplicitUses(names)) => names,
            _ => &[],
        }
    }

    pub fn implicit_defs(&self) -> &[String] {
        match self.get(AttrKey::ImplicitDefs) {
            Some(Attr::ImplicitDefs(names)) => names,
            _ => &[],
        }
    }

    pub fn imm_leafs(&self) -> &[String] {
        match self.get(AttrKey::ImmLeafs) {
            Some(Attr::ImmLeafs(names)) => names,
            _ => &[],
        }
    }

    pub fn patterns(&self) -> &[Pattern] {
        match self.get(AttrKey::Patterns) {
            Some(Attr::Patterns(pats)) => pats,
            _ => &[],
        }
    }

    pub fn complex_patterns(&self) -> &[String] {
        match self.get(AttrKey::ComplexPatterns) {
            Some(Attr::ComplexPatterns(names)) => names,
            _ => &[],
        }
    }

    pub fn inputs(&self) -> &[String] {
        match self.get(AttrKey::Inputs) {
            Some(Attr::Inputs(names)) => names,
            _ => &[],
        }
    }

    pub fn outputs(&self) -> &[String] {
        match self.get(AttrKey::Outputs) {
            Some(Attr::Outputs(names)) => names,
            _ => &[],
        }
    }

    pub fn equivalence(&self) -> Option<&str> {
        match self.get(AttrKey::Equivalence) {
            Some(Attr::Equivalence(s)) => Some(s),
            _ => None,
        }
    }
}

/// A single instruction: encoding, behavior and everything the passes learn
/// about it.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub name: String,
    pub mnemonic: String,
    /// Human-readable operand syntax with `$name` placeholders.
    pub asm_syntax: String,
    pub encoding: Vec<EncodingSegment>,
    pub behavior: Node,
    /// Operands in encoding order (first appearance, most significant first).
    pub operands: Vec<Operand>,
    /// Behavior-local scalar declarations.
    pub scalars: HashMap<String, IntType>,
    pub attrs: AttrMap,
    /// Name of the uncompressed counterpart for compressed variants.
    pub compressed_of: Option<String>,
}

impl Instruction {
    /// Build an instruction, deriving operands from the named encoding fields.
    ///
    /// Multi-segment fields (scattered immediates) merge into a single operand
    /// whose width is the sum of the segment widths. A field name that would
    /// produce two distinct operands is impossible by construction, which is
    /// exactly the invariant the rest of the pipeline relies on.
    pub fn new(
        name: impl Into<String>,
        mnemonic: impl Into<String>,
        asm_syntax: impl Into<String>,
        encoding: Vec<EncodingSegment>,
        behavior: Node,
    ) -> Self {
        let mut operands: Vec<Operand> = Vec::new();
        for seg in &encoding {
            if let EncodingSegment::Field { name, width, signed } = seg {
                match operands.iter_mut().find(|op| &op.name == name) {
                    Some(op) => {
                        if let Some(ty) = &mut op.ty {
                            ty.width += width;
                            ty.signed |= signed;
                        }
                    }
                    None => operands.push(Operand::from_field(name.clone(), *width, *signed)),
                }
            }
        }
        Instruction {
            name: name.into(),
            mnemonic: mnemonic.into(),
            asm_syntax: asm_syntax.into(),
            encoding,
            behavior,
            operands,
            scalars: HashMap::new(),
            attrs: AttrMap::default(),
            compressed_of: None,
        }
    }

    pub fn with_scalar(mut self, name: impl Into<String>, ty: IntType) -> Self {
        self.scalars.insert(name.into(), ty);
        self
    }

    pub fn with_compressed_of(mut self, counterpart: impl Into<String>) -> Self {
        self.compressed_of = Some(counterpart.into());
        self
    }

    pub fn operand(&self, name: &str) -> Option<&Operand> {
        self.operands.iter().find(|op| op.name == name)
    }

    pub fn operand_mut(&mut self, name: &str) -> Option<&mut Operand> {
        self.operands.iter_mut().find(|op| op.name == name)
    }

    /// Total encoded width in bits.
    pub fn size(&self) -> u32 {
        self.encoding
            .iter()
            .map(|seg| match seg {
                EncodingSegment::Fixed { width, .. } => *width,
                EncodingSegment::Field { width, .. } => *width,
            })
            .sum()
    }
}

/// An instruction set handed in by the frontend. Owns all instructions.
#[derive(Debug, Default, Clone)]
pub struct InstructionSet {
    pub name: String,
    pub info: SetInfo,
    pub instructions: Vec<Instruction>,
}

impl InstructionSet {
    pub fn new(name: impl Into<String>, info: SetInfo) -> Self {
        InstructionSet { name: name.into(), info, instructions: Vec::new() }
    }

    pub fn push(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    pub fn instruction(&self, name: &str) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.name == name)
    }

    pub fn instruction_mut(&mut self, name: &str) -> Option<&mut Instruction> {
        self.instructions.iter_mut().find(|i| i.name == name)
    }

    /// Split borrow: the resolution environment stays shared while the
    /// instruction list is handed out for mutation. This is what lets a pass
    /// process instructions independently (and in parallel) while resolving
    /// names against the set.
    pub fn split_mut(&mut self) -> (&SetInfo, &mut [Instruction]) {
        (&self.info, &mut self.instructions)
    }
}

/// What a bare name inside a behavior tree resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// An encoded operand field of the current instruction.
    Field,
    /// A behavior-local scalar.
    Scalar,
    /// A named constant of the set.
    Constant,
    /// A state space referenced by name (the program counter, usually).
    Space,
    /// A detected register declaration.
    Register,
}

/// Resolve a bare name against instruction-local then set-level scopes.
pub fn resolve_name(info: &SetInfo, instr: &Instruction, name: &str) -> AnalysisResult<RefKind> {
    if instr.operand(name).is_some() {
        return Ok(RefKind::Field);
    }
    if instr.scalars.contains_key(name) {
        return Ok(RefKind::Scalar);
    }
    if info.constants.contains_key(name) {
        return Ok(RefKind::Constant);
    }
    if info.spaces.contains_key(name) {
        return Ok(RefKind::Space);
    }
    if info.registers.contains_key(name) {
        return Ok(RefKind::Register);
    }
    Err(AnalysisError::UnknownReference { name: name.to_string() })
}
