// This module defines the intermediate representation that sits between AST lowering and
// binary emission. Registers live in an arena owned by the RegisterFile and are referenced
// everywhere else through copyable RegId handles, so the same register can appear in any
// number of instruction operands while the allocator keeps the authoritative allocation
// state. Instructions carry an opcode, up to three register operands, an optional immediate
// and an optional label (LABEL pseudo-instructions and branch/call targets). Basic blocks own
// their instructions and record successor/predecessor edges by index; functions own their
// blocks plus parameter registers, an optional return register and a stack-size counter.

//! IR data structures: registers, instructions, basic blocks and functions.

use super::register_file::RegisterFile;
use std::fmt::Write as _;

/// Handle to a register record in the [`RegisterFile`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegId(pub(crate) u32);

impl RegId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Register bank a register belongs to (or, for a virtual register, wants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    General,
    Float,
}

impl RegClass {
    pub(crate) fn bank(self) -> usize {
        match self {
            RegClass::General => 0,
            RegClass::Float => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    General,
    Float,
    /// Minted once the physical pool of the requested class ran dry.
    Virtual,
}

#[derive(Debug, Clone)]
pub struct Register {
    pub id: u32,
    pub kind: RegisterKind,
    pub class: RegClass,
    /// True iff the register is in the allocator's active set.
    pub allocated: bool,
    /// Display name: `r<N>`, `xmm<N>` or `v<N>`.
    pub name: String,
    /// Source-level name currently bound to this register, if any.
    pub binding_name: Option<String>,
    /// Physical register a virtual register was bound to by the allocation pass.
    pub bound_to: Option<RegId>,
    /// Register number within its bank, as placed into instruction encodings.
    pub(crate) hw_index: u8,
}

impl Register {
    pub fn is_virtual(&self) -> bool {
        self.kind == RegisterKind::Virtual
    }

    pub fn hw_index(&self) -> u8 {
        self.hw_index
    }
}

/// IR opcodes. Discriminants are the numbers written to the placeholder object file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Mov = 0,
    Load,
    Store,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    And,
    Or,
    Xor,
    Not,
    Cmp,
    Fcmp,
    Jmp,
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
    Call,
    Ret,
    Push,
    Pop,
    Nop,
    Label = 30,
}

impl Opcode {
    pub const ALL: [Opcode; 31] = [
        Opcode::Mov,
        Opcode::Load,
        Opcode::Store,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Fadd,
        Opcode::Fsub,
        Opcode::Fmul,
        Opcode::Fdiv,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Not,
        Opcode::Cmp,
        Opcode::Fcmp,
        Opcode::Jmp,
        Opcode::Je,
        Opcode::Jne,
        Opcode::Jl,
        Opcode::Jle,
        Opcode::Jg,
        Opcode::Jge,
        Opcode::Call,
        Opcode::Ret,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Nop,
        Opcode::Label,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Mov => "mov",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Fadd => "fadd",
            Opcode::Fsub => "fsub",
            Opcode::Fmul => "fmul",
            Opcode::Fdiv => "fdiv",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Not => "not",
            Opcode::Cmp => "cmp",
            Opcode::Fcmp => "fcmp",
            Opcode::Jmp => "jmp",
            Opcode::Je => "je",
            Opcode::Jne => "jne",
            Opcode::Jl => "jl",
            Opcode::Jle => "jle",
            Opcode::Jg => "jg",
            Opcode::Jge => "jge",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Nop => "nop",
            Opcode::Label => "label",
        }
    }

    pub fn number(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    /// Destination first, then sources. At most three entries.
    pub operands: Vec<RegId>,
    pub immediate: Option<i64>,
    /// Label name for LABEL, or the branch/call target symbol.
    pub label: Option<String>,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            operands: Vec::new(),
            immediate: None,
            label: None,
        }
    }

    pub fn with_operands(opcode: Opcode, operands: &[RegId]) -> Self {
        debug_assert!(operands.len() <= 3);
        Self {
            operands: operands.to_vec(),
            ..Self::new(opcode)
        }
    }

    pub fn with_immediate(opcode: Opcode, dest: RegId, immediate: i64) -> Self {
        Self {
            operands: vec![dest],
            immediate: Some(immediate),
            ..Self::new(opcode)
        }
    }

    pub fn with_target(opcode: Opcode, target: impl Into<String>) -> Self {
        Self {
            label: Some(target.into()),
            ..Self::new(opcode)
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self::with_target(Opcode::Label, name)
    }

    pub fn is_label(&self) -> bool {
        self.opcode == Opcode::Label
    }

    pub fn has_immediate(&self) -> bool {
        self.immediate.is_some()
    }

    /// Render as one assembly line (without indentation).
    ///
    /// LABEL renders as `name:`; branches and direct calls as
    /// `mnemonic target`; everything else as `mnemonic dest[, src...][, #imm]`.
    pub fn render(&self, regs: &RegisterFile) -> String {
        if self.is_label() {
            return format!("{}:", self.label.as_deref().unwrap_or_default());
        }

        let mut line = String::from(self.opcode.mnemonic());
        if let Some(target) = &self.label {
            let _ = write!(line, " {target}");
            return line;
        }

        for (i, reg) in self.operands.iter().enumerate() {
            line.push_str(if i == 0 { " " } else { ", " });
            line.push_str(&regs.get(*reg).name);
        }
        if let Some(imm) = self.immediate {
            line.push_str(if self.operands.is_empty() { " " } else { ", " });
            let _ = write!(line, "#{imm}");
        }
        line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub usize);

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    /// Control-flow links. Lowering keeps a function in its entry block and
    /// branches to label pseudo-instructions, so these stay empty today.
    pub successors: Vec<BlockId>,
    pub predecessors: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub blocks: Vec<BasicBlock>,
    pub parameters: Vec<RegId>,
    pub return_register: Option<RegId>,
    /// Peak bytes of pushed values outstanding at once.
    pub stack_size: u32,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            parameters: Vec::new(),
            return_register: None,
            stack_size: 0,
        }
    }

    pub fn create_block(&mut self, label: impl Into<String>) -> BlockId {
        self.blocks.push(BasicBlock::new(label));
        BlockId(self.blocks.len() - 1)
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    /// All instructions in block order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|block| block.instructions.iter())
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|block| block.instructions.len()).sum()
    }

    /// Last instruction of the final block.
    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.blocks.last().and_then(|block| block.instructions.last())
    }
}
