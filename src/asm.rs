//! AArch64 instruction model and its textual printer.
//!
//! Code generation produces a flat list of [`Instruction`] values rather
//! than text so later passes can pattern-match on structure. Printing is a
//! pure function of an instruction and the [`Target`]; the only rewrite it
//! performs is spelling the entry function the way the platform expects.

use std::fmt::Write as _;

use crate::config::Target;

/// Name of the entry function in source programs.
pub const ENTRY_POINT: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
  X0,
  X1,
  X2,
  X3,
  X4,
  X5,
  X6,
  X7,
  X8,
  X9,
  /// Frame pointer, x29.
  Fp,
  /// Link register, x30.
  Lr,
  Sp,
  Xzr,
}

impl Register {
  /// Integer argument registers in calling-convention order.
  pub const ARGUMENTS: [Register; 8] = [
    Register::X0,
    Register::X1,
    Register::X2,
    Register::X3,
    Register::X4,
    Register::X5,
    Register::X6,
    Register::X7,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Register::X0 => "x0",
      Register::X1 => "x1",
      Register::X2 => "x2",
      Register::X3 => "x3",
      Register::X4 => "x4",
      Register::X5 => "x5",
      Register::X6 => "x6",
      Register::X7 => "x7",
      Register::X8 => "x8",
      Register::X9 => "x9",
      Register::Fp => "x29",
      Register::Lr => "x30",
      Register::Sp => "sp",
      Register::Xzr => "xzr",
    }
  }

  /// 32-bit view, used by byte loads and stores.
  pub fn word_name(self) -> &'static str {
    match self {
      Register::X0 => "w0",
      Register::X1 => "w1",
      Register::X2 => "w2",
      Register::X3 => "w3",
      Register::X4 => "w4",
      Register::X5 => "w5",
      Register::X6 => "w6",
      Register::X7 => "w7",
      Register::X8 => "w8",
      Register::X9 => "w9",
      Register::Fp => "w29",
      Register::Lr => "w30",
      Register::Sp => "wsp",
      Register::Xzr => "wzr",
    }
  }
}

/// Access width of a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
  Byte,
  Quad,
}

impl Width {
  pub fn of_size(size: usize) -> Self {
    if size == 1 { Width::Byte } else { Width::Quad }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
  Reg(Register),
  Imm(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

impl Condition {
  pub fn mnemonic(self) -> &'static str {
    match self {
      Condition::Eq => "eq",
      Condition::Ne => "ne",
      Condition::Lt => "lt",
      Condition::Le => "le",
      Condition::Gt => "gt",
      Condition::Ge => "ge",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
  /// `[base]`
  Base(Register),
  /// `[base, #offset]`
  Offset(Register, i64),
  /// `[base, #offset]!`, base updated before the access.
  PreIndex(Register, i64),
  /// `[base], #offset`, base updated after the access.
  PostIndex(Register, i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKind {
  Begin,
  Else,
  End,
}

impl LocalKind {
  fn name(self) -> &'static str {
    match self {
      LocalKind::Begin => "begin",
      LocalKind::Else => "else",
      LocalKind::End => "end",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
  /// A function or global variable.
  Symbol(String),
  /// A control-flow target private to the unit.
  Local(LocalKind, usize),
  /// A pooled string literal.
  Strings(usize),
}

impl Label {
  pub fn symbol(name: impl Into<String>) -> Self {
    Label::Symbol(name.into())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
  Data,
  Strings,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
  Mov {
    dst: Register,
    src: Register,
  },
  MovImm {
    dst: Register,
    value: i64,
  },
  Add {
    dst: Register,
    lhs: Register,
    rhs: Operand,
  },
  Sub {
    dst: Register,
    lhs: Register,
    rhs: Operand,
  },
  Mul {
    dst: Register,
    lhs: Register,
    rhs: Register,
  },
  SDiv {
    dst: Register,
    lhs: Register,
    rhs: Register,
  },
  Neg {
    dst: Register,
    src: Register,
  },
  Cmp {
    lhs: Register,
    rhs: Operand,
  },
  CSet {
    dst: Register,
    condition: Condition,
  },
  Load {
    dst: Register,
    address: Address,
    width: Width,
  },
  Store {
    src: Register,
    address: Address,
    width: Width,
  },
  LoadPair {
    first: Register,
    second: Register,
    address: Address,
  },
  StorePair {
    first: Register,
    second: Register,
    address: Address,
  },
  /// One 16-byte stack slot: `str reg, [sp, #-16]!`.
  Push(Register),
  /// `ldr reg, [sp], #16`.
  Pop(Register),
  /// `adrp` of the page holding `label`.
  AddressPage {
    dst: Register,
    label: Label,
  },
  /// Adds the low 12 bits of `label`'s address.
  AddPageOffset {
    dst: Register,
    src: Register,
    label: Label,
  },
  Branch(Label),
  BranchLink(Label),
  BranchIf {
    condition: Condition,
    label: Label,
  },
  Ret,
  Label(Label),
  /// `.p2align n`
  Align(u32),
  Section(Section),
  Globl(Vec<Label>),
  Quad(i64),
  /// `.quad label+offset`
  QuadAddress {
    label: Label,
    offset: i64,
  },
  Byte(u8),
  /// `size` zero bytes.
  Zero(usize),
  Asciz(String),
  /// Zero-initialised common symbol.
  Comm {
    label: Label,
    size: usize,
    align: usize,
  },
}

impl Instruction {
  /// Net number of stack slots the instruction pushes.
  pub fn stack_effect(&self) -> i32 {
    match self {
      Instruction::Push(_) => 1,
      Instruction::Pop(_) => -1,
      _ => 0,
    }
  }
}

/// Renders instructions as assembler source for one target.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
  target: Target,
}

impl Printer {
  pub fn new(target: Target) -> Self {
    Self { target }
  }

  /// Print a whole program, one line per output line.
  pub fn print(&self, program: &[Instruction]) -> String {
    let mut out = String::new();
    for instruction in program {
      for line in self.lines(instruction) {
        out.push_str(&line);
        out.push('\n');
      }
    }
    out
  }

  pub fn label(&self, label: &Label) -> String {
    match (label, self.target) {
      (Label::Symbol(name), Target::Darwin) if name == ENTRY_POINT => format!("_{ENTRY_POINT}"),
      (Label::Symbol(name), _) => name.clone(),
      (Label::Local(kind, id), Target::Darwin) => format!("L{}{id}", kind.name()),
      (Label::Local(kind, id), Target::Linux) => format!(".L{}{id}", kind.name()),
      (Label::Strings(id), _) => format!("strings{id}"),
    }
  }

  fn page(&self, label: &Label) -> String {
    let name = self.label(label);
    match self.target {
      Target::Darwin => format!("{name}@PAGE"),
      Target::Linux => name,
    }
  }

  fn page_offset(&self, label: &Label) -> String {
    let name = self.label(label);
    match self.target {
      Target::Darwin => format!("{name}@PAGEOFF"),
      Target::Linux => format!(":lo12:{name}"),
    }
  }

  fn section(&self, section: Section) -> &'static str {
    match (section, self.target) {
      (Section::Data, Target::Darwin) => ".section __DATA,__data",
      (Section::Data, Target::Linux) => ".section .data",
      (Section::Strings, Target::Darwin) => ".section __TEXT,__cstring,cstring_literals",
      (Section::Strings, Target::Linux) => ".section .rodata",
    }
  }

  /// Text for one instruction. Most produce a single line; large immediates
  /// expand to a `movz`/`movk` sequence.
  pub fn lines(&self, instruction: &Instruction) -> Vec<String> {
    let line = match instruction {
      Instruction::Mov { dst, src } => op(format!("mov {}, {}", dst.name(), src.name())),
      Instruction::MovImm { dst, value } => return mov_immediate(*dst, *value),
      Instruction::Add { dst, lhs, rhs } => {
        op(format!("add {}, {}, {}", dst.name(), lhs.name(), operand(rhs)))
      }
      Instruction::Sub { dst, lhs, rhs } => {
        op(format!("sub {}, {}, {}", dst.name(), lhs.name(), operand(rhs)))
      }
      Instruction::Mul { dst, lhs, rhs } => {
        op(format!("mul {}, {}, {}", dst.name(), lhs.name(), rhs.name()))
      }
      Instruction::SDiv { dst, lhs, rhs } => {
        op(format!("sdiv {}, {}, {}", dst.name(), lhs.name(), rhs.name()))
      }
      Instruction::Neg { dst, src } => op(format!("neg {}, {}", dst.name(), src.name())),
      Instruction::Cmp { lhs, rhs } => op(format!("cmp {}, {}", lhs.name(), operand(rhs))),
      Instruction::CSet { dst, condition } => {
        op(format!("cset {}, {}", dst.name(), condition.mnemonic()))
      }
      Instruction::Load {
        dst,
        address,
        width: Width::Quad,
      } => op(format!("ldr {}, {}", dst.name(), memory(address))),
      Instruction::Load {
        dst,
        address,
        width: Width::Byte,
      } => op(format!("ldrb {}, {}", dst.word_name(), memory(address))),
      Instruction::Store {
        src,
        address,
        width: Width::Quad,
      } => op(format!("str {}, {}", src.name(), memory(address))),
      Instruction::Store {
        src,
        address,
        width: Width::Byte,
      } => op(format!("strb {}, {}", src.word_name(), memory(address))),
      Instruction::LoadPair {
        first,
        second,
        address,
      } => op(format!(
        "ldp {}, {}, {}",
        first.name(),
        second.name(),
        memory(address)
      )),
      Instruction::StorePair {
        first,
        second,
        address,
      } => op(format!(
        "stp {}, {}, {}",
        first.name(),
        second.name(),
        memory(address)
      )),
      Instruction::Push(reg) => op(format!(
        "str {}, {}",
        reg.name(),
        memory(&Address::PreIndex(Register::Sp, -16))
      )),
      Instruction::Pop(reg) => op(format!(
        "ldr {}, {}",
        reg.name(),
        memory(&Address::PostIndex(Register::Sp, 16))
      )),
      Instruction::AddressPage { dst, label } => {
        op(format!("adrp {}, {}", dst.name(), self.page(label)))
      }
      Instruction::AddPageOffset { dst, src, label } => op(format!(
        "add {}, {}, {}",
        dst.name(),
        src.name(),
        self.page_offset(label)
      )),
      Instruction::Branch(label) => op(format!("b {}", self.label(label))),
      Instruction::BranchLink(label) => op(format!("bl {}", self.label(label))),
      Instruction::BranchIf { condition, label } => {
        op(format!("b.{} {}", condition.mnemonic(), self.label(label)))
      }
      Instruction::Ret => op("ret".to_string()),
      Instruction::Label(label) => format!("{}:", self.label(label)),
      Instruction::Align(power) => format!(".p2align {power}"),
      Instruction::Section(section) => self.section(*section).to_string(),
      Instruction::Globl(labels) => {
        let names: Vec<String> = labels.iter().map(|label| self.label(label)).collect();
        format!(".globl {}", names.join(", "))
      }
      Instruction::Quad(value) => op(format!(".quad {value}")),
      Instruction::QuadAddress { label, offset } => match offset {
        0 => op(format!(".quad {}", self.label(label))),
        offset if *offset > 0 => op(format!(".quad {}+{offset}", self.label(label))),
        offset => op(format!(".quad {}{offset}", self.label(label))),
      },
      Instruction::Byte(value) => op(format!(".byte {value}")),
      Instruction::Zero(size) => op(format!(".zero {size}")),
      Instruction::Asciz(content) => op(format!(".asciz \"{content}\"")),
      Instruction::Comm { label, size, align } => {
        let align = match self.target {
          Target::Darwin => align.trailing_zeros() as usize,
          Target::Linux => *align,
        };
        format!(".comm {}, {size}, {align}", self.label(label))
      }
    };
    vec![line]
  }
}

fn op(text: String) -> String {
  format!("    {text}")
}

fn operand(operand: &Operand) -> String {
  match operand {
    Operand::Reg(reg) => reg.name().to_string(),
    Operand::Imm(value) => format!("#{value}"),
  }
}

fn memory(address: &Address) -> String {
  match address {
    Address::Base(base) => format!("[{}]", base.name()),
    Address::Offset(base, 0) => format!("[{}]", base.name()),
    Address::Offset(base, offset) => format!("[{}, #{offset}]", base.name()),
    Address::PreIndex(base, offset) => format!("[{}, #{offset}]!", base.name()),
    Address::PostIndex(base, offset) => format!("[{}], #{offset}", base.name()),
  }
}

/// Materialise a 64-bit constant. Values reachable with a single `mov`
/// (16-bit positive or its bitwise-not) use it; anything else is built from
/// 16-bit chunks.
fn mov_immediate(dst: Register, value: i64) -> Vec<String> {
  if (0..=0xffff).contains(&value) || (-0x10000..0).contains(&value) {
    return vec![op(format!("mov {}, #{value}", dst.name()))];
  }

  let bits = value as u64;
  let mut lines = Vec::new();
  for shift in (0..64).step_by(16) {
    let chunk = (bits >> shift) & 0xffff;
    if lines.is_empty() {
      if chunk == 0 && shift != 48 && (bits >> shift) != 0 {
        continue;
      }
      let mut line = format!("movz {}, #{chunk}", dst.name());
      if shift > 0 {
        let _ = write!(line, ", lsl #{shift}");
      }
      lines.push(op(line));
    } else if chunk != 0 {
      lines.push(op(format!("movk {}, #{chunk}, lsl #{shift}", dst.name())));
    }
  }
  lines
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn darwin(instruction: Instruction) -> Vec<String> {
    Printer::new(Target::Darwin).lines(&instruction)
  }

  fn linux(instruction: Instruction) -> Vec<String> {
    Printer::new(Target::Linux).lines(&instruction)
  }

  #[test]
  fn push_and_pop_are_pre_and_post_indexed() {
    assert_eq!(darwin(Instruction::Push(Register::X0)), ["    str x0, [sp, #-16]!"]);
    assert_eq!(darwin(Instruction::Pop(Register::X1)), ["    ldr x1, [sp], #16"]);
  }

  #[test]
  fn entry_point_is_rewritten_only_on_darwin() {
    let main = Label::symbol("main");
    assert_eq!(darwin(Instruction::Label(main.clone())), ["_main:"]);
    assert_eq!(linux(Instruction::Label(main.clone())), ["main:"]);
    assert_eq!(darwin(Instruction::BranchLink(main)), ["    bl _main"]);
    assert_eq!(darwin(Instruction::BranchLink(Label::symbol("foo"))), ["    bl foo"]);
  }

  #[test]
  fn local_labels_follow_target_convention() {
    let label = Label::Local(LocalKind::Else, 3);
    assert_eq!(darwin(Instruction::Branch(label.clone())), ["    b Lelse3"]);
    assert_eq!(
      linux(Instruction::BranchIf {
        condition: Condition::Eq,
        label
      }),
      ["    b.eq .Lelse3"]
    );
  }

  #[test]
  fn page_relocations() {
    let label = Label::Strings(0);
    assert_eq!(
      darwin(Instruction::AddressPage {
        dst: Register::X0,
        label: label.clone()
      }),
      ["    adrp x0, strings0@PAGE"]
    );
    assert_eq!(
      linux(Instruction::AddPageOffset {
        dst: Register::X0,
        src: Register::X0,
        label
      }),
      ["    add x0, x0, :lo12:strings0"]
    );
  }

  #[test]
  fn byte_accesses_use_word_registers() {
    assert_eq!(
      darwin(Instruction::Load {
        dst: Register::X0,
        address: Address::Base(Register::X0),
        width: Width::Byte,
      }),
      ["    ldrb w0, [x0]"]
    );
    assert_eq!(
      darwin(Instruction::Store {
        src: Register::X1,
        address: Address::Offset(Register::Fp, -8),
        width: Width::Quad,
      }),
      ["    str x1, [x29, #-8]"]
    );
  }

  #[test]
  fn small_immediates_use_a_single_mov() {
    assert_eq!(
      darwin(Instruction::MovImm {
        dst: Register::X0,
        value: 5
      }),
      ["    mov x0, #5"]
    );
    assert_eq!(
      darwin(Instruction::MovImm {
        dst: Register::X0,
        value: -1
      }),
      ["    mov x0, #-1"]
    );
  }

  #[test]
  fn large_immediates_are_built_from_chunks() {
    assert_eq!(
      darwin(Instruction::MovImm {
        dst: Register::X0,
        value: 0x1_0002
      }),
      ["    movz x0, #2", "    movk x0, #1, lsl #16"]
    );
    assert_eq!(
      darwin(Instruction::MovImm {
        dst: Register::X0,
        value: 0x5_0000_0000
      }),
      ["    movz x0, #5, lsl #32"]
    );
    assert_eq!(
      darwin(Instruction::MovImm {
        dst: Register::X9,
        value: -65537
      }),
      [
        "    movz x9, #65535",
        "    movk x9, #65534, lsl #16",
        "    movk x9, #65535, lsl #32",
        "    movk x9, #65535, lsl #48",
      ]
    );
  }

  #[test]
  fn common_alignment_differs_by_target() {
    let comm = Instruction::Comm {
      label: Label::symbol("g"),
      size: 24,
      align: 8,
    };
    assert_eq!(darwin(comm.clone()), [".comm g, 24, 3"]);
    assert_eq!(linux(comm), [".comm g, 24, 8"]);
  }

  #[test]
  fn data_directives() {
    assert_eq!(
      darwin(Instruction::QuadAddress {
        label: Label::symbol("x"),
        offset: -8
      }),
      ["    .quad x-8"]
    );
    assert_eq!(
      darwin(Instruction::Globl(vec![Label::symbol("main"), Label::symbol("f")])),
      [".globl _main, f"]
    );
    assert_eq!(
      darwin(Instruction::Section(Section::Strings)),
      [".section __TEXT,__cstring,cstring_literals"]
    );
    assert_eq!(linux(Instruction::Zero(16)), ["    .zero 16"]);
  }

  #[test]
  fn stack_effect_counts_slots() {
    assert_eq!(Instruction::Push(Register::X0).stack_effect(), 1);
    assert_eq!(Instruction::Pop(Register::X0).stack_effect(), -1);
    assert_eq!(Instruction::Ret.stack_effect(), 0);
  }
}
